// autopilot/body.rs
use crate::autopilot::stabilizer::GroundRay;
use crate::autopilot::types::{Pos3, Rot3, Vec3};

/// Rigid-body capability a controller drives. Implemented by the physics
/// host; the core never sees the engine.
pub trait VehicleBody {
    fn position(&self) -> Pos3;
    fn rotation(&self) -> Rot3;
    fn linear_velocity(&self) -> Vec3;

    /// True when the ray hits the ground surface set.
    fn cast_ground_ray(&self, ray: &GroundRay) -> bool;

    /// Accumulated until the next physics step.
    fn add_force(&mut self, force: Vec3);
    fn set_rotation(&mut self, rotation: Rot3);
    fn move_position(&mut self, position: Pos3);
}
