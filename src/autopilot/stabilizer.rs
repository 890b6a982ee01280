// ==============================================================================
// stabilizer.rs - GROUNDING + TILT SELF-CORRECTION
// ------------------------------------------------------------------------------
// Two independent corrections per tick:
//
// 1) Grounding. A ray is cast along -local_up for `ground_ray_length`.
//      hit  -> grounded: F = -local_up * downforce * speed
//      miss -> airborne: F = -world_up * downforce * 2
//
// 2) Tilt. If angle(local_up, world_up) > max_tilt_angle the chassis is
//    slerped towards the nearest level orientation at rate 2 * dt. Never a
//    snap.
//
// The first only accumulates force, the second only touches rotation, so the
// order they are applied in does not matter.
// ==============================================================================

use std::f32::consts::PI;

use nalgebra::Unit;

use crate::autopilot::config::ControllerConfig;
use crate::autopilot::types::{
    Pos3, Real, Rot3, Vec3, angle_deg, forward, local_up, slerp_clamped, world_up,
};

const AIRBORNE_FACTOR: Real = 2.0;
const TILT_RECOVERY_RATE: Real = 2.0; // 1/s

#[derive(Debug, Clone, Copy)]
pub struct GroundRay {
    pub origin: Pos3,
    pub dir: Vec3,
    pub max_len: Real,
}

#[derive(Debug, Clone, Copy)]
pub struct GroundCorrection {
    pub grounded: bool,
    pub force: Vec3,
    pub tilt_deg: Real,
    /// Set only when the chassis was over the tilt limit.
    pub rotation: Option<Rot3>,
}

#[derive(Debug, Clone, Copy)]
pub struct GroundStabilizer {
    downforce: Real,
    ray_length: Real,
    max_tilt_deg: Real,
}

impl GroundStabilizer {
    pub fn new(cfg: &ControllerConfig) -> Self {
        Self {
            downforce: cfg.downforce,
            ray_length: cfg.ground_ray_length,
            max_tilt_deg: cfg.max_tilt_angle,
        }
    }

    pub fn ray(&self, position: &Pos3, rotation: &Rot3) -> GroundRay {
        GroundRay {
            origin: *position,
            dir: -local_up(rotation),
            max_len: self.ray_length,
        }
    }

    pub fn correct(&self, grounded: bool, rotation: &Rot3, speed: Real, dt: Real) -> GroundCorrection {
        let up = local_up(rotation);

        let force = if grounded {
            -up * (self.downforce * speed)
        } else {
            -world_up() * (self.downforce * AIRBORNE_FACTOR)
        };

        let tilt_deg = angle_deg(&up, &world_up());
        let rotation = (tilt_deg > self.max_tilt_deg).then(|| {
            let level = Rot3::rotation_between(&up, &world_up())
                // upside down: any half turn levels it, roll about the heading
                .unwrap_or_else(|| Rot3::from_axis_angle(&Unit::new_normalize(forward(rotation)), PI));
            slerp_clamped(rotation, &(level * rotation), TILT_RECOVERY_RATE * dt)
        });

        GroundCorrection { grounded, force, tilt_deg, rotation }
    }
}
