// ==============================================================================
// navigator.rs - WAYPOINT FOLLOWING (STEER + MOVE + ADVANCE)
// ------------------------------------------------------------------------------
//   dir       = normalize(target - position)
//   desired   = look_rotation(dir, world up)
//   rotation' = slerp(rotation, desired, turn_speed * dt)
//   position' = position + forward(rotation') * speed * dt
//   if |position' - target| < threshold: index = (index + 1) % len
//
// At most one advancement per tick, even when the car overshoots several
// waypoints in a single step.
// ==============================================================================

use crate::autopilot::config::ControllerConfig;
use crate::autopilot::track::WaypointTrack;
use crate::autopilot::types::{Pos3, Real, Rot3, forward, look_rotation, slerp_clamped, world_up};

#[derive(Debug, Clone, Copy)]
pub struct NavStep {
    pub position: Pos3,
    pub rotation: Rot3,
    pub target: Pos3,
    /// New waypoint index when the target was reached this tick.
    pub advanced_to: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct WaypointNavigator {
    index: usize,
    turn_speed: Real,
    threshold: Real,
}

impl WaypointNavigator {
    pub fn new(cfg: &ControllerConfig) -> Self {
        Self {
            index: 0,
            turn_speed: cfg.turn_speed,
            threshold: cfg.waypoint_threshold,
        }
    }

    /// Always in `[0, track.len())`.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn step(
        &mut self,
        position: &Pos3,
        rotation: &Rot3,
        speed: Real,
        dt: Real,
        track: &WaypointTrack,
    ) -> NavStep {
        let target = track.waypoint(self.index);

        let desired = look_rotation(&(target - position), &world_up()).unwrap_or(*rotation);
        let new_rotation = slerp_clamped(rotation, &desired, self.turn_speed * dt);
        let new_position = position + forward(&new_rotation) * (speed * dt);

        let mut advanced_to = None;
        if nalgebra::distance(&new_position, &target) < self.threshold {
            self.index = track.next_index(self.index);
            advanced_to = Some(self.index);
        }

        NavStep {
            position: new_position,
            rotation: new_rotation,
            target,
            advanced_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autopilot::config::CIRCUIT_RACER;
    use crate::autopilot::types::angle_deg;
    use approx::assert_relative_eq;
    use nalgebra::point;
    use std::sync::Arc;

    fn square() -> Arc<WaypointTrack> {
        WaypointTrack::new(
            vec![
                point![0.0, 0.0, 100.0],
                point![100.0, 0.0, 100.0],
                point![100.0, 0.0, 0.0],
                point![0.0, 0.0, 0.0],
            ],
            Vec::new(),
            10.0,
        )
        .unwrap()
    }

    #[test]
    fn advances_when_starting_inside_threshold() {
        let track = square();
        let mut nav = WaypointNavigator::new(&CIRCUIT_RACER);

        let step = nav.step(&point![0.0, 0.0, 90.0], &Rot3::identity(), 0.0, 1.0 / 60.0, &track);
        assert_eq!(step.advanced_to, Some(1));
        assert_eq!(nav.index(), 1);
    }

    #[test]
    fn no_skip_ahead_on_overshoot() {
        // all waypoints within reach of one huge step
        let track = WaypointTrack::new(
            vec![point![0.0, 0.0, 5.0], point![0.0, 0.0, 6.0], point![0.0, 0.0, 7.0]],
            Vec::new(),
            10.0,
        )
        .unwrap();
        let mut nav = WaypointNavigator::new(&CIRCUIT_RACER);

        let mut seen = Vec::new();
        for _ in 0..5 {
            let step = nav.step(&point![0.0, 0.0, 0.0], &Rot3::identity(), 0.0, 0.1, &track);
            seen.push(step.advanced_to.unwrap());
        }
        assert_eq!(seen, vec![1, 2, 0, 1, 2]);
    }

    #[test]
    fn moves_along_new_heading_at_speed() {
        let track = square();
        let mut nav = WaypointNavigator::new(&CIRCUIT_RACER);

        // already facing +Z towards waypoint 0
        let step = nav.step(&point![0.0, 0.0, 0.0], &Rot3::identity(), 60.0, 0.5, &track);
        assert_relative_eq!(step.position, point![0.0, 0.0, 30.0], epsilon = 1e-4);
        assert_eq!(step.advanced_to, None);
        assert_eq!(nav.index(), 0);
    }

    #[test]
    fn turns_gradually_towards_target() {
        let track = square();
        let mut nav = WaypointNavigator::new(&CIRCUIT_RACER);
        nav.index = 2; // (100, 0, 0): due +X from origin

        let step = nav.step(&point![0.0, 0.0, 0.0], &Rot3::identity(), 0.0, 0.25, &track);
        let heading = forward(&step.rotation);
        let err = angle_deg(&heading, &nalgebra::Vector3::x());
        // a quarter of the 90 degree turn
        assert_relative_eq!(err, 67.5, epsilon = 0.05);
    }

    #[test]
    fn sitting_on_target_keeps_heading() {
        let track = square();
        let mut nav = WaypointNavigator::new(&CIRCUIT_RACER);
        let rot = Rot3::from_axis_angle(&nalgebra::Vector3::y_axis(), 0.3);

        let step = nav.step(&point![0.0, 0.0, 100.0], &rot, 0.0, 0.1, &track);
        assert_relative_eq!(step.rotation.angle_to(&rot), 0.0, epsilon = 1e-5);
        assert!(step.position.coords.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn index_stays_in_range_over_many_laps() {
        let track = square();
        let mut nav = WaypointNavigator::new(&CIRCUIT_RACER);
        let mut pos = point![0.0, 0.0, 0.0];
        let mut rot = Rot3::identity();

        for _ in 0..5_000 {
            let step = nav.step(&pos, &rot, 60.0, 1.0 / 60.0, &track);
            pos = step.position;
            rot = step.rotation;
            assert!(nav.index() < track.len());
        }
    }
}
