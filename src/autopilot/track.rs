// autopilot/track.rs
use std::sync::Arc;

use crate::autopilot::error::ConfigError;
use crate::autopilot::types::{Pos3, Real};

/// Ordered, cyclic list of target points plus the braking-zone markers of a
/// circuit. Immutable once built; vehicles share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct WaypointTrack {
    waypoints: Vec<Pos3>,
    braking_zones: Vec<Pos3>,
    brake_radius: Real,
}

impl WaypointTrack {
    pub fn new(
        waypoints: Vec<Pos3>,
        braking_zones: Vec<Pos3>,
        brake_radius: Real,
    ) -> Result<Arc<Self>, ConfigError> {
        if waypoints.is_empty() {
            return Err(ConfigError::EmptyTrack);
        }
        if !(brake_radius.is_finite() && brake_radius >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "brake_threshold",
                value: brake_radius,
                reason: "must be finite and >= 0",
            });
        }
        Ok(Arc::new(Self { waypoints, braking_zones, brake_radius }))
    }

    /// Never zero.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Waypoint at `index`, wrapped around the track.
    pub fn waypoint(&self, index: usize) -> Pos3 {
        self.waypoints[index % self.waypoints.len()]
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.waypoints.len()
    }

    pub fn waypoints(&self) -> &[Pos3] {
        &self.waypoints
    }

    pub fn braking_zones(&self) -> &[Pos3] {
        &self.braking_zones
    }

    pub fn brake_radius(&self) -> Real {
        self.brake_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::point;

    #[test]
    fn empty_track_fails_fast() {
        let err = WaypointTrack::new(Vec::new(), vec![point![0.0, 0.0, 0.0]], 10.0).unwrap_err();
        assert_eq!(err, ConfigError::EmptyTrack);
    }

    #[test]
    fn indices_wrap() {
        let track = WaypointTrack::new(
            vec![point![0.0, 0.0, 0.0], point![10.0, 0.0, 0.0], point![10.0, 0.0, 10.0]],
            Vec::new(),
            10.0,
        )
        .unwrap();
        assert_eq!(track.next_index(0), 1);
        assert_eq!(track.next_index(2), 0);
        assert_eq!(track.waypoint(4), point![10.0, 0.0, 0.0]);
    }

    #[test]
    fn negative_brake_radius_is_rejected() {
        assert!(WaypointTrack::new(vec![point![0.0, 0.0, 0.0]], Vec::new(), -1.0).is_err());
    }
}
