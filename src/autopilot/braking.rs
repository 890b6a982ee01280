// autopilot/braking.rs
use crate::autopilot::track::WaypointTrack;
use crate::autopilot::types::Pos3;

/// Proximity scan over the braking zones of a track.
///
/// Runs once per tick after navigation; the flag it produces is consumed by
/// the speed controller on the following tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrakingZoneDetector {
    braking: bool,
}

impl BrakingZoneDetector {
    pub fn is_braking(&self) -> bool {
        self.braking
    }

    /// Returns true when the flag changed.
    pub fn scan(&mut self, position: &Pos3, track: &WaypointTrack) -> bool {
        let radius = track.brake_radius();
        let braking = track
            .braking_zones()
            .iter()
            .any(|zone| nalgebra::distance(position, zone) < radius);

        let changed = braking != self.braking;
        self.braking = braking;
        changed
    }
}
