// ==============================================================================
// circuit.rs - CIRCUIT DESCRIPTION (JSON)
// ------------------------------------------------------------------------------
// Everything a race needs that is not per-vehicle tuning: waypoints, braking
// zones and their radius, finish line, ground size, lap target, start delay,
// and the grid. The grid sits just past the finish line so the first
// crossing completes a full lap. Each grid slot may override parts of the
// controller tuning.
//
// Missing fields take the defaults below; `CircuitConfig::default()` is a
// rectangular circuit that needs no file at all.
// ==============================================================================

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use crate::autopilot::race::DEFAULT_LAP_TARGET;
use crate::autopilot::{ConfigError, ControllerConfig, Pos3, Real, Rot3, Vec3, WaypointTrack, look_rotation, world_up};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishLineConfig {
    pub center: [Real; 3],
    pub half_extents: [Real; 3], // deeper than one tick of travel at max speed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSlot {
    pub name: String,
    pub position: [Real; 3],
    #[serde(default)]
    pub controller: Option<ControllerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub name: String,
    pub waypoints: Vec<[Real; 3]>,
    pub braking_zones: Vec<[Real; 3]>,
    #[serde(default = "default_brake_threshold")]
    pub brake_threshold: Real,          // u, braking-zone radius
    pub finish_line: FinishLineConfig,
    pub ground_half_extents: [Real; 2], // [x, z]
    pub lap_target: u32,
    pub start_delay: Real,              // s before the start signal
    pub controller: ControllerConfig,   // shared tuning
    pub vehicles: Vec<GridSlot>,
}

fn default_brake_threshold() -> Real {
    10.0
}

impl Default for CircuitConfig {
    fn default() -> Self {
        let y = 0.6;
        Self {
            name: "Rectangle".into(),
            waypoints: vec![
                [0.0, y, 600.0],
                [400.0, y, 600.0],
                [400.0, y, -600.0],
                [0.0, y, -600.0],
            ],
            // one zone per corner, wide enough to shed speed before the turn
            braking_zones: vec![
                [0.0, y, 600.0],
                [400.0, y, 600.0],
                [400.0, y, -600.0],
                [0.0, y, -600.0],
            ],
            brake_threshold: 200.0,
            finish_line: FinishLineConfig {
                center: [0.0, 1.0, 0.0],
                half_extents: [150.0, 4.0, 8.0],
            },
            ground_half_extents: [1000.0, 1000.0],
            lap_target: DEFAULT_LAP_TARGET,
            start_delay: 3.0,
            controller: ControllerConfig { turn_speed: 4.0, ..ControllerConfig::default() },
            vehicles: vec![
                GridSlot { name: "red".into(), position: [-6.0, y, 20.0], controller: None },
                GridSlot { name: "blue".into(), position: [6.0, y, 40.0], controller: None },
            ],
        }
    }
}

impl CircuitConfig {
    /// Reads a circuit from a JSON file.
    pub fn load(filepath: &Path) -> anyhow::Result<Self> {
        let fh = OpenOptions::new()
            .read(true)
            .open(filepath)
            .context(format!("Failed to open circuit file {}!", filepath.display()))?;
        let circuit: Self = serde_json::from_reader(&fh)
            .context(format!("Failed to parse circuit file {}!", filepath.display()))?;
        circuit
            .validate()
            .context(format!("Invalid circuit file {}!", filepath.display()))?;
        Ok(circuit)
    }

    /// Circuit-level checks. Per-vehicle tuning is validated when each
    /// controller is built so one bad slot does not sink the race.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vehicles.is_empty() {
            return Err(ConfigError::NoVehicles);
        }
        // names key the effect emitters and the standings
        let mut seen = HashSet::new();
        for slot in &self.vehicles {
            if !seen.insert(slot.name.as_str()) {
                return Err(ConfigError::DuplicateVehicle(slot.name.clone()));
            }
        }
        if !(self.start_delay.is_finite() && self.start_delay >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "start_delay",
                value: self.start_delay,
                reason: "must be finite and >= 0",
            });
        }
        if self.lap_target == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "lap_target",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        self.track().map(|_| ())
    }

    pub fn track(&self) -> Result<Arc<WaypointTrack>, ConfigError> {
        WaypointTrack::new(
            self.waypoints.iter().copied().map(Pos3::from).collect(),
            self.braking_zones.iter().copied().map(Pos3::from).collect(),
            self.brake_threshold,
        )
    }

    /// Slot tuning if given, else the shared one.
    pub fn controller_for(&self, slot: &GridSlot) -> ControllerConfig {
        slot.controller.unwrap_or(self.controller)
    }

    /// Grid heading: facing the first waypoint, level.
    pub fn grid_heading(&self, slot: &GridSlot) -> Rot3 {
        let from = Pos3::from(slot.position);
        let first = self.waypoints.first().copied().map(Pos3::from).unwrap_or(from);
        let mut dir: Vec3 = first - from;
        dir.y = 0.0;
        look_rotation(&dir, &world_up()).unwrap_or_else(Rot3::identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::autopilot::controller::tests::FakeBody;
    use crate::autopilot::effects::tests::RecordingBackend;
    use crate::autopilot::{TickContext, VehicleController, VehicleId, forward};

    #[test]
    fn default_circuit_is_valid() {
        let c = CircuitConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.track().unwrap().len(), 4);
        assert_eq!(c.lap_target, 2);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: CircuitConfig = serde_json::from_str(
            r#"{
                "name": "Tiny",
                "waypoints": [[0, 0.6, 50], [0, 0.6, -50]],
                "braking_zones": [],
                "vehicles": [
                    { "name": "solo", "position": [0, 0.6, 0],
                      "controller": { "max_speed": 80 } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(c.brake_threshold, 10.0);
        assert_eq!(c.start_delay, 3.0);
        let tuned = c.controller_for(&c.vehicles[0]);
        assert_eq!(tuned.max_speed, 80.0);
        assert_eq!(tuned.brake_speed, 100.0);
        // brake floor above the cap is caught when the controller is built
        assert!(tuned.validate().is_err());
    }

    #[test]
    fn rejects_empty_grid_and_track() {
        let mut c = CircuitConfig::default();
        c.vehicles.clear();
        assert_eq!(c.validate(), Err(ConfigError::NoVehicles));

        let mut c = CircuitConfig::default();
        c.waypoints.clear();
        assert_eq!(c.validate(), Err(ConfigError::EmptyTrack));

        let mut c = CircuitConfig::default();
        c.start_delay = -1.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_two_cars_with_one_name() {
        let mut c = CircuitConfig::default();
        c.vehicles[1].name = c.vehicles[0].name.clone();
        assert_eq!(c.validate(), Err(ConfigError::DuplicateVehicle("red".into())));
    }

    #[test]
    fn grid_faces_first_waypoint() {
        let c = CircuitConfig::default();
        let slot = GridSlot { name: "x".into(), position: [0.0, 0.6, 0.0], controller: None };
        let fwd = forward(&c.grid_heading(&slot));
        assert_relative_eq!(fwd, Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn default_circuit_laps_without_orbiting_a_corner() {
        let c = CircuitConfig::default();
        let slot = &c.vehicles[0];
        let mut backend = RecordingBackend::with_owners(&[slot.name.as_str()]);
        let mut ctl = VehicleController::new(
            VehicleId(1),
            &slot.name,
            &c.controller_for(slot),
            c.track().unwrap(),
            &mut backend,
        )
        .unwrap();
        let mut body = FakeBody::at(Pos3::from(slot.position));
        body.rotation = c.grid_heading(slot);

        let mut visited = Vec::new();
        for i in 0..60 * 60 {
            let ctx = TickContext { dt: 1.0 / 60.0, elapsed: i as Real / 60.0, race_start: 0.0 };
            if let Some(next) = ctl.tick(&mut body, &ctx, &mut backend).and_then(|r| r.advanced_to) {
                visited.push(next);
            }
        }

        assert!(visited.len() >= 8, "only advanced {visited:?}");
        for pair in visited.windows(2) {
            assert_eq!(pair[1], (pair[0] + 1) % 4);
        }
    }

    #[test]
    fn load_reports_missing_file() {
        let err = CircuitConfig::load(Path::new("/nonexistent/circuit.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to open circuit file"));
    }
}
