//! autopilot - engine-agnostic race pilot (pure types + per-tick controllers)

pub mod types;
pub mod error;
pub mod config;
pub mod track;
pub mod speed;
pub mod braking;
pub mod navigator;
pub mod stabilizer;
pub mod effects;
pub mod body;
pub mod race;
pub mod controller;

pub use types::*;
pub use error::ConfigError;
pub use config::ControllerConfig;
pub use track::WaypointTrack;
pub use body::VehicleBody;
pub use effects::{EffectBackend, EffectHandle};
pub use race::{RaceEvent, RaceSession};
pub use controller::VehicleController;
