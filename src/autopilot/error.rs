// autopilot/error.rs
use std::fmt;

use crate::autopilot::types::VehicleId;

/// Raised while building a circuit or a controller. Always fatal for the
/// vehicle being built, never for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyTrack,
    InvalidParameter {
        name: &'static str,
        value: f32,
        reason: &'static str,
    },
    MissingEffect(String),
    NoVehicles,
    DuplicateVehicle(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyTrack => write!(f, "waypoint track has no waypoints"),
            ConfigError::InvalidParameter { name, value, reason } => {
                write!(f, "invalid `{name}` = {value}: {reason}")
            }
            ConfigError::MissingEffect(name) => write!(f, "effect emitter `{name}` is not wired"),
            ConfigError::NoVehicles => write!(f, "circuit declares no vehicles"),
            ConfigError::DuplicateVehicle(name) => write!(f, "vehicle name `{name}` is used twice"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Race bookkeeping invariant violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceError {
    DuplicateFinish(VehicleId),
    UnknownVehicle(VehicleId),
}

impl fmt::Display for RaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceError::DuplicateFinish(id) => write!(f, "{id} is already registered as finished"),
            RaceError::UnknownVehicle(id) => write!(f, "{id} is not entered in this race"),
        }
    }
}

impl std::error::Error for RaceError {}
