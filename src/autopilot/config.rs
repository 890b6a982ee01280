// autopilot/config.rs
use serde::{Deserialize, Serialize};

use crate::autopilot::error::ConfigError;
use crate::autopilot::types::Real;

/// Tuning for one autonomous vehicle. Distances in world units, times in
/// seconds, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub max_speed: Real,          // u/s
    pub turn_speed: Real,         // slerp factor per second
    pub waypoint_threshold: Real, // u, distance that counts as "reached"
    pub brake_speed: Real,        // u/s, floor while braking
    pub acceleration_time: Real,  // s, 0 -> max_speed

    // --- Effects ---
    pub skid_duration: Real,  // s, trail lifetime
    pub skid_angle: Real,     // deg, heading vs velocity
    pub min_skid_speed: Real, // u/s, below this velocity has no direction

    // --- Ground / tilt ---
    pub downforce: Real,         // N per (u/s)
    pub ground_ray_length: Real, // u
    pub max_tilt_angle: Real,    // deg
}

pub const CIRCUIT_RACER: ControllerConfig = ControllerConfig {
    max_speed: 400.0,
    turn_speed: 1.0,
    waypoint_threshold: 20.0,
    brake_speed: 100.0,
    acceleration_time: 7.0,

    skid_duration: 0.2,
    skid_angle: 15.0,
    min_skid_speed: 0.5,

    downforce: 40.0,
    ground_ray_length: 1.5,
    max_tilt_angle: 30.0,
};

impl Default for ControllerConfig {
    fn default() -> Self {
        CIRCUIT_RACER
    }
}

fn positive(name: &'static str, value: Real) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value, reason: "must be finite and > 0" })
    }
}

fn non_negative(name: &'static str, value: Real) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value, reason: "must be finite and >= 0" })
    }
}

fn angle(name: &'static str, value: Real) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 180.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value, reason: "must be in (0, 180] degrees" })
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_speed", self.max_speed)?;
        positive("acceleration_time", self.acceleration_time)?;
        positive("waypoint_threshold", self.waypoint_threshold)?;
        positive("ground_ray_length", self.ground_ray_length)?;

        non_negative("turn_speed", self.turn_speed)?;
        non_negative("brake_speed", self.brake_speed)?;
        non_negative("skid_duration", self.skid_duration)?;
        non_negative("min_skid_speed", self.min_skid_speed)?;
        non_negative("downforce", self.downforce)?;

        angle("skid_angle", self.skid_angle)?;
        angle("max_tilt_angle", self.max_tilt_angle)?;

        if self.brake_speed > self.max_speed {
            return Err(ConfigError::InvalidParameter {
                name: "brake_speed",
                value: self.brake_speed,
                reason: "must not exceed max_speed",
            });
        }
        Ok(())
    }

    /// max_speed / acceleration_time. Only meaningful on a validated config.
    pub fn acceleration_rate(&self) -> Real {
        self.max_speed / self.acceleration_time
    }
}
