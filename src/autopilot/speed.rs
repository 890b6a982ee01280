// ==============================================================================
// speed.rs - SCALAR SPEED STATE (ACCELERATE / BRAKE / CLAMP)
// ------------------------------------------------------------------------------
// Each tick:
//   - not braking and below max: speed += rate * dt, rate = max / accel_time
//   - braking and above floor:   speed = lerp(speed, brake_speed, min(1, 2*dt))
//   - always clamp to [0, max]
//
// Braking approaches brake_speed exponentially and never undershoots it, so a
// car never stops from braking alone.
// ==============================================================================

use crate::autopilot::config::ControllerConfig;
use crate::autopilot::types::{Real, lerp};

const BRAKE_RESPONSE: Real = 2.0; // 1/s

#[derive(Debug, Clone, Copy)]
pub struct SpeedController {
    speed: Real,
    max_speed: Real,
    brake_speed: Real,
    acceleration_rate: Real, // derived once
}

impl SpeedController {
    /// Expects a validated config.
    pub fn new(cfg: &ControllerConfig) -> Self {
        Self {
            speed: 0.0,
            max_speed: cfg.max_speed,
            brake_speed: cfg.brake_speed,
            acceleration_rate: cfg.acceleration_rate(),
        }
    }

    pub fn speed(&self) -> Real {
        self.speed
    }

    #[cfg(test)]
    pub fn acceleration_rate(&self) -> Real {
        self.acceleration_rate
    }

    pub fn update(&mut self, braking: bool, dt: Real) -> Real {
        if !braking && self.speed < self.max_speed {
            self.speed += self.acceleration_rate * dt;
        } else if braking && self.speed > self.brake_speed {
            self.speed = lerp(self.speed, self.brake_speed, (BRAKE_RESPONSE * dt).min(1.0));
        }

        self.speed = self.speed.clamp(0.0, self.max_speed);
        self.speed
    }

    #[cfg(test)]
    pub(crate) fn set_speed(&mut self, speed: Real) {
        self.speed = speed;
    }
}
