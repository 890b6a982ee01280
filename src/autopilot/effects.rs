// ==============================================================================
// effects.rs - SKID / SMOKE FEEDBACK STATE MACHINE
// ------------------------------------------------------------------------------
// States: Normal, Skidding.
//   angle(forward, velocity) > skid_angle  -> Skidding
//   otherwise                              -> Normal
//
// Transitions are edge-triggered: the enter action of a state runs once per
// transition, never on ticks where the state is held.
//   enter Skidding: both trails emit, both smoke systems play
//   enter Normal:   all four stop
//
// The four emitters are addressed through stable handles resolved once at
// wiring time. They are always toggled as a group.
// ==============================================================================

use serde::Serialize;

use crate::autopilot::config::ControllerConfig;
use crate::autopilot::error::ConfigError;
use crate::autopilot::types::{Real, Vec3, angle_deg};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct EffectHandle(pub u32);

/// Renderer-side effect resources.
pub trait EffectBackend {
    fn resolve(&self, name: &str) -> Option<EffectHandle>;
    fn set_trail_time(&mut self, trail: EffectHandle, seconds: Real);
    fn set_trail_emitting(&mut self, trail: EffectHandle, emitting: bool);
    fn play_particles(&mut self, smoke: EffectHandle);
    fn stop_particles(&mut self, smoke: EffectHandle);
}

/// Left/right skid trails and tire smoke of one car.
#[derive(Debug, Clone, Copy)]
pub struct TireEffects {
    trails: [EffectHandle; 2],
    smoke: [EffectHandle; 2],
}

impl TireEffects {
    pub const EMITTERS: [&'static str; 4] = ["left_skid", "right_skid", "left_smoke", "right_smoke"];

    /// Resolves `<owner>/<emitter>` for all four emitters.
    pub fn wire(owner: &str, backend: &dyn EffectBackend) -> Result<Self, ConfigError> {
        let get = |emitter: &str| {
            let name = format!("{owner}/{emitter}");
            backend.resolve(&name).ok_or(ConfigError::MissingEffect(name))
        };

        Ok(Self {
            trails: [get(Self::EMITTERS[0])?, get(Self::EMITTERS[1])?],
            smoke: [get(Self::EMITTERS[2])?, get(Self::EMITTERS[3])?],
        })
    }

    fn start(&self, backend: &mut dyn EffectBackend) {
        for trail in self.trails {
            backend.set_trail_emitting(trail, true);
        }
        for smoke in self.smoke {
            backend.play_particles(smoke);
        }
    }

    fn stop(&self, backend: &mut dyn EffectBackend) {
        for trail in self.trails {
            backend.set_trail_emitting(trail, false);
        }
        for smoke in self.smoke {
            backend.stop_particles(smoke);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum SkidState {
    Normal,
    Skidding,
}

#[derive(Debug, Clone)]
pub struct EffectStateMachine {
    state: SkidState,
    rig: TireEffects,
    skid_angle: Real,
    min_speed: Real,
}

impl EffectStateMachine {
    /// Sets the trail lifetime and forces every emitter off.
    pub fn new(cfg: &ControllerConfig, rig: TireEffects, backend: &mut dyn EffectBackend) -> Self {
        for trail in rig.trails {
            backend.set_trail_time(trail, cfg.skid_duration);
        }
        rig.stop(backend);

        Self {
            state: SkidState::Normal,
            rig,
            skid_angle: cfg.skid_angle,
            min_speed: cfg.min_skid_speed,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SkidState {
        self.state
    }

    pub fn is_skidding(&self) -> bool {
        self.state == SkidState::Skidding
    }

    /// Condition only: does this heading/velocity pair count as a skid?
    pub fn skid_condition(&self, forward: &Vec3, velocity: &Vec3) -> bool {
        // a car at (near) rest has no travel direction to diverge from
        velocity.norm() >= self.min_speed && angle_deg(forward, velocity) > self.skid_angle
    }

    /// Returns the new state on a transition.
    pub fn update(
        &mut self,
        forward: &Vec3,
        velocity: &Vec3,
        backend: &mut dyn EffectBackend,
    ) -> Option<SkidState> {
        let next = if self.skid_condition(forward, velocity) {
            SkidState::Skidding
        } else {
            SkidState::Normal
        };

        if next == self.state {
            return None;
        }
        self.enter(next, backend);
        Some(next)
    }

    fn enter(&mut self, next: SkidState, backend: &mut dyn EffectBackend) {
        match next {
            SkidState::Skidding => self.rig.start(backend),
            SkidState::Normal => self.rig.stop(backend),
        }
        self.state = next;
    }
}
