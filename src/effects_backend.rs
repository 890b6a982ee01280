// ==============================================================================
// effects_backend.rs - IN-PROCESS EFFECT REGISTRY
// ------------------------------------------------------------------------------
// Stands in for a renderer. Each registered vehicle owns four emitters named
// `<vehicle>/<emitter>`; their on/off state is kept here and mirrored into
// snapshots so spectators can draw skid marks and smoke.
// ==============================================================================

use std::collections::HashMap;

use serde::Serialize;

use crate::autopilot::effects::TireEffects;
use crate::autopilot::{EffectBackend, EffectHandle, Real};

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmitterState {
    pub name: String,
    pub trail_time: Real, // s
    pub emitting: bool,   // trails
    pub playing: bool,    // particle systems
}

#[derive(Debug, Default)]
pub struct SceneEffects {
    names: HashMap<String, EffectHandle>,
    emitters: Vec<EmitterState>,
}

impl SceneEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the four emitters for `owner`. Registering twice is a no-op.
    pub fn register_vehicle(&mut self, owner: &str) {
        for emitter in TireEffects::EMITTERS {
            let name = format!("{owner}/{emitter}");
            if self.names.contains_key(&name) {
                continue;
            }
            let handle = EffectHandle(self.emitters.len() as u32);
            self.emitters.push(EmitterState { name: name.clone(), ..EmitterState::default() });
            self.names.insert(name, handle);
        }
    }

    #[cfg(test)]
    pub fn get(&self, handle: EffectHandle) -> Option<&EmitterState> {
        self.emitters.get(handle.0 as usize)
    }

    /// Emitters of `owner` that are currently active, in registration order.
    pub fn active_for(&self, owner: &str) -> Vec<&str> {
        let prefix = format!("{owner}/");
        self.emitters
            .iter()
            .filter(|e| e.name.starts_with(&prefix) && (e.emitting || e.playing))
            .map(|e| e.name.as_str())
            .collect()
    }

    fn slot(&mut self, handle: EffectHandle) -> Option<&mut EmitterState> {
        let slot = self.emitters.get_mut(handle.0 as usize);
        if slot.is_none() {
            log::warn!("Unknown effect handle {:?}", handle);
        }
        slot
    }
}

impl EffectBackend for SceneEffects {
    fn resolve(&self, name: &str) -> Option<EffectHandle> {
        self.names.get(name).copied()
    }

    fn set_trail_time(&mut self, trail: EffectHandle, seconds: Real) {
        if let Some(e) = self.slot(trail) {
            e.trail_time = seconds;
        }
    }

    fn set_trail_emitting(&mut self, trail: EffectHandle, emitting: bool) {
        if let Some(e) = self.slot(trail) {
            e.emitting = emitting;
        }
    }

    fn play_particles(&mut self, smoke: EffectHandle) {
        if let Some(e) = self.slot(smoke) {
            e.playing = true;
        }
    }

    fn stop_particles(&mut self, smoke: EffectHandle) {
        if let Some(e) = self.slot(smoke) {
            e.playing = false;
        }
    }
}
