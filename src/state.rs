// ==============================================================================
// state.rs - RACE HOST STATE
// ------------------------------------------------------------------------------
// Owns the rapier world, the effect registry, one controller per car and the
// race session. One `step` is one fixed tick:
//
//   1) session clock advances, countdown announced
//   2) every controller ticks against its chassis (inert before the start)
//   3) physics steps
//   4) finish-line crossings from this step go to the session, in event order
//
// Snapshots of the result are broadcast to spectators.
// ==============================================================================

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::autopilot::controller::TickReport;
use crate::autopilot::race::Standing;
use crate::autopilot::{
    ConfigError, Pos3, Real, RaceEvent, RaceSession, TickContext, VehicleController, VehicleId, forward,
};
use crate::circuit::CircuitConfig;
use crate::countdown::{Announcement, Countdown};
use crate::effects_backend::SceneEffects;
use crate::physics::PhysicsWorld;

/// Ground ray and steering target of one car, last tick.
#[derive(Debug, Clone, Serialize)]
pub struct DebugOverlay {
    pub ray_origin: [Real; 3],
    pub ray_end: [Real; 3],
    pub grounded: bool,
    pub target: [Real; 3],
}

impl From<&TickReport> for DebugOverlay {
    fn from(r: &TickReport) -> Self {
        let end = r.ground_ray.origin + r.ground_ray.dir * r.ground_ray.max_len;
        Self {
            ray_origin: r.ground_ray.origin.into(),
            ray_end: end.into(),
            grounded: r.grounded,
            target: r.target.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub name: String,
    pub position: [Real; 3],
    pub forward: [Real; 3],
    pub speed: Real,
    pub waypoint: usize,
    pub braking: bool,
    pub skidding: bool,
    pub grounded: bool,
    pub laps: u32,
    pub finished: bool,
    pub effects: Vec<String>,
    pub debug: Option<DebugOverlay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session: Uuid,
    pub tick: u64,
    pub race_time: Real,
    pub started: bool,
    pub countdown: Option<Announcement>,
    pub complete: bool,
    pub vehicles: Vec<VehicleSnapshot>,
    pub standings: Vec<Standing>,
}

/// A race event for one car, as sent to spectators.
#[derive(Debug, Clone, Serialize)]
pub struct RaceUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub vehicle: VehicleId,
    #[serde(flatten)]
    pub event: RaceEvent,
}

/// Static track markers, sent once per spectator.
#[derive(Debug, Clone, Serialize)]
pub struct Welcome {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session: Uuid,
    pub circuit: String,
    pub lap_target: u32,
    pub waypoints: Vec<[Real; 3]>,
    pub braking_zones: Vec<[Real; 3]>,
    pub brake_radius: Real,
}

/// Final export: finishers in finishing order.
#[derive(Debug, Clone, Serialize)]
pub struct RaceResults {
    pub session: Uuid,
    pub circuit: String,
    pub lap_target: u32,
    pub complete: bool,
    pub standings: Vec<Standing>,
}

fn xyz(p: &Pos3) -> [Real; 3] {
    [p.x, p.y, p.z]
}

struct Racer {
    controller: VehicleController,
    last: Option<TickReport>,
}

pub struct RaceState {
    pub tick: u64,
    pub clients: Vec<UnboundedSender<String>>,
    circuit: String,
    physics: PhysicsWorld,
    effects: SceneEffects,
    racers: Vec<Racer>,
    session: RaceSession,
    countdown: Countdown,
}

impl RaceState {
    /// Builds the world and the grid. A car whose tuning or effect wiring is
    /// invalid is logged and left out; the race needs at least one car.
    pub fn build(circuit: &CircuitConfig) -> Result<Self, ConfigError> {
        circuit.validate()?;
        let track = circuit.track()?;

        let mut physics = PhysicsWorld::new(circuit.ground_half_extents);
        physics.add_finish_line(circuit.finish_line.center, circuit.finish_line.half_extents);

        let mut effects = SceneEffects::new();
        let mut session = RaceSession::new(circuit.lap_target, circuit.start_delay);
        let mut racers = Vec::with_capacity(circuit.vehicles.len());

        for (i, slot) in circuit.vehicles.iter().enumerate() {
            let id = VehicleId(i as u32 + 1);
            effects.register_vehicle(&slot.name);

            let cfg = circuit.controller_for(slot);
            let controller = match VehicleController::new(id, &slot.name, &cfg, track.clone(), &mut effects) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Skipping {} ({}): {}", slot.name, id, e);
                    continue;
                }
            };

            physics.spawn_vehicle(id, slot.position.into(), circuit.grid_heading(slot));
            session.enter(id, &slot.name);
            racers.push(Racer { controller, last: None });
        }

        if racers.is_empty() {
            return Err(ConfigError::NoVehicles);
        }

        log::info!(
            "Session {} on {}: {} cars, {} laps, start in {:.1}s",
            session.id(),
            circuit.name,
            racers.len(),
            circuit.lap_target,
            circuit.start_delay
        );

        Ok(Self {
            tick: 0,
            clients: Vec::new(),
            circuit: circuit.name.clone(),
            physics,
            effects,
            racers,
            countdown: Countdown::new(session.race_start()),
            session,
        })
    }

    pub fn session(&self) -> &RaceSession {
        &self.session
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) {
        self.clients.push(tx);
    }

    /// One fixed tick. Returns the race events it produced.
    pub fn step(&mut self, dt: Real) -> Vec<RaceUpdate> {
        let ctx = TickContext {
            dt,
            elapsed: self.session.advance(dt),
            race_start: self.session.race_start(),
        };
        if let Some(call) = self.countdown.update(ctx.elapsed) {
            log::info!("{}", call);
        }

        self.physics.begin_tick(dt);
        for racer in &mut self.racers {
            let id = racer.controller.id();
            let Some(mut body) = self.physics.vehicle(id) else {
                log::warn!("{} has no chassis", id);
                continue;
            };
            if let Some(report) = racer.controller.tick(&mut body, &ctx, &mut self.effects) {
                racer.last = Some(report);
            }
        }

        let crossings = self.physics.step(dt);

        let mut events = Vec::with_capacity(crossings.len());
        for id in crossings {
            match self.session.finish_line_crossed(id) {
                Ok(RaceEvent::NotStarted) => log::debug!("{} crossed before the start", id),
                Ok(event) => events.push(RaceUpdate { kind: "race", vehicle: id, event }),
                Err(e) => log::warn!("Finish line: {}", e),
            }
        }

        self.tick += 1;
        events
    }

    pub fn welcome(&self) -> Welcome {
        let track = self.racers.first().map(|r| r.controller.track().clone());
        Welcome {
            kind: "welcome",
            session: self.session.id(),
            circuit: self.circuit.clone(),
            lap_target: self.session.lap_target(),
            waypoints: track.iter().flat_map(|t| t.waypoints().iter().map(xyz)).collect(),
            braking_zones: track.iter().flat_map(|t| t.braking_zones().iter().map(xyz)).collect(),
            brake_radius: track.map(|t| t.brake_radius()).unwrap_or_default(),
        }
    }

    pub fn results(&self) -> RaceResults {
        RaceResults {
            session: self.session.id(),
            circuit: self.circuit.clone(),
            lap_target: self.session.lap_target(),
            complete: self.session.is_complete(),
            standings: self.session.standings(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let vehicles = self
            .racers
            .iter()
            .filter_map(|racer| {
                let ctl = &racer.controller;
                let (position, rotation) = self.physics.pose(ctl.id())?;
                let progress = self.session.progress(ctl.id());
                Some(VehicleSnapshot {
                    id: ctl.id(),
                    name: ctl.name().to_string(),
                    position: position.into(),
                    forward: forward(&rotation).into(),
                    speed: ctl.speed(),
                    waypoint: ctl.waypoint_index(),
                    braking: ctl.is_braking(),
                    skidding: ctl.is_skidding(),
                    grounded: ctl.is_grounded(),
                    laps: progress.map(|p| p.laps()).unwrap_or(0),
                    finished: progress.is_some_and(|p| p.is_finished()),
                    effects: self.effects.active_for(ctl.name()).into_iter().map(String::from).collect(),
                    debug: racer.last.as_ref().map(DebugOverlay::from),
                })
            })
            .collect();

        Snapshot {
            kind: "snapshot",
            session: self.session.id(),
            tick: self.tick,
            race_time: self.session.race_time(),
            started: self.session.has_started(),
            countdown: self.countdown.current(),
            complete: self.session.is_complete(),
            vehicles,
            standings: self.session.standings(),
        }
    }

    pub fn broadcast_updates(&mut self, updates: &[RaceUpdate]) {
        for update in updates {
            match serde_json::to_string(update) {
                Ok(json) => self.clients.retain(|tx| tx.send(json.clone()).is_ok()),
                Err(e) => log::error!("Race update serialisation failed: {}", e),
            }
        }
    }

    /// Sends the current snapshot to every spectator and drops the ones that
    /// have gone away.
    pub fn broadcast_snapshot(&mut self) {
        let json = match serde_json::to_string(&self.snapshot()) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Snapshot serialisation failed: {}", e);
                return;
            }
        };

        self.clients.retain(|tx| tx.send(json.clone()).is_ok());
    }
}
