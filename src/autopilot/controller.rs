// ==============================================================================
// controller.rs - PER-VEHICLE AUTOPILOT
// ------------------------------------------------------------------------------
// Per tick, once the start signal has passed:
//   1) stabilise   ground ray -> downforce / airborne force, tilt correction
//   2) speed       accelerate or brake (uses last tick's braking flag)
//   3) navigate    steer + move towards the current waypoint, maybe advance
//   4) effects     skid state machine from heading vs body velocity
//   5) braking     rescan braking zones for the next tick
//
// Lap counting is not done here: finish-line crossings go to the RaceSession.
// ==============================================================================

use std::sync::Arc;

use crate::autopilot::body::VehicleBody;
use crate::autopilot::braking::BrakingZoneDetector;
use crate::autopilot::config::ControllerConfig;
use crate::autopilot::effects::{EffectBackend, EffectStateMachine, SkidState, TireEffects};
use crate::autopilot::error::ConfigError;
use crate::autopilot::navigator::WaypointNavigator;
use crate::autopilot::speed::SpeedController;
use crate::autopilot::stabilizer::{GroundRay, GroundStabilizer};
use crate::autopilot::track::WaypointTrack;
use crate::autopilot::types::{Pos3, Real, TickContext, VehicleId, forward};

/// What happened to one vehicle during a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub grounded: bool,
    pub ground_ray: GroundRay,
    pub target: Pos3,
    pub advanced_to: Option<usize>,
    pub skid: Option<SkidState>,
    pub braking_changed: bool,
}

pub struct VehicleController {
    id: VehicleId,
    name: String,
    track: Arc<WaypointTrack>,

    stabilizer: GroundStabilizer,
    speed: SpeedController,
    navigator: WaypointNavigator,
    braking: BrakingZoneDetector,
    effects: EffectStateMachine,

    grounded: bool,
}

impl VehicleController {
    /// Validates the config and wires the effect emitters named `<name>/...`.
    pub fn new(
        id: VehicleId,
        name: impl Into<String>,
        cfg: &ControllerConfig,
        track: Arc<WaypointTrack>,
        backend: &mut dyn EffectBackend,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        cfg.validate()?;
        let rig = TireEffects::wire(&name, backend)?;

        Ok(Self {
            id,
            name,
            track,
            stabilizer: GroundStabilizer::new(cfg),
            speed: SpeedController::new(cfg),
            navigator: WaypointNavigator::new(cfg),
            braking: BrakingZoneDetector::default(),
            effects: EffectStateMachine::new(cfg, rig, backend),
            grounded: true,
        })
    }

    pub fn tick(
        &mut self,
        body: &mut dyn VehicleBody,
        ctx: &TickContext,
        backend: &mut dyn EffectBackend,
    ) -> Option<TickReport> {
        if !ctx.started() {
            return None;
        }
        let dt = ctx.dt;

        // 1) ground + tilt
        let rotation = body.rotation();
        let ground_ray = self.stabilizer.ray(&body.position(), &rotation);
        let grounded = body.cast_ground_ray(&ground_ray);
        let correction = self.stabilizer.correct(grounded, &rotation, self.speed.speed(), dt);

        body.add_force(correction.force);
        if let Some(level) = correction.rotation {
            log::trace!("{} tilt {:.1}deg, correcting", self.name, correction.tilt_deg);
            body.set_rotation(level);
        }
        if grounded != self.grounded {
            log::debug!("{} {}", self.name, if grounded { "landed" } else { "airborne" });
            self.grounded = grounded;
        }

        // 2) speed
        let speed = self.speed.update(self.braking.is_braking(), dt);

        // 3) steer + move
        let step = self
            .navigator
            .step(&body.position(), &body.rotation(), speed, dt, &self.track);
        body.set_rotation(step.rotation);
        body.move_position(step.position);
        if let Some(next) = step.advanced_to {
            log::debug!("{} -> waypoint {}", self.name, next);
        }

        // 4) effects
        let skid = self
            .effects
            .update(&forward(&step.rotation), &body.linear_velocity(), backend);
        if let Some(state) = skid {
            log::debug!("{} {:?}", self.name, state);
        }

        // 5) braking zones for next tick
        let braking_changed = self.braking.scan(&step.position, &self.track);
        if braking_changed {
            log::debug!("{} braking={}", self.name, self.braking.is_braking());
        }

        Some(TickReport {
            grounded,
            ground_ray,
            target: step.target,
            advanced_to: step.advanced_to,
            skid,
            braking_changed,
        })
    }

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn track(&self) -> &Arc<WaypointTrack> {
        &self.track
    }

    pub fn speed(&self) -> Real {
        self.speed.speed()
    }

    pub fn waypoint_index(&self) -> usize {
        self.navigator.index()
    }

    pub fn is_braking(&self) -> bool {
        self.braking.is_braking()
    }

    pub fn is_skidding(&self) -> bool {
        self.effects.is_skidding()
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::autopilot::config::CIRCUIT_RACER;
    use crate::autopilot::effects::tests::RecordingBackend;
    use crate::autopilot::types::{Rot3, Vec3};
    use approx::assert_relative_eq;
    use nalgebra::point;

    /// Kinematic stand-in for a rigid body.
    pub(crate) struct FakeBody {
        pub position: Pos3,
        pub rotation: Rot3,
        pub velocity: Vec3,
        pub ground: bool,
        pub forces: Vec<Vec3>,
    }

    impl FakeBody {
        pub(crate) fn at(position: Pos3) -> Self {
            Self {
                position,
                rotation: Rot3::identity(),
                velocity: Vec3::zeros(),
                ground: true,
                forces: Vec::new(),
            }
        }
    }

    impl VehicleBody for FakeBody {
        fn position(&self) -> Pos3 { self.position }
        fn rotation(&self) -> Rot3 { self.rotation }
        fn linear_velocity(&self) -> Vec3 { self.velocity }
        fn cast_ground_ray(&self, _ray: &GroundRay) -> bool { self.ground }
        fn add_force(&mut self, force: Vec3) { self.forces.push(force); }
        fn set_rotation(&mut self, rotation: Rot3) { self.rotation = rotation; }
        fn move_position(&mut self, position: Pos3) { self.position = position; }
    }

    fn square() -> Arc<WaypointTrack> {
        WaypointTrack::new(
            vec![
                point![0.0, 0.0, 200.0],
                point![200.0, 0.0, 200.0],
                point![200.0, 0.0, 0.0],
                point![0.0, 0.0, 0.0],
            ],
            vec![point![0.0, 0.0, 150.0]],
            10.0,
        )
        .unwrap()
    }

    fn ctx(elapsed: Real) -> TickContext {
        TickContext { dt: 1.0 / 60.0, elapsed, race_start: 0.0 }
    }

    fn controller(backend: &mut RecordingBackend) -> VehicleController {
        VehicleController::new(VehicleId(7), "car", &CIRCUIT_RACER, square(), backend).unwrap()
    }

    #[test]
    fn inert_before_start_signal() {
        let mut backend = RecordingBackend::with_owners(&["car"]);
        let mut ctl = controller(&mut backend);
        let mut body = FakeBody::at(point![0.0, 0.0, 0.0]);

        let early = TickContext { dt: 1.0 / 60.0, elapsed: 1.0, race_start: 3.0 };
        assert!(ctl.tick(&mut body, &early, &mut backend).is_none());
        assert_eq!(body.position, point![0.0, 0.0, 0.0]);
        assert!(body.forces.is_empty());
        assert_eq!(ctl.speed(), 0.0);
    }

    #[test]
    fn drives_towards_first_waypoint() {
        let mut backend = RecordingBackend::with_owners(&["car"]);
        let mut ctl = controller(&mut backend);
        let mut body = FakeBody::at(point![0.0, 0.0, 0.0]);

        for i in 0..60 {
            ctl.tick(&mut body, &ctx(i as Real / 60.0), &mut backend);
        }
        assert_relative_eq!(ctl.speed(), 400.0 / 7.0, epsilon = 0.01);
        // roughly half of v*t, all along +Z
        assert!(body.position.z > 25.0 && body.position.z < 32.0);
        assert_relative_eq!(body.position.x, 0.0, epsilon = 1e-3);
        assert_eq!(ctl.waypoint_index(), 0);
    }

    #[test]
    fn grounded_downforce_then_airborne_force() {
        let mut backend = RecordingBackend::with_owners(&["car"]);
        let mut ctl = controller(&mut backend);
        let mut body = FakeBody::at(point![0.0, 0.0, 0.0]);

        ctl.tick(&mut body, &ctx(0.0), &mut backend);
        // speed was 0 when the force was computed
        assert_relative_eq!(body.forces[0], Vec3::zeros());

        body.ground = false;
        let report = ctl.tick(&mut body, &ctx(0.1), &mut backend).unwrap();
        assert!(!report.grounded);
        assert!(!ctl.is_grounded());
        assert_relative_eq!(body.forces[1], Vec3::new(0.0, -80.0, 0.0));
    }

    #[test]
    fn braking_flag_applies_on_the_following_tick() {
        let mut backend = RecordingBackend::with_owners(&["car"]);
        let mut ctl = controller(&mut backend);
        ctl.speed.set_speed(300.0);

        // parked on the braking zone
        let mut body = FakeBody::at(point![0.0, 0.0, 150.0]);
        let first = ctl.tick(&mut body, &ctx(0.0), &mut backend).unwrap();
        assert!(first.braking_changed);
        assert!(ctl.is_braking());
        // not braking yet during the first tick: still at max accel from 300
        assert!(ctl.speed() > 300.0);

        body.position = point![0.0, 0.0, 150.0];
        let before = ctl.speed();
        ctl.tick(&mut body, &ctx(0.1), &mut backend);
        assert!(ctl.speed() < before);
        assert!(ctl.speed() >= 100.0);
    }

    #[test]
    fn skid_effects_follow_body_velocity() {
        let mut backend = RecordingBackend::with_owners(&["car"]);
        let mut ctl = controller(&mut backend);
        backend.calls.clear();
        let mut body = FakeBody::at(point![0.0, 0.0, 0.0]);

        body.velocity = Vec3::new(30.0, 0.0, 0.0); // sliding sideways
        for i in 0..5 {
            ctl.tick(&mut body, &ctx(i as Real * 0.1), &mut backend);
        }
        assert!(ctl.is_skidding());
        assert_eq!(backend.starts(), 2);

        body.velocity = Vec3::new(0.0, 0.0, 30.0);
        let report = ctl.tick(&mut body, &ctx(1.0), &mut backend).unwrap();
        assert_eq!(report.skid, Some(SkidState::Normal));
        assert_eq!(backend.stops(), 2);
    }

    #[test]
    fn laps_the_square() {
        let mut backend = RecordingBackend::with_owners(&["car"]);
        // tight enough turning circle to hit every 20u threshold on a 200u square
        let cfg = ControllerConfig {
            max_speed: 40.0,
            acceleration_time: 2.0,
            brake_speed: 10.0,
            turn_speed: 4.0,
            ..CIRCUIT_RACER
        };
        let mut ctl = VehicleController::new(VehicleId(3), "car", &cfg, square(), &mut backend).unwrap();
        let mut body = FakeBody::at(point![0.0, 0.0, 0.0]);

        let mut visited = Vec::new();
        for i in 0..60 * 60 {
            let report = ctl.tick(&mut body, &ctx(i as Real / 60.0), &mut backend).unwrap();
            if let Some(next) = report.advanced_to {
                visited.push(next);
            }
            assert!(ctl.waypoint_index() < 4);
        }
        assert!(visited.len() >= 8, "only advanced {visited:?}");
        for pair in visited.windows(2) {
            assert_eq!(pair[1], (pair[0] + 1) % 4);
        }
    }

    #[test]
    fn bad_config_or_wiring_fails_construction() {
        let mut backend = RecordingBackend::with_owners(&["car"]);
        let cfg = ControllerConfig { acceleration_time: 0.0, ..CIRCUIT_RACER };
        assert!(VehicleController::new(VehicleId(1), "car", &cfg, square(), &mut backend).is_err());

        let err = VehicleController::new(VehicleId(2), "ghost", &CIRCUIT_RACER, square(), &mut backend)
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::MissingEffect("ghost/left_skid".into()));
    }
}
