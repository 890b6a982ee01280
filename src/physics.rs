// src/physics.rs

use rapier3d::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::autopilot::stabilizer::GroundRay;
use crate::autopilot::{Pos3, Rot3, Vec3, VehicleBody, VehicleId};

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);
const GROUP_FINISH: Group = Group::from_bits_truncate(0b0100);

pub struct ChassisConfig {
    pub mass: f32,                      // kg
    pub linear_damping: f32,            // drag
    pub angular_damping: f32,           // rotational drag
    pub half_extents: [f32; 3],         // [hx, hy, hz]
    pub com_offset: [f32; 3],           // local offset from collider center
    pub grip: f32,                      // u/s², max change of planar velocity
}

pub const RACER_CHASSIS: ChassisConfig = ChassisConfig {
    mass: 1200.0,
    linear_damping: 0.08,
    angular_damping: 0.6,
    half_extents: [1.0, 0.35, 2.1],
    com_offset: [0.0, -0.15, 0.0],      // slightly below visual center
    grip: 300.0,
};

/// Sensor `Started` events between the finish line and anything else,
/// collected while the pipeline steps.
#[derive(Default)]
struct FinishLineEvents {
    started: Mutex<Vec<(ColliderHandle, ColliderHandle)>>,
}

impl EventHandler for FinishLineEvents {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if event.started() && event.sensor() {
            if let Ok(mut started) = self.started.lock() {
                started.push((event.collider1(), event.collider2()));
            }
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>, // gravity vector
    pub pipeline: PhysicsPipeline, // physics pipeline
    pub island_manager: IslandManager, // manages islands of bodies
    pub broad_phase: DefaultBroadPhase, // broad-phase collision detection
    pub narrow_phase: NarrowPhase, // collision detection
    pub bodies: RigidBodySet, // for rigid bodies
    pub colliders: ColliderSet, // for collision shapes
    pub joints: ImpulseJointSet, // for constraints
    pub multibody_joints: MultibodyJointSet,// for articulated bodies
    pub ccd: CCDSolver, // continuous collision detection
    pub query_pipeline: QueryPipeline, // for raycasting
    pub chassis: HashMap<VehicleId, RigidBodyHandle>, // vehicle → chassis body
    collider_to_vehicle: HashMap<ColliderHandle, VehicleId>, // chassis collider → vehicle
    finish_line: Option<ColliderHandle>,
    events: FinishLineEvents,
    world_limit: Real,
    dt: Real, // current tick
}

impl PhysicsWorld {
    /// Flat static ground whose top surface is y = 0.
    pub fn new(ground_half_extents: [f32; 2]) -> Self {
        let gravity = vector![0.0, -9.81, 0.0];
        let [gx, gz] = ground_half_extents;

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        let ground_rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let ground_handle = bodies.insert(ground_rb);

        let ground_collider = ColliderBuilder::cuboid(gx, 1.0, gz)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        log::info!("Ground inserted ({} x {}). Bodies = {}, Colliders = {}", gx * 2.0, gz * 2.0, bodies.len(), colliders.len());

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            chassis: HashMap::new(),
            collider_to_vehicle: HashMap::new(),
            finish_line: None,
            events: FinishLineEvents::default(),
            world_limit: gx.max(gz) * 2.0,
            dt: 1.0 / 60.0,
        }
    }

    /// Static sensor box; chassis entering it count as finish-line crossings.
    pub fn add_finish_line(&mut self, center: [f32; 3], half_extents: [f32; 3]) {
        let rb = RigidBodyBuilder::fixed()
            .translation(vector![center[0], center[1], center[2]])
            .build();
        let handle = self.bodies.insert(rb);

        let [hx, hy, hz] = half_extents;
        let sensor = ColliderBuilder::cuboid(hx, hy, hz)
            .sensor(true)
            .collision_groups(InteractionGroups::new(GROUP_FINISH, GROUP_CHASSIS))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.finish_line = Some(self.colliders.insert_with_parent(sensor, handle, &mut self.bodies));
    }

    /// Dynamic box chassis for one vehicle.
    pub fn spawn_vehicle(&mut self, id: VehicleId, position: Pos3, heading: Rot3) -> RigidBodyHandle {
        let config = RACER_CHASSIS;
        let [hx, hy, hz] = config.half_extents;
        let [cx, cy, cz] = config.com_offset;
        let volume = 8.0 * hx * hy * hz;
        let density = config.mass / volume; // ρ = m / V

        let rb = RigidBodyBuilder::dynamic()
            .position(Isometry::from_parts(position.coords.into(), heading))
            .linear_damping(config.linear_damping)
            .angular_damping(config.angular_damping)
            .ccd_enabled(true)
            .build();

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![cx, cy, cz])
            .collision_groups(InteractionGroups::new(
                GROUP_CHASSIS,
                GROUP_GROUND | GROUP_CHASSIS | GROUP_FINISH,
            ))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .density(density)
            .friction(0.0)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        let collider = self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.chassis.insert(id, handle);
        self.collider_to_vehicle.insert(collider, id);

        log::info!("Spawned chassis for {} at {:?} (body = {:?})", id, position, handle);
        handle
    }

    /// Clears last tick's forces and refreshes the ray-cast acceleration
    /// structure. Call before any controller runs.
    pub fn begin_tick(&mut self, dt: Real) {
        if dt > 0.0 {
            self.dt = dt;
        }
        for handle in self.chassis.values() {
            if let Some(body) = self.bodies.get_mut(*handle) {
                body.reset_forces(false);
            }
        }
        self.query_pipeline.update(&self.colliders);
    }

    /// The `VehicleBody` view of one chassis.
    pub fn vehicle(&mut self, id: VehicleId) -> Option<ChassisBody<'_>> {
        let handle = *self.chassis.get(&id)?;
        self.bodies.get(handle)?;
        Some(ChassisBody {
            handle,
            dt: self.dt,
            bodies: &mut self.bodies,
            colliders: &self.colliders,
            query: &self.query_pipeline,
        })
    }

    pub fn pose(&self, id: VehicleId) -> Option<(Pos3, Rot3)> {
        let body = self.bodies.get(*self.chassis.get(&id)?)?;
        Some((Pos3::from(*body.translation()), *body.rotation()))
    }

    /// Steps the simulation and returns the vehicles that entered the finish
    /// line during this step, in event order.
    pub fn step(&mut self, dt: Real) -> Vec<VehicleId> {
        let hooks = ();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &self.events,
        );

        // Safety: prevent bodies from exploding to insane coordinates
        let limit = self.world_limit;
        for (handle, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !pos.iter().all(|c| c.is_finite()) || pos.iter().any(|c| c.abs() > limit);

            if bad {
                body.set_translation(vector![0.0, 2.0, 0.0], true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                log::warn!("Reset exploding body {:?} (was at {:?})", handle, pos);
            }
        }

        self.drain_crossings()
    }

    fn drain_crossings(&mut self) -> Vec<VehicleId> {
        let Some(finish) = self.finish_line else {
            return Vec::new();
        };
        let pairs = match self.events.started.lock() {
            Ok(mut started) => std::mem::take(&mut *started),
            Err(_) => return Vec::new(),
        };

        pairs
            .into_iter()
            .filter_map(|(a, b)| {
                let other = if a == finish { b } else if b == finish { a } else { return None };
                self.collider_to_vehicle.get(&other).copied()
            })
            .collect()
    }
}

/// Split borrow of the world around one chassis: the body is mutable, the
/// scene is read-only for ground ray casts.
///
/// Moves are driven through the velocity, not by teleporting: the planar
/// velocity heads for the commanded displacement but may change by at most
/// `grip * dt` per tick, so in a hard turn the chassis slides and its
/// velocity lags the heading. Vertical motion stays with the solver.
pub struct ChassisBody<'a> {
    handle: RigidBodyHandle,
    dt: Real,
    bodies: &'a mut RigidBodySet,
    colliders: &'a ColliderSet,
    query: &'a QueryPipeline,
}

impl ChassisBody<'_> {
    fn body(&self) -> &RigidBody {
        &self.bodies[self.handle]
    }

    fn body_mut(&mut self) -> &mut RigidBody {
        &mut self.bodies[self.handle]
    }
}

impl VehicleBody for ChassisBody<'_> {
    fn position(&self) -> Pos3 {
        Pos3::from(*self.body().translation())
    }

    fn rotation(&self) -> Rot3 {
        *self.body().rotation()
    }

    fn linear_velocity(&self) -> Vec3 {
        *self.body().linvel()
    }

    fn cast_ground_ray(&self, ray: &GroundRay) -> bool {
        let filter = QueryFilter::default()
            .groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .exclude_sensors()
            .exclude_rigid_body(self.handle);

        self.query
            .cast_ray(&*self.bodies, self.colliders, &Ray::new(ray.origin, ray.dir), ray.max_len, true, filter)
            .is_some()
    }

    fn add_force(&mut self, force: Vec3) {
        self.body_mut().add_force(force, true);
    }

    fn set_rotation(&mut self, rotation: Rot3) {
        self.body_mut().set_rotation(rotation, true);
    }

    fn move_position(&mut self, position: Pos3) {
        let dt = self.dt;
        let max_dv = RACER_CHASSIS.grip * dt;
        let body = self.body_mut();

        let current = *body.linvel();
        let mut wanted = (position.coords - body.translation()) / dt;
        wanted.y = current.y;

        let mut dv = wanted - current;
        let norm = dv.norm();
        if norm > max_dv {
            dv *= max_dv / norm;
        }
        body.set_linvel(current + dv, true);
    }
}
