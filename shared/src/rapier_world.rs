//! Rapier-backed physics world for the garden scene.
//!
//! Owns the full set of Rapier structures (bodies, colliders, broad/narrow phase, solver
//! state) and implements [`PhysicsBackend`] so the character controller can drive it.
//!
//! Design goals
//! - Deterministic: given the same defs in the same order, build identical sets.
//! - One query path: rays go through a borrowed `QueryPipeline` built from the broad phase,
//!   with the controller's predicate layered on top of Rapier's own filter.
//! - Scene tags travel in `user_data` so filters never need a side table.

// Re-export Rapier so the client can name handles without depending on `rapier3d` directly.
pub use rapier3d;

use rapier3d::{na::Translation3, prelude::*};
use tracing::debug;

use crate::{
    bitmask_flags::{ControlMode, SceneTags},
    config::ControllerConfig,
    physics::{BodyKind, BodySnapshot, PhysicsBackend, Point3, Quat, RayHit, RayQuery, Vec3},
};

/// Standard gravity (m/s^2).
pub const GRAVITY: f32 = 9.81;

/// Collider shapes the scene uses. Y-aligned shapes use Rapier's half-height convention.
#[derive(Clone, Debug)]
pub enum ShapeDef {
    /// Infinite plane through the body origin, normal `rotation * +Y`.
    Plane,
    Cuboid { half_extents: Vec3 },
    Sphere { radius: f32 },
    CapsuleY { radius: f32, half_height: f32 },
    CylinderY { radius: f32, half_height: f32 },
    ConeY { radius: f32, half_height: f32 },
    RoundCuboid { half_extents: Vec3, border_radius: f32 },
}

impl ShapeDef {
    fn builder(&self) -> ColliderBuilder {
        match self {
            ShapeDef::Plane => ColliderBuilder::halfspace(Vector::y_axis()),
            ShapeDef::Cuboid { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            ShapeDef::Sphere { radius } => ColliderBuilder::ball(*radius),
            ShapeDef::CapsuleY {
                radius,
                half_height,
            } => ColliderBuilder::capsule_y(*half_height, *radius),
            ShapeDef::CylinderY {
                radius,
                half_height,
            } => ColliderBuilder::cylinder(*half_height, *radius),
            ShapeDef::ConeY {
                radius,
                half_height,
            } => ColliderBuilder::cone(*half_height, *radius),
            ShapeDef::RoundCuboid {
                half_extents,
                border_radius,
            } => ColliderBuilder::round_cuboid(
                half_extents.x,
                half_extents.y,
                half_extents.z,
                *border_radius,
            ),
        }
    }
}

/// One body with a single collider.
#[derive(Clone, Debug)]
pub struct BodyDef {
    pub kind: BodyKind,
    pub translation: Vec3,
    pub rotation: Quat,
    pub shape: ShapeDef,
    pub linvel: Vec3,
    pub angvel: Vec3,
    /// Only used by dynamic bodies.
    pub density: f32,
    pub friction: f32,
    pub tags: SceneTags,
}

impl BodyDef {
    pub fn new(kind: BodyKind, translation: Vec3, shape: ShapeDef) -> Self {
        Self {
            kind,
            translation,
            rotation: Quat::identity(),
            shape,
            linvel: Vec3::zeros(),
            angvel: Vec3::zeros(),
            density: 1.0,
            friction: 0.5,
            tags: SceneTags::default(),
        }
    }

    pub fn fixed(translation: Vec3, shape: ShapeDef) -> Self {
        Self::new(BodyKind::Fixed, translation, shape)
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_velocity(mut self, linvel: Vec3, angvel: Vec3) -> Self {
        self.linvel = linvel;
        self.angvel = angvel;
        self
    }

    pub fn with_tags(mut self, tags: SceneTags) -> Self {
        self.tags = tags;
        self
    }
}

/// Handles of a spawned character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharacterHandles {
    pub body: RigidBodyHandle,
    pub capsule: ColliderHandle,
    /// Point-to-move wall sensor.
    pub sensor: Option<ColliderHandle>,
}

pub struct PhysicsWorld {
    pub gravity: Vector<f32>,
    pub integration_parameters: IntegrationParameters,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub broad_phase: BroadPhaseBvh,
    pub narrow_phase: NarrowPhase,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, -GRAVITY, 0.0],
            integration_parameters: IntegrationParameters::default(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
        }
    }

    /// Advance the simulation by `dt` seconds. Non-positive steps are skipped.
    pub fn step(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &(),
        );
    }

    /// Insert a body with its collider. Returns both handles.
    pub fn spawn(&mut self, def: &BodyDef) -> (RigidBodyHandle, ColliderHandle) {
        let iso = Isometry::from_parts(Translation3::from(def.translation), def.rotation);
        let builder = match def.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
        };
        let rb = builder
            .pose(iso)
            .linvel(def.linvel)
            .angvel(def.angvel)
            .user_data(def.tags.to_user_data())
            .build();
        let body = self.bodies.insert(rb);

        let collider = def
            .shape
            .builder()
            .density(def.density)
            .friction(def.friction)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        (body, collider)
    }

    /// Spawn the floating capsule. Rotation stays free only when auto-balance drives it.
    pub fn spawn_character(&mut self, cfg: &ControllerConfig, position: Vec3) -> CharacterHandles {
        let free = cfg.balance.enabled;
        let rb = RigidBodyBuilder::dynamic()
            .translation(position)
            .enabled_rotations(free, free, free)
            .ccd_enabled(true)
            // Only the visibility path may put the character to sleep.
            .can_sleep(false)
            .build();
        let body = self.bodies.insert(rb);

        let capsule = ColliderBuilder::capsule_y(cfg.capsule.half_height, cfg.capsule.radius)
            .friction(0.0)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .build();
        let capsule = self
            .colliders
            .insert_with_parent(capsule, body, &mut self.bodies);

        let sensor = cfg
            .has_mode(ControlMode::PointToMove)
            .then(|| {
                let [half_height, radius] = cfg.body_sensor_size();
                let sensor = ColliderBuilder::cylinder(half_height, radius)
                    .translation(cfg.body_sensor_position())
                    .sensor(true)
                    .density(0.0)
                    .build();
                self.colliders
                    .insert_with_parent(sensor, body, &mut self.bodies)
            });

        debug!(?position, sensor = sensor.is_some(), "spawned character body");
        CharacterHandles {
            body,
            capsule,
            sensor,
        }
    }

    /// Remove a body and everything attached to it.
    pub fn despawn(&mut self, body: RigidBodyHandle) {
        self.bodies.remove(
            body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Drive a kinematic body's velocity.
    pub fn set_kinematic_velocity(&mut self, body: RigidBodyHandle, linvel: Vec3, angvel: Vec3) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_linvel(linvel, true);
            rb.set_angvel(angvel, true);
        }
    }

    pub fn position(&self, body: RigidBodyHandle) -> Option<Isometry<f32>> {
        self.bodies.get(body).map(|rb| *rb.position())
    }

    /// Body to write velocity into. A sleeping body only takes writes that also wake it,
    /// otherwise the velocity would sit there until the next wake and release at once.
    fn writable_body(&mut self, body: RigidBodyHandle, wake: bool) -> Option<&mut RigidBody> {
        self.bodies
            .get_mut(body)
            .filter(|rb| wake || !rb.is_sleeping())
    }
}

fn body_kind(kind: RigidBodyType) -> BodyKind {
    match kind {
        RigidBodyType::Dynamic => BodyKind::Dynamic,
        RigidBodyType::Fixed => BodyKind::Fixed,
        RigidBodyType::KinematicPositionBased | RigidBodyType::KinematicVelocityBased => {
            BodyKind::Kinematic
        }
    }
}

impl PhysicsBackend for PhysicsWorld {
    type BodyId = RigidBodyHandle;
    type ColliderId = ColliderHandle;

    fn body(&self, body: RigidBodyHandle) -> Option<BodySnapshot> {
        let rb = self.bodies.get(body)?;
        Some(BodySnapshot {
            translation: *rb.translation(),
            rotation: *rb.rotation(),
            linvel: *rb.linvel(),
            angvel: *rb.angvel(),
            mass: rb.mass(),
            gravity_scale: rb.gravity_scale(),
            kind: body_kind(rb.body_type()),
        })
    }

    fn collider_parent(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.colliders.get(collider)?.parent()
    }

    fn collider_tags(&self, collider: ColliderHandle) -> SceneTags {
        let Some(c) = self.colliders.get(collider) else {
            return SceneTags::default();
        };
        let parent = c
            .parent()
            .and_then(|p| self.bodies.get(p))
            .map(|rb| rb.user_data)
            .unwrap_or(0);
        SceneTags::from_user_data(c.user_data | parent)
    }

    fn cast_ray(
        &self,
        query: &RayQuery<RigidBodyHandle>,
        predicate: &dyn Fn(ColliderHandle) -> bool,
    ) -> Option<RayHit<ColliderHandle>> {
        let accept = |handle: ColliderHandle, _: &Collider| predicate(handle);
        let mut filter = QueryFilter::default().predicate(&accept);
        if query.exclude_sensors {
            filter = filter.exclude_sensors();
        }
        if let Some(body) = query.exclude_body {
            filter = filter.exclude_rigid_body(body);
        }

        let pipeline = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );
        let ray = Ray::new(query.origin, query.dir);
        pipeline
            .cast_ray_and_get_normal(&ray, query.max_distance, query.solid)
            .map(|(collider, hit)| RayHit {
                distance: hit.time_of_impact,
                collider,
                normal: hit.normal,
            })
    }

    /// Solver impulses from the last step, converted to a force on `body`.
    fn contact_force(&self, body: RigidBodyHandle) -> Vec3 {
        let Some(rb) = self.bodies.get(body) else {
            return Vec3::zeros();
        };
        let dt = self.integration_parameters.dt;
        if dt <= 0.0 {
            return Vec3::zeros();
        }
        let mut impulse = Vec3::zeros();
        for &collider in rb.colliders() {
            for pair in self.narrow_phase.contact_pairs_with(collider) {
                // The solver pushes collider2 along the manifold normal, collider1 against it.
                if pair.collider1 == collider {
                    impulse -= pair.total_impulse();
                } else {
                    impulse += pair.total_impulse();
                }
            }
        }
        impulse / dt
    }

    fn sensor_touching(&self, sensor: ColliderHandle) -> bool {
        self.narrow_phase
            .intersection_pairs_with(sensor)
            .any(|(_, _, intersecting)| intersecting)
    }

    fn is_sleeping(&self, body: RigidBodyHandle) -> bool {
        self.bodies.get(body).is_some_and(|rb| rb.is_sleeping())
    }

    fn apply_impulse(&mut self, body: RigidBodyHandle, impulse: Vec3, wake: bool) {
        if let Some(rb) = self.writable_body(body, wake) {
            rb.apply_impulse(impulse, wake);
        }
    }

    fn apply_impulse_at_point(
        &mut self,
        body: RigidBodyHandle,
        impulse: Vec3,
        point: Point3,
        wake: bool,
    ) {
        if let Some(rb) = self.writable_body(body, wake) {
            rb.apply_impulse_at_point(impulse, point, wake);
        }
    }

    fn apply_torque_impulse(&mut self, body: RigidBodyHandle, torque: Vec3, wake: bool) {
        if let Some(rb) = self.writable_body(body, wake) {
            rb.apply_torque_impulse(torque, wake);
        }
    }

    fn set_linvel(&mut self, body: RigidBodyHandle, linvel: Vec3, wake: bool) {
        if let Some(rb) = self.writable_body(body, wake) {
            rb.set_linvel(linvel, wake);
        }
    }

    fn set_gravity_scale(&mut self, body: RigidBodyHandle, scale: f32, wake: bool) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_gravity_scale(scale, wake);
        }
    }

    fn set_rotation(&mut self, body: RigidBodyHandle, rotation: Quat, wake: bool) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_rotation(rotation, wake);
        }
    }

    fn enabled_rotations(&self, body: RigidBodyHandle) -> [bool; 3] {
        let Some(rb) = self.bodies.get(body) else {
            return [true; 3];
        };
        let locked = rb.locked_axes();
        [
            !locked.contains(LockedAxes::ROTATION_LOCKED_X),
            !locked.contains(LockedAxes::ROTATION_LOCKED_Y),
            !locked.contains(LockedAxes::ROTATION_LOCKED_Z),
        ]
    }

    fn set_enabled_rotations(&mut self, body: RigidBodyHandle, enabled: [bool; 3], wake: bool) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_enabled_rotations(enabled[0], enabled[1], enabled[2], wake);
        }
    }

    /// Freeze the body in place. Bodies built with `can_sleep(false)` would be woken again by
    /// the island manager on the next step, so the activation is swapped for a sleeping one.
    fn sleep(&mut self, body: RigidBodyHandle) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_linvel(Vec3::zeros(), false);
            rb.set_angvel(Vec3::zeros(), false);
            *rb.activation_mut() = RigidBodyActivation::inactive();
        }
    }

    fn wake_up(&mut self, body: RigidBodyHandle) {
        if let Some(rb) = self.bodies.get_mut(body) {
            if rb.is_sleeping() {
                *rb.activation_mut() = RigidBodyActivation::cannot_sleep();
            }
            rb.wake_up(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmask_flags::SceneTag;

    fn world_with_floor() -> (PhysicsWorld, RigidBodyHandle) {
        let mut world = PhysicsWorld::new();
        let (floor, _) = world.spawn(&BodyDef::fixed(
            Vec3::zeros(),
            ShapeDef::Cuboid {
                half_extents: Vec3::new(20.0, 0.5, 20.0),
            },
        ));
        // Populate the broad phase so queries see the statics.
        world.step(1.0 / 60.0);
        (world, floor)
    }

    fn down_from(y: f32) -> RayQuery<RigidBodyHandle> {
        RayQuery {
            origin: Point3::new(0.0, y, 0.0),
            dir: -Vec3::y(),
            max_distance: 10.0,
            solid: false,
            exclude_sensors: true,
            exclude_body: None,
        }
    }

    #[test]
    fn ray_hits_floor_top_with_up_normal() {
        let (world, _) = world_with_floor();
        let hit = world.cast_ray(&down_from(3.0), &|_| true).unwrap();
        assert!((hit.distance - 2.5).abs() < 1.0e-4);
        assert!((hit.normal - Vec3::y()).norm() < 1.0e-4);
    }

    #[test]
    fn tagged_colliders_can_be_filtered_out() {
        let mut world = PhysicsWorld::new();
        world.spawn(
            &BodyDef::fixed(
                Vec3::new(0.0, 1.0, 0.0),
                ShapeDef::Cuboid {
                    half_extents: Vec3::new(1.0, 0.1, 1.0),
                },
            )
            .with_tags(SceneTags::of(&[SceneTag::ExcludeCharacterRay])),
        );
        world.spawn(&BodyDef::fixed(
            Vec3::zeros(),
            ShapeDef::Cuboid {
                half_extents: Vec3::new(5.0, 0.5, 5.0),
            },
        ));
        world.step(1.0 / 60.0);

        let skip_tagged = |c: ColliderHandle| {
            !world
                .collider_tags(c)
                .has(SceneTag::ExcludeCharacterRay)
        };
        let hit = world.cast_ray(&down_from(3.0), &skip_tagged).unwrap();
        // Passes through the tagged slab at y=1.1 and lands on the floor top.
        assert!((hit.distance - 2.5).abs() < 1.0e-4);
    }

    #[test]
    fn own_body_is_excluded() {
        let (mut world, _) = world_with_floor();
        let cfg = ControllerConfig::default();
        let handles = world.spawn_character(&cfg, Vec3::new(0.0, 2.0, 0.0));
        world.step(1.0 / 60.0);

        let mut query = down_from(2.0);
        query.exclude_body = Some(handles.body);
        let hit = world.cast_ray(&query, &|_| true).unwrap();
        assert!(world.collider_parent(hit.collider) != Some(handles.body));
    }

    #[test]
    fn snapshot_reports_kind_and_tags() {
        let mut world = PhysicsWorld::new();
        let (body, collider) = world.spawn(
            &BodyDef::new(
                BodyKind::Kinematic,
                Vec3::zeros(),
                ShapeDef::Sphere { radius: 1.0 },
            )
            .with_velocity(Vec3::x(), Vec3::zeros())
            .with_tags(SceneTags::of(&[SceneTag::ExcludeCameraCollision])),
        );
        let snap = world.body(body).unwrap();
        assert_eq!(snap.kind, BodyKind::Kinematic);
        assert!((snap.linvel - Vec3::x()).norm() < 1.0e-6);
        assert!(world
            .collider_tags(collider)
            .has(SceneTag::ExcludeCameraCollision));
    }

    #[test]
    fn point_to_move_character_gets_a_sensor() {
        let mut world = PhysicsWorld::new();
        let mut cfg = ControllerConfig::default();
        assert!(world.spawn_character(&cfg, Vec3::zeros()).sensor.is_none());

        cfg.modes = crate::config::parse_modes("PointToMove").unwrap();
        let handles = world.spawn_character(&cfg, Vec3::new(5.0, 0.0, 0.0));
        let sensor = handles.sensor.unwrap();
        assert!(world.colliders[sensor].is_sensor());
    }

    #[test]
    fn locked_rotations_round_trip() {
        let mut world = PhysicsWorld::new();
        let handles = world.spawn_character(&ControllerConfig::default(), Vec3::zeros());
        assert_eq!(world.enabled_rotations(handles.body), [true; 3]);
        world.set_enabled_rotations(handles.body, [false, true, false], false);
        assert_eq!(world.enabled_rotations(handles.body), [false, true, false]);
    }
}
