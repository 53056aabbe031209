//! Narrow view of the rigid-body engine the controller drives.
//!
//! The controller never owns the physics world. It reads a [`BodySnapshot`] of its own body
//! (and of whatever it stands on), casts rays, and pushes impulses/velocities back through
//! [`PhysicsBackend`]. `rapier_world::PhysicsWorld` is the production implementation.
//!
//! Notes
//! - Every query returns an `Option`: a missing body or a missed ray is a normal state,
//!   not an error.
//! - `wake` arguments mirror Rapier's: writing to a sleeping body wakes it when `true`.

use std::fmt::Debug;

use nalgebra as na;

use crate::bitmask_flags::SceneTags;

pub type Vec3 = na::Vector3<f32>;
pub type Point3 = na::Point3<f32>;
pub type Quat = na::UnitQuaternion<f32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Fixed,
    Kinematic,
}

impl BodyKind {
    /// Dynamic and kinematic bodies carry the character along.
    #[inline]
    pub fn is_moving(self) -> bool {
        !matches!(self, BodyKind::Fixed)
    }
}

/// Copy of a body's state at query time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodySnapshot {
    pub translation: Vec3,
    pub rotation: Quat,
    pub linvel: Vec3,
    pub angvel: Vec3,
    pub mass: f32,
    pub gravity_scale: f32,
    pub kind: BodyKind,
}

impl BodySnapshot {
    /// Velocity of the point `at` on this body (linear + angular cross term).
    pub fn velocity_at_point(&self, at: &Vec3) -> Vec3 {
        self.linvel + self.angvel.cross(&(at - self.translation))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RayQuery<B> {
    pub origin: Point3,
    /// Unit direction.
    pub dir: Vec3,
    pub max_distance: f32,
    pub solid: bool,
    pub exclude_sensors: bool,
    pub exclude_body: Option<B>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit<C> {
    pub distance: f32,
    pub collider: C,
    /// Surface normal at the hit point.
    pub normal: Vec3,
}

pub trait PhysicsBackend {
    type BodyId: Copy + Eq + Debug;
    type ColliderId: Copy + Eq + Debug;

    fn body(&self, body: Self::BodyId) -> Option<BodySnapshot>;

    fn collider_parent(&self, collider: Self::ColliderId) -> Option<Self::BodyId>;

    /// Tags of the collider merged with the tags of its parent body.
    fn collider_tags(&self, collider: Self::ColliderId) -> SceneTags;

    /// Nearest hit accepted by `predicate`.
    fn cast_ray(
        &self,
        query: &RayQuery<Self::BodyId>,
        predicate: &dyn Fn(Self::ColliderId) -> bool,
    ) -> Option<RayHit<Self::ColliderId>>;

    /// Contact force currently pushing on `body` (N), if the backend reports contacts.
    fn contact_force(&self, _body: Self::BodyId) -> Vec3 {
        Vec3::zeros()
    }

    /// Whether `sensor` currently overlaps another collider.
    fn sensor_touching(&self, _sensor: Self::ColliderId) -> bool {
        false
    }

    /// Asleep bodies are frozen. Writes with `wake == false` leave them untouched.
    fn is_sleeping(&self, body: Self::BodyId) -> bool;

    fn apply_impulse(&mut self, body: Self::BodyId, impulse: Vec3, wake: bool);
    fn apply_impulse_at_point(&mut self, body: Self::BodyId, impulse: Vec3, point: Point3, wake: bool);
    fn apply_torque_impulse(&mut self, body: Self::BodyId, torque: Vec3, wake: bool);
    fn set_linvel(&mut self, body: Self::BodyId, linvel: Vec3, wake: bool);
    fn set_gravity_scale(&mut self, body: Self::BodyId, scale: f32, wake: bool);
    fn set_rotation(&mut self, body: Self::BodyId, rotation: Quat, wake: bool);
    fn enabled_rotations(&self, body: Self::BodyId) -> [bool; 3];
    fn set_enabled_rotations(&mut self, body: Self::BodyId, enabled: [bool; 3], wake: bool);
    fn sleep(&mut self, body: Self::BodyId);
    fn wake_up(&mut self, body: Self::BodyId);
}

#[cfg(test)]
pub(crate) mod mock {
    //! Deterministic stand-in: impulses integrate straight into velocities, rays come from
    //! a scripted table keyed by "which ray" (matched by origin offset from the body).

    use std::collections::HashMap;

    use super::*;

    #[derive(Clone, Debug)]
    pub struct MockBody {
        pub snapshot: BodySnapshot,
        pub impulses: Vec<(Vec3, Option<Point3>)>,
        pub torques: Vec<Vec3>,
        pub enabled_rotations: [bool; 3],
        pub sleeping: bool,
        pub tags: SceneTags,
    }

    #[derive(Clone, Copy, Debug)]
    pub struct MockCollider {
        pub parent: Option<u32>,
        pub tags: SceneTags,
    }

    /// Scripted ray result, matched by the sign of the ray origin's forward offset.
    #[derive(Clone, Copy, Debug)]
    pub struct ScriptedHit {
        pub distance: f32,
        pub collider: u32,
        pub normal: Vec3,
    }

    #[derive(Default)]
    pub struct MockPhysics {
        pub bodies: HashMap<u32, MockBody>,
        pub colliders: HashMap<u32, MockCollider>,
        /// Hit for rays cast from the body center column.
        pub ground_hit: Option<ScriptedHit>,
        /// Hit for rays cast from an origin displaced horizontally from the body.
        pub slope_hit: Option<ScriptedHit>,
        pub contact_force: Vec3,
        pub sensor_touching: bool,
        /// Every ray cast since the last `take_rays`.
        rays: std::cell::RefCell<Vec<RayQuery<u32>>>,
    }

    pub const CHARACTER: u32 = 1;
    pub const GROUND_BODY: u32 = 10;
    pub const GROUND_COLLIDER: u32 = 100;

    impl MockPhysics {
        pub fn with_character(mass: f32) -> Self {
            let mut physics = Self::default();
            physics.insert_body(
                CHARACTER,
                BodySnapshot {
                    translation: Vec3::new(0.0, 1.0, 0.0),
                    rotation: Quat::identity(),
                    linvel: Vec3::zeros(),
                    angvel: Vec3::zeros(),
                    mass,
                    gravity_scale: 1.0,
                    kind: BodyKind::Dynamic,
                },
            );
            physics.insert_body(
                GROUND_BODY,
                BodySnapshot {
                    translation: Vec3::zeros(),
                    rotation: Quat::identity(),
                    linvel: Vec3::zeros(),
                    angvel: Vec3::zeros(),
                    mass: 0.0,
                    gravity_scale: 1.0,
                    kind: BodyKind::Fixed,
                },
            );
            physics.colliders.insert(
                GROUND_COLLIDER,
                MockCollider {
                    parent: Some(GROUND_BODY),
                    tags: SceneTags::default(),
                },
            );
            physics
        }

        pub fn insert_body(&mut self, id: u32, snapshot: BodySnapshot) {
            self.bodies.insert(
                id,
                MockBody {
                    snapshot,
                    impulses: Vec::new(),
                    torques: Vec::new(),
                    enabled_rotations: [true; 3],
                    sleeping: false,
                    tags: SceneTags::default(),
                },
            );
        }

        /// Flat ground at `distance` below the ground ray origin, slope ray agreeing.
        pub fn flat_ground(&mut self, distance: f32) {
            let hit = ScriptedHit {
                distance,
                collider: GROUND_COLLIDER,
                normal: Vec3::y(),
            };
            self.ground_hit = Some(hit);
            self.slope_hit = Some(hit);
        }

        pub fn character(&self) -> &MockBody {
            &self.bodies[&CHARACTER]
        }

        pub fn character_mut(&mut self) -> &mut MockBody {
            self.bodies.get_mut(&CHARACTER).unwrap()
        }

        pub fn clear_log(&mut self) {
            for body in self.bodies.values_mut() {
                body.impulses.clear();
                body.torques.clear();
            }
            self.rays.borrow_mut().clear();
        }

        pub fn take_rays(&mut self) -> Vec<RayQuery<u32>> {
            self.rays.borrow_mut().drain(..).collect()
        }

        /// Rapier's rule: a waking write wakes the body, a quiet one skips a sleeping body.
        fn writable(&mut self, body: u32, wake: bool) -> Option<&mut MockBody> {
            let b = self.bodies.get_mut(&body)?;
            if wake {
                b.sleeping = false;
            }
            (!b.sleeping).then_some(b)
        }
    }

    impl PhysicsBackend for MockPhysics {
        type BodyId = u32;
        type ColliderId = u32;

        fn body(&self, body: u32) -> Option<BodySnapshot> {
            self.bodies.get(&body).map(|b| b.snapshot)
        }

        fn collider_parent(&self, collider: u32) -> Option<u32> {
            self.colliders.get(&collider).and_then(|c| c.parent)
        }

        fn collider_tags(&self, collider: u32) -> SceneTags {
            let Some(c) = self.colliders.get(&collider) else {
                return SceneTags::default();
            };
            let parent = c
                .parent
                .and_then(|p| self.bodies.get(&p))
                .map(|b| b.tags.bits)
                .unwrap_or(0);
            SceneTags::new(c.tags.bits | parent)
        }

        fn cast_ray(
            &self,
            query: &RayQuery<u32>,
            predicate: &dyn Fn(u32) -> bool,
        ) -> Option<RayHit<u32>> {
            self.rays.borrow_mut().push(*query);
            let center = query
                .exclude_body
                .and_then(|b| self.bodies.get(&b))
                .map(|b| b.snapshot.translation)
                .unwrap_or_else(Vec3::zeros);
            let offset = query.origin.coords - center;
            let planar = (offset.x * offset.x + offset.z * offset.z).sqrt();
            let scripted = if planar > 1.0e-4 {
                self.slope_hit
            } else {
                self.ground_hit
            }?;
            if scripted.distance > query.max_distance || !predicate(scripted.collider) {
                return None;
            }
            Some(RayHit {
                distance: scripted.distance,
                collider: scripted.collider,
                normal: scripted.normal,
            })
        }

        fn contact_force(&self, _body: u32) -> Vec3 {
            self.contact_force
        }

        fn sensor_touching(&self, _sensor: u32) -> bool {
            self.sensor_touching
        }

        fn is_sleeping(&self, body: u32) -> bool {
            self.bodies.get(&body).is_some_and(|b| b.sleeping)
        }

        fn apply_impulse(&mut self, body: u32, impulse: Vec3, wake: bool) {
            if let Some(b) = self.writable(body, wake) {
                b.impulses.push((impulse, None));
                if b.snapshot.kind == BodyKind::Dynamic && b.snapshot.mass > 0.0 {
                    b.snapshot.linvel += impulse / b.snapshot.mass;
                }
            }
        }

        fn apply_impulse_at_point(&mut self, body: u32, impulse: Vec3, point: Point3, wake: bool) {
            if let Some(b) = self.writable(body, wake) {
                b.impulses.push((impulse, Some(point)));
                if b.snapshot.kind == BodyKind::Dynamic && b.snapshot.mass > 0.0 {
                    b.snapshot.linvel += impulse / b.snapshot.mass;
                }
            }
        }

        fn apply_torque_impulse(&mut self, body: u32, torque: Vec3, wake: bool) {
            if let Some(b) = self.writable(body, wake) {
                b.torques.push(torque);
            }
        }

        fn set_linvel(&mut self, body: u32, linvel: Vec3, wake: bool) {
            if let Some(b) = self.writable(body, wake) {
                b.snapshot.linvel = linvel;
            }
        }

        fn set_gravity_scale(&mut self, body: u32, scale: f32, wake: bool) {
            if let Some(b) = self.bodies.get_mut(&body) {
                b.sleeping &= !wake;
                b.snapshot.gravity_scale = scale;
            }
        }

        fn set_rotation(&mut self, body: u32, rotation: Quat, wake: bool) {
            if let Some(b) = self.bodies.get_mut(&body) {
                b.sleeping &= !wake;
                b.snapshot.rotation = rotation;
            }
        }

        fn enabled_rotations(&self, body: u32) -> [bool; 3] {
            self.bodies
                .get(&body)
                .map(|b| b.enabled_rotations)
                .unwrap_or([true; 3])
        }

        fn set_enabled_rotations(&mut self, body: u32, enabled: [bool; 3], wake: bool) {
            if let Some(b) = self.bodies.get_mut(&body) {
                b.sleeping &= !wake;
                b.enabled_rotations = enabled;
            }
        }

        fn sleep(&mut self, body: u32) {
            if let Some(b) = self.bodies.get_mut(&body) {
                b.snapshot.linvel = Vec3::zeros();
                b.snapshot.angvel = Vec3::zeros();
                b.sleeping = true;
            }
        }

        fn wake_up(&mut self, body: u32) {
            if let Some(b) = self.bodies.get_mut(&body) {
                b.sleeping = false;
            }
        }
    }

    #[test]
    fn sleeping_body_only_takes_waking_writes() {
        let mut physics = MockPhysics::with_character(1.0);
        physics.character_mut().snapshot.linvel = Vec3::new(1.0, 0.0, 0.0);
        physics.sleep(CHARACTER);
        assert!(physics.is_sleeping(CHARACTER));
        assert_eq!(physics.character().snapshot.linvel, Vec3::zeros());

        physics.apply_impulse(CHARACTER, Vec3::new(0.0, 0.5, 0.0), false);
        physics.set_linvel(CHARACTER, Vec3::new(0.0, 2.0, 0.0), false);
        assert!(physics.is_sleeping(CHARACTER));
        assert_eq!(physics.character().snapshot.linvel, Vec3::zeros());
        assert!(physics.character().impulses.is_empty());

        physics.apply_impulse(CHARACTER, Vec3::new(0.0, 0.5, 0.0), true);
        assert!(!physics.is_sleeping(CHARACTER));
        assert!((physics.character().snapshot.linvel.y - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn velocity_at_point_adds_spin() {
        let platform = BodySnapshot {
            translation: Vec3::zeros(),
            rotation: Quat::identity(),
            linvel: Vec3::new(1.0, 0.0, 0.0),
            angvel: Vec3::new(0.0, 1.0, 0.0),
            mass: 10.0,
            gravity_scale: 1.0,
            kind: BodyKind::Kinematic,
        };
        // Spinning about +Y, a point at +X moves toward -Z.
        let v = platform.velocity_at_point(&Vec3::new(2.0, 0.0, 0.0));
        assert!((v - Vec3::new(1.0, 0.0, -2.0)).norm() < 1.0e-6);
    }
}
