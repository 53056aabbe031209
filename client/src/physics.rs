//! Rapier world as a Bevy resource, plus the glue between its bodies and render transforms.
//!
//! The world is stepped once per rendered frame, before the control loop issues its ray
//! queries against the new poses.

use bevy::{platform::collections::HashMap, prelude::*};
use garden_shared::{
    SceneTag,
    rapier_world::{
        PhysicsWorld,
        rapier3d::prelude::{Collider, ColliderHandle, QueryFilter, Ray, RigidBodyHandle},
    },
};
use nalgebra as na;

#[derive(Resource, Default, Deref, DerefMut)]
pub struct Physics(pub PhysicsWorld);

/// Rapier body behind a rendered entity.
#[derive(Component, Clone, Copy, Debug)]
pub struct PhysicsBody(pub RigidBodyHandle);

/// Which entity owns a collider, for camera collision lookups.
#[derive(Resource, Default, Deref, DerefMut)]
pub struct ColliderOwners(pub HashMap<ColliderHandle, Entity>);

#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicsSet {
    Step,
    Control,
    Sync,
}

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<Physics>();
    app.init_resource::<ColliderOwners>();
    app.configure_sets(
        Update,
        (PhysicsSet::Step, PhysicsSet::Control, PhysicsSet::Sync).chain(),
    );
    app.add_systems(Update, step_world.in_set(PhysicsSet::Step));
    app.add_systems(Update, sync_transforms.in_set(PhysicsSet::Sync));
}

#[inline]
pub fn to_bevy(v: &na::Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[inline]
pub fn to_na(v: Vec3) -> na::Vector3<f32> {
    na::Vector3::new(v.x, v.y, v.z)
}

#[inline]
pub fn quat_to_bevy(q: &na::UnitQuaternion<f32>) -> Quat {
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

fn step_world(time: Res<Time>, mut physics: ResMut<Physics>) {
    physics.step(garden_shared::utils::sanitize_delta(time.delta_secs()));
}

/// Copy simulated poses onto every physics-driven entity except the player, whose
/// transform the control loop writes.
fn sync_transforms(
    physics: Res<Physics>,
    mut bodies: Query<(&PhysicsBody, &mut Transform), Without<crate::player::Player>>,
) {
    for (body, mut transform) in &mut bodies {
        let Some(pose) = physics.position(body.0) else {
            continue;
        };
        transform.translation = to_bevy(&pose.translation.vector);
        transform.rotation = quat_to_bevy(&pose.rotation);
    }
}

/// Nearest camera-collision candidate along a ray, skipping the character and opted-out
/// colliders.
pub fn nearest_candidate_hit(
    world: &PhysicsWorld,
    owners: &ColliderOwners,
    candidates: &garden_shared::CameraCollisionSet<Entity>,
    exclude: RigidBodyHandle,
    origin: na::Point3<f32>,
    dir: na::Vector3<f32>,
    max_distance: f32,
) -> Option<f32> {
    let accept = |handle: ColliderHandle, _: &Collider| {
        owners
            .get(&handle)
            .is_some_and(|entity| candidates.contains(entity))
            && !garden_shared::PhysicsBackend::collider_tags(world, handle)
                .has(SceneTag::ExcludeCameraCollision)
    };
    let filter = QueryFilter::default()
        .exclude_sensors()
        .exclude_rigid_body(exclude)
        .predicate(&accept);
    let query = world.broad_phase.as_query_pipeline(
        world.narrow_phase.query_dispatcher(),
        &world.bodies,
        &world.colliders,
        filter,
    );
    query
        .cast_ray(&Ray::new(origin, dir), max_distance, true)
        .map(|(_, toi)| toi)
}
