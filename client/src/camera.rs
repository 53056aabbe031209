use bevy::{
    camera::Exposure,
    pbr::{AtmosphereMode, AtmosphereSettings},
    prelude::*,
};
use garden_shared::{
    CameraCollisionSet, Point3, SceneOccluder, Vec3 as NaVec3,
    rapier_world::{PhysicsWorld, rapier3d::prelude::RigidBodyHandle},
};

use crate::{
    physics::{ColliderOwners, PhysicsSet, nearest_candidate_hit, to_bevy},
    player::{LastFrame, Player},
    world::FollowLight,
};

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<CameraCandidates>();
    app.add_systems(Startup, add_camera);
    app.add_systems(
        Update,
        (
            track_candidates.before(PhysicsSet::Control),
            (apply_camera_pose, follow_light).in_set(PhysicsSet::Sync),
        ),
    );
}

/// Rendered meshes that never block the camera.
#[derive(Component)]
pub struct NoCameraCollision;

/// Entities the camera ray may collide with.
#[derive(Resource, Default, Deref, DerefMut)]
pub struct CameraCandidates(pub CameraCollisionSet<Entity>);

/// Camera line of sight against the candidate set, ignoring the character's own body.
pub struct CandidateOccluder<'a> {
    pub owners: &'a ColliderOwners,
    pub candidates: &'a CameraCandidates,
    pub exclude: RigidBodyHandle,
}

impl SceneOccluder<PhysicsWorld> for CandidateOccluder<'_> {
    fn nearest_hit(
        &mut self,
        physics: &PhysicsWorld,
        origin: Point3,
        dir: NaVec3,
        max_distance: f32,
    ) -> Option<f32> {
        nearest_candidate_hit(
            physics,
            self.owners,
            self.candidates,
            self.exclude,
            origin,
            dir,
            max_distance,
        )
    }
}

fn add_camera(mut commands: Commands) {
    commands.spawn((
        Exposure { ev100: 16.0 },
        bevy::core_pipeline::tonemapping::Tonemapping::AcesFitted,
        Camera3d::default(),
        Transform::from_xyz(0.0, 3.0, -5.0).looking_at(Vec3::ZERO, Vec3::Y),
        DistanceFog {
            color: Color::srgba(0.35, 0.48, 0.66, 1.0),
            directional_light_color: Color::srgba(1.0, 0.95, 0.85, 0.5),
            directional_light_exponent: 30.0,
            falloff: FogFalloff::from_visibility_colors(
                1000.0, // Fog distance
                Color::srgb(0.35, 0.5, 0.66),
                Color::srgb(0.8, 0.8, 0.7),
            ),
        },
        AtmosphereSettings {
            rendering_method: AtmosphereMode::Raymarched,
            ..default()
        },
    ));
}

/// Every visible mesh joins the candidate set when it appears and leaves when it goes away.
/// Opting an entity out covers everything spawned under it, the player's model included.
fn track_candidates(
    mut candidates: ResMut<CameraCandidates>,
    added: Query<(Entity, Option<&Visibility>), Added<Mesh3d>>,
    parents: Query<&ChildOf>,
    opted_out: Query<(), Or<(With<NoCameraCollision>, With<Player>)>>,
    mut removed: RemovedComponents<Mesh3d>,
) {
    for entity in removed.read() {
        candidates.remove(&entity);
    }
    for (entity, visibility) in &added {
        if visibility == Some(&Visibility::Hidden)
            || opted_out.contains(entity)
            || parents
                .iter_ancestors(entity)
                .any(|ancestor| opted_out.contains(ancestor))
        {
            continue;
        }
        candidates.insert(entity);
    }
}

fn apply_camera_pose(
    last: Res<LastFrame>,
    mut camera: Single<&mut Transform, With<Camera3d>>,
) {
    let Some(frame) = last.0.as_ref() else {
        return;
    };
    let position = to_bevy(&frame.camera.position);
    let target = to_bevy(&frame.camera.target);
    if !position.is_finite() || position.distance_squared(target) < 1.0e-8 {
        return;
    }
    camera.translation = position;
    camera.look_at(target, Vec3::Y);
}

fn follow_light(
    player: Single<&Transform, (With<Player>, Without<FollowLight>)>,
    mut lights: Query<(&mut Transform, &FollowLight)>,
) {
    for (mut transform, light) in &mut lights {
        transform.translation = player.translation + light.offset;
        transform.look_at(player.translation, Vec3::Y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        let mut app = App::new();
        app.init_resource::<CameraCandidates>();
        app.add_systems(Update, track_candidates);
        app
    }

    fn mesh() -> Mesh3d {
        Mesh3d(Handle::default())
    }

    #[test]
    fn opted_out_subtree_never_becomes_a_candidate() {
        let mut app = app();
        let wall = app.world_mut().spawn(mesh()).id();
        let hidden = app.world_mut().spawn((mesh(), Visibility::Hidden)).id();
        let bush = app.world_mut().spawn((mesh(), NoCameraCollision)).id();
        let leaf = app.world_mut().spawn(mesh()).id();
        app.world_mut().entity_mut(bush).add_child(leaf);
        app.update();

        let candidates = app.world().resource::<CameraCandidates>();
        assert!(candidates.contains(&wall));
        assert!(!candidates.contains(&hidden));
        assert!(!candidates.contains(&bush));
        assert!(!candidates.contains(&leaf));
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn despawned_mesh_leaves_the_set() {
        let mut app = app();
        let wall = app.world_mut().spawn(mesh()).id();
        app.update();
        assert!(app.world().resource::<CameraCandidates>().contains(&wall));

        app.world_mut().despawn(wall);
        app.update();
        assert!(app.world().resource::<CameraCandidates>().is_empty());
    }
}
