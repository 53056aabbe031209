//! Garden test scene: a ground slab, stepping blocks, a ramp, a spinning platform, a crate
//! to push around and a bush that neither the character rays nor the camera collide with.

use bevy::prelude::*;
use garden_shared::{
    BodyKind, SceneTag, SceneTags,
    rapier_world::{BodyDef, ShapeDef},
};
use nalgebra as na;

use crate::{
    camera::NoCameraCollision,
    physics::{ColliderOwners, Physics, PhysicsBody, to_na},
};

/// Clicking on this entity sets a point-to-move target.
#[derive(Component)]
pub struct Ground;

pub(super) fn plugin(app: &mut App) {
    app.add_systems(Startup, setup);
}

/// Spawns the render entity and its body together so the owner map stays complete.
fn spawn_body(
    commands: &mut Commands,
    physics: &mut Physics,
    owners: &mut ColliderOwners,
    def: BodyDef,
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
) -> Entity {
    let (body, collider) = physics.spawn(&def);
    let rotation = Quat::from_xyzw(def.rotation.i, def.rotation.j, def.rotation.k, def.rotation.w);
    let entity = commands
        .spawn((
            PhysicsBody(body),
            Mesh3d(mesh),
            MeshMaterial3d(material),
            Transform::from_xyz(def.translation.x, def.translation.y, def.translation.z)
                .with_rotation(rotation),
        ))
        .id();
    owners.insert(collider, entity);
    entity
}

fn cuboid(half: Vec3) -> ShapeDef {
    ShapeDef::Cuboid {
        half_extents: to_na(half),
    }
}

fn setup(
    mut commands: Commands,
    mut physics: ResMut<Physics>,
    mut owners: ResMut<ColliderOwners>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    debug!("garden setup");

    let grass = materials.add(StandardMaterial {
        base_color: Color::linear_rgb(0.2, 0.3, 0.25),
        perceptual_roughness: 1.0,
        metallic: 0.0,
        ..default()
    });
    let stone = materials.add(Color::srgb_u8(124, 144, 255));
    let wood = materials.add(Color::srgb_u8(160, 110, 70));
    let leaves = materials.add(Color::srgba(0.25, 0.55, 0.3, 0.8));

    // Ground slab, top face at y = 0.
    let ground = spawn_body(
        &mut commands,
        &mut physics,
        &mut owners,
        BodyDef::fixed(na::Vector3::new(0.0, -0.5, 0.0), cuboid(Vec3::new(25.0, 0.5, 25.0))),
        meshes.add(Cuboid::new(50.0, 1.0, 50.0)),
        grass,
    );
    commands.entity(ground).insert((Ground, Pickable::default()));

    // Stepping blocks of rising height.
    for (i, height) in [0.2_f32, 0.4, 0.6].into_iter().enumerate() {
        let half = Vec3::new(0.75, height / 2.0, 0.75);
        spawn_body(
            &mut commands,
            &mut physics,
            &mut owners,
            BodyDef::fixed(
                na::Vector3::new(4.0 + i as f32 * 1.5, height / 2.0, 0.0),
                cuboid(half),
            ),
            meshes.add(Cuboid::from_size(half * 2.0)),
            stone.clone(),
        );
    }

    // Ramp at roughly 0.35 rad, inside the walkable limit.
    let ramp_half = Vec3::new(1.5, 0.1, 3.0);
    spawn_body(
        &mut commands,
        &mut physics,
        &mut owners,
        BodyDef::fixed(na::Vector3::new(-5.0, 0.9, 4.0), cuboid(ramp_half)).with_rotation(
            na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), -0.35),
        ),
        meshes.add(Cuboid::from_size(ramp_half * 2.0)),
        stone.clone(),
    );

    // Spinning platform to ride.
    let platform_half = Vec3::new(2.0, 0.15, 2.0);
    spawn_body(
        &mut commands,
        &mut physics,
        &mut owners,
        BodyDef::new(
            BodyKind::Kinematic,
            na::Vector3::new(0.0, 0.4, -8.0),
            cuboid(platform_half),
        )
        .with_velocity(na::Vector3::zeros(), na::Vector3::new(0.0, 0.5, 0.0)),
        meshes.add(Cuboid::from_size(platform_half * 2.0)),
        wood.clone(),
    );

    // Light crate; standing on it pushes it down and walking drags it back.
    let crate_half = Vec3::splat(0.5);
    spawn_body(
        &mut commands,
        &mut physics,
        &mut owners,
        BodyDef {
            density: 0.5,
            ..BodyDef::new(BodyKind::Dynamic, na::Vector3::new(-3.0, 0.5, -3.0), cuboid(crate_half))
        },
        meshes.add(Cuboid::from_size(crate_half * 2.0)),
        wood,
    );

    // Bush: rays and the camera pass straight through it.
    let bush = spawn_body(
        &mut commands,
        &mut physics,
        &mut owners,
        BodyDef::fixed(
            na::Vector3::new(2.5, 0.6, 3.0),
            ShapeDef::Sphere { radius: 0.6 },
        )
        .with_tags(SceneTags::of(&[
            SceneTag::ExcludeCharacterRay,
            SceneTag::ExcludeCameraCollision,
        ])),
        meshes.add(Sphere::new(0.6)),
        leaves,
    );
    commands.entity(bush).insert(NoCameraCollision);

    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: light_consts::lux::OVERCAST_DAY,
            ..default()
        },
        FollowLight {
            offset: Vec3::new(-5.0, 10.0, -5.0),
        },
        Transform::from_xyz(-5.0, 10.0, -5.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// Directional light that keeps its offset from the character so shadows stay nearby.
#[derive(Component)]
pub struct FollowLight {
    pub offset: Vec3,
}
