//! The controlled avatar: spawns the floating capsule, owns the control loop and copies its
//! output back onto the render transform each frame.

use bevy::{
    asset::io::file::FileAssetReader,
    picking::pointer::PointerInteraction,
    prelude::*,
    window::WindowOccluded,
};
use garden_shared::{
    ControlHandle, ControlLoop, ControlMode, ControllerConfig, FrameOutput, PhysicsBackend,
    SceneOccluder, rapier_world::PhysicsWorld,
};
use leafwing_input_manager::prelude::ActionState;
use nalgebra as na;

use crate::{
    camera::{CameraCandidates, CandidateOccluder},
    input::{DeviceInput, InputAction},
    physics::{ColliderOwners, Physics, PhysicsBody, PhysicsSet, quat_to_bevy, to_bevy, to_na},
    world::Ground,
};

const CONFIG_FILE: &str = "controller.toml";
const SPAWN_POSITION: Vec3 = Vec3::new(0.0, 2.0, 0.0);

#[derive(Component)]
pub struct Player;

#[derive(Resource, Deref, DerefMut)]
pub struct Control(pub ControlLoop<PhysicsWorld>);

/// Imperative handle for widgets that rotate the camera or character directly.
#[derive(Resource, Deref)]
pub struct ControlCommands(pub ControlHandle);

/// Output of the most recent control-loop frame.
#[derive(Resource, Default)]
pub struct LastFrame(pub Option<FrameOutput>);

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<LastFrame>();
    app.add_systems(Startup, spawn_player);
    app.add_systems(
        Update,
        (
            click_to_move.before(PhysicsSet::Control),
            track_visibility.before(PhysicsSet::Control),
            drive_player.in_set(PhysicsSet::Control),
        ),
    );
}

pub fn asset_file(name: &str) -> std::path::PathBuf {
    FileAssetReader::get_base_path().join("assets").join(name)
}

fn load_config() -> ControllerConfig {
    let path = asset_file(CONFIG_FILE);
    match ControllerConfig::load(&path) {
        Ok(cfg) => {
            info!(path = %path.display(), "loaded controller config");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "using default controller config");
            ControllerConfig::default()
        }
    }
}

fn spawn_player(
    mut commands: Commands,
    mut physics: ResMut<Physics>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let cfg = load_config();
    let handles = physics.spawn_character(&cfg, to_na(SPAWN_POSITION));
    let (radius, half_height) = (cfg.capsule.radius, cfg.capsule.half_height);

    let control = ControlLoop::new(cfg, &mut physics.0, handles.body, handles.sensor);
    commands.insert_resource(ControlCommands(control.handle()));
    commands.insert_resource(Control(control));

    commands
        .spawn((
            Name::new("Player"),
            Player,
            PhysicsBody(handles.body),
            Mesh3d(meshes.add(Capsule3d {
                radius,
                half_length: half_height,
            })),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: Color::linear_rgb(0.2, 0.9, 0.8),
                ..default()
            })),
            Transform::from_translation(SPAWN_POSITION),
        ))
        .with_children(|parent| {
            // Eyes mark the facing direction (+Z).
            let eye_mesh = meshes.add(Sphere { radius: 0.08 });
            let eye_mat = materials.add(Color::WHITE);
            for x in [-0.12, 0.12] {
                parent.spawn((
                    Mesh3d(eye_mesh.clone()),
                    MeshMaterial3d(eye_mat.clone()),
                    Transform::from_xyz(x, half_height * 0.6, radius * 0.9),
                ));
            }
        });
}

fn drive_player(
    time: Res<Time>,
    mut physics: ResMut<Physics>,
    control: Option<ResMut<Control>>,
    device: Res<DeviceInput>,
    owners: Res<ColliderOwners>,
    candidates: Res<CameraCandidates>,
    mut last: ResMut<LastFrame>,
    mut player: Single<&mut Transform, With<Player>>,
) {
    let Some(mut control) = control else {
        return;
    };
    let body = control.controller().body();
    let mut occluder = CandidateOccluder {
        owners: &owners,
        candidates: &candidates,
        exclude: body,
    };

    let out = control.frame(
        &mut physics.0,
        &device.0,
        Some(&mut occluder as &mut dyn SceneOccluder<PhysicsWorld>),
        time.delta_secs(),
        time.elapsed(),
    );

    if let Some(snapshot) = physics.body(body) {
        player.translation = to_bevy(&snapshot.translation);
        player.rotation = quat_to_bevy(&out.model_rotation.unwrap_or(snapshot.rotation));
    }
    last.0 = Some(out);
}

/// Left click on the ground sets a point-to-move target.
fn click_to_move(
    actions: Res<ActionState<InputAction>>,
    interactions: Query<&PointerInteraction>,
    ground: Query<(), With<Ground>>,
    control: Option<ResMut<Control>>,
) {
    let Some(mut control) = control else {
        return;
    };
    if !actions.just_pressed(&InputAction::LeftClick)
        || !control.config().has_mode(ControlMode::PointToMove)
    {
        return;
    }

    let target = interactions
        .iter()
        .filter_map(|interaction| interaction.get_nearest_hit())
        .find(|(entity, _)| ground.contains(*entity))
        .and_then(|(_, hit)| hit.position);
    if let Some(pos) = target {
        debug!(?pos, "move target");
        control.set_move_to_point(Some(na::Point3::new(pos.x, pos.y, pos.z)));
    }
}

fn track_visibility(
    time: Res<Time>,
    mut occluded: MessageReader<WindowOccluded>,
    mut physics: ResMut<Physics>,
    control: Option<ResMut<Control>>,
) {
    let Some(mut control) = control else {
        occluded.clear();
        return;
    };
    for msg in occluded.read() {
        control.visibility_changed(!msg.occluded, time.elapsed(), &mut physics.0);
    }
}
