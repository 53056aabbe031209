//! Optional character model. When `assets/character.toml` names a glTF and its clips, the
//! model replaces the capsule mesh and the control loop's animation cursor drives it.
//!
//! ```toml
//! model = "character.glb"
//!
//! [clips]
//! idle = "Idle"
//! walk = "Walk"
//! jumpIdle = "Jump_Idle"
//! ```

use std::time::Duration;

use bevy::{gltf::Gltf, platform::collections::HashMap, prelude::*};
use garden_shared::{AnimationSet, animation::{ClipPlayer, LoopMode}};
use serde::Deserialize;

use crate::{
    physics::PhysicsSet,
    player::{Control, Player, asset_file},
};

const MODEL_FILE: &str = "character.toml";

pub(super) fn plugin(app: &mut App) {
    app.add_systems(Startup, load_model);
    app.add_systems(Update, (spawn_model, bind_player));
    app.add_systems(Update, drive_clips.in_set(PhysicsSet::Sync));
}

#[derive(Deserialize)]
struct CharacterModel {
    model: String,
    clips: AnimationSet,
}

#[derive(Resource)]
struct PendingModel {
    gltf: Handle<Gltf>,
    clips: AnimationSet,
}

/// Animation graph built from the model's named clips.
#[derive(Resource)]
struct ClipGraph {
    graph: Handle<AnimationGraph>,
    nodes: HashMap<String, AnimationNodeIndex>,
}

fn load_model(mut commands: Commands, assets: Res<AssetServer>) {
    let path = asset_file(MODEL_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => {
            info!(path = %path.display(), "no character model; using the capsule");
            return;
        }
    };
    match toml::from_str::<CharacterModel>(&text) {
        Ok(model) => commands.insert_resource(PendingModel {
            gltf: assets.load(model.model),
            clips: model.clips,
        }),
        Err(err) => warn!(path = %path.display(), %err, "ignoring character model"),
    }
}

fn spawn_model(
    mut commands: Commands,
    pending: Option<Res<PendingModel>>,
    gltfs: Res<Assets<Gltf>>,
    mut graphs: ResMut<Assets<AnimationGraph>>,
    control: Option<ResMut<Control>>,
    player: Single<Entity, With<Player>>,
) {
    let (Some(pending), Some(mut control)) = (pending, control) else {
        return;
    };
    let Some(gltf) = gltfs.get(&pending.gltf) else {
        return;
    };
    commands.remove_resource::<PendingModel>();
    let Some(scene) = gltf.scenes.first() else {
        warn!("character model has no scene");
        return;
    };

    let named: Vec<(String, Handle<AnimationClip>)> = gltf
        .named_animations
        .iter()
        .map(|(name, clip)| (name.to_string(), clip.clone()))
        .collect();
    let (graph, indices) = AnimationGraph::from_clips(named.iter().map(|(_, clip)| clip.clone()));
    let nodes = named
        .into_iter()
        .map(|(name, _)| name)
        .zip(indices)
        .collect::<HashMap<_, _>>();
    debug!(clips = nodes.len(), "character model loaded");

    commands.insert_resource(ClipGraph {
        graph: graphs.add(graph),
        nodes,
    });
    // The model's origin sits at the feet, the body's at the capsule center.
    let cfg = control.config();
    let feet = -(cfg.capsule.half_height + cfg.rest_distance());
    commands
        .entity(*player)
        .remove::<Mesh3d>()
        .with_child((SceneRoot(scene.clone()), Transform::from_xyz(0.0, feet, 0.0)));
    control.attach_animations(pending.clips.clone());
}

/// Hook the graph up to the animation player once the scene has spawned it.
fn bind_player(
    mut commands: Commands,
    graph: Option<Res<ClipGraph>>,
    added: Query<Entity, Added<AnimationPlayer>>,
) {
    let Some(graph) = graph else {
        return;
    };
    for entity in &added {
        commands.entity(entity).insert((
            AnimationGraphHandle(graph.graph.clone()),
            AnimationTransitions::new(),
        ));
    }
}

struct BevyClips<'a> {
    player: &'a mut AnimationPlayer,
    transitions: &'a mut AnimationTransitions,
    nodes: &'a HashMap<String, AnimationNodeIndex>,
}

impl ClipPlayer for BevyClips<'_> {
    fn play(&mut self, clip: &str, fade_in: f32, mode: LoopMode) -> bool {
        let Some(&node) = self.nodes.get(clip) else {
            return false;
        };
        let active = self
            .transitions
            .play(self.player, node, Duration::from_secs_f32(fade_in));
        if mode == LoopMode::Repeat {
            active.repeat();
        }
        true
    }

    // Transitions fade the previous main clip on `play`.
    fn fade_out(&mut self, _clip: &str, _fade_out: f32) {}

    // A repeating clip is never `is_finished`, so a completed pass counts too.
    fn is_finished(&self, clip: &str) -> bool {
        self.nodes
            .get(clip)
            .and_then(|node| self.player.animation(*node))
            .is_some_and(|active| active.is_finished() || active.completions() > 0)
    }
}

fn drive_clips(
    graph: Option<Res<ClipGraph>>,
    control: Option<ResMut<Control>>,
    mut players: Query<(&mut AnimationPlayer, &mut AnimationTransitions)>,
) {
    let (Some(graph), Some(mut control)) = (graph, control) else {
        return;
    };
    let Some((mut player, mut transitions)) = players.iter_mut().next() else {
        return;
    };
    let mut clips = BevyClips {
        player: &mut player,
        transitions: &mut transitions,
        nodes: &graph.nodes,
    };
    control.sync_animations(&mut clips);
}
