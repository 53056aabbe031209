//! Debug/performance tooling for native dev builds.
//!
//! This plugin is compiled/used only when the caller gates it behind `dev_native`
//! (recommended: `#[cfg(feature = "dev_native")] mod debug_tools;` in `main.rs`).
//!
//! - perf overlay
//! - gizmos for the floating ray, the facing direction and the move target
//! - F5 re-reads `assets/controller_override.toml` into the running controller

use bevy::diagnostic::{
    EntityCountDiagnosticsPlugin, FrameTimeDiagnosticsPlugin, SystemInformationDiagnosticsPlugin,
};
use bevy::prelude::*;
use bevy::render::diagnostic::RenderDiagnosticsPlugin;
use garden_shared::{ConfigOverride, forward_from_yaw};
use iyes_perf_ui::prelude::*;

use crate::{
    physics::{Physics, PhysicsSet, to_bevy},
    player::{Control, Player, asset_file},
};

const OVERRIDE_FILE: &str = "controller_override.toml";

/// Add debug/perf tooling (intended for `dev_native` builds only).
pub(super) fn plugin(app: &mut App) {
    app.add_plugins((
        FrameTimeDiagnosticsPlugin::default(),
        EntityCountDiagnosticsPlugin::default(),
        SystemInformationDiagnosticsPlugin::default(),
        RenderDiagnosticsPlugin,
        PerfUiPlugin,
    ));

    app.add_systems(Startup, spawn_perf_ui);
    app.add_systems(Update, reload_override.before(PhysicsSet::Control));
    app.add_systems(Update, draw_controller.after(PhysicsSet::Sync));
}

fn spawn_perf_ui(mut commands: Commands) {
    commands.spawn(PerfUiAllEntries::default());
}

fn reload_override(
    keys: Res<ButtonInput<KeyCode>>,
    mut physics: ResMut<Physics>,
    control: Option<ResMut<Control>>,
) {
    let Some(mut control) = control else {
        return;
    };
    if !keys.just_pressed(KeyCode::F5) {
        return;
    }

    let path = asset_file(OVERRIDE_FILE);
    let ov = match std::fs::read_to_string(&path)
        .map_err(|err| err.to_string())
        .and_then(|text| ConfigOverride::from_toml_str(&text).map_err(|err| err.to_string()))
    {
        Ok(ov) => ov,
        Err(err) => {
            warn!(path = %path.display(), %err, "could not read config override");
            return;
        }
    };
    // A rejected override is logged by the control loop and leaves the running config alone.
    if control.apply_override(&ov, &mut physics.0).is_ok() {
        info!(path = %path.display(), "applied config override");
    }
}

fn draw_controller(
    mut gizmos: Gizmos,
    control: Option<Res<Control>>,
    player: Single<&Transform, With<Player>>,
) {
    let Some(control) = control else {
        return;
    };
    let cfg = control.config();
    let state = control.controller().state();
    let center = player.translation;

    // Floating ray, green while grounded.
    let origin = center + to_bevy(&cfg.ground_ray_origin_offset());
    let color = if state.grounded {
        Color::srgb(0.2, 1.0, 0.3)
    } else {
        Color::srgb(1.0, 0.3, 0.2)
    };
    gizmos.line(origin, origin - Vec3::Y * cfg.ground_ray_length(), color);

    let facing = to_bevy(&forward_from_yaw(state.facing_yaw));
    gizmos.arrow(center, center + facing * 1.5, Color::srgb(1.0, 1.0, 0.2));

    if let Some(target) = control.move_target() {
        let target = Vec3::new(target.x, target.y, target.z);
        gizmos.circle(
            Isometry3d::new(target + Vec3::Y * 0.02, Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
            0.3,
            Color::srgb(0.3, 0.6, 1.0),
        );
    }
}
