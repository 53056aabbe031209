//! Touch glue. The left half of the window is a virtual joystick zone; touches on the right
//! half orbit (one finger) or zoom (two fingers) the camera.

use bevy::{prelude::*, window::PrimaryWindow};
use garden_shared::{TouchPoint, input::JoystickState};
use nalgebra as na;

use crate::{physics::PhysicsSet, player::Control};

/// Drag distance (logical px) that maps to a full stick deflection.
const STICK_RADIUS: f32 = 60.0;

pub(super) fn plugin(app: &mut App) {
    app.add_systems(Update, drive_touch.before(PhysicsSet::Control));
}

/// Touch currently owning the stick.
#[derive(Default)]
struct StickTouch(Option<u64>);

fn drive_touch(
    touches: Res<Touches>,
    window: Single<&Window, With<PrimaryWindow>>,
    control: Option<ResMut<Control>>,
    mut stick: Local<StickTouch>,
) {
    let Some(mut control) = control else {
        return;
    };
    let half_width = window.width() * 0.5;

    if stick.0.is_some_and(|id| touches.get_pressed(id).is_none()) {
        stick.0 = None;
        control.joystick().reset_joystick();
    }
    if stick.0.is_none() {
        stick.0 = touches
            .iter_just_pressed()
            .find(|touch| touch.start_position().x < half_width)
            .map(|touch| touch.id());
    }

    if let Some(touch) = stick.0.and_then(|id| touches.get_pressed(id)) {
        let drag = touch.position() - touch.start_position();
        // Screen y grows downward; stick up is forward.
        let state = JoystickState::from_vector(drag.x / STICK_RADIUS, -drag.y / STICK_RADIUS);
        control
            .joystick()
            .set_joystick(state.distance, state.angle, state.run);
    }

    let camera_touches: Vec<TouchPoint> = touches
        .iter()
        .filter(|touch| Some(touch.id()) != stick.0 && touch.start_position().x >= half_width)
        .map(|touch| TouchPoint {
            id: touch.id(),
            position: na::Vector2::new(touch.position().x, touch.position().y),
        })
        .collect();
    let move_speed = control.config().camera_move_speed();
    let zoom_speed = control.config().camera_zoom_speed();
    control
        .camera_input()
        .stage_touches(&camera_touches, move_speed, zoom_speed);
}
