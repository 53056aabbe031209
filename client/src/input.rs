//! Device glue: leafwing bindings and gamepad polling feed [`DeviceInput`]; mouse look and
//! wheel zoom are staged straight into the control loop's camera buffer.

use bevy::{
    input::gamepad::{Gamepad, GamepadButton},
    prelude::*,
    window::{CursorGrabMode, CursorOptions, PrimaryWindow},
};
use garden_shared::{
    GamepadState, InputSources, KeyboardState,
    input::DirectionKeys,
};
use leafwing_input_manager::prelude::*;

use crate::{
    physics::PhysicsSet,
    player::{Control, ControlCommands},
};

/// Character turn rate for the Q/E keys (rad/s).
const KEY_TURN_SPEED: f32 = 2.0;

#[derive(Reflect, Actionlike, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputAction {
    Forward,
    Backward,
    Leftward,
    Rightward,
    Jump,
    Run,
    Action1,
    Action2,
    Action3,
    Action4,
    TurnLeft,
    TurnRight,
    /// Set a point-to-move target.
    LeftClick,
    /// Held to orbit the camera with the mouse.
    LookHold,
    #[actionlike(DualAxis)]
    Look,
    #[actionlike(Axis)]
    Zoom,
}

/// Raw device state for the next control-loop frame.
#[derive(Resource, Default, Deref, DerefMut)]
pub struct DeviceInput(pub InputSources);

pub(super) fn plugin(app: &mut App) {
    app.add_plugins(InputManagerPlugin::<InputAction>::default());
    app.register_type::<InputAction>();

    app.insert_resource(default_input_map());
    app.insert_resource(ActionState::<InputAction>::default());
    app.init_resource::<DeviceInput>();

    app.add_systems(
        Update,
        (gather_sources, stage_mouse_camera, turn_character, lock_pointer_while_looking)
            .before(PhysicsSet::Control),
    );
}

fn default_input_map() -> InputMap<InputAction> {
    InputMap::new([
        (InputAction::Forward, KeyCode::KeyW),
        (InputAction::Forward, KeyCode::ArrowUp),
        (InputAction::Backward, KeyCode::KeyS),
        (InputAction::Backward, KeyCode::ArrowDown),
        (InputAction::Leftward, KeyCode::KeyA),
        (InputAction::Leftward, KeyCode::ArrowLeft),
        (InputAction::Rightward, KeyCode::KeyD),
        (InputAction::Rightward, KeyCode::ArrowRight),
        (InputAction::Jump, KeyCode::Space),
        (InputAction::Run, KeyCode::ShiftLeft),
        (InputAction::Action1, KeyCode::Digit1),
        (InputAction::Action2, KeyCode::Digit2),
        (InputAction::Action3, KeyCode::Digit3),
        (InputAction::Action4, KeyCode::KeyF),
        (InputAction::TurnLeft, KeyCode::KeyQ),
        (InputAction::TurnRight, KeyCode::KeyE),
    ])
    .with(InputAction::LeftClick, MouseButton::Left)
    .with(InputAction::LookHold, MouseButton::Right)
    .with_dual_axis(InputAction::Look, MouseMove::default())
    .with_axis(InputAction::Zoom, MouseScrollAxis::Y)
}

/// Standard-mapping index of each gamepad button.
const STANDARD_BUTTONS: [GamepadButton; 16] = [
    GamepadButton::South,
    GamepadButton::East,
    GamepadButton::West,
    GamepadButton::North,
    GamepadButton::LeftTrigger,
    GamepadButton::RightTrigger,
    GamepadButton::LeftTrigger2,
    GamepadButton::RightTrigger2,
    GamepadButton::Select,
    GamepadButton::Start,
    GamepadButton::LeftThumb,
    GamepadButton::RightThumb,
    GamepadButton::DPadUp,
    GamepadButton::DPadDown,
    GamepadButton::DPadLeft,
    GamepadButton::DPadRight,
];

fn poll_gamepad(gamepad: &Gamepad) -> GamepadState {
    let left = gamepad.left_stick();
    let right = gamepad.right_stick();
    GamepadState {
        buttons: STANDARD_BUTTONS
            .iter()
            .map(|button| gamepad.pressed(*button))
            .collect(),
        left_stick: [left.x, left.y],
        right_stick: [right.x, right.y],
    }
}

fn gather_sources(
    actions: Res<ActionState<InputAction>>,
    window: Single<&Window, With<PrimaryWindow>>,
    gamepads: Query<&Gamepad>,
    mut device: ResMut<DeviceInput>,
) {
    // Keys typed while the window is unfocused belong to someone else.
    device.keyboard = window.focused.then(|| KeyboardState {
        keys: DirectionKeys {
            forward: actions.pressed(&InputAction::Forward),
            backward: actions.pressed(&InputAction::Backward),
            leftward: actions.pressed(&InputAction::Leftward),
            rightward: actions.pressed(&InputAction::Rightward),
        },
        jump: actions.pressed(&InputAction::Jump),
        run: actions.pressed(&InputAction::Run),
        actions: [
            actions.pressed(&InputAction::Action1),
            actions.pressed(&InputAction::Action2),
            actions.pressed(&InputAction::Action3),
            actions.pressed(&InputAction::Action4),
        ],
    });
    device.gamepad = gamepads.iter().next().map(poll_gamepad);
}

fn stage_mouse_camera(actions: Res<ActionState<InputAction>>, control: Option<ResMut<Control>>) {
    let Some(mut control) = control else {
        return;
    };
    let move_speed = control.config().camera_move_speed();
    let zoom_speed = control.config().camera_zoom_speed();

    if actions.pressed(&InputAction::LookHold) {
        let delta = actions.axis_pair(&InputAction::Look);
        if delta != Vec2::ZERO {
            control.camera_input().stage_pointer(delta.x, delta.y, move_speed);
        }
    }
    let scroll = actions.value(&InputAction::Zoom);
    if scroll != 0.0 {
        // Wheel-up is positive here; the buffer wants positive-down in ~100 px per line.
        control.camera_input().stage_wheel(-scroll * 100.0, zoom_speed);
    }
}

/// Q/E turn the character through the command handle, like an external widget would.
fn turn_character(
    time: Res<Time>,
    actions: Res<ActionState<InputAction>>,
    handle: Option<Res<ControlCommands>>,
) {
    let Some(handle) = handle else {
        return;
    };
    let step = KEY_TURN_SPEED * time.delta_secs();
    if actions.pressed(&InputAction::TurnLeft) {
        handle.rotate_character_on_y(step);
    } else if actions.pressed(&InputAction::TurnRight) {
        handle.rotate_character_on_y(-step);
    }
}

fn lock_pointer_while_looking(
    actions: Res<ActionState<InputAction>>,
    mut cursor: Single<&mut CursorOptions, With<PrimaryWindow>>,
) {
    if actions.just_pressed(&InputAction::LookHold) {
        cursor.grab_mode = CursorGrabMode::Locked;
        cursor.visible = false;
    } else if actions.just_released(&InputAction::LookHold) {
        cursor.grab_mode = CursorGrabMode::None;
        cursor.visible = true;
    }
}
