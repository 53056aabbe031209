//! Per-frame input aggregation.
//!
//! Device listeners never touch the controller directly. They either:
//! - write the shared [`JoystickHub`] (virtual joystick widget, gamepad stick/buttons), or
//! - stage raw camera deltas into the [`CameraInputBuffer`], which is drained once per frame.
//!
//! [`InputAggregator::snapshot`] then folds every source into one [`InputSnapshot`]. Merge order
//! is gamepad, then touch joystick, then keyboard; a later source overrides the heading of an
//! earlier one. Point-to-move is layered on top by the control loop.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use nalgebra as na;

use crate::{
    animation::Action,
    config::ControllerKeys,
    constants::{
        GAMEPAD_ROTATE_SCALE, JOYSTICK_RUN_THRESHOLD, MOUSE_ROTATE_SCALE, PINCH_ZOOM_SCALE,
        TOUCH_ROTATE_SCALE, WHEEL_ZOOM_SCALE,
    },
    hub::{Hub, SubscriptionId},
    utils::wrap_angle,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectionKeys {
    pub forward: bool,
    pub backward: bool,
    pub leftward: bool,
    pub rightward: bool,
}

impl DirectionKeys {
    #[inline]
    pub fn any(&self) -> bool {
        self.forward || self.backward || self.leftward || self.rightward
    }

    pub fn union(self, other: DirectionKeys) -> DirectionKeys {
        DirectionKeys {
            forward: self.forward || other.forward,
            backward: self.backward || other.backward,
            leftward: self.leftward || other.leftward,
            rightward: self.rightward || other.rightward,
        }
    }

    /// Camera-relative heading, or `None` when the keys cancel out.
    pub fn heading(&self, pivot_yaw: f32) -> Option<f32> {
        heading_from_axes(
            axis(self.rightward, self.leftward),
            axis(self.forward, self.backward),
            pivot_yaw,
        )
    }
}

#[inline]
fn axis(positive: bool, negative: bool) -> f32 {
    (positive as i8 - negative as i8) as f32
}

/// Turn camera-relative `(right - left, forward - backward)` into a facing yaw.
///
/// +Z is "forward" for yaw 0 and +X is to the character's left, so pure right input
/// turns the character by `-PI/2` from the pivot.
pub fn heading_from_axes(right: f32, forward: f32, pivot_yaw: f32) -> Option<f32> {
    if right == 0.0 && forward == 0.0 {
        return None;
    }
    Some(wrap_angle(pivot_yaw + (-right).atan2(forward)))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyboardState {
    pub keys: DirectionKeys,
    pub jump: bool,
    pub run: bool,
    pub actions: [bool; 4],
}

/// Polled gamepad state. Sticks are `[x, y]` with +y up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GamepadState {
    pub buttons: Vec<bool>,
    pub left_stick: [f32; 2],
    pub right_stick: [f32; 2],
}

impl GamepadState {
    #[inline]
    pub fn pressed(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }

    pub fn direction_keys(&self, keys: &ControllerKeys) -> DirectionKeys {
        DirectionKeys {
            forward: self.pressed(keys.forward),
            backward: self.pressed(keys.backward),
            leftward: self.pressed(keys.leftward),
            rightward: self.pressed(keys.rightward),
        }
    }
}

/// Raw device state for one frame. Absent devices are `None`.
#[derive(Clone, Debug, Default)]
pub struct InputSources {
    pub keyboard: Option<KeyboardState>,
    pub gamepad: Option<GamepadState>,
}

/// Virtual joystick reading. `angle` is in `[0, TAU)`, 0 pointing right, `PI/2` up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JoystickState {
    pub distance: f32,
    pub angle: f32,
    pub run: bool,
}

impl JoystickState {
    /// Build from a stick vector, clamping the magnitude to 1.
    pub fn from_vector(x: f32, y: f32) -> Self {
        let distance = (x * x + y * y).sqrt().min(1.0);
        let angle = y.atan2(x).rem_euclid(TAU);
        Self {
            distance,
            angle,
            run: distance > JOYSTICK_RUN_THRESHOLD,
        }
    }

    #[inline]
    pub fn active(&self) -> bool {
        self.distance > 0.0
    }

    pub fn heading(&self, pivot_yaw: f32) -> Option<f32> {
        self.active()
            .then(|| wrap_angle(pivot_yaw + (self.angle - FRAC_PI_2)))
    }

    pub fn points_left(&self) -> bool {
        self.active() && self.angle > 2.0 * PI / 3.0 && self.angle < 4.0 * PI / 3.0
    }

    pub fn points_right(&self) -> bool {
        self.active() && (self.angle < PI / 3.0 || self.angle > 5.0 * PI / 3.0)
    }
}

/// Virtual joystick buttons. Button 1 is jump, 2..5 map onto the actions.
pub const JOYSTICK_BUTTONS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoystickField {
    Stick,
    Button(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JoystickChange {
    Stick(JoystickState),
    Button(bool),
}

/// Shared joystick/button store written by touch widgets and the gamepad.
#[derive(Debug, Default)]
pub struct JoystickHub {
    stick: JoystickState,
    buttons: [bool; JOYSTICK_BUTTONS],
    changes: Hub<JoystickField, JoystickChange>,
}

impl JoystickHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stick(&self) -> JoystickState {
        self.stick
    }

    /// `index` is zero based: 0 is button 1.
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }

    pub fn set_joystick(&mut self, distance: f32, angle: f32, run: bool) {
        let next = JoystickState {
            distance,
            angle,
            run,
        };
        if next != self.stick {
            self.stick = next;
            self.changes.publish(JoystickField::Stick, JoystickChange::Stick(next));
        }
    }

    pub fn reset_joystick(&mut self) {
        self.set_joystick(0.0, 0.0, false);
    }

    pub fn press_button(&mut self, index: usize) {
        self.set_button(index, true);
    }

    pub fn release_button(&mut self, index: usize) {
        self.set_button(index, false);
    }

    pub fn release_all_buttons(&mut self) {
        for index in 0..JOYSTICK_BUTTONS {
            self.set_button(index, false);
        }
    }

    fn set_button(&mut self, index: usize, pressed: bool) {
        let Some(slot) = self.buttons.get_mut(index) else {
            return;
        };
        if *slot != pressed {
            *slot = pressed;
            self.changes
                .publish(JoystickField::Button(index), JoystickChange::Button(pressed));
        }
    }

    pub fn subscribe(&mut self, field: JoystickField) -> SubscriptionId {
        self.changes.subscribe(field)
    }

    pub fn subscribe_all(&mut self) -> SubscriptionId {
        self.changes.subscribe_all()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    pub fn drain(&mut self, id: SubscriptionId) -> Vec<(JoystickField, JoystickChange)> {
        self.changes.drain(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count()
    }
}

/// Action fired by a joystick button (zero based). Button 1 is jump.
fn action_for_button(index: usize) -> Option<Action> {
    match index {
        1 => Some(Action::Action4),
        2 => Some(Action::Action2),
        3 => Some(Action::Action3),
        4 => Some(Action::Action1),
        _ => None,
    }
}

/// Camera deltas accumulated since the last frame, already in radians / meters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraDeltas {
    /// Added to the pivot yaw.
    pub yaw: f32,
    /// Added to the orbit pitch.
    pub pitch: f32,
    /// Added to the (negative) camera distance; positive moves closer.
    pub zoom: f32,
}

impl CameraDeltas {
    pub fn is_zero(&self) -> bool {
        self.yaw == 0.0 && self.pitch == 0.0 && self.zoom == 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchPoint {
    pub id: u64,
    pub position: na::Vector2<f32>,
}

/// Staging area for camera input. Listeners add, the control loop takes.
#[derive(Debug, Default)]
pub struct CameraInputBuffer {
    pending: CameraDeltas,
    previous_touches: Vec<TouchPoint>,
}

impl CameraInputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, yaw: f32, pitch: f32, zoom: f32) {
        // Non-finite device deltas are dropped, not propagated into the rig.
        if yaw.is_finite() && pitch.is_finite() && zoom.is_finite() {
            self.pending.yaw += yaw;
            self.pending.pitch += pitch;
            self.pending.zoom += zoom;
        }
    }

    /// Pointer-lock or press-drag mouse motion in pixels.
    pub fn stage_pointer(&mut self, dx: f32, dy: f32, move_speed: f32) {
        let k = MOUSE_ROTATE_SCALE * move_speed;
        self.add(-dx * k, dy * k, 0.0);
    }

    /// Right stick deflection, +y up.
    pub fn stage_gamepad_look(&mut self, x: f32, y: f32, move_speed: f32) {
        let k = GAMEPAD_ROTATE_SCALE * move_speed;
        self.add(-x * k, -y * k, 0.0);
    }

    /// Wheel delta, positive scrolling down (away from the screen).
    pub fn stage_wheel(&mut self, delta_y: f32, zoom_speed: f32) {
        self.add(0.0, 0.0, -delta_y * WHEEL_ZOOM_SCALE * zoom_speed);
    }

    /// Current camera-drag touches in screen pixels. One finger orbits, two fingers pinch.
    pub fn stage_touches(&mut self, touches: &[TouchPoint], move_speed: f32, zoom_speed: f32) {
        match (touches, self.previous_touches.as_slice()) {
            ([one], [prev]) if one.id == prev.id => {
                let d = one.position - prev.position;
                let k = TOUCH_ROTATE_SCALE * move_speed;
                self.add(-d.x * k, d.y * k, 0.0);
            }
            ([a, b, ..], [pa, pb, ..]) if a.id == pa.id && b.id == pb.id => {
                let before = (pa.position - pb.position).norm();
                let now = (a.position - b.position).norm();
                self.add(0.0, 0.0, (now - before) * PINCH_ZOOM_SCALE * zoom_speed);
            }
            _ => {}
        }
        self.previous_touches.clear();
        self.previous_touches.extend(touches.iter().take(2).copied());
    }

    /// Drain the deltas staged since the last call.
    pub fn take(&mut self) -> CameraDeltas {
        std::mem::take(&mut self.pending)
    }
}

/// One frame of normalized intent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputSnapshot {
    /// Desired facing yaw, `None` keeps the current heading.
    pub heading: Option<f32>,
    /// A directional source (keys, d-pad, stick) is active.
    pub moving: bool,
    pub run: bool,
    pub jump: bool,
    /// Rising edges this frame, indexed `Action1..=Action4`.
    pub actions: [bool; 4],
    /// Fixed-camera rotation requests.
    pub turn_left: bool,
    pub turn_right: bool,
    pub joystick: JoystickState,
}

impl InputSnapshot {
    /// Desired world-space direction for [`InputSnapshot::heading`].
    pub fn direction(&self) -> Option<na::Vector3<f32>> {
        self.heading.map(crate::utils::forward_from_yaw)
    }

    pub fn triggered(&self) -> impl Iterator<Item = Action> + '_ {
        Action::ALL
            .into_iter()
            .zip(self.actions)
            .filter_map(|(action, fired)| fired.then_some(action))
    }

    /// Any input that should cancel point-to-move.
    pub fn function_key_down(&self) -> bool {
        self.moving || self.jump
    }
}

/// Gamepad buttons forwarded to joystick buttons, highest priority first.
fn gamepad_button_priority(keys: &ControllerKeys) -> [(usize, usize); 5] {
    [
        (keys.action4, 1),
        (keys.action3, 3),
        (keys.jump, 0),
        (keys.action2, 2),
        (keys.action1, 4),
    ]
}

#[derive(Debug)]
pub struct InputAggregator {
    keys: ControllerKeys,
    previous_keyboard_actions: [bool; 4],
    buttons: SubscriptionId,
    /// Joystick button the gamepad is holding down, if any.
    gamepad_button: Option<usize>,
    gamepad_stick_active: bool,
}

impl InputAggregator {
    pub fn attach(keys: ControllerKeys, hub: &mut JoystickHub) -> Self {
        Self {
            keys,
            previous_keyboard_actions: [false; 4],
            buttons: hub.subscribe_all(),
            gamepad_button: None,
            gamepad_stick_active: false,
        }
    }

    pub fn detach(self, hub: &mut JoystickHub) {
        hub.unsubscribe(self.buttons);
    }

    pub fn snapshot(
        &mut self,
        sources: &InputSources,
        pivot_yaw: f32,
        hub: &mut JoystickHub,
        camera: &mut CameraInputBuffer,
        camera_move_speed: f32,
    ) -> InputSnapshot {
        let mut snap = InputSnapshot::default();

        let mut gamepad_keys = DirectionKeys::default();
        if let Some(pad) = &sources.gamepad {
            self.forward_gamepad(pad, hub, camera, camera_move_speed);
            gamepad_keys = pad.direction_keys(&self.keys);
            if let Some(heading) = gamepad_keys.heading(pivot_yaw) {
                snap.heading = Some(heading);
            }
        } else {
            self.release_gamepad(hub);
        }

        let stick = hub.stick();
        snap.joystick = stick;
        if let Some(heading) = stick.heading(pivot_yaw) {
            snap.heading = Some(heading);
            snap.run = stick.run;
        }

        let keyboard = sources.keyboard.unwrap_or_default();
        let keys = keyboard.keys.union(gamepad_keys);
        if let Some(heading) = keys.heading(pivot_yaw) {
            snap.heading = Some(heading);
        }
        if keys.any() {
            snap.run = keyboard.run;
        }

        snap.moving = keys.any() || stick.active();
        snap.jump = keyboard.jump || hub.button(0);
        snap.turn_left = keys.leftward || stick.points_left();
        snap.turn_right = keys.rightward || stick.points_right();

        for (i, pressed) in keyboard.actions.into_iter().enumerate() {
            if pressed && !self.previous_keyboard_actions[i] {
                snap.actions[i] = true;
            }
        }
        self.previous_keyboard_actions = keyboard.actions;

        for (field, change) in hub.drain(self.buttons) {
            if let (JoystickField::Button(index), JoystickChange::Button(true)) = (field, change) {
                if let Some(action) = action_for_button(index) {
                    snap.actions[action as usize] = true;
                }
            }
        }

        snap
    }

    fn forward_gamepad(
        &mut self,
        pad: &GamepadState,
        hub: &mut JoystickHub,
        camera: &mut CameraInputBuffer,
        camera_move_speed: f32,
    ) {
        let chosen = gamepad_button_priority(&self.keys)
            .into_iter()
            .find(|(pad_index, _)| pad.pressed(*pad_index))
            .map(|(_, button)| button);
        if chosen != self.gamepad_button {
            if let Some(previous) = self.gamepad_button {
                hub.release_button(previous);
            }
            if let Some(button) = chosen {
                hub.press_button(button);
            }
            self.gamepad_button = chosen;
        }

        let [x, y] = pad.left_stick;
        if x != 0.0 || y != 0.0 {
            let stick = JoystickState::from_vector(x, y);
            hub.set_joystick(stick.distance, stick.angle, stick.run);
            self.gamepad_stick_active = true;
        } else if self.gamepad_stick_active {
            hub.reset_joystick();
            self.gamepad_stick_active = false;
        }

        let [rx, ry] = pad.right_stick;
        if rx != 0.0 || ry != 0.0 {
            camera.stage_gamepad_look(rx, ry, camera_move_speed);
        }
    }

    /// A disconnected gamepad must not leave buttons or the stick held.
    fn release_gamepad(&mut self, hub: &mut JoystickHub) {
        if let Some(previous) = self.gamepad_button.take() {
            hub.release_button(previous);
        }
        if self.gamepad_stick_active {
            hub.reset_joystick();
            self.gamepad_stick_active = false;
        }
    }
}
