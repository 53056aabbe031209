/*!
Floating capsule character controller.

One `step()` per rendered frame turns an [`InputSnapshot`] into impulses, torques and
velocity changes on a dynamic capsule that hovers above the ground on a spring. The
controller owns no physics state of its own beyond what it carries between frames in
[`CharacterState`]; the body lives in whatever [`PhysicsBackend`] it is given.

Submodules:

- ground:   ground/slope rays, grounded and walkable tests, suspension spring
- platform: moving-platform coupling and the anti-explosion velocity bound
- movement: slope-adjusted direction, movement impulse, jump velocity, idle drag
- balance:  auto-balance torque
*/

pub mod balance;
pub mod ground;
pub mod movement;
pub mod platform;

pub use ground::{ContactSample, GroundScan, is_grounded, suspension_force};
pub use movement::slope_adjusted_direction;
pub use platform::MovingPlatformState;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::debug;

use crate::{
    animation::LocomotionSignal,
    bitmask_flags::ControlMode,
    camera::FollowCamera,
    config::ControllerConfig,
    constants::{FIXED_CAMERA_POINT_LERP, POINT_TO_MOVE_STOP_RADIUS, TURN_COMPLETE_EPS},
    input::InputSnapshot,
    physics::{BodyKind, PhysicsBackend, Point3, Quat, Vec3},
    utils::{
        forward_from_yaw, planar_distance, rotate_yaw_towards, sanitize_delta, wrap_angle,
        yaw_from_xz, yaw_rotation,
    },
};

use movement::{MoveInput, idle_drag, jump_velocity, movement_impulse};
use platform::carry_scale;

/// Imperative requests from outside the input aggregator (e.g. an on-screen widget).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlCommand {
    RotateCamera { delta_pitch: f32, delta_yaw: f32 },
    RotateCharacterOnY(f32),
}

/// Cloneable sender side of the controller's command queue.
///
/// Commands are drained at the start of the next `step()`.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    tx: Sender<ControlCommand>,
}

impl ControlHandle {
    /// Returns `false` once the controller is gone.
    pub fn rotate_camera(&self, delta_pitch: f32, delta_yaw: f32) -> bool {
        self.tx
            .send(ControlCommand::RotateCamera {
                delta_pitch,
                delta_yaw,
            })
            .is_ok()
    }

    pub fn rotate_character_on_y(&self, delta: f32) -> bool {
        self.tx.send(ControlCommand::RotateCharacterOnY(delta)).is_ok()
    }
}

/// State carried from one frame to the next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CharacterState {
    pub position: Vec3,
    pub linvel: Vec3,
    pub grounded: bool,
    pub walkable: bool,
    pub slope_angle: Option<f32>,
    pub actual_slope_angle: f32,
    pub slope_normal: Vec3,
    pub platform: MovingPlatformState,
    /// Facing indicator yaw, turned smoothly toward `target_yaw`.
    pub facing_yaw: f32,
    pub target_yaw: f32,
    /// Facing had reached the target at the start of the frame.
    pub rotated: bool,
    pub falling: bool,
    pub point_moving: bool,
    pub last_move_impulse: Vec3,
    /// Vertical reaction last pushed into the ground (non-positive).
    pub last_ground_reaction: f32,
}

impl CharacterState {
    fn new(init_yaw: f32) -> Self {
        Self {
            position: Vec3::zeros(),
            linvel: Vec3::zeros(),
            grounded: false,
            walkable: false,
            slope_angle: None,
            actual_slope_angle: 0.0,
            slope_normal: Vec3::y(),
            platform: MovingPlatformState::default(),
            facing_yaw: init_yaw,
            target_yaw: init_yaw,
            rotated: true,
            falling: false,
            point_moving: false,
            last_move_impulse: Vec3::zeros(),
            last_ground_reaction: 0.0,
        }
    }
}

/// Read-only per-frame summary for views and debug overlays.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerStatus {
    pub position: Vec3,
    pub linvel: Vec3,
    pub grounded: bool,
    pub walkable: bool,
    pub slope_angle: Option<f32>,
    pub actual_slope_angle: f32,
    pub rotated: bool,
    pub on_moving_platform: bool,
    pub falling: bool,
    pub mass_ratio: f32,
    pub facing_yaw: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    pub status: ControllerStatus,
    /// `None` when animation is off or control is disabled.
    pub signal: Option<LocomotionSignal>,
    /// Rotation for the visual model when the body's own rotation is locked.
    pub model_rotation: Option<Quat>,
    /// The point-to-move target was reached or cancelled and should be cleared.
    pub clear_move_target: bool,
}

pub struct FloatingCapsuleController<P: PhysicsBackend> {
    cfg: ControllerConfig,
    body: P::BodyId,
    sensor: Option<P::ColliderId>,
    state: CharacterState,
    commands: Receiver<ControlCommand>,
    handle: ControlHandle,
}

impl<P: PhysicsBackend> FloatingCapsuleController<P> {
    /// Take control of `body`. Rotations are locked unless auto-balance drives them.
    pub fn new(
        cfg: ControllerConfig,
        physics: &mut P,
        body: P::BodyId,
        sensor: Option<P::ColliderId>,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let free = cfg.balance.enabled;
        physics.set_enabled_rotations(body, [free; 3], false);
        let state = CharacterState::new(wrap_angle(cfg.locomotion.character_init_dir));
        Self {
            cfg,
            body,
            sensor,
            state,
            commands: rx,
            handle: ControlHandle { tx },
        }
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn body(&self) -> P::BodyId {
        self.body
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }

    pub fn state(&self) -> &CharacterState {
        &self.state
    }

    /// Swap in a new (already validated) configuration.
    pub fn set_config(&mut self, cfg: ControllerConfig, physics: &mut P) {
        if cfg.balance.enabled != self.cfg.balance.enabled {
            let free = cfg.balance.enabled;
            physics.set_enabled_rotations(self.body, [free; 3], false);
            if !free {
                physics.set_rotation(self.body, Quat::identity(), false);
            }
        }
        self.cfg = cfg;
    }

    pub fn status(&self) -> ControllerStatus {
        let s = &self.state;
        ControllerStatus {
            position: s.position,
            linvel: s.linvel,
            grounded: s.grounded,
            walkable: s.walkable,
            slope_angle: s.slope_angle,
            actual_slope_angle: s.actual_slope_angle,
            rotated: s.rotated,
            on_moving_platform: s.platform.on_moving,
            falling: s.falling,
            mass_ratio: s.platform.mass_ratio,
            facing_yaw: s.facing_yaw,
        }
    }

    pub fn sleep(&self, physics: &mut P) {
        physics.sleep(self.body);
    }

    pub fn wake(&self, physics: &mut P) {
        physics.wake_up(self.body);
    }

    /// Restore the body to identity rotation before handing it back.
    pub fn teardown(self, physics: &mut P) {
        physics.set_rotation(self.body, Quat::identity(), false);
    }

    fn drain_commands(&mut self, camera: &mut FollowCamera) {
        loop {
            match self.commands.try_recv() {
                Ok(ControlCommand::RotateCamera {
                    delta_pitch,
                    delta_yaw,
                }) => camera.rotate(delta_yaw, delta_pitch),
                Ok(ControlCommand::RotateCharacterOnY(delta)) => {
                    if delta.is_finite() {
                        self.state.target_yaw = wrap_angle(self.state.target_yaw + delta);
                    }
                }
                // The controller holds a sender itself, so the queue never disconnects.
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn outcome(&self, signal: Option<LocomotionSignal>, model_yaw: f32, clear: bool) -> StepOutcome {
        StepOutcome {
            status: self.status(),
            signal,
            model_rotation: (!self.cfg.balance.enabled).then(|| yaw_rotation(model_yaw)),
            clear_move_target: clear,
        }
    }

    /// Run one frame.
    ///
    /// Behavior
    /// - Always updates the camera pivot target, even with control disabled.
    /// - Casts the ground and slope rays, then applies in order: movement impulse, platform
    ///   drag, jump, suspension, idle drag, gravity governor, balance torque.
    /// - Returns the locomotion signal for the animation state machine.
    pub fn step(
        &mut self,
        physics: &mut P,
        camera: &mut FollowCamera,
        input: &InputSnapshot,
        move_to: Option<Point3>,
        dt: f32,
    ) -> StepOutcome {
        let dt = sanitize_delta(dt);
        self.drain_commands(camera);

        // 0) Snapshot the body. A vanished body is a detached controller, not an error.
        let Some(body) = physics.body(self.body) else {
            return self.outcome(None, self.state.facing_yaw, false);
        };
        let position = body.translation;
        let current = body.linvel;
        self.state.position = position;
        self.state.linvel = current;
        camera.follow(position);

        // A sleeping body stays frozen until it is woken.
        if self.cfg.disable_control || physics.is_sleeping(self.body) {
            return self.outcome(None, self.state.facing_yaw, false);
        }

        let cfg = &self.cfg;
        let camera_based = cfg.has_mode(ControlMode::CameraBasedMovement);
        let fixed_camera = cfg.has_mode(ControlMode::FixedCamera);

        // 1) Heading: point-to-move overrides the input heading unless cancelled.
        let mut heading = input.heading;
        let mut run = input.run;
        let mut clear_move_target = false;
        self.state.point_moving = false;
        if let Some(target) = move_to.filter(|_| cfg.has_mode(ControlMode::PointToMove)) {
            let here = Point3::from(position);
            let wall = self.sensor.is_some_and(|s| physics.sensor_touching(s));
            if input.function_key_down()
                || wall
                || planar_distance(&here, &target) <= POINT_TO_MOVE_STOP_RADIUS
            {
                clear_move_target = true;
            } else if let Some(yaw) = yaw_from_xz(target.x - position.x, target.z - position.z) {
                heading = Some(yaw);
                run = false;
                self.state.point_moving = true;
                if fixed_camera {
                    let t = (cfg.camera.fixed_rot_mult * dt * FIXED_CAMERA_POINT_LERP).min(1.0);
                    let pivot = camera.pivot_yaw();
                    camera.set_pivot_yaw(pivot + wrap_angle(yaw - pivot) * t);
                }
            }
        }
        if let Some(yaw) = heading {
            self.state.target_yaw = wrap_angle(yaw);
        }
        let moving = input.moving || self.state.point_moving;

        // 2) Ground and slope rays.
        let scan = ground::scan(physics, self.body, position, self.state.facing_yaw, cfg);
        self.state.grounded = scan.grounded;
        self.state.walkable = scan.walkable;
        self.state.slope_angle = scan.slope_angle;
        if scan.slope.is_some() {
            self.state.actual_slope_angle = scan.actual_slope_angle;
            self.state.slope_normal = scan.slope_normal;
        }
        let walkable = scan.walkable;
        let standing = scan.standing_point();

        // 3) Platform coupling.
        let ground_body = scan.ground.as_ref().and_then(|g| g.body);
        let platform_body = ground_body.and_then(|b| physics.body(b).map(|s| (b, s)));
        let was_on_moving = self.state.platform.on_moving;
        self.state.platform = match (walkable, platform_body, standing) {
            (true, Some((_, platform)), Some(point)) if platform.kind.is_moving() => {
                MovingPlatformState::couple(&platform, position, current, body.mass, point.coords)
            }
            (true, Some(_), Some(point)) => MovingPlatformState::fixed(point.coords),
            _ => MovingPlatformState::default(),
        };
        if was_on_moving != self.state.platform.on_moving {
            debug!(on_moving = self.state.platform.on_moving, "platform contact changed");
        }
        let platform = self.state.platform;

        // 4) Movement impulse, at most once per frame.
        self.state.rotated =
            wrap_angle(self.state.target_yaw - self.state.facing_yaw).abs() <= TURN_COMPLETE_EPS;
        let mut move_impulse = Vec3::zeros();
        if moving {
            let local = slope_adjusted_direction(
                scan.slope_angle.unwrap_or(0.0),
                self.state.actual_slope_angle,
                cfg.slope.max_angle,
            );
            let direction = yaw_rotation(self.state.facing_yaw) * local;
            move_impulse = movement_impulse(
                &MoveInput {
                    direction,
                    current_velocity: current,
                    platform_velocity: platform.velocity,
                    on_moving_platform: platform.on_moving,
                    run,
                    walkable,
                    rotated: self.state.rotated,
                    on_slope: scan.slope_angle.is_some_and(|a| a != 0.0),
                    mass: body.mass,
                },
                &cfg.locomotion,
                &cfg.slope,
            );
            let point = Point3::from(position + Vec3::y() * cfg.locomotion.move_impulse_point_y);
            physics.apply_impulse_at_point(self.body, move_impulse, point, true);
        }
        self.state.last_move_impulse = move_impulse;

        // 5) Drag the platform back: dynamic platforms only.
        if let (Some((pb, ps)), Some(point)) = (platform_body, standing) {
            if walkable && platform.on_moving && ps.kind == BodyKind::Dynamic {
                let scale = carry_scale(platform.mass_ratio);
                let drag = if moving {
                    -move_impulse * scale
                } else {
                    -physics.contact_force(self.body) * dt * scale
                };
                physics.apply_impulse_at_point(pb, drag, point, true);
            }
        }

        // 6) Jump.
        if input.jump && walkable {
            let v = jump_velocity(current, run, self.state.slope_normal, &cfg.locomotion);
            physics.set_linvel(self.body, v, true);
            if let (Some(gb), Some(point)) = (ground_body, standing) {
                let push = Vec3::new(
                    0.0,
                    self.state.last_ground_reaction * cfg.locomotion.jump_force_to_ground_mult,
                    0.0,
                );
                physics.apply_impulse_at_point(gb, push, point, true);
            }
        }

        // 7) Turn the facing indicator.
        self.state.facing_yaw = rotate_yaw_towards(
            self.state.facing_yaw,
            self.state.target_yaw,
            cfg.locomotion.turn_speed * dt,
        );
        let model_yaw = if camera_based {
            camera.pivot_yaw()
        } else {
            self.state.facing_yaw
        };

        // 8) Suspension. Reads the live vertical velocity, which a jump may have just set.
        if let (true, Some(g)) = (walkable, scan.ground.as_ref()) {
            let vy = physics.body(self.body).map_or(current.y, |b| b.linvel.y);
            let force = suspension_force(
                cfg.rest_distance(),
                g.distance,
                vy,
                cfg.floating.spring_k,
                cfg.floating.damping_c,
            );
            physics.apply_impulse(self.body, Vec3::new(0.0, force, 0.0), false);

            let reaction = if force > 0.0 { -force } else { 0.0 };
            self.state.last_ground_reaction = reaction;
            if let (Some(gb), Some(point)) = (ground_body, standing) {
                physics.apply_impulse_at_point(gb, Vec3::new(0.0, reaction, 0.0), point, true);
            }
        }

        // 9) Idle drag.
        if !moving && walkable {
            let target = platform.on_moving.then_some(platform.velocity);
            let drag = idle_drag(current, target, cfg.locomotion.drag_damping_c);
            physics.apply_impulse(self.body, drag, platform.on_moving);
        }

        // 10) Fall-speed governor.
        self.state.falling = current.y < 0.0 && !walkable;
        let wanted_scale = if current.y < cfg.locomotion.falling_max_vel {
            0.0
        } else if self.state.falling {
            cfg.locomotion.falling_gravity_scale
        } else {
            cfg.locomotion.initial_gravity_scale
        };
        if body.gravity_scale != wanted_scale {
            debug!(from = body.gravity_scale, to = wanted_scale, "gravity scale switched");
            physics.set_gravity_scale(self.body, wanted_scale, true);
        }

        // 11) Auto-balance.
        if cfg.balance.enabled {
            if let Some(now) = physics.body(self.body) {
                let facing = forward_from_yaw(model_yaw);
                let torque = balance::balance_torque(&now.rotation, &now.angvel, &facing, &cfg.balance);
                physics.apply_torque_impulse(self.body, torque, true);
            }
        }

        // 12) Fixed camera: left/right steer the pivot.
        if fixed_camera {
            let speed = dt * cfg.camera.fixed_rot_mult * if run { cfg.locomotion.sprint_mult } else { 1.0 };
            if input.turn_left {
                camera.add_pivot_yaw(speed);
            } else if input.turn_right {
                camera.add_pivot_yaw(-speed);
            }
        }

        // 13) Locomotion signal.
        let signal = cfg.animated.then(|| {
            if scan.ground.is_none() && self.state.falling {
                LocomotionSignal::Fall
            } else if !moving && !input.jump && walkable {
                LocomotionSignal::Idle
            } else if input.jump && walkable {
                LocomotionSignal::Jump
            } else if walkable {
                if run {
                    LocomotionSignal::Run
                } else {
                    LocomotionSignal::Walk
                }
            } else {
                LocomotionSignal::JumpIdle
            }
        });

        self.outcome(signal, model_yaw, clear_move_target)
    }
}
