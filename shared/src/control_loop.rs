/*!
Per-frame orchestration of the controller, camera, input and animation cursor.

[`ControlLoop`] owns every piece of simulation state except the physics world, which the
caller steps itself before calling [`ControlLoop::frame`].

Frame order (strict):
    0) due wake-up
    1) input snapshot (staged camera deltas are drained here)
    2) controller step (commands, rays, forces)
    3) animation signal and action triggers
    4) camera step

Design goals
- Nothing here reaches for globals: the joystick hub, camera input buffer and animation
  cursor are owned fields, lent out to the device glue through accessors.
- Teardown is explicit and consumes the loop, so nothing can run after it.
*/

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    animation::{AnimationDriver, AnimationSet, AnimationState, AnimationStateMachine, ClipPlayer},
    camera::{CameraOccluder, CameraPose, FollowCamera},
    config::{ConfigError, ConfigOverride, ControllerConfig},
    controller::{ControlHandle, ControllerStatus, FloatingCapsuleController},
    input::{CameraInputBuffer, InputAggregator, InputSnapshot, InputSources, JoystickHub},
    physics::{PhysicsBackend, Point3, Quat, Vec3},
    wake::{VisibilityAction, WakeScheduler},
};

/// Camera line-of-sight test against the same world the controller just wrote to.
pub trait SceneOccluder<P> {
    fn nearest_hit(&mut self, physics: &P, origin: Point3, dir: Vec3, max_distance: f32) -> Option<f32>;
}

struct WithWorld<'a, P, O: ?Sized> {
    physics: &'a P,
    occluder: &'a mut O,
}

impl<P, O: SceneOccluder<P> + ?Sized> CameraOccluder for WithWorld<'_, P, O> {
    fn nearest_hit(&mut self, origin: Point3, dir: Vec3, max_distance: f32) -> Option<f32> {
        self.occluder.nearest_hit(self.physics, origin, dir, max_distance)
    }
}

/// Everything a view needs after one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOutput {
    pub camera: CameraPose,
    pub status: ControllerStatus,
    /// Visual model rotation when the body's rotation is locked.
    pub model_rotation: Option<Quat>,
    pub animation: AnimationState,
    pub input: InputSnapshot,
}

pub struct ControlLoop<P: PhysicsBackend> {
    controller: FloatingCapsuleController<P>,
    camera: FollowCamera,
    animation: AnimationStateMachine,
    driver: Option<AnimationDriver>,
    aggregator: InputAggregator,
    joystick: JoystickHub,
    camera_input: CameraInputBuffer,
    move_to: Option<Point3>,
    wake: WakeScheduler,
}

impl<P: PhysicsBackend> ControlLoop<P> {
    pub fn new(
        cfg: ControllerConfig,
        physics: &mut P,
        body: P::BodyId,
        sensor: Option<P::ColliderId>,
    ) -> Self {
        let mut joystick = JoystickHub::new();
        let aggregator = InputAggregator::attach(cfg.keys, &mut joystick);
        let camera = FollowCamera::new(&cfg);
        let wake = WakeScheduler::new(cfg.wake_up_delay());
        let controller = FloatingCapsuleController::new(cfg, physics, body, sensor);
        Self {
            controller,
            camera,
            animation: AnimationStateMachine::new(),
            driver: None,
            aggregator,
            joystick,
            camera_input: CameraInputBuffer::new(),
            move_to: None,
            wake,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        self.controller.config()
    }

    pub fn handle(&self) -> ControlHandle {
        self.controller.handle()
    }

    pub fn controller(&self) -> &FloatingCapsuleController<P> {
        &self.controller
    }

    pub fn camera(&self) -> &FollowCamera {
        &self.camera
    }

    pub fn animation(&self) -> &AnimationStateMachine {
        &self.animation
    }

    pub fn animation_mut(&mut self) -> &mut AnimationStateMachine {
        &mut self.animation
    }

    pub fn joystick(&mut self) -> &mut JoystickHub {
        &mut self.joystick
    }

    pub fn camera_input(&mut self) -> &mut CameraInputBuffer {
        &mut self.camera_input
    }

    pub fn move_target(&self) -> Option<Point3> {
        self.move_to
    }

    /// Set (or clear) the point-to-move target. Cleared again once reached or cancelled.
    pub fn set_move_to_point(&mut self, point: Option<Point3>) {
        self.move_to = point.filter(|p| p.coords.iter().all(|c| c.is_finite()));
    }

    /// Start driving clips from the animation cursor.
    pub fn attach_animations(&mut self, set: AnimationSet) {
        if let Some(old) = self.driver.take() {
            old.detach(&mut self.animation);
        }
        self.driver = Some(AnimationDriver::attach(set, &mut self.animation));
    }

    /// Push cursor changes into `player` and collect one-shot completions.
    pub fn sync_animations(&mut self, player: &mut impl ClipPlayer) {
        if let Some(driver) = self.driver.as_mut() {
            driver.sync(&mut self.animation, player);
        }
    }

    pub fn frame(
        &mut self,
        physics: &mut P,
        sources: &InputSources,
        occluder: Option<&mut dyn SceneOccluder<P>>,
        dt: f32,
        now: Duration,
    ) -> FrameOutput {
        // 0) Due wake-up.
        if self.wake.poll(now) {
            debug!("waking character body");
            self.controller.wake(physics);
        }

        // 1) Input snapshot.
        let cfg = self.controller.config();
        let input = self.aggregator.snapshot(
            sources,
            self.camera.pivot_yaw(),
            &mut self.joystick,
            &mut self.camera_input,
            cfg.camera_move_speed(),
        );
        let animated = cfg.animated;
        self.camera.apply(self.camera_input.take());

        // 2) Controller.
        let outcome = self
            .controller
            .step(physics, &mut self.camera, &input, self.move_to, dt);
        if outcome.clear_move_target {
            self.move_to = None;
        }

        // 3) Animation cursor.
        if animated {
            for action in input.triggered() {
                self.animation.action(action);
            }
            if let Some(signal) = outcome.signal {
                self.animation.apply(signal);
            }
        }

        // 4) Camera.
        let mut bound = occluder.map(|occluder| WithWorld {
            physics: &*physics,
            occluder,
        });
        let camera = self
            .camera
            .step(dt, bound.as_mut().map(|b| b as &mut dyn CameraOccluder));

        FrameOutput {
            camera,
            status: outcome.status,
            model_rotation: outcome.model_rotation,
            animation: self.animation.current(),
            input,
        }
    }

    /// Hidden sleeps the body immediately; visible wakes it after the configured delay.
    pub fn visibility_changed(&mut self, visible: bool, now: Duration, physics: &mut P) {
        if self.wake.visibility_changed(visible, now) == VisibilityAction::Sleep {
            debug!("window hidden, sleeping character body");
            self.controller.sleep(physics);
        }
    }

    /// Swap in a tuned configuration. A rejected override leaves the current one in force.
    pub fn apply_override(&mut self, ov: &ConfigOverride, physics: &mut P) -> Result<(), ConfigError> {
        let next = match self.controller.config().apply_override(ov) {
            Ok(next) => next,
            Err(err) => {
                warn!(%err, "config override rejected");
                return Err(err);
            }
        };
        self.camera.reconfigure(&next);
        self.wake.set_delay(next.wake_up_delay());
        self.controller.set_config(next, physics);
        Ok(())
    }

    /// Release subscriptions, cancel the pending wake and hand the body back upright.
    pub fn teardown(mut self, physics: &mut P) {
        self.wake.teardown();
        if let Some(driver) = self.driver.take() {
            driver.detach(&mut self.animation);
        }
        self.aggregator.detach(&mut self.joystick);
        self.controller.teardown(physics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::LoopMode,
        input::{DirectionKeys, KeyboardState},
        physics::{
            Vec3,
            mock::{CHARACTER, MockPhysics},
        },
    };

    const DT: f32 = 1.0 / 60.0;

    fn setup() -> (MockPhysics, ControlLoop<MockPhysics>) {
        let cfg = ControllerConfig::default();
        let mut physics = MockPhysics::with_character(1.0);
        physics.flat_ground(cfg.rest_distance());
        let control = ControlLoop::new(cfg, &mut physics, CHARACTER, None);
        (physics, control)
    }

    fn keyboard(keyboard: KeyboardState) -> InputSources {
        InputSources {
            keyboard: Some(keyboard),
            gamepad: None,
        }
    }

    #[test]
    fn forward_key_walks_and_camera_trails() {
        let (mut physics, mut control) = setup();
        let sources = keyboard(KeyboardState {
            keys: DirectionKeys {
                forward: true,
                ..Default::default()
            },
            ..Default::default()
        });

        for _ in 0..30 {
            control.frame(&mut physics, &sources, None, DT, Duration::ZERO);
        }
        let out = control.frame(&mut physics, &sources, None, DT, Duration::ZERO);
        assert!(out.input.moving);
        assert_eq!(out.animation, AnimationState::Walk);
        assert!(physics.character().snapshot.linvel.z > 1.0);
        // Behind the pivot on -Z at the initial distance.
        assert!(out.camera.position.z < out.camera.target.z);
    }

    #[test]
    fn keyboard_action_plays_once_from_idle() {
        let (mut physics, mut control) = setup();
        let mut kb = KeyboardState::default();
        kb.actions[0] = true;
        let out = control.frame(&mut physics, &keyboard(kb), None, DT, Duration::ZERO);
        assert_eq!(out.animation, AnimationState::Action1);
        // Held key does not retrigger, and locomotion idle does not cut it short.
        let out = control.frame(&mut physics, &keyboard(kb), None, DT, Duration::ZERO);
        assert_eq!(out.animation, AnimationState::Action1);
    }

    #[test]
    fn staged_camera_deltas_are_consumed_once() {
        let (mut physics, mut control) = setup();
        control.camera_input().stage_wheel(100.0, 1.0);
        let before = control.camera().distance();
        control.frame(&mut physics, &InputSources::default(), None, DT, Duration::ZERO);
        let after = control.camera().distance();
        assert!(after < before);
        control.frame(&mut physics, &InputSources::default(), None, DT, Duration::ZERO);
        assert_eq!(control.camera().distance(), after);
    }

    #[test]
    fn reached_move_target_is_cleared() {
        let (mut physics, mut control) = setup();
        let ov = ConfigOverride {
            mode: Some("PointToMove".into()),
            ..Default::default()
        };
        control.apply_override(&ov, &mut physics).unwrap();

        control.set_move_to_point(Some(Point3::new(0.1, 0.0, 0.1)));
        control.frame(&mut physics, &InputSources::default(), None, DT, Duration::ZERO);
        assert_eq!(control.move_target(), None);

        control.set_move_to_point(Some(Point3::new(f32::NAN, 0.0, 0.0)));
        assert_eq!(control.move_target(), None);
    }

    #[test]
    fn hidden_then_visible_wakes_after_delay() {
        let (mut physics, mut control) = setup();
        control.visibility_changed(false, Duration::from_secs(1), &mut physics);
        assert!(physics.character().sleeping);
        control.visibility_changed(true, Duration::from_secs(2), &mut physics);
        control.frame(&mut physics, &InputSources::default(), None, DT, Duration::from_millis(2100));
        assert!(physics.character().sleeping);
        control.frame(&mut physics, &InputSources::default(), None, DT, Duration::from_millis(2200));
        assert!(!physics.character().sleeping);
    }

    #[test]
    fn hidden_body_holds_still_on_a_rapier_floor() {
        use crate::rapier_world::{BodyDef, PhysicsWorld, ShapeDef};

        let cfg = ControllerConfig::default();
        let mut world = PhysicsWorld::new();
        world.spawn(&BodyDef::fixed(
            Vec3::zeros(),
            ShapeDef::Cuboid {
                half_extents: Vec3::new(20.0, 0.5, 20.0),
            },
        ));
        let start = Vec3::new(0.0, 0.5 + cfg.capsule.half_height + cfg.rest_distance(), 0.0);
        let handles = world.spawn_character(&cfg, start);
        let mut control = ControlLoop::new(cfg, &mut world, handles.body, handles.sensor);
        let idle = InputSources::default();

        let mut now = Duration::ZERO;
        let tick =
            |world: &mut PhysicsWorld, control: &mut ControlLoop<PhysicsWorld>, now: &mut Duration| {
                *now += Duration::from_secs_f32(DT);
                world.step(DT);
                control.frame(world, &idle, None, DT, *now);
            };
        for _ in 0..120 {
            tick(&mut world, &mut control, &mut now);
        }
        assert!(!world.is_sleeping(handles.body));

        control.visibility_changed(false, now, &mut world);
        let hidden_at = world.body(handles.body).unwrap().translation;
        for _ in 0..60 {
            tick(&mut world, &mut control, &mut now);
        }
        assert!(world.is_sleeping(handles.body));
        let held = world.body(handles.body).unwrap();
        assert!((held.translation - hidden_at).norm() < 1.0e-2, "drifted to {:?}", held.translation);
        assert_eq!(held.linvel, Vec3::zeros());

        control.visibility_changed(true, now, &mut world);
        // Past the wake delay.
        for _ in 0..20 {
            tick(&mut world, &mut control, &mut now);
        }
        assert!(!world.is_sleeping(handles.body));
        for _ in 0..120 {
            tick(&mut world, &mut control, &mut now);
        }
        assert!(!world.is_sleeping(handles.body));
        let status = control.controller().status();
        assert!(status.grounded);
    }

    #[test]
    fn rejected_override_keeps_running_config() {
        let (mut physics, mut control) = setup();
        let ov = ConfigOverride {
            cam_max_distance: Some(1.0),
            ..Default::default()
        };
        assert!(control.apply_override(&ov, &mut physics).is_err());
        assert!((control.config().camera.max_distance + 7.0).abs() < 1.0e-6);
    }

    #[test]
    fn teardown_restores_rotation_and_unsubscribes() {
        #[derive(Default)]
        struct Silent;
        impl ClipPlayer for Silent {
            fn play(&mut self, _clip: &str, _fade_in: f32, _mode: LoopMode) -> bool {
                true
            }
            fn fade_out(&mut self, _clip: &str, _fade_out: f32) {}
            fn is_finished(&self, _clip: &str) -> bool {
                false
            }
        }

        let (mut physics, mut control) = setup();
        control.attach_animations(AnimationSet::new().with(AnimationState::Idle, "idle"));
        control.sync_animations(&mut Silent);
        assert_eq!(control.animation().subscriber_count(), 1);

        physics.character_mut().snapshot.rotation =
            Quat::from_axis_angle(&Vec3::x_axis(), 0.4);
        control.visibility_changed(true, Duration::ZERO, &mut physics);
        control.teardown(&mut physics);
        assert_eq!(physics.character().snapshot.rotation, Quat::identity());
    }
}
