pub mod animation;
pub mod bitmask_flags;
pub mod camera;
pub mod config;
pub mod constants;
pub mod control_loop;
pub mod controller;
pub mod hub;
pub mod input;
pub mod physics;
pub mod rapier_world;
pub mod utils;
pub mod wake;

pub use animation::{
    Action, AnimationDriver, AnimationSet, AnimationState, AnimationStateMachine, ClipPlayer,
    LocomotionSignal, LoopMode, PlaybackToken,
};
pub use bitmask_flags::{ControlMode, ControlModes, SceneTag, SceneTags};
pub use camera::{CameraCollisionSet, CameraOccluder, CameraPose, FollowCamera};
pub use config::{ConfigError, ConfigOverride, ControllerConfig};
pub use control_loop::{ControlLoop, FrameOutput, SceneOccluder};
pub use controller::{
    ControlCommand, ControlHandle, ControllerStatus, FloatingCapsuleController, StepOutcome,
};
pub use input::{
    CameraDeltas, CameraInputBuffer, GamepadState, InputAggregator, InputSnapshot, InputSources,
    JoystickHub, KeyboardState, TouchPoint,
};
pub use physics::{BodyKind, BodySnapshot, PhysicsBackend, Point3, Quat, Vec3};
pub use rapier_world::{BodyDef, CharacterHandles, PhysicsWorld, ShapeDef};
pub use utils::{forward_from_yaw, wrap_angle, yaw_from_xz, yaw_rotation};
pub use wake::{VisibilityAction, WakeScheduler};
