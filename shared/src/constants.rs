use std::time::Duration;

/// Lower bound of the slope band (radians) inside which the movement direction
/// is tilted along the ground.
///
/// Below this the ground is treated as flat, which keeps tiny terrain bumps from
/// producing a vertical movement component.
pub const SLOPE_DIRECTION_MIN_ANGLE: f32 = 0.2;

/// Extra reach (meters) past the rest distance within which the slope ray still
/// contributes a slope angle.
pub const SLOPE_RAY_GROUND_MARGIN: f32 = 0.5;

/// Maximum tolerated difference (m/s) between the platform velocity at the
/// contact point and the character velocity.
///
/// Anything above is rescaled down to this magnitude before it feeds the
/// movement impulse.
pub const MAX_PLATFORM_VELOCITY_DIFF: f32 = 30.0;

/// Planar distance (meters) at which a point-to-move target counts as reached.
pub const POINT_TO_MOVE_STOP_RADIUS: f32 = 0.3;

/// Facing indicator is considered aligned with the target heading once the
/// remaining yaw error is at or below this (radians).
pub const TURN_COMPLETE_EPS: f32 = 1.0e-3;

/// Stick magnitude above which a virtual joystick requests running.
pub const JOYSTICK_RUN_THRESHOLD: f32 = 0.7;

/// Cross-fade duration (seconds) between semantic animation clips.
pub const ANIMATION_BLEND_SECS: f32 = 0.2;

/// Frame deltas above this (seconds) are reduced modulo this value.
///
/// Typically triggered by a tab switch or a debugger pause.
pub const MAX_FRAME_DELTA: f32 = 1.0;

/// Default deferred wake-up after the window becomes visible again.
pub const DEFAULT_WAKE_UP_DELAY: Duration = Duration::from_millis(200);

/// Slope-ray origin sits this far (meters) inside the capsule radius.
pub const SLOPE_RAY_INSET: f32 = 0.03;

/// Extra reach (meters) of the ground ray below the capsule radius.
pub const GROUND_RAY_EXTRA_LENGTH: f32 = 2.0;

/// Extra reach (meters) of the slope ray below the capsule radius.
pub const SLOPE_RAY_EXTRA_LENGTH: f32 = 3.0;

/// Pointer-lock / drag mouse delta to radians.
pub const MOUSE_ROTATE_SCALE: f32 = 0.002;

/// Single-finger touch drag delta to radians.
pub const TOUCH_ROTATE_SCALE: f32 = 0.005;

/// Gamepad right stick deflection to radians per frame.
pub const GAMEPAD_ROTATE_SCALE: f32 = 0.025;

/// Wheel delta to camera distance.
pub const WHEEL_ZOOM_SCALE: f32 = 0.002;

/// Two-finger pinch spread delta to camera distance.
pub const PINCH_ZOOM_SCALE: f32 = 0.01;

/// Rate multiplier used when point-to-move steers the fixed camera pivot.
pub const FIXED_CAMERA_POINT_LERP: f32 = 3.0;
