use crate::{
    config::{LocomotionConfig, SlopeConfig},
    constants::SLOPE_DIRECTION_MIN_ANGLE,
    physics::Vec3,
    utils::{angle_between, project_onto},
};

/// Local movement direction (before facing rotation) for the measured slope.
///
/// - Moderate slope on walkable ground: tilt forward along the slope.
/// - Too steep: barely any forward push uphill, full push downhill.
/// - Otherwise flat `(0, 0, 1)`.
pub fn slope_adjusted_direction(slope_angle: f32, actual_slope_angle: f32, max_angle: f32) -> Vec3 {
    if actual_slope_angle < max_angle
        && slope_angle.abs() > SLOPE_DIRECTION_MIN_ANGLE
        && slope_angle.abs() < max_angle
    {
        Vec3::new(0.0, slope_angle.sin(), slope_angle.cos())
    } else if actual_slope_angle >= max_angle {
        let rise = slope_angle.sin();
        if rise > 0.0 {
            Vec3::new(0.0, 0.0, 0.1)
        } else {
            Vec3::new(0.0, rise, 1.0)
        }
    } else {
        Vec3::z()
    }
}

/// Everything the movement impulse depends on for one frame.
#[derive(Clone, Copy, Debug)]
pub struct MoveInput {
    /// World-space movement direction (facing-rotated).
    pub direction: Vec3,
    pub current_velocity: Vec3,
    pub platform_velocity: Vec3,
    pub on_moving_platform: bool,
    pub run: bool,
    pub walkable: bool,
    /// Facing indicator has caught up with the target heading.
    pub rotated: bool,
    /// A non-zero slope angle was measured this frame.
    pub on_slope: bool,
    pub mass: f32,
}

/// Impulse driving the body toward `maxVel (x sprint)` plus the platform velocity along
/// `direction`, over the `acc_delta_time` time constant.
pub fn movement_impulse(input: &MoveInput, loco: &LocomotionConfig, slope: &SlopeConfig) -> Vec3 {
    let dir = input.direction;
    let cur = input.current_velocity;
    let platform = input.platform_velocity;
    let sprint = if input.run { loco.sprint_mult } else { 1.0 };

    let platform_in_dir = project_onto(&platform, &dir).component_mul(&dir);
    let platform_cross = angle_between(&platform, &dir).sin();

    // Velocity sideways to the direction gets pushed back when not riding a platform.
    let along = cur.dot(&dir);
    let reject = cur - Vec3::new(dir.x * along, 0.0, dir.z * along);
    let reject_mult = if input.on_moving_platform {
        0.0
    } else {
        loco.reject_vel_mult
    };

    let target_speed = loco.max_vel_limit * sprint;
    let acc = |d: f32, pid: f32, c: f32, p: f32, r: f32| {
        (d * (target_speed + pid) - (c - p * platform_cross + r * reject_mult)) / loco.acc_delta_time
    };
    let force_x = acc(dir.x, platform_in_dir.x, cur.x, platform.x, reject.x) * input.mass;
    let force_z = acc(dir.z, platform_in_dir.z, cur.z, platform.z, reject.z) * input.mass;

    let air = if input.walkable {
        1.0
    } else {
        loco.air_drag_multiplier
    };
    let turning = if input.rotated {
        1.0
    } else {
        loco.turn_vel_multiplier
    };

    let lift = if input.on_slope {
        let extra = if dir.y > 0.0 {
            slope.up_extra_force
        } else {
            slope.down_extra_force
        };
        dir.y * turning * extra * sprint
    } else {
        0.0
    };

    Vec3::new(force_x * turning * air, lift, force_z * turning * air)
}

/// Velocity to set on jump: keep planar motion, replace vertical, add a push along the
/// surface normal.
pub fn jump_velocity(current: Vec3, run: bool, slope_normal: Vec3, loco: &LocomotionConfig) -> Vec3 {
    let jump = if run {
        loco.sprint_jump_mult * loco.jump_vel
    } else {
        loco.jump_vel
    };
    let along_normal = project_onto(&Vec3::new(0.0, jump * loco.slope_jump_mult, 0.0), &slope_normal);
    Vec3::new(current.x, jump, current.z) + along_normal
}

/// Damping impulse toward the platform's planar velocity (or rest).
pub fn idle_drag(current: Vec3, platform: Option<Vec3>, damping_c: f32) -> Vec3 {
    let target = platform.unwrap_or_else(Vec3::zeros);
    Vec3::new(
        (target.x - current.x) * damping_c,
        0.0,
        (target.z - current.z) * damping_c,
    )
}
