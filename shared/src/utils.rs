use std::f32::consts::{PI, TAU};

use nalgebra as na;

use crate::constants::MAX_FRAME_DELTA;

/// Minimum squared planar length for a direction to define a yaw.
const YAW_EPS: f32 = 1.0e-8;

/// Frame-rate independent smoothing factor for `lerp(a, b, t)`.
#[inline]
pub fn exp_lerp_factor(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate * dt).exp()
}

/// Reduce oversized frame deltas (tab switches, breakpoints) and drop garbage.
#[inline]
pub fn sanitize_delta(dt: f32) -> f32 {
    if !dt.is_finite() || dt <= 0.0 {
        0.0
    } else if dt > MAX_FRAME_DELTA {
        dt % MAX_FRAME_DELTA
    } else {
        dt
    }
}

/// Wrap an angle to `(-PI, PI]`.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Turn `current` toward `target` by at most `max_step` along the shortest arc.
pub fn rotate_yaw_towards(current: f32, target: f32, max_step: f32) -> f32 {
    let diff = wrap_angle(target - current);
    if diff.abs() <= max_step {
        wrap_angle(target)
    } else {
        wrap_angle(current + diff.signum() * max_step)
    }
}

#[inline]
pub fn yaw_rotation(yaw: f32) -> na::UnitQuaternion<f32> {
    na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), yaw)
}

/// Local +Z rotated by `yaw` about +Y.
#[inline]
pub fn forward_from_yaw(yaw: f32) -> na::Vector3<f32> {
    na::Vector3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Yaw that turns local +Z onto the planar direction `(x, z)`.
pub fn yaw_from_xz(x: f32, z: f32) -> Option<f32> {
    if x * x + z * z > YAW_EPS {
        Some(x.atan2(z))
    } else {
        None
    }
}

/// Yaw component of a rotation, measured the same way as [`yaw_from_xz`].
pub fn yaw_of(rotation: &na::UnitQuaternion<f32>) -> f32 {
    let forward = rotation * na::Vector3::z();
    yaw_from_xz(forward.x, forward.z).unwrap_or(0.0)
}

/// Unsigned angle between two vectors; zero when either is degenerate.
pub fn angle_between(a: &na::Vector3<f32>, b: &na::Vector3<f32>) -> f32 {
    let denom = a.norm() * b.norm();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}

/// Planar (XZ) distance between two world positions (meters).
#[inline]
pub fn planar_distance(a: &na::Point3<f32>, b: &na::Point3<f32>) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    (dx * dx + dz * dz).sqrt()
}

/// Round to two decimals, which keeps ray noise out of the slope angle.
#[inline]
pub fn round_centi(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Projection of `v` onto the line spanned by `onto`; zero for a degenerate axis.
pub fn project_onto(v: &na::Vector3<f32>, onto: &na::Vector3<f32>) -> na::Vector3<f32> {
    let len_sq = onto.norm_squared();
    if len_sq <= f32::EPSILON {
        return na::Vector3::zeros();
    }
    onto * (v.dot(onto) / len_sq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_angle_stays_in_half_open_range() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1.0e-5);
        assert!((wrap_angle(-PI) - PI).abs() < 1.0e-5);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1.0e-6);
        assert!((wrap_angle(-TAU - 0.25) + 0.25).abs() < 1.0e-5);
    }

    #[test]
    fn rotate_yaw_takes_shortest_arc() {
        // From just below PI to just above -PI is a short hop across the seam.
        let next = rotate_yaw_towards(3.0, -3.0, 0.1);
        assert!(next > 3.0 || next < -3.0, "went the long way: {next}");

        // Snaps when within reach.
        let next = rotate_yaw_towards(0.0, 0.05, 0.1);
        assert!((next - 0.05).abs() < 1.0e-6);
    }

    #[test]
    fn forward_and_yaw_agree() {
        for yaw in [-2.5_f32, -1.0, 0.0, 0.7, 3.0] {
            let f = forward_from_yaw(yaw);
            let back = yaw_from_xz(f.x, f.z).unwrap();
            assert!(wrap_angle(back - yaw).abs() < 1.0e-5);

            let rotated = yaw_rotation(yaw) * na::Vector3::z();
            assert!((rotated - f).norm() < 1.0e-5);
            assert!(wrap_angle(yaw_of(&yaw_rotation(yaw)) - yaw).abs() < 1.0e-5);
        }
    }

    #[test]
    fn yaw_from_zero_vector_is_none() {
        assert!(yaw_from_xz(0.0, 0.0).is_none());
    }

    #[test]
    fn sanitize_delta_wraps_long_frames() {
        assert!((sanitize_delta(1.25) - 0.25).abs() < 1.0e-6);
        assert_eq!(sanitize_delta(f32::NAN), 0.0);
        assert_eq!(sanitize_delta(-0.1), 0.0);
        assert!((sanitize_delta(0.016) - 0.016).abs() < 1.0e-9);
    }

    #[test]
    fn exp_lerp_factor_is_bounded() {
        assert_eq!(exp_lerp_factor(11.0, 0.0), 0.0);
        let t = exp_lerp_factor(11.0, 1.0 / 60.0);
        assert!(t > 0.0 && t < 1.0);
    }

    #[test]
    fn angle_between_degenerate_is_zero() {
        let z = na::Vector3::zeros();
        assert_eq!(angle_between(&z, &na::Vector3::y()), 0.0);
        let a = angle_between(&na::Vector3::x(), &na::Vector3::y());
        assert!((a - PI / 2.0).abs() < 1.0e-6);
    }

    #[test]
    fn projection_onto_normal() {
        let n = na::Vector3::new(0.0, 1.0, 1.0);
        let p = project_onto(&na::Vector3::new(0.0, 2.0, 0.0), &n);
        assert!((p - na::Vector3::new(0.0, 1.0, 1.0)).norm() < 1.0e-6);
    }
}
