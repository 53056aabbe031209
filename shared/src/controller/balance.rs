use crate::{
    config::BalanceConfig,
    physics::{Quat, Vec3},
    utils::angle_between,
};

#[inline]
fn restoring_sign(cross_component: f32) -> f32 {
    if cross_component < 0.0 { 1.0 } else { -1.0 }
}

/// Corrective torque impulse bringing the body upright and its forward onto `facing`.
///
/// Each axis is an independent spring on the angle between the projected body axis and its
/// target, minus angular-velocity damping. Yaw uses the `*_on_y` constants.
pub fn balance_torque(rotation: &Quat, angvel: &Vec3, facing: &Vec3, cfg: &BalanceConfig) -> Vec3 {
    let up = Vec3::y();
    let body_forward = rotation * Vec3::z();
    let body_up = rotation * Vec3::y();

    let up_on_x = Vec3::new(0.0, body_up.y, body_up.z);
    let forward_on_y = Vec3::new(body_forward.x, 0.0, body_forward.z);
    let up_on_z = Vec3::new(body_up.x, body_up.y, 0.0);

    let cross_x = up.cross(&up_on_x);
    let cross_y = facing.cross(&forward_on_y);
    let cross_z = up.cross(&up_on_z);

    Vec3::new(
        restoring_sign(cross_x.x) * cfg.spring_k * angle_between(&up_on_x, &up)
            - angvel.x * cfg.damping_c,
        restoring_sign(cross_y.y) * cfg.spring_on_y * angle_between(facing, &forward_on_y)
            - angvel.y * cfg.damping_on_y,
        restoring_sign(cross_z.z) * cfg.spring_k * angle_between(&up_on_z, &up)
            - angvel.z * cfg.damping_c,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{forward_from_yaw, yaw_rotation};

    #[test]
    fn upright_and_aligned_body_needs_no_torque() {
        let cfg = BalanceConfig::default();
        let t = balance_torque(&Quat::identity(), &Vec3::zeros(), &Vec3::z(), &cfg);
        assert!(t.norm() < 1.0e-6);
    }

    #[test]
    fn pitched_body_is_pushed_back() {
        let cfg = BalanceConfig::default();
        let tilt = Quat::from_axis_angle(&Vec3::x_axis(), 0.3);
        let t = balance_torque(&tilt, &Vec3::zeros(), &Vec3::z(), &cfg);
        assert!((t.x + cfg.spring_k * 0.3).abs() < 1.0e-5);

        let tilt = Quat::from_axis_angle(&Vec3::z_axis(), -0.2);
        let t = balance_torque(&tilt, &Vec3::zeros(), &Vec3::z(), &cfg);
        assert!((t.z - cfg.spring_k * 0.2).abs() < 1.0e-5);
    }

    #[test]
    fn yaw_turns_toward_facing_with_its_own_spring() {
        let cfg = BalanceConfig::default();
        let body = yaw_rotation(0.4);
        let t = balance_torque(&body, &Vec3::zeros(), &forward_from_yaw(0.0), &cfg);
        assert!((t.y + cfg.spring_on_y * 0.4).abs() < 1.0e-5);
        assert!(t.x.abs() < 1.0e-6 && t.z.abs() < 1.0e-6);
    }

    #[test]
    fn spin_is_damped() {
        let cfg = BalanceConfig::default();
        let t = balance_torque(&Quat::identity(), &Vec3::new(1.0, 2.0, 3.0), &Vec3::z(), &cfg);
        assert!((t.x + cfg.damping_c).abs() < 1.0e-6);
        assert!((t.y + 2.0 * cfg.damping_on_y).abs() < 1.0e-6);
        assert!((t.z + 3.0 * cfg.damping_c).abs() < 1.0e-6);
    }
}
