use tracing::warn;

use crate::{
    constants::MAX_PLATFORM_VELOCITY_DIFF,
    physics::{BodySnapshot, Vec3},
};

/// What the character is riding this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovingPlatformState {
    pub linvel: Vec3,
    pub angvel: Vec3,
    /// Standing point on the platform (world space).
    pub contact_point: Vec3,
    /// Platform velocity carried into the movement impulse, already mass-scaled and clamped.
    pub velocity: Vec3,
    pub on_moving: bool,
    /// Character mass over platform mass, always positive.
    pub mass_ratio: f32,
}

impl Default for MovingPlatformState {
    fn default() -> Self {
        Self {
            linvel: Vec3::zeros(),
            angvel: Vec3::zeros(),
            contact_point: Vec3::zeros(),
            velocity: Vec3::zeros(),
            on_moving: false,
            mass_ratio: 1.0,
        }
    }
}

/// Falls back to 1 when either mass is missing or degenerate (fixed bodies report zero).
#[inline]
pub fn mass_ratio(character_mass: f32, platform_mass: f32) -> f32 {
    let ratio = character_mass / platform_mass;
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

/// Share of the platform's motion the character picks up; light platforms carry less.
#[inline]
pub fn carry_scale(mass_ratio: f32) -> f32 {
    (1.0 / mass_ratio).min(1.0)
}

/// Rescale `platform` so it differs from `current` by at most the anti-explosion bound.
///
/// Returns the (possibly) rescaled velocity and whether the bound kicked in.
pub fn clamp_platform_velocity(platform: Vec3, current: Vec3) -> (Vec3, bool) {
    let diff = platform - current;
    let len = diff.norm();
    if len > MAX_PLATFORM_VELOCITY_DIFF {
        (current + diff * (MAX_PLATFORM_VELOCITY_DIFF / len), true)
    } else {
        (platform, false)
    }
}

impl MovingPlatformState {
    /// Standing on a fixed body: nothing to ride, but the contact point is known.
    pub fn fixed(contact_point: Vec3) -> Self {
        Self {
            contact_point,
            ..Self::default()
        }
    }

    /// Couple to a dynamic or kinematic body.
    ///
    /// The spin term uses the offset from the platform origin to the character center; only
    /// the planar part of it is carried.
    pub fn couple(
        platform: &BodySnapshot,
        character_position: Vec3,
        character_velocity: Vec3,
        character_mass: f32,
        contact_point: Vec3,
    ) -> Self {
        let ratio = mass_ratio(character_mass, platform.mass);
        let spin = platform
            .angvel
            .cross(&(character_position - platform.translation));
        let raw = Vec3::new(
            platform.linvel.x + spin.x,
            platform.linvel.y,
            platform.linvel.z + spin.z,
        ) * carry_scale(ratio);

        let (velocity, clamped) = clamp_platform_velocity(raw, character_velocity);
        if clamped {
            warn!(
                platform = ?raw,
                character = ?character_velocity,
                "platform velocity too far from character velocity, rescaled"
            );
        }

        Self {
            linvel: platform.linvel,
            angvel: platform.angvel,
            contact_point,
            velocity,
            on_moving: true,
            mass_ratio: ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodyKind, Quat};

    fn platform(linvel: Vec3, angvel: Vec3, mass: f32) -> BodySnapshot {
        BodySnapshot {
            translation: Vec3::zeros(),
            rotation: Quat::identity(),
            linvel,
            angvel,
            mass,
            gravity_scale: 1.0,
            kind: BodyKind::Kinematic,
        }
    }

    #[test]
    fn mass_ratio_is_always_positive() {
        assert!((mass_ratio(2.0, 4.0) - 0.5).abs() < 1.0e-6);
        assert_eq!(mass_ratio(1.0, 0.0), 1.0);
        assert_eq!(mass_ratio(1.0, f32::NAN), 1.0);
        assert_eq!(mass_ratio(0.0, 5.0), 1.0);
    }

    #[test]
    fn rescales_absurd_platform_velocity_to_bound() {
        let current = Vec3::new(1.0, 0.0, 0.0);
        let (v, clamped) = clamp_platform_velocity(Vec3::new(100.0, 0.0, 0.0), current);
        assert!(clamped);
        assert!(((v - current).norm() - MAX_PLATFORM_VELOCITY_DIFF).abs() < 1.0e-4);

        let (v, clamped) = clamp_platform_velocity(Vec3::new(3.0, 0.0, 0.0), current);
        assert!(!clamped);
        assert_eq!(v, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn rotating_platform_carries_tangential_velocity() {
        // Spinning about +Y at 1 rad/s, character 2 m out on +X.
        let p = platform(Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0), 100.0);
        let state = MovingPlatformState::couple(
            &p,
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::zeros(),
            1.0,
            Vec3::new(2.0, 0.0, 0.0),
        );
        assert!(state.on_moving);
        assert!((state.velocity - Vec3::new(0.0, 0.0, -2.0)).norm() < 1.0e-5);
        // The vertical spin term is dropped, only the linear part counts.
        assert_eq!(state.velocity.y, 0.0);
    }

    #[test]
    fn light_platform_carries_less() {
        let p = platform(Vec3::new(2.0, 0.0, 0.0), Vec3::zeros(), 0.5);
        let state = MovingPlatformState::couple(&p, Vec3::zeros(), Vec3::zeros(), 1.0, Vec3::zeros());
        assert!((state.mass_ratio - 2.0).abs() < 1.0e-6);
        assert!((state.velocity.x - 1.0).abs() < 1.0e-6);
    }
}
