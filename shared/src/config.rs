//! Controller configuration.
//!
//! A single immutable [`ControllerConfig`] is built at startup (defaults, or a TOML file
//! layered over the defaults) and handed to the control loop. Live tuning goes through
//! [`ControllerConfig::apply_override`], which validates and returns a fresh value instead
//! of mutating the one in use.
//!
//! Notes
//! - Distances are in meters, angles in radians, time in seconds unless stated.
//! - Camera distances are negative: the camera sits behind the pivot on its local -Z.
//! - Values derived from the capsule geometry are `Option`s; `None` means "derive it".

use std::{path::Path, time::Duration};

use nalgebra as na;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::{
    bitmask_flags::{ControlMode, ControlModes},
    constants::{
        DEFAULT_WAKE_UP_DELAY, GROUND_RAY_EXTRA_LENGTH, SLOPE_RAY_EXTRA_LENGTH, SLOPE_RAY_INSET,
    },
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown control mode `{0}`")]
    UnknownMode(String),
    #[error("`{field}` must be finite, got {value}")]
    NonFinite { field: &'static str, value: f32 },
    #[error("`{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("camera distances must be negative (max {max}, min {min})")]
    CameraDistanceSign { max: f32, min: f32 },
    #[error("camera max distance {max} must be farther than min distance {min}")]
    CameraDistanceBounds { max: f32, min: f32 },
    #[error("camera initial distance {init} outside [{max}, {min}]")]
    CameraInitDistance { init: f32, max: f32, min: f32 },
    #[error("camera pitch limits inverted (low {low}, up {up})")]
    PitchBounds { low: f32, up: f32 },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CapsuleConfig {
    pub half_height: f32,
    pub radius: f32,
    /// Gap kept between the capsule bottom and the ground.
    pub float_height: f32,
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            half_height: 0.35,
            radius: 0.3,
            float_height: 0.3,
        }
    }
}

/// Ground ray and suspension spring.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FloatingConfig {
    /// Ray origin relative to the body center. Defaults to the capsule's lower sphere center.
    pub ray_origin_offset: Option<[f32; 3]>,
    pub hit_forgiveness: f32,
    pub ray_length: Option<f32>,
    /// Distance from the ray origin to the ground at rest. Defaults to `radius + float_height`.
    pub rest_distance: Option<f32>,
    pub spring_k: f32,
    pub damping_c: f32,
}

impl Default for FloatingConfig {
    fn default() -> Self {
        Self {
            ray_origin_offset: None,
            hit_forgiveness: 0.1,
            ray_length: None,
            rest_distance: None,
            spring_k: 1.2,
            damping_c: 0.08,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SlopeConfig {
    pub max_angle: f32,
    /// Forward offset of the slope ray from the ground ray origin.
    pub ray_origin_offset: Option<f32>,
    pub ray_length: Option<f32>,
    pub up_extra_force: f32,
    pub down_extra_force: f32,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            max_angle: 1.0,
            ray_origin_offset: None,
            ray_length: None,
            up_extra_force: 0.1,
            down_extra_force: 0.2,
        }
    }
}

/// Auto-balance torque springs. Y uses its own, usually softer, constants.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub enabled: bool,
    pub spring_k: f32,
    pub damping_c: f32,
    pub spring_on_y: f32,
    pub damping_on_y: f32,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spring_k: 0.3,
            damping_c: 0.03,
            spring_on_y: 0.5,
            damping_on_y: 0.015,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    pub max_vel_limit: f32,
    /// Fraction of the movement impulse applied while still turning.
    pub turn_vel_multiplier: f32,
    /// Facing indicator turn rate (rad/s).
    pub turn_speed: f32,
    pub sprint_mult: f32,
    pub jump_vel: f32,
    pub jump_force_to_ground_mult: f32,
    pub slope_jump_mult: f32,
    pub sprint_jump_mult: f32,
    pub air_drag_multiplier: f32,
    pub drag_damping_c: f32,
    /// Time constant dividing the velocity error into an acceleration.
    pub acc_delta_time: f32,
    pub reject_vel_mult: f32,
    /// Height above the body center where the movement impulse is applied.
    pub move_impulse_point_y: f32,
    pub initial_gravity_scale: f32,
    pub falling_gravity_scale: f32,
    /// Vertical velocity below which gravity is switched off.
    pub falling_max_vel: f32,
    /// Initial facing yaw.
    pub character_init_dir: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            max_vel_limit: 2.5,
            turn_vel_multiplier: 0.2,
            turn_speed: 15.0,
            sprint_mult: 2.0,
            jump_vel: 4.0,
            jump_force_to_ground_mult: 5.0,
            slope_jump_mult: 0.25,
            sprint_jump_mult: 1.2,
            air_drag_multiplier: 0.2,
            drag_damping_c: 0.15,
            acc_delta_time: 8.0,
            reject_vel_mult: 4.0,
            move_impulse_point_y: 0.5,
            initial_gravity_scale: 1.0,
            falling_gravity_scale: 2.5,
            falling_max_vel: -20.0,
            character_init_dir: 0.0,
        }
    }
}

/// Camera pinned in world space instead of following the character.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FixedCameraView {
    pub position: [f32; 3],
    pub target: [f32; 3],
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub init_distance: f32,
    /// Far bound (most negative).
    pub max_distance: f32,
    /// Near bound (least negative).
    pub min_distance: f32,
    /// Initial `[pitch, yaw]`.
    pub init_dir: [f32; 2],
    /// Look target offset in pivot space.
    pub target_offset: [f32; 3],
    pub up_limit: f32,
    pub low_limit: f32,
    pub move_speed: f32,
    pub zoom_speed: f32,
    pub collision: bool,
    pub collision_offset: f32,
    pub collision_speed_mult: f32,
    pub follow_mult: f32,
    pub lerp_mult: f32,
    pub fixed_rot_mult: f32,
    pub disable_follow: Option<FixedCameraView>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            init_distance: -5.0,
            max_distance: -7.0,
            min_distance: -0.7,
            init_dir: [0.0, 0.0],
            target_offset: [0.0, 0.0, 0.0],
            up_limit: 1.5,
            low_limit: -1.3,
            move_speed: 1.0,
            zoom_speed: 1.0,
            collision: true,
            collision_offset: 0.7,
            collision_speed_mult: 4.0,
            follow_mult: 11.0,
            lerp_mult: 25.0,
            fixed_rot_mult: 1.0,
            disable_follow: None,
        }
    }
}

/// Gamepad button indices (standard mapping).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControllerKeys {
    pub forward: usize,
    pub backward: usize,
    pub leftward: usize,
    pub rightward: usize,
    pub jump: usize,
    pub action1: usize,
    pub action2: usize,
    pub action3: usize,
    pub action4: usize,
}

impl Default for ControllerKeys {
    fn default() -> Self {
        Self {
            forward: 12,
            backward: 13,
            leftward: 14,
            rightward: 15,
            jump: 2,
            action1: 11,
            action2: 3,
            action3: 1,
            action4: 0,
        }
    }
}

/// Point-to-move wall sensor, a cylinder in front of the body.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// `[half_height, radius]`.
    pub size: Option<[f32; 2]>,
    pub position: Option<[f32; 3]>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub capsule: CapsuleConfig,
    pub floating: FloatingConfig,
    pub slope: SlopeConfig,
    pub balance: BalanceConfig,
    pub locomotion: LocomotionConfig,
    pub camera: CameraConfig,
    pub keys: ControllerKeys,
    pub sensor: SensorConfig,
    #[serde(rename = "mode", deserialize_with = "deserialize_modes")]
    pub modes: ControlModes,
    /// Emit locomotion signals to the animation state machine.
    pub animated: bool,
    /// Keep publishing status and following with the camera, but apply no forces.
    pub disable_control: bool,
    pub wake_up_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            capsule: CapsuleConfig::default(),
            floating: FloatingConfig::default(),
            slope: SlopeConfig::default(),
            balance: BalanceConfig::default(),
            locomotion: LocomotionConfig::default(),
            camera: CameraConfig::default(),
            keys: ControllerKeys::default(),
            sensor: SensorConfig::default(),
            modes: ControlModes::default(),
            animated: true,
            disable_control: false,
            wake_up_delay_ms: DEFAULT_WAKE_UP_DELAY.as_millis() as u64,
        }
    }
}

/// Parse a space separated mode string such as `"PointToMove FixedCamera"`.
pub fn parse_modes(text: &str) -> Result<ControlModes, ConfigError> {
    ControlModes::parse_names::<ControlMode>(text).map_err(ConfigError::UnknownMode)
}

fn deserialize_modes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ControlModes, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_modes(&text).map_err(serde::de::Error::custom)
}

impl ControllerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    #[inline]
    pub fn has_mode(&self, mode: ControlMode) -> bool {
        self.modes.has(mode)
    }

    pub fn rest_distance(&self) -> f32 {
        self.floating
            .rest_distance
            .unwrap_or(self.capsule.radius + self.capsule.float_height)
    }

    pub fn ground_ray_origin_offset(&self) -> na::Vector3<f32> {
        self.floating
            .ray_origin_offset
            .map(na::Vector3::from)
            .unwrap_or_else(|| na::Vector3::new(0.0, -self.capsule.half_height, 0.0))
    }

    pub fn ground_ray_length(&self) -> f32 {
        self.floating
            .ray_length
            .unwrap_or(self.capsule.radius + GROUND_RAY_EXTRA_LENGTH)
    }

    pub fn slope_ray_origin_offset(&self) -> f32 {
        self.slope
            .ray_origin_offset
            .unwrap_or(self.capsule.radius - SLOPE_RAY_INSET)
    }

    pub fn slope_ray_length(&self) -> f32 {
        self.slope
            .ray_length
            .unwrap_or(self.capsule.radius + SLOPE_RAY_EXTRA_LENGTH)
    }

    /// `[half_height, radius]` of the point-to-move wall sensor.
    pub fn body_sensor_size(&self) -> [f32; 2] {
        self.sensor
            .size
            .unwrap_or([self.capsule.half_height / 2.0, self.capsule.radius])
    }

    pub fn body_sensor_position(&self) -> na::Vector3<f32> {
        self.sensor
            .position
            .map(na::Vector3::from)
            .unwrap_or_else(|| na::Vector3::new(0.0, 0.0, self.capsule.radius / 2.0))
    }

    /// Height of the camera pivot above the body center.
    pub fn camera_pivot_height(&self) -> f32 {
        self.capsule.half_height + self.capsule.radius / 2.0
    }

    /// Fixed-camera mode steers the pivot with the movement keys, so look and zoom are off.
    pub fn camera_move_speed(&self) -> f32 {
        if self.has_mode(ControlMode::FixedCamera) {
            0.0
        } else {
            self.camera.move_speed
        }
    }

    pub fn camera_zoom_speed(&self) -> f32 {
        if self.has_mode(ControlMode::FixedCamera) {
            0.0
        } else {
            self.camera.zoom_speed
        }
    }

    pub fn wake_up_delay(&self) -> Duration {
        Duration::from_millis(self.wake_up_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("capsule.half_height", self.capsule.half_height),
            ("capsule.radius", self.capsule.radius),
            ("capsule.float_height", self.capsule.float_height),
            ("floating.hit_forgiveness", self.floating.hit_forgiveness),
            ("floating.spring_k", self.floating.spring_k),
            ("floating.damping_c", self.floating.damping_c),
            ("floating.rest_distance", self.rest_distance()),
            ("floating.ray_length", self.ground_ray_length()),
            ("slope.max_angle", self.slope.max_angle),
            ("slope.ray_origin_offset", self.slope_ray_origin_offset()),
            ("slope.ray_length", self.slope_ray_length()),
            ("slope.up_extra_force", self.slope.up_extra_force),
            ("slope.down_extra_force", self.slope.down_extra_force),
            ("balance.spring_k", self.balance.spring_k),
            ("balance.damping_c", self.balance.damping_c),
            ("balance.spring_on_y", self.balance.spring_on_y),
            ("balance.damping_on_y", self.balance.damping_on_y),
            ("locomotion.max_vel_limit", self.locomotion.max_vel_limit),
            ("locomotion.turn_vel_multiplier", self.locomotion.turn_vel_multiplier),
            ("locomotion.turn_speed", self.locomotion.turn_speed),
            ("locomotion.sprint_mult", self.locomotion.sprint_mult),
            ("locomotion.jump_vel", self.locomotion.jump_vel),
            ("locomotion.jump_force_to_ground_mult", self.locomotion.jump_force_to_ground_mult),
            ("locomotion.slope_jump_mult", self.locomotion.slope_jump_mult),
            ("locomotion.sprint_jump_mult", self.locomotion.sprint_jump_mult),
            ("locomotion.air_drag_multiplier", self.locomotion.air_drag_multiplier),
            ("locomotion.drag_damping_c", self.locomotion.drag_damping_c),
            ("locomotion.acc_delta_time", self.locomotion.acc_delta_time),
            ("locomotion.reject_vel_mult", self.locomotion.reject_vel_mult),
            ("locomotion.move_impulse_point_y", self.locomotion.move_impulse_point_y),
            ("locomotion.initial_gravity_scale", self.locomotion.initial_gravity_scale),
            ("locomotion.falling_gravity_scale", self.locomotion.falling_gravity_scale),
            ("locomotion.falling_max_vel", self.locomotion.falling_max_vel),
            ("locomotion.character_init_dir", self.locomotion.character_init_dir),
            ("camera.init_distance", self.camera.init_distance),
            ("camera.max_distance", self.camera.max_distance),
            ("camera.min_distance", self.camera.min_distance),
            ("camera.up_limit", self.camera.up_limit),
            ("camera.low_limit", self.camera.low_limit),
            ("camera.move_speed", self.camera.move_speed),
            ("camera.zoom_speed", self.camera.zoom_speed),
            ("camera.collision_offset", self.camera.collision_offset),
            ("camera.collision_speed_mult", self.camera.collision_speed_mult),
            ("camera.follow_mult", self.camera.follow_mult),
            ("camera.lerp_mult", self.camera.lerp_mult),
            ("camera.fixed_rot_mult", self.camera.fixed_rot_mult),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }

        let positive = [
            ("capsule.half_height", self.capsule.half_height),
            ("capsule.radius", self.capsule.radius),
            ("floating.rest_distance", self.rest_distance()),
            ("floating.ray_length", self.ground_ray_length()),
            ("slope.ray_length", self.slope_ray_length()),
            ("slope.ray_origin_offset", self.slope_ray_origin_offset()),
            ("locomotion.acc_delta_time", self.locomotion.acc_delta_time),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        let cam = &self.camera;
        if cam.max_distance >= 0.0 || cam.min_distance >= 0.0 {
            return Err(ConfigError::CameraDistanceSign {
                max: cam.max_distance,
                min: cam.min_distance,
            });
        }
        if cam.max_distance > cam.min_distance {
            return Err(ConfigError::CameraDistanceBounds {
                max: cam.max_distance,
                min: cam.min_distance,
            });
        }
        if cam.init_distance < cam.max_distance || cam.init_distance > cam.min_distance {
            return Err(ConfigError::CameraInitDistance {
                init: cam.init_distance,
                max: cam.max_distance,
                min: cam.min_distance,
            });
        }
        if cam.low_limit > cam.up_limit {
            return Err(ConfigError::PitchBounds {
                low: cam.low_limit,
                up: cam.up_limit,
            });
        }
        Ok(())
    }

    /// Layer `ov` over this config, returning the validated result.
    ///
    /// On error `self` is untouched, so callers can keep running with it.
    pub fn apply_override(&self, ov: &ConfigOverride) -> Result<Self, ConfigError> {
        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        let mut next = self.clone();

        set(&mut next.floating.spring_k, ov.spring_k);
        set(&mut next.floating.damping_c, ov.damping_c);
        set(&mut next.floating.hit_forgiveness, ov.hit_forgiveness);

        set(&mut next.slope.max_angle, ov.slope_max_angle);
        set(&mut next.slope.up_extra_force, ov.slope_up_extra_force);
        set(&mut next.slope.down_extra_force, ov.slope_down_extra_force);

        set(&mut next.balance.enabled, ov.auto_balance);
        set(&mut next.balance.spring_k, ov.balance_spring_k);
        set(&mut next.balance.damping_c, ov.balance_damping_c);
        set(&mut next.balance.spring_on_y, ov.balance_spring_on_y);
        set(&mut next.balance.damping_on_y, ov.balance_damping_on_y);

        let loco = &mut next.locomotion;
        set(&mut loco.max_vel_limit, ov.max_vel_limit);
        set(&mut loco.turn_vel_multiplier, ov.turn_vel_multiplier);
        set(&mut loco.turn_speed, ov.turn_speed);
        set(&mut loco.sprint_mult, ov.sprint_mult);
        set(&mut loco.jump_vel, ov.jump_vel);
        set(&mut loco.jump_force_to_ground_mult, ov.jump_force_to_ground_mult);
        set(&mut loco.slope_jump_mult, ov.slope_jump_mult);
        set(&mut loco.sprint_jump_mult, ov.sprint_jump_mult);
        set(&mut loco.air_drag_multiplier, ov.air_drag_multiplier);
        set(&mut loco.drag_damping_c, ov.drag_damping_c);
        set(&mut loco.acc_delta_time, ov.acc_delta_time);
        set(&mut loco.reject_vel_mult, ov.reject_vel_mult);
        set(&mut loco.move_impulse_point_y, ov.move_impulse_point_y);
        set(&mut loco.falling_gravity_scale, ov.falling_gravity_scale);
        set(&mut loco.falling_max_vel, ov.falling_max_vel);

        let cam = &mut next.camera;
        set(&mut cam.max_distance, ov.cam_max_distance);
        set(&mut cam.min_distance, ov.cam_min_distance);
        set(&mut cam.up_limit, ov.cam_up_limit);
        set(&mut cam.low_limit, ov.cam_low_limit);
        set(&mut cam.move_speed, ov.cam_move_speed);
        set(&mut cam.zoom_speed, ov.cam_zoom_speed);
        set(&mut cam.collision, ov.cam_collision);
        set(&mut cam.collision_offset, ov.cam_collision_offset);
        set(&mut cam.collision_speed_mult, ov.cam_collision_speed_mult);
        set(&mut cam.follow_mult, ov.cam_follow_mult);
        set(&mut cam.lerp_mult, ov.cam_lerp_mult);
        set(&mut cam.fixed_rot_mult, ov.cam_fixed_rot_mult);
        // Keep the initial distance inside tightened bounds instead of rejecting the override.
        cam.init_distance = cam.init_distance.clamp(
            cam.max_distance.min(cam.min_distance),
            cam.min_distance.max(cam.max_distance),
        );

        set(&mut next.animated, ov.animated);
        set(&mut next.disable_control, ov.disable_control);
        if let Some(mode) = &ov.mode {
            next.modes = parse_modes(mode)?;
        }

        next.validate()?;
        Ok(next)
    }
}

/// Live-tunable subset of [`ControllerConfig`]. Geometry is deliberately absent:
/// it is baked into the physics collider at spawn.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverride {
    pub spring_k: Option<f32>,
    pub damping_c: Option<f32>,
    pub hit_forgiveness: Option<f32>,
    pub slope_max_angle: Option<f32>,
    pub slope_up_extra_force: Option<f32>,
    pub slope_down_extra_force: Option<f32>,
    pub auto_balance: Option<bool>,
    pub balance_spring_k: Option<f32>,
    pub balance_damping_c: Option<f32>,
    pub balance_spring_on_y: Option<f32>,
    pub balance_damping_on_y: Option<f32>,
    pub max_vel_limit: Option<f32>,
    pub turn_vel_multiplier: Option<f32>,
    pub turn_speed: Option<f32>,
    pub sprint_mult: Option<f32>,
    pub jump_vel: Option<f32>,
    pub jump_force_to_ground_mult: Option<f32>,
    pub slope_jump_mult: Option<f32>,
    pub sprint_jump_mult: Option<f32>,
    pub air_drag_multiplier: Option<f32>,
    pub drag_damping_c: Option<f32>,
    pub acc_delta_time: Option<f32>,
    pub reject_vel_mult: Option<f32>,
    pub move_impulse_point_y: Option<f32>,
    pub falling_gravity_scale: Option<f32>,
    pub falling_max_vel: Option<f32>,
    pub cam_max_distance: Option<f32>,
    pub cam_min_distance: Option<f32>,
    pub cam_up_limit: Option<f32>,
    pub cam_low_limit: Option<f32>,
    pub cam_move_speed: Option<f32>,
    pub cam_zoom_speed: Option<f32>,
    pub cam_collision: Option<bool>,
    pub cam_collision_offset: Option<f32>,
    pub cam_collision_speed_mult: Option<f32>,
    pub cam_follow_mult: Option<f32>,
    pub cam_lerp_mult: Option<f32>,
    pub cam_fixed_rot_mult: Option<f32>,
    pub animated: Option<bool>,
    pub disable_control: Option<bool>,
    pub mode: Option<String>,
}

impl ConfigOverride {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_derive_from_capsule() {
        let cfg = ControllerConfig::default();
        cfg.validate().unwrap();

        assert!((cfg.rest_distance() - 0.6).abs() < 1.0e-6);
        assert!((cfg.ground_ray_length() - 2.3).abs() < 1.0e-6);
        assert!((cfg.slope_ray_origin_offset() - 0.27).abs() < 1.0e-6);
        assert!((cfg.slope_ray_length() - 3.3).abs() < 1.0e-6);
        assert!((cfg.ground_ray_origin_offset().y + 0.35).abs() < 1.0e-6);
        assert!((cfg.camera_pivot_height() - 0.5).abs() < 1.0e-6);
        assert_eq!(cfg.wake_up_delay(), Duration::from_millis(200));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = ControllerConfig::from_toml_str(
            r#"
            mode = "PointToMove CameraBasedMovement"

            [capsule]
            radius = 0.5

            [camera]
            init_distance = -3.0
            "#,
        )
        .unwrap();

        assert!(cfg.has_mode(ControlMode::PointToMove));
        assert!(cfg.has_mode(ControlMode::CameraBasedMovement));
        assert!(!cfg.has_mode(ControlMode::FixedCamera));
        // Derived values follow the new radius.
        assert!((cfg.rest_distance() - 0.8).abs() < 1.0e-6);
        assert!((cfg.camera.init_distance + 3.0).abs() < 1.0e-6);
        assert!((cfg.camera.max_distance + 7.0).abs() < 1.0e-6);
        assert_eq!(cfg.keys, ControllerKeys::default());
    }

    #[test]
    fn unknown_mode_in_toml_is_a_parse_error() {
        let err = ControllerConfig::from_toml_str(r#"mode = "Flying""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn inverted_camera_bounds_are_rejected() {
        let mut cfg = ControllerConfig::default();
        cfg.camera.max_distance = -0.5;
        cfg.camera.min_distance = -2.0;
        cfg.camera.init_distance = -1.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::CameraDistanceBounds { .. })
        ));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut cfg = ControllerConfig::default();
        cfg.floating.spring_k = f32::NAN;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonFinite {
                field: "floating.spring_k",
                ..
            })
        ));
    }

    #[test]
    fn fixed_camera_mode_disables_look_and_zoom() {
        let mut cfg = ControllerConfig::default();
        cfg.modes = parse_modes("FixedCamera").unwrap();
        assert_eq!(cfg.camera_move_speed(), 0.0);
        assert_eq!(cfg.camera_zoom_speed(), 0.0);
    }

    #[test]
    fn override_returns_new_config_and_leaves_base_untouched() {
        let base = ControllerConfig::default();
        let ov = ConfigOverride {
            max_vel_limit: Some(4.0),
            mode: Some("FixedCamera".into()),
            ..Default::default()
        };

        let next = base.apply_override(&ov).unwrap();
        assert!((next.locomotion.max_vel_limit - 4.0).abs() < 1.0e-6);
        assert!(next.has_mode(ControlMode::FixedCamera));
        assert!((base.locomotion.max_vel_limit - 2.5).abs() < 1.0e-6);
    }

    #[test]
    fn bad_override_is_rejected() {
        let base = ControllerConfig::default();
        let ov = ConfigOverride::from_toml_str("cam_low_limit = 2.0").unwrap();
        assert!(matches!(
            base.apply_override(&ov),
            Err(ConfigError::PitchBounds { .. })
        ));

        let ov = ConfigOverride {
            mode: Some("Teleport".into()),
            ..Default::default()
        };
        assert!(matches!(
            base.apply_override(&ov),
            Err(ConfigError::UnknownMode(_))
        ));
    }

    #[test]
    fn override_clamps_initial_distance_into_new_bounds() {
        let base = ControllerConfig::default();
        let ov = ConfigOverride {
            cam_max_distance: Some(-3.0),
            ..Default::default()
        };
        let next = base.apply_override(&ov).unwrap();
        assert!((next.camera.init_distance + 3.0).abs() < 1.0e-6);
    }
}
