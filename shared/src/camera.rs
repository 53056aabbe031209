//! Third-person follow camera.
//!
//! The rig is a pivot that trails the character (yaw lives here) and an orbit arm hanging off
//! the pivot (pitch and distance). The nominal distance is the authoritative state; the arm's
//! effective length is pulled in when geometry blocks the line of sight and eased back out.
//! Camera world position is derived from the rig every frame and only ever smoothed toward it.
//!
//! Notes
//! - Distances are negative: the arm points down the pivot's local -Z.
//! - `max_distance` is the far bound, `min_distance` the near one.
//! - Collision candidates are maintained incrementally in [`CameraCollisionSet`] by whoever
//!   owns the scene graph; the rig only sees them through a [`CameraOccluder`].

use std::{collections::HashSet, hash::Hash};

use nalgebra as na;

use crate::{
    config::ControllerConfig,
    input::CameraDeltas,
    physics::{Point3, Vec3},
    utils::{exp_lerp_factor, wrap_angle, yaw_rotation},
};

/// Where to put the render camera this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
}

/// Line-of-sight query against the camera collision candidates.
pub trait CameraOccluder {
    /// Distance to the nearest candidate hit along `dir` (unit), up to `max_distance`.
    fn nearest_hit(&mut self, origin: Point3, dir: Vec3, max_distance: f32) -> Option<f32>;
}

/// Visible meshes the camera ray may collide with.
#[derive(Debug)]
pub struct CameraCollisionSet<Id> {
    members: HashSet<Id>,
}

impl<Id> Default for CameraCollisionSet<Id> {
    fn default() -> Self {
        Self {
            members: HashSet::new(),
        }
    }
}

impl<Id: Copy + Eq + Hash> CameraCollisionSet<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Id) -> bool {
        self.members.insert(id)
    }

    pub fn remove(&mut self, id: &Id) -> bool {
        self.members.remove(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Id> {
        self.members.iter()
    }
}

/// Camera settings copied out of [`ControllerConfig`] at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSettings {
    pub max_distance: f32,
    pub min_distance: f32,
    pub up_limit: f32,
    pub low_limit: f32,
    pub collision: bool,
    pub collision_offset: f32,
    pub collision_speed_mult: f32,
    pub follow_mult: f32,
    pub lerp_mult: f32,
    pub target_offset: Vec3,
    pub pivot_height: f32,
    pub fixed_view: Option<CameraPose>,
}

impl CameraSettings {
    pub fn from_config(cfg: &ControllerConfig) -> Self {
        let cam = &cfg.camera;
        Self {
            max_distance: cam.max_distance,
            min_distance: cam.min_distance,
            up_limit: cam.up_limit,
            low_limit: cam.low_limit,
            collision: cam.collision,
            collision_offset: cam.collision_offset,
            collision_speed_mult: cam.collision_speed_mult,
            follow_mult: cam.follow_mult,
            lerp_mult: cam.lerp_mult,
            target_offset: Vec3::from(cam.target_offset),
            pivot_height: cfg.camera_pivot_height(),
            fixed_view: cam.disable_follow.as_ref().map(|view| CameraPose {
                position: Vec3::from(view.position),
                target: Vec3::from(view.target),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FollowCamera {
    settings: CameraSettings,
    pivot_position: Vec3,
    pivot_target: Vec3,
    pivot_yaw: f32,
    pitch: f32,
    /// Nominal arm length, the authoritative distance.
    distance: f32,
    /// Arm in pivot space after collision, eased toward its target every frame.
    arm: Vec3,
    position: Vec3,
    settled: bool,
}

/// Arm vector for a (negative) `distance` at `pitch`, in pivot space.
#[inline]
fn arm_offset(distance: f32, pitch: f32) -> Vec3 {
    Vec3::new(0.0, distance * (-pitch).sin(), distance * (-pitch).cos())
}

impl FollowCamera {
    pub fn new(cfg: &ControllerConfig) -> Self {
        let settings = CameraSettings::from_config(cfg);
        let [pitch, yaw] = cfg.camera.init_dir;
        let pitch = pitch.clamp(settings.low_limit, settings.up_limit);
        let distance = cfg
            .camera
            .init_distance
            .clamp(settings.max_distance, settings.min_distance);
        Self {
            settings,
            pivot_position: Vec3::zeros(),
            pivot_target: Vec3::zeros(),
            pivot_yaw: wrap_angle(yaw),
            pitch,
            distance,
            arm: arm_offset(distance, pitch),
            position: Vec3::zeros(),
            settled: false,
        }
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Take new limits from `cfg`, pulling pitch and distance back inside them.
    pub fn reconfigure(&mut self, cfg: &ControllerConfig) {
        self.settings = CameraSettings::from_config(cfg);
        self.pitch = self.pitch.clamp(self.settings.low_limit, self.settings.up_limit);
        self.distance = self
            .distance
            .clamp(self.settings.max_distance, self.settings.min_distance);
        self.clamp_arm();
    }

    #[inline]
    pub fn pivot_yaw(&self) -> f32 {
        self.pivot_yaw
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Nominal distance, before collision.
    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Current arm length after collision easing, negative like `distance`.
    pub fn effective_distance(&self) -> f32 {
        -self.arm.norm()
    }

    pub fn pivot_position(&self) -> Vec3 {
        self.pivot_position
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn pivot_rotation(&self) -> na::UnitQuaternion<f32> {
        yaw_rotation(self.pivot_yaw)
    }

    /// Point the pivot should trail toward, given the character body center.
    pub fn follow(&mut self, body_center: Vec3) {
        let offset = self.settings.target_offset;
        let rot = self.pivot_rotation();
        self.pivot_target = body_center
            + rot * Vec3::new(offset.x, 0.0, offset.z)
            + Vec3::y() * (offset.y + self.settings.pivot_height);
    }

    pub fn add_pivot_yaw(&mut self, delta: f32) {
        if delta.is_finite() {
            self.pivot_yaw = wrap_angle(self.pivot_yaw + delta);
        }
    }

    pub fn set_pivot_yaw(&mut self, yaw: f32) {
        if yaw.is_finite() {
            self.pivot_yaw = wrap_angle(yaw);
        }
    }

    /// Orbit by the given deltas. Pitch is clamped to the configured limits.
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        if !delta_yaw.is_finite() || !delta_pitch.is_finite() {
            return;
        }
        self.pivot_yaw = wrap_angle(self.pivot_yaw + delta_yaw);
        let pitch = (self.pitch + delta_pitch).clamp(self.settings.low_limit, self.settings.up_limit);
        if pitch != self.pitch {
            self.pitch = pitch;
            // Swing the current arm without changing its length.
            self.arm = arm_offset(self.effective_distance(), pitch);
        }
    }

    /// Change the nominal distance; positive moves closer. Clamped to the bounds.
    pub fn zoom(&mut self, delta: f32) {
        if delta.is_finite() {
            self.distance =
                (self.distance + delta).clamp(self.settings.max_distance, self.settings.min_distance);
        }
    }

    pub fn apply(&mut self, deltas: CameraDeltas) {
        self.rotate(deltas.yaw, deltas.pitch);
        self.zoom(deltas.zoom);
    }

    /// Ease pivot and arm, resolve collision and return the camera pose.
    pub fn step(&mut self, dt: f32, occluder: Option<&mut dyn CameraOccluder>) -> CameraPose {
        if !self.settled {
            self.pivot_position = self.pivot_target;
        } else {
            let t = exp_lerp_factor(self.settings.follow_mult, dt);
            self.pivot_position = self.pivot_position.lerp(&self.pivot_target, t);
        }

        let rot = self.pivot_rotation();
        let wanted = self.resolve_collision(rot, occluder);
        let target_arm = arm_offset(wanted, self.pitch);
        if !self.settled {
            self.arm = target_arm;
        } else {
            let t = exp_lerp_factor(self.settings.collision_speed_mult, dt);
            self.arm = self.arm.lerp(&target_arm, t);
        }
        self.clamp_arm();

        let follow_point = self.pivot_position + rot * self.arm;
        if !self.settled {
            self.position = follow_point;
            self.settled = true;
        } else {
            let t = exp_lerp_factor(self.settings.lerp_mult, dt);
            self.position = self.position.lerp(&follow_point, t);
        }

        if let Some(fixed) = self.settings.fixed_view {
            return fixed;
        }
        CameraPose {
            position: self.position,
            target: self.pivot_position,
        }
    }

    /// Distance the arm should have this frame.
    fn resolve_collision(
        &self,
        rot: na::UnitQuaternion<f32>,
        occluder: Option<&mut dyn CameraOccluder>,
    ) -> f32 {
        let Some(occluder) = occluder.filter(|_| self.settings.collision) else {
            return self.distance;
        };
        let dir = rot * arm_offset(-1.0, self.pitch);
        let Some(dir) = dir.try_normalize(f32::EPSILON) else {
            return self.distance;
        };
        let origin = Point3::from(self.pivot_position);
        match occluder.nearest_hit(origin, dir, -self.settings.max_distance) {
            Some(hit) if hit <= -self.distance => {
                (-hit * self.settings.collision_offset).min(self.settings.min_distance)
            }
            _ => self.distance,
        }
    }

    fn clamp_arm(&mut self) {
        let len = self.arm.norm();
        let near = -self.settings.min_distance;
        let far = -self.settings.max_distance;
        if len < near || len > far {
            self.arm = arm_offset(-len.clamp(near, far), self.pitch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Occluder with a wall at a fixed distance from the pivot, or none.
    struct Wall(Option<f32>);

    impl CameraOccluder for Wall {
        fn nearest_hit(&mut self, _origin: Point3, _dir: Vec3, max_distance: f32) -> Option<f32> {
            self.0.filter(|d| *d <= max_distance)
        }
    }

    fn camera() -> FollowCamera {
        let mut cam = FollowCamera::new(&ControllerConfig::default());
        cam.follow(Vec3::zeros());
        cam.step(1.0 / 60.0, None);
        cam
    }

    #[test]
    fn starts_at_initial_distance_behind_pivot() {
        let cam = camera();
        assert!((cam.effective_distance() + 5.0).abs() < 1.0e-5);
        // Behind = -Z of the pivot, at pivot height 0.5.
        assert!((cam.position() - Vec3::new(0.0, 0.5, -5.0)).norm() < 1.0e-4);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = camera();
        cam.rotate(0.0, 10.0);
        assert!((cam.pitch() - 1.5).abs() < 1.0e-6);
        cam.rotate(0.0, -10.0);
        assert!((cam.pitch() + 1.3).abs() < 1.0e-6);
    }

    #[test]
    fn non_finite_rotation_is_ignored() {
        let mut cam = camera();
        cam.rotate(f32::NAN, 0.1);
        cam.zoom(f32::INFINITY);
        assert_eq!(cam.pitch(), 0.0);
        assert!((cam.distance() + 5.0).abs() < 1.0e-6);
    }

    #[test]
    fn zoom_is_clamped_to_bounds() {
        let mut cam = camera();
        cam.zoom(100.0);
        assert!((cam.distance() + 0.7).abs() < 1.0e-6);
        cam.zoom(-100.0);
        assert!((cam.distance() + 7.0).abs() < 1.0e-6);
    }

    #[test]
    fn collision_pulls_in_then_restores() {
        let mut cam = camera();
        let dt = 1.0 / 60.0;

        let mut wall = Wall(Some(2.0));
        for _ in 0..300 {
            cam.step(dt, Some(&mut wall));
        }
        // 2.0 * 0.7 in front of the wall.
        assert!((cam.effective_distance() + 1.4).abs() < 1.0e-3);
        // Nominal distance is untouched.
        assert!((cam.distance() + 5.0).abs() < 1.0e-6);

        let mut clear = Wall(None);
        for _ in 0..300 {
            cam.step(dt, Some(&mut clear));
        }
        assert!((cam.effective_distance() + 5.0).abs() < 1.0e-3);
    }

    #[test]
    fn very_close_hits_keep_min_distance() {
        let mut cam = camera();
        let mut wall = Wall(Some(0.1));
        for _ in 0..300 {
            cam.step(1.0 / 60.0, Some(&mut wall));
        }
        assert!((cam.effective_distance() + 0.7).abs() < 1.0e-3);
    }

    #[test]
    fn hits_beyond_nominal_distance_are_ignored() {
        let mut cam = camera();
        let mut wall = Wall(Some(6.0));
        for _ in 0..100 {
            cam.step(1.0 / 60.0, Some(&mut wall));
        }
        assert!((cam.effective_distance() + 5.0).abs() < 1.0e-3);
    }

    #[test]
    fn effective_distance_stays_in_bounds() {
        let mut cam = camera();
        let walls = [0.05, 7.5, 1.0, 3.3, 0.0, 6.9, 2.2];
        for (i, hit) in walls.iter().cycle().take(400).enumerate() {
            if i % 37 == 0 {
                cam.zoom(if i % 2 == 0 { -1.3 } else { 0.9 });
            }
            let mut wall = Wall(Some(*hit));
            cam.step(0.25, Some(&mut wall));
            let d = cam.effective_distance();
            assert!(
                (-7.0 - 1.0e-4..=-0.7 + 1.0e-4).contains(&d),
                "distance {d} out of bounds at {i}"
            );
        }
    }

    #[test]
    fn pivot_trails_target_with_exponential_smoothing() {
        let mut cam = camera();
        cam.follow(Vec3::new(10.0, 0.0, 0.0));
        let dt = 0.1;
        cam.step(dt, None);
        let expected = 10.0 * exp_lerp_factor(11.0, dt);
        assert!((cam.pivot_position().x - expected).abs() < 1.0e-4);
    }

    #[test]
    fn target_offset_is_in_pivot_space() {
        let mut cfg = ControllerConfig::default();
        cfg.camera.target_offset = [0.0, 0.0, 1.0];
        cfg.camera.init_dir = [0.0, std::f32::consts::FRAC_PI_2];
        let mut cam = FollowCamera::new(&cfg);
        cam.follow(Vec3::zeros());
        cam.step(0.016, None);
        // Yaw PI/2 turns pivot +Z onto world +X.
        assert!((cam.pivot_position() - Vec3::new(1.0, 0.5, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn fixed_view_pins_the_pose() {
        let mut cfg = ControllerConfig::default();
        cfg.camera.disable_follow = Some(crate::config::FixedCameraView {
            position: [0.0, 10.0, 10.0],
            target: [0.0, 0.0, 0.0],
        });
        let mut cam = FollowCamera::new(&cfg);
        cam.follow(Vec3::new(3.0, 0.0, 3.0));
        let pose = cam.step(0.016, None);
        assert_eq!(pose.position, Vec3::new(0.0, 10.0, 10.0));
        assert_eq!(pose.target, Vec3::zeros());
    }
}
