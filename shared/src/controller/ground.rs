use crate::{
    bitmask_flags::SceneTag,
    config::ControllerConfig,
    constants::SLOPE_RAY_GROUND_MARGIN,
    physics::{BodyKind, PhysicsBackend, Point3, RayQuery, Vec3},
    utils::{angle_between, forward_from_yaw, round_centi},
};

/// One ray result with the body it belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactSample<B, C> {
    pub distance: f32,
    pub collider: C,
    pub normal: Vec3,
    /// Parent body of the hit collider, `None` for a parentless collider.
    pub body: Option<B>,
    pub kind: Option<BodyKind>,
}

/// Both rays for one frame plus everything derived from them.
#[derive(Clone, Copy, Debug)]
pub struct GroundScan<B, C> {
    pub ground: Option<ContactSample<B, C>>,
    pub slope: Option<ContactSample<B, C>>,
    /// Ground ray origin (world space).
    pub origin: Point3,
    pub grounded: bool,
    /// Grounded, slope ray hit and the surface under it is not too steep.
    pub walkable: bool,
    /// Angle between the slope ray's surface normal and world up.
    pub actual_slope_angle: f32,
    pub slope_normal: Vec3,
    /// Rise angle measured from the two ray distances, rounded to 0.01 rad.
    pub slope_angle: Option<f32>,
}

impl<B, C> GroundScan<B, C> {
    /// Where the character stands on the ground, below the ray origin.
    pub fn standing_point(&self) -> Option<Point3> {
        self.ground
            .as_ref()
            .map(|g| Point3::new(self.origin.x, self.origin.y - g.distance, self.origin.z))
    }
}

#[inline]
pub fn is_grounded(hit_distance: Option<f32>, rest_distance: f32, forgiveness: f32) -> bool {
    hit_distance.is_some_and(|d| d <= rest_distance + forgiveness)
}

/// Spring-damper force holding the body at `rest_distance` above the ground.
#[inline]
pub fn suspension_force(
    rest_distance: f32,
    hit_distance: f32,
    vertical_velocity: f32,
    spring_k: f32,
    damping_c: f32,
) -> f32 {
    spring_k * (rest_distance - hit_distance) - vertical_velocity * damping_c
}

/// Rise angle (rad) of the ground between the two ray hits, positive uphill.
#[inline]
pub fn measured_slope_angle(ground_distance: f32, slope_distance: f32, ray_offset: f32) -> f32 {
    round_centi(((ground_distance - slope_distance) / ray_offset).atan())
}

/// Cast the ground ray and, `facing_yaw` ahead of it, the slope ray.
///
/// Both rays skip sensors, the character's own body and any collider tagged
/// [`SceneTag::ExcludeCharacterRay`].
pub fn scan<P: PhysicsBackend>(
    physics: &P,
    body: P::BodyId,
    position: Vec3,
    facing_yaw: f32,
    cfg: &ControllerConfig,
) -> GroundScan<P::BodyId, P::ColliderId> {
    let accept = |collider: P::ColliderId| {
        !physics
            .collider_tags(collider)
            .has(SceneTag::ExcludeCharacterRay)
    };
    let cast = |origin: Point3, max_distance: f32| {
        let query = RayQuery {
            origin,
            dir: -Vec3::y(),
            max_distance,
            solid: false,
            exclude_sensors: true,
            exclude_body: Some(body),
        };
        physics.cast_ray(&query, &accept).map(|hit| {
            let parent = physics.collider_parent(hit.collider);
            ContactSample {
                distance: hit.distance,
                collider: hit.collider,
                normal: hit.normal,
                body: parent,
                kind: parent.and_then(|b| physics.body(b)).map(|s| s.kind),
            }
        })
    };

    let origin = Point3::from(position + cfg.ground_ray_origin_offset());
    let ground = cast(origin, cfg.ground_ray_length());

    // Slope ray shares the ground ray's height, pushed forward along the facing.
    let slope_origin = origin + forward_from_yaw(facing_yaw) * cfg.slope_ray_origin_offset();
    let slope = cast(slope_origin, cfg.slope_ray_length());

    let rest = cfg.rest_distance();
    let grounded = is_grounded(
        ground.as_ref().map(|g| g.distance),
        rest,
        cfg.floating.hit_forgiveness,
    );

    let (actual_slope_angle, slope_normal) = match &slope {
        Some(s) => (angle_between(&s.normal, &Vec3::y()), s.normal),
        None => (0.0, Vec3::y()),
    };
    let walkable = grounded && slope.is_some() && actual_slope_angle < cfg.slope.max_angle;

    let slope_angle = match (&ground, &slope) {
        (Some(g), Some(s)) if walkable && s.distance < rest + SLOPE_RAY_GROUND_MARGIN => Some(
            measured_slope_angle(g.distance, s.distance, cfg.slope_ray_origin_offset()),
        ),
        _ => None,
    };

    GroundScan {
        ground,
        slope,
        origin,
        grounded,
        walkable,
        actual_slope_angle,
        slope_normal,
        slope_angle,
    }
}
