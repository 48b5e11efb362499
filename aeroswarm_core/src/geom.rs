//! Geometry and kinematics primitives.
//!
//! Coordinates follow the NED convention for vehicles: x north, y east,
//! z down. Angles are radians everywhere inside the core; degrees appear only
//! at boundary surfaces. Quaternions are w-first, identity `(1,0,0,0)`.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::clock::TimePoint;

/// Configurable-precision scalar used throughout the kernel.
pub type Real = f32;

/// Three-component vector of [`Real`].
pub type Vector3r = Vector3<Real>;

/// Unit quaternion of [`Real`], w-first convention.
pub type Quaternionr = UnitQuaternion<Real>;

/// Builds a unit quaternion from w-first components, renormalizing.
pub fn quat_from_wxyz(w: Real, x: Real, y: Real, z: Real) -> Quaternionr {
    UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z))
}

/// Rebuilds a unit quaternion from components already known to be normalized,
/// preserving them bit-for-bit. Wire adaptors rely on this for exact
/// round-trips.
pub fn quat_from_wxyz_unchecked(w: Real, x: Real, y: Real, z: Real) -> Quaternionr {
    UnitQuaternion::new_unchecked(Quaternion::new(w, x, y, z))
}

/// Transforms a world-frame vector into the body frame of `orientation`.
pub fn to_body_frame(world: &Vector3r, orientation: &Quaternionr) -> Vector3r {
    orientation.inverse_transform_vector(world)
}

/// Transforms a body-frame vector into the world frame.
pub fn to_world_frame(body: &Vector3r, orientation: &Quaternionr) -> Vector3r {
    orientation.transform_vector(body)
}

/// Position and orientation pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3r,
    pub orientation: Quaternionr,
}

impl Pose {
    pub fn new(position: Vector3r, orientation: Quaternionr) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Pose at the origin with identity orientation.
    pub fn zero() -> Self {
        Self {
            position: Vector3r::zeros(),
            orientation: Quaternionr::identity(),
        }
    }

    /// Rotates a local offset into this pose's frame and translates it.
    pub fn transform(&self, local: &Vector3r) -> Vector3r {
        self.position + self.orientation.transform_vector(local)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::zero()
    }
}

/// Linear and angular velocity pair. Angular is body-frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub linear: Vector3r,
    pub angular: Vector3r,
}

/// Linear and angular acceleration pair. Angular is body-frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Accelerations {
    pub linear: Vector3r,
    pub angular: Vector3r,
}

/// Full ground-truth kinematic state of a rigid body.
///
/// Invariant: `pose.orientation` is normalized after every physics update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub pose: Pose,
    pub twist: Twist,
    pub accelerations: Accelerations,
}

impl Kinematics {
    pub fn at_pose(pose: Pose) -> Self {
        Self {
            pose,
            twist: Twist::default(),
            accelerations: Accelerations::default(),
        }
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.pose.position.iter().all(|v| v.is_finite())
            && self.pose.orientation.coords.iter().all(|v| v.is_finite())
            && self.twist.linear.iter().all(|v| v.is_finite())
            && self.twist.angular.iter().all(|v| v.is_finite())
            && self.accelerations.linear.iter().all(|v| v.is_finite())
            && self.accelerations.angular.iter().all(|v| v.is_finite())
    }
}

impl Default for Kinematics {
    fn default() -> Self {
        Self::at_pose(Pose::zero())
    }
}

/// Geodetic coordinate. Latitude/longitude in degrees, altitude in meters
/// above mean sea level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Real,
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self {
            latitude: 47.641468,
            longitude: -122.140165,
            altitude: 122.0,
        }
    }
}

const EARTH_RADIUS_M: f64 = 6_378_137.0;

impl GeoPoint {
    /// Offsets this point by a NED displacement, using a local-tangent-plane
    /// approximation adequate for swarm-scale distances.
    pub fn offset_ned(&self, ned: &Vector3r) -> GeoPoint {
        let lat_rad = self.latitude.to_radians();
        GeoPoint {
            latitude: self.latitude + (ned.x as f64 / EARTH_RADIUS_M).to_degrees(),
            longitude: self.longitude
                + (ned.y as f64 / (EARTH_RADIUS_M * lat_rad.cos())).to_degrees(),
            altitude: self.altitude - ned.z,
        }
    }
}

/// Collision report surfaced on vehicle state.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionInfo {
    pub has_collided: bool,
    pub normal: Vector3r,
    pub impact_point: Vector3r,
    pub position: Vector3r,
    pub penetration_depth: Real,
    pub time_stamp: TimePoint,
    pub object_name: String,
    pub object_id: i32,
}

impl Default for CollisionInfo {
    fn default() -> Self {
        Self {
            has_collided: false,
            normal: Vector3r::zeros(),
            impact_point: Vector3r::zeros(),
            position: Vector3r::zeros(),
            penetration_depth: 0.0,
            time_stamp: 0,
            object_name: String::new(),
            object_id: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quat_identity_is_w_first() {
        let q = Quaternionr::identity();
        assert_eq!(q.w, 1.0);
        assert_eq!(q.i, 0.0);
    }

    #[test]
    fn test_pose_transform_rotates_then_translates() {
        // 90 degrees yaw about +z turns +x into +y.
        let yaw = quat_from_wxyz(
            (std::f32::consts::FRAC_PI_4).cos(),
            0.0,
            0.0,
            (std::f32::consts::FRAC_PI_4).sin(),
        );
        let pose = Pose::new(Vector3r::new(1.0, 2.0, 3.0), yaw);
        let p = pose.transform(&Vector3r::new(1.0, 0.0, 0.0));
        assert!((p.x - 1.0).abs() < 1e-5);
        assert!((p.y - 3.0).abs() < 1e-5);
        assert!((p.z - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_body_world_frame_inverse() {
        let q = quat_from_wxyz(0.9238795, 0.0, 0.3826834, 0.0);
        let v = Vector3r::new(1.0, -2.0, 0.5);
        let roundtrip = to_world_frame(&to_body_frame(&v, &q), &q);
        assert!((roundtrip - v).norm() < 1e-5);
    }

    #[test]
    fn test_geo_offset_moves_north_and_down() {
        let home = GeoPoint::default();
        let moved = home.offset_ned(&Vector3r::new(111.0, 0.0, -10.0));
        assert!(moved.latitude > home.latitude);
        assert_eq!(moved.longitude, home.longitude);
        assert!((moved.altitude - (home.altitude + 10.0)).abs() < 1e-4);
    }

    #[test]
    fn test_kinematics_nan_detection() {
        let mut k = Kinematics::default();
        assert!(k.is_finite());
        k.twist.linear.x = Real::NAN;
        assert!(!k.is_finite());
    }
}
