//! Wire adaptor types: flat snake_case structs with exact `to_wire` /
//! `to_core` inverses.
//!
//! Conventions: vectors are `{x, y, z}`, quaternions `{w, x, y, z}`, enums
//! their numeric underlying values. Conversions preserve floats bit-for-bit;
//! the only unit translation on the whole surface is the yaw-mode
//! degree/radian swap, which is a boundary convention rather than a
//! round-tripped type.

use serde::{Deserialize, Serialize};

use aeroswarm_core::api::{CameraInfo, ImageRequest};
use aeroswarm_core::control::{DrivetrainType, FlightState, MultirotorState, RcData, YawMode};
use aeroswarm_core::geom::{
    quat_from_wxyz_unchecked, Accelerations, CollisionInfo, GeoPoint, Kinematics, Pose,
    Quaternionr, Real, Twist, Vector3r,
};
use aeroswarm_core::sensors::{
    BarometerData, DistanceSensorData, GpsData, GpsFixType, ImuData, LidarData, MagnetometerData,
};
use aeroswarm_core::vehicle::car::{CarControls, CarState};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector3Wire {
    pub x: Real,
    pub y: Real,
    pub z: Real,
}

impl Vector3Wire {
    pub fn to_wire(v: &Vector3r) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }

    pub fn to_core(&self) -> Vector3r {
        Vector3r::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionWire {
    pub w: Real,
    pub x: Real,
    pub y: Real,
    pub z: Real,
}

impl Default for QuaternionWire {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

impl QuaternionWire {
    pub fn to_wire(q: &Quaternionr) -> Self {
        Self {
            w: q.w,
            x: q.i,
            y: q.j,
            z: q.k,
        }
    }

    /// Wire quaternions are expected normalized; components are preserved
    /// bit-for-bit.
    pub fn to_core(&self) -> Quaternionr {
        quat_from_wxyz_unchecked(self.w, self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PoseWire {
    pub position: Vector3Wire,
    pub orientation: QuaternionWire,
}

impl PoseWire {
    pub fn to_wire(pose: &Pose) -> Self {
        Self {
            position: Vector3Wire::to_wire(&pose.position),
            orientation: QuaternionWire::to_wire(&pose.orientation),
        }
    }

    pub fn to_core(&self) -> Pose {
        Pose::new(self.position.to_core(), self.orientation.to_core())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct KinematicsWire {
    pub pose: PoseWire,
    pub linear_velocity: Vector3Wire,
    pub angular_velocity: Vector3Wire,
    pub linear_acceleration: Vector3Wire,
    pub angular_acceleration: Vector3Wire,
}

impl KinematicsWire {
    pub fn to_wire(k: &Kinematics) -> Self {
        Self {
            pose: PoseWire::to_wire(&k.pose),
            linear_velocity: Vector3Wire::to_wire(&k.twist.linear),
            angular_velocity: Vector3Wire::to_wire(&k.twist.angular),
            linear_acceleration: Vector3Wire::to_wire(&k.accelerations.linear),
            angular_acceleration: Vector3Wire::to_wire(&k.accelerations.angular),
        }
    }

    pub fn to_core(&self) -> Kinematics {
        Kinematics {
            pose: self.pose.to_core(),
            twist: Twist {
                linear: self.linear_velocity.to_core(),
                angular: self.angular_velocity.to_core(),
            },
            accelerations: Accelerations {
                linear: self.linear_acceleration.to_core(),
                angular: self.angular_acceleration.to_core(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoPointWire {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Real,
}

impl GeoPointWire {
    pub fn to_wire(g: &GeoPoint) -> Self {
        Self {
            latitude: g.latitude,
            longitude: g.longitude,
            altitude: g.altitude,
        }
    }

    pub fn to_core(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImuWire {
    pub time_stamp: u64,
    pub orientation: QuaternionWire,
    pub angular_velocity: Vector3Wire,
    pub linear_acceleration: Vector3Wire,
}

impl ImuWire {
    pub fn to_wire(d: &ImuData) -> Self {
        Self {
            time_stamp: d.time_stamp,
            orientation: QuaternionWire::to_wire(&d.orientation),
            angular_velocity: Vector3Wire::to_wire(&d.angular_velocity),
            linear_acceleration: Vector3Wire::to_wire(&d.linear_acceleration),
        }
    }

    pub fn to_core(&self) -> ImuData {
        ImuData {
            time_stamp: self.time_stamp,
            orientation: self.orientation.to_core(),
            angular_velocity: self.angular_velocity.to_core(),
            linear_acceleration: self.linear_acceleration.to_core(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BarometerWire {
    pub time_stamp: u64,
    pub altitude: Real,
    pub pressure: Real,
    pub qnh: Real,
}

impl BarometerWire {
    pub fn to_wire(d: &BarometerData) -> Self {
        Self {
            time_stamp: d.time_stamp,
            altitude: d.altitude,
            pressure: d.pressure,
            qnh: d.qnh,
        }
    }

    pub fn to_core(&self) -> BarometerData {
        BarometerData {
            time_stamp: self.time_stamp,
            altitude: self.altitude,
            pressure: self.pressure,
            qnh: self.qnh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MagnetometerWire {
    pub time_stamp: u64,
    pub magnetic_field_body: Vector3Wire,
    pub magnetic_field_covariance: Vec<Real>,
}

impl MagnetometerWire {
    pub fn to_wire(d: &MagnetometerData) -> Self {
        Self {
            time_stamp: d.time_stamp,
            magnetic_field_body: Vector3Wire::to_wire(&d.magnetic_field_body),
            magnetic_field_covariance: d.covariance.to_vec(),
        }
    }

    pub fn to_core(&self) -> MagnetometerData {
        let mut covariance = [0.0; 9];
        for (slot, value) in covariance.iter_mut().zip(&self.magnetic_field_covariance) {
            *slot = *value;
        }
        MagnetometerData {
            time_stamp: self.time_stamp,
            magnetic_field_body: self.magnetic_field_body.to_core(),
            covariance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GpsWire {
    pub time_stamp: u64,
    pub geo_point: GeoPointWire,
    pub eph: Real,
    pub epv: Real,
    pub velocity: Vector3Wire,
    pub fix_type: i32,
    pub time_utc: u64,
}

impl GpsWire {
    pub fn to_wire(d: &GpsData) -> Self {
        Self {
            time_stamp: d.time_stamp,
            geo_point: GeoPointWire::to_wire(&d.geo_point),
            eph: d.eph,
            epv: d.epv,
            velocity: Vector3Wire::to_wire(&d.velocity),
            fix_type: d.fix_type as i32,
            time_utc: d.time_utc,
        }
    }

    pub fn to_core(&self) -> GpsData {
        GpsData {
            time_stamp: self.time_stamp,
            geo_point: self.geo_point.to_core(),
            eph: self.eph,
            epv: self.epv,
            velocity: self.velocity.to_core(),
            fix_type: match self.fix_type {
                3 => GpsFixType::ThreeDFix,
                2 => GpsFixType::TwoDFix,
                _ => GpsFixType::NoFix,
            },
            time_utc: self.time_utc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DistanceSensorWire {
    pub time_stamp: u64,
    pub distance: Real,
    pub min_distance: Real,
    pub max_distance: Real,
    pub relative_pose: PoseWire,
}

impl DistanceSensorWire {
    pub fn to_wire(d: &DistanceSensorData) -> Self {
        Self {
            time_stamp: d.time_stamp,
            distance: d.distance,
            min_distance: d.min_distance,
            max_distance: d.max_distance,
            relative_pose: PoseWire::to_wire(&d.relative_pose),
        }
    }

    pub fn to_core(&self) -> DistanceSensorData {
        DistanceSensorData {
            time_stamp: self.time_stamp,
            distance: self.distance,
            min_distance: self.min_distance,
            max_distance: self.max_distance,
            relative_pose: self.relative_pose.to_core(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LidarWire {
    pub time_stamp: u64,
    pub point_cloud: Vec<Real>,
    pub segmentation: Vec<i32>,
    pub pose: PoseWire,
}

impl LidarWire {
    pub fn to_wire(d: &LidarData) -> Self {
        Self {
            time_stamp: d.time_stamp,
            point_cloud: d.point_cloud.clone(),
            segmentation: d.segmentation.clone(),
            pose: PoseWire::to_wire(&d.pose),
        }
    }

    pub fn to_core(&self) -> LidarData {
        LidarData {
            time_stamp: self.time_stamp,
            point_cloud: self.point_cloud.clone(),
            segmentation: self.segmentation.clone(),
            pose: self.pose.to_core(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CollisionInfoWire {
    pub has_collided: bool,
    pub normal: Vector3Wire,
    pub impact_point: Vector3Wire,
    pub position: Vector3Wire,
    pub penetration_depth: Real,
    pub time_stamp: u64,
    pub object_name: String,
    pub object_id: i32,
}

impl CollisionInfoWire {
    pub fn to_wire(c: &CollisionInfo) -> Self {
        Self {
            has_collided: c.has_collided,
            normal: Vector3Wire::to_wire(&c.normal),
            impact_point: Vector3Wire::to_wire(&c.impact_point),
            position: Vector3Wire::to_wire(&c.position),
            penetration_depth: c.penetration_depth,
            time_stamp: c.time_stamp,
            object_name: c.object_name.clone(),
            object_id: c.object_id,
        }
    }

    pub fn to_core(&self) -> CollisionInfo {
        CollisionInfo {
            has_collided: self.has_collided,
            normal: self.normal.to_core(),
            impact_point: self.impact_point.to_core(),
            position: self.position.to_core(),
            penetration_depth: self.penetration_depth,
            time_stamp: self.time_stamp,
            object_name: self.object_name.clone(),
            object_id: self.object_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CameraInfoWire {
    pub pose: PoseWire,
    pub fov_degrees: Real,
}

impl CameraInfoWire {
    pub fn to_wire(c: &CameraInfo) -> Self {
        Self {
            pose: PoseWire::to_wire(&c.pose),
            fov_degrees: c.fov_degrees,
        }
    }

    pub fn to_core(&self) -> CameraInfo {
        CameraInfo {
            pose: self.pose.to_core(),
            fov_degrees: self.fov_degrees,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImageRequestWire {
    pub camera_name: String,
    pub image_type: i32,
    pub pixels_as_float: bool,
    pub compress: bool,
}

impl ImageRequestWire {
    pub fn to_wire(r: &ImageRequest) -> Self {
        Self {
            camera_name: r.camera_name.clone(),
            image_type: r.image_type,
            pixels_as_float: r.pixels_as_float,
            compress: r.compress,
        }
    }

    pub fn to_core(&self) -> ImageRequest {
        ImageRequest {
            camera_name: self.camera_name.clone(),
            image_type: self.image_type,
            pixels_as_float: self.pixels_as_float,
            compress: self.compress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CarControlsWire {
    pub throttle: Real,
    pub steering: Real,
    pub brake: Real,
    pub handbrake: bool,
    pub is_manual_gear: bool,
    pub manual_gear: i32,
}

impl CarControlsWire {
    pub fn to_wire(c: &CarControls) -> Self {
        Self {
            throttle: c.throttle,
            steering: c.steering,
            brake: c.brake,
            handbrake: c.handbrake,
            is_manual_gear: c.is_manual_gear,
            manual_gear: c.manual_gear,
        }
    }

    pub fn to_core(&self) -> CarControls {
        CarControls {
            throttle: self.throttle,
            steering: self.steering,
            brake: self.brake,
            handbrake: self.handbrake,
            is_manual_gear: self.is_manual_gear,
            manual_gear: self.manual_gear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CarStateWire {
    pub speed: Real,
    pub gear: i32,
    pub rpm: Real,
    pub max_rpm: Real,
    pub handbrake: bool,
    pub kinematics: KinematicsWire,
    pub timestamp: u64,
}

impl CarStateWire {
    pub fn to_wire(s: &CarState) -> Self {
        Self {
            speed: s.speed,
            gear: s.gear,
            rpm: s.rpm,
            max_rpm: s.max_rpm,
            handbrake: s.handbrake,
            kinematics: KinematicsWire::to_wire(&s.kinematics),
            timestamp: s.timestamp,
        }
    }

    pub fn to_core(&self) -> CarState {
        CarState {
            speed: self.speed,
            gear: self.gear,
            rpm: self.rpm,
            max_rpm: self.max_rpm,
            handbrake: self.handbrake,
            kinematics: self.kinematics.to_core(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MultirotorStateWire {
    pub kinematics: KinematicsWire,
    pub flight_state: i32,
    pub landed: bool,
    pub armed: bool,
    pub api_control_enabled: bool,
    pub battery: Real,
    pub collision: CollisionInfoWire,
    pub timestamp: u64,
}

impl MultirotorStateWire {
    pub fn to_wire(s: &MultirotorState) -> Self {
        Self {
            kinematics: KinematicsWire::to_wire(&s.kinematics),
            flight_state: s.flight_state as i32,
            landed: s.landed,
            armed: s.armed,
            api_control_enabled: s.api_control_enabled,
            battery: s.battery,
            collision: CollisionInfoWire::to_wire(&s.collision),
            timestamp: s.timestamp,
        }
    }
}

/// Yaw mode crosses the boundary in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct YawModeWire {
    pub is_rate: bool,
    pub yaw_or_rate: Real,
}

impl YawModeWire {
    pub fn to_core(&self) -> YawMode {
        YawMode {
            is_rate: self.is_rate,
            yaw_or_rate: self.yaw_or_rate.to_radians(),
        }
    }

    pub fn to_wire(m: &YawMode) -> Self {
        Self {
            is_rate: m.is_rate,
            yaw_or_rate: m.yaw_or_rate.to_degrees(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RcDataWire {
    pub roll: Real,
    pub pitch: Real,
    pub yaw: Real,
    pub throttle: Real,
    pub is_valid: bool,
}

impl RcDataWire {
    pub fn to_core(&self) -> RcData {
        RcData {
            roll: self.roll,
            pitch: self.pitch,
            yaw: self.yaw,
            throttle: self.throttle,
            is_valid: self.is_valid,
        }
    }

    pub fn to_wire(rc: &RcData) -> Self {
        Self {
            roll: rc.roll,
            pitch: rc.pitch,
            yaw: rc.yaw,
            throttle: rc.throttle,
            is_valid: rc.is_valid,
        }
    }
}

/// Numeric drivetrain tag from the wire.
pub fn drivetrain_from_wire(value: i32) -> DrivetrainType {
    match value {
        1 => DrivetrainType::ForwardOnly,
        _ => DrivetrainType::MaxDegreeOfFreedom,
    }
}

/// Numeric flight-state tag for the wire.
pub fn flight_state_to_wire(state: FlightState) -> i32 {
    state as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroswarm_core::geom::quat_from_wxyz;

    #[test]
    fn test_vector3_roundtrip_exact() {
        let v = Vector3r::new(1.5, -2.25, 0.1);
        assert_eq!(Vector3Wire::to_wire(&v).to_core(), v);
    }

    #[test]
    fn test_quaternion_roundtrip_exact() {
        let q = quat_from_wxyz(0.5, 0.5, 0.5, 0.5);
        let roundtrip = QuaternionWire::to_wire(&q).to_core();
        assert_eq!(roundtrip.w.to_bits(), q.w.to_bits());
        assert_eq!(roundtrip.i.to_bits(), q.i.to_bits());
        assert_eq!(roundtrip.j.to_bits(), q.j.to_bits());
        assert_eq!(roundtrip.k.to_bits(), q.k.to_bits());
    }

    #[test]
    fn test_kinematics_roundtrip_exact() {
        let mut k = Kinematics::default();
        k.pose.position = Vector3r::new(10.0, -4.5, -22.125);
        k.twist.linear = Vector3r::new(0.25, 0.5, -0.75);
        k.accelerations.angular = Vector3r::new(0.0625, 0.0, -9.80665);
        assert_eq!(KinematicsWire::to_wire(&k).to_core(), k);
    }

    #[test]
    fn test_geo_point_roundtrip_exact() {
        let g = GeoPoint {
            latitude: 47.641468,
            longitude: -122.140165,
            altitude: 122.0,
        };
        assert_eq!(GeoPointWire::to_wire(&g).to_core(), g);
    }

    #[test]
    fn test_sensor_wires_roundtrip() {
        let imu = ImuData {
            time_stamp: 123,
            orientation: quat_from_wxyz(1.0, 0.0, 0.0, 0.0),
            angular_velocity: Vector3r::new(0.01, -0.02, 0.03),
            linear_acceleration: Vector3r::new(0.0, 0.0, -9.80665),
        };
        assert_eq!(ImuWire::to_wire(&imu).to_core(), imu);

        let baro = BarometerData {
            time_stamp: 5,
            altitude: 122.5,
            pressure: 99_876.25,
            qnh: 1013.25,
        };
        assert_eq!(BarometerWire::to_wire(&baro).to_core(), baro);

        let mut mag = MagnetometerData::default();
        mag.time_stamp = 7;
        mag.magnetic_field_body = Vector3r::new(0.18, 0.05, 0.5);
        mag.covariance[0] = 2.5e-5;
        mag.covariance[8] = 2.5e-5;
        assert_eq!(MagnetometerWire::to_wire(&mag).to_core(), mag);

        let gps = GpsData {
            time_stamp: 11,
            geo_point: GeoPoint::default(),
            eph: 0.3,
            epv: 0.4,
            velocity: Vector3r::new(1.0, 2.0, 3.0),
            fix_type: GpsFixType::ThreeDFix,
            time_utc: 1_704_067_200_000_000,
        };
        assert_eq!(GpsWire::to_wire(&gps).to_core(), gps);

        let distance = DistanceSensorData {
            time_stamp: 13,
            distance: 7.5,
            min_distance: 0.2,
            max_distance: 40.0,
            relative_pose: Pose::zero(),
        };
        assert_eq!(DistanceSensorWire::to_wire(&distance).to_core(), distance);

        let lidar = LidarData {
            time_stamp: 17,
            point_cloud: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            segmentation: vec![0, 1],
            pose: Pose::zero(),
        };
        assert_eq!(LidarWire::to_wire(&lidar).to_core(), lidar);
    }

    #[test]
    fn test_collision_camera_image_roundtrip() {
        let collision = CollisionInfo {
            has_collided: true,
            normal: Vector3r::new(0.0, 0.0, -1.0),
            impact_point: Vector3r::new(1.0, 2.0, 0.0),
            position: Vector3r::new(1.0, 2.0, -0.5),
            penetration_depth: 0.125,
            time_stamp: 99,
            object_name: "ground".to_string(),
            object_id: 7,
        };
        assert_eq!(CollisionInfoWire::to_wire(&collision).to_core(), collision);

        let camera = CameraInfo::default();
        assert_eq!(CameraInfoWire::to_wire(&camera).to_core(), camera);

        let request = ImageRequest::default();
        assert_eq!(ImageRequestWire::to_wire(&request).to_core(), request);
    }

    #[test]
    fn test_car_wires_roundtrip() {
        let controls = CarControls {
            throttle: 0.5,
            steering: -0.25,
            brake: 0.0,
            handbrake: false,
            is_manual_gear: true,
            manual_gear: -1,
        };
        assert_eq!(CarControlsWire::to_wire(&controls).to_core(), controls);

        let state = CarState {
            speed: 12.5,
            gear: 1,
            rpm: 3000.0,
            max_rpm: 7500.0,
            handbrake: false,
            kinematics: Kinematics::default(),
            timestamp: 21,
        };
        assert_eq!(CarStateWire::to_wire(&state).to_core(), state);
    }

    #[test]
    fn test_enums_encode_numerically() {
        let json = serde_json::to_value(GpsWire {
            fix_type: GpsFixType::ThreeDFix as i32,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json["fix_type"], 3);
        assert_eq!(flight_state_to_wire(FlightState::Flying), 3);
        assert_eq!(drivetrain_from_wire(1), DrivetrainType::ForwardOnly);
    }

    #[test]
    fn test_yaw_mode_degree_boundary() {
        let wire = YawModeWire {
            is_rate: false,
            yaw_or_rate: 90.0,
        };
        let core = wire.to_core();
        assert!((core.yaw_or_rate - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        let back = YawModeWire::to_wire(&core);
        assert!((back.yaw_or_rate - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_wire_json_field_names_are_snake_case() {
        let json = serde_json::to_value(PoseWire::default()).unwrap();
        assert!(json.get("position").is_some());
        assert!(json["orientation"].get("w").is_some());
        let json = serde_json::to_value(DistanceSensorWire::default()).unwrap();
        assert!(json.get("min_distance").is_some());
    }
}
