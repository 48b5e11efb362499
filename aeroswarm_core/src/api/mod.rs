//! Stable per-vehicle command/query surface consumed by RPC and the
//! coordination fabric.

mod provider;

pub use provider::ApiProvider;

use std::sync::{Arc, Mutex, RwLock};

use crate::control::{
    CommandHandle, DrivetrainType, FlightFirmware, MultirotorState, RcData, YawMode,
};
use crate::environment::Environment;
use crate::error::SimError;
use crate::geom::{CollisionInfo, GeoPoint, Pose, Real, Vector3r};
use crate::physics::RigidBody;
use crate::sensors::{
    BarometerData, DistanceSensorData, GpsData, ImuData, LidarData, MagnetometerData, SensorSuite,
    SensorType,
};
use crate::vehicle::car::{CarControls, CarFirmware, CarState};

/// Command/query surface of one multirotor.
///
/// Every command is non-blocking and returns a [`CommandHandle`]; issuing a
/// new command pre-empts the previous one.
#[derive(Clone)]
pub struct MultirotorApi {
    firmware: Arc<Mutex<FlightFirmware>>,
    sensors: Arc<RwLock<SensorSuite>>,
    environment: Arc<RwLock<Environment>>,
}

impl MultirotorApi {
    pub fn new(
        firmware: Arc<Mutex<FlightFirmware>>,
        sensors: Arc<RwLock<SensorSuite>>,
        environment: Arc<RwLock<Environment>>,
    ) -> Self {
        Self {
            firmware,
            sensors,
            environment,
        }
    }

    pub fn enable_api_control(&self, enable: bool) {
        self.firmware.lock().unwrap().enable_api_control(enable);
    }

    pub fn is_api_control_enabled(&self) -> bool {
        self.firmware.lock().unwrap().is_api_control_enabled()
    }

    pub fn arm(&self) -> Result<(), SimError> {
        self.firmware.lock().unwrap().arm()
    }

    pub fn disarm(&self) -> Result<(), SimError> {
        self.firmware.lock().unwrap().disarm()
    }

    pub fn cancel_last_task(&self) {
        self.firmware.lock().unwrap().cancel_active();
    }

    pub fn takeoff(&self, altitude: Real) -> Result<CommandHandle, SimError> {
        self.firmware.lock().unwrap().command_takeoff(altitude)
    }

    pub fn land(&self) -> Result<CommandHandle, SimError> {
        self.firmware.lock().unwrap().command_land()
    }

    pub fn hover(&self) -> Result<CommandHandle, SimError> {
        self.firmware.lock().unwrap().command_hover()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn move_to_position(
        &self,
        target: Vector3r,
        speed: Real,
        drivetrain: DrivetrainType,
        yaw_mode: YawMode,
        lookahead: Real,
        adaptive_lookahead: Real,
    ) -> Result<CommandHandle, SimError> {
        self.firmware.lock().unwrap().command_move_to_position(
            target,
            speed,
            drivetrain,
            yaw_mode,
            lookahead,
            adaptive_lookahead,
        )
    }

    pub fn move_by_velocity(
        &self,
        velocity: Vector3r,
        duration: Real,
        drivetrain: DrivetrainType,
        yaw_mode: YawMode,
    ) -> Result<CommandHandle, SimError> {
        self.firmware
            .lock()
            .unwrap()
            .command_move_by_velocity(velocity, duration, drivetrain, yaw_mode)
    }

    pub fn move_by_angle_rates(
        &self,
        rates: Vector3r,
        z: Real,
        duration: Real,
    ) -> Result<CommandHandle, SimError> {
        self.firmware
            .lock()
            .unwrap()
            .command_move_by_angle_rates(rates, z, duration)
    }

    pub fn set_rc_data(&self, rc: RcData) {
        self.firmware.lock().unwrap().set_rc_data(rc);
    }

    pub fn get_state(&self) -> MultirotorState {
        self.firmware.lock().unwrap().state_snapshot()
    }

    pub fn get_home_geo_point(&self) -> GeoPoint {
        self.environment.read().unwrap().home_geo_point()
    }

    fn sensor_missing(kind: &str, name: &str) -> SimError {
        SimError::invalid(format!("no {kind} sensor named '{name}'"))
    }

    pub fn get_imu(&self, name: &str) -> Result<ImuData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Imu, name)
            .and_then(|s| s.imu_output())
            .ok_or_else(|| Self::sensor_missing("imu", name))
    }

    pub fn get_barometer(&self, name: &str) -> Result<BarometerData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Barometer, name)
            .and_then(|s| s.barometer_output())
            .ok_or_else(|| Self::sensor_missing("barometer", name))
    }

    pub fn get_magnetometer(&self, name: &str) -> Result<MagnetometerData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Magnetometer, name)
            .and_then(|s| s.magnetometer_output())
            .ok_or_else(|| Self::sensor_missing("magnetometer", name))
    }

    pub fn get_gps(&self, name: &str) -> Result<GpsData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Gps, name)
            .and_then(|s| s.gps_output())
            .ok_or_else(|| Self::sensor_missing("gps", name))
    }

    pub fn get_distance(&self, name: &str) -> Result<DistanceSensorData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Distance, name)
            .and_then(|s| s.distance_output())
            .ok_or_else(|| Self::sensor_missing("distance", name))
    }

    pub fn get_lidar(&self, name: &str) -> Result<LidarData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Lidar, name)
            .and_then(|s| s.lidar_output())
            .ok_or_else(|| Self::sensor_missing("lidar", name))
    }
}

/// Command/query surface of one car.
#[derive(Clone)]
pub struct CarApi {
    firmware: Arc<Mutex<CarFirmware>>,
    sensors: Arc<RwLock<SensorSuite>>,
    environment: Arc<RwLock<Environment>>,
}

impl CarApi {
    pub fn new(
        firmware: Arc<Mutex<CarFirmware>>,
        sensors: Arc<RwLock<SensorSuite>>,
        environment: Arc<RwLock<Environment>>,
    ) -> Self {
        Self {
            firmware,
            sensors,
            environment,
        }
    }

    pub fn enable_api_control(&self, enable: bool) {
        self.firmware.lock().unwrap().enable_api_control(enable);
    }

    pub fn is_api_control_enabled(&self) -> bool {
        self.firmware.lock().unwrap().is_api_control_enabled()
    }

    pub fn set_controls(&self, controls: CarControls) -> Result<(), SimError> {
        self.firmware.lock().unwrap().set_controls(controls)
    }

    pub fn get_car_state(&self) -> CarState {
        self.firmware.lock().unwrap().state_snapshot()
    }

    pub fn get_home_geo_point(&self) -> GeoPoint {
        self.environment.read().unwrap().home_geo_point()
    }

    pub fn get_distance(&self, name: &str) -> Result<DistanceSensorData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Distance, name)
            .and_then(|s| s.distance_output())
            .ok_or_else(|| SimError::invalid(format!("no distance sensor named '{name}'")))
    }

    pub fn get_lidar(&self, name: &str) -> Result<LidarData, SimError> {
        self.sensors
            .read()
            .unwrap()
            .by_name(SensorType::Lidar, name)
            .and_then(|s| s.lidar_output())
            .ok_or_else(|| SimError::invalid(format!("no lidar sensor named '{name}'")))
    }
}

/// Tagged vehicle API: each variant exposes its typed operations; the small
/// common capability set is dispatched here.
#[derive(Clone)]
pub enum VehicleApi {
    Multirotor(MultirotorApi),
    Car(CarApi),
}

impl VehicleApi {
    pub fn enable_api_control(&self, enable: bool) {
        match self {
            Self::Multirotor(api) => api.enable_api_control(enable),
            Self::Car(api) => api.enable_api_control(enable),
        }
    }

    pub fn is_api_control_enabled(&self) -> bool {
        match self {
            Self::Multirotor(api) => api.is_api_control_enabled(),
            Self::Car(api) => api.is_api_control_enabled(),
        }
    }

    /// Arms the vehicle. A car has no arming interlock; the call succeeds.
    pub fn arm(&self) -> Result<(), SimError> {
        match self {
            Self::Multirotor(api) => api.arm(),
            Self::Car(_) => Ok(()),
        }
    }

    pub fn disarm(&self) -> Result<(), SimError> {
        match self {
            Self::Multirotor(api) => api.disarm(),
            Self::Car(_) => Ok(()),
        }
    }

    pub fn get_home_geo_point(&self) -> GeoPoint {
        match self {
            Self::Multirotor(api) => api.get_home_geo_point(),
            Self::Car(api) => api.get_home_geo_point(),
        }
    }

    pub fn as_multirotor(&self) -> Result<&MultirotorApi, SimError> {
        match self {
            Self::Multirotor(api) => Ok(api),
            Self::Car(_) => Err(SimError::invalid("vehicle is not a multirotor")),
        }
    }

    pub fn as_car(&self) -> Result<&CarApi, SimError> {
        match self {
            Self::Car(api) => Ok(api),
            Self::Multirotor(_) => Err(SimError::invalid("vehicle is not a car")),
        }
    }
}

/// Camera description surfaced to RPC consumers. Rendering itself lives in
/// the 3D engine; the core only carries the geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    pub pose: Pose,
    /// Horizontal field of view, degrees.
    pub fov_degrees: Real,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            pose: Pose::zero(),
            fov_degrees: 90.0,
        }
    }
}

/// A capture request forwarded to the image pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub camera_name: String,
    /// Numeric image type tag (scene, depth, segmentation, ...).
    pub image_type: i32,
    pub pixels_as_float: bool,
    pub compress: bool,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            camera_name: "front_center".to_string(),
            image_type: 0,
            pixels_as_float: false,
            compress: true,
        }
    }
}

/// Pose/reset/trace surface of one vehicle, used by the sim side rather than
/// flight clients.
#[derive(Clone)]
pub struct VehicleSimApi {
    body: Arc<RwLock<RigidBody>>,
    firmware: Option<Arc<Mutex<FlightFirmware>>>,
}

impl VehicleSimApi {
    pub fn new(
        body: Arc<RwLock<RigidBody>>,
        firmware: Option<Arc<Mutex<FlightFirmware>>>,
    ) -> Self {
        Self { body, firmware }
    }

    pub fn get_pose(&self) -> Pose {
        self.body.read().unwrap().kinematics.pose
    }

    /// Teleports the vehicle, zeroing its motion.
    pub fn set_pose(&self, pose: Pose) {
        self.body.write().unwrap().set_pose(pose);
    }

    pub fn get_ground_truth_kinematics(&self) -> crate::geom::Kinematics {
        self.body.read().unwrap().kinematics
    }

    /// Injects a collision report from the host engine.
    pub fn report_collision(&self, collision: CollisionInfo) {
        if let Some(firmware) = &self.firmware {
            firmware.lock().unwrap().set_collision(collision);
        }
    }

    pub fn get_collision_info(&self) -> CollisionInfo {
        match &self.firmware {
            Some(firmware) => firmware.lock().unwrap().state_snapshot().collision,
            None => CollisionInfo::default(),
        }
    }
}
