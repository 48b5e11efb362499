//! Builds the vehicle tree from a settings value.

use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use crate::api::{CarApi, MultirotorApi, VehicleApi, VehicleSimApi};
use crate::control::{FlightFirmware, FlightParams};
use crate::environment::Environment;
use crate::error::SimError;
use crate::geom::{quat_from_wxyz, Pose, Vector3r};
use crate::physics::{BodyHandle, RigidBody};
use crate::sensors::{
    derive_seed, AnySensor, BarometerParams, BarometerSensor, DistanceSensor,
    DistanceSensorParams, GpsParams, GpsSensor, GroundTruth, ImuParams, ImuSensor, LidarParams,
    LidarSensor, MagnetometerParams, MagnetometerSensor, RayCaster, SensorSuite, SharedClock,
};
use crate::settings::{SensorSettings, Settings, VehicleSettings};
use crate::updatable::Updatable;
use crate::vehicle::car::{CarFirmware, CarParams};
use crate::vehicle::{Vehicle, VehicleFirmware};

/// Everything a new vehicle contributes to the world.
pub struct BuiltVehicle {
    pub vehicle: Vehicle,
    pub body_handle: BodyHandle,
    pub api: VehicleApi,
    pub sim_api: VehicleSimApi,
}

/// Builds one vehicle from its settings block.
///
/// `vehicle_index` keys the noise-seed derivation so every vehicle gets an
/// independent, reproducible stream.
pub fn build_vehicle(
    name: &str,
    vehicle_settings: &VehicleSettings,
    settings: &Settings,
    clock: SharedClock,
    ray_caster: Arc<dyn RayCaster>,
    vehicle_index: u64,
) -> Result<BuiltVehicle, SimError> {
    let pose = initial_pose(vehicle_settings);
    info!(vehicle = name, vehicle_type = %vehicle_settings.vehicle_type, "building vehicle");

    let (mass, inertia) = match vehicle_settings.vehicle_type.as_str() {
        "simple_flight" => (1.0, Vector3r::new(0.0066, 0.0079, 0.0121)),
        "physx_car" => (1500.0, Vector3r::new(500.0, 1200.0, 1500.0)),
        other => {
            return Err(SimError::config(format!(
                "unknown vehicle type '{other}' for vehicle '{name}'"
            )))
        }
    };

    let body = Arc::new(RwLock::new(RigidBody::new(name, mass, inertia, pose)));
    let environment = Arc::new(RwLock::new(Environment::new(settings.home_geo_point)));
    let ground_truth = GroundTruth {
        body: Arc::clone(&body),
        environment: Arc::clone(&environment),
    };

    let sensor_blocks = effective_sensors(vehicle_settings);
    let mut suite = SensorSuite::new();
    for (sensor_index, block) in sensor_blocks.iter().enumerate() {
        if !block.enabled {
            continue;
        }
        let seed = derive_seed(settings.seed, vehicle_index * 64 + sensor_index as u64);
        suite.insert(build_sensor(
            block,
            seed,
            clock.clone(),
            ground_truth.clone(),
            Arc::clone(&ray_caster),
        )?);
    }
    let sensors = Arc::new(RwLock::new(suite));

    let (firmware, api) = match vehicle_settings.vehicle_type.as_str() {
        "simple_flight" => {
            let params = FlightParams {
                rc_required: vehicle_settings.rc_required,
                ..Default::default()
            };
            let mut fw = FlightFirmware::new(params, clock, Arc::clone(&body));
            fw.reset();
            let fw = Arc::new(Mutex::new(fw));
            let api = VehicleApi::Multirotor(MultirotorApi::new(
                Arc::clone(&fw),
                Arc::clone(&sensors),
                Arc::clone(&environment),
            ));
            (VehicleFirmware::Multirotor(fw), api)
        }
        _ => {
            let mut fw = CarFirmware::new(CarParams::default(), clock, Arc::clone(&body));
            fw.reset();
            let fw = Arc::new(Mutex::new(fw));
            let api = VehicleApi::Car(CarApi::new(
                Arc::clone(&fw),
                Arc::clone(&sensors),
                Arc::clone(&environment),
            ));
            (VehicleFirmware::Car(fw), api)
        }
    };

    let sim_api = VehicleSimApi::new(
        Arc::clone(&body),
        match &firmware {
            VehicleFirmware::Multirotor(fw) => Some(Arc::clone(fw)),
            VehicleFirmware::Car(_) => None,
        },
    );

    let mut vehicle = Vehicle::new(
        name,
        Arc::clone(&body),
        Arc::clone(&environment),
        sensors,
        firmware,
    );
    vehicle.reset();

    Ok(BuiltVehicle {
        vehicle,
        body_handle: BodyHandle { body, environment },
        api,
        sim_api,
    })
}

fn initial_pose(vehicle_settings: &VehicleSettings) -> Pose {
    let p = &vehicle_settings.initial_pose;
    let half_yaw = p.yaw_deg.to_radians() * 0.5;
    Pose::new(
        Vector3r::new(p.x, p.y, p.z),
        quat_from_wxyz(half_yaw.cos(), 0.0, 0.0, half_yaw.sin()),
    )
}

/// The configured sensor list, or the stock suite when none is given.
fn effective_sensors(vehicle_settings: &VehicleSettings) -> Vec<SensorSettings> {
    if !vehicle_settings.sensors.is_empty() {
        return vehicle_settings.sensors.clone();
    }
    match vehicle_settings.vehicle_type.as_str() {
        "simple_flight" => ["imu", "barometer", "magnetometer", "gps"]
            .iter()
            .map(|kind| SensorSettings {
                sensor_type: kind.to_string(),
                name: kind.to_string(),
                ..Default::default()
            })
            .collect(),
        _ => ["gps", "distance"]
            .iter()
            .map(|kind| SensorSettings {
                sensor_type: kind.to_string(),
                name: kind.to_string(),
                ..Default::default()
            })
            .collect(),
    }
}

fn build_sensor(
    block: &SensorSettings,
    seed: u64,
    clock: SharedClock,
    ground_truth: GroundTruth,
    ray_caster: Arc<dyn RayCaster>,
) -> Result<AnySensor, SimError> {
    let name = if block.name.is_empty() {
        block.sensor_type.clone()
    } else {
        block.name.clone()
    };
    let sensor = match block.sensor_type.as_str() {
        "imu" => {
            let mut params = ImuParams {
                seed,
                ..Default::default()
            };
            if block.frequency_hz > 0.0 {
                params.frequency_hz = block.frequency_hz;
            }
            AnySensor::Imu(ImuSensor::new(name, params, clock, ground_truth))
        }
        "barometer" => {
            let mut params = BarometerParams {
                seed,
                ..Default::default()
            };
            if block.frequency_hz > 0.0 {
                params.frequency_hz = block.frequency_hz;
            }
            if block.update_latency_sec >= 0.0 {
                params.update_latency_sec = block.update_latency_sec;
            }
            AnySensor::Barometer(BarometerSensor::new(name, params, clock, ground_truth))
        }
        "magnetometer" => {
            let mut params = MagnetometerParams {
                seed,
                ..Default::default()
            };
            if block.frequency_hz > 0.0 {
                params.frequency_hz = block.frequency_hz;
            }
            AnySensor::Magnetometer(MagnetometerSensor::new(name, params, clock, ground_truth))
        }
        "gps" => {
            let mut params = GpsParams {
                seed,
                ..Default::default()
            };
            if block.frequency_hz > 0.0 {
                params.frequency_hz = block.frequency_hz;
            }
            if block.update_latency_sec >= 0.0 {
                params.update_latency_sec = block.update_latency_sec;
            }
            AnySensor::Gps(GpsSensor::new(name, params, clock, ground_truth))
        }
        "distance" => {
            let mut params = DistanceSensorParams {
                seed,
                ..Default::default()
            };
            if block.frequency_hz > 0.0 {
                params.frequency_hz = block.frequency_hz;
            }
            AnySensor::Distance(DistanceSensor::new(
                name,
                params,
                clock,
                ground_truth,
                ray_caster,
            ))
        }
        "lidar" => {
            let mut params = LidarParams::default();
            if block.frequency_hz > 0.0 {
                params.frequency_hz = block.frequency_hz;
            }
            AnySensor::Lidar(LidarSensor::new(
                name,
                params,
                clock,
                ground_truth,
                ray_caster,
            ))
        }
        other => {
            return Err(SimError::config(format!("unknown sensor type '{other}'")));
        }
    };
    Ok(sensor)
}
