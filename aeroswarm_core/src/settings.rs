//! Settings value object.
//!
//! The kernel treats settings as an opaque, read-only value produced by an
//! external loader; the factory threads a reference through construction.
//! There is no process-wide mutable state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::geom::GeoPoint;

/// Top-level simulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    #[default]
    Multirotor,
    Car,
    ComputerVision,
}

/// Which clock drives the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockType {
    #[default]
    Scalable,
    Steppable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub address: String,
    pub port: u16,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 41451,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub enabled: bool,
    /// Seconds between recorded rows; 0 records every tick.
    pub record_interval_sec: f64,
    pub folder: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            record_interval_sec: 0.05,
            folder: "recordings".to_string(),
        }
    }
}

/// Initial NED pose of a vehicle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialPoseSettings {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Yaw, degrees. Degrees are a boundary-surface convention only.
    pub yaw_deg: f32,
}

/// Per-sensor configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    pub sensor_type: String,
    pub name: String,
    pub enabled: bool,
    /// Overrides the sensor's nominal frequency when positive.
    pub frequency_hz: f32,
    /// Overrides the output latency when positive.
    pub update_latency_sec: f32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            sensor_type: String::new(),
            name: String::new(),
            enabled: true,
            frequency_hz: 0.0,
            update_latency_sec: -1.0,
        }
    }
}

/// Per-vehicle configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSettings {
    /// "simple_flight" or "physx_car".
    pub vehicle_type: String,
    pub is_default: bool,
    pub initial_pose: InitialPoseSettings,
    pub sensors: Vec<SensorSettings>,
    pub rc_required: bool,
    /// Pawn asset path, consumed by the 3D engine only.
    pub pawn_path: String,
}

impl Default for VehicleSettings {
    fn default() -> Self {
        Self {
            vehicle_type: "simple_flight".to_string(),
            is_default: false,
            initial_pose: InitialPoseSettings::default(),
            sensors: Vec::new(),
            rc_required: false,
            pawn_path: String::new(),
        }
    }
}

/// The full settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sim_mode: SimMode,
    pub clock_type: ClockType,
    pub clock_speed: f64,
    /// Physics loop period, nanoseconds.
    pub physics_period_ns: u64,
    /// Master seed all noise streams derive from.
    pub seed: u64,
    pub home_geo_point: GeoPoint,
    pub rpc: RpcSettings,
    pub recording: RecordingSettings,
    pub vehicles: BTreeMap<String, VehicleSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sim_mode: SimMode::Multirotor,
            clock_type: ClockType::Scalable,
            clock_speed: 1.0,
            physics_period_ns: 3_000_000,
            seed: 42,
            home_geo_point: GeoPoint::default(),
            rpc: RpcSettings::default(),
            recording: RecordingSettings::default(),
            vehicles: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Parses and validates a JSON settings document.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|err| SimError::config(format!("bad settings json: {err}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.clock_speed <= 0.0 {
            return Err(SimError::config("clock_speed must be positive"));
        }
        if self.physics_period_ns == 0 {
            return Err(SimError::config("physics_period_ns must be positive"));
        }
        let mut defaults = 0;
        for (name, vehicle) in &self.vehicles {
            if name.is_empty() {
                return Err(SimError::config("vehicle name must not be empty"));
            }
            match vehicle.vehicle_type.as_str() {
                "simple_flight" | "physx_car" => {}
                other => {
                    return Err(SimError::config(format!(
                        "unknown vehicle type '{other}' for vehicle '{name}'"
                    )))
                }
            }
            if vehicle.is_default {
                defaults += 1;
            }
        }
        if defaults > 1 {
            return Err(SimError::config("more than one default vehicle"));
        }
        Ok(())
    }

    /// Name of the configured default vehicle, if flagged.
    pub fn default_vehicle(&self) -> Option<&str> {
        self.vehicles
            .iter()
            .find(|(_, v)| v.is_default)
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_settings_parse() {
        let settings = Settings::from_json_str("{}").unwrap();
        assert_eq!(settings.rpc.port, 41451);
        assert_eq!(settings.physics_period_ns, 3_000_000);
        assert_eq!(settings.sim_mode, SimMode::Multirotor);
    }

    #[test]
    fn test_vehicle_block_parses() {
        let json = r#"{
            "sim_mode": "multirotor",
            "clock_type": "steppable",
            "vehicles": {
                "drone0": {
                    "vehicle_type": "simple_flight",
                    "is_default": true,
                    "initial_pose": {"x": 1.0, "y": 2.0, "z": 0.0},
                    "sensors": [{"sensor_type": "imu", "name": "imu0"}]
                }
            }
        }"#;
        let settings = Settings::from_json_str(json).unwrap();
        assert_eq!(settings.clock_type, ClockType::Steppable);
        assert_eq!(settings.default_vehicle(), Some("drone0"));
        let drone = &settings.vehicles["drone0"];
        assert_eq!(drone.sensors.len(), 1);
        assert_eq!(drone.initial_pose.y, 2.0);
    }

    #[test]
    fn test_unknown_vehicle_type_is_config_error() {
        let json = r#"{"vehicles": {"v": {"vehicle_type": "warp_drive"}}}"#;
        assert!(matches!(
            Settings::from_json_str(json),
            Err(SimError::ConfigError(_))
        ));
    }

    #[test]
    fn test_two_defaults_rejected() {
        let json = r#"{"vehicles": {
            "a": {"vehicle_type": "simple_flight", "is_default": true},
            "b": {"vehicle_type": "simple_flight", "is_default": true}
        }}"#;
        assert!(matches!(
            Settings::from_json_str(json),
            Err(SimError::ConfigError(_))
        ));
    }

    #[test]
    fn test_settings_roundtrip_through_json() {
        let settings = Settings::default();
        let json = settings.to_json_string();
        let parsed = Settings::from_json_str(&json).unwrap();
        assert_eq!(parsed.rpc.port, settings.rpc.port);
        assert_eq!(parsed.seed, settings.seed);
    }
}
