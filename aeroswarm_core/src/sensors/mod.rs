//! Periodic, noise-injected sensor synthesis from ground-truth kinematics.
//!
//! Every sensor follows one pattern: it carries a nominal update frequency, a
//! startup delay, seeded noise parameters and an optional output delay line.
//! On each tick it checks whether the next sample is due; if so it
//! synthesizes a reading from its ground-truth handle and noise state and
//! pushes it into the delay line. The public output is the oldest sample
//! whose scheduled exit time has elapsed.

mod barometer;
mod delay_line;
mod distance;
mod gps;
mod imu;
mod lidar;
mod magnetometer;
mod noise;

pub use barometer::{BarometerData, BarometerParams, BarometerSensor};
pub use delay_line::DelayLine;
pub use distance::{DistanceSensor, DistanceSensorData, DistanceSensorParams};
pub use gps::{GpsData, GpsFixType, GpsParams, GpsSensor};
pub use imu::{ImuData, ImuParams, ImuSensor};
pub use lidar::{LidarData, LidarParams, LidarSensor};
pub use magnetometer::{MagnetometerData, MagnetometerParams, MagnetometerSensor};
pub use noise::{derive_seed, GaussianGenerator};

use std::sync::{Arc, RwLock};

use crate::clock::{SimClock, TimePoint};
use crate::environment::Environment;
use crate::error::SimError;
use crate::geom::{Kinematics, Real, Vector3r};
use crate::physics::RigidBody;
use crate::updatable::Updatable;

/// Numeric sensor type tags, stable across the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorType {
    Barometer = 1,
    Imu = 2,
    Gps = 3,
    Magnetometer = 4,
    Distance = 5,
    Lidar = 6,
}

/// Read-only handle onto a vehicle's ground truth, shared by all of its
/// sensors for their whole lifetime.
#[derive(Clone)]
pub struct GroundTruth {
    pub body: Arc<RwLock<RigidBody>>,
    pub environment: Arc<RwLock<Environment>>,
}

impl GroundTruth {
    /// Snapshot of the body's current kinematics.
    pub fn kinematics(&self) -> Kinematics {
        self.body.read().unwrap().kinematics
    }

    /// Snapshot of the current environment state.
    pub fn environment(&self) -> Environment {
        self.environment.read().unwrap().clone()
    }
}

/// A hit reported by the ray-casting collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vector3r,
    pub segmentation_id: i32,
}

/// Collaborator that answers ray queries against world geometry. The 3D
/// engine provides the real one; tests and headless runs use
/// [`FlatGroundCaster`].
pub trait RayCaster: Send + Sync {
    fn cast(&self, origin: Vector3r, direction: Vector3r, max_range: Real) -> Option<RayHit>;
}

/// Ray caster against an infinite horizontal ground plane.
pub struct FlatGroundCaster {
    pub ground_z: Real,
    pub segmentation_id: i32,
}

impl Default for FlatGroundCaster {
    fn default() -> Self {
        Self {
            ground_z: 0.0,
            segmentation_id: 0,
        }
    }
}

impl RayCaster for FlatGroundCaster {
    fn cast(&self, origin: Vector3r, direction: Vector3r, max_range: Real) -> Option<RayHit> {
        // NED: the plane is hit by rays with a positive z component.
        if direction.z <= 1e-6 {
            return None;
        }
        let t = (self.ground_z - origin.z) / direction.z;
        if t < 0.0 || t > max_range {
            return None;
        }
        Some(RayHit {
            point: origin + direction * t,
            segmentation_id: self.segmentation_id,
        })
    }
}

/// Schedules samples at a nominal frequency after a startup delay.
#[derive(Debug, Clone)]
pub struct SampleSchedule {
    period_ns: u64,
    startup_delay_ns: u64,
    next_sample: TimePoint,
    started: bool,
}

impl SampleSchedule {
    pub fn new(frequency_hz: Real, startup_delay_sec: Real) -> Self {
        Self {
            period_ns: (1e9 / frequency_hz.max(1e-3) as f64) as u64,
            startup_delay_ns: (startup_delay_sec.max(0.0) as f64 * 1e9) as u64,
            next_sample: 0,
            started: false,
        }
    }

    /// Re-arms the schedule from the current time.
    pub fn restart(&mut self, now: TimePoint) {
        self.next_sample = now + self.startup_delay_ns;
        self.started = false;
    }

    /// Whether a sample is due at `now`; advances the schedule when it is.
    pub fn due(&mut self, now: TimePoint) -> bool {
        if now < self.next_sample {
            return false;
        }
        self.started = true;
        self.next_sample += self.period_ns;
        if self.next_sample <= now {
            // Catch up after a long pause rather than replaying every period.
            self.next_sample = now + self.period_ns;
        }
        true
    }

    /// Whether the startup delay has elapsed and at least one sample fired.
    pub fn started(&self) -> bool {
        self.started
    }
}

/// Tagged union over all sensor kinds, stored by [`SensorSuite`].
pub enum AnySensor {
    Imu(ImuSensor),
    Barometer(BarometerSensor),
    Magnetometer(MagnetometerSensor),
    Gps(GpsSensor),
    Distance(DistanceSensor),
    Lidar(LidarSensor),
}

impl AnySensor {
    pub fn name(&self) -> &str {
        match self {
            Self::Imu(s) => s.name(),
            Self::Barometer(s) => s.name(),
            Self::Magnetometer(s) => s.name(),
            Self::Gps(s) => s.name(),
            Self::Distance(s) => s.name(),
            Self::Lidar(s) => s.name(),
        }
    }

    pub fn sensor_type(&self) -> SensorType {
        match self {
            Self::Imu(_) => SensorType::Imu,
            Self::Barometer(_) => SensorType::Barometer,
            Self::Magnetometer(_) => SensorType::Magnetometer,
            Self::Gps(_) => SensorType::Gps,
            Self::Distance(_) => SensorType::Distance,
            Self::Lidar(_) => SensorType::Lidar,
        }
    }

    pub fn imu_output(&self) -> Option<ImuData> {
        match self {
            Self::Imu(s) => Some(s.get_output()),
            _ => None,
        }
    }

    pub fn barometer_output(&self) -> Option<BarometerData> {
        match self {
            Self::Barometer(s) => Some(s.get_output()),
            _ => None,
        }
    }

    pub fn magnetometer_output(&self) -> Option<MagnetometerData> {
        match self {
            Self::Magnetometer(s) => Some(s.get_output()),
            _ => None,
        }
    }

    pub fn gps_output(&self) -> Option<GpsData> {
        match self {
            Self::Gps(s) => Some(s.get_output()),
            _ => None,
        }
    }

    pub fn distance_output(&self) -> Option<DistanceSensorData> {
        match self {
            Self::Distance(s) => Some(s.get_output()),
            _ => None,
        }
    }

    pub fn lidar_output(&self) -> Option<LidarData> {
        match self {
            Self::Lidar(s) => Some(s.get_output()),
            _ => None,
        }
    }
}

impl Updatable for AnySensor {
    fn reset(&mut self) {
        match self {
            Self::Imu(s) => s.reset(),
            Self::Barometer(s) => s.reset(),
            Self::Magnetometer(s) => s.reset(),
            Self::Gps(s) => s.reset(),
            Self::Distance(s) => s.reset(),
            Self::Lidar(s) => s.reset(),
        }
    }

    fn update(&mut self) -> Result<(), SimError> {
        match self {
            Self::Imu(s) => s.update(),
            Self::Barometer(s) => s.update(),
            Self::Magnetometer(s) => s.update(),
            Self::Gps(s) => s.update(),
            Self::Distance(s) => s.update(),
            Self::Lidar(s) => s.update(),
        }
    }
}

/// Ordered collection of one vehicle's sensors, updated on the physics tick
/// right after the body integrates.
#[derive(Default)]
pub struct SensorSuite {
    sensors: Vec<AnySensor>,
}

impl SensorSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sensor: AnySensor) {
        self.sensors.push(sensor);
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnySensor> {
        self.sensors.iter()
    }

    /// First sensor of the given type, the common lookup for API getters.
    pub fn first_of(&self, sensor_type: SensorType) -> Option<&AnySensor> {
        self.sensors.iter().find(|s| s.sensor_type() == sensor_type)
    }

    /// Sensor by name, falling back to the first of the type when the name
    /// is empty.
    pub fn by_name(&self, sensor_type: SensorType, name: &str) -> Option<&AnySensor> {
        if name.is_empty() {
            return self.first_of(sensor_type);
        }
        self.sensors
            .iter()
            .find(|s| s.sensor_type() == sensor_type && s.name() == name)
    }
}

impl Updatable for SensorSuite {
    fn reset(&mut self) {
        for sensor in &mut self.sensors {
            sensor.reset();
        }
    }

    fn update(&mut self) -> Result<(), SimError> {
        for sensor in &mut self.sensors {
            sensor.update()?;
        }
        Ok(())
    }
}

/// Shared helper: the clock every sensor reads through.
pub type SharedClock = Arc<dyn SimClock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_schedule_honors_startup_delay() {
        let mut sched = SampleSchedule::new(100.0, 0.5);
        sched.restart(0);
        assert!(!sched.due(100_000_000));
        assert!(!sched.started());
        assert!(sched.due(500_000_000));
        assert!(sched.started());
    }

    #[test]
    fn test_sample_schedule_period() {
        let mut sched = SampleSchedule::new(100.0, 0.0); // 10 ms period
        sched.restart(0);
        assert!(sched.due(0));
        assert!(!sched.due(5_000_000));
        assert!(sched.due(10_000_000));
    }

    #[test]
    fn test_flat_ground_caster_hits_below() {
        let caster = FlatGroundCaster::default();
        let hit = caster
            .cast(Vector3r::new(0.0, 0.0, -10.0), Vector3r::new(0.0, 0.0, 1.0), 40.0)
            .unwrap();
        assert!((hit.point.z - 0.0).abs() < 1e-6);

        // Upward ray never hits the ground plane.
        assert!(caster
            .cast(Vector3r::new(0.0, 0.0, -10.0), Vector3r::new(0.0, 0.0, -1.0), 40.0)
            .is_none());
    }
}
