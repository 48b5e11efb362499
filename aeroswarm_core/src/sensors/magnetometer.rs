//! Magnetometer synthesizing the local Earth field in the body frame.

use crate::clock::{SimClock, TimePoint};
use crate::error::SimError;
use crate::geom::{to_body_frame, Real, Vector3r};
use crate::sensors::{GaussianGenerator, GroundTruth, SampleSchedule, SharedClock};
use crate::updatable::{Lifecycle, Updatable};

/// Latched magnetometer output.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetometerData {
    pub time_stamp: TimePoint,
    /// Field in the body frame, Gauss.
    pub magnetic_field_body: Vector3r,
    /// Row-major 3x3 covariance.
    pub covariance: [Real; 9],
}

impl Default for MagnetometerData {
    fn default() -> Self {
        Self {
            time_stamp: 0,
            magnetic_field_body: Vector3r::zeros(),
            covariance: [0.0; 9],
        }
    }
}

#[derive(Debug, Clone)]
pub struct MagnetometerParams {
    pub frequency_hz: Real,
    pub startup_delay_sec: Real,
    /// Local declination, radians east of true north.
    pub declination: Real,
    /// Local inclination, radians below horizontal.
    pub inclination: Real,
    /// Total field intensity, Gauss.
    pub field_intensity: Real,
    /// Per-axis white noise, Gauss.
    pub noise_sigma: Real,
    pub seed: u64,
}

impl Default for MagnetometerParams {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            startup_delay_sec: 0.0,
            declination: 0.27,
            inclination: 1.22,
            field_intensity: 0.53,
            noise_sigma: 0.005,
            seed: 0,
        }
    }
}

pub struct MagnetometerSensor {
    lifecycle: Lifecycle,
    name: String,
    params: MagnetometerParams,
    clock: SharedClock,
    ground_truth: GroundTruth,
    schedule: SampleSchedule,
    gauss: GaussianGenerator,
    field_ned: Vector3r,
    output: MagnetometerData,
}

impl MagnetometerSensor {
    pub fn new(
        name: impl Into<String>,
        params: MagnetometerParams,
        clock: SharedClock,
        ground_truth: GroundTruth,
    ) -> Self {
        let schedule = SampleSchedule::new(params.frequency_hz, params.startup_delay_sec);
        // Constant local field from declination/inclination; adequate at
        // swarm scale where the field does not vary measurably.
        let field_ned = Vector3r::new(
            params.field_intensity * params.inclination.cos() * params.declination.cos(),
            params.field_intensity * params.inclination.cos() * params.declination.sin(),
            params.field_intensity * params.inclination.sin(),
        );
        let seed = params.seed;
        Self {
            lifecycle: Lifecycle::default(),
            name: name.into(),
            params,
            clock,
            ground_truth,
            schedule,
            gauss: GaussianGenerator::new(seed),
            field_ned,
            output: MagnetometerData::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_output(&self) -> MagnetometerData {
        self.output.clone()
    }

    fn sample(&mut self) {
        let kinematics = self.ground_truth.kinematics();
        let body_field = to_body_frame(&self.field_ned, &kinematics.pose.orientation)
            + self.gauss.next_vector3() * self.params.noise_sigma;

        let var = self.params.noise_sigma * self.params.noise_sigma;
        let mut covariance = [0.0; 9];
        covariance[0] = var;
        covariance[4] = var;
        covariance[8] = var;

        self.output = MagnetometerData {
            time_stamp: self.clock.now(),
            magnetic_field_body: body_field,
            covariance,
        };
    }
}

impl Updatable for MagnetometerSensor {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.schedule.restart(self.clock.now());
        self.gauss.reseed(self.params.seed);
        self.output = MagnetometerData::default();
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("magnetometer")?;
        if self.schedule.due(self.clock.now()) {
            self.sample();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppableClock;
    use crate::environment::Environment;
    use crate::geom::Pose;
    use crate::physics::RigidBody;
    use std::sync::{Arc, RwLock};

    fn fixture() -> (Arc<SteppableClock>, MagnetometerSensor) {
        let clock = Arc::new(SteppableClock::new(20_000_000, 1.0));
        let gt = GroundTruth {
            body: Arc::new(RwLock::new(RigidBody::new(
                "v",
                1.0,
                Vector3r::new(0.005, 0.005, 0.009),
                Pose::zero(),
            ))),
            environment: Arc::new(RwLock::new(Environment::new(Default::default()))),
        };
        let shared: SharedClock = clock.clone();
        let mut mag = MagnetometerSensor::new("mag", MagnetometerParams::default(), shared, gt);
        mag.reset();
        (clock, mag)
    }

    #[test]
    fn test_level_body_sees_ned_field() {
        let (clock, mut mag) = fixture();
        clock.step();
        mag.update().unwrap();
        let out = mag.get_output();
        let params = MagnetometerParams::default();
        let expected_z = params.field_intensity * params.inclination.sin();
        assert!((out.magnetic_field_body.z - expected_z).abs() < 0.05);
    }

    #[test]
    fn test_covariance_is_diagonal_noise() {
        let (clock, mut mag) = fixture();
        clock.step();
        mag.update().unwrap();
        let cov = mag.get_output().covariance;
        let var = 0.005_f32 * 0.005;
        assert!((cov[0] - var).abs() < 1e-9);
        assert_eq!(cov[1], 0.0);
        assert!((cov[8] - var).abs() < 1e-9);
    }
}
