//! Single-ray distance sensor.

use std::sync::Arc;

use crate::clock::{SimClock, TimePoint};
use crate::error::SimError;
use crate::geom::{Pose, Real, Vector3r};
use crate::sensors::{GaussianGenerator, GroundTruth, RayCaster, SampleSchedule, SharedClock};
use crate::updatable::{Lifecycle, Updatable};

/// Latched distance-sensor output.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceSensorData {
    pub time_stamp: TimePoint,
    pub distance: Real,
    pub min_distance: Real,
    pub max_distance: Real,
    /// Sensor pose relative to the vehicle body.
    pub relative_pose: Pose,
}

impl Default for DistanceSensorData {
    fn default() -> Self {
        Self {
            time_stamp: 0,
            distance: 0.0,
            min_distance: 0.0,
            max_distance: 0.0,
            relative_pose: Pose::zero(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistanceSensorParams {
    pub frequency_hz: Real,
    pub startup_delay_sec: Real,
    pub min_distance: Real,
    pub max_distance: Real,
    /// Mounting pose relative to the body; default points straight down.
    pub relative_pose: Pose,
    /// White range noise, meters.
    pub noise_sigma: Real,
    pub seed: u64,
}

impl Default for DistanceSensorParams {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            startup_delay_sec: 0.0,
            min_distance: 0.2,
            max_distance: 40.0,
            relative_pose: Pose::zero(),
            noise_sigma: 0.0,
            seed: 0,
        }
    }
}

pub struct DistanceSensor {
    lifecycle: Lifecycle,
    name: String,
    params: DistanceSensorParams,
    clock: SharedClock,
    ground_truth: GroundTruth,
    ray_caster: Arc<dyn RayCaster>,
    schedule: SampleSchedule,
    gauss: GaussianGenerator,
    output: DistanceSensorData,
}

impl DistanceSensor {
    pub fn new(
        name: impl Into<String>,
        params: DistanceSensorParams,
        clock: SharedClock,
        ground_truth: GroundTruth,
        ray_caster: Arc<dyn RayCaster>,
    ) -> Self {
        let schedule = SampleSchedule::new(params.frequency_hz, params.startup_delay_sec);
        let seed = params.seed;
        Self {
            lifecycle: Lifecycle::default(),
            name: name.into(),
            params,
            clock,
            ground_truth,
            ray_caster,
            schedule,
            gauss: GaussianGenerator::new(seed),
            output: DistanceSensorData::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_output(&self) -> DistanceSensorData {
        self.output.clone()
    }

    fn sample(&mut self) {
        let kinematics = self.ground_truth.kinematics();
        let body_pose = kinematics.pose;

        // Sensor origin and beam direction in the world frame. The beam fires
        // along the sensor frame's +z (down for the default mounting).
        let origin = body_pose.transform(&self.params.relative_pose.position);
        let beam_local = self
            .params
            .relative_pose
            .orientation
            .transform_vector(&Vector3r::new(0.0, 0.0, 1.0));
        let direction = body_pose.orientation.transform_vector(&beam_local);

        let measured = match self
            .ray_caster
            .cast(origin, direction, self.params.max_distance)
        {
            Some(hit) => (hit.point - origin).norm(),
            None => self.params.max_distance,
        };

        let noisy = measured + self.gauss.next() * self.params.noise_sigma;
        let distance = noisy.clamp(self.params.min_distance, self.params.max_distance);

        self.output = DistanceSensorData {
            time_stamp: self.clock.now(),
            distance,
            min_distance: self.params.min_distance,
            max_distance: self.params.max_distance,
            relative_pose: self.params.relative_pose,
        };
    }
}

impl Updatable for DistanceSensor {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.schedule.restart(self.clock.now());
        self.gauss.reseed(self.params.seed);
        self.output = DistanceSensorData::default();
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("distance sensor")?;
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
    use crate::physics::RigidBody;
    use crate::sensors::FlatGroundCaster;
    use std::sync::RwLock;

    fn fixture(altitude: Real) -> (Arc<SteppableClock>, DistanceSensor) {
        let clock = Arc::new(SteppableClock::new(20_000_000, 1.0));
        let pose = Pose::new(Vector3r::new(0.0, 0.0, -altitude), crate::geom::Quaternionr::identity());
        let body = RigidBody::new("v", 1.0, Vector3r::new(0.005, 0.005, 0.009), pose);
        let gt = GroundTruth {
            body: Arc::new(RwLock::new(body)),
            environment: Arc::new(RwLock::new(Environment::new(Default::default()))),
        };
        let shared: SharedClock = clock.clone();
        let mut sensor = DistanceSensor::new(
            "dist",
            DistanceSensorParams::default(),
            shared,
            gt,
            Arc::new(FlatGroundCaster::default()),
        );
        sensor.reset();
        (clock, sensor)
    }

    #[test]
    fn test_measures_height_above_ground() {
        let (clock, mut sensor) = fixture(12.0);
        clock.step();
        sensor.update().unwrap();
        let out = sensor.get_output();
        assert!((out.distance - 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_clamps_to_max_when_no_hit() {
        let (clock, mut sensor) = fixture(100.0); // beyond max range
        clock.step();
        sensor.update().unwrap();
        let out = sensor.get_output();
        assert_eq!(out.distance, out.max_distance);
    }

    #[test]
    fn test_clamps_to_min_when_on_ground() {
        let (clock, mut sensor) = fixture(0.0);
        clock.step();
        sensor.update().unwrap();
        let out = sensor.get_output();
        assert_eq!(out.distance, out.min_distance);
    }
}
