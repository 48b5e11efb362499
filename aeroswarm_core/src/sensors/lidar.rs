//! Scanning lidar emitting a configurable ray pattern per sample.

use std::sync::Arc;

use crate::clock::{SimClock, TimePoint};
use crate::error::SimError;
use crate::geom::{to_body_frame, Pose, Real, Vector3r};
use crate::sensors::{GroundTruth, RayCaster, SampleSchedule, SharedClock};
use crate::updatable::{Lifecycle, Updatable};

/// Frame the point cloud is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LidarDataFrame {
    /// World frame, translated so the vehicle is the origin.
    #[default]
    VehicleInertial,
    /// Sensor-local frame.
    SensorLocal,
}

/// Latched lidar output.
///
/// `point_cloud` is a flat `[x0, y0, z0, x1, ...]` buffer; `segmentation`
/// carries one id per returned point. Rays without a hit are omitted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LidarData {
    pub time_stamp: TimePoint,
    pub point_cloud: Vec<Real>,
    pub segmentation: Vec<i32>,
    pub pose: Pose,
}

#[derive(Debug, Clone)]
pub struct LidarParams {
    pub frequency_hz: Real,
    pub startup_delay_sec: Real,
    /// Number of vertical channels.
    pub channels: u32,
    /// Rays per channel per sample.
    pub horizontal_rays: u32,
    pub vertical_fov_upper_deg: Real,
    pub vertical_fov_lower_deg: Real,
    pub horizontal_fov_start_deg: Real,
    pub horizontal_fov_end_deg: Real,
    pub range: Real,
    /// Mounting pose relative to the body.
    pub relative_pose: Pose,
    pub data_frame: LidarDataFrame,
}

impl Default for LidarParams {
    fn default() -> Self {
        Self {
            frequency_hz: 10.0,
            startup_delay_sec: 0.0,
            channels: 16,
            horizontal_rays: 64,
            vertical_fov_upper_deg: -15.0,
            vertical_fov_lower_deg: -45.0,
            horizontal_fov_start_deg: -180.0,
            horizontal_fov_end_deg: 180.0,
            range: 100.0,
            relative_pose: Pose::zero(),
            data_frame: LidarDataFrame::VehicleInertial,
        }
    }
}

pub struct LidarSensor {
    lifecycle: Lifecycle,
    name: String,
    params: LidarParams,
    clock: SharedClock,
    ground_truth: GroundTruth,
    ray_caster: Arc<dyn RayCaster>,
    schedule: SampleSchedule,
    output: LidarData,
}

impl LidarSensor {
    pub fn new(
        name: impl Into<String>,
        params: LidarParams,
        clock: SharedClock,
        ground_truth: GroundTruth,
        ray_caster: Arc<dyn RayCaster>,
    ) -> Self {
        let schedule = SampleSchedule::new(params.frequency_hz, params.startup_delay_sec);
        Self {
            lifecycle: Lifecycle::default(),
            name: name.into(),
            params,
            clock,
            ground_truth,
            ray_caster,
            schedule,
            output: LidarData::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_output(&self) -> LidarData {
        self.output.clone()
    }

    fn sample(&mut self) {
        let kinematics = self.ground_truth.kinematics();
        let body_pose = kinematics.pose;
        let sensor_origin = body_pose.transform(&self.params.relative_pose.position);
        let sensor_orientation = body_pose.orientation * self.params.relative_pose.orientation;

        let mut point_cloud =
            Vec::with_capacity((self.params.channels * self.params.horizontal_rays * 3) as usize);
        let mut segmentation =
            Vec::with_capacity((self.params.channels * self.params.horizontal_rays) as usize);

        let v_span = self.params.vertical_fov_upper_deg - self.params.vertical_fov_lower_deg;
        let h_span = self.params.horizontal_fov_end_deg - self.params.horizontal_fov_start_deg;

        for channel in 0..self.params.channels {
            // Elevation is negative below the horizon; NED z is down.
            let elevation = if self.params.channels > 1 {
                self.params.vertical_fov_lower_deg
                    + v_span * channel as Real / (self.params.channels - 1) as Real
            } else {
                self.params.vertical_fov_upper_deg
            }
            .to_radians();

            for ray in 0..self.params.horizontal_rays {
                let azimuth = (self.params.horizontal_fov_start_deg
                    + h_span * ray as Real / self.params.horizontal_rays as Real)
                    .to_radians();

                let direction_local = Vector3r::new(
                    elevation.cos() * azimuth.cos(),
                    elevation.cos() * azimuth.sin(),
                    -elevation.sin(),
                );
                let direction = sensor_orientation.transform_vector(&direction_local);

                let Some(hit) = self
                    .ray_caster
                    .cast(sensor_origin, direction, self.params.range)
                else {
                    continue;
                };

                let point = match self.params.data_frame {
                    LidarDataFrame::VehicleInertial => hit.point - body_pose.position,
                    LidarDataFrame::SensorLocal => {
                        to_body_frame(&(hit.point - sensor_origin), &sensor_orientation)
                    }
                };
                point_cloud.extend_from_slice(&[point.x, point.y, point.z]);
                segmentation.push(hit.segmentation_id);
            }
        }

        self.output = LidarData {
            time_stamp: self.clock.now(),
            point_cloud,
            segmentation,
            pose: Pose::new(sensor_origin, sensor_orientation),
        };
    }
}

impl Updatable for LidarSensor {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.schedule.restart(self.clock.now());
        self.output = LidarData::default();
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("lidar")?;
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

    fn fixture(params: LidarParams) -> (Arc<SteppableClock>, LidarSensor) {
        let clock = Arc::new(SteppableClock::new(100_000_000, 1.0));
        let pose = Pose::new(Vector3r::new(0.0, 0.0, -10.0), crate::geom::Quaternionr::identity());
        let body = RigidBody::new("v", 1.0, Vector3r::new(0.005, 0.005, 0.009), pose);
        let gt = GroundTruth {
            body: Arc::new(RwLock::new(body)),
            environment: Arc::new(RwLock::new(Environment::new(Default::default()))),
        };
        let shared: SharedClock = clock.clone();
        let mut lidar = LidarSensor::new(
            "lidar",
            params,
            shared,
            gt,
            Arc::new(FlatGroundCaster::default()),
        );
        lidar.reset();
        (clock, lidar)
    }

    #[test]
    fn test_downward_rays_hit_ground_plane() {
        let (clock, mut lidar) = fixture(LidarParams::default());
        clock.step();
        lidar.update().unwrap();
        let out = lidar.get_output();
        assert!(!out.point_cloud.is_empty());
        assert_eq!(out.point_cloud.len(), out.segmentation.len() * 3);
        // Vehicle-inertial frame: ground points sit 10 m below the vehicle.
        let z = out.point_cloud[2];
        assert!((z - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_upward_rays_are_omitted() {
        let params = LidarParams {
            vertical_fov_upper_deg: 30.0,
            vertical_fov_lower_deg: 10.0,
            ..Default::default()
        };
        let (clock, mut lidar) = fixture(params);
        clock.step();
        lidar.update().unwrap();
        assert!(lidar.get_output().point_cloud.is_empty());
    }

    #[test]
    fn test_sensor_local_frame() {
        let params = LidarParams {
            data_frame: LidarDataFrame::SensorLocal,
            channels: 1,
            horizontal_rays: 4,
            vertical_fov_upper_deg: -90.0,
            vertical_fov_lower_deg: -90.0,
            ..Default::default()
        };
        let (clock, mut lidar) = fixture(params);
        clock.step();
        lidar.update().unwrap();
        let out = lidar.get_output();
        assert!(!out.point_cloud.is_empty());
        // Straight-down beams from 10 m report z = +10 in the sensor frame.
        assert!((out.point_cloud[2] - 10.0).abs() < 1e-3);
    }
}
