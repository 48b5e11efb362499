//! GPS receiver with DOP convergence, fix gating and output latency.

use crate::clock::{SimClock, TimePoint};
use crate::error::SimError;
use crate::geom::{GeoPoint, Real, Vector3r};
use crate::sensors::{DelayLine, GaussianGenerator, GroundTruth, SampleSchedule, SharedClock};
use crate::updatable::{Lifecycle, Updatable};

/// GPS fix quality, numeric values stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum GpsFixType {
    #[default]
    NoFix = 0,
    TwoDFix = 2,
    ThreeDFix = 3,
}

/// Latched GPS output.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsData {
    pub time_stamp: TimePoint,
    pub geo_point: GeoPoint,
    /// Horizontal dilution of precision.
    pub eph: Real,
    /// Vertical dilution of precision.
    pub epv: Real,
    /// NED velocity, m/s.
    pub velocity: Vector3r,
    pub fix_type: GpsFixType,
    /// Microseconds since the Unix epoch at sample time.
    pub time_utc: u64,
}

impl Default for GpsData {
    fn default() -> Self {
        Self {
            time_stamp: 0,
            geo_point: GeoPoint {
                latitude: 0.0,
                longitude: 0.0,
                altitude: 0.0,
            },
            eph: 0.0,
            epv: 0.0,
            velocity: Vector3r::zeros(),
            fix_type: GpsFixType::NoFix,
            time_utc: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpsParams {
    pub frequency_hz: Real,
    pub startup_delay_sec: Real,
    /// DOP at cold start.
    pub eph_initial: Real,
    pub epv_initial: Real,
    /// DOP after full convergence.
    pub eph_final: Real,
    pub epv_final: Real,
    /// Low-pass time constants for DOP convergence, seconds.
    pub eph_tau: Real,
    pub epv_tau: Real,
    /// DOP below which a 3D fix is reported.
    pub eph_fix_threshold: Real,
    /// Horizontal position noise, meters.
    pub position_noise_sigma: Real,
    /// Output latency modeled by the delay line, seconds.
    pub update_latency_sec: Real,
    /// Virtual epoch the simulation started at, microseconds UTC.
    pub sim_epoch_utc_us: u64,
    pub seed: u64,
}

impl Default for GpsParams {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            startup_delay_sec: 0.0,
            eph_initial: 100.0,
            epv_initial: 100.0,
            eph_final: 0.3,
            epv_final: 0.4,
            eph_tau: 0.9,
            epv_tau: 0.9,
            eph_fix_threshold: 10.0,
            position_noise_sigma: 0.0,
            update_latency_sec: 0.2,
            // 2024-01-01T00:00:00Z
            sim_epoch_utc_us: 1_704_067_200_000_000,
            seed: 0,
        }
    }
}

pub struct GpsSensor {
    lifecycle: Lifecycle,
    name: String,
    params: GpsParams,
    clock: SharedClock,
    ground_truth: GroundTruth,
    schedule: SampleSchedule,
    gauss: GaussianGenerator,
    eph: Real,
    epv: Real,
    last_time: TimePoint,
    delay_line: DelayLine<GpsData>,
}

impl GpsSensor {
    pub fn new(
        name: impl Into<String>,
        params: GpsParams,
        clock: SharedClock,
        ground_truth: GroundTruth,
    ) -> Self {
        let schedule = SampleSchedule::new(params.frequency_hz, params.startup_delay_sec);
        let delay_line = DelayLine::new(clock.clone(), params.update_latency_sec as f64);
        let (eph, epv, seed) = (params.eph_initial, params.epv_initial, params.seed);
        Self {
            lifecycle: Lifecycle::default(),
            name: name.into(),
            params,
            clock,
            ground_truth,
            schedule,
            gauss: GaussianGenerator::new(seed),
            eph,
            epv,
            last_time: 0,
            delay_line,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_output(&self) -> GpsData {
        self.delay_line.get_output()
    }

    fn sample(&mut self) {
        let kinematics = self.ground_truth.kinematics();
        let environment = self.ground_truth.environment();

        let dt_ns = self.clock.update_since(&mut self.last_time);
        let dt = crate::clock::nanos_to_sec(dt_ns) as Real;

        // First-order convergence from cold-start DOP toward the final DOP.
        let eph_alpha = (-dt / self.params.eph_tau).exp();
        let epv_alpha = (-dt / self.params.epv_tau).exp();
        self.eph = self.params.eph_final + (self.eph - self.params.eph_final) * eph_alpha;
        self.epv = self.params.epv_final + (self.epv - self.params.epv_final) * epv_alpha;

        let fix_type = if self.eph <= self.params.eph_fix_threshold {
            GpsFixType::ThreeDFix
        } else {
            GpsFixType::NoFix
        };

        let jitter = self.gauss.next_vector3() * self.params.position_noise_sigma;
        let geo_point = environment.geo_point.offset_ned(&jitter);

        let now = self.clock.now();
        let reading = GpsData {
            time_stamp: now,
            geo_point,
            eph: self.eph,
            epv: self.epv,
            velocity: kinematics.twist.linear,
            fix_type,
            time_utc: self.params.sim_epoch_utc_us + now / 1_000,
        };
        self.delay_line.push(reading, 0);
    }
}

impl Updatable for GpsSensor {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.schedule.restart(self.clock.now());
        self.gauss.reseed(self.params.seed);
        self.eph = self.params.eph_initial;
        self.epv = self.params.epv_initial;
        self.last_time = self.clock.now();
        self.delay_line.reset();
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("gps")?;
        if self.schedule.due(self.clock.now()) {
            self.sample();
        }
        self.delay_line.update()
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

    fn fixture(params: GpsParams) -> (Arc<SteppableClock>, GpsSensor) {
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
        let mut gps = GpsSensor::new("gps", params, shared, gt);
        gps.reset();
        (clock, gps)
    }

    #[test]
    fn test_dop_converges_and_fix_appears() {
        let (clock, mut gps) = fixture(GpsParams {
            update_latency_sec: 0.0,
            ..Default::default()
        });
        // First samples: cold-start DOP, no fix yet.
        clock.step();
        gps.update().unwrap();
        let early = gps.get_output();
        assert!(early.eph > 10.0);
        assert_eq!(early.fix_type, GpsFixType::NoFix);

        // After several seconds of convergence, a 3D fix.
        for _ in 0..400 {
            clock.step();
            gps.update().unwrap();
        }
        let late = gps.get_output();
        assert!(late.eph < 10.0);
        assert_eq!(late.fix_type, GpsFixType::ThreeDFix);
        assert!(late.time_stamp > early.time_stamp);
    }

    #[test]
    fn test_reports_home_location_at_rest() {
        let (clock, mut gps) = fixture(GpsParams {
            update_latency_sec: 0.0,
            ..Default::default()
        });
        clock.step();
        gps.update().unwrap();
        let out = gps.get_output();
        let home = GeoPoint::default();
        assert!((out.geo_point.latitude - home.latitude).abs() < 1e-9);
        assert_eq!(out.velocity, Vector3r::zeros());
    }

    #[test]
    fn test_time_utc_tracks_virtual_clock() {
        let (clock, mut gps) = fixture(GpsParams {
            update_latency_sec: 0.0,
            ..Default::default()
        });
        clock.step();
        gps.update().unwrap();
        let out = gps.get_output();
        let expected = GpsParams::default().sim_epoch_utc_us + clock.now() / 1_000;
        assert_eq!(out.time_utc, expected);
    }
}
