//! Barometric altimeter with pressure-drift noise and output latency.

use crate::clock::{SimClock, TimePoint};
use crate::error::SimError;
use crate::geom::Real;
use crate::sensors::{DelayLine, GaussianGenerator, GroundTruth, SampleSchedule, SharedClock};
use crate::updatable::{Lifecycle, Updatable};

/// Standard QNH, hectopascal.
const QNH_HPA: Real = 1013.25;

/// Latched barometer output.
#[derive(Debug, Clone, PartialEq)]
pub struct BarometerData {
    pub time_stamp: TimePoint,
    /// Pressure altitude, meters.
    pub altitude: Real,
    /// Static pressure, Pascal.
    pub pressure: Real,
    /// Altimeter setting, hectopascal.
    pub qnh: Real,
}

impl Default for BarometerData {
    fn default() -> Self {
        Self {
            time_stamp: 0,
            altitude: 0.0,
            pressure: 0.0,
            qnh: QNH_HPA,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BarometerParams {
    pub frequency_hz: Real,
    pub startup_delay_sec: Real,
    /// Sigma of the slow pressure-factor drift, fraction of pressure.
    pub pressure_factor_sigma: Real,
    /// Time constant of the drift, seconds.
    pub pressure_factor_tau: Real,
    /// White pressure noise, Pascal.
    pub uncorrelated_noise_sigma: Real,
    /// Output latency modeled by the delay line, seconds.
    pub update_latency_sec: Real,
    pub seed: u64,
}

impl Default for BarometerParams {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            startup_delay_sec: 0.0,
            pressure_factor_sigma: 0.0365 / 20.0,
            pressure_factor_tau: 3600.0,
            uncorrelated_noise_sigma: 2.7,
            update_latency_sec: 0.0,
            seed: 0,
        }
    }
}

pub struct BarometerSensor {
    lifecycle: Lifecycle,
    name: String,
    params: BarometerParams,
    clock: SharedClock,
    ground_truth: GroundTruth,
    schedule: SampleSchedule,
    gauss: GaussianGenerator,
    pressure_factor: Real,
    last_time: TimePoint,
    delay_line: DelayLine<BarometerData>,
}

impl BarometerSensor {
    pub fn new(
        name: impl Into<String>,
        params: BarometerParams,
        clock: SharedClock,
        ground_truth: GroundTruth,
    ) -> Self {
        let schedule = SampleSchedule::new(params.frequency_hz, params.startup_delay_sec);
        let delay_line = DelayLine::new(clock.clone(), params.update_latency_sec as f64);
        let seed = params.seed;
        Self {
            lifecycle: Lifecycle::default(),
            name: name.into(),
            params,
            clock,
            ground_truth,
            schedule,
            gauss: GaussianGenerator::new(seed),
            pressure_factor: 0.0,
            last_time: 0,
            delay_line,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_output(&self) -> BarometerData {
        self.delay_line.get_output()
    }

    fn sample(&mut self) {
        let environment = self.ground_truth.environment();
        let dt_ns = self.clock.update_since(&mut self.last_time);
        let dt = crate::clock::nanos_to_sec(dt_ns) as Real;

        // First-order Gauss-Markov drift on the pressure factor.
        let alpha = (-dt / self.params.pressure_factor_tau).exp();
        self.pressure_factor = self.pressure_factor * alpha
            + self.gauss.next() * self.params.pressure_factor_sigma * (1.0 - alpha * alpha).sqrt();

        let pressure = environment.air_pressure * (1.0 + self.pressure_factor)
            + self.gauss.next() * self.params.uncorrelated_noise_sigma;

        // Pressure altitude relative to QNH.
        let qnh_pa = QNH_HPA * 100.0;
        let altitude = 44_330.0 * (1.0 - (pressure / qnh_pa).powf(1.0 / 5.2561));

        let reading = BarometerData {
            time_stamp: self.clock.now(),
            altitude,
            pressure,
            qnh: QNH_HPA,
        };
        self.delay_line.push(reading, 0);
    }
}

impl Updatable for BarometerSensor {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.schedule.restart(self.clock.now());
        self.gauss.reseed(self.params.seed);
        self.pressure_factor = 0.0;
        self.last_time = self.clock.now();
        self.delay_line.reset();
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("barometer")?;
        if self.schedule.due(self.clock.now()) {
            self.sample();
        }
        self.delay_line.update()
    }
}
