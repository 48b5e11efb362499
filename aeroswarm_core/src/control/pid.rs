//! PID controller with a bounded integrator.

use crate::geom::Real;

/// Gains and output bounds for one PID loop.
#[derive(Debug, Clone)]
pub struct PidConfig {
    pub kp: Real,
    pub ki: Real,
    pub kd: Real,
    pub min_output: Real,
    pub max_output: Real,
    /// Anti-windup bound on the integrated term, in output units.
    pub integrator_limit: Real,
}

impl PidConfig {
    pub fn p(kp: Real) -> Self {
        Self {
            kp,
            ki: 0.0,
            kd: 0.0,
            ..Default::default()
        }
    }

    pub fn pid(kp: Real, ki: Real, kd: Real) -> Self {
        Self {
            kp,
            ki,
            kd,
            ..Default::default()
        }
    }

    pub fn with_output_bounds(mut self, min: Real, max: Real) -> Self {
        self.min_output = min;
        self.max_output = max;
        self
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            min_output: -1.0,
            max_output: 1.0,
            integrator_limit: 0.5,
        }
    }
}

/// Classic PID with derivative-on-measurement and a clamped integrator.
#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    integrator: Real,
    last_measured: Real,
    has_last: bool,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            integrator: 0.0,
            last_measured: 0.0,
            has_last: false,
        }
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Clears accumulated state. Called on reset and whenever the axis
    /// changes goal-mode semantics.
    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.last_measured = 0.0;
        self.has_last = false;
    }

    /// One control step; `dt` in seconds.
    pub fn update(&mut self, goal: Real, measured: Real, dt: Real) -> Real {
        let error = goal - measured;

        self.integrator = (self.integrator + error * self.config.ki * dt)
            .clamp(-self.config.integrator_limit, self.config.integrator_limit);

        // Derivative on measurement avoids the kick on goal changes.
        let derivative = if self.has_last && dt > 0.0 {
            -(measured - self.last_measured) / dt
        } else {
            0.0
        };
        self.last_measured = measured;
        self.has_last = true;

        (error * self.config.kp + self.integrator + derivative * self.config.kd)
            .clamp(self.config.min_output, self.config.max_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_response() {
        let mut pid = PidController::new(PidConfig::p(0.5).with_output_bounds(-10.0, 10.0));
        assert_eq!(pid.update(2.0, 0.0, 0.01), 1.0);
    }

    #[test]
    fn test_output_saturates() {
        let mut pid = PidController::new(PidConfig::p(100.0));
        assert_eq!(pid.update(1.0, 0.0, 0.01), 1.0);
        assert_eq!(pid.update(-1.0, 0.0, 0.01), -1.0);
    }

    #[test]
    fn test_integrator_is_bounded() {
        let mut pid = PidController::new(PidConfig::pid(0.0, 10.0, 0.0).with_output_bounds(-10.0, 10.0));
        for _ in 0..10_000 {
            pid.update(1.0, 0.0, 0.01);
        }
        // Integrator clamps at its limit instead of winding up.
        let out = pid.update(1.0, 0.0, 0.01);
        assert!(out <= pid.config().integrator_limit + 1e-6);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = PidController::new(PidConfig::pid(1.0, 1.0, 0.1));
        pid.update(1.0, 0.2, 0.01);
        pid.reset();
        let mut fresh = PidController::new(PidConfig::pid(1.0, 1.0, 0.1));
        assert_eq!(pid.update(1.0, 0.2, 0.01), fresh.update(1.0, 0.2, 0.01));
    }
}
