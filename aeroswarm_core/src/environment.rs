//! Ambient environment state derived from a vehicle's position.
//!
//! Pressure, temperature and density follow the international standard
//! atmosphere; the geodetic point tracks the vehicle as it moves away from
//! its home location.

use crate::error::SimError;
use crate::geom::{GeoPoint, Real, Vector3r};
use crate::updatable::{Lifecycle, Updatable};

/// Standard gravity, m/s^2, pointing down in NED.
pub const GRAVITY: Real = 9.80665;

/// Sea-level standard pressure, Pascal.
pub const SEA_LEVEL_PRESSURE: Real = 101_325.0;

/// Sea-level standard temperature, Kelvin.
pub const SEA_LEVEL_TEMPERATURE: Real = 288.15;

/// Environment state shared read-only with every sensor of a vehicle.
#[derive(Debug, Clone)]
pub struct Environment {
    lifecycle: Lifecycle,
    home_geo_point: GeoPoint,
    /// Current NED position relative to home; written by the physics step.
    pub position: Vector3r,
    pub geo_point: GeoPoint,
    pub gravity: Vector3r,
    pub air_pressure: Real,
    pub temperature: Real,
    pub air_density: Real,
}

impl Environment {
    pub fn new(home_geo_point: GeoPoint) -> Self {
        let mut env = Self {
            lifecycle: Lifecycle::default(),
            home_geo_point,
            position: Vector3r::zeros(),
            geo_point: home_geo_point,
            gravity: Vector3r::new(0.0, 0.0, GRAVITY),
            air_pressure: SEA_LEVEL_PRESSURE,
            temperature: SEA_LEVEL_TEMPERATURE,
            air_density: 1.225,
        };
        env.recompute();
        env
    }

    pub fn home_geo_point(&self) -> GeoPoint {
        self.home_geo_point
    }

    /// Records the body's new NED position and refreshes derived state.
    pub fn set_position(&mut self, position: Vector3r) {
        self.position = position;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.geo_point = self.home_geo_point.offset_ned(&self.position);

        // ISA troposphere model.
        let altitude = self.geo_point.altitude;
        let temperature = SEA_LEVEL_TEMPERATURE - 0.0065 * altitude;
        let pressure =
            SEA_LEVEL_PRESSURE * (temperature / SEA_LEVEL_TEMPERATURE).powf(5.2561);
        self.temperature = temperature;
        self.air_pressure = pressure;
        // Ideal gas, specific constant for dry air.
        self.air_density = pressure / (287.058 * temperature);
    }
}

impl Updatable for Environment {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.position = Vector3r::zeros();
        self.recompute();
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("environment")?;
        self.recompute();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_drops_with_altitude() {
        let mut env = Environment::new(GeoPoint::default());
        env.reset();
        let p0 = env.air_pressure;
        // 100 m climb, z negative is up in NED.
        env.set_position(Vector3r::new(0.0, 0.0, -100.0));
        assert!(env.air_pressure < p0);
        assert!(env.temperature < SEA_LEVEL_TEMPERATURE);
    }

    #[test]
    fn test_geo_point_tracks_position() {
        let mut env = Environment::new(GeoPoint::default());
        env.reset();
        env.set_position(Vector3r::new(1000.0, 0.0, 0.0));
        assert!(env.geo_point.latitude > env.home_geo_point().latitude);
    }

    #[test]
    fn test_reset_restores_home() {
        let mut env = Environment::new(GeoPoint::default());
        env.reset();
        env.set_position(Vector3r::new(5.0, 5.0, -5.0));
        env.reset();
        assert_eq!(env.position, Vector3r::zeros());
        assert_eq!(env.geo_point.latitude, env.home_geo_point().latitude);
    }
}
