//! A vehicle: one rigid body, one environment, sensors and firmware.

pub mod car;

use std::sync::{Arc, Mutex, RwLock};

use crate::control::FlightFirmware;
use crate::environment::Environment;
use crate::error::SimError;
use crate::physics::RigidBody;
use crate::sensors::SensorSuite;
use crate::updatable::Updatable;
use crate::vehicle::car::CarFirmware;

pub use car::{CarControls, CarParams, CarState};

/// Which firmware drives the vehicle.
pub enum VehicleFirmware {
    Multirotor(Arc<Mutex<FlightFirmware>>),
    Car(Arc<Mutex<CarFirmware>>),
}

/// One simulated vehicle.
///
/// The vehicle owns its kinematics and environment; the physics engine and
/// the sensors hold shared handles onto them. Update order within a tick is
/// body, then sensors, then firmware, matching the kernel's dependency
/// ordering.
pub struct Vehicle {
    name: String,
    body: Arc<RwLock<RigidBody>>,
    environment: Arc<RwLock<Environment>>,
    sensors: Arc<RwLock<SensorSuite>>,
    firmware: VehicleFirmware,
}

impl Vehicle {
    pub fn new(
        name: impl Into<String>,
        body: Arc<RwLock<RigidBody>>,
        environment: Arc<RwLock<Environment>>,
        sensors: Arc<RwLock<SensorSuite>>,
        firmware: VehicleFirmware,
    ) -> Self {
        Self {
            name: name.into(),
            body,
            environment,
            sensors,
            firmware,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Arc<RwLock<RigidBody>> {
        &self.body
    }

    pub fn environment(&self) -> &Arc<RwLock<Environment>> {
        &self.environment
    }

    pub fn sensors(&self) -> &Arc<RwLock<SensorSuite>> {
        &self.sensors
    }

    pub fn firmware(&self) -> &VehicleFirmware {
        &self.firmware
    }
}

impl Updatable for Vehicle {
    fn reset(&mut self) {
        self.body.write().unwrap().reset();
        self.environment.write().unwrap().reset();
        self.sensors.write().unwrap().reset();
        match &self.firmware {
            VehicleFirmware::Multirotor(fw) => fw.lock().unwrap().reset(),
            VehicleFirmware::Car(fw) => fw.lock().unwrap().reset(),
        }
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.body.write().unwrap().update()?;
        self.sensors.write().unwrap().update()?;
        match &self.firmware {
            VehicleFirmware::Multirotor(fw) => fw.lock().unwrap().update(),
            VehicleFirmware::Car(fw) => fw.lock().unwrap().update(),
        }
    }
}
