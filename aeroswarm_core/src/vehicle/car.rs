//! Ground-vehicle firmware: pedal/steering inputs to body wrench.

use std::sync::{Arc, RwLock};

use crate::clock::{SimClock, TimePoint};
use crate::error::SimError;
use crate::geom::{to_body_frame, Kinematics, Real, Vector3r};
use crate::physics::RigidBody;
use crate::sensors::SharedClock;
use crate::updatable::{Lifecycle, Updatable};

/// Control inputs for a car.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarControls {
    /// Forward pedal, [-1, 1]; negative reverses when in manual reverse gear.
    pub throttle: Real,
    /// Steering, [-1, 1], positive turns right.
    pub steering: Real,
    /// Brake pedal, [0, 1].
    pub brake: Real,
    pub handbrake: bool,
    pub is_manual_gear: bool,
    pub manual_gear: i32,
}

impl Default for CarControls {
    fn default() -> Self {
        Self {
            throttle: 0.0,
            steering: 0.0,
            brake: 0.0,
            handbrake: false,
            is_manual_gear: false,
            manual_gear: 0,
        }
    }
}

/// Snapshot returned by `get_car_state`.
#[derive(Debug, Clone, PartialEq)]
pub struct CarState {
    /// Ground speed, m/s.
    pub speed: Real,
    pub gear: i32,
    pub rpm: Real,
    pub max_rpm: Real,
    pub handbrake: bool,
    pub kinematics: Kinematics,
    pub timestamp: TimePoint,
}

/// Drive model parameters.
#[derive(Debug, Clone)]
pub struct CarParams {
    /// Peak drive force, Newton.
    pub max_drive_force: Real,
    /// Peak brake force, Newton.
    pub max_brake_force: Real,
    /// Yaw rate per unit steering at 1 m/s, rad/s.
    pub steering_gain: Real,
    pub max_rpm: Real,
}

impl Default for CarParams {
    fn default() -> Self {
        Self {
            max_drive_force: 4000.0,
            max_brake_force: 6000.0,
            steering_gain: 0.35,
            max_rpm: 7500.0,
        }
    }
}

/// Single-track drive firmware updated on the physics tick.
pub struct CarFirmware {
    lifecycle: Lifecycle,
    params: CarParams,
    clock: SharedClock,
    body: Arc<RwLock<RigidBody>>,
    controls: CarControls,
    api_control_enabled: bool,
}

impl CarFirmware {
    pub fn new(params: CarParams, clock: SharedClock, body: Arc<RwLock<RigidBody>>) -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            params,
            clock,
            body,
            controls: CarControls::default(),
            api_control_enabled: false,
        }
    }

    pub fn enable_api_control(&mut self, enable: bool) {
        self.api_control_enabled = enable;
    }

    pub fn is_api_control_enabled(&self) -> bool {
        self.api_control_enabled
    }

    pub fn set_controls(&mut self, controls: CarControls) -> Result<(), SimError> {
        if !self.api_control_enabled {
            return Err(SimError::NotReady("api control is not enabled".into()));
        }
        if !(-1.0..=1.0).contains(&controls.throttle)
            || !(-1.0..=1.0).contains(&controls.steering)
            || !(0.0..=1.0).contains(&controls.brake)
        {
            return Err(SimError::invalid("car control out of range"));
        }
        self.controls = controls;
        Ok(())
    }

    pub fn controls(&self) -> CarControls {
        self.controls
    }

    pub fn state_snapshot(&self) -> CarState {
        let body = self.body.read().unwrap();
        let kinematics = body.kinematics;
        let forward_speed = forward_speed(&kinematics);
        let gear = if self.controls.is_manual_gear {
            self.controls.manual_gear
        } else if forward_speed < -0.1 {
            -1
        } else {
            1
        };
        CarState {
            speed: kinematics.twist.linear.norm(),
            gear,
            rpm: (forward_speed.abs() / 30.0).min(1.0) * self.params.max_rpm,
            max_rpm: self.params.max_rpm,
            handbrake: self.controls.handbrake,
            kinematics,
            timestamp: self.clock.now(),
        }
    }
}

fn forward_speed(kinematics: &Kinematics) -> Real {
    to_body_frame(&kinematics.twist.linear, &kinematics.pose.orientation).x
}

impl Updatable for CarFirmware {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.controls = CarControls::default();
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("car firmware")?;
        let mut body = self
            .body
            .write()
            .map_err(|_| SimError::internal("body lock poisoned"))?;

        let speed = forward_speed(&body.kinematics);
        let direction: Real = if self.controls.is_manual_gear && self.controls.manual_gear < 0 {
            -1.0
        } else {
            1.0
        };

        let mut force_x = self.controls.throttle * self.params.max_drive_force * direction;
        // Brakes and handbrake always oppose motion.
        let braking = if self.controls.handbrake {
            self.params.max_brake_force
        } else {
            self.controls.brake * self.params.max_brake_force
        };
        if speed.abs() > 0.05 {
            force_x -= braking * speed.signum();
        }

        // Steering authority grows with speed, like a kinematic single track.
        let yaw_torque = self.controls.steering * self.params.steering_gain * speed;

        body.set_wrench(
            Vector3r::new(force_x, 0.0, 0.0),
            Vector3r::new(0.0, 0.0, yaw_torque),
        )?;
        Ok(())
    }
}
