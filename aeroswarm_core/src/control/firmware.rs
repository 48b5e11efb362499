//! Flight firmware: goals, command futures and the arm/fly/land state
//! machine, driven once per physics tick.

use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{SimClock, TimePoint};
use crate::control::cascade::{
    accel_to_attitude, mix_quad_x, motors_to_wrench, wrap_pi, AngleController,
    AngleRateController, ConstantOutputController, GoalMode, PassthroughController,
    PositionController, RotorParams, VelocityController,
};
use crate::error::SimError;
use crate::geom::{Real, Vector3r};
use crate::physics::RigidBody;
use crate::sensors::SharedClock;
use crate::updatable::{Lifecycle, Updatable};

/// Multirotor flight mode for translation commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DrivetrainType {
    /// Yaw is independent of the velocity vector.
    #[default]
    MaxDegreeOfFreedom = 0,
    /// The nose follows the velocity vector.
    ForwardOnly = 1,
}

/// Yaw goal attached to a translation command. Radians internally; degrees
/// only at the RPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct YawMode {
    pub is_rate: bool,
    /// Angle (rad) when `is_rate` is false, rate (rad/s) otherwise.
    pub yaw_or_rate: Real,
}

/// Raw remote-control input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RcData {
    pub roll: Real,
    pub pitch: Real,
    pub yaw: Real,
    pub throttle: Real,
    pub is_valid: bool,
}

/// Per-vehicle flight state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FlightState {
    #[default]
    Disarmed = 0,
    Armed = 1,
    TakingOff = 2,
    Flying = 3,
    Landing = 4,
}

/// Active goal the cascade tracks.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightGoal {
    Idle,
    TakeOff {
        target_z: Real,
    },
    Hover {
        hold: Vector3r,
        yaw: Real,
    },
    Land,
    Position {
        target: Vector3r,
        speed: Real,
        drivetrain: DrivetrainType,
        yaw_mode: YawMode,
        lookahead: Real,
        adaptive_lookahead: Real,
    },
    Velocity {
        velocity: Vector3r,
        drivetrain: DrivetrainType,
        yaw_mode: YawMode,
        deadline: TimePoint,
    },
    AngleRates {
        rates: Vector3r,
        z: Real,
        deadline: TimePoint,
    },
    RcSticks,
}

impl FlightGoal {
    /// Which cascade layer drives the translational axes for this goal.
    pub fn goal_mode(&self) -> GoalMode {
        match self {
            Self::Idle => GoalMode::ConstantOutput,
            Self::TakeOff { .. } | Self::Hover { .. } | Self::Position { .. } => {
                GoalMode::PositionWorld
            }
            Self::Land | Self::Velocity { .. } => GoalMode::VelocityWorld,
            Self::AngleRates { .. } => GoalMode::AngleRate,
            Self::RcSticks => GoalMode::Passthrough,
        }
    }
}

/// Resolution of a command future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Pending,
    Completed,
    Cancelled,
}

struct CommandInner {
    state: Mutex<CommandOutcome>,
    cvar: Condvar,
}

/// Future returned by every vehicle command.
///
/// Non-blocking at issue time; `wait` resolves when the control loop reports
/// the goal attained, the command is pre-empted by a newer one, or the
/// timeout expires. Timeouts are enforced here, not by the controller.
#[derive(Clone)]
pub struct CommandHandle {
    inner: Arc<CommandInner>,
}

impl CommandHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(CommandInner {
                state: Mutex::new(CommandOutcome::Pending),
                cvar: Condvar::new(),
            }),
        }
    }

    /// A handle that is already resolved; used for instantaneous commands.
    pub(crate) fn completed() -> Self {
        let handle = Self::new();
        handle.resolve(CommandOutcome::Completed);
        handle
    }

    pub(crate) fn resolve(&self, outcome: CommandOutcome) {
        let mut state = self.inner.state.lock().unwrap();
        if *state == CommandOutcome::Pending {
            *state = outcome;
            self.inner.cvar.notify_all();
        }
    }

    /// Current outcome without blocking.
    pub fn status(&self) -> CommandOutcome {
        *self.inner.state.lock().unwrap()
    }

    /// Blocks until the command resolves or the timeout expires.
    pub fn wait(&self, timeout: Duration) -> Result<(), SimError> {
        let state = self.inner.state.lock().unwrap();
        let (state, wait_result) = self
            .inner
            .cvar
            .wait_timeout_while(state, timeout, |s| *s == CommandOutcome::Pending)
            .map_err(|_| SimError::internal("command lock poisoned"))?;
        match *state {
            CommandOutcome::Completed => Ok(()),
            CommandOutcome::Cancelled => Err(SimError::Cancelled),
            CommandOutcome::Pending => {
                debug_assert!(wait_result.timed_out());
                Err(SimError::Timeout(timeout.as_secs_f64()))
            }
        }
    }
}

/// Axis-aligned safety volume. A goal outside it is refused.
#[derive(Debug, Clone)]
pub struct GeoFence {
    pub min: Vector3r,
    pub max: Vector3r,
}

impl GeoFence {
    pub fn contains(&self, p: &Vector3r) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// Firmware tuning and safety parameters.
#[derive(Debug, Clone)]
pub struct FlightParams {
    pub mass: Real,
    pub rotor: RotorParams,
    pub max_tilt: Real,
    pub max_velocity: Real,
    pub kp_position: Vector3r,
    pub kp_velocity: Vector3r,
    pub ki_velocity: Vector3r,
    pub max_accel: Real,
    pub kp_angle: Vector3r,
    pub max_angle_rate: Real,
    pub kp_angle_rate: Vector3r,
    pub ki_angle_rate: Vector3r,
    pub kd_angle_rate: Vector3r,
    /// Normalized torque command to physical torque, N*m per unit.
    pub max_torque: Vector3r,
    pub takeoff_climb_speed: Real,
    pub landing_descent_speed: Real,
    /// Goal attained when within this distance of a position target.
    pub arrival_radius: Real,
    pub battery_drain_per_sec: Real,
    pub battery_land_level: Real,
    pub rc_required: bool,
    pub rc_timeout_sec: Real,
    pub geofence: Option<GeoFence>,
}

impl Default for FlightParams {
    fn default() -> Self {
        Self {
            mass: 1.0,
            rotor: RotorParams::default(),
            max_tilt: 0.5,
            max_velocity: 8.0,
            kp_position: Vector3r::new(1.0, 1.0, 1.0),
            kp_velocity: Vector3r::new(2.0, 2.0, 2.0),
            ki_velocity: Vector3r::new(0.0, 0.0, 0.2),
            max_accel: 6.0,
            kp_angle: Vector3r::new(2.5, 2.5, 1.6),
            max_angle_rate: 2.5,
            kp_angle_rate: Vector3r::new(0.25, 0.25, 0.25),
            ki_angle_rate: Vector3r::new(0.0, 0.0, 0.0),
            kd_angle_rate: Vector3r::new(0.0, 0.0, 0.0),
            max_torque: Vector3r::new(1.0, 1.0, 0.2),
            takeoff_climb_speed: 3.0,
            landing_descent_speed: 1.0,
            arrival_radius: 0.5,
            battery_drain_per_sec: 0.0001,
            battery_land_level: 0.05,
            rc_required: false,
            rc_timeout_sec: 1.0,
            geofence: None,
        }
    }
}

/// Snapshot returned by `get_state`.
#[derive(Debug, Clone)]
pub struct MultirotorState {
    pub kinematics: crate::geom::Kinematics,
    pub flight_state: FlightState,
    pub landed: bool,
    pub armed: bool,
    pub api_control_enabled: bool,
    pub battery: Real,
    pub collision: crate::geom::CollisionInfo,
    pub timestamp: TimePoint,
}

/// Cascaded-PID flight firmware for one multirotor.
///
/// Single-threaded and cooperative: `update` runs on the physics thread
/// immediately after the vehicle's sensors. API calls mutate goals through a
/// mutex and never block on control work.
pub struct FlightFirmware {
    lifecycle: Lifecycle,
    params: FlightParams,
    clock: SharedClock,
    body: Arc<RwLock<RigidBody>>,
    state: FlightState,
    goal: FlightGoal,
    api_control_enabled: bool,
    active_command: Option<CommandHandle>,
    position_ctrl: PositionController,
    velocity_ctrl: VelocityController,
    angle_ctrl: AngleController,
    rate_ctrl: AngleRateController,
    passthrough: PassthroughController,
    disarmed_output: ConstantOutputController,
    rc: RcData,
    last_rc_time: TimePoint,
    battery: Real,
    last_update_time: TimePoint,
    collision: crate::geom::CollisionInfo,
}

impl FlightFirmware {
    pub fn new(params: FlightParams, clock: SharedClock, body: Arc<RwLock<RigidBody>>) -> Self {
        let position_ctrl = PositionController::new(params.kp_position, params.max_velocity);
        let velocity_ctrl =
            VelocityController::new(params.kp_velocity, params.ki_velocity, params.max_accel);
        let angle_ctrl = AngleController::new(params.kp_angle, params.max_angle_rate);
        let rate_ctrl = AngleRateController::new(
            params.kp_angle_rate,
            params.ki_angle_rate,
            params.kd_angle_rate,
        );
        Self {
            lifecycle: Lifecycle::default(),
            params,
            clock,
            body,
            state: FlightState::Disarmed,
            goal: FlightGoal::Idle,
            api_control_enabled: false,
            active_command: None,
            position_ctrl,
            velocity_ctrl,
            angle_ctrl,
            rate_ctrl,
            passthrough: PassthroughController,
            disarmed_output: ConstantOutputController::new(0.0),
            rc: RcData::default(),
            last_rc_time: 0,
            battery: 1.0,
            last_update_time: 0,
            collision: Default::default(),
        }
    }

    pub fn params(&self) -> &FlightParams {
        &self.params
    }

    pub fn flight_state(&self) -> FlightState {
        self.state
    }

    pub fn battery(&self) -> Real {
        self.battery
    }

    pub fn state_snapshot(&self) -> MultirotorState {
        let body = self.body.read().unwrap();
        MultirotorState {
            kinematics: body.kinematics,
            flight_state: self.state,
            landed: body.is_grounded(),
            armed: self.state != FlightState::Disarmed,
            api_control_enabled: self.api_control_enabled,
            battery: self.battery,
            collision: self.collision.clone(),
            timestamp: self.clock.now(),
        }
    }

    pub fn set_collision(&mut self, collision: crate::geom::CollisionInfo) {
        self.collision = collision;
    }

    // ---- API surface (called from the vehicle API, any thread) ----

    pub fn enable_api_control(&mut self, enable: bool) {
        self.api_control_enabled = enable;
    }

    pub fn is_api_control_enabled(&self) -> bool {
        self.api_control_enabled
    }

    pub fn arm(&mut self) -> Result<(), SimError> {
        self.ensure_api_control()?;
        if self.state == FlightState::Disarmed {
            self.state = FlightState::Armed;
        }
        Ok(())
    }

    pub fn disarm(&mut self) -> Result<(), SimError> {
        self.ensure_api_control()?;
        if !self.body.read().unwrap().is_grounded() {
            return Err(SimError::Unsafe("cannot disarm while airborne".into()));
        }
        self.cancel_active();
        self.state = FlightState::Disarmed;
        self.goal = FlightGoal::Idle;
        Ok(())
    }

    pub fn command_takeoff(&mut self, altitude: Real) -> Result<CommandHandle, SimError> {
        self.ensure_api_control()?;
        if self.state == FlightState::Disarmed {
            return Err(SimError::NotReady("vehicle is not armed".into()));
        }
        let position = self.position();
        let target_z = position.z - altitude.abs();
        self.check_fence(&Vector3r::new(position.x, position.y, target_z))?;
        self.state = FlightState::TakingOff;
        Ok(self.set_goal(FlightGoal::TakeOff { target_z }))
    }

    pub fn command_land(&mut self) -> Result<CommandHandle, SimError> {
        self.ensure_api_control()?;
        self.ensure_airborne()?;
        self.state = FlightState::Landing;
        Ok(self.set_goal(FlightGoal::Land))
    }

    pub fn command_hover(&mut self) -> Result<CommandHandle, SimError> {
        self.ensure_api_control()?;
        self.ensure_airborne()?;
        let hold = self.position();
        let yaw = self.yaw();
        let handle = self.set_goal(FlightGoal::Hover { hold, yaw });
        // Hover is attained as soon as the hold point is latched.
        handle.resolve(CommandOutcome::Completed);
        Ok(handle)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn command_move_to_position(
        &mut self,
        target: Vector3r,
        speed: Real,
        drivetrain: DrivetrainType,
        yaw_mode: YawMode,
        lookahead: Real,
        adaptive_lookahead: Real,
    ) -> Result<CommandHandle, SimError> {
        self.ensure_api_control()?;
        self.ensure_airborne()?;
        if speed <= 0.0 {
            return Err(SimError::invalid("speed must be positive"));
        }
        self.check_fence(&target)?;
        Ok(self.set_goal(FlightGoal::Position {
            target,
            speed,
            drivetrain,
            yaw_mode,
            lookahead,
            adaptive_lookahead,
        }))
    }

    pub fn command_move_by_velocity(
        &mut self,
        velocity: Vector3r,
        duration: Real,
        drivetrain: DrivetrainType,
        yaw_mode: YawMode,
    ) -> Result<CommandHandle, SimError> {
        self.ensure_api_control()?;
        self.ensure_airborne()?;
        if duration <= 0.0 {
            return Err(SimError::invalid("duration must be positive"));
        }
        let deadline = self.clock.now() + crate::clock::sec_to_nanos(duration as f64) as TimePoint;
        Ok(self.set_goal(FlightGoal::Velocity {
            velocity,
            drivetrain,
            yaw_mode,
            deadline,
        }))
    }

    pub fn command_move_by_angle_rates(
        &mut self,
        rates: Vector3r,
        z: Real,
        duration: Real,
    ) -> Result<CommandHandle, SimError> {
        self.ensure_api_control()?;
        self.ensure_airborne()?;
        if duration <= 0.0 {
            return Err(SimError::invalid("duration must be positive"));
        }
        let deadline = self.clock.now() + crate::clock::sec_to_nanos(duration as f64) as TimePoint;
        Ok(self.set_goal(FlightGoal::AngleRates { rates, z, deadline }))
    }

    pub fn set_rc_data(&mut self, rc: RcData) {
        self.rc = rc;
        if rc.is_valid {
            self.last_rc_time = self.clock.now();
        }
    }

    pub fn rc_data(&self) -> RcData {
        self.rc
    }

    /// Cancels any outstanding command; part of the global reset path.
    pub fn cancel_active(&mut self) {
        if let Some(active) = self.active_command.take() {
            active.resolve(CommandOutcome::Cancelled);
        }
    }

    // ---- internals ----

    fn ensure_api_control(&self) -> Result<(), SimError> {
        if self.api_control_enabled {
            Ok(())
        } else {
            Err(SimError::NotReady("api control is not enabled".into()))
        }
    }

    fn ensure_airborne(&self) -> Result<(), SimError> {
        match self.state {
            FlightState::Disarmed | FlightState::Armed => {
                Err(SimError::NotReady("vehicle is not flying".into()))
            }
            _ => Ok(()),
        }
    }

    fn check_fence(&self, target: &Vector3r) -> Result<(), SimError> {
        if let Some(fence) = &self.params.geofence {
            if !fence.contains(target) {
                return Err(SimError::Unsafe(format!(
                    "target ({:.1}, {:.1}, {:.1}) outside geofence",
                    target.x, target.y, target.z
                )));
            }
        }
        Ok(())
    }

    /// Installs a new goal, pre-empting the previous command. Integrators of
    /// the outer loops reset because the axis semantics change with the goal
    /// mode.
    fn set_goal(&mut self, goal: FlightGoal) -> CommandHandle {
        self.cancel_active();
        if self.goal.goal_mode() != goal.goal_mode() {
            self.velocity_ctrl.reset();
            self.rate_ctrl.reset();
        }
        self.goal = goal;
        let handle = CommandHandle::new();
        self.active_command = Some(handle.clone());
        handle
    }

    fn position(&self) -> Vector3r {
        self.body.read().unwrap().kinematics.pose.position
    }

    fn yaw(&self) -> Real {
        let (_, _, yaw) = self
            .body
            .read()
            .unwrap()
            .kinematics
            .pose
            .orientation
            .euler_angles();
        yaw
    }

    fn complete_active(&mut self) {
        if let Some(active) = self.active_command.take() {
            active.resolve(CommandOutcome::Completed);
        }
    }

    fn check_failsafes(&mut self) {
        let airborne = matches!(
            self.state,
            FlightState::TakingOff | FlightState::Flying
        );
        if !airborne {
            return;
        }
        if self.battery <= self.params.battery_land_level {
            warn!(battery = self.battery, "battery low; forcing landing");
            self.cancel_active();
            self.state = FlightState::Landing;
            self.goal = FlightGoal::Land;
            return;
        }
        if self.params.rc_required {
            let age = self.clock.elapsed_since(self.last_rc_time);
            if age > self.params.rc_timeout_sec as f64 {
                warn!(age_sec = age, "rc signal lost; forcing landing");
                self.cancel_active();
                self.state = FlightState::Landing;
                self.goal = FlightGoal::Land;
            }
        }
    }

    /// One control step; the heart of the firmware.
    fn control_step(&mut self, dt: Real) {
        let kinematics = self.body.read().unwrap().kinematics;
        let position = kinematics.pose.position;
        let velocity = kinematics.twist.linear;
        let (roll, pitch, yaw) = kinematics.pose.orientation.euler_angles();
        let body_rates = kinematics.twist.angular;

        // Resolve the goal into a desired velocity + yaw target, or raw
        // rates for the inner-loop goals.
        let mut yaw_goal = yaw;
        let mut yaw_rate_goal: Option<Real> = None;
        let mut rate_goal_direct: Option<Vector3r> = None;
        let mut throttle_direct: Option<Real> = None;

        let goal = self.goal.clone();
        let velocity_goal = match goal {
            FlightGoal::Idle => Vector3r::zeros(),
            FlightGoal::TakeOff { target_z } => {
                let target = Vector3r::new(position.x, position.y, target_z);
                let mut v = self
                    .position_ctrl
                    .update(target, position, self.params.takeoff_climb_speed);
                v.x = 0.0;
                v.y = 0.0;
                if (position.z - target_z).abs() < self.params.arrival_radius * 0.5 {
                    self.state = FlightState::Flying;
                    let hold = Vector3r::new(position.x, position.y, target_z);
                    self.complete_active();
                    self.goal = FlightGoal::Hover { hold, yaw };
                }
                v
            }
            FlightGoal::Hover { hold, yaw: held } => {
                yaw_goal = held;
                self.position_ctrl.update(hold, position, 0.0)
            }
            FlightGoal::Land => {
                if self.body.read().unwrap().is_grounded() {
                    self.state = FlightState::Disarmed;
                    self.complete_active();
                    self.goal = FlightGoal::Idle;
                    Vector3r::zeros()
                } else {
                    Vector3r::new(0.0, 0.0, self.params.landing_descent_speed)
                }
            }
            FlightGoal::Position {
                target,
                speed,
                drivetrain,
                yaw_mode,
                ..
            } => {
                let v = self.position_ctrl.update(target, position, speed);
                apply_yaw_mode(
                    &yaw_mode,
                    &drivetrain,
                    &v,
                    yaw,
                    &mut yaw_goal,
                    &mut yaw_rate_goal,
                );
                let arrived = (target - position).norm() < self.params.arrival_radius
                    && velocity.norm() < 0.3;
                if arrived {
                    self.complete_active();
                    self.goal = FlightGoal::Hover { hold: target, yaw };
                }
                v
            }
            FlightGoal::Velocity {
                velocity: v,
                drivetrain,
                yaw_mode,
                deadline,
            } => {
                apply_yaw_mode(
                    &yaw_mode,
                    &drivetrain,
                    &v,
                    yaw,
                    &mut yaw_goal,
                    &mut yaw_rate_goal,
                );
                if self.clock.now() >= deadline {
                    self.complete_active();
                    self.goal = FlightGoal::Hover {
                        hold: position,
                        yaw,
                    };
                }
                v
            }
            FlightGoal::AngleRates { rates, z, deadline } => {
                rate_goal_direct = Some(rates);
                // Altitude held by the vertical velocity loop.
                let vz = (z - position.z) * self.params.kp_position.z;
                if self.clock.now() >= deadline {
                    self.complete_active();
                    self.goal = FlightGoal::Hover {
                        hold: position,
                        yaw,
                    };
                }
                Vector3r::new(0.0, 0.0, vz)
            }
            FlightGoal::RcSticks => {
                // Sticks map straight onto angle goals and throttle.
                let rc = self.rc;
                rate_goal_direct = Some(self.angle_ctrl.update(
                    Vector3r::new(
                        self.passthrough.update(rc.roll) * self.params.max_tilt,
                        self.passthrough.update(rc.pitch) * self.params.max_tilt,
                        yaw + rc.yaw,
                    ),
                    Vector3r::new(roll, pitch, yaw),
                ));
                throttle_direct = Some(rc.throttle);
                Vector3r::zeros()
            }
        };

        // Outer loops -> attitude + throttle.
        let (roll_goal, pitch_goal, throttle) = if let Some(t) = throttle_direct {
            (0.0, 0.0, t)
        } else {
            let accel_cmd = self.velocity_ctrl.update(velocity_goal, velocity, dt);
            accel_to_attitude(
                accel_cmd,
                yaw,
                self.params.mass,
                self.params.rotor.max_thrust * 4.0,
                self.params.max_tilt,
            )
        };

        // Angle loop -> rate goals, unless an inner-loop goal bypassed it.
        let rate_goals = if let Some(direct) = rate_goal_direct {
            direct
        } else {
            let mut goals = self.angle_ctrl.update(
                Vector3r::new(roll_goal, pitch_goal, yaw_goal),
                Vector3r::new(roll, pitch, yaw),
            );
            if let Some(rate) = yaw_rate_goal {
                goals.z = rate;
            }
            goals
        };

        // Rate loop -> normalized torques -> mixer -> wrench.
        let torque_norm = self.rate_ctrl.update(rate_goals, body_rates, dt);
        let outputs = mix_quad_x(throttle, torque_norm.x, torque_norm.y, torque_norm.z);
        let (mut force, mut torque) = motors_to_wrench(&outputs, &self.params.rotor);
        // Torque authority is bounded by the configured maxima.
        torque.x = torque.x.clamp(-self.params.max_torque.x, self.params.max_torque.x);
        torque.y = torque.y.clamp(-self.params.max_torque.y, self.params.max_torque.y);
        torque.z = torque.z.clamp(-self.params.max_torque.z, self.params.max_torque.z);

        if self.state == FlightState::Armed || self.state == FlightState::Disarmed {
            let idle = self.disarmed_output.update();
            force = Vector3r::new(0.0, 0.0, -idle);
            torque = Vector3r::zeros();
        }

        if let Err(err) = self.body.write().unwrap().set_wrench(force, torque) {
            warn!(error = %err, "wrench rejected; vehicle quarantined");
        }
    }
}

fn apply_yaw_mode(
    yaw_mode: &YawMode,
    drivetrain: &DrivetrainType,
    velocity_goal: &Vector3r,
    current_yaw: Real,
    yaw_goal: &mut Real,
    yaw_rate_goal: &mut Option<Real>,
) {
    match drivetrain {
        DrivetrainType::ForwardOnly => {
            let horizontal = Vector3r::new(velocity_goal.x, velocity_goal.y, 0.0);
            if horizontal.norm() > 0.2 {
                *yaw_goal = velocity_goal.y.atan2(velocity_goal.x);
            } else {
                *yaw_goal = current_yaw;
            }
        }
        DrivetrainType::MaxDegreeOfFreedom => {
            if yaw_mode.is_rate {
                *yaw_rate_goal = Some(yaw_mode.yaw_or_rate);
            } else {
                *yaw_goal = wrap_pi(yaw_mode.yaw_or_rate);
            }
        }
    }
}

impl Updatable for FlightFirmware {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.state = FlightState::Disarmed;
        self.goal = FlightGoal::Idle;
        self.cancel_active();
        self.velocity_ctrl.reset();
        self.rate_ctrl.reset();
        self.rc = RcData::default();
        self.last_rc_time = 0;
        self.battery = 1.0;
        self.last_update_time = self.clock.now();
        self.collision = Default::default();
        debug!("flight firmware reset");
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("flight firmware")?;
        let dt_ns = self.clock.update_since(&mut self.last_update_time);
        let dt = crate::clock::nanos_to_sec(dt_ns) as Real;
        if dt <= 0.0 {
            return Ok(());
        }

        if self.state != FlightState::Disarmed {
            self.battery = (self.battery - self.params.battery_drain_per_sec * dt).max(0.0);
        }
        self.check_failsafes();
        self.control_step(dt);
        Ok(())
    }
}
