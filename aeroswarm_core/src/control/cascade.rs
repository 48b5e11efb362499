//! Nested control loops: position -> velocity -> angle -> angle-rate -> mixer.
//!
//! Each layer is its own small controller so the firmware can mix and match
//! per goal mode: a velocity goal skips the position layer, a raw-stick goal
//! feeds the angle layer directly through the passthrough controller.

use crate::control::pid::{PidConfig, PidController};
use crate::environment::GRAVITY;
use crate::geom::{Real, Vector3r};

/// Which layer drives an axis. Switching a mode resets the integrators of
/// the layers whose semantics changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalMode {
    Passthrough,
    ConstantOutput,
    AngleRate,
    AngleLevel,
    VelocityWorld,
    PositionWorld,
}

/// Outputs the goal unchanged; used when the client provides raw sticks.
#[derive(Debug, Clone, Default)]
pub struct PassthroughController;

impl PassthroughController {
    pub fn update(&self, goal: Real) -> Real {
        goal
    }
}

/// Emits a fixed value; used for disarmed and failsafe outputs.
#[derive(Debug, Clone)]
pub struct ConstantOutputController {
    output: Real,
}

impl ConstantOutputController {
    pub fn new(output: Real) -> Self {
        Self { output }
    }

    pub fn update(&self) -> Real {
        self.output
    }
}

/// One PID per axis tracking goal body rates against measured body rates.
/// Output is a normalized torque command in [-1, 1] per axis.
#[derive(Debug, Clone)]
pub struct AngleRateController {
    pids: [PidController; 3],
}

impl AngleRateController {
    pub fn new(kp: Vector3r, ki: Vector3r, kd: Vector3r) -> Self {
        Self {
            pids: [
                PidController::new(PidConfig::pid(kp.x, ki.x, kd.x)),
                PidController::new(PidConfig::pid(kp.y, ki.y, kd.y)),
                PidController::new(PidConfig::pid(kp.z, ki.z, kd.z)),
            ],
        }
    }

    pub fn reset(&mut self) {
        for pid in &mut self.pids {
            pid.reset();
        }
    }

    pub fn update(&mut self, goal_rates: Vector3r, measured_rates: Vector3r, dt: Real) -> Vector3r {
        Vector3r::new(
            self.pids[0].update(goal_rates.x, measured_rates.x, dt),
            self.pids[1].update(goal_rates.y, measured_rates.y, dt),
            self.pids[2].update(goal_rates.z, measured_rates.z, dt),
        )
    }
}

/// One proportional loop per axis producing a goal body rate from an angle
/// error.
#[derive(Debug, Clone)]
pub struct AngleController {
    kp: Vector3r,
    max_rate: Real,
}

impl AngleController {
    pub fn new(kp: Vector3r, max_rate: Real) -> Self {
        Self { kp, max_rate }
    }

    pub fn update(&self, goal_angles: Vector3r, measured_angles: Vector3r) -> Vector3r {
        let error = Vector3r::new(
            wrap_pi(goal_angles.x - measured_angles.x),
            wrap_pi(goal_angles.y - measured_angles.y),
            wrap_pi(goal_angles.z - measured_angles.z),
        );
        Vector3r::new(
            (error.x * self.kp.x).clamp(-self.max_rate, self.max_rate),
            (error.y * self.kp.y).clamp(-self.max_rate, self.max_rate),
            (error.z * self.kp.z).clamp(-self.max_rate, self.max_rate),
        )
    }
}

/// World-frame velocity loop producing a desired acceleration.
#[derive(Debug, Clone)]
pub struct VelocityController {
    pids: [PidController; 3],
    max_accel: Real,
}

impl VelocityController {
    pub fn new(kp: Vector3r, ki: Vector3r, max_accel: Real) -> Self {
        let bound = max_accel;
        Self {
            pids: [
                PidController::new(
                    PidConfig::pid(kp.x, ki.x, 0.0).with_output_bounds(-bound, bound),
                ),
                PidController::new(
                    PidConfig::pid(kp.y, ki.y, 0.0).with_output_bounds(-bound, bound),
                ),
                PidController::new(
                    PidConfig::pid(kp.z, ki.z, 0.0).with_output_bounds(-bound, bound),
                ),
            ],
            max_accel,
        }
    }

    pub fn reset(&mut self) {
        for pid in &mut self.pids {
            pid.reset();
        }
    }

    pub fn max_accel(&self) -> Real {
        self.max_accel
    }

    pub fn update(&mut self, goal_vel: Vector3r, measured_vel: Vector3r, dt: Real) -> Vector3r {
        Vector3r::new(
            self.pids[0].update(goal_vel.x, measured_vel.x, dt),
            self.pids[1].update(goal_vel.y, measured_vel.y, dt),
            self.pids[2].update(goal_vel.z, measured_vel.z, dt),
        )
    }
}

/// World-frame position loop producing a goal velocity.
#[derive(Debug, Clone)]
pub struct PositionController {
    kp: Vector3r,
    max_velocity: Real,
}

impl PositionController {
    pub fn new(kp: Vector3r, max_velocity: Real) -> Self {
        Self { kp, max_velocity }
    }

    pub fn update(&self, goal_pos: Vector3r, measured_pos: Vector3r, speed_limit: Real) -> Vector3r {
        let limit = if speed_limit > 0.0 {
            speed_limit.min(self.max_velocity)
        } else {
            self.max_velocity
        };
        let raw = Vector3r::new(
            (goal_pos.x - measured_pos.x) * self.kp.x,
            (goal_pos.y - measured_pos.y) * self.kp.y,
            (goal_pos.z - measured_pos.z) * self.kp.z,
        );
        let norm = raw.norm();
        if norm > limit {
            raw * (limit / norm)
        } else {
            raw
        }
    }
}

/// Rotor geometry and thrust limits for the quad-X mixer.
#[derive(Debug, Clone)]
pub struct RotorParams {
    /// Maximum thrust per rotor, Newton.
    pub max_thrust: Real,
    /// Arm length, meters.
    pub arm_length: Real,
    /// Yaw torque per unit thrust, meters.
    pub torque_to_thrust_ratio: Real,
}

impl Default for RotorParams {
    fn default() -> Self {
        Self {
            max_thrust: 6.13,
            arm_length: 0.2275,
            torque_to_thrust_ratio: 0.016,
        }
    }
}

/// Quad-X motor mix.
///
/// Motor order: 0 front-right (CCW), 1 rear-left (CCW), 2 front-left (CW),
/// 3 rear-right (CW). Inputs are the collective throttle in [0, 1] and
/// normalized roll/pitch/yaw torque commands in [-1, 1]; outputs are the four
/// motor commands clamped to [0, 1].
pub fn mix_quad_x(throttle: Real, roll: Real, pitch: Real, yaw: Real) -> [Real; 4] {
    [
        (throttle - roll * 0.5 + pitch * 0.5 + yaw * 0.5).clamp(0.0, 1.0),
        (throttle + roll * 0.5 - pitch * 0.5 + yaw * 0.5).clamp(0.0, 1.0),
        (throttle + roll * 0.5 + pitch * 0.5 - yaw * 0.5).clamp(0.0, 1.0),
        (throttle - roll * 0.5 - pitch * 0.5 - yaw * 0.5).clamp(0.0, 1.0),
    ]
}

/// Converts motor commands into the net body wrench the physics step
/// integrates: collective thrust along body -z plus roll/pitch/yaw torques.
pub fn motors_to_wrench(outputs: &[Real; 4], rotor: &RotorParams) -> (Vector3r, Vector3r) {
    let thrust: [Real; 4] = [
        outputs[0] * rotor.max_thrust,
        outputs[1] * rotor.max_thrust,
        outputs[2] * rotor.max_thrust,
        outputs[3] * rotor.max_thrust,
    ];
    let total: Real = thrust.iter().sum();

    let half_arm = rotor.arm_length * std::f32::consts::FRAC_1_SQRT_2;
    // Left motors (1 rear-left, 2 front-left) thrusting harder rolls right.
    let roll_torque = half_arm * (thrust[1] + thrust[2] - thrust[0] - thrust[3]);
    // Front motors (0, 2) thrusting harder pitches the nose up.
    let pitch_torque = half_arm * (thrust[0] + thrust[2] - thrust[1] - thrust[3]);
    // Yaw: CCW rotors (0, 1) spin the airframe CW (+z).
    let yaw_torque =
        rotor.torque_to_thrust_ratio * (thrust[0] + thrust[1] - thrust[2] - thrust[3]);

    (
        Vector3r::new(0.0, 0.0, -total),
        Vector3r::new(roll_torque, pitch_torque, yaw_torque),
    )
}

/// Maps a desired world-frame acceleration onto tilt angles and collective
/// throttle, for a vehicle of the given mass at the given yaw.
pub fn accel_to_attitude(
    accel_cmd: Vector3r,
    yaw: Real,
    mass: Real,
    max_total_thrust: Real,
    max_tilt: Real,
) -> (Real, Real, Real) {
    // Horizontal acceleration expressed in the heading frame.
    let (sin_yaw, cos_yaw) = (yaw.sin(), yaw.cos());
    let forward = accel_cmd.x * cos_yaw + accel_cmd.y * sin_yaw;
    let right = -accel_cmd.x * sin_yaw + accel_cmd.y * cos_yaw;

    // Small-angle mapping: forward acceleration pitches the nose down.
    let pitch_cmd = (-forward / GRAVITY).clamp(-max_tilt, max_tilt);
    let roll_cmd = (right / GRAVITY).clamp(-max_tilt, max_tilt);

    // Vertical: thrust cancels gravity plus the commanded climb, corrected
    // for tilt so vertical authority is preserved.
    let tilt_correction = (roll_cmd.cos() * pitch_cmd.cos()).max(0.5);
    let needed = mass * (GRAVITY - accel_cmd.z) / tilt_correction;
    let throttle = (needed / max_total_thrust).clamp(0.0, 1.0);

    (roll_cmd, pitch_cmd, throttle)
}

/// Wraps an angle to (-pi, pi].
pub fn wrap_pi(angle: Real) -> Real {
    let two_pi = 2.0 * std::f32::consts::PI;
    let mut a = angle % two_pi;
    if a > std::f32::consts::PI {
        a -= two_pi;
    } else if a <= -std::f32::consts::PI {
        a += two_pi;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixer_collective_only() {
        let outputs = mix_quad_x(0.5, 0.0, 0.0, 0.0);
        assert!(outputs.iter().all(|&o| (o - 0.5).abs() < 1e-6));
        let (force, torque) = motors_to_wrench(&outputs, &RotorParams::default());
        assert!(force.z < 0.0, "thrust points up (body -z)");
        assert!(torque.norm() < 1e-5);
    }

    #[test]
    fn test_mixer_roll_produces_roll_torque() {
        let outputs = mix_quad_x(0.5, 0.4, 0.0, 0.0);
        let (_, torque) = motors_to_wrench(&outputs, &RotorParams::default());
        assert!(torque.x > 0.0, "positive roll command tips right: left motors speed up");
        assert!(torque.y.abs() < 1e-5);
    }

    #[test]
    fn test_position_controller_saturates_speed() {
        let ctrl = PositionController::new(Vector3r::new(1.0, 1.0, 1.0), 5.0);
        let vel = ctrl.update(Vector3r::new(100.0, 0.0, 0.0), Vector3r::zeros(), 0.0);
        assert!((vel.norm() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_accel_to_attitude_hover() {
        // Zero commanded acceleration: level attitude, hover throttle.
        let (roll, pitch, throttle) = accel_to_attitude(Vector3r::zeros(), 0.0, 1.0, 24.52, 0.5);
        assert_eq!(roll, 0.0);
        assert_eq!(pitch, 0.0);
        assert!((throttle - GRAVITY / 24.52).abs() < 1e-3);
    }

    #[test]
    fn test_accel_to_attitude_forward_pitches_down() {
        let (_, pitch, _) = accel_to_attitude(Vector3r::new(3.0, 0.0, 0.0), 0.0, 1.0, 24.52, 0.5);
        assert!(pitch < 0.0);
    }

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(3.0 * std::f32::consts::PI) - std::f32::consts::PI).abs() < 1e-5);
        assert!((wrap_pi(-3.0 * std::f32::consts::PI) - std::f32::consts::PI).abs() < 1e-5);
        assert_eq!(wrap_pi(0.5), 0.5);
    }
}
