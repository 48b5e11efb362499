//! Fixed-period integration of all registered rigid bodies.

use std::sync::{Arc, RwLock};

use nalgebra::UnitQuaternion;
use tracing::warn;

use crate::environment::Environment;
use crate::error::SimError;
use crate::geom::{to_world_frame, Kinematics, Real, Vector3r};
use crate::physics::RigidBody;
use crate::updatable::{Lifecycle, Updatable};

/// Whether the engine integrates motion itself or a host engine owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhysicsMode {
    /// Full internal integration.
    #[default]
    Internal,
    /// Skip integration; only refresh derived state (environment, orientation
    /// normalization) from kinematics written by the host.
    External,
}

/// A registered body together with the environment it updates.
#[derive(Clone)]
pub struct BodyHandle {
    pub body: Arc<RwLock<RigidBody>>,
    pub environment: Arc<RwLock<Environment>>,
}

/// Advances every registered rigid body by exactly one fixed step.
///
/// Deterministic: identical initial state and inputs produce bit-identical
/// trajectories. The engine holds no external locks during integration; body
/// and environment locks are taken one body at a time.
pub struct PhysicsEngine {
    lifecycle: Lifecycle,
    mode: PhysicsMode,
    handles: Vec<BodyHandle>,
    wind: Vector3r,
    ext_force: Vector3r,
    fault_count: u64,
}

impl PhysicsEngine {
    pub fn new(mode: PhysicsMode) -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            mode,
            handles: Vec::new(),
            wind: Vector3r::zeros(),
            ext_force: Vector3r::zeros(),
            fault_count: 0,
        }
    }

    pub fn mode(&self) -> PhysicsMode {
        self.mode
    }

    pub fn add_body(&mut self, handle: BodyHandle) {
        self.handles.push(handle);
    }

    pub fn body_count(&self) -> usize {
        self.handles.len()
    }

    /// Wind affecting every body, world frame, m/s.
    pub fn set_wind(&mut self, wind: Vector3r) {
        self.wind = wind;
    }

    pub fn wind(&self) -> Vector3r {
        self.wind
    }

    /// Single external force field applied to every body, world frame, N.
    pub fn set_ext_force(&mut self, force: Vector3r) {
        self.ext_force = force;
    }

    pub fn ext_force(&self) -> Vector3r {
        self.ext_force
    }

    /// Count of quarantine events since the last reset.
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    /// Advances all bodies by `dt` seconds.
    pub fn step(&mut self, dt: Real) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("physics engine")?;
        for handle in &self.handles {
            let mut body = handle
                .body
                .write()
                .map_err(|_| SimError::internal("body lock poisoned"))?;
            if !body.is_functional() {
                continue;
            }

            match self.mode {
                PhysicsMode::Internal => {
                    let before = body.kinematics;
                    integrate(&mut body, dt, &self.wind, &self.ext_force);
                    if !body.kinematics.is_finite() {
                        // Quarantine: freeze last finite state, keep simulating
                        // everyone else.
                        body.kinematics = before;
                        body.quarantine();
                        self.fault_count += 1;
                        warn!(body = body.name(), "non-finite kinematics; body quarantined");
                        continue;
                    }
                }
                PhysicsMode::External => {
                    let q = body.kinematics.pose.orientation;
                    body.kinematics.pose.orientation =
                        UnitQuaternion::new_normalize(q.into_inner());
                }
            }

            let position = body.kinematics.pose.position;
            drop(body);
            let mut env = handle
                .environment
                .write()
                .map_err(|_| SimError::internal("environment lock poisoned"))?;
            env.set_position(position);
        }
        Ok(())
    }
}

/// Semi-implicit Euler step for one body.
fn integrate(body: &mut RigidBody, dt: Real, wind: &Vector3r, ext_force: &Vector3r) {
    let (force_body, torque_body) = body.wrench();
    let mass = body.mass();
    let inertia = body.inertia();
    let orientation = body.kinematics.pose.orientation;

    // Linear: actuator force rotated to world, plus gravity, external field
    // and wind-relative drag.
    let gravity = Vector3r::new(0.0, 0.0, crate::environment::GRAVITY);
    let air_velocity = body.kinematics.twist.linear - wind;
    let mut accel = to_world_frame(&force_body, &orientation) / mass
        + ext_force / mass
        + gravity
        - air_velocity * body.linear_drag();

    // Ground plane at the spawn altitude: a grounded body cannot accelerate
    // downward, and touching down kills vertical motion.
    let ground_z = body.initial_pose().position.z;
    if body.is_grounded() && accel.z > 0.0 {
        accel.z = 0.0;
    }

    let mut velocity = body.kinematics.twist.linear + accel * dt;
    let mut position = body.kinematics.pose.position + velocity * dt;
    if position.z >= ground_z {
        position.z = ground_z;
        if velocity.z > 0.0 {
            velocity.z = 0.0;
        }
        body.set_grounded(true);
    } else {
        body.set_grounded(false);
    }

    // Angular: diagonal inertia with gyroscopic coupling and drag.
    let w = body.kinematics.twist.angular;
    let inertia_w = Vector3r::new(inertia.x * w.x, inertia.y * w.y, inertia.z * w.z);
    let gyro = w.cross(&inertia_w);
    let alpha = Vector3r::new(
        (torque_body.x - gyro.x) / inertia.x,
        (torque_body.y - gyro.y) / inertia.y,
        (torque_body.z - gyro.z) / inertia.z,
    ) - w * body.angular_drag();
    let angular = w + alpha * dt;

    // Body-frame rate integrated into orientation, then renormalized.
    let dq = UnitQuaternion::from_scaled_axis(angular * dt);
    let orientation = UnitQuaternion::new_normalize((orientation * dq).into_inner());

    body.kinematics.pose.position = position;
    body.kinematics.pose.orientation = orientation;
    body.kinematics.twist.linear = velocity;
    body.kinematics.twist.angular = angular;
    body.kinematics.accelerations.linear = accel;
    body.kinematics.accelerations.angular = alpha;
}

impl Updatable for PhysicsEngine {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.wind = Vector3r::zeros();
        self.ext_force = Vector3r::zeros();
        self.fault_count = 0;
        for handle in &self.handles {
            handle.body.write().unwrap().reset();
            handle.environment.write().unwrap().reset();
        }
    }

    fn update(&mut self) -> Result<(), SimError> {
        self.lifecycle.ensure_ready("physics engine")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Pose;

    fn engine_with_body(pose: Pose) -> (PhysicsEngine, Arc<RwLock<RigidBody>>) {
        let body = Arc::new(RwLock::new(RigidBody::new(
            "test",
            1.0,
            Vector3r::new(0.005, 0.005, 0.009),
            pose,
        )));
        let env = Arc::new(RwLock::new(Environment::new(Default::default())));
        let mut engine = PhysicsEngine::new(PhysicsMode::Internal);
        engine.add_body(BodyHandle {
            body: Arc::clone(&body),
            environment: env,
        });
        engine.reset();
        (engine, body)
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut engine = PhysicsEngine::new(PhysicsMode::Internal);
        assert!(matches!(engine.step(0.003), Err(SimError::NotReady(_))));
    }

    #[test]
    fn test_grounded_body_stays_on_ground() {
        let (mut engine, body) = engine_with_body(Pose::zero());
        for _ in 0..100 {
            engine.step(0.003).unwrap();
        }
        let body = body.read().unwrap();
        assert_eq!(body.kinematics.pose.position.z, 0.0);
        assert!(body.is_grounded());
    }

    #[test]
    fn test_thrust_lifts_body_and_orientation_stays_normalized() {
        let (mut engine, body) = engine_with_body(Pose::zero());
        for _ in 0..200 {
            {
                let mut b = body.write().unwrap();
                // 2 g of thrust along body -z (up in NED).
                b.set_wrench(Vector3r::new(0.0, 0.0, -2.0 * crate::environment::GRAVITY), Vector3r::zeros())
                    .unwrap();
            }
            engine.step(0.003).unwrap();
        }
        let body = body.read().unwrap();
        assert!(body.kinematics.pose.position.z < -0.1, "body should have climbed");
        let norm = body.kinematics.pose.orientation.into_inner().norm();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_determinism_across_runs() {
        let run = || {
            let (mut engine, body) = engine_with_body(Pose::zero());
            for _ in 0..50 {
                {
                    let mut b = body.write().unwrap();
                    b.set_wrench(
                        Vector3r::new(0.1, 0.0, -15.0),
                        Vector3r::new(0.0001, 0.0, 0.0),
                    )
                    .unwrap();
                }
                engine.step(0.003).unwrap();
            }
            let b = body.read().unwrap();
            b.kinematics.pose.position
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_external_mode_skips_integration() {
        let pose = Pose::new(Vector3r::new(0.0, 0.0, -7.0), crate::geom::Quaternionr::identity());
        let body = Arc::new(RwLock::new(RigidBody::new(
            "ext",
            1.0,
            Vector3r::new(0.005, 0.005, 0.009),
            pose,
        )));
        let env = Arc::new(RwLock::new(Environment::new(Default::default())));
        let mut engine = PhysicsEngine::new(PhysicsMode::External);
        engine.add_body(BodyHandle {
            body: Arc::clone(&body),
            environment: Arc::clone(&env),
        });
        engine.reset();
        body.write().unwrap().set_pose(pose);
        engine.step(0.003).unwrap();
        // Position untouched, environment refreshed from it.
        assert_eq!(body.read().unwrap().kinematics.pose.position.z, -7.0);
        assert!((env.read().unwrap().position.z - -7.0).abs() < 1e-6);
    }
}
