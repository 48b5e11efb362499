//! Rigid-body state integrated by the physics engine.

use crate::error::SimError;
use crate::geom::{Kinematics, Pose, Real, Vector3r};
use crate::updatable::{Lifecycle, Updatable};

/// A single rigid body: ground-truth kinematics plus the actuator wrench the
/// firmware wrote for the next step.
///
/// A body whose inputs or state go non-finite is quarantined: it stops
/// integrating and keeps its last finite kinematics until reset.
#[derive(Debug, Clone)]
pub struct RigidBody {
    lifecycle: Lifecycle,
    name: String,
    mass: Real,
    /// Diagonal body-frame inertia.
    inertia: Vector3r,
    /// Linear drag coefficient, 1/s: drag acceleration is `-c * (v - wind)`.
    linear_drag: Real,
    /// Angular drag coefficient, 1/s.
    angular_drag: Real,
    initial_pose: Pose,
    pub kinematics: Kinematics,
    /// Body-frame force commanded by the firmware for the next step.
    force_body: Vector3r,
    /// Body-frame torque commanded by the firmware for the next step.
    torque_body: Vector3r,
    grounded: bool,
    functional: bool,
}

impl RigidBody {
    pub fn new(name: impl Into<String>, mass: Real, inertia: Vector3r, initial_pose: Pose) -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            name: name.into(),
            mass,
            inertia,
            linear_drag: 0.3,
            angular_drag: 0.8,
            initial_pose,
            kinematics: Kinematics::at_pose(initial_pose),
            force_body: Vector3r::zeros(),
            torque_body: Vector3r::zeros(),
            grounded: true,
            functional: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mass(&self) -> Real {
        self.mass
    }

    pub fn inertia(&self) -> Vector3r {
        self.inertia
    }

    pub fn linear_drag(&self) -> Real {
        self.linear_drag
    }

    pub fn angular_drag(&self) -> Real {
        self.angular_drag
    }

    pub fn initial_pose(&self) -> Pose {
        self.initial_pose
    }

    /// Whether the body is still integrating (false once quarantined).
    pub fn is_functional(&self) -> bool {
        self.functional
    }

    /// Whether the body is resting on the ground plane.
    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    pub fn set_grounded(&mut self, grounded: bool) {
        self.grounded = grounded;
    }

    /// Marks the body non-functional; its kinematics freeze until reset.
    pub fn quarantine(&mut self) {
        self.functional = false;
    }

    /// Writes the actuator wrench for the next integration step. Non-finite
    /// inputs quarantine the body instead of being integrated.
    pub fn set_wrench(&mut self, force_body: Vector3r, torque_body: Vector3r) -> Result<(), SimError> {
        if !force_body.iter().all(|v| v.is_finite()) || !torque_body.iter().all(|v| v.is_finite()) {
            self.quarantine();
            return Err(SimError::internal(format!(
                "non-finite wrench on body '{}'",
                self.name
            )));
        }
        self.force_body = force_body;
        self.torque_body = torque_body;
        Ok(())
    }

    pub fn wrench(&self) -> (Vector3r, Vector3r) {
        (self.force_body, self.torque_body)
    }

    /// Teleports the body, zeroing its motion. Used by the sim API.
    pub fn set_pose(&mut self, pose: Pose) {
        self.kinematics = Kinematics::at_pose(pose);
        self.grounded = false;
    }
}

impl Updatable for RigidBody {
    fn reset(&mut self) {
        self.lifecycle.mark_reset();
        self.kinematics = Kinematics::at_pose(self.initial_pose);
        self.force_body = Vector3r::zeros();
        self.torque_body = Vector3r::zeros();
        self.grounded = true;
        self.functional = true;
    }

    fn update(&mut self) -> Result<(), SimError> {
        // Integration happens in the engine; the body only validates state.
        self.lifecycle.ensure_ready("rigid body")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_wrench_quarantines() {
        let mut body = RigidBody::new("b", 1.0, Vector3r::new(0.01, 0.01, 0.02), Pose::zero());
        body.reset();
        let err = body.set_wrench(Vector3r::new(Real::NAN, 0.0, 0.0), Vector3r::zeros());
        assert!(matches!(err, Err(SimError::InternalError(_))));
        assert!(!body.is_functional());
    }

    #[test]
    fn test_reset_restores_initial_pose_and_function() {
        let pose = Pose::new(Vector3r::new(1.0, 2.0, -3.0), crate::geom::Quaternionr::identity());
        let mut body = RigidBody::new("b", 1.0, Vector3r::new(0.01, 0.01, 0.02), pose);
        body.reset();
        body.quarantine();
        body.set_pose(Pose::zero());
        body.reset();
        assert!(body.is_functional());
        assert_eq!(body.kinematics.pose.position, pose.position);
    }
}
