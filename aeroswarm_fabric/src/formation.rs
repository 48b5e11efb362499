//! Reactive formation control: desired pose/velocity per vehicle from a
//! formation type and neighbor states.

use nalgebra::UnitQuaternion;

use aeroswarm_core::geom::{Quaternionr, Real, Vector3r};

/// Formation geometries. Offsets are in the formation frame: leader at the
/// origin, +x forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FormationType {
    #[default]
    Line = 0,
    Column = 1,
    Wedge = 2,
    Diamond = 3,
    Circle = 4,
    Box = 5,
    Custom = 6,
}

/// Minimal vehicle state the controller needs.
#[derive(Debug, Clone, Copy)]
pub struct VehicleState {
    pub id: usize,
    pub position: Vector3r,
    pub velocity: Vector3r,
    pub orientation: Quaternionr,
}

impl VehicleState {
    pub fn new(id: usize, position: Vector3r) -> Self {
        Self {
            id,
            position,
            velocity: Vector3r::zeros(),
            orientation: Quaternionr::identity(),
        }
    }
}

/// Per-tick output for one vehicle.
#[derive(Debug, Clone)]
pub struct FormationCommand {
    pub desired_velocity: Vector3r,
    pub desired_acceleration: Vector3r,
    pub desired_orientation: Quaternionr,
}

impl Default for FormationCommand {
    fn default() -> Self {
        Self {
            desired_velocity: Vector3r::zeros(),
            desired_acceleration: Vector3r::zeros(),
            desired_orientation: Quaternionr::identity(),
        }
    }
}

/// Geometry and gain parameters.
#[derive(Debug, Clone)]
pub struct FormationParams {
    pub formation_type: FormationType,
    /// Distance between vehicles, m.
    pub spacing: Real,
    /// Minimum separation before repulsion kicks in, m.
    pub collision_radius: Real,
    pub max_velocity: Real,
    pub max_acceleration: Real,
    /// Position attractor gain.
    pub k_position: Real,
    /// Leader velocity matching gain.
    pub k_velocity: Real,
    /// Neighbor repulsion gain.
    pub k_separation: Real,
    /// Group cohesion gain.
    pub k_cohesion: Real,
    /// Velocity alignment gain.
    pub k_alignment: Real,
    /// Radius for circular formations, m.
    pub formation_radius: Real,
    /// Half-angle of the wedge, rad.
    pub formation_angle: Real,
}

impl Default for FormationParams {
    fn default() -> Self {
        Self {
            formation_type: FormationType::Line,
            spacing: 5.0,
            collision_radius: 2.0,
            max_velocity: 10.0,
            max_acceleration: 5.0,
            k_position: 1.0,
            k_velocity: 0.5,
            k_separation: 2.0,
            k_cohesion: 0.3,
            k_alignment: 0.2,
            formation_radius: 10.0,
            formation_angle: std::f32::consts::PI / 6.0,
        }
    }
}

/// Computes where each vehicle belongs and the command that takes it there.
pub struct FormationController {
    params: FormationParams,
    custom_positions: Vec<Vector3r>,
}

impl FormationController {
    pub fn new(params: FormationParams) -> Self {
        Self {
            params,
            custom_positions: Vec::new(),
        }
    }

    pub fn params(&self) -> &FormationParams {
        &self.params
    }

    pub fn set_params(&mut self, params: FormationParams) {
        self.params = params;
    }

    pub fn formation_type(&self) -> FormationType {
        self.params.formation_type
    }

    pub fn set_formation_type(&mut self, formation_type: FormationType) {
        self.params.formation_type = formation_type;
    }

    pub fn set_spacing(&mut self, spacing: Real) {
        self.params.spacing = spacing;
    }

    /// Installs explicit offsets and switches to the custom formation.
    pub fn set_custom_formation(&mut self, positions: Vec<Vector3r>) {
        self.custom_positions = positions;
        self.params.formation_type = FormationType::Custom;
    }

    pub fn reset(&mut self) {
        self.custom_positions.clear();
    }

    /// Desired world-frame position for slot `index` of `total`, rotated by
    /// the leader's orientation and anchored at its position.
    pub fn desired_position(
        &self,
        index: usize,
        leader: &VehicleState,
        total: usize,
    ) -> Vector3r {
        let offset = self.offset(index, total);
        leader.position + leader.orientation.transform_vector(&offset)
    }

    fn offset(&self, index: usize, total: usize) -> Vector3r {
        let s = self.params.spacing;
        match self.params.formation_type {
            FormationType::Line => {
                // Integer center keeps slots on exact multiples of the
                // spacing.
                let center = (total / 2) as Real;
                Vector3r::new(0.0, (index as Real - center) * s, 0.0)
            }
            FormationType::Column => Vector3r::new(-(index as Real) * s, 0.0, 0.0),
            FormationType::Wedge => {
                if index == 0 {
                    return Vector3r::zeros();
                }
                let side: Real = if index % 2 == 0 { 1.0 } else { -1.0 };
                let row = ((index + 1) / 2) as Real;
                Vector3r::new(
                    -row * s * self.params.formation_angle.cos(),
                    side * row * s * self.params.formation_angle.sin(),
                    0.0,
                )
            }
            FormationType::Diamond => {
                if total < 4 {
                    return self.box_offset(index, total);
                }
                match index {
                    0 => Vector3r::new(s, 0.0, 0.0),
                    1 => Vector3r::new(0.0, s, 0.0),
                    2 => Vector3r::new(-s, 0.0, 0.0),
                    3 => Vector3r::new(0.0, -s, 0.0),
                    _ => self.circle_offset(index - 4, total - 4),
                }
            }
            FormationType::Circle => self.circle_offset(index, total),
            FormationType::Box => self.box_offset(index, total),
            FormationType::Custom => self
                .custom_positions
                .get(index)
                .copied()
                .unwrap_or_else(Vector3r::zeros),
        }
    }

    fn circle_offset(&self, index: usize, total: usize) -> Vector3r {
        if total <= 1 {
            return Vector3r::zeros();
        }
        let angle = 2.0 * std::f32::consts::PI * index as Real / total as Real;
        Vector3r::new(
            self.params.formation_radius * angle.cos(),
            self.params.formation_radius * angle.sin(),
            0.0,
        )
    }

    fn box_offset(&self, index: usize, total: usize) -> Vector3r {
        let side = (total as Real).sqrt().ceil() as usize;
        if side == 0 {
            return Vector3r::zeros();
        }
        let row = index / side;
        let col = index % side;
        let half = side as Real / 2.0;
        Vector3r::new(
            (row as Real - half) * self.params.spacing,
            (col as Real - half) * self.params.spacing,
            0.0,
        )
    }

    /// Computes the per-tick command for one vehicle: position attraction,
    /// leader velocity matching, neighbor repulsion, cohesion and alignment,
    /// saturated to the velocity and acceleration limits.
    pub fn compute_command(
        &self,
        index: usize,
        current: &VehicleState,
        all: &[VehicleState],
        leader: &VehicleState,
    ) -> FormationCommand {
        let mut command = FormationCommand::default();
        if all.is_empty() {
            return command;
        }

        let desired = self.desired_position(index, leader, all.len());
        let mut total = (desired - current.position) * self.params.k_position;
        total += (leader.velocity - current.velocity) * self.params.k_velocity;
        total += self.separation(current, all) * self.params.k_separation;
        total += self.cohesion(current, all) * self.params.k_cohesion;
        total += self.alignment(current, all) * self.params.k_alignment;

        command.desired_velocity = saturate(total, self.params.max_velocity);
        command.desired_acceleration = saturate(total, self.params.max_acceleration);
        command.desired_orientation = if command.desired_velocity.norm() > 0.1 {
            orientation_along(command.desired_velocity)
        } else {
            current.orientation
        };
        command
    }

    /// Inverse-square repulsion from neighbors inside the collision radius.
    fn separation(&self, vehicle: &VehicleState, neighbors: &[VehicleState]) -> Vector3r {
        let mut force = Vector3r::zeros();
        for neighbor in neighbors {
            if neighbor.id == vehicle.id {
                continue;
            }
            let diff = vehicle.position - neighbor.position;
            let distance = diff.norm();
            if distance < self.params.collision_radius && distance > 0.01 {
                force += diff / (distance * distance);
            }
        }
        force
    }

    /// Pull toward the mean neighbor position.
    fn cohesion(&self, vehicle: &VehicleState, neighbors: &[VehicleState]) -> Vector3r {
        let mut center = Vector3r::zeros();
        let mut count = 0;
        for neighbor in neighbors {
            if neighbor.id != vehicle.id {
                center += neighbor.position;
                count += 1;
            }
        }
        if count == 0 {
            return Vector3r::zeros();
        }
        center / count as Real - vehicle.position
    }

    /// Pull toward the mean neighbor velocity.
    fn alignment(&self, vehicle: &VehicleState, neighbors: &[VehicleState]) -> Vector3r {
        let mut mean = Vector3r::zeros();
        let mut count = 0;
        for neighbor in neighbors {
            if neighbor.id != vehicle.id {
                mean += neighbor.velocity;
                count += 1;
            }
        }
        if count == 0 {
            return Vector3r::zeros();
        }
        mean / count as Real - vehicle.velocity
    }
}

impl Default for FormationController {
    fn default() -> Self {
        Self::new(FormationParams::default())
    }
}

fn saturate(v: Vector3r, max_magnitude: Real) -> Vector3r {
    let magnitude = v.norm();
    if magnitude > max_magnitude && magnitude > 1e-3 {
        v * (max_magnitude / magnitude)
    } else {
        v
    }
}

/// Orientation whose forward (+x) axis points along `direction`.
fn orientation_along(direction: Vector3r) -> Quaternionr {
    let yaw = direction.y.atan2(direction.x);
    let horizontal = (direction.x * direction.x + direction.y * direction.y).sqrt();
    let pitch = -direction.z.atan2(horizontal);
    UnitQuaternion::from_euler_angles(0.0, pitch, yaw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leader_at(position: Vector3r) -> VehicleState {
        VehicleState::new(0, position)
    }

    #[test]
    fn test_line_of_five_matches_expected_slots() {
        let controller = FormationController::default();
        let leader = leader_at(Vector3r::new(0.0, 0.0, 10.0));
        let expected_y = [-10.0, -5.0, 0.0, 5.0, 10.0];
        for (i, y) in expected_y.iter().enumerate() {
            let p = controller.desired_position(i, &leader, 5);
            assert!((p.x - 0.0).abs() < 1e-4);
            assert!((p.y - y).abs() < 1e-4, "slot {i} was at y={}", p.y);
            assert!((p.z - 10.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_line_consecutive_spacing() {
        let controller = FormationController::default();
        let leader = leader_at(Vector3r::zeros());
        for n in 2..8 {
            for i in 1..n {
                let a = controller.desired_position(i - 1, &leader, n);
                let b = controller.desired_position(i, &leader, n);
                assert!(((b.y - a.y) - 5.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_circle_radius_invariant() {
        let mut params = FormationParams::default();
        params.formation_type = FormationType::Circle;
        params.formation_radius = 7.5;
        let controller = FormationController::new(params);
        let leader = leader_at(Vector3r::new(3.0, -2.0, 15.0));
        for n in 2..10 {
            for i in 0..n {
                let p = controller.desired_position(i, &leader, n);
                let r = (p - leader.position).norm();
                assert!((r - 7.5).abs() < 1e-4, "index {i} of {n} at radius {r}");
            }
        }
    }

    #[test]
    fn test_column_stacks_behind_leader() {
        let mut params = FormationParams::default();
        params.formation_type = FormationType::Column;
        let controller = FormationController::new(params);
        let leader = leader_at(Vector3r::zeros());
        let p = controller.desired_position(3, &leader, 5);
        assert!((p.x - -15.0).abs() < 1e-4);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn test_wedge_alternates_sides() {
        let mut params = FormationParams::default();
        params.formation_type = FormationType::Wedge;
        let controller = FormationController::new(params);
        let leader = leader_at(Vector3r::zeros());
        assert_eq!(controller.desired_position(0, &leader, 5), Vector3r::zeros());
        let left = controller.desired_position(1, &leader, 5);
        let right = controller.desired_position(2, &leader, 5);
        assert!(left.y < 0.0);
        assert!(right.y > 0.0);
        assert!((left.y + right.y).abs() < 1e-4);
        assert!(left.x < 0.0 && right.x < 0.0, "followers trail the leader");
    }

    #[test]
    fn test_diamond_cardinal_slots() {
        let mut params = FormationParams::default();
        params.formation_type = FormationType::Diamond;
        let controller = FormationController::new(params);
        let leader = leader_at(Vector3r::zeros());
        assert_eq!(
            controller.desired_position(0, &leader, 4),
            Vector3r::new(5.0, 0.0, 0.0)
        );
        assert_eq!(
            controller.desired_position(3, &leader, 4),
            Vector3r::new(0.0, -5.0, 0.0)
        );
    }

    #[test]
    fn test_custom_out_of_range_is_zero_offset() {
        let mut controller = FormationController::default();
        controller.set_custom_formation(vec![Vector3r::new(1.0, 1.0, 0.0)]);
        let leader = leader_at(Vector3r::new(10.0, 0.0, 0.0));
        assert_eq!(
            controller.desired_position(5, &leader, 6),
            leader.position
        );
    }

    #[test]
    fn test_offsets_rotate_with_leader() {
        let controller = FormationController::default();
        // Leader yawed 90 degrees: line offsets along world -x.
        let mut leader = leader_at(Vector3r::zeros());
        leader.orientation = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f32::consts::FRAC_PI_2);
        let p = controller.desired_position(0, &leader, 5);
        assert!((p.x - 10.0).abs() < 1e-3);
        assert!(p.y.abs() < 1e-3);
    }

    #[test]
    fn test_command_seeks_slot_and_saturates() {
        let controller = FormationController::default();
        let leader = leader_at(Vector3r::zeros());
        let all: Vec<VehicleState> = (0..3)
            .map(|i| VehicleState::new(i, Vector3r::new(0.0, 100.0 * i as Real, 0.0)))
            .collect();
        let command = controller.compute_command(2, &all[2], &all, &leader);
        assert!(command.desired_velocity.norm() <= controller.params().max_velocity + 1e-4);
        assert!(
            command.desired_acceleration.norm() <= controller.params().max_acceleration + 1e-4
        );
        // Far from its slot, the vehicle is pulled back toward the leader.
        assert!(command.desired_velocity.y < 0.0);
    }

    #[test]
    fn test_separation_repels_close_neighbors() {
        let controller = FormationController::default();
        let leader = leader_at(Vector3r::zeros());
        let all = vec![
            VehicleState::new(0, Vector3r::zeros()),
            VehicleState::new(1, Vector3r::new(0.5, 0.0, 0.0)),
        ];
        let command = controller.compute_command(1, &all[1], &all, &leader);
        // Neighbor 0.5 m away, inside the 2 m collision radius: pushed +x
        // harder than the slot attraction pulls it back.
        let separation_x = command.desired_acceleration.x;
        assert!(separation_x > 0.0, "expected repulsion, got {separation_x}");
    }

    #[test]
    fn test_orientation_follows_velocity_or_holds() {
        let controller = FormationController::default();
        let leader = leader_at(Vector3r::new(100.0, 0.0, 0.0));
        let mut me = VehicleState::new(1, Vector3r::zeros());
        me.orientation = UnitQuaternion::from_euler_angles(0.0, 0.0, 1.0);
        let all = vec![leader, me];
        let command = controller.compute_command(1, &me, &all, &leader);
        // Moving toward +x: forward axis aligns with motion.
        let forward = command
            .desired_orientation
            .transform_vector(&Vector3r::new(1.0, 0.0, 0.0));
        assert!(forward.x > 0.9);

        // At rest in its slot, orientation is untouched.
        let settled = VehicleState {
            id: 1,
            position: controller.desired_position(1, &leader, 2),
            velocity: Vector3r::zeros(),
            orientation: me.orientation,
        };
        let all = vec![leader, settled];
        let command = controller.compute_command(1, &settled, &all, &leader);
        if command.desired_velocity.norm() <= 0.1 {
            assert_eq!(command.desired_orientation, settled.orientation);
        }
    }
}
