//! Joint constraints.
//!
//! Joints are bilateral constraints between two bodies, regenerated into
//! NCP rows from the current body state every tick. Three kinds cover the
//! articulations the engine supports:
//!
//! - [`JointKind::Ball`]: coincident anchor points (3 rows)
//! - [`JointKind::Hinge`]: ball plus a locked rotation plane (5 rows,
//!   plus an optional motor row)
//! - [`JointKind::Fixed`]: fully locked relative pose (6 rows)
//!
//! A *monitored* joint is one an external controller writes a target
//! velocity into; while its island sleeps the joint is still evaluated
//! passively each tick so a nonzero target can wake the island.

use islet_types::{BodyId, SolverConfig};
use nalgebra::{Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::row::{ConstraintRow, SolverBody};

/// Velocity motor on a hinge axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Motor {
    /// Target relative angular velocity about the hinge axis (rad/s).
    pub target_velocity: f64,
    /// Maximum torque the motor may exert (Nm).
    pub max_torque: f64,
}

/// The constraint type of a joint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// Ball-and-socket: anchors coincide, rotation free.
    Ball,
    /// Hinge: anchors coincide, rotation only about `axis` (body A local).
    Hinge {
        /// Rotation axis in body A's frame.
        axis: Vector3<f64>,
        /// Optional velocity motor about the axis.
        motor: Option<Motor>,
    },
    /// Welded: relative pose locked to its configuration at creation.
    Fixed {
        /// Relative rotation `qa^-1 * qb` captured at creation.
        rest_rotation: UnitQuaternion<f64>,
    },
}

/// A joint between two bodies.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor in body A's frame.
    pub anchor_a: Point3<f64>,
    /// Anchor in body B's frame.
    pub anchor_b: Point3<f64>,
    /// Constraint type.
    pub kind: JointKind,
    /// Whether an external controller drives this joint.
    pub monitored: bool,
    /// Cached multipliers for warm starting.
    pub cached_lambda: Vec<f64>,
}

impl Joint {
    /// Create a ball joint.
    #[must_use]
    pub fn ball(body_a: BodyId, body_b: BodyId, anchor_a: Point3<f64>, anchor_b: Point3<f64>) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            kind: JointKind::Ball,
            monitored: false,
            cached_lambda: Vec::new(),
        }
    }

    /// Create a hinge joint about an axis in body A's frame.
    #[must_use]
    pub fn hinge(
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Point3<f64>,
        anchor_b: Point3<f64>,
        axis: Vector3<f64>,
    ) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            kind: JointKind::Hinge {
                axis: axis.normalize(),
                motor: None,
            },
            monitored: false,
            cached_lambda: Vec::new(),
        }
    }

    /// Create a fixed (welded) joint, locking the given relative rotation.
    #[must_use]
    pub fn fixed(
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Point3<f64>,
        anchor_b: Point3<f64>,
        rest_rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            kind: JointKind::Fixed { rest_rotation },
            monitored: false,
            cached_lambda: Vec::new(),
        }
    }

    /// Attach a velocity motor (hinge joints only; no-op otherwise).
    #[must_use]
    pub fn with_motor(mut self, motor: Motor) -> Self {
        if let JointKind::Hinge { motor: slot, .. } = &mut self.kind {
            *slot = Some(motor);
        }
        self
    }

    /// Set the motor target velocity, if a motor exists.
    pub fn set_target_velocity(&mut self, target: f64) {
        if let JointKind::Hinge {
            motor: Some(motor), ..
        } = &mut self.kind
        {
            motor.target_velocity = target;
        }
    }

    /// Whether a sleeping island holding this joint must wake: an
    /// externally driven motor with a nonzero target needs resolution.
    #[must_use]
    pub fn should_activate(&self) -> bool {
        if !self.monitored {
            return false;
        }
        matches!(
            self.kind,
            JointKind::Hinge {
                motor: Some(Motor { target_velocity, .. }),
                ..
            } if target_velocity.abs() > 1e-9
        )
    }

    /// Number of rows this joint emits.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match &self.kind {
            JointKind::Ball => 3,
            JointKind::Hinge { motor, .. } => 5 + usize::from(motor.is_some()),
            JointKind::Fixed { .. } => 6,
        }
    }

    /// Regenerate this joint's rows from the current body state.
    #[must_use]
    pub fn rows(
        &self,
        slot_a: usize,
        slot_b: usize,
        bodies: &[SolverBody],
        dt: f64,
        config: &SolverConfig,
    ) -> Vec<ConstraintRow> {
        let a = &bodies[slot_a];
        let b = &bodies[slot_b];

        let world_anchor_a = a.position + a.rotation * self.anchor_a.coords;
        let world_anchor_b = b.position + b.rotation * self.anchor_b.coords;
        let r_a = world_anchor_a - a.position;
        let r_b = world_anchor_b - b.position;
        let position_error = world_anchor_b - world_anchor_a;

        let beta_dt = config.baumgarte / dt;
        let mut rows = Vec::with_capacity(self.row_count());

        // Anchor coincidence: three rows along the world axes. The
        // velocity of the constraint is
        //   e . (v_a + w_a x r_a - v_b - w_b x r_b)
        // and the stabilization drives the anchor gap to zero.
        for i in 0..3 {
            let e = axis_vector(i);
            rows.push(ConstraintRow::new(
                slot_a,
                slot_b,
                bodies,
                e,
                r_a.cross(&e),
                -e,
                -r_b.cross(&e),
                f64::NEG_INFINITY,
                f64::INFINITY,
                beta_dt * position_error[i],
            ));
        }

        match &self.kind {
            JointKind::Ball => {}
            JointKind::Hinge { axis, motor } => {
                let world_axis_a = a.rotation * axis;
                let world_axis_b = b.rotation * axis;
                let misalignment = world_axis_a.cross(&world_axis_b);

                // Two angular rows perpendicular to the hinge axis
                let (t1, t2) = perpendicular_axes(&world_axis_a);
                for t in [t1, t2] {
                    rows.push(ConstraintRow::new(
                        slot_a,
                        slot_b,
                        bodies,
                        Vector3::zeros(),
                        t,
                        Vector3::zeros(),
                        -t,
                        f64::NEG_INFINITY,
                        f64::INFINITY,
                        beta_dt * t.dot(&misalignment),
                    ));
                }

                if let Some(motor) = motor {
                    // Impulse-limited velocity row about the axis
                    let limit = motor.max_torque * dt;
                    rows.push(ConstraintRow::new(
                        slot_a,
                        slot_b,
                        bodies,
                        Vector3::zeros(),
                        -world_axis_a,
                        Vector3::zeros(),
                        world_axis_a,
                        -limit,
                        limit,
                        motor.target_velocity,
                    ));
                }
            }
            JointKind::Fixed { rest_rotation } => {
                // Small-angle error of the relative rotation against rest
                let target = a.rotation * rest_rotation;
                let delta = b.rotation * target.inverse();
                let error = 2.0 * delta.imag();

                for i in 0..3 {
                    let e = axis_vector(i);
                    rows.push(ConstraintRow::new(
                        slot_a,
                        slot_b,
                        bodies,
                        Vector3::zeros(),
                        e,
                        Vector3::zeros(),
                        -e,
                        f64::NEG_INFINITY,
                        f64::INFINITY,
                        beta_dt * error[i],
                    ));
                }
            }
        }

        // Warm start from the previous tick
        if self.cached_lambda.len() == rows.len() {
            for (row, &cached) in rows.iter_mut().zip(&self.cached_lambda) {
                row.lambda = cached * config.warm_start_factor;
            }
        }

        rows
    }

    /// Store solved multipliers for the next tick's warm start.
    pub fn store_impulses(&mut self, rows: &[ConstraintRow]) {
        self.cached_lambda.clear();
        self.cached_lambda.extend(rows.iter().map(|r| r.lambda));
    }
}

fn axis_vector(i: usize) -> Vector3<f64> {
    match i {
        0 => Vector3::x(),
        1 => Vector3::y(),
        _ => Vector3::z(),
    }
}

/// Two unit axes perpendicular to `axis`.
fn perpendicular_axes(axis: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let reference = if axis.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let p1 = axis.cross(&reference).normalize();
    let p2 = axis.cross(&p1).normalize();
    (p1, p2)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::pgs::solve_pgs;
    use approx::assert_relative_eq;
    use islet_types::Pose;
    use nalgebra::Matrix3;

    fn body_at(x: f64, y: f64, z: f64) -> SolverBody {
        SolverBody::new(
            &Pose::from_position(Point3::new(x, y, z)),
            Vector3::zeros(),
            Vector3::zeros(),
            1.0,
            Matrix3::identity(),
            false,
        )
    }

    #[test]
    fn test_row_counts() {
        let a = BodyId::new(1);
        let b = BodyId::new(2);
        let origin = Point3::origin();

        assert_eq!(Joint::ball(a, b, origin, origin).row_count(), 3);
        assert_eq!(
            Joint::hinge(a, b, origin, origin, Vector3::z()).row_count(),
            5
        );
        assert_eq!(
            Joint::hinge(a, b, origin, origin, Vector3::z())
                .with_motor(Motor {
                    target_velocity: 1.0,
                    max_torque: 10.0
                })
                .row_count(),
            6
        );
        assert_eq!(
            Joint::fixed(a, b, origin, origin, UnitQuaternion::identity()).row_count(),
            6
        );
    }

    /// A ball joint between a fixed anchor and a separating body pulls the
    /// relative anchor velocity to zero.
    #[test]
    fn test_ball_joint_stops_separation() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), body_at(0.0, 0.0, -1.0)];
        bodies[1].velocity = Vector3::new(0.0, 0.0, -1.0);

        let joint = Joint::ball(
            BodyId::new(1),
            BodyId::new(2),
            Point3::origin(),
            Point3::new(0.0, 0.0, 1.0),
        );
        let mut rows = joint.rows(0, 1, &bodies, 1.0 / 60.0, &SolverConfig::default());
        assert_eq!(rows.len(), 3);

        let _ = solve_pgs(&mut bodies, &mut rows, 40, 1e-10);
        assert_relative_eq!(bodies[1].total_velocity().z, 0.0, epsilon = 1e-6);
    }

    /// Hinge angular rows leave rotation about the axis free and lock the
    /// perpendicular components.
    #[test]
    fn test_hinge_locks_off_axis_rotation() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), body_at(0.0, 0.0, 0.0)];
        bodies[1].omega = Vector3::new(1.0, 1.0, 2.0);

        let joint = Joint::hinge(
            BodyId::new(1),
            BodyId::new(2),
            Point3::origin(),
            Point3::origin(),
            Vector3::z(),
        );
        let mut rows = joint.rows(0, 1, &bodies, 1.0 / 60.0, &SolverConfig::default());

        let _ = solve_pgs(&mut bodies, &mut rows, 60, 1e-10);
        let omega = bodies[1].total_omega();
        assert_relative_eq!(omega.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(omega.y, 0.0, epsilon = 1e-6);
        // Spin about the hinge axis is untouched
        assert_relative_eq!(omega.z, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_motor_drives_axis_velocity() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), body_at(0.0, 0.0, 0.0)];

        let joint = Joint::hinge(
            BodyId::new(1),
            BodyId::new(2),
            Point3::origin(),
            Point3::origin(),
            Vector3::z(),
        )
        .with_motor(Motor {
            target_velocity: 1.5,
            max_torque: 100.0,
        });

        let mut rows = joint.rows(0, 1, &bodies, 1.0 / 60.0, &SolverConfig::default());
        let _ = solve_pgs(&mut bodies, &mut rows, 60, 1e-10);

        assert_relative_eq!(bodies[1].total_omega().z, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_motor_torque_limit_caps_impulse() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), body_at(0.0, 0.0, 0.0)];

        let dt = 1.0 / 60.0;
        let joint = Joint::hinge(
            BodyId::new(1),
            BodyId::new(2),
            Point3::origin(),
            Point3::origin(),
            Vector3::z(),
        )
        .with_motor(Motor {
            target_velocity: 100.0,
            max_torque: 0.6,
        });

        let mut rows = joint.rows(0, 1, &bodies, dt, &SolverConfig::default());
        let _ = solve_pgs(&mut bodies, &mut rows, 60, 1e-10);

        // The impulse saturates at max_torque * dt
        let motor_row = rows.last().unwrap();
        assert_relative_eq!(motor_row.lambda, 0.6 * dt, epsilon = 1e-9);
        assert!(bodies[1].total_omega().z < 100.0);
    }

    #[test]
    fn test_fixed_joint_locks_all_relative_motion() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), body_at(1.0, 0.0, 0.0)];
        bodies[1].velocity = Vector3::new(0.3, -0.2, 0.5);
        bodies[1].omega = Vector3::new(1.0, 2.0, 3.0);

        let joint = Joint::fixed(
            BodyId::new(1),
            BodyId::new(2),
            Point3::new(1.0, 0.0, 0.0),
            Point3::origin(),
            UnitQuaternion::identity(),
        );
        let mut rows = joint.rows(0, 1, &bodies, 1.0 / 60.0, &SolverConfig::default());
        assert_eq!(rows.len(), 6);

        let _ = solve_pgs(&mut bodies, &mut rows, 80, 1e-10);
        assert!(bodies[1].total_velocity().norm() < 1e-5);
        assert!(bodies[1].total_omega().norm() < 1e-5);
    }

    #[test]
    fn test_monitored_activation() {
        let mut joint = Joint::hinge(
            BodyId::new(1),
            BodyId::new(2),
            Point3::origin(),
            Point3::origin(),
            Vector3::z(),
        )
        .with_motor(Motor {
            target_velocity: 0.0,
            max_torque: 10.0,
        });
        joint.monitored = true;

        assert!(!joint.should_activate());
        joint.set_target_velocity(2.0);
        assert!(joint.should_activate());
    }

    #[test]
    fn test_warm_start_round_trip() {
        let bodies = vec![SolverBody::fixed_at(&Pose::identity()), body_at(0.0, 0.0, -1.0)];
        let mut joint = Joint::ball(
            BodyId::new(1),
            BodyId::new(2),
            Point3::origin(),
            Point3::new(0.0, 0.0, 1.0),
        );

        let config = SolverConfig::default();
        let mut rows = joint.rows(0, 1, &bodies, 1.0 / 60.0, &config);
        rows[2].lambda = 0.75;
        joint.store_impulses(&rows);

        let rows_next = joint.rows(0, 1, &bodies, 1.0 / 60.0, &config);
        assert_relative_eq!(
            rows_next[2].lambda,
            0.75 * config.warm_start_factor,
            epsilon = 1e-12
        );
    }
}
