//! NCP constraint rows and the per-island body working state.

use islet_types::Pose;
use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

/// Bias added to near-singular row diagonals.
const DIAGONAL_EPSILON: f64 = 1e-9;

/// Per-island working copy of a body's dynamic state.
///
/// The solvers never touch the scene's bodies directly: each island
/// assembles its members into a slice of `SolverBody`, the rows index
/// into that slice, and the accumulated deltas are applied back to the
/// real bodies after the solve. Fixed bodies carry zero inverse mass and
/// inertia and therefore absorb no impulse.
#[derive(Debug, Clone)]
pub struct SolverBody {
    /// World position of the center of mass.
    pub position: Point3<f64>,
    /// World orientation.
    pub rotation: UnitQuaternion<f64>,
    /// Linear velocity entering the solve.
    pub velocity: Vector3<f64>,
    /// Angular velocity entering the solve.
    pub omega: Vector3<f64>,
    /// Inverse mass (zero when fixed).
    pub inv_mass: f64,
    /// World-frame inverse inertia (zero when fixed).
    pub inv_inertia: Matrix3<f64>,
    /// Accumulated linear velocity change from constraint impulses.
    pub delta_velocity: Vector3<f64>,
    /// Accumulated angular velocity change from constraint impulses.
    pub delta_omega: Vector3<f64>,
    /// Whether the body has infinite mass.
    pub fixed: bool,
}

impl SolverBody {
    /// Build the working state from pose, twist and mass data.
    #[must_use]
    pub fn new(
        pose: &Pose,
        velocity: Vector3<f64>,
        omega: Vector3<f64>,
        inv_mass: f64,
        inv_inertia: Matrix3<f64>,
        fixed: bool,
    ) -> Self {
        Self {
            position: pose.position,
            rotation: pose.rotation,
            velocity,
            omega,
            inv_mass: if fixed { 0.0 } else { inv_mass },
            inv_inertia: if fixed { Matrix3::zeros() } else { inv_inertia },
            delta_velocity: Vector3::zeros(),
            delta_omega: Vector3::zeros(),
            fixed,
        }
    }

    /// A fixed-body working state at the given pose.
    #[must_use]
    pub fn fixed_at(pose: &Pose) -> Self {
        Self::new(
            pose,
            Vector3::zeros(),
            Vector3::zeros(),
            0.0,
            Matrix3::zeros(),
            true,
        )
    }

    /// Current linear velocity including accumulated deltas.
    #[must_use]
    pub fn total_velocity(&self) -> Vector3<f64> {
        self.velocity + self.delta_velocity
    }

    /// Current angular velocity including accumulated deltas.
    #[must_use]
    pub fn total_omega(&self) -> Vector3<f64> {
        self.omega + self.delta_omega
    }

    /// Whether the accumulated deltas are finite.
    #[must_use]
    pub fn deltas_finite(&self) -> bool {
        self.delta_velocity.iter().all(|x| x.is_finite())
            && self.delta_omega.iter().all(|x| x.is_finite())
    }
}

/// Friction-style bound coupling: the row's bounds are `+-scale` times
/// the live multiplier of another row (its normal row).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoupledBound {
    /// Index of the coupled (normal) row within the island's row list.
    pub row: usize,
    /// Bound scale, typically the friction coefficient.
    pub scale: f64,
}

/// One scalar complementarity row.
#[derive(Debug, Clone)]
pub struct ConstraintRow {
    /// Island slot of the first body.
    pub body1: usize,
    /// Island slot of the second body.
    pub body2: usize,

    /// Jacobian, linear block of body 1.
    pub j1_lin: Vector3<f64>,
    /// Jacobian, angular block of body 1.
    pub j1_ang: Vector3<f64>,
    /// Jacobian, linear block of body 2.
    pub j2_lin: Vector3<f64>,
    /// Jacobian, angular block of body 2.
    pub j2_ang: Vector3<f64>,

    /// Mass-weighted Jacobian, linear block of body 1 (`M1^-1 j1_lin`).
    pub w1_lin: Vector3<f64>,
    /// Mass-weighted Jacobian, angular block of body 1.
    pub w1_ang: Vector3<f64>,
    /// Mass-weighted Jacobian, linear block of body 2.
    pub w2_lin: Vector3<f64>,
    /// Mass-weighted Jacobian, angular block of body 2.
    pub w2_ang: Vector3<f64>,

    /// Lower multiplier bound.
    pub lo: f64,
    /// Upper multiplier bound.
    pub hi: f64,
    /// Bound coupling for friction rows.
    pub coupled: Option<CoupledBound>,

    /// `J M^-1 J^T` diagonal entry (epsilon-biased, always positive).
    pub diagonal: f64,
    /// Target constraint velocity, including stabilization terms.
    pub rhs: f64,
    /// Current multiplier (warm-started from the previous tick).
    pub lambda: f64,
}

impl ConstraintRow {
    /// Build a row from its Jacobian blocks, computing the mass-weighted
    /// blocks and diagonal from the two bodies.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        body1: usize,
        body2: usize,
        bodies: &[SolverBody],
        j1_lin: Vector3<f64>,
        j1_ang: Vector3<f64>,
        j2_lin: Vector3<f64>,
        j2_ang: Vector3<f64>,
        lo: f64,
        hi: f64,
        rhs: f64,
    ) -> Self {
        let b1 = &bodies[body1];
        let b2 = &bodies[body2];

        let w1_lin = j1_lin * b1.inv_mass;
        let w1_ang = b1.inv_inertia * j1_ang;
        let w2_lin = j2_lin * b2.inv_mass;
        let w2_ang = b2.inv_inertia * j2_ang;

        let diagonal = j1_lin.dot(&w1_lin)
            + j1_ang.dot(&w1_ang)
            + j2_lin.dot(&w2_lin)
            + j2_ang.dot(&w2_ang);

        Self {
            body1,
            body2,
            j1_lin,
            j1_ang,
            j2_lin,
            j2_ang,
            w1_lin,
            w1_ang,
            w2_lin,
            w2_ang,
            lo,
            hi,
            coupled: None,
            diagonal: diagonal.max(DIAGONAL_EPSILON),
            rhs,
            lambda: 0.0,
        }
    }

    /// Attach a friction-style bound coupling.
    #[must_use]
    pub fn with_coupling(mut self, row: usize, scale: f64) -> Self {
        self.coupled = Some(CoupledBound { row, scale });
        self
    }

    /// Seed the warm-start multiplier.
    #[must_use]
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Current constraint velocity `J v` including accumulated deltas.
    #[must_use]
    pub fn measure(&self, bodies: &[SolverBody]) -> f64 {
        let b1 = &bodies[self.body1];
        let b2 = &bodies[self.body2];
        self.j1_lin.dot(&b1.total_velocity())
            + self.j1_ang.dot(&b1.total_omega())
            + self.j2_lin.dot(&b2.total_velocity())
            + self.j2_ang.dot(&b2.total_omega())
    }

    /// Effective bounds given the current multipliers of all rows.
    #[must_use]
    pub fn bounds(&self, lambdas: &[f64]) -> (f64, f64) {
        match self.coupled {
            Some(coupled) => {
                let limit = (coupled.scale * lambdas[coupled.row]).abs();
                (-limit, limit)
            }
            None => (self.lo, self.hi),
        }
    }

    /// Scatter a multiplier change into both bodies' delta accumulators.
    pub fn apply(&self, bodies: &mut [SolverBody], delta_lambda: f64) {
        if delta_lambda == 0.0 {
            return;
        }
        let b1 = &mut bodies[self.body1];
        b1.delta_velocity += self.w1_lin * delta_lambda;
        b1.delta_omega += self.w1_ang * delta_lambda;
        let b2 = &mut bodies[self.body2];
        b2.delta_velocity += self.w2_lin * delta_lambda;
        b2.delta_omega += self.w2_ang * delta_lambda;
    }
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
    use approx::assert_relative_eq;

    fn dynamic_body() -> SolverBody {
        SolverBody::new(
            &Pose::identity(),
            Vector3::zeros(),
            Vector3::zeros(),
            1.0,
            Matrix3::identity(),
            false,
        )
    }

    #[test]
    fn test_fixed_body_contributes_nothing() {
        let bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        let row = ConstraintRow::new(
            0,
            1,
            &bodies,
            Vector3::z(),
            Vector3::zeros(),
            -Vector3::z(),
            Vector3::zeros(),
            0.0,
            f64::INFINITY,
            0.0,
        );

        assert_eq!(row.w1_lin, Vector3::zeros());
        // Diagonal comes entirely from the dynamic body
        assert_relative_eq!(row.diagonal, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_diagonal_is_biased() {
        let bodies = vec![
            SolverBody::fixed_at(&Pose::identity()),
            SolverBody::fixed_at(&Pose::identity()),
        ];
        let row = ConstraintRow::new(
            0,
            1,
            &bodies,
            Vector3::z(),
            Vector3::zeros(),
            -Vector3::z(),
            Vector3::zeros(),
            0.0,
            f64::INFINITY,
            0.0,
        );
        assert!(row.diagonal > 0.0);
    }

    #[test]
    fn test_apply_scatters_equal_and_opposite() {
        let mut bodies = vec![dynamic_body(), dynamic_body()];
        let row = ConstraintRow::new(
            0,
            1,
            &bodies,
            -Vector3::z(),
            Vector3::zeros(),
            Vector3::z(),
            Vector3::zeros(),
            0.0,
            f64::INFINITY,
            0.0,
        );

        row.apply(&mut bodies, 2.0);
        assert_relative_eq!(bodies[0].delta_velocity.z, -2.0, epsilon = 1e-12);
        assert_relative_eq!(bodies[1].delta_velocity.z, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_coupled_bounds_follow_normal_lambda() {
        let bodies = vec![dynamic_body(), dynamic_body()];
        let row = ConstraintRow::new(
            0,
            1,
            &bodies,
            Vector3::x(),
            Vector3::zeros(),
            -Vector3::x(),
            Vector3::zeros(),
            0.0,
            0.0,
            0.0,
        )
        .with_coupling(0, 0.5);

        let lambdas = vec![4.0];
        assert_eq!(row.bounds(&lambdas), (-2.0, 2.0));
    }

    #[test]
    fn test_measure_includes_deltas() {
        let mut bodies = vec![dynamic_body(), dynamic_body()];
        bodies[1].velocity = Vector3::new(0.0, 0.0, -1.0);
        bodies[1].delta_velocity = Vector3::new(0.0, 0.0, 0.25);

        let row = ConstraintRow::new(
            0,
            1,
            &bodies,
            -Vector3::z(),
            Vector3::zeros(),
            Vector3::z(),
            Vector3::zeros(),
            0.0,
            f64::INFINITY,
            0.0,
        );
        assert_relative_eq!(row.measure(&bodies), -0.75, epsilon = 1e-12);
    }
}
