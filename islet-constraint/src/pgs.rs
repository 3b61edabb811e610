//! Projected Gauss-Seidel, the baseline NCP solver.
//!
//! Each sweep visits every row once: the multiplier update
//! `delta = (rhs - J v) / diagonal` is projected into the row's current
//! bounds (friction bounds are recomputed from the coupled row's live
//! multiplier on every visit) and the change is scattered through the
//! mass-weighted Jacobian into both bodies' delta accumulators. The
//! iteration budget is fixed: no early exit, deterministic cost.

use tracing::trace;

use crate::row::{ConstraintRow, SolverBody};
use crate::solver::{merit, SolveReport};

/// Run one Gauss-Seidel sweep over all rows.
pub fn pgs_sweep(bodies: &mut [SolverBody], rows: &mut [ConstraintRow]) {
    // Live multipliers snapshot for coupled-bound lookups. Bounds read the
    // value updated earlier in this same sweep, which is what couples
    // friction to its normal row.
    for i in 0..rows.len() {
        let w = rows[i].measure(bodies);
        let raw = rows[i].lambda + (rows[i].rhs - w) / rows[i].diagonal;

        let (lo, hi) = match rows[i].coupled {
            Some(coupled) => {
                let limit = (coupled.scale * rows[coupled.row].lambda).abs();
                (-limit, limit)
            }
            None => (rows[i].lo, rows[i].hi),
        };
        let clamped = raw.clamp(lo, hi);
        let delta = clamped - rows[i].lambda;
        rows[i].lambda = clamped;
        rows[i].apply(bodies, delta);
    }
}

/// Solve an island with projected Gauss-Seidel.
///
/// Runs exactly `iterations` sweeps. Rows arrive warm-started (their
/// multipliers already scattered by the caller); the report's residual is
/// the Fischer-Burmeister merit after the final sweep.
pub fn solve_pgs(
    bodies: &mut [SolverBody],
    rows: &mut [ConstraintRow],
    iterations: usize,
    tolerance: f64,
) -> SolveReport {
    if rows.is_empty() {
        return SolveReport {
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    for _ in 0..iterations {
        pgs_sweep(bodies, rows);
    }

    let residual = merit(bodies, rows);
    trace!(iterations, residual, "pgs solve");
    SolveReport {
        iterations,
        residual,
        converged: residual <= tolerance,
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
    use islet_types::Pose;
    use nalgebra::{Matrix3, Vector3};

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

    /// A single unilateral row solved to convergence satisfies
    /// `lambda = max(0, rhs / diagonal)`.
    #[test]
    fn test_single_contact_row_closed_form() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        let mut rows = vec![ConstraintRow::new(
            0,
            1,
            &bodies,
            -Vector3::z(),
            Vector3::zeros(),
            Vector3::z(),
            Vector3::zeros(),
            0.0,
            f64::INFINITY,
            0.5,
        )];
        let diagonal = rows[0].diagonal;

        let report = solve_pgs(&mut bodies, &mut rows, 30, 1e-9);
        assert_relative_eq!(rows[0].lambda, 0.5 / diagonal, epsilon = 1e-9);
        assert!(report.converged);

        // Negative target projects to zero
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        let mut rows = vec![ConstraintRow::new(
            0,
            1,
            &bodies,
            -Vector3::z(),
            Vector3::zeros(),
            Vector3::z(),
            Vector3::zeros(),
            0.0,
            f64::INFINITY,
            -0.5,
        )];
        let _ = solve_pgs(&mut bodies, &mut rows, 30, 1e-9);
        assert_relative_eq!(rows[0].lambda, 0.0, epsilon = 1e-12);
    }

    /// An approaching body is stopped by the contact row.
    #[test]
    fn test_contact_stops_approach_velocity() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        bodies[1].velocity = Vector3::new(0.0, 0.0, -2.0);

        let mut rows = vec![ConstraintRow::new(
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
        )];

        let _ = solve_pgs(&mut bodies, &mut rows, 30, 1e-9);
        let final_vz = bodies[1].total_velocity().z;
        assert_relative_eq!(final_vz, 0.0, epsilon = 1e-9);
        assert!(rows[0].lambda > 0.0);
    }

    /// Warm-start idempotence: re-solving an unchanged system from the
    /// previous multipliers barely moves them.
    #[test]
    fn test_warm_start_idempotence() {
        let make = || {
            let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
            bodies[1].velocity = Vector3::new(0.0, 0.0, -1.0);
            bodies
        };
        let make_row = |bodies: &[SolverBody]| {
            ConstraintRow::new(
                0,
                1,
                bodies,
                -Vector3::z(),
                Vector3::zeros(),
                Vector3::z(),
                Vector3::zeros(),
                0.0,
                f64::INFINITY,
                0.0,
            )
        };

        let mut bodies = make();
        let mut rows = vec![make_row(&bodies)];
        let _ = solve_pgs(&mut bodies, &mut rows, 40, 1e-9);
        let lambda_first = rows[0].lambda;

        // Second solve: same system, warm-started with the previous
        // multiplier already applied to the body deltas.
        let mut bodies = make();
        let mut rows = vec![make_row(&bodies).with_lambda(lambda_first)];
        rows[0].apply(&mut bodies, lambda_first);
        let _ = solve_pgs(&mut bodies, &mut rows, 40, 1e-9);

        assert_relative_eq!(rows[0].lambda, lambda_first, epsilon = 1e-9);
    }

    /// Friction rows stay inside the cone of their live normal row.
    #[test]
    fn test_friction_clamped_to_cone() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        // Approaching at 1 m/s and sliding fast sideways
        bodies[1].velocity = Vector3::new(5.0, 0.0, -1.0);

        let normal = ConstraintRow::new(
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
        let friction = ConstraintRow::new(
            0,
            1,
            &bodies,
            -Vector3::x(),
            Vector3::zeros(),
            Vector3::x(),
            Vector3::zeros(),
            0.0,
            0.0,
            0.0,
        )
        .with_coupling(0, 0.5);

        let mut rows = vec![normal, friction];
        let _ = solve_pgs(&mut bodies, &mut rows, 50, 1e-9);

        let mu_times_n = 0.5 * rows[0].lambda;
        assert!(rows[1].lambda.abs() <= mu_times_n + 1e-9);
        // Sliding that fast saturates the cone
        assert_relative_eq!(rows[1].lambda.abs(), mu_times_n, epsilon = 1e-9);
        // Friction decelerates the slide without reversing it
        let vx = bodies[1].total_velocity().x;
        assert!(vx > 0.0 && vx < 5.0);
    }
}
