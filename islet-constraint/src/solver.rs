//! Island solve entry point and the shared merit function.

use islet_types::{Result, SimError, SolverConfig, SolverMethod};

use crate::nncg::solve_nncg;
use crate::pgs::solve_pgs;
use crate::row::{ConstraintRow, SolverBody};

/// Diagnostics from one island solve.
///
/// Non-convergence within the iteration budget is not an error: the best
/// multipliers observed are kept and the report says how good they were.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    /// Iterations actually used.
    pub iterations: usize,
    /// Final Fischer-Burmeister merit (0 at an exact solution).
    pub residual: f64,
    /// Whether the residual dropped below the configured tolerance.
    pub converged: bool,
}

impl SolveReport {
    /// An empty report for islands with no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            iterations: 0,
            residual: 0.0,
            converged: true,
        }
    }
}

/// The Fischer-Burmeister complementarity merit `0.5 * sum(phi^2)`.
///
/// Per row, `phi` reformulates the box complementarity between the
/// multiplier and the constraint-velocity error as a single equation that
/// is zero exactly at a solution:
///
/// - unbounded rows (bilateral joints): `phi = w - rhs`
/// - lower-bounded rows (contacts): `phi = fb(lambda - lo, w - rhs)`
/// - box rows (friction): nested `fb` over both bounds
///
/// where `fb(a, b) = sqrt(a^2 + b^2) - a - b`.
#[must_use]
pub fn merit(bodies: &[SolverBody], rows: &[ConstraintRow]) -> f64 {
    let lambdas: Vec<f64> = rows.iter().map(|r| r.lambda).collect();
    let mut sum = 0.0;

    for row in rows {
        let g = row.measure(bodies) - row.rhs;
        let (lo, hi) = row.bounds(&lambdas);

        let phi = if lo.is_infinite() && hi.is_infinite() {
            g
        } else if hi.is_infinite() {
            fb(row.lambda - lo, g)
        } else {
            fb(row.lambda - lo, fb(hi - row.lambda, -g))
        };
        sum += phi * phi;
    }
    0.5 * sum
}

fn fb(a: f64, b: f64) -> f64 {
    (a * a + b * b).sqrt() - a - b
}

/// Solve one island with the configured method.
///
/// Rows arrive with warm-started multipliers; this scatters them into the
/// body accumulators, runs the solver, and verifies that every
/// accumulator is finite afterward (a `NaN` here means the simulation
/// state is corrupt and must not continue).
pub fn solve_island(
    bodies: &mut [SolverBody],
    rows: &mut [ConstraintRow],
    config: &SolverConfig,
) -> Result<SolveReport> {
    if rows.is_empty() {
        return Ok(SolveReport::empty());
    }

    // Scatter warm-start impulses
    for row in rows.iter() {
        if row.lambda != 0.0 {
            row.apply(bodies, row.lambda);
        }
    }

    let report = match config.method {
        SolverMethod::Pgs => solve_pgs(bodies, rows, config.iterations, config.tolerance),
        SolverMethod::Nncg => solve_nncg(bodies, rows, config.iterations, config.tolerance),
    };

    for body in bodies.iter() {
        if !body.deltas_finite() {
            return Err(SimError::diverged(
                "non-finite delta velocity after island solve",
            ));
        }
    }

    Ok(report)
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

    fn contact_row(bodies: &[SolverBody], rhs: f64) -> ConstraintRow {
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
            rhs,
        )
    }

    #[test]
    fn test_merit_zero_at_solution() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        let mut rows = vec![contact_row(&bodies, 0.5)];

        let config = SolverConfig {
            iterations: 50,
            ..Default::default()
        };
        let report = solve_island(&mut bodies, &mut rows, &config).unwrap();
        assert!(report.converged);
        assert!(merit(&bodies, &rows) < 1e-9);
    }

    #[test]
    fn test_merit_positive_at_violation() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        // Approaching contact, multiplier still zero: violated
        bodies[1].velocity = Vector3::new(0.0, 0.0, -1.0);
        let rows = vec![contact_row(&bodies, 0.0)];
        assert!(merit(&bodies, &rows) > 0.1);
    }

    #[test]
    fn test_both_methods_agree_on_simple_contact() {
        for method in [SolverMethod::Pgs, SolverMethod::Nncg] {
            let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
            bodies[1].velocity = Vector3::new(0.0, 0.0, -2.0);
            let mut rows = vec![contact_row(&bodies, 0.0)];

            let config = SolverConfig {
                method,
                iterations: 50,
                ..Default::default()
            };
            let report = solve_island(&mut bodies, &mut rows, &config).unwrap();
            assert!(report.converged, "{method:?} should converge");
            approx::assert_relative_eq!(
                bodies[1].total_velocity().z,
                0.0,
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_nan_delta_is_fatal() {
        let mut bodies = vec![SolverBody::fixed_at(&Pose::identity()), dynamic_body()];
        bodies[1].delta_velocity.x = f64::NAN;
        let mut rows = vec![contact_row(&bodies, 0.0)];

        let err = solve_island(&mut bodies, &mut rows, &SolverConfig::default());
        assert!(err.is_err());
        assert!(err.unwrap_err().is_diverged());
    }
}
