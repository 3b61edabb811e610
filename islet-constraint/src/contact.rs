//! Contact constraint row generation.
//!
//! Each manifold point yields three rows: a unilateral normal row
//! (`lambda in [0, inf)`) and two friction rows whose bounds are coupled
//! to the normal row's live multiplier (`+-mu * lambda_n`, re-evaluated
//! on every solver visit). Row multipliers are warm-started from the
//! manifold's impulse cache and written back after the solve.

use islet_collide::ContactManifold;
use islet_types::SolverConfig;
use nalgebra::Vector3;

use crate::row::{ConstraintRow, SolverBody};

/// Build an orthonormal tangent basis for a contact normal.
#[must_use]
pub fn tangent_frame(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let reference = if normal.x.abs() <= normal.y.abs() && normal.x.abs() <= normal.z.abs() {
        Vector3::x()
    } else if normal.y.abs() <= normal.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };

    let t1 = normal.cross(&reference).normalize();
    let t2 = normal.cross(&t1);
    (t1, t2)
}

/// Generate the NCP rows for one contact manifold.
///
/// `slot_a`/`slot_b` are the island slots of the manifold's bodies and
/// `base_row` is the index the first generated row will occupy in the
/// island's row list (friction coupling indices are island-global).
#[must_use]
pub fn contact_rows(
    manifold: &ContactManifold,
    slot_a: usize,
    slot_b: usize,
    bodies: &[SolverBody],
    dt: f64,
    config: &SolverConfig,
    base_row: usize,
) -> Vec<ConstraintRow> {
    let mut rows = Vec::with_capacity(manifold.len() * 3);

    for (k, point) in manifold.points.iter().enumerate() {
        let p = point.midpoint();
        let r_a = p - bodies[slot_a].position;
        let r_b = p - bodies[slot_b].position;
        let n = point.normal;

        // Normal row: w = n . (v_b + w_b x r_b - v_a - w_a x r_a)
        let mut normal_row = ConstraintRow::new(
            slot_a,
            slot_b,
            bodies,
            -n,
            -r_a.cross(&n),
            n,
            r_b.cross(&n),
            0.0,
            f64::INFINITY,
            0.0,
        );

        // Signed stabilization: positive beyond the shell (push out),
        // negative inside it (admit a bounded approach speed), so bodies
        // settle through the envelope instead of hovering at its edge.
        let error = point.depth - manifold.shell;
        let stabilization = config.baumgarte * error / dt;

        let approach = normal_row.measure(bodies);
        let bounce = if manifold.restitution > 0.0 && approach < -config.restitution_threshold {
            -manifold.restitution * approach
        } else {
            f64::NEG_INFINITY
        };
        normal_row.rhs = stabilization.max(bounce);
        normal_row.lambda = point.lambda_n * config.warm_start_factor;
        rows.push(normal_row);

        // Two friction rows coupled to the normal multiplier
        let (t1, t2) = tangent_frame(&n);
        let normal_index = base_row + 3 * k;
        for (tangent, cached) in [(t1, point.lambda_t1), (t2, point.lambda_t2)] {
            let row = ConstraintRow::new(
                slot_a,
                slot_b,
                bodies,
                -tangent,
                -r_a.cross(&tangent),
                tangent,
                r_b.cross(&tangent),
                0.0,
                0.0,
                0.0,
            )
            .with_coupling(normal_index, manifold.friction)
            .with_lambda(cached * config.warm_start_factor);
            rows.push(row);
        }
    }

    rows
}

/// Write solved multipliers back into the manifold's impulse cache.
///
/// `rows` is the slice generated for this manifold by [`contact_rows`]
/// (three rows per point, in order).
pub fn store_contact_impulses(manifold: &mut ContactManifold, rows: &[ConstraintRow]) {
    for k in 0..manifold.len() {
        let i = 3 * k;
        if i + 2 < rows.len() {
            manifold.store_impulses(k, rows[i].lambda, rows[i + 1].lambda, rows[i + 2].lambda);
        }
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
    use crate::pgs::solve_pgs;
    use approx::assert_relative_eq;
    use islet_collide::Contact;
    use islet_types::{BodyId, Pose};
    use nalgebra::{Matrix3, Point3};

    fn floor_and_ball(ball_velocity: Vector3<f64>) -> Vec<SolverBody> {
        let ball = SolverBody::new(
            &Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
            ball_velocity,
            Vector3::zeros(),
            1.0,
            Matrix3::identity(),
            false,
        );
        vec![SolverBody::fixed_at(&Pose::identity()), ball]
    }

    fn resting_manifold(friction: f64, restitution: f64) -> ContactManifold {
        let mut manifold =
            ContactManifold::new(BodyId::new(1), BodyId::new(2), friction, restitution, 0.25);
        let contact = Contact {
            point_a: Point3::new(0.0, 0.0, 0.0),
            point_b: Point3::new(0.0, 0.0, 0.0),
            normal: Vector3::z(),
            depth: 0.25,
        };
        manifold.add_contact(
            &contact,
            &Pose::identity(),
            &Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        );
        manifold
    }

    #[test]
    fn test_tangent_frame_orthonormal() {
        for normal in [
            Vector3::z(),
            Vector3::x(),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
        ] {
            let (t1, t2) = tangent_frame(&normal);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t2.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&t2), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_three_rows_per_point() {
        let bodies = floor_and_ball(Vector3::zeros());
        let manifold = resting_manifold(0.5, 0.0);
        let rows = contact_rows(&manifold, 0, 1, &bodies, 1.0 / 60.0, &SolverConfig::default(), 0);

        assert_eq!(rows.len(), 3);
        assert!(rows[0].coupled.is_none());
        assert_eq!(rows[1].coupled.map(|c| c.row), Some(0));
        assert_eq!(rows[2].coupled.map(|c| c.row), Some(0));
    }

    #[test]
    fn test_resting_contact_no_stabilization_inside_shell() {
        // Depth equals the shell: touching the outer envelope, no push
        let bodies = floor_and_ball(Vector3::zeros());
        let manifold = resting_manifold(0.5, 0.0);
        let rows = contact_rows(&manifold, 0, 1, &bodies, 1.0 / 60.0, &SolverConfig::default(), 0);
        assert_relative_eq!(rows[0].rhs, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_near_contact_admits_bounded_approach() {
        // Depth below the shell: the target velocity is negative, letting
        // the body settle into the envelope at a bounded speed.
        let bodies = floor_and_ball(Vector3::zeros());
        let mut manifold = resting_manifold(0.5, 0.0);
        manifold.points[0].depth = manifold.shell - 0.15;

        let config = SolverConfig::default();
        let dt = 1.0 / 60.0;
        let rows = contact_rows(&manifold, 0, 1, &bodies, dt, &config, 0);
        assert_relative_eq!(rows[0].rhs, -config.baumgarte * 0.15 / dt, epsilon = 1e-12);
    }

    #[test]
    fn test_penetration_drives_stabilization() {
        let bodies = floor_and_ball(Vector3::zeros());
        let mut manifold = resting_manifold(0.5, 0.0);
        // Push the point into real interpenetration (beyond the shell)
        manifold.points[0].depth = manifold.shell + 0.1;

        let config = SolverConfig::default();
        let dt = 1.0 / 60.0;
        let rows = contact_rows(&manifold, 0, 1, &bodies, dt, &config, 0);
        assert_relative_eq!(rows[0].rhs, config.baumgarte * 0.1 / dt, epsilon = 1e-12);
    }

    #[test]
    fn test_restitution_on_fast_approach() {
        let bodies = floor_and_ball(Vector3::new(0.0, 0.0, -2.0));
        let manifold = resting_manifold(0.5, 0.5);
        let rows = contact_rows(&manifold, 0, 1, &bodies, 1.0 / 60.0, &SolverConfig::default(), 0);

        // Approach speed 2, restitution 0.5: target separation speed 1
        assert_relative_eq!(rows[0].rhs, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_impulse_round_trip_through_cache() {
        let mut bodies = floor_and_ball(Vector3::new(0.0, 0.0, -1.0));
        let mut manifold = resting_manifold(0.5, 0.0);
        let config = SolverConfig::default();

        let mut rows = contact_rows(&manifold, 0, 1, &bodies, 1.0 / 60.0, &config, 0);
        let _ = solve_pgs(&mut bodies, &mut rows, 30, 1e-9);
        store_contact_impulses(&mut manifold, &rows);

        assert!(manifold.points[0].lambda_n > 0.0);
        assert_relative_eq!(manifold.points[0].lambda_n, rows[0].lambda, epsilon = 1e-12);
    }
}
