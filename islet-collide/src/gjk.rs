//! GJK (Gilbert-Johnson-Keerthi) distance queries.
//!
//! GJK works in Minkowski space: the set `A - B` contains the origin
//! exactly when the shapes overlap, and the distance from the origin to
//! that set is the separation distance. The algorithm iteratively refines
//! a simplex (1-4 points) of support-mapping samples; each iteration
//! computes the point of the simplex closest to the origin, reduces the
//! simplex to the supporting feature, and samples a new support point
//! toward the origin until either the improvement drops below tolerance
//! (separated - the witness points realize the distance) or a tetrahedron
//! encloses the origin (penetrating - EPA takes over from the terminal
//! simplex).
//!
//! # References
//!
//! - Gilbert, Johnson, Keerthi: "A Fast Procedure for Computing the
//!   Distance Between Complex Objects in Three-Dimensional Space" (1988)
//! - Ericson: "Real-Time Collision Detection" (2005), closest-point
//!   simplex tests

use islet_types::Pose;
use nalgebra::{Point3, Vector3};

use crate::shape::{support, Shape};

/// Maximum iterations before the query gives up and reports separation
/// with the best simplex found.
const GJK_MAX_ITERATIONS: usize = 64;

/// Relative termination tolerance on the support improvement.
const REL_TOLERANCE: f64 = 1e-10;

/// Squared distance below which the origin counts as on the simplex.
const ABS_TOLERANCE_SQ: f64 = 1e-18;

/// A sample of the Minkowski difference with its originating supports.
#[derive(Debug, Clone, Copy)]
pub struct SupportPoint {
    /// The Minkowski-difference point (`support_a - support_b`).
    pub m: Vector3<f64>,
    /// Support point on shape A in world space.
    pub a: Point3<f64>,
    /// Support point on shape B in world space.
    pub b: Point3<f64>,
}

impl Default for SupportPoint {
    fn default() -> Self {
        Self {
            m: Vector3::zeros(),
            a: Point3::origin(),
            b: Point3::origin(),
        }
    }
}

/// The GJK simplex: 1-4 Minkowski points plus barycentric coordinates of
/// the closest point to the origin over the current feature.
#[derive(Debug, Clone, Default)]
pub struct Simplex {
    points: [SupportPoint; 4],
    bary: [f64; 4],
    len: usize,
}

impl Simplex {
    /// Number of points in the simplex.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the simplex is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The current points.
    #[must_use]
    pub fn points(&self) -> &[SupportPoint] {
        &self.points[..self.len]
    }

    fn push(&mut self, p: SupportPoint) {
        debug_assert!(self.len < 4);
        self.points[self.len] = p;
        self.len += 1;
    }

    fn set(&mut self, kept: &[(SupportPoint, f64)]) {
        self.len = kept.len().min(4);
        for (i, (p, w)) in kept.iter().take(4).enumerate() {
            self.points[i] = *p;
            self.bary[i] = *w;
        }
    }

    fn contains_close(&self, p: &SupportPoint) -> bool {
        self.points[..self.len]
            .iter()
            .any(|q| (q.m - p.m).norm_squared() < ABS_TOLERANCE_SQ)
    }

    /// Witness point on shape A from the current barycentrics.
    fn witness_a(&self) -> Point3<f64> {
        let mut acc = Vector3::zeros();
        for i in 0..self.len {
            acc += self.points[i].a.coords * self.bary[i];
        }
        Point3::from(acc)
    }

    /// Witness point on shape B from the current barycentrics.
    fn witness_b(&self) -> Point3<f64> {
        let mut acc = Vector3::zeros();
        for i in 0..self.len {
            acc += self.points[i].b.coords * self.bary[i];
        }
        Point3::from(acc)
    }
}

/// Result of a GJK distance query.
#[derive(Debug, Clone)]
pub enum GjkResult {
    /// The shapes are separated.
    Separated {
        /// Distance between the closest surface points.
        distance: f64,
        /// Closest point on shape A (world).
        point_a: Point3<f64>,
        /// Closest point on shape B (world).
        point_b: Point3<f64>,
    },
    /// The shapes overlap; the terminal simplex seeds EPA.
    Intersecting {
        /// The terminal simplex.
        simplex: Simplex,
    },
}

/// Sample the Minkowski difference `A - B` in a world direction.
pub(crate) fn support_minkowski(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    direction: &Vector3<f64>,
) -> SupportPoint {
    let a = support(shape_a, pose_a, direction);
    let b = support(shape_b, pose_b, &-direction);
    SupportPoint { m: a - b, a, b }
}

/// Compute the distance between two convex shapes, or detect overlap.
#[must_use]
pub fn gjk_distance(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
) -> GjkResult {
    let mut direction = pose_b.position - pose_a.position;
    if direction.norm_squared() < ABS_TOLERANCE_SQ {
        direction = Vector3::x();
    }

    let mut simplex = Simplex::default();
    simplex.push(support_minkowski(shape_a, pose_a, shape_b, pose_b, &direction));

    for _ in 0..GJK_MAX_ITERATIONS {
        let v = closest_point_and_reduce(&mut simplex);
        let dist_sq = v.norm_squared();

        // A full tetrahedron after reduction means the origin is enclosed
        if simplex.len() == 4 || dist_sq < ABS_TOLERANCE_SQ {
            return GjkResult::Intersecting { simplex };
        }

        let w = support_minkowski(shape_a, pose_a, shape_b, pose_b, &-v);

        // Support improvement: |v|^2 - v.w bounds the distance gap
        let progress = dist_sq - v.dot(&w.m);
        if progress <= REL_TOLERANCE * dist_sq || simplex.contains_close(&w) {
            return separated_result(&simplex, dist_sq.sqrt());
        }

        simplex.push(w);
    }

    let v = closest_point_and_reduce(&mut simplex);
    separated_result(&simplex, v.norm())
}

fn separated_result(simplex: &Simplex, distance: f64) -> GjkResult {
    GjkResult::Separated {
        distance,
        point_a: simplex.witness_a(),
        point_b: simplex.witness_b(),
    }
}

/// Closest point on the simplex to the origin; reduces the simplex to the
/// supporting feature and records its barycentric coordinates.
fn closest_point_and_reduce(simplex: &mut Simplex) -> Vector3<f64> {
    match simplex.len() {
        1 => {
            simplex.bary[0] = 1.0;
            simplex.points[0].m
        }
        2 => closest_on_segment(simplex),
        3 => closest_on_triangle(simplex),
        4 => closest_on_tetrahedron(simplex),
        _ => Vector3::zeros(),
    }
}

fn closest_on_segment(simplex: &mut Simplex) -> Vector3<f64> {
    let p = simplex.points[0];
    let q = simplex.points[1];
    let ab = q.m - p.m;
    let denom = ab.norm_squared();

    if denom < ABS_TOLERANCE_SQ {
        simplex.set(&[(p, 1.0)]);
        return p.m;
    }

    let t = -p.m.dot(&ab) / denom;
    if t <= 0.0 {
        simplex.set(&[(p, 1.0)]);
        p.m
    } else if t >= 1.0 {
        simplex.set(&[(q, 1.0)]);
        q.m
    } else {
        simplex.set(&[(p, 1.0 - t), (q, t)]);
        p.m + ab * t
    }
}

/// Ericson's closest-point-on-triangle, specialized to the origin.
#[allow(clippy::many_single_char_names, clippy::similar_names)]
fn closest_on_triangle(simplex: &mut Simplex) -> Vector3<f64> {
    let pa = simplex.points[0];
    let pb = simplex.points[1];
    let pc = simplex.points[2];
    let (a, b, c) = (pa.m, pb.m, pc.m);

    let ab = b - a;
    let ac = c - a;
    let ap = -a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        simplex.set(&[(pa, 1.0)]);
        return a;
    }

    let bp = -b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        simplex.set(&[(pb, 1.0)]);
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        simplex.set(&[(pa, 1.0 - t), (pb, t)]);
        return a + ab * t;
    }

    let cp = -c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        simplex.set(&[(pc, 1.0)]);
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        simplex.set(&[(pa, 1.0 - t), (pc, t)]);
        return a + ac * t;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        simplex.set(&[(pb, 1.0 - t), (pc, t)]);
        return b + (c - b) * t;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    simplex.set(&[(pa, 1.0 - v - w), (pb, v), (pc, w)]);
    a + ab * v + ac * w
}

fn closest_on_tetrahedron(simplex: &mut Simplex) -> Vector3<f64> {
    let pts = [
        simplex.points[0],
        simplex.points[1],
        simplex.points[2],
        simplex.points[3],
    ];

    // Faces paired with the excluded vertex
    let faces: [([usize; 3], usize); 4] = [
        ([0, 1, 2], 3),
        ([0, 1, 3], 2),
        ([0, 2, 3], 1),
        ([1, 2, 3], 0),
    ];

    let mut best: Option<(f64, Simplex, Vector3<f64>)> = None;
    let mut outside_any = false;

    for (face, excluded) in faces {
        let a = pts[face[0]].m;
        let n = (pts[face[1]].m - a).cross(&(pts[face[2]].m - a));
        let origin_side = (-a).dot(&n);
        let excluded_side = (pts[excluded].m - a).dot(&n);

        // Flat tetrahedra are treated as "outside" to force reduction
        let outside = origin_side * excluded_side < 0.0 || excluded_side.abs() < 1e-14;
        if !outside {
            continue;
        }
        outside_any = true;

        let mut candidate = Simplex::default();
        candidate.push(pts[face[0]]);
        candidate.push(pts[face[1]]);
        candidate.push(pts[face[2]]);
        let v = closest_on_triangle(&mut candidate);
        let d = v.norm_squared();

        if best.as_ref().map_or(true, |(bd, _, _)| d < *bd) {
            best = Some((d, candidate, v));
        }
    }

    if !outside_any {
        // Origin enclosed: keep the full tetrahedron for EPA
        return Vector3::zeros();
    }

    // Reduce to the best face's feature
    if let Some((_, reduced, v)) = best {
        *simplex = reduced;
        v
    } else {
        Vector3::zeros()
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

    fn pose_at(x: f64, y: f64, z: f64) -> Pose {
        Pose::from_position(Point3::new(x, y, z))
    }

    #[test]
    fn test_sphere_sphere_distance_matches_analytic() {
        let a = Shape::sphere(1.0);
        let b = Shape::sphere(1.0);

        match gjk_distance(&a, &pose_at(0.0, 0.0, 0.0), &b, &pose_at(3.0, 0.0, 0.0)) {
            GjkResult::Separated {
                distance,
                point_a,
                point_b,
            } => {
                assert_relative_eq!(distance, 1.0, epsilon = 1e-6);
                // Witness points realize the distance
                assert_relative_eq!(point_a.x, 1.0, epsilon = 1e-6);
                assert_relative_eq!(point_b.x, 2.0, epsilon = 1e-6);
                assert_relative_eq!((point_b - point_a).norm(), distance, epsilon = 1e-6);
            }
            GjkResult::Intersecting { .. } => panic!("spheres should be separated"),
        }
    }

    #[test]
    fn test_box_box_distance_matches_analytic() {
        let a = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));
        let b = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5));

        match gjk_distance(&a, &pose_at(0.0, 0.0, 0.0), &b, &pose_at(2.5, 0.0, 0.0)) {
            GjkResult::Separated { distance, .. } => {
                assert_relative_eq!(distance, 1.5, epsilon = 1e-6);
            }
            GjkResult::Intersecting { .. } => panic!("boxes should be separated"),
        }
    }

    #[test]
    fn test_sphere_box_distance() {
        let a = Shape::sphere(0.5);
        let b = Shape::box_shape(Vector3::new(1.0, 1.0, 1.0));

        // Sphere center 3 units above the box top face (z = 1)
        match gjk_distance(&a, &pose_at(0.0, 0.0, 4.0), &b, &pose_at(0.0, 0.0, 0.0)) {
            GjkResult::Separated { distance, .. } => {
                assert_relative_eq!(distance, 2.5, epsilon = 1e-6);
            }
            GjkResult::Intersecting { .. } => panic!("should be separated"),
        }
    }

    #[test]
    fn test_overlapping_spheres_detected() {
        let a = Shape::sphere(1.0);
        let b = Shape::sphere(1.0);

        match gjk_distance(&a, &pose_at(0.0, 0.0, 0.0), &b, &pose_at(1.5, 0.0, 0.0)) {
            GjkResult::Intersecting { .. } => {}
            GjkResult::Separated { distance, .. } => {
                panic!("spheres should intersect, got distance {distance}")
            }
        }
    }

    #[test]
    fn test_overlapping_boxes_detected() {
        let a = Shape::box_shape(Vector3::new(1.0, 1.0, 1.0));
        let b = Shape::box_shape(Vector3::new(1.0, 1.0, 1.0));

        match gjk_distance(&a, &pose_at(0.0, 0.0, 0.0), &b, &pose_at(1.0, 1.0, 1.0)) {
            GjkResult::Intersecting { .. } => {}
            GjkResult::Separated { .. } => panic!("boxes should intersect"),
        }
    }

    #[test]
    fn test_capsule_sphere_distance() {
        let a = Shape::capsule(1.0, 0.25);
        let b = Shape::sphere(0.5);

        // Sphere beside the capsule's cylindrical section
        match gjk_distance(&a, &pose_at(0.0, 0.0, 0.0), &b, &pose_at(2.0, 0.0, 0.0)) {
            GjkResult::Separated { distance, .. } => {
                assert_relative_eq!(distance, 1.25, epsilon = 1e-6);
            }
            GjkResult::Intersecting { .. } => panic!("should be separated"),
        }
    }

    #[test]
    fn test_hull_hull_distance() {
        let cube: Vec<Point3<f64>> = vec![
            Point3::new(-0.5, -0.5, -0.5),
            Point3::new(0.5, -0.5, -0.5),
            Point3::new(0.5, 0.5, -0.5),
            Point3::new(-0.5, 0.5, -0.5),
            Point3::new(-0.5, -0.5, 0.5),
            Point3::new(0.5, -0.5, 0.5),
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(-0.5, 0.5, 0.5),
        ];
        let a = Shape::convex_hull(cube.clone());
        let b = Shape::convex_hull(cube);

        match gjk_distance(&a, &pose_at(0.0, 0.0, 0.0), &b, &pose_at(0.0, 2.0, 0.0)) {
            GjkResult::Separated { distance, .. } => {
                assert_relative_eq!(distance, 1.0, epsilon = 1e-6);
            }
            GjkResult::Intersecting { .. } => panic!("should be separated"),
        }
    }

    #[test]
    fn test_coincident_centers_intersect() {
        let a = Shape::sphere(1.0);
        let b = Shape::sphere(0.5);

        match gjk_distance(&a, &pose_at(0.0, 0.0, 0.0), &b, &pose_at(0.0, 0.0, 0.0)) {
            GjkResult::Intersecting { .. } => {}
            GjkResult::Separated { .. } => panic!("coincident spheres should intersect"),
        }
    }
}
