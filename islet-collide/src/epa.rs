//! EPA (Expanding Polytope Algorithm) penetration queries.
//!
//! When GJK reports overlap, EPA expands a polytope over the Minkowski
//! difference boundary starting from the terminal simplex. The face
//! closest to the origin at convergence gives the minimum translation
//! vector: its outward normal is the contact normal and its distance the
//! penetration depth. Witness points on both shapes are recovered from
//! the barycentric coordinates of the origin's projection onto that face.

use islet_types::Pose;
use nalgebra::{Point3, Vector3};
use tracing::warn;

use crate::gjk::{support_minkowski, Simplex, SupportPoint};
use crate::shape::Shape;

const EPSILON: f64 = 1e-10;
const EPA_MAX_ITERATIONS: usize = 64;
const EPA_MAX_FACES: usize = 128;
const EPA_TOLERANCE: f64 = 1e-8;

/// Result of an EPA penetration query.
#[derive(Debug, Clone)]
pub struct EpaResult {
    /// Penetration depth (non-negative).
    pub depth: f64,
    /// Contact normal pointing from shape A toward shape B.
    pub normal: Vector3<f64>,
    /// Witness point on shape A (world).
    pub point_a: Point3<f64>,
    /// Witness point on shape B (world).
    pub point_b: Point3<f64>,
    /// Iterations used.
    pub iterations: usize,
}

/// A face of the expanding polytope.
#[derive(Debug, Clone, Copy)]
struct Face {
    vertices: [usize; 3],
    normal: Vector3<f64>,
    distance: f64,
}

/// Compute penetration depth and normal for overlapping shapes.
///
/// `simplex` is the terminal simplex from [`crate::gjk_distance`]. Returns
/// `None` only for degenerate configurations EPA cannot seed (for example
/// perfectly flat Minkowski differences); callers treat that as "no
/// contact this tick".
#[must_use]
pub fn epa_penetration(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    simplex: &Simplex,
) -> Option<EpaResult> {
    let mut vertices: Vec<SupportPoint> = simplex.points().to_vec();

    // EPA needs a tetrahedron; pad degenerate simplices with axis supports
    if vertices.len() < 4 {
        expand_to_tetrahedron(shape_a, pose_a, shape_b, pose_b, &mut vertices);
        if vertices.len() < 4 {
            warn!("EPA could not seed a tetrahedron; dropping contact");
            return None;
        }
    }

    let mut faces: Vec<Face> = Vec::with_capacity(EPA_MAX_FACES);
    for indices in [[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]] {
        if let Some(face) = make_face(&vertices, indices) {
            faces.push(face);
        }
    }
    if faces.is_empty() {
        return None;
    }
    orient_outward(&vertices, &mut faces);

    for iteration in 0..EPA_MAX_ITERATIONS {
        let closest_index = closest_face(&faces)?;
        let closest = faces[closest_index];

        let new_point =
            support_minkowski(shape_a, pose_a, shape_b, pose_b, &closest.normal);
        let new_distance = new_point.m.dot(&closest.normal);

        if new_distance - closest.distance < EPA_TOLERANCE {
            return Some(extract_result(&vertices, &closest, iteration));
        }

        let new_index = vertices.len();
        vertices.push(new_point);

        // Remove every face visible from the new point, keeping the
        // silhouette edges for re-triangulation.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        while i < faces.len() {
            let face = faces[i];
            let to_new = new_point.m - vertices[face.vertices[0]].m;
            if face.normal.dot(&to_new) > 0.0 {
                push_edge(&mut edges, face.vertices[0], face.vertices[1]);
                push_edge(&mut edges, face.vertices[1], face.vertices[2]);
                push_edge(&mut edges, face.vertices[2], face.vertices[0]);
                faces.swap_remove(i);
            } else {
                i += 1;
            }
        }

        for (v1, v2) in edges {
            if let Some(mut face) = make_face(&vertices, [new_index, v1, v2]) {
                // Keep normals outward: away from the polytope interior
                if face.distance < 0.0 {
                    face.normal = -face.normal;
                    face.distance = -face.distance;
                    face.vertices.swap(1, 2);
                }
                faces.push(face);
            }
        }

        if faces.len() > EPA_MAX_FACES {
            warn!("EPA face budget exhausted; using best face so far");
            break;
        }
        if faces.is_empty() {
            return None;
        }
    }

    let closest_index = closest_face(&faces)?;
    Some(extract_result(
        &vertices,
        &faces[closest_index],
        EPA_MAX_ITERATIONS,
    ))
}

/// Pad a sub-tetrahedral simplex with axis-direction supports.
fn expand_to_tetrahedron(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
    vertices: &mut Vec<SupportPoint>,
) {
    let directions = [
        Vector3::x(),
        Vector3::y(),
        Vector3::z(),
        -Vector3::x(),
        -Vector3::y(),
        -Vector3::z(),
    ];

    for dir in &directions {
        if vertices.len() >= 4 {
            break;
        }
        let candidate = support_minkowski(shape_a, pose_a, shape_b, pose_b, dir);
        let is_new = vertices
            .iter()
            .all(|v| (v.m - candidate.m).norm_squared() > EPSILON * EPSILON);
        if is_new {
            vertices.push(candidate);
        }
    }
}

fn make_face(vertices: &[SupportPoint], indices: [usize; 3]) -> Option<Face> {
    let a = vertices[indices[0]].m;
    let b = vertices[indices[1]].m;
    let c = vertices[indices[2]].m;

    let normal = (b - a).cross(&(c - a));
    let norm = normal.norm();
    if norm < EPSILON {
        return None;
    }
    let normal = normal / norm;
    Some(Face {
        vertices: indices,
        normal,
        distance: a.dot(&normal),
    })
}

/// Flip faces so every normal points away from the polytope centroid.
#[allow(clippy::cast_precision_loss)]
fn orient_outward(vertices: &[SupportPoint], faces: &mut [Face]) {
    let centroid: Vector3<f64> =
        vertices.iter().map(|v| v.m).sum::<Vector3<f64>>() / vertices.len() as f64;

    for face in faces.iter_mut() {
        let to_centroid = centroid - vertices[face.vertices[0]].m;
        if face.normal.dot(&to_centroid) > 0.0 {
            face.normal = -face.normal;
            face.distance = -face.distance;
            face.vertices.swap(1, 2);
        }
    }
}

fn closest_face(faces: &[Face]) -> Option<usize> {
    faces
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
}

/// Shared edges cancel; surviving edges form the silhouette.
fn push_edge(edges: &mut Vec<(usize, usize)>, v1: usize, v2: usize) {
    if let Some(index) = edges
        .iter()
        .position(|&(a, b)| (a == v2 && b == v1) || (a == v1 && b == v2))
    {
        edges.swap_remove(index);
    } else {
        edges.push((v1, v2));
    }
}

/// Recover depth, normal and witness points from the closest face.
fn extract_result(vertices: &[SupportPoint], face: &Face, iterations: usize) -> EpaResult {
    let a = &vertices[face.vertices[0]];
    let b = &vertices[face.vertices[1]];
    let c = &vertices[face.vertices[2]];

    // Project the origin onto the face plane and take barycentrics there
    let projection = face.normal * face.distance;
    let (u, v, w) = barycentric(&a.m, &b.m, &c.m, &projection);

    let point_a =
        Point3::from(a.a.coords * u + b.a.coords * v + c.a.coords * w);
    let point_b =
        Point3::from(a.b.coords * u + b.b.coords * v + c.b.coords * w);

    EpaResult {
        depth: face.distance.max(0.0),
        normal: face.normal,
        point_a,
        point_b,
        iterations,
    }
}

/// Barycentric coordinates of `p` in the triangle `(a, b, c)`, clamped to
/// the triangle when the projection falls marginally outside.
fn barycentric(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
    p: &Vector3<f64>,
) -> (f64, f64, f64) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < EPSILON {
        return (1.0, 0.0, 0.0);
    }

    let v = ((d11 * d20 - d01 * d21) / denom).clamp(0.0, 1.0);
    let w = ((d00 * d21 - d01 * d20) / denom).clamp(0.0, 1.0);
    let u = (1.0 - v - w).clamp(0.0, 1.0);
    let total = u + v + w;
    (u / total, v / total, w / total)
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
    use crate::gjk::{gjk_distance, GjkResult};
    use approx::assert_relative_eq;

    fn pose_at(x: f64, y: f64, z: f64) -> Pose {
        Pose::from_position(Point3::new(x, y, z))
    }

    fn penetrate(
        shape_a: &Shape,
        pose_a: &Pose,
        shape_b: &Shape,
        pose_b: &Pose,
    ) -> EpaResult {
        match gjk_distance(shape_a, pose_a, shape_b, pose_b) {
            GjkResult::Intersecting { simplex } => {
                epa_penetration(shape_a, pose_a, shape_b, pose_b, &simplex)
                    .expect("EPA should produce a result")
            }
            GjkResult::Separated { distance, .. } => {
                panic!("expected intersection, got distance {distance}")
            }
        }
    }

    #[test]
    fn test_epa_sphere_sphere_depth() {
        let a = Shape::sphere(1.0);
        let b = Shape::sphere(1.0);
        let pose_a = pose_at(0.0, 0.0, 0.0);
        let pose_b = pose_at(1.5, 0.0, 0.0);

        let result = penetrate(&a, &pose_a, &b, &pose_b);
        assert_relative_eq!(result.depth, 0.5, epsilon = 0.02);
        assert!(result.normal.x > 0.99, "normal should point from A to B");
    }

    #[test]
    fn test_epa_translation_resolves_overlap() {
        let a = Shape::sphere(1.0);
        let b = Shape::sphere(1.0);
        let pose_a = pose_at(0.0, 0.0, 0.0);
        let pose_b = pose_at(1.4, 0.3, 0.0);

        let result = penetrate(&a, &pose_a, &b, &pose_b);

        // Translating B along the normal by the depth separates the shapes
        let resolved_b = Pose::from_position(
            pose_b.position + result.normal * (result.depth + 1e-4),
        );
        match gjk_distance(&a, &pose_a, &b, &resolved_b) {
            GjkResult::Separated { distance, .. } => {
                assert!(distance < 0.05, "residual overlap after resolution");
            }
            GjkResult::Intersecting { .. } => {
                // Depth was slightly conservative: residual must be tiny.
                // Push a little further and require separation.
                let resolved_b = Pose::from_position(
                    pose_b.position + result.normal * (result.depth + 0.02),
                );
                assert!(matches!(
                    gjk_distance(&a, &pose_a, &b, &resolved_b),
                    GjkResult::Separated { .. }
                ));
            }
        }
    }

    #[test]
    fn test_epa_box_sphere_normal_direction() {
        let floor = Shape::box_shape(Vector3::new(10.0, 10.0, 0.5));
        let ball = Shape::sphere(0.5);

        // Ball resting slightly inside the floor's top surface (z = 0.5)
        let pose_floor = pose_at(0.0, 0.0, 0.0);
        let pose_ball = pose_at(0.0, 0.0, 0.9);

        let result = penetrate(&floor, &pose_floor, &ball, &pose_ball);
        // Normal from floor (A) toward ball (B): up
        assert!(result.normal.z > 0.99);
        assert_relative_eq!(result.depth, 0.1, epsilon = 0.02);
    }

    #[test]
    fn test_epa_witness_points_on_surfaces() {
        let a = Shape::sphere(1.0);
        let b = Shape::sphere(1.0);
        let pose_a = pose_at(0.0, 0.0, 0.0);
        let pose_b = pose_at(1.6, 0.0, 0.0);

        let result = penetrate(&a, &pose_a, &b, &pose_b);
        // Witness on A sits near its surface toward B, and vice versa
        assert_relative_eq!(result.point_a.x, 1.0, epsilon = 0.05);
        assert_relative_eq!(result.point_b.x, 0.6, epsilon = 0.05);
    }
}
