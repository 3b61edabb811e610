//! Specialized box-box contact generation via the separating axis theorem.
//!
//! Generic GJK/EPA is numerically unstable for flush box-on-box contact
//! (the Minkowski boundary is flat exactly where EPA needs curvature), so
//! box pairs always take this exact path.
//!
//! Fifteen candidate axes are tested: the three face normals of each box
//! and the nine pairwise edge cross products. The axis with the least
//! overlap wins, with two refinements:
//!
//! - near-degenerate cross products (nearly parallel edges) are skipped,
//!   which snaps the choice to a parent face axis;
//! - a face axis is preferred over an edge axis whenever any vertex of
//!   either box lies inside the other, avoiding the edge/face ambiguity
//!   near flush contacts.
//!
//! Face cases clip the incident face polygon against the reference face
//! rectangle and emit up to eight points with individual depths; edge
//! cases emit the single closest-points-between-segments contact.

use islet_types::Pose;
use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;

use crate::shape::Contact;

const PARALLEL_EPSILON: f64 = 1e-10;
const AXIS_TIE_EPSILON: f64 = 1e-9;
const CONTAINMENT_SLACK: f64 = 1e-9;

type ClipBuffer = SmallVec<[Point3<f64>; 8]>;

struct BoxFrame {
    center: Point3<f64>,
    axes: [Vector3<f64>; 3],
    half: Vector3<f64>,
}

impl BoxFrame {
    fn new(half_extents: &Vector3<f64>, pose: &Pose) -> Self {
        Self {
            center: pose.position,
            axes: [
                pose.transform_vector(&Vector3::x()),
                pose.transform_vector(&Vector3::y()),
                pose.transform_vector(&Vector3::z()),
            ],
            half: *half_extents,
        }
    }

    /// Projection radius onto a world axis.
    fn radius(&self, axis: &Vector3<f64>) -> f64 {
        self.half.x * self.axes[0].dot(axis).abs()
            + self.half.y * self.axes[1].dot(axis).abs()
            + self.half.z * self.axes[2].dot(axis).abs()
    }

    fn corner(&self, sx: f64, sy: f64, sz: f64) -> Point3<f64> {
        self.center
            + self.axes[0] * (sx * self.half.x)
            + self.axes[1] * (sy * self.half.y)
            + self.axes[2] * (sz * self.half.z)
    }

    fn corners(&self) -> [Point3<f64>; 8] {
        let mut out = [Point3::origin(); 8];
        let mut i = 0;
        for &sx in &[-1.0, 1.0] {
            for &sy in &[-1.0, 1.0] {
                for &sz in &[-1.0, 1.0] {
                    out[i] = self.corner(sx, sy, sz);
                    i += 1;
                }
            }
        }
        out
    }

    fn contains(&self, point: &Point3<f64>) -> bool {
        let d = point - self.center;
        (0..3).all(|i| d.dot(&self.axes[i]).abs() <= self.half[i] + CONTAINMENT_SLACK)
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    FaceA(usize),
    FaceB(usize),
    Edge(usize, usize),
}

/// Generate contacts between two boxes.
///
/// `shell` is the combined collision envelope; contacts are generated
/// while the separation along the chosen axis is below it, with depth
/// `shell - separation` per point.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn collide_boxes(
    half_a: &Vector3<f64>,
    pose_a: &Pose,
    half_b: &Vector3<f64>,
    pose_b: &Pose,
    shell: f64,
) -> Vec<Contact> {
    let a = BoxFrame::new(half_a, pose_a);
    let b = BoxFrame::new(half_b, pose_b);
    let t = b.center - a.center;

    let mut best_face: Option<(f64, Axis)> = None;
    let mut best_edge: Option<(f64, Axis)> = None;

    // Face axes of A and B
    for i in 0..3 {
        for (axis, which) in [(a.axes[i], Axis::FaceA(i)), (b.axes[i], Axis::FaceB(i))] {
            let separation = t.dot(&axis).abs() - (a.radius(&axis) + b.radius(&axis));
            if separation > shell {
                return Vec::new();
            }
            if best_face.map_or(true, |(s, _)| separation > s + AXIS_TIE_EPSILON) {
                best_face = Some((separation, which));
            }
        }
    }

    // Edge cross-product axes; near-parallel pairs collapse onto a parent
    // face axis and are skipped here.
    for i in 0..3 {
        for j in 0..3 {
            let cross = a.axes[i].cross(&b.axes[j]);
            let norm_sq = cross.norm_squared();
            if norm_sq < PARALLEL_EPSILON {
                continue;
            }
            let axis = cross / norm_sq.sqrt();
            let separation = t.dot(&axis).abs() - (a.radius(&axis) + b.radius(&axis));
            if separation > shell {
                return Vec::new();
            }
            if best_edge.map_or(true, |(s, _)| separation > s + AXIS_TIE_EPSILON) {
                best_edge = Some((separation, Axis::Edge(i, j)));
            }
        }
    }

    let Some((face_separation, face_axis)) = best_face else {
        return Vec::new();
    };

    // Face/edge ambiguity near flush contact: whenever a vertex of either
    // box interpenetrates the other, the face axis is authoritative.
    let use_edge = match best_edge {
        Some((edge_separation, _)) if edge_separation > face_separation + AXIS_TIE_EPSILON => {
            let vertex_inside = b.corners().iter().any(|c| a.contains(c))
                || a.corners().iter().any(|c| b.contains(c));
            !vertex_inside
        }
        _ => false,
    };

    if use_edge {
        if let Some((_, Axis::Edge(i, j))) = best_edge {
            return edge_contact(&a, &b, &t, i, j, shell);
        }
    }

    match face_axis {
        Axis::FaceA(i) => face_contacts(&a, &b, &t, i, false, shell),
        Axis::FaceB(i) => face_contacts(&b, &a, &(-t), i, true, shell),
        Axis::Edge(..) => Vec::new(),
    }
}

/// Clip the incident face of `other` against the reference face of `reference`.
///
/// `flipped` is true when `reference` is box B, in which case the contact
/// normal (A toward B) is the reverse of the reference face normal.
fn face_contacts(
    reference: &BoxFrame,
    other: &BoxFrame,
    t: &Vector3<f64>,
    ref_axis: usize,
    flipped: bool,
    shell: f64,
) -> Vec<Contact> {
    let sign = if t.dot(&reference.axes[ref_axis]) >= 0.0 {
        1.0
    } else {
        -1.0
    };
    let normal = reference.axes[ref_axis] * sign;

    // Incident face: the face of `other` whose outward normal is most
    // anti-parallel to the reference normal
    let mut incident_axis = 0;
    let mut best_abs = -1.0;
    for i in 0..3 {
        let abs = other.axes[i].dot(&normal).abs();
        if abs > best_abs {
            best_abs = abs;
            incident_axis = i;
        }
    }
    let incident_sign = if other.axes[incident_axis].dot(&normal) <= 0.0 {
        1.0
    } else {
        -1.0
    };

    // Corners of the incident face, ordered around the polygon
    let (k, l) = other_axes(incident_axis);
    let face_center =
        other.center + other.axes[incident_axis] * (incident_sign * other.half[incident_axis]);
    let ek = other.axes[k] * other.half[k];
    let el = other.axes[l] * other.half[l];
    let mut polygon: ClipBuffer = SmallVec::new();
    polygon.push(face_center + ek + el);
    polygon.push(face_center - ek + el);
    polygon.push(face_center - ek - el);
    polygon.push(face_center + ek - el);

    // Clip against the four side planes of the reference face
    let (m, n) = other_axes(ref_axis);
    for &side in &[m, n] {
        let axis = reference.axes[side];
        let offset = axis.dot(&reference.center.coords);
        polygon = clip_half_space(&polygon, &axis, offset + reference.half[side]);
        polygon = clip_half_space(&polygon, &(-axis), -(offset - reference.half[side]));
        if polygon.is_empty() {
            return Vec::new();
        }
    }

    // Emit points within the shell, measured against the reference plane
    let face_offset = normal.dot(&reference.center.coords) + reference.half[ref_axis];
    let mut contacts = Vec::with_capacity(polygon.len());
    for q in polygon {
        let separation = normal.dot(&q.coords) - face_offset;
        if separation > shell + AXIS_TIE_EPSILON {
            continue;
        }
        let on_reference = q - normal * separation;
        let depth = (shell - separation).max(0.0);
        let contact = Contact {
            point_a: on_reference,
            point_b: q,
            normal,
            depth,
        };
        contacts.push(if flipped { contact.flip() } else { contact });
    }
    contacts
}

/// Single contact from the closest points between the two active edges.
fn edge_contact(
    a: &BoxFrame,
    b: &BoxFrame,
    t: &Vector3<f64>,
    edge_a: usize,
    edge_b: usize,
    shell: f64,
) -> Vec<Contact> {
    let mut normal = a.axes[edge_a].cross(&b.axes[edge_b]);
    let norm = normal.norm();
    if norm < PARALLEL_EPSILON {
        return Vec::new();
    }
    normal /= norm;
    // Orient from A toward B
    if normal.dot(t) < 0.0 {
        normal = -normal;
    }

    // Supporting edge midpoints: walk each box's non-edge axes outward
    let mut pa = a.center;
    for i in 0..3 {
        if i != edge_a {
            let s = if a.axes[i].dot(&normal) >= 0.0 { 1.0 } else { -1.0 };
            pa += a.axes[i] * (s * a.half[i]);
        }
    }
    let mut pb = b.center;
    for i in 0..3 {
        if i != edge_b {
            let s = if b.axes[i].dot(&normal) >= 0.0 { -1.0 } else { 1.0 };
            pb += b.axes[i] * (s * b.half[i]);
        }
    }

    // Closest points between the two edge lines
    let d1 = a.axes[edge_a];
    let d2 = b.axes[edge_b];
    let r = pa - pb;
    let a11 = d1.dot(&d1);
    let a12 = d1.dot(&d2);
    let a22 = d2.dot(&d2);
    let c1 = d1.dot(&r);
    let c2 = d2.dot(&r);
    let denom = a11 * a22 - a12 * a12;
    if denom.abs() < PARALLEL_EPSILON {
        return Vec::new();
    }
    let s = ((a12 * c2 - a22 * c1) / denom).clamp(-a.half[edge_a], a.half[edge_a]);
    let u = ((a11 * c2 - a12 * c1) / denom).clamp(-b.half[edge_b], b.half[edge_b]);

    let point_a = pa + d1 * s;
    let point_b = pb + d2 * u;
    let separation = normal.dot(&(point_b - point_a));
    if separation > shell + AXIS_TIE_EPSILON {
        return Vec::new();
    }

    vec![Contact {
        point_a,
        point_b,
        normal,
        depth: (shell - separation).max(0.0),
    }]
}

/// The two axis indices other than `axis`.
fn other_axes(axis: usize) -> (usize, usize) {
    match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}

/// Sutherland-Hodgman clip of a polygon against `q . axis <= offset`.
fn clip_half_space(polygon: &ClipBuffer, axis: &Vector3<f64>, offset: f64) -> ClipBuffer {
    let mut out: ClipBuffer = SmallVec::new();
    let n = polygon.len();
    for i in 0..n {
        let current = polygon[i];
        let next = polygon[(i + 1) % n];
        let d_current = axis.dot(&current.coords) - offset;
        let d_next = axis.dot(&next.coords) - offset;

        if d_current <= CONTAINMENT_SLACK {
            out.push(current);
        }
        if (d_current < -CONTAINMENT_SLACK && d_next > CONTAINMENT_SLACK)
            || (d_current > CONTAINMENT_SLACK && d_next < -CONTAINMENT_SLACK)
        {
            let t = d_current / (d_current - d_next);
            out.push(current + (next - current) * t);
        }
    }
    out
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
    use islet_types::UnitQuaternion;

    fn unit_half() -> Vector3<f64> {
        Vector3::new(0.5, 0.5, 0.5)
    }

    #[test]
    fn test_flush_faces_within_shell_give_four_corner_points() {
        // Two unit boxes, B translated +1.5 along Y, envelopes 0.25 each:
        // gap 0.5 equals the shell, so four points with depth ~0 at the
        // midplane y = 0.75.
        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(0.0, 1.5, 0.0));

        let contacts = collide_boxes(&unit_half(), &pose_a, &unit_half(), &pose_b, 0.5);
        assert_eq!(contacts.len(), 4);

        let mut expected: Vec<(f64, f64)> =
            vec![(0.5, 0.5), (0.5, -0.5), (-0.5, 0.5), (-0.5, -0.5)];
        for contact in &contacts {
            assert_relative_eq!(contact.depth, 0.0, epsilon = 1e-9);
            let mid = contact.midpoint();
            assert_relative_eq!(mid.y, 0.75, epsilon = 1e-9);
            assert!(contact.normal.y > 0.99);

            let position = (mid.x, mid.z);
            let found = expected
                .iter()
                .position(|(x, z)| (x - position.0).abs() < 1e-9 && (z - position.1).abs() < 1e-9);
            let index = found.expect("unexpected contact position");
            expected.remove(index);
        }
        assert!(expected.is_empty(), "all four corners should be covered");
    }

    #[test]
    fn test_separated_beyond_shell_gives_nothing() {
        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(0.0, 2.0, 0.0));

        let contacts = collide_boxes(&unit_half(), &pose_a, &unit_half(), &pose_b, 0.5);
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_penetrating_stack_depths() {
        // B overlaps A by 0.1 along Z
        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(0.0, 0.0, 0.9));

        let contacts = collide_boxes(&unit_half(), &pose_a, &unit_half(), &pose_b, 0.2);
        assert_eq!(contacts.len(), 4);
        for contact in &contacts {
            // separation -0.1, shell 0.2: depth 0.3
            assert_relative_eq!(contact.depth, 0.3, epsilon = 1e-9);
            assert!(contact.normal.z > 0.99);
        }
    }

    #[test]
    fn test_offset_overlap_clips_to_smaller_patch() {
        // B shifted half a box sideways: the clipped patch spans the
        // overlapping half in X
        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(0.5, 0.0, 0.95));

        let contacts = collide_boxes(&unit_half(), &pose_a, &unit_half(), &pose_b, 0.1);
        assert!(!contacts.is_empty());
        for contact in &contacts {
            let mid = contact.midpoint();
            assert!(mid.x >= -0.01 && mid.x <= 0.51, "x = {}", mid.x);
        }
    }

    #[test]
    fn test_edge_edge_contact() {
        // A rotated 45 degrees about X (top edge along X at z ~ 0.707),
        // B rotated 45 degrees about Y (bottom edge along Y) placed above:
        // the crossed edges penetrate ~0.014 and the Z edge axis wins.
        let rot_a = UnitQuaternion::from_euler_angles(std::f64::consts::FRAC_PI_4, 0.0, 0.0);
        let rot_b = UnitQuaternion::from_euler_angles(0.0, std::f64::consts::FRAC_PI_4, 0.0);
        let pose_a = Pose::from_position_rotation(Point3::origin(), rot_a);
        let pose_b = Pose::from_position_rotation(Point3::new(0.0, 0.0, 1.4), rot_b);

        let contacts = collide_boxes(&unit_half(), &pose_a, &unit_half(), &pose_b, 0.1);
        assert_eq!(contacts.len(), 1, "edge case emits a single point");

        let contact = &contacts[0];
        assert!(contact.normal.z > 0.99, "normal {:?}", contact.normal);
        // separation ~ -0.014 against a 0.1 shell
        assert_relative_eq!(contact.depth, 0.114, epsilon = 0.01);
        // The crossing happens near the origin column
        assert!(contact.midpoint().x.abs() < 0.05);
        assert!(contact.midpoint().y.abs() < 0.05);
    }

    #[test]
    fn test_rotated_45_face_contact_prefers_face() {
        // B rotated 45 degrees about Z resting on top of A: vertex of the
        // rotated box is inside A's column, so the face axis must win and
        // the normal must be +Z.
        let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_4);
        let pose_a = Pose::identity();
        let pose_b = Pose::from_position_rotation(Point3::new(0.0, 0.0, 0.95), rotation);

        let contacts = collide_boxes(&unit_half(), &pose_a, &unit_half(), &pose_b, 0.1);
        assert!(!contacts.is_empty());
        for contact in &contacts {
            assert!(
                contact.normal.z > 0.99,
                "face normal expected, got {:?}",
                contact.normal
            );
        }
    }

    #[test]
    fn test_symmetry_under_argument_swap() {
        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(0.0, 0.0, 0.9));

        let forward = collide_boxes(&unit_half(), &pose_a, &unit_half(), &pose_b, 0.2);
        let backward = collide_boxes(&unit_half(), &pose_b, &unit_half(), &pose_a, 0.2);

        assert_eq!(forward.len(), backward.len());
        // Normals should be exactly opposite
        assert_relative_eq!(forward[0].normal.z, 1.0, epsilon = 1e-9);
        assert_relative_eq!(backward[0].normal.z, -1.0, epsilon = 1e-9);
    }
}
