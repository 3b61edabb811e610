//! Persistent contact manifolds.
//!
//! A manifold holds up to four contact points for one geometry pair,
//! tracked across ticks through body-local anchors. Persistence buys two
//! things: cached impulses warm-start the solver (dropping them causes
//! visible jitter in resting stacks), and a stable 4-point footprint
//! approximates the true contact area.
//!
//! When a fifth point arrives, the replacement rule keeps the four points
//! whose quadrilateral spans the largest area: the incoming point replaces
//! whichever existing point's removal shrinks the area the least.

use islet_types::{BodyId, Pose};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::shape::Contact;

/// Maximum contact points per manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Squared distance under which an incoming point matches an existing one.
const MATCH_THRESHOLD_SQ: f64 = 0.02 * 0.02;

/// Tangential drift beyond which a persisted point is discarded.
const DRIFT_THRESHOLD_SQ: f64 = 0.04 * 0.04;

/// A persisted contact point.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifoldPoint {
    /// Anchor on body A, in body-A coordinates.
    pub local_a: Point3<f64>,
    /// Anchor on body B, in body-B coordinates.
    pub local_b: Point3<f64>,
    /// Witness point on A, world coordinates (refreshed each tick).
    pub world_a: Point3<f64>,
    /// Witness point on B, world coordinates (refreshed each tick).
    pub world_b: Point3<f64>,
    /// Contact normal, world, pointing from A toward B.
    pub normal: Vector3<f64>,
    /// Shell-adjusted depth (see crate docs).
    pub depth: f64,
    /// Cached normal impulse for warm starting.
    pub lambda_n: f64,
    /// Cached first tangent impulse.
    pub lambda_t1: f64,
    /// Cached second tangent impulse.
    pub lambda_t2: f64,
}

impl ManifoldPoint {
    fn from_contact(contact: &Contact, pose_a: &Pose, pose_b: &Pose) -> Self {
        Self {
            local_a: pose_a.inverse_transform_point(&contact.point_a),
            local_b: pose_b.inverse_transform_point(&contact.point_b),
            world_a: contact.point_a,
            world_b: contact.point_b,
            normal: contact.normal,
            depth: contact.depth,
            lambda_n: 0.0,
            lambda_t1: 0.0,
            lambda_t2: 0.0,
        }
    }

    /// World midpoint of the contact.
    #[must_use]
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.world_a, &self.world_b)
    }
}

/// Persistent contact manifold between two bodies.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactManifold {
    /// First body (the contact normal points away from it).
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Active points, at most [`MAX_MANIFOLD_POINTS`].
    pub points: Vec<ManifoldPoint>,
    /// Combined friction coefficient for the pair.
    pub friction: f64,
    /// Combined restitution coefficient for the pair.
    pub restitution: f64,
    /// Combined envelope shell for the pair.
    pub shell: f64,
}

impl ContactManifold {
    /// Create an empty manifold for a body pair.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, friction: f64, restitution: f64, shell: f64) -> Self {
        Self {
            body_a,
            body_b,
            points: Vec::with_capacity(MAX_MANIFOLD_POINTS),
            friction,
            restitution,
            shell,
        }
    }

    /// Number of active points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the manifold has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reproject persisted anchors through the current poses and drop
    /// points that drifted tangentially or separated beyond the shell.
    ///
    /// Call once per tick before feeding fresh narrow-phase contacts in.
    pub fn refresh(&mut self, pose_a: &Pose, pose_b: &Pose) {
        let shell = self.shell;
        self.points.retain_mut(|point| {
            point.world_a = pose_a.transform_point(&point.local_a);
            point.world_b = pose_b.transform_point(&point.local_b);

            let gap = point.normal.dot(&(point.world_b - point.world_a));
            if gap > shell {
                return false;
            }
            point.depth = shell - gap;

            // Tangential drift of the anchors relative to each other
            let offset = point.world_b - point.world_a;
            let tangential = offset - point.normal * gap;
            tangential.norm_squared() <= DRIFT_THRESHOLD_SQ
        });
    }

    /// Insert a fresh narrow-phase contact.
    ///
    /// A point matching an existing anchor inherits its cached impulses.
    /// When the manifold is full, the area-maximization rule decides which
    /// point the newcomer replaces (if any).
    pub fn add_contact(&mut self, contact: &Contact, pose_a: &Pose, pose_b: &Pose) {
        let mut incoming = ManifoldPoint::from_contact(contact, pose_a, pose_b);

        // Match against an existing point to preserve warm-start impulses
        let mut best: Option<(usize, f64)> = None;
        for (i, existing) in self.points.iter().enumerate() {
            let d = (existing.local_a - incoming.local_a).norm_squared();
            if d < MATCH_THRESHOLD_SQ && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }

        if let Some((index, _)) = best {
            incoming.lambda_n = self.points[index].lambda_n;
            incoming.lambda_t1 = self.points[index].lambda_t1;
            incoming.lambda_t2 = self.points[index].lambda_t2;
            self.points[index] = incoming;
            return;
        }

        if self.points.len() < MAX_MANIFOLD_POINTS {
            self.points.push(incoming);
            return;
        }

        // Full manifold: replace the point whose removal costs the least
        // area, provided the swap does not shrink the footprint.
        let current_area = quad_area(
            &self.points[0].midpoint(),
            &self.points[1].midpoint(),
            &self.points[2].midpoint(),
            &self.points[3].midpoint(),
        );

        let mut best_area = current_area;
        let mut replace: Option<usize> = None;
        let incoming_mid = incoming.midpoint();
        for skip in 0..MAX_MANIFOLD_POINTS {
            let mids: Vec<Point3<f64>> = (0..MAX_MANIFOLD_POINTS)
                .filter(|&i| i != skip)
                .map(|i| self.points[i].midpoint())
                .collect();
            let area = quad_area(&mids[0], &mids[1], &mids[2], &incoming_mid);
            if area > best_area {
                best_area = area;
                replace = Some(skip);
            }
        }

        if let Some(index) = replace {
            self.points[index] = incoming;
        }
    }

    /// Store solver impulses back into a point's cache.
    pub fn store_impulses(&mut self, index: usize, lambda_n: f64, lambda_t1: f64, lambda_t2: f64) {
        if let Some(point) = self.points.get_mut(index) {
            point.lambda_n = lambda_n;
            point.lambda_t1 = lambda_t1;
            point.lambda_t2 = lambda_t2;
        }
    }
}

/// Area of the quadrilateral spanned by four unordered coplanar-ish points.
///
/// Evaluates the three diagonal pairings and keeps the largest, which is
/// the convex ordering's area.
fn quad_area(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> f64 {
    let pairings = [
        (p1 - p0).cross(&(p3 - p2)),
        (p2 - p0).cross(&(p3 - p1)),
        (p3 - p0).cross(&(p2 - p1)),
    ];
    pairings
        .iter()
        .map(|c| 0.5 * c.norm())
        .fold(0.0, f64::max)
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

    fn contact_at(x: f64, y: f64, depth: f64) -> Contact {
        Contact {
            point_a: Point3::new(x, y, 0.0),
            point_b: Point3::new(x, y, -depth),
            normal: Vector3::z(),
            depth,
        }
    }

    fn make_manifold() -> ContactManifold {
        ContactManifold::new(BodyId::new(1), BodyId::new(2), 0.5, 0.0, 0.25)
    }

    #[test]
    fn test_add_and_match_preserves_impulses() {
        let mut manifold = make_manifold();
        let pose = Pose::identity();

        manifold.add_contact(&contact_at(0.0, 0.0, 0.1), &pose, &pose);
        assert_eq!(manifold.len(), 1);

        manifold.store_impulses(0, 5.0, 1.0, -1.0);

        // Same location again: impulses carried over
        manifold.add_contact(&contact_at(0.001, 0.0, 0.12), &pose, &pose);
        assert_eq!(manifold.len(), 1);
        assert_relative_eq!(manifold.points[0].lambda_n, 5.0);
        assert_relative_eq!(manifold.points[0].lambda_t1, 1.0);
        assert_relative_eq!(manifold.points[0].depth, 0.12);
    }

    #[test]
    fn test_distinct_points_accumulate_to_four() {
        let mut manifold = make_manifold();
        let pose = Pose::identity();

        for (x, y) in [(0.5, 0.5), (-0.5, 0.5), (-0.5, -0.5), (0.5, -0.5)] {
            manifold.add_contact(&contact_at(x, y, 0.1), &pose, &pose);
        }
        assert_eq!(manifold.len(), 4);
    }

    #[test]
    fn test_area_heuristic_rejects_interior_point() {
        let mut manifold = make_manifold();
        let pose = Pose::identity();

        for (x, y) in [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)] {
            manifold.add_contact(&contact_at(x, y, 0.1), &pose, &pose);
        }

        // A central point cannot enlarge the footprint; it is rejected
        manifold.add_contact(&contact_at(0.0, 0.0, 0.1), &pose, &pose);
        assert_eq!(manifold.len(), 4);
        for point in &manifold.points {
            assert!(point.midpoint().x.abs() > 0.9);
        }
    }

    #[test]
    fn test_area_heuristic_accepts_expanding_point() {
        let mut manifold = make_manifold();
        let pose = Pose::identity();

        // Three corners plus a point near one of them
        for (x, y) in [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (0.9, 0.9)] {
            manifold.add_contact(&contact_at(x, y, 0.1), &pose, &pose);
        }

        // The missing far corner replaces the redundant near-duplicate
        manifold.add_contact(&contact_at(1.0, -1.0, 0.1), &pose, &pose);
        assert_eq!(manifold.len(), 4);
        assert!(manifold
            .points
            .iter()
            .any(|p| (p.midpoint().x - 1.0).abs() < 0.01 && (p.midpoint().y + 1.0).abs() < 0.01));
    }

    #[test]
    fn test_refresh_drops_separated_points() {
        let mut manifold = make_manifold();
        let pose_a = Pose::identity();
        let pose_b = Pose::identity();

        manifold.add_contact(&contact_at(0.0, 0.0, 0.1), &pose_a, &pose_b);

        // Move body B far along +Z: the gap exceeds the shell
        let pose_b_moved = Pose::from_position(Point3::new(0.0, 0.0, 1.0));
        manifold.refresh(&pose_a, &pose_b_moved);
        assert!(manifold.is_empty());
    }

    #[test]
    fn test_refresh_drops_tangential_drift() {
        let mut manifold = make_manifold();
        let pose_a = Pose::identity();
        let pose_b = Pose::identity();

        manifold.add_contact(&contact_at(0.0, 0.0, 0.1), &pose_a, &pose_b);

        // Slide body B sideways past the drift threshold
        let pose_b_moved = Pose::from_position(Point3::new(0.1, 0.0, 0.0));
        manifold.refresh(&pose_a, &pose_b_moved);
        assert!(manifold.is_empty());
    }

    #[test]
    fn test_refresh_updates_depth() {
        let mut manifold = make_manifold();
        let pose_a = Pose::identity();
        let pose_b = Pose::identity();

        manifold.add_contact(&contact_at(0.0, 0.0, 0.1), &pose_a, &pose_b);
        let initial_depth = manifold.points[0].depth;

        // Press body B down slightly: depth increases
        let pose_b_pressed = Pose::from_position(Point3::new(0.0, 0.0, -0.05));
        manifold.refresh(&pose_a, &pose_b_pressed);
        assert_eq!(manifold.len(), 1);
        assert!(manifold.points[0].depth > initial_depth);
    }
}
