//! Collision detection for the islet rigid-body dynamics engine.
//!
//! This crate covers the full discrete collision pipeline:
//!
//! - [`Shape`] / [`Geometry`] - convex shape variants with support mappings
//! - [`Aabb`] - axis-aligned bounds including the collision envelope
//! - [`SweepAndPrune`] - incremental broadphase with overlap/separation events
//! - [`gjk_distance`] - closest points and distance for separated pairs
//! - [`epa_penetration`] - penetration normal and depth for overlapping pairs
//! - [`collide_boxes`] - specialized SAT box-box contact generation
//! - [`ContactManifold`] - persistent 4-point manifolds with impulse caches
//!
//! # Contact depth convention
//!
//! Every geometry carries a collision *envelope* (margin). For a geometry
//! pair the shell is the sum of both envelopes; a contact exists whenever
//! the surface gap is below the shell, and [`Contact::depth`] is
//! `shell - gap` (so a pair touching exactly at the shell boundary has
//! depth zero, and interpenetrating surfaces have depth above the shell).
//! The constraint layer only drives position correction for the portion of
//! the depth that exceeds the shell, which lets bodies rest anywhere
//! inside their envelopes.
//!
//! # Dispatch
//!
//! Box-box pairs always take the exact SAT path; generic GJK/EPA is
//! numerically unstable for flush box-on-box contact. Every other convex
//! pair goes through GJK, falling back to EPA on penetration.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod aabb;
mod broad_phase;
mod epa;
mod gjk;
mod manifold;
mod sat;
mod shape;

pub use aabb::Aabb;
pub use broad_phase::{BroadPhaseEvent, GeometryPair, SweepAndPrune};
pub use epa::{epa_penetration, EpaResult};
pub use gjk::{gjk_distance, GjkResult, Simplex, SupportPoint};
pub use manifold::{ContactManifold, ManifoldPoint, MAX_MANIFOLD_POINTS};
pub use sat::collide_boxes;
pub use shape::{support, Contact, Geometry, Shape};

pub use islet_types::{BodyId, GeometryId};

/// Generate contacts for a geometry pair, dispatching on shape type.
///
/// Box-box pairs use the exact SAT path and may produce up to eight
/// points; all other pairs produce at most one point per call from
/// GJK/EPA. Returns an empty vector when the pair is separated by more
/// than the combined envelope shell.
#[must_use]
pub fn narrow_phase(geom_a: &Geometry, pose_a: &islet_types::Pose, geom_b: &Geometry, pose_b: &islet_types::Pose) -> Vec<Contact> {
    let world_a = geom_a.world_pose(pose_a);
    let world_b = geom_b.world_pose(pose_b);
    let shell = geom_a.envelope + geom_b.envelope;

    if let (Shape::Box { half_extents: he_a }, Shape::Box { half_extents: he_b }) =
        (&geom_a.shape, &geom_b.shape)
    {
        return collide_boxes(he_a, &world_a, he_b, &world_b, shell);
    }

    match gjk_distance(&geom_a.shape, &world_a, &geom_b.shape, &world_b) {
        GjkResult::Separated {
            distance,
            point_a,
            point_b,
        } => {
            if distance >= shell {
                return Vec::new();
            }
            let normal = (point_b - point_a) / distance.max(1e-12);
            vec![Contact {
                point_a,
                point_b,
                normal,
                depth: (shell - distance).max(0.0),
            }]
        }
        GjkResult::Intersecting { simplex } => {
            match epa_penetration(&geom_a.shape, &world_a, &geom_b.shape, &world_b, &simplex) {
                Some(epa) => vec![Contact {
                    point_a: epa.point_a,
                    point_b: epa.point_b,
                    normal: epa.normal,
                    depth: shell + epa.depth,
                }],
                None => Vec::new(),
            }
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
    use islet_types::Pose;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_narrow_phase_spheres_in_shell() {
        let a = Geometry::new(GeometryId::new(1), Shape::sphere(1.0)).with_envelope(0.1);
        let b = Geometry::new(GeometryId::new(2), Shape::sphere(1.0)).with_envelope(0.1);

        // Surfaces 0.1 apart, shell is 0.2: near contact with depth 0.1
        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(2.1, 0.0, 0.0));

        let contacts = narrow_phase(&a, &pose_a, &b, &pose_b);
        assert_eq!(contacts.len(), 1);
        approx::assert_relative_eq!(contacts[0].depth, 0.1, epsilon = 1e-6);
        assert!(contacts[0].normal.x > 0.99);
    }

    #[test]
    fn test_narrow_phase_separated_beyond_shell() {
        let a = Geometry::new(GeometryId::new(1), Shape::sphere(1.0)).with_envelope(0.1);
        let b = Geometry::new(GeometryId::new(2), Shape::sphere(1.0)).with_envelope(0.1);

        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(3.0, 0.0, 0.0));

        assert!(narrow_phase(&a, &pose_a, &b, &pose_b).is_empty());
    }

    #[test]
    fn test_narrow_phase_penetrating_spheres() {
        let a = Geometry::new(GeometryId::new(1), Shape::sphere(1.0)).with_envelope(0.1);
        let b = Geometry::new(GeometryId::new(2), Shape::sphere(1.0)).with_envelope(0.1);

        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(1.5, 0.0, 0.0));

        let contacts = narrow_phase(&a, &pose_a, &b, &pose_b);
        assert_eq!(contacts.len(), 1);
        // Penetration 0.5 plus shell 0.2
        approx::assert_relative_eq!(contacts[0].depth, 0.7, epsilon = 0.05);
    }

    #[test]
    fn test_narrow_phase_box_box_uses_sat() {
        let a = Geometry::new(
            GeometryId::new(1),
            Shape::box_shape(Vector3::new(0.5, 0.5, 0.5)),
        )
        .with_envelope(0.25);
        let b = Geometry::new(
            GeometryId::new(2),
            Shape::box_shape(Vector3::new(0.5, 0.5, 0.5)),
        )
        .with_envelope(0.25);

        let pose_a = Pose::identity();
        let pose_b = Pose::from_position(Point3::new(0.0, 1.5, 0.0));

        // A flush face pair clips to four corner points
        let contacts = narrow_phase(&a, &pose_a, &b, &pose_b);
        assert_eq!(contacts.len(), 4);
    }
}
