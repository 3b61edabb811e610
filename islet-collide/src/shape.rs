//! Convex shapes, support mappings and geometry instances.

use islet_types::{BodyId, GeometryId, MassProperties, Pose};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Aabb;

const EPSILON: f64 = 1e-10;

/// Convex collision shape.
///
/// A tagged variant dispatched by methods; there is deliberately no trait
/// hierarchy here. Every variant is convex and answers support-mapping
/// queries, which is all the narrow phase requires.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Sphere with the given radius.
    Sphere {
        /// Sphere radius in meters.
        radius: f64,
    },
    /// Box with half-extents along the local axes.
    Box {
        /// Half-extents of the box in each axis.
        half_extents: Vector3<f64>,
    },
    /// Capsule aligned with the local Z-axis.
    Capsule {
        /// Half-length of the cylindrical section.
        half_length: f64,
        /// Radius of the capsule.
        radius: f64,
    },
    /// Convex hull defined by its vertices in local coordinates.
    ///
    /// Hull construction (triangulation) is an external concern; the hull
    /// arrives as a vertex cloud plus an optional vertex-adjacency table.
    /// When `neighbors` is non-empty, support queries hill-climb it;
    /// otherwise they fall back to a linear scan.
    ConvexHull {
        /// Vertices of the hull in local coordinates.
        vertices: Vec<Point3<f64>>,
        /// `neighbors[i]` lists the vertex indices adjacent to vertex `i`.
        /// Immutable after construction; may be empty.
        neighbors: Vec<Vec<u32>>,
    },
}

impl Shape {
    /// Create a sphere shape.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Create a box shape from half-extents.
    #[must_use]
    pub fn box_shape(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }

    /// Create a capsule shape aligned with the local Z-axis.
    #[must_use]
    pub fn capsule(half_length: f64, radius: f64) -> Self {
        Self::Capsule {
            half_length,
            radius,
        }
    }

    /// Create a convex hull from a vertex cloud, without adjacency.
    #[must_use]
    pub fn convex_hull(vertices: Vec<Point3<f64>>) -> Self {
        Self::ConvexHull {
            vertices,
            neighbors: Vec::new(),
        }
    }

    /// Create a convex hull with a prebuilt vertex-adjacency table.
    #[must_use]
    pub fn convex_hull_with_adjacency(
        vertices: Vec<Point3<f64>>,
        neighbors: Vec<Vec<u32>>,
    ) -> Self {
        Self::ConvexHull {
            vertices,
            neighbors,
        }
    }

    /// Radius of the bounding sphere around the local origin.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } => half_extents.norm(),
            Self::Capsule {
                half_length,
                radius,
            } => half_length + radius,
            Self::ConvexHull { vertices, .. } => {
                vertices.iter().map(|v| v.coords.norm()).fold(0.0, f64::max)
            }
        }
    }

    /// Mass properties of this shape at the given total mass.
    #[must_use]
    pub fn mass_properties(&self, mass: f64) -> MassProperties {
        match self {
            Self::Sphere { radius } => MassProperties::sphere(mass, *radius),
            Self::Box { half_extents } => MassProperties::box_shape(mass, *half_extents),
            Self::Capsule {
                half_length,
                radius,
            } => MassProperties::capsule(mass, *half_length, *radius),
            Self::ConvexHull { vertices, .. } => MassProperties::convex_hull(mass, vertices),
        }
    }
}

/// Compute the support point of a shape in a given world direction.
///
/// Returns the point on the shape's surface farthest along `direction`.
/// This is the sole query the GJK/EPA narrow phase needs.
#[must_use]
pub fn support(shape: &Shape, pose: &Pose, direction: &Vector3<f64>) -> Point3<f64> {
    match shape {
        Shape::Sphere { radius } => {
            let norm = direction.norm();
            if norm < EPSILON {
                return pose.position;
            }
            pose.position + direction * (*radius / norm)
        }
        Shape::Box { half_extents } => {
            let local_dir = pose.inverse_transform_vector(direction);
            let local = Point3::new(
                half_extents.x * local_dir.x.signum(),
                half_extents.y * local_dir.y.signum(),
                half_extents.z * local_dir.z.signum(),
            );
            pose.transform_point(&local)
        }
        Shape::Capsule {
            half_length,
            radius,
        } => {
            let local_dir = pose.inverse_transform_vector(direction);
            let cap = if local_dir.z >= 0.0 {
                Point3::new(0.0, 0.0, *half_length)
            } else {
                Point3::new(0.0, 0.0, -*half_length)
            };
            let norm = direction.norm();
            let offset = if norm > EPSILON {
                direction * (*radius / norm)
            } else {
                Vector3::zeros()
            };
            pose.transform_point(&cap) + offset
        }
        Shape::ConvexHull {
            vertices,
            neighbors,
        } => {
            let local_dir = pose.inverse_transform_vector(direction);
            let index = if neighbors.len() == vertices.len() && !neighbors.is_empty() {
                hill_climb(vertices, neighbors, &local_dir)
            } else {
                linear_support(vertices, &local_dir)
            };
            pose.transform_point(&vertices[index])
        }
    }
}

/// Linear-scan support query over a vertex cloud.
fn linear_support(vertices: &[Point3<f64>], dir: &Vector3<f64>) -> usize {
    let mut best = 0;
    let mut best_dot = f64::NEG_INFINITY;
    for (i, v) in vertices.iter().enumerate() {
        let dot = v.coords.dot(dir);
        if dot > best_dot {
            best_dot = dot;
            best = i;
        }
    }
    best
}

/// Hill-climbing support query over the precomputed adjacency table.
///
/// Walks uphill from vertex 0 until no neighbor improves the dot product.
/// The adjacency table is immutable, so queries share nothing mutable.
fn hill_climb(vertices: &[Point3<f64>], neighbors: &[Vec<u32>], dir: &Vector3<f64>) -> usize {
    let mut current = 0usize;
    let mut current_dot = vertices[0].coords.dot(dir);

    loop {
        let mut improved = false;
        for &n in &neighbors[current] {
            let n = n as usize;
            if n >= vertices.len() {
                continue;
            }
            let dot = vertices[n].coords.dot(dir);
            if dot > current_dot + EPSILON {
                current = n;
                current_dot = dot;
                improved = true;
                break;
            }
        }
        if !improved {
            return current;
        }
    }
}

/// A raw contact produced by the narrow phase.
///
/// `point_a` and `point_b` are witness points on the surfaces of the two
/// geometries (world coordinates); the manifold layer converts them to
/// body-local anchors. `normal` points from geometry A toward geometry B.
/// `depth` is shell-adjusted: see the crate-level documentation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Contact {
    /// Witness point on geometry A's surface (world).
    pub point_a: Point3<f64>,
    /// Witness point on geometry B's surface (world).
    pub point_b: Point3<f64>,
    /// Unit contact normal, pointing from A toward B.
    pub normal: Vector3<f64>,
    /// Shell-adjusted contact depth (non-negative).
    pub depth: f64,
}

impl Contact {
    /// World midpoint between the two witness points.
    #[must_use]
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.point_a, &self.point_b)
    }

    /// Flip the contact so A and B swap roles.
    #[must_use]
    pub fn flip(self) -> Self {
        Self {
            point_a: self.point_b,
            point_b: self.point_a,
            normal: -self.normal,
            depth: self.depth,
        }
    }
}

/// A collision geometry instance: a shape attached to a body.
///
/// Immutable after construction except for its local pose and body
/// attachment. The geometry holds a back-reference to its body as a plain
/// [`BodyId`]; it never owns the body.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Geometry {
    /// Unique identifier.
    pub id: GeometryId,
    /// The body this geometry is attached to, if any.
    pub body: Option<BodyId>,
    /// The convex shape.
    pub shape: Shape,
    /// Local pose relative to the body's center of mass.
    pub local_pose: Pose,
    /// Collision envelope (margin) in meters.
    pub envelope: f64,
    /// Friction coefficient of this surface.
    pub friction: f64,
    /// Restitution coefficient of this surface.
    pub restitution: f64,
}

impl Geometry {
    /// Create a new geometry with default material and envelope.
    #[must_use]
    pub fn new(id: GeometryId, shape: Shape) -> Self {
        Self {
            id,
            body: None,
            shape,
            local_pose: Pose::identity(),
            envelope: 0.125,
            friction: 0.5,
            restitution: 0.0,
        }
    }

    /// Set the collision envelope.
    #[must_use]
    pub fn with_envelope(mut self, envelope: f64) -> Self {
        self.envelope = envelope;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Set the local pose relative to the body.
    #[must_use]
    pub fn with_local_pose(mut self, local_pose: Pose) -> Self {
        self.local_pose = local_pose;
        self
    }

    /// World pose of this geometry given its body's pose.
    #[must_use]
    pub fn world_pose(&self, body_pose: &Pose) -> Pose {
        body_pose.compose(&self.local_pose)
    }

    /// World AABB of this geometry, expanded by the envelope.
    #[must_use]
    pub fn aabb(&self, body_pose: &Pose) -> Aabb {
        let world = self.world_pose(body_pose);
        let bounds = match &self.shape {
            Shape::Sphere { radius } => {
                Aabb::from_center(world.position, Vector3::repeat(*radius))
            }
            Shape::Box { half_extents } => {
                // Extent of a rotated box: sum of projected half-extents
                let rot = world.rotation.to_rotation_matrix();
                let m = rot.matrix().abs();
                Aabb::from_center(world.position, m * half_extents)
            }
            Shape::Capsule {
                half_length,
                radius,
            } => {
                let axis = world.transform_vector(&Vector3::new(0.0, 0.0, *half_length));
                let r = Vector3::repeat(*radius);
                let half = Vector3::new(axis.x.abs(), axis.y.abs(), axis.z.abs()) + r;
                Aabb::from_center(world.position, half)
            }
            Shape::ConvexHull { vertices, .. } => {
                let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
                let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
                for v in vertices {
                    let w = world.transform_point(v);
                    min = min.inf(&w);
                    max = max.sup(&w);
                }
                Aabb::new(min, max)
            }
        };
        bounds.expanded(self.envelope)
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
    use islet_types::UnitQuaternion;

    #[test]
    fn test_support_sphere() {
        let shape = Shape::sphere(0.5);
        let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));

        let s = support(&shape, &pose, &Vector3::x());
        assert_relative_eq!(s.x, 1.5, epsilon = 1e-10);
        assert_relative_eq!(s.y, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_support_box() {
        let shape = Shape::box_shape(Vector3::new(1.0, 2.0, 3.0));
        let pose = Pose::identity();

        let s = support(&shape, &pose, &Vector3::new(1.0, 1.0, 1.0).normalize());
        assert_relative_eq!(s.x, 1.0, epsilon = 1e-10);
        assert_relative_eq!(s.y, 2.0, epsilon = 1e-10);
        assert_relative_eq!(s.z, 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_support_capsule_endpoints() {
        let shape = Shape::capsule(1.0, 0.25);
        let pose = Pose::identity();

        let top = support(&shape, &pose, &Vector3::z());
        assert_relative_eq!(top.z, 1.25, epsilon = 1e-10);

        let side = support(&shape, &pose, &Vector3::x());
        assert_relative_eq!(side.x, 0.25, epsilon = 1e-10);
    }

    #[test]
    fn test_support_hull_linear_vs_hill_climb() {
        let vertices = vec![
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
        ];
        // Cube edge adjacency
        let neighbors = vec![
            vec![1, 3, 4],
            vec![0, 2, 5],
            vec![1, 3, 6],
            vec![0, 2, 7],
            vec![0, 5, 7],
            vec![1, 4, 6],
            vec![2, 5, 7],
            vec![3, 4, 6],
        ];

        let plain = Shape::convex_hull(vertices.clone());
        let climbing = Shape::convex_hull_with_adjacency(vertices, neighbors);
        let pose = Pose::identity();

        for dir in [
            Vector3::new(1.0, 0.7, 0.3),
            Vector3::new(-0.2, 1.0, -0.9),
            Vector3::new(-1.0, -1.0, -1.0),
        ] {
            let a = support(&plain, &pose, &dir);
            let b = support(&climbing, &pose, &dir);
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rotated_box_aabb() {
        let geom = Geometry::new(
            GeometryId::new(1),
            Shape::box_shape(Vector3::new(1.0, 1.0, 1.0)),
        )
        .with_envelope(0.0);

        // 45 degrees about Z: the XY extent grows to sqrt(2)
        let pose = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_4),
        );
        let aabb = geom.aabb(&pose);
        assert_relative_eq!(aabb.max.x, std::f64::consts::SQRT_2, epsilon = 1e-10);
        assert_relative_eq!(aabb.max.z, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_geometry_aabb_includes_envelope() {
        let geom = Geometry::new(GeometryId::new(1), Shape::sphere(1.0)).with_envelope(0.25);
        let aabb = geom.aabb(&Pose::identity());
        assert_relative_eq!(aabb.max.x, 1.25, epsilon = 1e-10);
    }

    #[test]
    fn test_shape_mass_properties_dispatch() {
        let sphere = Shape::sphere(0.5).mass_properties(2.0);
        assert_relative_eq!(sphere.inertia[(0, 0)], 0.2, epsilon = 1e-12);

        let bx = Shape::box_shape(Vector3::new(0.5, 0.5, 0.5)).mass_properties(1.0);
        assert!(bx.inertia[(0, 0)] > 0.0);
    }
}
