//! Rigid-body kinematic state and mass properties.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use islet_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position of the center of mass in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create an identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Compose two poses: `self * other`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity in world coordinates (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub angular: Vector3<f64>,
}

impl Twist {
    /// Create a twist with specified linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Create a zero twist (at rest).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Create a twist with linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Create a twist with angular velocity only.
    #[must_use]
    pub fn angular(omega: Vector3<f64>) -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: omega,
        }
    }

    /// Compute the velocity at a point offset from the center of mass.
    ///
    /// `v_point = v_linear + omega x r`
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Compute kinetic energy given mass and world-frame inertia.
    #[must_use]
    pub fn kinetic_energy(&self, mass: f64, inertia: &Matrix3<f64>) -> f64 {
        let linear_ke = 0.5 * mass * self.linear.norm_squared();
        let angular_ke = 0.5 * self.angular.dot(&(inertia * self.angular));
        linear_ke + angular_ke
    }

    /// Get the linear speed (magnitude of linear velocity).
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.linear.norm()
    }

    /// Get the angular speed (magnitude of angular velocity).
    #[must_use]
    pub fn angular_speed(&self) -> f64 {
        self.angular.norm()
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Mass and body-frame inertia of a rigid body.
///
/// The inverse inertia is precomputed at construction so that the solver
/// hot loops never invert matrices. Fixed (infinite-mass) bodies carry a
/// zero inverse mass and zero inverse inertia, which makes them contribute
/// nothing to any mass-weighted Jacobian term.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Mass in kilograms (`f64::INFINITY` for fixed bodies).
    pub mass: f64,
    /// Inertia tensor about the center of mass, body frame (kg m^2).
    pub inertia: Matrix3<f64>,
    /// Inverse of the inertia tensor (zero for fixed bodies).
    pub inv_inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Create mass properties from an explicit inertia tensor.
    ///
    /// Falls back to a zero inverse if the tensor is singular.
    #[must_use]
    pub fn new(mass: f64, inertia: Matrix3<f64>) -> Self {
        let inv_inertia = inertia.try_inverse().unwrap_or_else(Matrix3::zeros);
        Self {
            mass,
            inertia,
            inv_inertia,
        }
    }

    /// Mass properties for a solid sphere.
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self::new(mass, Matrix3::from_diagonal(&Vector3::new(i, i, i)))
    }

    /// Mass properties for a solid box given half-extents.
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        let (hx, hy, hz) = (half_extents.x, half_extents.y, half_extents.z);
        let k = mass / 3.0;
        let inertia = Matrix3::from_diagonal(&Vector3::new(
            k * (hy * hy + hz * hz),
            k * (hx * hx + hz * hz),
            k * (hx * hx + hy * hy),
        ));
        Self::new(mass, inertia)
    }

    /// Mass properties for a solid capsule aligned with the local Z axis.
    ///
    /// Mass is split between the cylindrical section and the two
    /// hemispherical caps by volume.
    #[must_use]
    pub fn capsule(mass: f64, half_length: f64, radius: f64) -> Self {
        let r2 = radius * radius;
        let h = 2.0 * half_length;

        let cyl_vol = std::f64::consts::PI * r2 * h;
        let cap_vol = 4.0 / 3.0 * std::f64::consts::PI * r2 * radius;
        let total = cyl_vol + cap_vol;
        let m_cyl = mass * cyl_vol / total;
        let m_cap = mass * cap_vol / total;

        // Cylinder about its center
        let cyl_axial = 0.5 * m_cyl * r2;
        let cyl_radial = m_cyl * (3.0 * r2 + h * h) / 12.0;

        // Two hemispheres treated as a sphere shifted to the cylinder ends
        let cap_axial = 0.4 * m_cap * r2;
        let cap_offset = half_length + 3.0 / 8.0 * radius;
        let cap_radial = 0.4 * m_cap * r2 + m_cap * cap_offset * cap_offset;

        let radial = cyl_radial + cap_radial;
        let axial = cyl_axial + cap_axial;
        Self::new(
            mass,
            Matrix3::from_diagonal(&Vector3::new(radial, radial, axial)),
        )
    }

    /// Mass properties for a convex hull, approximated from its vertices.
    ///
    /// Distributes the mass uniformly over the vertex cloud about its
    /// centroid. Adequate for reasonably tessellated hulls.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn convex_hull(mass: f64, vertices: &[Point3<f64>]) -> Self {
        if vertices.is_empty() {
            return Self::new(mass, Matrix3::identity() * mass);
        }

        let n = vertices.len() as f64;
        let centroid: Vector3<f64> =
            vertices.iter().map(|v| v.coords).sum::<Vector3<f64>>() / n;

        let m_point = mass / n;
        let mut inertia = Matrix3::zeros();
        for v in vertices {
            let r = v.coords - centroid;
            let r2 = r.norm_squared();
            inertia += m_point * (Matrix3::identity() * r2 - r * r.transpose());
        }
        Self::new(mass, inertia)
    }

    /// Mass properties of a fixed (infinite-mass) body.
    #[must_use]
    pub fn fixed() -> Self {
        Self {
            mass: f64::INFINITY,
            inertia: Matrix3::zeros(),
            inv_inertia: Matrix3::zeros(),
        }
    }

    /// Inverse mass (zero for fixed bodies).
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        if self.mass.is_finite() && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// Inverse inertia rotated into the world frame: `R * I^-1 * R^T`.
    #[must_use]
    pub fn inv_inertia_world(&self, rotation: &UnitQuaternion<f64>) -> Matrix3<f64> {
        let r = rotation.to_rotation_matrix();
        r.matrix() * self.inv_inertia * r.matrix().transpose()
    }

    /// Validate the mass properties.
    pub fn validate(&self) -> crate::Result<()> {
        if self.mass.is_nan() || self.mass <= 0.0 {
            return Err(crate::SimError::invalid_mass(format!(
                "mass must be positive, got {}",
                self.mass
            )));
        }
        if self.mass.is_finite() && self.inertia.iter().any(|x| !x.is_finite()) {
            return Err(crate::SimError::invalid_mass(
                "inertia tensor has non-finite entries",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_inertia() {
        let props = MassProperties::sphere(2.0, 0.5);
        assert_relative_eq!(props.inertia[(0, 0)], 0.2, epsilon = 1e-12);
        assert_relative_eq!(props.inv_inertia[(0, 0)], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_box_inertia_symmetry() {
        let props = MassProperties::box_shape(1.0, Vector3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(props.inertia[(0, 0)], props.inertia[(1, 1)], epsilon = 1e-12);
        assert_relative_eq!(props.inertia[(1, 1)], props.inertia[(2, 2)], epsilon = 1e-12);
    }

    #[test]
    fn test_capsule_radial_exceeds_axial() {
        let props = MassProperties::capsule(1.0, 1.0, 0.25);
        assert!(props.inertia[(0, 0)] > props.inertia[(2, 2)]);
    }

    #[test]
    fn test_hull_inertia_positive_definite() {
        let vertices = [
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
        ];
        let props = MassProperties::convex_hull(1.0, &vertices);
        for i in 0..3 {
            assert!(props.inertia[(i, i)] > 0.0);
        }
        props.validate().unwrap();
    }

    #[test]
    fn test_inv_inertia_world_identity_rotation() {
        let props = MassProperties::sphere(1.0, 1.0);
        let world = props.inv_inertia_world(&UnitQuaternion::identity());
        assert_relative_eq!(world[(0, 0)], props.inv_inertia[(0, 0)], epsilon = 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_mass() {
        let props = MassProperties::new(-1.0, Matrix3::identity());
        assert!(props.validate().is_err());
    }
}
