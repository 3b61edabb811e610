//! The rigid body as stored by the scene.

use islet_types::{BodyId, GeometryId, MassProperties, Pose, Twist};
use nalgebra::Vector3;

/// A rigid body.
///
/// Bodies own nothing but plain data: attached geometries are referenced
/// by handle, and geometries point back at the body the same way, so
/// there are no ownership cycles. The per-tick solver scratch
/// (delta-velocity accumulators) lives in the island assembly, not here;
/// only the magnitude of the last applied delta is kept for the sleep
/// policy.
#[derive(Debug, Clone)]
pub struct Body {
    /// Unique identifier.
    pub id: BodyId,
    /// Optional name for debugging.
    pub name: Option<String>,
    /// Position of the center of mass and orientation.
    pub pose: Pose,
    /// Linear and angular velocity.
    pub twist: Twist,
    /// Mass and inertia.
    pub mass: MassProperties,
    /// Whether the body has infinite mass (a delimiter in the graph).
    pub fixed: bool,
    /// Whether the body is currently sleeping.
    pub sleeping: bool,
    /// Seconds the body has continuously qualified for sleep.
    pub sleep_time: f64,
    /// Magnitude of the constraint delta applied last tick.
    pub last_delta: f64,
    /// Attached geometry handles.
    pub geometries: Vec<GeometryId>,
    /// External force accumulated for the next tick (cleared after).
    pub accumulated_force: Vector3<f64>,
    /// External torque accumulated for the next tick (cleared after).
    pub accumulated_torque: Vector3<f64>,
}

impl Body {
    /// Create a dynamic body.
    #[must_use]
    pub fn new(id: BodyId, pose: Pose, mass: MassProperties) -> Self {
        Self {
            id,
            name: None,
            pose,
            twist: Twist::zero(),
            mass,
            fixed: false,
            sleeping: false,
            sleep_time: 0.0,
            last_delta: 0.0,
            geometries: Vec::new(),
            accumulated_force: Vector3::zeros(),
            accumulated_torque: Vector3::zeros(),
        }
    }

    /// Create a fixed (infinite-mass) body.
    #[must_use]
    pub fn new_fixed(id: BodyId, pose: Pose) -> Self {
        Self {
            fixed: true,
            mass: MassProperties::fixed(),
            ..Self::new(id, pose, MassProperties::fixed())
        }
    }

    /// Inverse mass, zero while fixed.
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        if self.fixed {
            0.0
        } else {
            self.mass.inv_mass()
        }
    }

    /// Wake the body, resetting its sleep timer.
    pub fn wake(&mut self) {
        self.sleeping = false;
        self.sleep_time = 0.0;
    }

    /// Put the body to sleep, zeroing its velocities.
    pub fn put_to_sleep(&mut self) {
        if !self.fixed {
            self.sleeping = true;
            self.twist = Twist::zero();
        }
    }

    /// Apply a force through the next tick (wakes the body).
    pub fn apply_force(&mut self, force: Vector3<f64>) {
        if !self.fixed {
            self.accumulated_force += force;
            if force.norm_squared() > 0.0 {
                self.wake();
            }
        }
    }

    /// Apply an instantaneous impulse at the center of mass.
    pub fn apply_impulse(&mut self, impulse: Vector3<f64>) {
        if !self.fixed {
            self.twist.linear += impulse * self.inv_mass();
            if impulse.norm_squared() > 0.0 {
                self.wake();
            }
        }
    }

    /// Whether the body's state is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.pose.is_finite() && self.twist.is_finite()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_body_ignores_forces() {
        let mut body = Body::new_fixed(BodyId::new(1), Pose::identity());
        body.apply_force(Vector3::new(100.0, 0.0, 0.0));
        body.apply_impulse(Vector3::new(100.0, 0.0, 0.0));

        assert_eq!(body.accumulated_force, Vector3::zeros());
        assert_eq!(body.twist.linear, Vector3::zeros());
        assert_eq!(body.inv_mass(), 0.0);
    }

    #[test]
    fn test_impulse_wakes_sleeping_body() {
        let mut body = Body::new(
            BodyId::new(1),
            Pose::identity(),
            MassProperties::sphere(2.0, 0.5),
        );
        body.put_to_sleep();
        assert!(body.sleeping);

        body.apply_impulse(Vector3::new(1.0, 0.0, 0.0));
        assert!(!body.sleeping);
        assert_eq!(body.twist.linear.x, 0.5);
    }

    #[test]
    fn test_sleep_zeroes_velocity() {
        let mut body = Body::new(
            BodyId::new(1),
            Pose::identity(),
            MassProperties::sphere(1.0, 0.5),
        );
        body.twist.linear.x = 0.001;
        body.put_to_sleep();
        assert_eq!(body.twist.linear.x, 0.0);
    }
}
