//! Core types for the islet rigid-body dynamics engine.
//!
//! This crate provides the foundational data types shared by the collision,
//! constraint and scene crates:
//!
//! - [`BodyId`], [`GeometryId`], [`ConstraintId`] - entity handles
//! - [`Pose`], [`Twist`] - rigid-body kinematic state
//! - [`MassProperties`] - mass and inertia, with per-shape constructors
//! - [`SimulationConfig`], [`SolverConfig`], [`SleepConfig`] - tuning knobs
//! - [`SimError`] - the error taxonomy for the whole engine
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no simulation behavior beyond
//! constructors, validators and small kinematic helpers. Entities refer to
//! each other exclusively through integer handles, never through shared
//! references, so there are no ownership cycles anywhere in the engine.
//!
//! # Coordinate System
//!
//! Right-handed, Z-up. All quantities are SI (meters, kilograms, seconds).
//!
//! # Example
//!
//! ```
//! use islet_types::{Pose, Twist, MassProperties};
//! use nalgebra::{Point3, Vector3};
//!
//! let pose = Pose::from_position(Point3::new(0.0, 0.0, 1.0));
//! let twist = Twist::linear(Vector3::new(1.0, 0.0, 0.0));
//! let mass = MassProperties::sphere(1.0, 0.5);
//!
//! assert_eq!(pose.position.z, 1.0);
//! assert!(twist.kinetic_energy(mass.mass, &mass.inertia) > 0.0);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod id;

pub use body::{MassProperties, Pose, Twist};
pub use config::{SimulationConfig, SleepConfig, SolverConfig, SolverMethod};
pub use error::SimError;
pub use id::{BodyId, ConstraintId, GeometryId};

// Re-export math types for convenience
pub use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_round_trip() {
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );

        let local = Point3::new(0.5, -0.5, 0.25);
        let world = pose.transform_point(&local);
        let back = pose.inverse_transform_point(&world);

        assert!((back - local).norm() < 1e-12);
    }

    #[test]
    fn test_twist_velocity_at_point() {
        let twist = Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
        // Point one meter along +X: omega x r adds +Y velocity
        let v = twist.velocity_at_point(&Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 1.0);
    }

    #[test]
    fn test_fixed_mass_properties() {
        let fixed = MassProperties::fixed();
        assert_eq!(fixed.inv_mass(), 0.0);
        assert_eq!(fixed.inv_inertia, Matrix3::zeros());
    }
}
