//! Scene orchestration for the islet rigid-body dynamics engine.
//!
//! The [`Scene`] ties the collision and constraint layers into a single
//! `tick(dt)` pipeline:
//!
//! ```text
//! broadphase -> narrow phase -> per-island solve -> integrate -> sleep -> triggers
//! ```
//!
//! A tick is one atomic, single-threaded step: no body or constraint
//! state is observable mid-tick, islands share no state by construction,
//! and the solvers' fixed iteration budgets bound the worst-case cost.
//!
//! # Quick Start
//!
//! ```
//! use islet_core::Scene;
//! use islet_collide::Shape;
//! use islet_types::{MassProperties, Pose, SimulationConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut scene = Scene::new(SimulationConfig::default()).unwrap();
//!
//! // A fixed floor and a falling ball
//! let floor = scene.add_fixed_body(Pose::identity());
//! scene
//!     .add_geometry(floor, Shape::box_shape(Vector3::new(20.0, 20.0, 0.5)))
//!     .unwrap();
//!
//! let ball = scene.add_body(
//!     Pose::from_position(Point3::new(0.0, 0.0, 3.0)),
//!     MassProperties::sphere(1.0, 0.5),
//! );
//! scene.add_geometry(ball, Shape::sphere(0.5)).unwrap();
//!
//! for _ in 0..10 {
//!     scene.tick().unwrap();
//! }
//!
//! // The ball is falling
//! assert!(scene.body(ball).unwrap().pose.position.z < 3.0);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod integrate;
mod scene;
mod sleep;
mod trigger;

pub use body::Body;
pub use integrate::integrate_pose;
pub use scene::{Scene, TickReport};
pub use sleep::SleepPolicy;
pub use trigger::{ForceThresholdTrigger, Trigger};

pub use islet_collide::{Geometry, Shape};
pub use islet_constraint::{Joint, JointKind, Motor};
pub use islet_types::{
    BodyId, ConstraintId, GeometryId, MassProperties, Pose, SimError, SimulationConfig,
    SleepConfig, SolverConfig, SolverMethod, Twist,
};
