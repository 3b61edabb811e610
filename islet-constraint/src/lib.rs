//! Constraint graph and NCP solvers for the islet dynamics engine.
//!
//! Contacts and joints are both expressed as scalar complementarity rows
//! over body velocities. Each row carries a Jacobian split into four
//! blocks (linear/angular for each body), the mass-weighted blocks used
//! to scatter impulses, box bounds on its multiplier, and a target
//! velocity. The single formulation
//!
//! ```text
//! w = J M^-1 J^T lambda + b,    lambda_min <= lambda <= lambda_max
//! ```
//!
//! covers non-penetration (`[0, inf)`), bilateral joint rows
//! (`(-inf, inf)`) and friction (bounds coupled to the live normal
//! multiplier).
//!
//! # Islands
//!
//! The [`ConstraintGraph`] partitions bodies into connected components
//! delimited by fixed bodies: a fixed body never merges the components
//! reachable through it, so every fixed anchor independently segments the
//! dynamic world. Components are solved and slept independently, which is
//! what lets large mostly-resting scenes scale.
//!
//! # Solvers
//!
//! - [`solve_pgs`]: projected Gauss-Seidel, the deterministic baseline
//!   with a fixed sweep budget.
//! - [`solve_nncg`]: nonsmooth nonlinear conjugate gradient, which wraps
//!   PGS sweeps in Fletcher-Reeves momentum and monitors a
//!   Fischer-Burmeister merit, converging faster on stacked and resting
//!   configurations.
//!
//! Both are warm-started from the previous tick's multipliers; both
//! return a [`SolveReport`] exposing iterations, residual and
//! convergence.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod contact;
mod graph;
mod joint;
mod nncg;
mod pgs;
mod row;
mod solver;

pub use contact::{contact_rows, store_contact_impulses, tangent_frame};
pub use graph::{ConstraintGraph, Island};
pub use joint::{Joint, JointKind, Motor};
pub use nncg::solve_nncg;
pub use pgs::{pgs_sweep, solve_pgs};
pub use row::{ConstraintRow, CoupledBound, SolverBody};
pub use solver::{merit, solve_island, SolveReport};

pub use islet_types::{BodyId, ConstraintId};
