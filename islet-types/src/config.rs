//! Configuration types for the simulation.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which NCP solver resolves each island's constraint system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolverMethod {
    /// Projected Gauss-Seidel. Cheap per iteration, reliable baseline.
    #[default]
    Pgs,
    /// Nonsmooth nonlinear conjugate gradient. Faster convergence for
    /// stacked and resting contact at a higher per-iteration cost.
    Nncg,
}

/// Configuration for the NCP solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Which solver to run per island.
    pub method: SolverMethod,

    /// Fixed iteration budget. PGS always runs exactly this many sweeps;
    /// NNCG may stop earlier when the merit drops below `tolerance`.
    pub iterations: usize,

    /// NNCG termination tolerance on the Fischer-Burmeister merit.
    pub tolerance: f64,

    /// Baumgarte stabilization factor in [0, 1]. The position error beyond
    /// the contact shell is fed back as `baumgarte / dt * error`.
    pub baumgarte: f64,

    /// Scale applied to cached lambdas when warm starting.
    pub warm_start_factor: f64,

    /// Relative velocity below which restitution is suppressed (m/s).
    pub restitution_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::Pgs,
            iterations: 25,
            tolerance: 1e-7,
            baumgarte: 0.2,
            warm_start_factor: 0.95,
            restitution_threshold: 0.1,
        }
    }
}

impl SolverConfig {
    /// Fast configuration for real-time scenes.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            iterations: 15,
            tolerance: 1e-5,
            baumgarte: 0.3,
            ..Default::default()
        }
    }

    /// High-accuracy configuration using the accelerated solver.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            method: SolverMethod::Nncg,
            iterations: 75,
            tolerance: 1e-10,
            baumgarte: 0.1,
            ..Default::default()
        }
    }

    /// Set the solver method.
    #[must_use]
    pub const fn with_method(mut self, method: SolverMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the iteration budget.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the warm-start factor.
    #[must_use]
    pub const fn with_warm_start_factor(mut self, factor: f64) -> Self {
        self.warm_start_factor = factor;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "solver iterations must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.baumgarte) {
            return Err(crate::SimError::invalid_config(
                "baumgarte factor must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.warm_start_factor) {
            return Err(crate::SimError::invalid_config(
                "warm start factor must be in [0, 1]",
            ));
        }
        if self.tolerance <= 0.0 {
            return Err(crate::SimError::invalid_config(
                "solver tolerance must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration for the deactivation (sleeping) policy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepConfig {
    /// Whether bodies may sleep at all.
    pub enabled: bool,

    /// Kinetic-energy-like threshold: a body qualifies for sleep while
    /// `speed^2 + angular_speed^2 + |delta_v|` stays below this value
    /// scaled by the timestep.
    pub energy_threshold: f64,

    /// Seconds a body must continuously qualify before its island may
    /// sleep.
    pub time_to_sleep: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            energy_threshold: 1.0,
            time_to_sleep: 0.0,
        }
    }
}

/// Main configuration for a [`Scene`](https://docs.rs/islet-core).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Fixed timestep for each tick (seconds).
    pub timestep: f64,
    /// Gravitational acceleration applied to every non-fixed body (m/s^2).
    pub gravity: Vector3<f64>,
    /// NCP solver configuration.
    pub solver: SolverConfig,
    /// Deactivation policy configuration.
    pub sleep: SleepConfig,
    /// Default collision envelope (margin) for new geometries (m).
    pub default_envelope: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            gravity: Vector3::new(0.0, 0.0, -9.81),
            solver: SolverConfig::default(),
            sleep: SleepConfig::default(),
            default_envelope: 0.125,
        }
    }
}

impl SimulationConfig {
    /// Create a configuration with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }
        if self.timestep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }
        if self.default_envelope < 0.0 {
            return Err(crate::SimError::invalid_config(
                "collision envelope cannot be negative",
            ));
        }
        self.solver.validate()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
        SolverConfig::realtime().validate().unwrap();
        SolverConfig::high_accuracy().validate().unwrap();
    }

    #[test]
    fn test_bad_timestep_rejected() {
        let config = SimulationConfig::with_timestep(-0.01);
        assert!(config.validate().is_err());

        let config = SimulationConfig::with_timestep(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_solver_config_rejected() {
        let config = SolverConfig::default().with_iterations(0);
        assert!(config.validate().is_err());

        let mut config = SolverConfig::default();
        config.baumgarte = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_high_accuracy_uses_nncg() {
        assert_eq!(SolverConfig::high_accuracy().method, SolverMethod::Nncg);
    }
}
