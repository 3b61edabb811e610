//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur during simulation.
///
/// API misuse (referencing absent entities, invalid configuration) is
/// rejected synchronously and leaves the scene unchanged. `Diverged` is
/// the single fatal variant: it means the integrator or solver produced
/// non-finite state and the simulation must not continue.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A body handle did not resolve to a live body.
    #[error("unknown body: {0}")]
    UnknownBody(u64),

    /// A geometry handle did not resolve to a live geometry.
    #[error("unknown geometry: {0}")]
    UnknownGeometry(u64),

    /// A constraint handle did not resolve to a live constraint.
    #[error("unknown constraint: {0}")]
    UnknownConstraint(u64),

    /// A trigger handle did not resolve to a live trigger.
    #[error("unknown trigger: {0}")]
    UnknownTrigger(u64),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::UnknownBody(42);
        assert!(err.to_string().contains("42"));

        let err = SimError::diverged("NaN in delta velocity");
        assert!(err.to_string().contains("NaN"));

        let err = SimError::InvalidTimestep(-0.1);
        assert!(err.to_string().contains("-0.1"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(SimError::diverged("test").is_diverged());
        assert!(!SimError::invalid_config("test").is_diverged());
    }
}
