//! The deactivation (sleeping) policy.

use islet_types::SleepConfig;

use crate::body::Body;

/// Decides when bodies qualify for sleep.
///
/// A body qualifies while a kinetic-energy-like scalar - squared speed
/// plus squared angular speed plus the magnitude of the last constraint
/// delta - stays below the configured threshold scaled by the timestep.
/// An island sleeps only when every member body has qualified for the
/// configured stretch of time; one restless body keeps the whole island
/// live.
#[derive(Debug, Clone, Copy)]
pub struct SleepPolicy {
    config: SleepConfig,
}

impl SleepPolicy {
    /// Create a policy from its configuration.
    #[must_use]
    pub fn new(config: SleepConfig) -> Self {
        Self { config }
    }

    /// Whether a body currently qualifies for sleep.
    #[must_use]
    pub fn should_be_deactivated(&self, body: &Body, dt: f64) -> bool {
        if !self.config.enabled || body.fixed {
            return false;
        }
        let energy = body.twist.linear.norm_squared()
            + body.twist.angular.norm_squared()
            + body.last_delta;
        energy < self.config.energy_threshold * dt
    }

    /// Advance a body's sleep timer; returns true once it has qualified
    /// long enough to be a sleep candidate.
    pub fn update(&self, body: &mut Body, dt: f64) -> bool {
        if self.should_be_deactivated(body, dt) {
            body.sleep_time += dt;
        } else {
            body.sleep_time = 0.0;
        }
        body.sleep_time >= self.config.time_to_sleep
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use islet_types::{BodyId, MassProperties, Pose};
    use nalgebra::Vector3;

    fn resting_body() -> Body {
        Body::new(
            BodyId::new(1),
            Pose::identity(),
            MassProperties::sphere(1.0, 0.5),
        )
    }

    #[test]
    fn test_resting_body_qualifies() {
        let policy = SleepPolicy::new(SleepConfig::default());
        let body = resting_body();
        assert!(policy.should_be_deactivated(&body, 1.0 / 60.0));
    }

    #[test]
    fn test_moving_body_does_not_qualify() {
        let policy = SleepPolicy::new(SleepConfig::default());
        let mut body = resting_body();
        body.twist.linear = Vector3::new(1.0, 0.0, 0.0);
        assert!(!policy.should_be_deactivated(&body, 1.0 / 60.0));
    }

    #[test]
    fn test_recent_delta_blocks_sleep() {
        let policy = SleepPolicy::new(SleepConfig::default());
        let mut body = resting_body();
        body.last_delta = 1.0;
        assert!(!policy.should_be_deactivated(&body, 1.0 / 60.0));
    }

    #[test]
    fn test_timer_accumulates_to_candidate() {
        let config = SleepConfig {
            time_to_sleep: 0.1,
            ..Default::default()
        };
        let policy = SleepPolicy::new(config);
        let mut body = resting_body();

        let dt = 1.0 / 60.0;
        let mut candidate = false;
        for _ in 0..10 {
            candidate = policy.update(&mut body, dt);
        }
        assert!(candidate);

        // Motion resets the timer
        body.twist.linear = Vector3::new(1.0, 0.0, 0.0);
        assert!(!policy.update(&mut body, dt));
        assert_eq!(body.sleep_time, 0.0);
    }

    #[test]
    fn test_disabled_policy_never_sleeps() {
        let config = SleepConfig {
            enabled: false,
            ..Default::default()
        };
        let policy = SleepPolicy::new(config);
        let body = resting_body();
        assert!(!policy.should_be_deactivated(&body, 1.0 / 60.0));
    }
}
