//! Force triggers: read-side observers over constraint impulses.
//!
//! After each tick the scene hands every trigger the total constraint
//! force acting on its body (accumulated `|lambda| / dt` over all rows
//! touching the body). Triggers never mutate body or constraint state;
//! they only observe and fire callbacks.

use islet_types::BodyId;

/// A per-body observer evaluated at the end of every tick.
pub trait Trigger {
    /// The body this trigger watches.
    fn body(&self) -> BodyId;

    /// Observe the total constraint force on the body this tick.
    fn evaluate(&mut self, body: BodyId, total_force: f64, dt: f64);
}

/// Callback fired on threshold crossings: `(body, now_above, force)`.
pub type ThresholdCallback = Box<dyn FnMut(BodyId, bool, f64) + Send>;

/// Fires a callback whenever the total constraint force on a body crosses
/// a threshold in either direction.
pub struct ForceThresholdTrigger {
    body: BodyId,
    threshold: f64,
    above: bool,
    callback: ThresholdCallback,
}

impl ForceThresholdTrigger {
    /// Create a trigger for a body and force threshold (N).
    #[must_use]
    pub fn new(body: BodyId, threshold: f64, callback: ThresholdCallback) -> Self {
        Self {
            body,
            threshold,
            above: false,
            callback,
        }
    }

    /// Whether the watched force was above the threshold last tick.
    #[must_use]
    pub fn is_above(&self) -> bool {
        self.above
    }
}

impl Trigger for ForceThresholdTrigger {
    fn body(&self) -> BodyId {
        self.body
    }

    fn evaluate(&mut self, body: BodyId, total_force: f64, _dt: f64) {
        let now_above = total_force > self.threshold;
        if now_above != self.above {
            self.above = now_above;
            (self.callback)(body, now_above, total_force);
        }
    }
}

impl std::fmt::Debug for ForceThresholdTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceThresholdTrigger")
            .field("body", &self.body)
            .field("threshold", &self.threshold)
            .field("above", &self.above)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fires_only_on_crossings() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_inner = Arc::clone(&count);

        let body = BodyId::new(1);
        let mut trigger = ForceThresholdTrigger::new(
            body,
            10.0,
            Box::new(move |_, _, _| {
                count_inner.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let dt = 1.0 / 60.0;
        trigger.evaluate(body, 0.0, dt); // below, no crossing
        trigger.evaluate(body, 5.0, dt); // still below
        trigger.evaluate(body, 15.0, dt); // rising crossing
        trigger.evaluate(body, 20.0, dt); // still above
        trigger.evaluate(body, 1.0, dt); // falling crossing

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!trigger.is_above());
    }

    #[test]
    fn test_reports_direction() {
        let body = BodyId::new(7);
        let mut seen: Vec<bool> = Vec::new();
        {
            let seen_ptr = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
            let inner = Arc::clone(&seen_ptr);
            let mut trigger = ForceThresholdTrigger::new(
                body,
                1.0,
                Box::new(move |_, above, _| {
                    inner.lock().unwrap().push(above);
                }),
            );
            trigger.evaluate(body, 2.0, 0.01);
            trigger.evaluate(body, 0.0, 0.01);
            seen.extend(seen_ptr.lock().unwrap().iter());
        }
        assert_eq!(seen, vec![true, false]);
    }
}
