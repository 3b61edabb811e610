//! Incremental sweep-and-prune broadphase.
//!
//! Maintains, per coordinate axis, a sorted list of AABB interval
//! endpoints. Each [`SweepAndPrune::run`] pass refreshes endpoint values
//! and repairs the ordering with an insertion sort, which is near O(n) on
//! coherent motion since almost everything is already sorted. Every
//! adjacent endpoint swap updates a per-pair axis-overlap counter; a pair
//! whose counter reaches three overlaps on every axis and an
//! [`BroadPhaseEvent::Overlap`] is emitted, and symmetrically a
//! [`BroadPhaseEvent::Separation`] when the counter drops back. The
//! structure holds no state beyond the endpoint arrays and the counter
//! map.

use hashbrown::{HashMap, HashSet};
use islet_types::GeometryId;
use tracing::trace;

use crate::Aabb;

/// Canonical unordered pair of geometry handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryPair {
    /// The smaller handle.
    pub first: GeometryId,
    /// The larger handle.
    pub second: GeometryId,
}

impl GeometryPair {
    /// Create a canonical pair (always stores the smaller handle first).
    #[must_use]
    pub fn new(a: GeometryId, b: GeometryId) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }
}

/// Overlap-state transition reported by the broadphase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadPhaseEvent {
    /// The pair's AABBs began overlapping this pass.
    Overlap(GeometryPair),
    /// The pair's AABBs stopped overlapping this pass.
    Separation(GeometryPair),
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    id: GeometryId,
    value: f64,
    is_min: bool,
}

/// Incremental sweep-and-prune over all registered geometries.
#[derive(Debug, Default)]
pub struct SweepAndPrune {
    /// Sorted endpoint lists, one per coordinate axis.
    axes: [Vec<Endpoint>; 3],
    /// Current AABB per geometry.
    boxes: HashMap<GeometryId, Aabb>,
    /// Number of axes (0-3) on which each pair's intervals overlap.
    counters: HashMap<GeometryPair, u8>,
    /// Pairs currently overlapping on all three axes.
    pairs: HashSet<GeometryPair>,
    /// Events accumulated since the last `run`.
    pending: Vec<BroadPhaseEvent>,
}

impl SweepAndPrune {
    /// Create an empty broadphase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered geometries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Whether no geometries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// The current set of overlapping pairs.
    pub fn overlapping_pairs(&self) -> impl Iterator<Item = GeometryPair> + '_ {
        self.pairs.iter().copied()
    }

    /// Register a geometry with its initial AABB.
    ///
    /// New endpoints enter at the far right of every axis (as if at
    /// infinity), so the next [`run`](Self::run) sorts them into place and
    /// generates the corresponding overlap transitions.
    pub fn add(&mut self, id: GeometryId, aabb: Aabb) {
        if self.boxes.contains_key(&id) {
            self.update(id, aabb);
            return;
        }
        self.boxes.insert(id, aabb);
        for axis in &mut self.axes {
            axis.push(Endpoint {
                id,
                value: f64::INFINITY,
                is_min: true,
            });
            axis.push(Endpoint {
                id,
                value: f64::INFINITY,
                is_min: false,
            });
        }
    }

    /// Update a geometry's AABB. Takes effect at the next `run`.
    pub fn update(&mut self, id: GeometryId, aabb: Aabb) {
        if let Some(stored) = self.boxes.get_mut(&id) {
            *stored = aabb;
        }
    }

    /// Remove a geometry, emitting separations for its active pairs.
    pub fn remove(&mut self, id: GeometryId) {
        if self.boxes.remove(&id).is_none() {
            return;
        }
        for axis in &mut self.axes {
            axis.retain(|e| e.id != id);
        }
        let doomed: Vec<GeometryPair> = self
            .counters
            .keys()
            .filter(|pair| pair.first == id || pair.second == id)
            .copied()
            .collect();
        for pair in doomed {
            self.counters.remove(&pair);
            if self.pairs.remove(&pair) {
                self.pending.push(BroadPhaseEvent::Separation(pair));
            }
        }
    }

    /// Refresh endpoint values, re-sort, and return overlap transitions.
    pub fn run(&mut self) -> Vec<BroadPhaseEvent> {
        // Refresh endpoint values from the current AABBs
        for (axis_index, axis) in self.axes.iter_mut().enumerate() {
            for endpoint in axis.iter_mut() {
                if let Some(aabb) = self.boxes.get(&endpoint.id) {
                    endpoint.value = if endpoint.is_min {
                        aabb.min_on_axis(axis_index)
                    } else {
                        aabb.max_on_axis(axis_index)
                    };
                }
            }
        }

        // Insertion sort per axis; each adjacent swap is an interval
        // endpoint crossing and updates the pair's axis-overlap counter.
        // Ties order minima before maxima so exactly-touching intervals
        // count as overlapping.
        let out_of_order = |left: &Endpoint, right: &Endpoint| {
            left.value > right.value
                || (left.value == right.value && !left.is_min && right.is_min)
        };
        for axis_index in 0..3 {
            let mut i = 1;
            while i < self.axes[axis_index].len() {
                let mut j = i;
                while j > 0
                    && out_of_order(
                        &self.axes[axis_index][j - 1],
                        &self.axes[axis_index][j],
                    )
                {
                    let left = self.axes[axis_index][j - 1];
                    let right = self.axes[axis_index][j];
                    self.axes[axis_index].swap(j - 1, j);

                    if left.id != right.id {
                        let pair = GeometryPair::new(left.id, right.id);
                        if right.is_min && !left.is_min {
                            // A minimum moved left past a maximum: the
                            // intervals now overlap on this axis.
                            self.increment(pair);
                        } else if !right.is_min && left.is_min {
                            // A maximum moved left past a minimum: the
                            // intervals no longer overlap on this axis.
                            self.decrement(pair);
                        }
                    }
                    j -= 1;
                }
                i += 1;
            }
        }

        trace!(
            geometries = self.boxes.len(),
            pairs = self.pairs.len(),
            "broadphase pass"
        );

        std::mem::take(&mut self.pending)
    }

    fn increment(&mut self, pair: GeometryPair) {
        let counter = self.counters.entry(pair).or_insert(0);
        *counter += 1;
        if *counter == 3 && self.pairs.insert(pair) {
            self.pending.push(BroadPhaseEvent::Overlap(pair));
        }
    }

    fn decrement(&mut self, pair: GeometryPair) {
        if let Some(counter) = self.counters.get_mut(&pair) {
            if *counter > 0 {
                *counter -= 1;
            }
            if *counter < 3 && self.pairs.remove(&pair) {
                self.pending.push(BroadPhaseEvent::Separation(pair));
            }
            if *counter == 0 {
                self.counters.remove(&pair);
            }
        }
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
    use nalgebra::{Point3, Vector3};

    fn unit_box_at(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::from_center(Point3::new(x, y, z), Vector3::new(0.5, 0.5, 0.5))
    }

    fn overlaps(events: &[BroadPhaseEvent]) -> Vec<GeometryPair> {
        events
            .iter()
            .filter_map(|e| match e {
                BroadPhaseEvent::Overlap(p) => Some(*p),
                BroadPhaseEvent::Separation(_) => None,
            })
            .collect()
    }

    fn separations(events: &[BroadPhaseEvent]) -> Vec<GeometryPair> {
        events
            .iter()
            .filter_map(|e| match e {
                BroadPhaseEvent::Separation(p) => Some(*p),
                BroadPhaseEvent::Overlap(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_overlap_event_on_add() {
        let mut sap = SweepAndPrune::new();
        sap.add(GeometryId::new(1), unit_box_at(0.0, 0.0, 0.0));
        sap.add(GeometryId::new(2), unit_box_at(0.5, 0.0, 0.0));

        let events = sap.run();
        let overlaps = overlaps(&events);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(
            overlaps[0],
            GeometryPair::new(GeometryId::new(1), GeometryId::new(2))
        );
        assert_eq!(sap.overlapping_pairs().count(), 1);
    }

    #[test]
    fn test_no_event_when_separated() {
        let mut sap = SweepAndPrune::new();
        sap.add(GeometryId::new(1), unit_box_at(0.0, 0.0, 0.0));
        sap.add(GeometryId::new(2), unit_box_at(5.0, 0.0, 0.0));

        let events = sap.run();
        assert!(events.is_empty());
        assert_eq!(sap.overlapping_pairs().count(), 0);
    }

    #[test]
    fn test_separation_event_on_motion() {
        let mut sap = SweepAndPrune::new();
        sap.add(GeometryId::new(1), unit_box_at(0.0, 0.0, 0.0));
        sap.add(GeometryId::new(2), unit_box_at(0.5, 0.0, 0.0));
        let _ = sap.run();

        // Move body 2 away in small steps; exactly one separation fires
        let mut separation_count = 0;
        for step in 1..=10 {
            sap.update(
                GeometryId::new(2),
                unit_box_at(0.5 + f64::from(step) * 0.4, 0.0, 0.0),
            );
            separation_count += separations(&sap.run()).len();
        }
        assert_eq!(separation_count, 1);
        assert_eq!(sap.overlapping_pairs().count(), 0);
    }

    #[test]
    fn test_re_overlap_after_separation() {
        let mut sap = SweepAndPrune::new();
        sap.add(GeometryId::new(1), unit_box_at(0.0, 0.0, 0.0));
        sap.add(GeometryId::new(2), unit_box_at(3.0, 0.0, 0.0));
        let _ = sap.run();

        sap.update(GeometryId::new(2), unit_box_at(0.25, 0.0, 0.0));
        let events = sap.run();
        assert_eq!(overlaps(&events).len(), 1);

        sap.update(GeometryId::new(2), unit_box_at(3.0, 0.0, 0.0));
        let events = sap.run();
        assert_eq!(separations(&events).len(), 1);
    }

    #[test]
    fn test_overlap_requires_all_three_axes() {
        let mut sap = SweepAndPrune::new();
        sap.add(GeometryId::new(1), unit_box_at(0.0, 0.0, 0.0));
        // Overlapping on X and Y only
        sap.add(GeometryId::new(2), unit_box_at(0.25, 0.25, 5.0));

        let events = sap.run();
        assert!(events.is_empty());
    }

    #[test]
    fn test_remove_emits_separation() {
        let mut sap = SweepAndPrune::new();
        sap.add(GeometryId::new(1), unit_box_at(0.0, 0.0, 0.0));
        sap.add(GeometryId::new(2), unit_box_at(0.5, 0.0, 0.0));
        let _ = sap.run();

        sap.remove(GeometryId::new(2));
        let events = sap.run();
        assert_eq!(separations(&events).len(), 1);
        assert_eq!(sap.len(), 1);
    }

    #[test]
    fn test_many_bodies_pair_set_matches_brute_force() {
        let mut sap = SweepAndPrune::new();
        let mut boxes = Vec::new();
        for i in 0..20u64 {
            // Deterministic scattered layout with some overlaps
            let x = (i as f64 * 0.7).sin() * 5.0;
            let y = (i as f64 * 1.3).cos() * 5.0;
            let z = (i as f64 * 0.31).sin() * 2.0;
            let aabb = unit_box_at(x, y, z);
            boxes.push((GeometryId::new(i), aabb));
            sap.add(GeometryId::new(i), aabb);
        }
        let _ = sap.run();

        let mut expected = HashSet::new();
        for (i, (id_a, box_a)) in boxes.iter().enumerate() {
            for (id_b, box_b) in boxes.iter().skip(i + 1) {
                if box_a.overlaps(box_b) {
                    expected.insert(GeometryPair::new(*id_a, *id_b));
                }
            }
        }

        let actual: HashSet<_> = sap.overlapping_pairs().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_incremental_motion_matches_brute_force() {
        let mut sap = SweepAndPrune::new();
        for i in 0..8u64 {
            sap.add(GeometryId::new(i), unit_box_at(i as f64 * 3.0, 0.0, 0.0));
        }
        let _ = sap.run();

        // Sweep body 0 across the whole row and back
        for step in 0..60 {
            let x = f64::from(step) * 0.5;
            sap.update(GeometryId::new(0), unit_box_at(x, 0.0, 0.0));
            let _ = sap.run();

            let mut expected = HashSet::new();
            let pos0 = unit_box_at(x, 0.0, 0.0);
            for i in 1..8u64 {
                let other = unit_box_at(i as f64 * 3.0, 0.0, 0.0);
                if pos0.overlaps(&other) {
                    expected.insert(GeometryPair::new(GeometryId::new(0), GeometryId::new(i)));
                }
            }
            let actual: HashSet<_> = sap.overlapping_pairs().collect();
            assert_eq!(actual, expected, "mismatch at x = {x}");
        }
    }
}
