//! The constraint graph: bodies as nodes, constraints as edges, islands
//! as connected components delimited by fixed bodies.
//!
//! Two bodies belong to the same island iff a chain of constraints links
//! them without passing through a fixed body. A fixed body is a
//! *delimiter*: it participates in every constraint attached to it but
//! never merges the components reachable through it, so each fixed anchor
//! independently segments the dynamic world. This is the property that
//! lets a large scene sleep and solve its resting islands independently.
//!
//! Component extraction uses union-find over the non-fixed nodes with
//! path compression, rebuilt lazily behind a dirty flag. Any edge
//! mutation records its endpoints as woken; the scene drains that list to
//! clear island sleep states.

use hashbrown::HashMap;
use islet_types::{BodyId, ConstraintId, Result, SimError};

/// One connected component of the constraint graph.
#[derive(Debug, Clone)]
pub struct Island {
    /// Non-fixed member bodies, sorted for determinism.
    pub bodies: Vec<BodyId>,
    /// Fixed bodies referenced by this island's constraints, sorted.
    pub fixed_bodies: Vec<BodyId>,
    /// Constraints belonging to this island.
    pub constraints: Vec<ConstraintId>,
}

impl Island {
    fn new() -> Self {
        Self {
            bodies: Vec::new(),
            fixed_bodies: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Whether a body is a (non-fixed) member of this island.
    #[must_use]
    pub fn contains_body(&self, body: BodyId) -> bool {
        self.bodies.binary_search(&body).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    fixed: bool,
}

fn edge_key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Constraint graph over the scene's bodies.
#[derive(Debug, Default)]
pub struct ConstraintGraph {
    nodes: HashMap<BodyId, Node>,
    edges: HashMap<(BodyId, BodyId), Vec<ConstraintId>>,
    /// Bodies touched by mutations since the last drain.
    woken: Vec<BodyId>,
    islands: Vec<Island>,
    dirty: bool,
}

impl ConstraintGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges (body pairs with at least one constraint).
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add a body node.
    pub fn add_node(&mut self, body: BodyId, fixed: bool) {
        self.nodes.insert(body, Node { fixed });
        self.dirty = true;
    }

    /// Remove a body node and all its incident edges.
    pub fn remove_node(&mut self, body: BodyId) -> Result<()> {
        if self.nodes.remove(&body).is_none() {
            return Err(SimError::UnknownBody(body.raw()));
        }
        self.edges.retain(|&(a, b), _| a != body && b != body);
        self.woken.push(body);
        self.dirty = true;
        Ok(())
    }

    /// Change a node's fixed flag, re-segmenting its neighborhood.
    pub fn set_fixed(&mut self, body: BodyId, fixed: bool) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&body)
            .ok_or(SimError::UnknownBody(body.raw()))?;
        node.fixed = fixed;
        self.woken.push(body);
        self.dirty = true;
        Ok(())
    }

    /// Whether a node is currently fixed.
    #[must_use]
    pub fn is_fixed(&self, body: BodyId) -> bool {
        self.nodes.get(&body).is_some_and(|n| n.fixed)
    }

    /// Add a constraint edge between two bodies.
    ///
    /// Both endpoints wake; the component partition is recomputed on the
    /// next [`components`](Self::components) call.
    pub fn add_edge(&mut self, a: BodyId, b: BodyId, constraint: ConstraintId) -> Result<()> {
        if !self.nodes.contains_key(&a) {
            return Err(SimError::UnknownBody(a.raw()));
        }
        if !self.nodes.contains_key(&b) {
            return Err(SimError::UnknownBody(b.raw()));
        }
        self.edges.entry(edge_key(a, b)).or_default().push(constraint);
        self.woken.push(a);
        self.woken.push(b);
        self.dirty = true;
        Ok(())
    }

    /// Remove a constraint edge.
    pub fn remove_edge(&mut self, a: BodyId, b: BodyId, constraint: ConstraintId) -> Result<()> {
        let key = edge_key(a, b);
        let Some(list) = self.edges.get_mut(&key) else {
            return Err(SimError::UnknownConstraint(constraint.raw()));
        };
        let Some(index) = list.iter().position(|&c| c == constraint) else {
            return Err(SimError::UnknownConstraint(constraint.raw()));
        };
        list.swap_remove(index);
        if list.is_empty() {
            self.edges.remove(&key);
        }
        self.woken.push(a);
        self.woken.push(b);
        self.dirty = true;
        Ok(())
    }

    /// Drain the bodies touched by mutations since the last call.
    pub fn take_woken(&mut self) -> Vec<BodyId> {
        std::mem::take(&mut self.woken)
    }

    /// The current island partition.
    ///
    /// Every non-fixed body belongs to exactly one island (bodies without
    /// constraints form singleton islands). Fixed bodies never join an
    /// island as members; constraints between two fixed bodies join no
    /// island at all.
    pub fn components(&mut self) -> &[Island] {
        if self.dirty {
            self.rebuild();
            self.dirty = false;
        }
        &self.islands
    }

    fn rebuild(&mut self) {
        // Index the non-fixed bodies
        let mut dynamic_bodies: Vec<BodyId> = self
            .nodes
            .iter()
            .filter(|(_, n)| !n.fixed)
            .map(|(&id, _)| id)
            .collect();
        dynamic_bodies.sort_unstable();

        let index_of: HashMap<BodyId, usize> = dynamic_bodies
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        // Union only through edges whose endpoints are both dynamic; a
        // fixed endpoint is a cut point and never merges anything.
        let mut union_find = UnionFind::new(dynamic_bodies.len());
        for &(a, b) in self.edges.keys() {
            if let (Some(&ia), Some(&ib)) = (index_of.get(&a), index_of.get(&b)) {
                union_find.union(ia, ib);
            }
        }

        // One island per root, in deterministic body order
        let mut root_to_island: HashMap<usize, usize> = HashMap::new();
        let mut islands: Vec<Island> = Vec::new();
        for (i, &body) in dynamic_bodies.iter().enumerate() {
            let root = union_find.find(i);
            let island_index = *root_to_island.entry(root).or_insert_with(|| {
                islands.push(Island::new());
                islands.len() - 1
            });
            islands[island_index].bodies.push(body);
        }

        // Attach constraints and fixed anchors to their islands
        for (&(a, b), constraints) in &self.edges {
            let island_index = index_of
                .get(&a)
                .or_else(|| index_of.get(&b))
                .map(|&i| root_to_island[&union_find.find(i)]);
            let Some(island_index) = island_index else {
                // Both endpoints fixed: no dynamic island to join
                continue;
            };

            let island = &mut islands[island_index];
            island.constraints.extend(constraints.iter().copied());
            for body in [a, b] {
                if self.nodes.get(&body).is_some_and(|n| n.fixed) {
                    island.fixed_bodies.push(body);
                }
            }
        }

        for island in &mut islands {
            island.bodies.sort_unstable();
            island.fixed_bodies.sort_unstable();
            island.fixed_bodies.dedup();
            island.constraints.sort_unstable();
        }

        self.islands = islands;
    }
}

/// Union-find with path halving and union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn body(id: u64) -> BodyId {
        BodyId::new(id)
    }

    fn constraint(id: u64) -> ConstraintId {
        ConstraintId::new(id)
    }

    #[test]
    fn test_edge_joins_two_singletons() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), false);
        graph.add_node(body(2), false);

        // Two singleton islands before the edge
        assert_eq!(graph.components().len(), 2);

        graph.add_edge(body(1), body(2), constraint(10)).unwrap();
        let islands = graph.components();
        assert_eq!(islands.len(), 1);
        assert!(islands[0].contains_body(body(1)));
        assert!(islands[0].contains_body(body(2)));
        assert_eq!(islands[0].constraints, vec![constraint(10)]);
    }

    #[test]
    fn test_edge_removal_splits_island() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), false);
        graph.add_node(body(2), false);
        graph.add_edge(body(1), body(2), constraint(10)).unwrap();
        assert_eq!(graph.components().len(), 1);

        graph.remove_edge(body(1), body(2), constraint(10)).unwrap();
        let islands = graph.components();
        assert_eq!(islands.len(), 2);
        assert!(islands.iter().all(|i| i.constraints.is_empty()));
    }

    /// A chain A - B - C with B fixed yields two independent islands.
    #[test]
    fn test_fixed_body_delimits_chain() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), false);
        graph.add_node(body(2), true);
        graph.add_node(body(3), false);
        graph.add_edge(body(1), body(2), constraint(10)).unwrap();
        graph.add_edge(body(2), body(3), constraint(11)).unwrap();

        let islands = graph.components();
        assert_eq!(islands.len(), 2);
        for island in islands {
            assert_eq!(island.bodies.len(), 1);
            assert_eq!(island.fixed_bodies, vec![body(2)]);
            assert_eq!(island.constraints.len(), 1);
        }
    }

    #[test]
    fn test_unfixing_merges_chain() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), false);
        graph.add_node(body(2), true);
        graph.add_node(body(3), false);
        graph.add_edge(body(1), body(2), constraint(10)).unwrap();
        graph.add_edge(body(2), body(3), constraint(11)).unwrap();
        assert_eq!(graph.components().len(), 2);

        graph.set_fixed(body(2), false).unwrap();
        let islands = graph.components();
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].bodies.len(), 3);
        assert_eq!(islands[0].constraints.len(), 2);
    }

    #[test]
    fn test_fixed_fixed_edge_joins_no_island() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), true);
        graph.add_node(body(2), true);
        graph.add_edge(body(1), body(2), constraint(10)).unwrap();

        assert!(graph.components().is_empty());
    }

    #[test]
    fn test_mutations_wake_endpoints() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), false);
        graph.add_node(body(2), false);
        let _ = graph.take_woken();

        graph.add_edge(body(1), body(2), constraint(10)).unwrap();
        let woken = graph.take_woken();
        assert!(woken.contains(&body(1)));
        assert!(woken.contains(&body(2)));
        assert!(graph.take_woken().is_empty());
    }

    #[test]
    fn test_unknown_entities_rejected() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), false);

        assert!(matches!(
            graph.add_edge(body(1), body(9), constraint(10)),
            Err(SimError::UnknownBody(9))
        ));
        assert!(graph.remove_node(body(9)).is_err());
        assert!(graph.set_fixed(body(9), true).is_err());
        assert!(matches!(
            graph.remove_edge(body(1), body(1), constraint(10)),
            Err(SimError::UnknownConstraint(10))
        ));
    }

    #[test]
    fn test_multiple_constraints_per_edge() {
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(1), false);
        graph.add_node(body(2), false);
        graph.add_edge(body(1), body(2), constraint(10)).unwrap();
        graph.add_edge(body(1), body(2), constraint(11)).unwrap();

        assert_eq!(graph.edge_count(), 1);
        {
            let islands = graph.components();
            assert_eq!(islands.len(), 1);
            assert_eq!(islands[0].constraints.len(), 2);
        }

        // Removing one keeps the island connected
        graph.remove_edge(body(1), body(2), constraint(10)).unwrap();
        let islands = graph.components();
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].constraints, vec![constraint(11)]);
    }

    #[test]
    fn test_two_stacks_on_one_floor_are_independent() {
        // Floor (fixed) with two separate columns on top
        let mut graph = ConstraintGraph::new();
        graph.add_node(body(0), true);
        for id in 1..=4 {
            graph.add_node(body(id), false);
        }
        // Column 1: floor-1, 1-2. Column 2: floor-3, 3-4.
        graph.add_edge(body(0), body(1), constraint(10)).unwrap();
        graph.add_edge(body(1), body(2), constraint(11)).unwrap();
        graph.add_edge(body(0), body(3), constraint(12)).unwrap();
        graph.add_edge(body(3), body(4), constraint(13)).unwrap();

        let islands = graph.components();
        assert_eq!(islands.len(), 2, "the fixed floor must not merge columns");
        for island in islands {
            assert_eq!(island.bodies.len(), 2);
            assert_eq!(island.fixed_bodies, vec![body(0)]);
        }
    }
}
