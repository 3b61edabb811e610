//! The scene: entity stores and the `tick` pipeline.

use hashbrown::HashMap;
use islet_collide::{
    narrow_phase, BroadPhaseEvent, ContactManifold, Geometry, GeometryPair, Shape, SweepAndPrune,
};
use islet_constraint::{
    contact_rows, solve_island, store_contact_impulses, ConstraintGraph, ConstraintRow, Island,
    Joint, SolverBody,
};
use islet_types::{
    BodyId, ConstraintId, GeometryId, MassProperties, Pose, Result, SimError, SimulationConfig,
};
use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::body::Body;
use crate::integrate::integrate_pose;
use crate::sleep::SleepPolicy;
use crate::trigger::Trigger;

/// Per-tick diagnostics.
///
/// Non-convergence is not an error (the solvers keep their best result);
/// the report exposes how good that result was so callers can watch
/// solver quality if they care.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    /// Broadphase pairs currently overlapping.
    pub pairs: usize,
    /// Active contact points across all manifolds.
    pub contacts: usize,
    /// Islands in the constraint graph.
    pub islands: usize,
    /// Islands that were actually solved this tick.
    pub active_islands: usize,
    /// Worst island residual (Fischer-Burmeister merit).
    pub max_residual: f64,
    /// Whether every solved island converged within tolerance.
    pub all_converged: bool,
}

/// A contact manifold plus its graph bookkeeping.
struct ManifoldEntry {
    manifold: ContactManifold,
    constraint: ConstraintId,
    geom_a: GeometryId,
    geom_b: GeometryId,
}

/// What a block of island rows belongs to, for impulse write-back.
enum RowBlock {
    Joint(ConstraintId, usize, usize),
    Contact(GeometryPair, usize, usize),
}

/// The simulation scene.
///
/// Owns every body, geometry, constraint and trigger, and advances the
/// whole world one timestep per [`tick`](Scene::tick). All entity
/// relationships run through integer handles; the scene's maps are the
/// single owner of everything.
pub struct Scene {
    config: SimulationConfig,
    policy: SleepPolicy,
    time: f64,
    step_count: u64,

    bodies: HashMap<BodyId, Body>,
    geometries: HashMap<GeometryId, Geometry>,
    joints: HashMap<ConstraintId, Joint>,
    manifolds: HashMap<GeometryPair, ManifoldEntry>,
    contact_index: HashMap<ConstraintId, GeometryPair>,

    broad_phase: SweepAndPrune,
    graph: ConstraintGraph,
    triggers: Vec<(u64, Box<dyn Trigger>)>,

    next_body: u64,
    next_geometry: u64,
    next_constraint: u64,
    next_trigger: u64,
}

impl Scene {
    /// Create a scene with the given configuration.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policy: SleepPolicy::new(config.sleep),
            config,
            time: 0.0,
            step_count: 0,
            bodies: HashMap::new(),
            geometries: HashMap::new(),
            joints: HashMap::new(),
            manifolds: HashMap::new(),
            contact_index: HashMap::new(),
            broad_phase: SweepAndPrune::new(),
            graph: ConstraintGraph::new(),
            triggers: Vec::new(),
            next_body: 1,
            next_geometry: 1,
            next_constraint: 1,
            next_trigger: 1,
        })
    }

    /// The scene configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Elapsed simulation time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed ticks.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Change the fixed timestep.
    pub fn set_timestep(&mut self, dt: f64) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }
        self.config.timestep = dt;
        Ok(())
    }

    // =====================================================================
    // Bodies
    // =====================================================================

    /// Add a dynamic body and return its handle.
    pub fn add_body(&mut self, pose: Pose, mass: MassProperties) -> BodyId {
        let id = BodyId::new(self.next_body);
        self.next_body += 1;
        self.bodies.insert(id, Body::new(id, pose, mass));
        self.graph.add_node(id, false);
        id
    }

    /// Add a fixed (infinite-mass) body and return its handle.
    pub fn add_fixed_body(&mut self, pose: Pose) -> BodyId {
        let id = BodyId::new(self.next_body);
        self.next_body += 1;
        self.bodies.insert(id, Body::new_fixed(id, pose));
        self.graph.add_node(id, true);
        id
    }

    /// Get a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    /// Iterate over all bodies.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    /// Remove a body, detaching its geometries and constraints first.
    pub fn remove_body(&mut self, id: BodyId) -> Result<()> {
        if !self.bodies.contains_key(&id) {
            return Err(SimError::UnknownBody(id.raw()));
        }

        // Joints referencing the body go first (their graph edges too)
        let joint_ids: Vec<ConstraintId> = self
            .joints
            .iter()
            .filter(|(_, j)| j.body_a == id || j.body_b == id)
            .map(|(&cid, _)| cid)
            .collect();
        for cid in joint_ids {
            self.remove_constraint(cid)?;
        }

        // Geometries, their broadphase entries and contact manifolds
        if let Some(body) = self.bodies.remove(&id) {
            for gid in &body.geometries {
                self.broad_phase.remove(*gid);
                self.geometries.remove(gid);
            }
            let doomed: Vec<GeometryPair> = self
                .manifolds
                .iter()
                .filter(|(_, e)| {
                    body.geometries.contains(&e.geom_a) || body.geometries.contains(&e.geom_b)
                })
                .map(|(&pair, _)| pair)
                .collect();
            for pair in doomed {
                if let Some(entry) = self.manifolds.remove(&pair) {
                    self.contact_index.remove(&entry.constraint);
                }
            }
        }

        // The node removal drops any remaining contact edges
        self.graph.remove_node(id)
    }

    /// Fix or release a body.
    ///
    /// Fixing zeroes the body's velocities and re-segments its islands;
    /// releasing wakes everything around it.
    pub fn fix_body(&mut self, id: BodyId, fixed: bool) -> Result<()> {
        let body = self
            .bodies
            .get_mut(&id)
            .ok_or(SimError::UnknownBody(id.raw()))?;
        body.fixed = fixed;
        if fixed {
            body.twist = islet_types::Twist::zero();
        }
        body.wake();
        self.graph.set_fixed(id, fixed)
    }

    /// Apply an external force over the next tick.
    pub fn apply_force(&mut self, id: BodyId, force: Vector3<f64>) -> Result<()> {
        let body = self
            .bodies
            .get_mut(&id)
            .ok_or(SimError::UnknownBody(id.raw()))?;
        body.apply_force(force);
        Ok(())
    }

    /// Apply an instantaneous impulse at the center of mass.
    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vector3<f64>) -> Result<()> {
        let body = self
            .bodies
            .get_mut(&id)
            .ok_or(SimError::UnknownBody(id.raw()))?;
        body.apply_impulse(impulse);
        Ok(())
    }

    // =====================================================================
    // Geometries
    // =====================================================================

    /// Attach a collision geometry to a body.
    pub fn add_geometry(&mut self, body: BodyId, shape: Shape) -> Result<GeometryId> {
        let Some(owner) = self.bodies.get_mut(&body) else {
            return Err(SimError::UnknownBody(body.raw()));
        };

        let id = GeometryId::new(self.next_geometry);
        self.next_geometry += 1;

        let mut geometry =
            Geometry::new(id, shape).with_envelope(self.config.default_envelope);
        geometry.body = Some(body);

        owner.geometries.push(id);
        self.broad_phase.add(id, geometry.aabb(&owner.pose));
        self.geometries.insert(id, geometry);
        Ok(id)
    }

    /// Get a geometry.
    #[must_use]
    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(&id)
    }

    /// Get a geometry mutably (to adjust its material or envelope).
    #[must_use]
    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.geometries.get_mut(&id)
    }

    // =====================================================================
    // Constraints
    // =====================================================================

    /// Add a joint constraint.
    pub fn add_constraint(&mut self, joint: Joint) -> Result<ConstraintId> {
        if !self.bodies.contains_key(&joint.body_a) {
            return Err(SimError::UnknownBody(joint.body_a.raw()));
        }
        if !self.bodies.contains_key(&joint.body_b) {
            return Err(SimError::UnknownBody(joint.body_b.raw()));
        }

        let id = ConstraintId::new(self.next_constraint);
        self.next_constraint += 1;
        self.graph.add_edge(joint.body_a, joint.body_b, id)?;
        self.joints.insert(id, joint);
        Ok(id)
    }

    /// Remove a joint constraint.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<()> {
        let joint = self
            .joints
            .remove(&id)
            .ok_or(SimError::UnknownConstraint(id.raw()))?;
        self.graph.remove_edge(joint.body_a, joint.body_b, id)
    }

    /// Get a joint.
    #[must_use]
    pub fn constraint(&self, id: ConstraintId) -> Option<&Joint> {
        self.joints.get(&id)
    }

    /// Mark a joint as externally driven.
    ///
    /// Monitored joints are evaluated passively even while their island
    /// sleeps, so a freshly written target velocity wakes the island.
    pub fn monitor_constraint(&mut self, id: ConstraintId) -> Result<()> {
        let joint = self
            .joints
            .get_mut(&id)
            .ok_or(SimError::UnknownConstraint(id.raw()))?;
        joint.monitored = true;
        Ok(())
    }

    /// Stop monitoring a joint.
    pub fn unmonitor_constraint(&mut self, id: ConstraintId) -> Result<()> {
        let joint = self
            .joints
            .get_mut(&id)
            .ok_or(SimError::UnknownConstraint(id.raw()))?;
        joint.monitored = false;
        Ok(())
    }

    /// Write a motor target velocity into a joint.
    pub fn set_constraint_target_velocity(&mut self, id: ConstraintId, target: f64) -> Result<()> {
        let joint = self
            .joints
            .get_mut(&id)
            .ok_or(SimError::UnknownConstraint(id.raw()))?;
        joint.set_target_velocity(target);
        Ok(())
    }

    // =====================================================================
    // Triggers
    // =====================================================================

    /// Register a trigger; returns a handle for removal.
    pub fn add_trigger(&mut self, trigger: Box<dyn Trigger>) -> u64 {
        let id = self.next_trigger;
        self.next_trigger += 1;
        self.triggers.push((id, trigger));
        id
    }

    /// Remove a trigger.
    pub fn remove_trigger(&mut self, id: u64) -> Result<()> {
        let before = self.triggers.len();
        self.triggers.retain(|(tid, _)| *tid != id);
        if self.triggers.len() == before {
            return Err(SimError::UnknownTrigger(id));
        }
        Ok(())
    }

    // =====================================================================
    // The tick pipeline
    // =====================================================================

    /// Advance the simulation one timestep.
    pub fn tick(&mut self) -> Result<TickReport> {
        let dt = self.config.timestep;

        self.run_broadphase();
        self.update_manifolds();

        let mut report = TickReport {
            pairs: self.broad_phase.overlapping_pairs().count(),
            all_converged: true,
            ..TickReport::default()
        };
        report.contacts = self.manifolds.values().map(|e| e.manifold.len()).sum();

        let islands = self.wake_and_partition();
        let body_force = self.solve_islands(&islands, dt, &mut report)?;

        self.integrate_and_sleep(&islands, dt)?;
        self.fire_triggers(&body_force, dt);

        self.time += dt;
        self.step_count += 1;

        debug!(
            step = self.step_count,
            pairs = report.pairs,
            contacts = report.contacts,
            islands = report.islands,
            active = report.active_islands,
            residual = report.max_residual,
            "tick"
        );
        Ok(report)
    }

    /// Refresh AABBs, sweep, and open/close manifolds on transitions.
    fn run_broadphase(&mut self) {
        for (gid, geometry) in &self.geometries {
            let Some(owner) = geometry.body.and_then(|b| self.bodies.get(&b)) else {
                continue;
            };
            if owner.sleeping {
                continue;
            }
            self.broad_phase.update(*gid, geometry.aabb(&owner.pose));
        }

        for event in self.broad_phase.run() {
            match event {
                BroadPhaseEvent::Overlap(pair) => self.open_manifold(pair),
                BroadPhaseEvent::Separation(pair) => self.close_manifold(pair),
            }
        }
    }

    fn open_manifold(&mut self, pair: GeometryPair) {
        let (Some(geom_a), Some(geom_b)) = (
            self.geometries.get(&pair.first),
            self.geometries.get(&pair.second),
        ) else {
            return;
        };
        let (Some(body_a), Some(body_b)) = (geom_a.body, geom_b.body) else {
            return;
        };
        if body_a == body_b {
            return;
        }
        // Two fixed bodies never need contacts
        if self.graph.is_fixed(body_a) && self.graph.is_fixed(body_b) {
            return;
        }

        let friction = (geom_a.friction * geom_b.friction).sqrt();
        let restitution = geom_a.restitution.max(geom_b.restitution);
        let shell = geom_a.envelope + geom_b.envelope;

        let constraint = ConstraintId::new(self.next_constraint);
        self.next_constraint += 1;

        if let Err(error) = self.graph.add_edge(body_a, body_b, constraint) {
            warn!(%error, "broadphase overlap for unknown bodies");
            return;
        }

        self.contact_index.insert(constraint, pair);
        self.manifolds.insert(
            pair,
            ManifoldEntry {
                manifold: ContactManifold::new(body_a, body_b, friction, restitution, shell),
                constraint,
                geom_a: pair.first,
                geom_b: pair.second,
            },
        );
    }

    fn close_manifold(&mut self, pair: GeometryPair) {
        let Some(entry) = self.manifolds.remove(&pair) else {
            return;
        };
        self.contact_index.remove(&entry.constraint);
        let (body_a, body_b) = (entry.manifold.body_a, entry.manifold.body_b);
        if let Err(error) = self.graph.remove_edge(body_a, body_b, entry.constraint) {
            warn!(%error, "contact edge already gone on separation");
        }
    }

    /// Narrow phase: refresh every overlapping manifold.
    fn update_manifolds(&mut self) {
        let pairs: Vec<GeometryPair> = self.broad_phase.overlapping_pairs().collect();
        for pair in pairs {
            let Some(entry) = self.manifolds.get_mut(&pair) else {
                continue;
            };
            let (Some(geom_a), Some(geom_b)) = (
                self.geometries.get(&entry.geom_a),
                self.geometries.get(&entry.geom_b),
            ) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (
                self.bodies.get(&entry.manifold.body_a),
                self.bodies.get(&entry.manifold.body_b),
            ) else {
                continue;
            };

            // Sleeping pairs keep their manifold untouched
            if body_a.sleeping && body_b.sleeping {
                continue;
            }

            let pose_a = body_a.pose;
            let pose_b = body_b.pose;
            entry.manifold.refresh(&pose_a, &pose_b);
            for contact in narrow_phase(geom_a, &pose_a, geom_b, &pose_b) {
                entry.manifold.add_contact(&contact, &pose_a, &pose_b);
            }
        }
    }

    /// Wake bodies touched by graph mutations and snapshot the islands.
    fn wake_and_partition(&mut self) -> Vec<Island> {
        for id in self.graph.take_woken() {
            if let Some(body) = self.bodies.get_mut(&id) {
                body.wake();
            }
        }
        self.graph.components().to_vec()
    }

    /// Solve every awake island; returns per-body total impulse for the
    /// trigger pass.
    fn solve_islands(
        &mut self,
        islands: &[Island],
        dt: f64,
        report: &mut TickReport,
    ) -> Result<HashMap<BodyId, f64>> {
        let gravity = self.config.gravity;
        let solver_config = self.config.solver;
        let mut body_force: HashMap<BodyId, f64> = HashMap::new();

        report.islands = islands.len();

        for island in islands {
            let any_awake = island
                .bodies
                .iter()
                .any(|id| self.bodies.get(id).is_some_and(|b| !b.sleeping));

            if !any_awake {
                // Sleeping island: passive pass over monitored constraints
                let must_wake = island
                    .constraints
                    .iter()
                    .any(|cid| self.joints.get(cid).is_some_and(Joint::should_activate));
                if !must_wake {
                    continue;
                }
            }
            // Solved as a unit: every member is awake
            for id in &island.bodies {
                if let Some(body) = self.bodies.get_mut(id) {
                    if body.sleeping {
                        body.wake();
                    }
                }
            }
            report.active_islands += 1;

            // -------- assemble --------
            let mut slot_ids: Vec<BodyId> = Vec::with_capacity(
                island.bodies.len() + island.fixed_bodies.len(),
            );
            let mut slot_of: HashMap<BodyId, usize> = HashMap::new();
            let mut solver_bodies: Vec<SolverBody> = Vec::with_capacity(slot_ids.capacity());

            for id in &island.bodies {
                let Some(body) = self.bodies.get(id) else {
                    continue;
                };
                let inv_inertia = body.mass.inv_inertia_world(&body.pose.rotation);
                let mut sb = SolverBody::new(
                    &body.pose,
                    body.twist.linear,
                    body.twist.angular,
                    body.inv_mass(),
                    inv_inertia,
                    false,
                );
                // External forces enter the velocities before the solve so
                // resting contacts can counteract them within the tick
                sb.velocity += (gravity + body.accumulated_force * body.inv_mass()) * dt;
                sb.omega += inv_inertia * body.accumulated_torque * dt;

                slot_of.insert(*id, solver_bodies.len());
                slot_ids.push(*id);
                solver_bodies.push(sb);
            }
            for id in &island.fixed_bodies {
                let Some(body) = self.bodies.get(id) else {
                    continue;
                };
                slot_of.insert(*id, solver_bodies.len());
                slot_ids.push(*id);
                solver_bodies.push(SolverBody::fixed_at(&body.pose));
            }

            // -------- rows --------
            let mut rows: Vec<ConstraintRow> = Vec::new();
            let mut blocks: Vec<RowBlock> = Vec::new();

            for cid in &island.constraints {
                if let Some(joint) = self.joints.get(cid) {
                    let (Some(&sa), Some(&sb)) =
                        (slot_of.get(&joint.body_a), slot_of.get(&joint.body_b))
                    else {
                        continue;
                    };
                    let joint_rows = joint.rows(sa, sb, &solver_bodies, dt, &solver_config);
                    blocks.push(RowBlock::Joint(*cid, rows.len(), joint_rows.len()));
                    rows.extend(joint_rows);
                } else if let Some(pair) = self.contact_index.get(cid) {
                    let Some(entry) = self.manifolds.get(pair) else {
                        continue;
                    };
                    if entry.manifold.is_empty() {
                        continue;
                    }
                    let (Some(&sa), Some(&sb)) = (
                        slot_of.get(&entry.manifold.body_a),
                        slot_of.get(&entry.manifold.body_b),
                    ) else {
                        continue;
                    };
                    let contact = contact_rows(
                        &entry.manifold,
                        sa,
                        sb,
                        &solver_bodies,
                        dt,
                        &solver_config,
                        rows.len(),
                    );
                    blocks.push(RowBlock::Contact(*pair, rows.len(), contact.len()));
                    rows.extend(contact);
                }
            }

            // -------- solve --------
            let solve = solve_island(&mut solver_bodies, &mut rows, &solver_config)?;
            report.max_residual = report.max_residual.max(solve.residual);
            report.all_converged &= solve.converged;

            // -------- write back --------
            for (slot, id) in slot_ids.iter().enumerate() {
                let sb = &solver_bodies[slot];
                if sb.fixed {
                    continue;
                }
                if let Some(body) = self.bodies.get_mut(id) {
                    let new_linear = sb.total_velocity();
                    let new_angular = sb.total_omega();
                    // Net velocity change over the whole tick (gravity and
                    // its cancellation by resting contacts net to zero)
                    body.last_delta = (new_linear - body.twist.linear).norm()
                        + (new_angular - body.twist.angular).norm();
                    body.twist.linear = new_linear;
                    body.twist.angular = new_angular;
                    body.accumulated_force = Vector3::zeros();
                    body.accumulated_torque = Vector3::zeros();
                }
            }

            for block in blocks {
                match block {
                    RowBlock::Joint(cid, base, count) => {
                        if let Some(joint) = self.joints.get_mut(&cid) {
                            joint.store_impulses(&rows[base..base + count]);
                        }
                    }
                    RowBlock::Contact(pair, base, count) => {
                        if let Some(entry) = self.manifolds.get_mut(&pair) {
                            store_contact_impulses(
                                &mut entry.manifold,
                                &rows[base..base + count],
                            );
                        }
                    }
                }
            }

            // Total |lambda| / dt per body feeds the trigger pass
            for row in &rows {
                let force = row.lambda.abs() / dt;
                for slot in [row.body1, row.body2] {
                    *body_force.entry(slot_ids[slot]).or_insert(0.0) += force;
                }
            }
        }

        Ok(body_force)
    }

    /// Integrate awake bodies and run the deactivation policy.
    fn integrate_and_sleep(&mut self, islands: &[Island], dt: f64) -> Result<()> {
        for body in self.bodies.values_mut() {
            if body.fixed || body.sleeping {
                continue;
            }
            integrate_pose(&mut body.pose, &body.twist, dt);
            if !body.is_finite() {
                return Err(SimError::diverged(format!(
                    "body {} has non-finite state after integration",
                    body.id
                )));
            }
        }

        // An island sleeps only when every member qualifies
        for island in islands {
            let mut all_candidates = !island.bodies.is_empty();
            for id in &island.bodies {
                let Some(body) = self.bodies.get_mut(id) else {
                    continue;
                };
                if body.sleeping {
                    continue;
                }
                if !self.policy.update(body, dt) {
                    all_candidates = false;
                }
            }
            if all_candidates {
                for id in &island.bodies {
                    if let Some(body) = self.bodies.get_mut(id) {
                        body.put_to_sleep();
                    }
                }
            }
        }
        Ok(())
    }

    /// Read-only trigger pass over the accumulated constraint forces.
    fn fire_triggers(&mut self, body_force: &HashMap<BodyId, f64>, dt: f64) {
        for (_, trigger) in &mut self.triggers {
            let body = trigger.body();
            let force = body_force.get(&body).copied().unwrap_or(0.0);
            trigger.evaluate(body, force, dt);
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
    use nalgebra::Point3;

    fn basic_scene() -> Scene {
        Scene::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn test_free_fall() {
        let mut scene = basic_scene();
        let ball = scene.add_body(
            Pose::from_position(Point3::new(0.0, 0.0, 10.0)),
            MassProperties::sphere(1.0, 0.5),
        );

        for _ in 0..60 {
            scene.tick().unwrap();
        }

        let body = scene.body(ball).unwrap();
        // After one second of free fall: z drops by ~g/2, v ~ -g
        assert!(body.pose.position.z < 6.0);
        assert!(body.twist.linear.z < -9.0);
    }

    #[test]
    fn test_fixed_body_never_moves() {
        let mut scene = basic_scene();
        let anchor = scene.add_fixed_body(Pose::from_position(Point3::new(0.0, 0.0, 5.0)));

        for _ in 0..30 {
            scene.tick().unwrap();
        }
        assert_eq!(scene.body(anchor).unwrap().pose.position.z, 5.0);
    }

    #[test]
    fn test_api_misuse_rejected() {
        let mut scene = basic_scene();
        let ghost = BodyId::new(999);

        assert!(scene.remove_body(ghost).is_err());
        assert!(scene.fix_body(ghost, true).is_err());
        assert!(scene.add_geometry(ghost, Shape::sphere(1.0)).is_err());
        assert!(scene
            .apply_impulse(ghost, Vector3::new(1.0, 0.0, 0.0))
            .is_err());
        assert!(scene.remove_constraint(ConstraintId::new(999)).is_err());
        assert!(scene.monitor_constraint(ConstraintId::new(999)).is_err());
        assert!(scene.remove_trigger(999).is_err());
        assert!(scene.set_timestep(-1.0).is_err());

        // Scene unchanged by the failures
        assert_eq!(scene.body_count(), 0);
    }

    #[test]
    fn test_remove_body_detaches_everything() {
        let mut scene = basic_scene();
        let a = scene.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.5));
        let b = scene.add_body(
            Pose::from_position(Point3::new(0.0, 0.0, 1.5)),
            MassProperties::sphere(1.0, 0.5),
        );
        scene.add_geometry(a, Shape::sphere(0.5)).unwrap();
        scene.add_geometry(b, Shape::sphere(0.5)).unwrap();
        let joint = scene
            .add_constraint(Joint::ball(a, b, Point3::origin(), Point3::origin()))
            .unwrap();

        scene.remove_body(a).unwrap();
        assert_eq!(scene.body_count(), 1);
        assert!(scene.constraint(joint).is_none());
        // Surviving body still simulates
        scene.tick().unwrap();
    }

    #[test]
    fn test_joint_keeps_bodies_attached() {
        let mut scene = basic_scene();
        let anchor = scene.add_fixed_body(Pose::from_position(Point3::new(0.0, 0.0, 5.0)));
        let bob = scene.add_body(
            Pose::from_position(Point3::new(0.0, 0.0, 4.0)),
            MassProperties::sphere(1.0, 0.25),
        );
        scene
            .add_constraint(Joint::ball(
                anchor,
                bob,
                Point3::origin(),
                Point3::new(0.0, 0.0, 1.0),
            ))
            .unwrap();

        for _ in 0..120 {
            scene.tick().unwrap();
        }

        // The bob hangs one unit below the anchor, not in free fall
        let bob_z = scene.body(bob).unwrap().pose.position.z;
        assert!(bob_z > 3.5, "bob fell to z = {bob_z}");
    }
}
