//! End-to-end scene tests: drop, settle, sleep, wake, joints, triggers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use islet_core::{
    Body, ForceThresholdTrigger, Joint, Motor, Scene, Shape, SolverConfig, SolverMethod,
};
use islet_types::{BodyId, MassProperties, Pose, SimulationConfig};
use nalgebra::{Point3, Vector3};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const DT: f64 = 1.0 / 60.0;

fn scene_with_floor() -> (Scene, BodyId) {
    let mut scene = Scene::new(SimulationConfig::default()).unwrap();
    let floor = scene.add_fixed_body(Pose::identity());
    scene
        .add_geometry(floor, Shape::box_shape(Vector3::new(20.0, 20.0, 0.5)))
        .unwrap();
    (scene, floor)
}

fn drop_ball(scene: &mut Scene, z: f64) -> BodyId {
    let ball = scene.add_body(
        Pose::from_position(Point3::new(0.0, 0.0, z)),
        MassProperties::sphere(1.0, 0.5),
    );
    scene.add_geometry(ball, Shape::sphere(0.5)).unwrap();
    ball
}

fn speed(body: &Body) -> f64 {
    body.twist.speed() + body.twist.angular_speed()
}

/// A unit sphere dropped onto a fixed floor settles within a bounded tick
/// count, with resting penetration inside the envelope.
#[test]
fn sphere_settles_on_floor() {
    let (mut scene, _floor) = scene_with_floor();
    let ball = drop_ball(&mut scene, 2.0);

    for _ in 0..180 {
        scene.tick().unwrap();
    }

    let body = scene.body(ball).unwrap();
    assert!(speed(body) < 1e-3, "ball still moving: {}", speed(body));

    // Floor top at z = 0.5, ball radius 0.5: resting center near z = 1,
    // never deeper than the combined envelope (2 * 0.125)
    let z = body.pose.position.z;
    assert!(z > 1.0 - 0.25, "ball sank too deep: z = {z}");
    assert!(z < 1.0 + 0.26, "ball floating too high: z = {z}");
}

/// The settled ball goes to sleep, and an impulse wakes it again.
#[test]
fn settled_ball_sleeps_and_wakes_on_impulse() {
    let (mut scene, _floor) = scene_with_floor();
    let ball = drop_ball(&mut scene, 1.5);

    for _ in 0..240 {
        scene.tick().unwrap();
    }
    assert!(scene.body(ball).unwrap().sleeping, "ball should sleep");

    scene
        .apply_impulse(ball, Vector3::new(0.0, 0.0, 3.0))
        .unwrap();
    scene.tick().unwrap();

    let body = scene.body(ball).unwrap();
    assert!(!body.sleeping);
    assert!(body.twist.linear.z > 0.0, "impulse should lift the ball");
}

/// An impulse on one body of a sleeping island wakes every member.
#[test]
fn impulse_wakes_whole_island() {
    let (mut scene, _floor) = scene_with_floor();

    // Two balls resting side by side, joined so they share an island
    let left = drop_ball(&mut scene, 1.2);
    let right = scene.add_body(
        Pose::from_position(Point3::new(1.2, 0.0, 1.2)),
        MassProperties::sphere(1.0, 0.5),
    );
    scene.add_geometry(right, Shape::sphere(0.5)).unwrap();
    scene
        .add_constraint(Joint::ball(
            left,
            right,
            Point3::new(0.6, 0.0, 0.0),
            Point3::new(-0.6, 0.0, 0.0),
        ))
        .unwrap();

    for _ in 0..360 {
        scene.tick().unwrap();
    }
    assert!(scene.body(left).unwrap().sleeping);
    assert!(scene.body(right).unwrap().sleeping);

    scene
        .apply_impulse(left, Vector3::new(0.0, 0.0, 2.0))
        .unwrap();
    scene.tick().unwrap();

    assert!(!scene.body(left).unwrap().sleeping);
    assert!(
        !scene.body(right).unwrap().sleeping,
        "the whole island must wake"
    );
}

/// A monitored motor joint wakes its sleeping island when a target
/// velocity is written in.
#[test]
fn monitored_joint_wakes_island() {
    let mut scene = Scene::new(SimulationConfig::default().zero_gravity()).unwrap();

    let anchor = scene.add_fixed_body(Pose::identity());
    let rotor = scene.add_body(
        Pose::from_position(Point3::new(0.0, 0.0, 0.0)),
        MassProperties::sphere(1.0, 0.5),
    );
    let joint = scene
        .add_constraint(
            Joint::hinge(
                anchor,
                rotor,
                Point3::origin(),
                Point3::origin(),
                Vector3::z(),
            )
            .with_motor(Motor {
                target_velocity: 0.0,
                max_torque: 10.0,
            }),
        )
        .unwrap();
    scene.monitor_constraint(joint).unwrap();

    // Nothing moves: the island goes to sleep
    for _ in 0..120 {
        scene.tick().unwrap();
    }
    assert!(scene.body(rotor).unwrap().sleeping);

    // An external controller writes a target: the island must wake and spin
    scene.set_constraint_target_velocity(joint, 2.0).unwrap();
    for _ in 0..10 {
        scene.tick().unwrap();
    }

    let body = scene.body(rotor).unwrap();
    assert!(!body.sleeping, "monitored joint must wake the island");
    assert!(
        body.twist.angular.z > 1.0,
        "rotor should spin up, got {}",
        body.twist.angular.z
    );
}

/// Impact forces reach triggers; triggers observe without mutating.
#[test]
fn trigger_fires_on_impact() {
    let (mut scene, _floor) = scene_with_floor();
    let ball = drop_ball(&mut scene, 2.0);

    let crossings = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&crossings);
    scene.add_trigger(Box::new(ForceThresholdTrigger::new(
        ball,
        1.0,
        Box::new(move |_, above, _| {
            if above {
                inner.fetch_add(1, Ordering::SeqCst);
            }
        }),
    )));

    for _ in 0..180 {
        scene.tick().unwrap();
    }

    assert!(
        crossings.load(Ordering::SeqCst) >= 1,
        "impact should cross the force threshold"
    );
}

/// A small box stack settles under both solvers.
#[test]
fn box_stack_settles_with_both_solvers() {
    for method in [SolverMethod::Pgs, SolverMethod::Nncg] {
        let config = SimulationConfig {
            solver: SolverConfig {
                method,
                iterations: 30,
                ..SolverConfig::default()
            },
            ..SimulationConfig::default()
        };
        let mut scene = Scene::new(config).unwrap();
        let floor = scene.add_fixed_body(Pose::identity());
        scene
            .add_geometry(floor, Shape::box_shape(Vector3::new(20.0, 20.0, 0.5)))
            .unwrap();

        let half = Vector3::new(0.5, 0.5, 0.5);
        let mut boxes = Vec::new();
        for level in 0..3 {
            let z = 1.1 + 1.05 * f64::from(level);
            let id = scene.add_body(
                Pose::from_position(Point3::new(0.0, 0.0, z)),
                MassProperties::box_shape(1.0, half),
            );
            scene.add_geometry(id, Shape::box_shape(half)).unwrap();
            boxes.push(id);
        }

        for _ in 0..400 {
            scene.tick().unwrap();
        }

        for (level, id) in boxes.iter().enumerate() {
            let body = scene.body(*id).unwrap();
            assert!(
                speed(body) < 0.05,
                "{method:?}: box {level} still moving at {}",
                speed(body)
            );
            // Stack order preserved: each box above the previous one
            let expected_z = 1.0 + f64::from(level as u32);
            assert!(
                (body.pose.position.z - expected_z).abs() < 0.5,
                "{method:?}: box {level} at z = {}",
                body.pose.position.z
            );
        }
    }
}

/// Two separate piles sleep independently: disturbing one leaves the
/// other asleep.
#[test]
fn independent_islands_sleep_independently() {
    let (mut scene, _floor) = scene_with_floor();
    let near = drop_ball(&mut scene, 1.2);

    let far = scene.add_body(
        Pose::from_position(Point3::new(10.0, 0.0, 1.2)),
        MassProperties::sphere(1.0, 0.5),
    );
    scene.add_geometry(far, Shape::sphere(0.5)).unwrap();

    for _ in 0..300 {
        scene.tick().unwrap();
    }
    assert!(scene.body(near).unwrap().sleeping);
    assert!(scene.body(far).unwrap().sleeping);

    scene
        .apply_impulse(near, Vector3::new(0.0, 0.0, 2.0))
        .unwrap();
    for _ in 0..5 {
        scene.tick().unwrap();
    }

    assert!(!scene.body(near).unwrap().sleeping);
    assert!(
        scene.body(far).unwrap().sleeping,
        "the distant island must stay asleep"
    );
}

/// Restitution bounces a ball; zero restitution does not.
#[test]
fn restitution_controls_bounce() {
    let rebound = |restitution: f64| -> f64 {
        let mut scene = Scene::new(SimulationConfig::default()).unwrap();
        let floor = scene.add_fixed_body(Pose::identity());
        let fg = scene
            .add_geometry(floor, Shape::box_shape(Vector3::new(20.0, 20.0, 0.5)))
            .unwrap();
        scene.geometry_mut(fg).unwrap().restitution = restitution;

        let ball = scene.add_body(
            Pose::from_position(Point3::new(0.0, 0.0, 3.0)),
            MassProperties::sphere(1.0, 0.5),
        );
        let bg = scene.add_geometry(ball, Shape::sphere(0.5)).unwrap();
        scene.geometry_mut(bg).unwrap().restitution = restitution;

        let mut peak_after_impact: f64 = 0.0;
        let mut impacted = false;
        for _ in 0..240 {
            scene.tick().unwrap();
            let body = scene.body(ball).unwrap();
            if body.twist.linear.z > 0.1 {
                impacted = true;
            }
            if impacted {
                peak_after_impact = peak_after_impact.max(body.twist.linear.z);
            }
        }
        peak_after_impact
    };

    let lively = rebound(0.8);
    let dead = rebound(0.0);
    assert!(lively > 1.0, "restituting ball should rebound, got {lively}");
    assert!(dead < 0.2, "dead ball should not rebound, got {dead}");
}

/// Fixing a body mid-simulation freezes it and re-segments its island.
#[test]
fn fix_body_freezes_and_segments() {
    let mut scene = Scene::new(SimulationConfig::default()).unwrap();
    let a = scene.add_body(
        Pose::from_position(Point3::new(0.0, 0.0, 5.0)),
        MassProperties::sphere(1.0, 0.5),
    );

    scene.fix_body(a, true).unwrap();
    for _ in 0..30 {
        scene.tick().unwrap();
    }
    assert_eq!(scene.body(a).unwrap().pose.position.z, 5.0);

    scene.fix_body(a, false).unwrap();
    for _ in 0..30 {
        scene.tick().unwrap();
    }
    assert!(scene.body(a).unwrap().pose.position.z < 5.0, "released body falls");
}

/// Solver diagnostics surface through the tick report.
#[test]
fn tick_report_exposes_diagnostics() {
    let (mut scene, _floor) = scene_with_floor();
    let _ball = drop_ball(&mut scene, 1.2);

    let mut saw_contact = false;
    for _ in 0..120 {
        let report = scene.tick().unwrap();
        if report.contacts > 0 {
            saw_contact = true;
            assert!(report.pairs >= 1);
            assert!(report.active_islands >= 1 || report.islands >= 1);
            assert!(report.max_residual.is_finite());
        }
    }
    assert!(saw_contact, "the drop should produce contacts");
}
