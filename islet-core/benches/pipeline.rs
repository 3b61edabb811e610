//! Benchmarks for the tick pipeline hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use islet_core::{Scene, Shape};
use islet_types::{MassProperties, Pose, SimulationConfig, SolverConfig, SolverMethod};
use nalgebra::{Point3, Vector3};

/// A grid of falling spheres over a fixed floor.
fn build_rain(count: usize) -> Scene {
    let mut scene = Scene::new(SimulationConfig::default()).expect("valid config");
    let floor = scene.add_fixed_body(Pose::identity());
    scene
        .add_geometry(floor, Shape::box_shape(Vector3::new(50.0, 50.0, 0.5)))
        .expect("floor geometry");

    let side = (count as f64).sqrt().ceil() as usize;
    for i in 0..count {
        let x = (i % side) as f64 * 1.5 - side as f64 * 0.75;
        let y = (i / side) as f64 * 1.5 - side as f64 * 0.75;
        let ball = scene.add_body(
            Pose::from_position(Point3::new(x, y, 2.0)),
            MassProperties::sphere(1.0, 0.5),
        );
        scene
            .add_geometry(ball, Shape::sphere(0.5))
            .expect("ball geometry");
    }
    scene
}

/// A column of boxes, the solver-bound workload.
fn build_stack(height: usize, method: SolverMethod) -> Scene {
    let config = SimulationConfig {
        solver: SolverConfig {
            method,
            ..SolverConfig::default()
        },
        ..SimulationConfig::default()
    };
    let mut scene = Scene::new(config).expect("valid config");
    let floor = scene.add_fixed_body(Pose::identity());
    scene
        .add_geometry(floor, Shape::box_shape(Vector3::new(20.0, 20.0, 0.5)))
        .expect("floor geometry");

    let half = Vector3::new(0.5, 0.5, 0.5);
    for level in 0..height {
        let id = scene.add_body(
            Pose::from_position(Point3::new(0.0, 0.0, 1.05 + level as f64 * 1.02)),
            MassProperties::box_shape(1.0, half),
        );
        scene
            .add_geometry(id, Shape::box_shape(half))
            .expect("box geometry");
    }
    scene
}

fn bench_rain(c: &mut Criterion) {
    c.bench_function("tick_rain_100", |b| {
        let mut scene = build_rain(100);
        // Let the spheres reach the floor so contacts exist
        for _ in 0..60 {
            scene.tick().expect("tick");
        }
        b.iter(|| {
            black_box(scene.tick().expect("tick"));
        });
    });
}

fn bench_stack(c: &mut Criterion) {
    for (name, method) in [
        ("tick_stack_10_pgs", SolverMethod::Pgs),
        ("tick_stack_10_nncg", SolverMethod::Nncg),
    ] {
        c.bench_function(name, |b| {
            let mut scene = build_stack(10, method);
            for _ in 0..120 {
                scene.tick().expect("tick");
            }
            b.iter(|| {
                black_box(scene.tick().expect("tick"));
            });
        });
    }
}

criterion_group!(benches, bench_rain, bench_stack);
criterion_main!(benches);
