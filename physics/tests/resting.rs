mod common;

use approx::assert_abs_diff_eq;
use physics::dynamics::BodyPairKey;
use physics::{PhysicsConfig, Primitive, SolverType, Vec3};

use common::*;

fn no_freezing() -> PhysicsConfig {
    PhysicsConfig::default().with_freezing(false)
}

#[test]
fn sphere_comes_to_rest_on_ground() {
    let mut sys = world(no_freezing());
    ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 3.0, 0.0));
    run(&mut sys, 3.0);
    assert_abs_diff_eq!(height(&sys, b), 1.0, epsilon = 0.05);
    assert!(sys.body(b).unwrap().velocity().norm() < 0.2);
    assert!(sys.num_collisions() > 0);
}

#[test]
fn every_solver_holds_a_resting_sphere() {
    for solver in [
        SolverType::Fast,
        SolverType::Normal,
        SolverType::Combined,
        SolverType::Accumulated,
    ] {
        let mut sys = world(no_freezing().with_solver(solver));
        ground(&mut sys);
        let b = sphere(&mut sys, Vec3::new(0.0, 1.5, 0.0));
        run(&mut sys, 3.0);
        let y = height(&sys, b);
        assert!((y - 1.0).abs() < 0.05, "{solver:?} left the sphere at y = {y}");
    }
}

#[test]
fn sphere_rests_on_immovable_sphere() {
    let mut sys = world(no_freezing().with_gravity(Vec3::new(0.0, -10.0, 0.0)));
    let base = sphere(&mut sys, Vec3::zeros());
    sys.body_mut(base).unwrap().set_immovable(true);
    let top = sphere(&mut sys, Vec3::new(0.0, 5.0, 0.0));
    run(&mut sys, 4.0);

    assert_abs_diff_eq!(height(&sys, top), 2.0, epsilon = 0.05);
    assert!(sys.body(top).unwrap().velocity().y.abs() < 0.2);
    let base = sys.body(base).unwrap();
    assert_eq!(base.position(), Vec3::zeros());
    assert_eq!(base.velocity(), Vec3::zeros());
}

#[test]
fn box_settles_flat_on_ground() {
    let mut sys = world(no_freezing());
    ground(&mut sys);
    let b = body_with(&mut sys, Primitive::cuboid(Vec3::repeat(0.5)), Vec3::new(0.0, 2.0, 0.0), 2.0);
    run(&mut sys, 3.0);
    let body = sys.body(b).unwrap();
    assert_abs_diff_eq!(body.position().y, 0.5, epsilon = 0.05);
    // Still upright.
    let up = body.orientation() * Vec3::y();
    assert!(up.y > 0.99, "box tipped over: up = {up:?}");
}

#[test]
fn shock_step_keeps_a_stack_upright() {
    let mut sys = world(no_freezing().with_shock_step(true));
    ground(&mut sys);
    let cube = Primitive::cuboid(Vec3::repeat(0.5));
    let lower = body_with(&mut sys, cube, Vec3::new(0.0, 0.5, 0.0), 1.0);
    let upper = body_with(&mut sys, cube, Vec3::new(0.0, 1.52, 0.0), 1.0);
    run(&mut sys, 3.0);
    assert_abs_diff_eq!(height(&sys, lower), 0.5, epsilon = 0.1);
    assert_abs_diff_eq!(height(&sys, upper), 1.5, epsilon = 0.1);
    let drift = sys.body(upper).unwrap().position().xz().norm();
    assert!(drift < 0.05, "upper box slid {drift}");
}

#[test]
fn accumulated_solver_caches_contact_impulses() {
    let mut sys = world(no_freezing().with_solver(SolverType::Accumulated));
    ground(&mut sys);
    sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    assert!(sys.contact_cache().is_empty());
    run(&mut sys, 0.5);
    assert_eq!(sys.contact_cache().len(), 1);

    sys.set_solver_type(SolverType::Normal);
    assert!(sys.contact_cache().is_empty());
}

#[test]
fn cached_resting_impulse_stabilises() {
    let mut sys = world(no_freezing().with_solver(SolverType::Accumulated));
    ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    run(&mut sys, 1.0);

    let (key, _) = BodyPairKey::new(b, None);
    let weight_per_step = sys.gravity().norm() * DT;
    let mut previous: Option<f32> = None;
    for _ in 0..30 {
        sys.integrate(DT);
        let cached = sys.contact_cache().get(&key).expect("resting contact is cached");
        let total: f32 = cached.iter().map(|c| c.normal_impulse).sum();
        assert!(
            total > 0.5 * weight_per_step && total < 1.5 * weight_per_step,
            "cached impulse {total} vs weight {weight_per_step}"
        );
        if let Some(prev) = previous {
            assert!((total - prev).abs() < 0.2 * prev, "impulse jumped from {prev} to {total}");
        }
        previous = Some(total);
    }
}

#[test]
fn bouncy_material_rebounds() {
    use physics::MaterialProperties;
    use physics::collision::MaterialId;

    let mut sys = world(no_freezing());
    let mut floor = physics::CollisionSkin::new();
    floor.add_primitive_with_properties(
        Primitive::Plane,
        physics::Transform::identity(),
        MaterialProperties::new(1.0, 0.0, 0.0),
    );
    sys.add_skin(floor);
    let mut skin = physics::CollisionSkin::new();
    skin.add_primitive_with_properties(
        Primitive::sphere(1.0),
        physics::Transform::identity(),
        MaterialProperties::new(0.9, 0.0, 0.0),
    );
    let b = sys.add_body(physics::Body::at(Vec3::new(0.0, 3.0, 0.0), 1.0));
    let s = sys.add_skin(skin);
    sys.set_body_skin(b, Some(s)).unwrap();

    let mut rose = false;
    for _ in 0..120 {
        sys.integrate(DT);
        if sys.body(b).unwrap().velocity().y > 1.0 {
            rose = true;
            break;
        }
    }
    assert!(rose, "sphere never bounced");
    assert_eq!(sys.materials().properties(MaterialId::NotBouncy).unwrap().elasticity, 0.0);
}
