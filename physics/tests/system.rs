mod common;

use physics::collision::MaterialId;
use physics::{
    CollisionSkin, PhysicsConfig, PhysicsError, Primitive, SolverType, Transform, Vec3,
};

use common::*;

#[test]
fn null_update_leaves_the_world_untouched() {
    let mut config = PhysicsConfig::default().with_freezing(false);
    config.null_update = true;
    let mut sys = world(config);
    ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 3.0, 0.0));
    sys.body_mut(b).unwrap().set_velocity(Vec3::new(1.0, 0.0, 0.0));
    let skin = sys.body(b).unwrap().skin().unwrap();
    let skin_pos = sys.skin(skin).unwrap().new_transform().position;

    run(&mut sys, 1.0);
    let body = sys.body(b).unwrap();
    assert_eq!(body.position(), Vec3::new(0.0, 3.0, 0.0));
    assert_eq!(body.velocity(), Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(sys.skin(skin).unwrap().new_transform().position, skin_pos);

    sys.set_null_update(false);
    sys.integrate(DT);
    assert!(height(&sys, b) < 3.0);
}

#[test]
fn non_positive_steps_are_ignored() {
    let mut sys = world(PhysicsConfig::default());
    let b = sphere(&mut sys, Vec3::new(0.0, 3.0, 0.0));
    sys.integrate(0.0);
    sys.integrate(-1.0);
    assert_eq!(height(&sys, b), 3.0);
}

#[test]
fn disabled_body_is_left_alone() {
    let mut sys = world(PhysicsConfig::default());
    let b = sphere(&mut sys, Vec3::new(0.0, 3.0, 0.0));
    sys.disable_body(b);
    run(&mut sys, 0.5);
    assert_eq!(height(&sys, b), 3.0);
    sys.enable_body(b);
    run(&mut sys, 0.5);
    assert!(height(&sys, b) < 3.0);
}

#[test]
fn collisions_report_both_sides() {
    let mut sys = world(PhysicsConfig::default().with_freezing(false));
    let floor = ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    sys.integrate(DT);

    let info = sys.collisions().next().expect("sphere touches the ground");
    assert_eq!(info.body0, b);
    assert_eq!(info.body1, None);
    assert_eq!(info.skin1, floor);
    assert!(info.dir_to_body0.y > 0.99);
    assert!(info.num_points() >= 1);

    let body = sys.body(b).unwrap();
    assert_eq!(body.collisions().len(), 1);
    assert_eq!(sys.skin(floor).unwrap().collisions().len(), 1);
}

#[test]
fn config_setters_validate_and_apply() {
    let mut sys = world(PhysicsConfig::default());
    sys.set_gravity(Vec3::new(0.0, -3.0, 0.0));
    assert_eq!(sys.gravity(), Vec3::new(0.0, -3.0, 0.0));
    sys.set_solver_type(SolverType::Combined);
    assert_eq!(sys.solver_type(), SolverType::Combined);
    sys.set_num_collision_iterations(2);
    sys.set_num_contact_iterations(7);
    assert_eq!(sys.num_collision_iterations(), 2);
    assert_eq!(sys.num_contact_iterations(), 7);
    assert!(matches!(
        sys.set_num_penetration_relaxation_timesteps(0.0),
        Err(PhysicsError::InvalidConfiguration { .. })
    ));
    sys.set_shock_step(true);
    assert!(sys.is_shock_step_enabled());
    assert_eq!(sys.config().num_contact_iterations, 7);
}

#[test]
fn reserved_material_is_rejected() {
    let mut skin = CollisionSkin::new();
    assert_eq!(
        skin.add_primitive(Primitive::sphere(1.0), Transform::identity(), MaterialId::UserDefined),
        Err(PhysicsError::ReservedMaterialId)
    );
    assert_eq!(skin.num_primitives(), 0);
}

#[test]
fn removed_skin_stops_colliding() {
    let mut sys = world(PhysicsConfig::default().with_freezing(false));
    let floor = ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    sys.integrate(DT);
    assert_eq!(sys.num_collisions(), 1);

    assert!(sys.remove_skin(floor).is_some());
    sys.integrate(DT);
    assert_eq!(sys.num_collisions(), 0);
    assert!(sys.body(b).unwrap().velocity().y < 0.0);
}
