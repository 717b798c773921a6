mod common;

use physics::{PhysicsConfig, Quat, Vec3};

use common::*;

#[test]
fn resting_body_falls_asleep_and_wakes_on_move() {
    let mut sys = world(PhysicsConfig::default());
    ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    sys.body_mut(b).unwrap().set_deactivation_time(0.5);

    run(&mut sys, 2.0);
    let body = sys.body(b).unwrap();
    assert!(!body.is_active(), "body still awake after resting");
    assert_eq!(body.velocity(), Vec3::zeros());
    let asleep_at = body.position();

    // Sleeping bodies are not integrated.
    run(&mut sys, 0.5);
    assert_eq!(sys.body(b).unwrap().position(), asleep_at);

    sys.move_body_to(b, Vec3::new(0.0, 4.0, 0.0), Quat::identity()).unwrap();
    let body = sys.body(b).unwrap();
    assert!(body.is_active());
    assert!(body.should_be_active());
    sys.integrate(DT);
    assert!(height(&sys, b) < 4.0);
}

#[test]
fn bodies_that_refuse_freezing_stay_awake() {
    let mut sys = world(PhysicsConfig::default());
    ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    sys.body_mut(b).unwrap().set_allow_freezing(false);
    run(&mut sys, 3.0);
    assert!(sys.body(b).unwrap().is_active());
}

#[test]
fn falling_body_wakes_a_sleeping_one() {
    let mut sys = world(PhysicsConfig::default());
    ground(&mut sys);
    let below = sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    sys.body_mut(below).unwrap().set_deactivation_time(0.2);
    run(&mut sys, 1.0);
    assert!(!sys.body(below).unwrap().is_active());

    let above = sphere(&mut sys, Vec3::new(0.0, 3.5, 0.0));
    sys.body_mut(above).unwrap().set_velocity(Vec3::new(0.0, -3.0, 0.0));
    let mut woke = false;
    for _ in 0..60 {
        sys.integrate(DT);
        if sys.body(below).unwrap().is_active() {
            woke = true;
            break;
        }
    }
    assert!(woke, "impact did not wake the sleeping body");
}

#[test]
fn disabling_freezing_wakes_everything() {
    let mut sys = world(PhysicsConfig::default());
    ground(&mut sys);
    let b = sphere(&mut sys, Vec3::new(0.0, 1.0, 0.0));
    sys.body_mut(b).unwrap().set_deactivation_time(0.2);
    run(&mut sys, 1.0);
    assert!(!sys.body(b).unwrap().is_active());
    sys.set_freezing(false);
    assert!(sys.body(b).unwrap().is_active());
}
