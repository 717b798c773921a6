mod common;

use physics::collision::MaterialId;
use physics::{CollisionSkin, PhysicsConfig, Primitive, Segment, SkinHandle, Transform, Vec3};

use common::*;

fn static_skin(sys: &mut physics::PhysicsSystem, primitive: Primitive, pos: Vec3) -> SkinHandle {
    let mut skin = CollisionSkin::at(Transform::from_position(pos));
    skin.add_primitive(primitive, Transform::identity(), MaterialId::Normal)
        .unwrap();
    sys.add_skin(skin)
}

#[test]
fn segment_reports_the_nearest_skin() {
    for broad_phase in [
        physics::BroadPhaseKind::BruteForce,
        physics::BroadPhaseKind::Grid(physics::GridParams::default()),
        physics::BroadPhaseKind::SweepAndPrune,
    ] {
        let mut sys = world(PhysicsConfig::default().with_broad_phase(broad_phase));
        let near = static_skin(&mut sys, Primitive::sphere(1.0), Vec3::new(3.0, 0.0, 0.0));
        let far = static_skin(&mut sys, Primitive::cuboid(Vec3::repeat(1.0)), Vec3::new(8.0, 0.0, 0.0));

        let seg = Segment::between(Vec3::zeros(), Vec3::new(10.0, 0.0, 0.0));
        let hit = sys.segment_intersect(&seg, None).expect("segment crosses both skins");
        assert_eq!(hit.skin, near, "{broad_phase:?}");
        assert!((hit.fraction - 0.2).abs() < 1.0e-3);
        assert!((hit.position - Vec3::new(2.0, 0.0, 0.0)).norm() < 1.0e-3);
        assert!(hit.normal.x < -0.99);

        let skip_near = |s: SkinHandle, _: &CollisionSkin| s != near;
        let hit = sys.segment_intersect(&seg, Some(&skip_near)).unwrap();
        assert_eq!(hit.skin, far);
        assert!((hit.fraction - 0.7).abs() < 1.0e-3);
    }
}

#[test]
fn segment_can_miss() {
    let mut sys = world(PhysicsConfig::default());
    static_skin(&mut sys, Primitive::sphere(1.0), Vec3::new(3.0, 0.0, 0.0));
    let seg = Segment::between(Vec3::new(0.0, 5.0, 0.0), Vec3::new(10.0, 5.0, 0.0));
    assert!(sys.segment_intersect(&seg, None).is_none());
    // Stops short.
    let seg = Segment::between(Vec3::zeros(), Vec3::new(1.5, 0.0, 0.0));
    assert!(sys.segment_intersect(&seg, None).is_none());
}

#[test]
fn segment_finds_moving_bodies_after_a_step() {
    let mut sys = world(PhysicsConfig::default().with_gravity(Vec3::zeros()));
    let b = sphere(&mut sys, Vec3::new(0.0, 0.0, 0.0));
    sys.body_mut(b).unwrap().set_velocity(Vec3::new(6.0, 0.0, 0.0));
    run(&mut sys, 1.0);
    let x = sys.body(b).unwrap().position().x;
    assert!((x - 6.0).abs() < 1.0e-2);

    let skin = sys.body(b).unwrap().skin().unwrap();
    let seg = Segment::between(Vec3::new(6.0, 5.0, 0.0), Vec3::new(6.0, -5.0, 0.0));
    let hit = sys.segment_intersect(&seg, None).unwrap();
    assert_eq!(hit.skin, skin);
}
