#![allow(dead_code)]

use physics::collision::MaterialId;
use physics::{
    Body, BodyHandle, CollisionSkin, PhysicsConfig, PhysicsSystem, Primitive, SkinHandle,
    Transform, Vec3,
};

pub const DT: f32 = 1.0 / 60.0;

pub fn world(config: PhysicsConfig) -> PhysicsSystem {
    PhysicsSystem::new(config).unwrap()
}

pub fn ground(sys: &mut PhysicsSystem) -> SkinHandle {
    let mut skin = CollisionSkin::new();
    skin.add_primitive(Primitive::Plane, Transform::identity(), MaterialId::NotBouncy)
        .unwrap();
    sys.add_skin(skin)
}

/// A body with a single-primitive skin and matching inertia.
pub fn body_with(sys: &mut PhysicsSystem, primitive: Primitive, pos: Vec3, mass: f32) -> BodyHandle {
    let mut skin = CollisionSkin::new();
    skin.add_primitive(primitive, Transform::identity(), MaterialId::NotBouncy)
        .unwrap();
    let props = skin.mass_properties_for_mass(mass);
    let mut body = Body::at(pos, mass);
    body.set_body_inertia_matrix(props.inertia);
    let h = sys.add_body(body);
    let s = sys.add_skin(skin);
    sys.set_body_skin(h, Some(s)).unwrap();
    h
}

pub fn sphere(sys: &mut PhysicsSystem, pos: Vec3) -> BodyHandle {
    body_with(sys, Primitive::sphere(1.0), pos, 1.0)
}

pub fn run(sys: &mut PhysicsSystem, seconds: f32) {
    let steps = (seconds / DT).round() as usize;
    for _ in 0..steps {
        sys.integrate(DT);
    }
}

pub fn height(sys: &PhysicsSystem, h: BodyHandle) -> f32 {
    sys.body(h).unwrap().position().y
}
