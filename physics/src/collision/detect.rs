//! Built-in detection routines.
//!
//! All routines share one convention: overlap is tested at the speculative
//! new poses (within `tolerance`), while depth and contact positions are
//! measured at the old poses. A negative depth therefore describes a gap the
//! bodies are about to close during this step.

use nalgebra as na;
use parry3d::query::{self, Contact};

use crate::collision::info::DetectedPoint;
use crate::collision::narrow_phase::{CollisionNotify, PrimitivePair};
use crate::collision::primitive::Primitive;
use crate::constants::{EPSILON, MAX_CONTACT_POINTS};
use crate::math::{Transform, Vec3};

pub fn sphere_sphere(pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) {
    let (&Primitive::Sphere { radius: r0 }, &Primitive::Sphere { radius: r1 }) =
        (pair.primitive0, pair.primitive1)
    else {
        return;
    };
    let old_delta = pair.old0.position - pair.old1.position;
    let new_delta = pair.new0.position - pair.new1.position;
    let rad_sum = r0 + r1;
    let min_dist_sq = old_delta.norm_squared().min(new_delta.norm_squared());
    if min_dist_sq >= (rad_sum + tolerance) * (rad_sum + tolerance) {
        return;
    }
    let old_dist = old_delta.norm();
    let depth = rad_sum - old_dist;
    // Coincident centres have no defined normal; push along +Y.
    let n = if old_dist > EPSILON { old_delta / old_dist } else { Vec3::y() };
    let world = pair.old1.position + n * (r1 - 0.5 * depth);
    notify.notify(pair, n, &[pair.point_at(world, depth)]);
}

pub fn sphere_plane(pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) {
    let (&Primitive::Sphere { radius }, Primitive::Plane) = (pair.primitive0, pair.primitive1) else {
        return;
    };
    let (n_old, d_old) = Primitive::plane_equation(&pair.old1);
    let (n_new, d_new) = Primitive::plane_equation(&pair.new1);
    let old_dist = n_old.dot(&pair.old0.position) - d_old - radius;
    let new_dist = n_new.dot(&pair.new0.position) - d_new - radius;
    if old_dist.min(new_dist) > tolerance {
        return;
    }
    let world = pair.old0.position - n_old * radius;
    notify.notify(pair, n_old, &[pair.point_at(world, -old_dist)]);
}

pub fn capsule_plane(pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) {
    let (&Primitive::Capsule { radius, .. }, Primitive::Plane) = (pair.primitive0, pair.primitive1) else {
        return;
    };
    let (Some(old_ends), Some(new_ends)) = (
        pair.primitive0.capsule_ends(&pair.old0),
        pair.primitive0.capsule_ends(&pair.new0),
    ) else {
        return;
    };
    let (n_old, d_old) = Primitive::plane_equation(&pair.old1);
    let (n_new, d_new) = Primitive::plane_equation(&pair.new1);

    let mut points: Vec<DetectedPoint> = Vec::with_capacity(2);
    for (old_end, new_end) in [(old_ends.0, new_ends.0), (old_ends.1, new_ends.1)] {
        let old_dist = n_old.dot(&old_end) - d_old - radius;
        let new_dist = n_new.dot(&new_end) - d_new - radius;
        if old_dist.min(new_dist) <= tolerance {
            points.push(pair.point_at(old_end - n_old * radius, -old_dist));
        }
    }
    if !points.is_empty() {
        notify.notify(pair, n_old, &points);
    }
}

pub fn box_plane(pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) {
    if !matches!((pair.primitive0, pair.primitive1), (Primitive::Box { .. }, Primitive::Plane)) {
        return;
    }
    let (n_old, d_old) = Primitive::plane_equation(&pair.old1);
    let (n_new, d_new) = Primitive::plane_equation(&pair.new1);
    let old_corners = pair.primitive0.box_corners(&pair.old0);
    let new_corners = pair.primitive0.box_corners(&pair.new0);

    let mut points: Vec<DetectedPoint> = Vec::with_capacity(8);
    for (old_c, new_c) in old_corners.iter().zip(&new_corners) {
        let old_dist = n_old.dot(old_c) - d_old;
        let new_dist = n_new.dot(new_c) - d_new;
        if old_dist.min(new_dist) <= tolerance {
            points.push(pair.point_at(*old_c, -old_dist));
        }
    }
    if !points.is_empty() {
        notify.notify(pair, n_old, &points);
    }
}

/// Box against box: the separating normal comes from parry3d; contact points
/// are the corners of each box that lie inside the other (within tolerance),
/// deepest first when there are more than fit in a record.
pub fn box_box(pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) {
    let (&Primitive::Box { half_extents: h0 }, &Primitive::Box { half_extents: h1 }) =
        (pair.primitive0, pair.primitive1)
    else {
        return;
    };
    let Some((n, contact)) = speculative_contact(pair, tolerance) else {
        return;
    };
    let surface1 = contact.point2.coords;
    let surface0 = contact.point1.coords;

    let mut points: Vec<DetectedPoint> = Vec::with_capacity(MAX_CONTACT_POINTS);
    let old0 = pair.primitive0.box_corners(&pair.old0);
    let new0 = pair.primitive0.box_corners(&pair.new0);
    for (old_c, new_c) in old0.iter().zip(&new0) {
        if inside_box(new_c, &pair.new1, &h1, tolerance) {
            points.push(pair.point_at(*old_c, -(old_c - surface1).dot(&n)));
        }
    }
    let old1 = pair.primitive1.box_corners(&pair.old1);
    let new1 = pair.primitive1.box_corners(&pair.new1);
    for (old_c, new_c) in old1.iter().zip(&new1) {
        if inside_box(new_c, &pair.new0, &h0, tolerance) {
            points.push(pair.point_at(*old_c, (old_c - surface0).dot(&n)));
        }
    }
    if points.is_empty() {
        let world = na::center(&contact.point1, &contact.point2).coords;
        points.push(pair.point_at(world, -contact.dist));
    }
    if points.len() > MAX_CONTACT_POINTS {
        points.sort_by(|a, b| b.initial_penetration.total_cmp(&a.initial_penetration));
        points.truncate(MAX_CONTACT_POINTS);
    }
    notify.notify(pair, n, &points);
}

/// Single-point contact for any pair parry3d supports.
pub fn generic_contact(pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) {
    let Some((n, contact)) = speculative_contact(pair, tolerance) else {
        return;
    };
    let world = na::center(&contact.point1, &contact.point2).coords;
    notify.notify(pair, n, &[pair.point_at(world, -contact.dist)]);
}

/// Test the new poses within `tolerance`, then measure at the old poses.
/// Returns the direction to primitive 0 and the contact used for depth.
fn speculative_contact(pair: &PrimitivePair<'_>, tolerance: f32) -> Option<(Vec3, Contact)> {
    let fresh = parry_contact(pair.primitive0, &pair.new0, pair.primitive1, &pair.new1, tolerance)?;
    let travel = (pair.new0.position - pair.old0.position).norm()
        + (pair.new1.position - pair.old1.position).norm();
    let contact = parry_contact(
        pair.primitive0,
        &pair.old0,
        pair.primitive1,
        &pair.old1,
        tolerance + 2.0 * travel + EPSILON,
    )
    .unwrap_or(fresh);
    // parry's normal1 points out of primitive 0, towards primitive 1.
    Some((-contact.normal1.into_inner(), contact))
}

fn parry_contact(p0: &Primitive, t0: &Transform, p1: &Primitive, t1: &Transform, prediction: f32) -> Option<Contact> {
    let result = p0.with_shape(|s0| p1.with_shape(|s1| query::contact(&t0.iso(), s0, &t1.iso(), s1, prediction)))??;
    match result {
        Ok(contact) => contact,
        Err(_) => {
            log::trace!("parry3d has no contact routine for {:?}/{:?}", p0.kind(), p1.kind());
            None
        }
    }
}

fn inside_box(p: &Vec3, t: &Transform, half: &Vec3, tolerance: f32) -> bool {
    let local = t.inverse_transform_point(p);
    local.x.abs() <= half.x + tolerance && local.y.abs() <= half.y + tolerance && local.z.abs() <= half.z + tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::skin::SkinHandle;
    use crate::math::Quat;

    #[derive(Default)]
    struct Sink {
        normal: Option<Vec3>,
        points: Vec<DetectedPoint>,
    }

    impl CollisionNotify for Sink {
        fn notify(&mut self, _pair: &PrimitivePair<'_>, dir: Vec3, points: &[DetectedPoint]) {
            self.normal = Some(dir);
            self.points.extend_from_slice(points);
        }
    }

    fn moving_pair<'a>(
        p0: &'a Primitive,
        old0: Transform,
        new0: Transform,
        p1: &'a Primitive,
        t1: Transform,
    ) -> PrimitivePair<'a> {
        PrimitivePair {
            skin0: SkinHandle::default(),
            skin1: SkinHandle::default(),
            prim0: 0,
            prim1: 0,
            primitive0: p0,
            primitive1: p1,
            old0,
            new0,
            old1: t1,
            new1: t1,
            body0_position: old0.position,
            body1_position: Vec3::zeros(),
        }
    }

    fn at(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_position(Vec3::new(x, y, z))
    }

    #[test]
    fn separated_spheres_produce_nothing() {
        let s = Primitive::sphere(1.0);
        let p = moving_pair(&s, at(0.0, 3.0, 0.0), at(0.0, 3.0, 0.0), &s, at(0.0, 0.0, 0.0));
        let mut sink = Sink::default();
        sphere_sphere(&p, 0.05, &mut sink);
        assert!(sink.points.is_empty());
    }

    #[test]
    fn sphere_sphere_reports_depth_and_midpoint() {
        let s = Primitive::sphere(1.0);
        let p = moving_pair(&s, at(0.0, 1.8, 0.0), at(0.0, 1.8, 0.0), &s, at(0.0, 0.0, 0.0));
        let mut sink = Sink::default();
        sphere_sphere(&p, 0.05, &mut sink);
        assert_eq!(sink.points.len(), 1);
        assert!((sink.points[0].initial_penetration - 0.2).abs() < 1.0e-5);
        assert!((sink.normal.unwrap() - Vec3::y()).norm() < 1.0e-6);
        // Contact sits midway through the overlap: y = 1 - 0.1 = 0.9, r0 = 0.9 - 1.8.
        assert!((sink.points[0].r0.y + 0.9).abs() < 1.0e-5);
    }

    #[test]
    fn speculative_contact_has_negative_depth() {
        // Old pose is clear of the plane; the new pose would sink into it.
        let s = Primitive::sphere(0.5);
        let p = moving_pair(&s, at(0.0, 0.8, 0.0), at(0.0, 0.4, 0.0), &Primitive::Plane, Transform::identity());
        let mut sink = Sink::default();
        sphere_plane(&p, 0.05, &mut sink);
        assert_eq!(sink.points.len(), 1);
        assert!((sink.points[0].initial_penetration + 0.3).abs() < 1.0e-5);
    }

    #[test]
    fn resting_box_touches_plane_at_four_corners() {
        let b = Primitive::cuboid(Vec3::new(0.5, 0.5, 0.5));
        let p = moving_pair(&b, at(0.0, 0.49, 0.0), at(0.0, 0.49, 0.0), &Primitive::Plane, Transform::identity());
        let mut sink = Sink::default();
        box_plane(&p, 0.05, &mut sink);
        assert_eq!(sink.points.len(), 4);
        for pt in &sink.points {
            assert!((pt.initial_penetration - 0.01).abs() < 1.0e-5);
        }
    }

    #[test]
    fn tilted_capsule_touches_with_lower_cap_only() {
        let c = Primitive::capsule(0.25, 1.0);
        let tilt = Transform::new(
            Vec3::new(0.0, 0.9, 0.0),
            Quat::from_axis_angle(&Vec3::z_axis(), 0.5),
        );
        let p = moving_pair(&c, tilt, tilt, &Primitive::Plane, Transform::identity());
        let mut sink = Sink::default();
        capsule_plane(&p, 0.05, &mut sink);
        assert_eq!(sink.points.len(), 1);
    }

    #[test]
    fn stacked_boxes_produce_face_contacts() {
        let b = Primitive::cuboid(Vec3::new(0.5, 0.5, 0.5));
        let p = moving_pair(&b, at(0.0, 0.99, 0.0), at(0.0, 0.99, 0.0), &b, at(0.0, 0.0, 0.0));
        let mut sink = Sink::default();
        box_box(&p, 0.05, &mut sink);
        let n = sink.normal.expect("overlapping boxes must collide");
        assert!((n - Vec3::y()).norm() < 1.0e-3);
        assert!(sink.points.len() >= 4);
        assert!(sink.points.len() <= MAX_CONTACT_POINTS);
        for pt in &sink.points {
            assert!((pt.initial_penetration - 0.01).abs() < 1.0e-3);
        }
    }

    #[test]
    fn overfull_box_contact_keeps_the_deepest_corners() {
        // Nearly coincident boxes: all 16 corners qualify. The 8 deep ones are
        // box 0's lower face and box 1's upper face.
        let b = Primitive::cuboid(Vec3::new(0.5, 0.5, 0.5));
        let p = moving_pair(&b, at(0.0, 0.02, 0.0), at(0.0, 0.02, 0.0), &b, at(0.0, 0.0, 0.0));
        let mut sink = Sink::default();
        box_box(&p, 0.05, &mut sink);
        assert_eq!(sink.points.len(), MAX_CONTACT_POINTS);
        let deep = sink.points.iter().filter(|pt| pt.initial_penetration > 0.9).count();
        assert_eq!(deep, 8);
        // Box 1's upper corners sit at y = 0.5 relative to its origin.
        let from_box1 = sink
            .points
            .iter()
            .filter(|pt| pt.initial_penetration > 0.9 && (pt.r1.y - 0.5).abs() < 1.0e-4)
            .count();
        assert_eq!(from_box1, 4);
    }

    #[test]
    fn sphere_box_uses_parry_contact() {
        let s = Primitive::sphere(0.5);
        let b = Primitive::cuboid(Vec3::new(1.0, 1.0, 1.0));
        let p = moving_pair(&s, at(0.0, 1.45, 0.0), at(0.0, 1.45, 0.0), &b, at(0.0, 0.0, 0.0));
        let mut sink = Sink::default();
        generic_contact(&p, 0.05, &mut sink);
        assert_eq!(sink.points.len(), 1);
        assert!((sink.normal.unwrap() - Vec3::y()).norm() < 1.0e-4);
        assert!((sink.points[0].initial_penetration - 0.05).abs() < 1.0e-4);
    }
}
