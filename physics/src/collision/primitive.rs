//! Geometric primitives attached to collision skins.
//!
//! Each primitive is described in its own local frame:
//! - Sphere: centred on the origin.
//! - Box: centred on the origin with the given half extents.
//! - Capsule: segment along local +Y of length `2 * half_height`, swept by `radius`.
//! - Plane: the half-space below local +Y through the origin (normal is +Y).
//!
//! World-space bounds and ray casts are delegated to parry3d shapes built on
//! the fly; planes are handled analytically.

use nalgebra as na;
use parry3d::{
    bounding_volume::Aabb,
    query::{Ray, RayCast},
    shape as pshape,
};

use crate::collision::types::Segment;
use crate::constants::EPSILON;
use crate::math::{Mat3, Transform, Vec3, rotate_tensor};

/// Half extent used for the unbounded directions of a plane's bounding box.
pub const PLANE_BOUND: f32 = 1.0e6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Sphere,
    Box,
    Capsule,
    Plane,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Capsule { radius: f32, half_height: f32 },
    Plane,
}

/// Mass, centre of mass and inertia tensor (about the centre of mass).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MassProperties {
    pub mass: f32,
    pub center_of_mass: Vec3,
    pub inertia: Mat3,
}

impl MassProperties {
    pub fn zero() -> Self {
        Self {
            mass: 0.0,
            center_of_mass: Vec3::zeros(),
            inertia: Mat3::zeros(),
        }
    }
}

/// Ray-cast hit against a single primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimitiveHit {
    pub fraction: f32,
    pub position: Vec3,
    pub normal: Vec3,
}

impl Primitive {
    pub fn sphere(radius: f32) -> Self {
        Primitive::Sphere { radius }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Primitive::Box { half_extents }
    }

    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Primitive::Capsule {
            radius,
            half_height,
        }
    }

    #[inline]
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Sphere { .. } => PrimitiveKind::Sphere,
            Primitive::Box { .. } => PrimitiveKind::Box,
            Primitive::Capsule { .. } => PrimitiveKind::Capsule,
            Primitive::Plane => PrimitiveKind::Plane,
        }
    }

    /// Run `f` with the parry3d shape equivalent of this primitive.
    /// Planes have no finite parry counterpart here and yield `None`.
    pub fn with_shape<R>(&self, f: impl FnOnce(&dyn pshape::Shape) -> R) -> Option<R> {
        match *self {
            Primitive::Sphere { radius } => Some(f(&pshape::Ball::new(radius))),
            Primitive::Box { half_extents } => Some(f(&pshape::Cuboid::new(half_extents))),
            Primitive::Capsule {
                radius,
                half_height,
            } => Some(f(&pshape::Capsule::new_y(half_height, radius))),
            Primitive::Plane => None,
        }
    }

    /// World-space bounding box at `t`.
    pub fn aabb(&self, t: &Transform) -> Aabb {
        let iso = t.iso();
        match *self {
            Primitive::Sphere { radius } => pshape::Ball::new(radius).aabb(&iso),
            Primitive::Box { half_extents } => pshape::Cuboid::new(half_extents).aabb(&iso),
            Primitive::Capsule {
                radius,
                half_height,
            } => pshape::Capsule::new_y(half_height, radius).aabb(&iso),
            Primitive::Plane => plane_aabb(t),
        }
    }

    /// World-space plane `(normal, d)` with `normal . x = d` on the surface.
    #[inline]
    pub fn plane_equation(t: &Transform) -> (Vec3, f32) {
        let n = t.orientation * Vec3::y();
        (n, n.dot(&t.position))
    }

    /// Nearest intersection of `seg` with this primitive placed at `t`.
    ///
    /// Primitives are solid: a segment starting inside reports a hit at fraction 0.
    pub fn segment_intersect(&self, t: &Transform, seg: &Segment) -> Option<PrimitiveHit> {
        if seg.delta.norm_squared() < EPSILON * EPSILON {
            return None;
        }
        if let Primitive::Plane = self {
            let (n, d) = Self::plane_equation(t);
            let dist0 = n.dot(&seg.origin) - d;
            if dist0 <= 0.0 {
                return Some(PrimitiveHit {
                    fraction: 0.0,
                    position: seg.origin,
                    normal: n,
                });
            }
            let denom = n.dot(&seg.delta);
            if denom >= 0.0 {
                return None;
            }
            let frac = -dist0 / denom;
            if frac > 1.0 {
                return None;
            }
            return Some(PrimitiveHit {
                fraction: frac,
                position: seg.point_at(frac),
                normal: n,
            });
        }

        let iso = t.iso();
        let ray = Ray::new(na::Point3::from(seg.origin), seg.delta);
        self.with_shape(|shape| shape.cast_ray_and_get_normal(&iso, &ray, 1.0, true))
            .flatten()
            .map(|hit| PrimitiveHit {
                fraction: hit.time_of_impact,
                position: seg.point_at(hit.time_of_impact),
                normal: hit.normal,
            })
    }

    /// Volume in cubic meters; zero for planes.
    pub fn volume(&self) -> f32 {
        use std::f32::consts::PI;
        match *self {
            Primitive::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Primitive::Box { half_extents } => 8.0 * half_extents.x * half_extents.y * half_extents.z,
            Primitive::Capsule {
                radius,
                half_height,
            } => PI * radius * radius * (2.0 * half_height) + 4.0 / 3.0 * PI * radius.powi(3),
            Primitive::Plane => 0.0,
        }
    }

    /// Mass properties in the primitive's local frame for a uniform `density`.
    pub fn mass_properties(&self, density: f32) -> MassProperties {
        use std::f32::consts::PI;
        let mass = self.volume() * density;
        let inertia = match *self {
            Primitive::Sphere { radius } => {
                Mat3::from_diagonal_element(0.4 * mass * radius * radius)
            }
            Primitive::Box { half_extents: h } => Mat3::from_diagonal(&Vec3::new(
                mass / 3.0 * (h.y * h.y + h.z * h.z),
                mass / 3.0 * (h.x * h.x + h.z * h.z),
                mass / 3.0 * (h.x * h.x + h.y * h.y),
            )),
            Primitive::Capsule {
                radius: r,
                half_height,
            } => {
                let h = 2.0 * half_height;
                let m_cyl = PI * r * r * h * density;
                let m_caps = 4.0 / 3.0 * PI * r.powi(3) * density;
                let axial = m_cyl * r * r * 0.5 + m_caps * 0.4 * r * r;
                let lateral = m_cyl * (h * h / 12.0 + r * r / 4.0)
                    + m_caps * (0.4 * r * r + h * h / 2.0 + 3.0 * h * r / 8.0);
                Mat3::from_diagonal(&Vec3::new(lateral, axial, lateral))
            }
            Primitive::Plane => Mat3::zeros(),
        };
        MassProperties {
            mass,
            center_of_mass: Vec3::zeros(),
            inertia,
        }
    }

    /// The eight corners of a box primitive at `t` (empty for other kinds).
    pub fn box_corners(&self, t: &Transform) -> Vec<Vec3> {
        let Primitive::Box { half_extents: h } = *self else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(8);
        for sx in [-1.0f32, 1.0] {
            for sy in [-1.0f32, 1.0] {
                for sz in [-1.0f32, 1.0] {
                    out.push(t.transform_point(&Vec3::new(sx * h.x, sy * h.y, sz * h.z)));
                }
            }
        }
        out
    }

    /// End-cap centres of a capsule primitive at `t`.
    pub fn capsule_ends(&self, t: &Transform) -> Option<(Vec3, Vec3)> {
        let Primitive::Capsule { half_height, .. } = *self else {
            return None;
        };
        let axis = t.orientation * Vec3::y();
        Some((
            t.position - axis * half_height,
            t.position + axis * half_height,
        ))
    }
}

/// Shift an inertia tensor from a primitive frame to a parent frame (parallel axis).
pub fn transfer_inertia(inertia: &Mat3, local: &Transform, mass: f32, about: &Vec3) -> Mat3 {
    let rotated = rotate_tensor(&local.orientation, inertia);
    let d = local.position - about;
    rotated + (Mat3::identity() * d.norm_squared() - d * d.transpose()) * mass
}

fn plane_aabb(t: &Transform) -> Aabb {
    let (n, _) = Primitive::plane_equation(t);
    let mut mins = na::Point3::new(-PLANE_BOUND, -PLANE_BOUND, -PLANE_BOUND);
    let mut maxs = na::Point3::new(PLANE_BOUND, PLANE_BOUND, PLANE_BOUND);
    // Axis-aligned planes bound the solid side tightly along their normal.
    for axis in 0..3 {
        let others_zero = (0..3)
            .filter(|&a| a != axis)
            .all(|a| n[a].abs() < EPSILON);
        if others_zero {
            if n[axis] > 0.0 {
                maxs[axis] = t.position[axis];
            } else {
                mins[axis] = t.position[axis];
            }
        }
    }
    Aabb { mins, maxs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;

    #[test]
    fn sphere_aabb_and_volume() {
        let s = Primitive::sphere(0.5);
        let bb = s.aabb(&Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
        assert!((bb.mins.x - 0.5).abs() < 1.0e-5);
        assert!((bb.maxs.z - 3.5).abs() < 1.0e-5);
        assert!((s.volume() - 0.523_598_8).abs() < 1.0e-4);
    }

    #[test]
    fn ground_plane_aabb_is_bounded_above() {
        let bb = Primitive::Plane.aabb(&Transform::identity());
        assert!(bb.maxs.y.abs() < 1.0e-6);
        assert!(bb.mins.y <= -PLANE_BOUND + 1.0);
        assert!(bb.maxs.x >= PLANE_BOUND - 1.0);
    }

    #[test]
    fn segment_hits_sphere_front_face() {
        let s = Primitive::sphere(1.0);
        let seg = Segment::between(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0));
        let hit = s
            .segment_intersect(&Transform::identity(), &seg)
            .expect("segment through the centre must hit");
        assert!((hit.fraction - 0.4).abs() < 1.0e-4);
        assert!((hit.normal - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1.0e-4);
    }

    #[test]
    fn segment_hits_plane_from_above_only() {
        let plane = Primitive::Plane;
        let down = Segment::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -4.0, 0.0));
        let hit = plane
            .segment_intersect(&Transform::identity(), &down)
            .expect("downward segment crosses the ground");
        assert!((hit.fraction - 0.5).abs() < 1.0e-6);

        let away = Segment::new(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 4.0, 0.0));
        assert!(plane.segment_intersect(&Transform::identity(), &away).is_none());
    }

    #[test]
    fn box_inertia_matches_closed_form() {
        // 2x2x2 box of density 1: mass 8, I = m/12 * (4 + 4) = 16/3.
        let b = Primitive::cuboid(Vec3::new(1.0, 1.0, 1.0));
        let mp = b.mass_properties(1.0);
        assert!((mp.mass - 8.0).abs() < 1.0e-5);
        assert!((mp.inertia[(0, 0)] - 16.0 / 3.0).abs() < 1.0e-4);
    }

    #[test]
    fn box_corners_follow_rotation() {
        let b = Primitive::cuboid(Vec3::new(1.0, 0.5, 0.25));
        let t = Transform::new(
            Vec3::zeros(),
            Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2),
        );
        let corners = b.box_corners(&t);
        assert_eq!(corners.len(), 8);
        let max_x = corners.iter().map(|c| c.x).fold(f32::MIN, f32::max);
        assert!((max_x - 0.25).abs() < 1.0e-5);
    }

    #[test]
    fn parallel_axis_adds_offset_term() {
        let inertia = Mat3::zeros();
        let local = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        let shifted = transfer_inertia(&inertia, &local, 3.0, &Vec3::zeros());
        assert!(shifted[(0, 0)].abs() < 1.0e-6);
        assert!((shifted[(1, 1)] - 12.0).abs() < 1.0e-5);
        assert!((shifted[(2, 2)] - 12.0).abs() < 1.0e-5);
    }
}
