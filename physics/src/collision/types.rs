/*!
Data types exchanged between the broad phase, the narrow phase and queries.

This module intentionally contains no algorithms beyond the bounding-box
helpers every broad-phase strategy shares.
*/

use nalgebra as na;
use parry3d::bounding_volume::Aabb;

use crate::collision::SkinHandle;
use crate::math::Vec3;

/// A directed line segment `origin + t * delta` for `t` in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub origin: Vec3,
    pub delta: Vec3,
}

impl Segment {
    #[inline]
    pub fn new(origin: Vec3, delta: Vec3) -> Self {
        Self { origin, delta }
    }

    #[inline]
    pub fn between(start: Vec3, end: Vec3) -> Self {
        Self {
            origin: start,
            delta: end - start,
        }
    }

    #[inline]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.delta * t
    }

    #[inline]
    pub fn end(&self) -> Vec3 {
        self.origin + self.delta
    }

    /// Bounding box of the whole segment.
    pub fn aabb(&self) -> Aabb {
        let a = self.origin;
        let b = self.end();
        Aabb {
            mins: na::Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            maxs: na::Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }
}

/// Nearest hit of a segment query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentHit {
    pub skin: SkinHandle,
    /// Index of the primitive inside the skin.
    pub primitive: usize,
    /// Fraction along the segment, in `[0, 1]`.
    pub fraction: f32,
    pub position: Vec3,
    pub normal: Vec3,
}

/// Degenerate box around a single point.
#[inline]
pub fn aabb_point(p: &Vec3) -> Aabb {
    Aabb {
        mins: na::Point3::from(*p),
        maxs: na::Point3::from(*p),
    }
}

/// Compute the union of two AABBs.
#[inline]
pub fn aabb_union(a: &Aabb, b: &Aabb) -> Aabb {
    Aabb {
        mins: na::Point3::new(
            a.mins.x.min(b.mins.x),
            a.mins.y.min(b.mins.y),
            a.mins.z.min(b.mins.z),
        ),
        maxs: na::Point3::new(
            a.maxs.x.max(b.maxs.x),
            a.maxs.y.max(b.maxs.y),
            a.maxs.z.max(b.maxs.z),
        ),
    }
}

/// Inflate an AABB by `margin` on all sides.
#[inline]
pub fn aabb_inflate(a: &Aabb, margin: f32) -> Aabb {
    if margin <= 0.0 {
        return *a;
    }
    let delta = na::Vector3::new(margin, margin, margin);
    Aabb {
        mins: a.mins - delta,
        maxs: a.maxs + delta,
    }
}

/// Test two AABBs for intersection, treating them as inflated by `tolerance`.
#[inline]
pub fn aabb_overlaps(a: &Aabb, b: &Aabb, tolerance: f32) -> bool {
    !(a.maxs.x + tolerance < b.mins.x
        || a.mins.x - tolerance > b.maxs.x
        || a.maxs.y + tolerance < b.mins.y
        || a.mins.y - tolerance > b.maxs.y
        || a.maxs.z + tolerance < b.mins.z
        || a.mins.z - tolerance > b.maxs.z)
}

/// True when any part of the segment lies inside the box (slab clipping).
pub fn segment_hits_aabb(seg: &Segment, aabb: &Aabb) -> bool {
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    for axis in 0..3 {
        let o = seg.origin[axis];
        let d = seg.delta[axis];
        let (lo, hi) = (aabb.mins[axis], aabb.maxs[axis]);
        if d.abs() < 1.0e-12 {
            if o < lo || o > hi {
                return false;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (mut ta, mut tb) = ((lo - o) * inv, (hi - o) * inv);
        if ta > tb {
            std::mem::swap(&mut ta, &mut tb);
        }
        t0 = t0.max(ta);
        t1 = t1.min(tb);
        if t0 > t1 {
            return false;
        }
    }
    true
}
