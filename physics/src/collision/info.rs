//! Collision records produced by the narrow phase and consumed by the solvers.
//!
//! Records live in a `ContactPool` owned by the simulation. The pool hands
//! out `CollisionId`s; every record acquired during a step is released at
//! the start of the next detection pass, so steady-state stepping does not
//! allocate.

use crate::collision::SkinHandle;
use crate::collision::material::MaterialPairProperties;
use crate::constants::MAX_CONTACT_POINTS;
use crate::dynamics::BodyHandle;
use crate::math::Vec3;

/// Index of a record in the `ContactPool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollisionId(u32);

impl CollisionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A contact point as reported by a detection routine.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DetectedPoint {
    /// Offset from body 0's old position to the contact.
    pub r0: Vec3,
    /// Offset from body 1's old position (or the origin for static geometry).
    pub r1: Vec3,
    /// Positive when the shapes overlap at the old poses.
    pub initial_penetration: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactPoint {
    pub initial_penetration: f32,
    pub r0: Vec3,
    pub r1: Vec3,
    /// World position (body 0 old position + `r0`).
    pub position: Vec3,

    pub(crate) denominator: f32,
    /// Positive: must separate at least this fast. Negative: may still approach this fast.
    pub(crate) min_separation_vel: f32,
    /// Normal velocity the accumulated solver aims for (restitution bounce).
    pub(crate) target_normal_vel: f32,
    pub(crate) accumulated_normal_impulse: f32,
    pub(crate) accumulated_normal_impulse_aux: f32,
    pub(crate) accumulated_friction_impulse: Vec3,
}

impl ContactPoint {
    pub fn accumulated_normal_impulse(&self) -> f32 {
        self.accumulated_normal_impulse
    }

    pub fn accumulated_friction_impulse(&self) -> Vec3 {
        self.accumulated_friction_impulse
    }

    pub fn min_separation_velocity(&self) -> f32 {
        self.min_separation_vel
    }
}

#[derive(Clone, Debug)]
pub struct CollisionInfo {
    pub skin0: SkinHandle,
    pub skin1: SkinHandle,
    pub body0: BodyHandle,
    pub body1: Option<BodyHandle>,
    pub prim0: usize,
    pub prim1: usize,
    /// Unit normal pointing from body 1 towards body 0.
    pub dir_to_body0: Vec3,
    pub material: MaterialPairProperties,
    pub satisfied: bool,
    points: [ContactPoint; MAX_CONTACT_POINTS],
    num_points: usize,
}

impl Default for CollisionInfo {
    fn default() -> Self {
        Self {
            skin0: SkinHandle::default(),
            skin1: SkinHandle::default(),
            body0: BodyHandle::default(),
            body1: None,
            prim0: 0,
            prim1: 0,
            dir_to_body0: Vec3::y(),
            material: MaterialPairProperties::default(),
            satisfied: false,
            points: [ContactPoint::default(); MAX_CONTACT_POINTS],
            num_points: 0,
        }
    }
}

impl CollisionInfo {
    #[inline]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.num_points]
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points[..self.num_points]
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Replace the contact points. Anything past `MAX_CONTACT_POINTS` is dropped.
    pub fn set_points(&mut self, body0_position: &Vec3, detected: &[DetectedPoint]) {
        let n = detected.len().min(MAX_CONTACT_POINTS);
        for (dst, src) in self.points.iter_mut().zip(&detected[..n]) {
            *dst = ContactPoint {
                initial_penetration: src.initial_penetration,
                r0: src.r0,
                r1: src.r1,
                position: body0_position + src.r0,
                ..ContactPoint::default()
            };
        }
        self.num_points = n;
    }

    /// The other body of the pair as seen from `body`, if any.
    pub fn other_body(&self, body: BodyHandle) -> Option<BodyHandle> {
        if self.body0 == body {
            self.body1
        } else {
            Some(self.body0)
        }
    }

    /// The normal pointing towards `body`.
    pub fn normal_towards(&self, body: BodyHandle) -> Vec3 {
        if self.body0 == body {
            self.dir_to_body0
        } else {
            -self.dir_to_body0
        }
    }
}

/// Slab of collision records with explicit acquire/release.
#[derive(Debug, Default)]
pub struct ContactPool {
    infos: Vec<CollisionInfo>,
    live: Vec<bool>,
    free: Vec<u32>,
}

impl ContactPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a blank record, reusing a released slot when one exists.
    pub fn acquire(&mut self) -> CollisionId {
        if let Some(idx) = self.free.pop() {
            let i = idx as usize;
            self.infos[i] = CollisionInfo::default();
            self.live[i] = true;
            return CollisionId(idx);
        }
        self.infos.push(CollisionInfo::default());
        self.live.push(true);
        CollisionId((self.infos.len() - 1) as u32)
    }

    pub fn release(&mut self, id: CollisionId) {
        let i = id.index();
        match self.live.get_mut(i) {
            Some(live) if *live => {
                *live = false;
                self.free.push(id.0);
            }
            _ => log::warn!("releasing collision record {i} that is not live"),
        }
    }

    #[inline]
    pub fn get(&self, id: CollisionId) -> Option<&CollisionInfo> {
        let i = id.index();
        if *self.live.get(i)? { self.infos.get(i) } else { None }
    }

    #[inline]
    pub fn get_mut(&mut self, id: CollisionId) -> Option<&mut CollisionInfo> {
        let i = id.index();
        if *self.live.get(i)? { self.infos.get_mut(i) } else { None }
    }

    /// Records currently handed out.
    pub fn live_count(&self) -> usize {
        self.live.iter().filter(|l| **l).count()
    }

    /// Records ever allocated (live + free).
    pub fn capacity(&self) -> usize {
        self.infos.len()
    }
}
