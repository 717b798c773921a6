//! Warm-start cache for the accumulated solver.
//!
//! After each step the accumulated impulses of every contact point are stored
//! per body pair. The next step seeds each new point from the nearest cached
//! point of the same pair, if one lies within `CONTACT_CACHE_MATCH_DIST_SQ`.

use std::collections::HashMap;

use crate::collision::{CollisionId, CollisionInfo, ContactPool};
use crate::constants::CONTACT_CACHE_MATCH_DIST_SQ;
use crate::dynamics::body::BodyHandle;
use crate::math::Vec3;

/// Canonical body pair. Static geometry (no body) always sorts second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyPairKey {
    pub first: BodyHandle,
    pub second: Option<BodyHandle>,
}

impl BodyPairKey {
    /// Key for `(body0, body1)` and whether the pair was swapped to build it.
    pub fn new(body0: BodyHandle, body1: Option<BodyHandle>) -> (Self, bool) {
        match body1 {
            Some(b1) if b1 < body0 => (
                Self {
                    first: b1,
                    second: Some(body0),
                },
                true,
            ),
            _ => (
                Self {
                    first: body0,
                    second: body1,
                },
                false,
            ),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CachedImpulse {
    /// Contact offset from the key's first body.
    pub r: Vec3,
    pub normal_impulse: f32,
    pub normal_impulse_aux: f32,
    /// Friction impulse as applied to the key's first body.
    pub friction_impulse: Vec3,
}

#[derive(Debug, Default)]
pub struct ContactCache {
    entries: HashMap<BodyPairKey, Vec<CachedImpulse>>,
}

impl ContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, key: &BodyPairKey) -> Option<&[CachedImpulse]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Replace the cache with the impulses of this step's collisions.
    pub fn update(&mut self, pool: &ContactPool, collisions: &[CollisionId]) {
        self.entries.clear();
        for info in collisions.iter().filter_map(|id| pool.get(*id)) {
            let (key, reversed) = BodyPairKey::new(info.body0, info.body1);
            let list = self.entries.entry(key).or_default();
            for pt in info.points() {
                let (r, friction) = if reversed {
                    (pt.r1, -pt.accumulated_friction_impulse)
                } else {
                    (pt.r0, pt.accumulated_friction_impulse)
                };
                list.push(CachedImpulse {
                    r,
                    normal_impulse: pt.accumulated_normal_impulse,
                    normal_impulse_aux: pt.accumulated_normal_impulse_aux,
                    friction_impulse: friction,
                });
            }
        }
        log::trace!("contact cache holds {} body pairs", self.entries.len());
    }

    /// Seed the accumulators of `info` from the cache. Points with no nearby
    /// cached point start from zero.
    pub fn warm_start(&self, info: &mut CollisionInfo) {
        let (key, reversed) = BodyPairKey::new(info.body0, info.body1);
        let cached = self.entries.get(&key);
        for pt in info.points_mut() {
            pt.accumulated_normal_impulse = 0.0;
            pt.accumulated_normal_impulse_aux = 0.0;
            pt.accumulated_friction_impulse = Vec3::zeros();
            let Some(cached) = cached else {
                continue;
            };
            let r = if reversed { pt.r1 } else { pt.r0 };
            let best = cached
                .iter()
                .map(|c| ((c.r - r).norm_squared(), c))
                .filter(|(d, _)| *d < CONTACT_CACHE_MATCH_DIST_SQ)
                .min_by(|a, b| a.0.total_cmp(&b.0));
            if let Some((_, c)) = best {
                pt.accumulated_normal_impulse = c.normal_impulse;
                pt.accumulated_normal_impulse_aux = c.normal_impulse_aux;
                pt.accumulated_friction_impulse = if reversed {
                    -c.friction_impulse
                } else {
                    c.friction_impulse
                };
            }
        }
    }
}
