//! Brute-force broad phase: O(n * m), the reference every other strategy is
//! checked against.

use crate::collision::broad::{
    BroadPhase, DetectionContext, SkinPairFunctor, SkinPairPredicate, SkinPredicate, first_visit,
};
use crate::collision::skin::{SkinHandle, SkinSet};
use crate::collision::types::{Segment, SegmentHit};
use crate::dynamics::BodyHandle;

#[derive(Clone, Debug, Default)]
pub struct BruteForce {
    skins: Vec<SkinHandle>,
}

impl BruteForce {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadPhase for BruteForce {
    fn add_skin(&mut self, skin: SkinHandle, _skins: &SkinSet) -> bool {
        if self.skins.contains(&skin) {
            log::warn!("skin {skin:?} is already in the broad phase");
            return false;
        }
        self.skins.push(skin);
        true
    }

    fn remove_skin(&mut self, skin: SkinHandle) -> bool {
        match self.skins.iter().position(|s| *s == skin) {
            Some(idx) => {
                self.skins.remove(idx);
                true
            }
            None => {
                log::warn!("skin {skin:?} is not in the broad phase");
                false
            }
        }
    }

    fn skin_moved(&mut self, _skin: SkinHandle, _skins: &SkinSet) {}

    fn contains(&self, skin: SkinHandle) -> bool {
        self.skins.contains(&skin)
    }

    fn len(&self) -> usize {
        self.skins.len()
    }

    fn detect_collisions(
        &mut self,
        ctx: DetectionContext<'_>,
        body: BodyHandle,
        functor: &mut dyn SkinPairFunctor,
        predicate: Option<&dyn SkinPairPredicate>,
        tolerance: f32,
    ) {
        let Some(s0) = ctx.skin_of(body).filter(|s| self.contains(*s)) else {
            return;
        };
        for &s1 in &self.skins {
            if ctx.admit_pair(s0, s1, predicate, tolerance) {
                functor.collide(s0, s1);
            }
        }
    }

    fn detect_all_collisions(
        &mut self,
        ctx: DetectionContext<'_>,
        bodies: &[BodyHandle],
        functor: &mut dyn SkinPairFunctor,
        predicate: Option<&dyn SkinPairPredicate>,
        tolerance: f32,
    ) {
        let (queries, query_set) = ctx.query_skins(bodies);
        for s0 in queries.into_iter().filter(|s| self.contains(*s)) {
            for &s1 in &self.skins {
                if first_visit(&query_set, s0, s1) && ctx.admit_pair(s0, s1, predicate, tolerance) {
                    functor.collide(s0, s1);
                }
            }
        }
    }

    fn segment_intersect(
        &mut self,
        ctx: DetectionContext<'_>,
        segment: &Segment,
        predicate: Option<&dyn SkinPredicate>,
    ) -> Option<SegmentHit> {
        ctx.nearest_hit(self.skins.iter().copied(), segment, predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    use crate::collision::skin::CollisionSkin;

    #[test]
    fn double_add_and_unknown_remove_are_rejected() {
        let mut skins: SkinSet = SlotMap::with_key();
        let s = skins.insert(CollisionSkin::new());
        let mut bp = BruteForce::new();
        assert!(bp.add_skin(s, &skins));
        assert!(!bp.add_skin(s, &skins));
        assert_eq!(bp.len(), 1);
        assert!(bp.remove_skin(s));
        assert!(!bp.remove_skin(s));
        assert!(bp.is_empty());
    }
}
