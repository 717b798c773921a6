//! Sweep and prune along X.
//!
//! Skins are kept in a list sorted by the minimum X of their bounding box.
//! Adding or moving a skin only marks the list dirty; it is re-sorted at the
//! start of the next query. Candidate pairs are those whose X intervals
//! overlap (inflated by the tolerance); the shared filter then checks the
//! full boxes.

use crate::collision::broad::{
    BroadPhase, DetectionContext, SkinPairFunctor, SkinPairPredicate, SkinPredicate,
};
use crate::collision::skin::{SkinHandle, SkinSet};
use crate::collision::types::{Segment, SegmentHit};
use crate::dynamics::BodyHandle;

#[derive(Clone, Debug, Default)]
pub struct SweepAndPrune {
    skins: Vec<SkinHandle>,
    dirty: bool,
}

fn x_interval(skins: &SkinSet, skin: SkinHandle) -> (f32, f32) {
    skins
        .get(skin)
        .map(|s| (s.world_aabb().mins.x, s.world_aabb().maxs.x))
        .unwrap_or((f32::INFINITY, f32::INFINITY))
}

impl SweepAndPrune {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_sorted(&mut self, skins: &SkinSet) {
        if !self.dirty {
            return;
        }
        self.skins
            .sort_by(|a, b| x_interval(skins, *a).0.total_cmp(&x_interval(skins, *b).0));
        self.dirty = false;
    }

    /// Tracked skins in sweep order (sorted on the last query).
    pub fn sorted_skins(&self) -> &[SkinHandle] {
        &self.skins
    }
}

impl BroadPhase for SweepAndPrune {
    fn add_skin(&mut self, skin: SkinHandle, _skins: &SkinSet) -> bool {
        if self.skins.contains(&skin) {
            log::warn!("skin {skin:?} is already in the sweep list");
            return false;
        }
        self.skins.push(skin);
        self.dirty = true;
        true
    }

    fn remove_skin(&mut self, skin: SkinHandle) -> bool {
        match self.skins.iter().position(|s| *s == skin) {
            Some(idx) => {
                // Removal keeps the remaining order sorted.
                self.skins.remove(idx);
                true
            }
            None => {
                log::warn!("skin {skin:?} is not in the sweep list");
                false
            }
        }
    }

    fn skin_moved(&mut self, _skin: SkinHandle, _skins: &SkinSet) {
        self.dirty = true;
    }

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
        self.ensure_sorted(ctx.skins);
        let (lo, hi) = x_interval(ctx.skins, s0);
        for &s1 in &self.skins {
            let (min_x, max_x) = x_interval(ctx.skins, s1);
            if min_x > hi + tolerance {
                break;
            }
            if max_x + tolerance < lo {
                continue;
            }
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
        self.ensure_sorted(ctx.skins);
        let (_, query_set) = ctx.query_skins(bodies);
        for (i, &si) in self.skins.iter().enumerate() {
            let (_, hi) = x_interval(ctx.skins, si);
            for &sj in &self.skins[i + 1..] {
                if x_interval(ctx.skins, sj).0 > hi + tolerance {
                    break;
                }
                // Each unordered pair is visited once by the sweep; when both
                // sides are queries the lower handle reports, as elsewhere.
                let (s0, s1) = match (query_set.contains(&si), query_set.contains(&sj)) {
                    (true, true) if sj < si => (sj, si),
                    (true, _) => (si, sj),
                    (false, true) => (sj, si),
                    (false, false) => continue,
                };
                if ctx.admit_pair(s0, s1, predicate, tolerance) {
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
        self.ensure_sorted(ctx.skins);
        let seg_box = segment.aabb();
        let candidates = self
            .skins
            .iter()
            .copied()
            .take_while(|s| x_interval(ctx.skins, *s).0 <= seg_box.maxs.x)
            .filter(|s| x_interval(ctx.skins, *s).1 >= seg_box.mins.x);
        ctx.nearest_hit(candidates, segment, predicate)
    }
}
