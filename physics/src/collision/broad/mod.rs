/*!
Broad phase: candidate skin pairs for the narrow phase.

Three interchangeable strategies implement `BroadPhase`:

- brute: every tracked skin against every query skin (reference baseline)
- grid:  uniform wrapping grid with per-cell linked buckets and an overflow list
- sap:   single-axis sweep and prune over a lazily sorted list

Every strategy applies the same pair filter (`DetectionContext::admit_pair`),
so for identical input they hand the same pair set to the functor; they only
differ in which pairs they bother to look at.
*/

pub mod brute;
pub mod grid;
pub mod sap;

pub use brute::BruteForce;
pub use grid::Grid;
pub use sap::SweepAndPrune;

use std::collections::HashSet;

use crate::collision::skin::{CollisionSkin, SkinHandle, SkinSet};
use crate::collision::types::{Segment, SegmentHit, aabb_overlaps, segment_hits_aabb};
use crate::dynamics::{BodyHandle, BodySet};
use crate::error::Result;
use crate::settings::BroadPhaseKind;

/// Read access to the world objects a broad phase reasons about.
#[derive(Clone, Copy)]
pub struct DetectionContext<'a> {
    pub skins: &'a SkinSet,
    pub bodies: &'a BodySet,
}

/// Single-skin filter for queries.
pub trait SkinPredicate {
    fn consider_skin(&self, skin: SkinHandle, data: &CollisionSkin) -> bool;
}

impl<F> SkinPredicate for F
where
    F: Fn(SkinHandle, &CollisionSkin) -> bool,
{
    fn consider_skin(&self, skin: SkinHandle, data: &CollisionSkin) -> bool {
        self(skin, data)
    }
}

/// Skin-pair filter for collision detection.
pub trait SkinPairPredicate {
    fn consider_skin_pair(&self, skin0: SkinHandle, skin1: SkinHandle) -> bool;
}

impl<F> SkinPairPredicate for F
where
    F: Fn(SkinHandle, SkinHandle) -> bool,
{
    fn consider_skin_pair(&self, skin0: SkinHandle, skin1: SkinHandle) -> bool {
        self(skin0, skin1)
    }
}

/// Receiver of admitted skin pairs. `skin0` always belongs to an active body.
pub trait SkinPairFunctor {
    fn collide(&mut self, skin0: SkinHandle, skin1: SkinHandle);
}

pub trait BroadPhase {
    /// Start tracking `skin`. Returns `false` (and logs) if it is already tracked.
    fn add_skin(&mut self, skin: SkinHandle, skins: &SkinSet) -> bool;

    /// Stop tracking `skin`. Returns `false` (and logs) if it was not tracked.
    fn remove_skin(&mut self, skin: SkinHandle) -> bool;

    /// The skin's bounding box changed.
    fn skin_moved(&mut self, skin: SkinHandle, skins: &SkinSet);

    fn contains(&self, skin: SkinHandle) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pairs between one body's skin and the rest of the world.
    fn detect_collisions(
        &mut self,
        ctx: DetectionContext<'_>,
        body: BodyHandle,
        functor: &mut dyn SkinPairFunctor,
        predicate: Option<&dyn SkinPairPredicate>,
        tolerance: f32,
    );

    /// Pairs between the skins of `bodies` and the rest of the world, each
    /// unordered pair at most once.
    fn detect_all_collisions(
        &mut self,
        ctx: DetectionContext<'_>,
        bodies: &[BodyHandle],
        functor: &mut dyn SkinPairFunctor,
        predicate: Option<&dyn SkinPairPredicate>,
        tolerance: f32,
    );

    /// Nearest hit of `segment` against tracked skins.
    fn segment_intersect(
        &mut self,
        ctx: DetectionContext<'_>,
        segment: &Segment,
        predicate: Option<&dyn SkinPredicate>,
    ) -> Option<SegmentHit>;
}

/// Build the strategy selected by `kind`.
pub fn create_broad_phase(kind: &BroadPhaseKind) -> Result<Box<dyn BroadPhase>> {
    Ok(match kind {
        BroadPhaseKind::BruteForce => Box::new(BruteForce::new()),
        BroadPhaseKind::Grid(params) => Box::new(Grid::new(*params)?),
        BroadPhaseKind::SweepAndPrune => Box::new(SweepAndPrune::new()),
    })
}

impl<'a> DetectionContext<'a> {
    pub fn new(skins: &'a SkinSet, bodies: &'a BodySet) -> Self {
        Self { skins, bodies }
    }

    /// The skin of `body`, if the body exists and has one.
    pub fn skin_of(&self, body: BodyHandle) -> Option<SkinHandle> {
        self.bodies.get(body).and_then(|b| b.skin())
    }

    fn owner_active(&self, skin: &CollisionSkin) -> bool {
        skin.owner()
            .and_then(|b| self.bodies.get(b))
            .is_some_and(|b| b.is_active())
    }

    /// Skins of `bodies`, in order, as a list and a lookup set.
    pub(crate) fn query_skins(&self, bodies: &[BodyHandle]) -> (Vec<SkinHandle>, HashSet<SkinHandle>) {
        let list: Vec<SkinHandle> = bodies.iter().filter_map(|b| self.skin_of(*b)).collect();
        let set = list.iter().copied().collect();
        (list, set)
    }

    /// The shared pair filter every strategy applies.
    pub(crate) fn admit_pair(
        &self,
        s0: SkinHandle,
        s1: SkinHandle,
        predicate: Option<&dyn SkinPairPredicate>,
        tolerance: f32,
    ) -> bool {
        if s0 == s1 {
            return false;
        }
        let (Some(a), Some(b)) = (self.skins.get(s0), self.skins.get(s1)) else {
            return false;
        };
        match (a.owner(), b.owner()) {
            (None, None) => return false,
            (Some(x), Some(y)) if x == y => return false,
            _ => {}
        }
        if !self.owner_active(a) && !self.owner_active(b) {
            return false;
        }
        if a.is_non_collidable(s1) || b.is_non_collidable(s0) {
            return false;
        }
        if predicate.is_some_and(|p| !p.consider_skin_pair(s0, s1)) {
            return false;
        }
        aabb_overlaps(a.world_aabb(), b.world_aabb(), tolerance)
    }

    /// Nearest segment hit among `candidates`.
    pub(crate) fn nearest_hit(
        &self,
        candidates: impl IntoIterator<Item = SkinHandle>,
        segment: &Segment,
        predicate: Option<&dyn SkinPredicate>,
    ) -> Option<SegmentHit> {
        let mut best: Option<SegmentHit> = None;
        for handle in candidates {
            let Some(skin) = self.skins.get(handle) else {
                continue;
            };
            if predicate.is_some_and(|p| !p.consider_skin(handle, skin)) {
                continue;
            }
            if !segment_hits_aabb(segment, skin.world_aabb()) {
                continue;
            }
            if let Some((primitive, hit)) = skin.segment_intersect(segment) {
                if best.is_none_or(|b| hit.fraction < b.fraction) {
                    best = Some(SegmentHit {
                        skin: handle,
                        primitive,
                        fraction: hit.fraction,
                        position: hit.position,
                        normal: hit.normal,
                    });
                }
            }
        }
        best
    }
}

/// With both skins among the queries, only the lower handle reports the pair.
#[inline]
pub(crate) fn first_visit(queries: &HashSet<SkinHandle>, query: SkinHandle, other: SkinHandle) -> bool {
    !queries.contains(&other) || query < other
}
