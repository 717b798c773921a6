//! Uniform wrapping grid.
//!
//! Each tracked skin sits in exactly one bucket: the cell containing the
//! minimum corner of its bounding box (coordinates wrap modulo the grid
//! size), or the overflow bucket when the box is larger than a cell along
//! any axis. Buckets are intrusive doubly linked lists so moving a skin
//! between cells is O(1). A query grows the skin's box by the collision
//! tolerance and gathers every cell that could hold the minimum corner of an
//! overlapping skin (one extra cell below on each axis) plus the overflow
//! bucket; overflow skins are tested against everything.

use parry3d::bounding_volume::Aabb;
use slotmap::SecondaryMap;

use crate::collision::broad::{
    BroadPhase, DetectionContext, SkinPairFunctor, SkinPairPredicate, SkinPredicate, first_visit,
};
use crate::collision::skin::{SkinHandle, SkinSet};
use crate::collision::types::{Segment, SegmentHit};
use crate::dynamics::BodyHandle;
use crate::error::Result;
use crate::settings::GridParams;

/// `None` is the overflow bucket.
type Bucket = Option<usize>;

#[derive(Clone, Copy, Debug)]
struct GridEntry {
    bucket: Bucket,
    prev: Option<SkinHandle>,
    next: Option<SkinHandle>,
}

#[derive(Clone, Debug)]
pub struct Grid {
    params: GridParams,
    heads: Vec<Option<SkinHandle>>,
    overflow_head: Option<SkinHandle>,
    entries: SecondaryMap<SkinHandle, GridEntry>,
}

impl Grid {
    pub fn new(params: GridParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            heads: vec![None; params.nx * params.ny * params.nz],
            overflow_head: None,
            entries: SecondaryMap::new(),
        })
    }

    #[inline]
    pub fn params(&self) -> &GridParams {
        &self.params
    }

    /// Flatten wrapped cell coordinates into a bucket index (row-major, x fastest).
    #[inline]
    pub fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.params.nx * j + self.params.nx * self.params.ny * k
    }

    /// Wrapped cell coordinates of a world point.
    pub fn cell_coords(&self, x: f32, y: f32, z: f32) -> (usize, usize, usize) {
        let p = &self.params;
        (
            wrap((x / p.dx).floor(), p.nx),
            wrap((y / p.dy).floor(), p.ny),
            wrap((z / p.dz).floor(), p.nz),
        )
    }

    fn fits_in_cell(&self, aabb: &Aabb) -> bool {
        let ext = aabb.maxs - aabb.mins;
        ext.x <= self.params.dx && ext.y <= self.params.dy && ext.z <= self.params.dz
    }

    fn bucket_for(&self, aabb: &Aabb) -> Bucket {
        if !self.fits_in_cell(aabb) {
            return None;
        }
        let (i, j, k) = self.cell_coords(aabb.mins.x, aabb.mins.y, aabb.mins.z);
        Some(self.cell_index(i, j, k))
    }

    /// Bucket currently holding `skin`: `Some(None)` means overflow.
    pub fn bucket_of(&self, skin: SkinHandle) -> Option<Bucket> {
        self.entries.get(skin).map(|e| e.bucket)
    }

    /// Number of skins in the overflow bucket.
    pub fn overflow_len(&self) -> usize {
        self.bucket_members(None).count()
    }

    fn head(&self, bucket: Bucket) -> Option<SkinHandle> {
        match bucket {
            Some(idx) => self.heads[idx],
            None => self.overflow_head,
        }
    }

    fn set_head(&mut self, bucket: Bucket, head: Option<SkinHandle>) {
        match bucket {
            Some(idx) => self.heads[idx] = head,
            None => self.overflow_head = head,
        }
    }

    fn link(&mut self, skin: SkinHandle, bucket: Bucket) {
        let old_head = self.head(bucket);
        if let Some(h) = old_head {
            if let Some(e) = self.entries.get_mut(h) {
                e.prev = Some(skin);
            }
        }
        self.entries.insert(
            skin,
            GridEntry {
                bucket,
                prev: None,
                next: old_head,
            },
        );
        self.set_head(bucket, Some(skin));
    }

    fn unlink(&mut self, skin: SkinHandle) -> Option<GridEntry> {
        let entry = self.entries.remove(skin)?;
        match entry.prev {
            Some(p) => {
                if let Some(e) = self.entries.get_mut(p) {
                    e.next = entry.next;
                }
            }
            None => self.set_head(entry.bucket, entry.next),
        }
        if let Some(n) = entry.next {
            if let Some(e) = self.entries.get_mut(n) {
                e.prev = entry.prev;
            }
        }
        Some(entry)
    }

    fn bucket_members(&self, bucket: Bucket) -> impl Iterator<Item = SkinHandle> + '_ {
        std::iter::successors(self.head(bucket), move |s| self.entries.get(*s).and_then(|e| e.next))
    }

    /// Distinct wrapped cells along one axis that may hold the minimum corner
    /// of a cell-sized box overlapping `[lo, hi]`.
    fn axis_cells(lo: f32, hi: f32, d: f32, n: usize) -> Vec<usize> {
        let first = ((lo - d) / d).floor() as i64;
        let last = (hi / d).floor() as i64;
        if last - first + 1 >= n as i64 {
            return (0..n).collect();
        }
        (first..=last).map(|c| c.rem_euclid(n as i64) as usize).collect()
    }

    /// Every skin that may come within `tolerance` of `skin`, excluding itself.
    fn candidates(&self, skin: SkinHandle, aabb: &Aabb, tolerance: f32, out: &mut Vec<SkinHandle>) {
        out.clear();
        let Some(entry) = self.entries.get(skin) else {
            return;
        };
        if entry.bucket.is_none() {
            out.extend(self.entries.keys().filter(|s| *s != skin));
            return;
        }
        let p = &self.params;
        let (lo, hi) = (aabb.mins.coords.add_scalar(-tolerance), aabb.maxs.coords.add_scalar(tolerance));
        let xs = Self::axis_cells(lo.x, hi.x, p.dx, p.nx);
        let ys = Self::axis_cells(lo.y, hi.y, p.dy, p.ny);
        let zs = Self::axis_cells(lo.z, hi.z, p.dz, p.nz);
        for &z in &zs {
            for &y in &ys {
                for &x in &xs {
                    let idx = self.cell_index(x, y, z);
                    out.extend(self.bucket_members(Some(idx)).filter(|s| *s != skin));
                }
            }
        }
        out.extend(self.bucket_members(None).filter(|s| *s != skin));
    }
}

fn wrap(cell: f32, n: usize) -> usize {
    (cell as i64).rem_euclid(n as i64) as usize
}

impl BroadPhase for Grid {
    fn add_skin(&mut self, skin: SkinHandle, skins: &SkinSet) -> bool {
        if self.entries.contains_key(skin) {
            log::warn!("skin {skin:?} is already in the grid");
            return false;
        }
        let Some(data) = skins.get(skin) else {
            log::warn!("cannot add unknown skin {skin:?} to the grid");
            return false;
        };
        let bucket = self.bucket_for(data.world_aabb());
        self.link(skin, bucket);
        true
    }

    fn remove_skin(&mut self, skin: SkinHandle) -> bool {
        if self.unlink(skin).is_none() {
            log::warn!("skin {skin:?} is not in the grid");
            return false;
        }
        true
    }

    fn skin_moved(&mut self, skin: SkinHandle, skins: &SkinSet) {
        let (Some(entry), Some(data)) = (self.entries.get(skin), skins.get(skin)) else {
            return;
        };
        let bucket = self.bucket_for(data.world_aabb());
        if bucket != entry.bucket {
            self.unlink(skin);
            self.link(skin, bucket);
        }
    }

    fn contains(&self, skin: SkinHandle) -> bool {
        self.entries.contains_key(skin)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn detect_collisions(
        &mut self,
        ctx: DetectionContext<'_>,
        body: BodyHandle,
        functor: &mut dyn SkinPairFunctor,
        predicate: Option<&dyn SkinPairPredicate>,
        tolerance: f32,
    ) {
        let Some(s0) = ctx.skin_of(body) else {
            return;
        };
        let Some(aabb) = ctx.skins.get(s0).map(|s| *s.world_aabb()) else {
            return;
        };
        let mut candidates = Vec::new();
        self.candidates(s0, &aabb, tolerance, &mut candidates);
        for s1 in candidates {
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
        let mut candidates = Vec::new();
        for s0 in queries {
            let Some(aabb) = ctx.skins.get(s0).map(|s| *s.world_aabb()) else {
                continue;
            };
            self.candidates(s0, &aabb, tolerance, &mut candidates);
            for &s1 in &candidates {
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
        // Segments may be arbitrarily long; filtering happens on the skin boxes.
        ctx.nearest_hit(self.entries.keys(), segment, predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    use crate::collision::material::MaterialId;
    use crate::collision::primitive::Primitive;
    use crate::collision::skin::CollisionSkin;
    use crate::math::{Transform, Vec3};

    fn params() -> GridParams {
        GridParams {
            nx: 4,
            ny: 3,
            nz: 5,
            dx: 2.0,
            dy: 2.0,
            dz: 2.0,
        }
    }

    fn sphere_skin(skins: &mut SkinSet, pos: Vec3, radius: f32) -> SkinHandle {
        let mut skin = CollisionSkin::at(Transform::from_position(pos));
        skin.add_primitive(Primitive::sphere(radius), Transform::identity(), MaterialId::Normal)
            .unwrap();
        skins.insert(skin)
    }

    #[test]
    fn cell_index_is_a_bijection() {
        // Row-major flattening must give every (i, j, k) its own bucket. The
        // additive form `i + nx*j + (nx+ny)*k` is not injective: with these
        // dimensions (3,1,0) and (0,0,1) share a bucket.
        let grid = Grid::new(params()).unwrap();
        let p = params();
        let mut seen = vec![false; p.nx * p.ny * p.nz];
        for k in 0..p.nz {
            for j in 0..p.ny {
                for i in 0..p.nx {
                    let idx = grid.cell_index(i, j, k);
                    assert!(idx < seen.len());
                    assert!(!seen[idx], "bucket {idx} reused");
                    seen[idx] = true;
                }
            }
        }
        let additive = |i: usize, j: usize, k: usize| i + p.nx * j + (p.nx + p.ny) * k;
        assert_eq!(additive(3, 1, 0), additive(0, 0, 1));
        assert_ne!(grid.cell_index(3, 1, 0), grid.cell_index(0, 0, 1));
    }

    #[test]
    fn coordinates_wrap_in_both_directions() {
        let grid = Grid::new(params()).unwrap();
        assert_eq!(grid.cell_coords(0.5, 0.5, 0.5), (0, 0, 0));
        assert_eq!(grid.cell_coords(8.5, 6.5, 10.5), (0, 0, 0));
        assert_eq!(grid.cell_coords(-0.5, -0.5, -0.5), (3, 2, 4));
    }

    #[test]
    fn oversized_skin_goes_to_overflow_and_stays_discoverable() {
        let mut skins: SkinSet = SlotMap::with_key();
        let big = sphere_skin(&mut skins, Vec3::new(1.0, 1.0, 1.0), 5.0);
        let small = sphere_skin(&mut skins, Vec3::new(1.0, 1.0, 1.0), 0.5);
        let mut grid = Grid::new(params()).unwrap();
        assert!(grid.add_skin(big, &skins));
        assert!(grid.add_skin(small, &skins));
        assert_eq!(grid.bucket_of(big), Some(None));
        assert_eq!(grid.overflow_len(), 1);

        let mut out = Vec::new();
        let aabb = *skins[small].world_aabb();
        grid.candidates(small, &aabb, 0.0, &mut out);
        assert!(out.contains(&big));
    }

    #[test]
    fn moving_relinks_only_when_the_cell_changes() {
        let mut skins: SkinSet = SlotMap::with_key();
        let a = sphere_skin(&mut skins, Vec3::new(1.0, 1.0, 1.0), 0.25);
        let b = sphere_skin(&mut skins, Vec3::new(1.2, 1.0, 1.0), 0.25);
        let mut grid = Grid::new(params()).unwrap();
        grid.add_skin(a, &skins);
        grid.add_skin(b, &skins);
        let before = grid.bucket_of(a);

        skins[a].set_new_transform(Transform::from_position(Vec3::new(1.1, 1.0, 1.0)));
        grid.skin_moved(a, &skins);
        assert_eq!(grid.bucket_of(a), before);

        skins[a].set_new_transform(Transform::from_position(Vec3::new(5.0, 1.0, 1.0)));
        grid.skin_moved(a, &skins);
        assert_ne!(grid.bucket_of(a), before);
        // b is still reachable from its bucket after a left it.
        let b_bucket = grid.bucket_of(b).flatten();
        assert!(grid.bucket_members(b_bucket).any(|s| s == b));
        assert!(!grid.bucket_members(b_bucket).any(|s| s == a));
    }

    #[test]
    fn neighbours_across_the_wrap_are_candidates() {
        let mut skins: SkinSet = SlotMap::with_key();
        // Cell x = 3 (last) and cell x = 0 are neighbours through the wrap.
        let a = sphere_skin(&mut skins, Vec3::new(7.5, 1.0, 1.0), 0.25);
        let b = sphere_skin(&mut skins, Vec3::new(8.5, 1.0, 1.0), 0.25);
        let mut grid = Grid::new(params()).unwrap();
        grid.add_skin(a, &skins);
        grid.add_skin(b, &skins);
        let mut out = Vec::new();
        let aabb = *skins[a].world_aabb();
        grid.candidates(a, &aabb, 0.0, &mut out);
        assert!(out.contains(&b));
    }

    #[test]
    fn axis_cells_reach_one_cell_below_the_grown_box() {
        // [4.0, 5.0] grown by 0.05 starts at 3.95, so cell -1 (wrapped to 7) joins.
        assert_eq!(Grid::axis_cells(3.95, 5.05, 4.0, 8), vec![7, 0, 1]);
        assert_eq!(Grid::axis_cells(4.0, 5.0, 4.0, 8), vec![0, 1]);
        assert_eq!(Grid::axis_cells(0.0, 30.0, 4.0, 8), (0..8).collect::<Vec<_>>());
    }
}
