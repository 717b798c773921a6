//! Narrow-phase dispatch.
//!
//! Detection routines are registered per unordered pair of primitive kinds.
//! A routine is written for one declared order `(kind0, kind1)`; when the
//! broad phase hands over the pair the other way round, the descriptor is
//! swapped before the call and the reported normal and offsets are flipped
//! back on the way out, so every routine only handles its own order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::collision::SkinPairFunctor;
use crate::collision::detect;
use crate::collision::info::{CollisionId, ContactPool, DetectedPoint};
use crate::collision::material::MaterialTable;
use crate::collision::primitive::{Primitive, PrimitiveKind};
use crate::collision::skin::{SkinHandle, SkinSet};
use crate::collision::types::aabb_overlaps;
use crate::constants::MAX_CONTACT_POINTS;
use crate::dynamics::BodySet;
use crate::math::{Transform, Vec3, try_normalize};

/// Everything a detection routine needs to know about one primitive pair.
#[derive(Clone, Copy, Debug)]
pub struct PrimitivePair<'a> {
    pub skin0: SkinHandle,
    pub skin1: SkinHandle,
    pub prim0: usize,
    pub prim1: usize,
    pub primitive0: &'a Primitive,
    pub primitive1: &'a Primitive,
    pub old0: Transform,
    pub new0: Transform,
    pub old1: Transform,
    pub new1: Transform,
    /// Old position of each owning body; the origin for static skins.
    pub body0_position: Vec3,
    pub body1_position: Vec3,
}

impl PrimitivePair<'_> {
    pub fn swapped(&self) -> Self {
        Self {
            skin0: self.skin1,
            skin1: self.skin0,
            prim0: self.prim1,
            prim1: self.prim0,
            primitive0: self.primitive1,
            primitive1: self.primitive0,
            old0: self.old1,
            new0: self.new1,
            old1: self.old0,
            new1: self.new0,
            body0_position: self.body1_position,
            body1_position: self.body0_position,
        }
    }

    /// Build a detected point from a world position and depth.
    #[inline]
    pub fn point_at(&self, world: Vec3, initial_penetration: f32) -> DetectedPoint {
        DetectedPoint {
            r0: world - self.body0_position,
            r1: world - self.body1_position,
            initial_penetration,
        }
    }
}

/// Receiver of detected contacts.
pub trait CollisionNotify {
    /// `dir_to_body0` is the unit normal pointing from primitive 1 towards primitive 0.
    fn notify(&mut self, pair: &PrimitivePair<'_>, dir_to_body0: Vec3, points: &[DetectedPoint]);
}

/// A narrow-phase detection routine for one primitive-kind pair.
pub trait CollDetect {
    fn detect(&self, pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify);
}

impl<F> CollDetect for F
where
    F: Fn(&PrimitivePair<'_>, f32, &mut dyn CollisionNotify),
{
    fn detect(&self, pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) {
        self(pair, tolerance, notify)
    }
}

#[derive(Clone)]
struct Routine {
    detector: Arc<dyn CollDetect>,
    swap: bool,
}

/// Registry of detection routines keyed by primitive kinds.
#[derive(Clone)]
pub struct NarrowPhase {
    routines: HashMap<(PrimitiveKind, PrimitiveKind), Routine>,
}

impl Default for NarrowPhase {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl NarrowPhase {
    /// A registry with no routines at all.
    pub fn empty() -> Self {
        Self {
            routines: HashMap::new(),
        }
    }

    /// A registry with every built-in routine installed.
    pub fn with_builtin() -> Self {
        use PrimitiveKind::*;
        let mut np = Self::empty();
        np.register(Sphere, Sphere, detect::sphere_sphere);
        np.register(Sphere, Plane, detect::sphere_plane);
        np.register(Box, Plane, detect::box_plane);
        np.register(Capsule, Plane, detect::capsule_plane);
        np.register(Box, Box, detect::box_box);
        np.register(Sphere, Box, detect::generic_contact);
        np.register(Sphere, Capsule, detect::generic_contact);
        np.register(Box, Capsule, detect::generic_contact);
        np.register(Capsule, Capsule, detect::generic_contact);
        np
    }

    /// Install `detector` for `(kind0, kind1)`, replacing any previous routine
    /// for that unordered pair.
    pub fn register(&mut self, kind0: PrimitiveKind, kind1: PrimitiveKind, detector: impl CollDetect + 'static) {
        let detector: Arc<dyn CollDetect> = Arc::new(detector);
        self.routines.insert(
            (kind0, kind1),
            Routine {
                detector: detector.clone(),
                swap: false,
            },
        );
        if kind0 != kind1 {
            self.routines
                .insert((kind1, kind0), Routine { detector, swap: true });
        }
    }

    pub fn unregister(&mut self, kind0: PrimitiveKind, kind1: PrimitiveKind) {
        self.routines.remove(&(kind0, kind1));
        self.routines.remove(&(kind1, kind0));
    }

    pub fn has_routine(&self, kind0: PrimitiveKind, kind1: PrimitiveKind) -> bool {
        self.routines.contains_key(&(kind0, kind1))
    }

    /// Run the routine for `pair`. Returns `false` when no routine is registered.
    pub fn detect(&self, pair: &PrimitivePair<'_>, tolerance: f32, notify: &mut dyn CollisionNotify) -> bool {
        let key = (pair.primitive0.kind(), pair.primitive1.kind());
        let Some(routine) = self.routines.get(&key) else {
            log::trace!("no narrow-phase routine for {:?}/{:?}", key.0, key.1);
            return false;
        };
        if routine.swap {
            let swapped = pair.swapped();
            let mut flip = FlippedNotify {
                inner: notify,
                original: pair,
            };
            routine.detector.detect(&swapped, tolerance, &mut flip);
        } else {
            routine.detector.detect(pair, tolerance, notify);
        }
        true
    }
}

/// Restores the caller's order for a routine that ran on a swapped pair.
struct FlippedNotify<'n, 'p, 'a> {
    inner: &'n mut dyn CollisionNotify,
    original: &'p PrimitivePair<'a>,
}

impl CollisionNotify for FlippedNotify<'_, '_, '_> {
    fn notify(&mut self, _swapped: &PrimitivePair<'_>, dir_to_body0: Vec3, points: &[DetectedPoint]) {
        let n = points.len().min(MAX_CONTACT_POINTS);
        let mut flipped = [DetectedPoint::default(); MAX_CONTACT_POINTS];
        for (dst, src) in flipped.iter_mut().zip(&points[..n]) {
            *dst = DetectedPoint {
                r0: src.r1,
                r1: src.r0,
                initial_penetration: src.initial_penetration,
            };
        }
        self.inner.notify(self.original, -dir_to_body0, &flipped[..n]);
    }
}

/// Collects narrow-phase results for skin pairs handed over by the broad phase.
pub struct ContactCollector<'a> {
    pub narrow: &'a NarrowPhase,
    pub materials: &'a MaterialTable,
    pub skins: &'a SkinSet,
    pub bodies: &'a BodySet,
    pub pool: &'a mut ContactPool,
    pub collisions: &'a mut Vec<CollisionId>,
    pub tolerance: f32,
}

impl ContactCollector<'_> {
    fn owner_position(&self, skin: SkinHandle) -> Vec3 {
        self.skins
            .get(skin)
            .and_then(|s| s.owner())
            .and_then(|b| self.bodies.get(b))
            .map(|b| b.old_position())
            .unwrap_or_else(Vec3::zeros)
    }
}

impl SkinPairFunctor for ContactCollector<'_> {
    fn collide(&mut self, skin0: SkinHandle, skin1: SkinHandle) {
        let skins = self.skins;
        let narrow = self.narrow;
        let (Some(s0), Some(s1)) = (skins.get(skin0), skins.get(skin1)) else {
            return;
        };
        let body0_position = self.owner_position(skin0);
        let body1_position = self.owner_position(skin1);
        let multi = s0.num_primitives() > 1 || s1.num_primitives() > 1;

        for (i, p0) in s0.primitives().iter().enumerate() {
            for (j, p1) in s1.primitives().iter().enumerate() {
                if multi && !aabb_overlaps(p0.new_aabb(), p1.new_aabb(), self.tolerance) {
                    continue;
                }
                let pair = PrimitivePair {
                    skin0,
                    skin1,
                    prim0: i,
                    prim1: j,
                    primitive0: &p0.primitive,
                    primitive1: &p1.primitive,
                    old0: *p0.old_world(),
                    new0: *p0.new_world(),
                    old1: *p1.old_world(),
                    new1: *p1.new_world(),
                    body0_position,
                    body1_position,
                };
                let tolerance = self.tolerance;
                narrow.detect(&pair, tolerance, self);
            }
        }
    }
}

impl CollisionNotify for ContactCollector<'_> {
    fn notify(&mut self, pair: &PrimitivePair<'_>, dir_to_body0: Vec3, points: &[DetectedPoint]) {
        if points.is_empty() {
            return;
        }
        let (Some(s0), Some(s1)) = (self.skins.get(pair.skin0), self.skins.get(pair.skin1)) else {
            return;
        };
        if !s0.accepts_contact(pair.skin0, pair.skin1) || !s1.accepts_contact(pair.skin1, pair.skin0) {
            return;
        }
        let Some(body0) = s0.owner() else {
            log::warn!("contact reported for ownerless skin {:?}; dropped", pair.skin0);
            return;
        };
        let (Some(m0), Some(m1)) = (s0.primitive(pair.prim0), s1.primitive(pair.prim1)) else {
            return;
        };
        let material = self.materials.resolve(&m0.material, &m1.material);
        let dir = try_normalize(&dir_to_body0).unwrap_or_else(Vec3::y);

        let id = self.pool.acquire();
        let Some(info) = self.pool.get_mut(id) else {
            return;
        };
        info.skin0 = pair.skin0;
        info.skin1 = pair.skin1;
        info.body0 = body0;
        info.body1 = s1.owner();
        info.prim0 = pair.prim0;
        info.prim1 = pair.prim1;
        info.dir_to_body0 = dir;
        info.material = material;
        info.satisfied = false;
        info.set_points(&pair.body0_position, points);
        self.collisions.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records what the dispatcher delivers.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(SkinHandle, Vec3, Vec<DetectedPoint>)>,
    }

    impl CollisionNotify for Recorder {
        fn notify(&mut self, pair: &PrimitivePair<'_>, dir: Vec3, points: &[DetectedPoint]) {
            self.calls.push((pair.skin0, dir, points.to_vec()));
        }
    }

    fn pair<'a>(p0: &'a Primitive, t0: Transform, p1: &'a Primitive, t1: Transform) -> PrimitivePair<'a> {
        let mut skins: slotmap::SlotMap<SkinHandle, ()> = slotmap::SlotMap::with_key();
        let (a, b) = (skins.insert(()), skins.insert(()));
        PrimitivePair {
            skin0: a,
            skin1: b,
            prim0: 0,
            prim1: 0,
            primitive0: p0,
            primitive1: p1,
            old0: t0,
            new0: t0,
            old1: t1,
            new1: t1,
            body0_position: t0.position,
            body1_position: Vec3::zeros(),
        }
    }

    #[test]
    fn reversed_pair_flips_normal_back() {
        // The built-in routine is declared (Sphere, Plane); call it as (Plane, Sphere).
        let np = NarrowPhase::with_builtin();
        let plane = Primitive::Plane;
        let sphere = Primitive::sphere(1.0);
        let p = pair(
            &plane,
            Transform::identity(),
            &sphere,
            Transform::from_position(Vec3::new(0.0, 0.99, 0.0)),
        );
        let mut rec = Recorder::default();
        assert!(np.detect(&p, 0.05, &mut rec));
        assert_eq!(rec.calls.len(), 1);
        let (skin0, dir, pts) = &rec.calls[0];
        assert_eq!(*skin0, p.skin0);
        // Normal points towards primitive 0, the plane: straight down.
        assert!((dir - Vec3::new(0.0, -1.0, 0.0)).norm() < 1.0e-5);
        assert!((pts[0].initial_penetration - 0.01).abs() < 1.0e-4);
    }

    #[test]
    fn unregistered_pair_reports_nothing() {
        let np = NarrowPhase::with_builtin();
        let plane = Primitive::Plane;
        let p = pair(&plane, Transform::identity(), &plane, Transform::identity());
        let mut rec = Recorder::default();
        assert!(!np.detect(&p, 0.05, &mut rec));
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn custom_routine_replaces_builtin_for_both_orders() {
        let mut np = NarrowPhase::with_builtin();
        np.register(
            PrimitiveKind::Sphere,
            PrimitiveKind::Box,
            |pair: &PrimitivePair<'_>, _tol: f32, notify: &mut dyn CollisionNotify| {
                notify.notify(pair, Vec3::x(), &[pair.point_at(Vec3::zeros(), 0.5)]);
            },
        );
        assert!(np.has_routine(PrimitiveKind::Box, PrimitiveKind::Sphere));
        let cube = Primitive::cuboid(Vec3::new(1.0, 1.0, 1.0));
        let sphere = Primitive::sphere(1.0);
        let p = pair(&cube, Transform::identity(), &sphere, Transform::identity());
        let mut rec = Recorder::default();
        np.detect(&p, 0.0, &mut rec);
        assert_eq!(rec.calls.len(), 1);
        assert!((rec.calls[0].1 + Vec3::x()).norm() < 1.0e-6);
    }
}
