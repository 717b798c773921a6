/*!
Collision root module.

Collision detection is split into a broad phase that proposes skin pairs and
a narrow phase that turns primitive pairs into contact records:

- types:        segments, hits and bounding-box helpers
- primitive:    sphere, box, capsule and plane primitives (parry3d-backed)
- material:     material ids, properties and the pair table
- skin:         collision skins (primitives + materials + transforms)
- info:         collision records, contact points and their pool
- broad:        brute-force, grid and sweep-and-prune strategies
- narrow_phase: kind-pair dispatch registry and the contact collector
- detect:       built-in detection routines
*/

pub mod broad;
pub mod detect;
pub mod info;
pub mod material;
pub mod narrow_phase;
pub mod primitive;
pub mod skin;
pub mod types;

// Re-export commonly used types.
pub use broad::{
    BroadPhase, BruteForce, DetectionContext, Grid, SkinPairFunctor, SkinPairPredicate, SkinPredicate,
    SweepAndPrune, create_broad_phase,
};
pub use info::{CollisionId, CollisionInfo, ContactPoint, ContactPool, DetectedPoint};
pub use material::{MaterialId, MaterialPairProperties, MaterialProperties, MaterialTable, PrimitiveMaterial};
pub use narrow_phase::{CollDetect, CollisionNotify, ContactCollector, NarrowPhase, PrimitivePair};
pub use primitive::{MassProperties, Primitive, PrimitiveHit, PrimitiveKind};
pub use skin::{CollisionSkin, SkinHandle, SkinPrimitive, SkinSet};
pub use types::{Segment, SegmentHit};
