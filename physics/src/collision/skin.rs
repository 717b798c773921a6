//! Collision skins: an ordered set of primitives with materials, placed in
//! the world by an old/new transform pair.
//!
//! A skin keeps world-space copies of each primitive for both poses so the
//! narrow phase can test the speculative new pose and measure depth at the
//! old one. The skin's bounding box always encloses the new-pose bounds of
//! every primitive, and the old-pose bounds as well when sweep bounds are on.

use std::fmt;

use parry3d::bounding_volume::Aabb;
use slotmap::SlotMap;

use crate::collision::info::CollisionId;
use crate::collision::material::{MaterialId, MaterialProperties, PrimitiveMaterial};
use crate::collision::primitive::{MassProperties, Primitive, PrimitiveHit, transfer_inertia};
use crate::collision::types::{Segment, aabb_point, aabb_union};
use crate::dynamics::BodyHandle;
use crate::error::{PhysicsError, Result};
use crate::math::{Mat3, Transform, Vec3};

slotmap::new_key_type! {
    pub struct SkinHandle;
}

pub type SkinSet = SlotMap<SkinHandle, CollisionSkin>;

/// Contact veto: called with `(this_skin, other_skin)`; returning `false`
/// discards the collision before it reaches the solver.
pub type ContactCallback = Box<dyn Fn(SkinHandle, SkinHandle) -> bool>;

#[derive(Clone, Debug)]
pub struct SkinPrimitive {
    pub primitive: Primitive,
    /// Placement relative to the skin's transform.
    pub local: Transform,
    pub material: PrimitiveMaterial,
    old_world: Transform,
    new_world: Transform,
    old_aabb: Aabb,
    new_aabb: Aabb,
}

impl SkinPrimitive {
    fn new(primitive: Primitive, local: Transform, material: PrimitiveMaterial) -> Self {
        let aabb = primitive.aabb(&local);
        Self {
            primitive,
            local,
            material,
            old_world: local,
            new_world: local,
            old_aabb: aabb,
            new_aabb: aabb,
        }
    }

    #[inline]
    pub fn old_world(&self) -> &Transform {
        &self.old_world
    }

    #[inline]
    pub fn new_world(&self) -> &Transform {
        &self.new_world
    }

    #[inline]
    pub fn old_aabb(&self) -> &Aabb {
        &self.old_aabb
    }

    #[inline]
    pub fn new_aabb(&self) -> &Aabb {
        &self.new_aabb
    }

    fn place(&mut self, old: &Transform, new: &Transform) {
        self.old_world = old.compose(&self.local);
        self.new_world = new.compose(&self.local);
        self.old_aabb = self.primitive.aabb(&self.old_world);
        self.new_aabb = self.primitive.aabb(&self.new_world);
    }
}

pub struct CollisionSkin {
    primitives: Vec<SkinPrimitive>,
    owner: Option<BodyHandle>,
    old_transform: Transform,
    new_transform: Transform,
    world_aabb: Aabb,
    sweep_bounds: bool,
    non_collidables: Vec<SkinHandle>,
    contact_callback: Option<ContactCallback>,
    pub(crate) collisions: Vec<CollisionId>,
}

impl fmt::Debug for CollisionSkin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionSkin")
            .field("primitives", &self.primitives)
            .field("owner", &self.owner)
            .field("new_transform", &self.new_transform)
            .field("world_aabb", &self.world_aabb)
            .field("non_collidables", &self.non_collidables)
            .field("has_contact_callback", &self.contact_callback.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for CollisionSkin {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionSkin {
    pub fn new() -> Self {
        Self {
            primitives: Vec::new(),
            owner: None,
            old_transform: Transform::identity(),
            new_transform: Transform::identity(),
            world_aabb: aabb_point(&Vec3::zeros()),
            sweep_bounds: false,
            non_collidables: Vec::new(),
            contact_callback: None,
            collisions: Vec::new(),
        }
    }

    /// A static skin placed at `transform`.
    pub fn at(transform: Transform) -> Self {
        let mut skin = Self::new();
        skin.set_transform(transform, transform);
        skin
    }

    /// Add a primitive using a table material. Returns its index.
    pub fn add_primitive(
        &mut self,
        primitive: Primitive,
        local: Transform,
        material: MaterialId,
    ) -> Result<usize> {
        if material == MaterialId::UserDefined {
            return Err(PhysicsError::ReservedMaterialId);
        }
        Ok(self.push_primitive(primitive, local, PrimitiveMaterial::Table(material)))
    }

    /// Add a primitive carrying explicit material properties. Returns its index.
    pub fn add_primitive_with_properties(
        &mut self,
        primitive: Primitive,
        local: Transform,
        props: MaterialProperties,
    ) -> usize {
        self.push_primitive(primitive, local, PrimitiveMaterial::UserDefined(props))
    }

    fn push_primitive(&mut self, primitive: Primitive, local: Transform, material: PrimitiveMaterial) -> usize {
        let mut p = SkinPrimitive::new(primitive, local, material);
        p.place(&self.old_transform, &self.new_transform);
        self.primitives.push(p);
        self.update_world_aabb();
        self.primitives.len() - 1
    }

    pub fn remove_all_primitives(&mut self) {
        self.primitives.clear();
        self.update_world_aabb();
    }

    #[inline]
    pub fn num_primitives(&self) -> usize {
        self.primitives.len()
    }

    #[inline]
    pub fn primitive(&self, i: usize) -> Option<&SkinPrimitive> {
        self.primitives.get(i)
    }

    #[inline]
    pub fn primitives(&self) -> &[SkinPrimitive] {
        &self.primitives
    }

    #[inline]
    pub fn owner(&self) -> Option<BodyHandle> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<BodyHandle>) {
        self.owner = owner;
    }

    #[inline]
    pub fn old_transform(&self) -> &Transform {
        &self.old_transform
    }

    #[inline]
    pub fn new_transform(&self) -> &Transform {
        &self.new_transform
    }

    #[inline]
    pub fn world_aabb(&self) -> &Aabb {
        &self.world_aabb
    }

    /// The collisions this skin took part in during the current step.
    #[inline]
    pub fn collisions(&self) -> &[CollisionId] {
        &self.collisions
    }

    /// Include old-pose bounds in the world bounding box.
    pub fn set_sweep_bounds(&mut self, enabled: bool) {
        if self.sweep_bounds != enabled {
            self.sweep_bounds = enabled;
            self.update_world_aabb();
        }
    }

    pub fn set_transform(&mut self, old: Transform, new: Transform) {
        self.old_transform = old;
        self.new_transform = new;
        for p in &mut self.primitives {
            p.place(&old, &new);
        }
        self.update_world_aabb();
    }

    pub fn set_new_transform(&mut self, new: Transform) {
        let old = self.old_transform;
        self.set_transform(old, new);
    }

    pub fn set_old_transform(&mut self, old: Transform) {
        let new = self.new_transform;
        self.set_transform(old, new);
    }

    /// Pre-multiply every primitive's local placement by `t`.
    pub fn apply_local_transform(&mut self, t: &Transform) {
        for p in &mut self.primitives {
            p.local = t.compose(&p.local);
        }
        let (old, new) = (self.old_transform, self.new_transform);
        self.set_transform(old, new);
    }

    fn update_world_aabb(&mut self) {
        let mut iter = self.primitives.iter();
        let Some(first) = iter.next() else {
            self.world_aabb = aabb_point(&self.new_transform.position);
            return;
        };
        let mut bb = first.new_aabb;
        if self.sweep_bounds {
            bb = aabb_union(&bb, &first.old_aabb);
        }
        for p in iter {
            bb = aabb_union(&bb, &p.new_aabb);
            if self.sweep_bounds {
                bb = aabb_union(&bb, &p.old_aabb);
            }
        }
        self.world_aabb = bb;
    }

    pub fn add_non_collidable(&mut self, other: SkinHandle) {
        if !self.non_collidables.contains(&other) {
            self.non_collidables.push(other);
        }
    }

    pub fn remove_non_collidable(&mut self, other: SkinHandle) {
        self.non_collidables.retain(|s| *s != other);
    }

    #[inline]
    pub fn is_non_collidable(&self, other: SkinHandle) -> bool {
        self.non_collidables.contains(&other)
    }

    #[inline]
    pub fn non_collidables(&self) -> &[SkinHandle] {
        &self.non_collidables
    }

    pub fn set_contact_callback(&mut self, callback: impl Fn(SkinHandle, SkinHandle) -> bool + 'static) {
        self.contact_callback = Some(Box::new(callback));
    }

    pub fn clear_contact_callback(&mut self) {
        self.contact_callback = None;
    }

    /// Ask the veto callback (if any) whether a contact with `other` may be kept.
    pub(crate) fn accepts_contact(&self, this: SkinHandle, other: SkinHandle) -> bool {
        self.contact_callback
            .as_ref()
            .is_none_or(|callback| callback(this, other))
    }

    /// Nearest hit of `seg` against the new-pose primitives: `(primitive index, hit)`.
    pub fn segment_intersect(&self, seg: &Segment) -> Option<(usize, PrimitiveHit)> {
        self.primitives
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                p.primitive
                    .segment_intersect(&p.new_world, seg)
                    .map(|hit| (i, hit))
            })
            .min_by(|a, b| a.1.fraction.total_cmp(&b.1.fraction))
    }

    /// Combined mass properties in the skin's frame for a uniform `density`.
    pub fn mass_properties(&self, density: f32) -> MassProperties {
        let parts: Vec<(MassProperties, &Transform)> = self
            .primitives
            .iter()
            .map(|p| (p.primitive.mass_properties(density), &p.local))
            .collect();
        let mass: f32 = parts.iter().map(|(mp, _)| mp.mass).sum();
        if mass <= 0.0 {
            return MassProperties::zero();
        }
        let com = parts
            .iter()
            .fold(Vec3::zeros(), |acc, (mp, local)| acc + local.position * mp.mass)
            / mass;
        let inertia = parts.iter().fold(Mat3::zeros(), |acc, (mp, local)| {
            acc + transfer_inertia(&mp.inertia, local, mp.mass, &com)
        });
        MassProperties {
            mass,
            center_of_mass: com,
            inertia,
        }
    }

    /// Mass properties scaled so the total mass equals `mass`.
    pub fn mass_properties_for_mass(&self, mass: f32) -> MassProperties {
        let unit = self.mass_properties(1.0);
        if unit.mass <= 0.0 {
            return MassProperties::zero();
        }
        let scale = mass / unit.mass;
        MassProperties {
            mass,
            center_of_mass: unit.center_of_mass,
            inertia: unit.inertia * scale,
        }
    }
}
