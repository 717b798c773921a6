//! Surface materials and the symmetric pair table used to derive the
//! restitution and friction of a contact.

use std::collections::HashMap;

/// Built-in material identifiers.
///
/// `UserDefined` is reserved: it marks primitives that carry their own
/// `MaterialProperties` and cannot be used to look anything up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialId {
    #[default]
    Unset,
    Ice,
    Normal,
    NotBouncy,
    Rough,
    UserDefined,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialProperties {
    pub elasticity: f32,
    pub static_roughness: f32,
    pub dynamic_roughness: f32,
}

impl MaterialProperties {
    pub const fn new(elasticity: f32, static_roughness: f32, dynamic_roughness: f32) -> Self {
        Self {
            elasticity,
            static_roughness,
            dynamic_roughness,
        }
    }

    /// Pairwise product; the combination rule for materials without a table entry.
    pub fn combine(&self, other: &MaterialProperties) -> MaterialPairProperties {
        MaterialPairProperties {
            restitution: self.elasticity * other.elasticity,
            static_friction: self.static_roughness * other.static_roughness,
            dynamic_friction: self.dynamic_roughness * other.dynamic_roughness,
        }
    }
}

/// Properties of a contact between two materials.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MaterialPairProperties {
    pub restitution: f32,
    pub static_friction: f32,
    pub dynamic_friction: f32,
}

/// Material of one primitive: a table entry or explicit properties.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PrimitiveMaterial {
    Table(MaterialId),
    UserDefined(MaterialProperties),
}

impl PrimitiveMaterial {
    pub fn id(&self) -> MaterialId {
        match self {
            PrimitiveMaterial::Table(id) => *id,
            PrimitiveMaterial::UserDefined(_) => MaterialId::UserDefined,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MaterialTable {
    materials: HashMap<MaterialId, MaterialProperties>,
    pairs: HashMap<(MaterialId, MaterialId), MaterialPairProperties>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        let mut table = Self {
            materials: HashMap::new(),
            pairs: HashMap::new(),
        };
        table.reset();
        table
    }
}

#[inline]
fn ordered(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl MaterialTable {
    /// Restore the built-in materials and drop every pair override.
    pub fn reset(&mut self) {
        self.materials.clear();
        self.pairs.clear();
        self.materials
            .insert(MaterialId::Unset, MaterialProperties::new(0.8, 0.8, 0.7));
        self.materials
            .insert(MaterialId::Ice, MaterialProperties::new(0.4, 0.05, 0.05));
        self.materials
            .insert(MaterialId::Normal, MaterialProperties::new(0.6, 0.6, 0.5));
        self.materials
            .insert(MaterialId::NotBouncy, MaterialProperties::new(0.0, 0.6, 0.5));
        self.materials
            .insert(MaterialId::Rough, MaterialProperties::new(0.3, 1.0, 0.9));
    }

    /// Properties of a table material, or `None` for `UserDefined`.
    pub fn properties(&self, id: MaterialId) -> Option<MaterialProperties> {
        self.materials.get(&id).copied()
    }

    /// Replace the properties of a built-in material. `UserDefined` is ignored.
    pub fn set_properties(&mut self, id: MaterialId, props: MaterialProperties) {
        if id == MaterialId::UserDefined {
            log::warn!("ignoring attempt to register properties for the reserved UserDefined material");
            return;
        }
        self.materials.insert(id, props);
    }

    /// Override the contact properties of a material pair (order independent).
    pub fn set_pair_properties(&mut self, a: MaterialId, b: MaterialId, props: MaterialPairProperties) {
        self.pairs.insert(ordered(a, b), props);
    }

    /// Contact properties for two table materials.
    pub fn pair_properties(&self, a: MaterialId, b: MaterialId) -> MaterialPairProperties {
        if let Some(p) = self.pairs.get(&ordered(a, b)) {
            return *p;
        }
        let pa = self.properties(a).unwrap_or(MaterialProperties::new(0.0, 0.0, 0.0));
        let pb = self.properties(b).unwrap_or(MaterialProperties::new(0.0, 0.0, 0.0));
        pa.combine(&pb)
    }

    /// Resolve the contact properties of two primitive materials.
    ///
    /// When either side carries explicit properties, both sides are resolved to
    /// properties and multiplied; otherwise the pair table is consulted.
    pub fn resolve(&self, a: &PrimitiveMaterial, b: &PrimitiveMaterial) -> MaterialPairProperties {
        match (a, b) {
            (PrimitiveMaterial::Table(ia), PrimitiveMaterial::Table(ib)) => {
                self.pair_properties(*ia, *ib)
            }
            _ => self.props_of(a).combine(&self.props_of(b)),
        }
    }

    fn props_of(&self, m: &PrimitiveMaterial) -> MaterialProperties {
        match m {
            PrimitiveMaterial::UserDefined(p) => *p,
            PrimitiveMaterial::Table(id) => self
                .properties(*id)
                .unwrap_or(MaterialProperties::new(0.0, 0.0, 0.0)),
        }
    }
}
