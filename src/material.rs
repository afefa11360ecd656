//! Surface materials and the contact material table.
//!
//! A [`Material`] is registered with the world and referenced by
//! [`MaterialId`] from shapes and bodies. A [`ContactMaterial`] holds the
//! solver parameters for one pair of materials. When a contact is created the
//! parameters are resolved in this order:
//!
//! 1. the contact material registered for the two shape materials,
//! 2. the contact material registered for the two body materials,
//! 3. the world default.
//!
//! If both sides carry a material with an explicit friction (or restitution),
//! their product overrides the resolved value.

use std::collections::HashMap;

/// Handle of a material registered in a [`MaterialTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialId(usize);

impl MaterialId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub name: String,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = Some(restitution);
        self
    }
}

/// Solver parameters for contacts between two materials.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContactMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub contact_equation_stiffness: f32,
    pub contact_equation_relaxation: f32,
    pub friction_equation_stiffness: f32,
    pub friction_equation_relaxation: f32,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            friction: 0.3,
            restitution: 0.0,
            contact_equation_stiffness: 1e7,
            contact_equation_relaxation: 3.0,
            friction_equation_stiffness: 1e7,
            friction_equation_relaxation: 3.0,
        }
    }
}

impl ContactMaterial {
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_contact_equation(mut self, stiffness: f32, relaxation: f32) -> Self {
        self.contact_equation_stiffness = stiffness;
        self.contact_equation_relaxation = relaxation;
        self
    }

    pub fn with_friction_equation(mut self, stiffness: f32, relaxation: f32) -> Self {
        self.friction_equation_stiffness = stiffness;
        self.friction_equation_relaxation = relaxation;
        self
    }
}

/// Materials on one side of a contact: the shape's own, then the body's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialPair {
    pub shape: Option<MaterialId>,
    pub body: Option<MaterialId>,
}

impl MaterialPair {
    fn effective(&self) -> Option<MaterialId> {
        self.shape.or(self.body)
    }
}

/// Registered materials plus the symmetric contact material lookup.
#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    materials: Vec<Material>,
    contact_materials: HashMap<(MaterialId, MaterialId), ContactMaterial>,
    pub default_contact_material: ContactMaterial,
}

impl MaterialTable {
    pub fn new(default_contact_material: ContactMaterial) -> Self {
        Self {
            materials: Vec::new(),
            contact_materials: HashMap::new(),
            default_contact_material,
        }
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Register (or replace) the contact material for a pair, in either order.
    pub fn add_contact_material(&mut self, a: MaterialId, b: MaterialId, contact: ContactMaterial) {
        self.contact_materials.insert(Self::key(a, b), contact);
    }

    pub fn contact_material(&self, a: MaterialId, b: MaterialId) -> Option<&ContactMaterial> {
        self.contact_materials.get(&Self::key(a, b))
    }

    fn key(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn pair_lookup(&self, a: Option<MaterialId>, b: Option<MaterialId>) -> Option<&ContactMaterial> {
        match (a, b) {
            (Some(a), Some(b)) => self.contact_material(a, b),
            _ => None,
        }
    }

    /// Resolve the contact parameters for one shape pair.
    pub fn resolve(&self, a: &MaterialPair, b: &MaterialPair) -> ContactMaterial {
        let mut resolved = *self
            .pair_lookup(a.shape, b.shape)
            .or_else(|| self.pair_lookup(a.body, b.body))
            .unwrap_or(&self.default_contact_material);

        let mat_a = a.effective().and_then(|id| self.material(id));
        let mat_b = b.effective().and_then(|id| self.material(id));
        if let (Some(ma), Some(mb)) = (mat_a, mat_b) {
            if let (Some(fa), Some(fb)) = (ma.friction, mb.friction) {
                resolved.friction = fa * fb;
            }
            if let (Some(ra), Some(rb)) = (ma.restitution, mb.restitution) {
                resolved.restitution = ra * rb;
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_default_contact_material_values() {
        let cm = ContactMaterial::default();
        assert!(approx_eq(cm.friction, 0.3));
        assert!(approx_eq(cm.restitution, 0.0));
        assert!(approx_eq(cm.contact_equation_relaxation, 3.0));
    }

    #[test]
    fn test_lookup_is_symmetric() {
        let mut table = MaterialTable::default();
        let ice = table.add_material(Material::new("ice"));
        let felt = table.add_material(Material::new("felt"));
        table.add_contact_material(felt, ice, ContactMaterial::default().with_friction(0.01));
        assert!(approx_eq(table.contact_material(ice, felt).unwrap().friction, 0.01));
        assert!(approx_eq(table.contact_material(felt, ice).unwrap().friction, 0.01));
        assert!(table.contact_material(ice, ice).is_none());
    }

    // -- Resolution order --

    #[test]
    fn test_shape_pair_wins_over_body_pair() {
        let mut table = MaterialTable::default();
        let a = table.add_material(Material::new("a"));
        let b = table.add_material(Material::new("b"));
        let c = table.add_material(Material::new("c"));
        table.add_contact_material(a, b, ContactMaterial::default().with_restitution(0.9));
        table.add_contact_material(c, c, ContactMaterial::default().with_restitution(0.1));

        let side_a = MaterialPair { shape: Some(a), body: Some(c) };
        let side_b = MaterialPair { shape: Some(b), body: Some(c) };
        assert!(approx_eq(table.resolve(&side_a, &side_b).restitution, 0.9));

        let body_only_a = MaterialPair { shape: None, body: Some(c) };
        let body_only_b = MaterialPair { shape: None, body: Some(c) };
        assert!(approx_eq(table.resolve(&body_only_a, &body_only_b).restitution, 0.1));
    }

    #[test]
    fn test_falls_back_to_default() {
        let table = MaterialTable::new(ContactMaterial::default().with_friction(0.7));
        let resolved = table.resolve(&MaterialPair::default(), &MaterialPair::default());
        assert!(approx_eq(resolved.friction, 0.7));
    }

    #[test]
    fn test_explicit_material_values_multiply() {
        let mut table = MaterialTable::default();
        let rubber = table.add_material(Material::new("rubber").with_friction(0.8).with_restitution(0.5));
        let wood = table.add_material(Material::new("wood").with_friction(0.5));
        let a = MaterialPair { shape: None, body: Some(rubber) };
        let b = MaterialPair { shape: Some(wood), body: None };
        let resolved = table.resolve(&a, &b);
        assert!(approx_eq(resolved.friction, 0.4));
        // Only one side sets restitution: default stays
        assert!(approx_eq(resolved.restitution, 0.0));
    }
}
