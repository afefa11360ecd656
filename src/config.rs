//! World configuration.

use nalgebra::Vector3;

use crate::broadphase::BroadphaseKind;
use crate::material::ContactMaterial;

/// Settings a [`World`](crate::world::World) is created with.
///
/// # Example
/// ```
/// use rigid3d::config::WorldConfig;
/// use nalgebra::Vector3;
///
/// let config = WorldConfig::default()
///     .with_gravity(Vector3::new(0.0, -9.82, 0.0))
///     .with_allow_sleep(true)
///     .with_solver(20, 1e-7);
/// assert_eq!(config.solver_iterations, 20);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldConfig {
    pub gravity: Vector3<f32>,
    /// Let bodies fall asleep when they come to rest.
    pub allow_sleep: bool,
    pub solver_iterations: usize,
    pub solver_tolerance: f32,
    pub broadphase: BroadphaseKind,
    /// Test body AABBs instead of bounding spheres in the broadphase.
    pub use_bounding_boxes: bool,
    /// Renormalize orientations with the first-order approximation.
    pub quat_normalize_fast: bool,
    /// Used when no registered contact material matches a pair.
    pub default_contact_material: ContactMaterial,
    /// Gravity magnitude used to bound friction. Defaults to `|gravity|`.
    pub frictional_gravity: Option<f32>,
    /// Record per-phase step timings.
    pub profiling: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::zeros(),
            allow_sleep: false,
            solver_iterations: 10,
            solver_tolerance: 1e-7,
            broadphase: BroadphaseKind::Naive,
            use_bounding_boxes: false,
            quat_normalize_fast: false,
            default_contact_material: ContactMaterial::default(),
            frictional_gravity: None,
            profiling: false,
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vector3<f32>) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_solver(mut self, iterations: usize, tolerance: f32) -> Self {
        self.solver_iterations = iterations;
        self.solver_tolerance = tolerance;
        self
    }

    pub fn with_broadphase(mut self, broadphase: BroadphaseKind) -> Self {
        self.broadphase = broadphase;
        self
    }

    pub fn with_bounding_boxes(mut self, use_bounding_boxes: bool) -> Self {
        self.use_bounding_boxes = use_bounding_boxes;
        self
    }

    pub fn with_quat_normalize_fast(mut self, fast: bool) -> Self {
        self.quat_normalize_fast = fast;
        self
    }

    pub fn with_default_contact_material(mut self, material: ContactMaterial) -> Self {
        self.default_contact_material = material;
        self
    }

    pub fn with_frictional_gravity(mut self, magnitude: f32) -> Self {
        self.frictional_gravity = Some(magnitude);
        self
    }

    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }

    /// Gravity magnitude that bounds friction forces.
    pub fn effective_frictional_gravity(&self) -> f32 {
        self.frictional_gravity.unwrap_or_else(|| self.gravity.norm())
    }
}
