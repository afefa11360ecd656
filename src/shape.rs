//! Collision shapes.
//!
//! A [`Shape`] pairs an immutable [`Geometry`] with the per-shape collision
//! settings (filter group/mask, response flag, material). Bodies own their
//! shapes by value; cloning a shape is how geometry is shared between bodies.
//!
//! Conventions:
//! - Planes are infinite, pass through their local origin and face local +Z.
//! - Cylinders are aligned with local Y.
//! - Heightfields lie on the local XY plane with heights along +Z.
//!
//! # Example
//! ```
//! use rigid3d::shape::Shape;
//! use nalgebra::Vector3;
//!
//! let die = Shape::cuboid(Vector3::repeat(0.5)).with_collision_filter(2, u32::MAX);
//! assert!((die.volume() - 1.0).abs() < 1e-6);
//! assert!((die.bounding_sphere_radius() - 0.75_f32.sqrt()).abs() < 1e-6);
//! ```

pub mod convex;
pub mod heightfield;
pub mod trimesh;

use nalgebra::{Matrix3, Vector3};

use crate::aabb::Aabb;
use crate::error::ShapeError;
use crate::material::MaterialId;
use crate::math::Transform;

pub use convex::ConvexPolyhedron;
pub use heightfield::Heightfield;
pub use trimesh::Trimesh;

/// Fieldless tag naming a [`Geometry`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShapeKind {
    Sphere,
    Plane,
    Box,
    ConvexPolyhedron,
    Cylinder,
    Heightfield,
    Trimesh,
    Particle,
}

/// Box geometry: half-extents plus the equivalent convex hull used by the
/// convex collision routines.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxShape {
    pub half_extents: Vector3<f32>,
    hull: ConvexPolyhedron,
}

impl BoxShape {
    pub fn new(half_extents: Vector3<f32>) -> Self {
        let half_extents = half_extents.abs();
        Self {
            half_extents,
            hull: ConvexPolyhedron::cuboid(&half_extents),
        }
    }

    pub fn hull(&self) -> &ConvexPolyhedron {
        &self.hull
    }
}

/// Truncated cone along local Y, approximated by a prism with `segments`
/// side faces.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cylinder {
    pub radius_top: f32,
    pub radius_bottom: f32,
    pub height: f32,
    pub segments: usize,
    hull: ConvexPolyhedron,
}

impl Cylinder {
    pub fn new(
        radius_top: f32,
        radius_bottom: f32,
        height: f32,
        segments: usize,
    ) -> Result<Self, ShapeError> {
        if !(radius_top >= 0.0 && radius_top.is_finite()) {
            return Err(ShapeError::NonPositive { name: "cylinder top radius", value: radius_top });
        }
        if !(radius_bottom >= 0.0 && radius_bottom.is_finite()) {
            return Err(ShapeError::NonPositive {
                name: "cylinder bottom radius",
                value: radius_bottom,
            });
        }
        if !(height > 0.0 && height.is_finite()) {
            return Err(ShapeError::NonPositive { name: "cylinder height", value: height });
        }
        if segments < 3 {
            return Err(ShapeError::TooFewSegments(segments));
        }

        let n = segments;
        let half = height * 0.5;
        let step = core::f32::consts::TAU / n as f32;
        let mut vertices = Vec::with_capacity(2 * n);
        let mut faces = Vec::with_capacity(n + 2);
        let mut axes = Vec::with_capacity(n / 2 + 2);
        let mut bottom = Vec::with_capacity(n);
        let mut top = Vec::with_capacity(n);

        for i in 0..n {
            let theta = step * i as f32;
            let (s, c) = theta.sin_cos();
            vertices.push(Vector3::new(-radius_bottom * s, -half, radius_bottom * c));
            vertices.push(Vector3::new(-radius_top * s, half, radius_top * c));
            bottom.push(2 * i);
            top.push(2 * i + 1);

            let j = (i + 1) % n;
            faces.push(vec![2 * i, 2 * i + 1, 2 * j + 1, 2 * j]);

            // Opposite side faces share an axis when n is even
            if n % 2 == 1 || i < n / 2 {
                let mid = step * (i as f32 + 0.5);
                axes.push(Vector3::new(-mid.sin(), 0.0, mid.cos()));
            }
        }
        top.reverse();
        faces.push(bottom);
        faces.push(top);
        axes.push(Vector3::y());

        let hull = ConvexPolyhedron::new(vertices, faces)?.with_unique_axes(axes);
        Ok(Self {
            radius_top,
            radius_bottom,
            height,
            segments,
            hull,
        })
    }

    pub fn hull(&self) -> &ConvexPolyhedron {
        &self.hull
    }
}

/// Geometry of a shape.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Geometry {
    Sphere { radius: f32 },
    /// Infinite half-space below the local XY plane, normal +Z.
    Plane,
    Box(BoxShape),
    ConvexPolyhedron(ConvexPolyhedron),
    Cylinder(Cylinder),
    Heightfield(Heightfield),
    Trimesh(Trimesh),
    /// A point. Collides with planes, spheres and convex shapes only.
    Particle,
}

/// A collision shape attached to a body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    pub geometry: Geometry,
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    /// When `false` contacts are reported but never solved.
    pub collision_response: bool,
    pub material: Option<MaterialId>,
}

impl Shape {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            collision_filter_group: 1,
            collision_filter_mask: u32::MAX,
            collision_response: true,
            material: None,
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Self::new(Geometry::Sphere { radius: radius.abs() })
    }

    pub fn cuboid(half_extents: Vector3<f32>) -> Self {
        Self::new(Geometry::Box(BoxShape::new(half_extents)))
    }

    pub fn plane() -> Self {
        Self::new(Geometry::Plane)
    }

    pub fn particle() -> Self {
        Self::new(Geometry::Particle)
    }

    pub fn cylinder(
        radius_top: f32,
        radius_bottom: f32,
        height: f32,
        segments: usize,
    ) -> Result<Self, ShapeError> {
        Ok(Self::new(Geometry::Cylinder(Cylinder::new(
            radius_top,
            radius_bottom,
            height,
            segments,
        )?)))
    }

    pub fn convex(hull: ConvexPolyhedron) -> Self {
        Self::new(Geometry::ConvexPolyhedron(hull))
    }

    pub fn heightfield(field: Heightfield) -> Self {
        Self::new(Geometry::Heightfield(field))
    }

    pub fn trimesh(mesh: Trimesh) -> Self {
        Self::new(Geometry::Trimesh(mesh))
    }

    // -- Builders --

    pub fn with_collision_filter(mut self, group: u32, mask: u32) -> Self {
        self.collision_filter_group = group;
        self.collision_filter_mask = mask;
        self
    }

    pub fn with_collision_response(mut self, response: bool) -> Self {
        self.collision_response = response;
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    // -- Queries --

    pub fn kind(&self) -> ShapeKind {
        match &self.geometry {
            Geometry::Sphere { .. } => ShapeKind::Sphere,
            Geometry::Plane => ShapeKind::Plane,
            Geometry::Box(_) => ShapeKind::Box,
            Geometry::ConvexPolyhedron(_) => ShapeKind::ConvexPolyhedron,
            Geometry::Cylinder(_) => ShapeKind::Cylinder,
            Geometry::Heightfield(_) => ShapeKind::Heightfield,
            Geometry::Trimesh(_) => ShapeKind::Trimesh,
            Geometry::Particle => ShapeKind::Particle,
        }
    }

    /// The convex hull backing boxes, cylinders and convex polyhedra.
    pub fn hull(&self) -> Option<&ConvexPolyhedron> {
        match &self.geometry {
            Geometry::Box(b) => Some(b.hull()),
            Geometry::Cylinder(c) => Some(c.hull()),
            Geometry::ConvexPolyhedron(c) => Some(c),
            _ => None,
        }
    }

    /// Radius of the smallest origin-centered sphere enclosing the shape.
    /// Unbounded for planes.
    pub fn bounding_sphere_radius(&self) -> f32 {
        match &self.geometry {
            Geometry::Sphere { radius } => *radius,
            Geometry::Plane => f32::MAX,
            Geometry::Box(b) => b.half_extents.norm(),
            Geometry::ConvexPolyhedron(c) => c.bounding_sphere_radius(),
            Geometry::Cylinder(c) => c.hull().bounding_sphere_radius(),
            Geometry::Heightfield(h) => h.bounding_sphere_radius(),
            Geometry::Trimesh(t) => t.bounding_sphere_radius(),
            Geometry::Particle => 0.0,
        }
    }

    pub fn volume(&self) -> f32 {
        match &self.geometry {
            Geometry::Sphere { radius } => 4.0 / 3.0 * core::f32::consts::PI * radius.powi(3),
            Geometry::Plane => f32::MAX,
            Geometry::Box(b) => 8.0 * b.half_extents.x * b.half_extents.y * b.half_extents.z,
            Geometry::ConvexPolyhedron(c) => c.volume(),
            Geometry::Cylinder(c) => c.hull().volume(),
            Geometry::Heightfield(h) => h.volume(),
            Geometry::Trimesh(t) => t.volume(),
            Geometry::Particle => 0.0,
        }
    }

    /// Inertia tensor about the shape's local origin for the given mass.
    pub fn local_inertia(&self, mass: f32) -> Matrix3<f32> {
        match &self.geometry {
            Geometry::Sphere { radius } => Matrix3::from_diagonal_element(0.4 * mass * radius * radius),
            Geometry::Plane | Geometry::Particle => Matrix3::zeros(),
            Geometry::Box(b) => convex::box_inertia(&b.half_extents, mass),
            Geometry::ConvexPolyhedron(c) => c.local_inertia(mass),
            Geometry::Cylinder(c) => {
                let r = 0.5 * (c.radius_top + c.radius_bottom);
                let axial = 0.5 * mass * r * r;
                let transverse = mass * (3.0 * r * r + c.height * c.height) / 12.0;
                Matrix3::from_diagonal(&Vector3::new(transverse, axial, transverse))
            }
            Geometry::Heightfield(h) => h.local_inertia(mass),
            Geometry::Trimesh(t) => t.local_inertia(mass),
        }
    }

    /// World-space bounds of the shape placed at `frame`.
    pub fn world_aabb(&self, frame: &Transform) -> Aabb {
        match &self.geometry {
            Geometry::Sphere { radius } => Aabb::from_center(frame.position, Vector3::repeat(*radius)),
            Geometry::Particle => Aabb::new(frame.position, frame.position),
            Geometry::Plane => {
                let n = frame.vector_to_world(&Vector3::z());
                let mut aabb = Aabb::new(Vector3::repeat(-f32::MAX), Vector3::repeat(f32::MAX));
                // Axis-aligned planes bound the half-space on their own axis
                for axis in 0..3 {
                    if (n[axis].abs() - 1.0).abs() < 1e-6 {
                        if n[axis] > 0.0 {
                            aabb.upper[axis] = frame.position[axis];
                        } else {
                            aabb.lower[axis] = frame.position[axis];
                        }
                    }
                }
                aabb
            }
            Geometry::Box(b) => Aabb::from_center(Vector3::zeros(), b.half_extents).to_world_frame(frame),
            Geometry::ConvexPolyhedron(c) => c.world_aabb(frame),
            Geometry::Cylinder(c) => c.hull().world_aabb(frame),
            Geometry::Heightfield(h) => h.local_aabb().to_world_frame(frame),
            Geometry::Trimesh(t) => t.local_aabb().to_world_frame(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_vec_eq(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
    }

    // -- Defaults --

    #[test]
    fn test_default_filter_accepts_everything() {
        let s = Shape::sphere(1.0);
        assert_eq!(s.collision_filter_group, 1);
        assert_eq!(s.collision_filter_mask, u32::MAX);
        assert!(s.collision_response);
        assert_eq!(s.kind(), ShapeKind::Sphere);
    }

    // -- Mass properties --

    #[test]
    fn test_sphere_properties() {
        let s = Shape::sphere(2.0);
        assert!(approx_eq(s.volume(), 32.0 / 3.0 * core::f32::consts::PI));
        assert!(approx_vec_eq(&s.local_inertia(5.0).diagonal(), &Vector3::repeat(8.0)));
        assert!(approx_eq(s.bounding_sphere_radius(), 2.0));
    }

    #[test]
    fn test_box_matches_hull_volume() {
        let s = Shape::cuboid(Vector3::new(0.5, 1.0, 2.0));
        assert!(approx_eq(s.volume(), 8.0));
        assert!(approx_eq(s.hull().unwrap().volume(), 8.0));
    }

    #[test]
    fn test_cylinder_hull() {
        let s = Shape::cylinder(1.0, 1.0, 2.0, 16).unwrap();
        let hull = s.hull().unwrap();
        assert_eq!(hull.vertices().len(), 32);
        assert_eq!(hull.faces().len(), 18);
        // Prism volume approaches π r² h from below
        let v = s.volume();
        assert!(v < core::f32::consts::PI * 2.0);
        assert!(v > 0.9 * core::f32::consts::PI * 2.0);
        // Caps face ±Y
        let normals = hull.face_normals();
        assert!(approx_vec_eq(&normals[16], &-Vector3::y()));
        assert!(approx_vec_eq(&normals[17], &Vector3::y()));
    }

    #[test]
    fn test_cylinder_rejects_bad_dimensions() {
        assert!(Shape::cylinder(-1.0, 1.0, 1.0, 8).is_err());
        assert!(Shape::cylinder(1.0, 1.0, 0.0, 8).is_err());
        assert!(Shape::cylinder(1.0, 1.0, 1.0, 2).is_err());
    }

    // -- Bounds --

    #[test]
    fn test_rotated_box_aabb() {
        let s = Shape::cuboid(Vector3::new(1.0, 0.5, 0.5));
        let frame = Transform::new(
            Vector3::new(0.0, 3.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_2),
        );
        let aabb = s.world_aabb(&frame);
        assert!(approx_vec_eq(&aabb.lower, &Vector3::new(-0.5, 2.0, -0.5)));
        assert!(approx_vec_eq(&aabb.upper, &Vector3::new(0.5, 4.0, 0.5)));
    }

    #[test]
    fn test_axis_aligned_plane_aabb_is_half_space() {
        let s = Shape::plane();
        let frame = Transform::new(
            Vector3::new(0.0, 1.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -core::f32::consts::FRAC_PI_2),
        );
        let aabb = s.world_aabb(&frame);
        assert!(approx_eq(aabb.upper.y, 1.0));
        assert_eq!(aabb.lower.y, -f32::MAX);
        assert_eq!(aabb.upper.x, f32::MAX);
    }
}
