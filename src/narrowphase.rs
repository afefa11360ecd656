//! Exact pairwise collision.
//!
//! [`collide_shapes`] is the double dispatch over [`Geometry`]: the pair is
//! put in a canonical order (sphere, plane, box, convex, cylinder,
//! heightfield, trimesh, particle), handled by one routine per supported
//! combination, and any contact produced for a swapped pair is flipped back
//! so that normals always point from the first shape to the second.
//!
//! [`Narrowphase::get_contacts`] runs that over the broadphase pairs of a
//! step and turns the contacts into contact and friction equations.

mod hull;
mod primitives;
mod terrain;

use nalgebra::{UnitQuaternion, Vector3};
use slotmap::SlotMap;

use crate::body::Body;
use crate::equation::Equation;
use crate::material::{MaterialPair, MaterialTable};
use crate::math::{tangents, Transform};
use crate::shape::convex::{ClipResult, ConvexPolyhedron};
use crate::shape::{Geometry, Shape, ShapeKind};
use crate::world::BodyHandle;

/// A shape placed in the world.
#[derive(Debug, Clone, Copy)]
pub struct ShapePose<'a> {
    pub shape: &'a Shape,
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl<'a> ShapePose<'a> {
    pub fn new(shape: &'a Shape, position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self {
            shape,
            position,
            orientation,
        }
    }

    pub fn from_transform(shape: &'a Shape, frame: &Transform) -> Self {
        Self::new(shape, frame.position, frame.orientation)
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }
}

/// A single point of contact between two shapes, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// Unit normal pointing from shape A towards shape B.
    pub normal: Vector3<f32>,
    /// Deepest point of A inside B.
    pub point_a: Vector3<f32>,
    /// Deepest point of B inside A.
    pub point_b: Vector3<f32>,
}

impl ContactPoint {
    /// Overlap along the normal; positive when the shapes interpenetrate.
    pub fn penetration(&self) -> f32 {
        (self.point_a - self.point_b).dot(&self.normal)
    }

    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            point_a: self.point_b,
            point_b: self.point_a,
        }
    }
}

/// Scratch state reused across collision tests.
#[derive(Debug, Clone)]
pub struct CollisionWorkspace {
    pub(crate) clip: ClipResult,
    pub(crate) pillar: ConvexPolyhedron,
    pub(crate) triangles: Vec<usize>,
    /// World-space vertices of one face, or closest points already reported.
    pub(crate) points: Vec<Vector3<f32>>,
}

impl Default for CollisionWorkspace {
    fn default() -> Self {
        Self {
            clip: ClipResult::new(),
            pillar: ConvexPolyhedron::scratch(),
            triangles: Vec::new(),
            points: Vec::new(),
        }
    }
}

/// Collects contacts, flipping them when the dispatcher swapped the pair.
pub(crate) struct ContactSink<'a> {
    out: &'a mut Vec<ContactPoint>,
    flip: bool,
}

impl ContactSink<'_> {
    pub(crate) fn push(&mut self, normal: Vector3<f32>, point_a: Vector3<f32>, point_b: Vector3<f32>) {
        let c = ContactPoint {
            normal,
            point_a,
            point_b,
        };
        self.out.push(if self.flip { c.flipped() } else { c });
    }

    pub(crate) fn len(&self) -> usize {
        self.out.len()
    }
}

fn dispatch_rank(kind: ShapeKind) -> u8 {
    match kind {
        ShapeKind::Sphere => 0,
        ShapeKind::Plane => 1,
        ShapeKind::Box => 2,
        ShapeKind::ConvexPolyhedron => 3,
        ShapeKind::Cylinder => 4,
        ShapeKind::Heightfield => 5,
        ShapeKind::Trimesh => 6,
        ShapeKind::Particle => 7,
    }
}

/// Append the contacts between two placed shapes to `out`. Unsupported
/// combinations produce nothing. Returns the number of contacts added.
pub fn collide_shapes(
    a: &ShapePose<'_>,
    b: &ShapePose<'_>,
    workspace: &mut CollisionWorkspace,
    out: &mut Vec<ContactPoint>,
) -> usize {
    let before = out.len();
    let flip = dispatch_rank(a.shape.kind()) > dispatch_rank(b.shape.kind());
    let (a, b) = if flip { (b, a) } else { (a, b) };
    let mut sink = ContactSink { out, flip };

    match (&a.shape.geometry, &b.shape.geometry) {
        (Geometry::Sphere { radius: ra }, Geometry::Sphere { radius: rb }) => {
            primitives::sphere_sphere(a.position, *ra, b.position, *rb, &mut sink)
        }
        (Geometry::Sphere { radius }, Geometry::Plane) => {
            primitives::sphere_plane(a.position, *radius, &b.transform(), &mut sink)
        }
        (Geometry::Sphere { radius }, Geometry::Particle) => {
            primitives::sphere_particle(a.position, *radius, b.position, &mut sink)
        }
        (Geometry::Sphere { radius }, Geometry::Heightfield(field)) => {
            terrain::sphere_heightfield(a.position, *radius, field, &b.transform(), workspace, &mut sink)
        }
        (Geometry::Sphere { radius }, Geometry::Trimesh(mesh)) => {
            terrain::sphere_trimesh(a.position, *radius, mesh, &b.transform(), workspace, &mut sink)
        }
        (Geometry::Sphere { radius }, _) => {
            if let Some(h) = b.shape.hull() {
                hull::sphere_convex(a.position, *radius, h, &b.transform(), &mut workspace.points, &mut sink);
            }
        }
        (Geometry::Plane, Geometry::Particle) => primitives::plane_particle(&a.transform(), b.position, &mut sink),
        (Geometry::Plane, Geometry::Trimesh(mesh)) => {
            terrain::plane_trimesh(&a.transform(), mesh, &b.transform(), &mut sink)
        }
        (Geometry::Plane, _) => {
            if let Some(h) = b.shape.hull() {
                hull::plane_convex(&a.transform(), h, &b.transform(), &mut sink);
            }
        }
        (_, Geometry::Heightfield(field)) => {
            if let Some(h) = a.shape.hull() {
                terrain::convex_heightfield(h, &a.transform(), field, &b.transform(), workspace, &mut sink);
            }
        }
        (_, Geometry::Particle) => {
            if let Some(h) = a.shape.hull() {
                hull::convex_particle(h, &a.transform(), b.position, &mut sink);
            }
        }
        _ => {
            if let (Some(ha), Some(hb)) = (a.shape.hull(), b.shape.hull()) {
                hull::convex_convex(ha, &a.transform(), hb, &b.transform(), &mut workspace.clip, &mut sink);
            }
        }
    }
    sink.len() - before
}

// ----------------------------------------------------------------------------
// Per-step contact generation
// ----------------------------------------------------------------------------

/// One contact between two bodies, as reported to `collide` listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Index of the touching shape within each body.
    pub shape_a: usize,
    pub shape_b: usize,
    pub point: ContactPoint,
    /// Index into [`NarrowphaseResult::contact_equations`], when the contact
    /// is solved.
    pub equation: Option<usize>,
}

/// Everything the narrowphase produces in one step.
#[derive(Debug, Clone, Default)]
pub struct NarrowphaseResult {
    pub contacts: Vec<Contact>,
    pub contact_equations: Vec<Equation>,
    pub friction_equations: Vec<Equation>,
}

impl NarrowphaseResult {
    pub fn clear(&mut self) {
        self.contacts.clear();
        self.contact_equations.clear();
        self.friction_equations.clear();
    }
}

/// Step-level parameters of equation generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactParams {
    pub dt: f32,
    /// Gravity magnitude used to bound friction.
    pub frictional_gravity: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Narrowphase {
    workspace: CollisionWorkspace,
    points: Vec<ContactPoint>,
}

impl Narrowphase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate contacts and equations for every candidate pair.
    ///
    /// Equations refer to bodies by their dense step index. Contacts between
    /// bodies or shapes with `collision_response == false` are reported but
    /// produce no equations.
    pub fn get_contacts(
        &mut self,
        pairs: &[(BodyHandle, BodyHandle)],
        bodies: &SlotMap<BodyHandle, Body>,
        materials: &MaterialTable,
        params: &ContactParams,
        result: &mut NarrowphaseResult,
    ) {
        for &(ha, hb) in pairs {
            let (Some(a), Some(b)) = (bodies.get(ha), bodies.get(hb)) else {
                continue;
            };
            let body_response = a.collision_response && b.collision_response;

            for (i, sa) in a.shapes().iter().enumerate() {
                let frame_a = a.shape_frame(sa);
                for (j, sb) in b.shapes().iter().enumerate() {
                    let (shape_a, shape_b) = (&sa.shape, &sb.shape);
                    if (shape_a.collision_filter_group & shape_b.collision_filter_mask) == 0
                        || (shape_b.collision_filter_group & shape_a.collision_filter_mask) == 0
                    {
                        continue;
                    }
                    let frame_b = b.shape_frame(sb);
                    let reach = shape_a.bounding_sphere_radius() + shape_b.bounding_sphere_radius();
                    if (frame_b.position - frame_a.position).norm_squared() > reach * reach {
                        continue;
                    }

                    self.points.clear();
                    let n = collide_shapes(
                        &ShapePose::from_transform(shape_a, &frame_a),
                        &ShapePose::from_transform(shape_b, &frame_b),
                        &mut self.workspace,
                        &mut self.points,
                    );
                    if n == 0 {
                        continue;
                    }

                    let respond = body_response && shape_a.collision_response && shape_b.collision_response;
                    let material = materials.resolve(
                        &MaterialPair {
                            shape: shape_a.material,
                            body: a.material,
                        },
                        &MaterialPair {
                            shape: shape_b.material,
                            body: b.material,
                        },
                    );

                    for point in &self.points {
                        let mut equation = None;
                        if respond {
                            let ri = point.point_a - a.position;
                            let rj = point.point_b - b.position;
                            let mut eq =
                                Equation::contact(a.index, b.index, point.normal, ri, rj, material.restitution, 1e6);
                            eq.set_spook_params(
                                material.contact_equation_stiffness,
                                material.contact_equation_relaxation,
                                params.dt,
                            );
                            equation = Some(result.contact_equations.len());
                            result.contact_equations.push(eq);

                            let mu_g = material.friction * params.frictional_gravity;
                            if mu_g > 0.0 {
                                let inv_mass_sum = a.inv_mass() + b.inv_mass();
                                let reduced_mass = if inv_mass_sum > 0.0 { 1.0 / inv_mass_sum } else { 0.0 };
                                let slip = mu_g * reduced_mass;
                                let (t1, t2) = tangents(&point.normal);
                                for t in [t1, t2] {
                                    let mut f = Equation::friction(a.index, b.index, t, ri, rj, slip);
                                    f.set_spook_params(
                                        material.friction_equation_stiffness,
                                        material.friction_equation_relaxation,
                                        params.dt,
                                    );
                                    result.friction_equations.push(f);
                                }
                            }
                        }
                        result.contacts.push(Contact {
                            body_a: ha,
                            body_b: hb,
                            shape_a: i,
                            shape_b: j,
                            point: *point,
                            equation,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{ContactMaterial, Material};
    use crate::shape::Heightfield;
    use core::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_vec_eq(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        (a - b).amax() < EPSILON
    }

    fn collide(a: &Shape, pa: Vector3<f32>, b: &Shape, pb: Vector3<f32>) -> Vec<ContactPoint> {
        collide_with(a, pa, UnitQuaternion::identity(), b, pb, UnitQuaternion::identity())
    }

    fn collide_with(
        a: &Shape,
        pa: Vector3<f32>,
        qa: UnitQuaternion<f32>,
        b: &Shape,
        pb: Vector3<f32>,
        qb: UnitQuaternion<f32>,
    ) -> Vec<ContactPoint> {
        let mut ws = CollisionWorkspace::default();
        let mut out = Vec::new();
        collide_shapes(&ShapePose::new(a, pa, qa), &ShapePose::new(b, pb, qb), &mut ws, &mut out);
        out
    }

    fn assert_symmetric(a: &Shape, pa: Vector3<f32>, b: &Shape, pb: Vector3<f32>) {
        let ab = collide(a, pa, b, pb);
        let ba = collide(b, pb, a, pa);
        assert!(!ab.is_empty());
        assert_eq!(ab.len(), ba.len());
        for (x, y) in ab.iter().zip(&ba) {
            assert!(approx_vec_eq(&x.normal, &-y.normal));
            assert!(approx_eq(x.penetration(), y.penetration()));
        }
    }

    // -- Primitives --

    #[test]
    fn test_sphere_sphere() {
        let s = Shape::sphere(1.0);
        let c = collide(&s, Vector3::zeros(), &s, Vector3::new(1.5, 0.0, 0.0));
        assert_eq!(c.len(), 1);
        assert!(approx_vec_eq(&c[0].normal, &Vector3::x()));
        assert!(approx_eq(c[0].penetration(), 0.5));
        assert!(collide(&s, Vector3::zeros(), &s, Vector3::new(2.5, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_sphere_plane() {
        let c = collide(&Shape::sphere(1.0), Vector3::new(0.0, 0.0, 0.8), &Shape::plane(), Vector3::zeros());
        assert_eq!(c.len(), 1);
        assert!(approx_vec_eq(&c[0].normal, &-Vector3::z()));
        assert!(approx_eq(c[0].penetration(), 0.2));
    }

    #[test]
    fn test_plane_plane_is_unsupported() {
        assert!(collide(&Shape::plane(), Vector3::zeros(), &Shape::plane(), Vector3::zeros()).is_empty());
    }

    // -- Hulls --

    #[test]
    fn test_box_resting_on_plane() {
        let c = collide(
            &Shape::plane(),
            Vector3::zeros(),
            &Shape::cuboid(Vector3::repeat(0.5)),
            Vector3::new(0.0, 0.0, 0.45),
        );
        assert_eq!(c.len(), 4);
        for p in &c {
            assert!(approx_vec_eq(&p.normal, &Vector3::z()));
            assert!(approx_eq(p.penetration(), 0.05));
        }
    }

    #[test]
    fn test_box_box_face_contact() {
        let b = Shape::cuboid(Vector3::repeat(0.5));
        let c = collide(&b, Vector3::zeros(), &b, Vector3::new(0.0, 0.9, 0.0));
        assert_eq!(c.len(), 4);
        for p in &c {
            assert!(approx_vec_eq(&p.normal, &Vector3::y()));
            assert!(approx_eq(p.penetration(), 0.1));
        }
        assert!(collide(&b, Vector3::zeros(), &b, Vector3::new(0.0, 1.1, 0.0)).is_empty());
    }

    #[test]
    fn test_sphere_box_face_and_corner() {
        let b = Shape::cuboid(Vector3::repeat(0.5));
        let s = Shape::sphere(0.5);
        let face = collide(&s, Vector3::new(0.0, 0.9, 0.0), &b, Vector3::zeros());
        assert_eq!(face.len(), 1);
        assert!(approx_vec_eq(&face[0].normal, &-Vector3::y()));
        assert!(approx_eq(face[0].penetration(), 0.1));

        let corner = collide(&s, Vector3::repeat(0.7), &b, Vector3::zeros());
        assert_eq!(corner.len(), 1);
        assert!(approx_vec_eq(&corner[0].point_b, &Vector3::repeat(0.5)));
    }

    #[test]
    fn test_cylinder_on_plane() {
        let cyl = Shape::cylinder(0.5, 0.5, 1.0, 8).unwrap();
        // Cylinder axis is local Y: stand it on the +Z plane
        let q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        let c = collide_with(
            &Shape::plane(),
            Vector3::zeros(),
            UnitQuaternion::identity(),
            &cyl,
            Vector3::new(0.0, 0.0, 0.49),
            q,
        );
        assert_eq!(c.len(), 8);
    }

    #[test]
    fn test_convex_particle() {
        let b = Shape::cuboid(Vector3::repeat(0.5));
        let c = collide(&b, Vector3::zeros(), &Shape::particle(), Vector3::new(0.0, 0.0, 0.4));
        assert_eq!(c.len(), 1);
        assert!(approx_vec_eq(&c[0].normal, &Vector3::z()));
        assert!(approx_eq(c[0].penetration(), 0.1));
    }

    // -- Symmetry --

    #[test]
    fn test_swapped_pairs_flip_normals() {
        let b = Shape::cuboid(Vector3::repeat(0.5));
        assert_symmetric(&Shape::sphere(0.5), Vector3::new(0.0, 0.9, 0.0), &b, Vector3::zeros());
        assert_symmetric(&b, Vector3::new(0.0, 0.0, 0.45), &Shape::plane(), Vector3::zeros());
        assert_symmetric(&Shape::particle(), Vector3::new(0.0, 0.0, -0.1), &Shape::plane(), Vector3::zeros());
        assert_symmetric(&b, Vector3::new(0.2, 0.9, 0.1), &b, Vector3::zeros());
    }

    // -- Terrain --

    #[test]
    fn test_sphere_on_flat_heightfield() {
        let field = Shape::heightfield(Heightfield::new(vec![vec![0.0; 4]; 4], 1.0).unwrap());
        // Well inside the lower triangle of cell (1, 1)
        let c = collide(&Shape::sphere(0.5), Vector3::new(1.25, 1.3, 0.45), &field, Vector3::zeros());
        assert_eq!(c.len(), 1);
        assert!(approx_vec_eq(&c[0].normal, &-Vector3::z()));
        assert!(approx_eq(c[0].penetration(), 0.05));
    }

    #[test]
    fn test_box_on_flat_heightfield() {
        let field = Shape::heightfield(Heightfield::new(vec![vec![0.0; 5]; 5], 1.0).unwrap());
        let c = collide(
            &Shape::cuboid(Vector3::repeat(0.4)),
            Vector3::new(2.0, 2.0, 0.35),
            &field,
            Vector3::zeros(),
        );
        assert!(!c.is_empty());
        for p in &c {
            assert!(p.normal.z < -0.9);
        }
    }

    #[test]
    fn test_sphere_on_trimesh() {
        let mesh = crate::shape::Trimesh::new(
            vec![
                Vector3::new(-5.0, -5.0, 0.0),
                Vector3::new(5.0, -5.0, 0.0),
                Vector3::new(5.0, 5.0, 0.0),
                Vector3::new(-5.0, 5.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
        .unwrap();
        let c = collide(&Shape::sphere(1.0), Vector3::new(2.0, -2.0, 0.9), &Shape::trimesh(mesh), Vector3::zeros());
        assert_eq!(c.len(), 1);
        assert!(approx_vec_eq(&c[0].normal, &-Vector3::z()));
        assert!(approx_eq(c[0].penetration(), 0.1));
    }

    #[test]
    fn test_shared_workspace_gives_same_contacts() {
        let mesh = Shape::trimesh(
            crate::shape::Trimesh::new(
                vec![
                    Vector3::new(-5.0, -5.0, 0.0),
                    Vector3::new(5.0, -5.0, 0.0),
                    Vector3::new(5.0, 5.0, 0.0),
                    Vector3::new(-5.0, 5.0, 0.0),
                ],
                vec![[0, 1, 2], [0, 2, 3]],
            )
            .unwrap(),
        );
        let ball = Shape::sphere(1.0);
        let cube = Shape::cuboid(Vector3::repeat(0.5));
        let on_mesh = (
            ShapePose::new(&ball, Vector3::new(2.0, -2.0, 0.9), UnitQuaternion::identity()),
            ShapePose::new(&mesh, Vector3::zeros(), UnitQuaternion::identity()),
        );
        let on_cube = (
            ShapePose::new(&ball, Vector3::new(0.0, 0.0, 1.4), UnitQuaternion::identity()),
            ShapePose::new(&cube, Vector3::zeros(), UnitQuaternion::identity()),
        );

        let mut ws = CollisionWorkspace::default();
        let mut first = Vec::new();
        assert_eq!(collide_shapes(&on_mesh.0, &on_mesh.1, &mut ws, &mut first), 1);
        let mut cube_contacts = Vec::new();
        assert_eq!(collide_shapes(&on_cube.0, &on_cube.1, &mut ws, &mut cube_contacts), 1);
        assert!(approx_eq(cube_contacts[0].penetration(), 0.1));
        let mut again = Vec::new();
        assert_eq!(collide_shapes(&on_mesh.0, &on_mesh.1, &mut ws, &mut again), 1);
        assert_eq!(first, again);
    }

    // -- Equations --

    fn resting_pair() -> (SlotMap<BodyHandle, Body>, BodyHandle, BodyHandle) {
        let mut bodies = SlotMap::with_key();
        let mut ground = Body::new_static().with_shape(Shape::plane());
        ground.index = 0;
        let mut ball = Body::new(2.0)
            .with_shape(Shape::sphere(1.0))
            .with_position(Vector3::new(0.0, 0.0, 0.9));
        ball.index = 1;
        let g = bodies.insert(ground);
        let b = bodies.insert(ball);
        (bodies, g, b)
    }

    #[test]
    fn test_equations_from_contacts() {
        let (bodies, g, b) = resting_pair();
        let table = MaterialTable::new(ContactMaterial::default().with_friction(0.5));
        let mut np = Narrowphase::new();
        let mut result = NarrowphaseResult::default();
        let params = ContactParams {
            dt: 1.0 / 60.0,
            frictional_gravity: 10.0,
        };
        np.get_contacts(&[(g, b)], &bodies, &table, &params, &mut result);

        assert_eq!(result.contacts.len(), 1);
        assert_eq!(result.contact_equations.len(), 1);
        assert_eq!(result.friction_equations.len(), 2);
        assert_eq!(result.contacts[0].equation, Some(0));
        let eq = &result.contact_equations[0];
        assert_eq!((eq.body_a, eq.body_b), (0, 1));
        // μ g m_reduced = 0.5 * 10 * 2
        assert!(approx_eq(result.friction_equations[0].max_force, 10.0));
    }

    #[test]
    fn test_frictionless_material_adds_no_friction() {
        let (mut bodies, g, b) = resting_pair();
        let mut table = MaterialTable::new(ContactMaterial::default());
        let ice = table.add_material(Material::new("ice").with_friction(0.0));
        bodies[b].material = Some(ice);
        bodies[g].material = Some(ice);
        let mut np = Narrowphase::new();
        let mut result = NarrowphaseResult::default();
        let params = ContactParams {
            dt: 1.0 / 60.0,
            frictional_gravity: 10.0,
        };
        np.get_contacts(&[(g, b)], &bodies, &table, &params, &mut result);
        assert_eq!(result.contact_equations.len(), 1);
        assert!(result.friction_equations.is_empty());
    }

    #[test]
    fn test_trigger_reports_without_equations() {
        let (mut bodies, g, b) = resting_pair();
        bodies[b].collision_response = false;
        let mut np = Narrowphase::new();
        let mut result = NarrowphaseResult::default();
        let params = ContactParams {
            dt: 1.0 / 60.0,
            frictional_gravity: 10.0,
        };
        np.get_contacts(&[(g, b)], &bodies, &MaterialTable::default(), &params, &mut result);
        assert_eq!(result.contacts.len(), 1);
        assert!(result.contacts[0].equation.is_none());
        assert!(result.contact_equations.is_empty());
    }
}
