//! Ray casting against the bodies of a world.
//!
//! A [`Ray`] is a segment `from → to`. Casting it gathers candidate bodies
//! from the broadphase with the segment's bounding box, then tests every shape
//! the ray passes close enough to. Hits are reported according to the
//! [`RayMode`]:
//!
//! - `Closest` keeps the nearest hit,
//! - `Any` stops at the first hit found,
//! - `All` hands every hit to a callback, which may abort the cast.
//!
//! # Example
//! ```
//! use rigid3d::body::Body;
//! use rigid3d::raycast::{RayOptions, RaycastResult};
//! use rigid3d::shape::Shape;
//! use rigid3d::world::World;
//! use nalgebra::Vector3;
//!
//! let mut world = World::new();
//! let ball = world.add_body(Body::new_static().with_shape(Shape::sphere(1.0)));
//!
//! let mut result = RaycastResult::default();
//! let hit = world.raycast_closest(
//!     Vector3::new(-5.0, 0.0, 0.0),
//!     Vector3::new(5.0, 0.0, 0.0),
//!     &RayOptions::default(),
//!     &mut result,
//! );
//! assert!(hit);
//! assert_eq!(result.body, Some(ball));
//! assert!((result.distance - 4.0).abs() < 1e-5);
//! ```

use nalgebra::{UnitQuaternion, Vector3};

use slotmap::SlotMap;

use crate::aabb::Aabb;
use crate::body::Body;
use crate::broadphase::Broadphase;
use crate::math::Transform;
use crate::shape::heightfield::CellRange;
use crate::shape::{ConvexPolyhedron, Geometry, Heightfield, Shape, Trimesh};
use crate::world::{BodyHandle, World};

/// Ray directions closer than this to a face plane count as parallel.
const PRECISION: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RayMode {
    Closest,
    Any,
    All,
}

/// Which bodies and shapes a ray can hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayOptions {
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    /// Ignore faces whose normal points along the ray.
    pub skip_backfaces: bool,
    /// Ignore bodies and shapes with `collision_response == false`.
    pub check_collision_response: bool,
}

impl Default for RayOptions {
    fn default() -> Self {
        Self {
            collision_filter_group: u32::MAX,
            collision_filter_mask: u32::MAX,
            skip_backfaces: false,
            check_collision_response: true,
        }
    }
}

/// Outcome of a cast, reused between casts.
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastResult {
    pub ray_from: Vector3<f32>,
    pub ray_to: Vector3<f32>,
    pub hit_normal_world: Vector3<f32>,
    pub hit_point_world: Vector3<f32>,
    pub has_hit: bool,
    pub body: Option<BodyHandle>,
    /// Index of the hit shape in its body's shape list.
    pub shape_index: Option<usize>,
    /// Hull face or mesh triangle that was hit.
    pub hit_face_index: Option<usize>,
    /// Distance from `ray_from` to the hit point, negative without a hit.
    pub distance: f32,
    should_stop: bool,
}

impl Default for RaycastResult {
    fn default() -> Self {
        Self {
            ray_from: Vector3::zeros(),
            ray_to: Vector3::zeros(),
            hit_normal_world: Vector3::zeros(),
            hit_point_world: Vector3::zeros(),
            has_hit: false,
            body: None,
            shape_index: None,
            hit_face_index: None,
            distance: -1.0,
            should_stop: false,
        }
    }
}

impl RaycastResult {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Stop the cast after the current hit. Meant for `All` callbacks.
    pub fn abort(&mut self) {
        self.should_stop = true;
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop
    }
}

/// Reusable buffers for casting rays. A [`Ray`] owns one, and a [`World`]
/// keeps one for its `raycast_*` conveniences.
#[derive(Debug, Clone)]
pub(crate) struct RayWorkspace {
    candidates: Vec<BodyHandle>,
    triangles: Vec<usize>,
    pillar: ConvexPolyhedron,
}

impl Default for RayWorkspace {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            triangles: Vec::new(),
            pillar: ConvexPolyhedron::scratch(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ray {
    pub from: Vector3<f32>,
    pub to: Vector3<f32>,
    pub mode: RayMode,
    pub options: RayOptions,
    workspace: RayWorkspace,
}

impl Ray {
    pub fn new(from: Vector3<f32>, to: Vector3<f32>, mode: RayMode) -> Self {
        Self {
            from,
            to,
            mode,
            options: RayOptions::default(),
            workspace: RayWorkspace::default(),
        }
    }

    pub fn with_options(mut self, options: RayOptions) -> Self {
        self.options = options;
        self
    }

    /// Unit direction from `from` to `to`, zero for a degenerate ray.
    pub fn direction(&self) -> Vector3<f32> {
        segment_direction(&self.from, &self.to)
    }

    /// Cast against every body in `world`. `result` is reset first. In `All`
    /// mode `callback` runs once per hit. Returns `true` if anything was hit.
    pub fn intersect_world(
        &mut self,
        world: &World,
        result: &mut RaycastResult,
        callback: Option<&mut dyn FnMut(&mut RaycastResult)>,
    ) -> bool {
        let segment = Segment {
            from: self.from,
            to: self.to,
            mode: self.mode,
            options: self.options,
        };
        cast(&segment, world.body_map(), world.broadphase(), &mut self.workspace, result, callback)
    }
}

fn segment_direction(from: &Vector3<f32>, to: &Vector3<f32>) -> Vector3<f32> {
    (to - from).try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros)
}

/// The parameters of one cast.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Segment {
    pub from: Vector3<f32>,
    pub to: Vector3<f32>,
    pub mode: RayMode,
    pub options: RayOptions,
}

pub(crate) fn cast(
    segment: &Segment,
    bodies: &SlotMap<BodyHandle, Body>,
    broadphase: &dyn Broadphase,
    workspace: &mut RayWorkspace,
    result: &mut RaycastResult,
    callback: Option<&mut dyn FnMut(&mut RaycastResult)>,
) -> bool {
    result.reset();
    let direction = segment_direction(&segment.from, &segment.to);
    if direction == Vector3::zeros() {
        return false;
    }

    workspace.candidates.clear();
    broadphase.aabb_query(
        bodies,
        &Aabb::from_points([&segment.from, &segment.to]),
        &mut workspace.candidates,
    );

    let mut hits = HitReporter {
        mode: segment.mode,
        from: segment.from,
        to: segment.to,
        direction,
        skip_backfaces: segment.options.skip_backfaces,
        result,
        callback,
        has_hit: false,
    };

    let candidates = core::mem::take(&mut workspace.candidates);
    for &handle in &candidates {
        if hits.result.should_stop {
            break;
        }
        if let Some(body) = bodies.get(handle) {
            intersect_body(&segment.options, workspace, handle, body, &mut hits);
        }
    }
    workspace.candidates = candidates;
    hits.has_hit
}

fn intersect_body(
    options: &RayOptions,
    workspace: &mut RayWorkspace,
    handle: BodyHandle,
    body: &Body,
    hits: &mut HitReporter<'_, '_>,
) {
    if options.check_collision_response && !body.collision_response {
        return;
    }
    if (options.collision_filter_group & body.collision_filter_mask) == 0
        || (body.collision_filter_group & options.collision_filter_mask) == 0
    {
        return;
    }

    for (i, s) in body.shapes().iter().enumerate() {
        let shape = &s.shape;
        if options.check_collision_response && !shape.collision_response {
            continue;
        }
        if (options.collision_filter_group & shape.collision_filter_mask) == 0
            || (shape.collision_filter_group & options.collision_filter_mask) == 0
        {
            continue;
        }
        let frame = body.shape_frame(s);
        let target = Target {
            body: handle,
            shape: i,
        };
        intersect_shape(workspace, shape, &frame, target, hits);
        if hits.result.should_stop {
            return;
        }
    }
}

fn intersect_shape(
    workspace: &mut RayWorkspace,
    shape: &Shape,
    frame: &Transform,
    target: Target,
    hits: &mut HitReporter<'_, '_>,
) {
    if distance_from_line(&hits.from, &hits.direction, &frame.position) > shape.bounding_sphere_radius() {
        return;
    }
    match &shape.geometry {
        Geometry::Sphere { radius } => intersect_sphere(*radius, frame, target, hits),
        Geometry::Plane => intersect_plane(frame, target, hits),
        Geometry::Box(b) => intersect_hull(b.hull(), frame, None, target, hits),
        Geometry::ConvexPolyhedron(hull) => intersect_hull(hull, frame, None, target, hits),
        Geometry::Cylinder(c) => intersect_hull(c.hull(), frame, None, target, hits),
        Geometry::Heightfield(field) => intersect_heightfield(field, frame, workspace, target, hits),
        Geometry::Trimesh(mesh) => intersect_trimesh(mesh, frame, &mut workspace.triangles, target, hits),
        Geometry::Particle => {}
    }
}

#[derive(Debug, Clone, Copy)]
struct Target {
    body: BodyHandle,
    shape: usize,
}

/// Applies the ray mode to each candidate hit.
struct HitReporter<'r, 'c> {
    mode: RayMode,
    from: Vector3<f32>,
    to: Vector3<f32>,
    direction: Vector3<f32>,
    skip_backfaces: bool,
    result: &'r mut RaycastResult,
    callback: Option<&'c mut dyn FnMut(&mut RaycastResult)>,
    has_hit: bool,
}

impl HitReporter<'_, '_> {
    fn length(&self) -> f32 {
        (self.to - self.from).norm()
    }

    fn report(&mut self, normal: Vector3<f32>, point: Vector3<f32>, target: Target, face: Option<usize>) {
        if self.skip_backfaces && normal.dot(&self.direction) > 0.0 {
            return;
        }
        let distance = (point - self.from).norm();
        match self.mode {
            RayMode::All => {
                self.has_hit = true;
                self.set(normal, point, target, face, distance);
                if let Some(callback) = self.callback.as_mut() {
                    callback(&mut *self.result);
                }
            }
            RayMode::Closest => {
                if !self.result.has_hit || distance < self.result.distance {
                    self.has_hit = true;
                    self.set(normal, point, target, face, distance);
                }
            }
            RayMode::Any => {
                self.has_hit = true;
                self.set(normal, point, target, face, distance);
                self.result.should_stop = true;
            }
        }
    }

    fn set(&mut self, normal: Vector3<f32>, point: Vector3<f32>, target: Target, face: Option<usize>, distance: f32) {
        let r = &mut *self.result;
        r.ray_from = self.from;
        r.ray_to = self.to;
        r.hit_normal_world = normal;
        r.hit_point_world = point;
        r.has_hit = true;
        r.body = Some(target.body);
        r.shape_index = Some(target.shape);
        r.hit_face_index = face;
        r.distance = distance;
    }
}

/// Distance from `point` to the infinite line through `from` along `direction`.
fn distance_from_line(from: &Vector3<f32>, direction: &Vector3<f32>, point: &Vector3<f32>) -> f32 {
    let along = (point - from).dot(direction);
    (point - (from + direction * along)).norm()
}

/// Barycentric inside test for a point on the triangle's plane.
pub fn point_in_triangle(p: &Vector3<f32>, a: &Vector3<f32>, b: &Vector3<f32>, c: &Vector3<f32>) -> bool {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;
    let dot00 = v0.dot(&v0);
    let dot01 = v0.dot(&v1);
    let dot02 = v0.dot(&v2);
    let dot11 = v1.dot(&v1);
    let dot12 = v1.dot(&v2);
    let u = dot11 * dot02 - dot01 * dot12;
    let v = dot00 * dot12 - dot01 * dot02;
    u >= 0.0 && v >= 0.0 && u + v < dot00 * dot11 - dot01 * dot01
}

// ---------------------------------------------------------------------------
// Per-geometry tests
// ---------------------------------------------------------------------------

fn intersect_sphere(radius: f32, frame: &Transform, target: Target, hits: &mut HitReporter<'_, '_>) {
    let center = frame.position;
    let d = hits.to - hits.from;
    let m = hits.from - center;
    let a = d.norm_squared();
    let b = 2.0 * d.dot(&m);
    let c = m.norm_squared() - radius * radius;
    let delta = b * b - 4.0 * a * c;
    if delta < 0.0 {
        return;
    }

    let root = delta.sqrt();
    let roots = [(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)];
    let count = if delta == 0.0 { 1 } else { 2 };
    for &t in &roots[..count] {
        if !(0.0..=1.0).contains(&t) {
            continue;
        }
        let point = hits.from + d * t;
        let normal = (point - center).try_normalize(f32::EPSILON).unwrap_or_else(|| -hits.direction);
        hits.report(normal, point, target, None);
        if hits.result.should_stop {
            return;
        }
    }
}

fn intersect_plane(frame: &Transform, target: Target, hits: &mut HitReporter<'_, '_>) {
    let normal = frame.vector_to_world(&Vector3::z());
    let start = (hits.from - frame.position).dot(&normal);
    let end = (hits.to - frame.position).dot(&normal);
    if start * end > 0.0 {
        return;
    }
    if hits.length() < start {
        return;
    }
    let n_dot_dir = normal.dot(&hits.direction);
    if n_dot_dir.abs() < PRECISION {
        return;
    }
    let t = -start / n_dot_dir;
    let point = hits.from + hits.direction * t;
    hits.report(normal, point, target, None);
}

/// Test hull faces as fans of triangles. `faces` limits the test to a subset.
fn intersect_hull(
    hull: &ConvexPolyhedron,
    frame: &Transform,
    faces: Option<&[usize]>,
    target: Target,
    hits: &mut HitReporter<'_, '_>,
) {
    let length = hits.length();
    let count = faces.map_or(hull.faces().len(), <[usize]>::len);

    for n in 0..count {
        let fi = faces.map_or(n, |f| f[n]);
        let face = &hull.faces()[fi];
        if face.len() < 3 {
            continue;
        }
        let normal = frame.vector_to_world(&hull.face_normals()[fi]);
        let a = frame.point_to_world(&hull.vertices()[face[0]]);

        let n_dot_dir = hits.direction.dot(&normal);
        if n_dot_dir.abs() < PRECISION {
            continue;
        }
        let t = normal.dot(&(a - hits.from)) / n_dot_dir;
        if t < 0.0 || t > length {
            continue;
        }
        let point = hits.from + hits.direction * t;

        for k in 1..face.len() - 1 {
            let b = frame.point_to_world(&hull.vertices()[face[k]]);
            let c = frame.point_to_world(&hull.vertices()[face[k + 1]]);
            if point_in_triangle(&point, &a, &b, &c) {
                hits.report(normal, point, target, Some(fi));
                break;
            }
        }
        if hits.result.should_stop {
            return;
        }
    }
}

fn intersect_heightfield(
    field: &Heightfield,
    frame: &Transform,
    workspace: &mut RayWorkspace,
    target: Target,
    hits: &mut HitReporter<'_, '_>,
) {
    let local_from = frame.point_to_local(&hits.from);
    let local_to = frame.point_to_local(&hits.to);
    let Some(range) = field.cells_overlapping(&Aabb::from_points([&local_from, &local_to])) else {
        return;
    };

    let w = field.element_size();
    for xi in range.x_min..range.x_max {
        for yi in range.y_min..range.y_max {
            if hits.result.should_stop {
                return;
            }
            let (min, max) = field.rect_min_max(&CellRange {
                x_min: xi,
                y_min: yi,
                x_max: xi + 1,
                y_max: yi + 1,
            });
            let cell = Aabb::new(
                Vector3::new(xi as f32 * w, yi as f32 * w, min),
                Vector3::new((xi + 1) as f32 * w, (yi + 1) as f32 * w, max),
            );
            if cell.intersect_segment(&local_from, &local_to).is_none() {
                continue;
            }
            for upper in [false, true] {
                let offset = field.triangle_pillar(xi, yi, upper, &mut workspace.pillar);
                let pillar_frame = frame.compose(&offset, &UnitQuaternion::identity());
                // Only the top face of a pillar is part of the surface
                intersect_hull(&workspace.pillar, &pillar_frame, Some(&[0]), target, hits);
                if hits.result.should_stop {
                    return;
                }
            }
        }
    }
}

fn intersect_trimesh(
    mesh: &Trimesh,
    frame: &Transform,
    triangles: &mut Vec<usize>,
    target: Target,
    hits: &mut HitReporter<'_, '_>,
) {
    let local_from = frame.point_to_local(&hits.from);
    let local_to = frame.point_to_local(&hits.to);
    let local_dir = frame.vector_to_local(&hits.direction);
    let length_squared = (local_to - local_from).norm_squared();

    triangles.clear();
    mesh.triangles_on_segment(&local_from, &local_to, triangles);
    for &i in triangles.iter() {
        let normal = mesh.triangle_normal(i);
        let [a, b, c] = mesh.triangle_vertices(i);
        let n_dot_dir = local_dir.dot(&normal);
        if n_dot_dir.abs() < PRECISION {
            continue;
        }
        let t = normal.dot(&(a - local_from)) / n_dot_dir;
        if t < 0.0 {
            continue;
        }
        let point = local_from + local_dir * t;
        if (point - local_from).norm_squared() > length_squared || !point_in_triangle(&point, &a, &b, &c) {
            continue;
        }
        hits.report(
            frame.vector_to_world(&normal),
            frame.point_to_world(&point),
            target,
            Some(i),
        );
        if hits.result.should_stop {
            return;
        }
    }
}
