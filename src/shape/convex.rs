//! Convex polyhedra: the workhorse geometry behind boxes, cylinders,
//! heightfield pillars and arbitrary convex hulls.
//!
//! Besides mass properties this module hosts the two halves of convex-convex
//! collision:
//!
//! - [`ConvexPolyhedron::find_separating_axis`] runs the separating-axis test
//!   over face normals (or declared unique axes) of both hulls and the cross
//!   products of their unique edge directions.
//! - [`ConvexPolyhedron::clip_against_hull`] picks the incident face of the
//!   other hull and clips it against the side planes of this hull's reference
//!   face (Sutherland–Hodgman), keeping the points behind the reference face.
//!
//! Faces are lists of vertex indices ordered counter-clockwise when seen from
//! outside, so that the right-hand rule gives the outward normal.

use heapless::Vec as HeaplessVec;
use log::{error, warn};
use nalgebra::{Matrix3, Vector3};

use crate::aabb::Aabb;
use crate::error::ShapeError;
use crate::math::{almost_zero, is_antiparallel_or_parallel, Transform, ALMOST_ZERO};

/// Capacity of the fixed-size polygons used while clipping.
pub const MAX_CLIP_VERTICES: usize = 128;

/// Working polygon for face clipping.
pub type ClipPolygon = HeaplessVec<Vector3<f32>, MAX_CLIP_VERTICES>;

/// One point surviving face clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPoint {
    /// World point on the incident face.
    pub point: Vector3<f32>,
    /// World normal of the reference face.
    pub normal: Vector3<f32>,
    /// Signed distance to the reference face plane (negative inside).
    pub depth: f32,
}

/// Output buffer of [`ConvexPolyhedron::clip_against_hull`].
pub type ClipResult = HeaplessVec<ClipPoint, MAX_CLIP_VERTICES>;

fn push_clipped(poly: &mut ClipPolygon, v: Vector3<f32>) {
    if poly.push(v).is_err() {
        error!(
            "clip polygon capacity exceeded (max {}). Vertex dropped.",
            MAX_CLIP_VERTICES
        );
    }
}

/// A convex hull given by vertices and outward-wound faces.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexPolyhedron {
    vertices: Vec<Vector3<f32>>,
    faces: Vec<Vec<usize>>,
    face_normals: Vec<Vector3<f32>>,
    unique_edges: Vec<Vector3<f32>>,
    /// When set, these axes replace the face normals in the separating-axis test.
    unique_axes: Option<Vec<Vector3<f32>>>,
    bounding_sphere_radius: f32,
}

impl ConvexPolyhedron {
    /// Build a hull from vertices and faces.
    ///
    /// Every face must have at least three vertices and reference existing
    /// vertices. Faces whose normal points towards the origin are reported
    /// with a warning, since they are usually wound the wrong way.
    pub fn new(vertices: Vec<Vector3<f32>>, faces: Vec<Vec<usize>>) -> Result<Self, ShapeError> {
        if vertices.is_empty() {
            return Err(ShapeError::Empty("convex polyhedron vertices"));
        }
        if faces.is_empty() {
            return Err(ShapeError::Empty("convex polyhedron faces"));
        }
        for (fi, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(ShapeError::DegenerateFace { face: fi, len: face.len() });
            }
            if let Some(&bad) = face.iter().find(|&&v| v >= vertices.len()) {
                return Err(ShapeError::VertexOutOfRange {
                    face: fi,
                    vertex: bad,
                    count: vertices.len(),
                });
            }
        }

        let mut hull = Self {
            vertices,
            faces,
            face_normals: Vec::new(),
            unique_edges: Vec::new(),
            unique_axes: None,
            bounding_sphere_radius: 0.0,
        };
        hull.compute_normals();
        for (i, n) in hull.face_normals.iter().enumerate() {
            let v = hull.vertices[hull.faces[i][0]];
            if n.dot(&v) < 0.0 {
                warn!(
                    "face {} normal {:?} looks like it points into the shape; faces must be wound counter-clockwise seen from outside",
                    i, n
                );
            }
        }
        hull.compute_edges();
        hull.update_bounding_sphere_radius();
        Ok(hull)
    }

    /// Builder: restrict the face-normal part of the separating-axis test to
    /// these (local) axes. Useful for hulls with many parallel faces.
    pub fn with_unique_axes(mut self, axes: Vec<Vector3<f32>>) -> Self {
        self.unique_axes = Some(axes.into_iter().map(|a| a.normalize()).collect());
        self
    }

    /// Axis-aligned box hull with the given half-extents.
    pub fn cuboid(half_extents: &Vector3<f32>) -> Self {
        let (sx, sy, sz) = (half_extents.x, half_extents.y, half_extents.z);
        let vertices = vec![
            Vector3::new(-sx, -sy, -sz),
            Vector3::new(sx, -sy, -sz),
            Vector3::new(sx, sy, -sz),
            Vector3::new(-sx, sy, -sz),
            Vector3::new(-sx, -sy, sz),
            Vector3::new(sx, -sy, sz),
            Vector3::new(sx, sy, sz),
            Vector3::new(-sx, sy, sz),
        ];
        let faces = vec![
            vec![3, 2, 1, 0], // -z
            vec![4, 5, 6, 7], // +z
            vec![5, 4, 0, 1], // -y
            vec![2, 3, 7, 6], // +y
            vec![0, 4, 7, 3], // -x
            vec![1, 2, 6, 5], // +x
        ];
        let mut hull = Self {
            vertices,
            faces,
            face_normals: Vec::new(),
            unique_edges: Vec::new(),
            unique_axes: Some(vec![Vector3::z(), Vector3::y(), Vector3::x()]),
            bounding_sphere_radius: 0.0,
        };
        hull.compute_normals();
        hull.compute_edges();
        hull.update_bounding_sphere_radius();
        hull
    }

    /// An empty hull used as reusable scratch storage.
    pub(crate) fn scratch() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            face_normals: Vec::new(),
            unique_edges: Vec::new(),
            unique_axes: None,
            bounding_sphere_radius: 0.0,
        }
    }

    /// Replace the geometry in place, reusing the allocations. Inputs are
    /// trusted to be valid.
    pub(crate) fn set_geometry(&mut self, vertices: &[Vector3<f32>], faces: &[&[usize]]) {
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
        self.faces.resize_with(faces.len(), Vec::new);
        for (dst, src) in self.faces.iter_mut().zip(faces) {
            dst.clear();
            dst.extend_from_slice(src);
        }
        self.unique_axes = None;
        self.compute_normals();
        self.compute_edges();
        self.update_bounding_sphere_radius();
    }

    // -- Accessors --

    pub fn vertices(&self) -> &[Vector3<f32>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Vec<usize>] {
        &self.faces
    }

    pub fn face_normals(&self) -> &[Vector3<f32>] {
        &self.face_normals
    }

    pub fn unique_edges(&self) -> &[Vector3<f32>] {
        &self.unique_edges
    }

    pub fn bounding_sphere_radius(&self) -> f32 {
        self.bounding_sphere_radius
    }

    /// Plane constant `c` of face `i`, so that points `p` on the face satisfy
    /// `n · p + c = 0`.
    pub fn plane_constant(&self, i: usize) -> f32 {
        -self.face_normals[i].dot(&self.vertices[self.faces[i][0]])
    }

    // -- Derived geometry --

    /// Recompute face normals with Newell's method, which tolerates collinear
    /// leading vertices and slightly non-planar faces.
    fn compute_normals(&mut self) {
        self.face_normals.clear();
        for face in &self.faces {
            let mut n = Vector3::zeros();
            for (j, &vi) in face.iter().enumerate() {
                let a = &self.vertices[vi];
                let b = &self.vertices[face[(j + 1) % face.len()]];
                n.x += (a.y - b.y) * (a.z + b.z);
                n.y += (a.z - b.z) * (a.x + b.x);
                n.z += (a.x - b.x) * (a.y + b.y);
            }
            let len = n.norm();
            self.face_normals.push(if len > 0.0 { n / len } else { n });
        }
    }

    /// Collect edge directions, dropping duplicates and reversed duplicates.
    fn compute_edges(&mut self) {
        self.unique_edges.clear();
        for face in &self.faces {
            for (j, &vi) in face.iter().enumerate() {
                let k = face[(j + 1) % face.len()];
                let edge = self.vertices[k] - self.vertices[vi];
                let len = edge.norm();
                if len <= ALMOST_ZERO {
                    continue;
                }
                let edge = edge / len;
                if !self
                    .unique_edges
                    .iter()
                    .any(|e| is_antiparallel_or_parallel(e, &edge, ALMOST_ZERO))
                {
                    self.unique_edges.push(edge);
                }
            }
        }
    }

    fn update_bounding_sphere_radius(&mut self) {
        self.bounding_sphere_radius = self
            .vertices
            .iter()
            .map(|v| v.norm_squared())
            .fold(0.0_f32, f32::max)
            .sqrt();
    }

    /// Mean of all vertices, a point strictly inside for non-degenerate hulls.
    pub fn average_point(&self) -> Vector3<f32> {
        let sum: Vector3<f32> = self.vertices.iter().sum();
        sum / self.vertices.len().max(1) as f32
    }

    pub fn local_aabb(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter())
    }

    pub fn world_aabb(&self, frame: &Transform) -> Aabb {
        let mut aabb = Aabb::empty();
        for v in &self.vertices {
            aabb.extend_point(&frame.point_to_world(v));
        }
        aabb
    }

    /// Enclosed volume, summing tetrahedra from the vertex average to each
    /// fan-triangulated face.
    pub fn volume(&self) -> f32 {
        let c = self.average_point();
        let mut six_v = 0.0;
        for face in &self.faces {
            let a = self.vertices[face[0]] - c;
            for w in face[1..].windows(2) {
                let b = self.vertices[w[0]] - c;
                let d = self.vertices[w[1]] - c;
                six_v += a.dot(&b.cross(&d));
            }
        }
        (six_v / 6.0).abs()
    }

    /// Inertia approximated by the local bounding box:
    /// `Ixx = (1/12) * m * ((2*hy)² + (2*hz)²)` and so on.
    pub fn local_inertia(&self, mass: f32) -> Matrix3<f32> {
        box_inertia(&self.local_aabb().half_extents(), mass)
    }

    /// Returns `true` if the local point lies inside or on the hull.
    pub fn point_is_inside(&self, p: &Vector3<f32>) -> bool {
        self.faces.iter().enumerate().all(|(i, face)| {
            self.face_normals[i].dot(&(p - self.vertices[face[0]])) <= 0.0
        })
    }

    // -- Separating axis test --

    /// Project the hull in world pose `frame` onto `axis`, returning `(min, max)`.
    pub fn project(&self, axis: &Vector3<f32>, frame: &Transform) -> (f32, f32) {
        let local_axis = frame.vector_to_local(axis);
        let offset = frame.position.dot(axis);
        let mut min = f32::MAX;
        let mut max = -f32::MAX;
        for v in &self.vertices {
            let d = v.dot(&local_axis);
            min = min.min(d);
            max = max.max(d);
        }
        (min + offset, max + offset)
    }

    /// Overlap depth of the two hulls along `axis`, or `None` when the axis
    /// separates them.
    pub fn test_separating_axis(
        &self,
        axis: &Vector3<f32>,
        frame_a: &Transform,
        other: &ConvexPolyhedron,
        frame_b: &Transform,
    ) -> Option<f32> {
        let (min_a, max_a) = self.project(axis, frame_a);
        let (min_b, max_b) = other.project(axis, frame_b);
        if max_a < min_b || max_b < min_a {
            return None;
        }
        let d0 = max_a - min_b;
        let d1 = max_b - min_a;
        Some(d0.min(d1))
    }

    fn world_face_axes<'a>(
        &'a self,
        frame: &'a Transform,
        face_list: Option<&'a [usize]>,
    ) -> Box<dyn Iterator<Item = Vector3<f32>> + 'a> {
        match (&self.unique_axes, face_list) {
            (Some(axes), _) => Box::new(axes.iter().map(move |a| frame.vector_to_world(a))),
            (None, Some(list)) => Box::new(
                list.iter()
                    .map(move |&fi| frame.vector_to_world(&self.face_normals[fi])),
            ),
            (None, None) => Box::new(
                self.face_normals
                    .iter()
                    .map(move |n| frame.vector_to_world(n)),
            ),
        }
    }

    /// Find the axis of minimum overlap between this hull (A) and `other` (B).
    ///
    /// Returns `None` as soon as any candidate axis separates the hulls. The
    /// returned unit axis points from A towards B.
    pub fn find_separating_axis(
        &self,
        frame_a: &Transform,
        other: &ConvexPolyhedron,
        frame_b: &Transform,
        face_list_a: Option<&[usize]>,
        face_list_b: Option<&[usize]>,
    ) -> Option<Vector3<f32>> {
        let mut dmin = f32::MAX;
        let mut best = Vector3::zeros();

        for axis in self
            .world_face_axes(frame_a, face_list_a)
            .chain(other.world_face_axes(frame_b, face_list_b))
        {
            let d = self.test_separating_axis(&axis, frame_a, other, frame_b)?;
            if d < dmin {
                dmin = d;
                best = axis;
            }
        }

        for ea in &self.unique_edges {
            let world_a = frame_a.vector_to_world(ea);
            for eb in &other.unique_edges {
                let world_b = frame_b.vector_to_world(eb);
                let cross = world_a.cross(&world_b);
                if almost_zero(&cross, ALMOST_ZERO) {
                    continue;
                }
                let axis = cross.normalize();
                let d = self.test_separating_axis(&axis, frame_a, other, frame_b)?;
                if d < dmin {
                    dmin = d;
                    best = axis;
                }
            }
        }

        if (frame_b.position - frame_a.position).dot(&best) < 0.0 {
            best = -best;
        }
        Some(best)
    }

    // -- Face clipping --

    /// Clip the face of `other` most opposed to `axis` against this hull.
    ///
    /// `axis` is the separating axis pointing from this hull towards `other`.
    /// Surviving points lie on the incident face of `other`, with depths
    /// measured against this hull's reference face and clamped to
    /// `[min_dist, max_dist]`; only points at or behind the reference face
    /// (depth ≤ 1e-6) are kept.
    #[allow(clippy::too_many_arguments)]
    pub fn clip_against_hull(
        &self,
        frame_a: &Transform,
        other: &ConvexPolyhedron,
        frame_b: &Transform,
        axis: &Vector3<f32>,
        min_dist: f32,
        max_dist: f32,
        result: &mut ClipResult,
    ) {
        let mut closest_face_b = None;
        let mut dmin = f32::MAX;
        for (i, n) in other.face_normals.iter().enumerate() {
            let d = frame_b.vector_to_world(n).dot(axis);
            if d < dmin {
                dmin = d;
                closest_face_b = Some(i);
            }
        }
        let Some(face_b) = closest_face_b else {
            return;
        };

        let mut incident = ClipPolygon::new();
        for &vi in &other.faces[face_b] {
            push_clipped(&mut incident, frame_b.point_to_world(&other.vertices[vi]));
        }
        self.clip_face_against_hull(axis, frame_a, &incident, min_dist, max_dist, result);
    }

    /// Clip a world-space polygon against the reference face of this hull
    /// that is most aligned with `axis`.
    pub fn clip_face_against_hull(
        &self,
        axis: &Vector3<f32>,
        frame_a: &Transform,
        incident: &[Vector3<f32>],
        min_dist: f32,
        max_dist: f32,
        result: &mut ClipResult,
    ) {
        let mut closest_face_a = None;
        let mut dmax = -f32::MAX;
        for (i, n) in self.face_normals.iter().enumerate() {
            let d = frame_a.vector_to_world(n).dot(axis);
            if d > dmax {
                dmax = d;
                closest_face_a = Some(i);
            }
        }
        let Some(face_a) = closest_face_a else {
            return;
        };

        let face = &self.faces[face_a];
        let ref_normal = frame_a.vector_to_world(&self.face_normals[face_a]);

        let mut poly_in = ClipPolygon::new();
        for v in incident {
            push_clipped(&mut poly_in, *v);
        }
        let mut poly_out = ClipPolygon::new();

        // Side planes contain each reference edge and face away from the face interior
        for k in 0..face.len() {
            let a = frame_a.point_to_world(&self.vertices[face[k]]);
            let b = frame_a.point_to_world(&self.vertices[face[(k + 1) % face.len()]]);
            let side = (b - a).cross(&ref_normal);
            let len = side.norm();
            if len <= ALMOST_ZERO {
                continue;
            }
            let side = side / len;
            let constant = -side.dot(&a);
            clip_face_against_plane(&poly_in, &mut poly_out, &side, constant);
            core::mem::swap(&mut poly_in, &mut poly_out);
            poly_out.clear();
            if poly_in.is_empty() {
                return;
            }
        }

        let ref_point = frame_a.point_to_world(&self.vertices[face[0]]);
        let ref_constant = -ref_normal.dot(&ref_point);
        for p in &poly_in {
            let depth = (ref_normal.dot(p) + ref_constant).max(min_dist);
            if depth <= max_dist && depth <= 1e-6 {
                let clipped = ClipPoint {
                    point: *p,
                    normal: ref_normal,
                    depth,
                };
                if result.push(clipped).is_err() {
                    error!(
                        "clip result capacity exceeded (max {}). Contact dropped.",
                        MAX_CLIP_VERTICES
                    );
                    return;
                }
            }
        }
    }
}

/// Sutherland–Hodgman step: keep the part of `input` with `n · p + c < 0`,
/// appending the clipped polygon to `output`.
pub fn clip_face_against_plane(
    input: &[Vector3<f32>],
    output: &mut ClipPolygon,
    normal: &Vector3<f32>,
    constant: f32,
) {
    if input.len() < 2 {
        return;
    }
    let mut first = input[input.len() - 1];
    let mut n_dot_first = normal.dot(&first) + constant;
    for &last in input {
        let n_dot_last = normal.dot(&last) + constant;
        if n_dot_first < 0.0 {
            if n_dot_last < 0.0 {
                push_clipped(output, last);
            } else {
                let t = n_dot_first / (n_dot_first - n_dot_last);
                push_clipped(output, first.lerp(&last, t));
            }
        } else if n_dot_last < 0.0 {
            let t = n_dot_first / (n_dot_first - n_dot_last);
            push_clipped(output, first.lerp(&last, t));
            push_clipped(output, last);
        }
        first = last;
        n_dot_first = n_dot_last;
    }
}

/// Solid box inertia from half-extents: `Ixx = (1/12) * m * (4*hy² + 4*hz²)`.
pub fn box_inertia(half_extents: &Vector3<f32>, mass: f32) -> Matrix3<f32> {
    let hx2 = 4.0 * half_extents.x * half_extents.x;
    let hy2 = 4.0 * half_extents.y * half_extents.y;
    let hz2 = 4.0 * half_extents.z * half_extents.z;
    let k = mass / 12.0;
    Matrix3::from_diagonal(&Vector3::new(k * (hy2 + hz2), k * (hx2 + hz2), k * (hx2 + hy2)))
}
