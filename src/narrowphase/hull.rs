//! Contacts involving convex hulls: boxes, cylinders and polyhedra.

use nalgebra::Vector3;

use super::ContactSink;
use crate::math::Transform;
use crate::shape::convex::{ClipResult, ConvexPolyhedron};

/// `true` when `p`, projected along `normal`, lies inside the convex
/// polygon `vertices` (wound counter-clockwise about `normal`).
pub(crate) fn point_in_polygon(vertices: &[Vector3<f32>], normal: &Vector3<f32>, p: &Vector3<f32>) -> bool {
    let mut first_sign = 0.0_f32;
    for (i, v) in vertices.iter().enumerate() {
        let next = &vertices[(i + 1) % vertices.len()];
        let edge = next - v;
        let r = edge.cross(&(p - v)).dot(normal);
        if first_sign == 0.0 {
            first_sign = r;
        } else if r * first_sign < 0.0 {
            return false;
        }
    }
    true
}

/// Sphere against hull. At most one contact: the first vertex inside the
/// sphere, else the first face whose plane the sphere crosses from outside
/// (on the face or on one of its edges).
pub(crate) fn sphere_convex(
    center: Vector3<f32>,
    radius: f32,
    hull: &ConvexPolyhedron,
    frame: &Transform,
    face_vertices: &mut Vec<Vector3<f32>>,
    sink: &mut ContactSink<'_>,
) {
    let r2 = radius * radius;

    for v in hull.vertices() {
        let corner = frame.point_to_world(v);
        let to_corner = corner - center;
        if to_corner.norm_squared() < r2 {
            let n = to_corner.normalize();
            sink.push(n, center + n * radius, corner);
            return;
        }
    }

    for (i, face) in hull.faces().iter().enumerate() {
        let normal = frame.vector_to_world(&hull.face_normals()[i]);
        let face_point = frame.point_to_world(&hull.vertices()[face[0]]);
        let deepest = center - normal * radius;
        let penetration = (deepest - face_point).dot(&normal);
        if penetration >= 0.0 || (center - face_point).dot(&normal) <= 0.0 {
            continue;
        }

        face_vertices.clear();
        face_vertices.extend(face.iter().map(|&vi| frame.point_to_world(&hull.vertices()[vi])));

        if point_in_polygon(face_vertices, &normal, &center) {
            sink.push(-normal, deepest, deepest - normal * penetration);
            return;
        }

        for (j, v1) in face_vertices.iter().enumerate() {
            let v2 = &face_vertices[(j + 1) % face_vertices.len()];
            let edge = v2 - v1;
            let len2 = edge.norm_squared();
            if len2 <= 0.0 {
                continue;
            }
            let t = (center - v1).dot(&edge) / len2;
            if t <= 0.0 || t >= 1.0 {
                continue;
            }
            let p = v1 + edge * t;
            let to_p = p - center;
            if to_p.norm_squared() < r2 {
                let n = to_p.normalize();
                sink.push(n, center + n * radius, p);
                return;
            }
        }
    }
}

/// Plane (local +Z normal) against hull: one contact per vertex below the plane.
pub(crate) fn plane_convex(plane: &Transform, hull: &ConvexPolyhedron, frame: &Transform, sink: &mut ContactSink<'_>) {
    let normal = plane.vector_to_world(&Vector3::z());
    for v in hull.vertices() {
        let world = frame.point_to_world(v);
        let d = (world - plane.position).dot(&normal);
        if d <= 0.0 {
            sink.push(normal, world - normal * d, world);
        }
    }
}

/// Hull against hull: separating-axis search, then clipping of the incident
/// face of B against the reference face of A.
pub(crate) fn convex_convex(
    a: &ConvexPolyhedron,
    frame_a: &Transform,
    b: &ConvexPolyhedron,
    frame_b: &Transform,
    clip: &mut ClipResult,
    sink: &mut ContactSink<'_>,
) {
    let Some(axis) = a.find_separating_axis(frame_a, b, frame_b, None, None) else {
        return;
    };
    clip.clear();
    a.clip_against_hull(frame_a, b, frame_b, &axis, -100.0, 100.0, clip);
    for c in clip.iter() {
        let point_b = c.point;
        let point_a = c.point - c.normal * c.depth;
        sink.push(c.normal, point_a, point_b);
    }
}

/// Hull against a point inside it: pushed out through the nearest face.
pub(crate) fn convex_particle(
    hull: &ConvexPolyhedron,
    frame: &Transform,
    particle: Vector3<f32>,
    sink: &mut ContactSink<'_>,
) {
    let local = frame.point_to_local(&particle);
    if !hull.point_is_inside(&local) {
        return;
    }
    let mut best: Option<(usize, f32)> = None;
    for (i, n) in hull.face_normals().iter().enumerate() {
        // Distance from the point out to face i
        let depth = -(n.dot(&local) + hull.plane_constant(i));
        match best {
            Some((_, d)) if d <= depth => {}
            _ => best = Some((i, depth)),
        }
    }
    if let Some((i, depth)) = best {
        let normal = frame.vector_to_world(&hull.face_normals()[i]);
        sink.push(normal, particle + normal * depth, particle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_in_polygon() {
        let square = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        assert!(point_in_polygon(&square, &Vector3::z(), &Vector3::new(0.5, 0.5, 3.0)));
        assert!(!point_in_polygon(&square, &Vector3::z(), &Vector3::new(1.5, 0.5, 0.0)));
    }
}
