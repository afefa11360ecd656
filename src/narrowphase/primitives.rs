//! Closed-form contacts between spheres, planes and particles.

use nalgebra::Vector3;

use super::ContactSink;
use crate::math::Transform;

pub(crate) fn sphere_sphere(
    center_a: Vector3<f32>,
    radius_a: f32,
    center_b: Vector3<f32>,
    radius_b: f32,
    sink: &mut ContactSink<'_>,
) {
    let d = center_b - center_a;
    let r = radius_a + radius_b;
    if d.norm_squared() >= r * r {
        return;
    }
    // Coincident centers: pick any direction
    let n = d.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::x);
    sink.push(n, center_a + n * radius_a, center_b - n * radius_b);
}

/// Sphere against the half-space below a plane with local +Z normal.
pub(crate) fn sphere_plane(center: Vector3<f32>, radius: f32, plane: &Transform, sink: &mut ContactSink<'_>) {
    let normal = plane.vector_to_world(&Vector3::z());
    let deepest = center - normal * radius;
    let depth = (deepest - plane.position).dot(&normal);
    if depth < 0.0 {
        sink.push(-normal, deepest, deepest - normal * depth);
    }
}

pub(crate) fn sphere_particle(center: Vector3<f32>, radius: f32, particle: Vector3<f32>, sink: &mut ContactSink<'_>) {
    let d = particle - center;
    if d.norm_squared() >= radius * radius {
        return;
    }
    let n = d.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::y);
    sink.push(n, center + n * radius, particle);
}

pub(crate) fn plane_particle(plane: &Transform, particle: Vector3<f32>, sink: &mut ContactSink<'_>) {
    let normal = plane.vector_to_world(&Vector3::z());
    let d = (particle - plane.position).dot(&normal);
    if d < 0.0 {
        sink.push(normal, particle - normal * d, particle);
    }
}
