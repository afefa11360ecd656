//! Contacts against heightfields and triangle meshes.
//!
//! Heightfield cells are tested as two triangular pillars each, built on the
//! fly into the workspace hull. Trimesh triangles are pruned through the
//! mesh BVH before the per-triangle test.

use nalgebra::{UnitQuaternion, Vector3};

use super::{hull, CollisionWorkspace, ContactSink};
use crate::aabb::Aabb;
use crate::math::Transform;
use crate::shape::convex::ConvexPolyhedron;
use crate::shape::trimesh::closest_point_on_triangle;
use crate::shape::{Heightfield, Trimesh};

/// Upper bound of contacts a sphere takes from one heightfield cell before
/// the search stops.
const MAX_SPHERE_CELL_CONTACTS: usize = 2;

fn pillar_frame(field_frame: &Transform, offset: &Vector3<f32>) -> Transform {
    field_frame.compose(offset, &UnitQuaternion::identity())
}

pub(crate) fn sphere_heightfield(
    center: Vector3<f32>,
    radius: f32,
    field: &Heightfield,
    frame: &Transform,
    workspace: &mut CollisionWorkspace,
    sink: &mut ContactSink<'_>,
) {
    let local = frame.point_to_local(&center);
    let Some(range) = field.cells_overlapping(&Aabb::from_center(local, Vector3::repeat(radius))) else {
        return;
    };

    for xi in range.x_min..range.x_max {
        for yi in range.y_min..range.y_max {
            let before = sink.len();
            for upper in [false, true] {
                let offset = field.triangle_pillar(xi, yi, upper, &mut workspace.pillar);
                let pillar = pillar_frame(frame, &offset);
                let reach = workspace.pillar.bounding_sphere_radius() + radius;
                if (pillar.position - center).norm_squared() > reach * reach {
                    continue;
                }
                hull::sphere_convex(center, radius, &workspace.pillar, &pillar, &mut workspace.points, sink);
            }
            if sink.len() - before > MAX_SPHERE_CELL_CONTACTS {
                return;
            }
        }
    }
}

pub(crate) fn convex_heightfield(
    convex: &ConvexPolyhedron,
    convex_frame: &Transform,
    field: &Heightfield,
    frame: &Transform,
    workspace: &mut CollisionWorkspace,
    sink: &mut ContactSink<'_>,
) {
    let local_aabb = convex.world_aabb(convex_frame).to_local_frame(frame);
    let Some(range) = field.cells_overlapping(&local_aabb) else {
        return;
    };
    let radius = convex.bounding_sphere_radius();

    for xi in range.x_min..range.x_max {
        for yi in range.y_min..range.y_max {
            for upper in [false, true] {
                let offset = field.triangle_pillar(xi, yi, upper, &mut workspace.pillar);
                let pillar = pillar_frame(frame, &offset);
                let reach = workspace.pillar.bounding_sphere_radius() + radius;
                if (pillar.position - convex_frame.position).norm_squared() > reach * reach {
                    continue;
                }
                hull::convex_convex(
                    convex,
                    convex_frame,
                    &workspace.pillar,
                    &pillar,
                    &mut workspace.clip,
                    sink,
                );
            }
        }
    }
}

pub(crate) fn sphere_trimesh(
    center: Vector3<f32>,
    radius: f32,
    mesh: &Trimesh,
    frame: &Transform,
    workspace: &mut CollisionWorkspace,
    sink: &mut ContactSink<'_>,
) {
    let local = frame.point_to_local(&center);
    workspace.triangles.clear();
    mesh.triangles_in_aabb(&Aabb::from_center(local, Vector3::repeat(radius)), &mut workspace.triangles);

    let r2 = radius * radius;
    // Neighbouring triangles share their closest edge or vertex
    workspace.points.clear();
    for &i in &workspace.triangles {
        let [a, b, c] = mesh.triangle_vertices(i);
        let closest = closest_point_on_triangle(&local, &a, &b, &c);
        let d2 = (closest - local).norm_squared();
        if d2 >= r2 || workspace.points.iter().any(|p| (p - closest).norm_squared() < 1e-12) {
            continue;
        }
        workspace.points.push(closest);

        let world = frame.point_to_world(&closest);
        let normal = if d2 > f32::EPSILON {
            (world - center).normalize()
        } else {
            -frame.vector_to_world(&mesh.triangle_normal(i))
        };
        sink.push(normal, center + normal * radius, world);
    }
}

/// Plane against trimesh: one contact per mesh vertex below the plane.
pub(crate) fn plane_trimesh(plane: &Transform, mesh: &Trimesh, frame: &Transform, sink: &mut ContactSink<'_>) {
    let normal = plane.vector_to_world(&Vector3::z());
    for v in mesh.vertices() {
        let world = frame.point_to_world(v);
        let d = (world - plane.position).dot(&normal);
        if d < 0.0 {
            sink.push(normal, world - normal * d, world);
        }
    }
}
