//! Triangle meshes with a bounding-volume hierarchy over their triangles.

use nalgebra::{Matrix3, Vector3};

use crate::aabb::Aabb;
use crate::error::ShapeError;
use crate::shape::convex::box_inertia;

// ---------------------------------------------------------------------------
// Bounding volume hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum BvhNode {
    Leaf {
        bounds: Aabb,
        triangle: usize,
    },
    Internal {
        bounds: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bounds(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Internal { bounds, .. } => bounds,
        }
    }
}

/// Binary tree of triangle bounds, split at the median centroid along the
/// longest axis of each node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bvh {
    root: Option<BvhNode>,
}

impl Bvh {
    /// Build from `(bounds, triangle index)` pairs.
    pub fn build(primitives: Vec<(Aabb, usize)>) -> Self {
        if primitives.is_empty() {
            return Self { root: None };
        }
        Self {
            root: Some(Self::build_recursive(primitives)),
        }
    }

    fn build_recursive(mut primitives: Vec<(Aabb, usize)>) -> BvhNode {
        if let [(bounds, triangle)] = primitives.as_slice() {
            return BvhNode::Leaf {
                bounds: *bounds,
                triangle: *triangle,
            };
        }

        let bounds = primitives
            .iter()
            .fold(Aabb::empty(), |acc, (b, _)| acc.union(b));

        let size = bounds.upper - bounds.lower;
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };

        primitives.sort_by(|(a, _), (b, _)| a.center()[axis].total_cmp(&b.center()[axis]));

        let mid = primitives.len() / 2;
        let right_prims = primitives.split_off(mid);
        let left = Box::new(Self::build_recursive(primitives));
        let right = Box::new(Self::build_recursive(right_prims));

        BvhNode::Internal { bounds, left, right }
    }

    /// Bounds of the whole tree, empty when there are no primitives.
    pub fn bounds(&self) -> Aabb {
        self.root.as_ref().map_or_else(Aabb::empty, |r| *r.bounds())
    }

    /// Append the triangles whose bounds overlap `aabb`.
    pub fn query_aabb(&self, aabb: &Aabb, out: &mut Vec<usize>) {
        let Some(root) = &self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !node.bounds().overlaps(aabb) {
                continue;
            }
            match node {
                BvhNode::Leaf { triangle, .. } => out.push(*triangle),
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
    }

    /// Append the triangles whose bounds are touched by the segment.
    pub fn query_segment(&self, from: &Vector3<f32>, to: &Vector3<f32>, out: &mut Vec<usize>) {
        let Some(root) = &self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.bounds().intersect_segment(from, to).is_none() {
                continue;
            }
            match node {
                BvhNode::Leaf { triangle, .. } => out.push(*triangle),
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Trimesh
// ---------------------------------------------------------------------------

/// An indexed triangle mesh. Triangles are wound counter-clockwise seen from
/// the side their normal points to.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trimesh {
    vertices: Vec<Vector3<f32>>,
    indices: Vec<[u32; 3]>,
    normals: Vec<Vector3<f32>>,
    edges: Vec<[u32; 2]>,
    local_aabb: Aabb,
    bounding_sphere_radius: f32,
    tree: Bvh,
}

impl Trimesh {
    pub fn new(vertices: Vec<Vector3<f32>>, indices: Vec<[u32; 3]>) -> Result<Self, ShapeError> {
        if vertices.is_empty() {
            return Err(ShapeError::Empty("trimesh vertices"));
        }
        if indices.is_empty() {
            return Err(ShapeError::Empty("trimesh indices"));
        }
        for (triangle, tri) in indices.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&v| v as usize >= vertices.len()) {
                return Err(ShapeError::TriangleIndexOutOfRange {
                    triangle,
                    vertex,
                    count: vertices.len(),
                });
            }
        }

        let normals = indices
            .iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| vertices[i as usize]);
                let n = (b - a).cross(&(c - a));
                let len = n.norm();
                if len > 0.0 {
                    n / len
                } else {
                    n
                }
            })
            .collect();

        let mut edges: Vec<[u32; 2]> = indices
            .iter()
            .flat_map(|t| [[t[0], t[1]], [t[1], t[2]], [t[2], t[0]]])
            .map(|[a, b]| [a.min(b), a.max(b)])
            .collect();
        edges.sort_unstable();
        edges.dedup();

        let local_aabb = Aabb::from_points(vertices.iter());
        let bounding_sphere_radius = vertices
            .iter()
            .map(|v| v.norm_squared())
            .fold(0.0_f32, f32::max)
            .sqrt();

        let primitives = indices
            .iter()
            .enumerate()
            .map(|(i, t)| (Aabb::from_points(t.map(|v| &vertices[v as usize])), i))
            .collect();
        let tree = Bvh::build(primitives);

        Ok(Self {
            vertices,
            indices,
            normals,
            edges,
            local_aabb,
            bounding_sphere_radius,
            tree,
        })
    }

    pub fn vertices(&self) -> &[Vector3<f32>] {
        &self.vertices
    }

    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    /// Unique undirected edges as vertex index pairs.
    pub fn edges(&self) -> &[[u32; 2]] {
        &self.edges
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_vertices(&self, i: usize) -> [Vector3<f32>; 3] {
        self.indices[i].map(|v| self.vertices[v as usize])
    }

    pub fn triangle_normal(&self, i: usize) -> Vector3<f32> {
        self.normals[i]
    }

    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }

    pub fn bounding_sphere_radius(&self) -> f32 {
        self.bounding_sphere_radius
    }

    /// Triangles whose bounds overlap a local-space box.
    pub fn triangles_in_aabb(&self, aabb: &Aabb, out: &mut Vec<usize>) {
        self.tree.query_aabb(aabb, out);
    }

    /// Triangles whose bounds a local-space segment touches.
    pub fn triangles_on_segment(&self, from: &Vector3<f32>, to: &Vector3<f32>, out: &mut Vec<usize>) {
        self.tree.query_segment(from, to, out);
    }

    /// Signed volume enclosed by the mesh, meaningful for closed meshes.
    pub fn volume(&self) -> f32 {
        let six_v: f32 = self
            .indices
            .iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| self.vertices[i as usize]);
                a.dot(&b.cross(&c))
            })
            .sum();
        (six_v / 6.0).abs()
    }

    /// Inertia of the local bounding box.
    pub fn local_inertia(&self, mass: f32) -> Matrix3<f32> {
        box_inertia(&self.local_aabb.half_extents(), mass)
    }
}

/// Closest point to `p` on triangle `(a, b, c)`.
pub fn closest_point_on_triangle(
    p: &Vector3<f32>,
    a: &Vector3<f32>,
    b: &Vector3<f32>,
    c: &Vector3<f32>,
) -> Vector3<f32> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}
