//! Regular-grid terrain.
//!
//! Samples are stored as `data[xi][yi]`, spaced `element_size` apart on the
//! local XY plane, with the height along local +Z. Each grid cell splits into
//! a lower triangle `(xi,yi) (xi+1,yi) (xi,yi+1)` and an upper triangle
//! `(xi+1,yi+1) (xi,yi+1) (xi+1,yi)`. Collision and ray tests extrude a
//! triangle downwards into a convex "pillar" so the generic convex routines
//! can be reused.

use nalgebra::{Matrix3, Vector3};

use crate::aabb::Aabb;
use crate::error::ShapeError;
use crate::shape::convex::ConvexPolyhedron;

/// Range of grid samples, inclusive on both ends. The cells spanned are
/// `x_min..x_max` by `y_min..y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Heightfield {
    data: Vec<Vec<f32>>,
    element_size: f32,
    min_value: f32,
    max_value: f32,
    bounding_sphere_radius: f32,
}

impl Heightfield {
    /// Build a heightfield from a rectangular sample matrix.
    ///
    /// Needs at least 2×2 samples, equal row lengths and a positive finite
    /// `element_size`.
    pub fn new(data: Vec<Vec<f32>>, element_size: f32) -> Result<Self, ShapeError> {
        if !(element_size.is_finite() && element_size > 0.0) {
            return Err(ShapeError::NonPositive {
                name: "heightfield element size",
                value: element_size,
            });
        }
        let rows = data.len();
        let columns = data.first().map_or(0, Vec::len);
        if rows < 2 || columns < 2 {
            return Err(ShapeError::HeightfieldTooSmall { rows, columns });
        }
        if let Some((row, r)) = data.iter().enumerate().find(|(_, r)| r.len() != columns) {
            return Err(ShapeError::RaggedHeightfield {
                row,
                len: r.len(),
                expected: columns,
            });
        }

        let mut min_value = f32::MAX;
        let mut max_value = -f32::MAX;
        for &h in data.iter().flatten() {
            min_value = min_value.min(h);
            max_value = max_value.max(h);
        }
        let bounding_sphere_radius = Vector3::new(
            rows as f32 * element_size,
            columns as f32 * element_size,
            max_value.abs().max(min_value.abs()),
        )
        .norm();

        Ok(Self {
            data,
            element_size,
            min_value,
            max_value,
            bounding_sphere_radius,
        })
    }

    pub fn data(&self) -> &[Vec<f32>] {
        &self.data
    }

    pub fn element_size(&self) -> f32 {
        self.element_size
    }

    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    pub fn bounding_sphere_radius(&self) -> f32 {
        self.bounding_sphere_radius
    }

    /// Number of samples along x.
    pub fn rows(&self) -> usize {
        self.data.len()
    }

    /// Number of samples along y.
    pub fn columns(&self) -> usize {
        self.data[0].len()
    }

    pub fn local_aabb(&self) -> Aabb {
        Aabb::new(
            Vector3::new(0.0, 0.0, self.min_value),
            Vector3::new(
                (self.rows() - 1) as f32 * self.element_size,
                (self.columns() - 1) as f32 * self.element_size,
                self.max_value,
            ),
        )
    }

    /// Terrain is treated as unbounded below for mass purposes.
    pub fn volume(&self) -> f32 {
        f32::MAX
    }

    /// Heightfields belong on static bodies and carry no rotational inertia.
    pub fn local_inertia(&self, _mass: f32) -> Matrix3<f32> {
        Matrix3::zeros()
    }

    /// Cell containing the local point `(x, y)`, or `None` outside the grid.
    pub fn cell_at(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let xi = (x / self.element_size).floor();
        let yi = (y / self.element_size).floor();
        if xi < 0.0 || yi < 0.0 {
            return None;
        }
        let (xi, yi) = (xi as usize, yi as usize);
        if xi >= self.rows() - 1 || yi >= self.columns() - 1 {
            return None;
        }
        Some((xi, yi))
    }

    /// Cells overlapping a local-space box, padded by one cell on each side
    /// and clamped to the grid. Returns `None` when the box misses the grid
    /// or lies entirely above or below the samples in that range.
    pub fn cells_overlapping(&self, aabb: &Aabb) -> Option<CellRange> {
        let w = self.element_size;
        let x_min = (aabb.lower.x / w).floor() as i64 - 1;
        let x_max = (aabb.upper.x / w).ceil() as i64 + 1;
        let y_min = (aabb.lower.y / w).floor() as i64 - 1;
        let y_max = (aabb.upper.y / w).ceil() as i64 + 1;

        let rows = self.rows() as i64;
        let columns = self.columns() as i64;
        if x_max < 0 || y_max < 0 || x_min > rows || y_min > columns {
            return None;
        }
        let range = CellRange {
            x_min: x_min.clamp(0, rows - 1) as usize,
            y_min: y_min.clamp(0, columns - 1) as usize,
            x_max: x_max.clamp(0, rows - 1) as usize,
            y_max: y_max.clamp(0, columns - 1) as usize,
        };

        let (min, max) = self.rect_min_max(&range);
        if aabb.lower.z > max || aabb.upper.z < min {
            return None;
        }
        Some(range)
    }

    /// Lowest and highest sample over the inclusive sample range.
    pub fn rect_min_max(&self, range: &CellRange) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = -f32::MAX;
        for row in &self.data[range.x_min..=range.x_max] {
            for &h in &row[range.y_min..=range.y_max] {
                min = min.min(h);
                max = max.max(h);
            }
        }
        (min, max)
    }

    /// Corners of one of the two triangles of cell `(xi, yi)`, in local space.
    pub fn triangle(&self, xi: usize, yi: usize, upper: bool) -> [Vector3<f32>; 3] {
        let w = self.element_size;
        let p = |i: usize, j: usize| Vector3::new(i as f32 * w, j as f32 * w, self.data[i][j]);
        if upper {
            [p(xi + 1, yi + 1), p(xi, yi + 1), p(xi + 1, yi)]
        } else {
            [p(xi, yi), p(xi + 1, yi), p(xi, yi + 1)]
        }
    }

    /// Interpolated surface height at local `(x, y)`, clamped to the grid edge.
    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        let w = self.element_size;
        let xi = ((x / w).floor().max(0.0) as usize).min(self.rows() - 2);
        let yi = ((y / w).floor().max(0.0) as usize).min(self.columns() - 2);

        let lower_dist2 = (x / w - xi as f32).powi(2) + (y / w - yi as f32).powi(2);
        let upper_dist2 = (x / w - (xi + 1) as f32).powi(2) + (y / w - (yi + 1) as f32).powi(2);
        let [a, b, c] = self.triangle(xi, yi, lower_dist2 > upper_dist2);

        let n = (b - a).cross(&(c - a));
        if n.z.abs() <= f32::EPSILON {
            return a.z;
        }
        // Solve n · (p - a) = 0 for p.z
        a.z - (n.x * (x - a.x) + n.y * (y - a.y)) / n.z
    }

    /// Extrude one cell triangle into a convex pillar reaching below the
    /// lowest sample, writing it into `hull`.
    ///
    /// The hull vertices are relative to the returned local offset, which
    /// keeps the pillar's own origin inside it.
    pub fn triangle_pillar(
        &self,
        xi: usize,
        yi: usize,
        upper: bool,
        hull: &mut ConvexPolyhedron,
    ) -> Vector3<f32> {
        let d = &self.data;
        let w = self.element_size;
        let local_min = d[xi][yi]
            .min(d[xi + 1][yi])
            .min(d[xi][yi + 1])
            .min(d[xi + 1][yi + 1]);
        let h = (local_min - self.min_value) / 2.0 + self.min_value;
        let bottom = -h.abs() - 1.0;

        if !upper {
            let vertices = [
                Vector3::new(-0.25 * w, -0.25 * w, d[xi][yi] - h),
                Vector3::new(0.75 * w, -0.25 * w, d[xi + 1][yi] - h),
                Vector3::new(-0.25 * w, 0.75 * w, d[xi][yi + 1] - h),
                Vector3::new(-0.25 * w, -0.25 * w, bottom),
                Vector3::new(0.75 * w, -0.25 * w, bottom),
                Vector3::new(-0.25 * w, 0.75 * w, bottom),
            ];
            let faces: [&[usize]; 5] = [
                &[0, 1, 2],    // top
                &[5, 4, 3],    // bottom
                &[0, 2, 5, 3], // -x
                &[1, 0, 3, 4], // -y
                &[4, 5, 2, 1], // +xy
            ];
            hull.set_geometry(&vertices, &faces);
            Vector3::new((xi as f32 + 0.25) * w, (yi as f32 + 0.25) * w, h)
        } else {
            let vertices = [
                Vector3::new(0.25 * w, 0.25 * w, d[xi + 1][yi + 1] - h),
                Vector3::new(-0.75 * w, 0.25 * w, d[xi][yi + 1] - h),
                Vector3::new(0.25 * w, -0.75 * w, d[xi + 1][yi] - h),
                Vector3::new(0.25 * w, 0.25 * w, bottom),
                Vector3::new(-0.75 * w, 0.25 * w, bottom),
                Vector3::new(0.25 * w, -0.75 * w, bottom),
            ];
            let faces: [&[usize]; 5] = [
                &[0, 1, 2],    // top
                &[5, 4, 3],    // bottom
                &[2, 5, 3, 0], // +x
                &[0, 3, 4, 1], // +y
                &[1, 4, 5, 2], // -xy
            ];
            hull.set_geometry(&vertices, &faces);
            Vector3::new((xi as f32 + 0.75) * w, (yi as f32 + 0.75) * w, h)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn ramp() -> Heightfield {
        // Height grows with x: h = xi
        let data = (0..4).map(|x| vec![x as f32; 4]).collect();
        Heightfield::new(data, 1.0).unwrap()
    }

    // -- Construction --

    #[test]
    fn test_new_validates_input() {
        assert_eq!(
            Heightfield::new(vec![vec![0.0, 1.0]], 1.0),
            Err(ShapeError::HeightfieldTooSmall { rows: 1, columns: 2 })
        );
        assert_eq!(
            Heightfield::new(vec![vec![0.0, 1.0], vec![0.0]], 1.0),
            Err(ShapeError::RaggedHeightfield { row: 1, len: 1, expected: 2 })
        );
        assert!(matches!(
            Heightfield::new(vec![vec![0.0; 2]; 2], 0.0),
            Err(ShapeError::NonPositive { .. })
        ));
    }

    #[test]
    fn test_min_max_and_aabb() {
        let hf = ramp();
        assert!(approx_eq(hf.min_value(), 0.0));
        assert!(approx_eq(hf.max_value(), 3.0));
        let aabb = hf.local_aabb();
        assert!(approx_eq(aabb.upper.x, 3.0));
        assert!(approx_eq(aabb.upper.y, 3.0));
        assert!(approx_eq(aabb.upper.z, 3.0));
    }

    // -- Lookup --

    #[test]
    fn test_cell_at() {
        let hf = ramp();
        assert_eq!(hf.cell_at(1.5, 2.5), Some((1, 2)));
        assert_eq!(hf.cell_at(-0.1, 0.5), None);
        assert_eq!(hf.cell_at(3.5, 0.5), None);
    }

    #[test]
    fn test_height_at_interpolates_ramp() {
        let hf = ramp();
        assert!(approx_eq(hf.height_at(1.5, 1.2), 1.5));
        assert!(approx_eq(hf.height_at(0.25, 0.7), 0.25));
    }

    #[test]
    fn test_cells_overlapping_prunes_by_height() {
        let hf = ramp();
        let above = Aabb::new(Vector3::new(0.5, 0.5, 10.0), Vector3::new(1.0, 1.0, 11.0));
        assert!(hf.cells_overlapping(&above).is_none());
        let touching = Aabb::new(Vector3::new(0.5, 0.5, 0.5), Vector3::new(1.0, 1.0, 1.5));
        let range = hf.cells_overlapping(&touching).unwrap();
        assert_eq!(range.x_min, 0);
        assert_eq!(range.x_max, 2);
        let outside = Aabb::new(Vector3::new(20.0, 0.0, 0.0), Vector3::new(21.0, 1.0, 1.0));
        assert!(hf.cells_overlapping(&outside).is_none());
    }

    // -- Pillars --

    #[test]
    fn test_pillar_contains_its_origin_and_top_matches_surface() {
        let hf = ramp();
        let mut hull = ConvexPolyhedron::scratch();
        for upper in [false, true] {
            let offset = hf.triangle_pillar(1, 1, upper, &mut hull);
            assert!(hull.point_is_inside(&Vector3::new(0.0, 0.0, -0.5)));
            let tri = hf.triangle(1, 1, upper);
            for corner in tri {
                let local = corner - offset;
                assert!(hull
                    .vertices()
                    .iter()
                    .any(|v| (v - local).norm() < EPSILON));
            }
            // Top face normal tilts against the ramp
            assert!(hull.face_normals()[0].z > 0.0);
            assert!(hull.face_normals()[0].x < 0.0);
        }
    }
}
