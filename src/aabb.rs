//! Axis-aligned bounding boxes.

use nalgebra::Vector3;

use crate::math::Transform;

/// Axis-aligned bounding box given by its lower and upper corners.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub lower: Vector3<f32>,
    pub upper: Vector3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(lower: Vector3<f32>, upper: Vector3<f32>) -> Self {
        Self { lower, upper }
    }

    /// An inverted box that any call to [`Aabb::extend_point`] replaces.
    pub fn empty() -> Self {
        Self {
            lower: Vector3::repeat(f32::MAX),
            upper: Vector3::repeat(-f32::MAX),
        }
    }

    /// A box centered on `center` with the given half-extents.
    pub fn from_center(center: Vector3<f32>, half_extents: Vector3<f32>) -> Self {
        Self {
            lower: center - half_extents,
            upper: center + half_extents,
        }
    }

    /// Smallest box containing every point. Empty input gives [`Aabb::empty`].
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f32>>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.extend_point(p);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.lower.x > self.upper.x || self.lower.y > self.upper.y || self.lower.z > self.upper.z
    }

    pub fn extend_point(&mut self, p: &Vector3<f32>) {
        self.lower = self.lower.inf(p);
        self.upper = self.upper.sup(p);
    }

    /// Grow this box to also contain `other`.
    pub fn extend(&mut self, other: &Aabb) {
        self.lower = self.lower.inf(&other.lower);
        self.upper = self.upper.sup(&other.upper);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.extend(other);
        out
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.lower + self.upper) * 0.5
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        (self.upper - self.lower) * 0.5
    }

    pub fn volume(&self) -> f32 {
        let d = self.upper - self.lower;
        d.x * d.y * d.z
    }

    /// Returns `true` if the boxes touch or overlap (closed intervals).
    pub fn overlaps(&self, other: &Aabb) -> bool {
        let l1 = &self.lower;
        let u1 = &self.upper;
        let l2 = &other.lower;
        let u2 = &other.upper;
        ((l2.x <= u1.x && u1.x <= u2.x) || (l1.x <= u2.x && u2.x <= u1.x))
            && ((l2.y <= u1.y && u1.y <= u2.y) || (l1.y <= u2.y && u2.y <= u1.y))
            && ((l2.z <= u1.z && u1.z <= u2.z) || (l1.z <= u2.z && u2.z <= u1.z))
    }

    /// Returns `true` if `other` lies entirely inside this box.
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.upper.x >= other.upper.x
            && self.lower.y <= other.lower.y
            && self.upper.y >= other.upper.y
            && self.lower.z <= other.lower.z
            && self.upper.z >= other.upper.z
    }

    pub fn contains_point(&self, p: &Vector3<f32>) -> bool {
        p.x >= self.lower.x
            && p.x <= self.upper.x
            && p.y >= self.lower.y
            && p.y <= self.upper.y
            && p.z >= self.lower.z
            && p.z <= self.upper.z
    }

    /// The eight corners, lower corner first.
    pub fn corners(&self) -> [Vector3<f32>; 8] {
        let l = &self.lower;
        let u = &self.upper;
        [
            Vector3::new(l.x, l.y, l.z),
            Vector3::new(u.x, l.y, l.z),
            Vector3::new(u.x, u.y, l.z),
            Vector3::new(l.x, u.y, l.z),
            Vector3::new(l.x, l.y, u.z),
            Vector3::new(u.x, l.y, u.z),
            Vector3::new(u.x, u.y, u.z),
            Vector3::new(l.x, u.y, u.z),
        ]
    }

    /// Bounding box, in the local space of `frame`, of this world-space box.
    pub fn to_local_frame(&self, frame: &Transform) -> Aabb {
        let mut out = Aabb::empty();
        for c in self.corners() {
            out.extend_point(&frame.point_to_local(&c));
        }
        out
    }

    /// Bounding box, in world space, of this box given in the local space of `frame`.
    pub fn to_world_frame(&self, frame: &Transform) -> Aabb {
        let mut out = Aabb::empty();
        for c in self.corners() {
            out.extend_point(&frame.point_to_world(&c));
        }
        out
    }

    /// Slab test of the segment `from → to` against this box.
    ///
    /// Returns the entry and exit parameters along the segment (in `[0, 1]`)
    /// when the segment touches the box.
    pub fn intersect_segment(&self, from: &Vector3<f32>, to: &Vector3<f32>) -> Option<(f32, f32)> {
        let dir = to - from;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;
        for axis in 0..3 {
            let d = dir[axis];
            if d.abs() < f32::EPSILON {
                if from[axis] < self.lower[axis] || from[axis] > self.upper[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let t1 = (self.lower[axis] - from[axis]) * inv;
            let t2 = (self.upper[axis] - from[axis]) * inv;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
            if t_max < t_min {
                return None;
            }
        }
        Some((t_min, t_max))
    }
}
