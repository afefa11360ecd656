//! Candidate pair generation.
//!
//! A broadphase returns every pair of bodies that might touch this step.
//! False positives are pruned by the narrowphase; a missed pair is a bug.

use nalgebra::Vector3;
use slotmap::SlotMap;

use crate::aabb::Aabb;
use crate::body::{Body, BodyType, SleepState};
use crate::world::BodyHandle;

/// Which broadphase a world is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BroadphaseKind {
    /// Test every pair of bodies.
    #[default]
    Naive,
    /// Sweep and prune along a fixed axis (0, 1 or 2), or along the axis of
    /// largest position variance when `axis` is `None`.
    SweepAndPrune { axis: Option<usize> },
}

impl BroadphaseKind {
    pub fn build(self, use_bounding_boxes: bool) -> Box<dyn Broadphase> {
        match self {
            BroadphaseKind::Naive => Box::new(NaiveBroadphase::new(use_bounding_boxes)),
            BroadphaseKind::SweepAndPrune { axis } => {
                let mut sap = SapBroadphase::new();
                sap.use_bounding_boxes = use_bounding_boxes;
                match axis {
                    Some(axis) => sap.axis_index = axis.min(2),
                    None => sap.auto_detect_axis = true,
                }
                Box::new(sap)
            }
        }
    }
}

pub trait Broadphase {
    /// Append candidate pairs to `pairs`. Each pair is ordered by handle and
    /// the list is sorted, so the output does not depend on the algorithm.
    fn collision_pairs(&mut self, bodies: &SlotMap<BodyHandle, Body>, pairs: &mut Vec<(BodyHandle, BodyHandle)>);

    /// Append every body whose bounds overlap `aabb`.
    fn aabb_query(&self, bodies: &SlotMap<BodyHandle, Body>, aabb: &Aabb, result: &mut Vec<BodyHandle>) {
        for (handle, body) in bodies {
            if body.aabb().overlaps(aabb) {
                result.push(handle);
            }
        }
    }
}

fn awake_or_moving(body: &Body) -> bool {
    body.body_type() != BodyType::Static && body.sleep_state() != SleepState::Sleeping
}

/// Cheap rejection shared by every broadphase: collision filters, and pairs
/// where nothing can move or respond.
pub fn needs_broadphase_collision(a: &Body, b: &Body) -> bool {
    if (a.collision_filter_group & b.collision_filter_mask) == 0
        || (b.collision_filter_group & a.collision_filter_mask) == 0
    {
        return false;
    }
    if !awake_or_moving(a) && !awake_or_moving(b) {
        return false;
    }
    a.is_dynamic() || b.is_dynamic()
}

/// Bounding-sphere overlap test on body positions.
pub fn bounding_spheres_overlap(a: &Body, b: &Body) -> bool {
    let dist_squared = (b.position - a.position).norm_squared();
    let r = a.bounding_radius() + b.bounding_radius();
    dist_squared < r * r
}

fn push_ordered(pairs: &mut Vec<(BodyHandle, BodyHandle)>, a: BodyHandle, b: BodyHandle) {
    if a < b {
        pairs.push((a, b));
    } else {
        pairs.push((b, a));
    }
}

/// One body's bounds, computed once per call.
#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: BodyHandle,
    aabb: Aabb,
}

/// Overlap test between two bodies whose AABBs are already known.
fn bounds_overlap(use_bounding_boxes: bool, a: &Body, a_box: &Aabb, b: &Body, b_box: &Aabb) -> bool {
    if use_bounding_boxes {
        a_box.overlaps(b_box)
    } else {
        bounding_spheres_overlap(a, b)
    }
}

// ----------------------------------------------------------------------------
// Naive
// ----------------------------------------------------------------------------

/// Tests every pair. Fine for the few dozen bodies of a dice scene.
#[derive(Debug, Clone, Default)]
pub struct NaiveBroadphase {
    /// Test AABBs instead of bounding spheres.
    pub use_bounding_boxes: bool,
    entries: Vec<Entry>,
}

impl NaiveBroadphase {
    pub fn new(use_bounding_boxes: bool) -> Self {
        Self {
            use_bounding_boxes,
            entries: Vec::new(),
        }
    }
}

impl Broadphase for NaiveBroadphase {
    fn collision_pairs(&mut self, bodies: &SlotMap<BodyHandle, Body>, pairs: &mut Vec<(BodyHandle, BodyHandle)>) {
        self.entries.clear();
        self.entries.extend(bodies.iter().map(|(handle, body)| Entry {
            handle,
            aabb: if self.use_bounding_boxes { body.aabb() } else { Aabb::empty() },
        }));

        let start = pairs.len();
        for (i, ea) in self.entries.iter().enumerate() {
            for eb in &self.entries[i + 1..] {
                let (a, b) = (&bodies[ea.handle], &bodies[eb.handle]);
                if needs_broadphase_collision(a, b)
                    && bounds_overlap(self.use_bounding_boxes, a, &ea.aabb, b, &eb.aabb)
                {
                    push_ordered(pairs, ea.handle, eb.handle);
                }
            }
        }
        pairs[start..].sort_unstable();
    }
}

// ----------------------------------------------------------------------------
// Sweep and prune
// ----------------------------------------------------------------------------

/// Sorts body bounds along one axis and only tests bodies whose intervals
/// overlap on that axis.
#[derive(Debug, Clone)]
pub struct SapBroadphase {
    pub axis_index: usize,
    /// Re-pick the axis with the largest position variance every call.
    pub auto_detect_axis: bool,
    pub use_bounding_boxes: bool,
    entries: Vec<Entry>,
    /// Indices into `entries` whose interval is still open.
    active: Vec<usize>,
}

impl Default for SapBroadphase {
    fn default() -> Self {
        Self::new()
    }
}

impl SapBroadphase {
    pub fn new() -> Self {
        Self {
            axis_index: 0,
            auto_detect_axis: false,
            use_bounding_boxes: false,
            entries: Vec::new(),
            active: Vec::new(),
        }
    }

    /// Axis along which body positions are most spread out.
    pub fn best_axis(bodies: &SlotMap<BodyHandle, Body>) -> usize {
        let n = bodies.len();
        if n < 2 {
            return 0;
        }
        let mut sum = Vector3::zeros();
        let mut sum_squared = Vector3::zeros();
        for body in bodies.values() {
            sum += body.position;
            sum_squared += body.position.component_mul(&body.position);
        }
        let inv_n = 1.0 / n as f32;
        let mean = sum * inv_n;
        let variance = sum_squared * inv_n - mean.component_mul(&mean);
        if variance.x >= variance.y && variance.x >= variance.z {
            0
        } else if variance.y >= variance.z {
            1
        } else {
            2
        }
    }
}

impl Broadphase for SapBroadphase {
    fn collision_pairs(&mut self, bodies: &SlotMap<BodyHandle, Body>, pairs: &mut Vec<(BodyHandle, BodyHandle)>) {
        if self.auto_detect_axis {
            self.axis_index = Self::best_axis(bodies);
        }
        let axis = self.axis_index;

        self.entries.clear();
        self.entries.extend(
            bodies
                .iter()
                .map(|(handle, body)| Entry {
                    handle,
                    aabb: body.aabb(),
                })
                .filter(|e| !e.aabb.is_empty()),
        );
        self.entries.sort_by(|a, b| {
            a.aabb.lower[axis]
                .total_cmp(&b.aabb.lower[axis])
                .then(a.handle.cmp(&b.handle))
        });

        let start = pairs.len();
        self.active.clear();
        for (i, e) in self.entries.iter().enumerate() {
            let entries = &self.entries;
            self.active.retain(|&k| entries[k].aabb.upper[axis] >= e.aabb.lower[axis]);
            for &k in &self.active {
                let other = &self.entries[k];
                let (a, b) = (&bodies[other.handle], &bodies[e.handle]);
                if needs_broadphase_collision(a, b)
                    && bounds_overlap(self.use_bounding_boxes, a, &other.aabb, b, &e.aabb)
                {
                    push_ordered(pairs, other.handle, e.handle);
                }
            }
            self.active.push(i);
        }
        pairs[start..].sort_unstable();
    }

    fn aabb_query(&self, bodies: &SlotMap<BodyHandle, Body>, aabb: &Aabb, result: &mut Vec<BodyHandle>) {
        let axis = self.axis_index;
        for (handle, body) in bodies {
            let b = body.aabb();
            if b.upper[axis] < aabb.lower[axis] || b.lower[axis] > aabb.upper[axis] {
                continue;
            }
            if b.overlaps(aabb) {
                result.push(handle);
            }
        }
    }
}
