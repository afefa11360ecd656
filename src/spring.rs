//! Damped springs between two body-local anchors.

use nalgebra::Vector3;

use crate::body::Body;
use crate::world::BodyHandle;

/// Hooke spring with linear damping:
/// `F = -k (|r| - L) r̂ - d (u · r̂) r̂`, where `r` runs from anchor A to anchor
/// B and `u` is the relative velocity of the anchors. `F` acts on B, `-F` on A.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Spring {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub local_anchor_a: Vector3<f32>,
    pub local_anchor_b: Vector3<f32>,
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
}

/// Force and torques produced by a spring for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringForce {
    /// Force on body B. Body A receives the negation.
    pub force: Vector3<f32>,
    pub torque_a: Vector3<f32>,
    pub torque_b: Vector3<f32>,
}

impl Spring {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vector3::zeros(),
            local_anchor_b: Vector3::zeros(),
            rest_length: 1.0,
            stiffness: 100.0,
            damping: 1.0,
        }
    }

    pub fn with_anchors(mut self, local_a: Vector3<f32>, local_b: Vector3<f32>) -> Self {
        self.local_anchor_a = local_a;
        self.local_anchor_b = local_b;
        self
    }

    pub fn with_rest_length(mut self, rest_length: f32) -> Self {
        self.rest_length = rest_length;
        self
    }

    pub fn with_stiffness(mut self, stiffness: f32) -> Self {
        self.stiffness = stiffness;
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    /// Anchor A in world space for the given body.
    pub fn world_anchor_a(&self, a: &Body) -> Vector3<f32> {
        a.point_to_world_frame(&self.local_anchor_a)
    }

    pub fn world_anchor_b(&self, b: &Body) -> Vector3<f32> {
        b.point_to_world_frame(&self.local_anchor_b)
    }

    /// Evaluate the spring for the current body state.
    pub fn compute(&self, a: &Body, b: &Body) -> SpringForce {
        let anchor_a = self.world_anchor_a(a);
        let anchor_b = self.world_anchor_b(b);
        let ri = anchor_a - a.position;
        let rj = anchor_b - b.position;

        let r = anchor_b - anchor_a;
        let len = r.norm();
        let r_unit = if len > 0.0 { r / len } else { Vector3::zeros() };

        let u = b.velocity + b.angular_velocity.cross(&rj) - a.velocity - a.angular_velocity.cross(&ri);
        let force = r_unit * (-self.stiffness * (len - self.rest_length) - self.damping * u.dot(&r_unit));

        SpringForce {
            force,
            torque_a: -ri.cross(&force),
            torque_b: rj.cross(&force),
        }
    }

    /// Accumulate the spring force into both bodies.
    pub fn apply(&self, a: &mut Body, b: &mut Body) {
        let f = self.compute(a, b);
        a.force -= f.force;
        b.force += f.force;
        a.torque += f.torque_a;
        b.torque += f.torque_b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    const EPSILON: f32 = 1e-4;

    fn approx_vec_eq(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        (a - b).amax() < EPSILON
    }

    fn spring() -> Spring {
        let mut map: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        Spring::new(map.insert(()), map.insert(()))
            .with_rest_length(1.0)
            .with_stiffness(10.0)
            .with_damping(0.0)
    }

    #[test]
    fn test_stretched_spring_pulls_together() {
        let mut a = Body::new(1.0);
        let mut b = Body::new(1.0).with_position(Vector3::new(3.0, 0.0, 0.0));
        spring().apply(&mut a, &mut b);
        // Stretched by 2: |F| = 20
        assert!(approx_vec_eq(&a.force, &Vector3::new(20.0, 0.0, 0.0)));
        assert!(approx_vec_eq(&b.force, &Vector3::new(-20.0, 0.0, 0.0)));
    }

    #[test]
    fn test_compressed_spring_pushes_apart() {
        let a = Body::new(1.0);
        let b = Body::new(1.0).with_position(Vector3::new(0.5, 0.0, 0.0));
        let f = spring().compute(&a, &b);
        assert!(f.force.x > 0.0);
    }

    #[test]
    fn test_damping_opposes_separation_speed() {
        let a = Body::new(1.0);
        let b = Body::new(1.0)
            .with_position(Vector3::new(1.0, 0.0, 0.0))
            .with_velocity(Vector3::new(2.0, 0.0, 0.0));
        let f = spring().with_damping(0.5).compute(&a, &b);
        assert!(approx_vec_eq(&f.force, &Vector3::new(-1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_off_center_anchor_produces_torque() {
        let a = Body::new(1.0);
        let b = Body::new(1.0).with_position(Vector3::new(3.0, 0.0, 0.0));
        let f = spring()
            .with_anchors(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros())
            .compute(&a, &b);
        assert!(f.torque_a.norm() > 0.0);
        assert!(approx_vec_eq(&f.torque_b, &Vector3::zeros()));
    }
}
