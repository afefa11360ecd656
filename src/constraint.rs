//! Standing joints between two bodies.
//!
//! A [`Constraint`] regenerates its equations from the current body poses at
//! the start of every solve. Point constraints reuse bidirectional contact
//! equations (`λ ∈ [-max_force, max_force]`) and angular constraints use
//! rotational equations.

use nalgebra::Vector3;

use crate::body::Body;
use crate::equation::{Equation, EquationKind};
use crate::math::{normalize_or_zero, tangents};
use crate::world::BodyHandle;

/// Rotational motor of a hinge.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HingeMotor {
    pub target_velocity: f32,
    pub max_force: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintKind {
    /// Keeps the body centers `distance` apart.
    Distance { distance: f32 },
    /// Keeps two body-local pivots at the same world point.
    PointToPoint {
        pivot_a: Vector3<f32>,
        pivot_b: Vector3<f32>,
    },
    /// Point-to-point plus a frozen relative orientation. The axes are the
    /// world axes captured in each body's local frame when locked.
    Lock {
        pivot_a: Vector3<f32>,
        pivot_b: Vector3<f32>,
        axes_a: [Vector3<f32>; 3],
        axes_b: [Vector3<f32>; 3],
    },
    /// Point-to-point plus aligned body-local axes, free to spin about them.
    Hinge {
        pivot_a: Vector3<f32>,
        pivot_b: Vector3<f32>,
        axis_a: Vector3<f32>,
        axis_b: Vector3<f32>,
        motor: Option<HingeMotor>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub kind: ConstraintKind,
    /// When `false` the two bodies do not collide with each other.
    pub collide_connected: bool,
    pub enabled: bool,
    pub max_force: f32,
    pub stiffness: f32,
    pub relaxation: f32,
    equations: Vec<Equation>,
}

impl Constraint {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, kind: ConstraintKind, max_force: f32) -> Self {
        Self {
            body_a,
            body_b,
            kind,
            collide_connected: true,
            enabled: true,
            max_force,
            stiffness: 1e7,
            relaxation: 4.0,
            equations: Vec::new(),
        }
    }

    pub fn distance(body_a: BodyHandle, body_b: BodyHandle, distance: f32, max_force: f32) -> Self {
        Self::new(body_a, body_b, ConstraintKind::Distance { distance }, max_force)
    }

    pub fn point_to_point(
        body_a: BodyHandle,
        pivot_a: Vector3<f32>,
        body_b: BodyHandle,
        pivot_b: Vector3<f32>,
        max_force: f32,
    ) -> Self {
        Self::new(body_a, body_b, ConstraintKind::PointToPoint { pivot_a, pivot_b }, max_force)
    }

    /// Lock the bodies in their current relative pose, pivoting about the
    /// midpoint of their centers.
    pub fn lock(handle_a: BodyHandle, a: &Body, handle_b: BodyHandle, b: &Body, max_force: f32) -> Self {
        let midpoint = (a.position + b.position) * 0.5;
        let world_axes = [Vector3::x(), Vector3::y(), Vector3::z()];
        let kind = ConstraintKind::Lock {
            pivot_a: a.point_to_local_frame(&midpoint),
            pivot_b: b.point_to_local_frame(&midpoint),
            axes_a: world_axes.map(|v| a.vector_to_local_frame(&v)),
            axes_b: world_axes.map(|v| b.vector_to_local_frame(&v)),
        };
        Self::new(handle_a, handle_b, kind, max_force)
    }

    pub fn hinge(
        body_a: BodyHandle,
        pivot_a: Vector3<f32>,
        axis_a: Vector3<f32>,
        body_b: BodyHandle,
        pivot_b: Vector3<f32>,
        axis_b: Vector3<f32>,
        max_force: f32,
    ) -> Self {
        let kind = ConstraintKind::Hinge {
            pivot_a,
            pivot_b,
            axis_a: normalize_or_zero(&axis_a),
            axis_b: normalize_or_zero(&axis_b),
            motor: None,
        };
        Self::new(body_a, body_b, kind, max_force)
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    pub fn with_spook(mut self, stiffness: f32, relaxation: f32) -> Self {
        self.stiffness = stiffness;
        self.relaxation = relaxation;
        self
    }

    /// Turn on the hinge motor. Returns `false` for non-hinge constraints.
    pub fn enable_motor(&mut self, target_velocity: f32, max_force: f32) -> bool {
        match &mut self.kind {
            ConstraintKind::Hinge { motor, .. } => {
                *motor = Some(HingeMotor {
                    target_velocity,
                    max_force,
                });
                true
            }
            _ => false,
        }
    }

    pub fn disable_motor(&mut self) {
        if let ConstraintKind::Hinge { motor, .. } = &mut self.kind {
            *motor = None;
        }
    }

    /// Equations produced by the last update, with the multipliers of the
    /// last solve.
    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub(crate) fn equations_mut(&mut self) -> &mut [Equation] {
        &mut self.equations
    }

    /// Rebuild the equations from the current body state.
    pub fn update(&mut self, a: &Body, b: &Body, dt: f32) {
        self.equations.clear();
        let (ia, ib) = (a.index, b.index);
        let max_force = self.max_force;

        match &self.kind {
            ConstraintKind::Distance { distance } => {
                let normal = normalize_or_zero(&(b.position - a.position));
                let half = distance * 0.5;
                self.equations.push(Equation::new(
                    EquationKind::Contact {
                        normal,
                        ri: normal * half,
                        rj: normal * -half,
                        restitution: 0.0,
                    },
                    ia,
                    ib,
                    -max_force,
                    max_force,
                ));
            }
            ConstraintKind::PointToPoint { pivot_a, pivot_b } => {
                push_point_equations(&mut self.equations, a, pivot_a, b, pivot_b, max_force);
            }
            ConstraintKind::Lock {
                pivot_a,
                pivot_b,
                axes_a,
                axes_b,
            } => {
                push_point_equations(&mut self.equations, a, pivot_a, b, pivot_b, max_force);
                // x⊥y, y⊥z, z⊥x
                for (i, j) in [(0, 1), (1, 2), (2, 0)] {
                    self.equations.push(Equation::new(
                        EquationKind::Rotational {
                            axis_a: a.vector_to_world_frame(&axes_a[i]),
                            axis_b: b.vector_to_world_frame(&axes_b[j]),
                            max_angle: core::f32::consts::FRAC_PI_2,
                        },
                        ia,
                        ib,
                        -max_force,
                        max_force,
                    ));
                }
            }
            ConstraintKind::Hinge {
                pivot_a,
                pivot_b,
                axis_a,
                axis_b,
                motor,
            } => {
                push_point_equations(&mut self.equations, a, pivot_a, b, pivot_b, max_force);
                let world_a = a.vector_to_world_frame(axis_a);
                let world_b = b.vector_to_world_frame(axis_b);
                let (t1, t2) = tangents(&world_a);
                for t in [t1, t2] {
                    self.equations.push(Equation::new(
                        EquationKind::Rotational {
                            axis_a: t,
                            axis_b: world_b,
                            max_angle: core::f32::consts::FRAC_PI_2,
                        },
                        ia,
                        ib,
                        -max_force,
                        max_force,
                    ));
                }
                if let Some(m) = motor {
                    self.equations.push(Equation::new(
                        EquationKind::RotationalMotor {
                            axis_a: world_a,
                            axis_b: world_b,
                            target_velocity: m.target_velocity,
                        },
                        ia,
                        ib,
                        -m.max_force,
                        m.max_force,
                    ));
                }
            }
        }

        for eq in &mut self.equations {
            eq.enabled = self.enabled;
            eq.set_spook_params(self.stiffness, self.relaxation, dt);
        }
    }
}

fn push_point_equations(
    out: &mut Vec<Equation>,
    a: &Body,
    pivot_a: &Vector3<f32>,
    b: &Body,
    pivot_b: &Vector3<f32>,
    max_force: f32,
) {
    let ri = a.vector_to_world_frame(pivot_a);
    let rj = b.vector_to_world_frame(pivot_b);
    for normal in [Vector3::x(), Vector3::y(), Vector3::z()] {
        out.push(Equation::new(
            EquationKind::Contact {
                normal,
                ri,
                rj,
                restitution: 0.0,
            },
            a.index,
            b.index,
            -max_force,
            max_force,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use crate::solver::SolverBody;
    use slotmap::SlotMap;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn handles() -> (BodyHandle, BodyHandle) {
        let mut map: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        (map.insert(()), map.insert(()))
    }

    fn pair() -> (Body, Body) {
        let mut a = Body::new(1.0).with_shape(Shape::sphere(0.5));
        let mut b = Body::new(1.0)
            .with_shape(Shape::sphere(0.5))
            .with_position(Vector3::new(2.0, 0.0, 0.0));
        a.index = 0;
        b.index = 1;
        (a, b)
    }

    #[test]
    fn test_distance_equation_is_satisfied_at_rest_length() {
        let (ha, hb) = handles();
        let (a, b) = pair();
        let mut c = Constraint::distance(ha, hb, 2.0, 1e6);
        c.update(&a, &b, 1.0 / 60.0);
        assert_eq!(c.equations().len(), 1);
        let bodies = [SolverBody::from_body(&a), SolverBody::from_body(&b)];
        assert!(approx_eq(c.equations()[0].penetration(&bodies), 0.0));
        assert!(approx_eq(c.equations()[0].min_force, -1e6));
    }

    #[test]
    fn test_point_to_point_produces_three_rows() {
        let (ha, hb) = handles();
        let (a, b) = pair();
        let mut c = Constraint::point_to_point(ha, Vector3::new(1.0, 0.0, 0.0), hb, Vector3::new(-1.0, 0.0, 0.0), 1e6);
        c.update(&a, &b, 1.0 / 60.0);
        assert_eq!(c.equations().len(), 3);
        let bodies = [SolverBody::from_body(&a), SolverBody::from_body(&b)];
        for eq in c.equations() {
            assert!(approx_eq(eq.penetration(&bodies), 0.0));
        }
    }

    #[test]
    fn test_lock_and_hinge_equation_counts() {
        let (ha, hb) = handles();
        let (a, b) = pair();
        let mut lock = Constraint::lock(ha, &a, hb, &b, 1e6);
        lock.update(&a, &b, 1.0 / 60.0);
        assert_eq!(lock.equations().len(), 6);

        let mut hinge = Constraint::hinge(ha, Vector3::x(), Vector3::z(), hb, -Vector3::x(), Vector3::z(), 1e6);
        hinge.update(&a, &b, 1.0 / 60.0);
        assert_eq!(hinge.equations().len(), 5);
        assert!(hinge.enable_motor(2.0, 10.0));
        hinge.update(&a, &b, 1.0 / 60.0);
        assert_eq!(hinge.equations().len(), 6);
        hinge.disable_motor();
        hinge.update(&a, &b, 1.0 / 60.0);
        assert_eq!(hinge.equations().len(), 5);
    }

    #[test]
    fn test_disabled_constraint_disables_equations() {
        let (ha, hb) = handles();
        let (a, b) = pair();
        let mut c = Constraint::distance(ha, hb, 2.0, 1e6);
        c.enabled = false;
        c.update(&a, &b, 1.0 / 60.0);
        assert!(c.equations().iter().all(|e| !e.enabled));
    }

    #[test]
    fn test_motor_rejected_on_distance() {
        let (ha, hb) = handles();
        let mut c = Constraint::distance(ha, hb, 1.0, 1e6);
        assert!(!c.enable_motor(1.0, 1.0));
    }
}
