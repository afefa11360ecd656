//! Velocity-level constraint equations.
//!
//! Every equation couples two bodies through a Jacobian row
//! `G = [spatial_a, rotational_a, spatial_b, rotational_b]` and is stabilized
//! with SPOOK parameters derived from a stiffness `k`, a relaxation `d`
//! (in steps) and the step size `h`:
//!
//! ```text
//! a   = 4 / (h (1 + 4d))
//! b   = 4d / (1 + 4d)
//! eps = 4 / (h² k (1 + 4d))
//! ```
//!
//! The solver drives each equation towards `G W = B` with
//! `B = -g a - G W b - h G M⁻¹ f`, where `g` is the constraint violation.

use nalgebra::Vector3;

use crate::solver::SolverBody;

/// One body's half of a Jacobian row.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JacobianElement {
    pub spatial: Vector3<f32>,
    pub rotational: Vector3<f32>,
}

impl JacobianElement {
    #[inline]
    pub fn multiply_vectors(&self, spatial: &Vector3<f32>, rotational: &Vector3<f32>) -> f32 {
        self.spatial.dot(spatial) + self.rotational.dot(rotational)
    }
}

/// What the equation constrains, with the geometric data it needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EquationKind {
    /// Non-penetration along `normal` (from A to B). `ri`/`rj` are the contact
    /// points relative to each body's center, in world orientation.
    Contact {
        normal: Vector3<f32>,
        ri: Vector3<f32>,
        rj: Vector3<f32>,
        restitution: f32,
    },
    /// Zero relative velocity along `tangent` at the contact point.
    Friction {
        tangent: Vector3<f32>,
        ri: Vector3<f32>,
        rj: Vector3<f32>,
    },
    /// Keeps the world axes `axis_a` and `axis_b` at no more than
    /// `max_angle` apart (π/2 for perpendicular).
    Rotational {
        axis_a: Vector3<f32>,
        axis_b: Vector3<f32>,
        max_angle: f32,
    },
    /// Drives the relative angular velocity about the axes to `target_velocity`.
    RotationalMotor {
        axis_a: Vector3<f32>,
        axis_b: Vector3<f32>,
        target_velocity: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub kind: EquationKind,
    /// Dense solver index of the first body.
    pub body_a: usize,
    /// Dense solver index of the second body.
    pub body_b: usize,
    pub jacobian_a: JacobianElement,
    pub jacobian_b: JacobianElement,
    pub min_force: f32,
    pub max_force: f32,
    pub a: f32,
    pub b: f32,
    pub eps: f32,
    pub enabled: bool,
    /// Force applied by the last solve, `λ / dt`.
    pub multiplier: f32,
}

impl Equation {
    pub fn new(kind: EquationKind, body_a: usize, body_b: usize, min_force: f32, max_force: f32) -> Self {
        Self {
            kind,
            body_a,
            body_b,
            jacobian_a: JacobianElement::default(),
            jacobian_b: JacobianElement::default(),
            min_force,
            max_force,
            a: 0.0,
            b: 0.0,
            eps: 0.0,
            enabled: true,
            multiplier: 0.0,
        }
    }

    /// A one-sided contact: `λ ∈ [0, max_force]`.
    pub fn contact(
        body_a: usize,
        body_b: usize,
        normal: Vector3<f32>,
        ri: Vector3<f32>,
        rj: Vector3<f32>,
        restitution: f32,
        max_force: f32,
    ) -> Self {
        Self::new(
            EquationKind::Contact {
                normal,
                ri,
                rj,
                restitution,
            },
            body_a,
            body_b,
            0.0,
            max_force,
        )
    }

    /// Friction along `tangent`, bounded by `±slip_force`.
    pub fn friction(
        body_a: usize,
        body_b: usize,
        tangent: Vector3<f32>,
        ri: Vector3<f32>,
        rj: Vector3<f32>,
        slip_force: f32,
    ) -> Self {
        Self::new(
            EquationKind::Friction { tangent, ri, rj },
            body_a,
            body_b,
            -slip_force,
            slip_force,
        )
    }

    pub fn set_spook_params(&mut self, stiffness: f32, relaxation: f32, h: f32) {
        let d = relaxation;
        let k = stiffness;
        self.a = 4.0 / (h * (1.0 + 4.0 * d));
        self.b = (4.0 * d) / (1.0 + 4.0 * d);
        self.eps = 4.0 / (h * h * k * (1.0 + 4.0 * d));
    }

    /// Penetration along the contact normal (positive when overlapping), or
    /// zero for non-contact equations.
    pub fn penetration(&self, bodies: &[SolverBody]) -> f32 {
        match self.kind {
            EquationKind::Contact { normal, ri, rj, .. } => {
                let bi = &bodies[self.body_a];
                let bj = &bodies[self.body_b];
                -normal.dot(&(bj.position + rj - bi.position - ri))
            }
            _ => 0.0,
        }
    }

    /// Refresh the Jacobian from the current geometry and return the
    /// right-hand side `B` for step `h`.
    pub fn compute_b(&mut self, bodies: &[SolverBody], h: f32) -> f32 {
        let bi = &bodies[self.body_a];
        let bj = &bodies[self.body_b];
        match self.kind {
            EquationKind::Contact {
                normal,
                ri,
                rj,
                restitution,
            } => {
                let rixn = ri.cross(&normal);
                let rjxn = rj.cross(&normal);
                self.jacobian_a = JacobianElement {
                    spatial: -normal,
                    rotational: -rixn,
                };
                self.jacobian_b = JacobianElement {
                    spatial: normal,
                    rotational: rjxn,
                };

                let g = normal.dot(&(bj.position + rj - bi.position - ri));
                let e_plus_one = restitution + 1.0;
                let gw = e_plus_one * bj.velocity.dot(&normal) - e_plus_one * bi.velocity.dot(&normal)
                    + bj.angular_velocity.dot(&rjxn)
                    - bi.angular_velocity.dot(&rixn);
                -g * self.a - gw * self.b - h * self.compute_gimf(bodies)
            }
            EquationKind::Friction { tangent, ri, rj } => {
                self.jacobian_a = JacobianElement {
                    spatial: -tangent,
                    rotational: -ri.cross(&tangent),
                };
                self.jacobian_b = JacobianElement {
                    spatial: tangent,
                    rotational: rj.cross(&tangent),
                };
                -self.compute_gw(bodies) * self.b - h * self.compute_gimf(bodies)
            }
            EquationKind::Rotational {
                axis_a,
                axis_b,
                max_angle,
            } => {
                self.jacobian_a = JacobianElement {
                    spatial: Vector3::zeros(),
                    rotational: axis_b.cross(&axis_a),
                };
                self.jacobian_b = JacobianElement {
                    spatial: Vector3::zeros(),
                    rotational: axis_a.cross(&axis_b),
                };
                let g = max_angle.cos() - axis_a.dot(&axis_b);
                -g * self.a - self.compute_gw(bodies) * self.b - h * self.compute_gimf(bodies)
            }
            EquationKind::RotationalMotor {
                axis_a,
                axis_b,
                target_velocity,
            } => {
                self.jacobian_a = JacobianElement {
                    spatial: Vector3::zeros(),
                    rotational: axis_a,
                };
                self.jacobian_b = JacobianElement {
                    spatial: Vector3::zeros(),
                    rotational: -axis_b,
                };
                let gw = self.compute_gw(bodies) - target_velocity;
                -gw * self.b - h * self.compute_gimf(bodies)
            }
        }
    }

    /// `G W`: the constraint velocity.
    pub fn compute_gw(&self, bodies: &[SolverBody]) -> f32 {
        let bi = &bodies[self.body_a];
        let bj = &bodies[self.body_b];
        self.jacobian_a.multiply_vectors(&bi.velocity, &bi.angular_velocity)
            + self.jacobian_b.multiply_vectors(&bj.velocity, &bj.angular_velocity)
    }

    /// `G Wλ`: the constraint velocity of the accumulated solver correction.
    pub fn compute_gw_lambda(&self, bodies: &[SolverBody]) -> f32 {
        let bi = &bodies[self.body_a];
        let bj = &bodies[self.body_b];
        self.jacobian_a.multiply_vectors(&bi.vlambda, &bi.wlambda)
            + self.jacobian_b.multiply_vectors(&bj.vlambda, &bj.wlambda)
    }

    /// `G M⁻¹ f`: the constraint acceleration from external forces.
    pub fn compute_gimf(&self, bodies: &[SolverBody]) -> f32 {
        let bi = &bodies[self.body_a];
        let bj = &bodies[self.body_b];
        let imfi = bi.force * bi.inv_mass;
        let imfj = bj.force * bj.inv_mass;
        let ii_tau = bi.inv_inertia_world * bi.torque;
        let ij_tau = bj.inv_inertia_world * bj.torque;
        self.jacobian_a.multiply_vectors(&imfi, &ii_tau) + self.jacobian_b.multiply_vectors(&imfj, &ij_tau)
    }

    /// `G M⁻¹ Gᵀ + eps`.
    pub fn compute_c(&self, bodies: &[SolverBody]) -> f32 {
        let bi = &bodies[self.body_a];
        let bj = &bodies[self.body_b];
        let ga = &self.jacobian_a;
        let gb = &self.jacobian_b;
        bi.inv_mass * ga.spatial.norm_squared()
            + bj.inv_mass * gb.spatial.norm_squared()
            + ga.rotational.dot(&(bi.inv_inertia_world * ga.rotational))
            + gb.rotational.dot(&(bj.inv_inertia_world * gb.rotational))
            + self.eps
    }

    /// Distribute an impulse increment into both bodies' solver velocities.
    pub fn add_to_wlambda(&self, bodies: &mut [SolverBody], delta_lambda: f32) {
        let bi = &mut bodies[self.body_a];
        bi.vlambda += self.jacobian_a.spatial * (bi.inv_mass * delta_lambda);
        bi.wlambda += bi.inv_inertia_world * self.jacobian_a.rotational * delta_lambda;

        let bj = &mut bodies[self.body_b];
        bj.vlambda += self.jacobian_b.spatial * (bj.inv_mass * delta_lambda);
        bj.wlambda += bj.inv_inertia_world * self.jacobian_b.rotational * delta_lambda;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn body(position: Vector3<f32>, velocity: Vector3<f32>, inv_mass: f32) -> SolverBody {
        SolverBody {
            position,
            velocity,
            inv_mass,
            inv_inertia_world: Matrix3::identity() * inv_mass,
            ..SolverBody::default()
        }
    }

    #[test]
    fn test_spook_params() {
        let mut eq = Equation::contact(0, 1, Vector3::y(), Vector3::zeros(), Vector3::zeros(), 0.0, 1e6);
        eq.set_spook_params(1e7, 3.0, 1.0 / 60.0);
        assert!(approx_eq(eq.a, 4.0 * 60.0 / 13.0));
        assert!(approx_eq(eq.b, 12.0 / 13.0));
        assert!((eq.eps - 4.0 * 3600.0 / (1e7 * 13.0)).abs() < 1e-9);
    }

    #[test]
    fn test_contact_b_pushes_apart_when_penetrating() {
        // Body 1 sits 0.1 into body 0 along +y
        let bodies = [
            body(Vector3::zeros(), Vector3::zeros(), 0.0),
            body(Vector3::new(0.0, 0.9, 0.0), Vector3::zeros(), 1.0),
        ];
        let mut eq = Equation::contact(
            0,
            1,
            Vector3::y(),
            Vector3::new(0.0, 0.5, 0.0),
            Vector3::new(0.0, -0.5, 0.0),
            0.0,
            1e6,
        );
        eq.set_spook_params(1e7, 3.0, 1.0 / 60.0);
        assert!(approx_eq(eq.penetration(&bodies), 0.1));
        let b = eq.compute_b(&bodies, 1.0 / 60.0);
        assert!(b > 0.0);
        assert!(approx_eq(eq.jacobian_b.spatial.y, 1.0));
        assert!(approx_eq(eq.jacobian_a.spatial.y, -1.0));
    }

    #[test]
    fn test_compute_c_static_vs_dynamic() {
        let bodies = [
            body(Vector3::zeros(), Vector3::zeros(), 0.0),
            body(Vector3::zeros(), Vector3::zeros(), 0.5),
        ];
        let mut eq = Equation::contact(0, 1, Vector3::x(), Vector3::zeros(), Vector3::zeros(), 0.0, 1e6);
        eq.compute_b(&bodies, 0.1);
        assert!(approx_eq(eq.compute_c(&bodies), 0.5));
    }

    #[test]
    fn test_gw_measures_approach_speed() {
        let bodies = [
            body(Vector3::zeros(), Vector3::zeros(), 1.0),
            body(Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, -2.0, 0.0), 1.0),
        ];
        let mut eq = Equation::contact(0, 1, Vector3::y(), Vector3::zeros(), Vector3::zeros(), 0.0, 1e6);
        eq.compute_b(&bodies, 0.1);
        assert!(approx_eq(eq.compute_gw(&bodies), -2.0));
    }

    #[test]
    fn test_add_to_wlambda_respects_inverse_mass() {
        let mut bodies = [
            body(Vector3::zeros(), Vector3::zeros(), 0.0),
            body(Vector3::zeros(), Vector3::zeros(), 0.25),
        ];
        let mut eq = Equation::contact(0, 1, Vector3::y(), Vector3::zeros(), Vector3::zeros(), 0.0, 1e6);
        eq.compute_b(&bodies, 0.1);
        eq.add_to_wlambda(&mut bodies, 4.0);
        assert!(approx_eq(bodies[1].vlambda.y, 1.0));
        assert!(approx_eq(bodies[0].vlambda.norm(), 0.0));
        assert!(approx_eq(eq.compute_gw_lambda(&bodies), 1.0));
    }

    #[test]
    fn test_rotational_equation_satisfied_when_perpendicular() {
        let bodies = [SolverBody::default(), SolverBody::default()];
        let mut eq = Equation::new(
            EquationKind::Rotational {
                axis_a: Vector3::x(),
                axis_b: Vector3::y(),
                max_angle: core::f32::consts::FRAC_PI_2,
            },
            0,
            1,
            -1e6,
            1e6,
        );
        eq.set_spook_params(1e7, 4.0, 0.1);
        assert!(approx_eq(eq.compute_b(&bodies, 0.1), 0.0));
    }
}
