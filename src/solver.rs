//! Projected Gauss–Seidel solver.
//!
//! Each step the world snapshots every body into a [`SolverBody`], collects
//! the step's equations and calls [`GsSolver::solve`]. The solver sweeps the
//! equations up to `iterations` times, clamping each accumulated impulse to
//! the equation's force bounds and applying the correction to both bodies
//! immediately. The loop stops early once the summed absolute impulse change
//! of a sweep falls below `tolerance`.

use nalgebra::{Matrix3, Vector3};

use crate::body::{Body, BodyType, SleepState};
use crate::equation::Equation;

/// Per-step solver view of a body.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverBody {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub force: Vector3<f32>,
    pub torque: Vector3<f32>,
    /// Zero for static, kinematic and sleeping bodies.
    pub inv_mass: f32,
    pub inv_inertia_world: Matrix3<f32>,
    pub linear_factor: Vector3<f32>,
    pub angular_factor: Vector3<f32>,
    pub vlambda: Vector3<f32>,
    pub wlambda: Vector3<f32>,
}

impl Default for SolverBody {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            inv_mass: 0.0,
            inv_inertia_world: Matrix3::zeros(),
            linear_factor: Vector3::repeat(1.0),
            angular_factor: Vector3::repeat(1.0),
            vlambda: Vector3::zeros(),
            wlambda: Vector3::zeros(),
        }
    }
}

impl SolverBody {
    pub fn from_body(body: &Body) -> Self {
        let immovable = body.sleep_state() == SleepState::Sleeping || body.body_type() == BodyType::Kinematic;
        let (inv_mass, inv_inertia_world) = if immovable {
            (0.0, Matrix3::zeros())
        } else {
            (body.inv_mass(), *body.inv_inertia_world())
        };
        Self {
            position: body.position,
            velocity: body.velocity,
            angular_velocity: body.angular_velocity,
            force: body.force,
            torque: body.torque,
            inv_mass,
            inv_inertia_world,
            linear_factor: body.linear_factor,
            angular_factor: body.angular_factor,
            vlambda: Vector3::zeros(),
            wlambda: Vector3::zeros(),
        }
    }

    /// Write the solved velocities back into `body`.
    pub fn write_back(&self, body: &mut Body) {
        body.velocity = self.velocity;
        body.angular_velocity = self.angular_velocity;
    }
}

/// Gauss–Seidel solver with reusable scratch buffers.
#[derive(Debug, Clone)]
pub struct GsSolver {
    pub iterations: usize,
    pub tolerance: f32,
    bs: Vec<f32>,
    inv_cs: Vec<f32>,
    lambda: Vec<f32>,
}

impl Default for GsSolver {
    fn default() -> Self {
        Self::new(10, 1e-7)
    }
}

impl GsSolver {
    pub fn new(iterations: usize, tolerance: f32) -> Self {
        Self {
            iterations,
            tolerance,
            bs: Vec::new(),
            inv_cs: Vec::new(),
            lambda: Vec::new(),
        }
    }

    /// Solve `equations` for one step of `dt` seconds, updating the body
    /// velocities and each equation's `multiplier`. Disabled equations are
    /// skipped. Returns the number of sweeps performed.
    pub fn solve(&mut self, dt: f32, bodies: &mut [SolverBody], equations: &mut [Equation]) -> usize {
        let n = equations.len();
        if n == 0 {
            return 0;
        }
        let tol_squared = self.tolerance * self.tolerance;

        self.bs.clear();
        self.inv_cs.clear();
        self.lambda.clear();
        self.lambda.resize(n, 0.0);
        for eq in equations.iter_mut() {
            if eq.enabled {
                let b = eq.compute_b(bodies, dt);
                let c = eq.compute_c(bodies);
                self.bs.push(b);
                self.inv_cs.push(if c > 0.0 { 1.0 / c } else { 0.0 });
            } else {
                self.bs.push(0.0);
                self.inv_cs.push(0.0);
            }
        }

        for b in bodies.iter_mut() {
            b.vlambda = Vector3::zeros();
            b.wlambda = Vector3::zeros();
        }

        let mut sweeps = 0;
        for _ in 0..self.iterations {
            sweeps += 1;
            let mut delta_total = 0.0_f32;
            for (j, eq) in equations.iter().enumerate() {
                if !eq.enabled {
                    continue;
                }
                let lambda_j = self.lambda[j];
                let gw_lambda = eq.compute_gw_lambda(bodies);
                let mut delta = self.inv_cs[j] * (self.bs[j] - gw_lambda - eq.eps * lambda_j);

                if lambda_j + delta < eq.min_force {
                    delta = eq.min_force - lambda_j;
                } else if lambda_j + delta > eq.max_force {
                    delta = eq.max_force - lambda_j;
                }
                self.lambda[j] += delta;
                delta_total += delta.abs();
                eq.add_to_wlambda(bodies, delta);
            }
            if delta_total * delta_total < tol_squared {
                break;
            }
        }

        for b in bodies.iter_mut() {
            b.velocity += b.vlambda.component_mul(&b.linear_factor);
            b.angular_velocity += b.wlambda.component_mul(&b.angular_factor);
        }

        let inv_dt = 1.0 / dt;
        for (eq, lambda) in equations.iter_mut().zip(&self.lambda) {
            eq.multiplier = lambda * inv_dt;
        }
        sweeps
    }
}
