//! Vector and rotation helpers shared by every stage of the engine.
//!
//! The engine stores all state in `nalgebra` types (`Vector3<f32>`,
//! `UnitQuaternion<f32>`, `Matrix3<f32>`). This module adds the handful of
//! operations the simulation needs that `nalgebra` does not provide in the
//! required form: quaternion integration by an angular velocity, a SLERP that
//! stays well defined for antipodal inputs, tangent-basis construction and
//! rigid frame transforms.

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};

/// Threshold below which vectors are treated as zero length.
pub const ALMOST_ZERO: f32 = 1e-6;

/// Returns `true` if every component of `v` is within `precision` of zero.
#[inline]
pub fn almost_zero(v: &Vector3<f32>, precision: f32) -> bool {
    v.x.abs() <= precision && v.y.abs() <= precision && v.z.abs() <= precision
}

/// Returns `true` if `a` and `b` are parallel or anti-parallel within `precision`.
#[inline]
pub fn is_antiparallel_or_parallel(a: &Vector3<f32>, b: &Vector3<f32>, precision: f32) -> bool {
    almost_zero(&(a - b), precision) || almost_zero(&(a + b), precision)
}

/// Normalize `v`, returning the zero vector when it has no length.
#[inline]
pub fn normalize_or_zero(v: &Vector3<f32>) -> Vector3<f32> {
    let n = v.norm();
    if n > 0.0 {
        v / n
    } else {
        Vector3::zeros()
    }
}

/// Build two unit vectors orthogonal to `n` and to each other.
///
/// The first tangent is `n × x̂` unless `n` is close to the x axis, in which
/// case `n × ŷ` is used. The second is `n × t1`. A zero `n` yields the x and
/// y axes.
pub fn tangents(n: &Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    let norm = n.norm();
    if norm > 0.0 {
        let n = n / norm;
        let reference = if n.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        let t1 = n.cross(&reference).normalize();
        let t2 = n.cross(&t1);
        (t1, t2)
    } else {
        (Vector3::x(), Vector3::y())
    }
}

/// Advance `q` by the angular velocity `omega` over `dt` seconds.
///
/// First-order integration of `q̇ = ½ ω ⊗ q`, where `ω` is encoded as the pure
/// quaternion `(0, ωx, ωy, ωz)` and masked per axis by `angular_factor`. The
/// result is not normalized; callers decide between [`normalize_exact`] and
/// [`normalize_fast`].
pub fn integrate_quaternion(
    q: &Quaternion<f32>,
    omega: &Vector3<f32>,
    angular_factor: &Vector3<f32>,
    dt: f32,
) -> Quaternion<f32> {
    let w = omega.component_mul(angular_factor);
    let half_dt = 0.5 * dt;
    let dq = Quaternion::new(0.0, w.x * half_dt, w.y * half_dt, w.z * half_dt);
    let q = *q;
    q + dq * q
}

/// Exact renormalization. A degenerate quaternion collapses to identity.
#[inline]
pub fn normalize_exact(q: Quaternion<f32>) -> UnitQuaternion<f32> {
    if q.norm_squared() > 0.0 {
        UnitQuaternion::new_normalize(q)
    } else {
        UnitQuaternion::identity()
    }
}

/// Approximate renormalization using the first-order expansion of `1/sqrt(x)`
/// around 1: `q * (3 - |q|²) / 2`. Only accurate for nearly-unit inputs.
#[inline]
pub fn normalize_fast(q: Quaternion<f32>) -> UnitQuaternion<f32> {
    let f = (3.0 - q.norm_squared()) * 0.5;
    if f > 0.0 {
        UnitQuaternion::new_unchecked(q * f)
    } else {
        normalize_exact(q)
    }
}

/// Spherical linear interpolation from `a` to `b` by `t` in `[0, 1]`.
///
/// Takes the shorter arc (flipping `b` when `a · b < 0`) and falls back to a
/// normalized lerp when the inputs are nearly equal, so antipodal and
/// identical inputs are both well defined.
pub fn slerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let qa = *a.quaternion();
    let mut qb = *b.quaternion();
    let mut cosom = qa.coords.dot(&qb.coords);
    if cosom < 0.0 {
        cosom = -cosom;
        qb = -qb;
    }

    let (scale0, scale1) = if 1.0 - cosom > 1e-6 {
        let omega = cosom.acos();
        let sinom = omega.sin();
        (((1.0 - t) * omega).sin() / sinom, (t * omega).sin() / sinom)
    } else {
        (1.0 - t, t)
    };

    normalize_exact(qa * scale0 + qb * scale1)
}

/// Rotate a diagonal-or-full local tensor into world space: `R * M * Rᵀ`.
#[inline]
pub fn rotate_tensor(orientation: &UnitQuaternion<f32>, local: &Matrix3<f32>) -> Matrix3<f32> {
    let r = orientation.to_rotation_matrix();
    r.matrix() * local * r.matrix().transpose()
}

/// Invert an inertia tensor, leaving axes with zero inertia at zero.
///
/// Diagonal tensors are inverted per axis. Full tensors use the general
/// inverse and fall back to the zero matrix when singular.
pub fn invert_inertia(inertia: &Matrix3<f32>) -> Matrix3<f32> {
    let off_diagonal = inertia.m12.abs()
        + inertia.m13.abs()
        + inertia.m21.abs()
        + inertia.m23.abs()
        + inertia.m31.abs()
        + inertia.m32.abs();
    if off_diagonal <= f32::EPSILON * inertia.diagonal().amax().max(1.0) {
        let d = inertia.diagonal();
        let inv = |x: f32| if x > 0.0 { 1.0 / x } else { 0.0 };
        Matrix3::from_diagonal(&Vector3::new(inv(d.x), inv(d.y), inv(d.z)))
    } else {
        inertia.try_inverse().unwrap_or_else(Matrix3::zeros)
    }
}

// ---------------------------------------------------------------------------
// Rigid frame transforms
// ---------------------------------------------------------------------------

/// A rigid transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn new(position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self { position, orientation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    /// `position + orientation * local`
    #[inline]
    pub fn point_to_world(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.position + self.orientation * local
    }

    /// `orientation⁻¹ * (world - position)`
    #[inline]
    pub fn point_to_local(&self, world: &Vector3<f32>) -> Vector3<f32> {
        self.orientation.inverse_transform_vector(&(world - self.position))
    }

    #[inline]
    pub fn vector_to_world(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.orientation * local
    }

    #[inline]
    pub fn vector_to_local(&self, world: &Vector3<f32>) -> Vector3<f32> {
        self.orientation.inverse_transform_vector(world)
    }

    /// Compose a child frame given relative to `self`.
    #[inline]
    pub fn compose(&self, offset: &Vector3<f32>, orientation: &UnitQuaternion<f32>) -> Transform {
        Transform {
            position: self.point_to_world(offset),
            orientation: self.orientation * orientation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::{FRAC_PI_2, PI};

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_vec_eq(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
    }

    // -- Tangent basis --

    #[test]
    fn test_tangents_are_orthonormal() {
        for n in [
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 2.0, -3.0),
        ] {
            let (t1, t2) = tangents(&n);
            let n = n.normalize();
            assert!(approx_eq(t1.norm(), 1.0));
            assert!(approx_eq(t2.norm(), 1.0));
            assert!(approx_eq(t1.dot(&n), 0.0));
            assert!(approx_eq(t2.dot(&n), 0.0));
            assert!(approx_eq(t1.dot(&t2), 0.0));
        }
    }

    #[test]
    fn test_tangents_of_zero_vector() {
        let (t1, t2) = tangents(&Vector3::zeros());
        assert!(approx_vec_eq(&t1, &Vector3::x()));
        assert!(approx_vec_eq(&t2, &Vector3::y()));
    }

    // -- Quaternion integration --

    #[test]
    fn test_integrate_quaternion_matches_axis_angle() {
        // Spin about Y at π/2 rad/s for one second in small steps
        let omega = Vector3::new(0.0, FRAC_PI_2, 0.0);
        let mut q = UnitQuaternion::identity();
        let dt = 1.0 / 1000.0;
        for _ in 0..1000 {
            q = normalize_exact(integrate_quaternion(q.quaternion(), &omega, &Vector3::repeat(1.0), dt));
        }
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        assert!(q.angle_to(&expected) < 1e-2);
    }

    #[test]
    fn test_integrate_quaternion_respects_angular_factor() {
        let q = UnitQuaternion::identity();
        let out = integrate_quaternion(
            q.quaternion(),
            &Vector3::new(1.0, 1.0, 1.0),
            &Vector3::new(0.0, 1.0, 0.0),
            0.1,
        );
        assert!(approx_eq(out.i, 0.0));
        assert!(approx_eq(out.k, 0.0));
        assert!(out.j > 0.0);
    }

    #[test]
    fn test_normalize_fast_close_to_exact() {
        let q = Quaternion::new(1.001, 0.02, 0.0, 0.0);
        let fast = normalize_fast(q);
        let exact = normalize_exact(q);
        assert!(fast.angle_to(&exact) < 1e-3);
        assert!(approx_eq(fast.quaternion().norm(), 1.0));
    }

    // -- SLERP --

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let a = UnitQuaternion::identity();
        let b = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        assert!(slerp(&a, &b, 0.0).angle_to(&a) < EPSILON);
        assert!(slerp(&a, &b, 1.0).angle_to(&b) < EPSILON);
        let mid = slerp(&a, &b, 0.5);
        assert!(approx_eq(mid.angle(), FRAC_PI_2 * 0.5));
    }

    #[test]
    fn test_slerp_takes_short_arc() {
        let a = UnitQuaternion::identity();
        let b = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.5 * PI);
        // 270° one way is 90° the other way
        let mid = slerp(&a, &b, 0.5);
        assert!(approx_eq(mid.angle(), 0.25 * PI));
    }

    #[test]
    fn test_slerp_identical_inputs() {
        let a = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.3);
        let out = slerp(&a, &a, 0.7);
        assert!(out.angle_to(&a) < EPSILON);
    }

    // -- Inertia helpers --

    #[test]
    fn test_invert_inertia_diagonal_with_zero_axis() {
        let i = Matrix3::from_diagonal(&Vector3::new(2.0, 0.0, 4.0));
        let inv = invert_inertia(&i);
        assert!(approx_vec_eq(&inv.diagonal(), &Vector3::new(0.5, 0.0, 0.25)));
    }

    #[test]
    fn test_rotate_tensor_swaps_axes() {
        let local = Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, 3.0));
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let world = rotate_tensor(&q, &local);
        assert!(approx_vec_eq(&world.diagonal(), &Vector3::new(2.0, 1.0, 3.0)));
    }

    // -- Transform --

    #[test]
    fn test_transform_round_trip() {
        let t = Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7),
        );
        let p = Vector3::new(-0.5, 4.0, 2.0);
        let back = t.point_to_local(&t.point_to_world(&p));
        assert!(approx_vec_eq(&back, &p));
    }

    #[test]
    fn test_transform_compose() {
        let parent = Transform::new(
            Vector3::new(0.0, 1.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
        );
        let child = parent.compose(&Vector3::new(1.0, 0.0, 0.0), &UnitQuaternion::identity());
        assert!(approx_vec_eq(&child.position, &Vector3::new(0.0, 2.0, 0.0)));
    }
}
