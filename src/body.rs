//! Rigid bodies.
//!
//! A [`Body`] owns its shapes, mass properties, kinematic state and sleep
//! state. Mass properties are recomputed whenever a shape is attached or the
//! mass changes: the mass is split between shapes in proportion to their
//! volume and each shape's inertia is moved to the body origin with the
//! parallel-axis theorem. Bodies whose shapes have no finite volume (planes,
//! heightfields, particles) fall back to the inertia of their local bounding
//! box.
//!
//! # Example
//! ```
//! use rigid3d::body::{Body, BodyType};
//! use rigid3d::shape::Shape;
//! use nalgebra::Vector3;
//!
//! let die = Body::new(1.0)
//!     .with_shape(Shape::cuboid(Vector3::repeat(0.5)))
//!     .with_position(Vector3::new(0.0, 4.0, 0.0));
//! assert_eq!(die.body_type(), BodyType::Dynamic);
//! assert!((die.inv_mass() - 1.0).abs() < 1e-6);
//!
//! let floor = Body::new(0.0);
//! assert_eq!(floor.body_type(), BodyType::Static);
//! ```

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::aabb::Aabb;
use crate::material::MaterialId;
use crate::math::{integrate_quaternion, invert_inertia, normalize_exact, normalize_fast, rotate_tensor, Transform};
use crate::shape::convex::box_inertia;
use crate::shape::Shape;

/// Determines how a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyType {
    /// Moved by forces, contacts and constraints.
    Dynamic,
    /// Never moves. Infinite mass.
    Static,
    /// Moves only with its prescribed velocity. Infinite mass.
    Kinematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SleepState {
    Awake,
    Sleepy,
    Sleeping,
}

/// Sleep transitions reported by [`Body::sleep_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTransition {
    Sleepy,
    Sleep,
    Wakeup,
}

/// A shape attached to a body at a local offset and orientation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BodyShape {
    pub shape: Shape,
    pub offset: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

#[derive(Debug, Clone)]
pub struct Body {
    // -- Pose --
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub previous_position: Vector3<f32>,
    pub previous_orientation: UnitQuaternion<f32>,
    /// Pose blended between the last two ticks by `World::fixed_step`.
    pub interpolated_position: Vector3<f32>,
    pub interpolated_orientation: UnitQuaternion<f32>,
    pub initial_position: Vector3<f32>,
    pub initial_orientation: UnitQuaternion<f32>,

    // -- Motion --
    pub velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub initial_velocity: Vector3<f32>,
    pub initial_angular_velocity: Vector3<f32>,
    /// Force accumulated since the last step.
    pub force: Vector3<f32>,
    /// Torque accumulated since the last step.
    pub torque: Vector3<f32>,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Per-axis multiplier on linear velocity changes. Zero locks an axis.
    pub linear_factor: Vector3<f32>,
    /// Per-axis multiplier on angular velocity changes. Zero locks an axis.
    pub angular_factor: Vector3<f32>,

    // -- Mass --
    body_type: BodyType,
    mass: f32,
    inv_mass: f32,
    inertia: Matrix3<f32>,
    inv_inertia: Matrix3<f32>,
    inv_inertia_world: Matrix3<f32>,
    fixed_rotation: bool,

    // -- Sleep --
    pub allow_sleep: bool,
    pub sleep_speed_limit: f32,
    pub sleep_time_limit: f32,
    sleep_state: SleepState,
    time_last_sleepy: f32,
    pub(crate) wake_up_after_narrowphase: bool,
    pub(crate) pending_wakeup: bool,

    // -- Collision --
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    /// When `false` the body reports contacts but is never pushed by them.
    pub collision_response: bool,
    pub material: Option<MaterialId>,
    shapes: Vec<BodyShape>,
    bounding_radius: f32,

    /// Dense index assigned by the world each step.
    pub(crate) index: usize,
}

impl Body {
    /// Create a body with the given mass. A positive mass gives a dynamic
    /// body, anything else a static one.
    pub fn new(mass: f32) -> Self {
        let (body_type, mass) = if mass > 0.0 && mass.is_finite() {
            (BodyType::Dynamic, mass)
        } else {
            (BodyType::Static, 0.0)
        };
        let mut body = Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            previous_position: Vector3::zeros(),
            previous_orientation: UnitQuaternion::identity(),
            interpolated_position: Vector3::zeros(),
            interpolated_orientation: UnitQuaternion::identity(),
            initial_position: Vector3::zeros(),
            initial_orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            initial_velocity: Vector3::zeros(),
            initial_angular_velocity: Vector3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            linear_damping: 0.01,
            angular_damping: 0.01,
            linear_factor: Vector3::repeat(1.0),
            angular_factor: Vector3::repeat(1.0),
            body_type,
            mass,
            inv_mass: 0.0,
            inertia: Matrix3::zeros(),
            inv_inertia: Matrix3::zeros(),
            inv_inertia_world: Matrix3::zeros(),
            fixed_rotation: false,
            allow_sleep: true,
            sleep_speed_limit: 0.1,
            sleep_time_limit: 1.0,
            sleep_state: SleepState::Awake,
            time_last_sleepy: 0.0,
            wake_up_after_narrowphase: false,
            pending_wakeup: false,
            collision_filter_group: 1,
            collision_filter_mask: u32::MAX,
            collision_response: true,
            material: None,
            shapes: Vec::new(),
            bounding_radius: 0.0,
            index: 0,
        };
        body.update_mass_properties();
        body
    }

    pub fn new_static() -> Self {
        Self::new(0.0)
    }

    /// A body driven only by its velocity. Contacts never push it.
    pub fn new_kinematic() -> Self {
        let mut body = Self::new(0.0);
        body.body_type = BodyType::Kinematic;
        body
    }

    // -- Builders --

    pub fn with_position(mut self, position: Vector3<f32>) -> Self {
        self.position = position;
        self.sync_snapshots();
        self
    }

    pub fn with_orientation(mut self, orientation: UnitQuaternion<f32>) -> Self {
        self.orientation = orientation;
        self.sync_snapshots();
        self.update_inertia_world();
        self
    }

    pub fn with_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.velocity = velocity;
        self.initial_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vector3<f32>) -> Self {
        self.angular_velocity = angular_velocity;
        self.initial_angular_velocity = angular_velocity;
        self
    }

    /// Attach a shape at the body origin.
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.add_shape(shape, Vector3::zeros(), UnitQuaternion::identity());
        self
    }

    /// Attach a shape at a local offset and orientation.
    pub fn with_shape_at(
        mut self,
        shape: Shape,
        offset: Vector3<f32>,
        orientation: UnitQuaternion<f32>,
    ) -> Self {
        self.add_shape(shape, offset, orientation);
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear.clamp(0.0, 1.0);
        self.angular_damping = angular.clamp(0.0, 1.0);
        self
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_collision_filter(mut self, group: u32, mask: u32) -> Self {
        self.collision_filter_group = group;
        self.collision_filter_mask = mask;
        self
    }

    pub fn with_collision_response(mut self, response: bool) -> Self {
        self.collision_response = response;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self.update_mass_properties();
        self
    }

    pub fn with_linear_factor(mut self, factor: Vector3<f32>) -> Self {
        self.linear_factor = factor;
        self
    }

    pub fn with_angular_factor(mut self, factor: Vector3<f32>) -> Self {
        self.angular_factor = factor;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_sleep_limits(mut self, speed_limit: f32, time_limit: f32) -> Self {
        self.sleep_speed_limit = speed_limit;
        self.sleep_time_limit = time_limit;
        self
    }

    fn sync_snapshots(&mut self) {
        self.previous_position = self.position;
        self.interpolated_position = self.position;
        self.initial_position = self.position;
        self.previous_orientation = self.orientation;
        self.interpolated_orientation = self.orientation;
        self.initial_orientation = self.orientation;
    }

    // -- Shapes --

    /// Attach a shape and recompute mass properties and bounding radius.
    pub fn add_shape(&mut self, shape: Shape, offset: Vector3<f32>, orientation: UnitQuaternion<f32>) {
        self.shapes.push(BodyShape {
            shape,
            offset,
            orientation,
        });
        self.update_bounding_radius();
        self.update_mass_properties();
    }

    /// Detach the shape at `index`, returning it.
    pub fn remove_shape(&mut self, index: usize) -> Option<BodyShape> {
        if index >= self.shapes.len() {
            return None;
        }
        let removed = self.shapes.remove(index);
        self.update_bounding_radius();
        self.update_mass_properties();
        Some(removed)
    }

    pub fn shapes(&self) -> &[BodyShape] {
        &self.shapes
    }

    /// World pose of the shape at `index`, or `None` past the end of the
    /// shape list.
    pub fn shape_transform(&self, index: usize) -> Option<Transform> {
        self.shapes.get(index).map(|s| self.shape_frame(s))
    }

    /// World pose of one of this body's shapes.
    pub fn shape_frame(&self, shape: &BodyShape) -> Transform {
        self.transform().compose(&shape.offset, &shape.orientation)
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    fn update_bounding_radius(&mut self) {
        self.bounding_radius = self
            .shapes
            .iter()
            .map(|s| {
                let r = s.shape.bounding_sphere_radius();
                if r >= f32::MAX {
                    f32::MAX
                } else {
                    s.offset.norm() + r
                }
            })
            .fold(0.0, f32::max);
    }

    /// World-space bounds of all shapes. Empty for bodies without shapes.
    pub fn aabb(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for s in &self.shapes {
            aabb.extend(&s.shape.world_aabb(&self.shape_frame(s)));
        }
        aabb
    }

    fn local_aabb(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for s in &self.shapes {
            let frame = Transform::new(s.offset, s.orientation);
            aabb.extend(&s.shape.world_aabb(&frame));
        }
        aabb
    }

    // -- Mass properties --

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Change the body type, recomputing the inverse mass.
    pub fn set_body_type(&mut self, body_type: BodyType) {
        self.body_type = body_type;
        self.update_mass_properties();
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Set the mass. Zero or negative mass turns a dynamic body static.
    pub fn set_mass(&mut self, mass: f32) {
        if mass > 0.0 && mass.is_finite() {
            self.mass = mass;
            if self.body_type == BodyType::Static {
                self.body_type = BodyType::Dynamic;
            }
        } else {
            self.mass = 0.0;
            if self.body_type == BodyType::Dynamic {
                self.body_type = BodyType::Static;
            }
        }
        self.update_mass_properties();
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Local inertia tensor about the body origin.
    pub fn inertia(&self) -> &Matrix3<f32> {
        &self.inertia
    }

    pub fn inv_inertia(&self) -> &Matrix3<f32> {
        &self.inv_inertia
    }

    pub fn inv_inertia_world(&self) -> &Matrix3<f32> {
        &self.inv_inertia_world
    }

    pub fn fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn set_fixed_rotation(&mut self, fixed: bool) {
        self.fixed_rotation = fixed;
        self.update_mass_properties();
    }

    /// Recompute inverse mass and inertia from the mass and attached shapes.
    pub fn update_mass_properties(&mut self) {
        self.inv_mass = if self.body_type == BodyType::Dynamic && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        };
        self.inertia = self.composite_inertia();
        self.inv_inertia = if self.fixed_rotation || self.inv_mass == 0.0 {
            Matrix3::zeros()
        } else {
            invert_inertia(&self.inertia)
        };
        self.update_inertia_world();
    }

    fn composite_inertia(&self) -> Matrix3<f32> {
        if self.mass <= 0.0 || self.shapes.is_empty() {
            return Matrix3::zeros();
        }
        let volumes: Vec<f32> = self.shapes.iter().map(|s| s.shape.volume()).collect();
        let total: f32 = volumes.iter().sum();
        let volumetric = total.is_finite() && total > 0.0 && volumes.iter().all(|v| *v < f32::MAX);

        if !volumetric {
            let aabb = self.local_aabb();
            let half = aabb.half_extents();
            if aabb.is_empty() || !half.iter().all(|h| h.is_finite()) {
                return Matrix3::zeros();
            }
            return box_inertia(&half, self.mass);
        }

        let mut inertia = Matrix3::zeros();
        for (s, volume) in self.shapes.iter().zip(volumes) {
            let m = self.mass * volume / total;
            let local = rotate_tensor(&s.orientation, &s.shape.local_inertia(m));
            let d = s.offset;
            let shift = (Matrix3::identity() * d.norm_squared() - d * d.transpose()) * m;
            inertia += local + shift;
        }
        inertia
    }

    /// Refresh `inv_inertia_world = R * inv_inertia * Rᵀ`.
    pub fn update_inertia_world(&mut self) {
        self.inv_inertia_world = rotate_tensor(&self.orientation, &self.inv_inertia);
    }

    // -- Frames --

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }

    pub fn point_to_local_frame(&self, world: &Vector3<f32>) -> Vector3<f32> {
        self.transform().point_to_local(world)
    }

    pub fn point_to_world_frame(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.transform().point_to_world(local)
    }

    pub fn vector_to_local_frame(&self, world: &Vector3<f32>) -> Vector3<f32> {
        self.orientation.inverse_transform_vector(world)
    }

    pub fn vector_to_world_frame(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.orientation * local
    }

    /// Velocity of the material point at `world_point`.
    pub fn velocity_at_world_point(&self, world_point: &Vector3<f32>) -> Vector3<f32> {
        self.velocity + self.angular_velocity.cross(&(world_point - self.position))
    }

    // -- Forces --

    /// Apply a world-space force at a point given relative to the body
    /// origin (in world orientation). Wakes the body.
    pub fn apply_force(&mut self, force: &Vector3<f32>, relative_point: &Vector3<f32>) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake_up();
        self.force += force;
        self.torque += relative_point.cross(force);
    }

    /// Apply a body-local force at a body-local point.
    pub fn apply_local_force(&mut self, local_force: &Vector3<f32>, local_point: &Vector3<f32>) {
        let force = self.vector_to_world_frame(local_force);
        let point = self.vector_to_world_frame(local_point);
        self.apply_force(&force, &point);
    }

    pub fn apply_torque(&mut self, torque: &Vector3<f32>) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake_up();
        self.torque += torque;
    }

    /// Apply an instantaneous world-space impulse at a point relative to the
    /// body origin. Wakes the body.
    pub fn apply_impulse(&mut self, impulse: &Vector3<f32>, relative_point: &Vector3<f32>) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.wake_up();
        self.velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_world * relative_point.cross(impulse);
    }

    pub fn apply_local_impulse(&mut self, local_impulse: &Vector3<f32>, local_point: &Vector3<f32>) {
        let impulse = self.vector_to_world_frame(local_impulse);
        let point = self.vector_to_world_frame(local_point);
        self.apply_impulse(&impulse, &point);
    }

    pub fn clear_forces(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    // -- Sleep --

    pub fn sleep_state(&self) -> SleepState {
        self.sleep_state
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep_state == SleepState::Sleeping
    }

    /// Put the body to sleep, zeroing its velocities.
    pub fn sleep(&mut self) {
        self.sleep_state = SleepState::Sleeping;
        self.velocity = Vector3::zeros();
        self.angular_velocity = Vector3::zeros();
        self.wake_up_after_narrowphase = false;
    }

    /// Wake the body. A `wakeup` event fires at the end of the next step if
    /// it was sleeping.
    pub fn wake_up(&mut self) {
        if self.sleep_state == SleepState::Sleeping {
            self.pending_wakeup = true;
        }
        self.sleep_state = SleepState::Awake;
        self.wake_up_after_narrowphase = false;
    }

    /// Advance the sleep state machine at simulation time `time`.
    pub fn sleep_tick(&mut self, time: f32) -> Option<SleepTransition> {
        if !self.allow_sleep {
            return None;
        }
        let speed_squared = self.velocity.norm_squared() + self.angular_velocity.norm_squared();
        let limit_squared = self.sleep_speed_limit * self.sleep_speed_limit;
        match self.sleep_state {
            SleepState::Awake if speed_squared < limit_squared => {
                self.sleep_state = SleepState::Sleepy;
                self.time_last_sleepy = time;
                Some(SleepTransition::Sleepy)
            }
            SleepState::Sleepy if speed_squared > limit_squared => {
                self.wake_up();
                None
            }
            SleepState::Sleepy if time - self.time_last_sleepy > self.sleep_time_limit => {
                self.sleep();
                Some(SleepTransition::Sleep)
            }
            _ => None,
        }
    }

    // -- Integration --

    /// Apply velocity damping for a step of `dt` seconds.
    pub fn apply_damping(&mut self, dt: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.velocity *= (1.0 - self.linear_damping).powf(dt);
        self.angular_velocity *= (1.0 - self.angular_damping).powf(dt);
    }

    /// Semi-implicit Euler step. Saves the previous pose first; static and
    /// sleeping bodies do not move.
    pub fn integrate(&mut self, dt: f32, quat_normalize_fast: bool) {
        self.previous_position = self.position;
        self.previous_orientation = self.orientation;

        let movable = matches!(self.body_type, BodyType::Dynamic | BodyType::Kinematic);
        if !movable || self.sleep_state == SleepState::Sleeping {
            return;
        }

        let inv_mass_dt = self.inv_mass * dt;
        self.velocity += self.force.component_mul(&self.linear_factor) * inv_mass_dt;
        let torque = self.torque.component_mul(&self.angular_factor);
        self.angular_velocity += self.inv_inertia_world * torque * dt;

        self.position += self.velocity * dt;
        let q = integrate_quaternion(
            self.orientation.quaternion(),
            &self.angular_velocity,
            &self.angular_factor,
            dt,
        );
        self.orientation = if quat_normalize_fast {
            normalize_fast(q)
        } else {
            normalize_exact(q)
        };
        self.update_inertia_world();
    }

    /// Kinetic energy, linear plus rotational.
    pub fn kinetic_energy(&self) -> f32 {
        let linear = 0.5 * self.mass * self.velocity.norm_squared();
        let w_local = self.vector_to_local_frame(&self.angular_velocity);
        let rotational = 0.5 * w_local.dot(&(self.inertia * w_local));
        linear + rotational
    }
}
