//! The simulation world.
//!
//! A [`World`] owns every body, constraint and spring and advances them in
//! fixed ticks. One tick runs, in order:
//!
//! 1. gravity and spring forces,
//! 2. broadphase pair generation,
//! 3. removal of pairs joined by a non-colliding constraint,
//! 4. overlap bookkeeping rollover,
//! 5. narrowphase contacts and wake-ups,
//! 6. the Gauss–Seidel solve over friction, contact and constraint equations,
//! 7. damping, integration and force clearing,
//! 8. time advance and sleep bookkeeping,
//! 9. event dispatch.
//!
//! # Example
//! ```
//! use rigid3d::body::Body;
//! use rigid3d::config::WorldConfig;
//! use rigid3d::shape::Shape;
//! use rigid3d::world::World;
//! use nalgebra::{UnitQuaternion, Vector3};
//!
//! let mut world = World::with_config(WorldConfig::default().with_gravity(Vector3::new(0.0, -9.82, 0.0)));
//! let ground = Body::new_static()
//!     .with_shape(Shape::plane())
//!     .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -core::f32::consts::FRAC_PI_2));
//! world.add_body(ground);
//! let die = world.add_body(
//!     Body::new(1.0)
//!         .with_shape(Shape::cuboid(Vector3::repeat(0.5)))
//!         .with_position(Vector3::new(0.0, 4.0, 0.0)),
//! );
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0);
//! }
//! assert!(world.body(die).unwrap().position.y < 4.0);
//! ```

use log::{debug, trace, warn};
use nalgebra::Vector3;
use slotmap::{new_key_type, SlotMap};

use crate::body::{Body, BodyType, SleepState, SleepTransition};
use crate::broadphase::Broadphase;
use crate::config::WorldConfig;
use crate::constraint::Constraint;
use crate::equation::Equation;
use crate::events::{BodyEvent, CollideEvent, ContactEvent, ShapeContactEvent, SleepEvent, StepEvent, WorldEvents};
use crate::material::{ContactMaterial, Material, MaterialId, MaterialTable};
use crate::math::slerp;
use crate::narrowphase::{Contact, ContactParams, Narrowphase, NarrowphaseResult};
use crate::overlap::OverlapKeeper;
use crate::profile::{PhaseTimer, StepPhase, StepProfile};
use crate::raycast::{self, RayMode, RayOptions, RayWorkspace, RaycastResult, Segment};
use crate::solver::{GsSolver, SolverBody};
use crate::spring::Spring;

new_key_type! {
    /// Stable handle to a body. Stays valid until the body is removed.
    pub struct BodyHandle;
    /// Stable handle to a constraint.
    pub struct ConstraintHandle;
    /// Stable handle to a spring.
    pub struct SpringHandle;
}

/// A shape identified by its body and its index in the body's shape list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeKey {
    pub body: BodyHandle,
    pub shape: usize,
}

/// Events gathered during a tick before any listener runs.
#[derive(Debug, Default)]
struct EventScratch {
    sleep: Vec<SleepEvent>,
    began_bodies: Vec<(BodyHandle, BodyHandle)>,
    ended_bodies: Vec<(BodyHandle, BodyHandle)>,
    began_shapes: Vec<(ShapeKey, ShapeKey)>,
    ended_shapes: Vec<(ShapeKey, ShapeKey)>,
}

impl EventScratch {
    fn clear(&mut self) {
        self.sleep.clear();
        self.began_bodies.clear();
        self.ended_bodies.clear();
        self.began_shapes.clear();
        self.ended_shapes.clear();
    }
}

pub struct World {
    config: WorldConfig,
    bodies: SlotMap<BodyHandle, Body>,
    constraints: SlotMap<ConstraintHandle, Constraint>,
    springs: SlotMap<SpringHandle, Spring>,
    pub materials: MaterialTable,
    broadphase: Box<dyn Broadphase>,
    narrowphase: Narrowphase,
    pub solver: GsSolver,
    pub events: WorldEvents,

    // -- Per-step state --
    pairs: Vec<(BodyHandle, BodyHandle)>,
    contacts: NarrowphaseResult,
    body_overlaps: OverlapKeeper<BodyHandle>,
    shape_overlaps: OverlapKeeper<ShapeKey>,
    solver_bodies: Vec<SolverBody>,
    equations: Vec<Equation>,
    solved_constraints: Vec<ConstraintHandle>,
    pending_added: Vec<BodyHandle>,
    ray_workspace: RayWorkspace,
    event_scratch: EventScratch,
    last_iterations: usize,
    profile: StepProfile,

    // -- Time --
    time: f32,
    dt: f32,
    accumulator: f32,
    step_number: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let broadphase = config.broadphase.build(config.use_bounding_boxes);
        let solver = GsSolver::new(config.solver_iterations, config.solver_tolerance);
        let materials = MaterialTable::new(config.default_contact_material);
        Self {
            config,
            bodies: SlotMap::with_key(),
            constraints: SlotMap::with_key(),
            springs: SlotMap::with_key(),
            materials,
            broadphase,
            narrowphase: Narrowphase::new(),
            solver,
            events: WorldEvents::default(),
            pairs: Vec::new(),
            contacts: NarrowphaseResult::default(),
            body_overlaps: OverlapKeeper::new(),
            shape_overlaps: OverlapKeeper::new(),
            solver_bodies: Vec::new(),
            equations: Vec::new(),
            solved_constraints: Vec::new(),
            pending_added: Vec::new(),
            ray_workspace: RayWorkspace::default(),
            event_scratch: EventScratch::default(),
            last_iterations: 0,
            profile: StepProfile::new(),
            time: 0.0,
            dt: 0.0,
            accumulator: 0.0,
            step_number: 0,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vector3<f32> {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.config.gravity = gravity;
    }

    pub fn set_allow_sleep(&mut self, allow: bool) {
        self.config.allow_sleep = allow;
    }

    /// Replace the broadphase.
    pub fn set_broadphase(&mut self, broadphase: Box<dyn Broadphase>) {
        self.broadphase = broadphase;
    }

    // -- Bodies --

    /// Add a body. Its current pose becomes its initial, previous and
    /// interpolated pose. An `add_body` event fires at the next step.
    pub fn add_body(&mut self, mut body: Body) -> BodyHandle {
        body.previous_position = body.position;
        body.previous_orientation = body.orientation;
        body.interpolated_position = body.position;
        body.interpolated_orientation = body.orientation;
        body.initial_position = body.position;
        body.initial_orientation = body.orientation;
        body.initial_velocity = body.velocity;
        body.initial_angular_velocity = body.angular_velocity;
        body.update_inertia_world();
        let handle = self.bodies.insert(body);
        self.pending_added.push(handle);
        debug!("added body {:?} ({} bodies)", handle, self.bodies.len());
        handle
    }

    /// Remove a body along with the constraints and springs attached to it.
    /// Returns `false` if the handle is stale.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        if self.bodies.remove(handle).is_none() {
            return false;
        }
        self.constraints.retain(|id, c| {
            let keep = c.body_a != handle && c.body_b != handle;
            if !keep {
                debug!("removed constraint {:?} with its body", id);
            }
            keep
        });
        self.springs.retain(|_, s| s.body_a != handle && s.body_b != handle);
        self.body_overlaps.forget(|&b| b == handle);
        self.shape_overlaps.forget(|k| k.body == handle);
        self.pending_added.retain(|&h| h != handle);
        debug!("removed body {:?} ({} bodies)", handle, self.bodies.len());

        let mut events = core::mem::take(&mut self.events);
        events.remove_body.emit(self, &BodyEvent { body: handle });
        self.events = events;
        true
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = (BodyHandle, &mut Body)> {
        self.bodies.iter_mut()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub(crate) fn body_map(&self) -> &SlotMap<BodyHandle, Body> {
        &self.bodies
    }

    /// `true` if any dynamic body is awake.
    pub fn has_active_bodies(&self) -> bool {
        self.bodies
            .values()
            .any(|b| b.body_type() == BodyType::Dynamic && b.sleep_state() != SleepState::Sleeping)
    }

    // -- Constraints and springs --

    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintHandle {
        self.constraints.insert(constraint)
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.constraints.get(handle)
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.constraints.get_mut(handle)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> bool {
        self.constraints.remove(handle).is_some()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn add_spring(&mut self, spring: Spring) -> SpringHandle {
        self.springs.insert(spring)
    }

    pub fn spring(&self, handle: SpringHandle) -> Option<&Spring> {
        self.springs.get(handle)
    }

    pub fn spring_mut(&mut self, handle: SpringHandle) -> Option<&mut Spring> {
        self.springs.get_mut(handle)
    }

    pub fn remove_spring(&mut self, handle: SpringHandle) -> bool {
        self.springs.remove(handle).is_some()
    }

    // -- Materials --

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.add_material(material)
    }

    pub fn add_contact_material(&mut self, a: MaterialId, b: MaterialId, contact: ContactMaterial) {
        self.materials.add_contact_material(a, b, contact);
    }

    // -- Step results --

    /// Simulated time in seconds.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Size of the last tick.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn step_number(&self) -> u64 {
        self.step_number
    }

    /// Time carried over by [`World::fixed_step`] into the next call.
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Contacts of the last tick.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts.contacts
    }

    pub fn contact_equations(&self) -> &[Equation] {
        &self.contacts.contact_equations
    }

    pub fn friction_equations(&self) -> &[Equation] {
        &self.contacts.friction_equations
    }

    /// `true` if the two bodies touched during the last tick.
    pub fn in_contact(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.body_overlaps.contains(a, b)
    }

    /// Solver sweeps used by the last tick.
    pub fn solver_iterations_used(&self) -> usize {
        self.last_iterations
    }

    /// Phase timings of the last tick, when profiling is enabled.
    pub fn profile(&self) -> Option<&StepProfile> {
        self.config.profiling.then_some(&self.profile)
    }

    // -- Stepping --

    /// Advance by exactly one tick of `dt` seconds. A non-positive or
    /// non-finite `dt` does nothing. Interpolated poses are set to the new
    /// poses.
    pub fn step(&mut self, dt: f32) {
        if !(dt > 0.0 && dt.is_finite()) {
            return;
        }
        self.internal_step(dt);
        for body in self.bodies.values_mut() {
            body.interpolated_position = body.position;
            body.interpolated_orientation = body.orientation;
        }
    }

    /// Advance in ticks of `fixed_dt` to catch up with `real_elapsed` seconds
    /// of wall-clock time, running at most `max_substeps` ticks. The leftover
    /// time is kept for the next call and used to interpolate body poses
    /// between the last two ticks. Returns the number of ticks run.
    pub fn fixed_step(&mut self, fixed_dt: f32, real_elapsed: f32, max_substeps: usize) -> usize {
        if !(fixed_dt > 0.0 && fixed_dt.is_finite()) {
            return 0;
        }
        self.accumulator += real_elapsed.max(0.0);
        let mut substeps = 0;
        while self.accumulator >= fixed_dt && substeps < max_substeps {
            self.internal_step(fixed_dt);
            self.accumulator -= fixed_dt;
            substeps += 1;
        }
        if self.accumulator >= fixed_dt {
            warn!(
                "fixed_step hit max_substeps ({}), dropping {:.4} s of accumulated time",
                max_substeps,
                self.accumulator - self.accumulator % fixed_dt
            );
        }
        self.accumulator %= fixed_dt;

        let t = self.accumulator / fixed_dt;
        for body in self.bodies.values_mut() {
            body.interpolated_position = body.previous_position.lerp(&body.position, t);
            body.interpolated_orientation = slerp(&body.previous_orientation, &body.orientation, t);
        }
        substeps
    }

    fn internal_step(&mut self, dt: f32) {
        let mut timer = PhaseTimer::start(self.config.profiling);
        let mut events = core::mem::take(&mut self.events);

        for handle in core::mem::take(&mut self.pending_added) {
            events.add_body.emit(self, &BodyEvent { body: handle });
        }
        events.pre_step.emit(
            self,
            &StepEvent {
                dt,
                time: self.time,
                step_number: self.step_number,
            },
        );

        for (i, body) in self.bodies.values_mut().enumerate() {
            body.index = i;
        }

        // 1. External forces
        let gravity = self.config.gravity;
        for body in self.bodies.values_mut() {
            if body.body_type() == BodyType::Dynamic {
                body.force += gravity * body.mass();
            }
        }
        for spring in self.springs.values() {
            if let Some([a, b]) = self.bodies.get_disjoint_mut([spring.body_a, spring.body_b]) {
                spring.apply(a, b);
            }
        }
        timer.discard();

        // 2. Broadphase
        self.pairs.clear();
        self.broadphase.collision_pairs(&self.bodies, &mut self.pairs);

        // 3. Constraints that disable collision between their bodies
        if self.constraints.values().any(|c| !c.collide_connected) {
            let constraints = &self.constraints;
            self.pairs.retain(|&(a, b)| {
                !constraints.values().any(|c| {
                    !c.collide_connected && ((c.body_a == a && c.body_b == b) || (c.body_a == b && c.body_b == a))
                })
            });
        }
        timer.lap(&mut self.profile, StepPhase::Broadphase);

        // 4-5. Narrowphase
        self.body_overlaps.tick();
        self.shape_overlaps.tick();
        self.contacts.clear();
        let params = ContactParams {
            dt,
            frictional_gravity: self.config.effective_frictional_gravity(),
        };
        self.narrowphase
            .get_contacts(&self.pairs, &self.bodies, &self.materials, &params, &mut self.contacts);

        for c in &self.contacts.contacts {
            self.body_overlaps.set(c.body_a, c.body_b);
            self.shape_overlaps.set(
                ShapeKey {
                    body: c.body_a,
                    shape: c.shape_a,
                },
                ShapeKey {
                    body: c.body_b,
                    shape: c.shape_b,
                },
            );
        }
        for &(ha, hb) in self.body_overlaps.current() {
            if let Some([a, b]) = self.bodies.get_disjoint_mut([ha, hb]) {
                flag_wake_by_contact(a, b);
                flag_wake_by_contact(b, a);
            }
        }
        for body in self.bodies.values_mut() {
            if body.wake_up_after_narrowphase {
                body.wake_up();
            }
        }
        trace!(
            "step {}: {} pairs, {} contacts",
            self.step_number,
            self.pairs.len(),
            self.contacts.contacts.len()
        );
        timer.lap(&mut self.profile, StepPhase::Narrowphase);

        // 6. Solve
        self.solve(dt);
        timer.lap(&mut self.profile, StepPhase::Solve);

        // 7. Damping, integration
        let fast = self.config.quat_normalize_fast;
        for body in self.bodies.values_mut() {
            body.apply_damping(dt);
            body.integrate(dt, fast);
            body.clear_forces();
        }
        timer.lap(&mut self.profile, StepPhase::Integrate);

        // 8. Time and sleep
        self.time += dt;
        self.dt = dt;
        self.step_number += 1;
        let mut scratch = core::mem::take(&mut self.event_scratch);
        scratch.clear();
        if self.config.allow_sleep {
            for (handle, body) in self.bodies.iter_mut() {
                if let Some(transition) = body.sleep_tick(self.time) {
                    scratch.sleep.push(SleepEvent {
                        body: handle,
                        transition,
                    });
                }
            }
        }
        for (handle, body) in self.bodies.iter_mut() {
            if body.pending_wakeup {
                body.pending_wakeup = false;
                scratch.sleep.push(SleepEvent {
                    body: handle,
                    transition: SleepTransition::Wakeup,
                });
            }
        }
        if self.config.profiling {
            self.profile.ticks += 1;
        }

        // 9. Events
        self.body_overlaps.diff(&mut scratch.began_bodies, &mut scratch.ended_bodies);
        self.shape_overlaps.diff(&mut scratch.began_shapes, &mut scratch.ended_shapes);
        self.dispatch_contact_events(&mut events, &scratch);
        for e in &scratch.sleep {
            events.sleep.emit(self, e);
        }
        events.post_step.emit(
            self,
            &StepEvent {
                dt,
                time: self.time,
                step_number: self.step_number,
            },
        );
        self.events = events;
        self.event_scratch = scratch;
    }

    fn solve(&mut self, dt: f32) {
        self.solver_bodies.clear();
        self.solver_bodies.extend(self.bodies.values().map(SolverBody::from_body));

        self.equations.clear();
        self.equations.extend_from_slice(&self.contacts.friction_equations);
        self.equations.extend_from_slice(&self.contacts.contact_equations);

        self.solved_constraints.clear();
        for (handle, c) in self.constraints.iter_mut() {
            if !c.enabled {
                continue;
            }
            let (Some(a), Some(b)) = (self.bodies.get(c.body_a), self.bodies.get(c.body_b)) else {
                continue;
            };
            c.update(a, b, dt);
            self.equations.extend_from_slice(c.equations());
            self.solved_constraints.push(handle);
        }

        self.last_iterations = self.solver.solve(dt, &mut self.solver_bodies, &mut self.equations);
        trace!(
            "solved {} equations in {} iterations",
            self.equations.len(),
            self.last_iterations
        );

        for (solved, body) in self.solver_bodies.iter().zip(self.bodies.values_mut()) {
            solved.write_back(body);
        }

        let mut solved = self.equations.iter();
        for eq in self
            .contacts
            .friction_equations
            .iter_mut()
            .chain(self.contacts.contact_equations.iter_mut())
        {
            if let Some(s) = solved.next() {
                eq.multiplier = s.multiplier;
            }
        }
        for &handle in &self.solved_constraints {
            if let Some(c) = self.constraints.get_mut(handle) {
                for eq in c.equations_mut() {
                    if let Some(s) = solved.next() {
                        eq.multiplier = s.multiplier;
                    }
                }
            }
        }
    }

    fn dispatch_contact_events(&self, events: &mut WorldEvents, changes: &EventScratch) {
        for contact in &self.contacts.contacts {
            let normal_force = contact
                .equation
                .and_then(|i| self.contacts.contact_equations.get(i))
                .map_or(0.0, |eq| eq.multiplier);
            events.collide.emit(
                self,
                &CollideEvent {
                    contact: *contact,
                    normal_force,
                },
            );
        }

        for &(body_a, body_b) in &changes.began_bodies {
            events.begin_contact.emit(self, &ContactEvent { body_a, body_b });
        }
        for &(body_a, body_b) in &changes.ended_bodies {
            events.end_contact.emit(self, &ContactEvent { body_a, body_b });
        }

        let shape_event = |(a, b): (ShapeKey, ShapeKey)| ShapeContactEvent {
            body_a: a.body,
            shape_a: a.shape,
            body_b: b.body,
            shape_b: b.shape,
        };
        for &pair in &changes.began_shapes {
            events.begin_shape_contact.emit(self, &shape_event(pair));
        }
        for &pair in &changes.ended_shapes {
            events.end_shape_contact.emit(self, &shape_event(pair));
        }
    }

    // -- Raycasting --

    /// Nearest hit along the segment `from → to`.
    pub fn raycast_closest(
        &mut self,
        from: Vector3<f32>,
        to: Vector3<f32>,
        options: &RayOptions,
        result: &mut RaycastResult,
    ) -> bool {
        self.cast_segment(from, to, RayMode::Closest, options, result, None)
    }

    /// Any hit along the segment, stopping at the first one found.
    pub fn raycast_any(
        &mut self,
        from: Vector3<f32>,
        to: Vector3<f32>,
        options: &RayOptions,
        result: &mut RaycastResult,
    ) -> bool {
        self.cast_segment(from, to, RayMode::Any, options, result, None)
    }

    /// Every hit along the segment. `callback` may call
    /// [`RaycastResult::abort`] to stop early.
    pub fn raycast_all(
        &mut self,
        from: Vector3<f32>,
        to: Vector3<f32>,
        options: &RayOptions,
        mut callback: impl FnMut(&mut RaycastResult),
    ) -> bool {
        let mut result = RaycastResult::default();
        self.cast_segment(from, to, RayMode::All, options, &mut result, Some(&mut callback))
    }

    fn cast_segment(
        &mut self,
        from: Vector3<f32>,
        to: Vector3<f32>,
        mode: RayMode,
        options: &RayOptions,
        result: &mut RaycastResult,
        callback: Option<&mut dyn FnMut(&mut RaycastResult)>,
    ) -> bool {
        let segment = Segment {
            from,
            to,
            mode,
            options: *options,
        };
        raycast::cast(
            &segment,
            &self.bodies,
            self.broadphase.as_ref(),
            &mut self.ray_workspace,
            result,
            callback,
        )
    }

    pub(crate) fn broadphase(&self) -> &dyn Broadphase {
        self.broadphase.as_ref()
    }
}

/// Mark `sleeper` to wake if `other` hit it faster than its own sleep limit
/// allows.
fn flag_wake_by_contact(sleeper: &mut Body, other: &Body) {
    if sleeper.allow_sleep
        && sleeper.body_type() == BodyType::Dynamic
        && sleeper.sleep_state() == SleepState::Sleeping
        && other.sleep_state() == SleepState::Awake
        && other.body_type() != BodyType::Static
    {
        let speed_squared = other.velocity.norm_squared() + other.angular_velocity.norm_squared();
        let limit_squared = other.sleep_speed_limit * other.sleep_speed_limit;
        if speed_squared >= 2.0 * limit_squared {
            sleeper.wake_up_after_narrowphase = true;
        }
    }
}
