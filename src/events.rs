//! Typed listener registries for world events.
//!
//! Listeners run synchronously inside [`World::step`](crate::world::World::step)
//! and receive the world by shared reference, so they can inspect bodies and
//! contacts but not add or remove them.
//!
//! # Example
//! ```
//! use rigid3d::world::World;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let mut world = World::new();
//! let steps = Rc::new(Cell::new(0));
//! let counter = steps.clone();
//! world.events.post_step.add(move |_, _| counter.set(counter.get() + 1));
//! world.step(1.0 / 60.0);
//! assert_eq!(steps.get(), 1);
//! ```

use core::fmt;

use crate::body::SleepTransition;
use crate::narrowphase::Contact;
use crate::world::{BodyHandle, World};

/// Returned by [`Registry::add`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Box<dyn FnMut(&World, &E)>;

/// Listeners for one event type, called in registration order.
pub struct Registry<E> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<E>)>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<E> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Registry<E> {
    pub fn add(&mut self, listener: impl FnMut(&World, &E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered here.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn emit(&mut self, world: &World, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(world, event);
        }
    }
}

/// A contact produced this step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollideEvent {
    pub contact: Contact,
    /// Force the solver applied along the contact normal, zero for contacts
    /// that are not solved.
    pub normal_force: f32,
}

/// Two bodies started or stopped touching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}

/// Two shapes started or stopped touching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeContactEvent {
    pub body_a: BodyHandle,
    pub shape_a: usize,
    pub body_b: BodyHandle,
    pub shape_b: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyEvent {
    pub body: BodyHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepEvent {
    pub body: BodyHandle,
    pub transition: SleepTransition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub dt: f32,
    /// Simulated time, after the step for `post_step`.
    pub time: f32,
    pub step_number: u64,
}

/// Every registry a world dispatches to.
#[derive(Debug, Default)]
pub struct WorldEvents {
    pub collide: Registry<CollideEvent>,
    pub begin_contact: Registry<ContactEvent>,
    pub end_contact: Registry<ContactEvent>,
    pub begin_shape_contact: Registry<ShapeContactEvent>,
    pub end_shape_contact: Registry<ShapeContactEvent>,
    pub pre_step: Registry<StepEvent>,
    pub post_step: Registry<StepEvent>,
    pub add_body: Registry<BodyEvent>,
    pub remove_body: Registry<BodyEvent>,
    /// Body `sleepy`, `sleep` and `wakeup` transitions.
    pub sleep: Registry<SleepEvent>,
}
