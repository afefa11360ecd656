//! Rigid-body physics for small interactive scenes.
//!
//! Bodies made of spheres, planes, boxes, convex hulls, cylinders,
//! heightfields and triangle meshes are stepped with a fixed-iteration
//! Gauss–Seidel solver over SPOOK-regularized contact, friction and joint
//! equations.
//!
//! # Example
//! ```
//! use rigid3d::prelude::*;
//! use nalgebra::{UnitQuaternion, Vector3};
//!
//! let mut world = World::with_config(
//!     WorldConfig::default()
//!         .with_gravity(Vector3::new(0.0, -9.82, 0.0))
//!         .with_allow_sleep(true),
//! );
//! world.add_body(
//!     Body::new_static()
//!         .with_shape(Shape::plane())
//!         .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -core::f32::consts::FRAC_PI_2)),
//! );
//! let die = world.add_body(
//!     Body::new(1.0)
//!         .with_shape(Shape::cuboid(Vector3::repeat(0.5)))
//!         .with_position(Vector3::new(0.0, 3.0, 0.0)),
//! );
//!
//! // Render at whatever rate is convenient; physics runs at 60 Hz.
//! world.fixed_step(1.0 / 60.0, 0.1, 10);
//! let pose = world.body(die).unwrap().interpolated_position;
//! assert!(pose.y < 3.0);
//! ```

pub mod aabb;
pub mod body;
pub mod broadphase;
pub mod config;
pub mod constraint;
pub mod equation;
pub mod error;
pub mod events;
pub mod material;
pub mod math;
pub mod narrowphase;
pub mod overlap;
pub mod profile;
pub mod raycast;
pub mod shape;
pub mod solver;
pub mod spring;
pub mod world;

/// The types most scenes need.
pub mod prelude {
    pub use crate::body::{Body, BodyType, SleepState};
    pub use crate::broadphase::BroadphaseKind;
    pub use crate::config::WorldConfig;
    pub use crate::constraint::Constraint;
    pub use crate::material::{ContactMaterial, Material, MaterialId};
    pub use crate::raycast::{RayMode, RayOptions, RaycastResult};
    pub use crate::shape::{Heightfield, Shape, Trimesh};
    pub use crate::spring::Spring;
    pub use crate::world::{BodyHandle, World};
}
