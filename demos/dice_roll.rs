//! Dice roll demo
//!
//! Throws three dice onto a felt-covered table and prints their poses at a
//! 30 Hz "render" rate while the physics runs at a fixed 60 Hz. Stops once
//! every die has fallen asleep and reports the face each one landed on.

use core::f32::consts::FRAC_PI_2;

use nalgebra::{UnitQuaternion, Vector3};
use rigid3d::prelude::*;

const PHYSICS_DT: f32 = 1.0 / 60.0;
const FRAME_DT: f32 = 1.0 / 30.0;
const MAX_FRAMES: usize = 600;

/// Face normals of a die in its local frame, with the pip count on each.
const FACES: [([f32; 3], u8); 6] = [
    ([0.0, 1.0, 0.0], 1),
    ([0.0, -1.0, 0.0], 6),
    ([1.0, 0.0, 0.0], 2),
    ([-1.0, 0.0, 0.0], 5),
    ([0.0, 0.0, 1.0], 3),
    ([0.0, 0.0, -1.0], 4),
];

fn top_face(orientation: &UnitQuaternion<f32>) -> u8 {
    let up = |n: &[f32; 3]| (orientation * Vector3::from(*n)).y;
    FACES
        .iter()
        .max_by(|(a, _), (b, _)| up(a).total_cmp(&up(b)))
        .map_or(0, |(_, pips)| *pips)
}

fn main() {
    let mut world = World::with_config(
        WorldConfig::default()
            .with_gravity(Vector3::new(0.0, -9.82, 0.0))
            .with_allow_sleep(true)
            .with_broadphase(BroadphaseKind::SweepAndPrune { axis: None }),
    );

    let felt = world.add_material(Material::new("felt"));
    let plastic = world.add_material(Material::new("plastic"));
    world.add_contact_material(
        felt,
        plastic,
        ContactMaterial::default().with_friction(0.6).with_restitution(0.3),
    );
    world.add_contact_material(
        plastic,
        plastic,
        ContactMaterial::default().with_friction(0.2).with_restitution(0.5),
    );

    world.add_body(
        Body::new_static()
            .with_shape(Shape::plane())
            .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2))
            .with_material(felt),
    );

    let throws = [
        (Vector3::new(-1.5, 3.0, 0.0), Vector3::new(2.0, 0.0, -0.5), Vector3::new(4.0, 1.0, 7.0)),
        (Vector3::new(0.0, 4.0, 0.5), Vector3::new(0.5, -1.0, 0.0), Vector3::new(-6.0, 3.0, 2.0)),
        (Vector3::new(1.5, 3.5, -0.5), Vector3::new(-1.5, 0.0, 0.8), Vector3::new(1.0, -8.0, 4.0)),
    ];
    let dice: Vec<BodyHandle> = throws
        .iter()
        .map(|(position, velocity, spin)| {
            world.add_body(
                Body::new(0.03)
                    .with_shape(Shape::cuboid(Vector3::repeat(0.5)))
                    .with_position(*position)
                    .with_velocity(*velocity)
                    .with_angular_velocity(*spin)
                    .with_damping(0.1, 0.1)
                    .with_material(plastic),
            )
        })
        .collect();

    world.events.sleep.add(|_, e| println!("  {:?} -> {:?}", e.body, e.transition));

    for frame in 0..MAX_FRAMES {
        world.fixed_step(PHYSICS_DT, FRAME_DT, 5);

        if frame % 6 == 0 {
            println!("t = {:5.2}s", world.time());
            for (i, &die) in dice.iter().enumerate() {
                if let Some(body) = world.body(die) {
                    let p = body.interpolated_position;
                    println!("  die {}: ({:6.2}, {:6.2}, {:6.2})", i, p.x, p.y, p.z);
                }
            }
        }

        if !world.has_active_bodies() {
            println!("all dice at rest after {:.2}s", world.time());
            break;
        }
    }

    for (i, &die) in dice.iter().enumerate() {
        if let Some(body) = world.body(die) {
            println!("die {} shows {}", i, top_face(&body.orientation));
        }
    }
}
