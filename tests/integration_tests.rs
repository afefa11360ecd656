//! Integration tests for rigid3d
//! These tests drive whole worlds through many steps and check the
//! observable physical behavior.

use core::f32::consts::FRAC_PI_2;
use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector3};
use rigid3d::body::SleepTransition;
use rigid3d::narrowphase::{collide_shapes, CollisionWorkspace, ShapePose};
use rigid3d::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn ground() -> Body {
    Body::new_static()
        .with_shape(Shape::plane())
        .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2))
}

fn gravity_config() -> WorldConfig {
    WorldConfig::default().with_gravity(Vector3::new(0.0, -9.82, 0.0))
}

// -- Conservation --

#[test]
fn test_free_body_keeps_its_velocity() {
    let mut world = World::new();
    let h = world.add_body(
        Body::new(2.0)
            .with_shape(Shape::cuboid(Vector3::new(0.5, 0.2, 0.1)))
            .with_damping(0.0, 0.0)
            .with_velocity(Vector3::new(1.0, -2.0, 0.5))
            .with_angular_velocity(Vector3::new(0.0, 3.0, 0.0)),
    );
    for _ in 0..120 {
        world.step(DT);
    }
    let body = world.body(h).unwrap();
    assert!((body.velocity - Vector3::new(1.0, -2.0, 0.5)).norm() < 1e-5);
    assert!((body.angular_velocity - Vector3::new(0.0, 3.0, 0.0)).norm() < 1e-5);
    assert!((body.position - Vector3::new(2.0, -4.0, 1.0)).norm() < 1e-3);
}

// -- Resting contact --

#[test]
fn test_box_comes_to_rest_on_plane() {
    let config = gravity_config()
        .with_default_contact_material(ContactMaterial::default().with_friction(0.8).with_restitution(0.0));
    let mut world = World::with_config(config);
    world.add_body(ground());
    let die = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::cuboid(Vector3::repeat(0.5)))
            .with_position(Vector3::new(0.0, 4.0, 0.0)),
    );

    for _ in 0..180 {
        world.step(DT);
    }

    let body = world.body(die).unwrap();
    assert!((body.position.y - 0.5).abs() < 1e-2, "y = {}", body.position.y);
    assert!(body.velocity.norm() < body.sleep_speed_limit);
}

#[test]
fn test_sap_and_naive_agree() {
    let build = |kind: BroadphaseKind| {
        let mut world = World::with_config(gravity_config().with_broadphase(kind));
        world.add_body(ground());
        for i in 0..4 {
            world.add_body(
                Body::new(1.0)
                    .with_shape(Shape::sphere(0.5))
                    .with_position(Vector3::new(i as f32 * 0.9, 0.5 + i as f32 * 0.2, 0.0)),
            );
        }
        world
    };
    let mut naive = build(BroadphaseKind::Naive);
    let mut sap = build(BroadphaseKind::SweepAndPrune { axis: None });
    for _ in 0..30 {
        naive.step(DT);
        sap.step(DT);
    }
    let positions = |w: &World| w.bodies().map(|(_, b)| b.position).collect::<Vec<_>>();
    for (a, b) in positions(&naive).iter().zip(positions(&sap).iter()) {
        assert!((a - b).norm() < 1e-5);
    }
}

// -- Sleep --

#[test]
fn test_sleep_and_wake_cycle() {
    let mut world = World::with_config(WorldConfig::default().with_allow_sleep(true));
    let h = world.add_body(Body::new(1.0).with_shape(Shape::sphere(0.5)).with_sleep_limits(0.1, 0.5));

    let transitions = Rc::new(RefCell::new(Vec::new()));
    let log = transitions.clone();
    world.events.sleep.add(move |_, e| log.borrow_mut().push(e.transition));

    world.step(DT);
    assert_eq!(world.body(h).unwrap().sleep_state(), SleepState::Sleepy);
    for _ in 0..60 {
        world.step(DT);
    }
    assert_eq!(world.body(h).unwrap().sleep_state(), SleepState::Sleeping);

    world
        .body_mut(h)
        .unwrap()
        .apply_impulse(&Vector3::new(1.0, 0.0, 0.0), &Vector3::zeros());
    world.step(DT);
    assert_eq!(world.body(h).unwrap().sleep_state(), SleepState::Awake);
    assert!(world.body(h).unwrap().position.x > 0.0);

    assert_eq!(
        *transitions.borrow(),
        vec![SleepTransition::Sleepy, SleepTransition::Sleep, SleepTransition::Wakeup]
    );
}

#[test]
fn test_sleeping_body_woken_by_impact() {
    let mut world = World::with_config(gravity_config().with_allow_sleep(true));
    world.add_body(ground());
    let resting = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(0.5))
            .with_position(Vector3::new(0.0, 0.5, 0.0)),
    );
    world.body_mut(resting).unwrap().sleep();

    world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(0.5))
            .with_position(Vector3::new(-3.0, 0.5, 0.0))
            .with_velocity(Vector3::new(10.0, 0.0, 0.0))
            .with_allow_sleep(false),
    );

    let mut woke = false;
    for _ in 0..30 {
        world.step(DT);
        if world.body(resting).unwrap().sleep_state() != SleepState::Sleeping {
            woke = true;
            break;
        }
    }
    assert!(woke);
}

// -- Contacts --

#[test]
fn test_contact_pair_symmetry() {
    let cube = Shape::cuboid(Vector3::repeat(0.5));
    let ball = Shape::sphere(0.5);
    let a = ShapePose::new(&cube, Vector3::zeros(), UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3));
    let b = ShapePose::new(&ball, Vector3::new(0.0, 0.9, 0.1), UnitQuaternion::identity());

    let mut workspace = CollisionWorkspace::default();
    let (mut ab, mut ba) = (Vec::new(), Vec::new());
    assert_eq!(collide_shapes(&a, &b, &mut workspace, &mut ab), 1);
    assert_eq!(collide_shapes(&b, &a, &mut workspace, &mut ba), 1);

    assert!((ab[0].normal + ba[0].normal).norm() < 1e-5);
    assert!((ab[0].penetration() - ba[0].penetration()).abs() < 1e-5);
}

#[test]
fn test_disjoint_filters_never_collide() {
    let mut world = World::new();
    let a = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(1.0))
            .with_collision_filter(1, 1),
    );
    let b = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(1.0))
            .with_position(Vector3::new(0.5, 0.0, 0.0))
            .with_collision_filter(2, 2),
    );
    for _ in 0..10 {
        world.step(DT);
        assert!(world.contacts().is_empty());
    }
    assert!(!world.in_contact(a, b));
    assert_eq!(world.body(b).unwrap().position, Vector3::new(0.5, 0.0, 0.0));
}

#[test]
fn test_trigger_reports_without_pushing() {
    let mut world = World::new();
    world.add_body(
        Body::new_static()
            .with_shape(Shape::cuboid(Vector3::repeat(1.0)))
            .with_collision_response(false),
    );
    let ball = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(0.25))
            .with_position(Vector3::new(-2.0, 0.0, 0.0))
            .with_velocity(Vector3::new(3.0, 0.0, 0.0))
            .with_damping(0.0, 0.0),
    );
    let hits = Rc::new(RefCell::new(0));
    let counter = hits.clone();
    world.events.begin_contact.add(move |_, _| *counter.borrow_mut() += 1);

    // Ends with the ball's center inside the box, past its entry face
    for _ in 0..30 {
        world.step(DT);
    }
    assert_eq!(*hits.borrow(), 1);
    assert!((world.body(ball).unwrap().velocity.x - 3.0).abs() < 1e-5);
}

#[test]
fn test_shape_contact_events_follow_the_touched_shape() {
    let mut world = World::new();
    let table = world.add_body(
        Body::new_static()
            .with_shape_at(Shape::cuboid(Vector3::repeat(0.5)), Vector3::new(-1.0, 0.0, 0.0), UnitQuaternion::identity())
            .with_shape_at(Shape::cuboid(Vector3::repeat(0.5)), Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity()),
    );
    let ball = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(0.5))
            .with_position(Vector3::new(1.0, 0.0, 0.95)),
    );

    let log: Rc<RefCell<Vec<(&'static str, usize)>>> = Rc::new(RefCell::new(Vec::new()));
    let table_shape = move |e: &rigid3d::events::ShapeContactEvent| {
        if e.body_a == table {
            e.shape_a
        } else {
            e.shape_b
        }
    };
    let l = log.clone();
    world.events.begin_contact.add(move |_, _| l.borrow_mut().push(("begin", usize::MAX)));
    let l = log.clone();
    world.events.end_contact.add(move |_, _| l.borrow_mut().push(("end", usize::MAX)));
    let l = log.clone();
    world
        .events
        .begin_shape_contact
        .add(move |_, e| l.borrow_mut().push(("begin_shape", table_shape(e))));
    let l = log.clone();
    world
        .events
        .end_shape_contact
        .add(move |_, e| l.borrow_mut().push(("end_shape", table_shape(e))));

    let place = |world: &mut World, x: f32| {
        let body = world.body_mut(ball).unwrap();
        body.position = Vector3::new(x, 0.0, 0.95);
        body.velocity = Vector3::zeros();
    };

    // Lands on the right-hand box
    world.step(DT);
    assert_eq!(*log.borrow(), vec![("begin", usize::MAX), ("begin_shape", 1)]);
    log.borrow_mut().clear();

    // Slides over to the left-hand box: the bodies stay in contact
    place(&mut world, -1.0);
    world.step(DT);
    assert_eq!(*log.borrow(), vec![("begin_shape", 0), ("end_shape", 1)]);
    log.borrow_mut().clear();

    // Lifted clear of the table
    place(&mut world, 10.0);
    world.step(DT);
    assert_eq!(*log.borrow(), vec![("end", usize::MAX), ("end_shape", 0)]);
    assert!(!world.in_contact(table, ball));
}

// -- Terrain --

#[test]
fn test_sphere_rests_on_heightfield() {
    let mut world = World::with_config(WorldConfig::default().with_gravity(Vector3::new(0.0, 0.0, -9.82)));
    let field = world.add_body(
        Body::new_static().with_shape(Shape::heightfield(Heightfield::new(vec![vec![0.0; 5]; 5], 1.0).unwrap())),
    );
    // Inside the lower triangle of cell (1, 1), away from its edges
    let ball = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(0.5))
            .with_position(Vector3::new(1.25, 1.3, 2.0)),
    );

    let mut touched = false;
    for _ in 0..180 {
        world.step(DT);
        touched |= world.in_contact(field, ball);
    }
    assert!(touched);
    let body = world.body(ball).unwrap();
    assert!((body.position.z - 0.5).abs() < 2e-2, "z = {}", body.position.z);
    assert!(body.velocity.norm() < 0.1);
}

#[test]
fn test_sphere_rests_on_trimesh() {
    let mesh = Trimesh::new(
        vec![
            Vector3::new(-5.0, -5.0, 0.0),
            Vector3::new(5.0, -5.0, 0.0),
            Vector3::new(5.0, 5.0, 0.0),
            Vector3::new(-5.0, 5.0, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    )
    .unwrap();
    let mut world = World::with_config(WorldConfig::default().with_gravity(Vector3::new(0.0, 0.0, -9.82)));
    let floor = world.add_body(Body::new_static().with_shape(Shape::trimesh(mesh)));
    let ball = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(1.0))
            .with_position(Vector3::new(2.0, -2.0, 3.0)),
    );

    for _ in 0..180 {
        world.step(DT);
    }
    assert!(world.in_contact(floor, ball));
    let z = world.body(ball).unwrap().position.z;
    assert!((z - 1.0).abs() < 2e-2, "z = {}", z);
}

// -- Integration --

#[test]
fn test_fast_quaternion_normalization_tracks_exact() {
    let spin = |fast: bool| {
        let mut world = World::with_config(WorldConfig::default().with_quat_normalize_fast(fast));
        let h = world.add_body(
            Body::new(1.0)
                .with_shape(Shape::cuboid(Vector3::new(0.5, 0.3, 0.2)))
                .with_damping(0.0, 0.0)
                .with_angular_velocity(Vector3::new(1.0, 2.0, 3.0)),
        );
        for _ in 0..240 {
            world.step(DT);
        }
        world.body(h).unwrap().orientation
    };
    let fast = spin(true);
    let exact = spin(false);
    assert!((fast.quaternion().norm() - 1.0).abs() < 1e-3);
    assert!(fast.angle_to(&exact) < 1e-2, "angle {}", fast.angle_to(&exact));
}

// -- Raycasting --

#[test]
fn test_raycast_distance_is_exact() {
    let mut world = World::new();
    let target = world.add_body(
        Body::new_static()
            .with_shape(Shape::sphere(1.5))
            .with_position(Vector3::new(0.0, 2.0, 0.0)),
    );
    let from = Vector3::new(0.0, 2.0, 10.0);
    let mut result = RaycastResult::default();
    assert!(world.raycast_closest(from, Vector3::new(0.0, 2.0, -10.0), &RayOptions::default(), &mut result));
    assert_eq!(result.body, Some(target));
    assert!((result.distance - 8.5).abs() < 1e-5);

    // Closest approach 1.6 > radius
    assert!(!world.raycast_closest(
        Vector3::new(1.6, 2.0, 10.0),
        Vector3::new(1.6, 2.0, -10.0),
        &RayOptions::default(),
        &mut result,
    ));
}

// -- Stepping --

#[test]
fn test_zero_dt_leaves_poses_unchanged() {
    let mut world = World::with_config(gravity_config());
    let h = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::cuboid(Vector3::repeat(0.5)))
            .with_position(Vector3::new(1.0, 2.0, 3.0))
            .with_angular_velocity(Vector3::new(1.0, 0.0, 0.0)),
    );
    let before = world.body(h).unwrap().clone();
    world.step(0.0);
    let after = world.body(h).unwrap();
    assert_eq!(before.position, after.position);
    assert_eq!(before.orientation, after.orientation);
}

#[test]
fn test_fixed_step_interpolation_is_between_ticks() {
    let mut world = World::with_config(gravity_config());
    let h = world.add_body(Body::new(1.0).with_position(Vector3::new(0.0, 10.0, 0.0)));
    world.fixed_step(DT, 2.5 * DT, 10);
    let body = world.body(h).unwrap();
    let y = body.interpolated_position.y;
    assert!(y <= body.previous_position.y && y >= body.position.y);
}

// -- Joints --

#[test]
fn test_pendulum_keeps_its_length() {
    // Ten sweeps let a 2 m arm stretch by ~0.16; fifty hold it within a few cm
    let mut world = World::with_config(gravity_config().with_solver(50, 1e-7));
    let anchor = world.add_body(Body::new_static().with_position(Vector3::new(0.0, 5.0, 0.0)));
    let bob = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(0.2))
            .with_position(Vector3::new(2.0, 5.0, 0.0)),
    );
    world.add_constraint(Constraint::point_to_point(
        anchor,
        Vector3::zeros(),
        bob,
        Vector3::new(-2.0, 0.0, 0.0),
        1e6,
    ));

    let mut lowest = f32::MAX;
    for _ in 0..120 {
        world.step(DT);
        let p = world.body(bob).unwrap().position;
        lowest = lowest.min(p.y);
        let length = (p - Vector3::new(0.0, 5.0, 0.0)).norm();
        assert!((length - 2.0).abs() < 0.05, "length {}", length);
    }
    assert!(lowest < 3.5);
}

#[test]
fn test_spring_settles_near_rest_length() {
    let mut world = World::new();
    let a = world.add_body(Body::new_static());
    let b = world.add_body(
        Body::new(1.0)
            .with_shape(Shape::sphere(0.1))
            .with_position(Vector3::new(3.0, 0.0, 0.0)),
    );
    world.add_spring(Spring::new(a, b).with_rest_length(1.0).with_stiffness(50.0).with_damping(5.0));
    for _ in 0..600 {
        world.step(DT);
    }
    let x = world.body(b).unwrap().position.x;
    assert!((x - 1.0).abs() < 0.02, "x = {}", x);
}
