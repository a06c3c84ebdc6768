//! Cross-module scenarios exercising the public handle-based surface end to
//! end: world creation, structural mutation, deferred operations, transfer,
//! and archetype destruction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sparse_archetype_ecs::types::type_id_of;
use sparse_archetype_ecs::{Signature, World};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Pos(i32, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Vel(i32, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Tag;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct A;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct B;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct C(u32);

fn signature_of(ids: &[sparse_archetype_ecs::ComponentTypeId]) -> Signature {
    let mut sig = Signature::new();
    for &id in ids {
        sig.add(id);
    }
    sig
}

#[test]
fn s1_create_world_entity_and_set_a_component() {
    let _guard = sparse_archetype_ecs::test_support::ecs_test_guard();
    let world = World::create("s1");

    let entity = world
        .with(|w| {
            let e = w.create_entity();
            w.set(e, Pos(1, 2));
            e
        })
        .unwrap();

    world.with(|w| {
        assert_eq!(w.entity_count(), 1);
        assert_eq!(w.get_component::<Pos>(entity), Some(&Pos(1, 2)));
        let archetype = w.try_get_archetype(&signature_of(&[type_id_of::<Pos>()])).unwrap();
        assert_eq!(archetype.signature(), &signature_of(&[type_id_of::<Pos>()]));
    });

    assert_eq!(entity.get::<Pos>(), Some(Pos(1, 2)));
}

#[test]
fn s2_adding_a_second_component_moves_the_entity_to_a_new_archetype() {
    let _guard = sparse_archetype_ecs::test_support::ecs_test_guard();
    let world = World::create("s2");

    let entity = world
        .with(|w| {
            let e = w.create_entity();
            w.set(e, Pos(1, 2));
            e
        })
        .unwrap();

    world.with(|w| w.set(entity, Vel(3, 4)));

    world.with(|w| {
        let expected = signature_of(&[type_id_of::<Pos>(), type_id_of::<Vel>()]);
        let new_archetype = w.try_get_archetype(&expected).unwrap();
        assert_eq!(new_archetype.signature(), &expected);
        assert_eq!(w.get_component::<Pos>(entity), Some(&Pos(1, 2)));

        let old_archetype = w
            .try_get_archetype(&signature_of(&[type_id_of::<Pos>()]))
            .unwrap();
        assert_eq!(old_archetype.entity_count(), 0);
    });
}

#[test]
fn s3_destroy_fires_remove_callback_once_and_invalidates_the_handle() {
    let _guard = sparse_archetype_ecs::test_support::ecs_test_guard();
    let world = World::create("s3");
    let fired = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(std::sync::Mutex::new(None));

    let entity = world
        .with(|w| {
            let fired = fired.clone();
            let seen = seen.clone();
            w.on_remove::<Pos>(move |_entity, value| {
                fired.fetch_add(1, Ordering::SeqCst);
                *seen.lock().unwrap() = Some(*value);
            });
            let e = w.create_entity();
            w.set(e, Pos(1, 2));
            e
        })
        .unwrap();

    world.with(|w| w.destroy_entity(entity));

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), Some(Pos(1, 2)));
    assert!(!entity.is_valid());

    let other = world.with(|w| w.create_entity()).unwrap();
    assert!(!entity.is_valid());
    assert!(other.is_valid());
}

#[test]
fn s4_deferred_destroy_cancels_a_deferred_create_but_not_an_already_set_sibling() {
    let _guard = sparse_archetype_ecs::test_support::ecs_test_guard();
    let world = World::create("s4");
    let set_fired = Arc::new(AtomicUsize::new(0));
    let remove_fired = Arc::new(AtomicUsize::new(0));

    world.with(|w| {
        let set_fired = set_fired.clone();
        w.on_set_ref::<Tag>(move |_e, _tag| {
            set_fired.fetch_add(1, Ordering::SeqCst);
        });
        let remove_fired = remove_fired.clone();
        w.on_remove::<Tag>(move |_e, _tag| {
            remove_fired.fetch_add(1, Ordering::SeqCst);
        });
    });

    let (e1, e2) = world
        .with(|w| {
            w.begin_defer();
            let e1 = w.create_entity();
            let e2 = w.create_entity();
            w.set(e1, Tag);
            w.set(e2, Tag);
            w.destroy_entity(e1);
            (e1, e2)
        })
        .unwrap();

    world.with(|w| w.end_defer());

    assert!(!e1.is_valid());
    assert!(e2.is_valid());
    assert_eq!(e2.get::<Tag>(), Some(Tag));
    assert_eq!(set_fired.load(Ordering::SeqCst), 1);
    assert_eq!(remove_fired.load(Ordering::SeqCst), 0);

    world.with(|w| assert_eq!(w.entity_count(), 1));
}

#[test]
fn s5_transfer_moves_an_entity_and_its_components_without_firing_callbacks() {
    let _guard = sparse_archetype_ecs::test_support::ecs_test_guard();
    let w1 = World::create("s5a");
    let w2 = World::create("s5b");
    let set_fired = Arc::new(AtomicUsize::new(0));
    let remove_fired = Arc::new(AtomicUsize::new(0));

    w1.with(|w| {
        let set_fired = set_fired.clone();
        w.on_set_ref::<A>(move |_e, _v| {
            set_fired.fetch_add(1, Ordering::SeqCst);
        });
        let remove_fired = remove_fired.clone();
        w.on_remove::<A>(move |_e, _v| {
            remove_fired.fetch_add(1, Ordering::SeqCst);
        });
    });

    let entity = w1
        .with(|w| {
            let e = w.create_entity();
            w.set(e, A);
            w.set(e, B);
            e
        })
        .unwrap();

    let calls_before = set_fired.load(Ordering::SeqCst);

    w1.with(|w| w.transfer(entity, w2));

    assert_eq!(w1.with(|w| w.entity_count()).unwrap(), 0);
    assert_eq!(w2.with(|w| w.entity_count()).unwrap(), 1);
    assert_eq!(entity.world(), Some(w2));
    assert_eq!(entity.get::<A>(), Some(A));
    assert_eq!(entity.get::<B>(), Some(B));
    assert_eq!(set_fired.load(Ordering::SeqCst), calls_before);
    assert_eq!(remove_fired.load(Ordering::SeqCst), 0);
}

#[test]
fn s6_destroying_an_archetype_invalidates_all_its_entities_before_any_callback_runs() {
    let _guard = sparse_archetype_ecs::test_support::ecs_test_guard();
    let world = World::create("s6");
    let fired = Arc::new(AtomicUsize::new(0));
    let batch: Arc<std::sync::Mutex<Vec<sparse_archetype_ecs::EntityHandle>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let all_invalid_on_every_fire = Arc::new(std::sync::Mutex::new(true));

    let entities = world
        .with(|w| {
            let fired = fired.clone();
            let batch = batch.clone();
            let all_invalid_on_every_fire = all_invalid_on_every_fire.clone();
            w.on_remove::<C>(move |_e, _v| {
                fired.fetch_add(1, Ordering::SeqCst);
                // The callback runs after the whole batch is invalidated,
                // so every sibling entity (not just the one being removed)
                // must already read as invalid here.
                let siblings = batch.lock().unwrap();
                if !siblings.is_empty() {
                    let all_invalid = siblings.iter().all(|e| !e.is_valid());
                    *all_invalid_on_every_fire.lock().unwrap() &= all_invalid;
                }
            });
            (0..3)
                .map(|i| {
                    let e = w.create_entity();
                    w.set(e, C(i));
                    e
                })
                .collect::<Vec<_>>()
        })
        .unwrap();

    *batch.lock().unwrap() = entities.clone();

    let archetype_index = world
        .with(|w| {
            let sig = signature_of(&[type_id_of::<C>()]);
            w.try_get_archetype(&sig).map(|a| a.slot_index())
        })
        .unwrap()
        .unwrap();

    world.with(|w| w.destroy_archetype(archetype_index));

    assert_eq!(fired.load(Ordering::SeqCst), 3);
    assert!(*all_invalid_on_every_fire.lock().unwrap());
    for e in entities {
        assert!(!e.is_valid());
    }
}
