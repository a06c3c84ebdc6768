//! Benchmarks for the archetype storage engine and structural-mutation
//! scheduler.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sparse_archetype_ecs::test_support::ecs_test_guard;
use sparse_archetype_ecs::{EntityHandle, World};

#[derive(Debug, Copy, Clone, Default)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone, Default)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone, Default)]
struct Health(u32);

fn bench_create_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_entity");

    for count in [1_000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::new("single_component", count), count, |b, &count| {
            b.iter(|| {
                let _guard = ecs_test_guard();
                let handle = World::create("bench");
                handle.with(|world| {
                    for i in 0..count {
                        let e = world.create_entity();
                        world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                    }
                });
            });
        });

        group.bench_with_input(BenchmarkId::new("three_components", count), count, |b, &count| {
            b.iter(|| {
                let _guard = ecs_test_guard();
                let handle = World::create("bench");
                handle.with(|world| {
                    for i in 0..count {
                        let e = world.create_entity();
                        world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                        world.set(e, Velocity { x: 1.0, y: 0.0, z: 0.0 });
                        world.set(e, Health(100));
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_destroy_entity(c: &mut Criterion) {
    c.bench_function("destroy_1k_entities", |b| {
        b.iter_batched(
            || {
                let _guard = ecs_test_guard();
                let handle = World::create("bench");
                let entities: Vec<EntityHandle> = handle
                    .with(|world| {
                        (0..1_000)
                            .map(|i| {
                                let e = world.create_entity();
                                world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                                e
                            })
                            .collect()
                    })
                    .unwrap();
                (handle, entities)
            },
            |(handle, entities)| {
                handle.with(|world| {
                    for entity in entities {
                        world.destroy_entity(entity);
                    }
                });
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_archetype_segregation(c: &mut Criterion) {
    c.bench_function("archetype_segregation_1k", |b| {
        b.iter(|| {
            let _guard = ecs_test_guard();
            let handle = World::create("bench");
            handle.with(|world| {
                for i in 0..250 {
                    let e = world.create_entity();
                    world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                    world.set(e, Velocity { x: 1.0, y: 0.0, z: 0.0 });
                }
                for i in 0..250 {
                    let e = world.create_entity();
                    world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                    world.set(e, Health(100));
                }
                for i in 0..250 {
                    let e = world.create_entity();
                    world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                    world.set(e, Velocity { x: 1.0, y: 0.0, z: 0.0 });
                    world.set(e, Health(100));
                }
                for i in 0..250 {
                    let e = world.create_entity();
                    world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                }
                black_box(world.archetype_count());
            });
        });
    });
}

fn bench_set_in_place_vs_structural(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");

    group.bench_function("in_place_overwrite_10k", |b| {
        b.iter_batched(
            || {
                let _guard = ecs_test_guard();
                let handle = World::create("bench");
                let entities: Vec<EntityHandle> = handle
                    .with(|world| {
                        (0..10_000)
                            .map(|_| {
                                let e = world.create_entity();
                                world.set(e, Position::default());
                                e
                            })
                            .collect()
                    })
                    .unwrap();
                (handle, entities)
            },
            |(handle, entities)| {
                handle.with(|world| {
                    for entity in entities {
                        world.set(entity, Position { x: 1.0, y: 2.0, z: 3.0 });
                    }
                });
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("structural_add_10k", |b| {
        b.iter_batched(
            || {
                let _guard = ecs_test_guard();
                let handle = World::create("bench");
                let entities: Vec<EntityHandle> = handle
                    .with(|world| (0..10_000).map(|_| world.create_entity()).collect())
                    .unwrap();
                (handle, entities)
            },
            |(handle, entities)| {
                handle.with(|world| {
                    for entity in entities {
                        world.set(entity, Position::default());
                    }
                });
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_entity_count(c: &mut Criterion) {
    c.bench_function("entity_count_10k", |b| {
        let _guard = ecs_test_guard();
        let handle = World::create("bench");
        handle.with(|world| {
            for i in 0..10_000 {
                let e = world.create_entity();
                world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
            }
        });

        b.iter(|| {
            handle.with(|world| black_box(world.entity_count()));
        });
    });
}

criterion_group!(
    benches,
    bench_create_entity,
    bench_destroy_entity,
    bench_archetype_segregation,
    bench_set_in_place_vs_structural,
    bench_entity_count
);

criterion_main!(benches);
