// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Structural-mutation scheduler (C9).
//!
//! Every operation that can move an entity between archetypes, grow a
//! world, or invalidate handles goes through here. Outside of a defer
//! scope each call runs its immediate algorithm synchronously; inside one,
//! the call is staged as an event and the matching payload (if any) is
//! pushed onto the owning component type's own deferred queue, so draining
//! never needs a type parameter to find the value back.
//!
//! `World` owns one `StructureEventHandler` and temporarily moves it out
//! with `mem::take` for the duration of any dispatch, since the handler's
//! own methods need `&mut World` to apply their immediate algorithms and
//! Rust won't let `World` hand out `&mut self` and `&mut self.handler`
//! at once.

use std::any::Any;
use std::collections::VecDeque;

use crate::component::Component;
use crate::handle::{EntityHandle, WorldHandle};
use crate::signature::Signature;
use crate::types::{self, ComponentTypeId};
use crate::world::World;
use crate::{entity_table, world_registry};

#[derive(Debug)]
enum StructureEvent {
    CreateEntity { entity: EntityHandle, archetype_index: usize, archetype_version: u32 },
    DestroyEntity { entity: EntityHandle },
    SetComponent { entity: EntityHandle, type_id: ComponentTypeId },
    RemoveComponent { entity: EntityHandle, type_id: ComponentTypeId },
    TransferEntity { entity: EntityHandle, target_world: WorldHandle },
    DestroyArchetype { archetype_index: usize },
    DestroyWorld,
    ResizeBackingArrays,
}

/// Defer depth and FIFO queue for one world's structural mutations.
pub(crate) struct StructureEventHandler {
    defer_depth: u32,
    queue: VecDeque<StructureEvent>,
}

impl Default for StructureEventHandler {
    fn default() -> Self {
        Self { defer_depth: 0, queue: VecDeque::new() }
    }
}

impl StructureEventHandler {
    pub(crate) fn is_deferred(&self) -> bool {
        self.defer_depth > 0
    }

    pub fn begin_defer(&mut self) {
        self.defer_depth += 1;
    }

    /// Decrements the defer depth; drains the queue in FIFO order once it
    /// reaches zero. Composes under nesting: only the outermost
    /// `end_defer` actually runs anything.
    pub fn end_defer(&mut self, world: &mut World) {
        debug_assert!(self.defer_depth > 0, "end_defer without a matching begin_defer");
        self.defer_depth = self.defer_depth.saturating_sub(1);
        if self.defer_depth == 0 {
            while let Some(event) = self.queue.pop_front() {
                self.apply(world, event);
            }
        }
    }

    fn apply(&mut self, world: &mut World, event: StructureEvent) {
        match event {
            StructureEvent::CreateEntity { entity, archetype_index, archetype_version } => {
                let archetype_still_live = world
                    .archetype(archetype_index)
                    .map(|a| a.version() == archetype_version)
                    .unwrap_or(false);
                if archetype_still_live {
                    world.commit_create(entity, archetype_index);
                } else {
                    entity_table::with_entity_table(|t| t.release_to_free_list(entity.index()));
                }
            }
            StructureEvent::DestroyEntity { entity } => world.commit_destroy_entity(entity),
            StructureEvent::SetComponent { entity, type_id } => {
                world.with_per_type_taken(type_id, |data, world| {
                    data.commit_next_deferred_set(world, entity, type_id);
                });
            }
            StructureEvent::RemoveComponent { entity, type_id } => {
                world.with_per_type_taken(type_id, |data, world| {
                    data.commit_next_deferred_remove(world, entity, type_id);
                });
            }
            StructureEvent::TransferEntity { entity, target_world } => world.commit_transfer(entity, target_world),
            StructureEvent::DestroyArchetype { archetype_index } => world.commit_destroy_archetype(archetype_index),
            StructureEvent::DestroyWorld => {
                let handle = world.handle();
                // Invalidate the handle first; `world` is already the
                // `&mut World` this drain holds, so teardown runs on it
                // directly rather than re-resolving and re-locking it.
                world_registry::with_registry(|r| {
                    r.take(handle);
                });
                destroy_world(world);
            }
            StructureEvent::ResizeBackingArrays => world.commit_resize_backing_arrays(),
        }
    }

    pub fn create_entity(&mut self, world: &mut World) -> EntityHandle {
        let allocated = entity_table::with_entity_table(|t| t.allocate());
        let archetype_index = world.get_or_create_archetype(&Signature::new());
        let archetype_version = world.archetype(archetype_index).unwrap().version();
        if self.is_deferred() {
            let version = entity_table::with_entity_table(|t| t.bump_version(allocated.index()));
            let reserved = EntityHandle { index: allocated.index(), version };
            self.queue.push_back(StructureEvent::CreateEntity {
                entity: reserved,
                archetype_index,
                archetype_version,
            });
            reserved
        } else {
            world.commit_create(allocated, archetype_index);
            allocated
        }
    }

    pub fn destroy_entity(&mut self, world: &mut World, entity: EntityHandle) {
        if self.is_deferred() {
            self.queue.push_back(StructureEvent::DestroyEntity { entity });
        } else {
            world.commit_destroy_entity(entity);
        }
    }

    pub fn set_component<T: Component>(&mut self, world: &mut World, entity: EntityHandle, value: T) {
        let type_id = types::type_id_of::<T>();
        if self.is_deferred() {
            world.per_type_mut::<T>(type_id).deferred_set_queue.push_back(value);
            self.queue.push_back(StructureEvent::SetComponent { entity, type_id });
        } else {
            world.commit_set(entity, type_id, value);
        }
    }

    pub fn remove_component<T: Component>(&mut self, world: &mut World, entity: EntityHandle) {
        let type_id = types::type_id_of::<T>();
        if self.is_deferred() {
            world.per_type_mut::<T>(type_id).deferred_remove_queue.push_back(entity);
            self.queue.push_back(StructureEvent::RemoveComponent { entity, type_id });
        } else {
            world.commit_remove::<T>(entity, type_id);
        }
    }

    pub fn transfer_entity(&mut self, world: &mut World, entity: EntityHandle, target_world: WorldHandle) {
        if self.is_deferred() {
            self.queue.push_back(StructureEvent::TransferEntity { entity, target_world });
        } else {
            world.commit_transfer(entity, target_world);
        }
    }

    pub fn destroy_archetype(&mut self, world: &mut World, archetype_index: usize) {
        if self.is_deferred() {
            self.queue.push_back(StructureEvent::DestroyArchetype { archetype_index });
        } else {
            world.commit_destroy_archetype(archetype_index);
        }
    }

    pub fn resize_backing_arrays_all(&mut self, world: &mut World) {
        if self.is_deferred() {
            self.queue.push_back(StructureEvent::ResizeBackingArrays);
        } else {
            world.commit_resize_backing_arrays();
        }
    }

    /// Enqueues this world's own destruction; only meaningful under defer,
    /// since outside one `World::destroy` runs immediately and there is no
    /// handler left afterward to enqueue anything on.
    pub fn destroy_world_deferred(&mut self) {
        self.queue.push_back(StructureEvent::DestroyWorld);
    }
}

/// Tears down an already-removed-from-the-registry world: invalidates
/// every entity it still held across every archetype before running any
/// remove callback, then lets `world`'s own `Drop` glue free the archetype
/// storage. Called both by `World::destroy` and by a drained
/// `DestroyWorld` event.
///
/// Mirrors `World::commit_destroy_archetype`'s batch shape but spans every
/// archetype in the world, so a callback fired while destroying one
/// archetype never observes an entity from another archetype as still
/// live.
pub(crate) fn destroy_world(world: &mut World) {
    let archetype_indices: Vec<usize> = world.archetypes().map(|a| a.slot_index()).collect();

    let mut staging: Vec<(EntityHandle, ComponentTypeId, Box<dyn Any + Send>)> = Vec::new();
    let mut all_entities: Vec<EntityHandle> = Vec::new();

    for archetype_index in archetype_indices {
        let entities: Vec<EntityHandle> = world.archetype(archetype_index).unwrap().entities().to_vec();
        let ids: Vec<ComponentTypeId> = world.archetype(archetype_index).unwrap().signature().ids().to_vec();

        for id in ids {
            if !world.per_type_has_remove_callback(id) {
                continue;
            }
            let Some(pos) = world.archetype(archetype_index).unwrap().column_index(id) else { continue };
            let mut column_values = Vec::with_capacity(entities.len());
            for row in (0..entities.len()).rev() {
                let value = world.archetype_mut(archetype_index).unwrap().column_by_index_mut(pos).take_removed(row, row);
                column_values.push((entities[row], value));
            }
            column_values.reverse();
            staging.extend(column_values.into_iter().map(|(entity, value)| (entity, id, value)));
        }

        all_entities.extend(entities);
    }

    for &entity in &all_entities {
        entity_table::with_entity_table(|t| t.free(entity));
    }
    world.adjust_entity_count_for_destroy(all_entities.len());

    for (entity, id, value) in staging {
        world.with_per_type_taken(id, |data, _world| {
            data.invoke_remove_any(entity, value.as_ref());
        });
    }
}
