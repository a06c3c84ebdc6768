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

//! A world: its archetype slot array, signature index, per-type callback
//! data, and structural-mutation dispatch (C5).
//!
//! `World::create`/`get_or_create`/`get_all`/`try_get_by_name`/`is_valid`/
//! `destroy` are a namespace of associated functions over `WorldHandle`,
//! going through the process-global registry (C7). Everything else is an
//! instance method reached through `WorldHandle::with` or the registry
//! directly.

use std::any::Any;

use ahash::AHashMap;

use crate::archetype::Archetype;
use crate::buffer::ComponentBuffer;
use crate::callback::{AnyWorldData, CallbackId, PerTypeWorldData};
use crate::component::Component;
use crate::entity_table::{self, EntityLocation};
use crate::handle::{EntityHandle, WorldHandle};
use crate::signature::Signature;
use crate::structure_event::{self, StructureEventHandler};
use crate::types::{self, ComponentTypeId};
use crate::world_registry;

const ARCHETYPE_INITIAL_CAPACITY: usize = 8;

/// One archetype slot. Kept separate from `Archetype` itself (rather than
/// just `Vec<Option<Archetype>>`) because the slot's version must survive
/// the archetype being destroyed, the same reasoning as `EntitySlot` and
/// `WorldSlot`.
struct ArchetypeSlot {
    archetype: Option<Archetype>,
    version: u32,
}

/// Owns every archetype, the per-type callback/data slots, and the
/// structural-mutation handler for one world.
pub struct World {
    handle: WorldHandle,
    name: String,
    archetype_slots: Vec<ArchetypeSlot>,
    /// High-water mark of archetype slots ever handed out.
    archetype_terminating_index: usize,
    /// Free archetype slot indices, reused LIFO (a stack, unlike the
    /// entity table's and world registry's FIFO free queues).
    archetype_free: Vec<usize>,
    signature_index: AHashMap<Signature, usize>,
    /// Reused scratch buffer for building an add/remove target signature
    /// without allocating a fresh `Signature` on every structural move.
    scratch_signature: Signature,
    per_type_data: Vec<Option<Box<dyn AnyWorldData>>>,
    entity_count: usize,
    archetype_structure_update_count: u64,
    handler: StructureEventHandler,
    /// Reusable scratch buffer for staging removed values destined for a
    /// remove callback during entity/archetype/world destruction, so every
    /// entity (or every entity in the batch) is invalidated before any
    /// callback runs without allocating a fresh `Vec` per destroy.
    destroy_staging: Vec<(EntityHandle, ComponentTypeId, Box<dyn Any + Send>)>,
}

impl World {
    pub(crate) fn new(handle: WorldHandle, name: String) -> Self {
        let mut world = Self {
            handle,
            name,
            archetype_slots: Vec::new(),
            archetype_terminating_index: 0,
            archetype_free: Vec::new(),
            signature_index: AHashMap::new(),
            scratch_signature: Signature::new(),
            per_type_data: Vec::new(),
            entity_count: 0,
            archetype_structure_update_count: 0,
            handler: StructureEventHandler::default(),
            destroy_staging: Vec::new(),
        };
        // Bootstrap the empty archetype (entities with no components); it
        // is always at index 0, so create_entity never has to special-case
        // a world with nothing in it yet.
        world.get_or_create_archetype(&Signature::new());
        world
    }

    // ---- namespace-style associated functions over WorldHandle --------

    pub fn create(name: impl Into<String>) -> WorldHandle {
        world_registry::with_registry(|r| r.create(name.into()))
    }

    pub fn get_or_create(name: &str) -> WorldHandle {
        world_registry::with_registry(|r| match r.try_get_by_name(name) {
            Some(handle) => handle,
            None => r.create(name.to_string()),
        })
    }

    pub fn get_all() -> Vec<WorldHandle> {
        world_registry::with_registry(|r| r.all())
    }

    pub fn try_get_by_name(name: &str) -> Option<WorldHandle> {
        world_registry::with_registry(|r| r.try_get_by_name(name))
    }

    pub fn is_valid(handle: WorldHandle) -> bool {
        world_registry::with_registry(|r| r.is_valid(handle))
    }

    /// Destroys the world identified by `handle`. If the world's own
    /// defer scope is active, destruction is staged behind whatever is
    /// already queued and runs when that scope ends; otherwise `handle`
    /// stops resolving before this call returns.
    pub fn destroy(handle: WorldHandle) {
        let deferred = world_registry::with_world(handle, |w| {
            let deferred = w.handler.is_deferred();
            if deferred {
                w.handler.destroy_world_deferred();
            }
            deferred
        })
        .unwrap_or(false);
        if !deferred {
            if let Some(arc) = world_registry::with_registry(|r| r.take(handle)) {
                structure_event::destroy_world(&mut arc.lock());
            }
        }
    }

    // ---- accessors ------------------------------------------------------

    pub fn handle(&self) -> WorldHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    pub fn archetype_structure_update_count(&self) -> u64 {
        self.archetype_structure_update_count
    }

    pub fn archetype_count(&self) -> usize {
        self.archetype_terminating_index - self.archetype_free.len()
    }

    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetype_slots.iter().filter_map(|s| s.archetype.as_ref())
    }

    pub fn try_get_archetype(&self, signature: &Signature) -> Option<&Archetype> {
        let idx = *self.signature_index.get(signature)?;
        self.archetype_slots[idx].archetype.as_ref()
    }

    pub(crate) fn archetype(&self, index: usize) -> Option<&Archetype> {
        self.archetype_slots.get(index)?.archetype.as_ref()
    }

    pub(crate) fn archetype_mut(&mut self, index: usize) -> Option<&mut Archetype> {
        self.archetype_slots.get_mut(index)?.archetype.as_mut()
    }

    fn archetype_pair_mut(&mut self, i: usize, j: usize) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(i, j, "archetype_pair_mut requires distinct indices");
        if i < j {
            let (left, right) = self.archetype_slots.split_at_mut(j);
            (left[i].archetype.as_mut().unwrap(), right[0].archetype.as_mut().unwrap())
        } else {
            let (left, right) = self.archetype_slots.split_at_mut(i);
            (right[0].archetype.as_mut().unwrap(), left[j].archetype.as_mut().unwrap())
        }
    }

    // ---- archetype slot management --------------------------------------

    pub(crate) fn get_or_create_archetype(&mut self, signature: &Signature) -> usize {
        if let Some(&idx) = self.signature_index.get(signature) {
            return idx;
        }
        let idx = self.reserve_archetype_slot();
        let version = self.archetype_slots[idx].version;
        let archetype = Archetype::new(self.handle, signature.clone(), idx, version);
        self.archetype_slots[idx].archetype = Some(archetype);
        self.signature_index.insert(signature.clone(), idx);
        self.archetype_structure_update_count += 1;
        idx
    }

    fn reserve_archetype_slot(&mut self) -> usize {
        if let Some(idx) = self.archetype_free.pop() {
            return idx;
        }
        if self.archetype_terminating_index == self.archetype_slots.len() {
            let new_len = (self.archetype_slots.len() * 2).max(ARCHETYPE_INITIAL_CAPACITY);
            self.archetype_slots.resize_with(new_len, || ArchetypeSlot { archetype: None, version: 1 });
        }
        let idx = self.archetype_terminating_index;
        self.archetype_terminating_index += 1;
        idx
    }

    fn scratch_with_added(&mut self, base: &Signature, id: ComponentTypeId) -> Signature {
        self.scratch_signature.copy_from(base);
        self.scratch_signature.add(id);
        self.scratch_signature.clone()
    }

    fn scratch_with_removed(&mut self, base: &Signature, id: ComponentTypeId) -> Signature {
        self.scratch_signature.copy_from(base);
        self.scratch_signature.remove(id);
        self.scratch_signature.clone()
    }

    // ---- per-type callback/data storage ---------------------------------

    fn ensure_per_type_slot(&mut self, id: ComponentTypeId) {
        let idx = id.index();
        if idx >= self.per_type_data.len() {
            self.per_type_data.resize_with(idx + 1, || None);
        }
    }

    pub(crate) fn per_type_mut<T: Component>(&mut self, id: ComponentTypeId) -> &mut PerTypeWorldData<T> {
        self.ensure_per_type_slot(id);
        let slot = &mut self.per_type_data[id.index()];
        if slot.is_none() {
            *slot = Some(Box::new(PerTypeWorldData::<T>::default()));
        }
        slot.as_mut()
            .unwrap()
            .as_any_mut()
            .downcast_mut::<PerTypeWorldData<T>>()
            .expect("per-type world data: type mismatch for this component type id")
    }

    /// Takes the per-type slot for `id` out of `self` for the duration of
    /// `f`, so `f` can hold `&mut dyn AnyWorldData` and `&mut World`
    /// simultaneously without aliasing the same field. Restored afterward.
    pub(crate) fn with_per_type_taken<R>(
        &mut self,
        id: ComponentTypeId,
        f: impl FnOnce(&mut dyn AnyWorldData, &mut World) -> R,
    ) -> Option<R> {
        let idx = id.index();
        let mut taken = self.per_type_data.get_mut(idx)?.take()?;
        let result = f(taken.as_mut(), self);
        self.per_type_data[idx] = Some(taken);
        Some(result)
    }

    pub fn on_set<T: Component>(&mut self, f: impl FnMut(EntityHandle, &T, &mut T) + Send + 'static) -> CallbackId {
        let id = types::type_id_of::<T>();
        self.per_type_mut::<T>(id).on_set(f)
    }

    pub fn on_set_ref<T: Component>(&mut self, f: impl FnMut(EntityHandle, &mut T) + Send + 'static) -> CallbackId {
        let id = types::type_id_of::<T>();
        self.per_type_mut::<T>(id).on_set_ref(f)
    }

    pub fn remove_set_callback<T: Component>(&mut self, callback: CallbackId) {
        let id = types::type_id_of::<T>();
        self.per_type_mut::<T>(id).remove_set_callback(callback);
    }

    pub fn on_remove<T: Component>(&mut self, f: impl FnMut(EntityHandle, &T) + Send + 'static) -> CallbackId {
        let id = types::type_id_of::<T>();
        self.per_type_mut::<T>(id).on_remove(f)
    }

    pub fn remove_remove_callback<T: Component>(&mut self, callback: CallbackId) {
        let id = types::type_id_of::<T>();
        self.per_type_mut::<T>(id).remove_remove_callback(callback);
    }

    pub fn set_data<T: Component>(&mut self, value: T) {
        let id = types::type_id_of::<T>();
        self.per_type_mut::<T>(id).set_data(value);
    }

    /// True iff `entity` currently has a value for `T`, zero-copy.
    pub fn has_component<T: Component>(&self, entity: EntityHandle) -> bool {
        let type_id = types::type_id_of::<T>();
        self.location_of(entity)
            .and_then(|loc| self.archetype(loc.archetype_index))
            .map(|a| a.has_column(type_id))
            .unwrap_or(false)
    }

    /// Zero-copy read of `entity`'s `T`, for callers already holding the
    /// world lock via `WorldHandle::with`.
    pub fn get_component<T: Component>(&self, entity: EntityHandle) -> Option<&T> {
        let type_id = types::type_id_of::<T>();
        let loc = self.location_of(entity)?;
        self.archetype(loc.archetype_index)?.column::<T>(type_id)?.get(loc.slot_index)
    }

    pub fn get_data<T: Component>(&self) -> Option<&T> {
        let id = types::type_id_of::<T>();
        self.per_type_data
            .get(id.index())?
            .as_deref()?
            .as_any()
            .downcast_ref::<PerTypeWorldData<T>>()?
            .get_data()
    }

    pub fn get_data_mut<T: Component>(&mut self) -> Option<&mut T> {
        let id = types::type_id_of::<T>();
        self.per_type_data
            .get_mut(id.index())?
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<PerTypeWorldData<T>>()?
            .get_data_mut()
    }

    /// Whether `id`'s per-type slot has at least one set callback
    /// registered. `false` for a type nothing has ever called `on_set`/
    /// `on_set_ref` on, in which case no slot exists yet.
    pub(crate) fn per_type_has_set_callback(&self, id: ComponentTypeId) -> bool {
        self.per_type_data.get(id.index()).and_then(|s| s.as_deref()).map(|d| d.has_set_callback()).unwrap_or(false)
    }

    /// Whether `id`'s per-type slot has at least one remove callback
    /// registered.
    pub(crate) fn per_type_has_remove_callback(&self, id: ComponentTypeId) -> bool {
        self.per_type_data.get(id.index()).and_then(|s| s.as_deref()).map(|d| d.has_remove_callback()).unwrap_or(false)
    }

    /// Resolves `handle` and clones out its datum for `T`, without the
    /// caller having to go through `WorldHandle::with` first. Fails with
    /// `EcsError::WorldNotFound` if `handle` no longer resolves, the one
    /// recoverable error case in the crate (every other invalid-handle path
    /// is a silent no-op or an absent value).
    pub fn get_data_for<T: Component + Clone>(handle: WorldHandle) -> crate::error::Result<Option<T>> {
        world_registry::with_world(handle, |w| w.get_data::<T>().cloned()).ok_or(crate::error::EcsError::WorldNotFound)
    }

    // ---- public structural-mutation surface, dispatched through the
    // handler via a take/call/restore of `self.handler` ------------------

    pub fn create_entity(&mut self) -> EntityHandle {
        self.with_handler(|h, w| h.create_entity(w))
    }

    pub fn destroy_entity(&mut self, entity: EntityHandle) {
        self.with_handler(|h, w| h.destroy_entity(w, entity));
    }

    pub fn set<T: Component>(&mut self, entity: EntityHandle, value: T) {
        self.with_handler(|h, w| h.set_component(w, entity, value));
    }

    pub fn remove<T: Component>(&mut self, entity: EntityHandle) {
        self.with_handler(|h, w| h.remove_component::<T>(w, entity));
    }

    pub fn transfer(&mut self, entity: EntityHandle, target_world: WorldHandle) {
        self.with_handler(|h, w| h.transfer_entity(w, entity, target_world));
    }

    pub fn destroy_archetype(&mut self, archetype_index: usize) {
        self.with_handler(|h, w| h.destroy_archetype(w, archetype_index));
    }

    pub fn destroy_empty_archetypes(&mut self) {
        let empty: Vec<usize> = self
            .archetype_slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.archetype.as_ref().filter(|a| a.is_empty()).map(|_| i))
            .collect();
        for idx in empty {
            self.destroy_archetype(idx);
        }
    }

    pub fn resize_backing_arrays(&mut self) {
        self.with_handler(|h, w| h.resize_backing_arrays_all(w));
    }

    pub fn begin_defer(&mut self) {
        self.handler.begin_defer();
    }

    pub fn end_defer(&mut self) {
        self.with_handler(|h, w| h.end_defer(w));
    }

    fn with_handler<R>(&mut self, f: impl FnOnce(&mut StructureEventHandler, &mut World) -> R) -> R {
        let mut handler = std::mem::take(&mut self.handler);
        let result = f(&mut handler, self);
        self.handler = handler;
        result
    }

    // ---- immediate algorithms, shared by the synchronous and deferred
    // paths; called only from `structure_event` and from the dispatch
    // methods above ------------------------------------------------------

    fn location_of(&self, entity: EntityHandle) -> Option<EntityLocation> {
        entity_table::with_entity_table(|t| t.location(entity)).filter(|loc| loc.world == self.handle)
    }

    fn location_is_current(&self, location: EntityLocation) -> bool {
        self.archetype(location.archetype_index)
            .map(|a| a.version() == location.archetype_version)
            .unwrap_or(false)
    }

    fn fix_up_swapped_entity(&mut self, slot_index: usize, swapped: Option<EntityHandle>) {
        if let Some(swapped_entity) = swapped {
            entity_table::with_entity_table(|t| t.update_slot_index(swapped_entity, slot_index));
        }
    }

    pub(crate) fn commit_create(&mut self, entity: EntityHandle, archetype_index: usize) {
        let (slot_index, archetype_version) = {
            let archetype = self.archetype_mut(archetype_index).expect("archetype must exist at commit time");
            let slot_index = archetype.append_entity(entity);
            (slot_index, archetype.version())
        };
        let world = self.handle;
        entity_table::with_entity_table(|t| {
            t.set_location(entity, EntityLocation { world, archetype_index, archetype_version, slot_index });
        });
        self.entity_count += 1;
    }

    /// In-place overwrite if the entity already has `T`, otherwise a
    /// structural move into the archetype with `T` added.
    pub(crate) fn commit_set<T: Component>(&mut self, entity: EntityHandle, type_id: ComponentTypeId, value: T) {
        let Some(location) = self.location_of(entity) else { return };
        if !self.location_is_current(location) {
            return;
        }

        if self.archetype(location.archetype_index).unwrap().has_column(type_id) {
            let old = {
                let archetype = self.archetype_mut(location.archetype_index).unwrap();
                let column = archetype.column_mut::<T>(type_id).expect("column presence checked above");
                column.replace(location.slot_index, value)
            };
            if self.per_type_has_set_callback(type_id) {
                self.with_per_type_taken(type_id, |data, world| {
                    let archetype = world.archetype_mut(location.archetype_index).unwrap();
                    let column = archetype.column_mut::<T>(type_id).unwrap();
                    let new_value = column.get_mut(location.slot_index).unwrap();
                    data.invoke_set_any(entity, &old, new_value);
                });
            }
            return;
        }

        self.commit_add_component(entity, location, type_id, value);
    }

    fn commit_add_component<T: Component>(
        &mut self,
        entity: EntityHandle,
        location: EntityLocation,
        type_id: ComponentTypeId,
        value: T,
    ) {
        let source_index = location.archetype_index;
        let source_signature = self.archetype(source_index).unwrap().signature().clone();
        let target_signature = self.scratch_with_added(&source_signature, type_id);
        let target_index = self.get_or_create_archetype(&target_signature);

        let target_slot = self.archetype_mut(target_index).unwrap().append_entity(entity);
        self.move_surviving_columns(source_index, location.slot_index, target_index, target_slot);
        let swapped = self.archetype_mut(source_index).unwrap().swap_remove_entities_only(location.slot_index);
        self.fix_up_swapped_entity(location.slot_index, swapped);

        let target_version = self.archetype(target_index).unwrap().version();
        let world = self.handle;
        entity_table::with_entity_table(|t| {
            t.set_location(
                entity,
                EntityLocation { world, archetype_index: target_index, archetype_version: target_version, slot_index: target_slot },
            );
        });

        {
            let target = self.archetype_mut(target_index).unwrap();
            target.ensure_column::<T>(type_id);
            let column = target.column_mut::<T>(type_id).expect("just ensured");
            column.push(value);
        }

        if self.per_type_has_set_callback(type_id) {
            let old_default = T::default();
            self.with_per_type_taken(type_id, |data, world| {
                let column = world.archetype_mut(target_index).unwrap().column_mut::<T>(type_id).unwrap();
                let new_value = column.get_mut(target_slot).unwrap();
                data.invoke_set_any(entity, &old_default, new_value);
            });
        }
    }

    pub(crate) fn commit_remove<T: Component>(&mut self, entity: EntityHandle, type_id: ComponentTypeId) {
        let Some(location) = self.location_of(entity) else { return };
        if !self.location_is_current(location) {
            return;
        }
        let source_index = location.archetype_index;
        if !self.archetype(source_index).unwrap().has_column(type_id) {
            return;
        }

        let source_signature = self.archetype(source_index).unwrap().signature().clone();
        let target_signature = self.scratch_with_removed(&source_signature, type_id);
        let target_index = self.get_or_create_archetype(&target_signature);
        let target_slot = self.archetype_mut(target_index).unwrap().append_entity(entity);

        // Capture the removed value before moving the surviving columns:
        // the removed column is simply swap-removed from source, never
        // copied into target.
        let removed_position = self.archetype(source_index).unwrap().column_position(type_id).unwrap();
        let source_last = self.archetype(source_index).unwrap().entity_count() - 1;
        let removed_any = self
            .archetype_mut(source_index)
            .unwrap()
            .column_by_index_mut(removed_position)
            .take_removed(location.slot_index, source_last);

        self.move_surviving_columns_except(source_index, location.slot_index, target_index, target_slot, type_id);
        let swapped = self.archetype_mut(source_index).unwrap().swap_remove_entities_only(location.slot_index);
        self.fix_up_swapped_entity(location.slot_index, swapped);

        let target_version = self.archetype(target_index).unwrap().version();
        let world = self.handle;
        entity_table::with_entity_table(|t| {
            t.set_location(
                entity,
                EntityLocation { world, archetype_index: target_index, archetype_version: target_version, slot_index: target_slot },
            );
        });

        if self.per_type_has_remove_callback(type_id) {
            self.with_per_type_taken(type_id, |data, _world| {
                let removed_ref: &T = removed_any.downcast_ref::<T>().expect("commit_remove: type mismatch");
                data.invoke_remove_any(entity, removed_ref);
            });
        }
    }

    /// Cross-buffer-moves every column `source` has except `excluded`
    /// (already independently removed by the caller) from `source_slot`
    /// into `target` at `target_slot`, materializing each target column
    /// lazily by cloning the shape of its source counterpart.
    fn move_surviving_columns_except(
        &mut self,
        source_index: usize,
        source_slot: usize,
        target_index: usize,
        target_slot: usize,
        excluded: ComponentTypeId,
    ) {
        let source_last = self.archetype(source_index).unwrap().entity_count() - 1;
        let ids: Vec<ComponentTypeId> = self.archetype(source_index).unwrap().signature().ids().to_vec();
        for id in ids {
            if id == excluded {
                continue;
            }
            self.move_one_column(source_index, source_slot, source_last, target_index, target_slot, id);
        }
    }

    fn move_surviving_columns(&mut self, source_index: usize, source_slot: usize, target_index: usize, target_slot: usize) {
        let source_last = self.archetype(source_index).unwrap().entity_count() - 1;
        let ids: Vec<ComponentTypeId> = self.archetype(source_index).unwrap().signature().ids().to_vec();
        for id in ids {
            self.move_one_column(source_index, source_slot, source_last, target_index, target_slot, id);
        }
    }

    fn move_one_column(
        &mut self,
        source_index: usize,
        source_slot: usize,
        source_last: usize,
        target_index: usize,
        target_slot: usize,
        id: ComponentTypeId,
    ) {
        let Some(src_pos) = self.archetype(source_index).unwrap().column_index(id) else { return };
        let Some(dst_pos) = self.archetype(target_index).unwrap().column_position(id) else { return };
        {
            let (source, target) = self.archetype_pair_mut(source_index, target_index);
            let template = source.column_by_index_mut(src_pos);
            target.ensure_column_like(dst_pos, template);
        }
        let (source, target) = self.archetype_pair_mut(source_index, target_index);
        let source_buffer = source.column_by_index_mut(src_pos);
        let target_buffer = target.column_by_index_mut(dst_pos);
        source_buffer.move_to(source_slot, source_last, target_buffer, target_slot);
    }

    /// Removes `entity` from whichever archetype it currently occupies and
    /// frees its slot in the entity table before invoking any remove
    /// callback for the components it held, so a callback always observes
    /// the entity as already destroyed. Removed values are staged in
    /// `destroy_staging` (taken out and restored around the call, same
    /// pattern as `with_handler`) rather than invoked inline, which is what
    /// makes that ordering possible.
    pub(crate) fn commit_destroy_entity(&mut self, entity: EntityHandle) {
        let Some(location) = self.location_of(entity) else { return };
        if !self.location_is_current(location) {
            entity_table::with_entity_table(|t| t.free(entity));
            return;
        }
        let archetype_index = location.archetype_index;
        let slot_index = location.slot_index;
        let ids: Vec<ComponentTypeId> = self.archetype(archetype_index).unwrap().signature().ids().to_vec();
        let last = self.archetype(archetype_index).unwrap().entity_count() - 1;

        let mut staging = std::mem::take(&mut self.destroy_staging);
        for id in ids {
            let Some(pos) = self.archetype(archetype_index).unwrap().column_index(id) else { continue };
            let removed_any = self.archetype_mut(archetype_index).unwrap().column_by_index_mut(pos).take_removed(slot_index, last);
            if self.per_type_has_remove_callback(id) {
                staging.push((entity, id, removed_any));
            }
        }

        let swapped = self.archetype_mut(archetype_index).unwrap().swap_remove_entities_only(slot_index);
        self.fix_up_swapped_entity(slot_index, swapped);
        entity_table::with_entity_table(|t| t.free(entity));
        self.entity_count -= 1;

        for (entity, id, value) in staging.drain(..) {
            self.with_per_type_taken(id, |data, _world| {
                data.invoke_remove_any(entity, value.as_ref());
            });
        }
        self.destroy_staging = staging;
    }

    /// Moves `entity` into `target_world`, preserving every component by
    /// position: both archetypes share the same signature layout, so
    /// columns line up without consulting type ids. Values are captured
    /// into owned, type-erased boxes first since the source and target
    /// archetypes can live in different worlds (different mutexes), ruling
    /// out a direct two-buffer `move_to`.
    pub(crate) fn commit_transfer(&mut self, entity: EntityHandle, target_world: WorldHandle) {
        let Some(location) = self.location_of(entity) else { return };
        if !self.location_is_current(location) {
            return;
        }
        if target_world == self.handle {
            return;
        }

        let source_index = location.archetype_index;
        let signature = self.archetype(source_index).unwrap().signature().clone();
        let slot = location.slot_index;
        let last = self.archetype(source_index).unwrap().entity_count() - 1;

        let mut captured: Vec<(Box<dyn Any + Send>, Box<dyn ComponentBuffer>)> = Vec::with_capacity(signature.count());
        for pos in 0..signature.count() {
            let buffer = self.archetype_mut(source_index).unwrap().column_by_index_mut(pos);
            let template = buffer.new_empty_like();
            let value = buffer.take_removed(slot, last);
            captured.push((value, template));
        }

        let swapped = self.archetype_mut(source_index).unwrap().swap_remove_entities_only(slot);
        self.fix_up_swapped_entity(slot, swapped);
        self.entity_count -= 1;

        let moved = world_registry::with_world(target_world, |target| {
            let target_index = target.get_or_create_archetype(&signature);
            let target_slot = target.archetype_mut(target_index).unwrap().append_entity(entity);
            for (pos, (value, template)) in captured.into_iter().enumerate() {
                let target_archetype = target.archetype_mut(target_index).unwrap();
                target_archetype.ensure_column_like(pos, template.as_ref());
                target_archetype.column_by_index_mut(pos).push_boxed(value);
            }
            let target_version = target.archetype(target_index).unwrap().version();
            entity_table::with_entity_table(|t| {
                t.set_location(
                    entity,
                    EntityLocation {
                        world: target_world,
                        archetype_index: target_index,
                        archetype_version: target_version,
                        slot_index: target_slot,
                    },
                );
            });
            target.entity_count += 1;
        });

        if moved.is_none() {
            // Target world vanished between dispatch and here: the entity
            // already left `source`, so drop it rather than leave it
            // pointing nowhere.
            entity_table::with_entity_table(|t| t.free(entity));
        }
    }

    /// Destroys every entity in `archetype_index` at once and drops the
    /// archetype itself. Unlike a per-entity `commit_destroy_entity` loop,
    /// this stages every remove-callback value across the *whole* batch
    /// before invalidating a single entity, so a callback triggered by
    /// destroying entity 0 never observes entity 1 as still live.
    pub(crate) fn commit_destroy_archetype(&mut self, archetype_index: usize) {
        let Some(slot) = self.archetype_slots.get(archetype_index) else { return };
        if slot.archetype.is_none() {
            return;
        }

        let entities: Vec<EntityHandle> = self.archetype(archetype_index).unwrap().entities().to_vec();
        let ids: Vec<ComponentTypeId> = self.archetype(archetype_index).unwrap().signature().ids().to_vec();

        let mut staging = std::mem::take(&mut self.destroy_staging);
        for id in ids {
            if !self.per_type_has_remove_callback(id) {
                continue;
            }
            let Some(pos) = self.archetype(archetype_index).unwrap().column_index(id) else { continue };
            // `take_removed(row, row)` is a plain pop (no swap) since `row`
            // is always the buffer's current last index; draining
            // highest-to-lowest keeps every untouched row's position
            // stable, so `entities[row]` stays correct throughout.
            let mut column_values = Vec::with_capacity(entities.len());
            for row in (0..entities.len()).rev() {
                let value = self.archetype_mut(archetype_index).unwrap().column_by_index_mut(pos).take_removed(row, row);
                column_values.push((entities[row], value));
            }
            column_values.reverse();
            staging.extend(column_values.into_iter().map(|(entity, value)| (entity, id, value)));
        }

        for &entity in &entities {
            entity_table::with_entity_table(|t| t.free(entity));
        }
        self.entity_count -= entities.len();

        let slot = &mut self.archetype_slots[archetype_index];
        if let Some(archetype) = slot.archetype.take() {
            self.signature_index.remove(archetype.signature());
        }
        let slot = &mut self.archetype_slots[archetype_index];
        slot.version = slot.version.wrapping_add(1).max(1);
        self.archetype_free.push(archetype_index);
        self.archetype_structure_update_count += 1;

        for (entity, id, value) in staging.drain(..) {
            self.with_per_type_taken(id, |data, _world| {
                data.invoke_remove_any(entity, value.as_ref());
            });
        }
        self.destroy_staging = staging;
    }

    /// Lets `structure_event::destroy_world` account for entities it
    /// invalidated directly (bypassing `commit_destroy_entity`, which
    /// would re-stage callbacks per-entity rather than per-world).
    pub(crate) fn adjust_entity_count_for_destroy(&mut self, removed: usize) {
        self.entity_count -= removed;
    }

    pub(crate) fn commit_resize_backing_arrays(&mut self) {
        for slot in &mut self.archetype_slots {
            if let Some(archetype) = &mut slot.archetype {
                archetype.resize_backing_arrays();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ecs_test_guard;

    #[derive(Default, Clone, Copy, PartialEq, Debug)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Default, Clone, Copy, PartialEq, Debug)]
    struct Velocity(f32);

    #[test]
    fn new_world_bootstraps_the_empty_archetype() {
        let _guard = ecs_test_guard();
        let handle = World::create("w");
        world_registry::with_world(handle, |w| {
            assert_eq!(w.archetype_count(), 1);
            assert!(w.try_get_archetype(&Signature::new()).is_some());
        });
    }

    #[test]
    fn create_set_and_get_round_trip_a_component() {
        let _guard = ecs_test_guard();
        let handle = World::create("w");
        world_registry::with_world(handle, |w| {
            let e = w.create_entity();
            w.set(e, Position { x: 1.0, y: 2.0 });
            let loc = w.location_of(e).unwrap();
            let value = *w.archetype(loc.archetype_index).unwrap().column::<Position>(types::type_id_of::<Position>()).unwrap().get(loc.slot_index).unwrap();
            assert_eq!(value, Position { x: 1.0, y: 2.0 });
            assert_eq!(w.entity_count(), 1);
        });
    }

    #[test]
    fn set_moves_entity_across_archetypes_and_back() {
        let _guard = ecs_test_guard();
        let handle = World::create("w");
        world_registry::with_world(handle, |w| {
            let e = w.create_entity();
            w.set(e, Position { x: 0.0, y: 0.0 });
            assert_eq!(w.archetype_count(), 2);
            w.set(e, Velocity(3.0));
            assert_eq!(w.archetype_count(), 3);
            w.remove::<Velocity>(e);
            let loc = w.location_of(e).unwrap();
            assert!(w.archetype(loc.archetype_index).unwrap().has_column(types::type_id_of::<Position>()));
            assert!(!w.archetype(loc.archetype_index).unwrap().has_column(types::type_id_of::<Velocity>()));
        });
    }

    #[test]
    fn destroy_entity_invokes_remove_callback_and_frees_slot() {
        let _guard = ecs_test_guard();
        let handle = World::create("w");
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let entity = world_registry::with_world(handle, |w| {
            w.on_remove::<Position>(move |_, p| seen2.lock().unwrap().push(*p));
            let e = w.create_entity();
            w.set(e, Position { x: 5.0, y: 6.0 });
            w.destroy_entity(e);
            e
        })
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Position { x: 5.0, y: 6.0 }]);
        assert!(!entity_table::with_entity_table(|t| t.is_live(entity)));
    }

    #[test]
    fn add_component_callback_sees_default_as_old_value() {
        let _guard = ecs_test_guard();
        let handle = World::create("w");
        let captured_old = std::sync::Arc::new(std::sync::Mutex::new(None));
        let captured_old2 = captured_old.clone();
        world_registry::with_world(handle, |w| {
            w.on_set::<Position>(move |_, old, _| *captured_old2.lock().unwrap() = Some(*old));
            let e = w.create_entity();
            w.set(e, Position { x: 9.0, y: 9.0 });
        });
        assert_eq!(*captured_old.lock().unwrap(), Some(Position::default()));
    }

    #[test]
    fn transfer_moves_entity_and_its_components_between_worlds() {
        let _guard = ecs_test_guard();
        let source = World::create("a");
        let target = World::create("b");
        let entity = world_registry::with_world(source, |w| {
            let e = w.create_entity();
            w.set(e, Position { x: 1.0, y: 1.0 });
            e
        })
        .unwrap();

        world_registry::with_world(source, |w| w.transfer(entity, target));

        let moved_value = world_registry::with_world(target, |w| {
            let loc = w.location_of(entity).unwrap();
            *w.archetype(loc.archetype_index)
                .unwrap()
                .column::<Position>(types::type_id_of::<Position>())
                .unwrap()
                .get(loc.slot_index)
                .unwrap()
        })
        .unwrap();
        assert_eq!(moved_value, Position { x: 1.0, y: 1.0 });

        let still_in_source = world_registry::with_world(source, |w| w.location_of(entity).is_some()).unwrap();
        assert!(!still_in_source);
    }

    #[test]
    fn deferred_operations_apply_in_order_on_end_defer() {
        let _guard = ecs_test_guard();
        let handle = World::create("w");
        world_registry::with_world(handle, |w| {
            w.begin_defer();
            let e1 = w.create_entity();
            let e2 = w.create_entity();
            w.set(e1, Position { x: 1.0, y: 1.0 });
            w.set(e2, Position { x: 2.0, y: 2.0 });
            w.destroy_entity(e1);
            assert_eq!(w.entity_count(), 0);
            w.end_defer();
            assert_eq!(w.entity_count(), 1);
        });
    }

    #[test]
    fn destroy_empty_archetypes_removes_only_empty_ones() {
        let _guard = ecs_test_guard();
        let handle = World::create("w");
        world_registry::with_world(handle, |w| {
            let e = w.create_entity();
            w.set(e, Position::default());
            let before = w.archetype_count();
            w.destroy_empty_archetypes();
            // The empty-signature archetype (now empty, since `e` moved
            // out of it) is reclaimed; the Position archetype survives.
            assert!(w.archetype_count() < before);
            assert!(w.try_get_archetype(&{
                let mut sig = Signature::new();
                sig.add(types::type_id_of::<Position>());
                sig
            })
            .is_some());
        });
    }
}
