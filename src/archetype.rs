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

//! Archetype storage: one signature, one buffer per component type, a
//! parallel entity-handle column (C4).

use rustc_hash::FxHashMap;

use crate::buffer::{ComponentBuffer, TypedBuffer};
use crate::component::Component;
use crate::handle::{EntityHandle, WorldHandle};
use crate::signature::Signature;
use crate::types::ComponentTypeId;

/// Columnar storage for every entity sharing one component signature.
///
/// Buffer slots are pre-sized to the signature's length and positioned in
/// the signature's ascending order, but each slot starts empty (`None`):
/// at construction time only component ids are known, not the concrete
/// Rust types behind them, so the typed buffer for a given id is built by
/// `ensure_column::<T>` (when the caller knows `T`) or `ensure_column_like`
/// (cloning the shape of an existing column of the same type elsewhere)
/// the first time that column is actually needed. Fixing positions up
/// front, rather than assigning them in creation order, is what lets
/// transfer-between-worlds address columns positionally instead of by id.
pub struct Archetype {
    world: WorldHandle,
    signature: Signature,
    slot_index: usize,
    version: u32,
    entities: Vec<EntityHandle>,
    buffers: Vec<Option<Box<dyn ComponentBuffer>>>,
    column_of: FxHashMap<ComponentTypeId, usize>,
    capacity: usize,
}

impl Archetype {
    pub(crate) fn new(world: WorldHandle, signature: Signature, slot_index: usize, version: u32) -> Self {
        let mut column_of = FxHashMap::default();
        for (i, &id) in signature.ids().iter().enumerate() {
            column_of.insert(id, i);
        }
        let buffers = (0..signature.count()).map(|_| None).collect();
        Self {
            world,
            signature,
            slot_index,
            version,
            entities: Vec::new(),
            buffers,
            column_of,
            capacity: 0,
        }
    }

    pub fn world(&self) -> WorldHandle {
        self.world
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }

    /// True iff `id` is part of this signature and its column has been
    /// materialized (every entity currently in the archetype has a value
    /// for it).
    pub(crate) fn has_column(&self, id: ComponentTypeId) -> bool {
        self.column_of
            .get(&id)
            .map(|&pos| self.buffers[pos].is_some())
            .unwrap_or(false)
    }

    /// `id`'s fixed position in this archetype's column order, whether or
    /// not a buffer has been materialized there yet. `None` if `id` is not
    /// part of this signature at all.
    pub(crate) fn column_position(&self, id: ComponentTypeId) -> Option<usize> {
        self.column_of.get(&id).copied()
    }

    /// Materializes the typed column for `id` if not already present.
    pub(crate) fn ensure_column<T: Component>(&mut self, id: ComponentTypeId) {
        let Some(&pos) = self.column_of.get(&id) else { return };
        if self.buffers[pos].is_some() {
            return;
        }
        let mut buffer: Box<dyn ComponentBuffer> = Box::new(TypedBuffer::<T>::new());
        buffer.ensure_capacity(self.capacity.max(crate::buffer::MIN_CAPACITY));
        self.buffers[pos] = Some(buffer);
    }

    /// Materializes the column at `position` by cloning the shape (not the
    /// contents) of `template`, for when the caller has a buffer of the
    /// right type in hand but not the type itself.
    pub(crate) fn ensure_column_like(&mut self, position: usize, template: &dyn ComponentBuffer) {
        if self.buffers[position].is_some() {
            return;
        }
        let mut buffer = template.new_empty_like();
        buffer.ensure_capacity(self.capacity.max(crate::buffer::MIN_CAPACITY));
        self.buffers[position] = Some(buffer);
    }

    /// Materialized column index for `id`, or `None` if `id` isn't part of
    /// this signature or its column hasn't been created yet.
    pub(crate) fn column_index(&self, id: ComponentTypeId) -> Option<usize> {
        let pos = *self.column_of.get(&id)?;
        self.buffers[pos].is_some().then_some(pos)
    }

    pub fn column<T: Component>(&self, id: ComponentTypeId) -> Option<&TypedBuffer<T>> {
        let idx = self.column_index(id)?;
        self.buffers[idx].as_ref()?.as_any().downcast_ref::<TypedBuffer<T>>()
    }

    pub fn column_mut<T: Component>(&mut self, id: ComponentTypeId) -> Option<&mut TypedBuffer<T>> {
        let idx = self.column_index(id)?;
        self.buffers[idx].as_mut()?.as_any_mut().downcast_mut::<TypedBuffer<T>>()
    }

    pub(crate) fn column_by_index_mut(&mut self, index: usize) -> &mut dyn ComponentBuffer {
        self.buffers[index]
            .as_mut()
            .expect("column_by_index_mut: column not yet materialized")
            .as_mut()
    }

    /// Appends `entity` as a new, uninitialized row; component columns are
    /// populated by the caller immediately afterward. Returns the row index.
    pub(crate) fn append_entity(&mut self, entity: EntityHandle) -> usize {
        self.ensure_capacity(self.entities.len() + 1);
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Swap-removes row `row`, returning the handle of whichever entity now
    /// occupies that row (the one previously last), if any. Every column
    /// must already be materialized (true for any row that came from
    /// `append_entity` followed by normal `set` calls).
    pub(crate) fn swap_remove_row(&mut self, row: usize) -> Option<EntityHandle> {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.swap_remove(row, last);
        }
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Swap-removes row `row` from the entity column only, leaving every
    /// component buffer untouched. For callers that have already handled
    /// each buffer individually (capturing or moving its value) and just
    /// need the parallel entity array brought back in sync. Returns the
    /// handle of whichever entity now occupies `row`, if any.
    pub(crate) fn swap_remove_entities_only(&mut self, row: usize) -> Option<EntityHandle> {
        self.entities.swap_remove(row);
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    pub(crate) fn ensure_capacity(&mut self, n: usize) {
        if n <= self.capacity {
            return;
        }
        let mut cap = self.capacity.max(crate::buffer::MIN_CAPACITY);
        while cap < n {
            cap *= 2;
        }
        self.capacity = cap;
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.ensure_capacity(cap);
        }
    }

    /// Sets capacity to the smallest power of two >= `entity_count`
    /// (minimum 8), rewriting all columns. Unlike `ensure_capacity` this
    /// may shrink the logical capacity watermark.
    pub fn resize_backing_arrays(&mut self) {
        let mut cap = crate::buffer::MIN_CAPACITY;
        while cap < self.entities.len() {
            cap *= 2;
        }
        self.capacity = cap;
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.ensure_capacity(cap);
        }
    }

}
