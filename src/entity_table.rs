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

//! Process-global entity table (C6).
//!
//! A growable slot array plus a FIFO free-index queue. The version on a
//! slot is bumped on `free`, not on `allocate`, so the version handed back
//! by `allocate` always matches the slot's currently stored version.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::handle::{EntityHandle, WorldHandle};

const INITIAL_CAPACITY: usize = 1024;

/// Where a live entity's data currently lives. Acts as the non-owning
/// back-reference from the entity table into a world's archetype storage;
/// it is validated against the archetype's own version on every dereference
/// rather than chased as a raw pointer (see DESIGN.md).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EntityLocation {
    pub world: WorldHandle,
    pub archetype_index: usize,
    pub archetype_version: u32,
    pub slot_index: usize,
}

struct EntitySlot {
    location: Option<EntityLocation>,
    version: u32,
}

pub(crate) struct EntityTable {
    slots: Vec<EntitySlot>,
    /// High-water mark of slots ever handed out; `slots.len()` may run
    /// ahead of this after a doubling growth, holding unused placeholders.
    terminating_index: usize,
    free: VecDeque<u32>,
}

impl EntityTable {
    fn new() -> Self {
        // Slot 0 is reserved: version starts at 1 so the zero handle
        // (index 0, version 0) never resolves, and it is never reused.
        let slots = vec![EntitySlot { location: None, version: 1 }];
        Self { slots, terminating_index: 1, free: VecDeque::new() }
    }

    pub fn allocate(&mut self) -> EntityHandle {
        if let Some(index) = self.free.pop_front() {
            let version = self.slots[index as usize].version;
            return EntityHandle { index, version };
        }
        if self.terminating_index == self.slots.len() {
            let new_len = (self.slots.len() * 2).max(INITIAL_CAPACITY);
            self.slots
                .resize_with(new_len, || EntitySlot { location: None, version: 1 });
        }
        let index = self.terminating_index as u32;
        self.terminating_index += 1;
        let version = self.slots[index as usize].version;
        EntityHandle { index, version }
    }

    /// Commits `location` for `handle`, which must have just been returned
    /// by `allocate` (or reserved via `reserve`).
    pub fn set_location(&mut self, handle: EntityHandle, location: EntityLocation) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.version == handle.version {
                slot.location = Some(location);
            }
        }
    }

    pub fn location(&self, handle: EntityHandle) -> Option<EntityLocation> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.version != handle.version {
            return None;
        }
        slot.location
    }

    pub fn is_live(&self, handle: EntityHandle) -> bool {
        self.location(handle).is_some()
    }

    /// Bumps the slot's version, clears its location, and pushes it onto
    /// the free queue. No-op if `handle` does not resolve.
    pub fn free(&mut self, handle: EntityHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.version == handle.version {
                slot.version = slot.version.wrapping_add(1).max(1);
                slot.location = None;
                self.free.push_back(handle.index);
            }
        }
    }

    /// Bumps a slot's version without freeing its index for reuse yet
    /// (used by deferred create to make a reserved handle unobservable as
    /// live, then either committed via `set_location` or abandoned and
    /// returned to the free queue by the caller).
    pub fn bump_version(&mut self, index: u32) -> u32 {
        let slot = &mut self.slots[index as usize];
        slot.version = slot.version.wrapping_add(1).max(1);
        slot.location = None;
        slot.version
    }

    /// Returns `index` to the free queue without touching its version.
    pub fn release_to_free_list(&mut self, index: u32) {
        self.free.push_back(index);
    }

    pub fn update_slot_index(&mut self, handle: EntityHandle, slot_index: usize) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.version == handle.version {
                if let Some(loc) = &mut slot.location {
                    loc.slot_index = slot_index;
                }
            }
        }
    }
}

static ENTITY_TABLE: Mutex<Option<EntityTable>> = Mutex::new(None);

pub(crate) fn with_entity_table<R>(f: impl FnOnce(&mut EntityTable) -> R) -> R {
    let mut guard = ENTITY_TABLE.lock();
    f(guard.get_or_insert_with(EntityTable::new))
}

/// Test-visible reset: discards every entity handle ever allocated.
#[doc(hidden)]
pub fn reset_for_tests() {
    *ENTITY_TABLE.lock() = None;
}
