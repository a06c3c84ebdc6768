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

//! Process-global world registry (C7).
//!
//! Same slot-array/free-list/version shape as the entity table, sized
//! small (initial 4, doubling). Each occupied slot wraps its `World` in
//! its own `Arc<Mutex<_>>` so unrelated worlds never contend with one
//! another; the registry-level mutex only guards the slot array itself
//! (creation, destruction, growth), never a world's own lock. `with_world`
//! clones the `Arc` out and drops the registry guard before locking the
//! world, so a cross-world operation (e.g. a transfer reaching into a
//! second world) never re-enters the registry lock while holding it.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::WorldHandle;
use crate::world::World;

const INITIAL_CAPACITY: usize = 4;

struct WorldSlot {
    world: Option<Arc<Mutex<World>>>,
    version: u32,
}

pub(crate) struct WorldRegistry {
    slots: Vec<WorldSlot>,
    terminating_index: usize,
    free: VecDeque<u32>,
}

impl WorldRegistry {
    fn new() -> Self {
        // Slot 0's version starts at 1 so the zero handle is permanently invalid.
        let slots = vec![WorldSlot { world: None, version: 1 }];
        Self { slots, terminating_index: 1, free: VecDeque::new() }
    }

    fn reserve_slot(&mut self) -> u32 {
        if let Some(index) = self.free.pop_front() {
            return index;
        }
        if self.terminating_index == self.slots.len() {
            let new_len = (self.slots.len() * 2).max(INITIAL_CAPACITY);
            self.slots.resize_with(new_len, || WorldSlot { world: None, version: 1 });
        }
        let index = self.terminating_index as u32;
        self.terminating_index += 1;
        index
    }

    pub fn create(&mut self, name: String) -> WorldHandle {
        let index = self.reserve_slot();
        let version = self.slots[index as usize].version;
        let handle = WorldHandle { index, version };
        let world = World::new(handle, name);
        self.slots[index as usize].world = Some(Arc::new(Mutex::new(world)));
        handle
    }

    pub fn is_valid(&self, handle: WorldHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .map(|slot| slot.version == handle.version && slot.world.is_some())
            .unwrap_or(false)
    }

    /// Clones out the `Arc` for `handle`'s world, if live. A brief borrow of
    /// `self`; the caller locks the returned `Arc` after the registry guard
    /// that produced it has already been dropped.
    fn world_arc(&self, handle: WorldHandle) -> Option<Arc<Mutex<World>>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.version != handle.version {
            return None;
        }
        slot.world.clone()
    }

    pub fn try_get_by_name(&self, name: &str) -> Option<WorldHandle> {
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(world) = &slot.world {
                if world.lock().name() == name {
                    return Some(WorldHandle { index: index as u32, version: slot.version });
                }
            }
        }
        None
    }

    pub fn all(&self) -> Vec<WorldHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.world.is_some())
            .map(|(index, slot)| WorldHandle { index: index as u32, version: slot.version })
            .collect()
    }

    /// Removes the world at `handle` and bumps the slot version so the
    /// handle is invalid immediately, before any internal teardown runs.
    /// Returns the (possibly still shared) `Arc`; teardown locks it rather
    /// than requiring sole ownership, since a self-destroy reached through
    /// a deferred-event drain may still be holding a clone of it.
    pub fn take(&mut self, handle: WorldHandle) -> Option<Arc<Mutex<World>>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.version != handle.version {
            return None;
        }
        let world = slot.world.take()?;
        slot.version = slot.version.wrapping_add(1).max(1);
        self.free.push_back(handle.index);
        Some(world)
    }
}

static WORLD_REGISTRY: Mutex<Option<WorldRegistry>> = Mutex::new(None);

pub(crate) fn with_registry<R>(f: impl FnOnce(&mut WorldRegistry) -> R) -> R {
    let mut guard = WORLD_REGISTRY.lock();
    f(guard.get_or_insert_with(WorldRegistry::new))
}

/// Resolves `handle` and runs `f` with direct `&mut World` access. The
/// registry lock is held only long enough to clone the world's `Arc`; it is
/// released before `f` runs, so `f` (or anything it calls, including a
/// nested `with_world` for a different world) never re-enters this lock
/// while it is held.
pub(crate) fn with_world<R>(handle: WorldHandle, f: impl FnOnce(&mut World) -> R) -> Option<R> {
    let arc = with_registry(|r| r.world_arc(handle))?;
    let mut guard = arc.lock();
    Some(f(&mut guard))
}

/// Test-visible reset: discards every world ever created.
#[doc(hidden)]
pub fn reset_for_tests() {
    *WORLD_REGISTRY.lock() = None;
}
