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

//! Convenience methods on `EntityHandle` that resolve the owning world
//! through the entity table and dispatch through a single `WorldHandle::with`
//! call each. Every call here is a no-op on a stale or foreign handle rather
//! than a panic, matching the rest of the crate's invalid-handle policy.

use crate::component::Component;
use crate::entity_table;
use crate::handle::{EntityHandle, WorldHandle};

impl EntityHandle {
    /// True iff this handle still resolves to a live entity.
    pub fn is_valid(self) -> bool {
        entity_table::with_entity_table(|t| t.is_live(self))
    }

    /// The world this entity currently lives in, if any.
    pub fn world(self) -> Option<WorldHandle> {
        entity_table::with_entity_table(|t| t.location(self)).map(|loc| loc.world)
    }

    pub fn has<T: Component>(self) -> bool {
        let Some(world) = self.world() else { return false };
        world.with(|w| w.has_component::<T>(self)).unwrap_or(false)
    }

    /// Returns an owned clone of `entity`'s `T`. Requires `T: Clone` since
    /// the value is copied out of the world's lock scope; callers that want
    /// a zero-copy read should use `WorldHandle::with(|w| w.get_component::<T>(entity))`.
    pub fn get<T: Component + Clone>(self) -> Option<T> {
        let world = self.world()?;
        world.with(|w| w.get_component::<T>(self).cloned())?
    }

    pub fn set<T: Component>(self, value: T) {
        if let Some(world) = self.world() {
            world.with(|w| w.set(self, value));
        }
    }

    pub fn remove<T: Component>(self) {
        if let Some(world) = self.world() {
            world.with(|w| w.remove::<T>(self));
        }
    }

    pub fn destroy(self) {
        if let Some(world) = self.world() {
            world.with(|w| w.destroy_entity(self));
        }
    }

    pub fn transfer(self, target_world: WorldHandle) {
        if let Some(world) = self.world() {
            world.with(|w| w.transfer(self, target_world));
        }
    }
}
