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

//! Per-(world, component type) callback lists and deferred payload queues
//! (C8).
//!
//! Grounded on the teacher's `ObserverRegistry`: a plain `Vec` of entries,
//! add/remove by identity, ordered invocation. Here the "observer" shape is
//! narrowed to the two fixed callback signatures the spec defines (set and
//! remove) instead of one open-ended event type.

use std::any::Any;

use crate::component::Component;
use crate::handle::EntityHandle;
use crate::types::ComponentTypeId;
use crate::world::World;

/// Identity used to unregister a previously registered callback.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CallbackId(u32);

struct SetEntry<T: Component> {
    id: CallbackId,
    f: Box<dyn FnMut(EntityHandle, &T, &mut T) + Send>,
}

struct RemoveEntry<T: Component> {
    id: CallbackId,
    f: Box<dyn FnMut(EntityHandle, &T) + Send>,
}

/// Callback lists, deferred queues, and the opaque world-scoped datum for
/// one (world, component type) pair. Lazily created on first `on_set`,
/// `on_remove`, or `set_data` call for that type.
pub(crate) struct PerTypeWorldData<T: Component> {
    next_id: u32,
    set_callbacks: Vec<SetEntry<T>>,
    remove_callbacks: Vec<RemoveEntry<T>>,
    datum: Option<T>,
    /// Pending values for deferred `set`, dequeued in FIFO order on drain.
    pub(crate) deferred_set_queue: std::collections::VecDeque<T>,
    /// Pending deferred-remove notifications; carries no payload (the
    /// value is read from storage at playback time), present so queue
    /// depth can be inspected per the data model.
    pub(crate) deferred_remove_queue: std::collections::VecDeque<EntityHandle>,
}

impl<T: Component> Default for PerTypeWorldData<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            set_callbacks: Vec::new(),
            remove_callbacks: Vec::new(),
            datum: None,
            deferred_set_queue: std::collections::VecDeque::new(),
            deferred_remove_queue: std::collections::VecDeque::new(),
        }
    }
}

impl<T: Component> PerTypeWorldData<T> {
    pub fn has_set_callback(&self) -> bool {
        !self.set_callbacks.is_empty()
    }

    pub fn has_remove_callback(&self) -> bool {
        !self.remove_callbacks.is_empty()
    }

    pub fn on_set(&mut self, f: impl FnMut(EntityHandle, &T, &mut T) + Send + 'static) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.set_callbacks.push(SetEntry { id, f: Box::new(f) });
        id
    }

    /// Adapts a ref-only callback (new value only) into the full
    /// `(entity, old, &mut new)` signature by discarding `old`.
    pub fn on_set_ref(&mut self, mut f: impl FnMut(EntityHandle, &mut T) + Send + 'static) -> CallbackId {
        self.on_set(move |entity, _old, new_value| f(entity, new_value))
    }

    pub fn remove_set_callback(&mut self, id: CallbackId) {
        self.set_callbacks.retain(|entry| entry.id != id);
    }

    pub fn on_remove(&mut self, f: impl FnMut(EntityHandle, &T) + Send + 'static) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.remove_callbacks.push(RemoveEntry { id, f: Box::new(f) });
        id
    }

    pub fn remove_remove_callback(&mut self, id: CallbackId) {
        self.remove_callbacks.retain(|entry| entry.id != id);
    }

    /// Invokes every set callback in registration order with `(entity,
    /// old, &mut new)`. Runs after the mutation is already applied to
    /// storage, per the spec's callback-after-mutation rule.
    pub fn invoke_set(&mut self, entity: EntityHandle, old: &T, new_value: &mut T) {
        for entry in &mut self.set_callbacks {
            (entry.f)(entity, old, new_value);
        }
    }

    pub fn invoke_remove(&mut self, entity: EntityHandle, removed: &T) {
        for entry in &mut self.remove_callbacks {
            (entry.f)(entity, removed);
        }
    }

    pub fn set_data(&mut self, value: T) {
        self.datum = Some(value);
    }

    pub fn get_data(&self) -> Option<&T> {
        self.datum.as_ref()
    }

    pub fn get_data_mut(&mut self) -> Option<&mut T> {
        self.datum.as_mut()
    }
}

/// Type-erased face of `PerTypeWorldData<T>` so a world can hold one flat,
/// sparse array indexed by dense component type id without knowing each
/// slot's concrete `T` (mirrors `ComponentBuffer`'s erasure of `TypedBuffer<T>`).
///
/// `Send` only, not `Sync`: the boxed callbacks are `FnMut + Send` (callers
/// never need to invoke one from two threads at once), and every world's
/// per-type data is already reached only through that world's own mutex, so
/// a `Sync` bound here would just be dead weight.
pub(crate) trait AnyWorldData: Any + Send {
    fn has_set_callback(&self) -> bool;
    fn has_remove_callback(&self) -> bool;

    /// Invokes every set callback with `(entity, old, &mut new)`, both
    /// downcast from `Any`. Panics if `old`/`new` are not of this slot's `T`.
    fn invoke_set_any(&mut self, entity: EntityHandle, old: &dyn Any, new_value: &mut dyn Any);

    /// Invokes every remove callback with `(entity, removed)`, downcast
    /// from `Any`. Panics if `removed` is not of this slot's `T`.
    fn invoke_remove_any(&mut self, entity: EntityHandle, removed: &dyn Any);

    /// Dequeues the next pending deferred-set value (FIFO) and commits it
    /// with the concrete component type this slot was created for, which
    /// the drain loop in `structure_event` has no other way to recover
    /// from a type-erased event record.
    fn commit_next_deferred_set(&mut self, world: &mut World, entity: EntityHandle, type_id: ComponentTypeId);

    /// Commits a deferred remove for `entity`/`type_id` using this slot's
    /// concrete component type.
    fn commit_next_deferred_remove(&mut self, world: &mut World, entity: EntityHandle, type_id: ComponentTypeId);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyWorldData for PerTypeWorldData<T> {
    fn has_set_callback(&self) -> bool {
        PerTypeWorldData::has_set_callback(self)
    }

    fn has_remove_callback(&self) -> bool {
        PerTypeWorldData::has_remove_callback(self)
    }

    fn invoke_set_any(&mut self, entity: EntityHandle, old: &dyn Any, new_value: &mut dyn Any) {
        let old = old.downcast_ref::<T>().expect("invoke_set_any: type mismatch");
        let new_value = new_value.downcast_mut::<T>().expect("invoke_set_any: type mismatch");
        self.invoke_set(entity, old, new_value);
    }

    fn invoke_remove_any(&mut self, entity: EntityHandle, removed: &dyn Any) {
        let removed = removed.downcast_ref::<T>().expect("invoke_remove_any: type mismatch");
        self.invoke_remove(entity, removed);
    }

    fn commit_next_deferred_set(&mut self, world: &mut World, entity: EntityHandle, type_id: ComponentTypeId) {
        if let Some(value) = self.deferred_set_queue.pop_front() {
            world.commit_set::<T>(entity, type_id, value);
        }
    }

    fn commit_next_deferred_remove(&mut self, world: &mut World, entity: EntityHandle, type_id: ComponentTypeId) {
        self.deferred_remove_queue.pop_front();
        world.commit_remove::<T>(entity, type_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
