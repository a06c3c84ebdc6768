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

//! Process-global component type registry (C1).
//!
//! Assigns a dense id to each distinct component type on first mention.
//! Ids are never reused and lookups by id are O(1) (a `Vec` index).

use std::any::TypeId;
use std::collections::HashMap;

use parking_lot::Mutex;

use crate::component::Component;

/// Dense, process-global, monotonically assigned component type id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Size/alignment/drop metadata captured at first registration. Actual
/// move/drop of column data is delegated to `Vec<T>`'s own drop glue; this
/// descriptor exists for introspection only (see `World::memory_stats`-style
/// reporting).
#[derive(Clone, Copy, Debug)]
pub struct ComponentDescriptor {
    pub size: usize,
    pub align: usize,
    pub needs_drop: bool,
}

#[derive(Default)]
struct TypeRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    descriptors: Vec<ComponentDescriptor>,
}

impl TypeRegistry {
    fn id_of<T: Component>(&mut self) -> ComponentTypeId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.by_type.get(&type_id) {
            return id;
        }
        let id = ComponentTypeId(self.descriptors.len() as u32);
        self.descriptors.push(ComponentDescriptor {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            needs_drop: std::mem::needs_drop::<T>(),
        });
        self.by_type.insert(type_id, id);
        id
    }

    fn descriptor(&self, id: ComponentTypeId) -> Option<ComponentDescriptor> {
        self.descriptors.get(id.index()).copied()
    }
}

static TYPE_REGISTRY: Mutex<Option<TypeRegistry>> = Mutex::new(None);

fn with_registry<R>(f: impl FnOnce(&mut TypeRegistry) -> R) -> R {
    let mut guard = TYPE_REGISTRY.lock();
    f(guard.get_or_insert_with(TypeRegistry::default))
}

/// Returns the dense id for `T`, assigning one on first call.
pub fn type_id_of<T: Component>() -> ComponentTypeId {
    with_registry(|r| r.id_of::<T>())
}

/// Returns the descriptor registered for `id`, if any component of that id
/// has been seen.
pub fn descriptor_of(id: ComponentTypeId) -> Option<ComponentDescriptor> {
    with_registry(|r| r.descriptor(id))
}

/// Test-visible reset of the global type registry. Component type ids are
/// normally stable for the process lifetime; tests that assert on specific
/// id values call this first so ids are deterministic within a test run.
#[doc(hidden)]
pub fn reset_for_tests() {
    *TYPE_REGISTRY.lock() = None;
}
