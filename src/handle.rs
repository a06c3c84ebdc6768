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

//! Opaque (index, version) handles.
//!
//! Every handle's zero value (index 0, version 0) is permanently invalid:
//! slot 0 of every slot array is initialized with version >= 1 and no
//! payload, so the default value of a handle never resolves.

use std::fmt;

/// Stable external reference to an entity in the process-global entity table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityHandle {
    pub(crate) index: u32,
    pub(crate) version: u32,
}

impl EntityHandle {
    pub const INVALID: EntityHandle = EntityHandle { index: 0, version: 0 };

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn version(self) -> u32 {
        self.version
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({}v{})", self.index, self.version)
    }
}

/// Stable external reference to a world in the process-global world registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WorldHandle {
    pub(crate) index: u32,
    pub(crate) version: u32,
}

impl WorldHandle {
    pub const INVALID: WorldHandle = WorldHandle { index: 0, version: 0 };

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn version(self) -> u32 {
        self.version
    }

    /// Acquires this world's lock and runs `f` with direct `&mut World`
    /// access. `None` if the handle no longer resolves to a live world.
    /// The zero-copy escape hatch for batches of operations that would
    /// otherwise re-resolve the handle on every call.
    pub fn with<R>(self, f: impl FnOnce(&mut crate::world::World) -> R) -> Option<R> {
        crate::world_registry::with_world(self, f)
    }
}

impl fmt::Debug for WorldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorldHandle({}v{})", self.index, self.version)
    }
}

/// Stable external reference to an archetype within a specific world.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeHandle {
    pub(crate) world: WorldHandle,
    pub(crate) index: u32,
    pub(crate) version: u32,
}

impl ArchetypeHandle {
    pub fn world(self) -> WorldHandle {
        self.world
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn version(self) -> u32 {
        self.version
    }
}

impl fmt::Debug for ArchetypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ArchetypeHandle({:?}, {}v{})",
            self.world, self.index, self.version
        )
    }
}
