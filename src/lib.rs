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

//! Sparse-archetype ECS core.
//!
//! Columnar archetype storage, a process-global entity table, and the
//! structural-mutation scheduler that moves entities between archetypes as
//! components are added and removed. Query/iteration, serialization, and
//! reflection are deliberately left to crates built on top of this one.

pub mod archetype;
pub mod buffer;
pub mod callback;
pub mod component;
pub mod entity;
pub mod entity_table;
pub mod error;
pub mod handle;
pub mod signature;
pub mod structure_event;
pub mod types;
pub mod world;
pub mod world_registry;

#[doc(hidden)]
pub mod test_support;

pub use component::Component;
pub use error::{EcsError, Result};
pub use handle::{ArchetypeHandle, EntityHandle, WorldHandle};
pub use signature::Signature;
pub use types::{ComponentDescriptor, ComponentTypeId};
pub use world::World;
