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

//! Component marker trait.
//!
//! A component is any `'static + Send + Sync + Default` value. `Send +
//! Sync` are required here (rather than left to callers) because
//! component columns live behind the process-global, mutex-guarded world
//! registry. `Default` is required because the set-callback path needs to
//! synthesize a stand-in "old" value the moment a component is first added
//! to an entity that never had one; without a uniform bound, that path
//! would need type specialization to skip the synthesis for the types that
//! register no callbacks at all.

/// Marker trait for component types.
pub trait Component: 'static + Send + Sync + Default {}

impl<T: 'static + Send + Sync + Default> Component for T {}
