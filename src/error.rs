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

//! Error types.
//!
//! Invalid handles are absorbed as silent no-ops (mutating entry points) or
//! `None`/`false` (accessors) everywhere else in the crate; this enum only
//! covers the handful of entry points the spec calls out as recoverable
//! failures rather than no-ops.

use std::fmt;

/// Recoverable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// `World::get_data`/`set_data` called against a world handle that no
    /// longer resolves. Callers are expected to check `World::is_valid`
    /// first; this is the fallback for callers that don't.
    WorldNotFound,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::WorldNotFound => write!(f, "world handle does not resolve to a live world"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EcsError>;
