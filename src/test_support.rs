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

//! Serializes tests that touch the process-global singletons (C1/C6/C7)
//! and resets them on entry, so tests running in parallel on the default
//! test harness don't see each other's type ids, entity handles, or worlds.

use std::sync::Mutex;

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Acquire before touching `types`, `entity_table`, or `world_registry` in
/// a test. Resets all three singletons while held, so the test starts from
/// an empty process state. Hold the returned guard for the test's duration.
#[doc(hidden)]
pub fn ecs_test_guard() -> impl Drop {
    let guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    crate::types::reset_for_tests();
    crate::entity_table::reset_for_tests();
    crate::world_registry::reset_for_tests();
    guard
}
