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

//! Canonical, sorted component-type-id sets (C2).
//!
//! Two signatures are equal iff they contain the same ids, independent of
//! the order `add` was called in. The hash is cached and recomputed only
//! when the id list changes, mirroring the `ArchetypeLayout` pattern of
//! sorting once and folding a hash alongside the sorted ids.

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::types::ComponentTypeId;

const INLINE_CAPACITY: usize = 8;

#[derive(Clone, Default)]
pub struct Signature {
    ids: SmallVec<[ComponentTypeId; INLINE_CAPACITY]>,
    hash: u64,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(mut ids: SmallVec<[ComponentTypeId; INLINE_CAPACITY]>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        let hash = fold_hash(&ids);
        Self { ids, hash }
    }

    /// Inserts `id`, keeping the list sorted. Idempotent.
    pub fn add(&mut self, id: ComponentTypeId) {
        match self.ids.binary_search(&id) {
            Ok(_) => {}
            Err(pos) => {
                self.ids.insert(pos, id);
                self.hash = fold_hash(&self.ids);
            }
        }
    }

    /// Removes `id` if present. Idempotent.
    pub fn remove(&mut self, id: ComponentTypeId) {
        if let Ok(pos) = self.ids.binary_search(&id) {
            self.ids.remove(pos);
            self.hash = fold_hash(&self.ids);
        }
    }

    /// Replaces this signature's contents with `other`'s.
    pub fn copy_from(&mut self, other: &Signature) {
        self.ids.clear();
        self.ids.extend(other.ids.iter().copied());
        self.hash = other.hash;
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.hash = fold_hash(&self.ids);
    }

    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ComponentTypeId] {
        &self.ids
    }

    /// Returns a new owned signature with `id` added, leaving `self` intact.
    pub fn with_added(&self, id: ComponentTypeId) -> Signature {
        let mut next = self.clone();
        next.add(id);
        next
    }

    /// Returns a new owned signature with `id` removed, leaving `self` intact.
    pub fn with_removed(&self, id: ComponentTypeId) -> Signature {
        let mut next = self.clone();
        next.remove(id);
        next
    }
}

fn fold_hash(ids: &[ComponentTypeId]) -> u64 {
    // Deterministic fold over the canonically sorted id list so that
    // insertion order never affects the hash (see module docs).
    ids.iter()
        .fold(0xcbf29ce484222325u64, |acc, id| {
            (acc ^ id.index() as u64).wrapping_mul(0x100000001b3)
        })
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.ids.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ComponentTypeId {
        ComponentTypeId(n)
    }

    #[test]
    fn equality_is_order_independent() {
        let mut a = Signature::new();
        a.add(id(3));
        a.add(id(1));
        a.add(id(2));

        let mut b = Signature::new();
        b.add(id(2));
        b.add(id(3));
        b.add(id(1));

        assert_eq!(a, b);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.ids(), &[id(1), id(2), id(3)]);
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let mut a = Signature::new();
        a.add(id(1));
        a.add(id(1));
        assert_eq!(a.count(), 1);
        a.remove(id(5));
        assert_eq!(a.count(), 1);
        a.remove(id(1));
        a.remove(id(1));
        assert!(a.is_empty());
    }

    #[test]
    fn with_added_leaves_original_untouched() {
        let base = Signature::new();
        let extended = base.with_added(id(7));
        assert!(base.is_empty());
        assert!(extended.contains(id(7)));
    }
}
