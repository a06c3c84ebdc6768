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

//! Type-erased component columns (C3).
//!
//! `ComponentBuffer` is the object-safe interface archetypes use to manage
//! columns without knowing their element type; `TypedBuffer<T>` is the one
//! concrete implementation, storing a real `Vec<T>` so drop and move stay
//! in safe Rust. Callers downcast back to `TypedBuffer<T>` via `as_any`
//! when they need the typed slice.

use std::any::Any;

use crate::component::Component;

/// Minimum column capacity; capacity always grows by doubling from here.
pub const MIN_CAPACITY: usize = 8;

fn next_capacity(n: usize) -> usize {
    let mut cap = MIN_CAPACITY;
    while cap < n {
        cap *= 2;
    }
    cap
}

/// Type-erased operations every component column supports.
pub trait ComponentBuffer: Any + Send + Sync {
    /// Grows capacity to at least `n` elements, doubling from `MIN_CAPACITY`.
    /// Never shrinks.
    fn ensure_capacity(&mut self, n: usize);

    /// Removes the value at `at` by moving the value at `last` into its
    /// place and truncating (swap-remove). The removed value is dropped.
    /// `last` must be the buffer's current last valid index.
    fn swap_remove(&mut self, at: usize, last: usize);

    /// Moves the value at `src` (where `last` is the current last valid
    /// index) into `dst` at `dst_index`, then swap-removes from `self`.
    /// `dst` must be a `TypedBuffer<T>` for the same `T` as `self`;
    /// implementations assert this via downcast.
    fn move_to(&mut self, src: usize, last: usize, dst: &mut dyn ComponentBuffer, dst_index: usize);

    /// Like `swap_remove`, but returns the removed value instead of
    /// dropping it, boxed behind `Any` for callback staging at sites that
    /// don't know the column's concrete type.
    fn take_removed(&mut self, at: usize, last: usize) -> Box<dyn Any + Send>;

    /// Returns a fresh, empty buffer of the same concrete component type as
    /// `self`. Used to materialize a destination column during a
    /// structural move when the target archetype has never stored this
    /// type before and the call site only has a type id, not the type.
    fn new_empty_like(&self) -> Box<dyn ComponentBuffer>;

    /// Appends a previously `take_removed`/`take_removed`-style boxed
    /// value. Used when moving a value into a column in a different
    /// archetype (possibly in a different world) where the two buffers
    /// can't be borrowed simultaneously for `move_to`. Panics if `value`
    /// is not this buffer's concrete type.
    fn push_boxed(&mut self, value: Box<dyn Any + Send>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Concrete, typed storage for one component type's column.
pub struct TypedBuffer<T: Component> {
    data: Vec<T>,
}

impl<T: Component> TypedBuffer<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    /// Appends `value` at the end of the column. Callers must keep this in
    /// sync with the owning archetype's `entity_count`.
    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    /// Overwrites the value at `index` in place, returning the old value.
    pub fn replace(&mut self, index: usize, value: T) -> T {
        std::mem::replace(&mut self.data[index], value)
    }
}

impl<T: Component> Default for TypedBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentBuffer for TypedBuffer<T> {
    fn ensure_capacity(&mut self, n: usize) {
        if self.data.capacity() >= n {
            return;
        }
        let target = next_capacity(n);
        self.data.reserve_exact(target - self.data.len());
    }

    fn swap_remove(&mut self, at: usize, last: usize) {
        debug_assert_eq!(last + 1, self.data.len());
        let _dropped = self.data.swap_remove(at);
    }

    fn take_removed(&mut self, at: usize, last: usize) -> Box<dyn Any + Send> {
        debug_assert_eq!(last + 1, self.data.len());
        Box::new(self.data.swap_remove(at))
    }

    fn new_empty_like(&self) -> Box<dyn ComponentBuffer> {
        Box::new(TypedBuffer::<T>::new())
    }

    fn push_boxed(&mut self, value: Box<dyn Any + Send>) {
        let value = *value.downcast::<T>().expect("push_boxed: destination buffer has a different component type");
        self.data.push(value);
    }

    fn move_to(&mut self, src: usize, last: usize, dst: &mut dyn ComponentBuffer, dst_index: usize) {
        debug_assert_eq!(last + 1, self.data.len());
        let value = self.data.swap_remove(src);
        let dst = dst
            .as_any_mut()
            .downcast_mut::<TypedBuffer<T>>()
            .expect("move_to: destination buffer has a different component type");
        debug_assert_eq!(dst.data.len(), dst_index);
        dst.data.push(value);
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_grows_by_power_of_two() {
        let mut buf: TypedBuffer<u32> = TypedBuffer::new();
        buf.ensure_capacity(1);
        assert_eq!(buf.capacity(), MIN_CAPACITY);
        buf.ensure_capacity(9);
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn swap_remove_drops_the_removed_value() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        #[derive(Default)]
        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut buf: TypedBuffer<Counted> = TypedBuffer::new();
        buf.push(Counted);
        buf.push(Counted);
        buf.swap_remove(0, 1);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn move_to_transfers_value_and_removes_from_source() {
        let mut src: TypedBuffer<u32> = TypedBuffer::new();
        src.push(10);
        src.push(20);
        let mut dst: TypedBuffer<u32> = TypedBuffer::new();
        dst.push(99);

        src.move_to(0, 1, &mut dst, 1);

        assert_eq!(src.as_slice(), &[20]);
        assert_eq!(dst.as_slice(), &[99, 10]);
    }

    #[test]
    fn take_removed_returns_ownership_instead_of_dropping() {
        let mut buf: TypedBuffer<u32> = TypedBuffer::new();
        buf.push(10);
        buf.push(20);
        let taken = buf.take_removed(0, 1);
        assert_eq!(*taken.downcast::<u32>().unwrap(), 10);
        assert_eq!(buf.as_slice(), &[20]);
    }

    #[test]
    fn push_boxed_appends_downcast_value() {
        let mut buf: TypedBuffer<u32> = TypedBuffer::new();
        buf.push_boxed(Box::new(42u32));
        assert_eq!(buf.as_slice(), &[42]);
    }

    #[test]
    fn new_empty_like_has_matching_type_and_no_values() {
        let mut src: TypedBuffer<u32> = TypedBuffer::new();
        src.push(1);
        let empty = src.new_empty_like();
        assert_eq!(empty.len(), 0);
        assert!(empty.as_any().downcast_ref::<TypedBuffer<u32>>().is_some());
    }

    #[test]
    #[should_panic(expected = "different component type")]
    fn move_to_panics_on_type_mismatch() {
        let mut src: TypedBuffer<u32> = TypedBuffer::new();
        src.push(1);
        let mut dst: TypedBuffer<f32> = TypedBuffer::new();
        src.move_to(0, 0, &mut dst, 0);
    }
}
