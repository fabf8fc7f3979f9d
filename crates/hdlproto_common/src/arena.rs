//! Generic arena for dense, ID-indexed storage of simulation entities.
//!
//! Signals, modules, and logic blocks are allocated once at construction and
//! never removed, so an append-only [`Arena`] gives stable IDs, O(1) lookup,
//! and iteration in allocation order (which the scheduler relies on for its
//! deterministic evaluation order).

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Trait for opaque ID types used as arena keys.
///
/// Implementors must provide a bijection between `u32` indices and the ID type.
pub trait ArenaId: Copy {
    /// Creates an ID from a raw `u32` index.
    fn from_raw(index: u32) -> Self;

    /// Returns the raw `u32` index.
    fn as_raw(self) -> u32;
}

/// A dense, ID-indexed container.
///
/// Items are always appended (never reordered or removed), making IDs stable
/// for the lifetime of the arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<I: ArenaId, T> {
    items: Vec<T>,
    #[serde(skip)]
    _marker: PhantomData<I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    /// Creates a new, empty arena.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Allocates a new item in the arena and returns its ID.
    pub fn alloc(&mut self, item: T) -> I {
        let id = I::from_raw(self.items.len() as u32);
        self.items.push(item);
        id
    }

    /// Returns a reference to the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is out of bounds.
    pub fn get(&self, id: I) -> &T {
        &self.items[id.as_raw() as usize]
    }

    /// Returns a reference to the item, or `None` if the ID was never allocated.
    pub fn try_get(&self, id: I) -> Option<&T> {
        self.items.get(id.as_raw() as usize)
    }

    /// Returns a mutable reference to the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is out of bounds.
    pub fn get_mut(&mut self, id: I) -> &mut T {
        &mut self.items[id.as_raw() as usize]
    }

    /// Returns the number of items in the arena.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the arena contains no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over `(ID, &T)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (I::from_raw(i as u32), item))
    }

    /// Iterates over `(ID, &mut T)` pairs in allocation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(i, item)| (I::from_raw(i as u32), item))
    }

    /// Iterates over references to items in allocation order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Iterates over mutable references to items in allocation order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BlockId, SignalId};

    #[test]
    fn alloc_and_get() {
        let mut arena: Arena<SignalId, &str> = Arena::new();
        let clk = arena.alloc("clk");
        let rst = arena.alloc("rst");
        assert_eq!(*arena.get(clk), "clk");
        assert_eq!(*arena.get(rst), "rst");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn try_get_out_of_range() {
        let mut arena: Arena<SignalId, u8> = Arena::new();
        arena.alloc(7);
        assert_eq!(arena.try_get(SignalId::from_raw(0)), Some(&7));
        assert!(arena.try_get(SignalId::from_raw(1)).is_none());
    }

    #[test]
    fn iteration_follows_allocation_order() {
        let mut arena: Arena<BlockId, &str> = Arena::new();
        arena.alloc("decode");
        arena.alloc("count");
        arena.alloc("flag");
        let names: Vec<_> = arena.values().copied().collect();
        assert_eq!(names, vec!["decode", "count", "flag"]);
    }

    #[test]
    fn get_mut_modifies() {
        let mut arena: Arena<SignalId, u64> = Arena::new();
        let id = arena.alloc(3);
        *arena.get_mut(id) += 4;
        assert_eq!(*arena.get(id), 7);
    }

    #[test]
    fn default_is_empty() {
        let arena: Arena<SignalId, u32> = Arena::default();
        assert!(arena.is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let mut arena: Arena<SignalId, String> = Arena::new();
        arena.alloc("a".to_string());
        arena.alloc("b".to_string());
        let json = serde_json::to_string(&arena).unwrap();
        let restored: Arena<SignalId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.get(SignalId::from_raw(1)), "b");
    }
}
