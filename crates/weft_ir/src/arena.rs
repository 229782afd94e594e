//! Append-only, ID-indexed storage for graph entities.
//!
//! Channels, bundles, expressions, and module definitions are allocated into
//! an [`Arena`] and referred to by small copyable IDs rather than references,
//! so the graph can be serialized and fingerprinted as plain data.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Trait for opaque ID types used as arena keys.
pub trait ArenaId: Copy {
    /// Creates an ID from a raw `u32` index.
    fn from_raw(index: u32) -> Self;

    /// Returns the raw `u32` index.
    fn as_raw(self) -> u32;
}

/// A dense container whose IDs stay valid for its whole lifetime.
///
/// Items are only ever appended. Allocation order is observable through
/// [`iter`](Self::iter) and is part of what makes generation deterministic.
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
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Returns the ID the next [`alloc`](Self::alloc) will hand out.
    pub fn next_id(&self) -> I {
        I::from_raw(self.items.len() as u32)
    }

    /// Appends an item and returns its ID.
    pub fn alloc(&mut self, item: T) -> I {
        let id = self.next_id();
        self.items.push(item);
        id
    }

    /// Returns the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID was not allocated by this arena.
    pub fn get(&self, id: I) -> &T {
        &self.items[id.as_raw() as usize]
    }

    /// Returns the item with the given ID, or `None` if it is out of range.
    pub fn try_get(&self, id: I) -> Option<&T> {
        self.items.get(id.as_raw() as usize)
    }

    /// Returns a mutable reference to the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID was not allocated by this arena.
    pub fn get_mut(&mut self, id: I) -> &mut T {
        &mut self.items[id.as_raw() as usize]
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been allocated.
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

    /// Iterates over all allocated IDs in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = I> {
        (0..self.items.len() as u32).map(I::from_raw)
    }

    /// Iterates over items in allocation order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        self.get(id)
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        self.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ChannelId, ExprId};

    #[test]
    fn alloc_returns_sequential_ids() {
        let mut arena: Arena<ChannelId, &str> = Arena::new();
        let a = arena.alloc("address");
        let b = arena.alloc("data");
        assert_eq!(a.as_raw(), 0);
        assert_eq!(b.as_raw(), 1);
        assert_eq!(arena[b], "data");
    }

    #[test]
    fn next_id_predicts_alloc() {
        let mut arena: Arena<ExprId, u64> = Arena::new();
        let predicted = arena.next_id();
        assert_eq!(arena.alloc(3), predicted);
    }

    #[test]
    fn try_get_out_of_range() {
        let arena: Arena<ChannelId, u32> = Arena::new();
        assert!(arena.try_get(ChannelId::from_raw(0)).is_none());
    }

    #[test]
    fn get_mut_modifies() {
        let mut arena: Arena<ExprId, u64> = Arena::new();
        let id = arena.alloc(2);
        arena[id] = 3;
        assert_eq!(arena[id], 3);
    }

    #[test]
    fn ids_and_values_follow_allocation_order() {
        let mut arena: Arena<ChannelId, char> = Arena::new();
        for c in ['r', 'w', 'a'] {
            arena.alloc(c);
        }
        let ids: Vec<u32> = arena.ids().map(|i| i.as_raw()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(arena.values().collect::<String>(), "rwa");
    }

    #[test]
    fn serde_roundtrip_keeps_ids() {
        let mut arena: Arena<ChannelId, String> = Arena::new();
        arena.alloc("req".to_string());
        arena.alloc("ack".to_string());
        let json = serde_json::to_string(&arena).unwrap();
        let restored: Arena<ChannelId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored[ChannelId::from_raw(1)], "ack");
    }
}
