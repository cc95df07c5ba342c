//! Fixed-slot concurrent store.
//!
//! A `SlotCache` is a fixed array of slots, each guarded by its own lock.
//! A key hashes to exactly one slot; colliding keys overwrite each other,
//! which is the whole eviction policy. Callers obtain an [`Accessor`]
//! that holds the slot lock for its lifetime, inspect whatever the slot
//! currently holds, and may overwrite it.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

type Slot<K, V> = Mutex<Option<(K, Arc<V>)>>;

/// Hash-addressed map with a fixed number of lock-guarded slots.
pub struct SlotCache<K, V> {
    slots: Box<[Slot<K, V>]>,
    hasher: RandomState,
}

impl<K: Hash + Eq + Clone, V> SlotCache<K, V> {
    /// Create a cache with the given number of slots.
    pub fn new(slots: usize) -> Self {
        assert!(slots > 0, "cache needs at least one slot");
        Self {
            slots: (0..slots).map(|_| Mutex::new(None)).collect(),
            hasher: RandomState::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Lock the slot the key hashes to. The lock is held until the
    /// returned accessor is dropped.
    pub fn accessor<'a>(&'a self, key: &'a K) -> Accessor<'a, K, V> {
        let index = (self.hasher.hash_one(key) % self.slots.len() as u64) as usize;
        Accessor {
            key,
            guard: self.slots[index].lock(),
        }
    }
}

/// Exclusive access to one cache slot.
///
/// The slot may hold an entry for a different key (a collision) or
/// nothing; [`Accessor::get`] exposes the raw contents so callers can
/// compare keys, and [`Accessor::lookup`] does the comparison for them.
pub struct Accessor<'a, K, V> {
    key: &'a K,
    guard: MutexGuard<'a, Option<(K, Arc<V>)>>,
}

impl<K: Hash + Eq + Clone, V> Accessor<'_, K, V> {
    /// Whatever the slot currently holds, regardless of key.
    pub fn get(&self) -> Option<(&K, &Arc<V>)> {
        self.guard.as_ref().map(|(k, v)| (k, v))
    }

    /// The stored value, only when the slot holds this accessor's key.
    pub fn lookup(&self) -> Option<&Arc<V>> {
        match self.get() {
            Some((stored_key, value)) if stored_key == self.key => Some(value),
            _ => None,
        }
    }

    /// Store a value under this accessor's key, unconditionally
    /// overwriting whatever the slot held before.
    pub fn set(&mut self, value: Arc<V>) {
        *self.guard = Some((self.key.clone(), value));
    }
}
