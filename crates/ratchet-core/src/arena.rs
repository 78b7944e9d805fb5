//! Index-keyed store with auditable erasure
//!
//! Ratchets keep key material per epoch or per message index. An entry is
//! either live, erased, or was never allocated, and those three cases must
//! never be confused: an erased epoch must reject its ciphertexts for good,
//! while a vacant one may still be filled.
//!
//! Erasure zeroizes the value in place before dropping it. Tombstones at the
//! bottom of the arena fold into a floor so that a long-running session does
//! not accumulate them.

use std::collections::BTreeMap;

use zeroize::Zeroize;

use crate::error::RatchetError;

/// State of one arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Holds a value
    Live,
    /// Held a value that has been erased
    Erased,
    /// Never allocated
    Vacant,
}

#[derive(Clone)]
enum Slot<V> {
    Live(V),
    Erased,
}

/// Arena of zeroizable values indexed by `u64`.
///
/// Every index below `floor` is erased. `live` counts `Slot::Live` entries.
#[derive(Clone)]
pub struct KeyArena<V: Zeroize> {
    floor: u64,
    live: usize,
    slots: BTreeMap<u64, Slot<V>>,
}

impl<V: Zeroize> Default for KeyArena<V> {
    fn default() -> Self {
        Self { floor: 0, live: 0, slots: BTreeMap::new() }
    }
}

impl<V: Zeroize> std::fmt::Debug for KeyArena<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyArena")
            .field("floor", &self.floor)
            .field("live", &self.live_indices().collect::<Vec<_>>())
            .finish()
    }
}

impl<V: Zeroize> KeyArena<V> {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `index`, replacing (and zeroizing) any live value.
    ///
    /// # Errors
    ///
    /// - `AlreadyConsumed` if `index` has been erased
    pub fn insert(&mut self, index: u64, value: V) -> Result<(), RatchetError> {
        if self.status(index) == SlotStatus::Erased {
            return Err(RatchetError::AlreadyConsumed { index });
        }
        match self.slots.insert(index, Slot::Live(value)) {
            Some(Slot::Live(mut old)) => old.zeroize(),
            _ => self.live += 1,
        }
        Ok(())
    }

    /// Borrow the live value at `index`.
    pub fn get(&self, index: u64) -> Option<&V> {
        match self.slots.get(&index) {
            Some(Slot::Live(value)) => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow the live value at `index`.
    pub fn get_mut(&mut self, index: u64) -> Option<&mut V> {
        match self.slots.get_mut(&index) {
            Some(Slot::Live(value)) => Some(value),
            _ => None,
        }
    }

    /// Move the live value out and forget the index.
    ///
    /// No tombstone is left, so the index reads as vacant afterwards. For
    /// callers that reject consumed indices themselves, such as a receiver
    /// whose counter has already passed them.
    pub fn remove(&mut self, index: u64) -> Option<V> {
        if self.status(index) != SlotStatus::Live {
            return None;
        }
        match self.slots.remove(&index) {
            Some(Slot::Live(value)) => {
                self.live -= 1;
                Some(value)
            },
            _ => None,
        }
    }

    /// Zeroize the value at `index` and leave a tombstone.
    ///
    /// Vacant indices become tombstones too, so they can never be filled.
    pub fn erase(&mut self, index: u64) {
        if index < self.floor {
            return;
        }
        if let Some(Slot::Live(mut value)) = self.slots.insert(index, Slot::Erased) {
            value.zeroize();
            self.live -= 1;
        }
        self.compact();
    }

    /// Zeroize every index below `watermark`.
    pub fn erase_below(&mut self, watermark: u64) {
        if watermark <= self.floor {
            return;
        }
        let kept = self.slots.split_off(&watermark);
        for (_, slot) in std::mem::replace(&mut self.slots, kept) {
            if let Slot::Live(mut value) = slot {
                value.zeroize();
                self.live -= 1;
            }
        }
        self.floor = watermark;
        self.compact();
    }

    /// Status of `index`.
    pub fn status(&self, index: u64) -> SlotStatus {
        if index < self.floor {
            return SlotStatus::Erased;
        }
        match self.slots.get(&index) {
            Some(Slot::Live(_)) => SlotStatus::Live,
            Some(Slot::Erased) => SlotStatus::Erased,
            None => SlotStatus::Vacant,
        }
    }

    /// Live indices in ascending order.
    pub fn live_indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().filter_map(|(index, slot)| match slot {
            Slot::Live(_) => Some(*index),
            Slot::Erased => None,
        })
    }

    /// Live values with their indices, ascending.
    pub fn iter_live_mut(&mut self) -> impl Iterator<Item = (u64, &mut V)> + '_ {
        self.slots.iter_mut().filter_map(|(index, slot)| match slot {
            Slot::Live(value) => Some((*index, value)),
            Slot::Erased => None,
        })
    }

    /// Lowest live index.
    pub fn first_live(&self) -> Option<u64> {
        self.live_indices().next()
    }

    /// Highest live index.
    pub fn last_live(&self) -> Option<u64> {
        self.slots.iter().rev().find_map(|(index, slot)| match slot {
            Slot::Live(_) => Some(*index),
            Slot::Erased => None,
        })
    }

    /// Number of live values.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Entries held above the floor, live or tombstoned.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Indices below this are erased.
    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// Fold tombstones contiguous with the floor into it.
    fn compact(&mut self) {
        while let Some(entry) = self.slots.first_entry() {
            if *entry.key() != self.floor || !matches!(entry.get(), Slot::Erased) {
                break;
            }
            entry.remove();
            self.floor += 1;
        }
    }
}

impl<V: Zeroize> Zeroize for KeyArena<V> {
    fn zeroize(&mut self) {
        for slot in self.slots.values_mut() {
            if let Slot::Live(value) = slot {
                value.zeroize();
            }
        }
        self.slots.clear();
        self.live = 0;
    }
}
