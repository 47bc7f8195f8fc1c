//! Fixed-capacity slot table with a bitmap free list.
//!
//! Everything here runs with the registry lock held: no allocation after
//! construction, no logging, no blocking.

use super::entry::{Entry, EntryKind};
use super::RegistryError;

/// Number of slots. Never exceeded.
pub const CAPACITY: usize = 1024;

const WORD_BITS: usize = 64;
const WORDS: usize = CAPACITY / WORD_BITS;

pub(crate) struct SlotTable {
    slots: Box<[Option<Entry>]>,
    occupied: [u64; WORDS],
    total: usize,
    per_kind: [usize; 3],
}

impl SlotTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![None; CAPACITY].into_boxed_slice(),
            occupied: [0; WORDS],
            total: 0,
            per_kind: [0; 3],
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn count_of(&self, kind: EntryKind) -> usize {
        self.per_kind.get(kind.slot()).copied().unwrap_or(0)
    }

    pub(crate) fn per_kind(&self) -> [usize; 3] {
        self.per_kind
    }

    pub(crate) fn get(&self, index: usize) -> Option<Entry> {
        self.slots.get(index).copied().flatten()
    }

    /// Lowest free slot, found one 64-slot word at a time.
    fn lowest_free(&self) -> Option<usize> {
        self.occupied
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .and_then(|(w, word)| {
                let bit = usize::try_from(word.trailing_ones()).ok()?;
                let index = w.checked_mul(WORD_BITS)?.checked_add(bit)?;
                (index < CAPACITY).then_some(index)
            })
    }

    fn set_bit(&mut self, index: usize, on: bool) {
        let mask = bit_mask(index);
        if let Some(word) = self.occupied.get_mut(index / WORD_BITS) {
            if on {
                *word |= mask;
            } else {
                *word &= !mask;
            }
        }
    }

    pub(crate) fn insert(&mut self, entry: Entry) -> Result<usize, RegistryError> {
        if self.total >= CAPACITY {
            return Err(RegistryError::Full { capacity: CAPACITY });
        }
        let index = self
            .lowest_free()
            .ok_or(RegistryError::Full { capacity: CAPACITY })?;
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(RegistryError::Full { capacity: CAPACITY })?;

        let kind = entry.kind();
        *slot = Some(entry);
        self.set_bit(index, true);
        self.total = self.total.saturating_add(1);
        if let Some(n) = self.per_kind.get_mut(kind.slot()) {
            *n = n.saturating_add(1);
        }
        Ok(index)
    }

    /// Free one slot, zeroing its contents first.
    pub(crate) fn remove(&mut self, index: usize) -> Result<EntryKind, RegistryError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(RegistryError::NotFound)?;
        let Some(entry) = slot.as_mut() else {
            return Err(RegistryError::NotFound);
        };

        let kind = entry.kind();
        entry.scrub();
        *slot = None;
        self.set_bit(index, false);
        self.total = self.total.saturating_sub(1);
        if let Some(n) = self.per_kind.get_mut(kind.slot()) {
            *n = n.saturating_sub(1);
        }
        Ok(kind)
    }

    /// Global index of the `type_index`-th occupied slot of `kind`, in array order.
    pub(crate) fn nth_of_kind(&self, kind: EntryKind, type_index: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some_and(|e| e.kind() == kind))
            .nth(type_index)
            .map(|(index, _)| index)
    }

    pub(crate) fn find(&self, mut pred: impl FnMut(&Entry) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(&mut pred))
    }

    /// Copy occupied slots matching `filter` into `out` without growing it.
    ///
    /// Stops once `out` reaches its reserved capacity.
    pub(crate) fn copy_into(
        &self,
        out: &mut Vec<(usize, Entry)>,
        filter: Option<EntryKind>,
    ) {
        for (index, slot) in self.slots.iter().enumerate() {
            if out.len() == out.capacity() {
                break;
            }
            if let Some(entry) = slot {
                if filter.map_or(true, |k| k == entry.kind()) {
                    out.push((index, *entry));
                }
            }
        }
    }

    /// Free every slot matching `filter`. Returns how many were freed.
    pub(crate) fn clear(&mut self, filter: Option<EntryKind>) -> usize {
        let mut freed = 0usize;
        for index in 0..CAPACITY {
            let matches = self
                .get(index)
                .is_some_and(|e| filter.map_or(true, |k| k == e.kind()));
            if matches && self.remove(index).is_ok() {
                freed = freed.saturating_add(1);
            }
        }
        freed
    }
}

fn bit_mask(index: usize) -> u64 {
    let bit = u32::try_from(index % WORD_BITS).unwrap_or(0);
    1u64.checked_shl(bit).unwrap_or(0)
}
