//! # Page Mapping Table
//!
//! The indirection layer of the Bw-tree. Every page id resolves to a slot
//! holding the head of that page's delta chain, so maintenance can replace
//! an entire chain with one CAS while readers keep walking the snapshot
//! they already loaded.
//!
//! Slots are shared sentinels (`ChainHead`), not bare pointers. The slot
//! vector grows by building a copy with at least double the length and
//! CAS-swapping the vector pointer; because the sentinels themselves are
//! shared between generations, an install that races a growth lands in the
//! same sentinel both generations point at and is never lost.
//!
//! Ids are handed out by a monotonic counter, except that ids returned by
//! failed splits are recycled from a free pool first.

use crate::tree::delta::{free_unpublished_chain, Delta};
use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::page::PageId;

/// Sentinel at a mapping-table slot; `next` is the chain head.
///
/// A slot whose `next` is null has never been published. Once a chain is
/// installed the slot is never emptied again, only replaced.
#[derive(Debug)]
pub(crate) struct ChainHead {
    next: Atomic<Delta>,
}

impl ChainHead {
    pub(crate) fn new() -> Self {
        Self {
            next: Atomic::null(),
        }
    }

    /// Loads the current chain head.
    pub(crate) fn load<'g>(&self, guard: &'g Guard) -> Shared<'g, Delta> {
        self.next.load(Ordering::Acquire, guard)
    }

    /// CAS-installs a new chain head. On failure the new chain is handed
    /// back so the caller can retry or reclaim it.
    pub(crate) fn install<'g>(
        &self,
        expected: Shared<'_, Delta>,
        new: Owned<Delta>,
        guard: &'g Guard,
    ) -> Result<(), Owned<Delta>> {
        self.next
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire, guard)
            .map(|_| ())
            .map_err(|err| err.new)
    }

    /// Directly stores a chain head. Only valid while the slot is
    /// unpublished (fresh split children, the root at construction).
    pub(crate) fn store(&self, new: Owned<Delta>) {
        self.next.store(new, Ordering::Release);
    }

    /// Resets an unpublished slot so its id can return to the free pool.
    pub(crate) fn clear(&self) {
        self.next.store(Shared::null(), Ordering::Release);
    }
}

impl Drop for ChainHead {
    fn drop(&mut self) {
        // Last reference to this slot; whatever chain is left is ours.
        unsafe {
            let head = self.next.load(Ordering::Relaxed, epoch::unprotected());
            free_unpublished_chain(head);
        }
    }
}

struct SlotArray {
    slots: Vec<Arc<ChainHead>>,
}

/// Growable page-id to chain-head table with an id allocator and free pool.
pub(crate) struct MappingTable {
    current: Atomic<SlotArray>,
    next_id: AtomicU64,
    free_ids: SegQueue<PageId>,
}

impl MappingTable {
    /// A table with capacity for the root page only; it grows on demand.
    pub(crate) fn new() -> Self {
        let slots = vec![Arc::new(ChainHead::new())];
        Self {
            current: Atomic::new(SlotArray { slots }),
            next_id: AtomicU64::new(2),
            free_ids: SegQueue::new(),
        }
    }

    /// Resolves a page id to its slot sentinel.
    pub(crate) fn slot(&self, id: PageId) -> Arc<ChainHead> {
        let guard = &epoch::pin();
        let array = unsafe { self.current.load(Ordering::Acquire, guard).deref() };
        Arc::clone(&array.slots[(id - 1) as usize])
    }

    /// Hands out a page id, preferring ids recycled from failed splits.
    /// The table is grown as needed before the id is returned.
    pub(crate) fn allocate_id(&self) -> PageId {
        if let Some(id) = self.free_ids.pop() {
            return id;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.ensure_capacity(id);
        id
    }

    /// Returns an id to the free pool. The caller must have cleared the
    /// slot first.
    pub(crate) fn release_id(&self, id: PageId) {
        self.free_ids.push(id);
    }

    fn ensure_capacity(&self, id: PageId) {
        let guard = &epoch::pin();
        loop {
            let current = self.current.load(Ordering::Acquire, guard);
            let array = unsafe { current.deref() };
            if id as usize <= array.slots.len() {
                return;
            }

            let mut new_len = array.slots.len().max(1) * 2;
            while new_len < id as usize {
                new_len *= 2;
            }
            let mut slots = Vec::with_capacity(new_len);
            slots.extend(array.slots.iter().cloned());
            slots.resize_with(new_len, || Arc::new(ChainHead::new()));

            let swapped = self
                .current
                .compare_exchange(
                    current,
                    Owned::new(SlotArray { slots }),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                )
                .is_ok();
            if swapped {
                unsafe { guard.defer_destroy(current) };
            }
            // Re-check; a lost race may still have grown the table enough.
        }
    }

    /// Current slot capacity.
    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        let guard = &epoch::pin();
        unsafe { self.current.load(Ordering::Acquire, guard).deref() }
            .slots
            .len()
    }

    /// Highest id handed out so far. Slots above may be unpublished.
    #[cfg(test)]
    pub(crate) fn last_allocated(&self) -> PageId {
        self.next_id.load(Ordering::SeqCst) - 1
    }
}

impl Drop for MappingTable {
    fn drop(&mut self) {
        unsafe {
            let current = self.current.load(Ordering::Relaxed, epoch::unprotected());
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}
