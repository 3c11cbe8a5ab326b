//! # Delta Records
//!
//! Every logical page is materialized as a singly linked chain of delta
//! records rooted at its mapping-table slot. A chain is a sequence of
//! key-deltas (one write each) ending in exactly one base record that
//! carries the page. Writers prepend with a CAS on the slot; readers walk
//! the prefix they observed, which stays valid even while maintenance
//! swaps the slot to a rebuilt chain.
//!
//! Nodes detached by consolidation or split may still be referenced by
//! in-flight readers, so they are retired through the epoch collector and
//! reclaimed only after every pinned reader has moved on.

use crate::mvcc::{KeyRecord, TxnCell};
use crate::tree::page::Page;
use crossbeam::epoch::{Atomic, Guard, Owned, Shared};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Payload of one chain node: a single key write or the base page.
#[derive(Debug)]
pub(crate) enum DeltaKind {
    Key(Arc<KeyRecord>),
    Base(Page),
}

/// One node of a page's delta chain.
#[derive(Debug)]
pub(crate) struct Delta {
    pub(crate) kind: DeltaKind,
    pub(crate) next: Atomic<Delta>,
}

impl Delta {
    pub(crate) fn key(record: Arc<KeyRecord>) -> Owned<Delta> {
        Owned::new(Delta {
            kind: DeltaKind::Key(record),
            next: Atomic::null(),
        })
    }

    pub(crate) fn base(page: Page) -> Owned<Delta> {
        Owned::new(Delta {
            kind: DeltaKind::Base(page),
            next: Atomic::null(),
        })
    }

    pub(crate) fn as_key(&self) -> Option<&Arc<KeyRecord>> {
        match &self.kind {
            DeltaKind::Key(record) => Some(record),
            DeltaKind::Base(_) => None,
        }
    }

    pub(crate) fn as_base(&self) -> Option<&Page> {
        match &self.kind {
            DeltaKind::Key(_) => None,
            DeltaKind::Base(page) => Some(page),
        }
    }
}

/// Counts the key-deltas that would survive a consolidation: records whose
/// transaction committed or that were written outside any transaction.
/// Pending intents and read markers do not push a page toward
/// consolidation.
pub(crate) fn effective_delta_count<'g>(head: Shared<'g, Delta>, guard: &'g Guard) -> usize {
    let mut count = 0;
    let mut node = head;
    while !node.is_null() {
        let delta = unsafe { node.deref() };
        if let Some(record) = delta.as_key() {
            if !record.read_intent && record.is_committed() {
                count += 1;
            }
        }
        node = delta.next.load(Ordering::Acquire, guard);
    }
    count
}

/// Walks to the chain tail and returns its page.
///
/// Panics if the chain is malformed: no base at the tail, or a base that is
/// not the tail. Both are structural corruption, not recoverable errors.
pub(crate) fn base_page<'g>(head: Shared<'g, Delta>, guard: &'g Guard) -> &'g Page {
    let mut node = head;
    loop {
        assert!(!node.is_null(), "delta chain has no base page");
        let delta = unsafe { node.deref() };
        let next = delta.next.load(Ordering::Acquire, guard);
        match &delta.kind {
            DeltaKind::Base(page) => {
                assert!(next.is_null(), "base page must be the chain tail");
                return page;
            }
            DeltaKind::Key(_) => node = next,
        }
    }
}

/// Scans the chain above the base for a pending intent on `key` owned by a
/// transaction other than `writer`. This is the write-write conflict check.
pub(crate) fn pending_conflict<'g>(
    head: Shared<'g, Delta>,
    key: &[u8],
    writer: Option<&Arc<TxnCell>>,
    guard: &'g Guard,
) -> bool {
    let mut node = head;
    while !node.is_null() {
        let delta = unsafe { node.deref() };
        match &delta.kind {
            DeltaKind::Base(_) => return false,
            DeltaKind::Key(record) => {
                if record.is_pending() && !record.owned_by(writer) && record.key == key {
                    return true;
                }
            }
        }
        node = delta.next.load(Ordering::Acquire, guard);
    }
    false
}

/// Links `records` (head-most first) over a fresh base holding `page` and
/// returns the new chain head. The chain is private to the caller until it
/// is installed into a slot.
pub(crate) fn build_chain(records: Vec<Arc<KeyRecord>>, page: Page) -> Owned<Delta> {
    let mut head = Delta::base(page);
    for record in records.into_iter().rev() {
        let node = Delta::key(record);
        node.next.store(head, Ordering::Relaxed);
        head = node;
    }
    head
}

/// Retires every node of a detached chain through the epoch collector.
///
/// # Safety
///
/// The chain must be unreachable from any mapping-table slot. In-flight
/// readers may still hold references; reclamation happens after their
/// epochs retire.
pub(crate) unsafe fn defer_destroy_chain<'g>(head: Shared<'g, Delta>, guard: &'g Guard) {
    let mut node = head;
    while !node.is_null() {
        let next = node.deref().next.load(Ordering::Acquire, guard);
        guard.defer_destroy(node);
        node = next;
    }
}

/// Frees a chain that was never published.
///
/// # Safety
///
/// No other thread may have observed any node of the chain.
pub(crate) unsafe fn free_unpublished_chain(head: Shared<'_, Delta>) {
    let guard = crossbeam::epoch::unprotected();
    let mut node = head;
    while !node.is_null() {
        let owned = node.into_owned();
        node = owned.next.load(Ordering::Relaxed, guard);
        drop(owned);
    }
}
