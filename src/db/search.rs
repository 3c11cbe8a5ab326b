//! # Traversal and Installation
//!
//! The two foreground paths over the tree.
//!
//! Reads start at the root slot and walk the chain they observe: index
//! bases route to a child slot, key-deltas are checked for a match, and a
//! data base ends the walk with a binary search. Foreign pending intents
//! and read markers are skipped. A read that walks more key-deltas than
//! `max_delta_count` nominates the leaf for consolidation on its way out.
//!
//! Writes route through base pages only (index pages never carry deltas),
//! scan the leaf chain for a conflicting foreign intent, then try to CAS a
//! fresh key-delta onto the head. Losing the CAS restarts the whole
//! routine, because the loss may have been a split or consolidation that
//! moved the key elsewhere.

use crate::db::DbShared;
use crate::error::{Error, Result};
use crate::mvcc::clock::Timestamp;
use crate::mvcc::version::Lookup;
use crate::mvcc::{KeyRecord, TxnCell};
use crate::tree::delta::{pending_conflict, Delta, DeltaKind};
use crate::tree::page::{Page, ROOT_PAGE};
use crossbeam::epoch;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Snapshot read of `key` at time `at` on behalf of `reader`.
pub(crate) fn lookup(
    shared: &DbShared,
    key: &[u8],
    at: Timestamp,
    reader: Option<&Arc<TxnCell>>,
) -> Option<Vec<u8>> {
    let guard = &epoch::pin();
    let mut id = ROOT_PAGE;
    let mut node = shared.table.slot(id).load(guard);
    let mut chain_len = 0usize;

    let result = loop {
        if node.is_null() {
            break None;
        }
        let delta = unsafe { node.deref() };
        match &delta.kind {
            DeltaKind::Base(Page::Index(index)) => {
                id = index.route(key);
                node = shared.table.slot(id).load(guard);
            }
            DeltaKind::Base(Page::Data(page)) => {
                break match page.find(key) {
                    Some(record) => match record.lookup_at(at, reader) {
                        Lookup::Found(value) => Some(value),
                        Lookup::Deleted | Lookup::NotFound => None,
                    },
                    None => None,
                };
            }
            DeltaKind::Key(record) => {
                chain_len += 1;
                let next = delta.next.load(Ordering::Acquire, guard);
                if record.visible_to(reader) && !record.read_intent && record.key == key {
                    match record.lookup_at(at, reader) {
                        Lookup::Found(value) => break Some(value),
                        // A tombstone ends the search; nothing older counts.
                        Lookup::Deleted => break None,
                        Lookup::NotFound => {}
                    }
                }
                node = next;
            }
        }
    };

    if chain_len > shared.config.max_delta_count {
        // Non-blocking nomination; a full queue just means the next long
        // read will nominate again.
        let _ = shared.consolidate_tx.try_send(id);
    }
    result
}

/// Routes `record` to its leaf and prepends it as a new key-delta.
///
/// With `check_conflicts`, a pending intent on the same key owned by a
/// different transaction fails the write with [`Error::TxnConflict`]
/// before anything is installed. Read markers skip the check: a read never
/// fails, it only leaves a trace for writers to collide with.
pub(crate) fn install_record(
    shared: &DbShared,
    record: KeyRecord,
    check_conflicts: bool,
) -> Result<()> {
    let record = Arc::new(record);
    let guard = &epoch::pin();

    loop {
        // Descend through index bases. Only a data page can be at the head
        // of a routed-to chain, possibly buried under key-deltas.
        let mut id = ROOT_PAGE;
        let mut slot = shared.table.slot(id);
        let mut head = slot.load(guard);
        loop {
            assert!(!head.is_null(), "page {id} has an empty chain");
            let delta = unsafe { head.deref() };
            match delta.as_base() {
                Some(Page::Index(index)) => {
                    id = index.route(&record.key);
                    slot = shared.table.slot(id);
                    head = slot.load(guard);
                }
                _ => break,
            }
        }

        if check_conflicts && pending_conflict(head, &record.key, record.txn.as_ref(), guard) {
            return Err(Error::TxnConflict);
        }

        let delta = Delta::key(Arc::clone(&record));
        delta.next.store(head, Ordering::Relaxed);
        match slot.install(head, delta, guard) {
            Ok(()) => return Ok(()),
            Err(lost) => {
                // Only the fresh node is ours; its next still points into
                // the live chain.
                drop(lost);
            }
        }
    }
}
