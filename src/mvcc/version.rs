//! # Versions and Key Records
//!
//! Each key carries a list of timestamped versions in descending time
//! order. A lookup at snapshot `t` walks the list newest-to-oldest and
//! stops at the first version whose time is `<= t` (any version when `t`
//! is [`TS_LATEST`]). A tombstone at that position means the key was
//! deleted as of the snapshot; the outcome is distinguished from "never
//! written" so callers can stop searching older records for the key.
//!
//! A [`KeyRecord`] optionally references the transaction that wrote it.
//! While that transaction is pending the record is a write intent: only
//! the owning transaction (and conflict detection) can see it. Records are
//! shared-immutable once published into a chain; updates always produce a
//! new record.

use crate::mvcc::clock::{Timestamp, TS_LATEST};
use crate::mvcc::transaction::{TxnCell, TxnStatus};
use smallvec::SmallVec;
use std::sync::Arc;

/// One version of a value. Tombstones record deletions and carry no bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub value: Option<Vec<u8>>,
    pub time: Timestamp,
    pub tombstone: bool,
}

impl Version {
    pub fn live(value: Vec<u8>, time: Timestamp) -> Self {
        Self {
            value: Some(value),
            time,
            tombstone: false,
        }
    }

    pub fn tombstone(time: Timestamp) -> Self {
        Self {
            value: None,
            time,
            tombstone: true,
        }
    }
}

/// Outcome of a version-list lookup.
///
/// `Deleted` means a tombstone was the newest visible version; it ends the
/// search for the key even though no value is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    Deleted,
    Found(Vec<u8>),
}

/// A key together with its version history and write-intent state.
///
/// Most records hold a single version (one write); consolidation merges
/// histories, so the inline capacity covers the common case without
/// spilling.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub key: Vec<u8>,
    pub txn: Option<Arc<TxnCell>>,
    pub versions: SmallVec<[Version; 2]>,
    pub read_intent: bool,
}

impl KeyRecord {
    /// A record carrying one freshly written version, optionally owned by a
    /// transaction.
    pub(crate) fn write(key: Vec<u8>, version: Version, txn: Option<Arc<TxnCell>>) -> Self {
        let mut versions = SmallVec::new();
        versions.push(version);
        Self {
            key,
            txn,
            versions,
            read_intent: false,
        }
    }

    /// A read-dependency marker. Carries no versions.
    pub(crate) fn read_intent(key: Vec<u8>, txn: Arc<TxnCell>) -> Self {
        Self {
            key,
            txn: Some(txn),
            versions: SmallVec::new(),
            read_intent: true,
        }
    }

    /// Time of the newest version, used to order records during
    /// consolidation.
    pub(crate) fn newest_time(&self) -> Timestamp {
        self.versions.first().map_or(0, |v| v.time)
    }

    /// Whether the record is globally visible: written outside any
    /// transaction, or by one that has committed.
    pub(crate) fn is_committed(&self) -> bool {
        match &self.txn {
            None => true,
            Some(txn) => txn.status() == TxnStatus::Committed,
        }
    }

    /// Whether the owning transaction is still pending.
    pub(crate) fn is_pending(&self) -> bool {
        self.txn.as_ref().is_some_and(|txn| txn.is_pending())
    }

    /// Whether `reader` is the transaction that wrote this record.
    pub(crate) fn owned_by(&self, reader: Option<&Arc<TxnCell>>) -> bool {
        match (&self.txn, reader) {
            (Some(txn), Some(reader)) => Arc::ptr_eq(txn, reader),
            _ => false,
        }
    }

    /// Whether `reader` may observe this record at all.
    pub(crate) fn visible_to(&self, reader: Option<&Arc<TxnCell>>) -> bool {
        self.is_committed() || self.owned_by(reader)
    }

    /// Snapshot lookup over the version list.
    ///
    /// Versions newer than `at` are skipped unless `at` is [`TS_LATEST`].
    /// The first remaining version decides the outcome.
    pub(crate) fn lookup_at(&self, at: Timestamp, reader: Option<&Arc<TxnCell>>) -> Lookup {
        if !self.visible_to(reader) {
            return Lookup::NotFound;
        }
        for version in &self.versions {
            if at != TS_LATEST && version.time > at {
                continue;
            }
            if version.tombstone {
                return Lookup::Deleted;
            }
            return Lookup::Found(version.value.clone().unwrap_or_default());
        }
        Lookup::NotFound
    }

    /// A copy of this record with `older` versions appended after its own.
    ///
    /// The caller guarantees `older` really is older than every version in
    /// `self`, keeping the descending-time invariant.
    pub(crate) fn with_appended_versions(&self, older: &[Version]) -> Self {
        let mut merged = self.clone();
        merged.versions.extend(older.iter().cloned());
        merged
    }
}
