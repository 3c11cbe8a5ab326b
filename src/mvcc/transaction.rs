//! # Transaction Lifecycle
//!
//! Transactions are lightweight write-intent handles. A transaction owns no
//! data of its own: every record it writes carries a shared reference to the
//! transaction's status cell, and commit is a single atomic flip of that
//! cell. Readers decide visibility by loading the status through the
//! reference, so an arbitrary number of records becomes visible at once.
//!
//! ## States
//!
//! ```text
//! ┌─────────┐    commit()    ┌───────────┐
//! │ Pending │ ─────────────> │ Committed │
//! └─────────┘                └───────────┘
//!      │
//!      │ close()
//!      v
//! ┌─────────┐
//! │ Aborted │
//! └─────────┘
//! ```
//!
//! A transaction terminates exactly once. The losing side of a racing
//! commit/close observes [`crate::Error::TxnConflict`]. Records written by
//! an aborted transaction stay in their chains until the next consolidation
//! discards them.

use crate::db::{search, Database};
use crate::error::{Error, Result};
use crate::mvcc::clock::{Timestamp, TS_LATEST};
use crate::mvcc::version::{KeyRecord, Version};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TxnStatus {
    Unknown = 0,
    Pending = 1,
    Aborted = 2,
    Committed = 3,
}

impl TxnStatus {
    fn from_raw(raw: u64) -> Self {
        match raw {
            1 => TxnStatus::Pending,
            2 => TxnStatus::Aborted,
            3 => TxnStatus::Committed,
            _ => TxnStatus::Unknown,
        }
    }
}

/// Shared status cell referenced by every record a transaction writes.
///
/// The cell is the unit of atomicity: a commit CAS here is the only point
/// where the transaction's writes switch from invisible to visible.
#[derive(Debug)]
pub(crate) struct TxnCell {
    pub(crate) created_at: Timestamp,
    status: AtomicU64,
}

impl TxnCell {
    pub(crate) fn new(created_at: Timestamp) -> Self {
        Self {
            created_at,
            status: AtomicU64::new(TxnStatus::Pending as u64),
        }
    }

    pub(crate) fn status(&self) -> TxnStatus {
        TxnStatus::from_raw(self.status.load(Ordering::SeqCst))
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.status() == TxnStatus::Pending
    }

    fn terminate(&self, target: TxnStatus) -> Result<()> {
        self.status
            .compare_exchange(
                TxnStatus::Pending as u64,
                target as u64,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| Error::TxnConflict)
    }

    pub(crate) fn commit(&self) -> Result<()> {
        self.terminate(TxnStatus::Committed)
    }

    pub(crate) fn abort(&self) -> Result<()> {
        self.terminate(TxnStatus::Aborted)
    }
}

/// A transaction handle bound to its database.
///
/// Writes made through the handle stay invisible to other readers until
/// [`Transaction::commit`] succeeds. Dropping a handle that is still
/// pending aborts it.
pub struct Transaction<'db> {
    db: &'db Database,
    cell: Arc<TxnCell>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn begin(db: &'db Database) -> Self {
        let cell = Arc::new(TxnCell::new(db.shared.clock.now()));
        Self { db, cell }
    }

    pub(crate) fn cell(&self) -> &Arc<TxnCell> {
        &self.cell
    }

    /// Timestamp taken when the transaction was created.
    pub fn created_at(&self) -> Timestamp {
        self.cell.created_at
    }

    /// Current status of the transaction.
    pub fn status(&self) -> TxnStatus {
        self.cell.status()
    }

    /// Writes a key/value pair as a pending intent of this transaction.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let version = Version::live(value.to_vec(), self.db.shared.clock.now());
        let record = KeyRecord::write(key.to_vec(), version, Some(Arc::clone(&self.cell)));
        search::install_record(&self.db.shared, record, true)
    }

    /// Writes a deletion tombstone as a pending intent of this transaction.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let version = Version::tombstone(self.db.shared.clock.now());
        let record = KeyRecord::write(key.to_vec(), version, Some(Arc::clone(&self.cell)));
        search::install_record(&self.db.shared, record, true)
    }

    /// Reads the newest version visible to this transaction, including its
    /// own pending writes.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get_at(key, TS_LATEST)
    }

    /// Reads the newest version at or before `at` that is visible to this
    /// transaction.
    pub fn get_at(&self, key: &[u8], at: Timestamp) -> Option<Vec<u8>> {
        search::lookup(&self.db.shared, key, at, Some(&self.cell))
    }

    /// Records a read dependency on `key` without writing a value.
    ///
    /// The marker makes conflicting writers fail until this transaction
    /// terminates; consolidation discards it afterwards.
    pub fn track_read(&self, key: &[u8]) -> Result<()> {
        let record = KeyRecord::read_intent(key.to_vec(), Arc::clone(&self.cell));
        search::install_record(&self.db.shared, record, false)
    }

    /// Atomically publishes every write of this transaction.
    ///
    /// Fails with [`Error::TxnConflict`] if the transaction already
    /// terminated.
    pub fn commit(&self) -> Result<()> {
        self.cell.commit()
    }

    /// Aborts the transaction. Its intents are discarded by the next
    /// consolidation of the pages they touched.
    ///
    /// Fails with [`Error::TxnConflict`] if the transaction already
    /// terminated.
    pub fn close(&self) -> Result<()> {
        self.cell.abort()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // A handle that was never committed or closed must not leave its
        // intents pending forever.
        let _ = self.cell.abort();
    }
}
