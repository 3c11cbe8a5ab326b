//! # Database Handle
//!
//! `Database` owns the mapping table, the maintenance queues and the
//! worker thread that drains them. All foreground operations are
//! lock-free: reads walk chain snapshots, writes CAS-prepend deltas, and
//! neither ever blocks on maintenance.
//!
//! Shared state lives in `DbShared` behind an `Arc` so the worker thread
//! and transaction handles reference one instance. The handle itself only
//! adds the two cold cells needed to shut the worker down exactly once.

pub(crate) mod maintenance;
pub(crate) mod search;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::mvcc::clock::{Timestamp, TS_LATEST};
use crate::mvcc::version::Version;
use crate::mvcc::{Clock, KeyRecord, Transaction};
use crate::tree::delta::Delta;
use crate::tree::mapping::MappingTable;
use crate::tree::page::{DataPage, Page, PageId, ROOT_PAGE};
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Capacity of each maintenance queue. Sends are non-blocking and drop on
/// overflow; the triggering condition re-nominates on the next read.
const MAINTENANCE_QUEUE_DEPTH: usize = 10;

/// State shared between the handle, its transactions and the worker.
pub(crate) struct DbShared {
    pub(crate) config: Config,
    pub(crate) table: MappingTable,
    pub(crate) clock: Clock,
    pub(crate) consolidate_tx: Sender<PageId>,
    pub(crate) consolidate_rx: Receiver<PageId>,
    pub(crate) split_tx: Sender<PageId>,
    pub(crate) split_rx: Receiver<PageId>,
}

/// An in-memory, lock-free, multi-version key/value store.
///
/// Dropping the handle closes it: the maintenance worker is signalled and
/// joined. In-flight operations on other threads must quiesce first.
pub struct Database {
    pub(crate) shared: Arc<DbShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<Sender<()>>>,
}

impl Database {
    /// Opens a store with the default configuration.
    pub fn new() -> Self {
        // Defaults always verify.
        Self::build(Config::default())
    }

    /// Opens a store with a caller-supplied configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        config.verify()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        let table = MappingTable::new();
        // The root exists from the start as an empty data page; the slot is
        // not yet visible to anyone, so a plain store suffices.
        table
            .slot(ROOT_PAGE)
            .store(Delta::base(Page::Data(DataPage::empty(ROOT_PAGE))));

        let (consolidate_tx, consolidate_rx) = bounded(MAINTENANCE_QUEUE_DEPTH);
        let (split_tx, split_rx) = bounded(MAINTENANCE_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let shared = Arc::new(DbShared {
            config,
            table,
            clock: Clock::new(),
            consolidate_tx,
            consolidate_rx,
            split_tx,
            split_rx,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || maintenance::worker_loop(worker_shared, shutdown_rx));

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
            shutdown: Mutex::new(Some(shutdown_tx)),
        }
    }

    /// Reads the newest committed value for `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get_at(key, TS_LATEST)
    }

    /// Reads the newest value for `key` written at or before `at`.
    pub fn get_at(&self, key: &[u8], at: Timestamp) -> Option<Vec<u8>> {
        search::lookup(&self.shared, key, at, None)
    }

    /// Writes a key/value pair, visible immediately.
    ///
    /// Fails with [`Error::TxnConflict`] if another transaction holds a
    /// pending intent on the same key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let version = Version::live(value.to_vec(), self.shared.clock.now());
        search::install_record(&self.shared, KeyRecord::write(key.to_vec(), version, None), true)
    }

    /// Writes a deletion tombstone for `key`.
    ///
    /// Fails with [`Error::TxnConflict`] like [`Database::put`].
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let version = Version::tombstone(self.shared.clock.now());
        search::install_record(&self.shared, KeyRecord::write(key.to_vec(), version, None), true)
    }

    /// Starts a new transaction.
    pub fn new_txn(&self) -> Transaction<'_> {
        Transaction::begin(self)
    }

    /// Runs `f` inside a transaction and commits it, retrying the whole
    /// closure on transaction conflicts.
    ///
    /// A conflict surfaced by the closure (a write that collided with
    /// another pending intent) or by the commit itself starts a fresh
    /// attempt; any other closure error is returned as-is. Each abandoned
    /// attempt is aborted before the next begins.
    pub fn with_txn<F>(&self, mut f: F) -> eyre::Result<()>
    where
        F: FnMut(&Transaction<'_>) -> eyre::Result<()>,
    {
        loop {
            let txn = self.new_txn();
            match f(&txn) {
                Ok(()) => match txn.commit() {
                    Ok(()) => return Ok(()),
                    Err(Error::TxnConflict) => continue,
                    Err(err) => return Err(err.into()),
                },
                Err(err) => {
                    if err.downcast_ref::<Error>() == Some(&Error::TxnConflict) {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Signals the maintenance worker and waits for it to exit. Safe to
    /// call more than once.
    pub fn close(&self) {
        drop(self.shutdown.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_database_uses_defaults() {
        let db = Database::new();
        assert_eq!(db.shared.config, Config::default());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config {
            max_delta_count: 0,
            ..Config::default()
        };
        assert!(matches!(
            Database::with_config(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let db = Database::new();
        db.close();
        db.close();
    }

    #[test]
    fn operations_still_work_after_close() {
        // Maintenance stops, correctness does not.
        let db = Database::new();
        db.close();
        db.put(b"k", b"v").unwrap();
        assert_eq!(db.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn root_page_starts_empty() {
        let db = Database::new();
        assert_eq!(db.get(b"anything"), None);
        assert_eq!(db.shared.table.last_allocated(), 1);
    }
}
