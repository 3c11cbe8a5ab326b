//! # bwdb - Lock-Free Multi-Version Key/Value Store
//!
//! bwdb is an in-memory key/value store built on a Bw-tree: a B+-tree
//! variant whose pages are reached through a mapping table and mutated by
//! atomically prepending small delta records instead of updating nodes in
//! place. Multi-version concurrency control rides on the same chains, so
//! readers never block and writers only ever contend on a single CAS.
//!
//! ## Quick Start
//!
//! ```
//! use bwdb::Database;
//!
//! let db = Database::new();
//! db.put(b"k", b"v").unwrap();
//! assert_eq!(db.get(b"k"), Some(b"v".to_vec()));
//!
//! let txn = db.new_txn();
//! txn.put(b"a", b"1").unwrap();
//! assert_eq!(db.get(b"a"), None); // invisible until commit
//! txn.commit().unwrap();
//! assert_eq!(db.get(b"a"), Some(b"1".to_vec()));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │   Public API (Database, Transaction)  │
//! ├──────────────────────────────────────┤
//! │ Search / Install   │  MVCC Versions   │
//! ├────────────────────┴─────────────────┤
//! │    Delta Chains + Mapping Table       │
//! ├──────────────────────────────────────┤
//! │ Maintenance Worker (consolidate/split)│
//! └──────────────────────────────────────┘
//! ```
//!
//! - Writes CAS-prepend a key-delta onto the target leaf's chain.
//! - Reads walk the chain snapshot they observed; long walks nominate the
//!   page for consolidation.
//! - A background worker folds chains into flat pages and splits pages
//!   that grew past their key budget. Detached chain nodes are reclaimed
//!   through epoch-based garbage collection once in-flight readers move on.
//! - Transactions tag their writes with a shared status cell; one CAS on
//!   that cell publishes or abandons all of them at once.
//!
//! ## Module Overview
//!
//! - [`config`]: tuning knobs and their validation
//! - [`error`]: the two stable error identities
//! - [`mvcc`]: versions, snapshot visibility, transactions, timestamps
//! - [`tree`]: pages, delta chains, the mapping table
//! - [`db`]: the database handle, traversal and background maintenance
//!
//! ## What bwdb is not
//!
//! There is no durability, replication, range scan or secondary index
//! support, and memory is reclaimed only by chain replacement plus epoch
//! GC. Snapshot isolation with write intents is the strongest guarantee
//! on offer.

pub mod config;
pub mod db;
pub mod error;
pub mod mvcc;
pub mod tree;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use mvcc::{Timestamp, Transaction, TxnStatus, TS_LATEST};
pub use tree::PageId;
