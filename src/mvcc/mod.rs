//! # Multi-Version Concurrency Control
//!
//! bwdb layers snapshot reads and write intents over the Bw-tree chains.
//! The moving parts:
//!
//! - **Versions** (`version`): per-key descending-time lists with
//!   tombstones. A snapshot read selects the newest version at or before
//!   its timestamp.
//! - **Write intents**: a key record written inside a transaction points at
//!   the transaction's shared status cell. Until that cell commits, the
//!   record is visible only to its owner and to write-write conflict
//!   detection.
//! - **Transactions** (`transaction`): a status cell with a single CAS
//!   transition out of `Pending`. Commit publishes every intent of the
//!   transaction at once; abort condemns them to be discarded by the next
//!   consolidation.
//! - **Clock** (`clock`): strictly monotonic wall-clock timestamps taken at
//!   write submission; `0` is the read-the-latest sentinel.
//!
//! There is no lock table and no deadlock detection. Writers detect
//! conflicts at install time by scanning the target page's delta chain for
//! a foreign pending intent on the same key, and the loser returns
//! [`crate::Error::TxnConflict`] immediately.

pub mod clock;
pub mod transaction;
pub mod version;

pub use clock::{Timestamp, TS_LATEST};
pub use transaction::{Transaction, TxnStatus};
pub use version::{Lookup, Version};

pub(crate) use clock::Clock;
pub(crate) use transaction::TxnCell;
pub(crate) use version::KeyRecord;
