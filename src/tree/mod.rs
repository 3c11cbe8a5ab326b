//! # Bw-Tree Core
//!
//! The tree is a B+-tree shape expressed through indirection and deltas
//! instead of in-place node updates:
//!
//! ```text
//!  mapping table            delta chains
//! ┌───────────┐
//! │ 1 (root)  ├──> [index base: sep "m", left 2, right 3]
//! ├───────────┤
//! │ 2         ├──> [put "b"] -> [put "a"] -> [data base: "a".."l"]
//! ├───────────┤
//! │ 3         ├──> [data base: "m".."z"]
//! └───────────┘
//! ```
//!
//! - `page`: base records, either sorted-key data pages or one-separator
//!   index pages.
//! - `delta`: chain nodes prepended by writers; exactly one base per chain,
//!   always at the tail.
//! - `mapping`: the id-to-chain-head table, its CAS growth protocol, and
//!   the page-id allocator with its free pool.
//!
//! Readers walk whatever chain snapshot they loaded; writers CAS the slot
//! to prepend; maintenance CAS-swaps whole chains for consolidated or
//! split replacements and retires the detached nodes through the epoch
//! collector.

pub(crate) mod delta;
pub(crate) mod mapping;
pub mod page;

pub use page::{DataPage, IndexPage, Page, PageId, ROOT_PAGE};
