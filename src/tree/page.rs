//! # Pages
//!
//! A page is the base record at the tail of a delta chain. Data pages hold
//! sorted key records plus sibling links; index pages hold a single
//! separator and two child ids. The tree only ever deepens by replacing a
//! data page's slot with an index page over two freshly allocated children,
//! so an index page never accumulates deltas of its own.

use crate::mvcc::KeyRecord;
use std::sync::Arc;

/// Identifier of a page slot in the mapping table. Ids are 1-based.
pub type PageId = u64;

/// The root page id. Fixed for the lifetime of a database.
pub const ROOT_PAGE: PageId = 1;

/// A leaf holding sorted key records.
///
/// Records are shared with in-flight readers of older chain snapshots, so
/// the page stores them behind `Arc` and never mutates one in place.
#[derive(Debug, Clone)]
pub struct DataPage {
    pub id: PageId,
    pub keys: Vec<Arc<KeyRecord>>,
    pub left_sibling: Option<PageId>,
    pub right_sibling: Option<PageId>,
}

impl DataPage {
    pub fn empty(id: PageId) -> Self {
        Self {
            id,
            keys: Vec::new(),
            left_sibling: None,
            right_sibling: None,
        }
    }

    /// Binary search for `key`. The key list is strictly sorted ascending.
    pub fn find(&self, key: &[u8]) -> Option<&Arc<KeyRecord>> {
        self.keys
            .binary_search_by(|rec| rec.key.as_slice().cmp(key))
            .ok()
            .map(|idx| &self.keys[idx])
    }
}

/// An interior routing node: one separator, two children.
#[derive(Debug, Clone)]
pub struct IndexPage {
    pub id: PageId,
    pub separator: Vec<u8>,
    pub left: PageId,
    pub right: PageId,
}

impl IndexPage {
    /// Routes a search key to a child id.
    ///
    /// Keys at or above the separator live under the right child; the split
    /// that created this page partitioned its records the same way.
    pub fn route(&self, key: &[u8]) -> PageId {
        if self.separator.as_slice() <= key {
            self.right
        } else {
            self.left
        }
    }
}

/// Base record stored at the tail of a chain.
#[derive(Debug, Clone)]
pub enum Page {
    Data(DataPage),
    Index(IndexPage),
}

impl Page {
    pub fn id(&self) -> PageId {
        match self {
            Page::Data(page) => page.id,
            Page::Index(page) => page.id,
        }
    }

    pub fn as_data(&self) -> Option<&DataPage> {
        match self {
            Page::Data(page) => Some(page),
            Page::Index(_) => None,
        }
    }
}
