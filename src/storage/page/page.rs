//! Page - an in-memory typed page with identity and dirty tracking.
//!
//! A [`Page`] couples a [`PageKey`] identity with category-specific
//! content and a dirty marker naming the transaction that last modified
//! it. Pages are shared between the per-operation working set and the
//! buffer pool as [`PageRef`]s.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{Error, PageCategory, PageKey, Result, TransactionId};
use crate::storage::page::{HeaderPage, InternalPage, LeafPage, RootPointerPage};

/// Shared handle to a cached page.
///
/// The working set and the buffer pool hold the same `Arc`, so repeated
/// lookups during one mutation observe a single in-memory version.
pub type PageRef = Arc<RwLock<Page>>;

/// Category-specific page content.
///
/// A closed set of variants; the category tag in the page's identity is
/// the authoritative discriminator, and the checked accessors below turn
/// a mismatch into a loud [`Error::Invariant`] instead of a wrong-type
/// read.
#[derive(Debug, Clone)]
pub enum PageBody {
    Leaf(LeafPage),
    Internal(InternalPage),
    RootPointer(RootPointerPage),
    Header(HeaderPage),
}

impl PageBody {
    /// The category this body belongs under.
    pub fn category(&self) -> PageCategory {
        match self {
            PageBody::Leaf(_) => PageCategory::Leaf,
            PageBody::Internal(_) => PageCategory::Internal,
            PageBody::RootPointer(_) => PageCategory::RootPointer,
            PageBody::Header(_) => PageCategory::Header,
        }
    }
}

/// An in-memory page: identity, dirty marker, typed content.
#[derive(Debug)]
pub struct Page {
    key: PageKey,
    dirtier: Option<TransactionId>,
    body: PageBody,
}

impl Page {
    /// Create a page.
    ///
    /// # Panics
    /// Panics if the body variant disagrees with the key's category;
    /// constructing such a page is a programming error, not a runtime
    /// condition.
    pub fn new(key: PageKey, body: PageBody) -> Self {
        assert_eq!(
            key.category,
            body.category(),
            "page body does not match key category"
        );
        Page {
            key,
            dirtier: None,
            body,
        }
    }

    /// Wrap a page in a shared handle.
    pub fn into_ref(self) -> PageRef {
        Arc::new(RwLock::new(self))
    }

    /// The page's identity.
    #[inline]
    pub fn key(&self) -> PageKey {
        self.key
    }

    /// The transaction that dirtied the page, if any.
    #[inline]
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    /// Whether the page has unflushed modifications.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    /// Set or clear the dirty marker.
    #[inline]
    pub fn mark_dirty(&mut self, owner: Option<TransactionId>) {
        self.dirtier = owner;
    }

    // ========================================================================
    // Checked body accessors
    // ========================================================================

    pub fn as_leaf(&self) -> Result<&LeafPage> {
        match &self.body {
            PageBody::Leaf(leaf) => Ok(leaf),
            _ => Err(Error::Invariant("expected a leaf page")),
        }
    }

    pub fn as_leaf_mut(&mut self) -> Result<&mut LeafPage> {
        match &mut self.body {
            PageBody::Leaf(leaf) => Ok(leaf),
            _ => Err(Error::Invariant("expected a leaf page")),
        }
    }

    pub fn as_internal(&self) -> Result<&InternalPage> {
        match &self.body {
            PageBody::Internal(node) => Ok(node),
            _ => Err(Error::Invariant("expected an internal page")),
        }
    }

    pub fn as_internal_mut(&mut self) -> Result<&mut InternalPage> {
        match &mut self.body {
            PageBody::Internal(node) => Ok(node),
            _ => Err(Error::Invariant("expected an internal page")),
        }
    }

    pub fn as_root_pointer(&self) -> Result<&RootPointerPage> {
        match &self.body {
            PageBody::RootPointer(ptr) => Ok(ptr),
            _ => Err(Error::Invariant("expected the root pointer page")),
        }
    }

    pub fn as_root_pointer_mut(&mut self) -> Result<&mut RootPointerPage> {
        match &mut self.body {
            PageBody::RootPointer(ptr) => Ok(ptr),
            _ => Err(Error::Invariant("expected the root pointer page")),
        }
    }

    pub fn as_header(&self) -> Result<&HeaderPage> {
        match &self.body {
            PageBody::Header(header) => Ok(header),
            _ => Err(Error::Invariant("expected a header page")),
        }
    }

    pub fn as_header_mut(&mut self) -> Result<&mut HeaderPage> {
        match &mut self.body {
            PageBody::Header(header) => Ok(header),
            _ => Err(Error::Invariant("expected a header page")),
        }
    }

    /// Borrow the raw body (used by the codec).
    pub(crate) fn body(&self) -> &PageBody {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;

    fn leaf_key() -> PageKey {
        PageKey::new(TableId(1), 4, PageCategory::Leaf)
    }

    #[test]
    fn test_dirty_marker_lifecycle() {
        let parent = PageKey::new(TableId(1), 0, PageCategory::RootPointer);
        let mut page = Page::new(leaf_key(), PageBody::Leaf(LeafPage::new(parent)));
        assert!(!page.is_dirty());

        let tid = TransactionId::new();
        page.mark_dirty(Some(tid));
        assert_eq!(page.dirtier(), Some(tid));

        page.mark_dirty(None);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_checked_accessor_rejects_wrong_category() {
        let parent = PageKey::new(TableId(1), 0, PageCategory::RootPointer);
        let page = Page::new(leaf_key(), PageBody::Leaf(LeafPage::new(parent)));

        assert!(page.as_leaf().is_ok());
        assert!(matches!(page.as_internal(), Err(Error::Invariant(_))));
    }

    #[test]
    #[should_panic(expected = "page body does not match key category")]
    fn test_mismatched_body_panics() {
        let parent = PageKey::new(TableId(1), 0, PageCategory::RootPointer);
        let key = PageKey::new(TableId(1), 4, PageCategory::Internal);
        let _ = Page::new(key, PageBody::Leaf(LeafPage::new(parent)));
    }
}
