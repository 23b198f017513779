//! Descent from a subtree root to the correct leaf.

use crate::buffer::BufferPool;
use crate::common::{Error, PageCategory, PageKey, Permissions, Result, TransactionId};
use crate::storage::page::PageRef;
use crate::storage::tuple::Field;
use crate::tree::{BTreeFile, WorkingSet};

impl BTreeFile {
    /// Find the leaf a key belongs in, or the leftmost leaf when no key
    /// is given (the entry point for full-file scans).
    ///
    /// Descent scans each internal page's entries in order and recurses
    /// into the left child of the first entry whose key is >= the search
    /// key, falling through to the last entry's right child. Equality
    /// routes left, so a key equal to a separator is found via the left
    /// subtree; split promotion keeps its `>=`-goes-right rule consistent
    /// with this.
    pub(crate) fn find_leaf(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page_key: PageKey,
        key: Option<Field>,
        perm: Permissions,
    ) -> Result<PageRef> {
        match page_key.category {
            PageCategory::Leaf => self.fetch_page(tid, ws, pool, page_key, perm),
            PageCategory::Internal => {
                let node_ref = self.fetch_page(tid, ws, pool, page_key, perm)?;
                let child = {
                    let guard = node_ref.read();
                    let node = guard.as_internal()?;
                    if node.num_entries() == 0 {
                        return Err(Error::Invariant("descent through an empty internal page"));
                    }
                    match key {
                        None => node.first_child()?,
                        Some(search) => {
                            let matched = node
                                .entries()
                                .find(|entry| entry.key >= search)
                                .map(|entry| entry.left);
                            match matched {
                                Some(left) => left,
                                None => node.last_child()?,
                            }
                        }
                    }
                };
                self.find_leaf(tid, ws, pool, child, key, perm)
            }
            _ => Err(Error::Invariant("descent reached a non-tree page")),
        }
    }
}
