//! B+Tree leaf page contents.

use crate::common::{Error, PageKey, Result};
use crate::storage::tuple::{Field, RecordId, Tuple};

/// An ordered run of tuples plus the leaf's place in the tree.
///
/// Tuples stay sorted by the tree's key field. The sibling chain, read
/// end to end across the file, yields the table in global sorted order.
/// The parent key is the root-pointer page when this leaf is the root.
#[derive(Debug, Clone)]
pub struct LeafPage {
    parent: PageKey,
    left_sibling: Option<PageKey>,
    right_sibling: Option<PageKey>,
    tuples: Vec<Tuple>,
}

impl LeafPage {
    /// Create an empty leaf under `parent`.
    pub fn new(parent: PageKey) -> Self {
        LeafPage {
            parent,
            left_sibling: None,
            right_sibling: None,
            tuples: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        parent: PageKey,
        left_sibling: Option<PageKey>,
        right_sibling: Option<PageKey>,
        tuples: Vec<Tuple>,
    ) -> Self {
        LeafPage {
            parent,
            left_sibling,
            right_sibling,
            tuples,
        }
    }

    #[inline]
    pub fn parent(&self) -> PageKey {
        self.parent
    }

    #[inline]
    pub fn set_parent(&mut self, parent: PageKey) {
        self.parent = parent;
    }

    #[inline]
    pub fn left_sibling(&self) -> Option<PageKey> {
        self.left_sibling
    }

    #[inline]
    pub fn set_left_sibling(&mut self, sibling: Option<PageKey>) {
        self.left_sibling = sibling;
    }

    #[inline]
    pub fn right_sibling(&self) -> Option<PageKey> {
        self.right_sibling
    }

    #[inline]
    pub fn set_right_sibling(&mut self, sibling: Option<PageKey>) {
        self.right_sibling = sibling;
    }

    #[inline]
    pub fn num_tuples(&self) -> usize {
        self.tuples.len()
    }

    #[inline]
    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    /// Key of the first (lowest) tuple.
    pub fn first_key(&self, key_field: usize) -> Option<Field> {
        self.tuples.first().map(|t| t.field(key_field))
    }

    /// Key of the last (highest) tuple.
    pub fn last_key(&self, key_field: usize) -> Option<Field> {
        self.tuples.last().map(|t| t.field(key_field))
    }

    /// Insert a tuple at its sorted position and stamp its record id.
    ///
    /// Equal keys are placed after existing ones; order among duplicates
    /// is not meaningful. The caller is responsible for splitting first:
    /// inserting into a page at capacity is a contract violation.
    pub fn insert_tuple(
        &mut self,
        self_key: PageKey,
        key_field: usize,
        capacity: usize,
        mut tuple: Tuple,
    ) -> Result<usize> {
        if self.tuples.len() >= capacity {
            return Err(Error::Invariant("insert into a full leaf page"));
        }
        let key = tuple.field(key_field);
        let slot = self
            .tuples
            .partition_point(|t| t.field(key_field) <= key);
        tuple.set_record_id(Some(RecordId {
            page: self_key,
            slot,
        }));
        self.tuples.insert(slot, tuple);
        Ok(slot)
    }

    /// Remove the first stored tuple whose fields equal `tuple`.
    ///
    /// Returns `true` when a tuple was removed.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> bool {
        if let Some(pos) = self.tuples.iter().position(|t| t == tuple) {
            self.tuples.remove(pos);
            true
        } else {
            false
        }
    }

    /// Detach the highest tuple (used when stealing toward the left).
    pub(crate) fn pop_back(&mut self) -> Option<Tuple> {
        self.tuples.pop()
    }

    /// Detach the lowest tuple (used when stealing toward the right).
    pub(crate) fn pop_front(&mut self) -> Option<Tuple> {
        if self.tuples.is_empty() {
            None
        } else {
            Some(self.tuples.remove(0))
        }
    }

    /// Split off the upper half of the tuples, leaving the lower half.
    ///
    /// Tuples are removed from this page as they are handed over, so no
    /// tuple is ever present in two pages at once.
    pub(crate) fn detach_upper_half(&mut self) -> Vec<Tuple> {
        let keep = self.tuples.len() - self.tuples.len() / 2;
        self.tuples.split_off(keep)
    }

    /// Append tuples that are already in order and all >= the current max.
    pub(crate) fn absorb_back(&mut self, tuples: Vec<Tuple>) {
        self.tuples.extend(tuples);
    }

    /// Prepend tuples that are already in order and all <= the current min.
    pub(crate) fn absorb_front(&mut self, tuples: Vec<Tuple>) {
        self.tuples.splice(0..0, tuples);
    }

    /// Drain every tuple (the right-hand side of a merge).
    pub(crate) fn take_tuples(&mut self) -> Vec<Tuple> {
        std::mem::take(&mut self.tuples)
    }

    /// Re-stamp every tuple's record id after tuples moved between pages.
    pub(crate) fn renumber(&mut self, self_key: PageKey) {
        for (slot, tuple) in self.tuples.iter_mut().enumerate() {
            tuple.set_record_id(Some(RecordId {
                page: self_key,
                slot,
            }));
        }
    }
}
