//! B+Tree internal page contents.

use crate::common::{Error, PageKey, Result};
use crate::storage::tuple::Field;

/// One separator entry as seen by the navigator and balancer.
///
/// Consecutive entries share a child: entry `i`'s right child is entry
/// `i+1`'s left child. Every key in the subtree under `left` is <= the
/// entry's key; every key under `right` is >= it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub key: Field,
    pub left: PageKey,
    pub right: PageKey,
}

/// An ordered run of separator entries plus the node's place in the tree.
///
/// Stored as `keys` and `children` with `children.len() == keys.len() + 1`
/// whenever the page holds any entry; the [`Entry`] view is derived. A
/// transient keys-empty/one-child state exists only while a merge is
/// collapsing the root and is never written to disk.
#[derive(Debug, Clone)]
pub struct InternalPage {
    parent: PageKey,
    keys: Vec<Field>,
    children: Vec<PageKey>,
}

impl InternalPage {
    /// Create an empty internal page under `parent`.
    pub fn new(parent: PageKey) -> Self {
        InternalPage {
            parent,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn from_parts(parent: PageKey, keys: Vec<Field>, children: Vec<PageKey>) -> Self {
        InternalPage {
            parent,
            keys,
            children,
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
    pub fn num_entries(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn keys(&self) -> &[Field] {
        &self.keys
    }

    #[inline]
    pub fn children(&self) -> &[PageKey] {
        &self.children
    }

    /// The entry at `index`.
    pub fn entry(&self, index: usize) -> Entry {
        Entry {
            key: self.keys[index],
            left: self.children[index],
            right: self.children[index + 1],
        }
    }

    /// Iterate entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        (0..self.keys.len()).map(move |i| self.entry(i))
    }

    /// Replace the separator key at `index` (redistribution rewrites
    /// boundaries in place).
    pub(crate) fn set_key(&mut self, index: usize, key: Field) {
        self.keys[index] = key;
    }

    /// Position of `child` among this page's children.
    pub fn child_index(&self, child: PageKey) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    pub fn first_child(&self) -> Result<PageKey> {
        self.children
            .first()
            .copied()
            .ok_or(Error::Invariant("internal page has no children"))
    }

    pub fn last_child(&self) -> Result<PageKey> {
        self.children
            .last()
            .copied()
            .ok_or(Error::Invariant("internal page has no children"))
    }

    /// Insert a separator produced by a child split.
    ///
    /// The entry's left child must already be one of this page's
    /// children (it is the page that split); the key and the new right
    /// child are spliced in beside it. Inserting into a page at capacity
    /// is a contract violation: the caller splits first.
    pub fn insert_entry(&mut self, capacity: usize, entry: Entry) -> Result<()> {
        if self.keys.len() >= capacity {
            return Err(Error::Invariant("insert into a full internal page"));
        }
        if self.keys.is_empty() {
            self.keys.push(entry.key);
            self.children = vec![entry.left, entry.right];
            return Ok(());
        }
        let pos = self
            .child_index(entry.left)
            .ok_or(Error::Invariant("split entry's left child is not a child of this page"))?;
        self.keys.insert(pos, entry.key);
        self.children.insert(pos + 1, entry.right);
        debug_assert!(self.keys.windows(2).all(|w| w[0] <= w[1]));
        Ok(())
    }

    /// Remove the key at `index` together with its right child.
    ///
    /// This is how a merge erases the separator between two siblings:
    /// the right page is gone, the left child pointer stays.
    pub(crate) fn delete_key_and_right_child(&mut self, index: usize) -> (Field, PageKey) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Detach the highest entry: its key and its right child.
    ///
    /// The key's left child remains behind as the donor's new last child.
    pub(crate) fn pop_back_entry(&mut self) -> Result<(Field, PageKey)> {
        let key = self
            .keys
            .pop()
            .ok_or(Error::Invariant("pop from an empty internal page"))?;
        let child = self
            .children
            .pop()
            .ok_or(Error::Invariant("internal keys/children out of step"))?;
        Ok((key, child))
    }

    /// Detach the lowest entry: its key and its left child.
    pub(crate) fn pop_front_entry(&mut self) -> Result<(Field, PageKey)> {
        if self.keys.is_empty() {
            return Err(Error::Invariant("pop from an empty internal page"));
        }
        let key = self.keys.remove(0);
        let child = self.children.remove(0);
        Ok((key, child))
    }

    /// Append an entry whose left child is already this page's last child.
    pub(crate) fn push_back(&mut self, key: Field, right_child: PageKey) {
        self.keys.push(key);
        self.children.push(right_child);
    }

    /// Prepend an entry whose right child is already this page's first child.
    pub(crate) fn push_front(&mut self, key: Field, left_child: PageKey) {
        self.keys.insert(0, key);
        self.children.insert(0, left_child);
    }

    /// Split off the upper half of the entries for an internal split.
    ///
    /// Removes the highest `n/2` keys and their `n/2 + 1` children; the
    /// caller then pops the stranded middle key with
    /// [`pop_promoted_key`](Self::pop_promoted_key) to restore the
    /// keys/children balance on both sides.
    pub(crate) fn detach_upper_half(&mut self) -> (Vec<Field>, Vec<PageKey>) {
        let n = self.keys.len();
        let move_count = n / 2;
        let moved_keys = self.keys.split_off(n - move_count);
        let moved_children = self
            .children
            .split_off(self.children.len() - (move_count + 1));
        (moved_keys, moved_children)
    }

    /// Lift out the middle key after [`detach_upper_half`](Self::detach_upper_half).
    pub(crate) fn pop_promoted_key(&mut self) -> Result<Field> {
        self.keys
            .pop()
            .ok_or(Error::Invariant("split of an internal page with too few entries"))
    }

    /// Fold a merged right sibling's contents in behind the separator.
    pub(crate) fn absorb_right(
        &mut self,
        separator: Field,
        keys: Vec<Field>,
        children: Vec<PageKey>,
    ) {
        self.keys.push(separator);
        self.keys.extend(keys);
        self.children.extend(children);
    }

    /// Drain this page's contents (the right-hand side of a merge).
    pub(crate) fn take_all(&mut self) -> (Vec<Field>, Vec<PageKey>) {
        (
            std::mem::take(&mut self.keys),
            std::mem::take(&mut self.children),
        )
    }
}
