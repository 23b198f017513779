//! Redistribution and merging of underfull pages.
//!
//! A delete that leaves a page below minimum occupancy (half its
//! capacity) is repaired here: steal from a sibling with surplus when
//! one exists, merge otherwise. Merges can underfill the parent and the
//! fix propagates upward, collapsing the root when it is left with a
//! single child.

use tracing::debug;

use crate::buffer::BufferPool;
use crate::common::{Error, PageCategory, PageKey, Permissions, Result, TransactionId};
use crate::storage::page::PageRef;
use crate::tree::{BTreeFile, WorkingSet};

impl BTreeFile {
    /// Restore minimum occupancy for `page` after a deletion.
    ///
    /// The root is exempt: it may run arbitrarily empty until collapse.
    /// Siblings are located through the parent's entries (pages that
    /// share a parent), never through the leaf chain, so every steal and
    /// merge stays within one parent.
    pub(crate) fn handle_min_occupancy_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: PageRef,
    ) -> Result<()> {
        let (page_key, parent_key) = {
            let guard = page.read();
            let key = guard.key();
            let parent = match key.category {
                PageCategory::Leaf => guard.as_leaf()?.parent(),
                PageCategory::Internal => guard.as_internal()?.parent(),
                _ => return Err(Error::Invariant("occupancy repair on a non-tree page")),
            };
            (key, parent)
        };
        if parent_key.category == PageCategory::RootPointer {
            return Ok(());
        }

        let parent_ref = self.fetch_page(tid, ws, pool, parent_key, Permissions::ReadWrite)?;
        let (child_idx, left_key, right_key) = {
            let guard = parent_ref.read();
            let parent = guard.as_internal()?;
            let idx = parent
                .child_index(page_key)
                .ok_or(Error::Invariant("page is not a child of its recorded parent"))?;
            let left = (idx > 0).then(|| parent.children()[idx - 1]);
            let right = (idx + 1 < parent.children().len()).then(|| parent.children()[idx + 1]);
            (idx, left, right)
        };

        match page_key.category {
            PageCategory::Leaf => self.fix_leaf_underflow(
                tid, ws, pool, page, parent_ref, child_idx, left_key, right_key,
            ),
            PageCategory::Internal => self.fix_internal_underflow(
                tid, ws, pool, page, parent_ref, child_idx, left_key, right_key,
            ),
            _ => unreachable!("checked above"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fix_leaf_underflow(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: PageRef,
        parent: PageRef,
        child_idx: usize,
        left_key: Option<PageKey>,
        right_key: Option<PageKey>,
    ) -> Result<()> {
        let min = self.params().leaf_capacity / 2;

        let left_ref = match left_key {
            Some(key) => Some(self.fetch_page(tid, ws, pool, key, Permissions::ReadWrite)?),
            None => None,
        };
        if let Some(left) = &left_ref {
            // Probe in its own statement: the steal write-locks this page.
            let surplus = left.read().as_leaf()?.num_tuples() > min;
            if surplus {
                return self.steal_from_leaf_page(&page, left, &parent, child_idx - 1, false);
            }
        }
        let right_ref = match right_key {
            Some(key) => Some(self.fetch_page(tid, ws, pool, key, Permissions::ReadWrite)?),
            None => None,
        };
        if let Some(right) = &right_ref {
            let surplus = right.read().as_leaf()?.num_tuples() > min;
            if surplus {
                return self.steal_from_leaf_page(&page, right, &parent, child_idx, true);
            }
        }

        // No sibling has surplus: merge, folding right into left.
        if let Some(left) = left_ref {
            self.merge_leaf_pages(tid, ws, pool, left, page, parent, child_idx - 1)
        } else if let Some(right) = right_ref {
            self.merge_leaf_pages(tid, ws, pool, page, right, parent, child_idx)
        } else {
            Err(Error::Invariant("underfull page has no sibling under its parent"))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fix_internal_underflow(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: PageRef,
        parent: PageRef,
        child_idx: usize,
        left_key: Option<PageKey>,
        right_key: Option<PageKey>,
    ) -> Result<()> {
        let min = self.params().internal_capacity / 2;

        let left_ref = match left_key {
            Some(key) => Some(self.fetch_page(tid, ws, pool, key, Permissions::ReadWrite)?),
            None => None,
        };
        if let Some(left) = &left_ref {
            let surplus = left.read().as_internal()?.num_entries() > min;
            if surplus {
                return self.steal_from_left_internal_page(
                    tid,
                    ws,
                    pool,
                    &page,
                    left,
                    &parent,
                    child_idx - 1,
                );
            }
        }
        let right_ref = match right_key {
            Some(key) => Some(self.fetch_page(tid, ws, pool, key, Permissions::ReadWrite)?),
            None => None,
        };
        if let Some(right) = &right_ref {
            let surplus = right.read().as_internal()?.num_entries() > min;
            if surplus {
                return self.steal_from_right_internal_page(
                    tid, ws, pool, &page, right, &parent, child_idx,
                );
            }
        }

        if let Some(left) = left_ref {
            self.merge_internal_pages(tid, ws, pool, left, page, parent, child_idx - 1)
        } else if let Some(right) = right_ref {
            self.merge_internal_pages(tid, ws, pool, page, right, parent, child_idx)
        } else {
            Err(Error::Invariant("underfull page has no sibling under its parent"))
        }
    }

    // ========================================================================
    // Redistribution
    // ========================================================================

    /// Move tuples from a leaf sibling with surplus until the pair is
    /// evened out, then rewrite the parent separator to the new boundary.
    ///
    /// Leaves stay siblings, so no reparenting is needed.
    pub(crate) fn steal_from_leaf_page(
        &self,
        page: &PageRef,
        sibling: &PageRef,
        parent: &PageRef,
        separator_idx: usize,
        is_right_sibling: bool,
    ) -> Result<()> {
        let key_field = self.params().key_field;

        let mut page_guard = page.write();
        let mut sibling_guard = sibling.write();
        let mut parent_guard = parent.write();

        let page_key = page_guard.key();
        let sibling_key = sibling_guard.key();
        let leaf = page_guard.as_leaf_mut()?;
        let donor = sibling_guard.as_leaf_mut()?;

        if donor.num_tuples() <= leaf.num_tuples() {
            return Err(Error::Invariant("steal from a leaf without surplus"));
        }
        let to_move = (donor.num_tuples() - leaf.num_tuples()) / 2;

        let separator = if is_right_sibling {
            let mut moved = Vec::with_capacity(to_move);
            for _ in 0..to_move {
                moved.push(
                    donor
                        .pop_front()
                        .ok_or(Error::Invariant("leaf donor ran out of tuples"))?,
                );
            }
            leaf.absorb_back(moved);
            donor
                .first_key(key_field)
                .ok_or(Error::Invariant("leaf donor emptied by a steal"))?
        } else {
            let mut moved = Vec::with_capacity(to_move);
            for _ in 0..to_move {
                moved.push(
                    donor
                        .pop_back()
                        .ok_or(Error::Invariant("leaf donor ran out of tuples"))?,
                );
            }
            moved.reverse();
            leaf.absorb_front(moved);
            leaf.first_key(key_field)
                .ok_or(Error::Invariant("leaf emptied by a steal"))?
        };

        leaf.renumber(page_key);
        donor.renumber(sibling_key);
        parent_guard
            .as_internal_mut()?
            .set_key(separator_idx, separator);

        debug!(page = %page_key, donor = %sibling_key, moved = to_move, "redistributed leaf tuples");
        Ok(())
    }

    /// Rotate entries from the left internal sibling through the parent.
    ///
    /// Each step pulls the parent separator down as the receiver's new
    /// first entry (adopting the donor's detached child) and pushes the
    /// donor's highest key up as the new separator. Moved children are
    /// reparented afterwards.
    pub(crate) fn steal_from_left_internal_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: &PageRef,
        sibling: &PageRef,
        parent: &PageRef,
        separator_idx: usize,
    ) -> Result<()> {
        let (page_key, moved_children) = {
            let mut page_guard = page.write();
            let mut sibling_guard = sibling.write();
            let mut parent_guard = parent.write();

            let page_key = page_guard.key();
            let node = page_guard.as_internal_mut()?;
            let donor = sibling_guard.as_internal_mut()?;
            let parent_node = parent_guard.as_internal_mut()?;

            if donor.num_entries() <= node.num_entries() {
                return Err(Error::Invariant("steal from an internal page without surplus"));
            }
            let to_move = (donor.num_entries() - node.num_entries()) / 2;

            let mut moved_children = Vec::with_capacity(to_move);
            for _ in 0..to_move {
                let (donor_key, donor_child) = donor.pop_back_entry()?;
                let separator = parent_node.keys()[separator_idx];
                node.push_front(separator, donor_child);
                parent_node.set_key(separator_idx, donor_key);
                moved_children.push(donor_child);
            }
            (page_key, moved_children)
        };

        for child in &moved_children {
            self.update_parent_pointer(tid, ws, pool, *child, page_key)?;
        }
        debug!(page = %page_key, moved = moved_children.len(), "rotated entries from left sibling");
        Ok(())
    }

    /// Mirror of [`steal_from_left_internal_page`] for a right donor.
    pub(crate) fn steal_from_right_internal_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: &PageRef,
        sibling: &PageRef,
        parent: &PageRef,
        separator_idx: usize,
    ) -> Result<()> {
        let (page_key, moved_children) = {
            let mut page_guard = page.write();
            let mut sibling_guard = sibling.write();
            let mut parent_guard = parent.write();

            let page_key = page_guard.key();
            let node = page_guard.as_internal_mut()?;
            let donor = sibling_guard.as_internal_mut()?;
            let parent_node = parent_guard.as_internal_mut()?;

            if donor.num_entries() <= node.num_entries() {
                return Err(Error::Invariant("steal from an internal page without surplus"));
            }
            let to_move = (donor.num_entries() - node.num_entries()) / 2;

            let mut moved_children = Vec::with_capacity(to_move);
            for _ in 0..to_move {
                let (donor_key, donor_child) = donor.pop_front_entry()?;
                let separator = parent_node.keys()[separator_idx];
                node.push_back(separator, donor_child);
                parent_node.set_key(separator_idx, donor_key);
                moved_children.push(donor_child);
            }
            (page_key, moved_children)
        };

        for child in &moved_children {
            self.update_parent_pointer(tid, ws, pool, *child, page_key)?;
        }
        debug!(page = %page_key, moved = moved_children.len(), "rotated entries from right sibling");
        Ok(())
    }

    // ========================================================================
    // Merging
    // ========================================================================

    /// Fold the right leaf into the left, relink the sibling chain past
    /// the removed page, free its slot, and delete the separator.
    pub(crate) fn merge_leaf_pages(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        left: PageRef,
        right: PageRef,
        parent: PageRef,
        separator_idx: usize,
    ) -> Result<()> {
        let left_key = left.read().key();
        let right_key = right.read().key();
        self.check_adjacent(&parent, separator_idx, left_key, right_key)?;

        let (tuples, next_right) = {
            let mut guard = right.write();
            let leaf = guard.as_leaf_mut()?;
            (leaf.take_tuples(), leaf.right_sibling())
        };
        {
            let mut guard = left.write();
            let leaf = guard.as_leaf_mut()?;
            leaf.absorb_back(tuples);
            leaf.renumber(left_key);
            leaf.set_right_sibling(next_right);
        }
        if let Some(next_key) = next_right {
            let next_ref = self.fetch_page(tid, ws, pool, next_key, Permissions::ReadWrite)?;
            next_ref
                .write()
                .as_leaf_mut()?
                .set_left_sibling(Some(left_key));
        }

        debug!(left = %left_key, right = %right_key, "merged leaf pages");
        self.set_empty_page(tid, ws, pool, right_key)?;
        self.delete_parent_entry(tid, ws, pool, parent, separator_idx)
    }

    /// Fold the right internal page into the left, pulling the parent
    /// separator down as the entry joining the two runs, then free the
    /// right page and delete the separator.
    pub(crate) fn merge_internal_pages(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        left: PageRef,
        right: PageRef,
        parent: PageRef,
        separator_idx: usize,
    ) -> Result<()> {
        let left_key = left.read().key();
        let right_key = right.read().key();
        self.check_adjacent(&parent, separator_idx, left_key, right_key)?;

        let separator = parent.read().as_internal()?.keys()[separator_idx];
        let (keys, children) = right.write().as_internal_mut()?.take_all();
        left.write()
            .as_internal_mut()?
            .absorb_right(separator, keys, children.clone());

        for child in children {
            self.update_parent_pointer(tid, ws, pool, child, left_key)?;
        }

        debug!(left = %left_key, right = %right_key, "merged internal pages");
        self.set_empty_page(tid, ws, pool, right_key)?;
        self.delete_parent_entry(tid, ws, pool, parent, separator_idx)
    }

    fn check_adjacent(
        &self,
        parent: &PageRef,
        separator_idx: usize,
        left_key: PageKey,
        right_key: PageKey,
    ) -> Result<()> {
        let guard = parent.read();
        let node = guard.as_internal()?;
        if separator_idx >= node.num_entries()
            || node.children()[separator_idx] != left_key
            || node.children()[separator_idx + 1] != right_key
        {
            return Err(Error::Invariant("merge of pages that are not adjacent siblings"));
        }
        Ok(())
    }

    /// Remove the separator (and the merged-away right child) from the
    /// parent, then repair the parent itself.
    ///
    /// An emptied parent is only legal at the root, which collapses onto
    /// its single remaining child — the only way the tree ever shrinks in
    /// height. A merely underfull parent recurses into
    /// [`handle_min_occupancy_page`](Self::handle_min_occupancy_page).
    fn delete_parent_entry(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        parent: PageRef,
        separator_idx: usize,
    ) -> Result<()> {
        let (parent_key, grandparent_key, remaining) = {
            let mut guard = parent.write();
            let parent_key = guard.key();
            let node = guard.as_internal_mut()?;
            node.delete_key_and_right_child(separator_idx);
            (parent_key, node.parent(), node.num_entries())
        };

        if remaining == 0 {
            if grandparent_key.category != PageCategory::RootPointer {
                return Err(Error::Invariant("merge emptied a non-root internal page"));
            }
            let new_root = parent.read().as_internal()?.first_child()?;
            let root_ptr =
                self.fetch_page(tid, ws, pool, self.root_pointer_key(), Permissions::ReadWrite)?;
            root_ptr.write().as_root_pointer_mut()?.set_root(new_root);
            self.update_parent_pointer(tid, ws, pool, new_root, self.root_pointer_key())?;
            self.set_empty_page(tid, ws, pool, parent_key)?;
            debug!(root = %new_root, "root collapse: tree shrank by one level");
        } else if remaining < self.params().internal_capacity / 2 {
            self.handle_min_occupancy_page(tid, ws, pool, parent)?;
        }
        Ok(())
    }
}
