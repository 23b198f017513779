//! Splitting overfull pages and growing the tree at the root.

use tracing::debug;

use crate::buffer::BufferPool;
use crate::common::{Error, PageCategory, PageKey, Permissions, Result, TransactionId};
use crate::storage::page::{Entry, InternalPage, PageRef};
use crate::storage::tuple::Field;
use crate::tree::{BTreeFile, WorkingSet};

impl BTreeFile {
    /// Split a full leaf, returning the half the triggering key belongs in.
    ///
    /// The upper half of the tuples moves into a freshly allocated right
    /// sibling (tuples leave the source as they are handed over, so no
    /// tuple is ever in two pages). A copy of the new page's first key is
    /// promoted into the parent as the separator; `>=` the separator
    /// routes to the new page, mirroring the navigator's route-left rule.
    pub(crate) fn split_leaf_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: PageRef,
        trigger: Field,
    ) -> Result<PageRef> {
        let is_full = page.read().as_leaf()?.num_tuples() >= self.params().leaf_capacity;
        if !is_full {
            return Err(Error::Invariant("split of a leaf that is not full"));
        }
        let new_ref = self.get_empty_page(tid, ws, pool, PageCategory::Leaf)?;
        let new_key = new_ref.read().key();

        let (page_key, parent_key, old_right, moved) = {
            let mut guard = page.write();
            let page_key = guard.key();
            let leaf = guard.as_leaf_mut()?;
            let moved = leaf.detach_upper_half();
            (page_key, leaf.parent(), leaf.right_sibling(), moved)
        };
        let separator = moved
            .first()
            .ok_or(Error::Invariant("leaf split moved no tuples"))?
            .field(self.params().key_field);

        {
            let mut guard = new_ref.write();
            let new_leaf = guard.as_leaf_mut()?;
            new_leaf.absorb_back(moved);
            new_leaf.renumber(new_key);
            new_leaf.set_left_sibling(Some(page_key));
            new_leaf.set_right_sibling(old_right);
        }
        if let Some(right_key) = old_right {
            let right_ref = self.fetch_page(tid, ws, pool, right_key, Permissions::ReadWrite)?;
            right_ref
                .write()
                .as_leaf_mut()?
                .set_left_sibling(Some(new_key));
        }
        page.write().as_leaf_mut()?.set_right_sibling(Some(new_key));

        let parent_ref = self.get_parent_with_empty_slots(tid, ws, pool, parent_key, trigger)?;
        let parent_page_key = parent_ref.read().key();
        parent_ref.write().as_internal_mut()?.insert_entry(
            self.params().internal_capacity,
            Entry {
                key: separator,
                left: page_key,
                right: new_key,
            },
        )?;
        page.write().as_leaf_mut()?.set_parent(parent_page_key);
        new_ref.write().as_leaf_mut()?.set_parent(parent_page_key);

        debug!(page = %page_key, new = %new_key, separator = %separator, "split leaf");
        if trigger >= separator {
            Ok(new_ref)
        } else {
            Ok(page)
        }
    }

    /// Split a full internal page, returning the half the triggering key
    /// belongs in.
    ///
    /// The upper half of the entries moves to a new page and the single
    /// middle entry is lifted out of this level entirely: its key becomes
    /// the promoted separator and its children are the two halves. Every
    /// child the new page now owns gets its parent pointer rewritten.
    pub(crate) fn split_internal_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: PageRef,
        trigger: Field,
    ) -> Result<PageRef> {
        let is_full =
            page.read().as_internal()?.num_entries() >= self.params().internal_capacity;
        if !is_full {
            return Err(Error::Invariant("split of an internal page that is not full"));
        }
        let new_ref = self.get_empty_page(tid, ws, pool, PageCategory::Internal)?;
        let new_key = new_ref.read().key();

        let (page_key, parent_key, promoted) = {
            let mut guard = page.write();
            let page_key = guard.key();
            let node = guard.as_internal_mut()?;
            let (moved_keys, moved_children) = node.detach_upper_half();
            let promoted = node.pop_promoted_key()?;
            let parent_key = node.parent();
            drop(guard);

            let mut guard = new_ref.write();
            let placeholder_parent = guard.as_internal()?.parent();
            *guard.as_internal_mut()? =
                InternalPage::from_parts(placeholder_parent, moved_keys, moved_children);
            (page_key, parent_key, promoted)
        };

        // Children moved to the new page still name the old page as parent.
        self.update_parent_pointers(tid, ws, pool, &new_ref)?;

        let parent_ref = self.get_parent_with_empty_slots(tid, ws, pool, parent_key, trigger)?;
        let parent_page_key = parent_ref.read().key();
        parent_ref.write().as_internal_mut()?.insert_entry(
            self.params().internal_capacity,
            Entry {
                key: promoted,
                left: page_key,
                right: new_key,
            },
        )?;
        page.write().as_internal_mut()?.set_parent(parent_page_key);
        new_ref.write().as_internal_mut()?.set_parent(parent_page_key);

        debug!(page = %page_key, new = %new_key, separator = %promoted, "split internal page");
        if trigger >= promoted {
            Ok(new_ref)
        } else {
            Ok(page)
        }
    }

    /// Return a parent page with room for one more entry.
    ///
    /// A full parent is split first (recursively, all the way up); a
    /// root-pointer parent means the splitting page *is* the root, so a
    /// brand-new internal root is minted and the root pointer retargeted
    /// — the only way the tree ever grows in height.
    pub(crate) fn get_parent_with_empty_slots(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        parent_key: PageKey,
        trigger: Field,
    ) -> Result<PageRef> {
        if parent_key.category == PageCategory::RootPointer {
            let new_root = self.get_empty_page(tid, ws, pool, PageCategory::Internal)?;
            let new_root_key = new_root.read().key();

            let root_ptr =
                self.fetch_page(tid, ws, pool, self.root_pointer_key(), Permissions::ReadWrite)?;
            root_ptr.write().as_root_pointer_mut()?.set_root(new_root_key);
            new_root
                .write()
                .as_internal_mut()?
                .set_parent(self.root_pointer_key());

            debug!(root = %new_root_key, "root split: tree grew by one level");
            return Ok(new_root);
        }

        let parent_ref = self.fetch_page(tid, ws, pool, parent_key, Permissions::ReadWrite)?;
        let full =
            parent_ref.read().as_internal()?.num_entries() >= self.params().internal_capacity;
        if full {
            self.split_internal_page(tid, ws, pool, parent_ref, trigger)
        } else {
            Ok(parent_ref)
        }
    }

    /// Point every child of `page` back at it.
    pub(crate) fn update_parent_pointers(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        page: &PageRef,
    ) -> Result<()> {
        let (self_key, children) = {
            let guard = page.read();
            (guard.key(), guard.as_internal()?.children().to_vec())
        };
        for child in children {
            self.update_parent_pointer(tid, ws, pool, child, self_key)?;
        }
        Ok(())
    }

    /// Rewrite one child's parent link if it is stale.
    ///
    /// Probes read-only first so a child that already points at the right
    /// parent is not dirtied.
    pub(crate) fn update_parent_pointer(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        child_key: PageKey,
        parent_key: PageKey,
    ) -> Result<()> {
        let current = {
            let child = self.fetch_page(tid, ws, pool, child_key, Permissions::ReadOnly)?;
            let guard = child.read();
            match child_key.category {
                PageCategory::Leaf => guard.as_leaf()?.parent(),
                PageCategory::Internal => guard.as_internal()?.parent(),
                _ => return Err(Error::Invariant("child link names a non-tree page")),
            }
        };
        if current == parent_key {
            return Ok(());
        }
        let child = self.fetch_page(tid, ws, pool, child_key, Permissions::ReadWrite)?;
        let mut guard = child.write();
        match child_key.category {
            PageCategory::Leaf => guard.as_leaf_mut()?.set_parent(parent_key),
            PageCategory::Internal => guard.as_internal_mut()?.set_parent(parent_key),
            _ => unreachable!("checked above"),
        }
        Ok(())
    }
}
