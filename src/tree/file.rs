//! BTreeFile - one table's B+Tree-organized paged file.

use std::path::Path;

use parking_lot::Mutex;
use tracing::trace;

use crate::buffer::BufferPool;
use crate::common::config::{DEFAULT_INTERNAL_CAPACITY, DEFAULT_LEAF_CAPACITY};
use crate::common::{Error, PageCategory, PageKey, Permissions, Result, TableId, TransactionId};
use crate::storage::page::codec::{decode_page, encode_page};
use crate::storage::page::{
    HeaderPage, InternalPage, LeafPage, Page, PageBody, PageRef, RootPointerPage, SLOTS_PER_HEADER,
};
use crate::storage::tuple::Tuple;
use crate::storage::DiskManager;
use crate::tree::WorkingSet;

/// Tree shape parameters for one table file.
///
/// Capacities are logical tuple/entry limits per page; tests shrink
/// them to force splits and merges early.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    /// Index of the field the tree is sorted on.
    pub key_field: usize,
    /// Maximum tuples per leaf page.
    pub leaf_capacity: usize,
    /// Maximum entries per internal page.
    pub internal_capacity: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            key_field: 0,
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            internal_capacity: DEFAULT_INTERNAL_CAPACITY,
        }
    }
}

/// A table file organized as a B+Tree on one field.
///
/// # File layout
/// Slot 0 holds the root pointer, slot 1 the first header page (a
/// free-slot bitmap), and slot 2 the initial root leaf; tree pages
/// occupy the remaining slots in allocation order, with slots freed by
/// merges recycled through the header bitmap.
///
/// # Collaboration
/// All page traffic during a mutation flows through the caller's
/// [`BufferPool`] and the operation's working set; the file itself only
/// performs raw frame I/O ([`read_page`](Self::read_page) /
/// [`write_page`](Self::write_page)) on behalf of the pool.
pub struct BTreeFile {
    table: TableId,
    params: TreeParams,
    disk: Mutex<DiskManager>,
}

impl BTreeFile {
    /// Create and format a new table file.
    ///
    /// # Panics
    /// Panics on degenerate capacities: a leaf must hold at least two
    /// tuples for a split to leave both halves non-empty, and an
    /// internal page at least four entries so a page at minimum
    /// occupancy can never be emptied below repair range by a child
    /// merge.
    pub fn create<P: AsRef<Path>>(path: P, table: TableId, params: TreeParams) -> Result<Self> {
        Self::check_params(&params);
        let mut disk = DiskManager::create(path)?;

        // Slot 0: root pointer, slot 1: header bitmap, slot 2: root leaf.
        for _ in 0..3 {
            disk.allocate_slot()?;
        }
        let file = BTreeFile {
            table,
            params,
            disk: Mutex::new(disk),
        };

        let root_key = PageKey::new(table, 2, PageCategory::Leaf);
        let root_ptr = Page::new(
            file.root_pointer_key(),
            PageBody::RootPointer(RootPointerPage::new(root_key)),
        );
        let mut header = HeaderPage::new();
        for slot in 0..3 {
            header.mark_used(slot);
        }
        let header_page = Page::new(file.first_header_key(), PageBody::Header(header));
        let root_leaf = Page::new(root_key, PageBody::Leaf(LeafPage::new(file.root_pointer_key())));

        file.write_page(&root_ptr)?;
        file.write_page(&header_page)?;
        file.write_page(&root_leaf)?;
        Ok(file)
    }

    /// Open an existing table file.
    pub fn open<P: AsRef<Path>>(path: P, table: TableId, params: TreeParams) -> Result<Self> {
        Self::check_params(&params);
        let disk = DiskManager::open(path)?;
        if disk.slot_count() < 3 {
            return Err(Error::Corrupted("table file is missing its bootstrap pages"));
        }
        Ok(BTreeFile {
            table,
            params,
            disk: Mutex::new(disk),
        })
    }

    fn check_params(params: &TreeParams) {
        assert!(params.leaf_capacity >= 2, "leaf capacity must be at least 2");
        assert!(
            params.internal_capacity >= 4,
            "internal capacity must be at least 4"
        );
    }

    #[inline]
    pub fn table(&self) -> TableId {
        self.table
    }

    #[inline]
    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Identity of the file's root pointer page (always slot 0).
    #[inline]
    pub fn root_pointer_key(&self) -> PageKey {
        PageKey::new(self.table, 0, PageCategory::RootPointer)
    }

    #[inline]
    fn first_header_key(&self) -> PageKey {
        PageKey::new(self.table, 1, PageCategory::Header)
    }

    // ========================================================================
    // Frame I/O on behalf of the buffer pool
    // ========================================================================

    /// Read and decode the page identified by `key`.
    ///
    /// # Errors
    /// `Error::PageNotFound` if the slot does not exist or holds a page
    /// of a different category; `Error::Corrupted` on checksum failure.
    pub fn read_page(&self, key: PageKey) -> Result<Page> {
        let mut disk = self.disk.lock();
        if key.page_no >= disk.slot_count() {
            return Err(Error::PageNotFound(key));
        }
        let frame = disk.read_slot(key.page_no)?;
        decode_page(key, &frame)
    }

    /// Encode and write a page back to its slot.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        let frame = encode_page(page)?;
        self.disk.lock().write_slot(page.key().page_no, &frame)
    }

    // ========================================================================
    // Working-set-aware page access
    // ========================================================================

    /// Fetch a page for this operation.
    ///
    /// The working set is consulted first so the operation keeps seeing
    /// its own in-progress versions; misses go through the buffer pool.
    /// Read-write fetches join the working set.
    pub(crate) fn fetch_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        key: PageKey,
        perm: Permissions,
    ) -> Result<PageRef> {
        if let Some(page) = ws.get(&key) {
            return Ok(page.clone());
        }
        let page = pool.get_page(tid, key, perm)?;
        if perm == Permissions::ReadWrite {
            ws.insert(key, page.clone());
        }
        Ok(page)
    }

    // ========================================================================
    // Page allocation and release
    // ========================================================================

    /// Allocate an empty page of `category`, recycling a freed slot when
    /// the header bitmap has one and growing the file otherwise.
    ///
    /// The blank frame is written to disk first, then loaded through the
    /// buffer pool, so the new page is cached and working-set-tracked
    /// like any other fetch.
    pub(crate) fn get_empty_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        category: PageCategory,
    ) -> Result<PageRef> {
        let slot = self.claim_slot(tid, ws, pool)?;
        let key = PageKey::new(self.table, slot, category);

        let body = match category {
            PageCategory::Leaf => PageBody::Leaf(LeafPage::new(self.root_pointer_key())),
            PageCategory::Internal => PageBody::Internal(InternalPage::new(self.root_pointer_key())),
            _ => return Err(Error::Invariant("only tree pages are allocated on demand")),
        };
        self.write_page(&Page::new(key, body))?;

        trace!(page = %key, "allocated empty page");
        self.fetch_page(tid, ws, pool, key, Permissions::ReadWrite)
    }

    /// Claim a free slot number, preferring recycled slots.
    fn claim_slot(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
    ) -> Result<u32> {
        let mut header_key = self.first_header_key();
        let mut base: usize = 0;
        loop {
            let header_ref = self.fetch_page(tid, ws, pool, header_key, Permissions::ReadWrite)?;
            let slot_count = self.disk.lock().slot_count() as usize;

            let mut guard = header_ref.write();
            let header = guard.as_header_mut()?;

            let limit = slot_count.saturating_sub(base);
            if let Some(free) = header.find_free(limit) {
                header.mark_used(free);
                return Ok((base + free) as u32);
            }
            if slot_count < base + SLOTS_PER_HEADER {
                // This header's range still has room at the end of the file.
                let slot = self.disk.lock().allocate_slot()?;
                header.mark_used(slot as usize - base);
                return Ok(slot);
            }

            match header.next_header() {
                Some(next) => {
                    drop(guard);
                    header_key = PageKey::new(self.table, next, PageCategory::Header);
                    base += SLOTS_PER_HEADER;
                }
                None => {
                    // Range exhausted: append a new header page covering the
                    // next span of slots. Sequential allocation puts it at
                    // the first slot of its own range.
                    let slot = self.disk.lock().allocate_slot()?;
                    header.set_next_header(Some(slot));
                    drop(guard);

                    let new_key = PageKey::new(self.table, slot, PageCategory::Header);
                    let mut new_header = HeaderPage::new();
                    new_header.mark_used(slot as usize - (base + SLOTS_PER_HEADER));
                    self.write_page(&Page::new(new_key, PageBody::Header(new_header)))?;

                    header_key = new_key;
                    base += SLOTS_PER_HEADER;
                }
            }
        }
    }

    /// Release a page emptied by a merge: clear its bitmap bit and drop
    /// it from the working set and the cache without flushing.
    pub(crate) fn set_empty_page(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        key: PageKey,
    ) -> Result<()> {
        let slot = key.page_no as usize;
        let mut header_key = self.first_header_key();
        let mut base: usize = 0;
        loop {
            if slot < base + SLOTS_PER_HEADER {
                let header_ref =
                    self.fetch_page(tid, ws, pool, header_key, Permissions::ReadWrite)?;
                header_ref.write().as_header_mut()?.mark_free(slot - base);
                break;
            }
            let header_ref = self.fetch_page(tid, ws, pool, header_key, Permissions::ReadOnly)?;
            let next = header_ref
                .read()
                .as_header()?
                .next_header()
                .ok_or(Error::Invariant("freed slot is outside every header's range"))?;
            header_key = PageKey::new(self.table, next, PageCategory::Header);
            base += SLOTS_PER_HEADER;
        }

        ws.remove(&key);
        pool.discard_page(key);
        trace!(page = %key, "released empty page");
        Ok(())
    }

    // ========================================================================
    // Mutation entry points
    // ========================================================================

    /// Insert a tuple, splitting pages as needed.
    ///
    /// Returns every page the mutation touched; the buffer pool marks
    /// them dirty for `tid` and admits them into the cache.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        pool: &BufferPool,
        tuple: Tuple,
    ) -> Result<Vec<PageRef>> {
        if tuple.arity() <= self.params.key_field {
            return Err(Error::Invariant("tuple is missing the tree's key field"));
        }
        let key = tuple.field(self.params.key_field);
        let mut ws = WorkingSet::new();

        let root_key = self.root_key(tid, &mut ws, pool, Permissions::ReadWrite)?;
        let leaf_ref = self.find_leaf(tid, &mut ws, pool, root_key, Some(key), Permissions::ReadWrite)?;

        let needs_split = leaf_ref.read().as_leaf()?.num_tuples() >= self.params.leaf_capacity;
        let target = if needs_split {
            self.split_leaf_page(tid, &mut ws, pool, leaf_ref, key)?
        } else {
            leaf_ref
        };

        {
            let mut guard = target.write();
            let target_key = guard.key();
            guard.as_leaf_mut()?.insert_tuple(
                target_key,
                self.params.key_field,
                self.params.leaf_capacity,
                tuple,
            )?;
        }
        Ok(ws.into_values().collect())
    }

    /// Delete the first stored tuple whose fields equal `tuple`.
    ///
    /// Descends by key, then walks right across the sibling chain while
    /// keys tie (duplicates may span leaves). Underfull leaves are
    /// rebalanced before returning.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        pool: &BufferPool,
        tuple: Tuple,
    ) -> Result<Vec<PageRef>> {
        if tuple.arity() <= self.params.key_field {
            return Err(Error::Invariant("tuple is missing the tree's key field"));
        }
        let key = tuple.field(self.params.key_field);
        let mut ws = WorkingSet::new();

        let root_key = self.root_key(tid, &mut ws, pool, Permissions::ReadWrite)?;
        let mut leaf_ref =
            self.find_leaf(tid, &mut ws, pool, root_key, Some(key), Permissions::ReadWrite)?;

        loop {
            let removed = leaf_ref.write().as_leaf_mut()?.delete_tuple(&tuple);
            if removed {
                break;
            }
            let next = {
                let guard = leaf_ref.read();
                let leaf = guard.as_leaf()?;
                let exhausted = leaf
                    .last_key(self.params.key_field)
                    .is_some_and(|last| last > key);
                if exhausted {
                    None
                } else {
                    leaf.right_sibling()
                }
            };
            match next {
                Some(sibling) => {
                    leaf_ref = self.fetch_page(tid, &mut ws, pool, sibling, Permissions::ReadWrite)?;
                }
                None => return Err(Error::TupleNotFound(self.table)),
            }
        }

        let underfull =
            leaf_ref.read().as_leaf()?.num_tuples() < self.params.leaf_capacity / 2;
        if underfull {
            self.handle_min_occupancy_page(tid, &mut ws, pool, leaf_ref)?;
        }
        Ok(ws.into_values().collect())
    }

    /// Current root key, via the root pointer page.
    fn root_key(
        &self,
        tid: TransactionId,
        ws: &mut WorkingSet,
        pool: &BufferPool,
        perm: Permissions,
    ) -> Result<PageKey> {
        let root_ptr = self.fetch_page(tid, ws, pool, self.root_pointer_key(), perm)?;
        let guard = root_ptr.read();
        Ok(guard.as_root_pointer()?.root())
    }

    // ========================================================================
    // Read paths
    // ========================================================================

    /// Iterate every tuple in global key order.
    pub fn scan<'a>(&'a self, tid: TransactionId, pool: &'a BufferPool) -> Result<TupleScan<'a>> {
        let mut ws = WorkingSet::new();
        let root_key = self.root_key(tid, &mut ws, pool, Permissions::ReadOnly)?;
        let leaf = self.find_leaf(tid, &mut ws, pool, root_key, None, Permissions::ReadOnly)?;
        Ok(TupleScan {
            pool,
            tid,
            current: Some(leaf),
            slot: 0,
        })
    }

    /// Number of levels from the root down to (and including) the leaves.
    pub fn height(&self, tid: TransactionId, pool: &BufferPool) -> Result<usize> {
        let mut ws = WorkingSet::new();
        let mut key = self.root_key(tid, &mut ws, pool, Permissions::ReadOnly)?;
        let mut levels = 1;
        while key.category == PageCategory::Internal {
            let page = self.fetch_page(tid, &mut ws, pool, key, Permissions::ReadOnly)?;
            let guard = page.read();
            key = guard.as_internal()?.first_child()?;
            levels += 1;
        }
        Ok(levels)
    }
}

/// Streaming scan over the leaf sibling chain.
pub struct TupleScan<'a> {
    pool: &'a BufferPool,
    tid: TransactionId,
    current: Option<PageRef>,
    slot: usize,
}

impl Iterator for TupleScan<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let page = self.current.clone()?;
            let guard = page.read();
            let leaf = match guard.as_leaf() {
                Ok(leaf) => leaf,
                Err(e) => {
                    self.current = None;
                    return Some(Err(e));
                }
            };
            if self.slot < leaf.num_tuples() {
                let tuple = leaf.tuples()[self.slot].clone();
                self.slot += 1;
                return Some(Ok(tuple));
            }
            let next = leaf.right_sibling();
            drop(guard);
            match next {
                None => {
                    self.current = None;
                    return None;
                }
                Some(sibling) => {
                    match self.pool.get_page(self.tid, sibling, Permissions::ReadOnly) {
                        Ok(next_page) => {
                            self.current = Some(next_page);
                            self.slot = 0;
                        }
                        Err(e) => {
                            self.current = None;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}
