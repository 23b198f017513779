//! Buffer Pool - the process-wide page cache.
//!
//! The [`BufferPool`] provides:
//! - Page caching between table files and memory
//! - Per-transaction dirty tracking
//! - Bounded capacity with policy-ordered eviction
//! - Flush scoping (one page, one transaction, everything)

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::eviction::EvictionPolicy;
use crate::buffer::{EvictionBias, PoolStats};
use crate::catalog::Catalog;
use crate::common::{Error, PageKey, Permissions, Result, TableId, TransactionId};
use crate::storage::page::PageRef;
use crate::storage::tuple::Tuple;

/// Cache map and victim index, always updated together.
///
/// Living under one mutex is what guarantees the lock-step invariant:
/// a page is never cached without eviction metadata or vice versa.
struct PoolState {
    cache: HashMap<PageKey, PageRef>,
    policy: EvictionPolicy,
}

/// A capacity-bounded cache of pages across the whole database.
///
/// # Architecture
/// ```text
/// ┌────────────────────────────────────────────────────────────┐
/// │                       BufferPool                           │
/// │  ┌──────────────────────┐  ┌────────────────────────────┐  │
/// │  │ cache                │  │ policy                     │  │
/// │  │ PageKey → PageRef    │  │ (dirty, refs, age) ordered │  │
/// │  └──────────────────────┘  └────────────────────────────┘  │
/// │            └───── one Mutex, moved in lock-step ─────┘     │
/// │  ┌──────────────────────┐  ┌────────────────────────────┐  │
/// │  │ catalog              │  │ stats                      │  │
/// │  │ TableId → BTreeFile  │  │ atomic counters            │  │
/// │  └──────────────────────┘  └────────────────────────────┘  │
/// └────────────────────────────────────────────────────────────┘
/// ```
///
/// # Lifecycle
/// Created once at process start with a fixed capacity; dropped at
/// process end without any implied flush — call
/// [`flush_all_pages`](Self::flush_all_pages) first if the contents
/// should survive.
///
/// # Caveat: dirty eviction
/// Under the default [`EvictionBias::DirtyFirst`] ordering, evicting a
/// dirty page writes state whose owning transaction may not have
/// committed. The core has no undo log; correctness across crash or
/// abort is a precondition on an external recovery collaborator.
pub struct BufferPool {
    catalog: Arc<Catalog>,
    capacity: usize,
    bias: EvictionBias,
    state: Mutex<PoolState>,
    stats: PoolStats,
}

impl BufferPool {
    /// Create a pool caching at most `capacity` pages, with the
    /// reference dirty-first eviction ordering.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(catalog: Arc<Catalog>, capacity: usize) -> Self {
        Self::with_bias(catalog, capacity, EvictionBias::DirtyFirst)
    }

    /// Create a pool with an explicit eviction bias.
    pub fn with_bias(catalog: Arc<Catalog>, capacity: usize, bias: EvictionBias) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        BufferPool {
            catalog,
            capacity,
            bias,
            state: Mutex::new(PoolState {
                cache: HashMap::new(),
                policy: EvictionPolicy::new(),
            }),
            stats: PoolStats::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages currently cached.
    pub fn len(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().cache.is_empty()
    }

    /// Buffer pool statistics.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    // ========================================================================
    // Public API: page access
    // ========================================================================

    /// Return the cached page, loading it from its table file if absent.
    ///
    /// The permission level is recorded for the external lock manager's
    /// benefit; the pool itself does not serialize access. Loading into
    /// a full cache evicts until the size is strictly below capacity.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the identity does not exist in the file
    /// - `Error::UnknownTable` if no file is registered for the table
    /// - `Error::CacheExhausted` if the policy yields no victim
    pub fn get_page(
        &self,
        tid: TransactionId,
        key: PageKey,
        perm: Permissions,
    ) -> Result<PageRef> {
        let mut state = self.state.lock();

        if let Some(page) = state.cache.get(&key).cloned() {
            let dirty = page.read().is_dirty();
            state.policy.on_page_ref(key, dirty);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            trace!(%tid, page = %key, ?perm, "cache hit");
            return Ok(page);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        trace!(%tid, page = %key, ?perm, "cache miss");

        let file = self.catalog.file(key.table)?;
        let page = file.read_page(key)?.into_ref();

        self.make_room(&mut state)?;
        state.cache.insert(key, page.clone());
        state.policy.on_page_ref(key, false);
        Ok(page)
    }

    // ========================================================================
    // Public API: tuple mutations
    // ========================================================================

    /// Insert a tuple into `table`, publishing every page the tree
    /// mutation touched as dirty-for-`tid`.
    pub fn insert_tuple(&self, tid: TransactionId, table: TableId, tuple: Tuple) -> Result<()> {
        let file = self.catalog.file(table)?;
        let touched = file.insert_tuple(tid, self, tuple)?;
        self.publish(tid, touched)
    }

    /// Delete a tuple, resolving its table from the record id stamped at
    /// insert time.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple
            .record_id()
            .ok_or(Error::Invariant("delete of a tuple that was never stored"))?;
        let file = self.catalog.file(rid.page.table)?;
        let touched = file.delete_tuple(tid, self, tuple.clone())?;
        self.publish(tid, touched)
    }

    /// Admit an operation's dirtied pages into the cache.
    fn publish(&self, tid: TransactionId, pages: Vec<PageRef>) -> Result<()> {
        let mut state = self.state.lock();
        for page in pages {
            let key = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.key()
            };
            if !state.cache.contains_key(&key) {
                self.make_room(&mut state)?;
            }
            state.cache.insert(key, page);
            state.policy.on_page_ref(key, true);
        }
        Ok(())
    }

    // ========================================================================
    // Public API: flushing and discarding
    // ========================================================================

    /// Write a page back to its table file if dirty; no-op otherwise.
    pub fn flush_page(&self, key: PageKey) -> Result<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state, key)
    }

    /// Flush every page currently dirtied by `tid`, leaving other
    /// transactions' pages untouched.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let mut state = self.state.lock();
        let owned: Vec<PageKey> = state
            .cache
            .iter()
            .filter(|(_, page)| page.read().dirtier() == Some(tid))
            .map(|(&key, _)| key)
            .collect();
        for key in owned {
            self.flush_locked(&mut state, key)?;
        }
        Ok(())
    }

    /// Flush every dirty page regardless of owner.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut state = self.state.lock();
        let dirty: Vec<PageKey> = state
            .cache
            .iter()
            .filter(|(_, page)| page.read().is_dirty())
            .map(|(&key, _)| key)
            .collect();
        for key in dirty {
            self.flush_locked(&mut state, key)?;
        }
        Ok(())
    }

    /// Drop a page from the cache and the victim index without flushing.
    ///
    /// Used to abandon pages whose mutation is being discarded (a page
    /// freed by a merge, or an aborting transaction's scratch state).
    pub fn discard_page(&self, key: PageKey) {
        let mut state = self.state.lock();
        state.cache.remove(&key);
        state.policy.discard(key);
        trace!(page = %key, "discarded");
    }

    /// Evict one victim chosen by the policy, flushing it first if dirty.
    pub fn evict_page(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.evict_locked(&mut state)
    }

    // ========================================================================
    // Internal: locked helpers
    // ========================================================================

    /// Evict until the cache is strictly below capacity.
    fn make_room(&self, state: &mut PoolState) -> Result<()> {
        while state.cache.len() >= self.capacity {
            self.evict_locked(state)?;
        }
        Ok(())
    }

    fn evict_locked(&self, state: &mut PoolState) -> Result<()> {
        let victim = state.policy.victim(self.bias).ok_or(Error::CacheExhausted)?;

        let page = state
            .cache
            .get(&victim)
            .cloned()
            .ok_or(Error::Invariant("victim index names a page that is not cached"))?;
        {
            let mut guard = page.write();
            if guard.is_dirty() {
                // Writes possibly-uncommitted state; see the type-level caveat.
                let file = self.catalog.file(victim.table)?;
                file.write_page(&guard)?;
                guard.mark_dirty(None);
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
            }
        }
        state.cache.remove(&victim);
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        debug!(page = %victim, "evicted");
        Ok(())
    }

    fn flush_locked(&self, state: &mut PoolState, key: PageKey) -> Result<()> {
        let Some(page) = state.cache.get(&key).cloned() else {
            return Ok(());
        };
        let mut guard = page.write();
        if guard.is_dirty() {
            let file = self.catalog.file(key.table)?;
            file.write_page(&guard)?;
            guard.mark_dirty(None);
            state.policy.note_flushed(key);
            self.stats.flushes.fetch_add(1, Ordering::Relaxed);
            debug!(page = %key, "flushed");
        }
        Ok(())
    }
}
