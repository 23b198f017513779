//! Configuration constants for burrowdb.

/// Size of an on-disk page frame in bytes (4KB).
///
/// Matches the OS page size on most systems, so a page frame maps cleanly
/// onto the kernel page cache. Every slot in a table file is exactly this
/// large; typed page contents must encode within it.
pub const PAGE_SIZE: usize = 4096;

/// Default number of pages the buffer pool caches across all tables.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Default maximum tuples per leaf page.
///
/// Capacities are logical limits on typed page contents, not derived from
/// the byte layout; the codec rejects pages whose encoding would overflow
/// [`PAGE_SIZE`]. Tests shrink these to force splits early.
pub const DEFAULT_LEAF_CAPACITY: usize = 64;

/// Default maximum entries per internal page.
pub const DEFAULT_INTERNAL_CAPACITY: usize = 64;
