//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache layer between the B+Tree
//! files and disk. It caches whole typed pages keyed by identity,
//! tracks which transaction dirtied each one, and stays within a fixed
//! capacity by evicting policy-chosen victims.
//!
//! # Components
//! - [`BufferPool`] - the page cache and its tuple-mutation front door
//! - [`EvictionBias`] - dirty-first (reference) or clean-first ordering
//! - [`PoolStats`] / [`StatsSnapshot`] - atomic counters

mod eviction;
mod pool;
mod stats;

pub use eviction::EvictionBias;
pub use pool::BufferPool;
pub use stats::{PoolStats, StatsSnapshot};
