//! Error types for burrowdb.

use thiserror::Error;

use crate::common::page_key::{PageKey, TableId};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write
/// `Result<T>`, following the `std::io::Result` pattern.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in burrowdb.
///
/// A single error type keeps handling consistent across the storage,
/// tree, and buffer layers. No operation retries internally; every
/// failure propagates to the caller synchronously.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested page identity does not exist in its table file.
    #[error("page {0} not found")]
    PageNotFound(PageKey),

    /// No file is registered for the table identifier.
    #[error("table {0} is not registered in the catalog")]
    UnknownTable(TableId),

    /// The tuple targeted by a delete is not present in the tree.
    #[error("tuple not found in table {0}")]
    TupleNotFound(TableId),

    /// The eviction policy has no victim it is willing to surrender.
    ///
    /// Under [`EvictionBias::CleanFirst`](crate::buffer::EvictionBias) a
    /// pool holding only dirty pages refuses to evict, and capacity is
    /// genuinely exhausted.
    #[error("buffer pool capacity exhausted: no evictable page")]
    CacheExhausted,

    /// A structural invariant of the tree was violated.
    ///
    /// These are programming-contract violations (splitting a page that
    /// is not full, merging pages that do not share a parent, a non-root
    /// internal page with no entries) and fail loudly rather than being
    /// swallowed.
    #[error("structural invariant violated: {0}")]
    Invariant(&'static str),

    /// An on-disk page frame failed its checksum or could not be decoded.
    #[error("corrupted page frame: {0}")]
    Corrupted(&'static str),
}
