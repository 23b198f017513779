//! burrowdb - the storage core of a disk-oriented relational database.
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          burrowdb                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────────┐   │
//! │  │              Buffer Pool (buffer/)                     │   │
//! │  │   page cache + dirty tracking + ordered eviction       │   │
//! │  └────────────────────────────────────────────────────────┘   │
//! │                              ↓                                │
//! │  ┌────────────────────────────────────────────────────────┐   │
//! │  │              B+Tree files (tree/)                      │   │
//! │  │   navigate → split / redistribute / merge              │   │
//! │  └────────────────────────────────────────────────────────┘   │
//! │                              ↓                                │
//! │  ┌────────────────────────────────────────────────────────┐   │
//! │  │              Storage layer (storage/)                  │   │
//! │  │   DiskManager + typed pages + frame codec              │   │
//! │  └────────────────────────────────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every insert or delete descends one table's B+Tree, collecting the
//! pages it touches into an operation-scoped working set; the buffer
//! pool then records each as dirty for the calling transaction and
//! keeps the cache within capacity by evicting policy-ordered victims.
//! Locking, write-ahead logging, and query execution are external
//! collaborators — this crate only honors their interfaces.
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use burrowdb::{BTreeFile, BufferPool, Catalog, Field, TableId, TransactionId, TreeParams, Tuple};
//!
//! # fn main() -> burrowdb::Result<()> {
//! let catalog = Arc::new(Catalog::new());
//! let table = TableId(1);
//! let file = BTreeFile::create("orders.tbl", table, TreeParams::default())?;
//! catalog.register(Arc::new(file));
//!
//! let pool = BufferPool::new(catalog.clone(), 64);
//! let tid = TransactionId::new();
//! pool.insert_tuple(tid, table, Tuple::new(vec![Field(42), Field(7)]))?;
//! pool.flush_pages(tid)?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod storage;
pub mod tree;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, PageCategory, PageKey, Permissions, Result, TableId, TransactionId};

pub use buffer::{BufferPool, EvictionBias, PoolStats, StatsSnapshot};
pub use catalog::Catalog;
pub use storage::{Field, RecordId, Tuple};
pub use tree::{BTreeFile, TreeParams, TupleScan};
