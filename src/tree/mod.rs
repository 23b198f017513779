//! B+Tree table files.
//!
//! One [`BTreeFile`] per table: a paged file whose leaves hold the
//! table's tuples in key order and whose internal pages route descent.
//! The implementation is split across focused files, all extending
//! `impl BTreeFile`:
//! - [`file`] - bootstrap, page I/O, allocation, mutation entry points
//! - [`navigate`] - descent to the correct leaf
//! - [`split`] - overfull pages: leaf/internal splits and root growth
//! - [`balance`] - underfull pages: redistribution, merge, root collapse

mod balance;
mod file;
mod navigate;
mod split;

use std::collections::HashMap;

use crate::common::PageKey;
use crate::storage::page::PageRef;

pub use file::{BTreeFile, TreeParams, TupleScan};

/// The dirty-page working set of one top-level mutation.
///
/// Every page fetched read-write (or freshly allocated) during an
/// insert/delete lands here, so repeated lookups within the operation
/// see a single in-memory version. The set is handed to the buffer
/// pool when the operation completes and then discarded.
pub(crate) type WorkingSet = HashMap<PageKey, PageRef>;
