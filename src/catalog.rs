//! Catalog - the table registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{Error, Result, TableId};
use crate::tree::BTreeFile;

/// Maps table identifiers to their backing files.
///
/// The buffer pool resolves every page load and write-back through the
/// catalog; registering a table makes its pages reachable.
#[derive(Default)]
pub struct Catalog {
    files: RwLock<HashMap<TableId, Arc<BTreeFile>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table file under its own table id, replacing any
    /// previous registration.
    pub fn register(&self, file: Arc<BTreeFile>) {
        self.files.write().insert(file.table(), file);
    }

    /// Resolve a table id to its file.
    pub fn file(&self, table: TableId) -> Result<Arc<BTreeFile>> {
        self.files
            .read()
            .get(&table)
            .cloned()
            .ok_or(Error::UnknownTable(table))
    }

    /// All registered table ids.
    pub fn tables(&self) -> Vec<TableId> {
        self.files.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_table_errors() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.file(TableId(9)),
            Err(Error::UnknownTable(TableId(9)))
        ));
    }
}
