//! Tree root pointer page contents.

use crate::common::PageKey;

/// The single record naming the current tree root.
///
/// Rewritten whenever the root splits (a new internal root is minted,
/// height +1) or a single-child root collapses (height -1). Stored in
/// slot 0 of every table file so the tree is findable after a restart.
#[derive(Debug, Clone)]
pub struct RootPointerPage {
    root: PageKey,
}

impl RootPointerPage {
    pub fn new(root: PageKey) -> Self {
        RootPointerPage { root }
    }

    #[inline]
    pub fn root(&self) -> PageKey {
        self.root
    }

    #[inline]
    pub fn set_root(&mut self, root: PageKey) {
        self.root = root;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageCategory, TableId};

    #[test]
    fn test_root_pointer_retargets() {
        let leaf = PageKey::new(TableId(1), 2, PageCategory::Leaf);
        let node = PageKey::new(TableId(1), 5, PageCategory::Internal);

        let mut ptr = RootPointerPage::new(leaf);
        assert_eq!(ptr.root(), leaf);

        ptr.set_root(node);
        assert_eq!(ptr.root(), node);
    }
}
