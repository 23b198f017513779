//! Page access permission levels.

/// How a caller intends to use a page it is loading.
///
/// The storage core does not implement locking; conflict serialization
/// between transactions belongs to an external lock manager. The
/// permission level is honored in exactly one way here: read-write
/// loads join the operation's dirty-page working set, read-only loads
/// do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions_compare() {
        assert_eq!(Permissions::ReadOnly, Permissions::ReadOnly);
        assert_ne!(Permissions::ReadOnly, Permissions::ReadWrite);
    }
}
