//! Tuple and field value holders.
//!
//! The tree treats these as opaque comparable records: it only ever
//! orders tuples by one designated key field and compares fields with
//! `<=` / `>=` during descent and split-side decisions.

use std::fmt;

use crate::common::PageKey;

/// A single ordered field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Field(pub i64);

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a tuple currently lives: its leaf page and slot at insert time.
///
/// The slot is informational (balancing moves tuples between pages); the
/// page key's table id is what the buffer pool's delete path resolves
/// the owning file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId {
    pub page: PageKey,
    pub slot: usize,
}

/// A table row.
///
/// Equality compares field values only, so a caller-constructed tuple
/// matches the stored copy regardless of where balancing has moved it.
#[derive(Debug, Clone)]
pub struct Tuple {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Create a tuple from its field values.
    pub fn new(fields: Vec<Field>) -> Self {
        Tuple {
            fields,
            record_id: None,
        }
    }

    /// The field at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds, which is a schema-level bug.
    #[inline]
    pub fn field(&self, index: usize) -> Field {
        self.fields[index]
    }

    /// All fields in order.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields.
    #[inline]
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Where the tuple was last stored, if it has been stored at all.
    #[inline]
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub(crate) fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, ")")
    }
}
