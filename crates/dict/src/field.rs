use crate::column::ColumnRef;

/// One field of an index: a column reference plus per-index attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub col: ColumnRef,
    /// `None` iff the column has been instantly dropped.
    pub name: Option<String>,
    /// Index prefix length in bytes; 0 means the full column.
    pub prefix_len: u16,
    pub descending: bool,
    /// Cached fixed physical size of this field in a stored record, or 0
    /// if variable.
    pub fixed_len: u16,
}

impl Field {
    pub fn new(col: ColumnRef, name: impl Into<String>) -> Self {
        Self {
            col,
            name: Some(name.into()),
            prefix_len: 0,
            descending: false,
            fixed_len: 0,
        }
    }

    pub fn with_prefix(mut self, prefix_len: u16) -> Self {
        self.prefix_len = prefix_len;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}
