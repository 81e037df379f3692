use value::{
    DataType,
    UNIV_SQL_NULL,
};

/// Default value of an instantly added column. Old rows never carry the
/// column; readers materialize this value instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefaultValue {
    Null,
    /// An all-zero default of the given length. Stored as a reference to
    /// the shared zero buffer rather than a private copy.
    Zeroes { len: u32 },
    Bytes(Box<[u8]>),
}

impl DefaultValue {
    /// Normalizes an all-zero byte default to the shared zero buffer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.iter().all(|b| *b == 0) {
            Self::Zeroes {
                len: bytes.len() as u32,
            }
        } else {
            Self::Bytes(bytes.into())
        }
    }

    /// Stored length, with `UNIV_SQL_NULL` encoding a NULL default.
    pub fn stored_len(&self) -> u32 {
        match self {
            Self::Null => UNIV_SQL_NULL,
            Self::Zeroes { len } => *len,
            Self::Bytes(bytes) => bytes.len() as u32,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn materialize(&self) -> Option<Vec<u8>> {
        match self {
            Self::Null => None,
            Self::Zeroes { len } => Some(vec![0u8; *len as usize]),
            Self::Bytes(bytes) => Some(bytes.to_vec()),
        }
    }
}

/// One stored column of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Position in the original creation order, 0-based. Virtual columns
    /// number their own namespace.
    pub ind: u16,
    pub name: String,
    pub dtype: DataType,
    /// The column participates in some index.
    pub ord_part: bool,
    /// Set iff the column was instantly added; old rows read this value.
    pub def_val: Option<DefaultValue>,
    /// The column was instantly dropped; its image survives only inside
    /// the table's instant descriptor.
    pub dropped: bool,
}

impl Column {
    pub fn new(ind: u16, name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            ind,
            name: name.into(),
            dtype,
            ord_part: false,
            def_val: None,
            dropped: false,
        }
    }

    pub fn is_added(&self) -> bool {
        self.def_val.is_some()
    }

    pub fn is_nullable(&self) -> bool {
        self.dtype.nullable()
    }

    /// Whether the column can force external (overflow) storage: long
    /// variable-width values and blobs.
    pub fn is_big(&self) -> bool {
        self.dtype.mtype.is_blob_like() || self.dtype.max_size() > 255
    }

    /// The dropped image preserved in the instant descriptor: enough type
    /// information to parse old rows, no name.
    pub fn dropped_image(&self) -> Column {
        Column {
            ind: self.ind,
            name: String::new(),
            dtype: self.dtype,
            ord_part: self.ord_part,
            def_val: None,
            dropped: true,
        }
    }
}

/// Which array of the owning table a field's column lives in. Indices
/// replace the pointer graph of the original design: rewiring on instant
/// ALTER or rollback swaps indices, never frees memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnRef {
    /// `table.cols[i]`
    Live(usize),
    /// `table.v_cols[i]`
    Virtual(usize),
    /// `table.instant.dropped[i]`
    Dropped(usize),
}

impl ColumnRef {
    pub fn is_dropped(self) -> bool {
        matches!(self, Self::Dropped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_defaults_share_the_zero_buffer() {
        assert_eq!(
            DefaultValue::from_bytes(&[0, 0, 0, 0]),
            DefaultValue::Zeroes { len: 4 }
        );
        assert_eq!(
            DefaultValue::from_bytes(&[0, 1]),
            DefaultValue::Bytes(vec![0, 1].into())
        );
        assert_eq!(DefaultValue::Null.stored_len(), UNIV_SQL_NULL);
        assert_eq!(DefaultValue::Zeroes { len: 4 }.stored_len(), 4);
    }

    #[test]
    fn test_dropped_image_keeps_type_only() {
        let mut col = Column::new(1, "a", value::DataType::varchar(32));
        col.ord_part = true;
        let image = col.dropped_image();
        assert!(image.dropped);
        assert!(image.name.is_empty());
        assert_eq!(image.dtype.len, 32);
        assert_eq!(image.ind, 1);
    }
}
