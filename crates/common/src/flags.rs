use std::fmt;

/// Table row-format flags, persisted (via [`TableFlags::to_sys_tables_type`])
/// in the SYS_TABLES.TYPE column. Bit positions are an on-disk contract.
#[derive(Clone, Copy, PartialEq, Eq, Default, derive_more::From)]
pub struct TableFlags(pub u32);

impl TableFlags {
    /// Compact row format (as opposed to the pre-compact redundant format).
    pub const COMPACT: u32 = 1;
    pub const ZIP_SSIZE_SHIFT: u32 = 1;
    pub const ZIP_SSIZE_MASK: u32 = 0xF << Self::ZIP_SSIZE_SHIFT;
    /// Externally stored columns keep only a 20-byte reference inline.
    pub const ATOMIC_BLOBS: u32 = 1 << 5;
    /// The tablespace file lives in a user-chosen directory.
    pub const DATA_DIR: u32 = 1 << 6;

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    pub fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }

    pub fn compact(self) -> bool {
        self.contains(Self::COMPACT)
    }

    pub fn atomic_blobs(self) -> bool {
        self.contains(Self::ATOMIC_BLOBS)
    }

    pub fn zip_ssize(self) -> u32 {
        (self.0 & Self::ZIP_SSIZE_MASK) >> Self::ZIP_SSIZE_SHIFT
    }

    /// The value stored in SYS_TABLES.TYPE. Flag values 0 and 1 are both
    /// written as 1: the file format historically used 1 for the redundant
    /// row format and readers still expect the low bit set.
    pub fn to_sys_tables_type(self) -> u32 {
        self.0 | 1
    }
}

impl fmt::Debug for TableFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableFlags({:#x})", self.0)
    }
}

/// Per-table boolean flags, persisted verbatim in SYS_TABLES.MIX_LEN.
#[derive(Clone, Copy, PartialEq, Eq, Default, derive_more::From)]
pub struct TableFlags2(pub u32);

impl TableFlags2 {
    pub const TEMPORARY: u32 = 1;
    /// The tablespace has been discarded; no tree may be created in it.
    pub const DISCARDED: u32 = 1 << 1;
    pub const FTS: u32 = 1 << 2;
    pub const FTS_HAS_DOC_ID: u32 = 1 << 3;
    pub const FTS_ADD_DOC_ID: u32 = 1 << 4;
    pub const USE_FILE_PER_TABLE: u32 = 1 << 5;
    pub const FTS_AUX_HEX_NAME: u32 = 1 << 6;
    /// Bits that must never appear in a catalog row.
    pub const UNUSED_BIT_MASK: u32 = !0x7F;

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    pub fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }

    pub fn without(self, flags: u32) -> Self {
        Self(self.0 & !flags)
    }

    pub fn is_temporary(self) -> bool {
        self.contains(Self::TEMPORARY)
    }

    pub fn is_discarded(self) -> bool {
        self.contains(Self::DISCARDED)
    }

    pub fn file_per_table(self) -> bool {
        self.contains(Self::USE_FILE_PER_TABLE)
    }
}

impl fmt::Debug for TableFlags2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableFlags2({:#x})", self.0)
    }
}

/// Index type bitset, persisted verbatim in SYS_INDEXES.TYPE.
#[derive(Clone, Copy, PartialEq, Eq, Default, derive_more::From)]
pub struct IndexType(pub u32);

impl IndexType {
    pub const CLUSTERED: u32 = 1;
    pub const UNIQUE: u32 = 1 << 1;
    pub const IBUF: u32 = 1 << 3;
    pub const CORRUPT: u32 = 1 << 4;
    pub const FTS: u32 = 1 << 5;
    pub const SPATIAL: u32 = 1 << 6;
    /// The index has at least one virtual column.
    pub const VIRTUAL: u32 = 1 << 7;

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    pub fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }

    pub fn without(self, flags: u32) -> Self {
        Self(self.0 & !flags)
    }

    pub fn is_clustered(self) -> bool {
        self.contains(Self::CLUSTERED)
    }

    pub fn is_unique(self) -> bool {
        self.contains(Self::UNIQUE)
    }

    pub fn is_fts(self) -> bool {
        self.contains(Self::FTS)
    }

    pub fn is_spatial(self) -> bool {
        self.contains(Self::SPATIAL)
    }

    pub fn is_corrupt(self) -> bool {
        self.contains(Self::CORRUPT)
    }
}

impl fmt::Debug for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexType({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sys_tables_type_collapses_zero_and_one() {
        assert_eq!(TableFlags(0).to_sys_tables_type(), 1);
        assert_eq!(TableFlags(1).to_sys_tables_type(), 1);
        let flags = TableFlags::default().with(TableFlags::COMPACT | TableFlags::ATOMIC_BLOBS);
        assert_eq!(flags.to_sys_tables_type(), flags.raw());
    }

    #[test]
    fn test_flags2_reserved_bits() {
        let flags2 = TableFlags2::default()
            .with(TableFlags2::USE_FILE_PER_TABLE | TableFlags2::FTS_AUX_HEX_NAME);
        assert_eq!(flags2.raw() & TableFlags2::UNUSED_BIT_MASK, 0);
        assert!(TableFlags2(1 << 9).raw() & TableFlags2::UNUSED_BIT_MASK != 0);
    }

    #[test]
    fn test_index_type() {
        let clustered = IndexType::default().with(IndexType::CLUSTERED | IndexType::UNIQUE);
        assert!(clustered.is_clustered());
        assert!(clustered.is_unique());
        assert!(!clustered.is_fts());
        assert_eq!(clustered.raw(), 3);
    }
}
