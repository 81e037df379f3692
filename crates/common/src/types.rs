use std::{
    fmt,
    str::FromStr,
};

/// Persistent identity of a table. Assigned once from the global id
/// allocator and never reused.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
pub struct TableId(pub u64);

/// Persistent identity of an index.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
pub struct IndexId(pub u64);

/// Tablespace id. `UNASSIGNED` marks a table whose space has not been
/// allocated yet (or could not be).
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
pub struct SpaceId(pub u32);

impl SpaceId {
    /// The shared system tablespace.
    pub const SYSTEM: SpaceId = SpaceId(0);
    pub const UNASSIGNED: SpaceId = SpaceId(u32::MAX);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

/// Page number within a tablespace. `NULL` is the reserved "no page"
/// value stored in SYS_INDEXES for an unallocated tree.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
pub struct PageNo(pub u32);

impl PageNo {
    pub const NULL: PageNo = PageNo(u32::MAX);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Transaction id, monotonically increasing engine-wide.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
pub struct TrxId(pub u64);

impl TrxId {
    pub const NONE: TrxId = TrxId(0);
}

/// Qualified table name, `database/table`. This is the clustered key of
/// SYS_TABLES, so the string form is an on-disk contract.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{_0}")]
pub struct TableName(String);

impl TableName {
    pub fn new(database: &str, table: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !database.is_empty() && !table.is_empty(),
            "Empty database or table component"
        );
        anyhow::ensure!(
            !database.contains('/') && !table.contains('/'),
            "Name component contains '/'"
        );
        Ok(Self(format!("{database}/{table}")))
    }

    /// An unqualified, reserved system-table name (`SYS_FOREIGN` etc.).
    pub fn system(name: &'static str) -> Self {
        debug_assert!(name.starts_with("SYS_") && !name.contains('/'));
        Self(name.to_owned())
    }

    pub fn is_system(&self) -> bool {
        !self.0.contains('/')
    }

    pub fn database(&self) -> &str {
        self.0.split_once('/').map_or("", |(db, _)| db)
    }

    pub fn table(&self) -> &str {
        self.0.split_once('/').map_or(&self.0, |(_, table)| table)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TableName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (database, table) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("Table name `{s}` is not database-qualified"))?;
        Self::new(database, table)
    }
}

impl fmt::Debug for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_parse() {
        let name: TableName = "db/t".parse().unwrap();
        assert_eq!(name.database(), "db");
        assert_eq!(name.table(), "t");
        assert!("unqualified".parse::<TableName>().is_err());
        assert!("a/b/c".parse::<TableName>().is_err());
        assert!("/t".parse::<TableName>().is_err());
    }

    #[test]
    fn test_sentinels() {
        assert!(!SpaceId::UNASSIGNED.is_assigned());
        assert!(SpaceId::SYSTEM.is_assigned());
        assert!(PageNo::NULL.is_null());
        assert!(!PageNo(3).is_null());
    }
}
