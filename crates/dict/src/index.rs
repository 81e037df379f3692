use common::{
    flags::IndexType,
    limits::MERGE_THRESHOLD_DEFAULT,
    types::{
        IndexId,
        PageNo,
        TableId,
        TrxId,
    },
};

use crate::field::Field;

/// One index of a table. The clustered index holds full rows; secondary
/// indexes append the clustered key to their user-defined fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    pub id: IndexId,
    pub name: String,
    pub index_type: IndexType,
    pub table_id: TableId,
    pub fields: Vec<Field>,
    /// Key prefix length used for uniqueness checks. For a non-unique
    /// secondary index this includes the appended clustered key.
    pub n_uniq: usize,
    pub n_user_defined_cols: usize,
    pub n_nullable: usize,
    /// Field count at the time of the most recent width-changing instant
    /// ALTER; lets old, narrower records still be parsed.
    pub n_core_fields: usize,
    pub n_core_null_bytes: usize,
    /// Root page, `PageNo::NULL` until the tree is allocated.
    pub page: PageNo,
    /// Transaction that created the index.
    pub trx_id: TrxId,
    pub merge_threshold: u32,
    /// An uncommitted index is hidden from normal catalog lookups by a
    /// reserved name-prefix byte.
    pub committed: bool,
}

impl Index {
    pub fn new(id: IndexId, table_id: TableId, name: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            id,
            name: name.into(),
            index_type,
            table_id,
            fields: Vec::new(),
            n_uniq: 0,
            n_user_defined_cols: 0,
            n_nullable: 0,
            n_core_fields: 0,
            n_core_null_bytes: 0,
            page: PageNo::NULL,
            trx_id: TrxId::NONE,
            merge_threshold: MERGE_THRESHOLD_DEFAULT,
            committed: true,
        }
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn is_clustered(&self) -> bool {
        self.index_type.is_clustered()
    }

    pub fn is_unique(&self) -> bool {
        self.index_type.is_unique()
    }

    pub fn is_corrupted(&self) -> bool {
        self.index_type.is_corrupt()
    }

    /// First clustered-index field position that belongs to a user column
    /// not in the key: the unique key prefix plus DB_TRX_ID and
    /// DB_ROLL_PTR. These leading fields never participate in instant
    /// changes.
    pub fn first_user_field(&self) -> usize {
        debug_assert!(self.is_clustered());
        self.n_uniq + 2
    }

    /// The index stores records narrower than its current field count,
    /// i.e. an instant ALTER has widened it.
    pub fn is_instant(&self) -> bool {
        debug_assert!(self.n_core_fields <= self.n_fields());
        self.n_core_fields != self.n_fields()
    }

    /// Whether any field forces the wide SYS_FIELDS.POS encoding.
    pub fn has_wide_field_pos(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.prefix_len > 0 || f.descending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_user_field() {
        let mut index = Index::new(
            IndexId(1),
            TableId(1),
            "PRIMARY",
            IndexType::default().with(IndexType::CLUSTERED | IndexType::UNIQUE),
        );
        index.n_uniq = 1;
        // One key column, DB_TRX_ID, DB_ROLL_PTR, then user fields.
        assert_eq!(index.first_user_field(), 3);
    }
}
