use std::collections::{
    BTreeMap,
    BTreeSet,
};

use common::{
    flags::{
        TableFlags,
        TableFlags2,
    },
    limits::{
        DATA_N_SYS_COLS,
        DATA_ROLL_PTR_LEN,
        DATA_ROW_ID_LEN,
        DATA_TRX_ID_LEN,
    },
    types::{
        SpaceId,
        TableId,
        TableName,
        TrxId,
    },
};
use value::{
    DataType,
    PreciseType,
};

use crate::{
    column::{
        Column,
        ColumnRef,
    },
    foreign::ForeignKey,
    index::Index,
    instant::InstantMetadata,
    virtual_col::{
        BaseColRef,
        VirtualColumn,
    },
};

pub const ROW_ID_NAME: &str = "DB_ROW_ID";
pub const TRX_ID_NAME: &str = "DB_TRX_ID";
pub const ROLL_PTR_NAME: &str = "DB_ROLL_PTR";

/// One open table: the in-memory mirror of its catalog rows. The table
/// owns every column, virtual column, index and constraint; fields refer
/// back into the column arrays by index (see [`ColumnRef`]), so rewiring
/// the graph never frees memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub id: TableId,
    pub name: TableName,
    pub flags: TableFlags,
    pub flags2: TableFlags2,
    pub space_id: SpaceId,
    /// Stored columns; the three system columns sit at the end.
    pub cols: Vec<Column>,
    pub v_cols: Vec<VirtualColumn>,
    /// Committed column count. Equal to `cols.len()` except while the
    /// definition is being built.
    n_cols: usize,
    n_v_cols: usize,
    /// Indexes, clustered first.
    pub indexes: Vec<Index>,
    pub instant: Option<InstantMetadata>,
    /// 1-based ordinal of the AUTO_INCREMENT column, 0 = none.
    pub persistent_autoinc: u16,
    /// Ordinals of the system-versioning period columns.
    pub vers_start: Option<u16>,
    pub vers_end: Option<u16>,
    /// Stored generated columns: (column index, base column indices).
    /// Unlike virtual columns their values are materialized in rows, but
    /// referential actions on their base columns are still restricted.
    pub s_cols: Vec<(usize, Vec<usize>)>,
    /// Constraints owned by this table, by constraint id.
    pub foreign: BTreeMap<String, ForeignKey>,
    /// Ids of constraints on other tables referencing this one.
    pub referenced_ids: BTreeSet<String>,
    /// Transaction of the last DDL touching this table's definition.
    pub def_trx_id: TrxId,
    pub can_be_evicted: bool,
}

impl Table {
    /// Start a table definition. Columns are added one at a time;
    /// [`Table::complete_definition`] appends the system columns and
    /// freezes the counts.
    pub fn new(name: TableName, flags: TableFlags, flags2: TableFlags2) -> Self {
        Self {
            id: TableId(0),
            name,
            flags,
            flags2,
            space_id: SpaceId::UNASSIGNED,
            cols: Vec::new(),
            v_cols: Vec::new(),
            n_cols: 0,
            n_v_cols: 0,
            indexes: Vec::new(),
            instant: None,
            persistent_autoinc: 0,
            vers_start: None,
            vers_end: None,
            s_cols: Vec::new(),
            foreign: BTreeMap::new(),
            referenced_ids: BTreeSet::new(),
            def_trx_id: TrxId::NONE,
            can_be_evicted: false,
        }
    }

    pub fn add_column(&mut self, name: impl Into<String>, dtype: DataType) -> &mut Self {
        let ind = self.cols.len() as u16;
        self.cols.push(Column::new(ind, name, dtype));
        self
    }

    pub fn add_virtual_column(
        &mut self,
        name: impl Into<String>,
        dtype: DataType,
        base: Vec<BaseColRef>,
    ) -> &mut Self {
        let v_pos = self.v_cols.len() as u16;
        let mut col = Column::new(v_pos, name, dtype);
        col.dtype.prtype = col.dtype.prtype.with(PreciseType::VIRTUAL);
        self.v_cols.push(VirtualColumn::new(col, v_pos, base));
        self
    }

    /// Append the hidden system columns and freeze the column counts.
    pub fn complete_definition(&mut self) {
        debug_assert!(self.n_cols == 0, "definition completed twice");
        let base = self.cols.len() as u16;
        self.cols
            .push(Column::new(base, ROW_ID_NAME, DataType::sys(DATA_ROW_ID_LEN)));
        self.cols.push(Column::new(
            base + 1,
            TRX_ID_NAME,
            DataType::sys(DATA_TRX_ID_LEN),
        ));
        self.cols.push(Column::new(
            base + 2,
            ROLL_PTR_NAME,
            DataType::sys(DATA_ROLL_PTR_LEN),
        ));
        self.n_cols = self.cols.len();
        self.n_v_cols = self.v_cols.len();
        self.rescan_versioning();
    }

    /// Committed stored-column count, including the system columns.
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Stored columns defined so far (equals [`Table::n_cols`] outside of
    /// construction).
    pub fn n_def(&self) -> usize {
        self.cols.len()
    }

    pub fn n_v_cols(&self) -> usize {
        self.n_v_cols
    }

    pub fn n_v_def(&self) -> usize {
        self.v_cols.len()
    }

    pub fn n_user_cols(&self) -> usize {
        self.n_cols - DATA_N_SYS_COLS
    }

    /// Called by the instant engine after it swaps the column arrays.
    pub fn set_committed_counts(&mut self, n_cols: usize, n_v_cols: usize) {
        self.n_cols = n_cols;
        self.n_v_cols = n_v_cols;
    }

    pub fn n_dropped(&self) -> usize {
        self.instant.as_ref().map_or(0, InstantMetadata::n_dropped)
    }

    pub fn not_redundant(&self) -> bool {
        self.flags.compact()
    }

    pub fn clustered_index(&self) -> anyhow::Result<&Index> {
        let index = self
            .indexes
            .first()
            .ok_or_else(|| anyhow::anyhow!("Table {} has no indexes", self.name))?;
        anyhow::ensure!(
            index.is_clustered(),
            "First index {} of {} is not clustered",
            index.name,
            self.name
        );
        Ok(index)
    }

    pub fn clustered_index_mut(&mut self) -> anyhow::Result<&mut Index> {
        let name = self.name.clone();
        let index = self
            .indexes
            .first_mut()
            .ok_or_else(|| anyhow::anyhow!("Table {name} has no indexes"))?;
        anyhow::ensure!(
            index.is_clustered(),
            "First index {} of {name} is not clustered",
            index.name
        );
        Ok(index)
    }

    pub fn index_by_name(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn col_by_name(&self, name: &str) -> Option<(usize, &Column)> {
        self.cols
            .iter()
            .enumerate()
            .find(|(_, col)| col.name == name)
    }

    /// True if `col_name` is a base column of any stored generated
    /// column.
    pub fn is_base_of_stored_generated(&self, col_name: &str) -> bool {
        self.s_cols.iter().any(|(_, base)| {
            base.iter()
                .any(|&i| self.cols.get(i).is_some_and(|col| col.name == col_name))
        })
    }

    /// Resolve a field's column reference against this table's arrays.
    pub fn resolve_col(&self, col_ref: ColumnRef) -> anyhow::Result<&Column> {
        match col_ref {
            ColumnRef::Live(i) => self
                .cols
                .get(i)
                .ok_or_else(|| anyhow::anyhow!("Live column {i} out of bounds")),
            ColumnRef::Virtual(i) => self
                .v_cols
                .get(i)
                .map(|v| &v.col)
                .ok_or_else(|| anyhow::anyhow!("Virtual column {i} out of bounds")),
            ColumnRef::Dropped(i) => self
                .instant
                .as_ref()
                .and_then(|instant| instant.dropped.get(i))
                .ok_or_else(|| anyhow::anyhow!("Dropped column {i} out of bounds")),
        }
    }

    /// Re-derive the versioning column ordinals from the column flags.
    pub fn rescan_versioning(&mut self) {
        self.vers_start = self
            .cols
            .iter()
            .position(|col| col.dtype.prtype.contains(PreciseType::VERS_START))
            .map(|i| i as u16);
        self.vers_end = self
            .cols
            .iter()
            .position(|col| col.dtype.prtype.contains(PreciseType::VERS_END))
            .map(|i| i as u16);
    }

    /// Count of nullable columns among the first `n_fields` fields of the
    /// clustered index.
    pub fn clustered_nullable_in(&self, n_fields: usize) -> anyhow::Result<usize> {
        let index = self.clustered_index()?;
        let mut nullable = 0;
        for field in &index.fields[..n_fields.min(index.n_fields())] {
            if self.resolve_col(field.col)?.is_nullable() {
                nullable += 1;
            }
        }
        Ok(nullable)
    }

    /// Cached fixed length of an index field over the given column.
    fn field_fixed_len(&self, col: &Column, prefix_len: u16) -> u16 {
        match col.dtype.fixed_size(self.not_redundant()) {
            Some(fixed) if prefix_len == 0 => fixed as u16,
            Some(fixed) if u32::from(prefix_len) < fixed => prefix_len,
            _ => 0,
        }
    }

    /// An index *definition*: only the user-declared fields, exactly what
    /// the catalog stores in SYS_INDEXES.N_FIELDS and SYS_FIELDS. The
    /// full in-cache form is derived by [`Table::build_internal_index`].
    /// An empty key list defines a generated-rowid clustered index.
    pub fn define_clustered_index(&self, name: &str, key_cols: &[&str]) -> anyhow::Result<Index> {
        use common::flags::IndexType;

        let mut index = Index::new(
            common::types::IndexId(0),
            self.id,
            name,
            IndexType::default().with(IndexType::CLUSTERED | IndexType::UNIQUE),
        );
        for key_col in key_cols {
            let (i, _) = self
                .col_by_name(key_col)
                .ok_or_else(|| anyhow::anyhow!("No column {key_col} in {}", self.name))?;
            index.fields.push(self.make_field(i, 0, false)?);
        }
        index.n_user_defined_cols = key_cols.len();
        index.n_uniq = key_cols.len();
        Ok(index)
    }

    pub fn define_secondary_index(
        &self,
        name: &str,
        unique: bool,
        cols: &[(&str, u16, bool)],
    ) -> anyhow::Result<Index> {
        use common::flags::IndexType;

        let mut index_type = IndexType::default();
        if unique {
            index_type = index_type.with(IndexType::UNIQUE);
        }
        let mut index = Index::new(common::types::IndexId(0), self.id, name, index_type);
        for (col_name, prefix_len, descending) in cols {
            let (i, _) = self
                .col_by_name(col_name)
                .ok_or_else(|| anyhow::anyhow!("No column {col_name} in {}", self.name))?;
            index
                .fields
                .push(self.make_field(i, *prefix_len, *descending)?);
        }
        index.n_user_defined_cols = cols.len();
        index.n_uniq = cols.len();
        Ok(index)
    }

    /// Expand an index definition into the form rows are actually stored
    /// in. A clustered index becomes key columns (or the hidden
    /// DB_ROW_ID), DB_TRX_ID, DB_ROLL_PTR, then every remaining stored
    /// column; a secondary index gets the clustered key appended.
    pub fn build_internal_index(&self, def: &Index) -> anyhow::Result<Index> {
        let mut index = def.clone();
        index.fields.clear();
        let mut present = Vec::new();

        if def.is_clustered() {
            if def.fields.is_empty() {
                // No user-defined primary key: unique on the hidden row id.
                let row_id = self.n_cols() - DATA_N_SYS_COLS;
                index.fields.push(self.make_field(row_id, 0, false)?);
                present.push(row_id);
            } else {
                for field in &def.fields {
                    let ColumnRef::Live(i) = field.col else {
                        anyhow::bail!("virtual column in a clustered key");
                    };
                    index.fields.push(field.clone());
                    present.push(i);
                }
            }
            index.n_uniq = index.fields.len();

            let trx_id_pos = self.n_cols() - DATA_N_SYS_COLS + 1;
            index.fields.push(self.make_field(trx_id_pos, 0, false)?);
            index.fields.push(self.make_field(trx_id_pos + 1, 0, false)?);

            for i in 0..self.n_cols() - DATA_N_SYS_COLS {
                if !present.contains(&i) {
                    index.fields.push(self.make_field(i, 0, false)?);
                }
            }
        } else {
            for field in &def.fields {
                index.fields.push(field.clone());
                if let ColumnRef::Live(i) = field.col {
                    present.push(i);
                }
            }
            let clustered = self.clustered_index()?;
            for field in &clustered.fields[..clustered.n_uniq] {
                if let ColumnRef::Live(i) = field.col {
                    if !present.contains(&i) {
                        index.fields.push(self.make_field(i, 0, false)?);
                        present.push(i);
                    }
                }
            }
            index.n_uniq = if def.is_unique() {
                def.n_user_defined_cols
            } else {
                index.fields.len()
            };
        }

        index.n_nullable = index
            .fields
            .iter()
            .map(|field| self.resolve_col(field.col))
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .filter(|col| col.is_nullable())
            .count();
        index.n_core_fields = index.n_fields();
        index.n_core_null_bytes = index.n_nullable.div_ceil(8);
        Ok(index)
    }

    fn make_field(
        &self,
        col_idx: usize,
        prefix_len: u16,
        descending: bool,
    ) -> anyhow::Result<crate::field::Field> {
        let col = self
            .cols
            .get(col_idx)
            .ok_or_else(|| anyhow::anyhow!("Column {col_idx} out of bounds"))?;
        let mut field = crate::field::Field::new(ColumnRef::Live(col_idx), col.name.clone());
        field.prefix_len = prefix_len;
        field.descending = descending;
        field.fixed_len = self.field_fixed_len(col, prefix_len);
        Ok(field)
    }

    /// Publish virtual columns created by an in-progress ALTER alongside
    /// a new index on them.
    pub fn add_alter_virtual_columns(&mut self, v_cols: Vec<VirtualColumn>) {
        self.v_cols.extend(v_cols);
        self.n_v_cols = self.v_cols.len();
    }

    /// Post-DDL consistency check over the whole dictionary object.
    /// Violations here are programming errors, so this is loud and
    /// exhaustive rather than fast.
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.n_def() == self.n_cols(),
            "{}: n_def {} != n_cols {}",
            self.name,
            self.n_def(),
            self.n_cols()
        );
        anyhow::ensure!(
            self.n_v_def() == self.n_v_cols(),
            "{}: n_v_def {} != n_v_cols {}",
            self.name,
            self.n_v_def(),
            self.n_v_cols()
        );
        anyhow::ensure!(
            self.indexes.iter().filter(|i| i.is_clustered()).count() == 1,
            "{}: expected exactly one clustered index",
            self.name
        );
        let clustered = self.clustered_index()?;

        for col in &self.cols {
            anyhow::ensure!(
                col.dtype.mbminlen <= col.dtype.mbmaxlen,
                "{}: column {} has inverted charset bounds",
                self.name,
                col.name
            );
        }
        let n = self.n_cols();
        for (offset, name) in [ROW_ID_NAME, TRX_ID_NAME, ROLL_PTR_NAME].iter().enumerate() {
            anyhow::ensure!(
                self.cols[n - DATA_N_SYS_COLS + offset].name == *name,
                "{}: system column {name} out of place",
                self.name
            );
        }

        // Virtual columns: every base must resolve and must not be
        // dropped; none may sit in the clustered index.
        for v_col in &self.v_cols {
            for base in &v_col.base {
                let col = match *base {
                    BaseColRef::Stored(i) => self
                        .cols
                        .get(i)
                        .ok_or_else(|| anyhow::anyhow!("base column {i} out of bounds"))?,
                    BaseColRef::Virtual(i) => {
                        let other = self
                            .v_cols
                            .get(i)
                            .ok_or_else(|| anyhow::anyhow!("base v-column {i} out of bounds"))?;
                        &other.col
                    },
                };
                anyhow::ensure!(
                    !col.dropped,
                    "{}: virtual column {} depends on a dropped column",
                    self.name,
                    v_col.col.name
                );
            }
        }
        for field in &clustered.fields {
            anyhow::ensure!(
                !matches!(field.col, ColumnRef::Virtual(_)),
                "{}: virtual column in the clustered index",
                self.name
            );
        }

        // The field map must describe every clustered field beyond the
        // system prefix.
        if let Some(instant) = &self.instant {
            let first_user = clustered.first_user_field();
            anyhow::ensure!(
                instant.field_map.len() == clustered.n_fields() - first_user,
                "{}: field map covers {} fields, index has {}",
                self.name,
                instant.field_map.len(),
                clustered.n_fields() - first_user
            );
            for (i, entry) in instant.field_map.iter().enumerate() {
                let field = &clustered.fields[first_user + i];
                if entry.is_dropped() {
                    anyhow::ensure!(
                        matches!(field.col, ColumnRef::Dropped(_)),
                        "{}: field {} marked dropped but references a live column",
                        self.name,
                        first_user + i
                    );
                    anyhow::ensure!(field.name.is_none());
                } else {
                    let col = self.resolve_col(field.col)?;
                    anyhow::ensure!(
                        col.ind == entry.ind(),
                        "{}: field map ordinal {} != column ordinal {}",
                        self.name,
                        entry.ind(),
                        col.ind
                    );
                }
            }
            anyhow::ensure!(
                instant.n_dropped()
                    == clustered
                        .fields
                        .iter()
                        .filter(|f| f.col.is_dropped())
                        .count(),
                "{}: dropped-column images out of sync with the clustered index",
                self.name
            );
        }

        // The stamped null-bitmap width must match the core prefix.
        let core_nullable = self.clustered_nullable_in(clustered.n_core_fields)?;
        anyhow::ensure!(
            clustered.n_core_null_bytes == core_nullable.div_ceil(8),
            "{}: n_core_null_bytes {} != ceil({core_nullable}/8)",
            self.name,
            clustered.n_core_null_bytes
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::flags::IndexType;
    use common::types::IndexId;

    use super::*;
    use crate::field::Field;

    fn minimal_table() -> Table {
        let mut table = Table::new(
            "db/t".parse().unwrap(),
            TableFlags::default().with(TableFlags::COMPACT),
            TableFlags2::default().with(TableFlags2::USE_FILE_PER_TABLE),
        );
        table.add_column("id", DataType::int(4).not_null());
        table.add_column("a", DataType::varchar(32));
        table.complete_definition();

        let mut clustered = Index::new(
            IndexId(10),
            TableId(0),
            "PRIMARY",
            IndexType::default().with(IndexType::CLUSTERED | IndexType::UNIQUE),
        );
        clustered.n_uniq = 1;
        clustered.fields = vec![
            Field::new(ColumnRef::Live(0), "id"),
            Field::new(ColumnRef::Live(3), TRX_ID_NAME),
            Field::new(ColumnRef::Live(4), ROLL_PTR_NAME),
            Field::new(ColumnRef::Live(1), "a"),
        ];
        clustered.n_nullable = 1;
        clustered.n_core_fields = 4;
        clustered.n_core_null_bytes = 1;
        table.indexes.push(clustered);
        table
    }

    #[test]
    fn test_complete_definition_appends_system_columns() {
        let table = minimal_table();
        assert_eq!(table.n_cols(), 5);
        assert_eq!(table.n_user_cols(), 2);
        assert_eq!(table.cols[2].name, ROW_ID_NAME);
        assert_eq!(table.cols[4].dtype.len, DATA_ROLL_PTR_LEN);
        assert_eq!(table.n_def(), table.n_cols());
    }

    #[test]
    fn test_invariants_hold_for_minimal_table() {
        minimal_table().check_invariants().unwrap();
    }

    #[test]
    fn test_invariants_catch_missing_clustered() {
        let mut table = minimal_table();
        table.indexes[0].index_type = IndexType::default();
        assert!(table.check_invariants().is_err());
    }

    #[test]
    fn test_versioning_rescan() {
        let mut table = Table::new(
            "db/v".parse().unwrap(),
            TableFlags::default().with(TableFlags::COMPACT),
            TableFlags2::default(),
        );
        table.add_column("id", DataType::int(4).not_null());
        let mut start = DataType::int(8).not_null();
        start.prtype = start.prtype.with(PreciseType::VERS_START);
        table.add_column("row_start", start);
        let mut end = DataType::int(8).not_null();
        end.prtype = end.prtype.with(PreciseType::VERS_END);
        table.add_column("row_end", end);
        table.complete_definition();
        assert_eq!(table.vers_start, Some(1));
        assert_eq!(table.vers_end, Some(2));
    }
}
