//! Catalog tuple builders.
//!
//! Pure functions mapping in-memory dictionary objects into typed tuples
//! in the fixed column order of each system table. Every layout here is
//! an on-disk contract: field widths, byte orders and the POS encodings
//! can never change.

use common::{
    limits::{
        DATA_N_SYS_COLS,
        DATA_ROLL_PTR_LEN,
        DATA_TRX_ID_LEN,
        TEMP_INDEX_PREFIX,
    },
    types::TableName,
};
use dict::{
    ForeignKey,
    Index,
    Table,
};
use value::{
    DataType,
    DataValue,
    Tuple,
};

/// Field positions within a SYS_TABLES row.
pub mod sys_tables {
    pub const NAME: usize = 0;
    pub const DB_TRX_ID: usize = 1;
    pub const DB_ROLL_PTR: usize = 2;
    pub const ID: usize = 3;
    pub const N_COLS: usize = 4;
    pub const TYPE: usize = 5;
    pub const MIX_ID: usize = 6;
    pub const MIX_LEN: usize = 7;
    pub const CLUSTER_NAME: usize = 8;
    pub const SPACE: usize = 9;
}

/// Field positions within a SYS_COLUMNS row.
pub mod sys_columns {
    pub const TABLE_ID: usize = 0;
    pub const POS: usize = 1;
    pub const DB_TRX_ID: usize = 2;
    pub const DB_ROLL_PTR: usize = 3;
    pub const NAME: usize = 4;
    pub const MTYPE: usize = 5;
    pub const PRTYPE: usize = 6;
    pub const LEN: usize = 7;
    pub const PREC: usize = 8;
}

/// Field positions within a SYS_INDEXES row.
pub mod sys_indexes {
    pub const TABLE_ID: usize = 0;
    pub const ID: usize = 1;
    pub const DB_TRX_ID: usize = 2;
    pub const DB_ROLL_PTR: usize = 3;
    pub const NAME: usize = 4;
    pub const N_FIELDS: usize = 5;
    pub const TYPE: usize = 6;
    pub const SPACE: usize = 7;
    pub const PAGE_NO: usize = 8;
    pub const MERGE_THRESHOLD: usize = 9;
}

/// Field positions within a SYS_FIELDS row.
pub mod sys_fields {
    pub const INDEX_ID: usize = 0;
    pub const POS: usize = 1;
    pub const DB_TRX_ID: usize = 2;
    pub const DB_ROLL_PTR: usize = 3;
    pub const COL_NAME: usize = 4;
}

/// Field positions within a SYS_VIRTUAL row.
pub mod sys_virtual {
    pub const TABLE_ID: usize = 0;
    pub const POS: usize = 1;
    pub const BASE_POS: usize = 2;
    pub const DB_TRX_ID: usize = 3;
    pub const DB_ROLL_PTR: usize = 4;
}

/// Field positions within a SYS_FOREIGN row.
pub mod sys_foreign {
    pub const ID: usize = 0;
    pub const FOR_NAME: usize = 1;
    pub const REF_NAME: usize = 2;
    pub const N_COLS: usize = 3;
}

/// Field positions within a SYS_FOREIGN_COLS row.
pub mod sys_foreign_cols {
    pub const ID: usize = 0;
    pub const POS: usize = 1;
    pub const FOR_COL_NAME: usize = 2;
    pub const REF_COL_NAME: usize = 3;
}

/// SYS_TABLES.N_COLS packing: user column count in the low 16 bits,
/// virtual column count in the next 15. Bit 31 is the compact-format
/// flag, OR-ed in by the caller.
pub fn encode_n_col(n_cols: u32, n_v_cols: u32) -> u32 {
    debug_assert!(n_cols < 1 << 16);
    debug_assert!(n_v_cols < 1 << 15);
    n_cols | (n_v_cols << 16)
}

pub fn decode_n_col(encoded: u32) -> (u32, u32) {
    let without_format = encoded & !(1 << 31);
    (without_format & 0xFFFF, without_format >> 16)
}

/// High bit distinguishing the combined virtual-column POS encoding from
/// the legacy plain 16-bit form.
pub const V_COL_POS_FLAG: u32 = 1 << 31;

/// SYS_COLUMNS.POS for a virtual column: sequence number among virtual
/// columns in the high half, underlying column ordinal in the low half.
/// These bijections are stable forever.
pub fn encode_v_col_pos(v_pos: u16, ind: u16) -> u32 {
    debug_assert!(v_pos < 1 << 15);
    V_COL_POS_FLAG | (u32::from(v_pos) << 16) | u32::from(ind)
}

pub fn is_v_col_pos(pos: u32) -> bool {
    pos & V_COL_POS_FLAG != 0
}

/// Inverse of [`encode_v_col_pos`]; `None` for a plain stored-column POS.
pub fn decode_v_col_pos(pos: u32) -> Option<(u16, u16)> {
    if !is_v_col_pos(pos) {
        return None;
    }
    let without_flag = pos & !V_COL_POS_FLAG;
    Some(((without_flag >> 16) as u16, (without_flag & 0xFFFF) as u16))
}

/// SYS_FIELDS.POS in the wide form: field ordinal in the 16 most
/// significant bits, the DESC flag in bit 15, the prefix length in the 15
/// least significant bits.
pub fn encode_field_pos(wide: bool, ordinal: u16, descending: bool, prefix_len: u16) -> u32 {
    debug_assert!(prefix_len < 1 << 15);
    if wide {
        (u32::from(ordinal) << 16) | (u32::from(descending) << 15) | u32::from(prefix_len)
    } else {
        // The legacy form stores the bare ordinal, compatible with
        // readers that predate prefixes and descending keys.
        debug_assert!(!descending && prefix_len == 0);
        u32::from(ordinal)
    }
}

/// A single POS value that proves the index used the wide encoding.
pub fn field_pos_is_wide(pos: u32) -> bool {
    pos & 0xFFFF_8000 != 0
}

/// Inverse of [`encode_field_pos`]: `(ordinal, descending, prefix_len)`.
/// The caller decides `wide` per index, after scanning all of its rows
/// with [`field_pos_is_wide`].
pub fn decode_field_pos(pos: u32, wide: bool) -> (u16, bool, u16) {
    if wide {
        (
            (pos >> 16) as u16,
            pos & (1 << 15) != 0,
            (pos & 0x7FFF) as u16,
        )
    } else {
        (pos as u16, false, 0)
    }
}

/// The SYS_TABLES row describing `table`.
pub fn sys_tables_tuple(table: &Table) -> anyhow::Result<Tuple> {
    anyhow::ensure!(
        table.flags2.raw() & common::flags::TableFlags2::UNUSED_BIT_MASK == 0,
        "Reserved flags2 bits set on {}: {:?}",
        table.name,
        table.flags2
    );
    let mut entry = Tuple::with_capacity(10);
    entry.push_varchar(table.name.as_str());
    entry.push_sys(DATA_TRX_ID_LEN);
    entry.push_sys(DATA_ROLL_PTR_LEN);
    entry.push_u64(table.id.0);
    let compact_bit = if table.flags.compact() { 1 << 31 } else { 0 };
    entry.push_u32(
        encode_n_col(
            (table.n_cols() - DATA_N_SYS_COLS) as u32,
            table.n_v_def() as u32,
        ) | compact_bit,
    );
    entry.push_u32(table.flags.to_sys_tables_type());
    entry.push_u64(0); // MIX_ID, unused since the pre-historic server
    entry.push_u32(table.flags2.raw());
    entry.push_null(DataType::varchar(0)); // CLUSTER_NAME, unused
    entry.push_u32(table.space_id.0);
    Ok(entry)
}

/// The SYS_COLUMNS row for the column at walk position `i`: positions
/// beyond `table.n_def()` address virtual columns.
pub fn sys_columns_tuple(table: &Table, i: usize) -> anyhow::Result<Tuple> {
    let (col, pos, num_base, name) = if i >= table.n_def() {
        let v = i - table.n_def();
        let v_col = table
            .v_cols
            .get(v)
            .ok_or_else(|| anyhow::anyhow!("virtual column {v} out of bounds"))?;
        (
            &v_col.col,
            encode_v_col_pos(v as u16, v_col.col.ind),
            v_col.num_base() as u32,
            v_col.col.name.as_str(),
        )
    } else {
        let col = &table.cols[i];
        anyhow::ensure!(!col.dtype.prtype.is_virtual());
        (col, i as u32, 0, col.name.as_str())
    };

    let mut entry = Tuple::with_capacity(9);
    entry.push_u64(table.id.0);
    entry.push_u32(pos);
    entry.push_sys(DATA_TRX_ID_LEN);
    entry.push_sys(DATA_ROLL_PTR_LEN);
    entry.push_varchar(name);
    entry.push_u32(col.dtype.mtype.raw());
    entry.push_u32(col.dtype.prtype.raw());
    entry.push_u32(col.dtype.len);
    entry.push_u32(num_base);
    Ok(entry)
}

/// One SYS_VIRTUAL row: virtual column `v_col_n` mapped to its
/// `b_col_n`th base column.
pub fn sys_virtual_tuple(table: &Table, v_col_n: usize, b_col_n: usize) -> anyhow::Result<Tuple> {
    let v_col = table
        .v_cols
        .get(v_col_n)
        .ok_or_else(|| anyhow::anyhow!("virtual column {v_col_n} out of bounds"))?;
    let base = *v_col
        .base
        .get(b_col_n)
        .ok_or_else(|| anyhow::anyhow!("base column {b_col_n} out of bounds"))?;
    let base_ind = match base {
        dict::BaseColRef::Stored(i) => table.cols[i].ind,
        dict::BaseColRef::Virtual(i) => table.v_cols[i].col.ind,
    };

    let mut entry = Tuple::with_capacity(5);
    entry.push_u64(table.id.0);
    entry.push_u32(encode_v_col_pos(v_col_n as u16, v_col.col.ind));
    entry.push_u32(u32::from(base_ind));
    entry.push_sys(DATA_TRX_ID_LEN);
    entry.push_sys(DATA_ROLL_PTR_LEN);
    Ok(entry)
}

/// The SYS_INDEXES row for `index`, with PAGE_NO = FIL_NULL; the tree is
/// allocated later and the page number patched in place.
pub fn sys_indexes_tuple(table: &Table, index: &Index) -> Tuple {
    let mut entry = Tuple::with_capacity(10);
    entry.push_u64(table.id.0);
    entry.push_u64(index.id.0);
    entry.push_sys(DATA_TRX_ID_LEN);
    entry.push_sys(DATA_ROLL_PTR_LEN);
    if index.committed {
        entry.push_varchar(&index.name);
    } else {
        let mut name = Vec::with_capacity(index.name.len() + 1);
        name.push(TEMP_INDEX_PREFIX);
        name.extend_from_slice(index.name.as_bytes());
        entry.push(
            DataType::varchar(name.len() as u32),
            DataValue::Bytes(name.into()),
        );
    }
    entry.push_u32(index.n_fields() as u32);
    entry.push_u32(index.index_type.raw());
    entry.push_u32(table.space_id.0);
    entry.push_u32(common::types::PageNo::NULL.0);
    entry.push_u32(index.merge_threshold);
    entry
}

/// The SYS_FIELDS row for field `fld_no` of `index`. The POS encoding is
/// decided per index: plain ordinals unless some field carries a prefix
/// or descending order.
pub fn sys_fields_tuple(index: &Index, fld_no: usize) -> anyhow::Result<Tuple> {
    let wide = index.has_wide_field_pos();
    let field = index
        .fields
        .get(fld_no)
        .ok_or_else(|| anyhow::anyhow!("field {fld_no} out of bounds"))?;
    let name = field
        .name
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("field {fld_no} has no column name"))?;

    let mut entry = Tuple::with_capacity(5);
    entry.push_u64(index.id.0);
    entry.push_u32(encode_field_pos(
        wide,
        fld_no as u16,
        field.descending,
        field.prefix_len,
    ));
    entry.push_sys(DATA_TRX_ID_LEN);
    entry.push_sys(DATA_ROLL_PTR_LEN);
    entry.push_varchar(name);
    Ok(entry)
}

/// The 2-field `(TABLE_ID, INDEX_ID)` search tuple locating a retained
/// SYS_INDEXES row for in-place patching.
pub fn sys_indexes_search_tuple(ind_row: &Tuple) -> anyhow::Result<Tuple> {
    let mut search = Tuple::with_capacity(2);
    for n in [sys_indexes::TABLE_ID, sys_indexes::ID] {
        let field = ind_row.field(n)?;
        search.push(field.dtype, field.value.clone());
    }
    Ok(search)
}

/// The SYS_FOREIGN row for one constraint. The action flags ride in the
/// upper byte of N_COLS.
pub fn sys_foreign_tuple(foreign: &ForeignKey, for_name: &TableName) -> Tuple {
    let mut entry = Tuple::with_capacity(4);
    entry.push_varchar(&foreign.id);
    entry.push_varchar(for_name.as_str());
    entry.push_varchar(foreign.referenced_table.as_str());
    entry.push_u32(foreign.packed_n_cols());
    entry
}

/// The `i`th SYS_FOREIGN_COLS row for one constraint.
pub fn sys_foreign_cols_tuple(foreign: &ForeignKey, i: usize) -> anyhow::Result<Tuple> {
    anyhow::ensure!(i < foreign.n_fields(), "foreign column {i} out of bounds");
    let mut entry = Tuple::with_capacity(4);
    entry.push_varchar(&foreign.id);
    entry.push_u32(i as u32);
    entry.push_varchar(&foreign.foreign_cols[i]);
    entry.push_varchar(&foreign.referenced_cols[i]);
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use common::flags::{
        IndexType,
        TableFlags,
        TableFlags2,
    };
    use common::types::{
        IndexId,
        TableId,
    };
    use dict::{
        BaseColRef,
        ColumnRef,
        Field,
        ForeignActions,
    };
    use proptest::prelude::*;
    use value::MainType;

    use super::*;

    fn test_table() -> Table {
        let mut table = Table::new(
            "db/t".parse().unwrap(),
            TableFlags::default().with(TableFlags::COMPACT),
            TableFlags2::default().with(TableFlags2::USE_FILE_PER_TABLE),
        );
        table.id = TableId(77);
        table.space_id = common::types::SpaceId(12);
        table.add_column("id", DataType::int(4).not_null());
        table.add_column("a", DataType::varchar(32));
        table.add_virtual_column(
            "a_upper",
            DataType::varchar(32),
            vec![BaseColRef::Stored(1)],
        );
        table.complete_definition();
        table
    }

    #[test]
    fn test_sys_tables_row_shape() {
        let table = test_table();
        let entry = sys_tables_tuple(&table).unwrap();
        assert_eq!(entry.n_fields(), 10);
        assert_eq!(entry.str_at(sys_tables::NAME).unwrap(), "db/t");
        assert_eq!(entry.u64_at(sys_tables::ID).unwrap(), 77);
        assert_eq!(
            entry.u32_at(sys_tables::N_COLS).unwrap(),
            encode_n_col(2, 1) | (1 << 31)
        );
        assert_eq!(entry.u32_at(sys_tables::TYPE).unwrap(), 1);
        assert_eq!(entry.u64_at(sys_tables::MIX_ID).unwrap(), 0);
        assert_eq!(
            entry.u32_at(sys_tables::MIX_LEN).unwrap(),
            table.flags2.raw()
        );
        assert!(entry.field(sys_tables::CLUSTER_NAME).unwrap().value.is_null());
        assert_eq!(entry.u32_at(sys_tables::SPACE).unwrap(), 12);
    }

    #[test]
    fn test_sys_tables_rejects_reserved_flags2() {
        let mut table = test_table();
        table.flags2 = TableFlags2(1 << 12);
        assert!(sys_tables_tuple(&table).is_err());
    }

    #[test]
    fn test_sys_columns_stored_and_virtual() {
        let table = test_table();
        let stored = sys_columns_tuple(&table, 0).unwrap();
        assert_eq!(stored.u32_at(sys_columns::POS).unwrap(), 0);
        assert_eq!(
            stored.u32_at(sys_columns::MTYPE).unwrap(),
            MainType::Int.raw()
        );
        assert_eq!(stored.u32_at(sys_columns::PREC).unwrap(), 0);

        // Walk position n_def addresses the first virtual column.
        let v = sys_columns_tuple(&table, table.n_def()).unwrap();
        let pos = v.u32_at(sys_columns::POS).unwrap();
        assert_eq!(decode_v_col_pos(pos), Some((0, 0)));
        assert_eq!(v.str_at(sys_columns::NAME).unwrap(), "a_upper");
        assert_eq!(v.u32_at(sys_columns::PREC).unwrap(), 1);
    }

    #[test]
    fn test_sys_virtual_rows() {
        let table = test_table();
        let entry = sys_virtual_tuple(&table, 0, 0).unwrap();
        assert_eq!(entry.u64_at(sys_virtual::TABLE_ID).unwrap(), 77);
        assert_eq!(
            entry.u32_at(sys_virtual::POS).unwrap(),
            encode_v_col_pos(0, 0)
        );
        // Base is the stored column `a`, ordinal 1.
        assert_eq!(entry.u32_at(sys_virtual::BASE_POS).unwrap(), 1);
        assert!(sys_virtual_tuple(&table, 0, 1).is_err());
    }

    #[test]
    fn test_sys_indexes_temp_name_prefix() {
        let table = test_table();
        let mut index = Index::new(
            IndexId(9),
            table.id,
            "idx_a",
            IndexType::default(),
        );
        index.committed = false;
        let entry = sys_indexes_tuple(&table, &index);
        let name = entry
            .field(sys_indexes::NAME)
            .unwrap()
            .value
            .as_bytes()
            .unwrap()
            .to_vec();
        assert_eq!(name[0], TEMP_INDEX_PREFIX);
        assert_eq!(&name[1..], b"idx_a");
        assert_eq!(
            entry.u32_at(sys_indexes::PAGE_NO).unwrap(),
            common::types::PageNo::NULL.0
        );
        assert_eq!(entry.u32_at(sys_indexes::MERGE_THRESHOLD).unwrap(), 50);
    }

    #[test]
    fn test_sys_fields_pos_encodings() {
        let table = test_table();
        // idx(a(10) DESC): wide encoding with ordinal 0.
        let mut wide_index = Index::new(IndexId(5), table.id, "idx", IndexType::default());
        wide_index.fields = vec![Field::new(ColumnRef::Live(1), "a")
            .with_prefix(10)
            .descending()];
        let entry = sys_fields_tuple(&wide_index, 0).unwrap();
        assert_eq!(entry.u32_at(sys_fields::POS).unwrap(), 0x0000_800a);
        assert!(field_pos_is_wide(0x0000_800a));

        // idx2(a): no prefix, ascending; the per-index decision keeps it
        // on the legacy encoding.
        let mut legacy_index = Index::new(IndexId(6), table.id, "idx2", IndexType::default());
        legacy_index.fields = vec![Field::new(ColumnRef::Live(1), "a")];
        let entry = sys_fields_tuple(&legacy_index, 0).unwrap();
        assert_eq!(entry.u32_at(sys_fields::POS).unwrap(), 0);
        assert!(!field_pos_is_wide(0));
    }

    #[test]
    fn test_search_tuple_copies_key_fields() {
        let table = test_table();
        let index = Index::new(IndexId(9), table.id, "PRIMARY", IndexType::default());
        let row = sys_indexes_tuple(&table, &index);
        let search = sys_indexes_search_tuple(&row).unwrap();
        assert_eq!(search.n_fields(), 2);
        assert_eq!(search.u64_at(0).unwrap(), 77);
        assert_eq!(search.u64_at(1).unwrap(), 9);
    }

    #[test]
    fn test_sys_foreign_rows() {
        let foreign = ForeignKey {
            id: "db/fk1".to_owned(),
            foreign_table: "db/t".parse().unwrap(),
            foreign_cols: vec!["a".to_owned()],
            foreign_index: None,
            referenced_table: "db/u".parse().unwrap(),
            referenced_cols: vec!["x".to_owned()],
            referenced_index: None,
            actions: ForeignActions::default().with(ForeignActions::DELETE_CASCADE),
        };
        let entry = sys_foreign_tuple(&foreign, &foreign.foreign_table.clone());
        assert_eq!(entry.str_at(sys_foreign::ID).unwrap(), "db/fk1");
        assert_eq!(
            entry.u32_at(sys_foreign::N_COLS).unwrap(),
            1 | (ForeignActions::DELETE_CASCADE << 24)
        );
        let col = sys_foreign_cols_tuple(&foreign, 0).unwrap();
        assert_eq!(col.u32_at(sys_foreign_cols::POS).unwrap(), 0);
        assert_eq!(col.str_at(sys_foreign_cols::FOR_COL_NAME).unwrap(), "a");
        assert!(sys_foreign_cols_tuple(&foreign, 1).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, failure_persistence: None, ..ProptestConfig::default() })]

        #[test]
        fn proptest_v_col_pos_roundtrip(v_pos in 0u16..(1 << 15), ind in any::<u16>()) {
            let pos = encode_v_col_pos(v_pos, ind);
            prop_assert!(is_v_col_pos(pos));
            prop_assert_eq!(decode_v_col_pos(pos), Some((v_pos, ind)));
        }

        #[test]
        fn proptest_field_pos_roundtrip(
            ordinal in any::<u16>(),
            descending in any::<bool>(),
            prefix_len in 0u16..(1 << 15),
        ) {
            let pos = encode_field_pos(true, ordinal, descending, prefix_len);
            prop_assert_eq!(decode_field_pos(pos, true), (ordinal, descending, prefix_len));
            // The legacy form only ever encodes bare ordinals below the
            // wide-detection threshold.
            let legacy = encode_field_pos(false, ordinal & 0x7FFF, false, 0);
            prop_assert_eq!(decode_field_pos(legacy, false), (ordinal & 0x7FFF, false, 0));
            prop_assert!(!field_pos_is_wide(legacy));
        }

        #[test]
        fn proptest_n_col_roundtrip(n in 0u32..(1 << 16), v in 0u32..(1 << 15), compact in any::<bool>()) {
            let encoded = encode_n_col(n, v) | if compact { 1 << 31 } else { 0 };
            prop_assert_eq!(decode_n_col(encoded), (n, v));
        }
    }
}
