//! The metadata record: one physical record at the leftmost leaf of the
//! clustered index that marks the schema boundary for every stored row.

use common::{
    limits::{
        DATA_ROLL_PTR_LEN,
        DATA_TRX_ID_LEN,
        REC_INFO_METADATA_ADD,
        REC_INFO_METADATA_ALTER,
    },
    mtr::MiniTransaction,
    store::{
        FirstRecord,
        StorageServices,
    },
    trx::Transaction,
};
use dict::{
    ColumnRef,
    Table,
};
use value::{
    mach,
    DataType,
    DataValue,
    Tuple,
};

use crate::metrics;

/// A field value for a column the record does not really describe: NULL
/// when possible, otherwise the emptiest value of the right shape.
fn dummy_value(table: &Table, col_ref: ColumnRef, fixed_len: u16) -> anyhow::Result<DataValue> {
    let col = table.resolve_col(col_ref)?;
    if col.is_nullable() {
        return Ok(DataValue::Null);
    }
    Ok(match col.dtype.fixed_size(table.not_redundant()) {
        Some(fixed) => DataValue::zeroes(fixed as usize),
        None if fixed_len > 0 => DataValue::zeroes(fixed_len as usize),
        None => DataValue::Bytes(Box::new([])),
    })
}

/// Build the metadata-record tuple for the table's current schema.
///
/// The pure-add variant is an ordinary index entry full of dummy values
/// with `REC_INFO_METADATA_ADD` info bits. The general variant carries
/// one extra field at `first_user_field`: the serialized field map.
pub fn metadata_entry(table: &Table, trx: &Transaction) -> anyhow::Result<Tuple> {
    let clustered = table.clustered_index()?;
    let first_user = clustered.first_user_field();
    let general = table.instant.is_some();

    let mut entry = Tuple::with_capacity(clustered.n_fields() + usize::from(general));
    for (pos, field) in clustered.fields.iter().enumerate() {
        if pos == clustered.n_uniq {
            // DB_TRX_ID and DB_ROLL_PTR follow the key; the insert path
            // assigns the roll pointer.
            entry.push(
                DataType::sys(DATA_TRX_ID_LEN),
                DataValue::Bytes(Box::new(mach::u48_bytes(trx.id.0))),
            );
            entry.push(
                DataType::sys(DATA_ROLL_PTR_LEN),
                DataValue::zeroes(DATA_ROLL_PTR_LEN as usize),
            );
            continue;
        }
        if pos == clustered.n_uniq + 1 {
            // Handled together with DB_TRX_ID above.
            continue;
        }
        if general && pos == first_user {
            let blob = table
                .instant
                .as_ref()
                .expect("general implies a descriptor")
                .serialize_field_map();
            entry.push(DataType::blob(), DataValue::Bytes(blob.into()));
        }
        let col = table.resolve_col(field.col)?;
        let value = match field.col {
            ColumnRef::Dropped(_) => dummy_value(table, field.col, field.fixed_len)?,
            ColumnRef::Live(_) if col.is_added() => {
                let def_val = col.def_val.as_ref().expect("added columns carry defaults");
                match def_val.materialize() {
                    Some(bytes) => {
                        let trimmed = trim_to_prefix(&bytes, field.prefix_len, &col.dtype);
                        DataValue::Bytes(trimmed.into())
                    },
                    None => DataValue::Null,
                }
            },
            _ => dummy_value(table, field.col, field.fixed_len)?,
        };
        entry.push(col.dtype, value);
    }

    entry.info_bits = if general {
        REC_INFO_METADATA_ALTER
    } else {
        REC_INFO_METADATA_ADD
    };
    Ok(entry)
}

/// Honor an index prefix on a default value. Multi-byte character sets
/// count characters, not bytes; with the fixed-width sets the engine
/// stores this reduces to a byte cut at `prefix * mbmaxlen`.
fn trim_to_prefix(bytes: &[u8], prefix_len: u16, dtype: &DataType) -> Vec<u8> {
    if prefix_len == 0 {
        return bytes.to_vec();
    }
    let max_bytes = usize::from(prefix_len) * usize::from(dtype.mbmaxlen);
    bytes[..bytes.len().min(max_bytes)].to_vec()
}

/// Plant (or retire) the metadata record, stamping the root page in the
/// same mini-transaction. Called when the dictionary change commits.
pub fn plant_metadata_record(
    store: &mut dyn StorageServices,
    table: &Table,
    trx: &Transaction,
) -> anyhow::Result<()> {
    let clustered = table.clustered_index()?;
    anyhow::ensure!(
        !clustered.page.is_null(),
        "clustered index of {} has no tree",
        table.name
    );
    let space = table.space_id;
    let root = clustered.page;
    let is_instant = table.instant.is_some() || clustered.is_instant();

    let mut mtr = MiniTransaction::start();
    match store.first_record(space, root).map_err(anyhow::Error::new)? {
        FirstRecord::Metadata { .. } => {
            if is_instant {
                let entry = metadata_entry(table, trx)?;
                store
                    .update_metadata(space, root, &entry, &mut mtr)
                    .map_err(anyhow::Error::new)?;
                metrics::log_metadata_record_written();
            } else {
                // The table became non-instant again; retire the record
                // and restore a plain root.
                store
                    .empty_leftmost_page(space, root, &mut mtr)
                    .map_err(anyhow::Error::new)?;
                store
                    .clear_instant_root(space, root, &mut mtr)
                    .map_err(anyhow::Error::new)?;
            }
        },
        FirstRecord::Empty => {
            // Nothing stored, nothing to reinterpret.
            store
                .clear_instant_root(space, root, &mut mtr)
                .map_err(anyhow::Error::new)?;
        },
        FirstRecord::User => {
            anyhow::ensure!(is_instant, "metadata record requested for a plain table");
            let entry = metadata_entry(table, trx)?;
            store
                .stamp_instant_root(
                    space,
                    root,
                    clustered.n_core_fields as u16,
                    clustered.n_core_null_bytes as u16,
                    &mut mtr,
                )
                .map_err(anyhow::Error::new)?;
            store
                .insert_metadata(space, root, &entry, &mut mtr)
                .map_err(anyhow::Error::new)?;
            metrics::log_metadata_record_written();
        },
    }
    mtr.commit();
    Ok(())
}
