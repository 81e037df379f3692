//! Undo of an in-memory instant change.
//!
//! The DDL transaction may fail after `instant_column` already rewired
//! the dictionary. Rollback re-threads the pointer graph back onto the
//! preserved arrays; nothing is freed, the abandoned arrays simply stay
//! in the table's arena.

use dict::{
    Column,
    ColumnRef,
    Field,
    InstantMetadata,
    Table,
    VirtualColumn,
};

use crate::{
    col_map::ColMap,
    metrics,
};

/// Everything `rollback_instant` needs to restore the pre-ALTER state,
/// captured before `instant_column` runs.
#[derive(Clone, Debug)]
pub struct AlterSnapshot {
    cols: Vec<Column>,
    v_cols: Vec<VirtualColumn>,
    n_cols: usize,
    n_v_cols: usize,
    instant: Option<InstantMetadata>,
    clustered_fields: Vec<Field>,
    n_uniq: usize,
    n_core_fields: usize,
    n_core_null_bytes: usize,
}

impl AlterSnapshot {
    pub fn capture(table: &Table) -> anyhow::Result<Self> {
        let clustered = table.clustered_index()?;
        Ok(Self {
            cols: table.cols.clone(),
            v_cols: table.v_cols.clone(),
            n_cols: table.n_cols(),
            n_v_cols: table.n_v_cols(),
            instant: table.instant.clone(),
            clustered_fields: clustered.fields.clone(),
            n_uniq: clustered.n_uniq,
            n_core_fields: clustered.n_core_fields,
            n_core_null_bytes: clustered.n_core_null_bytes,
        })
    }
}

/// Restore `table` to its pre-ALTER state. Idempotent: when the column
/// array is already the snapshotted one (the ALTER failed before
/// `instant_column`), nothing is touched.
pub fn rollback_instant(
    table: &mut Table,
    snapshot: &AlterSnapshot,
    col_map: &ColMap,
    dropping: &[&str],
) -> anyhow::Result<()> {
    if table.cols == snapshot.cols {
        return Ok(());
    }
    let n_new_user = table.n_user_cols();
    let n_old_user = snapshot.n_cols - common::limits::DATA_N_SYS_COLS;

    // Reinstate the old arrays and counters. The newly allocated
    // virtual columns (and their v_indexes lists) are dropped here.
    table.cols = snapshot.cols.clone();
    table.v_cols = snapshot.v_cols.clone();
    table.set_committed_counts(snapshot.n_cols, snapshot.n_v_cols);
    table.instant = snapshot.instant.clone();
    table.rescan_versioning();

    {
        let clustered = table.clustered_index_mut()?;
        clustered.fields = snapshot.clustered_fields.clone();
        clustered.n_uniq = snapshot.n_uniq;
        clustered.n_core_fields = snapshot.n_core_fields;
        clustered.n_core_null_bytes = snapshot.n_core_null_bytes;
    }
    // Recompute rather than trust any counter the failed ALTER touched.
    let n_fields = table.clustered_index()?.n_fields();
    let n_nullable = table.clustered_nullable_in(n_fields)?;
    table.clustered_index_mut()?.n_nullable = n_nullable;

    // Secondary indexes still point into the new arrays; invert the
    // column map to re-thread them onto the old ones.
    let col_names: Vec<String> = table.cols.iter().map(|col| col.name.clone()).collect();
    let v_col_names: Vec<String> = table
        .v_cols
        .iter()
        .map(|v_col| v_col.col.name.clone())
        .collect();
    for index in table.indexes.iter_mut().skip(1) {
        if dropping.contains(&index.name.as_str()) {
            continue;
        }
        for field in &mut index.fields {
            match field.col {
                ColumnRef::Live(new_idx) => {
                    let old_idx = if new_idx >= n_new_user {
                        n_old_user + (new_idx - n_new_user)
                    } else {
                        col_map.find_old_stored(new_idx).ok_or_else(|| {
                            anyhow::anyhow!(
                                "no preimage for column {new_idx} while rolling back {}",
                                index.name
                            )
                        })?
                    };
                    field.col = ColumnRef::Live(old_idx);
                    field.name = Some(col_names[old_idx].clone());
                },
                ColumnRef::Virtual(new_v) => {
                    let old_v = col_map.find_old_virtual(new_v).ok_or_else(|| {
                        anyhow::anyhow!(
                            "no preimage for virtual column {new_v} while rolling back {}",
                            index.name
                        )
                    })?;
                    field.col = ColumnRef::Virtual(old_v);
                    field.name = Some(v_col_names[old_v].clone());
                },
                ColumnRef::Dropped(_) => {
                    anyhow::bail!(
                        "secondary index {} references a dropped column during rollback",
                        index.name
                    )
                },
            }
        }
    }

    metrics::log_instant_alter_rolled_back();
    tracing::info!(table = %table.name, "instant column change rolled back");
    Ok(())
}
