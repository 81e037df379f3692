//! `instant_column`: commit-time rewrite of the live in-memory table.

use dict::{
    ColumnRef,
    DefaultValue,
    Table,
};

use crate::{
    col_map::ColMap,
    metrics,
    prepare::rebuild_field_map,
};

/// Install the prepared image into the live table. Arrays are swapped
/// wholesale and every index field re-threaded onto the new arrays; the
/// table's identity (id, name, tablespace, index trees) is untouched.
///
/// Returns true iff the persistent metadata record must be written: a
/// column was dropped, the field map changed, or the clustered field
/// count changed.
pub fn instant_column(
    table: &mut Table,
    mut image: Table,
    col_map: &ColMap,
    dropping: &[&str],
) -> anyhow::Result<bool> {
    let old_n_fields = table.clustered_index()?.n_fields();
    let old_n_dropped = table.n_dropped();
    let old_field_map = table
        .instant
        .as_ref()
        .map(|instant| instant.field_map.clone());
    let n_old_user = table.n_user_cols();

    // Column array: carry instant defaults over from the old columns,
    // verify that surviving columns only changed in ignorable ways, and
    // normalize the defaults of newly added ones.
    let n_new_user = image.n_cols() - common::limits::DATA_N_SYS_COLS;
    for new_pos in 0..n_new_user {
        match col_map.find_old_stored(new_pos) {
            Some(old_pos) => {
                let old_col = &table.cols[old_pos];
                let new_col = &mut image.cols[new_pos];
                anyhow::ensure!(
                    old_col.dtype.same_format_as(&new_col.dtype),
                    "instant change would rewrite the format of column {} in {}",
                    old_col.name,
                    table.name
                );
                new_col.def_val = old_col.def_val.clone();
            },
            None => {
                let new_col = &mut image.cols[new_pos];
                let def_val = new_col.def_val.take().ok_or_else(|| {
                    anyhow::anyhow!(
                        "instantly added column {} of {} has no default",
                        new_col.name,
                        table.name
                    )
                })?;
                // All-zero byte defaults share the engine-wide zero
                // buffer instead of a private copy.
                new_col.def_val = Some(match def_val {
                    DefaultValue::Bytes(bytes) => DefaultValue::from_bytes(&bytes),
                    other => other,
                });
            },
        }
    }
    table.cols = std::mem::take(&mut image.cols);
    for v_col in &mut image.v_cols {
        // Repopulated by the index walk below.
        v_col.v_indexes.clear();
    }
    table.v_cols = std::mem::take(&mut image.v_cols);
    table.set_committed_counts(image.n_cols(), image.n_v_cols());
    table.rescan_versioning();

    // Clustered index: adopt the prepared field array and counters while
    // keeping the physical identity (id, root page) of the live tree.
    {
        anyhow::ensure!(!image.indexes.is_empty(), "image lost its clustered index");
        let image_clustered = image.indexes.swap_remove(0);
        let clustered = table.clustered_index_mut()?;
        clustered.fields = image_clustered.fields;
        clustered.n_uniq = image_clustered.n_uniq;
        clustered.n_nullable = image_clustered.n_nullable;
        clustered.n_core_fields = image_clustered.n_core_fields;
        clustered.n_core_null_bytes = image_clustered.n_core_null_bytes;
    }

    // Instant descriptor: adopt the prepared one (or none after a pure
    // append) and re-derive the field map from the final index.
    table.instant = image.instant.take();
    if table.instant.is_some() {
        rebuild_field_map(table)?;
    }

    // Non-clustered indexes: re-thread every field onto the new arrays.
    let col_names: Vec<String> = table.cols.iter().map(|col| col.name.clone()).collect();
    let v_col_names: Vec<String> = table
        .v_cols
        .iter()
        .map(|v_col| v_col.col.name.clone())
        .collect();
    let mut v_index_updates = Vec::new();
    for index in table.indexes.iter_mut().skip(1) {
        if dropping.contains(&index.name.as_str()) {
            continue;
        }
        for (field_pos, field) in index.fields.iter_mut().enumerate() {
            match field.col {
                ColumnRef::Live(old_idx) => {
                    let new_idx = if old_idx >= n_old_user {
                        // Hidden system column: same offset from the new
                        // tail.
                        n_new_user + (old_idx - n_old_user)
                    } else {
                        col_map.stored(old_idx).ok_or_else(|| {
                            anyhow::anyhow!(
                                "index {} still references a dropped column",
                                index.name
                            )
                        })?
                    };
                    field.col = ColumnRef::Live(new_idx);
                    field.name = Some(col_names[new_idx].clone());
                },
                ColumnRef::Virtual(old_v) => {
                    let new_v = col_map.virt(old_v).ok_or_else(|| {
                        anyhow::anyhow!(
                            "index {} still references a dropped virtual column",
                            index.name
                        )
                    })?;
                    field.col = ColumnRef::Virtual(new_v);
                    field.name = Some(v_col_names[new_v].clone());
                    v_index_updates.push((new_v, index.id, field_pos));
                },
                ColumnRef::Dropped(_) => {
                    anyhow::bail!("secondary index {} references a dropped column", index.name)
                },
            }
        }
    }
    for (v, index_id, field_pos) in v_index_updates {
        table.v_cols[v].v_indexes.push((index_id, field_pos));
    }

    metrics::log_instant_alter_applied();
    tracing::info!(table = %table.name, "instant column change applied");

    let field_map_changed = table
        .instant
        .as_ref()
        .map(|instant| instant.field_map.clone())
        != old_field_map;
    Ok(table.n_dropped() != old_n_dropped
        || table.clustered_index()?.n_fields() != old_n_fields
        || field_map_changed)
}
