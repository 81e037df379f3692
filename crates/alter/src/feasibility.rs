//! The instant-feasibility predicate.
//!
//! A change set passes when every requested change can be expressed by
//! rewriting metadata alone: adding, dropping and reordering stored
//! columns, and relaxing NOT NULL. Anything that alters the physical
//! encoding of existing rows forces the caller back to a full rebuild.

use common::{
    knobs::Settings,
    limits::{
        max_record_size,
        FIELD_REF_SIZE,
    },
};
use dict::{
    ColumnRef,
    Table,
};

use crate::{
    col_map::ColMap,
    metrics,
};

/// Why a change set cannot be applied instantly. The caller falls back
/// to a copying ALTER.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstantRejection {
    /// The primary key is added, dropped, or its columns changed.
    PrimaryKeyChanged,
    /// Row format flags (compact, atomic blobs, compression) differ.
    RowFormatChanged,
    /// System versioning is being added.
    VersioningAdded,
    /// An added NOT NULL column has no constant default.
    AddNotNullWithoutDefault { column: String },
    /// An existing column is being made NOT NULL.
    MakeNotNull { column: String },
    /// An existing column changes its physical value format.
    TypeChanged { column: String },
    /// Fulltext or spatial indexes do not re-project against an instant
    /// field map yet.
    FulltextOrSpatial,
    /// The hidden fulltext document id cannot be removed instantly.
    DropsFtsDocId,
    /// The minimum (or, in strict mode, maximum) record size would cross
    /// the page overflow threshold.
    RecordTooBig { size: u32, threshold: u32 },
}

impl InstantRejection {
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::AddNotNullWithoutDefault { .. })
    }
}

/// Physical record-size estimate for the clustered index of `table`:
/// header, null bitmap, length bytes and field payloads. `worst_case`
/// sums maximum field sizes (with overflow references for big columns);
/// otherwise minimum sizes.
fn clustered_record_size(table: &Table, worst_case: bool) -> anyhow::Result<u32> {
    let compact = table.not_redundant();
    let clustered = table.clustered_index()?;

    // Record header: 5 bytes in the compact format, 6 in redundant, plus
    // the null bitmap.
    let mut size: u32 = if compact { 5 } else { 6 };
    size += clustered.n_nullable.div_ceil(8) as u32;

    for field in &clustered.fields {
        let col = table.resolve_col(field.col)?;
        if matches!(field.col, ColumnRef::Dropped(_)) && !worst_case {
            // Old rows carry the dropped bytes, new rows store them
            // empty; the minimum contribution is just the length byte.
            size += 1;
            continue;
        }
        match col.dtype.fixed_size(compact) {
            Some(fixed) => size += fixed,
            None => {
                let payload = if worst_case {
                    if col.is_big() && table.flags.atomic_blobs() {
                        // Only the overflow reference stays in the record.
                        FIELD_REF_SIZE
                    } else {
                        col.dtype.max_size()
                    }
                } else {
                    col.dtype.min_size(compact)
                };
                // One length byte, two once the payload can exceed 255.
                size += payload + if payload > 255 { 2 } else { 1 };
            },
        }
    }
    Ok(size)
}

/// Decide whether the change described by `col_map` from `old` to the
/// prepared image `new` can be installed without rewriting rows.
pub fn instant_alter_possible(
    old: &Table,
    new: &Table,
    col_map: &ColMap,
    settings: &Settings,
) -> anyhow::Result<Result<(), InstantRejection>> {
    let rejection = check(old, new, col_map, settings)?;
    if let Err(rejection) = &rejection {
        metrics::log_instant_alter_rejected();
        tracing::info!(table = %old.name, ?rejection, "falling back to a rebuild");
    }
    Ok(rejection)
}

fn check(
    old: &Table,
    new: &Table,
    col_map: &ColMap,
    settings: &Settings,
) -> anyhow::Result<Result<(), InstantRejection>> {
    // Row format is frozen by the first row ever written.
    if old.flags != new.flags {
        return Ok(Err(InstantRejection::RowFormatChanged));
    }
    if old.vers_start.is_none() && new.vers_start.is_some() {
        return Ok(Err(InstantRejection::VersioningAdded));
    }

    // The clustered key must carry over column for column.
    let old_clustered = old.clustered_index()?;
    let new_clustered = new.clustered_index()?;
    if old_clustered.n_uniq != new_clustered.n_uniq
        || old_clustered.n_user_defined_cols != new_clustered.n_user_defined_cols
    {
        return Ok(Err(InstantRejection::PrimaryKeyChanged));
    }
    for (old_field, new_field) in old_clustered.fields[..old_clustered.n_uniq]
        .iter()
        .zip(&new_clustered.fields[..new_clustered.n_uniq])
    {
        let (ColumnRef::Live(old_idx), ColumnRef::Live(new_idx)) = (old_field.col, new_field.col)
        else {
            return Ok(Err(InstantRejection::PrimaryKeyChanged));
        };
        let key_maps = col_map.stored(old_idx) == Some(new_idx)
            || (old.cols[old_idx].name == new.cols[new_idx].name
                && old.cols[old_idx].name == dict::ROW_ID_NAME);
        if !key_maps {
            return Ok(Err(InstantRejection::PrimaryKeyChanged));
        }
    }

    // Fulltext and spatial readers cannot re-project records against a
    // field map yet, so their presence blocks instant column changes.
    let has_column_changes = col_map.first_alter_pos() != 0
        || new.n_user_cols() != old.n_user_cols()
        || col_map.n_dropped_stored() != 0;
    if has_column_changes
        && old
            .indexes
            .iter()
            .chain(&new.indexes)
            .any(|index| index.index_type.is_fts() || index.index_type.is_spatial())
    {
        return Ok(Err(InstantRejection::FulltextOrSpatial));
    }

    for (old_pos, old_col) in old.cols[..old.n_user_cols()].iter().enumerate() {
        match col_map.stored(old_pos) {
            Some(new_pos) => {
                let new_col = &new.cols[new_pos];
                if old_col.is_nullable() && !new_col.is_nullable() {
                    return Ok(Err(InstantRejection::MakeNotNull {
                        column: old_col.name.clone(),
                    }));
                }
                if !old_col.dtype.same_format_as(&new_col.dtype) {
                    return Ok(Err(InstantRejection::TypeChanged {
                        column: old_col.name.clone(),
                    }));
                }
            },
            None => {
                if old_col.name == "FTS_DOC_ID" {
                    return Ok(Err(InstantRejection::DropsFtsDocId));
                }
            },
        }
    }

    // Added columns: NOT NULL requires a constant default.
    for (new_pos, new_col) in new.cols[..new.n_user_cols()].iter().enumerate() {
        if col_map.find_old_stored(new_pos).is_some() {
            continue;
        }
        let has_constant_default = new_col
            .def_val
            .as_ref()
            .is_some_and(|def_val| !def_val.is_null());
        if !new_col.is_nullable() && !has_constant_default {
            return Ok(Err(InstantRejection::AddNotNullWithoutDefault {
                column: new_col.name.clone(),
            }));
        }
    }

    // Size: the smallest possible record of the new schema must still
    // fit; under strict checks the largest must too.
    let threshold = max_record_size(settings.page_size);
    let min_size = clustered_record_size(new, false)?;
    if min_size > threshold {
        return Ok(Err(InstantRejection::RecordTooBig {
            size: min_size,
            threshold,
        }));
    }
    if settings.strict_size_checks {
        let max_size = clustered_record_size(new, true)?;
        if max_size > threshold {
            return Ok(Err(InstantRejection::RecordTooBig {
                size: max_size,
                threshold,
            }));
        }
    }
    Ok(Ok(()))
}
