//! `prepare_instant`: reconcile the target-schema image's clustered
//! index with the source table's physical field layout.
//!
//! The image arrives with a clustered index built from the *new* column
//! set alone. Old rows, though, still carry every column they were
//! written with, so the prepared index must keep one field per stored
//! position: dropped columns become anonymous fields pointing at their
//! preserved images, surviving columns move to their new positions
//! without changing relative order, and instantly added columns go to
//! the tail.

use std::collections::BTreeMap;

use dict::{
    Column,
    ColumnRef,
    Field,
    FieldMapEntry,
    InstantMetadata,
    Table,
};

use crate::col_map::ColMap;

/// Rebuild `table.instant.field_map` from the clustered index. The map
/// is the persistent description of how stored rows project onto the
/// current schema.
pub(crate) fn rebuild_field_map(table: &mut Table) -> anyhow::Result<()> {
    let compact = table.not_redundant();
    let clustered = table.clustered_index()?;
    let first_user = clustered.first_user_field();
    let mut field_map = Vec::with_capacity(clustered.n_fields() - first_user);
    for field in &clustered.fields[first_user..] {
        let entry = match field.col {
            ColumnRef::Live(i) => FieldMapEntry::live(table.cols[i].ind),
            ColumnRef::Dropped(_) => {
                let col = table.resolve_col(field.col)?;
                let not_null = !col.is_nullable();
                match col.dtype.fixed_size(compact) {
                    Some(fixed) => FieldMapEntry::dropped_fixed(fixed as u16, not_null),
                    None => FieldMapEntry::dropped_variable(col.is_big(), not_null),
                }
            },
            ColumnRef::Virtual(_) => {
                anyhow::bail!("virtual column in the clustered index of {}", table.name)
            },
        };
        field_map.push(entry);
    }
    table
        .instant
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("field map rebuild without an instant descriptor"))?
        .field_map = field_map;
    Ok(())
}

/// Prepare `image` (already carrying the new columns and a freshly built
/// clustered index) against the live table `old`.
pub fn prepare_instant(old: &Table, image: &mut Table, col_map: &ColMap) -> anyhow::Result<()> {
    let old_clustered = old.clustered_index()?;

    if col_map.first_alter_pos() == 0 && old.instant.is_none() {
        // Pure append: columns were only ever added at the end, so every
        // stored row is a prefix of the new shape. The core counts carry
        // over untouched and no descriptor is needed.
        let (n_core_fields, n_core_null_bytes) = (
            old_clustered.n_core_fields,
            old_clustered.n_core_null_bytes,
        );
        let image_clustered = image.clustered_index_mut()?;
        image_clustered.n_core_fields = n_core_fields;
        image_clustered.n_core_null_bytes = n_core_null_bytes;
        return Ok(());
    }

    let first_user = old_clustered.first_user_field();
    anyhow::ensure!(
        image.clustered_index()?.first_user_field() == first_user,
        "clustered key changed during an instant ALTER of {}",
        old.name
    );

    // Dropped-column images: everything dropped before, then the
    // columns this ALTER drops, in old position order.
    let mut dropped: Vec<Column> = old
        .instant
        .as_ref()
        .map(|instant| instant.dropped.clone())
        .unwrap_or_default();
    let mut new_drop_offsets = BTreeMap::new();
    for old_pos in 0..old.n_user_cols() {
        if col_map.stored(old_pos).is_none() {
            new_drop_offsets.insert(old_pos, dropped.len());
            dropped.push(old.cols[old_pos].dropped_image());
        }
    }

    let image_clustered = image.clustered_index()?;
    let compact = image.not_redundant();

    // Keep the system prefix the image built (it references the new
    // column array), then walk the *old* stored positions.
    let mut fields: Vec<Field> = image_clustered.fields[..first_user].to_vec();
    let mut covered: Vec<usize> = fields
        .iter()
        .filter_map(|field| match field.col {
            ColumnRef::Live(i) => Some(i),
            _ => None,
        })
        .collect();

    for old_field in &old_clustered.fields[first_user..] {
        match old_field.col {
            ColumnRef::Dropped(offset) => {
                // Dropped in some earlier ALTER; its image was copied
                // first, so the offset is unchanged.
                let mut field = old_field.clone();
                field.col = ColumnRef::Dropped(offset);
                field.name = None;
                fields.push(field);
            },
            ColumnRef::Live(old_idx) => match col_map.stored(old_idx) {
                Some(new_idx) => {
                    let col = &image.cols[new_idx];
                    let mut field = Field::new(ColumnRef::Live(new_idx), col.name.clone());
                    field.fixed_len = col.dtype.fixed_size(compact).unwrap_or(0) as u16;
                    fields.push(field);
                    covered.push(new_idx);
                },
                None => {
                    let offset = new_drop_offsets[&old_idx];
                    let mut field = old_field.clone();
                    field.col = ColumnRef::Dropped(offset);
                    field.name = None;
                    fields.push(field);
                },
            },
            ColumnRef::Virtual(_) => {
                anyhow::bail!("virtual column in the clustered index of {}", old.name)
            },
        }
    }

    // Instantly added columns at the tail, in column order.
    for new_idx in 0..image.n_user_cols() {
        if covered.contains(&new_idx) || col_map.find_old_stored(new_idx).is_some() {
            continue;
        }
        let col = &image.cols[new_idx];
        let mut field = Field::new(ColumnRef::Live(new_idx), col.name.clone());
        field.fixed_len = col.dtype.fixed_size(compact).unwrap_or(0) as u16;
        fields.push(field);
    }

    let (n_core_fields, n_core_null_bytes) = (
        old_clustered.n_core_fields,
        old_clustered.n_core_null_bytes,
    );
    let n_fields = fields.len();
    image.instant = Some(InstantMetadata {
        dropped,
        field_map: Vec::new(),
    });
    {
        let image_clustered = image.clustered_index_mut()?;
        image_clustered.fields = fields;
        // Old records must stay decodable: the core boundary is
        // whatever it was before this ALTER.
        image_clustered.n_core_fields = n_core_fields;
        image_clustered.n_core_null_bytes = n_core_null_bytes;
    }
    let n_nullable = image.clustered_nullable_in(n_fields)?;
    image.clustered_index_mut()?.n_nullable = n_nullable;
    rebuild_field_map(image)?;
    Ok(())
}
