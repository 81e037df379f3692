//! Foreign-key installation: catalog writes only. The in-memory cache is
//! refreshed by a reload step after the DDL transaction commits.

use anyhow::Context;
use common::{
    store::{
        CatalogStore,
        SysTableId,
    },
    trx::Transaction,
};
use dict::{
    ForeignActions,
    ForeignKey,
    Index,
    Table,
};
use errors::{
    DbError,
    ErrorMetadata,
};
use value::Tuple;

use crate::{
    inserter::SysInserter,
    metrics,
    tuples,
};

/// Bind a constraint id: keep a valid user-supplied one, otherwise derive
/// `<db>/constraint_N` with the smallest `N` unique within the table's
/// constraint set.
fn assign_constraint_id(table: &Table, foreign: &mut ForeignKey) -> anyhow::Result<()> {
    if !foreign.id.is_empty() {
        // Qualify a bare user-supplied name with the database.
        if !foreign.id.contains('/') {
            foreign.id = format!("{}/{}", table.name.database(), foreign.id);
        }
        anyhow::ensure!(
            !table.foreign.contains_key(&foreign.id),
            ErrorMetadata::conflict(
                "DupConstraintName",
                format!(
                    "Duplicate constraint id `{}`: {}",
                    foreign.id,
                    foreign.definition()
                ),
            )
        );
        return Ok(());
    }
    let database = table.name.database();
    let mut n = table.foreign.len() + 1;
    loop {
        let candidate = format!("{database}/constraint_{n}");
        if !table.foreign.contains_key(&candidate) {
            foreign.id = candidate;
            return Ok(());
        }
        n += 1;
    }
}

/// Locate an index on `table` usable to enforce `foreign` from the child
/// side: its leading fields are exactly the constraint columns in order,
/// full-column and ascending, every column nullable if a SET NULL action
/// is present, and the index is not among those being dropped.
fn find_foreign_index<'a>(
    table: &'a Table,
    foreign: &ForeignKey,
    dropping: &[&str],
) -> Option<&'a Index> {
    table.indexes.iter().find(|index| {
        if index.is_corrupted()
            || index.index_type.is_fts()
            || index.index_type.is_spatial()
            || dropping.contains(&index.name.as_str())
            || index.n_fields() < foreign.n_fields()
        {
            return false;
        }
        foreign
            .foreign_cols
            .iter()
            .zip(&index.fields)
            .all(|(col_name, field)| {
                if field.prefix_len != 0 || field.descending {
                    return false;
                }
                let Some(field_name) = &field.name else {
                    return false;
                };
                if field_name != col_name {
                    return false;
                }
                if foreign.actions.has_set_null() {
                    match table.resolve_col(field.col) {
                        Ok(col) if col.is_nullable() => {},
                        _ => return false,
                    }
                }
                true
            })
    })
}

/// Install one foreign key: one SYS_FOREIGN row plus one
/// SYS_FOREIGN_COLS row per column pair.
pub fn install_foreign_key(
    store: &mut dyn CatalogStore,
    trx: &mut Transaction,
    table: &Table,
    foreign: &mut ForeignKey,
    dropping: &[&str],
) -> anyhow::Result<()> {
    assign_constraint_id(table, foreign)?;

    if foreign.foreign_index.is_none() {
        let index = find_foreign_index(table, foreign, dropping).ok_or_else(|| {
            trx.set_error(DbError::CannotAddConstraint);
            anyhow::Error::new(DbError::CannotAddConstraint).context(ErrorMetadata::bad_request(
                "IncorrectOption",
                format!(
                    "No usable index on {} for foreign key: {}",
                    table.name,
                    foreign.definition()
                ),
            ))
        })?;
        foreign.foreign_index = Some(index.name.clone());
    }

    let row = tuples::sys_foreign_tuple(foreign, &table.name);
    if let Err(err) = store.insert_tuple(SysTableId::Foreign, &row, trx) {
        trx.set_error(err);
        let result = Err(anyhow::Error::new(err));
        if err == DbError::DuplicateKey {
            tracing::warn!(
                table = %table.name,
                constraint = %foreign.id,
                "duplicate foreign key constraint name"
            );
            return result.context(ErrorMetadata::conflict(
                "DupConstraintName",
                format!(
                    "Foreign key constraint `{}` already exists. Constraint names must be \
                     unique in a database. Error in foreign key definition: {}",
                    foreign.id,
                    foreign.definition()
                ),
            ));
        }
        return result.with_context(|| format!("inserting SYS_FOREIGN row for {}", foreign.id));
    }

    for i in 0..foreign.n_fields() {
        let row = tuples::sys_foreign_cols_tuple(foreign, i)?;
        SysInserter::new(store, trx)
            .insert(SysTableId::ForeignCols, &row)
            .with_context(|| {
                format!(
                    "adding column {} of foreign key {}: {}",
                    i + 1,
                    foreign.id,
                    foreign.definition()
                )
            })?;
    }
    metrics::log_foreign_key_installed();
    Ok(())
}

/// True when any constraint in the set applies a child-modifying action
/// to a column that is a base of a stored generated column.
fn foreigns_have_stored_base(table: &Table, foreigns: &[ForeignKey]) -> bool {
    foreigns.iter().any(|foreign| {
        let actions = foreign.actions.raw()
            & !(ForeignActions::DELETE_NO_ACTION | ForeignActions::UPDATE_NO_ACTION);
        if actions == 0 {
            return false;
        }
        foreign
            .foreign_cols
            .iter()
            .any(|col| table.is_base_of_stored_generated(col))
    })
}

/// Install every foreign key of a table in one pass, validating the set
/// against stored generated columns first.
pub fn install_foreign_keys(
    store: &mut dyn CatalogStore,
    trx: &mut Transaction,
    table: &Table,
    foreigns: &mut [ForeignKey],
    dropping: &[&str],
) -> anyhow::Result<()> {
    if foreigns_have_stored_base(table, foreigns) {
        trx.set_error(DbError::CannotAddConstraint);
        return Err(anyhow::Error::new(DbError::CannotAddConstraint)).context(
            ErrorMetadata::bad_request(
                "ForeignKeyOnStoredGeneratedBase",
                format!(
                    "Cannot add a SET NULL or CASCADE foreign key on {}: a constrained column \
                     is the base of a stored generated column",
                    table.name
                ),
            ),
        );
    }
    for foreign in foreigns {
        install_foreign_key(store, trx, table, foreign, dropping)?;
    }
    Ok(())
}

/// Remove a constraint from SYS_FOREIGN and SYS_FOREIGN_COLS, both by
/// id, in one statement.
pub fn drop_foreign_key(
    store: &mut dyn CatalogStore,
    trx: &Transaction,
    constraint_id: &str,
) -> anyhow::Result<usize> {
    let mut key = Tuple::with_capacity(1);
    key.push_varchar(constraint_id);
    let from_foreign = store
        .delete_by_key(SysTableId::Foreign, &key, trx)
        .map_err(anyhow::Error::new)?;
    let from_cols = store
        .delete_by_key(SysTableId::ForeignCols, &key, trx)
        .map_err(anyhow::Error::new)?;
    tracing::info!(
        constraint = constraint_id,
        rows = from_foreign + from_cols,
        "foreign key dropped from the catalog"
    );
    Ok(from_foreign)
}
