//! Index-tree allocation and the SYS_INDEXES PAGE_NO patch.

use anyhow::Context;
use common::{
    mtr::{
        LogMode,
        MiniTransaction,
    },
    store::{
        CursorId,
        StorageServices,
        SysTableId,
    },
    trx::Transaction,
    types::{
        PageNo,
        SpaceId,
    },
};
use dict::Table;
use errors::DbError;
use value::{
    mach,
    Tuple,
};

use crate::{
    metrics,
    tuples::{
        self,
        sys_indexes,
    },
};

/// Allocate the B-tree for `table.indexes[position]` and stamp the new
/// root page number into the retained SYS_INDEXES row, all in one
/// mini-transaction.
pub fn create_index_tree(
    store: &mut dyn StorageServices,
    table: &mut Table,
    position: usize,
    ind_row: &Tuple,
) -> anyhow::Result<PageNo> {
    let mut mtr = MiniTransaction::start();

    let search = tuples::sys_indexes_search_tuple(ind_row)?;
    let cursor = store
        .open_cursor(SysTableId::Indexes, &search, &mtr)
        .map_err(anyhow::Error::new)?;
    let found = store.move_to_next_user_rec(cursor).map_err(anyhow::Error::new)?;
    anyhow::ensure!(found, "SYS_INDEXES row vanished before tree creation");

    let index = &mut table.indexes[position];
    let mut result = Ok(());
    let page_no = if !store.space_is_readable(table.space_id) {
        // An unreadable tablespace gets no tree; the catalog row keeps
        // FIL_NULL.
        PageNo::NULL
    } else {
        let page_no = store
            .create_tree(index.index_type, table.space_id, index.id, &mut mtr)
            .map_err(anyhow::Error::new)?;
        if page_no.is_null() {
            result = Err(anyhow::Error::new(DbError::OutOfFileSpace)).with_context(|| {
                format!("allocating a root page in tablespace {}", table.space_id)
            });
        }
        page_no
    };

    store
        .write_u32_in_place(cursor, sys_indexes::PAGE_NO, page_no.0, &mut mtr)
        .map_err(anyhow::Error::new)?;
    store.close_cursor(cursor);
    mtr.commit();

    result?;
    table.indexes[position].page = page_no;
    Ok(page_no)
}

/// Tree creation for a temporary-table index: no redo logging and no
/// catalog row, the root lives only in the in-memory index.
pub fn create_index_tree_in_mem(
    store: &mut dyn StorageServices,
    table: &mut Table,
    position: usize,
    trx: &Transaction,
) -> anyhow::Result<PageNo> {
    let index = &table.indexes[position];
    anyhow::ensure!(!index.index_type.is_fts(), "FTS indexes have no tree");
    anyhow::ensure!(
        !table.flags2.is_discarded(),
        "tree creation in a discarded tablespace"
    );

    let mut mtr = MiniTransaction::start();
    mtr.set_log_mode(LogMode::NoRedo);
    let page_no = store
        .create_tree(index.index_type, table.space_id, index.id, &mut mtr)
        .map_err(anyhow::Error::new)?;
    mtr.commit();

    let index = &mut table.indexes[position];
    index.page = page_no;
    index.trx_id = trx.id;
    if page_no.is_null() {
        return Err(anyhow::Error::new(DbError::OutOfFileSpace))
            .with_context(|| format!("allocating a root page in tablespace {}", table.space_id));
    }
    Ok(page_no)
}

/// Free the index tree described by the SYS_INDEXES record under
/// `cursor`, overwriting its PAGE_NO with FIL_NULL first.
///
/// If the record describes the clustered index of a single-table
/// tablespace, the tablespace id is returned instead and nothing is
/// freed: the caller drops the file as a whole. Corrupted records are
/// reported and skipped.
pub fn drop_index_tree(
    store: &mut dyn StorageServices,
    cursor: CursorId,
    mtr: &mut MiniTransaction,
) -> anyhow::Result<Option<SpaceId>> {
    let corrupted = || {
        tracing::error!("Corrupted SYS_INDEXES record");
        Ok(None)
    };

    // The record must still have the historic field widths; anything
    // else means the row (or the whole catalog tree) is damaged, and we
    // leave it alone.
    for key_field in [sys_indexes::TABLE_ID, sys_indexes::ID] {
        match store.read_field(cursor, key_field) {
            Ok(Some(bytes)) if bytes.len() == 8 => {},
            _ => return corrupted(),
        }
    }
    let read_u32_field = |store: &dyn StorageServices, n: usize| -> Option<u32> {
        match store.read_field(cursor, n) {
            Ok(Some(bytes)) if bytes.len() == 4 => Some(mach::read_u32(&bytes)),
            _ => None,
        }
    };
    let Some(index_type) = read_u32_field(store, sys_indexes::TYPE) else {
        return corrupted();
    };
    let Some(root) = read_u32_field(store, sys_indexes::PAGE_NO) else {
        return corrupted();
    };
    let Some(space) = read_u32_field(store, sys_indexes::SPACE) else {
        return corrupted();
    };
    let root = PageNo(root);
    let space = SpaceId(space);

    if space != SpaceId::SYSTEM && index_type & common::flags::IndexType::CLUSTERED != 0 {
        // The clustered index owns the file-per-table tablespace; drop
        // the whole file rather than freeing pages one by one.
        return Ok(Some(space));
    }

    if root.is_null() {
        // Already freed.
        return Ok(None);
    }

    if store.tree_in_bounds(space, root) {
        store
            .write_u32_in_place(cursor, sys_indexes::PAGE_NO, PageNo::NULL.0, mtr)
            .map_err(anyhow::Error::new)?;
        store.free_tree(space, root, mtr).map_err(anyhow::Error::new)?;
        metrics::log_index_tree_dropped();
    }
    Ok(None)
}
