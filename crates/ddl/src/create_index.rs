use anyhow::Context;
use common::{
    store::SysTableId,
    tablespace::EncryptionMode,
    trx::Transaction,
    types::{
        IndexId,
        PageNo,
        TableId,
        TableName,
    },
};
use dict::{
    Index,
    VirtualColumn,
};
use errors::{
    DbError,
    ErrorMetadata,
};
use value::Tuple;

use crate::{
    inserter::SysInserter,
    metrics,
    tree,
    tuples,
    DdlContext,
    StepResult,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexCreateState {
    BuildIndexDef,
    BuildFieldDef,
    AddToCache,
    CreateIndexTree,
    Completed,
}

/// Initial size of a file-per-table tablespace, in pages: the space
/// header, the change-buffer bitmap, the first inode page, and the
/// clustered-index root.
const FILE_INITIAL_SIZE: u32 = 4;

/// Cooperative driver persisting one index: a SYS_INDEXES row, one
/// SYS_FIELDS row per field, then the B-tree root, whose page number is
/// patched back into the retained SYS_INDEXES row.
#[derive(Debug)]
pub struct IndexCreateNode {
    table_name: TableName,
    index: Option<Index>,
    /// Set once the index has been published to the cache.
    index_id: IndexId,
    table_id: TableId,
    state: IndexCreateState,
    field_no: usize,
    /// The SYS_INDEXES tuple, retained for the later PAGE_NO patch.
    ind_row: Option<Tuple>,
    pub page_no: PageNo,
    encryption: EncryptionMode,
    key_id: u32,
    /// Virtual columns created by the same ALTER, published together
    /// with the index.
    add_v: Vec<VirtualColumn>,
}

impl IndexCreateNode {
    pub fn new(table_name: TableName, index: Index) -> Self {
        Self {
            table_name,
            index: Some(index),
            index_id: IndexId(0),
            table_id: TableId(0),
            state: IndexCreateState::BuildIndexDef,
            field_no: 0,
            ind_row: None,
            page_no: PageNo::NULL,
            encryption: EncryptionMode::Default,
            key_id: 0,
            add_v: Vec::new(),
        }
    }

    pub fn with_encryption(mut self, encryption: EncryptionMode, key_id: u32) -> Self {
        self.encryption = encryption;
        self.key_id = key_id;
        self
    }

    pub fn with_new_virtual_columns(mut self, add_v: Vec<VirtualColumn>) -> Self {
        self.add_v = add_v;
        self
    }

    pub fn state(&self) -> IndexCreateState {
        self.state
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn step(&mut self, ctx: &mut DdlContext<'_>, trx: &mut Transaction) -> anyhow::Result<StepResult> {
        loop {
            match self.state {
                IndexCreateState::BuildIndexDef => {
                    let table = ctx
                        .cache
                        .table_by_name_mut(&self.table_name)
                        .ok_or_else(|| {
                            trx.set_error(DbError::TableNotFound);
                            anyhow::Error::new(DbError::TableNotFound).context(
                                ErrorMetadata::not_found(
                                    "TableNotFound",
                                    format!("Table {} not found", self.table_name),
                                ),
                            )
                        })?;
                    let index = self.index.as_mut().expect("stepped after completion");
                    anyhow::ensure!(
                        !table.indexes.is_empty() || index.is_clustered(),
                        "First index of {} must be clustered",
                        table.name
                    );
                    index.id = ctx.ids.new_index_id();
                    index.table_id = table.id;
                    index.trx_id = trx.id;
                    table.def_trx_id = trx.id;
                    self.index_id = index.id;
                    self.table_id = table.id;

                    let row = tuples::sys_indexes_tuple(table, index);
                    self.ind_row = Some(row.clone());
                    SysInserter::new(&mut *ctx.store, trx).insert(SysTableId::Indexes, &row)?;
                    self.state = IndexCreateState::BuildFieldDef;
                    self.field_no = 0;
                    return Ok(StepResult::Yielded);
                },
                IndexCreateState::BuildFieldDef => {
                    self.create_index_space(ctx)?;
                    let index = self.index.as_ref().expect("stepped after completion");
                    if self.field_no < index.n_fields() {
                        let row = tuples::sys_fields_tuple(index, self.field_no)?;
                        self.field_no += 1;
                        SysInserter::new(&mut *ctx.store, trx).insert(SysTableId::Fields, &row)?;
                        return Ok(StepResult::Yielded);
                    }
                    self.state = IndexCreateState::AddToCache;
                },
                IndexCreateState::AddToCache => {
                    let def = self.index.take().expect("stepped after completion");
                    let table = ctx
                        .cache
                        .table_mut(self.table_id)
                        .ok_or_else(|| anyhow::anyhow!("Table {} evicted mid-DDL", self.table_id))?;
                    if !self.add_v.is_empty() {
                        table.add_alter_virtual_columns(std::mem::take(&mut self.add_v));
                    }
                    // The definition carries only the declared fields;
                    // expand it into the stored shape before publishing.
                    let index = table.build_internal_index(&def)?;
                    debug_assert_eq!(index.n_core_null_bytes, index.n_nullable.div_ceil(8));
                    table.indexes.push(index);
                    self.state = IndexCreateState::CreateIndexTree;
                },
                IndexCreateState::CreateIndexTree => {
                    let table = ctx
                        .cache
                        .table_mut(self.table_id)
                        .ok_or_else(|| anyhow::anyhow!("Table {} evicted mid-DDL", self.table_id))?;
                    let position = table
                        .indexes
                        .iter()
                        .position(|index| index.id == self.index_id)
                        .ok_or_else(|| anyhow::anyhow!("Index {} evicted mid-DDL", self.index_id))?;

                    if table.indexes[position].index_type.is_fts() {
                        // FTS indexes have no B-tree of their own.
                        self.page_no = PageNo::NULL;
                    } else {
                        let ind_row = self.ind_row.as_ref().expect("retained at BuildIndexDef");
                        match tree::create_index_tree(&mut *ctx.store, table, position, ind_row)
                        {
                            Ok(page_no) => self.page_no = page_no,
                            Err(err) => {
                                // Keep the dictionary consistent: the
                                // failed index must not stay visible.
                                table.indexes.remove(position);
                                if let Some(db_err) = err.downcast_ref::<DbError>() {
                                    trx.set_error(*db_err);
                                }
                                return Err(err).with_context(|| {
                                    format!("creating tree for index on {}", self.table_name)
                                });
                            },
                        }
                    }
                    metrics::log_index_created();
                    tracing::info!(
                        table = %self.table_name,
                        index = %self.index_id,
                        page = %self.page_no,
                        "index persisted"
                    );
                    self.state = IndexCreateState::Completed;
                    return Ok(StepResult::Done);
                },
                IndexCreateState::Completed => {
                    anyhow::bail!("index-create node stepped after completion");
                },
            }
        }
    }

    /// Create the table's file-per-table tablespace if it does not exist
    /// yet. Discarded tables keep their missing tablespace.
    fn create_index_space(&self, ctx: &mut DdlContext<'_>) -> anyhow::Result<()> {
        let table = ctx
            .cache
            .table_mut(self.table_id)
            .ok_or_else(|| anyhow::anyhow!("Table {} evicted mid-DDL", self.table_id))?;
        if table.space_id == common::types::SpaceId::SYSTEM
            || !table.space_id.is_assigned()
            || table.flags2.is_discarded()
            || ctx.store.space_exists(table.space_id)
        {
            return Ok(());
        }
        let space_id = table.space_id;
        let name = table.name.clone();
        let flags = table.flags;
        ctx.store
            .create_tablespace(
                space_id,
                &name,
                flags,
                FILE_INITIAL_SIZE,
                self.encryption,
                self.key_id,
            )
            .map_err(|err| {
                anyhow::Error::new(err)
                    .context(format!("creating tablespace {space_id} for {name}"))
            })?;
        Ok(())
    }
}
