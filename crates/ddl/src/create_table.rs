use anyhow::Context;
use common::{
    flags::TableFlags2,
    limits::{
        DATA_N_SYS_COLS,
        REC_MAX_N_USER_FIELDS,
    },
    store::SysTableId,
    trx::Transaction,
    types::SpaceId,
};
use dict::Table;
use errors::{
    DbError,
    ErrorMetadata,
};

use crate::{
    inserter::SysInserter,
    metrics,
    tuples,
    DdlContext,
    StepResult,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableCreateState {
    BuildTableDef,
    BuildColDef,
    BuildVColDef,
    AddToCache,
    Completed,
}

/// Cooperative driver persisting one table definition: a SYS_TABLES row,
/// one SYS_COLUMNS row per column, and SYS_VIRTUAL rows for virtual
/// columns with base columns. Each [`TableCreateNode::step`] dispatches at
/// most one insert to the lower layer.
#[derive(Debug)]
pub struct TableCreateNode {
    table: Option<Table>,
    state: TableCreateState,
    col_no: usize,
    base_col_no: usize,
}

impl TableCreateNode {
    pub fn new(table: Table) -> Self {
        Self {
            table: Some(table),
            state: TableCreateState::BuildTableDef,
            col_no: 0,
            base_col_no: 0,
        }
    }

    pub fn state(&self) -> TableCreateState {
        self.state
    }

    /// Advance one state. On error the transaction's error state is set
    /// and the node must not be stepped again; the caller rolls back.
    pub fn step(&mut self, ctx: &mut DdlContext<'_>, trx: &mut Transaction) -> anyhow::Result<StepResult> {
        loop {
            match self.state {
                TableCreateState::BuildTableDef => {
                    let table = self.table.as_mut().expect("stepped after completion");
                    // System columns count twice against the record cap:
                    // once in the table, once appended to secondary
                    // records.
                    anyhow::ensure!(
                        table.n_user_cols() + table.n_v_def() < REC_MAX_N_USER_FIELDS,
                        ErrorMetadata::bad_request(
                            "TooManyColumns",
                            format!(
                                "Table {} has too many columns ({} of at most {})",
                                table.name,
                                table.n_user_cols() + table.n_v_def(),
                                REC_MAX_N_USER_FIELDS - 1,
                            ),
                        )
                    );
                    table.id = ctx.ids.new_table_id();
                    // Every new table names its FTS auxiliary tables in
                    // the hex format.
                    table.flags2 = table.flags2.with(TableFlags2::FTS_AUX_HEX_NAME);

                    if table.flags2.file_per_table() {
                        match ctx.ids.new_space_id() {
                            Some(space_id) if space_id.is_assigned() => {
                                table.space_id = space_id;
                            },
                            _ => {
                                trx.set_error(DbError::OutOfResources);
                                return Err(anyhow::Error::new(DbError::OutOfResources))
                                    .with_context(|| {
                                        format!("tablespace ids exhausted creating {}", table.name)
                                    });
                            },
                        }
                    } else {
                        table.space_id = SpaceId::SYSTEM;
                    }

                    let row = tuples::sys_tables_tuple(table)?;
                    SysInserter::new(&mut *ctx.store, trx).insert(SysTableId::Tables, &row)?;
                    self.state = TableCreateState::BuildColDef;
                    self.col_no = 0;
                    return Ok(StepResult::Yielded);
                },
                TableCreateState::BuildColDef => {
                    let table = self.table.as_ref().expect("stepped after completion");
                    if self.col_no + DATA_N_SYS_COLS < table.n_def() + table.n_v_def() {
                        let mut i = self.col_no;
                        self.col_no += 1;
                        if i + DATA_N_SYS_COLS >= table.n_def() {
                            // Skip over the hidden system columns into
                            // the virtual range.
                            i += DATA_N_SYS_COLS;
                        }
                        let row = tuples::sys_columns_tuple(table, i)?;
                        SysInserter::new(&mut *ctx.store, trx).insert(SysTableId::Columns, &row)?;
                        return Ok(StepResult::Yielded);
                    }
                    self.col_no = 0;
                    self.base_col_no = 0;
                    self.state = TableCreateState::BuildVColDef;
                },
                TableCreateState::BuildVColDef => {
                    let table = self.table.as_ref().expect("stepped after completion");
                    // Virtual columns without base columns have no
                    // SYS_VIRTUAL rows.
                    while self.col_no < table.n_v_def()
                        && table.v_cols[self.col_no].num_base() == 0
                    {
                        self.col_no += 1;
                        self.base_col_no = 0;
                    }
                    if self.col_no < table.n_v_def() {
                        let v_col = &table.v_cols[self.col_no];
                        let row =
                            tuples::sys_virtual_tuple(table, self.col_no, self.base_col_no)?;
                        if self.base_col_no + 1 < v_col.num_base() {
                            self.base_col_no += 1;
                        } else {
                            self.col_no += 1;
                            self.base_col_no = 0;
                        }
                        SysInserter::new(&mut *ctx.store, trx).insert(SysTableId::Virtual, &row)?;
                        return Ok(StepResult::Yielded);
                    }
                    self.state = TableCreateState::AddToCache;
                },
                TableCreateState::AddToCache => {
                    let mut table = self.table.take().expect("stepped after completion");
                    table.can_be_evicted = true;
                    let name = table.name.clone();
                    ctx.cache
                        .add_table(table)
                        .context(ErrorMetadata::conflict(
                            "TableExists",
                            format!("Table {name} already exists"),
                        ))?;
                    metrics::log_table_created();
                    tracing::info!(table = %name, "table definition persisted");
                    self.state = TableCreateState::Completed;
                    return Ok(StepResult::Done);
                },
                TableCreateState::Completed => {
                    anyhow::bail!("table-create node stepped after completion");
                },
            }
        }
    }
}
