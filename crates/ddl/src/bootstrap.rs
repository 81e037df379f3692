//! Bootstrap of the auxiliary catalog tables.
//!
//! SYS_TABLES through SYS_FIELDS exist from the first format version;
//! SYS_FOREIGN, SYS_FOREIGN_COLS and SYS_VIRTUAL were added later and
//! are created on demand at startup. Their shapes are fixed: a loaded
//! table with the wrong index or column count is rejected as invalid and
//! left unpinned.

use anyhow::Context;
use common::{
    knobs::Settings,
    trx::{
        LockMode,
        Transaction,
    },
    types::{
        TableId,
        TableName,
    },
};
use dict::Table;
use errors::DbError;
use value::DataType;

use crate::{
    create_index::IndexCreateNode,
    create_table::TableCreateNode,
    metrics,
    DdlContext,
    StepResult,
};

/// Fixed ids of the core catalog tables, locked exclusively while
/// bootstrap writes to them.
const CORE_CATALOG_TABLE_IDS: [TableId; 4] = [TableId(1), TableId(2), TableId(3), TableId(4)];

struct AuxTableDef {
    name: &'static str,
    n_indexes: usize,
    n_user_cols: usize,
}

static AUX_TABLES: [AuxTableDef; 3] = [
    AuxTableDef {
        name: "SYS_FOREIGN",
        n_indexes: 3,
        n_user_cols: 4,
    },
    AuxTableDef {
        name: "SYS_FOREIGN_COLS",
        n_indexes: 1,
        n_user_cols: 4,
    },
    AuxTableDef {
        name: "SYS_VIRTUAL",
        n_indexes: 1,
        n_user_cols: 3,
    },
];

#[derive(Debug, Default)]
pub struct BootstrapOutcome {
    /// Names of tables created by this bootstrap run.
    pub created: Vec<&'static str>,
}

/// A loaded auxiliary table either matches its fixed shape or is treated
/// as absent (and reported); a mismatch makes the whole catalog suspect.
fn validate_loaded(def: &AuxTableDef, table: &Table) -> bool {
    let ok = table.indexes.len() == def.n_indexes
        && table.n_cols() == def.n_user_cols + common::limits::DATA_N_SYS_COLS;
    if !ok {
        tracing::error!(table = def.name, "Invalid definition of system table");
    }
    ok
}

fn build_aux_table(name: &'static str) -> anyhow::Result<Table> {
    // System tables always live in the system tablespace, in the
    // redundant row format. The CHAR columns are, for the usual
    // historical reasons, really VARCHAR internally.
    let mut table = Table::new(
        TableName::system(name),
        common::flags::TableFlags::default(),
        common::flags::TableFlags2::default(),
    );
    match name {
        "SYS_FOREIGN" => {
            table.add_column("ID", DataType::varchar(0).not_null());
            table.add_column("FOR_NAME", DataType::varchar(0).not_null());
            table.add_column("REF_NAME", DataType::varchar(0).not_null());
            table.add_column("N_COLS", DataType::int(4).unsigned().not_null());
        },
        "SYS_FOREIGN_COLS" => {
            table.add_column("ID", DataType::varchar(0).not_null());
            table.add_column("POS", DataType::int(4).unsigned().not_null());
            table.add_column("FOR_COL_NAME", DataType::varchar(0).not_null());
            table.add_column("REF_COL_NAME", DataType::varchar(0).not_null());
        },
        "SYS_VIRTUAL" => {
            table.add_column("TABLE_ID", DataType::int(8).unsigned().not_null());
            table.add_column("POS", DataType::int(4).unsigned().not_null());
            table.add_column("BASE_POS", DataType::int(4).unsigned().not_null());
        },
        _ => anyhow::bail!("Unknown auxiliary system table {name}"),
    }
    table.complete_definition();
    Ok(table)
}

/// The `i`th index definition of an auxiliary table. Secondary indexes
/// are built against the cached table after the clustered index exists,
/// so the appended clustered key resolves.
fn aux_index(name: &str, i: usize, table: &Table) -> anyhow::Result<dict::Index> {
    match (name, i) {
        ("SYS_FOREIGN", 0) => table.define_clustered_index("ID_IND", &["ID"]),
        ("SYS_FOREIGN", 1) => {
            table.define_secondary_index("FOR_IND", false, &[("FOR_NAME", 0, false)])
        },
        ("SYS_FOREIGN", 2) => {
            table.define_secondary_index("REF_IND", false, &[("REF_NAME", 0, false)])
        },
        ("SYS_FOREIGN_COLS", 0) => table.define_clustered_index("ID_IND", &["ID", "POS"]),
        ("SYS_VIRTUAL", 0) => {
            table.define_clustered_index("BASE_IDX", &["TABLE_ID", "POS", "BASE_POS"])
        },
        _ => anyhow::bail!("Unknown auxiliary system index ({name}, {i})"),
    }
}

fn run_to_completion(
    mut step: impl FnMut() -> anyhow::Result<StepResult>,
) -> anyhow::Result<()> {
    loop {
        if step()? == StepResult::Done {
            return Ok(());
        }
    }
}

/// Load-or-create the three auxiliary system tables. After success each
/// is pinned in the cache. On any creation failure the DDL transaction
/// is rolled back and `file_per_table` is restored to its pre-bootstrap
/// value.
pub fn bootstrap_system_tables(
    store: &mut dyn common::store::StorageServices,
    ids: &mut dyn common::ids::IdAllocator,
    cache: &mut dict::DictCache,
    settings: &mut Settings,
    trx: &mut Transaction,
) -> anyhow::Result<BootstrapOutcome> {
    let _timer = metrics::bootstrap_timer();
    let mut outcome = BootstrapOutcome::default();

    let mut missing = Vec::new();
    let mut mismatch = false;
    for def in &AUX_TABLES {
        match cache.table_by_name(&TableName::system(def.name)) {
            Some(table) => {
                if !validate_loaded(def, table) {
                    mismatch = true;
                }
            },
            None => missing.push(def),
        }
    }
    if mismatch {
        tracing::info!("Start the server read-only to use the damaged catalog as-is");
        return Err(anyhow::Error::new(DbError::Corruption))
            .context("invalid auxiliary system table definitions");
    }
    if missing.is_empty() {
        for def in &AUX_TABLES {
            pin_loaded(cache, def.name)?;
        }
        return Ok(outcome);
    }
    if settings.read_only {
        return Err(anyhow::Error::new(DbError::ReadOnly))
            .context("auxiliary system tables are missing on a read-only server");
    }

    trx.set_operation("creating auxiliary system tables");
    trx.dict_operation = true;
    for table_id in CORE_CATALOG_TABLE_IDS {
        trx.register_table_lock(table_id, LockMode::Exclusive);
    }

    // System tables are always created inside the system tablespace.
    let file_per_table_backup = settings.file_per_table;
    settings.file_per_table = false;
    let create_settings = settings.clone();

    for def in &missing {
        if let Err(err) = create_aux_table(store, ids, cache, &create_settings, trx, def.name) {
            tracing::error!(
                table = def.name,
                error = %err,
                "Creation of system table failed"
            );
            trx.rollback();
            settings.file_per_table = file_per_table_backup;
            return Err(err).with_context(|| format!("creating {}", def.name));
        }
        outcome.created.push(def.name);
    }

    trx.commit();
    settings.file_per_table = file_per_table_backup;

    for def in &AUX_TABLES {
        pin_loaded(cache, def.name)?;
    }
    tracing::info!(created = ?outcome.created, "auxiliary system tables ready");
    Ok(outcome)
}

fn create_aux_table(
    store: &mut dyn common::store::StorageServices,
    ids: &mut dyn common::ids::IdAllocator,
    cache: &mut dict::DictCache,
    settings: &Settings,
    trx: &mut Transaction,
    name: &'static str,
) -> anyhow::Result<()> {
    let table = build_aux_table(name)?;
    let table_name = table.name.clone();

    let mut table_node = TableCreateNode::new(table);
    run_to_completion(|| {
        let mut ctx = DdlContext {
            store: &mut *store,
            ids: &mut *ids,
            cache: &mut *cache,
            settings,
        };
        table_node.step(&mut ctx, trx)
    })?;

    let n_indexes = AUX_TABLES
        .iter()
        .find(|def| def.name == name)
        .map_or(0, |def| def.n_indexes);
    for i in 0..n_indexes {
        let created = cache
            .table_by_name(&table_name)
            .ok_or_else(|| anyhow::anyhow!("{name} vanished after creation"))?;
        let index = aux_index(name, i, created)?;
        let mut index_node = IndexCreateNode::new(table_name.clone(), index);
        run_to_completion(|| {
            let mut ctx = DdlContext {
                store: &mut *store,
                ids: &mut *ids,
                cache: &mut *cache,
                settings,
            };
            index_node.step(&mut ctx, trx)
        })?;
    }
    Ok(())
}

/// Reload after creation and protect from eviction.
fn pin_loaded(cache: &mut dict::DictCache, name: &'static str) -> anyhow::Result<()> {
    let table_name = TableName::system(name);
    let table = cache.table_by_name_mut(&table_name).ok_or_else(|| {
        anyhow::Error::new(DbError::TableNotFound)
            .context(format!("Failed to CREATE TABLE {name}"))
    })?;
    table.can_be_evicted = false;
    let id = table.id;
    cache.pin(id);
    Ok(())
}
