use imbl::{
    OrdMap,
    OrdSet,
};
use parking_lot::{
    RwLock,
    RwLockReadGuard,
    RwLockWriteGuard,
};

use common::types::{
    TableId,
    TableName,
};

use crate::table::Table;

/// The process-wide dictionary cache: every open table, addressable by id
/// and by qualified name. DDL holds the write latch for the duration of a
/// driver run; readers share the read latch.
pub struct DictSys {
    cache: RwLock<DictCache>,
}

#[derive(Clone, Default)]
pub struct DictCache {
    tables_by_id: OrdMap<TableId, Table>,
    ids_by_name: OrdMap<TableName, TableId>,
    /// Tables that must never be evicted (the bootstrap system tables).
    pinned: OrdSet<TableId>,
}

impl DictSys {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(DictCache::default()),
        }
    }

    /// Exclusive latch, held across a whole DDL driver run.
    pub fn lock(&self) -> RwLockWriteGuard<'_, DictCache> {
        self.cache.write()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, DictCache> {
        self.cache.read()
    }
}

impl DictCache {
    pub fn add_table(&mut self, table: Table) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.ids_by_name.contains_key(&table.name),
            "Table {} already in the dictionary cache",
            table.name
        );
        anyhow::ensure!(
            !self.tables_by_id.contains_key(&table.id),
            "Table id {} already in the dictionary cache",
            table.id
        );
        self.ids_by_name.insert(table.name.clone(), table.id);
        self.tables_by_id.insert(table.id, table);
        Ok(())
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables_by_id.get(&id)
    }

    pub fn table_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables_by_id.get_mut(&id)
    }

    pub fn table_by_name(&self, name: &TableName) -> Option<&Table> {
        self.ids_by_name
            .get(name)
            .and_then(|id| self.tables_by_id.get(id))
    }

    pub fn table_id_by_name(&self, name: &TableName) -> Option<TableId> {
        self.ids_by_name.get(name).copied()
    }

    pub fn table_by_name_mut(&mut self, name: &TableName) -> Option<&mut Table> {
        let id = *self.ids_by_name.get(name)?;
        self.tables_by_id.get_mut(&id)
    }

    pub fn remove_table(&mut self, id: TableId) -> Option<Table> {
        let table = self.tables_by_id.remove(&id)?;
        self.ids_by_name.remove(&table.name);
        self.pinned.remove(&id);
        Some(table)
    }

    /// Pin a table so cache pressure can never evict it.
    pub fn pin(&mut self, id: TableId) {
        debug_assert!(self.tables_by_id.contains_key(&id));
        self.pinned.insert(id);
    }

    pub fn is_pinned(&self, id: TableId) -> bool {
        self.pinned.contains(&id)
    }

    /// Evict an unpinned table. Returns false (and keeps the table) when
    /// it is pinned or has open handles elsewhere.
    pub fn evict(&mut self, id: TableId) -> bool {
        if self.pinned.contains(&id) {
            return false;
        }
        let evictable = self
            .tables_by_id
            .get(&id)
            .is_some_and(|table| table.can_be_evicted);
        if evictable {
            self.remove_table(id);
        }
        evictable
    }

    pub fn n_tables(&self) -> usize {
        self.tables_by_id.len()
    }
}
