use std::{
    collections::BTreeMap,
    ops::Bound,
};

use errors::DbError;
use value::Tuple;

use crate::{
    flags::{
        IndexType,
        TableFlags,
    },
    limits::{
        FIL_PAGE_INDEX,
        FIL_PAGE_TYPE_INSTANT,
    },
    mtr::{
        LogMode,
        MiniTransaction,
    },
    store::{
        BtreeService,
        CatalogStore,
        CursorId,
        FirstRecord,
        SysTableId,
    },
    tablespace::{
        EncryptionMode,
        TablespaceService,
    },
    trx::Transaction,
    types::{
        IndexId,
        PageNo,
        SpaceId,
        TableName,
    },
};

/// First page number handed out in a fresh tablespace; lower numbers are
/// reserved for space management.
const FIRST_USER_PAGE: u32 = 3;

struct CursorState {
    sys: SysTableId,
    /// Key of the record the cursor is on; `None` = before the first.
    current: Option<Vec<u8>>,
}

struct SpaceState {
    next_page: u32,
    readable: bool,
    /// Makes the next tree allocation report a full file.
    full: bool,
}

/// One allocated index tree.
pub struct TestTree {
    pub index_id: IndexId,
    pub index_type: IndexType,
    pub n_user_rows: usize,
    pub metadata: Option<Tuple>,
    pub page_type: u16,
    pub instant_core: Option<(u16, u16)>,
}

/// In-memory stand-in for the B-tree / page layer: catalog trees are
/// ordered maps keyed by the encoded clustered key, index trees are
/// explicit [`TestTree`] records. Honors the cursor and in-place-write
/// semantics the real layer provides.
pub struct TestStore {
    sys: BTreeMap<SysTableId, BTreeMap<Vec<u8>, Tuple>>,
    cursors: BTreeMap<CursorId, CursorState>,
    next_cursor: u64,
    spaces: BTreeMap<SpaceId, SpaceState>,
    trees: BTreeMap<(SpaceId, PageNo), TestTree>,
    /// Error injected into the next `insert_tuple`.
    pub fail_next_insert: Option<DbError>,
    /// Count of redo-logged in-place writes that were skipped as no-ops.
    pub nop_writes_skipped: usize,
}

/// Encoded clustered-key image of the leading `n` fields. Each field is
/// length-prefixed so that partial keys prefix-match full keys exactly.
fn encode_key(tuple: &Tuple, n: usize) -> Result<Vec<u8>, DbError> {
    let mut key = Vec::new();
    for i in 0..n.min(tuple.n_fields()) {
        let field = tuple.field(i).map_err(|_| DbError::Corruption)?;
        let bytes = field.value.as_bytes().unwrap_or(&[]);
        key.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        key.extend_from_slice(bytes);
    }
    Ok(key)
}

impl TestStore {
    pub fn new() -> Self {
        let mut spaces = BTreeMap::new();
        spaces.insert(
            SpaceId::SYSTEM,
            SpaceState {
                next_page: FIRST_USER_PAGE,
                readable: true,
                full: false,
            },
        );
        Self {
            sys: BTreeMap::new(),
            cursors: BTreeMap::new(),
            next_cursor: 0,
            spaces,
            trees: BTreeMap::new(),
            fail_next_insert: None,
            nop_writes_skipped: 0,
        }
    }

    pub fn rows(&self, sys: SysTableId) -> Vec<&Tuple> {
        self.sys
            .get(&sys)
            .map(|rows| rows.values().collect())
            .unwrap_or_default()
    }

    pub fn n_rows(&self, sys: SysTableId) -> usize {
        self.sys.get(&sys).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn tree(&self, space: SpaceId, root: PageNo) -> Option<&TestTree> {
        self.trees.get(&(space, root))
    }

    pub fn tree_exists(&self, space: SpaceId, root: PageNo) -> bool {
        self.trees.contains_key(&(space, root))
    }

    /// Pretend the table already holds `n` committed rows.
    pub fn seed_user_rows(&mut self, space: SpaceId, root: PageNo, n: usize) {
        self.trees
            .get_mut(&(space, root))
            .expect("seeding rows into a missing tree")
            .n_user_rows = n;
    }

    pub fn set_space_unreadable(&mut self, space: SpaceId) {
        self.spaces
            .get_mut(&space)
            .expect("unknown space")
            .readable = false;
    }

    pub fn set_space_full(&mut self, space: SpaceId) {
        self.spaces.get_mut(&space).expect("unknown space").full = true;
    }

    fn rows_mut(&mut self, sys: SysTableId) -> &mut BTreeMap<Vec<u8>, Tuple> {
        self.sys.entry(sys).or_default()
    }
}

impl CatalogStore for TestStore {
    fn insert_tuple(
        &mut self,
        sys: SysTableId,
        tuple: &Tuple,
        _trx: &Transaction,
    ) -> Result<(), DbError> {
        if let Some(err) = self.fail_next_insert.take() {
            return Err(err);
        }
        let key = encode_key(tuple, sys.n_key_fields())?;
        let rows = self.rows_mut(sys);
        if rows.contains_key(&key) {
            return Err(DbError::DuplicateKey);
        }
        rows.insert(key, tuple.clone());
        Ok(())
    }

    fn open_cursor(
        &mut self,
        sys: SysTableId,
        search: &Tuple,
        _mtr: &MiniTransaction,
    ) -> Result<CursorId, DbError> {
        let search_key = encode_key(search, search.n_fields())?;
        let rows = self.sys.entry(sys).or_default();
        // Less-than positioning: the greatest record strictly below the
        // search key, or before-first.
        let current = rows
            .range::<Vec<u8>, _>((Bound::Unbounded, Bound::Excluded(&search_key)))
            .next_back()
            .map(|(key, _)| key.clone());
        let id = CursorId(self.next_cursor);
        self.next_cursor += 1;
        self.cursors.insert(id, CursorState { sys, current });
        Ok(id)
    }

    fn move_to_next_user_rec(&mut self, cursor: CursorId) -> Result<bool, DbError> {
        let state = self.cursors.get_mut(&cursor).ok_or(DbError::Corruption)?;
        let rows = self.sys.entry(state.sys).or_default();
        let next = match &state.current {
            None => rows.keys().next().cloned(),
            Some(current) => rows
                .range::<Vec<u8>, _>((Bound::Excluded(current), Bound::Unbounded))
                .next()
                .map(|(key, _)| key.clone()),
        };
        match next {
            Some(key) => {
                state.current = Some(key);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn read_field(&self, cursor: CursorId, n: usize) -> Result<Option<Vec<u8>>, DbError> {
        let state = self.cursors.get(&cursor).ok_or(DbError::Corruption)?;
        let key = state.current.as_ref().ok_or(DbError::Corruption)?;
        let tuple = self
            .sys
            .get(&state.sys)
            .and_then(|rows| rows.get(key))
            .ok_or(DbError::Corruption)?;
        let field = tuple.field(n).map_err(|_| DbError::Corruption)?;
        Ok(field.value.as_bytes().map(<[u8]>::to_vec))
    }

    fn write_u32_in_place(
        &mut self,
        cursor: CursorId,
        n: usize,
        value: u32,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError> {
        let state = self.cursors.get(&cursor).ok_or(DbError::Corruption)?;
        let key = state.current.clone().ok_or(DbError::Corruption)?;
        let tuple = self
            .sys
            .get_mut(&state.sys)
            .and_then(|rows| rows.get_mut(&key))
            .ok_or(DbError::Corruption)?;
        let field = tuple.field(n).map_err(|_| DbError::Corruption)?;
        if matches!(field.value.read_u32(), Ok(v) if v == value) {
            // Maybe-no-op hint: identical rewrites generate no redo.
            self.nop_writes_skipped += 1;
            return Ok(());
        }
        let dtype = field.dtype;
        let mut rebuilt = Tuple::with_capacity(tuple.n_fields());
        rebuilt.info_bits = tuple.info_bits;
        for (i, old) in tuple.fields().enumerate() {
            if i == n {
                rebuilt.push(dtype, value::DataValue::from_u32(value));
            } else {
                rebuilt.push(old.dtype, old.value.clone());
            }
        }
        *tuple = rebuilt;
        mtr.note_write();
        Ok(())
    }

    fn delete_by_key(
        &mut self,
        sys: SysTableId,
        key: &Tuple,
        _trx: &Transaction,
    ) -> Result<usize, DbError> {
        let prefix = encode_key(key, key.n_fields())?;
        let rows = self.rows_mut(sys);
        let doomed: Vec<Vec<u8>> = rows
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for k in &doomed {
            rows.remove(k);
        }
        Ok(doomed.len())
    }

    fn close_cursor(&mut self, cursor: CursorId) {
        self.cursors.remove(&cursor);
    }
}

impl BtreeService for TestStore {
    fn create_tree(
        &mut self,
        index_type: IndexType,
        space: SpaceId,
        index_id: IndexId,
        mtr: &mut MiniTransaction,
    ) -> Result<PageNo, DbError> {
        let Some(state) = self.spaces.get_mut(&space) else {
            return Err(DbError::TablespaceExists);
        };
        if state.full {
            // A full file reports FIL_NULL, exactly like the real
            // allocator; the caller maps it to an error.
            return Ok(PageNo::NULL);
        }
        let root = PageNo(state.next_page);
        state.next_page += 1;
        self.trees.insert(
            (space, root),
            TestTree {
                index_id,
                index_type,
                n_user_rows: 0,
                metadata: None,
                page_type: FIL_PAGE_INDEX,
                instant_core: None,
            },
        );
        mtr.note_write();
        Ok(root)
    }

    fn free_tree(
        &mut self,
        space: SpaceId,
        root: PageNo,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError> {
        if self.trees.remove(&(space, root)).is_some() && mtr.log_mode() == LogMode::Redo {
            mtr.note_write();
        }
        Ok(())
    }

    fn tree_in_bounds(&self, space: SpaceId, root: PageNo) -> bool {
        self.spaces
            .get(&space)
            .is_some_and(|state| !root.is_null() && root.0 < state.next_page)
    }

    fn first_record(&self, space: SpaceId, root: PageNo) -> Result<FirstRecord, DbError> {
        let tree = self.trees.get(&(space, root)).ok_or(DbError::Corruption)?;
        if let Some(metadata) = &tree.metadata {
            return Ok(FirstRecord::Metadata {
                info_bits: metadata.info_bits,
            });
        }
        if tree.n_user_rows == 0 {
            return Ok(FirstRecord::Empty);
        }
        Ok(FirstRecord::User)
    }

    fn insert_metadata(
        &mut self,
        space: SpaceId,
        root: PageNo,
        entry: &Tuple,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError> {
        let tree = self
            .trees
            .get_mut(&(space, root))
            .ok_or(DbError::Corruption)?;
        if tree.metadata.is_some() {
            return Err(DbError::Corruption);
        }
        tree.metadata = Some(entry.clone());
        mtr.note_write();
        Ok(())
    }

    fn update_metadata(
        &mut self,
        space: SpaceId,
        root: PageNo,
        entry: &Tuple,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError> {
        let tree = self
            .trees
            .get_mut(&(space, root))
            .ok_or(DbError::Corruption)?;
        if tree.metadata.is_none() {
            return Err(DbError::Corruption);
        }
        tree.metadata = Some(entry.clone());
        mtr.note_write();
        Ok(())
    }

    fn empty_leftmost_page(
        &mut self,
        space: SpaceId,
        root: PageNo,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError> {
        let tree = self
            .trees
            .get_mut(&(space, root))
            .ok_or(DbError::Corruption)?;
        if tree.n_user_rows != 0 {
            return Err(DbError::Corruption);
        }
        tree.metadata = None;
        mtr.note_write();
        Ok(())
    }

    fn stamp_instant_root(
        &mut self,
        space: SpaceId,
        root: PageNo,
        n_core_fields: u16,
        n_core_null_bytes: u16,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError> {
        let tree = self
            .trees
            .get_mut(&(space, root))
            .ok_or(DbError::Corruption)?;
        tree.page_type = FIL_PAGE_TYPE_INSTANT;
        tree.instant_core = Some((n_core_fields, n_core_null_bytes));
        mtr.note_write();
        Ok(())
    }

    fn clear_instant_root(
        &mut self,
        space: SpaceId,
        root: PageNo,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError> {
        let tree = self
            .trees
            .get_mut(&(space, root))
            .ok_or(DbError::Corruption)?;
        tree.page_type = FIL_PAGE_INDEX;
        tree.instant_core = None;
        mtr.note_write();
        Ok(())
    }
}

impl TablespaceService for TestStore {
    fn create_tablespace(
        &mut self,
        space_id: SpaceId,
        _name: &TableName,
        _flags: TableFlags,
        _initial_size: u32,
        _encryption: EncryptionMode,
        _key_id: u32,
    ) -> Result<SpaceId, DbError> {
        if self.spaces.contains_key(&space_id) {
            return Err(DbError::TablespaceExists);
        }
        self.spaces.insert(
            space_id,
            SpaceState {
                next_page: FIRST_USER_PAGE,
                readable: true,
                full: false,
            },
        );
        Ok(space_id)
    }

    fn space_exists(&self, space_id: SpaceId) -> bool {
        self.spaces.contains_key(&space_id)
    }

    fn space_is_readable(&self, space_id: SpaceId) -> bool {
        self.spaces
            .get(&space_id)
            .is_some_and(|state| state.readable)
    }

    fn drop_tablespace(&mut self, space_id: SpaceId) -> Result<(), DbError> {
        self.spaces.remove(&space_id);
        self.trees.retain(|(space, _), _| *space != space_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use value::DataValue;

    use super::*;
    use crate::{
        trx::Transaction,
        types::TrxId,
    };

    fn columns_row(table_id: u64, pos: u32) -> Tuple {
        let mut tuple = Tuple::with_capacity(3);
        tuple.push_u64(table_id);
        tuple.push_u32(pos);
        tuple.push_varchar("c");
        tuple
    }

    #[test]
    fn test_insert_and_duplicate() {
        let mut store = TestStore::new();
        let trx = Transaction::new(TrxId(1));
        store
            .insert_tuple(SysTableId::Columns, &columns_row(5, 0), &trx)
            .unwrap();
        store
            .insert_tuple(SysTableId::Columns, &columns_row(5, 1), &trx)
            .unwrap();
        assert_eq!(
            store.insert_tuple(SysTableId::Columns, &columns_row(5, 0), &trx),
            Err(DbError::DuplicateKey)
        );
        assert_eq!(store.n_rows(SysTableId::Columns), 2);
    }

    #[test]
    fn test_cursor_positions_before_match() {
        let mut store = TestStore::new();
        let trx = Transaction::new(TrxId(1));
        for pos in [0, 1, 2] {
            store
                .insert_tuple(SysTableId::Columns, &columns_row(9, pos), &trx)
                .unwrap();
        }
        let mut search = Tuple::with_capacity(2);
        search.push_u64(9);
        search.push_u32(1);
        let mtr = MiniTransaction::start();
        let cursor = store
            .open_cursor(SysTableId::Columns, &search, &mtr)
            .unwrap();
        assert!(store.move_to_next_user_rec(cursor).unwrap());
        let pos = store.read_field(cursor, 1).unwrap().unwrap();
        assert_eq!(value::mach::read_u32(&pos), 1);
        store.close_cursor(cursor);
    }

    #[test]
    fn test_in_place_write_skips_nops() {
        let mut store = TestStore::new();
        let trx = Transaction::new(TrxId(1));
        store
            .insert_tuple(SysTableId::Columns, &columns_row(2, 0), &trx)
            .unwrap();
        let mut search = Tuple::with_capacity(1);
        search.push_u64(2);
        let mut mtr = MiniTransaction::start();
        let cursor = store
            .open_cursor(SysTableId::Columns, &search, &mtr)
            .unwrap();
        assert!(store.move_to_next_user_rec(cursor).unwrap());
        store.write_u32_in_place(cursor, 1, 7, &mut mtr).unwrap();
        assert_eq!(mtr.n_writes(), 1);
        store.write_u32_in_place(cursor, 1, 7, &mut mtr).unwrap();
        assert_eq!(mtr.n_writes(), 1);
        assert_eq!(store.nop_writes_skipped, 1);
        store.close_cursor(cursor);
        mtr.commit();
    }

    #[test]
    fn test_delete_by_key_prefix() {
        let mut store = TestStore::new();
        let trx = Transaction::new(TrxId(1));
        for pos in 0..3 {
            let mut row = Tuple::with_capacity(4);
            row.push_varchar("db/fk1");
            row.push_u32(pos);
            row.push_varchar("a");
            row.push_varchar("b");
            store
                .insert_tuple(SysTableId::ForeignCols, &row, &trx)
                .unwrap();
        }
        let mut key = Tuple::with_capacity(1);
        key.push(
            value::DataType::varchar(6),
            DataValue::from_str("db/fk1"),
        );
        assert_eq!(
            store
                .delete_by_key(SysTableId::ForeignCols, &key, &trx)
                .unwrap(),
            3
        );
        assert_eq!(store.n_rows(SysTableId::ForeignCols), 0);
    }
}
