//! Interfaces onto the B-tree / page layer.
//!
//! The dictionary core never touches pages directly: it inserts typed
//! tuples into the catalog trees, walks them with persistent cursors,
//! patches single fields in place, and asks for whole index trees to be
//! created or freed. Everything below those verbs (latching, redo
//! logging, overflow pages) is the lower layer's business.

use errors::DbError;
use value::Tuple;

use crate::{
    flags::IndexType,
    mtr::MiniTransaction,
    trx::Transaction,
    types::{
        IndexId,
        PageNo,
        SpaceId,
    },
};

/// The persistent catalog tables. Their row shapes are fixed forever; see
/// the tuple builders for the column orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SysTableId {
    Tables,
    Columns,
    Indexes,
    Fields,
    Virtual,
    Foreign,
    ForeignCols,
}

impl SysTableId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Tables => "SYS_TABLES",
            Self::Columns => "SYS_COLUMNS",
            Self::Indexes => "SYS_INDEXES",
            Self::Fields => "SYS_FIELDS",
            Self::Virtual => "SYS_VIRTUAL",
            Self::Foreign => "SYS_FOREIGN",
            Self::ForeignCols => "SYS_FOREIGN_COLS",
        }
    }

    /// Number of leading tuple fields forming the clustered key.
    pub fn n_key_fields(self) -> usize {
        match self {
            Self::Tables => 1,
            Self::Columns => 2,
            Self::Indexes => 2,
            Self::Fields => 2,
            Self::Virtual => 3,
            Self::Foreign => 1,
            Self::ForeignCols => 2,
        }
    }
}

/// Everything the DDL layer needs from below, as one trait object.
pub trait StorageServices:
    CatalogStore + BtreeService + crate::tablespace::TablespaceService
{
}

impl<T: CatalogStore + BtreeService + crate::tablespace::TablespaceService> StorageServices for T {}

/// Handle to an open persistent cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CursorId(pub u64);

/// Catalog-tree access: tuple inserts, cursor walks, in-place patches.
pub trait CatalogStore {
    /// Insert one catalog row. The lower layer assigns DB_TRX_ID and
    /// DB_ROLL_PTR from `trx`. May block on row locks.
    fn insert_tuple(
        &mut self,
        sys: SysTableId,
        tuple: &Tuple,
        trx: &Transaction,
    ) -> Result<(), DbError>;

    /// Open a persistent cursor positioned strictly *before* the first
    /// record >= `search` (the less-than positioning mode); step forward
    /// with [`CatalogStore::move_to_next_user_rec`] to reach it.
    fn open_cursor(
        &mut self,
        sys: SysTableId,
        search: &Tuple,
        mtr: &MiniTransaction,
    ) -> Result<CursorId, DbError>;

    /// Advance to the next user record. False once the cursor leaves the
    /// last record.
    fn move_to_next_user_rec(&mut self, cursor: CursorId) -> Result<bool, DbError>;

    /// Raw bytes of the cursor record's nth field; `None` for SQL NULL.
    fn read_field(&self, cursor: CursorId, n: usize) -> Result<Option<Vec<u8>>, DbError>;

    /// Redo-logged 4-byte overwrite of the cursor record's nth field,
    /// skipped entirely when the stored value already matches.
    fn write_u32_in_place(
        &mut self,
        cursor: CursorId,
        n: usize,
        value: u32,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError>;

    /// Delete every row whose leading key fields equal `key`. Returns the
    /// number of rows removed.
    fn delete_by_key(
        &mut self,
        sys: SysTableId,
        key: &Tuple,
        trx: &Transaction,
    ) -> Result<usize, DbError>;

    fn close_cursor(&mut self, cursor: CursorId);
}

/// What sits at the leftmost leaf of a clustered index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirstRecord {
    /// No user records at all.
    Empty,
    /// The first record is a metadata record with these info bits.
    Metadata { info_bits: u8 },
    /// An ordinary user record.
    User,
}

/// Index-tree lifecycle plus the clustered-leaf operations the instant
/// engine needs for its metadata record.
pub trait BtreeService {
    /// Allocate a new B-tree root in `space`. A full tablespace reports
    /// [`DbError::OutOfFileSpace`].
    fn create_tree(
        &mut self,
        index_type: IndexType,
        space: SpaceId,
        index_id: IndexId,
        mtr: &mut MiniTransaction,
    ) -> Result<PageNo, DbError>;

    /// Free the tree rooted at `root` if it exists.
    fn free_tree(
        &mut self,
        space: SpaceId,
        root: PageNo,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError>;

    /// True when `space` exists and `root` lies inside its file.
    fn tree_in_bounds(&self, space: SpaceId, root: PageNo) -> bool;

    fn first_record(&self, space: SpaceId, root: PageNo) -> Result<FirstRecord, DbError>;

    /// Insert a metadata record at the leftmost leaf through the
    /// low-locking clustered insert path.
    fn insert_metadata(
        &mut self,
        space: SpaceId,
        root: PageNo,
        entry: &Tuple,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError>;

    /// Rewrite the existing metadata record in place (pessimistic update
    /// with overflow handling).
    fn update_metadata(
        &mut self,
        space: SpaceId,
        root: PageNo,
        entry: &Tuple,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError>;

    /// Remove everything from the leftmost page. Only legal when the
    /// metadata record is the sole remaining record.
    fn empty_leftmost_page(
        &mut self,
        space: SpaceId,
        root: PageNo,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError>;

    /// Mark the root `FIL_PAGE_TYPE_INSTANT` and stamp the core field
    /// counts every later scan will read.
    fn stamp_instant_root(
        &mut self,
        space: SpaceId,
        root: PageNo,
        n_core_fields: u16,
        n_core_null_bytes: u16,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError>;

    /// Restore the root to a plain index page.
    fn clear_instant_root(
        &mut self,
        space: SpaceId,
        root: PageNo,
        mtr: &mut MiniTransaction,
    ) -> Result<(), DbError>;
}
