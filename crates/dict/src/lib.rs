//! The in-memory data dictionary.
//!
//! Mirrors the persistent catalog: every open table is a [`Table`] holding
//! its columns, virtual columns, indexes and foreign keys, cached in the
//! process-wide [`DictSys`]. Instant ALTERs rewrite these structures in
//! place; the [`instant::InstantMetadata`] descriptor preserves what old
//! rows on disk still look like.

mod column;
mod dict_sys;
mod field;
mod foreign;
mod index;
pub mod instant;
mod table;
mod virtual_col;

pub use column::{
    Column,
    ColumnRef,
    DefaultValue,
};
pub use dict_sys::{
    DictCache,
    DictSys,
};
pub use field::Field;
pub use foreign::{
    ForeignActions,
    ForeignKey,
};
pub use index::Index;
pub use instant::{
    FieldMapEntry,
    InstantMetadata,
};
pub use table::{
    Table,
    ROLL_PTR_NAME,
    ROW_ID_NAME,
    TRX_ID_NAME,
};
pub use virtual_col::{
    BaseColRef,
    VirtualColumn,
};
