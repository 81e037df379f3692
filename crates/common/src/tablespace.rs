use errors::DbError;

use crate::{
    flags::TableFlags,
    types::{
        SpaceId,
        TableName,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EncryptionMode {
    #[default]
    Default,
    On,
    Off,
}

/// File-per-table tablespace management.
pub trait TablespaceService {
    /// Create a `.ibd` tablespace for one table. `initial_size` is in
    /// pages.
    fn create_tablespace(
        &mut self,
        space_id: SpaceId,
        name: &TableName,
        flags: TableFlags,
        initial_size: u32,
        encryption: EncryptionMode,
        key_id: u32,
    ) -> Result<SpaceId, DbError>;

    fn space_exists(&self, space_id: SpaceId) -> bool;

    /// A space can exist but be unreadable (missing or undecryptable
    /// file); trees must not be created in it.
    fn space_is_readable(&self, space_id: SpaceId) -> bool;

    fn drop_tablespace(&mut self, space_id: SpaceId) -> Result<(), DbError>;
}
