use crate::types::{
    IndexId,
    SpaceId,
    TableId,
    TrxId,
};

/// Allocates persistent identifiers from the global data-dictionary
/// header. Ids are durable across restarts and never reused.
pub trait IdAllocator {
    fn new_table_id(&mut self) -> TableId;
    fn new_index_id(&mut self) -> IndexId;
    fn new_trx_id(&mut self) -> TrxId;
    /// `None` when the 32-bit space id namespace is exhausted.
    fn new_space_id(&mut self) -> Option<SpaceId>;
}
