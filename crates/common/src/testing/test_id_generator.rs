use crate::{
    ids::IdAllocator,
    trx::Transaction,
    types::{
        IndexId,
        SpaceId,
        TableId,
        TrxId,
    },
};

/// A simple incrementing id allocator for use in tests.
pub struct TestIdGenerator {
    next_table: u64,
    next_index: u64,
    next_space: u32,
    next_trx: u64,
    /// Makes [`IdAllocator::new_space_id`] report exhaustion.
    pub spaces_exhausted: bool,
}

impl TestIdGenerator {
    pub fn new() -> Self {
        Self {
            next_table: 1024,
            next_index: 4096,
            next_space: 10,
            next_trx: 100,
            spaces_exhausted: false,
        }
    }

    pub fn new_transaction(&mut self) -> Transaction {
        Transaction::new(self.new_trx_id())
    }
}

impl IdAllocator for TestIdGenerator {
    fn new_table_id(&mut self) -> TableId {
        let id = TableId(self.next_table);
        self.next_table += 1;
        id
    }

    fn new_index_id(&mut self) -> IndexId {
        let id = IndexId(self.next_index);
        self.next_index += 1;
        id
    }

    fn new_trx_id(&mut self) -> TrxId {
        let id = TrxId(self.next_trx);
        self.next_trx += 1;
        id
    }

    fn new_space_id(&mut self) -> Option<SpaceId> {
        if self.spaces_exhausted {
            return None;
        }
        let id = SpaceId(self.next_space);
        self.next_space += 1;
        Some(id)
    }
}
