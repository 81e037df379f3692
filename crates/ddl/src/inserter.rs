use anyhow::Context;
use common::{
    store::{
        CatalogStore,
        SysTableId,
    },
    trx::Transaction,
};
use value::Tuple;

/// Binds one driver state to one catalog insert. The lower layer may
/// block on row locks here; every other error stops the driver and is
/// recorded on the transaction for rollback.
pub struct SysInserter<'a> {
    store: &'a mut dyn CatalogStore,
    trx: &'a mut Transaction,
}

impl<'a> SysInserter<'a> {
    pub fn new(store: &'a mut dyn CatalogStore, trx: &'a mut Transaction) -> Self {
        Self { store, trx }
    }

    pub fn insert(&mut self, sys: SysTableId, tuple: &Tuple) -> anyhow::Result<()> {
        match self.store.insert_tuple(sys, tuple, self.trx) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.trx.set_error(err);
                Err(anyhow::Error::new(err))
                    .with_context(|| format!("inserting into {}", sys.name()))
            },
        }
    }
}
