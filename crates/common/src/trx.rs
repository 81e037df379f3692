use std::borrow::Cow;

use errors::DbError;

use crate::types::{
    TableId,
    TrxId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrxState {
    Active,
    Committed,
    RolledBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// The slice of a transaction the dictionary core needs: an id, an
/// operation string for diagnostics, error state, and the set of catalog
/// table locks taken. Row-level locking and MVCC live below this
/// interface.
#[derive(Debug)]
pub struct Transaction {
    pub id: TrxId,
    state: TrxState,
    /// Registered for diagnostics, e.g. `"creating index"`.
    operation: Option<Cow<'static, str>>,
    error_state: Option<DbError>,
    /// True while this transaction modifies the data dictionary.
    pub dict_operation: bool,
    table_locks: Vec<(TableId, LockMode)>,
}

impl Transaction {
    pub fn new(id: TrxId) -> Self {
        Self {
            id,
            state: TrxState::Active,
            operation: None,
            error_state: None,
            dict_operation: false,
            table_locks: Vec::new(),
        }
    }

    pub fn set_operation(&mut self, op: impl Into<Cow<'static, str>>) {
        self.operation = Some(op.into());
    }

    pub fn clear_operation(&mut self) {
        self.operation = None;
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn state(&self) -> TrxState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TrxState::Active
    }

    /// Record a deferred error; the driver stops at the next state
    /// boundary and rolls back.
    pub fn set_error(&mut self, err: DbError) {
        if self.error_state.is_none() {
            self.error_state = Some(err);
        }
    }

    pub fn error_state(&self) -> Option<DbError> {
        self.error_state
    }

    pub fn take_error(&mut self) -> Option<DbError> {
        self.error_state.take()
    }

    pub fn register_table_lock(&mut self, table_id: TableId, mode: LockMode) {
        if !self.table_locks.contains(&(table_id, mode)) {
            self.table_locks.push((table_id, mode));
        }
    }

    pub fn table_locks(&self) -> &[(TableId, LockMode)] {
        &self.table_locks
    }

    pub fn commit(&mut self) {
        assert!(self.is_active(), "commit of a finished transaction");
        self.state = TrxState::Committed;
        self.table_locks.clear();
    }

    pub fn rollback(&mut self) {
        assert!(self.is_active(), "rollback of a finished transaction");
        self.state = TrxState::RolledBack;
        self.table_locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_state_keeps_first() {
        let mut trx = Transaction::new(TrxId(7));
        trx.set_error(DbError::DuplicateKey);
        trx.set_error(DbError::Corruption);
        assert_eq!(trx.error_state(), Some(DbError::DuplicateKey));
        assert_eq!(trx.take_error(), Some(DbError::DuplicateKey));
        assert_eq!(trx.error_state(), None);
    }

    #[test]
    fn test_lock_registration_dedups() {
        let mut trx = Transaction::new(TrxId(1));
        trx.register_table_lock(TableId(3), LockMode::Exclusive);
        trx.register_table_lock(TableId(3), LockMode::Exclusive);
        assert_eq!(trx.table_locks().len(), 1);
        trx.rollback();
        assert!(trx.table_locks().is_empty());
        assert_eq!(trx.state(), TrxState::RolledBack);
    }
}
