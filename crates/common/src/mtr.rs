//! Mini-transaction handle.
//!
//! The real mini-transaction scopes redo-logged physical page mutation;
//! here it carries the log mode and bounds the write calls made through
//! the store traits, so callers keep the start/commit discipline the
//! lower layer requires.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogMode {
    Redo,
    /// Temporary-table work: changes are not redo logged.
    NoRedo,
}

#[derive(Debug)]
pub struct MiniTransaction {
    log_mode: LogMode,
    active: bool,
    n_writes: usize,
}

impl MiniTransaction {
    pub fn start() -> Self {
        Self {
            log_mode: LogMode::Redo,
            active: true,
            n_writes: 0,
        }
    }

    pub fn set_log_mode(&mut self, mode: LogMode) {
        assert!(self.active, "log mode change on a committed mtr");
        self.log_mode = mode;
    }

    pub fn log_mode(&self) -> LogMode {
        self.log_mode
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Called by the store traits for every page mutation made under this
    /// mtr.
    pub fn note_write(&mut self) {
        assert!(self.active, "page write on a committed mtr");
        self.n_writes += 1;
    }

    pub fn n_writes(&self) -> usize {
        self.n_writes
    }

    pub fn commit(mut self) {
        self.active = false;
    }
}

impl Drop for MiniTransaction {
    fn drop(&mut self) {
        // A dropped-while-active mtr means an early return on an error
        // path; the lower layer discards its uncommitted changes.
        if self.active && self.n_writes > 0 {
            tracing::warn!(
                n_writes = self.n_writes,
                "mini-transaction dropped without commit"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_accounting() {
        let mut mtr = MiniTransaction::start();
        assert_eq!(mtr.log_mode(), LogMode::Redo);
        mtr.note_write();
        mtr.note_write();
        assert_eq!(mtr.n_writes(), 2);
        mtr.commit();
    }

    #[test]
    #[should_panic(expected = "page write on a committed mtr")]
    fn test_write_after_commit_panics() {
        let mut mtr = MiniTransaction::start();
        mtr.active = false;
        mtr.note_write();
    }
}
