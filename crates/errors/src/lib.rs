use std::borrow::Cow;

/// Error codes surfaced by the storage engine to its caller. These mirror
/// the engine's historical numeric codes one-to-one; layers above translate
/// them into client-facing errors.
///
/// A `DbError` says *what* went wrong; the human-readable context lives in
/// the surrounding `anyhow` chain, usually together with an
/// [`ErrorMetadata`] tag.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
pub enum DbError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("out of file space")]
    OutOfFileSpace,
    #[error("out of resources")]
    OutOfResources,
    #[error("table not found")]
    TableNotFound,
    #[error("table already exists")]
    TableExists,
    #[error("duplicate key")]
    DuplicateKey,
    #[error("data structure corruption")]
    Corruption,
    #[error("index corrupted")]
    IndexCorrupt,
    #[error("instance is read-only")]
    ReadOnly,
    #[error("unsupported operation")]
    Unsupported,
    #[error("lock wait")]
    LockWait,
    #[error("lock wait timeout")]
    LockWaitTimeout,
    #[error("deadlock")]
    Deadlock,
    #[error("record too big")]
    TooBigRecord,
    #[error("index column size too big")]
    TooBigIndexCol,
    #[error("too many concurrent transactions")]
    TooManyConcurrentTrxs,
    #[error("NULL value in NOT NULL column")]
    InvalidNull,
    #[error("cannot create geometry object")]
    CantCreateGeometryObject,
    #[error("tablespace already exists")]
    TablespaceExists,
    #[error("cannot add foreign key constraint")]
    CannotAddConstraint,
    #[error("undo record too big")]
    UndoRecordTooBig,
    #[error("missing history")]
    MissingHistory,
}

impl DbError {
    /// Lock waits are the only errors a caller may retry without rolling
    /// the enclosing transaction back.
    pub fn is_lock_wait(&self) -> bool {
        matches!(self, DbError::LockWait)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DbError::Corruption | DbError::IndexCorrupt)
    }
}

/// ErrorMetadata can be attached to an anyhow error chain via
/// `.context(e /*ErrorMetadata*/)`. It classifies an error for the layers
/// that report it to users.
///
/// The msg is conveyed as the user facing error message if it makes it out
/// of the engine.
///
/// The short_msg is used as a tag - available for tests and for metrics
/// logging - that is resilient to changes in copy.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{msg}")]
pub struct ErrorMetadata {
    pub code: ErrorCode,
    /// Short ScreamingCamelCase tag, e.g. `DupConstraintName`. Usable in
    /// tests for string matching with [`ErrorMetadataAnyhowExt::is_tagged`].
    pub short_msg: Cow<'static, str>,
    /// Human readable, developer facing. Longer and descriptive.
    pub msg: Cow<'static, str>,
}

#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Conflict,
    Overloaded,
    OperationalInternalServerError,
}

impl ErrorMetadata {
    /// A statement-level rejection. Nothing persistent changed.
    pub fn bad_request(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn not_found(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::NotFound,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    /// A conflict with concurrent or pre-existing state (duplicate names,
    /// duplicate constraints).
    pub fn conflict(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Conflict,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn operational_internal_server_error() -> Self {
        Self {
            code: ErrorCode::OperationalInternalServerError,
            short_msg: "InternalServerError".into(),
            msg: "Internal error".into(),
        }
    }
}

pub trait ErrorMetadataAnyhowExt {
    fn is_tagged(&self, short_msg: &str) -> bool;
    fn user_facing_message(&self) -> Option<String>;
    fn db_error(&self) -> Option<DbError>;
}

impl ErrorMetadataAnyhowExt for anyhow::Error {
    /// True if an [`ErrorMetadata`] with the given short_msg is anywhere in
    /// the chain.
    fn is_tagged(&self, short_msg: &str) -> bool {
        self.chain().any(|e| {
            e.downcast_ref::<ErrorMetadata>()
                .is_some_and(|em| em.short_msg == short_msg)
        })
    }

    fn user_facing_message(&self) -> Option<String> {
        self.chain()
            .find_map(|e| e.downcast_ref::<ErrorMetadata>())
            .map(|em| em.msg.to_string())
    }

    /// The innermost typed engine error, if any.
    fn db_error(&self) -> Option<DbError> {
        self.chain()
            .rev()
            .find_map(|e| e.downcast_ref::<DbError>())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn test_tag_lookup_through_chain() {
        let err = anyhow::Error::new(DbError::DuplicateKey)
            .context(ErrorMetadata::conflict(
                "DupConstraintName",
                "duplicate constraint `db/fk1`",
            ))
            .context("installing foreign keys");
        assert!(err.is_tagged("DupConstraintName"));
        assert!(!err.is_tagged("TableNotFound"));
        assert_eq!(err.db_error(), Some(DbError::DuplicateKey));
        assert_eq!(
            err.user_facing_message().as_deref(),
            Some("duplicate constraint `db/fk1`")
        );
    }

    #[test]
    fn test_lock_wait_is_retryable() {
        assert!(DbError::LockWait.is_lock_wait());
        assert!(!DbError::LockWaitTimeout.is_lock_wait());
        assert!(DbError::Corruption.is_fatal());
    }
}
