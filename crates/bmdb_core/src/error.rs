//! Error types for bmdb core.

use bmdb_engine::EngineError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in bmdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key is longer than [`crate::MAX_KEY_SIZE`].
    #[error("key is too large")]
    KeyTooLarge,

    /// Value is longer than [`crate::MAX_VALUE_SIZE`].
    #[error("value is too large")]
    ValueTooLarge,

    /// A bucket with this name already exists.
    #[error("bucket already exists")]
    BucketExists,

    /// Bucket name is longer than [`crate::MAX_NAME_LENGTH`].
    #[error("bucket name is too long")]
    NameTooLong,

    /// Bucket name is empty.
    #[error("no bucket name provided")]
    NoBucketName,

    /// The named bucket does not exist.
    #[error("bucket not found")]
    BucketNotFound,

    /// Key is empty.
    #[error("key is required")]
    KeyRequired,

    /// An insert hit a key that is already present.
    #[error("key already exists")]
    KeyExists,

    /// The transaction is owned by `update` or `view`.
    #[error("this transaction is managed")]
    TxManaged,

    /// The transaction was committed, rolled back or force-closed.
    #[error("this transaction is done")]
    TxDone,

    /// The database handle is closed.
    #[error("database not open")]
    DatabaseNotOpen,

    /// A write was attempted through a read-only transaction.
    #[error("read-only transaction")]
    TxNotWritable,

    /// `close` was called on a closed handle.
    #[error("already closed")]
    AlreadyClosed,

    /// The cursor was closed.
    #[error("cursor closed")]
    CursorClosed,

    /// The environment could not be opened.
    #[error("failed to open environment at {}: {source}", path.display())]
    Init {
        /// Environment directory.
        path: PathBuf,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// Storage engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The registry was drained; no new handles are accepted.
    #[error("shutting down")]
    ShuttingDown,

    /// The signal handler could not be installed.
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl CoreError {
    /// Creates an initialization error for the environment at `path`.
    pub fn init(path: impl Into<PathBuf>, source: EngineError) -> Self {
        Self::Init {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the engine reported a missing key.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Engine(e) if e.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(CoreError::TxDone.to_string(), "this transaction is done");
        assert_eq!(CoreError::TxNotWritable.to_string(), "read-only transaction");

        let err = CoreError::init("/tmp/env", EngineError::Closed);
        assert!(err.to_string().contains("/tmp/env"));
        assert!(err.to_string().contains("environment is closed"));
    }

    #[test]
    fn engine_errors_convert() {
        let err: CoreError = EngineError::NotFound.into();
        assert!(err.is_not_found());
        assert!(!CoreError::BucketNotFound.is_not_found());
    }
}
