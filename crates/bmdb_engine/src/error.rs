//! Error types for engine operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by a storage engine.
///
/// The handle layer passes these through opaquely; it only uses
/// [`EngineError::NotFound`] to tell a missing container apart from a failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another environment already holds the directory lock.
    #[error("environment locked: {}", path.display())]
    Locked {
        /// The locked environment directory.
        path: PathBuf,
    },

    /// An option was rejected before the environment was opened.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The data file is corrupted or not a snapshot file.
    #[error("environment corrupted: {0}")]
    Corrupted(String),

    /// The requested key or container does not exist.
    #[error("not found")]
    NotFound,

    /// A no-overwrite put hit an existing key.
    #[error("key already exists")]
    KeyExists,

    /// The environment's map size would be exceeded by this write.
    #[error("map full: {used} of {limit} bytes in use")]
    MapFull {
        /// Bytes the snapshot would occupy after the write.
        used: u64,
        /// Configured map size.
        limit: u64,
    },

    /// All reader slots are taken.
    #[error("reader limit reached ({0} slots)")]
    ReadersFull(u32),

    /// All named container slots are taken.
    #[error("named container limit reached ({0} slots)")]
    DbsFull(u32),

    /// A write was attempted through a read-only transaction.
    #[error("permission denied: read-only transaction")]
    ReadOnly,

    /// The operation is not valid for this container.
    #[error("incompatible operation: {0}")]
    Incompatible(&'static str),

    /// The container id is not (or no longer) valid.
    #[error("bad container id {0}")]
    BadContainer(u32),

    /// The cursor's transaction has ended.
    #[error("cursor invalidated by end of transaction")]
    CursorInvalidated,

    /// The environment is closed.
    #[error("environment is closed")]
    Closed,
}

impl EngineError {
    /// Returns true for a lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
