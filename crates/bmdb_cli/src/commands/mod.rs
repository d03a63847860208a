//! CLI command implementations.
//!
//! Each command returns plain data; `main` decides how to print it.

pub mod read;
pub mod stat;
pub mod write;

use thiserror::Error;

/// Errors reported by commands beyond those of the database itself.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The named bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The key does not exist in the bucket.
    #[error("key not found: {bucket}/{key}")]
    KeyNotFound {
        /// Bucket searched.
        bucket: String,
        /// Key as given on the command line.
        key: String,
    },

    /// A command-line value could not be decoded.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Database error.
    #[error(transparent)]
    Core(#[from] bmdb_core::CoreError),
}

/// Result type for commands.
pub type CommandResult<T> = Result<T, CommandError>;
