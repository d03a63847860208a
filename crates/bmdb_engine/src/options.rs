//! Environment options and flags.

use crate::error::{EngineError, EngineResult};
use bitflags::bitflags;

bitflags! {
    /// Environment flags.
    ///
    /// Values mirror the classic memory-mapped engine flag bits so that
    /// options written for such engines keep their meaning.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnvFlags: u32 {
        /// Use a writeable memory map.
        const WRITE_MAP = 0x80000;
        /// Don't fsync metadata after commit.
        const NO_META_SYNC = 0x40000;
        /// Don't fsync after commit.
        const NO_SYNC = 0x10000;
        /// Flush the map asynchronously (only meaningful with `WRITE_MAP`).
        const MAP_ASYNC = 0x100000;
        /// Open the environment read-only.
        const READ_ONLY = 0x20000;
    }
}

/// Options used to open an [`crate::Environment`].
#[derive(Debug, Clone)]
pub struct EnvOptions {
    /// Upper bound on the bytes the committed snapshot may occupy.
    pub map_size: u64,

    /// Maximum number of concurrently live read-only transactions.
    pub max_readers: u32,

    /// Maximum number of named containers.
    pub max_dbs: u32,

    /// Environment flags.
    pub flags: EnvFlags,

    /// Unix permission bits for files created in the environment directory.
    pub mode: u32,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            map_size: 10 * 1024 * 1024, // 10 MB
            max_readers: 126,
            max_dbs: 0,
            flags: EnvFlags::empty(),
            mode: 0o644,
        }
    }
}

impl EnvOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the map size.
    #[must_use]
    pub const fn map_size(mut self, size: u64) -> Self {
        self.map_size = size;
        self
    }

    /// Sets the reader slot count.
    #[must_use]
    pub const fn max_readers(mut self, readers: u32) -> Self {
        self.max_readers = readers;
        self
    }

    /// Sets the named container limit.
    #[must_use]
    pub const fn max_dbs(mut self, dbs: u32) -> Self {
        self.max_dbs = dbs;
        self
    }

    /// Sets the environment flags.
    #[must_use]
    pub const fn flags(mut self, flags: EnvFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the file mode.
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Returns true when commits skip `fsync`.
    #[must_use]
    pub fn skips_sync(&self) -> bool {
        self.flags.contains(EnvFlags::NO_SYNC)
    }

    /// Rejects options the engine cannot honour.
    pub(crate) fn validate(&self) -> EngineResult<()> {
        if self.map_size == 0 {
            return Err(EngineError::InvalidOption("map size must be non-zero".into()));
        }
        if self.max_readers == 0 {
            return Err(EngineError::InvalidOption(
                "at least one reader slot is required".into(),
            ));
        }
        if self.flags.contains(EnvFlags::MAP_ASYNC) && !self.flags.contains(EnvFlags::WRITE_MAP) {
            return Err(EngineError::InvalidOption(
                "MAP_ASYNC requires WRITE_MAP".into(),
            ));
        }
        Ok(())
    }
}
