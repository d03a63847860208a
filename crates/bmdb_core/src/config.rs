//! Database configuration.

use bmdb_engine::{EnvFlags, EnvOptions};

/// Smallest map size a database is opened with.
pub const MIN_MAP_SIZE: u64 = 64 * 1024;

/// Map size used when none is configured.
pub const DEFAULT_MAP_SIZE: u64 = 1024 * 1024;

/// Named bucket limit used when none is configured.
pub const DEFAULT_MAX_BUCKETS: u32 = 16;

/// Flags added by [`Options::no_sync`].
pub const NO_SYNC_FLAGS: EnvFlags = EnvFlags::NO_SYNC
    .union(EnvFlags::NO_META_SYNC)
    .union(EnvFlags::WRITE_MAP)
    .union(EnvFlags::MAP_ASYNC);

/// Configuration for opening a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Upper bound on the size of the stored data.
    pub map_size: u64,

    /// Maximum concurrent read-only transactions (0 = engine default).
    pub max_readers: u32,

    /// Maximum number of named buckets.
    pub max_buckets: u32,

    /// Trade durability for speed by skipping syncs on commit.
    pub no_sync: bool,

    /// Raw engine flags.
    pub flags: EnvFlags,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
            max_readers: 126,
            max_buckets: DEFAULT_MAX_BUCKETS,
            no_sync: false,
            flags: EnvFlags::empty(),
        }
    }
}

impl Options {
    /// Creates a new configuration with default values.
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

    /// Sets the reader limit.
    #[must_use]
    pub const fn max_readers(mut self, readers: u32) -> Self {
        self.max_readers = readers;
        self
    }

    /// Sets the named bucket limit.
    #[must_use]
    pub const fn max_buckets(mut self, buckets: u32) -> Self {
        self.max_buckets = buckets;
        self
    }

    /// Sets whether commits skip syncing.
    #[must_use]
    pub const fn no_sync(mut self, value: bool) -> Self {
        self.no_sync = value;
        self
    }

    /// Sets raw engine flags.
    #[must_use]
    pub const fn flags(mut self, flags: EnvFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Applies the lower bounds: the map size is raised to [`MIN_MAP_SIZE`]
    /// and the bucket limit to 1.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.map_size = self.map_size.max(MIN_MAP_SIZE);
        self.max_buckets = self.max_buckets.max(1);
        self
    }

    /// Resolves these options into engine options.
    #[must_use]
    pub fn resolve(&self) -> EnvOptions {
        let normalized = self.clone().normalized();
        let mut flags = normalized.flags;
        if normalized.no_sync {
            flags |= NO_SYNC_FLAGS;
        }

        let mut env = EnvOptions::new()
            .map_size(normalized.map_size)
            .max_dbs(normalized.max_buckets)
            .flags(flags);
        if normalized.max_readers > 0 {
            env = env.max_readers(normalized.max_readers);
        }
        env
    }
}
