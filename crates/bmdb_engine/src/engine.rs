//! Storage engine contract.
//!
//! The handle layer consumes an engine only through these three traits. An
//! engine owns durability, isolation and page management; the handle layer
//! owns resource lifecycle.

use crate::error::EngineResult;
use bitflags::bitflags;
use std::fmt;
use std::path::Path;

/// Opaque identifier of a named container inside an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub u32);

impl ContainerId {
    /// The unnamed root container. Its keys are the names of all named
    /// containers; it cannot be written directly.
    pub const ROOT: ContainerId = ContainerId(0);

    /// Creates a container ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dbi:{}", self.0)
    }
}

/// Cursor positioning operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorOp {
    /// Position at the first key.
    First,
    /// Position at the last key.
    Last,
    /// Advance one key; an unpositioned cursor behaves like `First`.
    Next,
    /// Step back one key; an unpositioned cursor behaves like `Last`.
    Prev,
}

bitflags! {
    /// Flags accepted by [`EngineTxn::put`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PutFlags: u32 {
        /// Fail with `KeyExists` instead of overwriting.
        const NO_OVERWRITE = 0x10;
    }
}

/// Environment-wide figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvInfo {
    /// Configured map size in bytes.
    pub map_size: u64,
    /// Bytes currently occupied by the committed snapshot.
    pub used_bytes: u64,
    /// Configured reader slots.
    pub max_readers: u32,
    /// Reader slots in use.
    pub readers_in_use: u32,
    /// Configured named container slots.
    pub max_dbs: u32,
    /// ID of the last committed write transaction.
    pub last_txid: u64,
}

/// Per-container figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStat {
    /// Number of key/value pairs.
    pub entries: u64,
    /// Sum of key and value lengths.
    pub payload_bytes: u64,
}

/// An opened environment.
///
/// # Invariants
///
/// - At most one read-write transaction is live at a time; `begin_txn(false)`
///   waits for the writer slot.
/// - Read-only transactions see the snapshot committed when they began.
/// - `close` fails with `Closed` when already closed; transactions begun
///   afterwards fail with `Closed`.
pub trait Engine: Send + Sync + fmt::Debug {
    /// Returns the environment directory.
    fn path(&self) -> &Path;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `ReadersFull`, or an engine-specific error.
    fn begin_txn(&self, read_only: bool) -> EngineResult<Box<dyn EngineTxn>>;

    /// Closes the environment and wakes any writer waiting for the slot.
    ///
    /// # Errors
    ///
    /// Returns `Closed` when called a second time.
    fn close(&self) -> EngineResult<()>;

    /// Returns true once `close` has run.
    fn is_closed(&self) -> bool;

    /// Returns environment-wide figures.
    fn info(&self) -> EnvInfo;
}

/// A live engine transaction.
///
/// `commit` and `abort` consume the transaction. A failed commit releases
/// every engine-side resource the transaction held, exactly as `abort` would;
/// callers never get a second attempt.
pub trait EngineTxn: Send {
    /// Returns the transaction ID.
    fn id(&self) -> u64;

    /// Returns true for read-only transactions.
    fn is_read_only(&self) -> bool;

    /// Opens a named container, or the root container when `name` is `None`.
    ///
    /// With `create` set, a missing container is created (write transactions
    /// only). Without it, a missing container yields `NotFound`.
    fn open_container(&mut self, name: Option<&str>, create: bool) -> EngineResult<ContainerId>;

    /// Empties a container, or removes it from the environment when `delete`
    /// is set. A removed container's ID is invalid afterwards.
    fn drop_container(&mut self, id: ContainerId, delete: bool) -> EngineResult<()>;

    /// Returns the value stored under `key`, or `None`.
    fn get(&self, id: ContainerId, key: &[u8]) -> EngineResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`.
    fn put(&mut self, id: ContainerId, key: &[u8], value: &[u8], flags: PutFlags)
        -> EngineResult<()>;

    /// Removes `key`. Fails with `NotFound` when it is absent.
    fn delete(&mut self, id: ContainerId, key: &[u8]) -> EngineResult<()>;

    /// Returns container figures.
    fn stat(&self, id: ContainerId) -> EngineResult<ContainerStat>;

    /// Opens a cursor over one container.
    fn open_cursor(&self, id: ContainerId) -> EngineResult<Box<dyn EngineCursor>>;

    /// Commits the transaction.
    fn commit(self: Box<Self>) -> EngineResult<()>;

    /// Aborts the transaction, discarding its writes.
    fn abort(self: Box<Self>);
}

/// A positional iterator over one container.
///
/// Dropping the cursor closes it.
pub trait EngineCursor: Send {
    /// Moves the cursor and returns the pair at the new position, or `None`
    /// when there is no entry in that direction.
    ///
    /// # Errors
    ///
    /// Returns `CursorInvalidated` once the owning transaction has ended.
    fn get(&mut self, op: CursorOp) -> EngineResult<Option<(Vec<u8>, Vec<u8>)>>;
}
