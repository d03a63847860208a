//! Snapshot engine transactions.

use crate::cursor::SnapshotCursor;
use crate::engine::{ContainerId, ContainerStat, EngineCursor, EngineTxn, PutFlags};
use crate::env::EnvInner;
use crate::error::{EngineError, EngineResult};
use crate::snapshot::{payload_of, Snapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Holds a reader or writer slot and gives it back on drop.
pub(crate) struct SlotGuard {
    env: Arc<EnvInner>,
    writer: bool,
}

impl SlotGuard {
    pub(crate) fn reader(env: Arc<EnvInner>) -> Self {
        Self { env, writer: false }
    }

    pub(crate) fn writer(env: Arc<EnvInner>) -> Self {
        Self { env, writer: true }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.writer {
            self.env.release_writer();
        } else {
            self.env.release_reader();
        }
    }
}

/// Cleared when the transaction ends; cursors check it.
pub(crate) struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Drop for Liveness {
    fn drop(&mut self) {
        self.end();
    }
}

enum View {
    /// Shared committed snapshot.
    Read(Arc<Snapshot>),
    /// Private working copy.
    Write(Snapshot),
}

/// A transaction against an [`crate::Environment`].
///
/// Readers pin the snapshot committed when they began. Writers work on a
/// private copy that replaces the committed snapshot on commit. Either way the
/// slot is released when the transaction is dropped, which is also how a
/// failed commit gives back the writer slot.
pub(crate) struct SnapshotTxn {
    id: u64,
    view: View,
    alive: Liveness,
    guard: SlotGuard,
}

impl SnapshotTxn {
    pub(crate) fn reader(snapshot: Arc<Snapshot>, guard: SlotGuard) -> Self {
        Self {
            id: snapshot.txid,
            view: View::Read(snapshot),
            alive: Liveness::new(),
            guard,
        }
    }

    pub(crate) fn writer(id: u64, snapshot: Snapshot, guard: SlotGuard) -> Self {
        Self {
            id,
            view: View::Write(snapshot),
            alive: Liveness::new(),
            guard,
        }
    }

    fn snapshot(&self) -> &Snapshot {
        match &self.view {
            View::Read(snapshot) => snapshot,
            View::Write(snapshot) => snapshot,
        }
    }

    fn snapshot_mut(&mut self) -> EngineResult<&mut Snapshot> {
        match &mut self.view {
            View::Read(_) => Err(EngineError::ReadOnly),
            View::Write(snapshot) => Ok(snapshot),
        }
    }
}

impl EngineTxn for SnapshotTxn {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_read_only(&self) -> bool {
        matches!(self.view, View::Read(_))
    }

    fn open_container(&mut self, name: Option<&str>, create: bool) -> EngineResult<ContainerId> {
        let Some(name) = name else {
            return Ok(ContainerId::ROOT);
        };
        if let Some(id) = self.snapshot().find(name) {
            return Ok(id);
        }
        if !create {
            return Err(EngineError::NotFound);
        }

        let max_dbs = self.guard.env.options.max_dbs;
        let snapshot = self.snapshot_mut()?;
        if snapshot.container_count() >= max_dbs as usize {
            return Err(EngineError::DbsFull(max_dbs));
        }
        Ok(snapshot.create(name))
    }

    fn drop_container(&mut self, id: ContainerId, delete: bool) -> EngineResult<()> {
        let snapshot = self.snapshot_mut()?;
        if id == ContainerId::ROOT {
            return Err(EngineError::Incompatible("the root container cannot be dropped"));
        }
        if delete {
            return snapshot.remove(id);
        }

        let freed = payload_of(&*snapshot.tree(id)?);
        snapshot.tree_mut(id)?.clear();
        snapshot.used_bytes -= freed;
        Ok(())
    }

    fn get(&self, id: ContainerId, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let tree = self.snapshot().tree(id)?;
        Ok(tree.get(key).cloned())
    }

    fn put(
        &mut self,
        id: ContainerId,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> EngineResult<()> {
        if key.is_empty() {
            return Err(EngineError::Incompatible("keys must not be empty"));
        }
        let map_size = self.guard.env.options.map_size;
        let snapshot = self.snapshot_mut()?;

        let previous = snapshot.tree(id)?.get(key).map(Vec::len);
        if previous.is_some() && flags.contains(PutFlags::NO_OVERWRITE) {
            return Err(EngineError::KeyExists);
        }

        let released = previous.map_or(0, |len| (key.len() + len) as u64);
        let used = snapshot.used_bytes - released + (key.len() + value.len()) as u64;
        if used > map_size {
            return Err(EngineError::MapFull {
                used,
                limit: map_size,
            });
        }

        snapshot.tree_mut(id)?.insert(key.to_vec(), value.to_vec());
        snapshot.used_bytes = used;
        Ok(())
    }

    fn delete(&mut self, id: ContainerId, key: &[u8]) -> EngineResult<()> {
        let snapshot = self.snapshot_mut()?;
        let value = snapshot
            .tree_mut(id)?
            .remove(key)
            .ok_or(EngineError::NotFound)?;
        snapshot.used_bytes -= (key.len() + value.len()) as u64;
        Ok(())
    }

    fn stat(&self, id: ContainerId) -> EngineResult<ContainerStat> {
        let tree = self.snapshot().tree(id)?;
        Ok(ContainerStat {
            entries: tree.len() as u64,
            payload_bytes: payload_of(&tree),
        })
    }

    fn open_cursor(&self, id: ContainerId) -> EngineResult<Box<dyn EngineCursor>> {
        let tree = self.snapshot().tree(id)?;
        Ok(Box::new(SnapshotCursor::new(tree, Arc::clone(&self.alive.0))))
    }

    fn commit(self: Box<Self>) -> EngineResult<()> {
        let SnapshotTxn {
            id,
            view,
            alive,
            guard,
        } = *self;
        alive.end();

        let result = match view {
            View::Read(_) => Ok(()),
            View::Write(snapshot) => guard.env.publish(snapshot, id),
        };
        drop(guard);
        result
    }

    fn abort(self: Box<Self>) {
        self.alive.end();
    }
}
