//! Snapshot engine cursors.

use crate::engine::{CursorOp, EngineCursor};
use crate::error::{EngineError, EngineResult};
use crate::snapshot::Tree;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cursor over one container tree.
///
/// The cursor observes the container as it was when the cursor was opened.
/// Exhausting the cursor in one direction leaves its position unchanged.
pub(crate) struct SnapshotCursor {
    tree: Arc<Tree>,
    position: Option<Vec<u8>>,
    txn_alive: Arc<AtomicBool>,
}

impl SnapshotCursor {
    pub(crate) fn new(tree: Arc<Tree>, txn_alive: Arc<AtomicBool>) -> Self {
        Self {
            tree,
            position: None,
            txn_alive,
        }
    }
}

impl EngineCursor for SnapshotCursor {
    fn get(&mut self, op: CursorOp) -> EngineResult<Option<(Vec<u8>, Vec<u8>)>> {
        if !self.txn_alive.load(Ordering::SeqCst) {
            return Err(EngineError::CursorInvalidated);
        }

        let tree = &self.tree;
        let found = match (op, self.position.as_deref()) {
            (CursorOp::First, _) | (CursorOp::Next, None) => tree.iter().next(),
            (CursorOp::Last, _) | (CursorOp::Prev, None) => tree.iter().next_back(),
            (CursorOp::Next, Some(at)) => tree
                .range::<[u8], _>((Bound::Excluded(at), Bound::Unbounded))
                .next(),
            (CursorOp::Prev, Some(at)) => tree
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(at)))
                .next_back(),
        }
        .map(|(k, v)| (k.clone(), v.clone()));

        if let Some((key, _)) = &found {
            self.position = Some(key.clone());
        }
        Ok(found)
    }
}
