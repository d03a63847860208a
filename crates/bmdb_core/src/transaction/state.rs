//! Transaction state shared between a [`super::Tx`] and its database handle.

use crate::closer::Closable;
use crate::cursor::CursorSlot;
use crate::types::TxId;
use bmdb_engine::EngineTxn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback run after a successful commit.
pub(crate) type CommitHandler = Box<dyn FnOnce() + Send>;

/// State reachable from both the caller's `Tx` and the handle's
/// active-transaction set.
///
/// The handle keeps only a `Weak` reference; the caller owns the transaction.
pub(crate) struct TxShared {
    pub(crate) id: TxId,
    pub(crate) writable: bool,
    pub(crate) state: Mutex<TxState>,
}

/// Mutable transaction state.
///
/// The engine transaction is present exactly while the transaction is open;
/// taking it out is the one terminal transition.
pub(crate) struct TxState {
    pub(crate) txn: Option<Box<dyn EngineTxn>>,
    pub(crate) managed: bool,
    cursors: HashMap<u64, Weak<CursorSlot>>,
    next_cursor: u64,
    pub(crate) commit_handlers: Vec<CommitHandler>,
}

impl TxShared {
    pub(crate) fn new(id: TxId, writable: bool, txn: Box<dyn EngineTxn>) -> Self {
        Self {
            id,
            writable,
            state: Mutex::new(TxState {
                txn: Some(txn),
                managed: false,
                cursors: HashMap::new(),
                next_cursor: 0,
                commit_handlers: Vec::new(),
            }),
        }
    }
}

impl TxState {
    /// Returns true once the transaction was committed, rolled back or
    /// force-closed.
    pub(crate) fn is_done(&self) -> bool {
        self.txn.is_none()
    }

    /// Tracks a cursor so that ending the transaction closes it.
    pub(crate) fn register_cursor(&mut self, slot: &Arc<CursorSlot>) -> u64 {
        let id = self.next_cursor;
        self.next_cursor += 1;
        self.cursors.insert(id, Arc::downgrade(slot));
        id
    }

    pub(crate) fn unregister_cursor(&mut self, id: u64) {
        self.cursors.remove(&id);
    }

    /// Number of tracked cursors that are still open.
    pub(crate) fn active_cursors(&self) -> usize {
        self.cursors
            .values()
            .filter_map(Weak::upgrade)
            .filter(|slot| !slot.is_closed())
            .count()
    }

    /// Closes and forgets every tracked cursor. Returns how many were open.
    pub(crate) fn close_cursors(&mut self) -> usize {
        self.cursors
            .drain()
            .filter_map(|(_, slot)| slot.upgrade())
            .filter(|slot| slot.close())
            .count()
    }
}

impl Closable for TxShared {
    fn is_closed(&self) -> bool {
        self.state.lock().is_done()
    }

    /// Aborts the transaction on behalf of its handle.
    ///
    /// Never unregisters from the handle: the handle holds its own lock while
    /// force-closing and clears its set afterwards.
    fn close(&self) -> bool {
        let mut state = self.state.lock();
        let Some(txn) = state.txn.take() else {
            return false;
        };
        let cursors = state.close_cursors();
        state.commit_handlers.clear();
        txn.abort();

        debug!(tx = %self.id, writable = self.writable, cursors, "transaction force-closed");
        true
    }
}
