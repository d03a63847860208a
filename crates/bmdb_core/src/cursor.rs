//! Ordered iteration over one bucket.

use crate::closer::Closable;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Tx;
use bmdb_engine::{CursorOp, EngineCursor};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Key/value pair returned by cursor moves.
pub type Entry = (Vec<u8>, Vec<u8>);

/// Holds the engine cursor until the cursor is closed, either by its owner or
/// by the transaction ending.
pub(crate) struct CursorSlot {
    engine: Mutex<Option<Box<dyn EngineCursor>>>,
}

impl CursorSlot {
    pub(crate) fn new(cursor: Box<dyn EngineCursor>) -> Self {
        Self {
            engine: Mutex::new(Some(cursor)),
        }
    }
}

impl Closable for CursorSlot {
    fn is_closed(&self) -> bool {
        self.engine.lock().is_none()
    }

    fn close(&self) -> bool {
        self.engine.lock().take().is_some()
    }
}

/// A cursor over the keys of one bucket, in ascending byte order.
///
/// Each move returns `Ok(Some((key, value)))`, or `Ok(None)` when there is no
/// entry in that direction. An unpositioned `next` starts at the first key
/// and an unpositioned `prev` at the last one.
///
/// A cursor is only valid while its transaction is open. Cursors of
/// read-only transactions are closed when the transaction ends; dropping a
/// cursor closes it.
pub struct Cursor<'tx> {
    tx: &'tx Tx,
    slot: Arc<CursorSlot>,
    registered: Option<u64>,
}

impl<'tx> Cursor<'tx> {
    pub(crate) fn new(tx: &'tx Tx, slot: Arc<CursorSlot>, registered: Option<u64>) -> Self {
        Self {
            tx,
            slot,
            registered,
        }
    }

    /// Moves to the first entry.
    pub fn first(&mut self) -> CoreResult<Option<Entry>> {
        self.step(CursorOp::First)
    }

    /// Moves to the last entry.
    pub fn last(&mut self) -> CoreResult<Option<Entry>> {
        self.step(CursorOp::Last)
    }

    /// Moves to the next entry.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> CoreResult<Option<Entry>> {
        self.step(CursorOp::Next)
    }

    /// Moves to the previous entry.
    pub fn prev(&mut self) -> CoreResult<Option<Entry>> {
        self.step(CursorOp::Prev)
    }

    /// Returns true once the cursor is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    /// Returns the transaction this cursor belongs to.
    #[must_use]
    pub fn tx(&self) -> &'tx Tx {
        self.tx
    }

    /// Closes the cursor.
    ///
    /// # Errors
    ///
    /// Returns `CursorClosed` if the cursor was already closed.
    pub fn close(&mut self) -> CoreResult<()> {
        let closed = self.slot.close();
        if let Some(id) = self.registered.take() {
            self.tx.unregister_cursor(id);
        }
        if closed {
            Ok(())
        } else {
            Err(CoreError::CursorClosed)
        }
    }

    fn step(&mut self, op: CursorOp) -> CoreResult<Option<Entry>> {
        if self.tx.is_done() {
            return Err(CoreError::TxDone);
        }
        let mut engine = self.slot.engine.lock();
        let cursor = engine.as_mut().ok_or(CoreError::CursorClosed)?;
        Ok(cursor.get(op)?)
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("tx", &self.tx.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
