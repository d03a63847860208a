//! Registry of open database handles.
//!
//! Every handle registers itself on open and unregisters on close, so that a
//! single [`Registry::drain_all`] can close whatever the process still has
//! open. Lock order is registry, then handle, then transaction.

use crate::database::DbInner;
use crate::error::{CoreError, CoreResult};
use crate::types::DbId;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{info, warn};

type ExitListener = Box<dyn FnOnce() + Send>;

/// Tracks open database handles.
///
/// A process normally uses [`Registry::global`]; tests and embedders that
/// need isolation create their own and open handles with
/// [`crate::Database::open_with_registry`].
pub struct Registry {
    state: Mutex<RegistryState>,
    /// Held for the whole drain, so a second drain returns only after the
    /// first one has run its listeners. Re-entrant so that a listener may
    /// itself call `drain_all`.
    drain_gate: ReentrantMutex<()>,
    next_id: AtomicU64,
}

struct RegistryState {
    drained: bool,
    handles: BTreeMap<DbId, Weak<DbInner>>,
    listeners: Vec<ExitListener>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                drained: false,
                handles: BTreeMap::new(),
                listeners: Vec::new(),
            }),
            drain_gate: ReentrantMutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the process-wide registry.
    pub fn global() -> Arc<Registry> {
        static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::new())))
    }

    /// Returns the number of registered handles that are still alive.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state
            .lock()
            .handles
            .values()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }

    /// Returns true once [`Registry::drain_all`] has run.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.state.lock().drained
    }

    /// Adds a listener that runs after the registry is drained.
    ///
    /// Listeners run in registration order. A listener added after the drain
    /// runs immediately.
    pub fn on_exit<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.drained {
            drop(state);
            listener();
            return;
        }
        state.listeners.push(Box::new(listener));
    }

    /// Closes every registered handle, newest first, then runs the exit
    /// listeners. Returns the number of handles this call closed.
    ///
    /// Only the first call does any work; the registry refuses new handles
    /// afterwards. A call made from an exit listener returns 0 at once.
    pub fn drain_all(&self) -> usize {
        let _gate = self.drain_gate.lock();

        let (closed, listeners) = {
            let mut state = self.state.lock();
            if state.drained {
                return 0;
            }
            state.drained = true;

            let mut closed = 0;
            let handles = std::mem::take(&mut state.handles);
            for (id, handle) in handles.into_iter().rev() {
                let Some(handle) = handle.upgrade() else {
                    continue;
                };
                match handle.shutdown() {
                    Ok(()) => closed += 1,
                    Err(CoreError::AlreadyClosed) => {}
                    Err(e) => {
                        closed += 1;
                        warn!(db = %id, error = %e, "error closing database during drain");
                    }
                }
            }
            (closed, std::mem::take(&mut state.listeners))
        };

        info!(closed, listeners = listeners.len(), "registry drained");
        for listener in listeners {
            listener();
        }
        closed
    }

    pub(crate) fn allocate_id(&self) -> DbId {
        DbId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn register(&self, id: DbId, handle: &Arc<DbInner>) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.drained {
            return Err(CoreError::ShuttingDown);
        }
        state.handles.insert(id, Arc::downgrade(handle));
        Ok(())
    }

    /// Shuts a handle down and forgets it, under the registry lock.
    pub(crate) fn close_handle(&self, id: DbId, handle: &DbInner) -> CoreResult<()> {
        let mut state = self.state.lock();
        let result = handle.shutdown();
        state.handles.remove(&id);
        result
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Registry")
            .field("handles", &state.handles.len())
            .field("drained", &state.drained)
            .finish()
    }
}
