//! Database handles.

use crate::closer::Closable;
use crate::config::Options;
use crate::error::{CoreError, CoreResult};
use crate::registry::Registry;
use crate::transaction::{Tx, TxShared};
use crate::types::{DbId, TxId};
use bmdb_engine::{Engine, EngineError, EnvFlags, EnvInfo, Environment};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// The main database handle.
///
/// `Database` owns one opened environment. It tracks the transactions
/// currently active against it so that closing the handle can abort them
/// first.
///
/// # Opening a Database
///
/// ```rust,no_run
/// use bmdb_core::{Database, Options};
///
/// let db = Database::open("my_env", 0o644, Options::default().max_buckets(4))?;
///
/// db.update(|tx| {
///     tx.create_bucket_if_not_exists("users")?.put(b"alice", b"1")
/// })?;
///
/// let value = db.view(|tx| Ok::<_, bmdb_core::CoreError>(tx.bucket("users").and_then(|b| b.get(b"alice"))))?;
/// assert_eq!(value.as_deref(), Some(&b"1"[..]));
///
/// db.close()?;
/// # Ok::<(), bmdb_core::CoreError>(())
/// ```
///
/// Dropping an open handle closes it.
pub struct Database {
    inner: Arc<DbInner>,
}

pub(crate) struct DbInner {
    id: DbId,
    path: PathBuf,
    options: Options,
    engine: Arc<dyn Engine>,
    registry: Arc<Registry>,
    next_tx: AtomicU64,
    state: Mutex<DbState>,
}

struct DbState {
    closed: bool,
    /// Active transactions. The caller owns them; the handle only keeps a
    /// way to force them closed.
    txns: HashMap<TxId, Weak<TxShared>>,
}

impl Database {
    /// Opens or creates the environment in directory `path` and registers the
    /// handle in the process-wide registry.
    ///
    /// `mode` is the permission set for files the environment creates.
    ///
    /// # Errors
    ///
    /// Returns `Init` if the environment cannot be opened, or `ShuttingDown`
    /// if the registry has been drained.
    pub fn open(path: impl AsRef<Path>, mode: u32, options: Options) -> CoreResult<Self> {
        Self::open_with_registry(path, mode, options, &Registry::global())
    }

    /// Opens a database registered in `registry`.
    ///
    /// # Errors
    ///
    /// Same as [`Database::open`].
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        mode: u32,
        options: Options,
        registry: &Arc<Registry>,
    ) -> CoreResult<Self> {
        let path = path.as_ref();
        let options = options.normalized();
        let env_options = options.resolve().mode(mode);

        if !env_options.flags.contains(EnvFlags::READ_ONLY) {
            fs::create_dir_all(path).map_err(|e| CoreError::init(path, EngineError::Io(e)))?;
        }
        let env = Environment::open(path, env_options).map_err(|e| CoreError::init(path, e))?;
        Self::open_with_engine(Arc::new(env), options, registry)
    }

    /// Wraps an already opened engine.
    ///
    /// If the handle cannot be registered, the engine is closed before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` if the registry has been drained.
    pub fn open_with_engine(
        engine: Arc<dyn Engine>,
        options: Options,
        registry: &Arc<Registry>,
    ) -> CoreResult<Self> {
        let id = registry.allocate_id();
        let inner = Arc::new(DbInner {
            id,
            path: engine.path().to_path_buf(),
            options: options.normalized(),
            engine,
            registry: Arc::clone(registry),
            next_tx: AtomicU64::new(1),
            state: Mutex::new(DbState {
                closed: false,
                txns: HashMap::new(),
            }),
        });

        if let Err(e) = registry.register(id, &inner) {
            inner.state.lock().closed = true;
            if let Err(close_err) = inner.engine.close() {
                warn!(db = %id, error = %close_err, "failed to close environment after refused open");
            }
            return Err(e);
        }

        debug!(db = %id, path = %inner.path.display(), "database opened");
        Ok(Self { inner })
    }

    /// Closes the handle, aborting every transaction still active against
    /// it, and closes the environment.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` on every call after the first, or the engine's
    /// close error.
    pub fn close(&self) -> CoreResult<()> {
        self.inner.registry.close_handle(self.inner.id, &self.inner)
    }

    /// Begins a transaction.
    ///
    /// A writable begin waits while another write transaction is active.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseNotOpen` if the handle is closed, including when it
    /// closes while the begin waits, or an engine error.
    pub fn begin(&self, writable: bool) -> CoreResult<Tx> {
        let inner = &self.inner;
        inner.ensure_open()?;

        let txn = match inner.engine.begin_txn(!writable) {
            Ok(txn) => txn,
            Err(_) if inner.is_closed() => return Err(CoreError::DatabaseNotOpen),
            Err(e) => return Err(e.into()),
        };

        let mut state = inner.state.lock();
        if state.closed {
            drop(state);
            txn.abort();
            return Err(CoreError::DatabaseNotOpen);
        }
        let id = TxId::new(inner.next_tx.fetch_add(1, Ordering::SeqCst));
        let shared = Arc::new(TxShared::new(id, writable, txn));
        state.txns.insert(id, Arc::downgrade(&shared));
        drop(state);

        debug!(db = %inner.id, tx = %id, writable, "transaction started");
        Ok(Tx::new(shared, Arc::downgrade(inner)))
    }

    /// Runs `f` inside a read-write transaction.
    ///
    /// The transaction commits if `f` succeeds and rolls back if it fails or
    /// panics; a panic is resumed after the rollback. `f` cannot commit or
    /// roll back the transaction itself.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, the begin error, or the commit error.
    pub fn update<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Tx) -> Result<T, E>,
        E: From<CoreError>,
    {
        self.managed(true, f)
    }

    /// Runs `f` inside a read-only transaction.
    ///
    /// # Errors
    ///
    /// Same as [`Database::update`].
    pub fn view<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Tx) -> Result<T, E>,
        E: From<CoreError>,
    {
        self.managed(false, f)
    }

    fn managed<F, T, E>(&self, writable: bool, f: F) -> Result<T, E>
    where
        F: FnOnce(&Tx) -> Result<T, E>,
        E: From<CoreError>,
    {
        let tx = self.begin(writable)?;
        tx.set_managed(true);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&tx)));
        tx.set_managed(false);

        match outcome {
            Ok(Ok(value)) => {
                tx.commit()?;
                Ok(value)
            }
            Ok(Err(e)) => {
                rollback_quietly(&tx);
                Err(e)
            }
            Err(payload) => {
                rollback_quietly(&tx);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Returns the environment directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns the resolved options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Returns the handle ID.
    #[must_use]
    pub fn id(&self) -> DbId {
        self.inner.id
    }

    /// Returns true once the handle is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns the number of transactions currently active.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.inner
            .state
            .lock()
            .txns
            .values()
            .filter(|tx| tx.strong_count() > 0)
            .count()
    }

    /// Returns environment figures.
    #[must_use]
    pub fn info(&self) -> EnvInfo {
        self.inner.engine.info()
    }
}

fn rollback_quietly(tx: &Tx) {
    match tx.rollback() {
        Ok(()) | Err(CoreError::TxDone) => {}
        Err(e) => warn!(tx = %tx.id(), error = %e, "rollback failed"),
    }
}

impl DbInner {
    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::DatabaseNotOpen);
        }
        Ok(())
    }

    pub(crate) fn unregister_tx(&self, id: TxId) {
        self.state.lock().txns.remove(&id);
    }

    /// Marks the handle closed, force-closes its transactions and closes the
    /// environment. Callers hold the registry lock.
    pub(crate) fn shutdown(&self) -> CoreResult<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(CoreError::AlreadyClosed);
            }
            state.closed = true;

            let forced = state
                .txns
                .drain()
                .filter_map(|(_, tx)| tx.upgrade())
                .filter(|tx| tx.close())
                .count();
            if forced > 0 {
                warn!(db = %self.id, forced, "closed database with active transactions");
            }
        }

        self.engine.close()?;
        debug!(db = %self.id, path = %self.path.display(), "database closed");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
