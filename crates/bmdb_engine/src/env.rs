//! The bundled snapshot engine.
//!
//! Directory layout:
//!
//! ```text
//! <env_path>/
//! ├─ data.mdb       # Last committed snapshot
//! └─ lock.mdb       # Advisory lock, one environment per directory
//! ```

use crate::engine::{Engine, EngineTxn, EnvInfo};
use crate::error::{EngineError, EngineResult};
use crate::options::{EnvFlags, EnvOptions};
use crate::snapshot::Snapshot;
use crate::txn::{SlotGuard, SnapshotTxn};
use fs2::FileExt;
use parking_lot::{Condvar, Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Snapshot file name.
pub const DATA_FILE: &str = "data.mdb";
/// Lock file name.
pub const LOCK_FILE: &str = "lock.mdb";
/// Temporary file for atomic snapshot writes.
const DATA_TEMP: &str = "data.mdb.tmp";

/// An opened environment.
///
/// Cloning yields another handle to the same environment.
///
/// # Example
///
/// ```no_run
/// use bmdb_engine::{Engine, EnvOptions, Environment, PutFlags};
/// use std::path::Path;
///
/// let env = Environment::open(Path::new("my_env"), EnvOptions::new().max_dbs(4)).unwrap();
/// let mut txn = env.begin_txn(false).unwrap();
/// let id = txn.open_container(Some("users"), true).unwrap();
/// txn.put(id, b"alice", b"1", PutFlags::empty()).unwrap();
/// txn.commit().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

#[derive(Debug)]
pub(crate) struct EnvInner {
    path: PathBuf,
    pub(crate) options: EnvOptions,
    /// Last committed snapshot.
    current: RwLock<Arc<Snapshot>>,
    /// True while a write transaction holds the writer slot.
    writer: Mutex<bool>,
    writer_released: Condvar,
    readers: AtomicU32,
    next_txid: AtomicU64,
    closed: AtomicBool,
    /// Lock file handle; dropping it releases the directory lock.
    lock_file: Mutex<Option<File>>,
}

impl Environment {
    /// Opens or creates the environment in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An option is invalid (`InvalidOption`)
    /// - Another environment holds the directory (`Locked`)
    /// - The snapshot file is corrupted or exceeds the map size
    /// - I/O errors occur
    pub fn open(path: &Path, options: EnvOptions) -> EngineResult<Self> {
        options.validate()?;
        let read_only = options.flags.contains(EnvFlags::READ_ONLY);

        if !read_only {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(EngineError::InvalidOption(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = open_with_mode(&path.join(LOCK_FILE), options.mode, !read_only)?;
        let locked = if read_only {
            FileExt::try_lock_shared(&lock_file)
        } else {
            FileExt::try_lock_exclusive(&lock_file)
        };
        if locked.is_err() {
            return Err(EngineError::Locked {
                path: path.to_path_buf(),
            });
        }

        let snapshot = load_snapshot(&path.join(DATA_FILE))?;
        if snapshot.used_bytes > options.map_size {
            return Err(EngineError::MapFull {
                used: snapshot.used_bytes,
                limit: options.map_size,
            });
        }

        debug!(
            path = %path.display(),
            txid = snapshot.txid,
            containers = snapshot.container_count(),
            "environment opened"
        );

        Ok(Self {
            inner: Arc::new(EnvInner {
                path: path.to_path_buf(),
                next_txid: AtomicU64::new(snapshot.txid + 1),
                current: RwLock::new(Arc::new(snapshot)),
                writer: Mutex::new(false),
                writer_released: Condvar::new(),
                readers: AtomicU32::new(0),
                closed: AtomicBool::new(false),
                lock_file: Mutex::new(Some(lock_file)),
                options,
            }),
        })
    }

    /// Returns the options the environment was opened with.
    #[must_use]
    pub fn options(&self) -> &EnvOptions {
        &self.inner.options
    }
}

impl Engine for Environment {
    fn path(&self) -> &Path {
        &self.inner.path
    }

    fn begin_txn(&self, read_only: bool) -> EngineResult<Box<dyn EngineTxn>> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }

        if read_only {
            let max = inner.options.max_readers;
            inner
                .readers
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < max).then_some(n + 1)
                })
                .map_err(|_| EngineError::ReadersFull(max))?;
            let snapshot = inner.current.read().clone();
            let guard = SlotGuard::reader(Arc::clone(inner));
            return Ok(Box::new(SnapshotTxn::reader(snapshot, guard)));
        }

        if inner.options.flags.contains(EnvFlags::READ_ONLY) {
            return Err(EngineError::ReadOnly);
        }

        {
            let mut active = inner.writer.lock();
            while *active && !inner.closed.load(Ordering::SeqCst) {
                inner.writer_released.wait(&mut active);
            }
            if inner.closed.load(Ordering::SeqCst) {
                return Err(EngineError::Closed);
            }
            *active = true;
        }

        let guard = SlotGuard::writer(Arc::clone(inner));
        let txid = inner.next_txid.fetch_add(1, Ordering::SeqCst);
        let snapshot = Snapshot::clone(&inner.current.read());
        Ok(Box::new(SnapshotTxn::writer(txid, snapshot, guard)))
    }

    fn close(&self) -> EngineResult<()> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }

        // Wake writers parked on the slot so they observe the close.
        {
            let _active = inner.writer.lock();
            inner.writer_released.notify_all();
        }

        if let Some(file) = inner.lock_file.lock().take() {
            let _ = FileExt::unlock(&file);
        }

        debug!(path = %inner.path.display(), "environment closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn info(&self) -> EnvInfo {
        let inner = &self.inner;
        let current = inner.current.read();
        EnvInfo {
            map_size: inner.options.map_size,
            used_bytes: current.used_bytes,
            max_readers: inner.options.max_readers,
            readers_in_use: inner.readers.load(Ordering::SeqCst),
            max_dbs: inner.options.max_dbs,
            last_txid: current.txid,
        }
    }
}

impl EnvInner {
    /// Persists and publishes the snapshot of a committing write transaction.
    pub(crate) fn publish(&self, mut snapshot: Snapshot, txid: u64) -> EngineResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        snapshot.txid = txid;
        self.persist(&snapshot)?;
        *self.current.write() = Arc::new(snapshot);
        Ok(())
    }

    /// Writes the snapshot with the write-then-rename pattern.
    fn persist(&self, snapshot: &Snapshot) -> EngineResult<()> {
        let data_path = self.path.join(DATA_FILE);
        let temp_path = self.path.join(DATA_TEMP);

        let mut file = open_with_mode(&temp_path, self.options.mode, true)?;
        file.set_len(0)?;
        file.write_all(&snapshot.encode())?;
        if !self.options.skips_sync() {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp_path, &data_path)?;

        if !self.options.flags.contains(EnvFlags::NO_META_SYNC) {
            sync_directory(&self.path)?;
        }
        Ok(())
    }

    pub(crate) fn release_reader(&self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn release_writer(&self) {
        let mut active = self.writer.lock();
        *active = false;
        self.writer_released.notify_one();
    }
}

fn load_snapshot(path: &Path) -> EngineResult<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::default());
    }
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.is_empty() {
        return Ok(Snapshot::default());
    }
    Snapshot::decode(&data)
}

fn open_with_mode(path: &Path, mode: u32, create: bool) -> EngineResult<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(create).create(create).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(options.open(path)?)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> EngineResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> EngineResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContainerId, CursorOp, PutFlags};
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn options() -> EnvOptions {
        EnvOptions::new().max_dbs(8).flags(EnvFlags::NO_SYNC)
    }

    #[test]
    fn open_creates_directory_and_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("env");

        let env = Environment::open(&path, options()).unwrap();
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(env.info().last_txid, 0);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _env = Environment::open(dir.path(), options()).unwrap();

        let result = Environment::open(dir.path(), options());
        assert!(matches!(result, Err(EngineError::Locked { .. })));
    }

    #[test]
    fn close_releases_lock() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options()).unwrap();
        env.close().unwrap();

        assert!(matches!(env.close(), Err(EngineError::Closed)));
        assert!(Environment::open(dir.path(), options()).is_ok());
    }

    #[test]
    fn commit_persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let env = Environment::open(dir.path(), options()).unwrap();
            let mut txn = env.begin_txn(false).unwrap();
            let id = txn.open_container(Some("users"), true).unwrap();
            txn.put(id, b"alice", b"1", PutFlags::empty()).unwrap();
            txn.commit().unwrap();
            env.close().unwrap();
        }

        let env = Environment::open(dir.path(), options()).unwrap();
        assert_eq!(env.info().last_txid, 1);
        let mut txn = env.begin_txn(true).unwrap();
        let id = txn.open_container(Some("users"), false).unwrap();
        assert_eq!(txn.get(id, b"alice").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn aborted_writes_are_discarded() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options()).unwrap();

        let mut txn = env.begin_txn(false).unwrap();
        txn.open_container(Some("gone"), true).unwrap();
        txn.abort();

        let mut txn = env.begin_txn(true).unwrap();
        assert!(matches!(
            txn.open_container(Some("gone"), false),
            Err(EngineError::NotFound)
        ));
    }

    #[test]
    fn readers_see_their_snapshot() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options()).unwrap();

        let mut setup = env.begin_txn(false).unwrap();
        let id = setup.open_container(Some("c"), true).unwrap();
        setup.put(id, b"k", b"old", PutFlags::empty()).unwrap();
        setup.commit().unwrap();

        let before = env.begin_txn(true).unwrap();

        let mut writer = env.begin_txn(false).unwrap();
        writer.put(id, b"k", b"new", PutFlags::empty()).unwrap();
        assert_eq!(before.get(id, b"k").unwrap(), Some(b"old".to_vec()));
        writer.commit().unwrap();

        let after = env.begin_txn(true).unwrap();
        assert_eq!(before.get(id, b"k").unwrap(), Some(b"old".to_vec()));
        assert_eq!(after.get(id, b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn reader_slots_are_bounded() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options().max_readers(2)).unwrap();

        let r1 = env.begin_txn(true).unwrap();
        let _r2 = env.begin_txn(true).unwrap();
        assert!(matches!(
            env.begin_txn(true),
            Err(EngineError::ReadersFull(2))
        ));

        r1.abort();
        assert!(env.begin_txn(true).is_ok());
        assert_eq!(env.info().readers_in_use, 1);
    }

    #[test]
    fn named_containers_are_bounded() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options().max_dbs(1)).unwrap();

        let mut txn = env.begin_txn(false).unwrap();
        txn.open_container(Some("one"), true).unwrap();
        assert!(matches!(
            txn.open_container(Some("two"), true),
            Err(EngineError::DbsFull(1))
        ));
    }

    #[test]
    fn map_size_bounds_payload() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options().map_size(16)).unwrap();

        let mut txn = env.begin_txn(false).unwrap();
        let id = txn.open_container(Some("c"), true).unwrap();
        txn.put(id, b"key", b"12345", PutFlags::empty()).unwrap();
        let result = txn.put(id, b"other", b"0123456789", PutFlags::empty());
        assert!(matches!(result, Err(EngineError::MapFull { .. })));
    }

    #[test]
    fn writer_waits_for_slot() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options()).unwrap();

        let first = env.begin_txn(false).unwrap();
        let env2 = env.clone();
        let handle = thread::spawn(move || {
            let mut txn = env2.begin_txn(false).unwrap();
            let id = txn.open_container(Some("late"), true).unwrap();
            txn.put(id, b"k", b"v", PutFlags::empty()).unwrap();
            txn.commit().unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        first.abort();
        handle.join().unwrap();

        let mut reader = env.begin_txn(true).unwrap();
        let id = reader.open_container(Some("late"), false).unwrap();
        assert_eq!(reader.get(id, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn close_wakes_waiting_writer() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options()).unwrap();

        let _first = env.begin_txn(false).unwrap();
        let env2 = env.clone();
        let handle = thread::spawn(move || env2.begin_txn(false).map(|_| ()));

        thread::sleep(Duration::from_millis(50));
        env.close().unwrap();
        assert!(matches!(handle.join().unwrap(), Err(EngineError::Closed)));
    }

    #[test]
    fn cursor_invalidated_by_txn_end() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), options()).unwrap();

        let mut txn = env.begin_txn(false).unwrap();
        let id = txn.open_container(Some("c"), true).unwrap();
        txn.put(id, b"a", b"1", PutFlags::empty()).unwrap();
        let mut cursor = txn.open_cursor(id).unwrap();
        assert!(cursor.get(CursorOp::First).unwrap().is_some());

        txn.commit().unwrap();
        assert!(matches!(
            cursor.get(CursorOp::Next),
            Err(EngineError::CursorInvalidated)
        ));
    }

    #[test]
    fn read_only_environments_share_the_lock() {
        let dir = tempdir().unwrap();
        Environment::open(dir.path(), options())
            .unwrap()
            .close()
            .unwrap();

        let shared = options().flags(EnvFlags::READ_ONLY);
        let first = Environment::open(dir.path(), shared.clone()).unwrap();
        let second = Environment::open(dir.path(), shared).unwrap();
        assert!(matches!(
            Environment::open(dir.path(), options()),
            Err(EngineError::Locked { .. })
        ));

        first.close().unwrap();
        second.close().unwrap();
        assert!(Environment::open(dir.path(), options()).is_ok());
    }

    #[test]
    fn read_only_environment_rejects_writers() {
        let dir = tempdir().unwrap();
        {
            let env = Environment::open(dir.path(), options()).unwrap();
            env.close().unwrap();
        }

        let env = Environment::open(
            dir.path(),
            options().flags(EnvFlags::READ_ONLY),
        )
        .unwrap();
        assert!(matches!(env.begin_txn(false), Err(EngineError::ReadOnly)));
        let mut txn = env.begin_txn(true).unwrap();
        assert_eq!(
            txn.open_container(None, false).unwrap(),
            ContainerId::ROOT
        );
    }
}
