//! The transaction handle.

use super::state::TxShared;
use crate::bucket::Bucket;
use crate::closer::Closable;
use crate::cursor::{Cursor, CursorSlot};
use crate::database::DbInner;
use crate::error::{CoreError, CoreResult};
use crate::types::TxId;
use bmdb_engine::{ContainerId, CursorOp, EngineTxn};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Maximum length of a bucket name, in bytes.
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum length of a key, in bytes.
pub const MAX_KEY_SIZE: usize = 32768;

/// Maximum length of a value, in bytes.
pub const MAX_VALUE_SIZE: u64 = u32::MAX as u64;

/// Bucket used by [`Tx::put`], [`Tx::get`] and [`Tx::delete`].
pub const DEFAULT_BUCKET_NAME: &str = "default";

/// A read-only or read-write transaction.
///
/// Read-only transactions can look up buckets, read values and open cursors.
/// Read-write transactions can also create and remove buckets and keys.
///
/// A transaction ends exactly once, through [`Tx::commit`], [`Tx::rollback`],
/// or its database handle closing. Dropping a transaction that has not ended
/// rolls it back.
///
/// # Example
///
/// ```rust,no_run
/// use bmdb_core::{Database, Options};
///
/// let db = Database::open("my_env", 0o644, Options::default())?;
/// let tx = db.begin(true)?;
/// tx.create_bucket("users")?.put(b"alice", b"1")?;
/// tx.on_commit(|| println!("saved"));
/// tx.commit()?;
/// # Ok::<(), bmdb_core::CoreError>(())
/// ```
pub struct Tx {
    shared: Arc<TxShared>,
    db: Weak<DbInner>,
}

impl Tx {
    pub(crate) fn new(shared: Arc<TxShared>, db: Weak<DbInner>) -> Self {
        Self { shared, db }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TxId {
        self.shared.id
    }

    /// Returns whether the transaction can perform write operations.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.shared.writable
    }

    /// Returns true once the transaction has ended.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns true while the transaction is owned by `update` or `view`.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.shared.state.lock().managed
    }

    /// Returns the number of open cursors tracked by this transaction.
    ///
    /// Only read-only transactions track their cursors.
    #[must_use]
    pub fn active_cursors(&self) -> usize {
        self.shared.state.lock().active_cursors()
    }

    /// Creates a new bucket.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `NoBucketName`, `NameTooLong`, `TxNotWritable`, or
    /// `BucketExists`, checked in that order, or an engine error.
    pub fn create_bucket(&self, name: &str) -> CoreResult<Bucket<'_>> {
        self.ensure_open()?;
        validate_name(name)?;
        self.ensure_writable()?;

        let id = self.with_txn(|txn| {
            match txn.open_container(Some(name), false) {
                Ok(_) => return Err(CoreError::BucketExists),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
            Ok(txn.open_container(Some(name), true)?)
        })?;
        debug!(tx = %self.id(), bucket = name, "bucket created");
        Ok(Bucket::new(self, id, name))
    }

    /// Returns the named bucket, creating it if it does not exist.
    ///
    /// Read-only transactions may use this to look up an existing bucket.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `NoBucketName`, `NameTooLong`, or `TxNotWritable`
    /// when the bucket is missing and the transaction is read-only.
    pub fn create_bucket_if_not_exists(&self, name: &str) -> CoreResult<Bucket<'_>> {
        self.ensure_open()?;
        validate_name(name)?;

        let writable = self.writable();
        let id = self.with_txn(|txn| match txn.open_container(Some(name), false) {
            Ok(id) => Ok(id),
            Err(e) if e.is_not_found() => {
                if !writable {
                    return Err(CoreError::TxNotWritable);
                }
                Ok(txn.open_container(Some(name), true)?)
            }
            Err(e) => Err(e.into()),
        })?;
        Ok(Bucket::new(self, id, name))
    }

    /// Looks up a bucket by name.
    ///
    /// Returns `None` if the transaction is done, the name is invalid, or the
    /// bucket does not exist.
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<Bucket<'_>> {
        validate_name(name).ok()?;
        let id = self
            .with_txn(|txn| Ok(txn.open_container(Some(name), false)?))
            .ok()?;
        Some(Bucket::new(self, id, name))
    }

    /// Returns the names of every bucket in the environment, ascending.
    ///
    /// # Errors
    ///
    /// Returns `TxDone` or an engine error.
    pub fn bucket_names(&self) -> CoreResult<Vec<String>> {
        self.with_txn(|txn| {
            let root = txn.open_container(None, false)?;
            let mut cursor = txn.open_cursor(root)?;
            let mut names = Vec::new();
            while let Some((name, _)) = cursor.get(CursorOp::Next)? {
                names.push(String::from_utf8_lossy(&name).into_owned());
            }
            Ok(names)
        })
    }

    /// Deletes a bucket and everything in it.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `NoBucketName`, `NameTooLong`, `TxNotWritable`, or
    /// `BucketNotFound`, or an engine error.
    pub fn delete_bucket(&self, name: &str) -> CoreResult<()> {
        self.ensure_open()?;
        validate_name(name)?;
        self.ensure_writable()?;

        self.with_txn(|txn| {
            let id = match txn.open_container(Some(name), false) {
                Ok(id) => id,
                Err(e) if e.is_not_found() => return Err(CoreError::BucketNotFound),
                Err(e) => return Err(e.into()),
            };
            txn.drop_container(id, true)?;
            Ok(())
        })?;
        debug!(tx = %self.id(), bucket = name, "bucket deleted");
        Ok(())
    }

    /// Sets the value for a key in the default bucket, creating the bucket
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `TxNotWritable`, `KeyRequired`, `KeyTooLarge`, or
    /// `ValueTooLarge`, or an engine error.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        validate_entry(key, value)?;
        self.create_bucket_if_not_exists(DEFAULT_BUCKET_NAME)?
            .put(key, value)
    }

    /// Retrieves the value for a key in the default bucket.
    ///
    /// Returns `None` if the key does not exist or the transaction is done.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.bucket(DEFAULT_BUCKET_NAME)?.get(key)
    }

    /// Removes a key from the default bucket.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `TxNotWritable`, `KeyRequired`, `KeyTooLarge`,
    /// `BucketNotFound` when the default bucket was never created, or an
    /// engine error (not found when the key is absent).
    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        validate_key(key)?;
        self.bucket(DEFAULT_BUCKET_NAME)
            .ok_or(CoreError::BucketNotFound)?
            .delete(key)
    }

    /// Adds a handler to run after the transaction commits successfully.
    ///
    /// Handlers run in registration order. They are discarded on rollback,
    /// on a failed commit, and when the transaction is already done.
    pub fn on_commit<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if !state.is_done() {
            state.commit_handlers.push(Box::new(handler));
        }
    }

    /// Commits every write of the transaction.
    ///
    /// The transaction ends whether or not the engine commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns `TxManaged`, `TxDone`, or the engine's commit error.
    pub fn commit(&self) -> CoreResult<()> {
        self.finish(true)
    }

    /// Ends the transaction, discarding its writes.
    ///
    /// # Errors
    ///
    /// Returns `TxManaged` or `TxDone`.
    pub fn rollback(&self) -> CoreResult<()> {
        self.finish(false)
    }

    fn finish(&self, commit: bool) -> CoreResult<()> {
        let (result, handlers) = {
            let mut state = self.shared.state.lock();
            if state.managed {
                return Err(CoreError::TxManaged);
            }
            let txn = state.txn.take().ok_or(CoreError::TxDone)?;
            let result = if commit {
                txn.commit()
            } else {
                txn.abort();
                Ok(())
            };
            let cursors = state.close_cursors();
            let handlers = std::mem::take(&mut state.commit_handlers);

            let outcome = if commit { "committed" } else { "rolled back" };
            debug!(tx = %self.id(), writable = self.writable(), cursors, outcome, "transaction ended");
            (result, handlers)
        };

        match &result {
            Ok(()) if commit => {
                for handler in handlers {
                    handler();
                }
            }
            Ok(()) => {}
            Err(e) => warn!(tx = %self.id(), error = %e, "commit failed"),
        }

        self.unregister();
        result.map_err(CoreError::from)
    }

    fn unregister(&self) {
        if let Some(db) = self.db.upgrade() {
            db.unregister_tx(self.id());
        }
    }

    pub(crate) fn set_managed(&self, managed: bool) {
        self.shared.state.lock().managed = managed;
    }

    /// Runs `f` against the engine transaction while holding the
    /// transaction lock.
    pub(crate) fn with_txn<R>(
        &self,
        f: impl FnOnce(&mut Box<dyn EngineTxn>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut state = self.shared.state.lock();
        let txn = state.txn.as_mut().ok_or(CoreError::TxDone)?;
        f(txn)
    }

    pub(crate) fn open_cursor(&self, id: ContainerId) -> CoreResult<Cursor<'_>> {
        let mut state = self.shared.state.lock();
        let txn = state.txn.as_ref().ok_or(CoreError::TxDone)?;
        let slot = Arc::new(CursorSlot::new(txn.open_cursor(id)?));
        let registered = (!self.shared.writable).then(|| state.register_cursor(&slot));
        Ok(Cursor::new(self, slot, registered))
    }

    pub(crate) fn unregister_cursor(&self, id: u64) {
        self.shared.state.lock().unregister_cursor(id);
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_done() {
            return Err(CoreError::TxDone);
        }
        Ok(())
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        if !self.writable() {
            return Err(CoreError::TxNotWritable);
        }
        Ok(())
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("id", &self.id())
            .field("writable", &self.writable())
            .field("done", &self.is_done())
            .finish()
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.shared.close() {
            debug!(tx = %self.id(), "open transaction dropped, rolled back");
            self.unregister();
        }
    }
}

pub(crate) fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        Err(CoreError::NoBucketName)
    } else if name.len() > MAX_NAME_LENGTH {
        Err(CoreError::NameTooLong)
    } else {
        Ok(())
    }
}

pub(crate) fn validate_key(key: &[u8]) -> CoreResult<()> {
    if key.is_empty() {
        Err(CoreError::KeyRequired)
    } else if key.len() > MAX_KEY_SIZE {
        Err(CoreError::KeyTooLarge)
    } else {
        Ok(())
    }
}

pub(crate) fn validate_entry(key: &[u8], value: &[u8]) -> CoreResult<()> {
    validate_key(key)?;
    if value.len() as u64 > MAX_VALUE_SIZE {
        return Err(CoreError::ValueTooLarge);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, Options, Registry};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    fn create_db() -> (TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open_with_registry(
            dir.path(),
            0o644,
            Options::new().no_sync(true),
            &Arc::new(Registry::new()),
        )
        .unwrap();
        (dir, db)
    }

    #[test]
    fn done_transaction_rejects_everything() {
        let (_dir, db) = create_db();
        let tx = db.begin(true).unwrap();
        tx.create_bucket("users").unwrap();
        tx.commit().unwrap();

        assert!(tx.is_done());
        assert!(matches!(tx.put(b"k", b"v"), Err(CoreError::TxDone)));
        assert!(matches!(tx.create_bucket("other"), Err(CoreError::TxDone)));
        assert!(matches!(tx.delete_bucket("users"), Err(CoreError::TxDone)));
        assert!(matches!(tx.bucket_names(), Err(CoreError::TxDone)));
        assert!(tx.bucket("users").is_none());
        assert!(tx.get(b"k").is_none());
        assert!(matches!(tx.commit(), Err(CoreError::TxDone)));
        assert!(matches!(tx.rollback(), Err(CoreError::TxDone)));
    }

    #[test]
    fn rollback_is_terminal() {
        let (_dir, db) = create_db();
        let tx = db.begin(false).unwrap();
        tx.rollback().unwrap();

        assert!(matches!(tx.rollback(), Err(CoreError::TxDone)));
        assert!(matches!(tx.commit(), Err(CoreError::TxDone)));
        assert_eq!(db.active_transactions(), 0);
    }

    #[test]
    fn bucket_name_validation() {
        let (_dir, db) = create_db();
        let tx = db.begin(true).unwrap();
        let long = "x".repeat(MAX_NAME_LENGTH + 1);

        assert!(matches!(tx.create_bucket(""), Err(CoreError::NoBucketName)));
        assert!(matches!(tx.create_bucket(&long), Err(CoreError::NameTooLong)));
        assert!(matches!(
            tx.create_bucket_if_not_exists(""),
            Err(CoreError::NoBucketName)
        ));
        assert!(matches!(tx.delete_bucket(&long), Err(CoreError::NameTooLong)));
        assert!(tx.bucket("").is_none());
        assert!(tx.bucket(&long).is_none());

        let exact = "y".repeat(MAX_NAME_LENGTH);
        assert!(tx.create_bucket(&exact).is_ok());
    }

    #[test]
    fn create_bucket_twice_fails() {
        let (_dir, db) = create_db();
        let tx = db.begin(true).unwrap();

        tx.create_bucket("users").unwrap();
        assert!(matches!(tx.create_bucket("users"), Err(CoreError::BucketExists)));
        assert_eq!(tx.create_bucket_if_not_exists("users").unwrap().name(), "users");
    }

    #[test]
    fn read_only_transaction_cannot_write() {
        let (_dir, db) = create_db();
        db.update(|tx| tx.create_bucket("users").map(|_| ())).unwrap();

        let tx = db.begin(false).unwrap();
        assert!(!tx.writable());
        assert!(matches!(tx.put(b"k", b"v"), Err(CoreError::TxNotWritable)));
        assert!(matches!(tx.delete(b"k"), Err(CoreError::TxNotWritable)));
        assert!(matches!(tx.create_bucket("new"), Err(CoreError::TxNotWritable)));
        assert!(matches!(tx.delete_bucket("users"), Err(CoreError::TxNotWritable)));

        // Existing buckets can still be looked up.
        assert!(tx.create_bucket_if_not_exists("users").is_ok());
        assert!(matches!(
            tx.create_bucket_if_not_exists("missing"),
            Err(CoreError::TxNotWritable)
        ));

        let bucket = tx.bucket("users").unwrap();
        assert!(!bucket.writable());
        assert!(matches!(bucket.put(b"k", b"v"), Err(CoreError::TxNotWritable)));
    }

    #[test]
    fn key_validation() {
        let (_dir, db) = create_db();
        let tx = db.begin(true).unwrap();

        assert!(matches!(tx.put(b"", b"v"), Err(CoreError::KeyRequired)));
        let big = vec![7u8; MAX_KEY_SIZE + 1];
        assert!(matches!(tx.put(&big, b"v"), Err(CoreError::KeyTooLarge)));
        assert!(matches!(tx.delete(b""), Err(CoreError::KeyRequired)));

        let largest = vec![7u8; MAX_KEY_SIZE];
        tx.put(&largest, b"v").unwrap();
        assert_eq!(tx.get(&largest).as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn default_bucket_round_trip() {
        let (_dir, db) = create_db();
        let tx = db.begin(true).unwrap();

        assert!(matches!(tx.delete(b"k"), Err(CoreError::BucketNotFound)));
        tx.put(b"k", b"v").unwrap();
        assert_eq!(tx.get(b"k").as_deref(), Some(&b"v"[..]));
        assert_eq!(tx.bucket_names().unwrap(), vec![DEFAULT_BUCKET_NAME]);

        tx.delete(b"k").unwrap();
        assert!(tx.get(b"k").is_none());
        assert!(tx.delete(b"k").unwrap_err().is_not_found());
    }

    #[test]
    fn delete_bucket() {
        let (_dir, db) = create_db();
        let tx = db.begin(true).unwrap();

        assert!(matches!(tx.delete_bucket("users"), Err(CoreError::BucketNotFound)));
        tx.create_bucket("users").unwrap().put(b"k", b"v").unwrap();
        tx.delete_bucket("users").unwrap();
        assert!(tx.bucket("users").is_none());
        assert!(tx.bucket_names().unwrap().is_empty());
    }

    #[test]
    fn bucket_names_are_sorted() {
        let (_dir, db) = create_db();
        db.update(|tx| {
            for name in ["zeta", "alpha", "mid"] {
                tx.create_bucket(name)?;
            }
            Ok::<_, CoreError>(())
        })
        .unwrap();

        let names = db.view(|tx| tx.bucket_names()).unwrap();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn commit_handlers_run_in_order() {
        let (_dir, db) = create_db();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let tx = db.begin(true).unwrap();
        for i in 0..3 {
            let calls = Arc::clone(&calls);
            tx.on_commit(move || calls.lock().unwrap().push(i));
        }
        assert!(calls.lock().unwrap().is_empty());
        tx.commit().unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn commit_handlers_skipped_on_rollback() {
        let (_dir, db) = create_db();
        let calls = Arc::new(Mutex::new(0));

        let tx = db.begin(true).unwrap();
        let counter = Arc::clone(&calls);
        tx.on_commit(move || *counter.lock().unwrap() += 1);
        tx.rollback().unwrap();

        let counter = Arc::clone(&calls);
        tx.on_commit(move || *counter.lock().unwrap() += 1);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn ending_read_transaction_closes_cursors() {
        let (_dir, db) = create_db();
        db.update(|tx| tx.put(b"k", b"v")).unwrap();

        let tx = db.begin(false).unwrap();
        let bucket = tx.bucket(DEFAULT_BUCKET_NAME).unwrap();
        let mut first = bucket.cursor().unwrap();
        let _second = bucket.cursor().unwrap();
        assert_eq!(tx.active_cursors(), 2);

        tx.commit().unwrap();
        assert_eq!(tx.active_cursors(), 0);
        assert!(first.is_closed());
        assert!(matches!(first.next(), Err(CoreError::TxDone)));
    }

    #[test]
    fn write_transaction_does_not_track_cursors() {
        let (_dir, db) = create_db();
        let tx = db.begin(true).unwrap();
        let bucket = tx.create_bucket("b").unwrap();

        let _cursor = bucket.cursor().unwrap();
        assert_eq!(tx.active_cursors(), 0);
    }

    #[test]
    fn dropping_open_transaction_rolls_back() {
        let (_dir, db) = create_db();
        {
            let tx = db.begin(true).unwrap();
            tx.put(b"k", b"v").unwrap();
        }
        assert_eq!(db.active_transactions(), 0);
        assert!(db.view(|tx| Ok::<_, CoreError>(tx.get(b"k"))).unwrap().is_none());
    }

    #[test]
    fn ids_increase() {
        let (_dir, db) = create_db();
        let a = db.begin(false).unwrap();
        let b = db.begin(false).unwrap();
        assert!(a.id() < b.id());
    }
}
