//! Bucket views.

use crate::cursor::Cursor;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Tx;
use crate::types::BucketStats;
use bmdb_engine::{ContainerId, EngineError, PutFlags};
use std::fmt;

/// A named key space, viewed through one transaction.
///
/// Buckets are not cached: every lookup builds a fresh view, and a view is
/// only valid while its transaction is open.
pub struct Bucket<'tx> {
    tx: &'tx Tx,
    id: ContainerId,
    name: String,
}

impl<'tx> Bucket<'tx> {
    pub(crate) fn new(tx: &'tx Tx, id: ContainerId, name: &str) -> Self {
        Self {
            tx,
            id,
            name: name.to_string(),
        }
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the bucket is writable.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.tx.writable()
    }

    /// Returns the transaction this view belongs to.
    #[must_use]
    pub fn tx(&self) -> &'tx Tx {
        self.tx
    }

    /// Retrieves the value for a key.
    ///
    /// Returns `None` if the key does not exist or the transaction is done.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.tx
            .with_txn(|txn| Ok(txn.get(self.id, key)?))
            .ok()
            .flatten()
    }

    /// Returns true if the key exists.
    #[must_use]
    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Sets the value for a key, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `TxNotWritable`, `KeyRequired`, `KeyTooLarge`,
    /// `ValueTooLarge`, or an engine error.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.write(key, value, PutFlags::empty())
    }

    /// Sets the value for a key that must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `KeyExists` if the key is present, plus the errors of
    /// [`Bucket::put`].
    pub fn insert(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.write(key, value, PutFlags::NO_OVERWRITE)
    }

    fn write(&self, key: &[u8], value: &[u8], flags: PutFlags) -> CoreResult<()> {
        self.tx.ensure_open()?;
        self.tx.ensure_writable()?;
        crate::transaction::validate_entry(key, value)?;
        self.tx
            .with_txn(|txn| match txn.put(self.id, key, value, flags) {
                Err(EngineError::KeyExists) => Err(CoreError::KeyExists),
                other => Ok(other?),
            })
    }

    /// Removes a key.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `TxNotWritable`, `KeyRequired`, `KeyTooLarge`, or an
    /// engine error (not found when the key is absent).
    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.tx.ensure_open()?;
        self.tx.ensure_writable()?;
        crate::transaction::validate_key(key)?;
        self.tx.with_txn(|txn| Ok(txn.delete(self.id, key)?))
    }

    /// Opens a cursor over the bucket.
    ///
    /// # Errors
    ///
    /// Returns `TxDone` or an engine error.
    pub fn cursor(&self) -> CoreResult<Cursor<'tx>> {
        self.tx.open_cursor(self.id)
    }

    /// Calls `visit` for every pair in ascending key order.
    ///
    /// The first error returned by `visit` stops the iteration and is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the cursor's errors converted into `E`, or `visit`'s error.
    pub fn for_each<F, E>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
        E: From<CoreError>,
    {
        let mut cursor = self.cursor()?;
        while let Some((key, value)) = cursor.next()? {
            visit(&key, &value)?;
        }
        Ok(())
    }

    /// Removes every pair, keeping the bucket.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `TxNotWritable`, or an engine error.
    pub fn clear(&self) -> CoreResult<()> {
        self.drop_container(false)
    }

    /// Removes the bucket from the environment.
    ///
    /// # Errors
    ///
    /// Returns `TxDone`, `TxNotWritable`, or an engine error.
    pub fn remove(self) -> CoreResult<()> {
        self.drop_container(true)
    }

    fn drop_container(&self, delete: bool) -> CoreResult<()> {
        self.tx.ensure_open()?;
        self.tx.ensure_writable()?;
        self.tx
            .with_txn(|txn| Ok(txn.drop_container(self.id, delete)?))
    }

    /// Returns entry count and payload size.
    ///
    /// # Errors
    ///
    /// Returns `TxDone` or an engine error.
    pub fn stats(&self) -> CoreResult<BucketStats> {
        let stat = self.tx.with_txn(|txn| Ok(txn.stat(self.id)?))?;
        Ok(BucketStats {
            entries: stat.entries,
            payload_bytes: stat.payload_bytes,
        })
    }
}

impl fmt::Debug for Bucket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("tx", &self.tx.id())
            .finish()
    }
}
