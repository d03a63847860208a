//! Read-write commands: `update`, `delete` and `drop`.

use super::{CommandError, CommandResult};
use bmdb_core::Database;
use tracing::info;

/// Stores `value` under `key`, creating the bucket if needed.
pub fn update(db: &Database, bucket: &str, key: &[u8], value: &[u8]) -> CommandResult<()> {
    db.update(|tx| {
        tx.create_bucket_if_not_exists(bucket)?.put(key, value)?;
        Ok::<_, CommandError>(())
    })?;
    info!(bucket, bytes = value.len(), "value stored");
    Ok(())
}

/// Removes `key` from `bucket`.
pub fn delete(db: &Database, bucket: &str, key: &[u8], shown_key: &str) -> CommandResult<()> {
    db.update(|tx| -> CommandResult<()> {
        let target = tx
            .bucket(bucket)
            .ok_or_else(|| CommandError::BucketNotFound(bucket.to_string()))?;
        match target.delete(key) {
            Err(e) if e.is_not_found() => Err(CommandError::KeyNotFound {
                bucket: bucket.to_string(),
                key: shown_key.to_string(),
            }),
            other => Ok(other?),
        }
    })?;
    info!(bucket, key = shown_key, "key deleted");
    Ok(())
}

/// Removes a whole bucket.
pub fn drop_bucket(db: &Database, bucket: &str) -> CommandResult<()> {
    db.update(|tx| -> CommandResult<()> {
        match tx.delete_bucket(bucket) {
            Err(bmdb_core::CoreError::BucketNotFound) => {
                Err(CommandError::BucketNotFound(bucket.to_string()))
            }
            other => Ok(other?),
        }
    })?;
    info!(bucket, "bucket dropped");
    Ok(())
}
