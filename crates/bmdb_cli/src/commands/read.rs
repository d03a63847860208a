//! Read-only commands: `buckets`, `view` and `get`.

use super::{CommandError, CommandResult};
use bmdb_core::{Bucket, Database, Tx};
use serde::Serialize;

/// One key/value pair of a bucket listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Record {
    /// Bucket name.
    pub bucket: String,
    /// 1-based position inside the bucket.
    pub index: u64,
    /// Raw key.
    pub key: Vec<u8>,
    /// Raw value.
    pub value: Vec<u8>,
}

/// Lists bucket names in ascending order.
pub fn buckets(db: &Database) -> CommandResult<Vec<String>> {
    db.view(|tx| Ok(tx.bucket_names()?))
}

/// Lists every pair of one bucket, or of every bucket when `bucket` is
/// `None`.
pub fn view(db: &Database, bucket: Option<&str>) -> CommandResult<Vec<Record>> {
    db.view(|tx| {
        let names = match bucket {
            Some(name) => vec![name.to_string()],
            None => tx.bucket_names()?,
        };

        let mut records = Vec::new();
        for name in &names {
            collect(&open(tx, name)?, &mut records)?;
        }
        Ok(records)
    })
}

/// Returns the value stored under `key`.
pub fn get(db: &Database, bucket: &str, key: &[u8], shown_key: &str) -> CommandResult<Vec<u8>> {
    db.view(|tx| {
        open(tx, bucket)?
            .get(key)
            .ok_or_else(|| CommandError::KeyNotFound {
                bucket: bucket.to_string(),
                key: shown_key.to_string(),
            })
    })
}

fn open<'tx>(tx: &'tx Tx, name: &str) -> CommandResult<Bucket<'tx>> {
    tx.bucket(name)
        .ok_or_else(|| CommandError::BucketNotFound(name.to_string()))
}

fn collect(bucket: &Bucket<'_>, records: &mut Vec<Record>) -> CommandResult<()> {
    let mut index = 0;
    bucket.for_each(|key, value| {
        index += 1;
        records.push(Record {
            bucket: bucket.name().to_string(),
            index,
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok::<_, CommandError>(())
    })
}
