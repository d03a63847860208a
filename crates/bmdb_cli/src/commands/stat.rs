//! The `stat` command.

use super::CommandResult;
use bmdb_core::Database;
use serde::Serialize;

/// Environment summary.
#[derive(Debug, Serialize)]
pub struct StatReport {
    /// Environment directory.
    pub path: String,
    /// Configured map size in bytes.
    pub map_size: u64,
    /// Bytes used by keys and values.
    pub used_bytes: u64,
    /// Reader slot limit.
    pub max_readers: u32,
    /// Reader slots in use.
    pub readers_in_use: u32,
    /// Named bucket limit.
    pub max_buckets: u32,
    /// ID of the last committed write transaction.
    pub last_txid: u64,
    /// Per-bucket figures.
    pub buckets: Vec<BucketReport>,
}

/// Figures for one bucket.
#[derive(Debug, Serialize)]
pub struct BucketReport {
    /// Bucket name.
    pub name: String,
    /// Number of pairs.
    pub entries: u64,
    /// Bytes used by keys and values.
    pub payload_bytes: u64,
}

/// Collects environment and bucket figures.
pub fn run(db: &Database) -> CommandResult<StatReport> {
    let buckets = db.view(|tx| {
        let mut reports = Vec::new();
        for name in tx.bucket_names()? {
            if let Some(bucket) = tx.bucket(&name) {
                let stats = bucket.stats()?;
                reports.push(BucketReport {
                    name,
                    entries: stats.entries,
                    payload_bytes: stats.payload_bytes,
                });
            }
        }
        Ok::<_, bmdb_core::CoreError>(reports)
    })?;

    let info = db.info();
    Ok(StatReport {
        path: db.path().display().to_string(),
        map_size: info.map_size,
        used_bytes: info.used_bytes,
        max_readers: info.max_readers,
        readers_in_use: info.readers_in_use,
        max_buckets: info.max_dbs,
        last_txid: info.last_txid,
        buckets,
    })
}

impl StatReport {
    /// Text rendering, one line per figure.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("path:        {}", self.path),
            format!("map size:    {} bytes", self.map_size),
            format!("used:        {} bytes", self.used_bytes),
            format!("readers:     {}/{}", self.readers_in_use, self.max_readers),
            format!("buckets:     {}/{}", self.buckets.len(), self.max_buckets),
            format!("last txid:   {}", self.last_txid),
        ];
        for bucket in &self.buckets {
            lines.push(format!(
                "  {}: {} entries, {} bytes",
                bucket.name, bucket.entries, bucket.payload_bytes
            ));
        }
        lines
    }
}
