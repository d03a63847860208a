//! bmdbctl
//!
//! Command-line tool for bmdb environments.
//!
//! # Commands
//!
//! - `buckets` - List bucket names
//! - `view` - Dump the pairs of one bucket or of every bucket
//! - `get` - Print one value
//! - `update` - Store one value, creating the bucket if needed
//! - `delete` - Remove one key
//! - `drop` - Remove a whole bucket
//! - `stat` - Show environment and bucket figures

mod commands;
mod output;

use bmdb_core::{shutdown, Database, EnvFlags, Options, DEFAULT_MAP_SIZE};
use clap::{Parser, Subcommand};
use commands::{read, stat, write, CommandError};
use output::{emit, Format, Shown, ValueKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// bmdb command-line tool.
#[derive(Parser)]
#[command(name = "bmdbctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the environment directory
    #[arg(global = true, long)]
    db: Option<PathBuf>,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// How keys and values are read from arguments and printed
    #[arg(global = true, short = 't', long = "type", value_enum, default_value_t = ValueKind::Bytes)]
    kind: ValueKind,

    /// Map size in bytes
    #[arg(global = true, long, default_value_t = DEFAULT_MAP_SIZE)]
    map_size: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List bucket names
    Buckets,

    /// Dump key/value pairs
    View {
        /// Only this bucket
        bucket: Option<String>,
    },

    /// Print the value stored under a key
    Get {
        /// Bucket name
        bucket: String,
        /// Key
        key: String,
    },

    /// Store a value under a key
    Update {
        /// Bucket name, created if missing
        bucket: String,
        /// Key
        key: String,
        /// Value
        value: String,
    },

    /// Remove a key
    Delete {
        /// Bucket name
        bucket: String,
        /// Key
        key: String,
    },

    /// Remove a bucket and all of its pairs
    Drop {
        /// Bucket name
        bucket: String,
    },

    /// Show environment and bucket figures
    Stat,
}

impl Commands {
    fn writes(&self) -> bool {
        matches!(
            self,
            Self::Update { .. } | Self::Delete { .. } | Self::Drop { .. }
        )
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    shutdown::install_signal_handler()?;

    let path = cli.db.ok_or("environment path required")?;
    let mut options = Options::new().map_size(cli.map_size);
    if !cli.command.writes() {
        options = options.flags(EnvFlags::READ_ONLY);
    }
    let db = Database::open(&path, 0o644, options)?;

    let result = run(&db, cli.command, cli.format, cli.kind);
    db.close()?;
    result
}

fn run(
    db: &Database,
    command: Commands,
    format: Format,
    kind: ValueKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let decode = |input: &str| kind.parse(input).map_err(CommandError::InvalidInput);

    match command {
        Commands::Buckets => {
            let names = read::buckets(db)?;
            emit(format, &names, names.clone())?;
        }
        Commands::View { bucket } => {
            let shown: Vec<Shown> = read::view(db, bucket.as_deref())?
                .iter()
                .map(|record| Shown::new(kind, record))
                .collect();
            emit(format, &shown, shown.iter().map(Shown::line))?;
        }
        Commands::Get { bucket, key } => {
            let value = read::get(db, &bucket, &decode(&key)?, &key)?;
            let shown = kind.render(&value);
            emit(format, &shown, [shown.clone()])?;
        }
        Commands::Update { bucket, key, value } => {
            write::update(db, &bucket, &decode(&key)?, &decode(&value)?)?;
        }
        Commands::Delete { bucket, key } => {
            write::delete(db, &bucket, &decode(&key)?, &key)?;
        }
        Commands::Drop { bucket } => {
            write::drop_bucket(db, &bucket)?;
        }
        Commands::Stat => {
            let report = stat::run(db)?;
            emit(format, &report, report.lines())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::Registry;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn open(dir: &std::path::Path) -> Database {
        Database::open_with_registry(dir, 0o600, Options::new(), &Arc::new(Registry::new()))
            .unwrap()
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "bmdbctl", "get", "users", "alice", "--db", "/tmp/x", "--type", "hex", "-f", "json",
        ]);
        assert_eq!(cli.kind, ValueKind::Hex);
        assert_eq!(cli.format, Format::Json);
        assert!(matches!(cli.command, Commands::Get { .. }));
        assert!(!cli.command.writes());
    }

    #[test]
    fn write_commands_are_flagged() {
        let cli = Cli::parse_from(["bmdbctl", "--db", "/tmp/x", "drop", "users"]);
        assert!(cli.command.writes());
        assert_eq!(cli.map_size, DEFAULT_MAP_SIZE);
    }

    #[test]
    fn update_then_read_back() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        write::update(&db, "users", b"alice", b"1").unwrap();
        write::update(&db, "users", b"bob", b"2").unwrap();
        write::update(&db, "groups", b"admin", b"alice").unwrap();

        assert_eq!(read::buckets(&db).unwrap(), vec!["groups", "users"]);
        assert_eq!(read::get(&db, "users", b"bob", "bob").unwrap(), b"2");

        let records = read::view(&db, Some("users")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, b"alice");
        assert_eq!(records[1].index, 2);

        let everything = read::view(&db, None).unwrap();
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[0].bucket, "groups");
    }

    #[test]
    fn missing_targets_are_reported() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());
        write::update(&db, "users", b"alice", b"1").unwrap();

        assert!(matches!(
            read::get(&db, "nobody", b"alice", "alice"),
            Err(CommandError::BucketNotFound(_))
        ));
        assert!(matches!(
            read::get(&db, "users", b"carol", "carol"),
            Err(CommandError::KeyNotFound { .. })
        ));
        assert!(matches!(
            write::delete(&db, "users", b"carol", "carol"),
            Err(CommandError::KeyNotFound { .. })
        ));
        assert!(matches!(
            write::drop_bucket(&db, "nobody"),
            Err(CommandError::BucketNotFound(_))
        ));
    }

    #[test]
    fn delete_and_drop() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());
        write::update(&db, "users", b"alice", b"1").unwrap();
        write::update(&db, "users", b"bob", b"2").unwrap();

        write::delete(&db, "users", b"alice", "alice").unwrap();
        assert_eq!(read::view(&db, Some("users")).unwrap().len(), 1);

        write::drop_bucket(&db, "users").unwrap();
        assert!(read::buckets(&db).unwrap().is_empty());
    }

    #[test]
    fn stat_reports_buckets() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());
        write::update(&db, "users", b"alice", b"1").unwrap();

        let report = stat::run(&db).unwrap();
        assert_eq!(report.buckets.len(), 1);
        assert_eq!(report.buckets[0].entries, 1);
        assert_eq!(report.buckets[0].payload_bytes, 6);
        assert!(report.last_txid >= 1);
        assert!(report.lines().iter().any(|l| l.contains("users: 1 entries")));
    }
}
