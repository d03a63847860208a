//! # bmdb engine
//!
//! Storage engine capabilities for bmdb and the bundled snapshot engine.
//!
//! The handle layer in `bmdb_core` never talks to storage directly. It drives
//! an [`Engine`] through three traits:
//!
//! - [`Engine`] - an opened environment that begins transactions
//! - [`EngineTxn`] - a live transaction over named containers
//! - [`EngineCursor`] - a positional iterator inside one container
//!
//! ## Bundled engine
//!
//! [`Environment`] is a single-writer, multi-reader engine. Readers pin the
//! snapshot committed when they began; the writer works on a copy-on-write
//! clone that atomically replaces the data file on commit.
//!
//! ## Example
//!
//! ```rust
//! use bmdb_engine::{CursorOp, Engine, EnvOptions, Environment, PutFlags};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let env = Environment::open(dir.path(), EnvOptions::new().max_dbs(2)).unwrap();
//!
//! let mut txn = env.begin_txn(false).unwrap();
//! let users = txn.open_container(Some("users"), true).unwrap();
//! txn.put(users, b"alice", b"1", PutFlags::empty()).unwrap();
//! txn.commit().unwrap();
//!
//! let mut txn = env.begin_txn(true).unwrap();
//! let users = txn.open_container(Some("users"), false).unwrap();
//! let mut cursor = txn.open_cursor(users).unwrap();
//! let (key, _) = cursor.get(CursorOp::First).unwrap().unwrap();
//! assert_eq!(key, b"alice");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod engine;
mod env;
mod error;
mod options;
mod snapshot;
mod txn;

pub use engine::{
    ContainerId, ContainerStat, CursorOp, Engine, EngineCursor, EngineTxn, EnvInfo, PutFlags,
};
pub use env::{Environment, DATA_FILE, LOCK_FILE};
pub use error::{EngineError, EngineResult};
pub use options::{EnvFlags, EnvOptions};
