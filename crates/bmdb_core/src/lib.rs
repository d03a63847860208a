//! # bmdb core
//!
//! Transactional handle management for bmdb.
//!
//! This crate provides:
//! - [`Database`] handles that own one engine environment
//! - [`Tx`] read-only and read-write transactions
//! - [`Bucket`] views over named key spaces
//! - [`Cursor`] ordered iteration
//! - A [`Registry`] of open handles and a process-wide [`shutdown`] hook
//!
//! Every resource is released exactly once. Closing a handle aborts its
//! active transactions, ending a read-only transaction closes its cursors,
//! and [`shutdown::finalize`] closes every handle still open.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod closer;
mod config;
mod cursor;
mod database;
mod error;
mod registry;
pub mod shutdown;
mod transaction;
mod types;

pub use bmdb_engine::{Engine, EnvFlags, EnvInfo};
pub use bucket::Bucket;
pub use closer::Closable;
pub use config::{Options, DEFAULT_MAP_SIZE, DEFAULT_MAX_BUCKETS, MIN_MAP_SIZE, NO_SYNC_FLAGS};
pub use cursor::{Cursor, Entry};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use registry::Registry;
pub use transaction::{Tx, DEFAULT_BUCKET_NAME, MAX_KEY_SIZE, MAX_NAME_LENGTH, MAX_VALUE_SIZE};
pub use types::{BucketStats, DbId, TxId};
