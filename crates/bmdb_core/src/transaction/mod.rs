//! Transactions.
//!
//! A transaction is one begin/commit/rollback cycle against a database
//! handle. It moves one way from open to committed, rolled back, or
//! force-closed, and every operation after that fails with `TxDone`.

mod state;
mod tx;

pub(crate) use state::TxShared;
pub use tx::{Tx, DEFAULT_BUCKET_NAME, MAX_KEY_SIZE, MAX_NAME_LENGTH, MAX_VALUE_SIZE};
pub(crate) use tx::{validate_entry, validate_key};
