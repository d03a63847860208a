//! Handle and transaction lifecycle through the public API.

use bmdb_core::{CoreError, Database, Options, Registry, DEFAULT_BUCKET_NAME};
use std::sync::Arc;
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
fn begin_after_close_is_not_open() {
    let (_dir, db) = create_db();
    db.close().unwrap();

    assert!(matches!(db.begin(true), Err(CoreError::DatabaseNotOpen)));
    assert!(matches!(db.close(), Err(CoreError::AlreadyClosed)));
}

#[test]
fn ended_transactions_are_done() {
    let (_dir, db) = create_db();

    for commit in [true, false] {
        let tx = db.begin(true).unwrap();
        if commit {
            tx.commit().unwrap();
        } else {
            tx.rollback().unwrap();
        }

        assert!(matches!(tx.put(b"k", b"v"), Err(CoreError::TxDone)));
        assert!(tx.bucket(DEFAULT_BUCKET_NAME).is_none());
        assert!(matches!(tx.commit(), Err(CoreError::TxDone)));
        assert!(matches!(tx.rollback(), Err(CoreError::TxDone)));
    }
}

#[test]
fn key_limits() {
    let (_dir, db) = create_db();
    let tx = db.begin(true).unwrap();

    assert!(matches!(tx.put(b"", b"v"), Err(CoreError::KeyRequired)));
    assert!(matches!(
        tx.put(&vec![0u8; 32769], b"v"),
        Err(CoreError::KeyTooLarge)
    ));
}

#[test]
fn update_view_round_trip() {
    let (_dir, db) = create_db();

    db.update(|tx| {
        let users = tx.create_bucket_if_not_exists("users")?;
        users.put(b"alice", b"admin")?;
        users.put(b"bob", b"guest")
    })
    .unwrap();

    let (alice, bob, missing) = db
        .view(|tx| {
            let users = tx.bucket("users").ok_or(CoreError::BucketNotFound)?;
            Ok::<_, CoreError>((users.get(b"alice"), users.get(b"bob"), users.get(b"carol")))
        })
        .unwrap();

    assert_eq!(alice.as_deref(), Some(&b"admin"[..]));
    assert_eq!(bob.as_deref(), Some(&b"guest"[..]));
    assert!(missing.is_none());
}

#[test]
fn failed_update_leaves_no_trace() {
    let (_dir, db) = create_db();
    db.update(|tx| tx.put(b"kept", b"1")).unwrap();

    let result: Result<(), CoreError> = db.update(|tx| {
        tx.put(b"kept", b"2")?;
        tx.create_bucket("scratch")?;
        Err(CoreError::BucketExists)
    });
    assert!(matches!(result, Err(CoreError::BucketExists)));

    db.view(|tx| {
        assert_eq!(tx.get(b"kept").as_deref(), Some(&b"1"[..]));
        assert!(tx.bucket("scratch").is_none());
        Ok::<_, CoreError>(())
    })
    .unwrap();
    assert_eq!(db.active_transactions(), 0);
}

#[test]
fn view_is_read_only() {
    let (_dir, db) = create_db();

    let result = db.view(|tx| tx.put(b"k", b"v"));
    assert!(matches!(result, Err(CoreError::TxNotWritable)));
}

#[test]
fn data_survives_reopen() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(Registry::new());

    {
        let db =
            Database::open_with_registry(dir.path(), 0o644, Options::default(), &registry).unwrap();
        db.update(|tx| tx.put(b"k", b"v")).unwrap();
    }

    let db = Database::open_with_registry(dir.path(), 0o644, Options::default(), &registry).unwrap();
    let value = db.view(|tx| Ok::<_, CoreError>(tx.get(b"k"))).unwrap();
    assert_eq!(value.as_deref(), Some(&b"v"[..]));
}

#[test]
fn bucket_limit_is_enforced() {
    let dir = tempdir().unwrap();
    let db = Database::open_with_registry(
        dir.path(),
        0o644,
        Options::new().max_buckets(2).no_sync(true),
        &Arc::new(Registry::new()),
    )
    .unwrap();

    let tx = db.begin(true).unwrap();
    tx.create_bucket("a").unwrap();
    tx.create_bucket("b").unwrap();
    assert!(matches!(tx.create_bucket("c"), Err(CoreError::Engine(_))));
}
