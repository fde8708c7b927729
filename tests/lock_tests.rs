//! NetworkLock integration tests
//!
//! Concurrent submission, syncing missing ancestors from a peer, and
//! persisting an authority to disk and back.

mod common;

use async_trait::async_trait;
use common::{genesis, identity, secret, signed, temp_dir};
use netlock::api::{AumFetcher, AumRegistry, AuthorityConfig, ChainEvent, NetworkLockBuilder};
use netlock::authority::{AumMessage, ChainStatus, State, StateId, VerifiedAum};
use netlock::crypto::{AumHash, Identity};
use netlock::error::{AumError, Error};
use netlock::storage::{FileArchive, ARCHIVE_EXTENSION};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Genesis followed by `len` no-ops signed by `signer`, oldest first
fn linear_history(signer: &Identity, len: usize) -> Vec<VerifiedAum> {
    let mut history = vec![genesis(vec![signer.key(1)])];
    for _ in 0..len {
        let parent = history[history.len() - 1].hash();
        history.push(signed(AumMessage::NoOp, parent, &[signer]));
    }
    history
}

/// Fetcher that never answers in time
struct StalledFetcher;

#[async_trait]
impl AumFetcher for StalledFetcher {
    async fn fetch(&self, hash: AumHash) -> netlock::Result<Vec<u8>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(netlock::StorageError::NotFound { hash }.into())
    }
}

#[tokio::test]
async fn test_submit_batch_applies_in_order() {
    let a = identity(1);
    let history = linear_history(&a, 3);
    let lock = NetworkLockBuilder::new().build().unwrap();

    let batch: Vec<Vec<u8>> = history.iter().map(|v| v.raw().to_vec()).collect();
    let results = lock.submit_batch(batch).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(lock.snapshot().head(), Some(history[3].hash()));
    assert_eq!(lock.snapshot().chain().len(), 4);
}

#[tokio::test]
async fn test_submit_batch_reports_each_entry() {
    let a = identity(1);
    let history = linear_history(&a, 2);
    let lock = NetworkLockBuilder::new().build().unwrap();

    let batch = vec![
        history[0].raw().to_vec(),
        vec![0xff, 0x00, 0x13],
        history[2].raw().to_vec(),
        history[1].raw().to_vec(),
    ];
    let results = lock.submit_batch(batch).await;

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::Aum(_))));
    assert!(matches!(
        results[2],
        Err(Error::Aum(AumError::UnknownParent { held: true, .. }))
    ));
    let last = results[3].as_ref().unwrap();
    assert_eq!(last.accepted, vec![history[1].hash(), history[2].hash()]);
    assert_eq!(lock.snapshot().head(), Some(history[2].hash()));
}

#[tokio::test]
async fn test_sync_fetches_missing_ancestors() {
    let a = identity(1);
    let history = linear_history(&a, 5);

    let registry = AumRegistry::new();
    for aum in &history {
        registry.publish(aum);
    }

    let lock = NetworkLockBuilder::new()
        .with_genesis(history[0].clone())
        .build()
        .unwrap();
    let tip = history[5].clone();
    let outcome = lock.sync_from(&registry, tip).await.unwrap();

    let expected: Vec<AumHash> = history[1..].iter().map(|v| v.hash()).collect();
    assert_eq!(outcome.accepted, expected);
    assert_eq!(outcome.head_change.unwrap().previous, Some(history[0].hash()));
    assert_eq!(lock.snapshot().head(), Some(history[5].hash()));
}

#[tokio::test]
async fn test_sync_from_nothing_fetches_genesis() {
    let a = identity(1);
    let history = linear_history(&a, 2);

    let registry = AumRegistry::new();
    for aum in &history {
        registry.publish(aum);
    }

    let lock = NetworkLockBuilder::new().build().unwrap();
    lock.sync_from(&registry, history[2].clone()).await.unwrap();

    let snapshot = lock.snapshot();
    assert_eq!(snapshot.status(), ChainStatus::Active);
    assert_eq!(snapshot.root(), Some(history[0].hash()));
}

#[tokio::test]
async fn test_sync_depth_is_bounded() {
    let a = identity(1);
    let history = linear_history(&a, 4);

    let registry = AumRegistry::new();
    for aum in &history {
        registry.publish(aum);
    }

    let lock = NetworkLockBuilder::new()
        .with_max_fetch_depth(2)
        .with_genesis(history[0].clone())
        .build()
        .unwrap();
    let result = lock.sync_from(&registry, history[4].clone()).await;

    assert!(matches!(
        result,
        Err(Error::Aum(AumError::FetchDepthExceeded { max: 2 }))
    ));
    assert_eq!(lock.snapshot().head(), Some(history[0].hash()));
}

#[tokio::test]
async fn test_sync_times_out_on_stalled_peer() {
    let a = identity(1);
    let history = linear_history(&a, 2);

    let lock = NetworkLockBuilder::new()
        .with_fetch_timeout(Duration::from_millis(50))
        .with_genesis(history[0].clone())
        .build()
        .unwrap();
    let result = lock.sync_from(&StalledFetcher, history[2].clone()).await;

    let missing = history[1].hash();
    assert!(matches!(
        result,
        Err(Error::Aum(AumError::FetchTimeout { parent })) if parent == missing
    ));
}

#[tokio::test]
async fn test_sync_rejects_substituted_parent() {
    let a = identity(1);
    let history = linear_history(&a, 2);
    let impostor = signed(AumMessage::NoOp, history[0].hash(), &[&identity(9)]);

    let registry = AumRegistry::new();
    registry.insert_raw(history[1].hash(), impostor.raw().to_vec());

    let lock = NetworkLockBuilder::new()
        .with_genesis(history[0].clone())
        .build()
        .unwrap();
    let result = lock.sync_from(&registry, history[2].clone()).await;

    assert!(matches!(
        result,
        Err(Error::Aum(AumError::MalformedEncoding { .. }))
    ));
}

#[tokio::test]
async fn test_concurrent_readers_see_consistent_snapshots() {
    let a = identity(1);
    let history = linear_history(&a, 20);
    let lock = NetworkLockBuilder::new().build().unwrap();

    let reader = lock.clone();
    let reads = tokio::spawn(async move {
        for _ in 0..200 {
            let snapshot = reader.snapshot();
            if let Some(head) = snapshot.head() {
                assert_eq!(snapshot.chain().last(), Some(&head));
            }
            tokio::task::yield_now().await;
        }
    });

    for aum in history {
        lock.submit(aum).unwrap();
    }
    reads.await.unwrap();
}

#[test]
fn test_disable_dispatches_event_and_hides_keys() {
    let a = identity(1);
    let lock = NetworkLockBuilder::new()
        .with_genesis(genesis(vec![a.key(1)]))
        .build()
        .unwrap();

    let disabled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disabled);
    lock.subscribe(move |event| {
        if event == ChainEvent::Disabled {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    assert!(lock.snapshot().is_trusted(&a.key_id()));
    lock.disable(secret().as_bytes()).unwrap();

    assert_eq!(disabled.load(Ordering::SeqCst), 1);
    let snapshot = lock.snapshot();
    assert_eq!(snapshot.status(), ChainStatus::Disabled);
    assert!(!snapshot.is_trusted(&a.key_id()));
}

#[test]
fn test_archive_and_restore() {
    let a = identity(1);
    let history = linear_history(&a, 3);
    let dir = temp_dir();
    let archive = FileArchive::new(dir.path()).unwrap();

    let original = NetworkLockBuilder::new().build().unwrap();
    for aum in &history {
        original.submit(aum.clone()).unwrap();
    }
    assert_eq!(original.archive_to(&archive).unwrap(), 4);
    assert_eq!(archive.hashes().unwrap().len(), 4);

    let restored = NetworkLockBuilder::new().build().unwrap();
    assert_eq!(restored.restore_from(&archive).unwrap(), 4);
    assert_eq!(restored.snapshot().head(), original.snapshot().head());
    assert_eq!(restored.updates(), original.updates());
}

/// Genesis, a key addition, a checkpoint over both keys and one no-op after it
fn checkpointed_history() -> Vec<VerifiedAum> {
    let a = identity(1);
    let b = identity(2);

    let g = genesis(vec![a.key(1)]);
    let add = signed(AumMessage::AddKey(b.key(1)), g.hash(), &[&a]);
    let state = State::new(
        vec![a.key(1), b.key(1)],
        vec![common::commitment()],
        StateId(7, 11),
    );
    let checkpoint = signed(AumMessage::Checkpoint(state), add.hash(), &[&a, &b]);
    let after = signed(AumMessage::NoOp, checkpoint.hash(), &[&a, &b]);
    vec![g, add, checkpoint, after]
}

#[test]
fn test_archive_prunes_after_compaction() {
    let history = checkpointed_history();
    let dir = temp_dir();
    let archive = FileArchive::new(dir.path()).unwrap();

    let lock = NetworkLockBuilder::new().build().unwrap();
    for aum in &history {
        lock.submit(aum.clone()).unwrap();
    }
    assert_eq!(lock.archive_to(&archive).unwrap(), 4);
    assert_eq!(archive.hashes().unwrap().len(), 4);

    assert_eq!(lock.compact(), 2);
    assert_eq!(lock.archive_to(&archive).unwrap(), 2);

    let mut expected = vec![history[2].hash(), history[3].hash()];
    expected.sort();
    assert_eq!(archive.hashes().unwrap(), expected);
    assert!(!archive.exists(&history[0].hash()));
}

#[test]
fn test_restore_compacted_archive() {
    let history = checkpointed_history();
    let dir = temp_dir();
    let archive = FileArchive::new(dir.path()).unwrap();

    let original = NetworkLockBuilder::new().build().unwrap();
    for aum in &history {
        original.submit(aum.clone()).unwrap();
    }
    assert_eq!(original.compact(), 2);
    assert_eq!(original.archive_to(&archive).unwrap(), 2);

    let restored = NetworkLockBuilder::new().build().unwrap();
    assert_eq!(restored.restore_from(&archive).unwrap(), 2);

    let snapshot = restored.snapshot();
    assert_eq!(snapshot.root(), Some(history[2].hash()));
    assert_eq!(snapshot.head(), Some(history[3].hash()));
    assert_eq!(snapshot.status(), ChainStatus::Active);
    assert_eq!(snapshot.state(), original.snapshot().state());
    assert!(snapshot.is_trusted(&identity(2).key_id()));
    assert_eq!(restored.updates(), original.updates());
}

#[test]
fn test_restore_skips_corrupt_files() {
    let a = identity(1);
    let history = linear_history(&a, 3);
    let dir = temp_dir();
    let archive = FileArchive::new(dir.path()).unwrap();

    let original = NetworkLockBuilder::new().build().unwrap();
    for aum in &history {
        original.submit(aum.clone()).unwrap();
    }
    original.archive_to(&archive).unwrap();

    let junk = dir
        .path()
        .join(format!("{}.{}", AumHash::of(b"junk").to_base32(), ARCHIVE_EXTENSION));
    std::fs::write(&junk, [0xffu8, 0x00, 0x13, 0x37]).unwrap();
    assert_eq!(archive.hashes().unwrap().len(), 5);

    let restored = NetworkLockBuilder::new().build().unwrap();
    assert_eq!(restored.restore_from(&archive).unwrap(), 4);
    assert_eq!(restored.snapshot().head(), original.snapshot().head());
}

#[test]
fn test_restore_skips_file_named_for_another_hash() {
    let a = identity(1);
    let history = linear_history(&a, 1);
    let dir = temp_dir();
    let archive = FileArchive::new(dir.path()).unwrap();

    let alias = dir
        .path()
        .join(format!("{}.{}", AumHash::of(b"alias").to_base32(), ARCHIVE_EXTENSION));
    std::fs::write(&alias, history[0].raw()).unwrap();

    let restored = NetworkLockBuilder::new().build().unwrap();
    assert_eq!(restored.restore_from(&archive).unwrap(), 0);
    assert_eq!(restored.snapshot().status(), ChainStatus::Empty);
}

#[test]
fn test_config_file_drives_builder() {
    let dir = temp_dir();
    let path = dir.path().join("authority.json");

    let config = AuthorityConfig::default()
        .with_max_pending(3)
        .with_fetch_timeout(Duration::from_millis(250));
    config.save(&path).unwrap();

    let loaded = AuthorityConfig::load(&path).unwrap();
    assert_eq!(loaded, config);

    let lock = NetworkLockBuilder::new().with_config(loaded).build().unwrap();
    assert_eq!(lock.config().max_pending, 3);
    assert_eq!(lock.config().fetch_timeout(), Duration::from_millis(250));
}
