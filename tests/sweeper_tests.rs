//! Retention sweeper integration tests

use std::sync::Arc;
use std::time::Duration;
use voxshift::store::ArtifactStore;
use voxshift::RetentionSweeper;

async fn store_with_artifacts(root: &std::path::Path) -> Arc<ArtifactStore> {
    let store = Arc::new(ArtifactStore::open(root, 1024).await.unwrap());
    store
        .save_original(b"original bytes", "audio/mpeg", Some("a.mp3"))
        .await
        .unwrap();
    let slot = store.allocate_derived();
    tokio::fs::write(&slot.temp_path, b"derived bytes").await.unwrap();
    let source = voxshift::store::FileId::parse("source.mp3").unwrap();
    store.commit_derived(slot, &source).await.unwrap();
    store
}

fn count_entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn fresh_artifacts_survive_a_pass() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_artifacts(dir.path()).await;

    let sweeper = RetentionSweeper::new(
        store,
        Duration::from_secs(3600),
        Duration::from_secs(1800),
    );
    let stats = sweeper.sweep_once().await;

    assert_eq!(stats.scanned, 2);
    assert_eq!(stats.removed, 0);
    assert_eq!(count_entries(&dir.path().join("incoming")), 1);
    assert_eq!(count_entries(&dir.path().join("derived")), 1);
}

#[tokio::test]
async fn expired_artifacts_are_removed_from_both_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_artifacts(dir.path()).await;

    // Everything written above is already older than a zero TTL
    tokio::time::sleep(Duration::from_millis(20)).await;
    let sweeper =
        RetentionSweeper::new(store, Duration::ZERO, Duration::from_secs(1800));
    let stats = sweeper.sweep_once().await;

    assert_eq!(stats.scanned, 2);
    assert_eq!(stats.removed, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(count_entries(&dir.path().join("incoming")), 0);
    assert_eq!(count_entries(&dir.path().join("derived")), 0);
}

#[tokio::test]
async fn per_file_failure_does_not_abort_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_artifacts(dir.path()).await;

    // A subdirectory cannot be removed with remove_file; the sweep
    // must log it and still remove the sibling artifacts.
    std::fs::create_dir(dir.path().join("incoming").join("stuck")).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let sweeper =
        RetentionSweeper::new(store, Duration::ZERO, Duration::from_secs(1800));
    let stats = sweeper.sweep_once().await;

    assert_eq!(stats.scanned, 3);
    assert_eq!(stats.removed, 2);
    assert_eq!(stats.failed, 1);
    // Only the undeletable entry remains
    assert_eq!(count_entries(&dir.path().join("incoming")), 1);
    assert_eq!(count_entries(&dir.path().join("derived")), 0);
}

#[tokio::test]
async fn cancelled_sweeper_stops() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_artifacts(dir.path()).await;

    let token = tokio_util::sync::CancellationToken::new();
    let sweeper = RetentionSweeper::new(
        store,
        Duration::from_secs(3600),
        Duration::from_secs(3600),
    );
    let handle = sweeper.spawn(token.clone());

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper should exit promptly on cancellation")
        .unwrap();
}
