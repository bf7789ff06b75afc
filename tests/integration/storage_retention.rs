//! Version history behaviour through the public storage API

use chrono::{Duration, Utc};
use usage_keeper::config::StorageConfig;
use usage_keeper::storage::{parse_timestamp_from_filename, StorageError, StorageIssue};
use usage_keeper::VersionedStorage;

fn storage(dir: &std::path::Path, retention_days: u32, max_versions: usize) -> VersionedStorage {
    VersionedStorage::from_config(&StorageConfig {
        directory: dir.join("versions").to_string_lossy().into_owned(),
        latest_file: Some(dir.join("current.json").to_string_lossy().into_owned()),
        retention_days,
        max_versions,
    })
    .expect("Failed to open storage")
}

#[tokio::test]
async fn test_history_grows_then_retention_trims() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path(), 0, 2);

    for n in 0..5 {
        storage
            .save_version(&serde_json::json!({ "n": n }))
            .await
            .unwrap();
    }

    assert_eq!(storage.list_versions(None).await.unwrap().len(), 5);
    assert_eq!(storage.list_versions(Some(3)).await.unwrap().len(), 3);

    // Custom latest location outside the version directory
    assert!(dir.path().join("current.json").exists());
    let latest: serde_json::Value = storage.load_latest().await.unwrap().unwrap();
    assert_eq!(latest["n"], serde_json::json!(4));

    // A zero-day window holds nothing, so only the count floor applies
    let report = storage
        .cleanup_old_versions_at(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(report.kept, 2);
    assert_eq!(report.deleted, 3);
    assert_eq!(report.failed, 0);

    let metadata = storage.metadata().await;
    assert_eq!(metadata.version_count, 2);
    assert_eq!(metadata.total_versions_created, 5);
    assert_eq!(metadata.total_versions_deleted, 3);
    assert!(metadata.last_cleanup.is_some());
    assert!(metadata.oldest_timestamp <= metadata.newest_timestamp);
}

#[tokio::test]
async fn test_foreign_files_are_ignored_and_kept() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path(), 7, 1);

    let saved = storage.save_version(&serde_json::json!({})).await.unwrap();
    std::fs::write(storage.dir().join("README.txt"), "notes").unwrap();
    std::fs::write(storage.dir().join("backup.json"), "{}").unwrap();

    let versions = storage.list_versions(None).await.unwrap();
    assert_eq!(versions, vec![saved.clone()]);
    assert!(parse_timestamp_from_filename(
        saved.file_name().unwrap().to_str().unwrap()
    )
    .is_some());

    let report = storage
        .cleanup_old_versions_at(Utc::now() + Duration::days(30))
        .await
        .unwrap();
    assert_eq!(report.deleted, 0);
    assert!(storage.dir().join("README.txt").exists());
    assert!(storage.dir().join("backup.json").exists());
}

#[tokio::test]
async fn test_health_failure_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(dir.path(), 7, 100);
    std::fs::remove_dir_all(storage.dir()).unwrap();

    let health = storage.can_write_to_storage().await;
    assert!(!health.writable);
    assert_eq!(health.issue, Some(StorageIssue::MissingDirectory));

    match storage.save_version(&serde_json::json!({})).await {
        Err(StorageError::HealthCheck { issue, .. }) => {
            assert_eq!(issue, StorageIssue::MissingDirectory)
        }
        other => panic!("Expected a health check failure, got {:?}", other),
    }
    assert!(!dir.path().join("current.json").exists());
}
