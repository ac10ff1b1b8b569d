mod common;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tempfile::TempDir;

use common::{memory_rig, sequential_document};
use prompt_store::{
    backup::naming,
    codec, integrity,
    models::{BackupKind, BackupMetadata},
    BackupVault, Document, MemoryBlobHost, MemoryFileHost, PromptStore, RecoveryMethod,
    RetentionPolicy, SaveOptions, Severity, StoreError, StoreSettings,
};

fn truncate_data_file(dir: &TempDir) {
    let path = dir.path().join("prompt-data.json");
    let contents = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, &contents[..contents.len() / 2]).unwrap();
}

#[tokio::test]
async fn documents_survive_a_round_trip_through_disk() {
    let dir = TempDir::new().unwrap();
    let app = PromptStore::open(dir.path()).await.unwrap();
    let document = sequential_document("Morning pages");

    app.store().save(&document, SaveOptions::default()).await.unwrap();
    app.store().clear_cache();
    assert_eq!(app.store().load().await.unwrap(), Some(document.clone()));
    app.shutdown().await;

    // A second process sees the same data.
    let reopened = PromptStore::open(dir.path()).await.unwrap();
    assert_eq!(reopened.store().load().await.unwrap(), Some(document));
    reopened.shutdown().await;
}

#[tokio::test]
async fn truncated_data_is_restored_from_the_latest_backup() {
    let dir = TempDir::new().unwrap();
    let app = PromptStore::open(dir.path()).await.unwrap();
    let document = sequential_document("Journal");
    app.store().save(&document, SaveOptions::default()).await.unwrap();

    truncate_data_file(&dir);
    app.store().clear_cache();

    let report = app.recovery().recover_data().await;
    assert!(report.success);
    assert_eq!(report.method, RecoveryMethod::BackupRecovery);
    assert!(report.backup_id.is_some());
    assert_eq!(report.document.as_ref().unwrap().packs[0].name, "Journal");

    let loaded = app.store().load().await.unwrap().unwrap();
    assert_eq!(loaded.packs[0].items.len(), 2);
    app.shutdown().await;
}

#[tokio::test]
async fn truncated_data_without_backups_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let app = PromptStore::open(dir.path()).await.unwrap();
    app.store()
        .save(&sequential_document("Journal"), SaveOptions::default().without_backup())
        .await
        .unwrap();

    truncate_data_file(&dir);
    app.store().clear_cache();

    let report = app.recovery().recover_data().await;
    assert_eq!(report.method, RecoveryMethod::DefaultData);
    assert_eq!(report.document, Some(Document::default()));
    app.shutdown().await;
}

#[tokio::test]
async fn load_recovers_transparently() {
    let dir = TempDir::new().unwrap();
    let app = PromptStore::open(dir.path()).await.unwrap();
    app.store()
        .save(&sequential_document("Journal"), SaveOptions::default())
        .await
        .unwrap();
    app.shutdown().await;

    truncate_data_file(&dir);
    let reopened = PromptStore::open(dir.path()).await.unwrap();
    let loaded = reopened.store().load().await.unwrap().unwrap();
    assert_eq!(loaded.packs[0].name, "Journal");

    let history = reopened.errors().history();
    assert!(history
        .iter()
        .any(|report| report.recovery_attempted && report.recovery_successful));
    reopened.shutdown().await;
}

#[tokio::test]
async fn legacy_documents_are_migrated_on_open() {
    let legacy = json!({
        "version": "0.9.0",
        "packs": [{
            "id": "p1",
            "name": "Old pack",
            "type": "sequential",
            "prompts": [{ "content": "write something", "order": 0 }]
        }]
    });
    let rig = memory_rig(MemoryBlobHost::with_blob(legacy), StoreSettings::default()).await;

    let document = rig.app.store().load().await.unwrap().unwrap();
    assert_eq!(document.version, "1.0.0");
    assert!(document.packs[0].progress.completed_ids.is_empty());
    assert!(!document.packs[0].items[0].id.is_empty());

    // The migrated form was written back.
    let stored = codec::decode(rig.host.blob().unwrap());
    assert_eq!(stored["version"], "1.0.0");
    rig.app.shutdown().await;
}

#[tokio::test]
async fn duplicate_pack_names_fail_the_integrity_check() {
    let mut document = sequential_document("Same");
    document.packs.extend(sequential_document("Same").packs);
    let value = document.to_value().unwrap();

    let check = integrity::check(&value);
    assert!(!check.is_valid);
    assert!(check
        .errors
        .iter()
        .any(|error| error.contains("Duplicate pack name: Same")));

    let rig = memory_rig(MemoryBlobHost::new(), StoreSettings::default()).await;
    let err = rig
        .app
        .store()
        .save(&document, SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(rig.host.write_count(), 0);
    assert!(rig.files.file_names().is_empty());
    rig.app.shutdown().await;
}

#[tokio::test]
async fn concurrent_saves_reach_the_host_in_submission_order() {
    let rig = memory_rig(MemoryBlobHost::new(), StoreSettings::default()).await;
    let store = rig.app.store();
    let documents: Vec<Document> = (0..5)
        .map(|i| sequential_document(&format!("pack {i}")))
        .collect();
    let options = SaveOptions::default().without_backup();

    let results = tokio::join!(
        store.save(&documents[0], options),
        store.save(&documents[1], options),
        store.save(&documents[2], options),
        store.save(&documents[3], options),
        store.save(&documents[4], options),
    );
    assert!(results.0.is_ok() && results.4.is_ok());

    let names: Vec<String> = rig
        .host
        .writes()
        .into_iter()
        .map(|blob| codec::decode(blob)["packs"][0]["name"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..5).map(|i| format!("pack {i}")).collect();
    assert_eq!(names, expected);
    rig.app.shutdown().await;
}

#[tokio::test]
async fn retention_caps_count_and_age() {
    let files = Arc::new(MemoryFileHost::new());
    let vault = BackupVault::new(
        files.clone(),
        RetentionPolicy {
            max_backups: 3,
            max_age_days: 30,
        },
    );

    // Left behind by an earlier run, well past the age limit.
    let stale_at = Utc::now() - ChronoDuration::days(45);
    let stale_id = naming::backup_id(BackupKind::Manual, stale_at);
    let metadata = BackupMetadata {
        timestamp: stale_at,
        version: "1.0.0".into(),
        kind: BackupKind::Manual,
        size: 2,
        description: None,
    };
    files.put(&naming::data_file(&stale_id), "{}");
    files.put(
        &naming::meta_file(&stale_id),
        &serde_json::to_string(&metadata).unwrap(),
    );

    let document = sequential_document("Kept").to_value().unwrap();
    vault
        .snapshot(&document, BackupKind::Automatic, None)
        .await
        .unwrap();
    let entries = vault.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries.iter().all(|entry| entry.id != stale_id));

    for _ in 0..6 {
        vault
            .snapshot(&document, BackupKind::Automatic, None)
            .await
            .unwrap();
        let entries = vault.list().await.unwrap();
        assert!(entries.len() <= 3);
        let cutoff = Utc::now() - ChronoDuration::days(30);
        assert!(entries.iter().all(|entry| entry.metadata.timestamp >= cutoff));
    }
}

#[tokio::test(start_paused = true)]
async fn transient_write_failures_are_retried() {
    let rig = memory_rig(MemoryBlobHost::new(), StoreSettings::default()).await;
    rig.host.fail_next_writes(2);

    rig.app
        .store()
        .save(&sequential_document("Flaky"), SaveOptions::default())
        .await
        .unwrap();

    assert_eq!(rig.host.write_count(), 1);
    assert_eq!(rig.app.metrics().snapshot().await.retry_count, 2);
    assert!(rig.notifier.notices().is_empty());
    rig.app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_notify_the_user() {
    let settings = StoreSettings {
        max_retries: 1,
        ..StoreSettings::default()
    };
    let rig = memory_rig(MemoryBlobHost::new(), settings).await;
    rig.host.fail_next_writes(5);

    let err = rig
        .app
        .store()
        .save(&sequential_document("Flaky"), SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::RetriesExhausted { attempts: 2, .. }));

    let notices = rig.notifier.notices();
    assert!(notices
        .iter()
        .any(|notice| notice.severity == Severity::Critical && notice.persistent));
    rig.app.shutdown().await;
}
