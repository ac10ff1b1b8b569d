//! Recovery cascade for a document that cannot be loaded.
//!
//! Strategies run in [`RecoveryStrategy::CASCADE`] order and the first one
//! that produces a valid, persisted document wins:
//!
//! 1. repair the current data in place,
//! 2. restore and repair backups, newest first,
//! 3. write a fresh default document.
//!
//! Only when even the default document cannot be written does recovery fail,
//! and that is the one outcome the user is always told about.

mod report;

pub use report::{FailedAttempt, RecoveryMethod, RecoveryReport};

use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    errors::{ErrorContext, Result, StoreError},
    integrity,
    metrics::Operation,
    models::Document,
    store::{migrations, DurableStore, SaveOptions},
};

const COMPONENT: &str = "recovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    DataRepair,
    BackupRecovery,
    DefaultData,
}

impl RecoveryStrategy {
    pub const CASCADE: [RecoveryStrategy; 3] = [
        RecoveryStrategy::DataRepair,
        RecoveryStrategy::BackupRecovery,
        RecoveryStrategy::DefaultData,
    ];

    pub fn method(&self) -> RecoveryMethod {
        match self {
            RecoveryStrategy::DataRepair => RecoveryMethod::DataRepair,
            RecoveryStrategy::BackupRecovery => RecoveryMethod::BackupRecovery,
            RecoveryStrategy::DefaultData => RecoveryMethod::DefaultData,
        }
    }
}

pub struct RecoveryOrchestrator {
    store: DurableStore,
}

impl RecoveryOrchestrator {
    pub fn new(store: DurableStore) -> Self {
        Self { store }
    }

    /// Run the cascade on request, without a triggering failure.
    pub async fn recover_data(&self) -> RecoveryReport {
        let report = self.run_cascade().await;
        self.finish(None, &report);
        report
    }

    /// Run the cascade because `cause` made the stored document unusable.
    pub async fn recover_from(&self, cause: &StoreError) -> RecoveryReport {
        let report = self.run_cascade().await;
        self.finish(Some(cause), &report);
        report
    }

    async fn run_cascade(&self) -> RecoveryReport {
        let started = Instant::now();
        let mut report = RecoveryReport::pending();

        for strategy in RecoveryStrategy::CASCADE {
            let outcome = match strategy {
                RecoveryStrategy::DataRepair => self.repair_current(&mut report).await,
                RecoveryStrategy::BackupRecovery => self.restore_from_backups(&mut report).await,
                RecoveryStrategy::DefaultData => self.write_defaults().await,
            };

            match outcome {
                Ok(document) => {
                    report.succeed(strategy.method(), document);
                    break;
                }
                Err(err) => {
                    warn!("recovery strategy {} failed: {err}", strategy.method().as_str());
                    report.failed(strategy, None, &err);
                }
            }
        }

        let elapsed = started.elapsed();
        report.duration_ms = elapsed.as_millis() as u64;
        self.store
            .metrics()
            .record(Operation::Recovery, elapsed, report.success)
            .await;
        report
    }

    async fn repair_current(&self, report: &mut RecoveryReport) -> Result<Document> {
        let raw = self
            .store
            .read_raw()
            .await?
            .ok_or_else(|| StoreError::NotFound("no current data to repair".into()))?;
        require_object(&raw, "current data")?;

        let found = integrity::check(&raw);
        report
            .issues_found
            .extend(found.errors.into_iter().chain(found.warnings));

        let (document, fixed) = salvage(raw)?;
        self.store.save(&document, SaveOptions::default()).await?;
        report.issues_fixed.extend(fixed);
        Ok(document)
    }

    async fn restore_from_backups(&self, report: &mut RecoveryReport) -> Result<Document> {
        let vault = self.store.vault();
        let entries = vault.list().await?;
        if entries.is_empty() {
            return Err(StoreError::NotFound("no backups available".into()));
        }

        for entry in entries {
            let salvaged = match vault.read_snapshot(&entry.id).await {
                Ok(raw) => require_object(&raw, "backup").and_then(|()| salvage(raw)),
                Err(err) => Err(err),
            };
            let (document, fixed) = match salvaged {
                Ok(salvaged) => salvaged,
                Err(err) => {
                    warn!("backup {} is not usable: {err}", entry.id);
                    report.failed(RecoveryStrategy::BackupRecovery, Some(&entry.id), err);
                    continue;
                }
            };

            // A write failure here would hit every later backup the same way.
            self.store.save(&document, SaveOptions::default()).await?;
            info!("recovered from backup {}", entry.id);
            report.issues_fixed.extend(fixed);
            report.backup_id = Some(entry.id);
            return Ok(document);
        }

        Err(StoreError::RecoveryFailed("no backup could be restored".into()))
    }

    async fn write_defaults(&self) -> Result<Document> {
        let document = Document::default();
        self.store
            .save(&document, SaveOptions::default().without_backup())
            .await?;
        Ok(document)
    }

    fn finish(&self, cause: Option<&StoreError>, report: &RecoveryReport) {
        let context = ErrorContext::new(COMPONENT, "recover_data");
        let errors = self.store.errors();

        if report.success {
            info!(
                "recovery succeeded via {} in {}ms",
                report.method.as_str(),
                report.duration_ms
            );
            if let Some(cause) = cause {
                errors.record(cause, context, true, true);
            }
            return;
        }

        error!(
            "all recovery strategies failed after {} attempt(s)",
            report.failed_attempts.len()
        );
        let failure = StoreError::RecoveryFailed(
            report
                .failed_attempts
                .last()
                .map(|attempt| attempt.error.clone())
                .unwrap_or_else(|| "no strategy succeeded".into()),
        );
        // Critical severity: the reporter raises a notice that stays up
        // until the user dismisses it.
        errors.record(cause.unwrap_or(&failure), context, true, false);
    }
}

/// Repair turns anything into a document, so a value that is not even an
/// object is treated as lost rather than "repaired" into an empty one.
fn require_object(raw: &Value, what: &str) -> Result<()> {
    if raw.is_object() {
        Ok(())
    } else {
        Err(StoreError::corruption(format!(
            "{what} is not an object; nothing to repair"
        )))
    }
}

/// Migrate, repair, then put the result through the normal admission gate.
fn salvage(raw: Value) -> Result<(Document, Vec<String>)> {
    let outcome = integrity::repair(migrations::migrate(raw));
    let admitted = integrity::admit(outcome.repaired)?;
    Ok((admitted.document, outcome.fixed_issues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backup::{naming, BackupVault, RetentionPolicy},
        errors::{ErrorReporter, Severity},
        host::{MemoryBlobHost, MemoryFileHost},
        metrics::MetricsCollector,
        models::{BackupKind, Item, Pack, PackKind},
        notify::testing::RecordingNotifier,
        settings::StoreSettings,
    };
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        store: DurableStore,
        host: Arc<MemoryBlobHost>,
        files: Arc<MemoryFileHost>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(MemoryBlobHost::new());
        let files = Arc::new(MemoryFileHost::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let vault = Arc::new(BackupVault::new(files.clone(), RetentionPolicy::default()));
        let settings = StoreSettings {
            max_retries: 0,
            ..StoreSettings::default()
        };
        let store = DurableStore::new(
            host.clone(),
            vault,
            ErrorReporter::new(100, notifier.clone()),
            MetricsCollector::new(),
            &settings,
        );
        Fixture {
            store,
            host,
            files,
            notifier,
        }
    }

    fn sample(name: &str) -> Document {
        let mut doc = Document::default();
        doc.packs
            .push(Pack::new(name, PackKind::Random).with_items(vec![Item::new("hello")]));
        doc
    }

    #[tokio::test]
    async fn repairable_current_data_is_fixed_in_place() {
        let f = fixture();
        f.host.set_blob(Some(json!({
            "version": "1.0.0",
            "globalSettings": { "linkHandling": "hyperspace" },
            "packs": [
                { "id": "a", "name": "Dup", "type": "random", "prompts": [] },
                { "id": "b", "name": "Dup", "type": "random", "prompts": [] }
            ]
        })));

        let report = f.store.recovery().recover_data().await;
        assert!(report.success);
        assert_eq!(report.method, RecoveryMethod::DataRepair);
        assert!(!report.issues_found.is_empty());
        assert!(report.issues_fixed.iter().any(|fix| fix.contains("Dup (2)")));

        let stored = f.store.load().await.unwrap().unwrap();
        assert_eq!(stored.packs[1].name, "Dup (2)");
        assert!(f.notifier.taken().is_empty());
    }

    #[tokio::test]
    async fn unreadable_data_falls_back_to_newest_usable_backup() {
        let f = fixture();
        let vault = f.store.vault();
        let older = vault
            .snapshot(&sample("older").to_value().unwrap(), BackupKind::Automatic, None)
            .await
            .unwrap();
        let newest = vault
            .snapshot(&sample("newest").to_value().unwrap(), BackupKind::Automatic, None)
            .await
            .unwrap();
        f.files.put(&naming::data_file(&newest), "{\"version\": \"1.0");
        f.host.set_blob(Some(json!("{\"version\": \"1.0.0\", \"pa")));

        let report = f.store.recovery().recover_data().await;
        assert!(report.success);
        assert_eq!(report.method, RecoveryMethod::BackupRecovery);
        assert_eq!(report.backup_id.as_deref(), Some(older.as_str()));
        assert!(report
            .failed_attempts
            .iter()
            .any(|attempt| attempt.backup_id.as_deref() == Some(newest.as_str())));
        assert_eq!(report.document.unwrap().packs[0].name, "older");
    }

    #[tokio::test]
    async fn no_backups_means_default_data() {
        let f = fixture();
        f.host.set_blob(Some(json!(42)));

        let report = f.store.recovery().recover_data().await;
        assert_eq!(report.method, RecoveryMethod::DefaultData);
        assert_eq!(report.document, Some(Document::default()));
        // Nothing worth preserving, so no snapshot of the defaults either.
        assert!(f.store.vault().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn total_failure_is_critical_and_sticky() {
        let f = fixture();
        f.host.set_unavailable(true);

        let cause = StoreError::HostUnavailable("gone".into());
        let report = f.store.recovery().recover_from(&cause).await;
        assert!(!report.success);
        assert_eq!(report.method, RecoveryMethod::AllFailed);
        assert!(report.document.is_none());

        // The failed default write raises its own notice first.
        let notices = f.notifier.taken();
        let last = notices.last().unwrap();
        assert_eq!(last.severity, Severity::Critical);
        assert!(last.persistent);
        assert_eq!(notices.iter().filter(|notice| notice.persistent).count(), 1);
    }
}
