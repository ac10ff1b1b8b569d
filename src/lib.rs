//! Durable single-document storage for prompt packs and their progress.
//!
//! The host only offers "load the blob" and "save the blob". Everything that
//! makes that survivable (encoding, schema migration, rolling backups,
//! serialized writes, corruption repair and recovery, batched progress) lives
//! in this crate. [`PromptStore`] wires the pieces together.

pub mod backup;
pub mod codec;
pub mod errors;
pub mod host;
pub mod integrity;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod progress;
pub mod recovery;
pub mod settings;
pub mod store;
pub mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use log::{info, warn};

pub use backup::{BackupVault, RetentionPolicy};
pub use errors::{ErrorKind, ErrorReporter, Result, Severity, StoreError};
pub use host::{BlobHost, FileHost, FsBlobHost, FsFileHost, MemoryBlobHost, MemoryFileHost};
pub use metrics::MetricsCollector;
pub use models::{Document, Item, Pack, PackKind, ProgressRecord};
pub use notify::{LogNotifier, Notice, Notifier};
pub use progress::{BatchConfig, ProgressBatcher};
pub use recovery::{RecoveryMethod, RecoveryOrchestrator, RecoveryReport};
pub use settings::StoreSettings;
pub use store::{DurableStore, SaveOptions};

const DATA_FILE: &str = "prompt-data.json";
const BACKUP_DIR: &str = "backups";
const SETTINGS_FILE: &str = "settings.json";

/// Everything a caller needs, started and ready. Clones share the same store.
#[derive(Clone)]
pub struct PromptStore {
    settings: StoreSettings,
    store: DurableStore,
    progress: ProgressBatcher,
    metrics: MetricsCollector,
}

impl PromptStore {
    /// Open the store kept in `data_dir`, reading `settings.json` from the
    /// same directory when it exists.
    pub async fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref();
        let settings = StoreSettings::load(&data_dir.join(SETTINGS_FILE))
            .with_context(|| format!("failed to load settings from {}", data_dir.display()))?;
        Self::open_with_settings(data_dir, settings).await
    }

    pub async fn open_with_settings(
        data_dir: impl AsRef<Path>,
        settings: StoreSettings,
    ) -> anyhow::Result<Self> {
        let data_dir: PathBuf = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        Self::with_hosts(
            Arc::new(FsBlobHost::new(data_dir.join(DATA_FILE))),
            Arc::new(FsFileHost::new(data_dir.join(BACKUP_DIR))),
            settings,
            Arc::new(LogNotifier),
        )
        .await
    }

    /// Build on caller-supplied host primitives and notification sink.
    pub async fn with_hosts(
        host: Arc<dyn BlobHost>,
        files: Arc<dyn FileHost>,
        settings: StoreSettings,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let metrics = MetricsCollector::new();
        metrics.start(settings.metrics_interval());

        let vault = Arc::new(BackupVault::new(files, settings.retention()));
        let errors = ErrorReporter::new(settings.error_history_cap, notifier);
        let store = DurableStore::new(host, vault, errors, metrics.clone(), &settings);

        // The first load migrates legacy data and recovers damaged data.
        let startup = store.load().await;
        let document = match startup {
            Ok(document) => document,
            Err(err) => {
                metrics.stop().await;
                store.shutdown().await;
                return Err(err).context("failed to load stored prompt data");
            }
        };
        match &document {
            Some(document) => info!("prompt store opened with {} pack(s)", document.packs.len()),
            None => info!("prompt store opened with no stored data"),
        }

        let progress = ProgressBatcher::start(store.clone(), BatchConfig::from_settings(&settings));

        Ok(Self {
            settings,
            store,
            progress,
            metrics,
        })
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    pub fn progress(&self) -> &ProgressBatcher {
        &self.progress
    }

    pub fn recovery(&self) -> RecoveryOrchestrator {
        self.store.recovery()
    }

    pub fn vault(&self) -> &Arc<BackupVault> {
        self.store.vault()
    }

    pub fn errors(&self) -> &ErrorReporter {
        self.store.errors()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Flush pending progress, stop the background loops and let the write
    /// queue drain. The store rejects work afterwards.
    pub async fn shutdown(&self) {
        self.progress.shutdown().await;
        self.metrics.stop().await;
        self.store.shutdown().await;

        let errors = self.store.errors().stats();
        if errors.total > 0 {
            warn!("prompt store closed after {} recorded error(s)", errors.total);
        } else {
            info!("prompt store closed");
        }
    }
}
