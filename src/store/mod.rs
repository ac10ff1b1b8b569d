//! The durable store: the only way anything reaches the host blob.
//!
//! Every host read and write runs as a job on the [`WriteQueue`], so saves
//! are strictly FIFO and a load never sees a half-finished write. Loads are
//! served from a one-slot cache while it is fresh and, unless disabled, while
//! the host still holds exactly the blob the cache was built from.

pub mod cache;
pub mod helpers;
pub mod migrations;
pub mod queue;

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, info, warn};
use rand::Rng;
use serde_json::Value;
use tokio::time::Instant;

pub use cache::CacheStatus;
use cache::DocumentCache;
use queue::WriteQueue;

use crate::{
    backup::BackupVault,
    codec::{self, CodecConfig},
    errors::{ErrorContext, ErrorReporter, Result, StoreError},
    host::BlobHost,
    integrity::{self, IntegrityCheck},
    metrics::{MetricsCollector, Operation},
    models::{BackupKind, Document},
    recovery::RecoveryOrchestrator,
    settings::StoreSettings,
};

const COMPONENT: &str = "store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Snapshot the document into the vault before the first write attempt.
    pub create_backup: bool,
    /// Run the structural check first; failures go straight back to the caller.
    pub validate: bool,
    /// Retry transient host failures with exponential backoff.
    pub retry_on_failure: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            validate: true,
            retry_on_failure: true,
        }
    }
}

impl SaveOptions {
    pub fn without_backup(mut self) -> Self {
        self.create_backup = false;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct StoreConfig {
    codec: CodecConfig,
    max_retries: u32,
    retry_base_delay: Duration,
    verify_cache_against_host: bool,
}

impl StoreConfig {
    fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            codec: settings.codec(),
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay(),
            verify_cache_against_host: settings.verify_cache_against_host,
        }
    }

    /// `base * 2^attempt` plus up to a quarter of `base` of jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_base_delay;
        let jitter_ms = (base.as_millis() as u64) / 4;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        base.saturating_mul(2u32.saturating_pow(attempt.min(16)))
            + Duration::from_millis(jitter)
    }
}

struct StoreInner {
    host: Arc<dyn BlobHost>,
    vault: Arc<BackupVault>,
    queue: WriteQueue,
    cache: Mutex<DocumentCache>,
    errors: ErrorReporter,
    metrics: MetricsCollector,
    config: StoreConfig,
}

#[derive(Clone)]
pub struct DurableStore {
    inner: Arc<StoreInner>,
}

impl DurableStore {
    /// Starts the write queue worker, so this must run inside a tokio runtime.
    pub fn new(
        host: Arc<dyn BlobHost>,
        vault: Arc<BackupVault>,
        errors: ErrorReporter,
        metrics: MetricsCollector,
        settings: &StoreSettings,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                host,
                vault,
                queue: WriteQueue::start(),
                cache: Mutex::new(DocumentCache::new(settings.cache_ttl())),
                errors,
                metrics,
                config: StoreConfig::from_settings(settings),
            }),
        }
    }

    pub fn vault(&self) -> &Arc<BackupVault> {
        &self.inner.vault
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.inner.errors
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    pub fn recovery(&self) -> RecoveryOrchestrator {
        RecoveryOrchestrator::new(self.clone())
    }

    pub async fn save(&self, document: &Document, options: SaveOptions) -> Result<()> {
        let started = Instant::now();
        let document = document.clone();
        let inner = Arc::clone(&self.inner);
        let result = self
            .inner
            .queue
            .execute(async move { inner.write(document, options).await })
            .await;
        self.inner
            .metrics
            .record(Operation::Save, started.elapsed(), result.is_ok())
            .await;
        result
    }

    /// `Ok(None)` only when nothing was ever stored. Damaged data goes
    /// through the recovery cascade; an error here means it found nothing
    /// usable either.
    pub async fn load(&self) -> Result<Option<Document>> {
        let started = Instant::now();
        let result = self.load_current().await;
        self.inner
            .metrics
            .record(Operation::Load, started.elapsed(), result.is_ok())
            .await;
        result
    }

    async fn load_current(&self) -> Result<Option<Document>> {
        if !self.inner.config.verify_cache_against_host {
            if let Some(document) = self.inner.cached_if_current(None) {
                self.inner.metrics.record_cache(true).await;
                return Ok(Some(document));
            }
        }

        let inner = Arc::clone(&self.inner);
        let raw = self
            .inner
            .queue
            .execute(async move { inner.read_blob().await })
            .await;

        if let Ok(Some(blob)) = &raw {
            if let Some(document) = self.inner.cached_if_current(Some(blob)) {
                self.inner.metrics.record_cache(true).await;
                return Ok(Some(document));
            }
        }
        self.inner.metrics.record_cache(false).await;

        match raw {
            Ok(None) => {
                self.inner.lock_cache().clear();
                Ok(None)
            }
            Ok(Some(blob)) => {
                let blob_hash = codec::hash(&blob);
                match integrity::admit(codec::decode(blob)) {
                    Ok(admitted) => {
                        for warning in &admitted.check.warnings {
                            debug!("loaded document: {warning}");
                        }
                        if admitted.migration.changed() {
                            self.persist_migrated(&admitted.document).await;
                        } else {
                            self.inner
                                .lock_cache()
                                .put(admitted.document.clone(), blob_hash);
                        }
                        Ok(Some(admitted.document))
                    }
                    Err(err) => self.recover_after(err).await.map(Some),
                }
            }
            Err(err) if err.needs_recovery() => self.recover_after(err).await.map(Some),
            Err(err) => {
                self.inner
                    .errors
                    .report(&err, ErrorContext::new(COMPONENT, "load"));
                Err(err)
            }
        }
    }

    async fn persist_migrated(&self, document: &Document) {
        info!("persisting document migrated to {}", document.version);
        if let Err(err) = self.save(document, SaveOptions::default()).await {
            warn!("migrated document could not be written back: {err}");
        }
    }

    async fn recover_after(&self, cause: StoreError) -> Result<Document> {
        warn!("load failed ({cause}); starting recovery");
        let report = self.recovery().recover_from(&cause).await;
        match report.document {
            Some(document) if report.success => {
                info!(
                    "recovered document via {} ({} issue(s) fixed)",
                    report.method.as_str(),
                    report.issues_fixed.len()
                );
                Ok(document)
            }
            _ => Err(StoreError::RecoveryFailed(format!(
                "{cause}; every recovery strategy failed"
            ))),
        }
    }

    /// Atomic read-modify-write of the whole document, run as a single queue
    /// job so concurrent mutators never overwrite each other. Starts from an
    /// empty document when nothing is stored yet. Damaged stored data is
    /// recovered once and the mutation retried.
    pub async fn update<F>(&self, mutate: F) -> Result<Document>
    where
        F: Fn(&mut Document) -> Result<()> + Send + Sync + 'static,
    {
        let mutate = Arc::new(mutate);
        match self.update_once(Arc::clone(&mutate)).await {
            Err(err) if err.needs_recovery() => {
                self.recover_after(err).await?;
                self.update_once(mutate).await
            }
            other => other,
        }
    }

    async fn update_once<F>(&self, mutate: Arc<F>) -> Result<Document>
    where
        F: Fn(&mut Document) -> Result<()> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let inner = Arc::clone(&self.inner);
        let result = self
            .inner
            .queue
            .execute(async move {
                let mut document = inner.current_document().await?.unwrap_or_default();
                (*mutate)(&mut document)?;
                inner
                    .write(document.clone(), SaveOptions::default())
                    .await?;
                Ok(document)
            })
            .await;
        self.inner
            .metrics
            .record(Operation::Save, started.elapsed(), result.is_ok())
            .await;
        result
    }

    /// Manual snapshot of the current document.
    pub async fn create_backup(&self, description: Option<&str>) -> Result<String> {
        let document = self
            .load()
            .await?
            .ok_or_else(|| StoreError::NotFound("no stored document to back up".into()))?;

        let started = Instant::now();
        let result = self
            .inner
            .vault
            .snapshot(&document.to_value()?, BackupKind::Manual, description)
            .await;
        self.inner
            .metrics
            .record(Operation::Backup, started.elapsed(), result.is_ok())
            .await;
        result
    }

    /// Validate a backup and make it the current document.
    pub async fn restore_backup(&self, id: &str) -> Result<Document> {
        let document = self.inner.vault.restore(id).await?;
        self.save(&document, SaveOptions::default()).await?;
        info!("document restored from backup {id}");
        Ok(document)
    }

    /// Structural check of what the host holds right now.
    pub async fn check_integrity(&self) -> Result<IntegrityCheck> {
        let raw = self
            .read_raw()
            .await?
            .ok_or_else(|| StoreError::NotFound("no stored document".into()))?;
        Ok(integrity::check(&raw))
    }

    /// The stored document, decoded but not validated.
    pub(crate) async fn read_raw(&self) -> Result<Option<Value>> {
        let inner = Arc::clone(&self.inner);
        let blob = self
            .inner
            .queue
            .execute(async move { inner.read_blob().await })
            .await?;
        Ok(blob.map(codec::decode))
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.inner.lock_cache().status()
    }

    pub fn clear_cache(&self) {
        self.inner.lock_cache().clear();
    }

    /// Lets every queued job finish, then stops the queue worker.
    pub async fn shutdown(&self) {
        self.inner.queue.shutdown().await;
    }
}

impl StoreInner {
    fn lock_cache(&self) -> MutexGuard<'_, DocumentCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The cached document if it may be served for `blob`, the host's
    /// current content. Without host verification `blob` is ignored.
    fn cached_if_current(&self, blob: Option<&Value>) -> Option<Document> {
        let cache = self.lock_cache();
        let entry = cache.fresh()?;
        if !self.config.verify_cache_against_host {
            return Some(entry.document.clone());
        }
        let blob = blob?;
        (codec::hash(blob) == entry.blob_hash).then(|| entry.document.clone())
    }

    async fn read_blob(&self) -> Result<Option<Value>> {
        let mut attempt = 0;
        loop {
            match self.host.load_blob().await {
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    attempt += 1;
                    self.metrics.record_retry().await;
                    warn!("read attempt {attempt} failed ({err}); retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Only called from inside a queue job.
    async fn current_document(&self) -> Result<Option<Document>> {
        if !self.config.verify_cache_against_host {
            if let Some(document) = self.cached_if_current(None) {
                return Ok(Some(document));
            }
        }
        let Some(blob) = self.read_blob().await? else {
            return Ok(None);
        };
        if let Some(document) = self.cached_if_current(Some(&blob)) {
            return Ok(Some(document));
        }
        Ok(Some(integrity::admit(codec::decode(blob))?.document))
    }

    /// validate -> backup -> encode -> write, retrying transient host
    /// failures. Every attempt validates again; the snapshot is taken once.
    /// Only called from inside a queue job.
    async fn write(&self, document: Document, options: SaveOptions) -> Result<()> {
        let value = document.to_value()?;
        let mut blob: Option<(Value, String)> = None;
        let mut attempt: u32 = 0;

        loop {
            if options.validate {
                self.validate_for_save(&value)?;
            }
            let (encoded, blob_hash) = match blob.clone() {
                Some(prepared) => prepared,
                None => {
                    if options.create_backup {
                        self.backup_before_write(&value).await;
                    }
                    let encoded = codec::encode_with(&value, &self.config.codec).into_value();
                    let blob_hash = codec::hash(&encoded);
                    blob = Some((encoded.clone(), blob_hash.clone()));
                    (encoded, blob_hash)
                }
            };

            match self.host.save_blob(encoded).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!("save succeeded after {attempt} retry attempt(s)");
                    }
                    self.lock_cache().put(document, blob_hash);
                    return Ok(());
                }
                Err(err)
                    if err.is_transient()
                        && options.retry_on_failure
                        && attempt < self.config.max_retries =>
                {
                    let delay = self.config.backoff(attempt);
                    attempt += 1;
                    self.metrics.record_retry().await;
                    warn!("save attempt {attempt} failed ({err}); retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let attempts = attempt + 1;
                    let err = if err.is_transient() && options.retry_on_failure {
                        StoreError::RetriesExhausted {
                            attempts,
                            source: Box::new(err),
                        }
                    } else {
                        err
                    };
                    self.errors.record(
                        &err,
                        ErrorContext::new(COMPONENT, "save"),
                        attempts > 1,
                        false,
                    );
                    return Err(err);
                }
            }
        }
    }

    fn validate_for_save(&self, value: &Value) -> Result<()> {
        let check = integrity::check(value);
        if check.is_valid {
            return Ok(());
        }
        let err = StoreError::Validation(check.errors);
        self.errors.report(&err, ErrorContext::new(COMPONENT, "save"));
        Err(err)
    }

    /// A failed snapshot is reported but never blocks the save itself.
    async fn backup_before_write(&self, value: &Value) {
        let started = Instant::now();
        let result = self
            .vault
            .snapshot(value, BackupKind::Automatic, None)
            .await;
        self.metrics
            .record(Operation::Backup, started.elapsed(), result.is_ok())
            .await;
        if let Err(err) = result {
            warn!("automatic backup failed, saving anyway: {err}");
            self.errors
                .report(&err, ErrorContext::new("backup", "snapshot"));
        }
    }
}
