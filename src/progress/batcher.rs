use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex as StdMutex, MutexGuard, Weak,
    },
    time::Duration,
};

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{Mutex, Semaphore},
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::state::{BatchState, PendingWrite};
use crate::{
    errors::{Result, StoreError},
    metrics::Operation,
    models::{ProgressArchive, ProgressRecord},
    settings::StoreSettings,
    store::DurableStore,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

/// Retry delays stop doubling after `flush_delay * 2^MAX_RETRY_SHIFT`.
const MAX_RETRY_SHIFT: u32 = 6;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Quiet period after the last update before pending records are written.
    pub flush_delay: Duration,
    /// Pending packs that force a flush without waiting for the delay.
    pub max_batch_size: usize,
    /// Packs written at the same time during one flush.
    pub max_concurrent_writes: usize,
    pub stale_after: Duration,
    pub eviction_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_settings(&StoreSettings::default())
    }
}

impl BatchConfig {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            flush_delay: settings.flush_delay(),
            max_batch_size: settings.max_batch_size.max(1),
            max_concurrent_writes: settings.max_concurrent_writes.max(1),
            stale_after: settings.stale_after(),
            eviction_interval: settings.eviction_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushSummary {
    pub written: usize,
    pub failed: usize,
    pub requeued: usize,
    /// Drained writes skipped or dropped because a newer update or a reset
    /// replaced them.
    pub superseded: usize,
}

struct DebounceTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct EvictionTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

struct BatcherInner {
    store: DurableStore,
    config: BatchConfig,
    state: Mutex<BatchState>,
    timer: StdMutex<Option<DebounceTimer>>,
    timer_generation: StdMutex<u64>,
    pack_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    writes: Semaphore,
    eviction: StdMutex<Option<EvictionTask>>,
    /// Consecutive flushes that left entries re-queued.
    retry_round: AtomicU32,
    closed: AtomicBool,
}

/// Coalesces progress updates into debounced writes through the store.
///
/// Callers see their own updates immediately through [`get`](Self::get);
/// the document only changes when a flush runs, either after the quiet
/// period or as soon as `max_batch_size` packs are waiting.
#[derive(Clone)]
pub struct ProgressBatcher {
    inner: Arc<BatcherInner>,
}

impl ProgressBatcher {
    /// Starts the eviction loop, so this must run inside a tokio runtime.
    pub fn start(store: DurableStore, config: BatchConfig) -> Self {
        let inner = Arc::new(BatcherInner {
            store,
            config,
            state: Mutex::new(BatchState::new()),
            timer: StdMutex::new(None),
            timer_generation: StdMutex::new(0),
            pack_locks: StdMutex::new(HashMap::new()),
            writes: Semaphore::new(config.max_concurrent_writes),
            eviction: StdMutex::new(None),
            retry_round: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        });

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(eviction_loop(
            Arc::downgrade(&inner),
            config.eviction_interval,
            cancel_token.clone(),
        ));
        *lock(&inner.eviction) = Some(EvictionTask {
            cancel_token,
            handle,
        });

        Self { inner }
    }

    pub fn config(&self) -> BatchConfig {
        self.inner.config
    }

    /// Progress for `pack_id`: the cached record, else the stored one, else
    /// an empty record for a pack that is not stored.
    pub async fn get(&self, pack_id: &str) -> Result<ProgressRecord> {
        if let Some(record) = self.inner.state.lock().await.get(pack_id) {
            return Ok(record);
        }

        let stored = self
            .inner
            .store
            .load()
            .await?
            .and_then(|document| document.pack(pack_id).map(|pack| pack.progress.clone()));

        match stored {
            Some(record) => {
                let mut state = self.inner.state.lock().await;
                // An update may have landed while the store was read.
                if let Some(newer) = state.get(pack_id) {
                    return Ok(newer);
                }
                state.cache(pack_id, record.clone());
                Ok(record)
            }
            None => Ok(ProgressRecord::empty()),
        }
    }

    /// Validate `record`, make it visible to [`get`](Self::get) and queue it.
    /// Flush failures never surface here; the record stays queued.
    pub async fn update(&self, pack_id: &str, record: ProgressRecord) -> Result<()> {
        record.validate()?;

        let pending = self.inner.state.lock().await.stage(pack_id, record);
        if pending >= self.inner.config.max_batch_size {
            log_info!("{pending} pack(s) pending, flushing without waiting");
            self.inner.cancel_timer();
            self.inner.flush_pending().await;
        } else {
            BatcherInner::schedule_flush(&self.inner);
        }
        Ok(())
    }

    pub async fn mark_completed(&self, pack_id: &str, item_id: &str) -> Result<ProgressRecord> {
        let mut record = self.get(pack_id).await?;
        record.completed_ids.insert(item_id.to_string());
        if let Some(used) = record.used_ids.as_mut() {
            used.insert(item_id.to_string());
        }
        record.last_access_date = Utc::now();
        self.update(pack_id, record.clone()).await?;
        Ok(record)
    }

    pub async fn record_access(&self, pack_id: &str) -> Result<ProgressRecord> {
        let mut record = self.get(pack_id).await?;
        record.last_access_date = Utc::now();
        self.update(pack_id, record.clone()).await?;
        Ok(record)
    }

    /// Replace the pack's progress with a fresh record for its kind. Written
    /// straight away; anything still queued for the pack is discarded.
    pub async fn reset(&self, pack_id: &str) -> Result<ProgressRecord> {
        let lock = self.inner.pack_lock(pack_id);
        let _pack_guard = lock.lock().await;

        self.inner.state.lock().await.forget(pack_id);

        let target = pack_id.to_string();
        let document = self
            .inner
            .store
            .update(move |document| {
                let pack = document
                    .pack_mut(&target)
                    .ok_or_else(|| StoreError::NotFound(format!("pack {target}")))?;
                pack.progress = ProgressRecord::for_kind(pack.kind);
                pack.touch();
                Ok(())
            })
            .await?;

        let record = document
            .pack(pack_id)
            .map(|pack| pack.progress.clone())
            .ok_or_else(|| StoreError::NotFound(format!("pack {pack_id}")))?;
        self.inner.state.lock().await.cache(pack_id, record.clone());
        log_info!("progress reset for pack {pack_id}");
        Ok(record)
    }

    /// Move the pack's progress into an archive file, then reset it.
    /// Returns the archive file name.
    pub async fn archive(&self, pack_id: &str) -> Result<String> {
        self.flush().await;

        let document = self
            .inner
            .store
            .load()
            .await?
            .ok_or_else(|| StoreError::NotFound("no stored document".into()))?;
        let pack = document
            .pack(pack_id)
            .ok_or_else(|| StoreError::NotFound(format!("pack {pack_id}")))?;

        let archive = ProgressArchive {
            pack_id: pack.id.clone(),
            pack_name: pack.name.clone(),
            archived_at: Utc::now(),
            progress: pack.progress.clone(),
        };
        let name = self.inner.store.vault().archive_progress(&archive).await?;
        self.reset(pack_id).await?;
        log_info!("archived progress of pack {pack_id} as {name}");
        Ok(name)
    }

    /// Write everything pending now instead of waiting for the timer.
    pub async fn flush(&self) -> FlushSummary {
        self.inner.cancel_timer();
        self.inner.flush_pending().await
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending_len()
    }

    /// Stop the eviction loop and the timer, then flush once more. Entries
    /// that still fail are logged and dropped with the batcher.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let eviction = lock(&self.inner.eviction).take();
        if let Some(task) = eviction {
            task.cancel_token.cancel();
            if let Err(err) = task.handle.await {
                log_error!("progress eviction task failed to join: {err}");
            }
        }

        let summary = self.flush().await;
        let left = self.pending_count().await;
        if left > 0 {
            log_warn!(
                "shutting down with {left} unsaved progress record(s) ({} failed)",
                summary.failed
            );
        }
    }
}

impl BatcherInner {
    /// (Re)arm the debounce timer: every call pushes the flush back by a
    /// full `flush_delay`.
    fn schedule_flush(this: &Arc<Self>) {
        Self::arm_timer(this, this.config.flush_delay);
    }

    /// Arm a flush for re-queued entries, backing off on every flush that
    /// fails again. A timer armed by an update is left alone.
    fn schedule_retry(this: &Arc<Self>) {
        if this.closed.load(Ordering::Acquire) || lock(&this.timer).is_some() {
            return;
        }
        let round = this.retry_round.fetch_add(1, Ordering::AcqRel);
        let delay = this
            .config
            .flush_delay
            .saturating_mul(1 << round.saturating_add(1).min(MAX_RETRY_SHIFT));
        log_info!("retrying re-queued progress in {delay:?}");
        Self::arm_timer(this, delay);
    }

    fn arm_timer(this: &Arc<Self>, delay: Duration) {
        let generation = {
            let mut counter = lock(&this.timer_generation);
            *counter += 1;
            *counter
        };

        let weak = Arc::downgrade(this);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // Detach from the slot first so a concurrent update cannot abort
            // this flush halfway through.
            {
                let mut slot = lock(&inner.timer);
                if slot.as_ref().map(|timer| timer.generation) != Some(generation) {
                    return;
                }
                slot.take();
            }
            inner.flush_pending().await;
        });

        let previous = lock(&this.timer).replace(DebounceTimer { generation, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.handle.abort();
        }
    }

    fn pack_lock(&self, pack_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            lock(&self.pack_locks)
                .entry(pack_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    async fn flush_pending(self: &Arc<Self>) -> FlushSummary {
        let batch = self.state.lock().await.drain();
        if batch.is_empty() {
            return FlushSummary::default();
        }

        let started = Instant::now();
        let mut writes = JoinSet::new();
        for (pack_id, write) in batch {
            let inner = Arc::clone(self);
            writes.spawn(async move {
                let result = inner.write_pack(&pack_id, &write).await;
                (pack_id, write, result)
            });
        }

        let mut summary = FlushSummary::default();
        let mut failed: Vec<(String, PendingWrite)> = Vec::new();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, _, Ok(true))) => summary.written += 1,
                Ok((_, _, Ok(false))) => summary.superseded += 1,
                Ok((pack_id, write, Err(err))) => {
                    summary.failed += 1;
                    if matches!(err, StoreError::NotFound(_)) {
                        log_warn!("dropping progress for missing pack {pack_id}");
                    } else {
                        log_warn!("progress write for pack {pack_id} failed: {err}");
                        failed.push((pack_id, write));
                    }
                }
                Err(join_err) => {
                    summary.failed += 1;
                    log_error!("progress write task failed: {join_err}");
                }
            }
        }

        if !failed.is_empty() {
            let mut state = self.state.lock().await;
            for (pack_id, write) in failed {
                if state.requeue(pack_id, write) {
                    summary.requeued += 1;
                } else {
                    summary.superseded += 1;
                }
            }
        }
        if summary.requeued > 0 {
            Self::schedule_retry(self);
        } else {
            self.retry_round.store(0, Ordering::Release);
        }

        let metrics = self.store.metrics();
        metrics
            .record(Operation::Flush, started.elapsed(), summary.failed == 0)
            .await;
        metrics.record_flushed(summary.written).await;
        log_info!(
            "progress flush: {} written, {} failed, {} re-queued, {} superseded",
            summary.written,
            summary.failed,
            summary.requeued,
            summary.superseded
        );
        summary
    }

    /// One pack at a time per pack; at most `max_concurrent_writes` packs at
    /// once overall. Returns false without writing when a newer update or a
    /// reset replaced `write` while it waited for the pack.
    async fn write_pack(&self, pack_id: &str, write: &PendingWrite) -> Result<bool> {
        let lock = self.pack_lock(pack_id);
        let _pack_guard = lock.lock().await;
        if self.state.lock().await.is_superseded(pack_id, write.seq) {
            log_info!("skipping superseded progress write for pack {pack_id}");
            return Ok(false);
        }
        let _permit = self
            .writes
            .acquire()
            .await
            .map_err(|err| StoreError::Other(err.into()))?;

        let target = pack_id.to_string();
        let record = write.record.clone();
        self.store
            .update(move |document| {
                let pack = document
                    .pack_mut(&target)
                    .ok_or_else(|| StoreError::NotFound(format!("pack {target}")))?;
                pack.progress = record.clone();
                pack.touch();
                Ok(())
            })
            .await
            .map(|_| true)
    }
}

async fn eviction_loop(
    inner: Weak<BatcherInner>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let evicted = inner
                    .state
                    .lock()
                    .await
                    .evict_stale(inner.config.stale_after, Instant::now());
                if evicted > 0 {
                    inner.store.metrics().record_evictions(evicted).await;
                    log_info!("evicted {evicted} stale progress record(s)");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("progress eviction loop shutting down");
                break;
            }
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backup::{BackupVault, RetentionPolicy},
        codec,
        errors::ErrorReporter,
        host::{MemoryBlobHost, MemoryFileHost},
        metrics::MetricsCollector,
        models::{Document, Item, Pack, PackKind},
        notify::testing::RecordingNotifier,
        store::SaveOptions,
    };

    struct Fixture {
        batcher: ProgressBatcher,
        store: DurableStore,
        host: Arc<MemoryBlobHost>,
        files: Arc<MemoryFileHost>,
        pack_ids: Vec<String>,
    }

    async fn fixture(packs: usize, config: BatchConfig) -> Fixture {
        let host = Arc::new(MemoryBlobHost::new());
        let files = Arc::new(MemoryFileHost::new());
        let vault = Arc::new(BackupVault::new(files.clone(), RetentionPolicy::default()));
        let store = DurableStore::new(
            host.clone(),
            vault,
            ErrorReporter::new(100, Arc::new(RecordingNotifier::default())),
            MetricsCollector::new(),
            &StoreSettings::default(),
        );

        let mut document = Document::default();
        for i in 0..packs {
            document.packs.push(
                Pack::new(format!("pack {i}"), PackKind::Random)
                    .with_items(vec![Item::new("one"), Item::new("two")]),
            );
        }
        let pack_ids = document.packs.iter().map(|pack| pack.id.clone()).collect();
        store
            .save(&document, SaveOptions::default().without_backup())
            .await
            .unwrap();

        Fixture {
            batcher: ProgressBatcher::start(store.clone(), config),
            store,
            host,
            files,
            pack_ids,
        }
    }

    fn stored_progress(host: &MemoryBlobHost, pack_id: &str) -> ProgressRecord {
        let document = Document::from_value(codec::decode(host.blob().unwrap())).unwrap();
        document.pack(pack_id).unwrap().progress.clone()
    }

    fn completed(ids: &[&str]) -> ProgressRecord {
        let mut record = ProgressRecord::for_kind(PackKind::Random);
        record.completed_ids.extend(ids.iter().map(|id| id.to_string()));
        record
    }

    fn ids(record: &ProgressRecord) -> Vec<String> {
        record.completed_ids.iter().cloned().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_updates_collapse_into_one_write() {
        let f = fixture(1, BatchConfig::default()).await;
        let pack_id = &f.pack_ids[0];
        let writes_before = f.host.write_count();

        for i in 0..25 {
            let id = format!("item-{i}");
            f.batcher.update(pack_id, completed(&[id.as_str()])).await.unwrap();
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        assert_eq!(f.host.write_count(), writes_before);
        assert_eq!(ids(&f.batcher.get(pack_id).await.unwrap()), ["item-24"]);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(f.host.write_count(), writes_before + 1);
        assert_eq!(ids(&stored_progress(&f.host, pack_id)), ["item-24"]);

        let metrics = f.store.metrics().snapshot().await;
        assert_eq!(metrics.flush_count, 1);
        assert_eq!(metrics.flushed_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_flushes_without_waiting() {
        let config = BatchConfig {
            max_batch_size: 3,
            ..BatchConfig::default()
        };
        let f = fixture(3, config).await;
        let writes_before = f.host.write_count();

        for pack_id in &f.pack_ids {
            f.batcher.update(pack_id, completed(&["x"])).await.unwrap();
        }

        assert_eq!(f.host.write_count(), writes_before + 3);
        assert_eq!(f.batcher.pending_count().await, 0);
        for pack_id in &f.pack_ids {
            assert_eq!(ids(&stored_progress(&f.host, pack_id)), ["x"]);
        }
    }

    #[tokio::test]
    async fn invalid_records_are_rejected_before_queueing() {
        let f = fixture(1, BatchConfig::default()).await;
        let err = f
            .batcher
            .update(&f.pack_ids[0], completed(&[""]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(f.batcher.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_writes_stay_queued() {
        let config = BatchConfig {
            max_batch_size: 1,
            ..BatchConfig::default()
        };
        let f = fixture(1, config).await;
        let pack_id = &f.pack_ids[0];
        f.host.set_unavailable(true);

        f.batcher.update(pack_id, completed(&["a"])).await.unwrap();
        assert_eq!(f.batcher.pending_count().await, 1);

        f.host.set_unavailable(false);
        let summary = f.batcher.flush().await;
        assert_eq!(summary.written, 1);
        assert_eq!(ids(&stored_progress(&f.host, pack_id)), ["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn requeued_writes_retry_without_another_update() {
        let config = BatchConfig {
            max_batch_size: 1,
            ..BatchConfig::default()
        };
        let f = fixture(1, config).await;
        let pack_id = &f.pack_ids[0];
        // Enough failures to exhaust every attempt of the first flush.
        f.host.fail_next_writes(4);

        f.batcher.update(pack_id, completed(&["a"])).await.unwrap();
        assert_eq!(f.batcher.pending_count().await, 1);
        let writes_before = f.host.write_count();

        tokio::time::sleep(f.batcher.config().flush_delay * 3).await;
        assert_eq!(f.batcher.pending_count().await, 0);
        assert_eq!(f.host.write_count(), writes_before + 1);
        assert_eq!(ids(&stored_progress(&f.host, pack_id)), ["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_write_never_replaces_a_newer_one() {
        let config = BatchConfig {
            max_batch_size: 1,
            ..BatchConfig::default()
        };
        let f = fixture(1, config).await;
        let pack_id = f.pack_ids[0].clone();
        f.host.fail_next_writes(4);

        let spawn_update = |ids: &'static [&'static str]| {
            let batcher = f.batcher.clone();
            let pack_id = pack_id.clone();
            tokio::spawn(async move { batcher.update(&pack_id, completed(ids)).await })
        };

        // "old" is still retrying when "new" queues up behind it.
        let old = spawn_update(&["old"]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let new = spawn_update(&["new"]);
        tokio::time::sleep(Duration::from_secs(10)).await;
        old.await.unwrap().unwrap();
        new.await.unwrap().unwrap();

        assert_eq!(f.batcher.pending_count().await, 0);
        assert_eq!(f.batcher.flush().await, FlushSummary::default());
        assert_eq!(ids(&stored_progress(&f.host, &pack_id)), ["new"]);
        assert_eq!(ids(&f.batcher.get(&pack_id).await.unwrap()), ["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_queued_behind_a_reset_are_skipped() {
        let config = BatchConfig {
            max_batch_size: 1,
            ..BatchConfig::default()
        };
        let f = fixture(1, config).await;
        let pack_id = f.pack_ids[0].clone();

        // Holds the pack while "stale" is drained and waits for it.
        let lock = f.batcher.inner.pack_lock(&pack_id);
        let guard = lock.lock().await;
        let stale = {
            let batcher = f.batcher.clone();
            let pack_id = pack_id.clone();
            tokio::spawn(async move { batcher.update(&pack_id, completed(&["stale"])).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.batcher.pending_count().await, 0);

        // What `reset` does once it owns the pack.
        f.batcher.inner.state.lock().await.forget(&pack_id);
        drop(guard);
        stale.await.unwrap().unwrap();

        assert!(stored_progress(&f.host, &pack_id).completed_ids.is_empty());
        assert_eq!(f.batcher.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_packs_read_as_empty_and_are_dropped_on_flush() {
        let f = fixture(1, BatchConfig::default()).await;
        assert_eq!(f.batcher.get("nope").await.unwrap().completed_ids.len(), 0);

        f.batcher.update("nope", completed(&["a"])).await.unwrap();
        let summary = f.batcher.flush().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.requeued, 0);
        assert_eq!(f.batcher.pending_count().await, 0);
    }

    #[tokio::test]
    async fn archive_moves_progress_out_and_resets() {
        let f = fixture(1, BatchConfig::default()).await;
        let pack_id = &f.pack_ids[0];
        f.batcher.mark_completed(pack_id, "one").await.unwrap();

        let name = f.batcher.archive(pack_id).await.unwrap();
        assert!(f.files.file_names().contains(&name));

        let archives = f.store.vault().list_archives(Some(pack_id.as_str())).await.unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].progress.is_completed("one"));

        let fresh = f.batcher.get(pack_id).await.unwrap();
        assert!(fresh.completed_ids.is_empty());
        assert!(stored_progress(&f.host, pack_id).completed_ids.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_evicted() {
        let config = BatchConfig {
            stale_after: Duration::from_secs(10),
            eviction_interval: Duration::from_secs(5),
            ..BatchConfig::default()
        };
        let f = fixture(1, config).await;
        f.batcher.get(&f.pack_ids[0]).await.unwrap();

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(f.store.metrics().snapshot().await.evictions, 1);
        f.batcher.shutdown().await;
    }
}
