mod types;

pub use types::{MetricsSnapshot, Operation, OperationMetrics};

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use chrono::Utc;
use log::info;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MAX_RECENT_OPERATIONS: usize = 20;

/// Shared counters for the store and the batcher. Cloning hands out another
/// handle to the same state.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
    summary: Arc<StdMutex<Option<SummaryTask>>>,
}

struct SummaryTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct MetricsState {
    recent_operations: Vec<OperationMetrics>,
    save_count: u64,
    load_count: u64,
    failure_count: u64,
    cache_hits: u64,
    cache_misses: u64,
    retry_count: u64,
    recovery_count: u64,
    backup_count: u64,
    flush_count: u64,
    flushed_entries: u64,
    evictions: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_operations: Vec::with_capacity(MAX_RECENT_OPERATIONS),
                ..MetricsState::default()
            })),
            summary: Arc::new(StdMutex::new(None)),
        }
    }

    pub async fn record(&self, operation: Operation, duration: Duration, success: bool) {
        let mut state = self.inner.lock().await;

        match operation {
            Operation::Save => state.save_count += 1,
            Operation::Load => state.load_count += 1,
            Operation::Recovery => state.recovery_count += 1,
            Operation::Flush => state.flush_count += 1,
            Operation::Backup => state.backup_count += 1,
        }
        if !success {
            state.failure_count += 1;
        }

        state.recent_operations.push(OperationMetrics {
            timestamp: Utc::now(),
            operation,
            duration_ms: duration.as_millis() as u64,
            success,
        });

        if state.recent_operations.len() > MAX_RECENT_OPERATIONS {
            state.recent_operations.remove(0);
        }
    }

    pub async fn record_cache(&self, hit: bool) {
        let mut state = self.inner.lock().await;
        if hit {
            state.cache_hits += 1;
        } else {
            state.cache_misses += 1;
        }
    }

    pub async fn record_retry(&self) {
        self.inner.lock().await.retry_count += 1;
    }

    pub async fn record_flushed(&self, entries: usize) {
        self.inner.lock().await.flushed_entries += entries as u64;
    }

    pub async fn record_evictions(&self, evicted: usize) {
        self.inner.lock().await.evictions += evicted as u64;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;
        MetricsSnapshot {
            recent_operations: state.recent_operations.clone(),
            save_count: state.save_count,
            load_count: state.load_count,
            failure_count: state.failure_count,
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            retry_count: state.retry_count,
            recovery_count: state.recovery_count,
            backup_count: state.backup_count,
            flush_count: state.flush_count,
            flushed_entries: state.flushed_entries,
            evictions: state.evictions,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        *state = MetricsState::default();
    }

    /// Log a one-line summary every `interval` until [`stop`](Self::stop).
    /// Calling it again replaces the running logger.
    pub fn start(&self, interval: Duration) {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let collector = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first
            // summary covers a full interval.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => collector.log_summary().await,
                    _ = token.cancelled() => break,
                }
            }
        });

        let previous = self.summary_slot().replace(SummaryTask {
            cancel_token,
            handle,
        });
        if let Some(previous) = previous {
            previous.cancel_token.cancel();
        }
    }

    pub async fn stop(&self) {
        let task = self.summary_slot().take();
        if let Some(task) = task {
            task.cancel_token.cancel();
            if let Err(err) = task.handle.await {
                log::error!("metrics summary task failed to join: {err}");
            }
        }
    }

    async fn log_summary(&self) {
        let snapshot = self.snapshot().await;
        info!(
            "store metrics: saves={} loads={} failures={} cache_hit_rate={:.2} retries={} recoveries={} flushes={} ({} entries) evictions={} avg_save_ms={}",
            snapshot.save_count,
            snapshot.load_count,
            snapshot.failure_count,
            snapshot.cache_hit_rate(),
            snapshot.retry_count,
            snapshot.recovery_count,
            snapshot.flush_count,
            snapshot.flushed_entries,
            snapshot.evictions,
            snapshot
                .average_ms(Operation::Save)
                .map(|ms| format!("{ms:.1}"))
                .unwrap_or_else(|| "-".into()),
        );
    }

    fn summary_slot(&self) -> std::sync::MutexGuard<'_, Option<SummaryTask>> {
        match self.summary.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            summary: Arc::clone(&self.summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recent_window_is_bounded() {
        let metrics = MetricsCollector::new();
        for _ in 0..30 {
            metrics
                .record(Operation::Save, Duration::from_millis(2), true)
                .await;
        }
        metrics.record(Operation::Load, Duration::from_millis(1), false).await;
        metrics.record_cache(true).await;
        metrics.record_cache(false).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.recent_operations.len(), MAX_RECENT_OPERATIONS);
        assert_eq!(snapshot.save_count, 30);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.cache_hit_rate(), 0.5);
        assert_eq!(snapshot.average_ms(Operation::Save), Some(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn summary_loop_stops() {
        let metrics = MetricsCollector::new();
        metrics.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        metrics.stop().await;
        assert!(metrics.summary_slot().is_none());
    }
}
