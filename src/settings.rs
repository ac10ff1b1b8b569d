use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::{backup::RetentionPolicy, codec::CodecConfig};

/// Tunables for the store, the backup vault and the progress batcher.
/// Every field has a default, so a partial (or missing) settings file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub cache_ttl_ms: u64,
    /// Compare the cached hash with the host's current blob on every load.
    /// Costs one extra host read per load; turning it off trusts the cache
    /// for its whole TTL.
    pub verify_cache_against_host: bool,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,

    pub max_backups: usize,
    pub max_backup_age_days: i64,

    pub compression_threshold_bytes: usize,
    pub compression_max_ratio: f64,

    pub error_history_cap: usize,

    pub flush_delay_ms: u64,
    pub max_batch_size: usize,
    pub max_concurrent_writes: usize,
    pub stale_after_ms: u64,
    pub eviction_interval_ms: u64,

    pub metrics_interval_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 30_000,
            verify_cache_against_host: true,
            max_retries: 3,
            retry_base_delay_ms: 100,
            max_backups: crate::backup::DEFAULT_MAX_BACKUPS,
            max_backup_age_days: crate::backup::DEFAULT_MAX_AGE_DAYS,
            compression_threshold_bytes: crate::codec::DEFAULT_THRESHOLD_BYTES,
            compression_max_ratio: crate::codec::DEFAULT_MAX_RATIO,
            error_history_cap: crate::errors::DEFAULT_HISTORY_CAP,
            flush_delay_ms: 1_000,
            max_batch_size: 10,
            max_concurrent_writes: 3,
            stale_after_ms: 5 * 60 * 1_000,
            eviction_interval_ms: 60 * 1_000,
            metrics_interval_secs: 300,
        }
    }
}

impl StoreSettings {
    /// Reads settings from `path`. A missing file gives the defaults and so
    /// does a file that does not parse; only an unreadable file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("ignoring malformed settings at {}: {err}", path.display());
                StoreSettings::default()
            })
        } else {
            StoreSettings::default()
        };

        let debug_mode = std::env::var("PROMPT_STORE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            settings.metrics_interval_secs = settings.metrics_interval_secs.min(10);
        }

        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms.max(1))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_backups: self.max_backups,
            max_age_days: self.max_backup_age_days,
        }
    }

    pub fn codec(&self) -> CodecConfig {
        CodecConfig {
            threshold_bytes: self.compression_threshold_bytes,
            max_ratio: self.compression_max_ratio,
        }
    }
}
