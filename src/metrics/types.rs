use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Save,
    Load,
    Recovery,
    Flush,
    Backup,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Save => "save",
            Operation::Load => "load",
            Operation::Recovery => "recovery",
            Operation::Flush => "flush",
            Operation::Backup => "backup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    pub duration_ms: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub recent_operations: Vec<OperationMetrics>,
    pub save_count: u64,
    pub load_count: u64,
    pub failure_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub retry_count: u64,
    pub recovery_count: u64,
    pub backup_count: u64,
    pub flush_count: u64,
    pub flushed_entries: u64,
    pub evictions: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn average_ms(&self, operation: Operation) -> Option<f64> {
        let samples: Vec<u64> = self
            .recent_operations
            .iter()
            .filter(|sample| sample.operation == operation)
            .map(|sample| sample.duration_ms)
            .collect();
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<u64>() as f64 / samples.len() as f64)
        }
    }
}
