use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PackKind;
use crate::errors::{Result, StoreError};

/// Per-pack delivery state. Sequential packs use `current_index`, random
/// packs use `used_ids`, date-based packs use neither.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(rename = "completedPrompts", default)]
    pub completed_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<u32>,
    #[serde(rename = "usedPrompts", default, skip_serializing_if = "Option::is_none")]
    pub used_ids: Option<BTreeSet<String>>,
    #[serde(default = "Utc::now")]
    pub last_access_date: DateTime<Utc>,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl ProgressRecord {
    pub fn empty() -> Self {
        Self {
            completed_ids: BTreeSet::new(),
            current_index: None,
            used_ids: None,
            last_access_date: Utc::now(),
        }
    }

    pub fn for_kind(kind: PackKind) -> Self {
        let mut record = Self::empty();
        match kind {
            PackKind::Sequential => record.current_index = Some(0),
            PackKind::Random => record.used_ids = Some(BTreeSet::new()),
            PackKind::DateBased => {}
        }
        record
    }

    pub fn is_completed(&self, item_id: &str) -> bool {
        self.completed_ids.contains(item_id)
    }

    /// Cheap structural validation done before a record is accepted for
    /// batching; the caller's input is rejected outright when it fails.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.completed_ids.iter().any(|id| id.trim().is_empty()) {
            problems.push("completedPrompts contains an empty id".to_string());
        }
        if let Some(used) = &self.used_ids {
            if used.iter().any(|id| id.trim().is_empty()) {
                problems.push("usedPrompts contains an empty id".to_string());
            }
        }
        if self.last_access_date > Utc::now() + chrono::Duration::days(1) {
            problems.push("lastAccessDate lies in the future".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(problems))
        }
    }
}
