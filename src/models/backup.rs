use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProgressRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Manual,
    Automatic,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Manual => "manual",
            BackupKind::Automatic => "automatic",
        }
    }
}

/// Contents of `<id>.meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub timestamp: DateTime<Utc>,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: BackupKind,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub id: String,
    pub metadata: BackupMetadata,
}

/// Progress that was moved out of the active document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressArchive {
    pub pack_id: String,
    pub pack_name: String,
    pub archived_at: DateTime<Utc>,
    pub progress: ProgressRecord,
}
