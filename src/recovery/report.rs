use serde::Serialize;

use super::RecoveryStrategy;
use crate::models::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    DataRepair,
    BackupRecovery,
    DefaultData,
    AllFailed,
}

impl RecoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryMethod::DataRepair => "data_repair",
            RecoveryMethod::BackupRecovery => "backup_recovery",
            RecoveryMethod::DefaultData => "default_data",
            RecoveryMethod::AllFailed => "all_failed",
        }
    }
}

/// One failed step of the cascade. A backup step can fail once per backup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAttempt {
    pub strategy: RecoveryStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    pub error: String,
}

/// Outcome of one recovery run. Returned to whoever asked for recovery and
/// never written into the document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub success: bool,
    pub method: RecoveryMethod,
    pub document: Option<Document>,
    pub issues_found: Vec<String>,
    pub issues_fixed: Vec<String>,
    pub backup_id: Option<String>,
    pub failed_attempts: Vec<FailedAttempt>,
    pub duration_ms: u64,
}

impl RecoveryReport {
    pub(super) fn pending() -> Self {
        Self {
            success: false,
            method: RecoveryMethod::AllFailed,
            document: None,
            issues_found: Vec::new(),
            issues_fixed: Vec::new(),
            backup_id: None,
            failed_attempts: Vec::new(),
            duration_ms: 0,
        }
    }

    pub(super) fn succeed(&mut self, method: RecoveryMethod, document: Document) {
        self.success = true;
        self.method = method;
        self.document = Some(document);
    }

    pub(super) fn failed(
        &mut self,
        strategy: RecoveryStrategy,
        backup_id: Option<&str>,
        error: impl ToString,
    ) {
        self.failed_attempts.push(FailedAttempt {
            strategy,
            backup_id: backup_id.map(str::to_string),
            error: error.to_string(),
        });
    }
}
