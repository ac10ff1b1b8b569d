use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ErrorKind, StoreError};
use crate::notify::{Notice, Notifier};

pub const DEFAULT_HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn notifies_user(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub operation: String,
    pub component: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            component: component.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub context: ErrorContext,
    pub recovery_attempted: bool,
    pub recovery_successful: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: usize,
    pub recovered: usize,
    pub by_kind: HashMap<ErrorKind, usize>,
    pub by_severity: HashMap<Severity, usize>,
}

/// Classifies failures, keeps a bounded rolling history and decides which
/// ones the user gets to see.
#[derive(Clone)]
pub struct ErrorReporter {
    history: Arc<Mutex<VecDeque<ErrorReport>>>,
    cap: usize,
    notifier: Arc<dyn Notifier>,
}

impl ErrorReporter {
    pub fn new(cap: usize, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            history: Arc::new(Mutex::new(VecDeque::with_capacity(cap.min(DEFAULT_HISTORY_CAP)))),
            cap: cap.max(1),
            notifier,
        }
    }

    /// Record a failure that nobody tried to recover from.
    pub fn report(&self, err: &StoreError, context: ErrorContext) -> ErrorReport {
        self.record(err, context, false, false)
    }

    pub fn record(
        &self,
        err: &StoreError,
        context: ErrorContext,
        recovery_attempted: bool,
        recovery_successful: bool,
    ) -> ErrorReport {
        let kind = classify(err, &context);
        let severity = severity_for(kind, recovery_attempted, recovery_successful);
        let report = ErrorReport {
            id: Uuid::new_v4().to_string(),
            kind,
            severity,
            message: err.to_string(),
            context,
            recovery_attempted,
            recovery_successful,
        };

        match severity {
            Severity::Critical | Severity::High => error!(
                "[{}::{}] {} ({})",
                report.context.component,
                report.context.operation,
                report.message,
                kind.as_str()
            ),
            Severity::Medium => warn!(
                "[{}::{}] {}",
                report.context.component, report.context.operation, report.message
            ),
            Severity::Low => info!(
                "[{}::{}] {}",
                report.context.component, report.context.operation, report.message
            ),
        }

        {
            let mut history = self.lock_history();
            history.push_back(report.clone());
            while history.len() > self.cap {
                history.pop_front();
            }
        }

        if severity.notifies_user() {
            let mut notice = Notice::new(user_message(&report), severity);
            if severity == Severity::Critical {
                notice = notice.persistent();
            }
            self.notifier.notify(notice);
        }

        report
    }

    pub fn history(&self) -> Vec<ErrorReport> {
        self.lock_history().iter().cloned().collect()
    }

    pub fn stats(&self) -> ErrorStats {
        let history = self.lock_history();
        let mut stats = ErrorStats {
            total: history.len(),
            ..ErrorStats::default()
        };
        for report in history.iter() {
            *stats.by_kind.entry(report.kind).or_default() += 1;
            *stats.by_severity.entry(report.severity).or_default() += 1;
            if report.recovery_successful {
                stats.recovered += 1;
            }
        }
        stats
    }

    pub fn clear(&self) {
        self.lock_history().clear();
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<ErrorReport>> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Typed variants win; `Unknown` falls back to looking at where the error
/// came from and what it says.
pub fn classify(err: &StoreError, context: &ErrorContext) -> ErrorKind {
    let kind = err.kind();
    if kind != ErrorKind::Unknown {
        return kind;
    }

    let message = err.to_string().to_lowercase();
    if message.contains("permission") || message.contains("denied") || message.contains("eacces")
    {
        ErrorKind::PermissionDenied
    } else if message.contains("corrupt")
        || message.contains("parse")
        || message.contains("json")
        || message.contains("unexpected end")
    {
        ErrorKind::DataCorruption
    } else if message.contains("timeout")
        || message.contains("timed out")
        || message.contains("busy")
        || message.contains("temporar")
    {
        ErrorKind::TransientIo
    } else if message.contains("unavailable")
        || message.contains("not available")
        || context.component == "host"
    {
        ErrorKind::HostApiUnavailable
    } else if message.contains("invalid") || message.contains("required") {
        ErrorKind::ValidationFailure
    } else {
        ErrorKind::Unknown
    }
}

fn severity_for(kind: ErrorKind, attempted: bool, successful: bool) -> Severity {
    if attempted && !successful {
        return Severity::Critical;
    }
    if attempted && successful {
        return Severity::Low;
    }
    match kind {
        ErrorKind::DataCorruption | ErrorKind::HostApiUnavailable | ErrorKind::PermissionDenied => {
            Severity::High
        }
        ErrorKind::ValidationFailure | ErrorKind::Unknown => Severity::Medium,
        ErrorKind::TransientIo => Severity::Low,
    }
}

fn user_message(report: &ErrorReport) -> String {
    if report.recovery_attempted && !report.recovery_successful {
        return format!(
            "Prompt data could not be recovered automatically ({}). Existing backups were left untouched.",
            report.message
        );
    }
    match report.kind {
        ErrorKind::DataCorruption => "Prompt data appears to be damaged.".to_string(),
        ErrorKind::PermissionDenied => {
            "Prompt data could not be accessed: permission denied.".to_string()
        }
        ErrorKind::HostApiUnavailable => "Storage is currently unavailable.".to_string(),
        _ => format!("Prompt data operation failed: {}", report.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;

    fn reporter(cap: usize) -> (ErrorReporter, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (ErrorReporter::new(cap, notifier.clone()), notifier)
    }

    #[test]
    fn history_is_bounded_and_drops_oldest() {
        let (reporter, _) = reporter(3);
        for i in 0..5 {
            reporter.report(
                &StoreError::TransientIo(format!("hiccup {i}")),
                ErrorContext::new("store", "save"),
            );
        }
        let history = reporter.history();
        assert_eq!(history.len(), 3);
        assert!(history[0].message.contains("hiccup 2"));
        assert!(history[2].message.contains("hiccup 4"));
    }

    #[test]
    fn recovered_failures_do_not_notify() {
        let (reporter, notifier) = reporter(10);
        let report = reporter.record(
            &StoreError::corruption("bad blob"),
            ErrorContext::new("store", "load"),
            true,
            true,
        );
        assert_eq!(report.severity, Severity::Low);
        assert!(notifier.taken().is_empty());
    }

    #[test]
    fn failed_recovery_is_critical_and_persistent() {
        let (reporter, notifier) = reporter(10);
        let report = reporter.record(
            &StoreError::RecoveryFailed("everything broke".into()),
            ErrorContext::new("recovery", "recover_data"),
            true,
            false,
        );
        assert_eq!(report.severity, Severity::Critical);
        let notices = notifier.taken();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].persistent);
    }

    #[test]
    fn unknown_errors_are_classified_by_message() {
        let ctx = ErrorContext::new("vault", "restore");
        let err = StoreError::Other(anyhow::anyhow!("failed to parse snapshot"));
        assert_eq!(classify(&err, &ctx), ErrorKind::DataCorruption);

        let err = StoreError::Other(anyhow::anyhow!("operation timed out"));
        assert_eq!(classify(&err, &ctx), ErrorKind::TransientIo);

        let host_ctx = ErrorContext::new("host", "load_blob");
        let err = StoreError::Other(anyhow::anyhow!("something odd"));
        assert_eq!(classify(&err, &host_ctx), ErrorKind::HostApiUnavailable);
    }

    #[test]
    fn stats_group_by_kind() {
        let (reporter, _) = reporter(10);
        let ctx = || ErrorContext::new("store", "save");
        reporter.report(&StoreError::validation("name is required"), ctx());
        reporter.report(&StoreError::validation("content is required"), ctx());
        reporter.report(&StoreError::TransientIo("busy".into()), ctx());

        let stats = reporter.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_kind[&ErrorKind::ValidationFailure], 2);
        assert_eq!(stats.by_severity[&Severity::Low], 1);
    }
}
