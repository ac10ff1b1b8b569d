use log::{error, info, warn};
use serde::Serialize;

use crate::errors::Severity;

/// A user-facing message. `persistent` notices must stay on screen until
/// the user dismisses them.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
    pub persistent: bool,
}

impl Notice {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            persistent: false,
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Sink for user-visible notifications. The UI layer provides the real one.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Fallback notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Critical | Severity::High => error!("[notice] {}", notice.message),
            Severity::Medium => warn!("[notice] {}", notice.message),
            Severity::Low => info!("[notice] {}", notice.message),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{Notice, Notifier};

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        pub fn taken(&self) -> Vec<Notice> {
            self.notices.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }
}
