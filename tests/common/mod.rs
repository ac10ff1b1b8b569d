#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use prompt_store::{
    Document, Item, MemoryBlobHost, MemoryFileHost, Notice, Notifier, Pack, PackKind,
    PromptStore, StoreSettings,
};

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

pub struct MemoryRig {
    pub app: PromptStore,
    pub host: Arc<MemoryBlobHost>,
    pub files: Arc<MemoryFileHost>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn memory_rig(host: MemoryBlobHost, settings: StoreSettings) -> MemoryRig {
    prompt_store::utils::logging::init_logging();
    let host = Arc::new(host);
    let files = Arc::new(MemoryFileHost::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let app = PromptStore::with_hosts(host.clone(), files.clone(), settings, notifier.clone())
        .await
        .unwrap();
    MemoryRig {
        app,
        host,
        files,
        notifier,
    }
}

/// One sequential pack with two prompts and untouched progress.
pub fn sequential_document(name: &str) -> Document {
    let mut document = Document::default();
    document.packs.push(
        Pack::new(name, PackKind::Sequential)
            .with_items(vec![Item::new("first").ordered(0), Item::new("second").ordered(1)]),
    );
    document
}
