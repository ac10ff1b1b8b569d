use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;

use super::{BlobHost, FileHost};
use crate::errors::{Result, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-process blob host with a write log and fault injection.
#[derive(Default)]
pub struct MemoryBlobHost {
    blob: Mutex<Option<Value>>,
    writes: Mutex<Vec<Value>>,
    loads: AtomicUsize,
    failing_writes: AtomicU32,
    unavailable: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryBlobHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: Value) -> Self {
        let host = Self::default();
        host.set_blob(Some(blob));
        host
    }

    /// Replace the stored blob behind the store's back.
    pub fn set_blob(&self, blob: Option<Value>) {
        *lock(&self.blob) = blob;
    }

    pub fn blob(&self) -> Option<Value> {
        lock(&self.blob).clone()
    }

    /// Every blob handed to `save_blob`, in arrival order.
    pub fn writes(&self) -> Vec<Value> {
        lock(&self.writes).clone()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// The next `count` writes fail with a transient error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *lock(&self.write_delay) = delay;
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::HostUnavailable("memory host switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BlobHost for MemoryBlobHost {
    async fn load_blob(&self) -> Result<Option<Value>> {
        self.check_available()?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.blob())
    }

    async fn save_blob(&self, blob: Value) -> Result<()> {
        self.check_available()?;

        let delay = *lock(&self.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::TransientIo("injected write failure".into()));
        }

        lock(&self.writes).push(blob.clone());
        *lock(&self.blob) = Some(blob);
        Ok(())
    }
}

/// In-process file host keyed by file name.
#[derive(Default)]
pub struct MemoryFileHost {
    files: Mutex<BTreeMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryFileHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_names(&self) -> Vec<String> {
        lock(&self.files).keys().cloned().collect()
    }

    pub fn put(&self, name: &str, contents: &str) {
        lock(&self.files).insert(name.to_string(), contents.to_string());
    }

    /// Make every write fail, to exercise backup-less recovery paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileHost for MemoryFileHost {
    async fn ensure_dir(&self) -> Result<()> {
        Ok(())
    }

    async fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::TransientIo(format!("cannot write {name}")));
        }
        self.put(name, contents);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<String> {
        lock(&self.files)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        lock(&self.files).remove(name);
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.file_names())
    }
}
