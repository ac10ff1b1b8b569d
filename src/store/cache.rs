use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::models::Document;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub document: Document,
    /// Hash of the blob as handed to the host, compared against what the
    /// host holds now before the entry is trusted.
    pub blob_hash: String,
    pub stored_at: Instant,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub cached: bool,
    pub fresh: bool,
    pub age_ms: Option<u64>,
    pub ttl_ms: u64,
    pub blob_hash: Option<String>,
}

/// One-slot cache of the last document written or loaded.
#[derive(Debug)]
pub struct DocumentCache {
    entry: Option<CacheEntry>,
    ttl: Duration,
}

impl DocumentCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    pub fn put(&mut self, document: Document, blob_hash: String) {
        self.entry = Some(CacheEntry {
            document,
            blob_hash,
            stored_at: Instant::now(),
        });
    }

    /// The entry, unless its TTL ran out.
    pub fn fresh(&self) -> Option<&CacheEntry> {
        self.entry
            .as_ref()
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            cached: self.entry.is_some(),
            fresh: self.fresh().is_some(),
            age_ms: self
                .entry
                .as_ref()
                .map(|entry| entry.stored_at.elapsed().as_millis() as u64),
            ttl_ms: self.ttl.as_millis() as u64,
            blob_hash: self.entry.as_ref().map(|entry| entry.blob_hash.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let mut cache = DocumentCache::new(Duration::from_secs(30));
        cache.put(Document::default(), "abc".into());
        assert!(cache.fresh().is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.fresh().is_none());

        let status = cache.status();
        assert!(status.cached);
        assert!(!status.fresh);
        assert_eq!(status.blob_hash.as_deref(), Some("abc"));

        cache.clear();
        assert!(!cache.status().cached);
    }
}
