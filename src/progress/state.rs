use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

use crate::models::ProgressRecord;

#[derive(Debug, Clone)]
pub struct CachedProgress {
    pub record: ProgressRecord,
    pub touched: Instant,
}

/// A record waiting for the next flush. `seq` orders updates so a failed
/// write never clobbers a newer update or a reset made while it was in
/// flight.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub record: ProgressRecord,
    pub seq: u64,
}

/// In-memory side of the batcher: what callers see, and what still has to
/// reach the store.
#[derive(Debug, Default)]
pub struct BatchState {
    cache: HashMap<String, CachedProgress>,
    pending: HashMap<String, PendingWrite>,
    /// Newest sequence handed out per pack, by `stage` or `forget`. Unlike
    /// `pending` it survives `drain`.
    latest: HashMap<String, u64>,
    next_seq: u64,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached record for `pack_id`, marking it as recently used.
    pub fn get(&mut self, pack_id: &str) -> Option<ProgressRecord> {
        let entry = self.cache.get_mut(pack_id)?;
        entry.touched = Instant::now();
        Some(entry.record.clone())
    }

    pub fn cache(&mut self, pack_id: &str, record: ProgressRecord) {
        self.cache.insert(
            pack_id.to_string(),
            CachedProgress {
                record,
                touched: Instant::now(),
            },
        );
    }

    /// Cache `record` and queue it, replacing any older pending record for
    /// the same pack. Returns how many packs are now pending.
    pub fn stage(&mut self, pack_id: &str, record: ProgressRecord) -> usize {
        let seq = self.bump(pack_id);
        self.pending.insert(
            pack_id.to_string(),
            PendingWrite {
                record: record.clone(),
                seq,
            },
        );
        self.cache(pack_id, record);
        self.pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, pack_id: &str) -> bool {
        self.pending.contains_key(pack_id)
    }

    /// Take everything pending, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<(String, PendingWrite)> {
        self.pending.drain().collect()
    }

    /// Whether a newer update or a reset was made for `pack_id` after the
    /// write numbered `seq` was staged.
    pub fn is_superseded(&self, pack_id: &str, seq: u64) -> bool {
        self.latest
            .get(pack_id)
            .is_some_and(|latest| *latest > seq)
    }

    /// Put a failed write back, unless the pack was updated or reset after
    /// it was staged. Returns whether the entry was re-queued.
    pub fn requeue(&mut self, pack_id: String, write: PendingWrite) -> bool {
        if self.pending.contains_key(&pack_id) || self.is_superseded(&pack_id, write.seq) {
            return false;
        }
        self.pending.insert(pack_id, write);
        true
    }

    /// Drop pending and cached state for one pack. Writes already drained
    /// for it count as superseded from now on.
    pub fn forget(&mut self, pack_id: &str) {
        self.pending.remove(pack_id);
        self.cache.remove(pack_id);
        self.bump(pack_id);
    }

    fn bump(&mut self, pack_id: &str) -> u64 {
        self.next_seq += 1;
        self.latest.insert(pack_id.to_string(), self.next_seq);
        self.next_seq
    }

    /// Remove cache entries untouched for `stale_after`. Packs with a pending
    /// write are kept whatever their age.
    pub fn evict_stale(&mut self, stale_after: Duration, now: Instant) -> usize {
        let before = self.cache.len();
        let pending = &self.pending;
        self.cache.retain(|pack_id, entry| {
            pending.contains_key(pack_id) || now.saturating_duration_since(entry.touched) < stale_after
        });
        before - self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(completed: &[&str]) -> ProgressRecord {
        let mut record = ProgressRecord::empty();
        record
            .completed_ids
            .extend(completed.iter().map(|id| id.to_string()));
        record
    }

    #[test]
    fn staging_replaces_the_pending_record() {
        let mut state = BatchState::new();
        assert_eq!(state.stage("a", record(&["1"])), 1);
        assert_eq!(state.stage("a", record(&["1", "2"])), 1);
        assert_eq!(state.stage("b", record(&[])), 2);

        let mut drained = state.drain();
        drained.sort_by(|left, right| left.0.cmp(&right.0));
        assert_eq!(drained[0].1.record.completed_ids.len(), 2);
        assert_eq!(state.pending_len(), 0);
        let cached = state.get("a").unwrap();
        assert_eq!(cached, drained[0].1.record);
        assert!(cached.is_completed("2"));
    }

    #[test]
    fn requeue_never_overwrites_a_newer_update() {
        let mut state = BatchState::new();
        state.stage("a", record(&["old"]));
        let (pack_id, failed) = state.drain().remove(0);

        state.stage("a", record(&["new"]));
        assert!(!state.requeue(pack_id.clone(), failed.clone()));
        assert!(state.drain()[0].1.record.is_completed("new"));

        // The newer write was drained and landed; the old one stays dropped.
        assert!(!state.requeue(pack_id, failed));
        assert!(!state.is_pending("a"));
    }

    #[test]
    fn failed_writes_without_newer_updates_are_requeued() {
        let mut state = BatchState::new();
        state.stage("a", record(&["only"]));
        let (pack_id, failed) = state.drain().remove(0);

        assert!(!state.is_superseded(&pack_id, failed.seq));
        assert!(state.requeue(pack_id, failed));
        assert!(state.is_pending("a"));
    }

    #[test]
    fn forgetting_a_pack_supersedes_drained_writes() {
        let mut state = BatchState::new();
        state.stage("a", record(&["before reset"]));
        state.stage("b", record(&[]));
        let mut drained = state.drain();
        drained.sort_by(|left, right| left.0.cmp(&right.0));
        let (b_id, b_write) = drained.pop().unwrap();
        let (a_id, a_write) = drained.pop().unwrap();

        state.forget("a");
        assert!(state.is_superseded(&a_id, a_write.seq));
        assert!(!state.requeue(a_id, a_write));
        assert!(state.get("a").is_none());

        assert!(state.requeue(b_id, b_write));
    }

    #[test]
    fn eviction_spares_pending_packs() {
        let mut state = BatchState::new();
        state.cache("idle", record(&[]));
        state.stage("busy", record(&[]));

        let later = Instant::now() + Duration::from_secs(600);
        assert_eq!(state.evict_stale(Duration::from_secs(300), later), 1);
        assert!(state.get("idle").is_none());
        assert!(state.get("busy").is_some());
    }
}
