//! Rolling snapshots of the document on the host file primitive.
//!
//! Each snapshot is a pair of files: `<id>.json` with the document and
//! `<id>.meta.json` with its [`BackupMetadata`]. Retention runs after every
//! snapshot. Progress archives share the directory but carry no metadata
//! file, so retention never sees them.

pub mod naming;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    codec,
    errors::{Result, StoreError},
    host::FileHost,
    integrity,
    models::{BackupEntry, BackupKind, BackupMetadata, Document, ProgressArchive, CURRENT_VERSION},
};

pub const DEFAULT_MAX_BACKUPS: usize = 10;
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_backups: usize,
    pub max_age_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_backups: DEFAULT_MAX_BACKUPS,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub count: usize,
    pub total_bytes: u64,
    pub newest: Option<DateTime<Utc>>,
    pub oldest: Option<DateTime<Utc>>,
}

pub struct BackupVault {
    files: Arc<dyn FileHost>,
    retention: RetentionPolicy,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl BackupVault {
    pub fn new(files: Arc<dyn FileHost>, retention: RetentionPolicy) -> Self {
        Self {
            files,
            retention,
            last_stamp: Mutex::new(None),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Ids embed the timestamp, so two snapshots in the same microsecond
    /// would collide; bump to keep every stamp strictly increasing.
    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = lock(&self.last_stamp);
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    pub async fn snapshot(
        &self,
        document: &Value,
        kind: BackupKind,
        description: Option<&str>,
    ) -> Result<String> {
        self.files.ensure_dir().await?;

        let timestamp = self.next_stamp();
        let id = naming::backup_id(kind, timestamp);
        let contents = serde_json::to_string_pretty(document)?;

        let metadata = BackupMetadata {
            timestamp,
            version: document
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or(CURRENT_VERSION)
                .to_string(),
            kind,
            size: contents.len() as u64,
            description: description.map(str::to_string),
        };

        self.files
            .write_file(&naming::data_file(&id), &contents)
            .await?;
        self.files
            .write_file(&naming::meta_file(&id), &serde_json::to_string_pretty(&metadata)?)
            .await?;
        debug!("wrote {} backup {id} ({} bytes)", kind.as_str(), metadata.size);

        if let Err(err) = self.enforce_retention().await {
            warn!("backup retention sweep failed: {err}");
        }

        Ok(id)
    }

    /// Every readable backup, newest first. Entries with unreadable metadata
    /// are skipped rather than failing the listing.
    pub async fn list(&self) -> Result<Vec<BackupEntry>> {
        let names = self.files.list_files().await?;
        let mut entries = Vec::new();

        for name in &names {
            let Some(id) = naming::id_from_meta(name) else {
                continue;
            };
            let raw = match self.files.read_file(name).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("skipping backup {id}: {err}");
                    continue;
                }
            };
            match serde_json::from_str::<BackupMetadata>(&raw) {
                Ok(metadata) => entries.push(BackupEntry {
                    id: id.to_string(),
                    metadata,
                }),
                Err(err) => warn!("skipping backup {id} with broken metadata: {err}"),
            }
        }

        entries.sort_by(|a, b| {
            b.metadata
                .timestamp
                .cmp(&a.metadata.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    /// The snapshot as stored, decoded but otherwise unchecked.
    pub async fn read_snapshot(&self, id: &str) -> Result<Value> {
        let raw = self.files.read_file(&naming::data_file(id)).await?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|err| StoreError::corruption(format!("backup {id} is not valid JSON: {err}")))?;
        Ok(codec::decode(value))
    }

    /// A snapshot that passed the same gate as a live load.
    pub async fn restore(&self, id: &str) -> Result<Document> {
        let raw = self.read_snapshot(id).await?;
        let admitted = integrity::admit(raw)
            .map_err(|err| StoreError::corruption(format!("backup {id} rejected: {err}")))?;
        info!("restored backup {id}");
        Ok(admitted.document)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.files.delete_file(&naming::data_file(id)).await?;
        self.files.delete_file(&naming::meta_file(id)).await?;
        debug!("deleted backup {id}");
        Ok(())
    }

    /// Drops entries past the age limit and then the oldest ones past the
    /// count limit. Returns how many were removed.
    pub async fn enforce_retention(&self) -> Result<usize> {
        let entries = self.list().await?;
        let cutoff = Utc::now() - Duration::days(self.retention.max_age_days);

        // `entries` is newest first, so anything past the cap is the oldest.
        let doomed: Vec<&BackupEntry> = entries
            .iter()
            .enumerate()
            .filter(|(index, entry)| {
                *index >= self.retention.max_backups || entry.metadata.timestamp < cutoff
            })
            .map(|(_, entry)| entry)
            .collect();

        let mut removed = 0;
        for entry in doomed.iter().rev() {
            match self.delete(&entry.id).await {
                Ok(()) => removed += 1,
                Err(err) => warn!("failed to delete expired backup {}: {err}", entry.id),
            }
        }

        if removed > 0 {
            info!("retention removed {removed} backup(s)");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<BackupStats> {
        let entries = self.list().await?;
        Ok(BackupStats {
            count: entries.len(),
            total_bytes: entries.iter().map(|entry| entry.metadata.size).sum(),
            newest: entries.first().map(|entry| entry.metadata.timestamp),
            oldest: entries.last().map(|entry| entry.metadata.timestamp),
        })
    }

    pub async fn archive_progress(&self, archive: &ProgressArchive) -> Result<String> {
        self.files.ensure_dir().await?;
        let name = naming::archive_file(&archive.pack_id, self.next_stamp());
        self.files
            .write_file(&name, &serde_json::to_string_pretty(archive)?)
            .await?;
        info!("archived progress of pack {} to {name}", archive.pack_id);
        Ok(name)
    }

    /// Archived progress records, newest first, optionally for one pack.
    pub async fn list_archives(&self, pack_id: Option<&str>) -> Result<Vec<ProgressArchive>> {
        let names = self.files.list_files().await?;
        let mut archives = Vec::new();

        for name in names.iter().filter(|name| naming::is_archive(name)) {
            let parsed = match self.files.read_file(name).await {
                Ok(raw) => serde_json::from_str::<ProgressArchive>(&raw).map_err(StoreError::from),
                Err(err) => Err(err),
            };
            match parsed {
                Ok(archive) if pack_id.map_or(true, |id| id == archive.pack_id) => {
                    archives.push(archive)
                }
                Ok(_) => {}
                Err(err) => warn!("skipping unreadable archive {name}: {err}"),
            }
        }

        archives.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        Ok(archives)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
