mod backup;
mod document;
mod progress;

pub use backup::{BackupEntry, BackupKind, BackupMetadata, ProgressArchive};
pub use document::{
    Document, GlobalSettings, Item, ItemType, LinkHandling, NotificationType, Pack, PackKind,
    PackSettings, CURRENT_VERSION,
};
pub use progress::ProgressRecord;
