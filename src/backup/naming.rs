use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::BackupKind;

pub const DATA_SUFFIX: &str = ".json";
pub const META_SUFFIX: &str = ".meta.json";
pub const ARCHIVE_PREFIX: &str = "archive-";

/// `2026-03-01T08:15:02.123456Z` becomes `2026-03-01T08-15-02-123456Z`.
pub fn file_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .to_rfc3339_opts(SecondsFormat::Micros, true)
        .replace([':', '.'], "-")
}

pub fn backup_id(kind: BackupKind, timestamp: DateTime<Utc>) -> String {
    format!("{}-{}", kind.as_str(), file_stamp(timestamp))
}

pub fn data_file(id: &str) -> String {
    format!("{id}{DATA_SUFFIX}")
}

pub fn meta_file(id: &str) -> String {
    format!("{id}{META_SUFFIX}")
}

/// The backup id owning a metadata file, if `name` is one.
pub fn id_from_meta(name: &str) -> Option<&str> {
    name.strip_suffix(META_SUFFIX)
        .filter(|id| !id.is_empty() && !id.starts_with(ARCHIVE_PREFIX))
}

pub fn archive_file(pack_id: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{ARCHIVE_PREFIX}{}-{}{DATA_SUFFIX}",
        sanitize(pack_id),
        file_stamp(timestamp)
    )
}

pub fn is_archive(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(DATA_SUFFIX) && !name.ends_with(META_SUFFIX)
}

/// Pack ids come from user data; keep them to file-name safe characters.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ids_have_no_separators_that_break_file_names() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 15, 2).unwrap();
        let id = backup_id(BackupKind::Automatic, ts);
        assert_eq!(id, "automatic-2026-03-01T08-15-02-000000Z");
        assert_eq!(meta_file(&id), "automatic-2026-03-01T08-15-02-000000Z.meta.json");
        assert_eq!(id_from_meta(&meta_file(&id)), Some(id.as_str()));
        assert_eq!(id_from_meta(&data_file(&id)), None);
    }

    #[test]
    fn archive_names() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 15, 2).unwrap();
        let name = archive_file("pack/1", ts);
        assert!(name.starts_with("archive-pack_1-2026"));
        assert!(is_archive(&name));
        assert!(!is_archive("manual-2026.json"));
    }
}
