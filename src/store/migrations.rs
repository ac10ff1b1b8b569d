use std::fmt;

use log::{info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::helpers::now_rfc3339;
use crate::models::{GlobalSettings, PackKind, PackSettings, ProgressRecord};

pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Targets of the ordered upgrade steps. A step runs only when the recorded
/// version is below its target.
const MIGRATION_TARGETS: &[SchemaVersion] = &[SchemaVersion::new(1, 0, 0)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// `major.minor.patch`; missing or unparsable components count as 0.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw
            .trim()
            .trim_start_matches('v')
            .split('.')
            .map(|part| part.trim().parse::<u32>().unwrap_or(0));
        Self::new(
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        )
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub applied: Vec<SchemaVersion>,
}

impl MigrationOutcome {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Version recorded in a raw document; absent means pre-versioning (0.0.0).
pub fn recorded_version(document: &Value) -> SchemaVersion {
    document
        .get("version")
        .and_then(Value::as_str)
        .map(SchemaVersion::parse)
        .unwrap_or_default()
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

pub fn migrate(document: Value) -> Value {
    run_migrations(document).0
}

pub fn run_migrations(mut document: Value) -> (Value, MigrationOutcome) {
    let from = recorded_version(&document);
    let mut outcome = MigrationOutcome {
        from,
        to: from,
        applied: Vec::new(),
    };

    if from > CURRENT_SCHEMA_VERSION {
        warn!(
            "document version ({from}) is newer than supported schema ({CURRENT_SCHEMA_VERSION}); leaving it untouched"
        );
        return (document, outcome);
    }

    if from == CURRENT_SCHEMA_VERSION {
        return (document, outcome);
    }

    let Some(root) = document.as_object_mut() else {
        warn!("cannot migrate a document that is not an object");
        return (document, outcome);
    };

    for target in MIGRATION_TARGETS.iter().copied() {
        if from < target {
            apply_migration(root, target);
            outcome.applied.push(target);
        }
    }

    root.insert(
        "version".into(),
        Value::String(CURRENT_SCHEMA_VERSION.to_string()),
    );
    outcome.to = CURRENT_SCHEMA_VERSION;

    info!(
        "migrated document from {} to {} ({} step(s))",
        outcome.from,
        outcome.to,
        outcome.applied.len()
    );
    (document, outcome)
}

fn apply_migration(root: &mut Map<String, Value>, target: SchemaVersion) {
    match (target.major, target.minor, target.patch) {
        (1, 0, 0) => migrate_legacy(root),
        _ => warn!("no migration registered for {target}"),
    }
}

/// legacy -> 1.0.0: make every collection and timestamp the current model
/// expects exist, without touching values that are already there.
fn migrate_legacy(root: &mut Map<String, Value>) {
    let defaults = to_object(&GlobalSettings::default());
    match root.get_mut("globalSettings") {
        Some(Value::Object(settings)) => fill_missing(settings, &defaults),
        _ => {
            root.insert("globalSettings".into(), Value::Object(defaults));
        }
    }

    if !root.get("packs").is_some_and(Value::is_array) {
        root.insert("packs".into(), Value::Array(Vec::new()));
    }

    let Some(Value::Array(packs)) = root.get_mut("packs") else {
        return;
    };

    let now = now_rfc3339();
    let settings_defaults = to_object(&PackSettings::default());

    for pack in packs.iter_mut().filter_map(Value::as_object_mut) {
        pack.entry("createdAt")
            .or_insert_with(|| Value::String(now.clone()));
        pack.entry("updatedAt")
            .or_insert_with(|| Value::String(now.clone()));

        let kind = pack
            .get("type")
            .and_then(Value::as_str)
            .and_then(PackKind::parse);

        match pack.get_mut("progress") {
            Some(Value::Object(progress)) => {
                if !progress.get("completedPrompts").is_some_and(Value::is_array) {
                    progress.insert("completedPrompts".into(), Value::Array(Vec::new()));
                }
                progress
                    .entry("lastAccessDate")
                    .or_insert_with(|| Value::String(now.clone()));
            }
            _ => {
                let record = kind
                    .map(ProgressRecord::for_kind)
                    .unwrap_or_else(ProgressRecord::empty);
                pack.insert("progress".into(), Value::Object(to_object(&record)));
            }
        }

        match pack.get_mut("settings") {
            Some(Value::Object(settings)) => fill_missing(settings, &settings_defaults),
            _ => {
                pack.insert("settings".into(), Value::Object(settings_defaults.clone()));
            }
        }

        if let Some(Value::Array(items)) = pack.get_mut("prompts") {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                if !item.get("id").is_some_and(Value::is_string) {
                    item.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
                }
                item.entry("type")
                    .or_insert_with(|| Value::String("text".into()));
            }
        }
    }
}

fn fill_missing(target: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, value) in defaults {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn to_object<T: serde::Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
