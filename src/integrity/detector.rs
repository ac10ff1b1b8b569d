use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use super::{IntegrityCheck, OLDEST_SUPPORTED_VERSION};
use crate::{
    models::{ItemType, LinkHandling, NotificationType, PackKind},
    store::{
        helpers::{is_clock_time, is_item_date, is_non_negative_integer, is_timestamp, non_empty_str},
        migrations::{SchemaVersion, CURRENT_SCHEMA_VERSION},
    },
};

#[derive(Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
    fixable: Vec<String>,
}

impl Findings {
    fn error(&mut self, message: String) {
        self.fixable.push(message.clone());
        self.errors.push(message);
    }

    fn fatal(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn warn_fixable(&mut self, message: String) {
        self.fixable.push(message.clone());
        self.warnings.push(message);
    }

    fn finish(self) -> IntegrityCheck {
        IntegrityCheck {
            is_valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
            fixable_issues: self.fixable,
        }
    }
}

/// Inspect a raw document without touching it.
pub fn check(document: &Value) -> IntegrityCheck {
    let mut findings = Findings::default();

    let Some(root) = document.as_object() else {
        findings.fatal("Data must be an object".into());
        return findings.finish();
    };

    check_version(root, &mut findings);

    match root.get("globalSettings") {
        Some(Value::Object(settings)) => check_global_settings(settings, &mut findings),
        Some(_) => findings.error("globalSettings must be an object".into()),
        None => findings.error("Missing globalSettings".into()),
    }

    match root.get("packs") {
        Some(Value::Array(packs)) => {
            for (index, pack) in packs.iter().enumerate() {
                check_pack(index, pack, &mut findings);
            }
            check_duplicates(packs, &mut findings);
        }
        Some(_) => findings.error("packs must be an array".into()),
        None => findings.error("Missing packs".into()),
    }

    findings.finish()
}

fn check_version(root: &Map<String, Value>, findings: &mut Findings) {
    let Some(raw) = non_empty_str(root, "version") else {
        findings.error("Missing or invalid version".into());
        return;
    };

    let version = SchemaVersion::parse(raw);
    if version > CURRENT_SCHEMA_VERSION {
        findings.warn(format!(
            "Data version {raw} is newer than supported version {CURRENT_SCHEMA_VERSION}"
        ));
    } else if version < SchemaVersion::parse(OLDEST_SUPPORTED_VERSION) {
        findings.warn(format!(
            "Data version {raw} is very old; some fields may be lost in migration"
        ));
    }
}

fn check_global_settings(settings: &Map<String, Value>, findings: &mut Findings) {
    match settings.get("defaultNotificationTime") {
        None => findings.warn_fixable("Missing global setting: defaultNotificationTime".into()),
        Some(value) if !value.as_str().is_some_and(is_clock_time) => findings.error(format!(
            "Invalid defaultNotificationTime: {value} (expected HH:MM)"
        )),
        Some(_) => {}
    }

    match settings.get("linkHandling") {
        None => findings.warn_fixable("Missing global setting: linkHandling".into()),
        Some(value) if !is_member(value, &LinkHandling::ALL) => {
            findings.error(format!("Invalid linkHandling: {value}"))
        }
        Some(_) => {}
    }

    for key in [
        "defaultZenMode",
        "dailyNoteIntegration",
        "enableGlobalNotifications",
        "notificationSound",
    ] {
        match settings.get(key) {
            None => findings.warn_fixable(format!("Missing global setting: {key}")),
            Some(value) if !value.is_boolean() => {
                findings.error(format!("Global setting {key} must be a boolean"))
            }
            Some(_) => {}
        }
    }

    for key in ["dailyNoteFolder", "dailyNoteTemplate"] {
        match settings.get(key) {
            None => findings.warn_fixable(format!("Missing global setting: {key}")),
            Some(value) if !value.is_string() => {
                findings.error(format!("Global setting {key} must be a string"))
            }
            Some(_) => {}
        }
    }
}

fn check_pack(index: usize, pack: &Value, findings: &mut Findings) {
    let Some(pack) = pack.as_object() else {
        findings.error(format!("Pack #{index} is not an object"));
        return;
    };

    let label = non_empty_str(pack, "name")
        .map(|name| format!("Pack \"{name}\""))
        .unwrap_or_else(|| format!("Pack #{index}"));

    if non_empty_str(pack, "id").is_none() {
        findings.error(format!("{label} is missing an id"));
    }
    if non_empty_str(pack, "name").is_none() {
        findings.error(format!("{label} is missing a name"));
    }

    let kind = pack.get("type").and_then(Value::as_str).and_then(PackKind::parse);
    if kind.is_none() {
        findings.error(format!(
            "{label} has invalid type {}",
            pack.get("type").unwrap_or(&Value::Null)
        ));
    }

    for key in ["createdAt", "updatedAt"] {
        match pack.get(key) {
            None => findings.warn_fixable(format!("{label} is missing {key}")),
            Some(value) if !is_timestamp(value) => {
                findings.error(format!("{label} has an invalid {key}"))
            }
            Some(_) => {}
        }
    }

    match pack.get("settings") {
        None => findings.warn_fixable(format!("{label} is missing settings")),
        Some(Value::Object(settings)) => check_pack_settings(&label, settings, findings),
        Some(_) => findings.error(format!("{label} settings must be an object")),
    }

    match pack.get("progress") {
        Some(Value::Object(progress)) => check_progress(&label, progress, findings),
        Some(_) => findings.error(format!("{label} progress must be an object")),
        None => findings.error(format!("{label} is missing progress")),
    }

    match pack.get("prompts") {
        Some(Value::Array(items)) => check_items(&label, kind, items, findings),
        Some(_) => findings.error(format!("{label} prompts must be an array")),
        None => findings.error(format!("{label} is missing prompts")),
    }
}

fn check_pack_settings(label: &str, settings: &Map<String, Value>, findings: &mut Findings) {
    match settings.get("notificationTime") {
        None => findings.warn_fixable(format!("{label} settings missing notificationTime")),
        Some(value) if !value.as_str().is_some_and(is_clock_time) => findings.error(format!(
            "{label} has invalid notificationTime {value} (expected HH:MM)"
        )),
        Some(_) => {}
    }

    match settings.get("notificationType") {
        None => findings.warn_fixable(format!("{label} settings missing notificationType")),
        Some(value) if !is_member(value, &NotificationType::ALL) => {
            findings.error(format!("{label} has invalid notificationType {value}"))
        }
        Some(_) => {}
    }

    for key in ["notificationEnabled", "zenModeEnabled", "dailyNoteIntegration"] {
        match settings.get(key) {
            None => findings.warn_fixable(format!("{label} settings missing {key}")),
            Some(value) if !value.is_boolean() => {
                findings.error(format!("{label} setting {key} must be a boolean"))
            }
            Some(_) => {}
        }
    }

    if settings
        .get("customTemplate")
        .is_some_and(|value| !value.is_string())
    {
        findings.error(format!("{label} customTemplate must be a string"));
    }
}

fn check_progress(label: &str, progress: &Map<String, Value>, findings: &mut Findings) {
    match progress.get("completedPrompts") {
        Some(value) if is_id_list(value) => {}
        Some(_) => findings.error(format!("{label} completedPrompts must be a list of ids")),
        None => findings.error(format!("{label} progress is missing completedPrompts")),
    }

    if progress
        .get("currentIndex")
        .is_some_and(|value| !is_non_negative_integer(value))
    {
        findings.error(format!("{label} currentIndex must be a non-negative integer"));
    }

    if progress
        .get("usedPrompts")
        .is_some_and(|value| !is_id_list(value))
    {
        findings.error(format!("{label} usedPrompts must be a list of ids"));
    }

    match progress.get("lastAccessDate") {
        None => findings.warn_fixable(format!("{label} progress is missing lastAccessDate")),
        Some(value) if !is_timestamp(value) => {
            findings.error(format!("{label} has an invalid lastAccessDate"))
        }
        Some(_) => {}
    }
}

fn check_items(label: &str, kind: Option<PackKind>, items: &[Value], findings: &mut Findings) {
    let mut seen = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        let Some(item) = item.as_object() else {
            findings.error(format!("{label} prompt #{index} is not an object"));
            continue;
        };

        match non_empty_str(item, "id") {
            Some(id) => {
                if !seen.insert(id) {
                    findings.error(format!("{label} has duplicate prompt id {id}"));
                }
            }
            None => findings.error(format!("{label} prompt #{index} is missing an id")),
        }

        if non_empty_str(item, "content").is_none() {
            findings.error(format!("{label} prompt #{index} has no content"));
        }

        match item.get("type") {
            None => findings.warn_fixable(format!("{label} prompt #{index} is missing a type")),
            Some(value) if !is_member(value, &ItemType::ALL) => {
                findings.error(format!("{label} prompt #{index} has invalid type {value}"))
            }
            Some(_) => {}
        }

        if item
            .get("order")
            .is_some_and(|value| !is_non_negative_integer(value))
        {
            findings.error(format!(
                "{label} prompt #{index} order must be a non-negative integer"
            ));
        }

        match (kind, item.get("date")) {
            (Some(PackKind::DateBased), None) => {
                findings.error(format!("{label} prompt #{index} is missing a date"))
            }
            (_, Some(value)) if !value.as_str().is_some_and(is_item_date) => {
                findings.error(format!("{label} prompt #{index} has an invalid date {value}"))
            }
            _ => {}
        }
    }
}

fn check_duplicates(packs: &[Value], findings: &mut Findings) {
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut names: HashMap<&str, usize> = HashMap::new();

    for pack in packs.iter().filter_map(Value::as_object) {
        if let Some(id) = non_empty_str(pack, "id") {
            *ids.entry(id).or_default() += 1;
        }
        if let Some(name) = non_empty_str(pack, "name") {
            *names.entry(name).or_default() += 1;
        }
    }

    let mut duplicate_ids: Vec<_> = ids.into_iter().filter(|(_, n)| *n > 1).collect();
    duplicate_ids.sort();
    for (id, count) in duplicate_ids {
        findings.error(format!("Duplicate pack id: {id} ({count} packs)"));
    }

    let mut duplicate_names: Vec<_> = names.into_iter().filter(|(_, n)| *n > 1).collect();
    duplicate_names.sort();
    for (name, count) in duplicate_names {
        findings.error(format!("Duplicate pack name: {name} ({count} packs)"));
    }
}

fn is_member(value: &Value, allowed: &[&str]) -> bool {
    value.as_str().is_some_and(|raw| allowed.contains(&raw))
}

fn is_id_list(value: &Value) -> bool {
    value.as_array().is_some_and(|ids| {
        ids.iter()
            .all(|id| id.as_str().is_some_and(|raw| !raw.trim().is_empty()))
    })
}
