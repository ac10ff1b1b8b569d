use std::collections::HashSet;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::RepairOutcome;
use crate::{
    models::{Document, GlobalSettings, ItemType, LinkHandling, NotificationType, PackKind, PackSettings, ProgressRecord},
    store::{
        helpers::{is_clock_time, is_item_date, is_non_negative_integer, is_timestamp, non_empty_str, now_rfc3339},
        migrations::CURRENT_SCHEMA_VERSION,
    },
};

/// Best-effort repair. Consumes the document and hands back a structurally
/// valid one together with a description of every change made.
pub fn repair(document: Value) -> RepairOutcome {
    let mut fixed = Vec::new();

    let Value::Object(mut root) = document else {
        fixed.push("Replaced non-object data with an empty document".to_string());
        let repaired = Document::default().to_value().unwrap_or(Value::Null);
        return RepairOutcome {
            repaired,
            fixed_issues: fixed,
        };
    };

    if non_empty_str(&root, "version").is_none() {
        root.insert(
            "version".into(),
            Value::String(CURRENT_SCHEMA_VERSION.to_string()),
        );
        fixed.push(format!("Set missing version to {CURRENT_SCHEMA_VERSION}"));
    }

    repair_global_settings(&mut root, &mut fixed);

    let packs = match root.remove("packs") {
        Some(Value::Array(packs)) => packs,
        Some(_) => {
            fixed.push("Replaced invalid packs with an empty list".to_string());
            Vec::new()
        }
        None => {
            fixed.push("Added missing packs list".to_string());
            Vec::new()
        }
    };

    let mut repaired_packs = Vec::with_capacity(packs.len());
    for (index, pack) in packs.into_iter().enumerate() {
        match pack {
            Value::Object(mut pack) => {
                repair_pack(index, &mut pack, &mut fixed);
                repaired_packs.push(pack);
            }
            _ => fixed.push(format!("Removed pack #{index}: not an object")),
        }
    }
    dedupe_packs(&mut repaired_packs, &mut fixed);

    root.insert(
        "packs".into(),
        Value::Array(repaired_packs.into_iter().map(Value::Object).collect()),
    );

    RepairOutcome {
        repaired: Value::Object(root),
        fixed_issues: fixed,
    }
}

fn repair_global_settings(root: &mut Map<String, Value>, fixed: &mut Vec<String>) {
    let defaults = to_object(&GlobalSettings::default());

    let settings = match root.get_mut("globalSettings") {
        Some(Value::Object(settings)) => settings,
        _ => {
            root.insert("globalSettings".into(), Value::Object(defaults));
            fixed.push("Reset globalSettings to defaults".to_string());
            return;
        }
    };

    for (key, default) in &defaults {
        let valid = match (key.as_str(), settings.get(key)) {
            (_, None) => false,
            ("defaultNotificationTime", Some(value)) => value.as_str().is_some_and(is_clock_time),
            ("linkHandling", Some(value)) => is_member(value, &LinkHandling::ALL),
            (_, Some(value)) => same_json_type(value, default),
        };
        if !valid {
            settings.insert(key.clone(), default.clone());
            fixed.push(format!("Reset global setting {key} to default"));
        }
    }
}

fn repair_pack(index: usize, pack: &mut Map<String, Value>, fixed: &mut Vec<String>) {
    if non_empty_str(pack, "id").is_none() {
        pack.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        fixed.push(format!("Generated id for pack #{index}"));
    }

    if non_empty_str(pack, "name").is_none() {
        pack.insert(
            "name".into(),
            Value::String(format!("Recovered Pack {}", index + 1)),
        );
        fixed.push(format!("Named unnamed pack #{index}"));
    }

    let label = non_empty_str(pack, "name").unwrap_or_default().to_string();

    let kind = match pack.get("type").and_then(Value::as_str).and_then(PackKind::parse) {
        Some(kind) => kind,
        None => {
            let kind = infer_kind(pack);
            pack.insert("type".into(), Value::String(kind.as_str().into()));
            fixed.push(format!("Reset type of \"{label}\" to {}", kind.as_str()));
            kind
        }
    };

    for key in ["createdAt", "updatedAt"] {
        if !pack.get(key).is_some_and(is_timestamp) {
            pack.insert(key.into(), Value::String(now_rfc3339()));
            fixed.push(format!("Set {key} of \"{label}\""));
        }
    }

    repair_pack_settings(&label, pack, fixed);
    repair_items(&label, kind, pack, fixed);
    repair_progress(&label, kind, pack, fixed);
}

/// Pick the delivery kind the surviving items fit best.
fn infer_kind(pack: &Map<String, Value>) -> PackKind {
    let items = pack.get("prompts").and_then(Value::as_array);
    let has = |key: &str| {
        items.is_some_and(|items| items.iter().any(|item| item.get(key).is_some()))
    };
    if has("date") {
        PackKind::DateBased
    } else if has("order") {
        PackKind::Sequential
    } else {
        PackKind::Random
    }
}

fn repair_pack_settings(label: &str, pack: &mut Map<String, Value>, fixed: &mut Vec<String>) {
    let defaults = to_object(&PackSettings::default());

    let settings = match pack.get_mut("settings") {
        Some(Value::Object(settings)) => settings,
        _ => {
            pack.insert("settings".into(), Value::Object(defaults));
            fixed.push(format!("Reset settings of \"{label}\" to defaults"));
            return;
        }
    };

    for (key, default) in &defaults {
        let valid = match (key.as_str(), settings.get(key)) {
            (_, None) => false,
            ("notificationTime", Some(value)) => value.as_str().is_some_and(is_clock_time),
            ("notificationType", Some(value)) => is_member(value, &NotificationType::ALL),
            (_, Some(value)) => same_json_type(value, default),
        };
        if !valid {
            settings.insert(key.clone(), default.clone());
            fixed.push(format!("Reset setting {key} of \"{label}\""));
        }
    }

    if settings
        .get("customTemplate")
        .is_some_and(|value| !value.is_string())
    {
        settings.remove("customTemplate");
        fixed.push(format!("Removed invalid customTemplate of \"{label}\""));
    }
}

fn repair_items(
    label: &str,
    kind: PackKind,
    pack: &mut Map<String, Value>,
    fixed: &mut Vec<String>,
) {
    let items = match pack.remove("prompts") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            fixed.push(format!("Replaced invalid prompts of \"{label}\" with an empty list"));
            Vec::new()
        }
        None => {
            fixed.push(format!("Added missing prompts list to \"{label}\""));
            Vec::new()
        }
    };

    let mut seen_ids = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut item) = item else {
            fixed.push(format!("Dropped prompt #{index} of \"{label}\": not an object"));
            continue;
        };

        if non_empty_str(&item, "content").is_none() {
            fixed.push(format!("Dropped prompt #{index} of \"{label}\": no content"));
            continue;
        }

        let date_ok = item
            .get("date")
            .map(|value| value.as_str().is_some_and(is_item_date));
        match (kind, date_ok) {
            (PackKind::DateBased, None) => {
                fixed.push(format!("Dropped prompt #{index} of \"{label}\": missing date"));
                continue;
            }
            (PackKind::DateBased, Some(false)) => {
                fixed.push(format!("Dropped prompt #{index} of \"{label}\": unparseable date"));
                continue;
            }
            (_, Some(false)) => {
                item.remove("date");
                fixed.push(format!("Removed invalid date from prompt #{index} of \"{label}\""));
            }
            _ => {}
        }

        let id = non_empty_str(&item, "id").map(str::to_string);
        match id {
            Some(id) if seen_ids.insert(id.clone()) => {}
            Some(id) => {
                let fresh = Uuid::new_v4().to_string();
                seen_ids.insert(fresh.clone());
                item.insert("id".into(), Value::String(fresh));
                fixed.push(format!("Regenerated duplicate prompt id {id} in \"{label}\""));
            }
            None => {
                let fresh = Uuid::new_v4().to_string();
                seen_ids.insert(fresh.clone());
                item.insert("id".into(), Value::String(fresh));
                fixed.push(format!("Generated id for prompt #{index} of \"{label}\""));
            }
        }

        if !item.get("type").is_some_and(|value| is_member(value, &ItemType::ALL)) {
            item.insert("type".into(), Value::String("text".into()));
            fixed.push(format!("Reset type of prompt #{index} of \"{label}\" to text"));
        }

        if item
            .get("order")
            .is_some_and(|value| !is_non_negative_integer(value))
        {
            if kind == PackKind::Sequential {
                item.insert("order".into(), Value::from(kept.len() as u64));
                fixed.push(format!("Reassigned order of prompt #{index} of \"{label}\""));
            } else {
                item.remove("order");
                fixed.push(format!("Removed invalid order from prompt #{index} of \"{label}\""));
            }
        }

        kept.push(Value::Object(item));
    }

    pack.insert("prompts".into(), Value::Array(kept));
}

fn repair_progress(
    label: &str,
    kind: PackKind,
    pack: &mut Map<String, Value>,
    fixed: &mut Vec<String>,
) {
    let progress = match pack.get_mut("progress") {
        Some(Value::Object(progress)) => progress,
        _ => {
            pack.insert(
                "progress".into(),
                Value::Object(to_object(&ProgressRecord::for_kind(kind))),
            );
            fixed.push(format!("Created empty progress for \"{label}\""));
            return;
        }
    };

    match progress.get("completedPrompts") {
        Some(value) if is_id_list(value) => {}
        Some(value) => {
            let cleaned = clean_id_list(value);
            progress.insert("completedPrompts".into(), cleaned);
            fixed.push(format!("Cleaned completedPrompts of \"{label}\""));
        }
        None => {
            progress.insert("completedPrompts".into(), Value::Array(Vec::new()));
            fixed.push(format!("Added completedPrompts to \"{label}\""));
        }
    }

    if progress
        .get("currentIndex")
        .is_some_and(|value| !is_non_negative_integer(value))
    {
        progress.insert("currentIndex".into(), Value::from(0u64));
        fixed.push(format!("Reset currentIndex of \"{label}\""));
    }

    if let Some(value) = progress.get("usedPrompts") {
        if !is_id_list(value) {
            let cleaned = clean_id_list(value);
            progress.insert("usedPrompts".into(), cleaned);
            fixed.push(format!("Cleaned usedPrompts of \"{label}\""));
        }
    }

    if !progress.get("lastAccessDate").is_some_and(is_timestamp) {
        progress.insert("lastAccessDate".into(), Value::String(now_rfc3339()));
        fixed.push(format!("Set lastAccessDate of \"{label}\""));
    }
}

fn dedupe_packs(packs: &mut [Map<String, Value>], fixed: &mut Vec<String>) {
    let mut ids = HashSet::new();
    for pack in packs.iter_mut() {
        let id = non_empty_str(pack, "id").unwrap_or_default().to_string();
        if !ids.insert(id.clone()) {
            let fresh = Uuid::new_v4().to_string();
            ids.insert(fresh.clone());
            pack.insert("id".into(), Value::String(fresh));
            fixed.push(format!("Regenerated duplicate pack id {id}"));
        }
    }

    // Every original name is reserved up front so a generated suffix can
    // never collide with a pack further down the list.
    let mut taken: HashSet<String> = packs
        .iter()
        .filter_map(|pack| non_empty_str(pack, "name").map(str::to_string))
        .collect();
    let mut claimed = HashSet::new();
    for pack in packs.iter_mut() {
        let name = non_empty_str(pack, "name").unwrap_or_default().to_string();
        if claimed.insert(name.clone()) {
            continue;
        }
        let mut n = 2;
        let unique = loop {
            let candidate = format!("{name} ({n})");
            if !taken.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        taken.insert(unique.clone());
        claimed.insert(unique.clone());
        pack.insert("name".into(), Value::String(unique.clone()));
        fixed.push(format!("Renamed duplicate pack \"{name}\" to \"{unique}\""));
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

fn clean_id_list(value: &Value) -> Value {
    let ids = value
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter(|id| id.as_str().is_some_and(|raw| !raw.trim().is_empty()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Value::Array(ids)
}

fn same_json_type(value: &Value, default: &Value) -> bool {
    matches!(
        (value, default),
        (Value::Bool(_), Value::Bool(_))
            | (Value::String(_), Value::String(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
    )
}

fn to_object<T: serde::Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
