//! Default-value elision for the fields that almost always hold their
//! default. Elided keys are put back on decode.

use serde_json::{Map, Value};

use crate::models::PackSettings;

const ITEM_TYPE_DEFAULT: &str = "text";

fn pack_settings_defaults() -> Map<String, Value> {
    match serde_json::to_value(PackSettings::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

pub fn elide(mut document: Value) -> Value {
    let settings_defaults = pack_settings_defaults();
    for pack in packs_mut(&mut document) {
        if let Some(Value::Object(settings)) = pack.get_mut("settings") {
            settings.retain(|key, value| settings_defaults.get(key) != Some(value));
        }
        if let Some(Value::Object(progress)) = pack.get_mut("progress") {
            if progress
                .get("completedPrompts")
                .and_then(Value::as_array)
                .is_some_and(Vec::is_empty)
            {
                progress.remove("completedPrompts");
            }
        }
        if let Some(Value::Array(items)) = pack.get_mut("prompts") {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                if item.get("type").and_then(Value::as_str) == Some(ITEM_TYPE_DEFAULT) {
                    item.remove("type");
                }
            }
        }
    }
    document
}

pub fn restore(mut document: Value) -> Value {
    let settings_defaults = pack_settings_defaults();
    for pack in packs_mut(&mut document) {
        if let Some(Value::Object(settings)) = pack.get_mut("settings") {
            for (key, value) in &settings_defaults {
                settings.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        if let Some(Value::Object(progress)) = pack.get_mut("progress") {
            progress
                .entry("completedPrompts")
                .or_insert_with(|| Value::Array(Vec::new()));
        }
        if let Some(Value::Array(items)) = pack.get_mut("prompts") {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                item.entry("type")
                    .or_insert_with(|| Value::String(ITEM_TYPE_DEFAULT.into()));
            }
        }
    }
    document
}

fn packs_mut(document: &mut Value) -> impl Iterator<Item = &mut Map<String, Value>> {
    document
        .get_mut("packs")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flat_map(|packs| packs.iter_mut())
        .filter_map(Value::as_object_mut)
}
