use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::ProgressRecord;
use crate::errors::{Result, StoreError};

pub const CURRENT_VERSION: &str = "1.0.0";

/// The single persisted root: every pack, its progress and the global settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub version: String,
    #[serde(default)]
    pub packs: Vec<Pack>,
    #[serde(default)]
    pub global_settings: GlobalSettings,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            packs: Vec::new(),
            global_settings: GlobalSettings::default(),
        }
    }
}

impl Document {
    pub fn pack(&self, pack_id: &str) -> Option<&Pack> {
        self.packs.iter().find(|pack| pack.id == pack_id)
    }

    pub fn pack_mut(&mut self, pack_id: &str) -> Option<&mut Pack> {
        self.packs.iter_mut().find(|pack| pack.id == pack_id)
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|err| StoreError::Other(err.into()))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| StoreError::corruption(format!("document does not match schema: {err}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackKind {
    Sequential,
    Random,
    #[serde(rename = "date")]
    DateBased,
}

impl PackKind {
    pub const ALL: [&'static str; 3] = ["sequential", "random", "date"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackKind::Sequential => "sequential",
            PackKind::Random => "random",
            PackKind::DateBased => "date",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sequential" => Some(PackKind::Sequential),
            "random" => Some(PackKind::Random),
            "date" => Some(PackKind::DateBased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pack {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PackKind,
    #[serde(rename = "prompts", default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub settings: PackSettings,
    #[serde(default)]
    pub progress: ProgressRecord,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Pack {
    pub fn new(name: impl Into<String>, kind: PackKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            items: Vec::new(),
            settings: PackSettings::default(),
            progress: ProgressRecord::for_kind(kind),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items = items;
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Text,
    Link,
    RichText,
}

impl ItemType {
    pub const ALL: [&'static str; 3] = ["text", "link", "richtext"];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    /// Only meaningful in date-based packs (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Only meaningful in sequential packs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl Item {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            item_type: ItemType::Text,
            date: None,
            order: None,
        }
    }

    pub fn ordered(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn dated(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NotificationType {
    #[serde(rename = "system")]
    System,
    #[default]
    #[serde(rename = "in-app")]
    InApp,
}

impl NotificationType {
    pub const ALL: [&'static str; 2] = ["system", "in-app"];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PackSettings {
    pub notification_enabled: bool,
    pub notification_time: String,
    pub notification_type: NotificationType,
    pub zen_mode_enabled: bool,
    pub daily_note_integration: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_template: Option<String>,
}

impl Default for PackSettings {
    fn default() -> Self {
        Self {
            notification_enabled: false,
            notification_time: "09:00".into(),
            notification_type: NotificationType::InApp,
            zen_mode_enabled: false,
            daily_note_integration: true,
            custom_template: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkHandling {
    #[default]
    Direct,
    Embed,
    Reference,
}

impl LinkHandling {
    pub const ALL: [&'static str; 3] = ["direct", "embed", "reference"];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    pub default_notification_time: String,
    pub default_zen_mode: bool,
    pub daily_note_integration: bool,
    pub daily_note_folder: String,
    pub daily_note_template: String,
    pub link_handling: LinkHandling,
    pub enable_global_notifications: bool,
    pub notification_sound: bool,
    /// Keys written by newer releases or plugins; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            default_notification_time: "09:00".into(),
            default_zen_mode: false,
            daily_note_integration: true,
            daily_note_folder: String::new(),
            daily_note_template: String::new(),
            link_handling: LinkHandling::Direct,
            enable_global_notifications: true,
            notification_sound: true,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pack_serializes_with_persisted_key_names() {
        let pack = Pack::new("Morning", PackKind::DateBased)
            .with_items(vec![Item::new("What went well?").dated("2026-01-02")]);
        let value = serde_json::to_value(&pack).unwrap();

        assert_eq!(value["type"], "date");
        assert_eq!(value["prompts"][0]["type"], "text");
        assert_eq!(value["prompts"][0]["date"], "2026-01-02");
        assert!(value["prompts"][0].get("order").is_none());
        assert!(value["progress"]["completedPrompts"].is_array());
    }

    #[test]
    fn global_settings_keep_unknown_keys() {
        let value = json!({
            "defaultNotificationTime": "07:30",
            "linkHandling": "embed",
            "experimentalFlag": true
        });
        let settings: GlobalSettings = serde_json::from_value(value).unwrap();
        assert_eq!(settings.default_notification_time, "07:30");
        assert_eq!(settings.link_handling, LinkHandling::Embed);
        assert!(settings.notification_sound);
        assert_eq!(settings.extra.get("experimentalFlag"), Some(&json!(true)));

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["experimentalFlag"], json!(true));
    }

    #[test]
    fn document_value_round_trip() {
        let mut doc = Document::default();
        doc.packs.push(
            Pack::new("Steps", PackKind::Sequential)
                .with_items(vec![Item::new("one").ordered(0), Item::new("two").ordered(1)]),
        );
        let back = Document::from_value(doc.to_value().unwrap()).unwrap();
        assert_eq!(back, doc);
    }
}
