//! Structural integrity of raw documents.
//!
//! Both halves work on untyped JSON: a damaged document usually cannot be
//! deserialized into the typed model, which is exactly when these matter.

mod detector;
mod repair;

pub use detector::check;
pub use repair::repair;

use serde::Serialize;
use serde_json::Value;

use crate::{
    errors::{Result, StoreError},
    models::Document,
    store::migrations::{run_migrations, MigrationOutcome},
};

/// Oldest schema that still gets migrated without a warning.
pub const OLDEST_SUPPORTED_VERSION: &str = "0.5.0";

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub fixable_issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub repaired: serde_json::Value,
    pub fixed_issues: Vec<String>,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        !self.fixed_issues.is_empty()
    }
}

/// A document that made it through [`admit`].
#[derive(Debug, Clone)]
pub struct Admitted {
    pub document: Document,
    pub migration: MigrationOutcome,
    pub check: IntegrityCheck,
}

/// The gate every stored document passes before anyone gets to see it:
/// a coarse shape check, forward migration, then the full check on the
/// migrated value. Legacy documents are only judged after migration has
/// filled in what older schemas never had.
pub fn admit(raw: Value) -> Result<Admitted> {
    check_shape(&raw).map_err(StoreError::Corruption)?;

    let (migrated, migration) = run_migrations(raw);
    let check = check(&migrated);
    if !check.is_valid {
        return Err(StoreError::corruption(check.errors.join("; ")));
    }

    let document = Document::from_value(migrated)?;
    Ok(Admitted {
        document,
        migration,
        check,
    })
}

/// Just enough structure for migration to make sense.
pub fn check_shape(raw: &Value) -> std::result::Result<(), String> {
    let Some(root) = raw.as_object() else {
        return Err("Data must be an object".into());
    };
    match root.get("packs") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err("packs must be an array".into()),
        None => return Err("Missing packs".into()),
    }
    match root.get("globalSettings") {
        None | Some(Value::Object(_)) => Ok(()),
        Some(_) => Err("globalSettings must be an object".into()),
    }
}
