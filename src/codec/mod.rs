//! Blob codec: adaptive compression of the document plus a cheap content hash.
//!
//! Small documents are stored as-is. Larger ones go through default-value
//! elision and string deduplication, and the packed form is only kept when it
//! is meaningfully smaller than the original. Nothing here is fatal: a failure
//! to pack or unpack hands the input back unchanged.

pub mod dedup;
pub mod defaults;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{Result, StoreError};

pub const DEFAULT_THRESHOLD_BYTES: usize = 1024;
pub const DEFAULT_MAX_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecConfig {
    /// Inputs smaller than this are never packed.
    pub threshold_bytes: usize,
    /// Packed output is adopted only below this size ratio.
    pub max_ratio: f64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            max_ratio: DEFAULT_MAX_RATIO,
        }
    }
}

/// Packed representations. `V1` only elides defaults; `V2` also
/// deduplicates strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Envelope {
    V1 { data: Value },
    V2 { data: Value, strings: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Blob {
    Raw(Value),
    Packed(Envelope),
}

impl Blob {
    pub fn is_packed(&self) -> bool {
        matches!(self, Blob::Packed(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Blob::Raw(value) => value,
            Blob::Packed(envelope) => match serde_json::to_value(&envelope) {
                Ok(value) => value,
                // Unreachable for a tree of `Value`s, but never lose data.
                Err(_) => match envelope {
                    Envelope::V1 { data } | Envelope::V2 { data, .. } => data,
                },
            },
        }
    }

    /// Recognises tagged envelopes, the older sentinel-keyed envelopes and
    /// plain documents.
    pub fn from_value(value: Value) -> Blob {
        let Some(object) = value.as_object() else {
            return Blob::Raw(value);
        };

        if object.contains_key("data") {
            if let Some(format) = object.get("format").and_then(Value::as_str) {
                if matches!(format, "v1" | "v2") {
                    return match serde_json::from_value::<Envelope>(value.clone()) {
                        Ok(envelope) => Blob::Packed(envelope),
                        Err(err) => {
                            warn!("malformed {format} envelope: {err}");
                            Blob::Raw(value)
                        }
                    };
                }
            }

            if object.get("__compressed").and_then(Value::as_bool) == Some(true) {
                return legacy_envelope(value);
            }
        }

        Blob::Raw(value)
    }
}

fn legacy_envelope(value: Value) -> Blob {
    let Value::Object(mut object) = value else {
        return Blob::Raw(value);
    };
    let version = object
        .get("__version")
        .and_then(Value::as_str)
        .unwrap_or("1.0")
        .to_string();
    let data = object.remove("data").unwrap_or(Value::Null);
    let strings = object
        .remove("strings")
        .or_else(|| object.remove("__strings"))
        .and_then(|raw| serde_json::from_value::<Vec<String>>(raw).ok());

    match (version.as_str(), strings) {
        ("2.0", Some(strings)) => Blob::Packed(Envelope::V2 { data, strings }),
        _ => Blob::Packed(Envelope::V1 { data }),
    }
}

pub fn encode(document: &Value) -> Value {
    encode_with(document, &CodecConfig::default()).into_value()
}

pub fn encode_with(document: &Value, config: &CodecConfig) -> Blob {
    match try_encode(document, config) {
        Ok(blob) => blob,
        Err(err) => {
            warn!("compression failed, storing uncompressed: {err}");
            Blob::Raw(document.clone())
        }
    }
}

fn try_encode(document: &Value, config: &CodecConfig) -> Result<Blob> {
    let original_size = serialized_len(document)?;
    if original_size < config.threshold_bytes {
        return Ok(Blob::Raw(document.clone()));
    }

    let elided = defaults::elide(document.clone());
    let (data, strings) = dedup::deduplicate(elided);
    let envelope = Envelope::V2 { data, strings };
    let packed_size = serialized_len(&serde_json::to_value(&envelope)?)?;

    let ratio = packed_size as f64 / original_size as f64;
    if ratio < config.max_ratio {
        debug!("packed document {original_size} -> {packed_size} bytes (ratio {ratio:.2})");
        Ok(Blob::Packed(envelope))
    } else {
        debug!("compression ratio {ratio:.2} not worth it, storing raw");
        Ok(Blob::Raw(document.clone()))
    }
}

/// Decode a stored blob. Undecodable input comes back unchanged so the
/// validation gate downstream can judge it.
pub fn decode(blob: Value) -> Value {
    match Blob::from_value(blob) {
        Blob::Raw(value) => value,
        Blob::Packed(envelope) => match unpack(&envelope) {
            Ok(value) => value,
            Err(err) => {
                warn!("decompression failed, passing blob through: {err}");
                Blob::Packed(envelope).into_value()
            }
        },
    }
}

pub fn try_decode(blob: Value) -> Result<Value> {
    match Blob::from_value(blob) {
        Blob::Raw(value) => Ok(value),
        Blob::Packed(envelope) => unpack(&envelope),
    }
}

fn unpack(envelope: &Envelope) -> Result<Value> {
    match envelope {
        Envelope::V1 { data } => Ok(defaults::restore(data.clone())),
        Envelope::V2 { data, strings } => {
            let expanded = dedup::expand(data.clone(), strings)?;
            Ok(defaults::restore(expanded))
        }
    }
}

/// Non-cryptographic content hash; only used to notice that stored data
/// changed underneath the cache.
pub fn hash(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    format!("{:016x}", xxh3_64(&bytes))
}

fn serialized_len(value: &Value) -> Result<usize> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|err| StoreError::Other(err.into()))
}
