//! Content-addressed document identifiers.
//!
//! An ID is a prefix of the URL-safe base64 encoding of a SHA-256 digest over
//! the document's canonical content. Layers and metadata are hashed sorted by
//! name, so declaration order never affects the ID.

use crate::document::Document;
use crate::error::{LayerDbError, Result};
use crate::layer::LayerData;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Shortest ID length handed out
pub const DEFAULT_ID_LENGTH: usize = 4;

/// Configuration for document ID generation and conflict handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default)]
    pub on_conflict: OnConflict,
}

fn default_min_length() -> usize {
    DEFAULT_ID_LENGTH
}

impl Default for IdConfig {
    fn default() -> Self {
        IdConfig {
            min_length: DEFAULT_ID_LENGTH,
            on_conflict: OnConflict::default(),
        }
    }
}

/// What to do when a new ID prefix is already taken by different content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnConflict {
    /// Lengthen the prefix until it is unique
    #[default]
    Extend,
    Error,
}

/// Full encoded digest of a document's content
pub fn content_digest(doc: &Document) -> String {
    let mut hasher = Sha256::new();

    let mut layers: Vec<(&str, &LayerData)> = doc.layers().collect();
    layers.sort_by(|a, b| a.0.cmp(b.0));
    for (name, data) in layers {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        match data {
            LayerData::Characters(text) => hasher.update(text.as_bytes()),
            other => hasher.update(canonical(&other.to_json()).to_string().as_bytes()),
        }
        hasher.update([0u8]);
    }

    let mut meta: Vec<_> = doc.meta().iter().collect();
    meta.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in meta {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical(value).to_string().as_bytes());
        hasher.update([0u8]);
    }

    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Copy of `value` with every object's keys sorted, so equal values print equally.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// The default-length ID of a document, ignoring any other documents
pub fn compute_id(doc: &Document) -> String {
    let digest = content_digest(doc);
    digest[..DEFAULT_ID_LENGTH].to_string()
}

/// Pick the ID for `digest` given the IDs already in use.
///
/// `occupant` returns the full digest of the document stored under a key, or
/// `None` if the key is free.
pub fn assign_id<F>(digest: &str, config: &IdConfig, mut occupant: F) -> Result<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let min = config.min_length.clamp(1, digest.len());
    for n in min..=digest.len() {
        let candidate = &digest[..n];
        match occupant(candidate) {
            None => return Ok(candidate.to_string()),
            Some(other) if other == digest => {
                return Err(LayerDbError::IdConflict {
                    id: candidate.to_string(),
                })
            }
            Some(_) if config.on_conflict == OnConflict::Error => {
                return Err(LayerDbError::Validation(format!(
                    "Document ID '{candidate}' is already taken by different content"
                )))
            }
            Some(_) => continue,
        }
    }
    Err(LayerDbError::Other(format!(
        "No free ID for digest '{digest}'"
    )))
}

/// Whether `id` is a legal stored key for content with this digest
pub fn id_matches(id: &str, digest: &str) -> bool {
    !id.is_empty() && digest.starts_with(id)
}
