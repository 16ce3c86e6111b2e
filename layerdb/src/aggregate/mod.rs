//! Frequency tables over a layer's surface text or stored values.

use crate::error::{LayerDbError, Result};
use crate::layer::{self, DataValue};
use crate::store::Corpus;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Decides which surface strings are counted by `text_freq`
pub trait TextCondition {
    fn matches(&self, text: &str) -> bool;
}

/// Decides which stored values are counted by `val_freq`
pub trait ValueCondition {
    fn matches(&self, value: &DataValue) -> bool;
}

/// Count everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyText;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnyValue;

impl TextCondition for AnyText {
    fn matches(&self, _text: &str) -> bool {
        true
    }
}

impl ValueCondition for AnyValue {
    fn matches(&self, _value: &DataValue) -> bool {
        true
    }
}

impl TextCondition for &str {
    fn matches(&self, text: &str) -> bool {
        *self == text
    }
}

impl TextCondition for String {
    fn matches(&self, text: &str) -> bool {
        self == text
    }
}

impl TextCondition for Vec<String> {
    fn matches(&self, text: &str) -> bool {
        self.iter().any(|s| s == text)
    }
}

impl TextCondition for HashSet<String> {
    fn matches(&self, text: &str) -> bool {
        self.contains(text)
    }
}

/// Full match
impl TextCondition for Regex {
    fn matches(&self, text: &str) -> bool {
        self.find(text)
            .map_or(false, |m| m.start() == 0 && m.end() == text.len())
    }
}

impl<F: Fn(&str) -> bool> TextCondition for F {
    fn matches(&self, text: &str) -> bool {
        self(text)
    }
}

impl ValueCondition for &str {
    fn matches(&self, value: &DataValue) -> bool {
        value.as_str() == Some(*self)
    }
}

impl ValueCondition for String {
    fn matches(&self, value: &DataValue) -> bool {
        value.as_str() == Some(self.as_str())
    }
}

impl ValueCondition for DataValue {
    fn matches(&self, value: &DataValue) -> bool {
        self == value
    }
}

impl ValueCondition for Vec<String> {
    fn matches(&self, value: &DataValue) -> bool {
        value.as_str().map_or(false, |s| self.iter().any(|v| v == s))
    }
}

impl ValueCondition for HashSet<String> {
    fn matches(&self, value: &DataValue) -> bool {
        value.as_str().map_or(false, |s| self.contains(s))
    }
}

impl ValueCondition for HashSet<DataValue> {
    fn matches(&self, value: &DataValue) -> bool {
        self.contains(value)
    }
}

/// Full match on string values
impl ValueCondition for Regex {
    fn matches(&self, value: &DataValue) -> bool {
        value
            .as_str()
            .map_or(false, |s| TextCondition::matches(self, s))
    }
}

impl<F: Fn(&DataValue) -> bool> ValueCondition for F {
    fn matches(&self, value: &DataValue) -> bool {
        self(value)
    }
}

impl Corpus {
    /// Count each distinct surface string of `layer` across all documents.
    pub fn text_freq<C: TextCondition>(&self, layer: &str, condition: C) -> Result<HashMap<String, u32>> {
        self.schema().layer(layer)?;
        let mut counts = HashMap::new();
        for doc in self.docs() {
            if doc.layer(layer).is_none() {
                continue;
            }
            let texts = match doc.layer(layer).and_then(|d| d.as_text()) {
                Some(whole) => vec![whole],
                None => layer::text(doc.document(), self.schema(), layer)?,
            };
            for text in texts.into_iter().filter(|t| condition.matches(t)) {
                *counts.entry(text.to_string()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Count each distinct stored value of `layer` across all documents.
    pub fn val_freq<C: ValueCondition>(&self, layer: &str, condition: C) -> Result<HashMap<DataValue, u32>> {
        let desc = self.schema().layer(layer)?;
        if desc.data().is_none() {
            return Err(LayerDbError::Schema(format!(
                "Layer '{layer}' declares no data to count"
            )));
        }
        let mut counts = HashMap::new();
        for doc in self.docs() {
            let Some(data) = doc.layer(layer) else {
                continue;
            };
            for value in data.values().into_iter().filter(|v| condition.matches(v)) {
                *counts.entry(value.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
