//! Layer contents and their JSON representation.

pub mod projection;

pub use projection::{base_len, indexes, text, values};

use crate::error::{LayerDbError, Result};
use crate::schema::{DataType, LayerDesc, LayerType};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// A single value carried by a layer element.
///
/// Serialized as a string, a link index, or an `[index, "type"]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataValue {
    String(String),
    Link(u32),
    TypedLink(u32, String),
}

impl DataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn link(&self) -> Option<u32> {
        match self {
            DataValue::Link(n) | DataValue::TypedLink(n, _) => Some(*n),
            DataValue::String(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            DataValue::String(s) => Value::String(s.clone()),
            DataValue::Link(n) => json!(n),
            DataValue::TypedLink(n, t) => json!([n, t]),
        }
    }

    /// Parse a JSON value into a data value, without checking it against a declaration.
    pub fn from_json(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(s) => Ok(DataValue::String(s.clone())),
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(DataValue::Link)
                .ok_or_else(|| format!("Invalid link index {n}")),
            Value::Array(items) => match items.as_slice() {
                [Value::Number(n), Value::String(t)] => n
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(|n| DataValue::TypedLink(n, t.clone()))
                    .ok_or_else(|| format!("Invalid link index {n}")),
                _ => Err(format!("Invalid typed link {value}")),
            },
            other => Err(format!("Invalid data value {other}")),
        }
    }

    /// Order two values of the same kind; values of different kinds are unordered.
    pub fn compare(&self, other: &DataValue) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (DataValue::String(a), DataValue::String(b)) => Some(a.cmp(b)),
            (DataValue::Link(a), DataValue::Link(b)) => Some(a.cmp(b)),
            (DataValue::TypedLink(a, _), DataValue::TypedLink(b, _)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::String(s) => f.write_str(s),
            DataValue::Link(n) => write!(f, "{n}"),
            DataValue::TypedLink(n, t) => write!(f, "{n}:{t}"),
        }
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Link(n) => serializer.serialize_u32(*n),
            DataValue::TypedLink(n, t) => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(n)?;
                tuple.serialize_element(t)?;
                tuple.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DataValue::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.to_string())
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::String(s)
    }
}

impl From<u32> for DataValue {
    fn from(n: u32) -> Self {
        DataValue::Link(n)
    }
}

/// A half-open range `[start, end)` over the base layer, with an optional value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub value: Option<DataValue>,
}

/// A value attached to one index of the base layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub index: usize,
    pub value: Option<DataValue>,
}

/// The contents of one layer in one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerData {
    Characters(String),
    Span(Vec<Span>),
    Seq(Vec<DataValue>),
    Element(Vec<Element>),
    /// Segment starts; each segment runs to the next start or the end of the base.
    Div(Vec<Element>),
}

impl LayerData {
    /// Unlabelled spans
    pub fn spans<I: IntoIterator<Item = (usize, usize)>>(ranges: I) -> Self {
        LayerData::Span(
            ranges
                .into_iter()
                .map(|(start, end)| Span { start, end, value: None })
                .collect(),
        )
    }

    /// Spans carrying a value each
    pub fn labelled_spans<I, V>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize, V)>,
        V: Into<DataValue>,
    {
        LayerData::Span(
            ranges
                .into_iter()
                .map(|(start, end, v)| Span { start, end, value: Some(v.into()) })
                .collect(),
        )
    }

    pub fn seq<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DataValue>,
    {
        LayerData::Seq(values.into_iter().map(Into::into).collect())
    }

    pub fn elements<I, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, V)>,
        V: Into<DataValue>,
    {
        LayerData::Element(
            entries
                .into_iter()
                .map(|(index, v)| Element { index, value: Some(v.into()) })
                .collect(),
        )
    }

    /// Unlabelled divisions starting at the given base indexes
    pub fn divs<I: IntoIterator<Item = usize>>(starts: I) -> Self {
        LayerData::Div(
            starts
                .into_iter()
                .map(|index| Element { index, value: None })
                .collect(),
        )
    }

    pub fn layer_type(&self) -> LayerType {
        match self {
            LayerData::Characters(_) => LayerType::Characters,
            LayerData::Span(_) => LayerType::Span,
            LayerData::Seq(_) => LayerType::Seq,
            LayerData::Element(_) => LayerType::Element,
            LayerData::Div(_) => LayerType::Div,
        }
    }

    /// Number of addressable elements: characters for text, entries otherwise.
    pub fn len(&self) -> usize {
        match self {
            LayerData::Characters(s) => s.chars().count(),
            LayerData::Span(v) => v.len(),
            LayerData::Seq(v) => v.len(),
            LayerData::Element(v) | LayerData::Div(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            LayerData::Characters(s) => Some(s),
            _ => None,
        }
    }

    /// Stored values in element order; a characters layer has none.
    pub fn values(&self) -> Vec<&DataValue> {
        match self {
            LayerData::Characters(_) => Vec::new(),
            LayerData::Span(v) => v.iter().filter_map(|s| s.value.as_ref()).collect(),
            LayerData::Seq(v) => v.iter().collect(),
            LayerData::Element(v) | LayerData::Div(v) => {
                v.iter().filter_map(|e| e.value.as_ref()).collect()
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            LayerData::Characters(s) => Value::String(s.clone()),
            LayerData::Span(spans) => Value::Array(
                spans
                    .iter()
                    .map(|s| match &s.value {
                        Some(v) => json!([s.start, s.end, v.to_json()]),
                        None => json!([s.start, s.end]),
                    })
                    .collect(),
            ),
            LayerData::Seq(values) => Value::Array(values.iter().map(DataValue::to_json).collect()),
            LayerData::Element(elements) | LayerData::Div(elements) => Value::Array(
                elements
                    .iter()
                    .map(|e| match &e.value {
                        Some(v) => json!([e.index, v.to_json()]),
                        None => json!(e.index),
                    })
                    .collect(),
            ),
        }
    }

    /// Parse the JSON form of a layer according to its declaration.
    pub fn from_json(value: &Value, desc: &LayerDesc) -> Result<LayerData> {
        let invalid = |msg: String| LayerDbError::Validation(msg);
        let has_data = desc.data().is_some();
        match desc.layer_type() {
            LayerType::Characters => value
                .as_str()
                .map(|s| LayerData::Characters(s.to_string()))
                .ok_or_else(|| invalid(format!("Expected a string for characters layer, got {value}"))),
            LayerType::Span => {
                let mut spans = Vec::new();
                for item in as_array(value)? {
                    let parts = as_array(item)?;
                    let (start, end, v) = match parts {
                        [s, e] if !has_data => (s, e, None),
                        [s, e, v] if has_data => (s, e, Some(parse_value(v, desc.data())?)),
                        _ => return Err(invalid(format!("Invalid span entry {item}"))),
                    };
                    spans.push(Span {
                        start: as_index(start)?,
                        end: as_index(end)?,
                        value: v,
                    });
                }
                Ok(LayerData::Span(spans))
            }
            LayerType::Seq => as_array(value)?
                .iter()
                .map(|v| parse_value(v, desc.data()))
                .collect::<Result<Vec<_>>>()
                .map(LayerData::Seq),
            LayerType::Element | LayerType::Div => {
                let mut elements = Vec::new();
                for item in as_array(value)? {
                    let element = match item {
                        Value::Number(_) if !has_data => Element { index: as_index(item)?, value: None },
                        Value::Array(parts) if has_data && parts.len() == 2 => Element {
                            index: as_index(&parts[0])?,
                            value: Some(parse_value(&parts[1], desc.data())?),
                        },
                        _ => return Err(invalid(format!("Invalid element entry {item}"))),
                    };
                    elements.push(element);
                }
                if desc.layer_type() == LayerType::Div {
                    Ok(LayerData::Div(elements))
                } else {
                    Ok(LayerData::Element(elements))
                }
            }
        }
    }
}

impl From<&str> for LayerData {
    fn from(s: &str) -> Self {
        LayerData::Characters(s.to_string())
    }
}

impl From<String> for LayerData {
    fn from(s: String) -> Self {
        LayerData::Characters(s)
    }
}

impl From<Vec<(usize, usize)>> for LayerData {
    fn from(ranges: Vec<(usize, usize)>) -> Self {
        LayerData::spans(ranges)
    }
}

impl From<Vec<&str>> for LayerData {
    fn from(values: Vec<&str>) -> Self {
        LayerData::seq(values)
    }
}

impl From<Vec<String>> for LayerData {
    fn from(values: Vec<String>) -> Self {
        LayerData::seq(values)
    }
}

impl From<Vec<(usize, &str)>> for LayerData {
    fn from(entries: Vec<(usize, &str)>) -> Self {
        LayerData::elements(entries)
    }
}

fn as_array(value: &Value) -> Result<&[Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| LayerDbError::Validation(format!("Expected an array, got {value}")))
}

fn as_index(value: &Value) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| LayerDbError::Validation(format!("Expected an index, got {value}")))
}

fn parse_value(value: &Value, data: Option<&DataType>) -> Result<DataValue> {
    // Link layers may store bare indexes; everything else stores strings
    match (data, value) {
        (Some(DataType::Link), _) | (_, Value::String(_)) => {
            DataValue::from_json(value).map_err(LayerDbError::Validation)
        }
        _ => Err(LayerDbError::Validation(format!(
            "Expected a string value, got {value}"
        ))),
    }
}
