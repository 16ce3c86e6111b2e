//! YAML form: the same structure as the JSON form, laid out for reading.
//!
//! Layer declarations use block style with a 4-space indent. Text layers are
//! plain scalars; every other layer is a compact flow sequence:
//!
//! ```yaml
//! _meta:
//!     text:
//!         type: characters
//!     tokens:
//!         type: span
//!         base: text
//! kqc3:
//!     text: This is an example
//!     tokens: [[0,4],[5,7],[8,10],[11,18]]
//! ```

use crate::error::{LayerDbError, Result};
use crate::layer::LayerData;
use crate::schema::{DataType, LayerDesc};
use crate::store::Corpus;
use serde_json::Value;
use std::fmt::Write as _;
use std::io::Read;

use super::json::{self, META_KEY};

const INDENT: &str = "    ";

pub fn to_string(corpus: &Corpus) -> Result<String> {
    let mut out = String::new();
    out.push_str(META_KEY);
    out.push(':');
    if corpus.schema().is_empty() {
        out.push_str(" {}\n");
    } else {
        out.push('\n');
    }
    for (name, desc) in corpus.schema().iter() {
        writeln!(out, "{INDENT}{}:", scalar(name)?)?;
        write_desc(&mut out, desc)?;
    }

    for doc in corpus.docs() {
        write!(out, "{}:", scalar(doc.id())?)?;
        let content = doc.document();
        if content.layers().next().is_none() && content.meta().is_empty() {
            out.push_str(" {}\n");
            continue;
        }
        out.push('\n');
        for (name, data) in content.layers() {
            let rendered = match data {
                LayerData::Characters(text) => scalar(text)?,
                other => flow(&other.to_json()),
            };
            writeln!(out, "{INDENT}{}: {rendered}", scalar(name)?)?;
        }
        for (key, value) in content.meta() {
            writeln!(out, "{INDENT}{}: {}", scalar(key)?, flow(value))?;
        }
    }
    Ok(out)
}

fn write_desc(out: &mut String, desc: &LayerDesc) -> Result<()> {
    let field = INDENT.repeat(2);
    writeln!(out, "{field}type: {}", desc.layer_type())?;
    if let Some(base) = desc.base() {
        writeln!(out, "{field}base: {}", scalar(base)?)?;
    }
    match desc.data() {
        Some(DataType::String) => writeln!(out, "{field}data: string")?,
        Some(DataType::Link) => writeln!(out, "{field}data: link")?,
        Some(DataType::Enum(values)) => writeln!(out, "{field}data: {}", serde_json::to_string(values)?)?,
        None => {}
    }
    if let Some(types) = desc.link_types() {
        writeln!(out, "{field}link_types: {}", serde_json::to_string(types)?)?;
    }
    if let Some(target) = desc.target() {
        writeln!(out, "{field}target: {}", scalar(target)?)?;
    }
    if let Some(default) = desc.default_value() {
        writeln!(out, "{field}default: {}", flow(default))?;
    }
    if !desc.meta().is_empty() {
        writeln!(out, "{field}meta:")?;
        for (key, value) in desc.meta() {
            writeln!(out, "{field}{INDENT}{}: {}", scalar(key)?, flow(value))?;
        }
    }
    Ok(())
}

/// A string as a single-line YAML scalar, quoted only when YAML would misread it.
fn scalar(s: &str) -> Result<String> {
    let plain = serde_yaml::to_string(s)?;
    let plain = plain.strip_suffix('\n').unwrap_or(&plain);
    if plain.contains('\n') {
        // Block scalars would break the one-line layout
        Ok(serde_json::to_string(s)?)
    } else {
        Ok(plain.to_string())
    }
}

/// Compact JSON, which YAML reads as a flow collection. Mapping entries get a
/// space after the colon so that every YAML parser accepts them.
fn flow(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(flow).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), flow(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        scalar => scalar.to_string(),
    }
}

pub fn from_str(content: &str) -> Result<Corpus> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| LayerDbError::Codec(format!("Invalid YAML: {e}")))?;
    json::from_value(&to_json(value)?)
}

pub fn from_reader<R: Read>(reader: R) -> Result<Corpus> {
    let value: serde_yaml::Value = serde_yaml::from_reader(reader)
        .map_err(|e| LayerDbError::Codec(format!("Invalid YAML: {e}")))?;
    json::from_value(&to_json(value)?)
}

/// Convert parsed YAML to JSON. Non-string keys (an ID such as `1234` written
/// without quotes) become their textual form.
fn to_json(value: serde_yaml::Value) -> Result<Value> {
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(u) = n.as_u64() {
                Value::from(u)
            } else if let Some(i) = n.as_i64() {
                Value::from(i)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| LayerDbError::Codec(format!("Unrepresentable number {n}")))?
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(items) => Value::Array(items.into_iter().map(to_json).collect::<Result<_>>()?),
        Y::Mapping(map) => {
            let mut object = serde_json::Map::new();
            for (key, value) in map {
                object.insert(key_text(key)?, to_json(value)?);
            }
            Value::Object(object)
        }
        Y::Tagged(tagged) => to_json(tagged.value)?,
    })
}

fn key_text(key: serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value as Y;
    match key {
        Y::String(s) => Ok(s),
        Y::Number(n) => Ok(n.to_string()),
        Y::Bool(b) => Ok(b.to_string()),
        other => Err(LayerDbError::Codec(format!("Unsupported mapping key {other:?}"))),
    }
}
