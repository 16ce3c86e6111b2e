//! Structured filters over layer values and surface text.
//!
//! Filters are written as JSON objects in the style of document-store query
//! languages:
//!
//! ```json
//! {"pos": "NOUN", "lemma": {"$in": ["dog", "cat"]}, "words": {"$regex": "d.*"}}
//! ```
//!
//! Entries of a mapping are AND-ed. A literal tests equality, an array tests
//! membership, and an object applies one or more `$` operators.

use crate::document::Document;
use crate::error::{LayerDbError, Result};
use crate::layer::{self, DataValue, LayerData};
use crate::schema::SchemaStore;
use regex::Regex;
use serde_json::{Map, Value};

/// A test applied to the values (and, for some tests, the surface text) of one layer
#[derive(Debug, Clone)]
pub enum Condition {
    /// A stored value or a surface string equals the literal
    Eq(DataValue),
    /// Some stored value differs from the literal
    Ne(DataValue),
    In(Vec<DataValue>),
    /// Some stored value is outside the set
    Nin(Vec<DataValue>),
    Lt(DataValue),
    Lte(DataValue),
    Gt(DataValue),
    Gte(DataValue),
    /// Full match against stored string values or surface text
    Regex(Regex),
    /// A surface string equals the literal
    Text(String),
    /// Full match against surface text only
    TextRegex(Regex),
}

#[derive(Debug, Clone)]
pub enum Query {
    Match { layer: String, cond: Condition },
    Exists(String),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    /// Parse a JSON filter expression, checking every layer against the schema.
    pub fn parse(value: &Value, schema: &SchemaStore) -> Result<Query> {
        match value {
            Value::Object(map) => parse_mapping(map, schema),
            other => Err(query_error(format!("Query must be an object, got {other}"))),
        }
    }

    /// Fail if any layer the query names is not declared.
    pub fn check_layers(&self, schema: &SchemaStore) -> Result<()> {
        match self {
            Query::Match { layer, .. } | Query::Exists(layer) => {
                if schema.contains(layer) {
                    Ok(())
                } else {
                    Err(query_error(format!("Unknown layer '{layer}'")))
                }
            }
            Query::And(parts) | Query::Or(parts) => {
                parts.iter().try_for_each(|q| q.check_layers(schema))
            }
            Query::Not(q) => q.check_layers(schema),
        }
    }

    pub fn matches(&self, doc: &Document, schema: &SchemaStore) -> Result<bool> {
        match self {
            Query::Match { layer, cond } => match doc.layer(layer) {
                Some(data) => cond.matches(doc, schema, layer, data),
                None => Ok(false),
            },
            Query::Exists(layer) => Ok(doc.has_layer(layer)),
            Query::And(all) => {
                for q in all {
                    if !q.matches(doc, schema)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Query::Or(any) => {
                for q in any {
                    if q.matches(doc, schema)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Query::Not(q) => Ok(!q.matches(doc, schema)?),
        }
    }
}

impl Condition {
    fn matches(&self, doc: &Document, schema: &SchemaStore, layer: &str, data: &LayerData) -> Result<bool> {
        let values = data.values();
        let texts = || surface_text(doc, schema, layer, data);

        let found = match self {
            Condition::Eq(v) => {
                values.iter().any(|x| *x == v)
                    || match v {
                        DataValue::String(s) => texts()?.contains(&s.as_str()),
                        _ => false,
                    }
            }
            Condition::Ne(v) => values.iter().any(|x| *x != v),
            Condition::In(set) => {
                values.iter().any(|x| set.contains(x))
                    || texts()?
                        .iter()
                        .any(|t| set.iter().any(|v| v.as_str() == Some(*t)))
            }
            Condition::Nin(set) => values.iter().any(|x| !set.contains(x)),
            Condition::Lt(v) => compare_any(&values, v, |o| o.is_lt()),
            Condition::Lte(v) => compare_any(&values, v, |o| o.is_le()),
            Condition::Gt(v) => compare_any(&values, v, |o| o.is_gt()),
            Condition::Gte(v) => compare_any(&values, v, |o| o.is_ge()),
            Condition::Regex(re) => {
                values.iter().any(|x| x.as_str().map_or(false, |s| re.is_match(s)))
                    || texts()?.iter().any(|t| re.is_match(t))
            }
            Condition::Text(s) => texts()?.contains(&s.as_str()),
            Condition::TextRegex(re) => texts()?.iter().any(|t| re.is_match(t)),
        };
        Ok(found)
    }
}

/// Surface strings of a layer; a characters layer is one whole string.
fn surface_text<'a>(
    doc: &'a Document,
    schema: &SchemaStore,
    layer: &str,
    data: &'a LayerData,
) -> Result<Vec<&'a str>> {
    match data {
        LayerData::Characters(s) => Ok(vec![s.as_str()]),
        _ => layer::text(doc, schema, layer),
    }
}

fn compare_any(values: &[&DataValue], v: &DataValue, test: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    values
        .iter()
        .any(|x| x.compare(v).map_or(false, &test))
}

fn query_error(msg: String) -> LayerDbError {
    LayerDbError::Query(msg)
}

/// An implicit AND over the entries of a mapping
fn parse_mapping(map: &Map<String, Value>, schema: &SchemaStore) -> Result<Query> {
    let mut parts = Vec::new();
    for (key, value) in map {
        let part = match key.as_str() {
            "$and" => Query::And(parse_list(value, schema)?),
            "$or" => Query::Or(parse_list(value, schema)?),
            "$not" => Query::Not(Box::new(Query::parse(value, schema)?)),
            "$exists" => parse_exists(value, schema)?,
            op if op.starts_with('$') => {
                return Err(query_error(format!("Unknown operator '{op}'")))
            }
            layer => {
                if !schema.contains(layer) {
                    return Err(query_error(format!("Unknown layer '{layer}'")));
                }
                parse_field(layer, value)?
            }
        };
        parts.push(part);
    }
    Ok(simplify_and(parts))
}

/// Operands of `$and`/`$or`: a list of mappings, or a mapping whose entries
/// are taken one by one.
fn parse_list(value: &Value, schema: &SchemaStore) -> Result<Vec<Query>> {
    match value {
        Value::Array(items) => items.iter().map(|q| Query::parse(q, schema)).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let mut single = Map::new();
                single.insert(k.clone(), v.clone());
                parse_mapping(&single, schema)
            })
            .collect(),
        other => Err(query_error(format!(
            "Expected a list or mapping of conditions, got {other}"
        ))),
    }
}

fn parse_exists(value: &Value, schema: &SchemaStore) -> Result<Query> {
    let check = |name: &str| -> Result<Query> {
        if schema.contains(name) {
            Ok(Query::Exists(name.to_string()))
        } else {
            Err(query_error(format!("Unknown layer '{name}'")))
        }
    };
    match value {
        Value::String(name) => check(name),
        Value::Array(names) => names
            .iter()
            .map(|n| match n {
                Value::String(name) => check(name),
                other => Err(query_error(format!("Expected a layer name, got {other}"))),
            })
            .collect::<Result<Vec<_>>>()
            .map(simplify_and),
        other => Err(query_error(format!("$exists expects a layer name, got {other}"))),
    }
}

/// The sub-expression applied to a single layer
fn parse_field(layer: &str, value: &Value) -> Result<Query> {
    let matcher = |cond: Condition| Query::Match {
        layer: layer.to_string(),
        cond,
    };
    match value {
        Value::String(_) | Value::Number(_) => Ok(matcher(Condition::Eq(literal(value)?))),
        Value::Array(_) => Ok(matcher(Condition::In(literal_list(value)?))),
        Value::Object(ops) => {
            let mut parts = Vec::new();
            for (op, operand) in ops {
                let part = match op.as_str() {
                    "$eq" => matcher(Condition::Eq(literal(operand)?)),
                    "$ne" => matcher(Condition::Ne(literal(operand)?)),
                    "$in" => matcher(Condition::In(literal_list(operand)?)),
                    "$nin" => matcher(Condition::Nin(literal_list(operand)?)),
                    "$lt" => matcher(Condition::Lt(literal(operand)?)),
                    "$lte" => matcher(Condition::Lte(literal(operand)?)),
                    "$gt" => matcher(Condition::Gt(literal(operand)?)),
                    "$gte" => matcher(Condition::Gte(literal(operand)?)),
                    "$regex" => matcher(Condition::Regex(full_match(operand)?)),
                    "$text" => matcher(Condition::Text(string_operand(operand)?.to_string())),
                    "$text_regex" => matcher(Condition::TextRegex(full_match(operand)?)),
                    "$text_ne" => Query::Not(Box::new(matcher(Condition::Text(
                        string_operand(operand)?.to_string(),
                    )))),
                    "$not" => Query::Not(Box::new(parse_field(layer, operand)?)),
                    "$exists" => match operand {
                        Value::Bool(true) => Query::Exists(layer.to_string()),
                        Value::Bool(false) => Query::Not(Box::new(Query::Exists(layer.to_string()))),
                        other => {
                            return Err(query_error(format!("$exists expects a boolean, got {other}")))
                        }
                    },
                    other => return Err(query_error(format!("Unknown operator '{other}'"))),
                };
                parts.push(part);
            }
            if parts.is_empty() {
                return Err(query_error(format!("Empty condition for layer '{layer}'")));
            }
            Ok(simplify_and(parts))
        }
        other => Err(query_error(format!(
            "Invalid condition for layer '{layer}': {other}"
        ))),
    }
}

fn literal(value: &Value) -> Result<DataValue> {
    DataValue::from_json(value).map_err(query_error)
}

fn literal_list(value: &Value) -> Result<Vec<DataValue>> {
    match value {
        Value::Array(items) => items.iter().map(literal).collect(),
        other => Err(query_error(format!("Expected a list of values, got {other}"))),
    }
}

fn string_operand(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| query_error(format!("Expected a string, got {value}")))
}

/// Compile a pattern that must match the whole candidate
fn full_match(value: &Value) -> Result<Regex> {
    let pattern = string_operand(value)?;
    let invalid = |e: regex::Error| query_error(format!("Invalid regex '{pattern}': {e}"));
    // Unbalanced groups could otherwise close the anchoring group early
    Regex::new(pattern).map_err(invalid)?;
    Regex::new(&format!("^(?:{pattern})$")).map_err(invalid)
}

fn simplify_and(mut parts: Vec<Query>) -> Query {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Query::And(parts)
    }
}

/// Builds a query in code; every added condition is AND-ed.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    parts: Vec<Query>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Query {
        simplify_and(self.parts)
    }

    fn push(mut self, layer: &str, cond: Condition) -> Self {
        self.parts.push(Query::Match {
            layer: layer.to_string(),
            cond,
        });
        self
    }

    pub fn value(self, layer: &str, value: impl Into<DataValue>) -> Self {
        self.push(layer, Condition::Eq(value.into()))
    }

    pub fn value_not(self, layer: &str, value: impl Into<DataValue>) -> Self {
        self.push(layer, Condition::Ne(value.into()))
    }

    pub fn one_of<I, V>(self, layer: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DataValue>,
    {
        self.push(layer, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn less_than(self, layer: &str, value: impl Into<DataValue>) -> Self {
        self.push(layer, Condition::Lt(value.into()))
    }

    pub fn greater_than(self, layer: &str, value: impl Into<DataValue>) -> Self {
        self.push(layer, Condition::Gt(value.into()))
    }

    pub fn text(self, layer: &str, text: &str) -> Self {
        self.push(layer, Condition::Text(text.to_string()))
    }

    /// Full-match regex over stored values and surface text.
    pub fn regex(self, layer: &str, pattern: &str) -> Result<Self> {
        let re = full_match(&Value::String(pattern.to_string()))?;
        Ok(self.push(layer, Condition::Regex(re)))
    }

    pub fn exists(mut self, layer: &str) -> Self {
        self.parts.push(Query::Exists(layer.to_string()));
        self
    }

    pub fn not(mut self, query: Query) -> Self {
        self.parts.push(Query::Not(Box::new(query)));
        self
    }

    pub fn or(mut self, queries: Vec<Query>) -> Self {
        self.parts.push(Query::Or(queries));
        self
    }
}
