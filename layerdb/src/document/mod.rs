// Documents: layer contents plus free-form `_` metadata

use crate::error::{LayerDbError, Result};
use crate::layer::{self, DataValue, LayerData};
use crate::schema::SchemaStore;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// The content of one document: a layer name to layer data mapping plus
/// document-level metadata whose keys start with `_`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    layers: IndexMap<String, LayerData>,
    meta: IndexMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, name: &str) -> Option<&LayerData> {
        self.layers.get(name)
    }

    pub fn layers(&self) -> impl Iterator<Item = (&str, &LayerData)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Insert or replace a layer without any validation.
    pub fn insert_layer(&mut self, name: impl Into<String>, data: impl Into<LayerData>) {
        self.layers.insert(name.into(), data.into());
    }

    pub fn remove_layer(&mut self, name: &str) -> Option<LayerData> {
        self.layers.shift_remove(name)
    }

    pub fn meta(&self) -> &IndexMap<String, Value> {
        &self.meta
    }

    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Set a metadata entry. Keys must start with `_`.
    pub fn insert_meta(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if !key.starts_with('_') {
            return Err(LayerDbError::Validation(format!(
                "Metadata key '{key}' must start with '_'"
            )));
        }
        self.meta.insert(key, value);
        Ok(())
    }

    /// Reorder layers to follow schema declaration order; undeclared layers keep
    /// their relative order at the end.
    pub(crate) fn normalize(&mut self, schema: &SchemaStore) {
        let rank = |name: &str| schema.position(name).unwrap_or(usize::MAX);
        self.layers.sort_by(|a, _, b, _| rank(a.as_str()).cmp(&rank(b.as_str())));
    }

    /// Parse the JSON object form of a document: layer names map to layer
    /// contents, `_`-prefixed keys are metadata.
    pub fn from_json(value: &Value, schema: &SchemaStore) -> Result<Document> {
        let object = value.as_object().ok_or_else(|| {
            LayerDbError::Validation(format!("Document must be an object, got {value}"))
        })?;
        let mut doc = Document::new();
        for (key, item) in object {
            if key.starts_with('_') {
                doc.meta.insert(key.clone(), item.clone());
                continue;
            }
            let desc = schema.get(key).ok_or_else(|| {
                LayerDbError::Validation(format!("Layer '{key}' is not declared in the schema"))
            })?;
            doc.layers.insert(key.clone(), LayerData::from_json(item, desc)?);
        }
        Ok(doc)
    }

    /// JSON object form: layers in their stored order, then metadata.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (name, data) in &self.layers {
            object.insert(name.clone(), data.to_json());
        }
        for (key, value) in &self.meta {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// Read-only view of a stored document, bound to the corpus schema.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRef<'a> {
    id: &'a str,
    doc: &'a Document,
    schema: &'a SchemaStore,
}

impl<'a> DocumentRef<'a> {
    pub(crate) fn new(id: &'a str, doc: &'a Document, schema: &'a SchemaStore) -> Self {
        DocumentRef { id, doc, schema }
    }

    pub fn id(&self) -> &'a str {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn layer(&self, name: &str) -> Option<&'a LayerData> {
        self.doc.layer(name)
    }

    pub fn get_meta(&self, key: &str) -> Option<&'a Value> {
        self.doc.get_meta(key)
    }

    /// Surface text of each element of a layer
    pub fn text(&self, layer: &str) -> Result<Vec<&'a str>> {
        layer::text(self.doc, self.schema, layer)
    }

    /// Ranges of each element of `layer` in the index space of `target`
    pub fn indexes(&self, layer: &str, target: &str) -> Result<Vec<(usize, usize)>> {
        layer::indexes(self.doc, self.schema, layer, target)
    }

    pub fn values(&self, layer: &str) -> Result<Vec<&'a DataValue>> {
        layer::values(self.doc, layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, LayerDesc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> SchemaStore {
        let mut schema = SchemaStore::new();
        schema.declare_layer("text", LayerDesc::characters()).unwrap();
        schema.declare_layer("words", LayerDesc::span("text")).unwrap();
        schema.declare_layer("pos", LayerDesc::seq("words", DataType::String)).unwrap();
        schema
    }

    #[test]
    fn test_from_json_splits_meta() {
        let doc = Document::from_json(
            &json!({"text": "Hi there", "words": [[0, 2], [3, 8]], "_source": "web"}),
            &schema(),
        )
        .unwrap();
        assert_eq!(doc.layer("text"), Some(&LayerData::from("Hi there")));
        assert_eq!(doc.get_meta("_source"), Some(&json!("web")));
        assert_eq!(doc.to_json(), json!({"text": "Hi there", "words": [[0, 2], [3, 8]], "_source": "web"}));
    }

    #[test]
    fn test_from_json_rejects_undeclared_layer() {
        let err = Document::from_json(&json!({"lemma": ["x"]}), &schema()).unwrap_err();
        assert!(err.to_string().contains("not declared"));
    }

    #[test]
    fn test_normalize_follows_schema_order() {
        let mut doc = Document::new();
        doc.insert_layer("pos", vec!["X"]);
        doc.insert_layer("text", "a");
        doc.insert_layer("words", vec![(0, 1)]);
        doc.normalize(&schema());
        assert_eq!(doc.layer_names().collect::<Vec<_>>(), vec!["text", "words", "pos"]);
    }

    #[test]
    fn test_meta_keys_need_underscore() {
        let mut doc = Document::new();
        assert!(doc.insert_meta("source", json!("x")).is_err());
        doc.insert_meta("_source", json!("x")).unwrap();
    }
}
