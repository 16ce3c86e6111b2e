pub mod parser;
pub mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::*;

use crate::error::{LayerDbError, Result};
use indexmap::IndexMap;

/// The layer declarations of a corpus, in declaration order.
///
/// Every layer's `base` chain ends at a `characters` layer and the graph has no cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaStore {
    layers: IndexMap<String, LayerDesc>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from a full mapping, validating the whole graph.
    pub fn from_layers(layers: IndexMap<String, LayerDesc>) -> Result<Self> {
        check_graph(&layers)?;
        Ok(SchemaStore { layers })
    }

    /// Declare a new layer. Its base and link target must already be declared.
    pub fn declare_layer(&mut self, name: &str, desc: LayerDesc) -> Result<()> {
        check_name(name)?;
        if self.layers.contains_key(name) {
            return Err(LayerDbError::Schema(format!(
                "Layer '{name}' is already declared"
            )));
        }
        desc.check()
            .map_err(|e| LayerDbError::Schema(format!("Layer '{name}': {e}")))?;
        if let Some(base) = desc.base() {
            if !self.layers.contains_key(base) {
                return Err(LayerDbError::Schema(format!(
                    "Layer '{name}' has undeclared base '{base}'"
                )));
            }
        }
        if let Some(target) = desc.target() {
            if target != name && !self.layers.contains_key(target) {
                return Err(LayerDbError::Schema(format!(
                    "Layer '{name}' has undeclared target '{target}'"
                )));
            }
        }
        self.layers.insert(name.to_string(), desc);
        Ok(())
    }

    /// Substitute the whole schema. The new graph is validated before anything
    /// is committed; existing documents are not revalidated.
    pub fn replace_schema(&mut self, layers: IndexMap<String, LayerDesc>) -> Result<()> {
        check_graph(&layers)?;
        self.layers = layers;
        Ok(())
    }

    /// The full mapping in declaration order
    pub fn get_schema(&self) -> &IndexMap<String, LayerDesc> {
        &self.layers
    }

    pub fn get(&self, name: &str) -> Option<&LayerDesc> {
        self.layers.get(name)
    }

    /// Like `get`, but an undeclared layer is a `NotFound` error.
    pub fn layer(&self, name: &str) -> Result<&LayerDesc> {
        self.layers
            .get(name)
            .ok_or_else(|| LayerDbError::layer_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerDesc)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Position of a layer in declaration order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.layers.get_index_of(name)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The chain of layers from `name` down to its `characters` root, inclusive.
    pub fn base_chain(&self, name: &str) -> Result<Vec<&str>> {
        let mut chain = Vec::new();
        let mut current = self.layers.get_key_value(name);
        while let Some((layer, desc)) = current {
            if chain.len() > self.layers.len() {
                return Err(LayerDbError::Schema(format!(
                    "Base chain of '{name}' contains a cycle"
                )));
            }
            chain.push(layer.as_str());
            current = match desc.base() {
                Some(base) => Some(
                    self.layers
                        .get_key_value(base)
                        .ok_or_else(|| LayerDbError::layer_not_found(base))?,
                ),
                None => None,
            };
        }
        if chain.is_empty() {
            return Err(LayerDbError::layer_not_found(name));
        }
        Ok(chain)
    }

    /// The `characters` layer at the bottom of `name`'s base chain
    pub fn root_of(&self, name: &str) -> Result<&str> {
        let chain = self.base_chain(name)?;
        chain
            .last()
            .copied()
            .ok_or_else(|| LayerDbError::layer_not_found(name))
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LayerDbError::Schema("Layer name must not be empty".into()));
    }
    if name.starts_with('_') {
        return Err(LayerDbError::Schema(format!(
            "Layer name '{name}' must not start with '_' (reserved for metadata)"
        )));
    }
    Ok(())
}

/// Validate an entire layer graph: names, per-declaration rules, references and cycles.
fn check_graph(layers: &IndexMap<String, LayerDesc>) -> Result<()> {
    for (name, desc) in layers {
        check_name(name)?;
        desc.check()
            .map_err(|e| LayerDbError::Schema(format!("Layer '{name}': {e}")))?;
        if let Some(base) = desc.base() {
            if !layers.contains_key(base) {
                return Err(LayerDbError::Schema(format!(
                    "Layer '{name}' has undeclared base '{base}'"
                )));
            }
        }
        if let Some(target) = desc.target() {
            if !layers.contains_key(target) {
                return Err(LayerDbError::Schema(format!(
                    "Layer '{name}' has undeclared target '{target}'"
                )));
            }
        }
    }

    // Every chain must reach a characters root within `len` steps
    for name in layers.keys() {
        let mut current = name.as_str();
        let mut steps = 0;
        while let Some(base) = layers.get(current).and_then(LayerDesc::base) {
            steps += 1;
            if steps > layers.len() {
                return Err(LayerDbError::Schema(format!(
                    "Cyclic base graph through layer '{name}'"
                )));
            }
            current = base;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> SchemaStore {
        let mut schema = SchemaStore::new();
        schema.declare_layer("text", LayerDesc::characters()).unwrap();
        schema.declare_layer("words", LayerDesc::span("text")).unwrap();
        schema
            .declare_layer("pos", LayerDesc::seq("words", DataType::String))
            .unwrap();
        schema
    }

    #[test]
    fn test_declare_layers_in_order() {
        let schema = sample_schema();
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["text", "words", "pos"]);
        assert_eq!(schema.root_of("pos").unwrap(), "text");
        assert_eq!(schema.base_chain("pos").unwrap(), vec!["pos", "words", "text"]);
    }

    #[test]
    fn test_declare_duplicate_layer_fails() {
        let mut schema = sample_schema();
        let err = schema.declare_layer("words", LayerDesc::span("text")).unwrap_err();
        assert!(matches!(err, LayerDbError::Schema(_)));
    }

    #[test]
    fn test_declare_undeclared_base_fails() {
        let mut schema = SchemaStore::new();
        let err = schema.declare_layer("words", LayerDesc::span("text")).unwrap_err();
        assert!(err.to_string().contains("undeclared base 'text'"));
        assert!(schema.is_empty());
    }

    #[test]
    fn test_declare_self_base_fails() {
        let mut schema = SchemaStore::new();
        assert!(schema.declare_layer("loop", LayerDesc::span("loop")).is_err());
    }

    #[test]
    fn test_declare_reserved_name_fails() {
        let mut schema = SchemaStore::new();
        assert!(schema.declare_layer("_order", LayerDesc::characters()).is_err());
        assert!(schema.declare_layer("", LayerDesc::characters()).is_err());
    }

    #[test]
    fn test_seq_requires_data() {
        let mut schema = sample_schema();
        let desc = LayerDesc::Seq(DerivedDesc::new("words"));
        assert!(schema.declare_layer("tags", desc).is_err());
    }

    #[test]
    fn test_link_target_must_exist() {
        let mut schema = sample_schema();
        let desc = LayerDesc::seq("words", DataType::Link).with_target("nowhere");
        assert!(schema.declare_layer("dep", desc).is_err());
        let desc = LayerDesc::seq("words", DataType::Link).with_target("words");
        schema.declare_layer("dep", desc).unwrap();
    }

    #[test]
    fn test_replace_schema_rejects_cycle_atomically() {
        let mut schema = sample_schema();
        let mut layers = IndexMap::new();
        layers.insert("a".to_string(), LayerDesc::span("b"));
        layers.insert("b".to_string(), LayerDesc::span("a"));
        let err = schema.replace_schema(layers).unwrap_err();
        assert!(err.to_string().contains("Cyclic"));
        // The old schema is untouched
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_replace_schema_rejects_missing_base() {
        let mut schema = sample_schema();
        let mut layers = schema.get_schema().clone();
        layers.shift_remove("words");
        assert!(schema.replace_schema(layers).is_err());
        assert!(schema.contains("words"));
    }

    #[test]
    fn test_replace_schema_substitutes_everything() {
        let mut schema = sample_schema();
        let mut layers = IndexMap::new();
        layers.insert("text".to_string(), LayerDesc::characters());
        layers.insert("sentences".to_string(), LayerDesc::div("text"));
        schema.replace_schema(layers).unwrap();
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["text", "sentences"]);
    }
}
