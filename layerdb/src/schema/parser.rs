use super::types::LayerDesc;
use super::SchemaStore;
use crate::error::{LayerDbError, Result};
use indexmap::IndexMap;
use std::path::Path;

/// Parse a schema YAML file (a mapping of layer name to declaration) into a SchemaStore
pub fn parse_schema(path: &Path) -> Result<SchemaStore> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaStore
pub fn parse_schema_str(content: &str) -> Result<SchemaStore> {
    let layers: IndexMap<String, LayerDesc> = serde_yaml::from_str(content)
        .map_err(|e| LayerDbError::Schema(format!("Invalid schema: {e}")))?;
    SchemaStore::from_layers(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, LayerType};

    #[test]
    fn test_parse_schema_keeps_declaration_order() {
        let schema = parse_schema_str(
            r#"
text:
    type: characters
words:
    type: span
    base: text
pos:
    type: seq
    base: words
    data: [NOUN, VERB, ADJ, ADV]
lemma:
    type: seq
    base: words
    data: string
"#,
        )
        .unwrap();

        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["text", "words", "pos", "lemma"]);
        assert_eq!(schema.get("pos").unwrap().layer_type(), LayerType::Seq);
        assert_eq!(
            schema.get("pos").unwrap().data(),
            Some(&DataType::Enum(vec![
                "NOUN".into(),
                "VERB".into(),
                "ADJ".into(),
                "ADV".into()
            ]))
        );
        assert_eq!(schema.get("lemma").unwrap().data(), Some(&DataType::String));
    }

    #[test]
    fn test_parse_schema_accepts_capitalised_names() {
        let schema = parse_schema_str("text:\n  type: Characters\nlinks:\n  type: seq\n  base: text\n  data: Link\n").unwrap();
        assert_eq!(schema.get("links").unwrap().data(), Some(&DataType::Link));
    }

    #[test]
    fn test_parse_schema_rejects_missing_base() {
        let err = parse_schema_str("words:\n  type: span\n").unwrap_err();
        assert!(matches!(err, LayerDbError::Schema(_)));
        assert!(err.to_string().contains("must declare a base"));
    }

    #[test]
    fn test_parse_schema_rejects_characters_with_base() {
        let err = parse_schema_str("text:\n  type: characters\n  base: other\n").unwrap_err();
        assert!(err.to_string().contains("cannot declare 'base'"));
    }

    #[test]
    fn test_parse_schema_rejects_unknown_base() {
        let err = parse_schema_str("words:\n  type: span\n  base: text\n").unwrap_err();
        assert!(matches!(err, LayerDbError::Schema(_)));
    }

    #[test]
    fn test_parse_schema_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("schema.yaml");
        std::fs::write(&path, "text:\n  type: characters\n").unwrap();
        let schema = parse_schema(&path).unwrap();
        assert_eq!(schema.len(), 1);
    }
}
