//! JSON form: a `_meta` object holding the schema, then one entry per document.
//!
//! ```json
//! {"_meta": {"text": {"type": "characters"}, "words": {"type": "span", "base": "text"}},
//!  "9wpe": {"text": "Colorless green ideas sleep furiously.", "words": [[0, 9], [10, 15]]}}
//! ```

use crate::document::Document;
use crate::error::{LayerDbError, Result};
use crate::schema::{LayerDesc, SchemaStore};
use crate::store::Corpus;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::io::{Read, Write};

pub const META_KEY: &str = "_meta";
pub const ORDER_KEY: &str = "_order";

/// The whole corpus as a JSON value, schema first, documents in corpus order.
pub fn to_value(corpus: &Corpus) -> Result<Value> {
    let mut object = Map::new();
    object.insert(META_KEY.to_string(), serde_json::to_value(corpus.get_schema())?);
    for doc in corpus.docs() {
        object.insert(doc.id().to_string(), doc.document().to_json());
    }
    Ok(Value::Object(object))
}

pub fn to_string(corpus: &Corpus) -> Result<String> {
    Ok(serde_json::to_string(&to_value(corpus)?)?)
}

pub fn to_string_pretty(corpus: &Corpus) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_value(corpus)?)?)
}

pub fn to_writer<W: Write>(corpus: &Corpus, writer: W) -> Result<()> {
    serde_json::to_writer(writer, &to_value(corpus)?)?;
    Ok(())
}

pub fn from_str(content: &str) -> Result<Corpus> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| LayerDbError::Codec(format!("Invalid JSON: {e}")))?;
    from_value(&value)
}

pub fn from_reader<R: Read>(reader: R) -> Result<Corpus> {
    let value: Value = serde_json::from_reader(reader)
        .map_err(|e| LayerDbError::Codec(format!("Invalid JSON: {e}")))?;
    from_value(&value)
}

/// Build a corpus from the JSON object form. Shared with the YAML reader.
pub fn from_value(value: &Value) -> Result<Corpus> {
    decode_object(value).map_err(LayerDbError::into_codec)
}

fn decode_object(value: &Value) -> Result<Corpus> {
    let object = value
        .as_object()
        .ok_or_else(|| LayerDbError::Codec("A corpus must be an object".into()))?;

    let layers: IndexMap<String, LayerDesc> = match object.get(META_KEY) {
        Some(meta) => serde_json::from_value(meta.clone())
            .map_err(|e| LayerDbError::Codec(format!("Invalid {META_KEY}: {e}")))?,
        None => IndexMap::new(),
    };
    let mut corpus = Corpus::with_schema(SchemaStore::from_layers(layers)?);

    // IDs are base64url and may themselves start with '_'
    let ids: Vec<&str> = match object.get(ORDER_KEY) {
        Some(order) => read_order(order, object)?,
        None => document_keys(object).collect(),
    };

    for id in ids {
        let content = object
            .get(id)
            .ok_or_else(|| LayerDbError::Codec(format!("{ORDER_KEY} names missing document '{id}'")))?;
        let doc = Document::from_json(content, corpus.schema())
            .map_err(|e| LayerDbError::Codec(format!("Document '{id}': {e}")))?;
        corpus
            .insert_decoded(id, doc)
            .map_err(|e| LayerDbError::Codec(format!("Document '{id}': {e}")))?;
    }
    Ok(corpus)
}

fn document_keys(object: &Map<String, Value>) -> impl Iterator<Item = &str> {
    object
        .keys()
        .map(String::as_str)
        .filter(|k| *k != META_KEY && *k != ORDER_KEY)
}

/// An explicit document order must name every document exactly once.
fn read_order<'a>(order: &'a Value, object: &Map<String, Value>) -> Result<Vec<&'a str>> {
    let ids = order
        .as_array()
        .ok_or_else(|| LayerDbError::Codec(format!("{ORDER_KEY} must be a list")))?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| LayerDbError::Codec(format!("{ORDER_KEY} entries must be strings")))
        })
        .collect::<Result<Vec<_>>>()?;
    let documents = document_keys(object).count();
    if ids.len() != documents {
        return Err(LayerDbError::Codec(format!(
            "{ORDER_KEY} lists {} documents but the file holds {documents}",
            ids.len()
        )));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Corpus {
        let mut corpus = Corpus::new();
        corpus.declare_layer("text", LayerDesc::characters()).unwrap();
        corpus.declare_layer("words", LayerDesc::span("text")).unwrap();
        corpus
            .declare_layer("pos", LayerDesc::seq("words", DataType::String))
            .unwrap();
        corpus
            .build_doc()
            .layer("text", "Colorless green ideas sleep furiously.")
            .layer("words", vec![(0, 9), (10, 15), (16, 21), (22, 27), (28, 37)])
            .layer("pos", vec!["ADJ", "ADJ", "NOUN", "VERB", "ADV"])
            .add()
            .unwrap();
        corpus.build_doc().layer("text", "This is a document.").add().unwrap();
        corpus
    }

    #[test]
    fn test_meta_first_then_documents() {
        let corpus = sample();
        let text = to_string(&corpus).unwrap();
        assert!(text.starts_with(
            r#"{"_meta":{"text":{"type":"characters"},"words":{"type":"span","base":"text"},"pos":{"type":"seq","base":"words","data":"string"}}"#
        ));
        assert!(text.ends_with(r#""Kjco":{"text":"This is a document."}}"#));
    }

    #[test]
    fn test_round_trip_is_stable() {
        let corpus = sample();
        let text = to_string_pretty(&corpus).unwrap();
        let decoded = from_str(&text).unwrap();
        assert_eq!(decoded, corpus);
        assert_eq!(to_string_pretty(&decoded).unwrap(), text);
    }

    #[test]
    fn test_meta_may_come_last() {
        let value = json!({
            "Kjco": {"text": "This is a document."},
            "_meta": {"text": {"type": "characters"}}
        });
        let corpus = from_value(&value).unwrap();
        assert_eq!(corpus.list_ids(), vec!["Kjco".to_string()]);
    }

    #[test]
    fn test_explicit_order() {
        let value = json!({
            "_meta": {"text": {"type": "characters"}},
            "_order": ["Kjco", "9wpe"],
            "9wpe": {"text": "Colorless green ideas sleep furiously."},
            "Kjco": {"text": "This is a document."}
        });
        let corpus = from_value(&value).unwrap();
        assert_eq!(corpus.list_ids(), vec!["Kjco".to_string(), "9wpe".to_string()]);

        let missing = json!({
            "_meta": {"text": {"type": "characters"}},
            "_order": ["Kjco"],
            "9wpe": {"text": "Colorless green ideas sleep furiously."},
            "Kjco": {"text": "This is a document."}
        });
        assert!(from_value(&missing).is_err());
    }

    #[test]
    fn test_document_meta_round_trips() {
        let mut corpus = sample();
        let id = corpus.list_ids()[1].clone();
        corpus.set_meta(&id, "_source", json!({"url": "x"})).unwrap();
        let decoded = from_str(&to_string(&corpus).unwrap()).unwrap();
        assert_eq!(decoded, corpus);
    }

    #[test]
    fn test_id_starting_with_underscore_round_trips() {
        let mut corpus = Corpus::new();
        corpus.declare_layer("text", LayerDesc::characters()).unwrap();
        let id = corpus.add_json(&json!({"text": "doc 112"})).unwrap();
        assert_eq!(id, "_IOi");

        let text = to_string(&corpus).unwrap();
        assert_eq!(text, r#"{"_meta":{"text":{"type":"characters"}},"_IOi":{"text":"doc 112"}}"#);
        let decoded = from_str(&text).unwrap();
        assert_eq!(decoded.list_ids(), vec!["_IOi".to_string()]);
        assert_eq!(decoded, corpus);
    }

    #[test]
    fn test_bad_input_is_codec_error() {
        for bad in [
            "not json",
            r#"[1, 2]"#,
            r#"{"_meta": {"words": {"type": "span", "base": "text"}}}"#,
            r#"{"_meta": {"text": {"type": "characters"}}, "XXXX": {"text": "This is a document."}}"#,
            r#"{"_meta": {"text": {"type": "characters"}}, "Kjco": {"text": 5}}"#,
            r#"{"_meta": {"text": {"type": "characters"}}, "_junk": 1}"#,
        ] {
            let err = from_str(bad).unwrap_err();
            assert!(matches!(err, LayerDbError::Codec(_)), "{bad}: {err}");
        }
    }
}
