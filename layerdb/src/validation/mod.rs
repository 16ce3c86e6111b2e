use crate::document::Document;
use crate::error::{LayerDbError, Result};
use crate::layer::{DataValue, Element, LayerData};
use crate::schema::{DataType, LayerDesc, SchemaStore};

/// Result of validating a document
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate every layer of a document against the schema.
/// All problems are collected; nothing stops at the first one.
pub fn validate_document(schema: &SchemaStore, doc: &Document) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (name, data) in doc.layers() {
        match schema.get(name) {
            Some(desc) => validate_layer(doc, name, desc, data, &mut result),
            None => result
                .errors
                .push(format!("Layer '{name}' is not declared in the schema")),
        }
    }

    for key in doc.meta().keys() {
        if !key.starts_with('_') {
            result
                .errors
                .push(format!("Metadata key '{key}' must start with '_'"));
        }
    }

    result
}

/// Validate a document and turn any problems into a single `Validation` error.
pub fn validate_and_prepare(schema: &SchemaStore, doc: &Document) -> Result<()> {
    let result = validate_document(schema, doc);
    if result.is_ok() {
        Ok(())
    } else {
        Err(LayerDbError::Validation(format!(
            "Document validation failed:\n  - {}",
            result.errors.join("\n  - ")
        )))
    }
}

fn validate_layer(
    doc: &Document,
    name: &str,
    desc: &LayerDesc,
    data: &LayerData,
    result: &mut ValidationResult,
) {
    if data.layer_type() != desc.layer_type() {
        result.errors.push(format!(
            "Layer '{name}' is declared as {} but holds {} data",
            desc.layer_type(),
            data.layer_type()
        ));
        return;
    }

    let base = match desc.base() {
        Some(base) => base,
        None => return,
    };
    let base_len = match doc.layer(base) {
        Some(b) => b.len(),
        None => {
            result
                .errors
                .push(format!("Layer '{name}' requires its base layer '{base}'"));
            return;
        }
    };

    match data {
        LayerData::Characters(_) => {}
        LayerData::Span(spans) => {
            let mut previous = 0;
            for (i, span) in spans.iter().enumerate() {
                if span.start > span.end || span.end > base_len {
                    result.errors.push(format!(
                        "Layer '{name}' span {i} [{}, {}) is out of bounds for base '{base}' (length {base_len})",
                        span.start, span.end
                    ));
                }
                if span.start < previous {
                    result.errors.push(format!(
                        "Layer '{name}' span {i} starts before the previous span"
                    ));
                }
                previous = span.start;
                check_value(doc, name, desc, i, span.value.as_ref(), result);
            }
        }
        LayerData::Seq(values) => {
            if values.len() != base_len {
                result.errors.push(format!(
                    "Layer '{name}' has {} values but base '{base}' has {base_len} elements",
                    values.len()
                ));
            }
            for (i, value) in values.iter().enumerate() {
                check_value(doc, name, desc, i, Some(value), result);
            }
        }
        LayerData::Element(elements) | LayerData::Div(elements) => {
            check_indexes(name, base, base_len, elements, result);
            for (i, element) in elements.iter().enumerate() {
                check_value(doc, name, desc, i, element.value.as_ref(), result);
            }
        }
    }
}

fn check_indexes(
    name: &str,
    base: &str,
    base_len: usize,
    elements: &[Element],
    result: &mut ValidationResult,
) {
    let mut previous: Option<usize> = None;
    for element in elements {
        if element.index >= base_len {
            result.errors.push(format!(
                "Layer '{name}' index {} is out of bounds for base '{base}' (length {base_len})",
                element.index
            ));
        }
        if previous.map_or(false, |p| element.index <= p) {
            result.errors.push(format!(
                "Layer '{name}' indexes must be strictly ascending (found {} after {})",
                element.index,
                previous.unwrap_or_default()
            ));
        }
        previous = Some(element.index);
    }
}

fn check_value(
    doc: &Document,
    name: &str,
    desc: &LayerDesc,
    position: usize,
    value: Option<&DataValue>,
    result: &mut ValidationResult,
) {
    let (data, value) = match (desc.data(), value) {
        (None, None) => return,
        (Some(data), Some(value)) => (data, value),
        (None, Some(_)) => {
            result.errors.push(format!(
                "Layer '{name}' declares no data but element {position} has a value"
            ));
            return;
        }
        (Some(_), None) => {
            result
                .errors
                .push(format!("Layer '{name}' element {position} is missing its value"));
            return;
        }
    };

    match (data, value) {
        (DataType::String, DataValue::String(_)) => {}
        (DataType::Enum(allowed), DataValue::String(s)) => {
            if !allowed.contains(s) {
                result.errors.push(format!(
                    "Layer '{name}' value '{s}' is not in enum: {allowed:?}"
                ));
            }
        }
        (DataType::Link, DataValue::Link(_) | DataValue::TypedLink(..)) => {
            check_link(doc, name, desc, value, result);
        }
        (expected, got) => result.errors.push(format!(
            "Layer '{name}' element {position} expected {} data, got '{got}'",
            match expected {
                DataType::String => "string",
                DataType::Enum(_) => "enumerated",
                DataType::Link => "link",
            }
        )),
    }
}

fn check_link(
    doc: &Document,
    name: &str,
    desc: &LayerDesc,
    value: &DataValue,
    result: &mut ValidationResult,
) {
    match (desc.link_types(), value) {
        (Some(types), DataValue::TypedLink(_, t)) => {
            if !types.contains(t) {
                result.errors.push(format!(
                    "Layer '{name}' link type '{t}' is not in link_types: {types:?}"
                ));
            }
        }
        (Some(_), DataValue::Link(_)) => result
            .errors
            .push(format!("Layer '{name}' links must carry a link type")),
        (None, DataValue::TypedLink(..)) => result.errors.push(format!(
            "Layer '{name}' declares no link_types but has a typed link"
        )),
        _ => {}
    }

    let (Some(target), Some(index)) = (desc.link_target(), value.link()) else {
        return;
    };
    match doc.layer(target) {
        Some(t) if (index as usize) < t.len() => {}
        Some(t) => result.errors.push(format!(
            "Layer '{name}' link {index} is out of bounds for target '{target}' (length {})",
            t.len()
        )),
        None => result
            .errors
            .push(format!("Layer '{name}' links into missing layer '{target}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LayerDesc;

    fn schema() -> SchemaStore {
        let mut schema = SchemaStore::new();
        schema.declare_layer("text", LayerDesc::characters()).unwrap();
        schema.declare_layer("words", LayerDesc::span("text")).unwrap();
        schema
            .declare_layer(
                "pos",
                LayerDesc::seq("words", DataType::Enum(vec!["NOUN".into(), "VERB".into()])),
            )
            .unwrap();
        schema
            .declare_layer("ner", LayerDesc::element("words").with_data(DataType::String))
            .unwrap();
        schema
            .declare_layer(
                "dep",
                LayerDesc::seq("words", DataType::Link).with_link_types(["nsubj", "root"]),
            )
            .unwrap();
        schema
    }

    fn doc() -> Document {
        let mut doc = Document::new();
        doc.insert_layer("text", "Dogs bark");
        doc.insert_layer("words", vec![(0, 4), (5, 9)]);
        doc
    }

    #[test]
    fn test_valid_document() {
        let mut doc = doc();
        doc.insert_layer("pos", vec!["NOUN", "VERB"]);
        doc.insert_layer("ner", vec![(0, "ANIMAL")]);
        doc.insert_layer(
            "dep",
            LayerData::Seq(vec![
                DataValue::TypedLink(1, "nsubj".into()),
                DataValue::TypedLink(1, "root".into()),
            ]),
        );
        let result = validate_document(&schema(), &doc);
        assert!(result.is_ok(), "{:?}", result.errors);
    }

    #[test]
    fn test_span_out_of_bounds() {
        let mut doc = doc();
        doc.insert_layer("words", vec![(0, 4), (5, 20)]);
        let result = validate_document(&schema(), &doc);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("out of bounds"));
    }

    #[test]
    fn test_spans_must_not_go_backwards() {
        let mut doc = doc();
        doc.insert_layer("words", vec![(5, 9), (0, 4)]);
        assert!(!validate_document(&schema(), &doc).is_ok());
    }

    #[test]
    fn test_seq_cardinality() {
        let mut doc = doc();
        doc.insert_layer("pos", vec!["NOUN"]);
        let err = validate_and_prepare(&schema(), &doc).unwrap_err();
        assert!(err.to_string().contains("has 1 values but base 'words' has 2 elements"));
    }

    #[test]
    fn test_enum_membership() {
        let mut doc = doc();
        doc.insert_layer("pos", vec!["NOUN", "ADV"]);
        let result = validate_document(&schema(), &doc);
        assert!(result.errors[0].contains("'ADV' is not in enum"));
    }

    #[test]
    fn test_element_indexes_ascending_and_in_bounds() {
        let mut doc = doc();
        doc.insert_layer("ner", vec![(1, "A"), (1, "B"), (7, "C")]);
        let result = validate_document(&schema(), &doc);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_missing_base_layer() {
        let mut doc = Document::new();
        doc.insert_layer("words", vec![(0, 1)]);
        let result = validate_document(&schema(), &doc);
        assert!(result.errors[0].contains("requires its base layer 'text'"));
    }

    #[test]
    fn test_wrong_layer_kind() {
        let mut doc = doc();
        doc.insert_layer("pos", vec![(0, 1)]);
        let result = validate_document(&schema(), &doc);
        assert!(result.errors[0].contains("declared as seq but holds span"));
    }

    #[test]
    fn test_link_checks() {
        let mut doc = doc();
        doc.insert_layer(
            "dep",
            LayerData::Seq(vec![DataValue::Link(1), DataValue::TypedLink(5, "obj".into())]),
        );
        let result = validate_document(&schema(), &doc);
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
    }

    #[test]
    fn test_undeclared_layer() {
        let mut doc = doc();
        doc.insert_layer("lemma", vec!["dog", "bark"]);
        assert!(validate_and_prepare(&schema(), &doc).is_err());
    }
}
