use layerdb::codec::{self, binary, json, yaml};
use layerdb::{
    AnyText, AnyValue, Corpus, DataType, DataValue, FileBackend, LayerData, LayerDbError,
    LayerDesc, QueryBuilder, SqliteBackend,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use tempfile::TempDir;

const SENTENCE: &str = "Colorless green ideas sleep furiously.";

fn setup_test_corpus() -> (Corpus, String) {
    let mut corpus = Corpus::new();
    corpus.declare_layer("text", LayerDesc::characters()).unwrap();
    corpus.declare_layer("words", LayerDesc::span("text")).unwrap();
    corpus
        .declare_layer("pos", LayerDesc::seq("words", DataType::String))
        .unwrap();
    let id = corpus
        .build_doc()
        .layer("text", SENTENCE)
        .layer("words", vec![(0, 9), (10, 15), (16, 21), (22, 27), (28, 37)])
        .layer("pos", vec!["ADJ", "ADJ", "NOUN", "VERB", "ADV"])
        .add()
        .unwrap();
    (corpus, id)
}

#[test]
fn test_colorless_green_ideas() {
    let (corpus, id) = setup_test_corpus();
    assert_eq!(id, "twUQ");

    assert_eq!(corpus.search_json(&json!({"pos": "NOUN"})).unwrap(), vec![id.clone()]);
    assert!(corpus.search_json(&json!({"pos": "DET"})).unwrap().is_empty());

    let counts = corpus.val_freq("pos", AnyValue).unwrap();
    let expected: HashMap<DataValue, u32> = [("ADJ", 2), ("NOUN", 1), ("VERB", 1), ("ADV", 1)]
        .into_iter()
        .map(|(k, n)| (DataValue::from(k), n))
        .collect();
    assert_eq!(counts, expected);

    let words = corpus.text_freq("words", AnyText).unwrap();
    assert_eq!(words.len(), 5);
    assert!(words.values().all(|n| *n == 1));

    assert_eq!(
        yaml::to_string(&corpus).unwrap(),
        "_meta:\n    text:\n        type: characters\n    words:\n        type: span\n        base: text\n    pos:\n        type: seq\n        base: words\n        data: string\ntwUQ:\n    text: Colorless green ideas sleep furiously.\n    words: [[0,9],[10,15],[16,21],[22,27],[28,37]]\n    pos: [\"ADJ\",\"ADJ\",\"NOUN\",\"VERB\",\"ADV\"]\n"
    );
}

#[test]
fn test_text_views_are_projected() {
    let (corpus, id) = setup_test_corpus();
    let doc = corpus.document(&id).unwrap();
    assert_eq!(
        doc.text("words").unwrap(),
        vec!["Colorless", "green", "ideas", "sleep", "furiously"]
    );
    assert_eq!(
        doc.text("pos").unwrap(),
        vec!["Colorless", "green", "ideas", "sleep", "furiously"]
    );
    assert_eq!(doc.indexes("pos", "words").unwrap()[2], (2, 3));
    assert_eq!(doc.indexes("pos", "text").unwrap()[2], (16, 21));
}

#[test]
fn test_projection_composes_along_the_chain() {
    let mut corpus = Corpus::new();
    corpus.declare_layer("text", LayerDesc::characters()).unwrap();
    corpus.declare_layer("words", LayerDesc::span("text")).unwrap();
    corpus.declare_layer("phrases", LayerDesc::span("words")).unwrap();
    corpus
        .declare_layer("heads", LayerDesc::element("phrases").with_data(DataType::String))
        .unwrap();
    let id = corpus
        .build_doc()
        .layer("text", SENTENCE)
        .layer("words", vec![(0, 9), (10, 15), (16, 21), (22, 27), (28, 37)])
        .layer("phrases", vec![(0, 3), (3, 5)])
        .layer("heads", vec![(1, "VP")])
        .add()
        .unwrap();
    let doc = corpus.document(&id).unwrap();

    let heads_to_phrases = doc.indexes("heads", "phrases").unwrap();
    let phrases_to_words = doc.indexes("phrases", "words").unwrap();
    let words_to_text = doc.indexes("words", "text").unwrap();
    let heads_to_text = doc.indexes("heads", "text").unwrap();

    for (i, &(ps, pe)) in heads_to_phrases.iter().enumerate() {
        let (ws, _) = phrases_to_words[ps];
        let (_, we) = phrases_to_words[pe - 1];
        let (cs, _) = words_to_text[ws];
        let (_, ce) = words_to_text[we - 1];
        assert_eq!(heads_to_text[i], (cs, ce));
    }
    assert_eq!(doc.text("heads").unwrap(), vec!["sleep furiously"]);
    assert_eq!(doc.text("phrases").unwrap(), vec!["Colorless green ideas", "sleep furiously"]);
}

#[test]
fn test_equivalent_queries_agree() {
    let (mut corpus, _) = setup_test_corpus();
    corpus
        .build_doc()
        .layer("text", "Dogs bark")
        .layer("words", vec![(0, 4), (5, 9)])
        .layer("pos", vec!["NOUN", "VERB"])
        .add()
        .unwrap();
    corpus.build_doc().layer("text", "Nothing tagged").add().unwrap();

    let literal = corpus.search_json(&json!({"pos": "ADV"})).unwrap();
    let membership = corpus.search_json(&json!({"pos": ["ADV"]})).unwrap();
    let explicit_in = corpus.search_json(&json!({"pos": {"$in": ["ADV"]}})).unwrap();
    let regex = corpus.search_json(&json!({"pos": {"$regex": "AD[V]"}})).unwrap();
    let anded = corpus.search_json(&json!({"$and": {"pos": "ADV"}})).unwrap();
    let built = corpus
        .search(&QueryBuilder::new().value("pos", "ADV").build())
        .unwrap();
    assert_eq!(literal.len(), 1);
    for other in [&membership, &explicit_in, &regex, &anded, &built] {
        assert_eq!(other, &literal);
    }

    // Values and surface text both find the same documents
    let by_value = corpus.search_json(&json!({"pos": "VERB"})).unwrap();
    let by_text = corpus.search_json(&json!({"words": {"$in": ["sleep", "bark"]}})).unwrap();
    assert_eq!(by_value, by_text);
    assert_eq!(by_value.len(), 2);

    let err = corpus.search_json(&json!({"lemma": "dog"})).unwrap_err();
    assert!(matches!(err, LayerDbError::Query(_)));
}

#[test]
fn test_every_format_round_trips() {
    let (mut corpus, id) = setup_test_corpus();
    corpus.set_meta(&id, "_source", json!({"author": "Chomsky", "year": 1957})).unwrap();
    corpus.build_doc().layer("text", "This is a document.").add().unwrap();

    let from_json = json::from_str(&json::to_string_pretty(&corpus).unwrap()).unwrap();
    let from_yaml = yaml::from_str(&yaml::to_string(&corpus).unwrap()).unwrap();
    let from_cuac = binary::decode(&binary::encode(&corpus).unwrap()).unwrap();
    for decoded in [&from_json, &from_yaml, &from_cuac] {
        assert_eq!(decoded, &corpus);
        assert_eq!(decoded.list_ids(), corpus.list_ids());
    }

    let tmp = TempDir::new().unwrap();
    for name in ["c.json", "c.yaml", "c.cuac"] {
        let path = tmp.path().join(name);
        codec::write_path(&corpus, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        codec::write_path(&codec::read_path(&path).unwrap(), &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes, "{name} is not stable");
    }
}

#[test]
fn test_backends_persist_across_sessions() {
    let tmp = TempDir::new().unwrap();
    let (corpus, id) = setup_test_corpus();

    let file_path = tmp.path().join("nested").join("corpus.cuac");
    let mut stored = Corpus::open(Box::new(FileBackend::new(&file_path).unwrap())).unwrap();
    assert!(stored.is_empty());
    assert!(stored.is_persistent());
    stored.replace_schema(corpus.get_schema().clone()).unwrap();
    stored
        .add_document(corpus.get(&id).unwrap().clone())
        .unwrap();
    stored.flush().unwrap();

    let reopened = Corpus::open(Box::new(FileBackend::new(&file_path).unwrap())).unwrap();
    assert_eq!(reopened, corpus);

    let db_path = tmp.path().join("corpus.db");
    let mut in_db = Corpus::open(Box::new(SqliteBackend::open(&db_path).unwrap())).unwrap();
    in_db.replace_schema(corpus.get_schema().clone()).unwrap();
    in_db.add_document(corpus.get(&id).unwrap().clone()).unwrap();
    in_db.flush().unwrap();
    drop(in_db);

    let reopened = Corpus::open(Box::new(SqliteBackend::open(&db_path).unwrap())).unwrap();
    assert_eq!(reopened, corpus);
}

#[test]
fn test_edits_rekey_documents_in_place() {
    let (mut corpus, id) = setup_test_corpus();
    let second = corpus.build_doc().layer("text", "This is a document.").add().unwrap();
    let third = corpus.build_doc().layer("text", "Another one.").add().unwrap();

    let new_id = corpus
        .set_layer(&id, "pos", vec!["ADJ", "ADJ", "NOUN", "VERB", "ADJ"])
        .unwrap();
    assert_ne!(new_id, id);
    assert_eq!(corpus.list_ids(), vec![new_id.clone(), second.clone(), third.clone()]);
    assert!(corpus.search_json(&json!({"pos": "ADV"})).unwrap().is_empty());

    // An invalid edit leaves the document and its key untouched
    let err = corpus.set_layer(&new_id, "pos", vec!["ADJ"]).unwrap_err();
    assert!(matches!(err, LayerDbError::Validation(_)));
    assert!(corpus.contains(&new_id));

    corpus.remove_document(&second).unwrap();
    assert_eq!(corpus.list_ids(), vec![new_id, third]);
}

#[test]
fn test_jsonl_loads_into_declared_schema() {
    let (corpus, _) = setup_test_corpus();
    let mut lines = Vec::new();
    codec::jsonl::to_writer(&corpus, &mut lines).unwrap();

    let mut target = Corpus::new();
    target.replace_schema(corpus.get_schema().clone()).unwrap();
    let ids = codec::jsonl::read_into(&mut target, lines.as_slice()).unwrap();
    assert_eq!(ids, corpus.list_ids());
    assert_eq!(
        target.get(&ids[0]).unwrap().layer("pos"),
        Some(&LayerData::seq(["ADJ", "ADJ", "NOUN", "VERB", "ADV"]))
    );
}
