use crate::backend::{MemoryBackend, StorageBackend};
use crate::document::{Document, DocumentRef};
use crate::error::{LayerDbError, Result};
use crate::identity::{self, IdConfig};
use crate::layer::LayerData;
use crate::migration::{diff_schemas, SchemaMigration};
use crate::query::Query;
use crate::schema::{LayerDesc, SchemaStore};
use crate::validation;
use indexmap::IndexMap;
use serde::Serialize;

/// The main entry point: a schema plus an ordered mapping of document ID to
/// document, persisted through an injected storage backend.
#[derive(Debug)]
pub struct Corpus {
    schema: SchemaStore,
    docs: IndexMap<String, Document>,
    id_config: IdConfig,
    backend: Box<dyn StorageBackend>,
}

/// Documents that no longer conform to the current schema
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub invalid: IndexMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.invalid.is_empty()
    }
}

impl Default for Corpus {
    fn default() -> Self {
        Corpus::new()
    }
}

impl PartialEq for Corpus {
    /// Structural equality: same schema, same documents in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
            && self.docs.len() == other.docs.len()
            && self
                .docs
                .iter()
                .zip(other.docs.iter())
                .all(|(a, b)| a == b)
    }
}

impl Corpus {
    /// An empty in-memory corpus.
    pub fn new() -> Self {
        Corpus::with_schema(SchemaStore::new())
    }

    pub fn with_schema(schema: SchemaStore) -> Self {
        Corpus {
            schema,
            docs: IndexMap::new(),
            id_config: IdConfig::default(),
            backend: Box::new(MemoryBackend),
        }
    }

    /// Open a corpus from a backend, starting empty if the backend holds nothing.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> Result<Self> {
        let mut corpus = backend.load()?.unwrap_or_default();
        corpus.backend = backend;
        Ok(corpus)
    }

    pub fn with_id_config(mut self, config: IdConfig) -> Self {
        self.id_config = config;
        self
    }

    /// Replace the backend without touching the in-memory contents.
    pub fn set_backend(&mut self, backend: Box<dyn StorageBackend>) {
        self.backend = backend;
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    /// Write the whole corpus to its backend.
    pub fn flush(&mut self) -> Result<()> {
        let mut backend = std::mem::replace(&mut self.backend, Box::new(MemoryBackend));
        let result = backend.flush(self);
        self.backend = backend;
        result
    }

    // ── Schema ───────────────────────────────────────────────────────

    pub fn schema(&self) -> &SchemaStore {
        &self.schema
    }

    pub fn get_schema(&self) -> &IndexMap<String, LayerDesc> {
        self.schema.get_schema()
    }

    pub fn declare_layer(&mut self, name: &str, desc: LayerDesc) -> Result<()> {
        self.schema.declare_layer(name, desc)
    }

    /// Substitute the whole schema. Documents are not revalidated here; use
    /// `validate_all` or the next write to find nonconforming ones.
    pub fn replace_schema(&mut self, layers: IndexMap<String, LayerDesc>) -> Result<Vec<SchemaMigration>> {
        let migrations = diff_schemas(self.schema.get_schema(), &layers);
        self.schema.replace_schema(layers)?;
        for migration in &migrations {
            if migration.is_safe() {
                log::info!("Schema change: {}", migration.describe());
            } else {
                log::warn!("Schema change: {}", migration.describe());
            }
        }
        Ok(migrations)
    }

    // ── Documents ────────────────────────────────────────────────────

    /// Start building a document to add to this corpus.
    pub fn build_doc(&mut self) -> DocumentBuilder<'_> {
        DocumentBuilder {
            corpus: self,
            doc: Document::new(),
            error: None,
        }
    }

    /// Validate and add a document, returning its newly assigned ID.
    pub fn add_document(&mut self, mut doc: Document) -> Result<String> {
        doc.normalize(&self.schema);
        validation::validate_and_prepare(&self.schema, &doc)?;
        let digest = identity::content_digest(&doc);
        let id = self.assign_id(&digest)?;
        log::debug!("Adding document {id}");
        self.docs.insert(id.clone(), doc);
        Ok(id)
    }

    /// Add a document from its JSON object form.
    pub fn add_json(&mut self, value: &serde_json::Value) -> Result<String> {
        let doc = Document::from_json(value, &self.schema)?;
        self.add_document(doc)
    }

    /// Insert a decoded document under its stored key, checking that the key
    /// is a prefix of the content digest.
    pub(crate) fn insert_decoded(&mut self, id: &str, mut doc: Document) -> Result<()> {
        doc.normalize(&self.schema);
        validation::validate_and_prepare(&self.schema, &doc)?;
        let digest = identity::content_digest(&doc);
        if !identity::id_matches(id, &digest) {
            return Err(LayerDbError::Codec(format!(
                "Document key '{id}' does not match its content (expected a prefix of '{digest}')"
            )));
        }
        if self.docs.contains_key(id) {
            return Err(LayerDbError::Codec(format!("Duplicate document key '{id}'")));
        }
        self.docs.insert(id.to_string(), doc);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Document> {
        self.docs
            .get(id)
            .ok_or_else(|| LayerDbError::document_not_found(id))
    }

    /// A handle for reading a document's layers, text and projections.
    pub fn document(&self, id: &str) -> Result<DocumentRef<'_>> {
        let (key, doc) = self
            .docs
            .get_key_value(id)
            .ok_or_else(|| LayerDbError::document_not_found(id))?;
        Ok(DocumentRef::new(key, doc, &self.schema))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Replace one layer; returns the document's (possibly new) ID.
    pub fn set_layer(&mut self, id: &str, name: &str, data: impl Into<LayerData>) -> Result<String> {
        let data = data.into();
        self.rewrite(id, |doc| {
            doc.insert_layer(name, data);
            Ok(())
        })
    }

    /// Remove one layer; returns the document's (possibly new) ID.
    pub fn remove_layer(&mut self, id: &str, name: &str) -> Result<String> {
        self.rewrite(id, |doc| {
            doc.remove_layer(name)
                .map(|_| ())
                .ok_or_else(|| LayerDbError::layer_not_found(name))
        })
    }

    /// Set a `_` metadata entry; returns the document's (possibly new) ID.
    pub fn set_meta(&mut self, id: &str, key: &str, value: serde_json::Value) -> Result<String> {
        self.rewrite(id, |doc| doc.insert_meta(key, value))
    }

    /// Replace the whole content of a document; returns its (possibly new) ID.
    pub fn update_document(&mut self, id: &str, content: Document) -> Result<String> {
        self.rewrite(id, |doc| {
            *doc = content;
            Ok(())
        })
    }

    /// Remove a document. The remaining documents keep their order.
    pub fn remove_document(&mut self, id: &str) -> Result<Document> {
        let doc = self
            .docs
            .shift_remove(id)
            .ok_or_else(|| LayerDbError::document_not_found(id))?;
        log::debug!("Removed document {id}");
        Ok(doc)
    }

    /// Document IDs in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.docs.keys().cloned().collect()
    }

    /// Handles for all documents, in insertion order
    pub fn docs(&self) -> impl Iterator<Item = DocumentRef<'_>> {
        self.docs
            .iter()
            .map(|(id, doc)| DocumentRef::new(id, doc, &self.schema))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Check every document against the current schema.
    pub fn validate_all(&self) -> ValidationReport {
        let mut report = ValidationReport {
            checked: self.docs.len(),
            ..Default::default()
        };
        for (id, doc) in &self.docs {
            let result = validation::validate_document(&self.schema, doc);
            if !result.is_ok() {
                log::warn!(
                    "Document {id} does not conform to the schema: {}",
                    result.errors.join("; ")
                );
                report.invalid.insert(id.clone(), result.errors);
            }
        }
        report
    }

    // ── Search ───────────────────────────────────────────────────────

    /// IDs of matching documents, in corpus order.
    pub fn search(&self, query: &Query) -> Result<Vec<String>> {
        query.check_layers(&self.schema)?;
        let mut ids = Vec::new();
        for (id, doc) in &self.docs {
            if query.matches(doc, &self.schema)? {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    /// Parse a JSON filter expression and search with it.
    pub fn search_json(&self, filter: &serde_json::Value) -> Result<Vec<String>> {
        let query = Query::parse(filter, &self.schema)?;
        self.search(&query)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn assign_id(&self, digest: &str) -> Result<String> {
        identity::assign_id(digest, &self.id_config, |key| {
            self.docs.get(key).map(identity::content_digest)
        })
    }

    /// Apply `change` to a document, revalidate it and re-key it in place.
    /// On any error the document is restored untouched.
    fn rewrite<F>(&mut self, id: &str, change: F) -> Result<String>
    where
        F: FnOnce(&mut Document) -> Result<()>,
    {
        let (index, old_id, original) = self
            .docs
            .shift_remove_full(id)
            .ok_or_else(|| LayerDbError::document_not_found(id))?;

        let mut doc = original.clone();
        let outcome = change(&mut doc).and_then(|()| {
            doc.normalize(&self.schema);
            validation::validate_and_prepare(&self.schema, &doc)?;
            let digest = identity::content_digest(&doc);
            if identity::id_matches(&old_id, &digest) {
                Ok(old_id.clone())
            } else {
                self.assign_id(&digest)
            }
        });

        match outcome {
            Ok(new_id) => {
                if new_id != old_id {
                    log::debug!("Document {old_id} re-keyed as {new_id}");
                }
                self.docs.shift_insert(index, new_id.clone(), doc);
                Ok(new_id)
            }
            Err(e) => {
                self.docs.shift_insert(index, old_id, original);
                Err(e)
            }
        }
    }
}

/// Collects layers and metadata for a new document.
pub struct DocumentBuilder<'a> {
    corpus: &'a mut Corpus,
    doc: Document,
    error: Option<LayerDbError>,
}

impl<'a> DocumentBuilder<'a> {
    pub fn layer(mut self, name: &str, data: impl Into<LayerData>) -> Self {
        self.doc.insert_layer(name, data);
        self
    }

    pub fn meta(mut self, key: &str, value: serde_json::Value) -> Self {
        if let Err(e) = self.doc.insert_meta(key, value) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Validate the document, add it to the corpus and return its ID.
    pub fn add(self) -> Result<String> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.corpus.add_document(self.doc)
    }
}
