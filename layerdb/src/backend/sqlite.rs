use super::StorageBackend;
use crate::document::Document;
use crate::error::{LayerDbError, Result};
use crate::schema::{LayerDesc, SchemaStore};
use crate::store::Corpus;
use indexmap::IndexMap;
use rusqlite::{params, Connection};
use std::path::Path;

/// Stores a corpus in a SQLite database: one row per layer declaration and one
/// row per document, both keyed by position so insertion order survives.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = SqliteBackend { conn };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = SqliteBackend { conn };
        db.initialize_tables()?;
        Ok(db)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS layers (
                position INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                desc_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                position INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                content_json TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn read_layers(&self) -> Result<IndexMap<String, LayerDesc>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, desc_json FROM layers ORDER BY position")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut layers = IndexMap::new();
        for row in rows {
            let (name, desc_json) = row?;
            let desc: LayerDesc = serde_json::from_str(&desc_json)?;
            layers.insert(name, desc);
        }
        Ok(layers)
    }

    fn read_documents(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, content_json FROM documents ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    fn write_all(&self, corpus: &Corpus) -> Result<()> {
        self.conn.execute_batch("DELETE FROM layers; DELETE FROM documents;")?;
        for (position, (name, desc)) in corpus.schema().iter().enumerate() {
            self.conn.execute(
                "INSERT INTO layers (position, name, desc_json) VALUES (?1, ?2, ?3)",
                params![position as i64, name, serde_json::to_string(desc)?],
            )?;
        }
        for (position, doc) in corpus.docs().enumerate() {
            self.conn.execute(
                "INSERT INTO documents (position, id, content_json) VALUES (?1, ?2, ?3)",
                params![
                    position as i64,
                    doc.id(),
                    serde_json::to_string(&doc.document().to_json())?
                ],
            )?;
        }
        Ok(())
    }
}

impl StorageBackend for SqliteBackend {
    fn load(&mut self) -> Result<Option<Corpus>> {
        let layers = self.read_layers()?;
        let docs = self.read_documents()?;
        if layers.is_empty() && docs.is_empty() {
            return Ok(None);
        }

        let build = || -> Result<Corpus> {
            let mut corpus = Corpus::with_schema(SchemaStore::from_layers(layers)?);
            for (id, content_json) in &docs {
                let value: serde_json::Value = serde_json::from_str(content_json)?;
                let doc = Document::from_json(&value, corpus.schema())?;
                corpus.insert_decoded(id, doc)?;
            }
            Ok(corpus)
        };
        let corpus = build().map_err(LayerDbError::into_codec)?;
        log::info!("Loaded {} documents from SQLite", corpus.len());
        Ok(Some(corpus))
    }

    /// Rewrite both tables inside one transaction.
    fn flush(&mut self, corpus: &Corpus) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match self.write_all(corpus) {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                log::info!("Flushed {} documents to SQLite", corpus.len());
                Ok(())
            }
            Err(e) => {
                self.conn.execute_batch("ROLLBACK")?;
                Err(e)
            }
        }
    }

    fn is_persistent(&self) -> bool {
        self.conn.path().map_or(false, |p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> Corpus {
        let mut corpus = Corpus::new();
        corpus.declare_layer("text", LayerDesc::characters()).unwrap();
        corpus.declare_layer("words", LayerDesc::span("text")).unwrap();
        corpus
            .declare_layer("pos", LayerDesc::seq("words", DataType::String))
            .unwrap();
        corpus
            .build_doc()
            .layer("text", "Dogs bark")
            .layer("words", vec![(0, 4), (5, 9)])
            .layer("pos", vec!["NOUN", "VERB"])
            .add()
            .unwrap();
        corpus
            .build_doc()
            .layer("text", "This is a document.")
            .add()
            .unwrap();
        corpus
    }

    #[test]
    fn test_empty_database_loads_nothing() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        assert!(db.load().unwrap().is_none());
        assert!(!db.is_persistent());
    }

    #[test]
    fn test_flush_and_load_preserves_order() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        let corpus = sample();
        db.flush(&corpus).unwrap();

        let loaded = db.load().unwrap().unwrap();
        assert_eq!(loaded.list_ids(), corpus.list_ids());
        assert_eq!(loaded, corpus);
    }

    #[test]
    fn test_only_corpus_tables_are_created() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        db.flush(&sample()).unwrap();
        let mut stmt = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["documents".to_string(), "layers".to_string()]);
    }

    #[test]
    fn test_flush_replaces_previous_contents() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        let mut corpus = sample();
        db.flush(&corpus).unwrap();

        let first = corpus.list_ids()[0].clone();
        corpus.remove_document(&first).unwrap();
        db.flush(&corpus).unwrap();

        let loaded = db.load().unwrap().unwrap();
        assert_eq!(loaded.list_ids(), vec!["Kjco".to_string()]);
    }

    #[test]
    fn test_corrupt_row_is_codec_error() {
        let mut db = SqliteBackend::open_in_memory().unwrap();
        db.flush(&sample()).unwrap();
        db.conn
            .execute("UPDATE documents SET id = 'zzzz' WHERE position = 0", [])
            .unwrap();
        let err = db.load().unwrap_err();
        assert!(matches!(err, LayerDbError::Codec(_)));
    }

    #[test]
    fn test_file_database_is_persistent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("corpus.db");
        {
            let mut db = SqliteBackend::open(&path).unwrap();
            assert!(db.is_persistent());
            db.flush(&sample()).unwrap();
        }
        let mut db = SqliteBackend::open(&path).unwrap();
        assert_eq!(db.load().unwrap().unwrap().len(), 2);
    }
}
