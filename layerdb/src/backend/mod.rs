//! Where a corpus lives between sessions.
//!
//! Every backend loads and flushes the whole corpus at once.

mod sqlite;

pub use sqlite::SqliteBackend;

use crate::codec::{self, Format};
use crate::error::Result;
use crate::store::Corpus;
use std::path::{Path, PathBuf};

/// Storage capability injected into a corpus at construction time.
pub trait StorageBackend: std::fmt::Debug {
    /// Load the stored corpus, or `None` if nothing has been stored yet.
    fn load(&mut self) -> Result<Option<Corpus>>;

    /// Persist the whole corpus.
    fn flush(&mut self, corpus: &Corpus) -> Result<()>;

    /// Whether data survives the process.
    fn is_persistent(&self) -> bool;
}

/// Keeps nothing: the corpus exists only in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl StorageBackend for MemoryBackend {
    fn load(&mut self) -> Result<Option<Corpus>> {
        Ok(None)
    }

    fn flush(&mut self, _corpus: &Corpus) -> Result<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// A single corpus file in any codec format.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    format: Format,
}

impl FileBackend {
    /// Pick the format from the file extension.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = Format::from_path(&path)?;
        if format == Format::Jsonl {
            return Err(crate::error::LayerDbError::Codec(
                "A JSONL file holds no schema and cannot back a corpus".into(),
            ));
        }
        Ok(FileBackend { path, format })
    }

    pub fn with_format(path: impl Into<PathBuf>, format: Format) -> Self {
        FileBackend {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn load(&mut self) -> Result<Option<Corpus>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let corpus = codec::read_path_as(&self.path, self.format)?;
        log::info!(
            "Loaded {} documents from {}",
            corpus.len(),
            self.path.display()
        );
        Ok(Some(corpus))
    }

    /// Write to a temporary file next to the target, then rename it into place.
    fn flush(&mut self, corpus: &Corpus) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        codec::write_to(corpus, self.format, tmp.as_file_mut())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        log::info!(
            "Flushed {} documents to {}",
            corpus.len(),
            self.path.display()
        );
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LayerDesc;
    use tempfile::TempDir;

    fn corpus_with_doc() -> Corpus {
        let mut corpus = Corpus::new();
        corpus.declare_layer("text", LayerDesc::characters()).unwrap();
        corpus.build_doc().layer("text", "This is a document.").add().unwrap();
        corpus
    }

    #[test]
    fn test_memory_backend_loads_nothing() {
        let mut backend = MemoryBackend;
        assert!(backend.load().unwrap().is_none());
        assert!(!backend.is_persistent());
    }

    #[test]
    fn test_file_backend_round_trip_each_format() {
        let tmp = TempDir::new().unwrap();
        for name in ["corpus.json", "corpus.yaml", "corpus.cuac"] {
            let path = tmp.path().join(name);
            let mut backend = FileBackend::new(&path).unwrap();
            assert!(backend.load().unwrap().is_none());

            let corpus = corpus_with_doc();
            backend.flush(&corpus).unwrap();
            let loaded = backend.load().unwrap().unwrap();
            assert_eq!(loaded.list_ids(), vec!["Kjco".to_string()]);
        }
    }

    #[test]
    fn test_file_backend_rejects_unknown_extension() {
        assert!(FileBackend::new("corpus.txt").is_err());
    }

    #[test]
    fn test_open_and_flush_through_corpus() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("corpus.json");
        {
            let mut corpus = Corpus::open(Box::new(FileBackend::new(&path).unwrap())).unwrap();
            corpus.declare_layer("text", LayerDesc::characters()).unwrap();
            corpus.build_doc().layer("text", "Colorless green ideas sleep furiously.").add().unwrap();
            corpus.flush().unwrap();
        }
        let corpus = Corpus::open(Box::new(FileBackend::new(&path).unwrap())).unwrap();
        assert_eq!(corpus.list_ids(), vec!["9wpe".to_string()]);
        assert!(corpus.is_persistent());
    }
}
