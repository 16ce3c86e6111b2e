use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayerDbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {kind} '{name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("ID conflict: document with identical content already stored as '{id}'")]
    IdConflict { id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Format error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("{0}")]
    Other(String),
}

impl LayerDbError {
    pub(crate) fn document_not_found(id: &str) -> Self {
        LayerDbError::NotFound {
            kind: "document",
            name: id.to_string(),
        }
    }

    pub(crate) fn layer_not_found(name: &str) -> Self {
        LayerDbError::NotFound {
            kind: "layer",
            name: name.to_string(),
        }
    }

    /// Re-tag any error raised while decoding persisted input as a codec error.
    pub(crate) fn into_codec(self) -> Self {
        match self {
            LayerDbError::Codec(_) => self,
            other => LayerDbError::Codec(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LayerDbError>;
