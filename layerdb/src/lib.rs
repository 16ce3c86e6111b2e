pub mod schema;
pub mod layer;
pub mod identity;
pub mod document;
pub mod validation;
pub mod store;
pub mod query;
pub mod aggregate;
pub mod codec;
pub mod backend;
pub mod migration;
pub mod error;

pub use aggregate::{AnyText, AnyValue, TextCondition, ValueCondition};
pub use backend::{FileBackend, MemoryBackend, SqliteBackend, StorageBackend};
pub use codec::Format;
pub use document::{Document, DocumentRef};
pub use error::{LayerDbError, Result};
pub use identity::{IdConfig, OnConflict};
pub use layer::{DataValue, Element, LayerData, Span};
pub use migration::SchemaMigration;
pub use query::{Query, QueryBuilder};
pub use schema::{DataType, LayerDesc, LayerType, SchemaStore};
pub use store::{Corpus, DocumentBuilder, ValidationReport};
