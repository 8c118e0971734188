//! Collections: named key-value document containers stored as one table.

mod documents;
pub mod mysql;
pub mod sqlite;
mod table;

use kvlite_sql::{SQLStore, Value as SqlValue, value_text};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KVError;
use crate::key::{Key, NormalizedKey};
use crate::serializer::SerializerKind;
use crate::uri::Backend;

pub use documents::Documents;
pub use mysql::{MysqlCollection, MysqlDialect};
pub use sqlite::{SqliteCollection, SqliteDialect};
pub use table::SqlCollection;

/// Rows fetched per round trip by a full scan.
pub const ITEMS_PER_REQUEST: i64 = 100;

/// A normalized key and its decoded value.
pub type Document = (String, Value);

/// The backend-independent collection contract.
///
/// Writes (`put`, `put_many`, `delete`, `set_meta`) are pending until
/// `commit`. The reserved metadata key is never counted, scanned, or
/// deletable; it is reached through `meta`/`set_meta`.
pub trait Collection {
    fn name(&self) -> &str;

    fn backend(&self) -> Backend;

    fn serializer(&self) -> SerializerKind;

    /// All documents, lazily, in row order.
    fn iter(&self) -> Documents;

    /// One document, or `None` if the key is absent.
    fn get(&self, key: Key) -> Result<Option<Document>, KVError>;

    /// The documents stored under `keys`. Absent keys are omitted.
    fn get_many(&self, keys: &[Key]) -> Result<Documents, KVError>;

    /// Up to `limit` documents after skipping `offset`, in row order.
    fn page(&self, offset: u64, limit: u64) -> Result<Documents, KVError>;

    /// Insert or overwrite one document.
    fn put(&mut self, key: Key, value: &Value) -> Result<(), KVError>;

    /// Insert or overwrite many documents. All keys and values are checked
    /// before anything is written.
    fn put_many(&mut self, entries: &[(Key, Value)]) -> Result<(), KVError>;

    /// Remove a document. Removing an absent key is a no-op.
    fn delete(&mut self, key: Key) -> Result<(), KVError>;

    /// Number of documents, metadata excluded.
    fn count(&self) -> Result<u64, KVError>;

    fn meta(&self) -> Result<Option<Value>, KVError>;

    /// Replace the metadata record. Must be a JSON object.
    fn set_meta(&mut self, meta: &Value) -> Result<(), KVError>;

    fn commit(&mut self) -> Result<(), KVError>;

    /// Release the connection. Safe to call more than once.
    fn close(&mut self);

    /// One unique key, refilling a cache of `amount` keys when it runs dry.
    fn get_uuid(&mut self, amount: usize) -> Result<String, KVError>;

    /// Query by criteria, mirroring a single `get(criteria)` entry point.
    fn find(&self, criteria: Criteria) -> Result<Found, KVError> {
        match criteria {
            Criteria::All => Ok(Found::Many(self.iter())),
            Criteria::Key(key) => Ok(Found::One(self.get(key)?)),
            Criteria::Keys(keys) => Ok(Found::Many(self.get_many(&keys)?)),
            Criteria::Page { offset, limit } => Ok(Found::Many(self.page(offset, limit)?)),
        }
    }
}

/// Selection criteria for `Collection::find`.
#[derive(Debug, Clone)]
pub enum Criteria {
    All,
    Key(Key),
    Keys(Vec<Key>),
    Page { offset: u64, limit: u64 },
}

/// Result of `Collection::find`.
pub enum Found {
    One(Option<Document>),
    Many(Documents),
}

/// The record stored at the reserved key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    pub serializer: String,
    #[serde(rename = "kvlite-version")]
    pub version: String,
}

impl CollectionMeta {
    pub fn new(name: &str, serializer: SerializerKind) -> Self {
        Self {
            name: name.to_string(),
            serializer: serializer.as_str().to_string(),
            version: crate::VERSION.to_string(),
        }
    }

    pub fn to_value(&self) -> Result<Value, KVError> {
        serde_json::to_value(self).map_err(|e| KVError::Serialization(e.to_string()))
    }

    /// Read a metadata record. `None` if required fields are missing.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// How a backend stores normalized keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCodec {
    /// The zero-padded text as-is.
    Text,
    /// Raw bytes decoded from the hex key.
    Binary,
}

impl KeyCodec {
    pub fn encode(self, key: &NormalizedKey) -> Result<SqlValue, KVError> {
        match self {
            KeyCodec::Text => Ok(SqlValue::Text(key.as_str().to_string())),
            KeyCodec::Binary => Ok(SqlValue::Blob(key.to_bytes()?)),
        }
    }

    pub fn decode(self, stored: Option<&SqlValue>) -> Result<NormalizedKey, KVError> {
        let decoded = match (self, stored) {
            (KeyCodec::Text, Some(v)) => value_text(v).map(NormalizedKey::from_stored),
            (KeyCodec::Binary, Some(SqlValue::Blob(b))) => Some(NormalizedKey::from_bytes(b)),
            _ => None,
        };
        decoded.ok_or_else(|| KVError::Storage(format!("unreadable key column: {:?}", stored)))
    }
}

/// The backend-specific half of a collection.
pub trait Dialect: Send + Sync + 'static {
    const BACKEND: Backend;

    /// Monotonic row-sequence column used for watermark scans.
    const ROWID: &'static str;

    const KEYS: KeyCodec;

    /// Query whose first column lists the tables of the database.
    const LIST_TABLES: &'static str;

    /// `CREATE TABLE IF NOT EXISTS` with the collection schema.
    fn create_sql(table: &str) -> String;

    /// Upsert statement taking `(k, v)` parameters.
    fn upsert_sql(table: &str) -> String;

    /// Produce `amount` fresh normalized keys.
    fn generate_uuids(store: &dyn SQLStore, amount: usize) -> Result<Vec<String>, KVError>;
}
