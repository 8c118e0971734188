use kvlite_sql::SQLStore;

use crate::collection::{Dialect, KeyCodec, SqlCollection};
use crate::error::KVError;
use crate::keygen;
use crate::uri::Backend;

/// Embedded single-file backend. Keys are stored as their padded text and
/// the implicit `rowid` orders scans.
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    const BACKEND: Backend = Backend::Sqlite;
    const ROWID: &'static str = "rowid";
    const KEYS: KeyCodec = KeyCodec::Text;
    const LIST_TABLES: &'static str =
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'";

    fn create_sql(table: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {} (k NOT NULL, v, UNIQUE (k))", table)
    }

    fn upsert_sql(table: &str) -> String {
        format!("INSERT OR REPLACE INTO {} (k, v) VALUES (?, ?)", table)
    }

    fn generate_uuids(_store: &dyn SQLStore, amount: usize) -> Result<Vec<String>, KVError> {
        Ok(keygen::generate_uuids(amount))
    }
}

pub type SqliteCollection = SqlCollection<SqliteDialect>;
