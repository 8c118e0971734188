use kvlite_sql::{SQLStore, value_text};

use crate::collection::{Dialect, KeyCodec, SqlCollection};
use crate::error::KVError;
use crate::keygen::server_uuid_to_key;
use crate::uri::Backend;

/// Networked backend. Keys are stored as 20 raw bytes and an
/// auto-increment `__rowid__` column orders scans.
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    const BACKEND: Backend = Backend::Mysql;
    const ROWID: &'static str = "__rowid__";
    const KEYS: KeyCodec = KeyCodec::Binary;
    const LIST_TABLES: &'static str = "SHOW TABLES";

    fn create_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             __rowid__ INT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
             k BINARY(20) NOT NULL, \
             v MEDIUMBLOB, \
             UNIQUE KEY (k)\
             ) ENGINE=InnoDB DEFAULT CHARSET utf8",
            table
        )
    }

    fn upsert_sql(table: &str) -> String {
        format!(
            "INSERT INTO {} (k, v) VALUES (?, ?) ON DUPLICATE KEY UPDATE v=VALUES(v)",
            table
        )
    }

    /// One round trip: `SELECT UUID(), UUID(), ...`.
    fn generate_uuids(store: &dyn SQLStore, amount: usize) -> Result<Vec<String>, KVError> {
        if amount == 0 {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {}", vec!["UUID()"; amount].join(", "));
        let rows = store.query(&sql, &[])?;
        let row = rows
            .first()
            .ok_or_else(|| KVError::Storage("UUID() query returned no row".into()))?;

        row.columns
            .iter()
            .map(|(_, value)| {
                value_text(value)
                    .map(|uuid| server_uuid_to_key(&uuid))
                    .ok_or_else(|| KVError::Storage(format!("unreadable UUID(): {:?}", value)))
            })
            .collect()
    }
}

pub type MysqlCollection = SqlCollection<MysqlDialect>;
