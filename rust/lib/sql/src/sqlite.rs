use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::types::ValueRef;
use tracing::debug;

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// The connection runs in autocommit mode until the first data-modifying
/// statement, which opens a transaction that stays open until `commit`.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        debug!("SqliteStore: opened {:?}", path);
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Create an in-memory SQLite database. The data lives as long as this
    /// store.
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        debug!("SqliteStore: opened in-memory database");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, SQLError>,
    ) -> Result<T, SQLError> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        let conn = guard.as_ref().ok_or(SQLError::Closed)?;
        f(conn)
    }
}

/// Open a transaction unless one is already pending.
fn begin_if_needed(conn: &Connection) -> Result<(), SQLError> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN")
            .map_err(|e| SQLError::Execution(e.to_string()))?;
    }
    Ok(())
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        self.with_conn(|conn| {
            let bound = bind_params(params);
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                bound.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| SQLError::Query(e.to_string()))?;

            let column_names: Vec<String> = stmt
                .column_names()
                .iter()
                .map(|s| s.to_string())
                .collect();

            let rows = stmt
                .query_map(param_refs.as_slice(), |row| {
                    let mut columns = Vec::with_capacity(column_names.len());
                    for (i, name) in column_names.iter().enumerate() {
                        columns.push((name.clone(), row_value_at(row, i)?));
                    }
                    Ok(Row { columns })
                })
                .map_err(|e| SQLError::Query(e.to_string()))?;

            let mut result = Vec::new();
            for row in rows {
                result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
            }
            Ok(result)
        })
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        self.with_conn(|conn| {
            begin_if_needed(conn)?;

            let bound = bind_params(params);
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                bound.iter().map(|b| b.as_ref()).collect();

            let affected = conn
                .execute(sql, param_refs.as_slice())
                .map_err(|e| SQLError::Execution(e.to_string()))?;

            Ok(affected as u64)
        })
    }

    fn exec_batch(&self, sql: &str, batch: &[Vec<Value>]) -> Result<u64, SQLError> {
        self.with_conn(|conn| {
            begin_if_needed(conn)?;

            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| SQLError::Execution(e.to_string()))?;

            let mut affected = 0u64;
            for params in batch {
                let bound = bind_params(params);
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    bound.iter().map(|b| b.as_ref()).collect();
                affected += stmt
                    .execute(param_refs.as_slice())
                    .map_err(|e| SQLError::Execution(e.to_string()))?
                    as u64;
            }
            Ok(affected)
        })
    }

    fn ddl(&self, sql: &str) -> Result<(), SQLError> {
        self.with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| SQLError::Execution(e.to_string()))?;
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")
                    .map_err(|e| SQLError::Execution(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn commit(&self) -> Result<(), SQLError> {
        self.with_conn(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")
                    .map_err(|e| SQLError::Execution(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn close(&self) {
        let taken = match self.conn.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(conn) = taken {
            if let Err((_, e)) = conn.close() {
                debug!("SqliteStore: close failed: {}", e);
            }
        }
    }
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Result<Value, rusqlite::Error> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .ddl("CREATE TABLE items (k NOT NULL, v, UNIQUE (k))")
            .unwrap();
        store
    }

    #[test]
    fn exec_and_query_roundtrip() {
        let store = store_with_table();
        let affected = store
            .exec(
                "INSERT INTO items (k, v) VALUES (?1, ?2)",
                &[Value::Text("a".into()), Value::Blob(vec![1, 2, 3])],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let rows = store
            .query("SELECT rowid, k, v FROM items WHERE k = ?1", &[Value::Text("a".into())])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("rowid"), Some(1));
        assert_eq!(rows[0].get("k"), Some(&Value::Text("a".into())));
        assert_eq!(rows[0].get_bytes("v"), Some(&[1u8, 2, 3][..]));
        assert_eq!(rows[0].at(1), Some(&Value::Text("a".into())));
    }

    #[test]
    fn writes_are_pending_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.db");

        let writer = SqliteStore::open(&path).unwrap();
        writer
            .ddl("CREATE TABLE items (k NOT NULL, v, UNIQUE (k))")
            .unwrap();
        writer
            .exec(
                "INSERT INTO items (k, v) VALUES (?1, ?2)",
                &[Value::Text("a".into()), Value::Null],
            )
            .unwrap();

        let reader = SqliteStore::open(&path).unwrap();
        let before = reader.query("SELECT k FROM items", &[]).unwrap();
        assert!(before.is_empty());

        writer.commit().unwrap();
        let after = reader.query("SELECT k FROM items", &[]).unwrap();
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn exec_batch_counts_rows() {
        let store = store_with_table();
        let batch = vec![
            vec![Value::Text("a".into()), Value::Integer(1)],
            vec![Value::Text("b".into()), Value::Integer(2)],
            vec![Value::Text("a".into()), Value::Integer(3)],
        ];
        store
            .exec_batch("INSERT OR REPLACE INTO items (k, v) VALUES (?1, ?2)", &batch)
            .unwrap();
        store.commit().unwrap();

        let rows = store.query("SELECT k, v FROM items ORDER BY k", &[]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_i64("v"), Some(3));
    }

    #[test]
    fn ddl_commits_pending_work() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO items (k, v) VALUES (?1, ?2)",
                &[Value::Text("a".into()), Value::Null],
            )
            .unwrap();
        store.ddl("CREATE TABLE other (k NOT NULL, v, UNIQUE (k))").unwrap();
        // Nothing left to commit.
        store.commit().unwrap();
        let rows = store.query("SELECT k FROM items", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let store = store_with_table();
        store.close();
        store.close();
        assert!(matches!(
            store.query("SELECT 1", &[]),
            Err(SQLError::Closed)
        ));
    }
}
