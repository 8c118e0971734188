use crate::error::SQLError;

/// A dynamically-typed SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// A row returned from a SQL query: column name to value.
#[derive(Debug, Clone)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a column value by position.
    pub fn at(&self, idx: usize) -> Option<&Value> {
        self.columns.get(idx).map(|(_, v)| v)
    }

    /// Get an integer column value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get the raw bytes of a text or blob column.
    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        match self.get(name) {
            Some(Value::Blob(b)) => Some(b.as_slice()),
            Some(Value::Text(s)) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

/// Extract text from a value. MySQL reports text columns as byte strings,
/// so UTF-8 blobs are accepted too.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => String::from_utf8(b.clone()).ok(),
        _ => None,
    }
}

/// SQLStore is the statement-execution primitive of one live database
/// connection.
///
/// Data-modifying statements issued through `exec`/`exec_batch` are not
/// visible to other connections until `commit` is called. `ddl` runs outside
/// that pending unit of work and is durable on return.
pub trait SQLStore: Send + Sync {
    /// Execute a query and return rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    /// Execute a statement (INSERT/UPDATE/DELETE) and return affected row count.
    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError>;

    /// Execute one statement once per parameter set. Returns the total
    /// affected row count.
    fn exec_batch(&self, sql: &str, batch: &[Vec<Value>]) -> Result<u64, SQLError>;

    /// Execute a schema statement (CREATE/DROP) and commit it immediately.
    fn ddl(&self, sql: &str) -> Result<(), SQLError>;

    /// Commit pending data-modifying statements.
    fn commit(&self) -> Result<(), SQLError>;

    /// Release the connection. Later calls return `SQLError::Closed`.
    /// Closing twice is a no-op.
    fn close(&self);
}
