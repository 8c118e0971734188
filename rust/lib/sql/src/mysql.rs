use std::sync::Mutex;

use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params};
use tracing::debug;

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, Value};

/// Connection settings for a MySQL server.
#[derive(Debug, Clone)]
pub struct MysqlOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// MysqlStore is a SQLStore implementation backed by the `mysql` driver.
///
/// The session runs with `autocommit=0`, so data-modifying statements stay
/// pending until `commit`.
pub struct MysqlStore {
    conn: Mutex<Option<Conn>>,
}

impl MysqlStore {
    /// Connect to a MySQL server. Fails immediately if the server is
    /// unreachable or rejects the credentials.
    pub fn connect(options: &MysqlOptions) -> Result<Self, SQLError> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(options.host.clone()))
            .tcp_port(options.port)
            .user(Some(options.user.clone()))
            .pass(Some(options.password.clone()))
            .db_name(Some(options.database.clone()));

        let mut conn = Conn::new(opts).map_err(|e| SQLError::Connection(e.to_string()))?;
        conn.query_drop("SET autocommit=0")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        debug!(
            "MysqlStore: connected to {}:{}/{}",
            options.host, options.port, options.database
        );
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Conn) -> Result<T, SQLError>,
    ) -> Result<T, SQLError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        let conn = guard.as_mut().ok_or(SQLError::Closed)?;
        f(conn)
    }
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(params.iter().map(to_mysql_value).collect())
}

fn to_mysql_value(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Integer(i) => mysql::Value::Int(*i),
        Value::Real(f) => mysql::Value::Double(*f),
        Value::Text(s) => mysql::Value::Bytes(s.as_bytes().to_vec()),
        Value::Blob(b) => mysql::Value::Bytes(b.clone()),
    }
}

/// MySQL reports both text and binary columns as byte strings; they come
/// back as `Value::Blob`.
fn from_mysql_value(value: &mysql::Value) -> Value {
    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Bytes(b) => Value::Blob(b.clone()),
        mysql::Value::Int(i) => Value::Integer(*i),
        mysql::Value::UInt(u) => match i64::try_from(*u) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Real(*u as f64),
        },
        mysql::Value::Float(f) => Value::Real(f64::from(*f)),
        mysql::Value::Double(f) => Value::Real(*f),
        other => Value::Text(other.as_sql(true)),
    }
}

fn convert_row(row: &mysql::Row) -> Row {
    let columns = row
        .columns_ref()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row
                .as_ref(i)
                .map(from_mysql_value)
                .unwrap_or(Value::Null);
            (column.name_str().into_owned(), value)
        })
        .collect();
    Row { columns }
}

impl SQLStore for MysqlStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        self.with_conn(|conn| {
            // Parameterless statements go over the text protocol; some of
            // them (SHOW ...) cannot be prepared.
            let rows: Vec<mysql::Row> = if params.is_empty() {
                conn.query::<mysql::Row, _>(sql)
            } else {
                conn.exec::<mysql::Row, _, _>(sql, to_params(params))
            }
            .map_err(|e| SQLError::Query(e.to_string()))?;

            Ok(rows.iter().map(convert_row).collect())
        })
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        self.with_conn(|conn| {
            conn.exec_drop(sql, to_params(params))
                .map_err(|e| SQLError::Execution(e.to_string()))?;
            Ok(conn.affected_rows())
        })
    }

    fn exec_batch(&self, sql: &str, batch: &[Vec<Value>]) -> Result<u64, SQLError> {
        self.with_conn(|conn| {
            let stmt = conn
                .prep(sql)
                .map_err(|e| SQLError::Execution(e.to_string()))?;

            let mut affected = 0u64;
            for params in batch {
                conn.exec_drop(&stmt, to_params(params))
                    .map_err(|e| SQLError::Execution(e.to_string()))?;
                affected += conn.affected_rows();
            }
            Ok(affected)
        })
    }

    fn ddl(&self, sql: &str) -> Result<(), SQLError> {
        self.with_conn(|conn| {
            conn.query_drop(sql)
                .map_err(|e| SQLError::Execution(e.to_string()))?;
            conn.query_drop("COMMIT")
                .map_err(|e| SQLError::Execution(e.to_string()))
        })
    }

    fn commit(&self) -> Result<(), SQLError> {
        self.with_conn(|conn| {
            conn.query_drop("COMMIT")
                .map_err(|e| SQLError::Execution(e.to_string()))
        })
    }

    fn close(&self) {
        let taken = match self.conn.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if taken.is_some() {
            debug!("MysqlStore: connection closed");
        }
    }
}
