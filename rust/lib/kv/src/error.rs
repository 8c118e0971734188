use kvlite_sql::SQLError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KVError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt value at key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<SQLError> for KVError {
    fn from(e: SQLError) -> Self {
        match e {
            SQLError::Connection(_) | SQLError::Closed => KVError::Connection(e.to_string()),
            SQLError::Query(_) | SQLError::Execution(_) => KVError::Storage(e.to_string()),
        }
    }
}
