pub mod error;
pub mod mysql;
pub mod sqlite;
pub mod traits;

pub use error::SQLError;
pub use crate::mysql::{MysqlOptions, MysqlStore};
pub use sqlite::SqliteStore;
pub use traits::{Row, SQLStore, Value, value_text};
