//! Collection managers: list, create and drop collections on one connection.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use kvlite_sql::{MysqlOptions, MysqlStore, SQLStore, SqliteStore, value_text};
use tracing::debug;

use crate::collection::{Collection, Dialect, MysqlDialect, SqlCollection, SqliteDialect};
use crate::error::KVError;
use crate::serializer::SerializerKind;
use crate::uri::{Backend, ParsedUri, SQLITE_MEMORY, parse_uri, validate_collection_name};

/// CollectionManager owns one backend connection and the collections
/// (tables) it holds. Collections bound from a manager share its connection.
pub trait CollectionManager {
    fn backend(&self) -> Backend;

    fn connection(&self) -> Arc<dyn SQLStore>;

    /// Names of the existing collections. Order is unspecified.
    fn collections(&self) -> Result<Vec<String>, KVError>;

    /// Create a collection if it does not exist. Durable on return.
    fn create(&self, name: &str) -> Result<(), KVError>;

    /// Bind a Collection to an existing table.
    fn bind(&self, name: &str, serializer: SerializerKind) -> Result<Box<dyn Collection>, KVError>;

    /// Drop a collection. `NotFound` if it does not exist.
    fn remove(&self, name: &str) -> Result<(), KVError> {
        validate_collection_name(name)?;
        if !self.collections()?.iter().any(|c| c == name) {
            return Err(KVError::NotFound(format!("no collection {}", name)));
        }
        self.connection().ddl(&format!("DROP TABLE {}", name))?;
        debug!("{}: dropped collection {}", self.backend(), name);
        Ok(())
    }

    /// Release the connection shared with every bound collection.
    fn close(&self) {
        self.connection().close();
    }
}

/// A manager for any table-backed dialect.
pub struct SqlManager<D: Dialect> {
    store: Arc<dyn SQLStore>,
    _dialect: PhantomData<D>,
}

pub type SqliteManager = SqlManager<SqliteDialect>;
pub type MysqlManager = SqlManager<MysqlDialect>;

impl<D: Dialect> SqlManager<D> {
    /// Manage collections on an already-open connection.
    pub fn with_store(store: Arc<dyn SQLStore>) -> Self {
        Self {
            store,
            _dialect: PhantomData,
        }
    }
}

impl SqlManager<SqliteDialect> {
    /// Open the database file named by the URI, or an in-memory database
    /// for `memory`.
    pub fn open(uri: &ParsedUri) -> Result<Self, KVError> {
        let store = if uri.database == SQLITE_MEMORY {
            SqliteStore::open_in_memory()?
        } else {
            SqliteStore::open(Path::new(&uri.database))?
        };
        Ok(Self::with_store(Arc::new(store)))
    }
}

impl SqlManager<MysqlDialect> {
    /// Connect to the server named by the URI.
    pub fn open(uri: &ParsedUri) -> Result<Self, KVError> {
        let missing = |what: &str| KVError::Config(format!("MySQL URI has no {}", what));
        let options = MysqlOptions {
            host: uri.host.clone().ok_or_else(|| missing("host"))?,
            port: uri.port.ok_or_else(|| missing("port"))?,
            user: uri.username.clone().ok_or_else(|| missing("username"))?,
            password: uri.password.clone().ok_or_else(|| missing("password"))?,
            database: uri.database.clone(),
        };
        let store = MysqlStore::connect(&options)?;
        Ok(Self::with_store(Arc::new(store)))
    }
}

impl<D: Dialect> CollectionManager for SqlManager<D> {
    fn backend(&self) -> Backend {
        D::BACKEND
    }

    fn connection(&self) -> Arc<dyn SQLStore> {
        Arc::clone(&self.store)
    }

    fn collections(&self) -> Result<Vec<String>, KVError> {
        let rows = self.store.query(D::LIST_TABLES, &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.at(0).and_then(value_text))
            .collect())
    }

    fn create(&self, name: &str) -> Result<(), KVError> {
        validate_collection_name(name)?;
        self.store.ddl(&D::create_sql(name))?;
        debug!("{}: created collection {}", D::BACKEND, name);
        Ok(())
    }

    fn bind(&self, name: &str, serializer: SerializerKind) -> Result<Box<dyn Collection>, KVError> {
        let collection = SqlCollection::<D>::new(self.connection(), name, serializer)?;
        Ok(Box::new(collection))
    }
}

/// Build a manager for the backend named by the URI. The URI's collection
/// part, if any, is ignored.
pub fn connect(uri: &str) -> Result<Box<dyn CollectionManager>, KVError> {
    connect_parsed(&parse_uri(uri)?)
}

pub fn connect_parsed(uri: &ParsedUri) -> Result<Box<dyn CollectionManager>, KVError> {
    match uri.backend {
        Backend::Sqlite => Ok(Box::new(SqliteManager::open(uri)?)),
        Backend::Mysql => Ok(Box::new(MysqlManager::open(uri)?)),
    }
}
