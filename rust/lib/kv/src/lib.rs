pub mod collection;
pub mod error;
pub mod inspect;
pub mod key;
pub mod keygen;
pub mod manager;
pub mod ops;
pub mod registry;
pub mod serializer;
pub mod uri;

/// Library version, recorded in every collection's metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use collection::{Collection, CollectionMeta, Criteria, Document, Documents, Found};
pub use error::KVError;
pub use inspect::{describe, flatten};
pub use key::{Key, NormalizedKey};
pub use keygen::generate_uuids;
pub use manager::{CollectionManager, MysqlManager, SqliteManager, connect};
pub use ops::{copy, open, remove};
pub use registry::Registry;
pub use serializer::{Serializer, SerializerKind};
pub use uri::{Backend, ParsedUri, parse_uri};
