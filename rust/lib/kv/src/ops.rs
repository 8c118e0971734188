//! URI-level entry points.

use tracing::{debug, warn};

use crate::collection::{Collection, CollectionMeta, ITEMS_PER_REQUEST};
use crate::error::KVError;
use crate::key::Key;
use crate::manager::connect_parsed;
use crate::serializer::SerializerKind;
use crate::uri::parse_uri;

/// Open the collection named by `uri`, creating it if it does not exist.
///
/// A new collection gets its metadata record written and committed. An
/// existing one is bound with `serializer` even if its metadata names a
/// different one.
pub fn open(uri: &str, serializer: SerializerKind) -> Result<Box<dyn Collection>, KVError> {
    let parsed = parse_uri(uri)?;
    let name = parsed.require_collection()?;
    let manager = connect_parsed(&parsed)?;

    if !manager.collections()?.iter().any(|c| c == name) {
        manager.create(name)?;
    }

    let mut collection = manager.bind(name, serializer)?;
    match collection.meta()? {
        None => {
            let meta = CollectionMeta::new(name, serializer);
            collection.set_meta(&meta.to_value()?)?;
            collection.commit()?;
        }
        Some(stored) => {
            if let Some(meta) = CollectionMeta::from_value(&stored) {
                if meta.serializer != serializer.as_str() {
                    warn!(
                        "{}: stored with serializer {}, opened with {}",
                        name, meta.serializer, serializer
                    );
                }
            }
        }
    }
    debug!("opened {} collection {}", manager.backend(), name);
    Ok(collection)
}

/// Drop the collection named by `uri`. Returns false if it did not exist.
pub fn remove(uri: &str) -> Result<bool, KVError> {
    let parsed = parse_uri(uri)?;
    let name = parsed.require_collection()?;
    let manager = connect_parsed(&parsed)?;

    let existed = manager.collections()?.iter().any(|c| c == name);
    if existed {
        manager.remove(name)?;
    }
    manager.close();
    Ok(existed)
}

/// Stream every document of `source` into `target`, then commit `target`.
/// Returns the number of documents copied.
pub fn copy(source: &dyn Collection, target: &mut dyn Collection) -> Result<u64, KVError> {
    let batch_size = ITEMS_PER_REQUEST as usize;
    let mut batch: Vec<(Key, serde_json::Value)> = Vec::with_capacity(batch_size);
    let mut copied = 0u64;

    for document in source.iter() {
        let (key, value) = document?;
        batch.push((Key::Text(key), value));
        if batch.len() == batch_size {
            target.put_many(&batch)?;
            copied += batch.len() as u64;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        target.put_many(&batch)?;
        copied += batch.len() as u64;
    }
    target.commit()?;
    debug!("copied {} documents from {} to {}", copied, source.name(), target.name());
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::manager::connect;

    fn sqlite_uri(tmp: &TempDir, collection: &str) -> String {
        format!(
            "sqlite://{}:{}",
            tmp.path().join("kv.sqlite").display(),
            collection
        )
    }

    #[test]
    fn open_creates_collection_with_meta() {
        let tmp = TempDir::new().unwrap();
        let uri = sqlite_uri(&tmp, "docs");

        let coll = open(&uri, SerializerKind::CompressedJson).unwrap();
        assert_eq!(coll.name(), "docs");
        let meta = CollectionMeta::from_value(&coll.meta().unwrap().unwrap()).unwrap();
        assert_eq!(meta.name, "docs");
        assert_eq!(meta.serializer, "compressed_json");
        assert_eq!(meta.version, crate::VERSION);
        assert_eq!(coll.count().unwrap(), 0);
    }

    #[test]
    fn reopen_keeps_data_and_meta() {
        let tmp = TempDir::new().unwrap();
        let uri = sqlite_uri(&tmp, "docs");
        {
            let mut coll = open(&uri, SerializerKind::Cbor).unwrap();
            coll.put(Key::from("a"), &json!({"x": 1})).unwrap();
            coll.commit().unwrap();
            coll.close();
        }
        let coll = open(&uri, SerializerKind::Cbor).unwrap();
        assert_eq!(coll.count().unwrap(), 1);
        assert_eq!(coll.meta().unwrap().unwrap()["serializer"], "cbor");
    }

    #[test]
    fn reopen_with_other_serializer_keeps_meta() {
        let tmp = TempDir::new().unwrap();
        let uri = sqlite_uri(&tmp, "docs");
        {
            let mut coll = open(&uri, SerializerKind::CompressedJson).unwrap();
            coll.put(Key::from("a"), &json!({"x": 1})).unwrap();
            coll.commit().unwrap();
            coll.close();
        }

        let coll = open(&uri, SerializerKind::Cbor).unwrap();
        assert_eq!(coll.serializer(), SerializerKind::Cbor);
        let meta = coll.meta().unwrap().unwrap();
        assert_eq!(meta["serializer"], "compressed_json");
        assert_eq!(meta["name"], "docs");
        assert_eq!(coll.count().unwrap(), 1);
        assert!(matches!(coll.get(Key::from("a")), Err(KVError::Corrupt { .. })));
    }

    #[test]
    fn open_in_memory() {
        let mut coll = open("sqlite://memory:docs", SerializerKind::Cbor).unwrap();
        coll.put(Key::from(1i64), &json!("one")).unwrap();
        coll.commit().unwrap();
        assert_eq!(coll.count().unwrap(), 1);
    }

    #[test]
    fn open_requires_collection() {
        assert!(matches!(
            open("sqlite://memory", SerializerKind::Cbor),
            Err(KVError::Config(_))
        ));
        assert!(matches!(
            open("redis://memory:docs", SerializerKind::Cbor),
            Err(KVError::Config(_))
        ));
    }

    #[test]
    fn remove_drops_collection() {
        let tmp = TempDir::new().unwrap();
        let uri = sqlite_uri(&tmp, "docs");
        open(&uri, SerializerKind::Cbor).unwrap().close();

        assert!(remove(&uri).unwrap());
        assert!(!remove(&uri).unwrap());

        let db = format!("sqlite://{}", tmp.path().join("kv.sqlite").display());
        assert!(connect(&db).unwrap().collections().unwrap().is_empty());
    }

    #[test]
    fn copy_across_serializers() {
        let tmp = TempDir::new().unwrap();
        let mut source = open(&sqlite_uri(&tmp, "source"), SerializerKind::Cbor).unwrap();
        let entries: Vec<(Key, serde_json::Value)> = (0..250u32)
            .map(|i| (Key::from(i + 1), json!({"i": i})))
            .collect();
        source.put_many(&entries).unwrap();
        source.commit().unwrap();

        let mut target = open("sqlite://memory:target", SerializerKind::CompressedJson).unwrap();
        assert_eq!(copy(&*source, &mut *target).unwrap(), 250);
        assert_eq!(target.count().unwrap(), 250);
        assert_eq!(target.get(Key::from(5u32)).unwrap().unwrap().1, json!({"i": 4}));
        assert_eq!(target.meta().unwrap().unwrap()["name"], "target");
    }
}
