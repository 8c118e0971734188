use std::marker::PhantomData;
use std::sync::Arc;

use kvlite_sql::{SQLStore, Value as SqlValue};
use serde_json::Value;
use tracing::debug;

use crate::collection::documents::RowDecoder;
use crate::collection::{Collection, Dialect, Document, Documents, ITEMS_PER_REQUEST};
use crate::error::KVError;
use crate::key::{Key, NormalizedKey, ensure_not_reserved};
use crate::keygen::UuidCache;
use crate::serializer::{Serializer, SerializerKind, metadata_serializer};
use crate::uri::{Backend, validate_collection_name};

/// SqlCollection is a Collection stored as one `(k, v)` table. The
/// backend-specific parts (key storage, upsert syntax, row sequence, UUID
/// source) come from `D`.
pub struct SqlCollection<D: Dialect> {
    store: Arc<dyn SQLStore>,
    name: String,
    serializer: SerializerKind,
    uuids: UuidCache,
    _dialect: PhantomData<D>,
}

impl<D: Dialect> SqlCollection<D> {
    /// Bind to an existing table on an open connection.
    pub fn new(
        store: Arc<dyn SQLStore>,
        name: &str,
        serializer: SerializerKind,
    ) -> Result<Self, KVError> {
        validate_collection_name(name)?;
        Ok(Self {
            store,
            name: name.to_string(),
            serializer,
            uuids: UuidCache::new(),
            _dialect: PhantomData,
        })
    }

    fn decoder(&self) -> RowDecoder {
        RowDecoder {
            codec: D::KEYS,
            serializer: self.serializer,
        }
    }

    fn encode_key(&self, key: &NormalizedKey) -> Result<SqlValue, KVError> {
        D::KEYS.encode(key)
    }

    /// Encode one `(k, v)` parameter pair. The reserved key is always
    /// encoded with the metadata serializer.
    fn encode_entry(&self, key: &NormalizedKey, value: &Value) -> Result<Vec<SqlValue>, KVError> {
        let serializer: &dyn Serializer = if key.is_reserved() {
            metadata_serializer()
        } else {
            self.serializer.serializer()
        };
        let blob = serializer.dumps(value)?;
        Ok(vec![self.encode_key(key)?, SqlValue::Blob(blob)])
    }

    fn fetch_one(&self, key: &NormalizedKey) -> Result<Option<Document>, KVError> {
        let sql = format!("SELECT k, v FROM {} WHERE k = ?", self.name);
        let rows = self.store.query(&sql, &[self.encode_key(key)?])?;
        match rows.first() {
            Some(row) => Ok(Some(self.decoder().document(row)?)),
            None => Ok(None),
        }
    }
}

impl<D: Dialect> Collection for SqlCollection<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> Backend {
        D::BACKEND
    }

    fn serializer(&self) -> SerializerKind {
        self.serializer
    }

    fn iter(&self) -> Documents {
        let sql = format!(
            "SELECT {rowid} AS seq, k, v FROM {table} WHERE {rowid} > ? ORDER BY {rowid} LIMIT ?",
            rowid = D::ROWID,
            table = self.name,
        );
        Documents::watermark(Arc::clone(&self.store), sql, ITEMS_PER_REQUEST, self.decoder())
    }

    fn get(&self, key: Key) -> Result<Option<Document>, KVError> {
        self.fetch_one(&key.normalize()?)
    }

    fn get_many(&self, keys: &[Key]) -> Result<Documents, KVError> {
        let mut params = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.normalize()?;
            if key.is_reserved() {
                continue;
            }
            params.push(self.encode_key(&key)?);
        }
        if params.is_empty() {
            return Ok(Documents::empty());
        }

        let placeholders = vec!["?"; params.len()].join(",");
        let sql = format!("SELECT k, v FROM {} WHERE k IN ({})", self.name, placeholders);
        Ok(Documents::once(Arc::clone(&self.store), sql, params, self.decoder()))
    }

    fn page(&self, offset: u64, limit: u64) -> Result<Documents, KVError> {
        if limit == 0 {
            return Err(KVError::InvalidArgument("page limit must be positive".into()));
        }
        let as_param = |n: u64, what: &str| {
            i64::try_from(n)
                .map(SqlValue::Integer)
                .map_err(|_| KVError::InvalidArgument(format!("page {} out of range: {}", what, n)))
        };

        let sql = format!(
            "SELECT k, v FROM {table} WHERE k <> ? ORDER BY {rowid} LIMIT ? OFFSET ?",
            table = self.name,
            rowid = D::ROWID,
        );
        let params = vec![
            self.encode_key(&NormalizedKey::reserved())?,
            as_param(limit, "limit")?,
            as_param(offset, "offset")?,
        ];
        Ok(Documents::once(Arc::clone(&self.store), sql, params, self.decoder()))
    }

    fn put(&mut self, key: Key, value: &Value) -> Result<(), KVError> {
        let key = key.normalize()?;
        ensure_not_reserved(&key, "put")?;
        let params = self.encode_entry(&key, value)?;
        self.store.exec(&D::upsert_sql(&self.name), &params)?;
        Ok(())
    }

    fn put_many(&mut self, entries: &[(Key, Value)]) -> Result<(), KVError> {
        let mut batch = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = key.normalize()?;
            ensure_not_reserved(&key, "put")?;
            batch.push(self.encode_entry(&key, value)?);
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.store.exec_batch(&D::upsert_sql(&self.name), &batch)?;
        debug!("{}: upserted {} entries", self.name, batch.len());
        Ok(())
    }

    fn delete(&mut self, key: Key) -> Result<(), KVError> {
        let key = key.normalize()?;
        ensure_not_reserved(&key, "delete")?;
        let sql = format!("DELETE FROM {} WHERE k = ?", self.name);
        self.store.exec(&sql, &[self.encode_key(&key)?])?;
        Ok(())
    }

    fn count(&self) -> Result<u64, KVError> {
        let sql = format!("SELECT count(*) AS n FROM {} WHERE k <> ?", self.name);
        let rows = self
            .store
            .query(&sql, &[self.encode_key(&NormalizedKey::reserved())?])?;
        rows.first()
            .and_then(|row| row.get_i64("n"))
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| KVError::Storage("count query returned no number".into()))
    }

    fn meta(&self) -> Result<Option<Value>, KVError> {
        Ok(self
            .fetch_one(&NormalizedKey::reserved())?
            .map(|(_, value)| value))
    }

    fn set_meta(&mut self, meta: &Value) -> Result<(), KVError> {
        if !meta.is_object() {
            return Err(KVError::InvalidArgument("metadata must be a JSON object".into()));
        }
        let params = self.encode_entry(&NormalizedKey::reserved(), meta)?;
        self.store.exec(&D::upsert_sql(&self.name), &params)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), KVError> {
        self.store.commit()?;
        debug!("{}: committed", self.name);
        Ok(())
    }

    fn close(&mut self) {
        self.store.close();
    }

    fn get_uuid(&mut self, amount: usize) -> Result<String, KVError> {
        let store = self.store.as_ref();
        self.uuids
            .next_with(amount, |n| D::generate_uuids(store, n))
    }
}
