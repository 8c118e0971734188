use std::collections::VecDeque;
use std::sync::Arc;

use kvlite_sql::{Row, SQLStore, Value as SqlValue};
use serde_json::Value;
use tracing::debug;

use crate::collection::{Document, KeyCodec};
use crate::error::KVError;
use crate::key::NormalizedKey;
use crate::serializer::{Serializer, SerializerKind, metadata_serializer};

/// Column aliases every collection query selects.
pub(crate) const SEQ_COLUMN: &str = "seq";
pub(crate) const KEY_COLUMN: &str = "k";
pub(crate) const VALUE_COLUMN: &str = "v";

/// Turns stored rows into documents.
#[derive(Clone, Copy)]
pub(crate) struct RowDecoder {
    pub codec: KeyCodec,
    pub serializer: SerializerKind,
}

impl RowDecoder {
    pub fn key(&self, row: &Row) -> Result<NormalizedKey, KVError> {
        self.codec.decode(row.get(KEY_COLUMN))
    }

    /// Decode the value column. The reserved key always uses the metadata
    /// serializer. Decode failures carry the offending key.
    pub fn value(&self, key: &NormalizedKey, row: &Row) -> Result<Value, KVError> {
        let serializer: &dyn Serializer = if key.is_reserved() {
            metadata_serializer()
        } else {
            self.serializer.serializer()
        };
        let data = row.get_bytes(VALUE_COLUMN).ok_or_else(|| KVError::Corrupt {
            key: key.to_string(),
            reason: "value column is empty".into(),
        })?;
        serializer.loads(data).map_err(|e| KVError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn document(&self, row: &Row) -> Result<Document, KVError> {
        let key = self.key(row)?;
        let value = self.value(&key, row)?;
        Ok((key.into_string(), value))
    }
}

enum Source {
    /// Re-query `WHERE seq > last LIMIT page_size` until a page comes back
    /// empty.
    Watermark {
        store: Arc<dyn SQLStore>,
        sql: String,
        last: i64,
        page_size: i64,
    },
    /// A single query, run on first demand.
    Once {
        store: Arc<dyn SQLStore>,
        sql: String,
        params: Vec<SqlValue>,
    },
    Done,
}

/// Documents is a lazy, forward-only sequence of `(key, value)` pairs.
///
/// Each refill issues one synchronous query. The reserved metadata row is
/// never yielded. A row that fails to decode yields one `Err` and iteration
/// continues with the next row; a failed query ends the sequence after
/// yielding its error.
pub struct Documents {
    source: Source,
    buffer: VecDeque<Row>,
    decoder: Option<RowDecoder>,
}

impl Documents {
    pub(crate) fn watermark(
        store: Arc<dyn SQLStore>,
        sql: String,
        page_size: i64,
        decoder: RowDecoder,
    ) -> Self {
        Self {
            source: Source::Watermark {
                store,
                sql,
                last: 0,
                page_size,
            },
            buffer: VecDeque::new(),
            decoder: Some(decoder),
        }
    }

    pub(crate) fn once(
        store: Arc<dyn SQLStore>,
        sql: String,
        params: Vec<SqlValue>,
        decoder: RowDecoder,
    ) -> Self {
        Self {
            source: Source::Once { store, sql, params },
            buffer: VecDeque::new(),
            decoder: Some(decoder),
        }
    }

    /// A sequence with nothing in it.
    pub fn empty() -> Self {
        Self {
            source: Source::Done,
            buffer: VecDeque::new(),
            decoder: None,
        }
    }

    /// Fetch the next batch of rows into the buffer. Returns false when the
    /// source is exhausted.
    fn fetch(&mut self) -> Result<bool, KVError> {
        match &mut self.source {
            Source::Done => Ok(false),
            Source::Once { store, sql, params } => {
                let rows = store.query(sql.as_str(), params.as_slice())?;
                self.source = Source::Done;
                let fetched = !rows.is_empty();
                self.buffer.extend(rows);
                Ok(fetched)
            }
            Source::Watermark {
                store,
                sql,
                last,
                page_size,
            } => {
                let params = [SqlValue::Integer(*last), SqlValue::Integer(*page_size)];
                let rows = store.query(sql.as_str(), &params)?;
                let Some(tail) = rows.last() else {
                    self.source = Source::Done;
                    return Ok(false);
                };
                let seq = tail.get_i64(SEQ_COLUMN).ok_or_else(|| {
                    KVError::Storage("row sequence column missing from scan".into())
                })?;
                debug!("Documents: fetched {} rows up to seq {}", rows.len(), seq);
                *last = seq;
                self.buffer.extend(rows);
                Ok(true)
            }
        }
    }
}

impl Iterator for Documents {
    type Item = Result<Document, KVError>;

    fn next(&mut self) -> Option<Self::Item> {
        let decoder = self.decoder?;
        loop {
            if let Some(row) = self.buffer.pop_front() {
                let key = match decoder.key(&row) {
                    Ok(key) => key,
                    Err(e) => return Some(Err(e)),
                };
                if key.is_reserved() {
                    continue;
                }
                return Some(
                    decoder
                        .value(&key, &row)
                        .map(|value| (key.into_string(), value)),
                );
            }

            match self.fetch() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.source = Source::Done;
                    return Some(Err(e));
                }
            }
        }
    }
}
