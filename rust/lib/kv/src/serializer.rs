use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::KVError;

/// Serializer converts a document value to and from a storage blob.
pub trait Serializer: Send + Sync {
    /// Registry name, recorded in the collection metadata.
    fn name(&self) -> &'static str;

    fn dumps(&self, value: &Value) -> Result<Vec<u8>, KVError>;

    fn loads(&self, data: &[u8]) -> Result<Value, KVError>;
}

/// Compact binary object encoding (CBOR). The default, and the fixed
/// encoding of the metadata record.
pub struct CborSerializer;

impl Serializer for CborSerializer {
    fn name(&self) -> &'static str {
        SerializerKind::Cbor.as_str()
    }

    fn dumps(&self, value: &Value) -> Result<Vec<u8>, KVError> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| KVError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// The blob must hold exactly one CBOR item.
    fn loads(&self, data: &[u8]) -> Result<Value, KVError> {
        let mut rest = data;
        let value: Value = ciborium::from_reader(&mut rest)
            .map_err(|e| KVError::Serialization(e.to_string()))?;
        if !rest.is_empty() {
            return Err(KVError::Serialization(format!(
                "{} trailing bytes after CBOR value",
                rest.len()
            )));
        }
        Ok(value)
    }
}

/// JSON text compressed with zstd.
pub struct CompressedJsonSerializer;

const ZSTD_LEVEL: i32 = 3;

impl Serializer for CompressedJsonSerializer {
    fn name(&self) -> &'static str {
        SerializerKind::CompressedJson.as_str()
    }

    fn dumps(&self, value: &Value) -> Result<Vec<u8>, KVError> {
        let json = serde_json::to_vec(value).map_err(|e| KVError::Serialization(e.to_string()))?;
        zstd::encode_all(json.as_slice(), ZSTD_LEVEL)
            .map_err(|e| KVError::Serialization(e.to_string()))
    }

    fn loads(&self, data: &[u8]) -> Result<Value, KVError> {
        let json = zstd::decode_all(data).map_err(|e| KVError::Serialization(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| KVError::Serialization(e.to_string()))
    }
}

/// Registry of serializers, keyed by the name stored in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializerKind {
    #[default]
    Cbor,
    CompressedJson,
}

static CBOR: CborSerializer = CborSerializer;
static COMPRESSED_JSON: CompressedJsonSerializer = CompressedJsonSerializer;

impl SerializerKind {
    pub const ALL: [SerializerKind; 2] = [SerializerKind::Cbor, SerializerKind::CompressedJson];

    pub fn as_str(&self) -> &'static str {
        match self {
            SerializerKind::Cbor => "cbor",
            SerializerKind::CompressedJson => "compressed_json",
        }
    }

    pub fn serializer(&self) -> &'static dyn Serializer {
        match self {
            SerializerKind::Cbor => &CBOR,
            SerializerKind::CompressedJson => &COMPRESSED_JSON,
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerializerKind {
    type Err = KVError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SerializerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| KVError::Config(format!("unknown serializer: {}", s)))
    }
}

/// Serializer for the reserved metadata record, independent of the
/// collection's configured serializer.
pub fn metadata_serializer() -> &'static dyn Serializer {
    SerializerKind::Cbor.serializer()
}
