//! Key normalization.
//!
//! Every caller key is turned into a fixed-width, zero-padded string of
//! `KEY_LENGTH` characters before it reaches a backend. The all-zero key is
//! reserved for collection metadata; this module is the single place that
//! decides whether a key may be written, deleted, or returned by a scan.

use std::fmt;

use crate::error::KVError;

/// Width of a normalized key.
pub const KEY_LENGTH: usize = 40;

/// The reserved metadata key: forty `0` characters.
pub const META_KEY: &str = "0000000000000000000000000000000000000000";

/// A caller-supplied key. Integers are stringified before padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Text(String),
    Int(i64),
}

impl Key {
    /// Normalize to the fixed-width representation. Keys longer than
    /// `KEY_LENGTH` characters are rejected.
    pub fn normalize(&self) -> Result<NormalizedKey, KVError> {
        let raw = match self {
            Key::Text(s) => s.clone(),
            Key::Int(i) => i.to_string(),
        };
        if raw.chars().count() > KEY_LENGTH {
            return Err(KVError::Key(format!(
                "the length of key is more than {} characters: {}",
                KEY_LENGTH, raw
            )));
        }
        Ok(NormalizedKey(zfill(&raw, KEY_LENGTH)))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Text(s.clone())
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<u32> for Key {
    fn from(i: u32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<u64> for Key {
    fn from(i: u64) -> Self {
        Key::Text(i.to_string())
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Text(i.to_string())
    }
}

impl From<NormalizedKey> for Key {
    fn from(k: NormalizedKey) -> Self {
        Key::Text(k.0)
    }
}

/// A key in canonical fixed-width form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// The reserved metadata key.
    pub fn reserved() -> Self {
        NormalizedKey(META_KEY.to_string())
    }

    /// Wrap a key read back from storage, already in normalized form.
    pub(crate) fn from_stored(stored: String) -> Self {
        NormalizedKey(stored)
    }

    pub fn is_reserved(&self) -> bool {
        self.0 == META_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Binary form used by the networked backend: the key read as hex,
    /// `KEY_LENGTH / 2` bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, KVError> {
        hex::decode(&self.0)
            .map_err(|e| KVError::Key(format!("key {} is not hex: {}", self.0, e)))
    }

    /// Inverse of `to_bytes`. Always lowercase hex.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        NormalizedKey(zfill(&hex::encode(bytes), KEY_LENGTH))
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reject the reserved key for caller-facing writes and deletes.
pub fn ensure_not_reserved(key: &NormalizedKey, operation: &str) -> Result<(), KVError> {
    if key.is_reserved() {
        return Err(KVError::Key(format!(
            "metadata key cannot be used with {}",
            operation
        )));
    }
    Ok(())
}

/// Left-pad with `0` to `width` characters, keeping a leading sign in front
/// of the padding.
pub fn zfill(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let pad = "0".repeat(width - len);
    match s.chars().next() {
        Some(sign @ ('+' | '-')) => format!("{}{}{}", sign, pad, &s[1..]),
        _ => format!("{}{}", pad, s),
    }
}
