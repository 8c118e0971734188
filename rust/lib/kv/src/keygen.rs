//! Unique key generation.

use uuid::Uuid;

use crate::error::KVError;
use crate::key::{KEY_LENGTH, zfill};

/// Number of keys generated per cache refill unless the caller asks otherwise.
pub const DEFAULT_UUID_BATCH: usize = 100;

/// Generate `amount` random (v4) UUID keys, zero-padded to `KEY_LENGTH`.
pub fn generate_uuids(amount: usize) -> Vec<String> {
    (0..amount)
        .map(|_| zfill(&Uuid::new_v4().simple().to_string(), KEY_LENGTH))
        .collect()
}

/// Turn a server-generated textual UUID (`8-4-4-4-12` hex groups) into a
/// key: groups in reverse order, joined, zero-padded. Time-based server
/// UUIDs vary fastest in their first group, which this moves to the end.
pub fn server_uuid_to_key(uuid: &str) -> String {
    let joined: String = uuid.split('-').rev().collect();
    zfill(&joined.to_lowercase(), KEY_LENGTH)
}

/// Per-collection cache of pre-generated keys.
#[derive(Debug, Default)]
pub struct UuidCache {
    keys: Vec<String>,
}

impl UuidCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop one key, calling `refill` with the batch size when the cache is
    /// empty.
    pub fn next_with<F>(&mut self, amount: usize, refill: F) -> Result<String, KVError>
    where
        F: FnOnce(usize) -> Result<Vec<String>, KVError>,
    {
        if self.keys.is_empty() {
            self.keys = refill(amount.max(1))?;
        }
        self.keys
            .pop()
            .ok_or_else(|| KVError::Storage("UUID generator returned no keys".into()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn local_uuids_are_fixed_width_and_distinct() {
        let keys = generate_uuids(500);
        assert_eq!(keys.len(), 500);
        assert!(keys.iter().all(|k| k.len() == KEY_LENGTH));
        assert!(keys.iter().all(|k| k.starts_with("00000000")));
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 500);
    }

    #[test]
    fn server_uuid_groups_reversed() {
        let key = server_uuid_to_key("6ccd780c-baba-1026-9564-5b8c656024db");
        assert_eq!(key.len(), KEY_LENGTH);
        assert_eq!(key, "000000005b8c656024db95641026baba6ccd780c");
    }

    #[test]
    fn cache_refills_only_when_empty() {
        let mut cache = UuidCache::new();
        let mut refills = 0;
        let mut seen = HashSet::new();
        for _ in 0..25 {
            let key = cache
                .next_with(10, |n| {
                    refills += 1;
                    Ok(generate_uuids(n))
                })
                .unwrap();
            seen.insert(key);
        }
        assert_eq!(refills, 3);
        assert_eq!(seen.len(), 25);
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn empty_refill_is_an_error() {
        let mut cache = UuidCache::new();
        assert!(cache.next_with(10, |_| Ok(Vec::new())).is_err());
    }
}
