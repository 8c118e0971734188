//! Shell configuration.
//!
//! The collection registry lives in `~/.kvlite/registry.json` unless
//! overridden with `--registry`.

use std::path::{Path, PathBuf};

use kvlite_kv::SerializerKind;

/// Number of distinct command lines kept by `history`.
pub const DEFAULT_HISTORY_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Path to the name → URI registry file.
    pub registry_path: PathBuf,

    /// Serializer used when opening collections.
    pub serializer: SerializerKind,

    pub history_size: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            registry_path: Self::default_registry_path(),
            serializer: SerializerKind::default(),
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl ShellConfig {
    /// Default registry path: ~/.kvlite/registry.json.
    pub fn default_registry_path() -> PathBuf {
        dirs_path().join("registry.json")
    }

    /// Build from command-line overrides.
    pub fn from_args(
        registry: Option<&Path>,
        serializer: &str,
        history_size: usize,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            registry_path: registry
                .map(Path::to_path_buf)
                .unwrap_or_else(Self::default_registry_path),
            serializer: serializer.parse()?,
            history_size: history_size.max(1),
        })
    }
}

/// Return the kvlite config directory (~/.kvlite).
fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".kvlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShellConfig::default();
        assert!(config.registry_path.ends_with(".kvlite/registry.json"));
        assert_eq!(config.serializer, SerializerKind::Cbor);
        assert_eq!(config.history_size, DEFAULT_HISTORY_SIZE);
    }

    #[test]
    fn test_overrides() {
        let config =
            ShellConfig::from_args(Some(Path::new("/tmp/r.json")), "compressed_json", 5).unwrap();
        assert_eq!(config.registry_path, PathBuf::from("/tmp/r.json"));
        assert_eq!(config.serializer, SerializerKind::CompressedJson);
        assert_eq!(config.history_size, 5);
    }

    #[test]
    fn test_unknown_serializer() {
        assert!(ShellConfig::from_args(None, "pickle", 20).is_err());
    }
}
