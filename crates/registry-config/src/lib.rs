//! Typed configuration for the registry storage core: which backend to run
//! against, the key-layout prefix, and presign TTLs.
//!
//! Loading is plain-struct-plus-defaults: a `toml` file supplies the base,
//! environment variables of the form `REGISTRY_<FIELD>` override individual
//! scalar fields, and every field has a code-level default so a config file
//! only needs to mention what it changes.

mod backend;
mod error;

pub use backend::{AzureConfig, GcsConfig, LocalFsConfig, OciConfig, S3Config, StorageBackendConfig};
pub use error::ConfigError;

use registry_core::key_layout::KeyLayoutConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_prefix() -> String {
    String::new()
}

fn default_archive_extension() -> String {
    "tar.gz".to_string()
}

fn default_presign_ttl_secs() -> u64 {
    300
}

fn default_azure_presign_ttl_secs() -> u64 {
    4 * 60 * 60
}

fn default_discovery_timeout_secs() -> u64 {
    10
}

/// Top-level configuration for the storage core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Root prefix every stored key is nested under.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Archive extension for module packages, without the leading dot.
    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,

    /// Which backend, and its backend-specific settings.
    pub backend: StorageBackendConfig,

    /// Default presigned-URL TTL in seconds for cloud backends.
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,

    /// Presigned-URL TTL in seconds specific to Azure user-delegation SAS,
    /// which this codebase's source backends default much longer than the
    /// other cloud TTLs.
    #[serde(default = "default_azure_presign_ttl_secs")]
    pub azure_presign_ttl_secs: u64,

    /// Timeout in seconds for Remote Service Discovery HTTP calls.
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            archive_extension: default_archive_extension(),
            backend: StorageBackendConfig::LocalFs(LocalFsConfig::default()),
            presign_ttl_secs: default_presign_ttl_secs(),
            azure_presign_ttl_secs: default_azure_presign_ttl_secs(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a TOML file, then apply any `REGISTRY_*`
    /// environment variable overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut cfg: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(prefix) = std::env::var("REGISTRY_PREFIX") {
            self.prefix = prefix;
        }
        if let Ok(ext) = std::env::var("REGISTRY_ARCHIVE_EXTENSION") {
            self.archive_extension = ext;
        }
        if let Ok(ttl) = std::env::var("REGISTRY_PRESIGN_TTL_SECS") {
            if let Ok(parsed) = ttl.parse() {
                self.presign_ttl_secs = parsed;
            }
        }
    }

    /// Build the pure [`KeyLayoutConfig`] this configuration implies.
    #[must_use]
    pub fn key_layout(&self) -> KeyLayoutConfig {
        KeyLayoutConfig {
            prefix: self.prefix.clone(),
            archive_extension: self.archive_extension.clone(),
        }
    }

    /// The configured presign TTL as a [`Duration`].
    #[must_use]
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }

    /// The configured discovery timeout as a [`Duration`].
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_use_local_filesystem_backend() {
        let cfg = RegistryConfig::default();
        assert!(matches!(cfg.backend, StorageBackendConfig::LocalFs(_)));
        assert_eq!(cfg.archive_extension, "tar.gz");
        assert_eq!(cfg.presign_ttl_secs, 300);
        assert_eq!(cfg.azure_presign_ttl_secs, 4 * 60 * 60);
    }

    #[test]
    fn load_parses_toml_and_applies_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            prefix = "storagePrefix"

            [backend.local_fs]
            root = "/var/registry"
            "#
        )
        .unwrap();

        let cfg = RegistryConfig::load(file.path()).unwrap();
        assert_eq!(cfg.prefix, "storagePrefix");
        assert_eq!(cfg.archive_extension, "tar.gz");
        match cfg.backend {
            StorageBackendConfig::LocalFs(fs) => assert_eq!(fs.root, "/var/registry"),
            other => panic!("expected local_fs backend, got {other:?}"),
        }
    }

    #[test]
    fn load_missing_file_is_an_io_error() {
        let err = RegistryConfig::load(Path::new("/nonexistent/registry.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn env_override_wins_over_file_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            prefix = "fromFile"

            [backend.local_fs]
            root = "/var/registry"
            "#
        )
        .unwrap();

        // SAFETY: test-only, single-threaded env mutation scoped to this test.
        unsafe {
            std::env::set_var("REGISTRY_PREFIX", "fromEnv");
        }
        let cfg = RegistryConfig::load(file.path()).unwrap();
        unsafe {
            std::env::remove_var("REGISTRY_PREFIX");
        }
        assert_eq!(cfg.prefix, "fromEnv");
    }
}
