//! Value types for modules, providers, signing keys, and discovery records.
//!
//! These are plain data; the only non-trivial logic here is semver
//! validation and the re-export of [`crate::key_layout::parse_from_archive_name`]
//! through [`Provider::parse_from_archive_name`].

use crate::error::{Error, Result};
use crate::key_layout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Validates that `version` is a well-formed semantic version (core
/// `MAJOR.MINOR.PATCH` plus optional pre-release and build metadata).
pub fn validate_version(version: &str) -> Result<semver::Version> {
    semver::Version::parse(version)
        .map_err(|e| Error::invalid_argument(format!("'{version}' is not a valid semver: {e}")))
}

/// A stored module archive. Identity is `(namespace, name, provider,
/// version)`; immutable once uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Owning namespace.
    pub namespace: String,
    /// Module name.
    pub name: String,
    /// Target provider this module is written for (e.g. "aws").
    pub provider: String,
    /// Semantic version of the stored archive.
    pub version: String,
    /// Short-lived signed download URL, populated by the storage façade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl Module {
    /// Construct a module identity without a download URL.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            provider: provider.into(),
            version: version.into(),
            download_url: None,
        }
    }

    /// Attach a signed download URL.
    #[must_use]
    pub fn with_download_url(mut self, download_url: impl Into<String>) -> Self {
        self.download_url = Some(download_url.into());
        self
    }
}

/// An `(os, arch)` pair identifying one build target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, e.g. "linux".
    pub os: String,
    /// CPU architecture, e.g. "amd64".
    pub arch: String,
}

impl Platform {
    /// Construct a platform pair.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

/// A single platform-specific provider build. `hostname` is empty for
/// internal (first-party) providers and non-empty for mirrored ones.
/// Identity is `(hostname, namespace, name, version, os, arch)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Upstream host this artifact originated from; empty for internal providers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    /// Owning namespace.
    pub namespace: String,
    /// Provider type name, e.g. "random".
    pub name: String,
    /// Semantic version of the release.
    pub version: String,
    /// Operating system of this build.
    pub os: String,
    /// CPU architecture of this build.
    pub arch: String,
    /// Archive filename: `terraform-provider-<name>_<version>_<os>_<arch>.zip`.
    pub filename: String,
    /// Hex SHA-256 digest recorded in `SHA256SUMS` for `filename`.
    pub shasum: String,
    /// Short-lived signed URL for the archive.
    pub download_url: String,
    /// Short-lived signed URL for the `SHA256SUMS` file.
    pub shasums_url: String,
    /// Short-lived signed URL for the detached `SHA256SUMS.sig` signature.
    pub shasums_signature_url: String,
    /// Signing keys covering this release's namespace.
    pub signing_keys: SigningKeys,
}

impl Provider {
    /// Parse a bare archive filename into its `(name, version, os, arch)`
    /// components. See [`key_layout::parse_from_archive_name`] for the
    /// parsing rule.
    pub fn parse_from_archive_name(filename: &str) -> Result<key_layout::ParsedArchiveName> {
        key_layout::parse_from_archive_name(filename)
    }

    /// A fingerprint string suitable as a single-flight or cache key:
    /// `host/ns/name/version/os/arch` with an empty host for internal
    /// providers rendered as `-`.
    #[must_use]
    pub fn fingerprint(
        hostname: &str,
        namespace: &str,
        name: &str,
        version: &str,
        os: &str,
        arch: &str,
    ) -> String {
        let host = if hostname.is_empty() { "-" } else { hostname };
        format!("{host}/{namespace}/{name}/{version}/{os}/{arch}")
    }
}

/// A version rollup obtained by grouping [`Provider`] records by
/// `(namespace, name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderVersion {
    /// Owning namespace.
    pub namespace: String,
    /// Provider type name.
    pub name: String,
    /// Semantic version.
    pub version: String,
    /// Deduplicated set of platforms this version was built for.
    pub platforms: BTreeSet<Platform>,
}

/// One GPG public key entry in a [`SigningKeys`] document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgPublicKey {
    /// Hex key ID.
    pub key_id: String,
    /// ASCII-armored public key material.
    pub ascii_armor: String,
    /// Optional trust signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_signature: Option<String>,
    /// Optional human-readable source description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Optional URL for the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl GpgPublicKey {
    /// True if both required fields are present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.key_id.is_empty() && !self.ascii_armor.is_empty()
    }
}

/// A `signing-keys.json` document: an ordered, non-empty sequence of
/// [`GpgPublicKey`] entries, each with non-empty `key_id`/`ascii_armor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeys {
    /// The keys, in document order.
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

impl SigningKeys {
    /// Construct a document from a non-empty, all-valid key list.
    pub fn new(keys: Vec<GpgPublicKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::invalid_argument(
                "signing keys document must contain at least one key",
            ));
        }
        if keys.iter().any(|k| !k.is_valid()) {
            return Err(Error::invalid_argument(
                "every key must have a non-empty key_id and ascii_armor",
            ));
        }
        Ok(Self {
            gpg_public_keys: keys,
        })
    }
}

/// A parsed `SHA256SUMS` file: a hex digest for every filename mentioned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sha256Sums {
    pub(crate) entries: Vec<(String, String)>,
}

/// A memoized Remote Service Discovery record for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRemoteService {
    /// Scheme + host the service was ultimately found at (after redirects).
    pub base_url: String,
    /// Path of the `modules.v1` service, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules_v1_path: Option<String>,
    /// Path of the `providers.v1` service, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers_v1_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_version_accepts_prerelease_and_build_metadata() {
        assert!(validate_version("1.2.3").is_ok());
        assert!(validate_version("1.2.3-rc.1").is_ok());
        assert!(validate_version("1.2.3+build.5").is_ok());
        assert!(validate_version("1.2.3-rc.1+build.5").is_ok());
    }

    #[test]
    fn validate_version_rejects_malformed() {
        assert!(validate_version("1.2").is_err());
        assert!(validate_version("latest").is_err());
    }

    #[test]
    fn gpg_key_validity() {
        let valid = GpgPublicKey {
            key_id: "51852D87348FFC4C".into(),
            ascii_armor: "-----BEGIN PGP PUBLIC KEY BLOCK-----".into(),
            trust_signature: None,
            source: None,
            source_url: None,
        };
        assert!(valid.is_valid());

        let invalid = GpgPublicKey {
            key_id: String::new(),
            ..valid
        };
        assert!(!invalid.is_valid());
    }

    #[test]
    fn signing_keys_rejects_empty_and_invalid() {
        assert!(SigningKeys::new(vec![]).is_err());
        assert!(SigningKeys::new(vec![GpgPublicKey {
            key_id: String::new(),
            ascii_armor: "x".into(),
            trust_signature: None,
            source: None,
            source_url: None,
        }])
        .is_err());
    }

    #[test]
    fn provider_fingerprint_uses_dash_for_internal() {
        let f = Provider::fingerprint("", "hashicorp", "random", "3.1.0", "linux", "amd64");
        assert_eq!(f, "-/hashicorp/random/3.1.0/linux/amd64");
    }
}
