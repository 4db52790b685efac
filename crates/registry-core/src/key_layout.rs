//! Pure functions mapping `(kind, host, namespace, name, version, os, arch)`
//! tuples to object keys, and parsing keys back into tuples.
//!
//! Nothing in this module performs I/O; it only manipulates strings. Two
//! layouts exist concurrently: the current hierarchy implemented here, and
//! the pre-split legacy layout handled by the migrator in `registry-storage`.

use crate::error::{Error, Result};

/// Distinguishes internal (first-party) providers from mirrored
/// (upstream-cached) ones. Internal providers are served under
/// `providers/<ns>/<name>/…`; mirrored providers under
/// `mirror/providers/<host>/<ns>/<name>/…`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Uploaded directly to this registry by an operator.
    Internal,
    /// Cached from an upstream registry.
    Mirror,
}

/// Configuration for the key layout: the storage-wide prefix all keys are
/// rooted under, and the archive extension used for module packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayoutConfig {
    /// Root prefix every key is nested under (may be empty).
    pub prefix: String,
    /// Archive extension for module packages, without the leading dot.
    pub archive_extension: String,
}

impl Default for KeyLayoutConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            archive_extension: "tar.gz".to_string(),
        }
    }
}

impl KeyLayoutConfig {
    /// Build a config rooted at `prefix` with the default `tar.gz` archive
    /// extension.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    fn join(&self, segments: &[&str]) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(segments.len() + 1);
        if !self.prefix.is_empty() {
            parts.push(self.prefix.trim_end_matches('/'));
        }
        parts.extend(segments.iter().copied());
        parts.join("/")
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_argument(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Returns the storage prefix under which a namespace's objects live for the
/// given provider kind.
///
/// Fails with `InvalidArgument` if `kind = Mirror` and `host` is empty, or
/// if `ns`/`name` is empty. For `kind = Internal` the `host` argument is
/// discarded even if supplied (it is not part of the internal key space).
pub fn prefix_for(
    cfg: &KeyLayoutConfig,
    kind: ProviderKind,
    host: &str,
    ns: &str,
    name: &str,
) -> Result<String> {
    require_non_empty("namespace", ns)?;
    require_non_empty("name", name)?;

    match kind {
        ProviderKind::Internal => Ok(cfg.join(&["providers", ns, name])),
        ProviderKind::Mirror => {
            require_non_empty("host", host)?;
            Ok(cfg.join(&["mirror", "providers", host, ns, name]))
        }
    }
}

/// Returns the storage prefix for a namespace's `signing-keys.json`,
/// independent of any particular provider name.
pub fn signing_keys_prefix(
    cfg: &KeyLayoutConfig,
    kind: ProviderKind,
    host: &str,
    ns: &str,
) -> Result<String> {
    require_non_empty("namespace", ns)?;
    match kind {
        ProviderKind::Internal => Ok(cfg.join(&["providers", ns])),
        ProviderKind::Mirror => {
            require_non_empty("host", host)?;
            Ok(cfg.join(&["mirror", "providers", host, ns]))
        }
    }
}

/// Returns the key of a namespace's `signing-keys.json` document.
pub fn signing_keys_path(
    cfg: &KeyLayoutConfig,
    kind: ProviderKind,
    host: &str,
    ns: &str,
) -> Result<String> {
    Ok(format!(
        "{}/signing-keys.json",
        signing_keys_prefix(cfg, kind, host, ns)?
    ))
}

/// The archive/shasums/signature key triple for one provider release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPaths {
    /// Key of the provider zip archive.
    pub archive: String,
    /// Key of the `SHA256SUMS` file.
    pub shasums: String,
    /// Key of the detached `SHA256SUMS.sig` signature.
    pub shasums_sig: String,
}

/// Returns the archive filename for a provider release, independent of any
/// storage prefix: `terraform-provider-<name>_<version>_<os>_<arch>.zip`.
#[must_use]
pub fn archive_filename(name: &str, version: &str, os: &str, arch: &str) -> String {
    format!("terraform-provider-{name}_{version}_{os}_{arch}.zip")
}

/// Returns the `SHA256SUMS` filename for a provider version, shared by all
/// platforms of that version.
#[must_use]
pub fn shasums_filename(name: &str, version: &str) -> String {
    format!("terraform-provider-{name}_{version}_SHA256SUMS")
}

/// Returns the `(archive, shasums, shasums.sig)` key triple for one provider
/// release. `version`, `os`, and `arch` MUST be non-empty.
pub fn paths_for(
    cfg: &KeyLayoutConfig,
    kind: ProviderKind,
    host: &str,
    ns: &str,
    name: &str,
    version: &str,
    os: &str,
    arch: &str,
) -> Result<ProviderPaths> {
    require_non_empty("version", version)?;
    require_non_empty("os", os)?;
    require_non_empty("arch", arch)?;

    let prefix = prefix_for(cfg, kind, host, ns, name)?;
    let archive = format!("{prefix}/{}", archive_filename(name, version, os, arch));
    let shasums_name = shasums_filename(name, version);
    let shasums = format!("{prefix}/{shasums_name}");
    let shasums_sig = format!("{shasums}.sig");

    Ok(ProviderPaths {
        archive,
        shasums,
        shasums_sig,
    })
}

/// Returns the key of a module archive:
/// `<prefix>/modules/<ns>/<name>/<provider>/<ns>-<name>-<provider>-<version>.<ext>`.
pub fn module_path(
    cfg: &KeyLayoutConfig,
    ns: &str,
    name: &str,
    provider: &str,
    version: &str,
) -> Result<String> {
    require_non_empty("namespace", ns)?;
    require_non_empty("name", name)?;
    require_non_empty("provider", provider)?;
    require_non_empty("version", version)?;

    let filename = format!(
        "{ns}-{name}-{provider}-{version}.{}",
        cfg.archive_extension
    );
    Ok(cfg.join(&["modules", ns, name, provider, &filename]))
}

/// Returns the prefix under which every version of one module lives.
pub fn module_prefix(cfg: &KeyLayoutConfig, ns: &str, name: &str, provider: &str) -> Result<String> {
    require_non_empty("namespace", ns)?;
    require_non_empty("name", name)?;
    require_non_empty("provider", provider)?;
    Ok(cfg.join(&["modules", ns, name, provider]))
}

/// Recovers `version` from a module archive's basename, given the
/// `(ns, name, provider)` that produced the prefix it was listed under.
/// Returns `None` (not an error) if the basename does not match the
/// expected `<ns>-<name>-<provider>-<version>.<ext>` shape — the same
/// prefix may hold migration artifacts that must be silently skipped.
#[must_use]
pub fn parse_module_filename(
    cfg: &KeyLayoutConfig,
    ns: &str,
    name: &str,
    provider: &str,
    filename: &str,
) -> Option<String> {
    let known_prefix = format!("{ns}-{name}-{provider}-");
    let known_suffix = format!(".{}", cfg.archive_extension);
    let body = filename.strip_prefix(&known_prefix)?;
    let version = body.strip_suffix(&known_suffix)?;
    if version.is_empty() {
        return None;
    }
    Some(version.to_string())
}

/// A provider release recovered from an archive filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArchiveName {
    /// Provider type name (may itself contain hyphens).
    pub name: String,
    /// Version string, as it appeared in the filename.
    pub version: String,
    /// Operating system component of the platform.
    pub os: String,
    /// CPU architecture component of the platform.
    pub arch: String,
}

/// Parses `terraform-provider-<name>_<version>_<os>_<arch>.zip` back into its
/// components. Parsing is greedy on `_` from the right: the last three
/// underscore-delimited fields are taken as `version`, `os`, and `arch`, so
/// `name` may itself contain hyphens without disrupting the split.
///
/// Fails with `InvalidArgument` if the filename does not match the expected
/// shape.
pub fn parse_from_archive_name(filename: &str) -> Result<ParsedArchiveName> {
    const PREFIX: &str = "terraform-provider-";
    const SUFFIX: &str = ".zip";

    let body = filename
        .strip_prefix(PREFIX)
        .ok_or_else(|| invalid_archive_name(filename))?;
    let body = body
        .strip_suffix(SUFFIX)
        .ok_or_else(|| invalid_archive_name(filename))?;

    let mut parts = body.rsplitn(4, '_');
    let arch = parts.next().ok_or_else(|| invalid_archive_name(filename))?;
    let os = parts.next().ok_or_else(|| invalid_archive_name(filename))?;
    let version = parts.next().ok_or_else(|| invalid_archive_name(filename))?;
    let name = parts.next().ok_or_else(|| invalid_archive_name(filename))?;

    if name.is_empty() || version.is_empty() || os.is_empty() || arch.is_empty() {
        return Err(invalid_archive_name(filename));
    }

    Ok(ParsedArchiveName {
        name: name.to_string(),
        version: version.to_string(),
        os: os.to_string(),
        arch: arch.to_string(),
    })
}

fn invalid_archive_name(filename: &str) -> Error {
    Error::invalid_argument(format!(
        "'{filename}' does not match terraform-provider-<name>_<version>_<os>_<arch>.zip"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg() -> KeyLayoutConfig {
        KeyLayoutConfig::with_prefix("storagePrefix")
    }

    #[test]
    fn prefix_for_mirror_requires_host() {
        let err = prefix_for(&cfg(), ProviderKind::Mirror, "", "hashicorp", "random").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn prefix_for_rejects_empty_namespace_or_name() {
        assert!(prefix_for(&cfg(), ProviderKind::Internal, "", "", "random").is_err());
        assert!(prefix_for(&cfg(), ProviderKind::Internal, "", "hashicorp", "").is_err());
        assert!(prefix_for(&cfg(), ProviderKind::Mirror, "h", "", "random").is_err());
        assert!(prefix_for(&cfg(), ProviderKind::Mirror, "h", "hashicorp", "").is_err());
    }

    #[test]
    fn internal_discards_host() {
        let with_host = prefix_for(&cfg(), ProviderKind::Internal, "h", "hashicorp", "random").unwrap();
        let without_host = prefix_for(&cfg(), ProviderKind::Internal, "", "hashicorp", "random").unwrap();
        assert_eq!(with_host, without_host);
    }

    #[test]
    fn paths_for_mirror_matches_expected_layout() {
        let paths = paths_for(
            &cfg(),
            ProviderKind::Mirror,
            "registry.terraform.io",
            "hashicorp",
            "random",
            "3.1.0",
            "linux",
            "amd64",
        )
        .unwrap();

        assert_eq!(
            paths.archive,
            "storagePrefix/mirror/providers/registry.terraform.io/hashicorp/random/terraform-provider-random_3.1.0_linux_amd64.zip"
        );
        assert_eq!(
            paths.shasums,
            "storagePrefix/mirror/providers/registry.terraform.io/hashicorp/random/terraform-provider-random_3.1.0_SHA256SUMS"
        );
        assert_eq!(
            paths.shasums_sig,
            "storagePrefix/mirror/providers/registry.terraform.io/hashicorp/random/terraform-provider-random_3.1.0_SHA256SUMS.sig"
        );
    }

    #[test]
    fn paths_for_rejects_empty_version_os_arch() {
        assert!(paths_for(&cfg(), ProviderKind::Internal, "", "hashicorp", "random", "", "linux", "amd64").is_err());
        assert!(paths_for(&cfg(), ProviderKind::Internal, "", "hashicorp", "random", "3.1.0", "", "amd64").is_err());
        assert!(paths_for(&cfg(), ProviderKind::Internal, "", "hashicorp", "random", "3.1.0", "linux", "").is_err());
    }

    #[test]
    fn parse_from_archive_name_recovers_hyphenated_name() {
        let parsed = parse_from_archive_name("terraform-provider-google-beta_4.80.0_darwin_arm64.zip").unwrap();
        assert_eq!(parsed.name, "google-beta");
        assert_eq!(parsed.version, "4.80.0");
        assert_eq!(parsed.os, "darwin");
        assert_eq!(parsed.arch, "arm64");
    }

    #[test]
    fn parse_from_archive_name_accepts_semver_build_and_prerelease() {
        let parsed = parse_from_archive_name("terraform-provider-random_3.1.0-rc.1+build.5_linux_amd64.zip").unwrap();
        assert_eq!(parsed.version, "3.1.0-rc.1+build.5");
    }

    #[test]
    fn parse_from_archive_name_rejects_bad_shape() {
        assert!(parse_from_archive_name("not-a-provider-archive.zip").is_err());
        assert!(parse_from_archive_name("terraform-provider-random_3.1.0_linux_amd64.tar.gz").is_err());
    }

    #[test]
    fn parse_module_filename_skips_non_matching_keys() {
        let cfg = KeyLayoutConfig::default();
        assert_eq!(
            parse_module_filename(&cfg, "hashicorp", "consul", "aws", "hashicorp-consul-aws-1.2.0.tar.gz"),
            Some("1.2.0".to_string())
        );
        assert_eq!(
            parse_module_filename(&cfg, "hashicorp", "consul", "aws", "MIGRATION_MARKER.txt"),
            None
        );
    }

    proptest! {
        #[test]
        fn round_trip_archive_name(
            name in "[a-z][a-z-]{0,12}",
            version in "[0-9]\\.[0-9]\\.[0-9]",
            os in "(linux|darwin|windows)",
            arch in "(amd64|arm64)",
        ) {
            let cfg = cfg();
            let paths = paths_for(&cfg, ProviderKind::Internal, "", "hashicorp", &name, &version, &os, &arch).unwrap();
            let basename = paths.archive.rsplit('/').next().unwrap();
            let parsed = parse_from_archive_name(basename).unwrap();
            prop_assert_eq!(parsed.name, name);
            prop_assert_eq!(parsed.version, version);
            prop_assert_eq!(parsed.os, os);
            prop_assert_eq!(parsed.arch, arch);
        }
    }
}
