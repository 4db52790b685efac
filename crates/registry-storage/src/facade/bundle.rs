//! Shared provider-bundle assembly used by both the internal provider store
//! and the mirror store — the two capability sets differ only in which
//! prefix (`providers/…` vs `mirror/providers/<host>/…`) they read from.

use crate::backend::Backend;
use registry_core::key_layout::{self, KeyLayoutConfig, ProviderKind};
use registry_core::{signing_keys, Error, Provider, Result};

/// Assembles a [`Provider`] by issuing, per §4.7: an existence check on the
/// archive (fails fast with `NotFound`), parallel presigns of the archive,
/// `SHA256SUMS`, and its signature, a buffered read plus checksum lookup of
/// `SHA256SUMS`, and a decode of the namespace's `signing-keys.json`.
///
/// Any single constituent failure propagates verbatim, tagged with which
/// piece failed, so the façade never synthesizes a partial `Provider` from
/// inconsistent backend state.
pub async fn assemble(
    backend: &dyn Backend,
    cfg: &KeyLayoutConfig,
    kind: ProviderKind,
    host: &str,
    ns: &str,
    name: &str,
    version: &str,
    os: &str,
    arch: &str,
    ttl: std::time::Duration,
) -> Result<Provider> {
    let paths = key_layout::paths_for(cfg, kind, host, ns, name, version, os, arch)?;

    if !backend.exists(&paths.archive).await? {
        return Err(Error::not_found(format!(
            "provider archive {host}/{ns}/{name}/{version}/{os}/{arch}"
        )));
    }

    let (download_url, shasums_url, shasums_signature_url) = tokio::try_join!(
        presign_tagged(backend, &paths.archive, ttl, "archive"),
        presign_tagged(backend, &paths.shasums, ttl, "shasums"),
        presign_tagged(backend, &paths.shasums_sig, ttl, "shasums_sig"),
    )?;

    let shasums_bytes = backend.get(&paths.shasums).await.map_err(|e| tag(e, "shasums"))?;
    let archive_filename = key_layout::archive_filename(name, version, os, arch);
    let shasum = registry_core::checksum::lookup(std::io::Cursor::new(&shasums_bytes[..]), &archive_filename)
        .map_err(|e| tag(e, "shasums"))?;

    let signing_keys_path = key_layout::signing_keys_path(cfg, kind, host, ns)?;
    let signing_keys_bytes = backend
        .get(&signing_keys_path)
        .await
        .map_err(|e| tag(e, "signing_keys"))?;
    let signing_keys = signing_keys::decode(&signing_keys_bytes).map_err(|e| tag(e, "signing_keys"))?;

    Ok(Provider {
        hostname: host.to_string(),
        namespace: ns.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        os: os.to_string(),
        arch: arch.to_string(),
        filename: archive_filename,
        shasum,
        download_url,
        shasums_url,
        shasums_signature_url,
        signing_keys,
    })
}

async fn presign_tagged(
    backend: &dyn Backend,
    key: &str,
    ttl: std::time::Duration,
    which: &'static str,
) -> Result<String> {
    backend.presign(key, ttl).await.map_err(|e| tag(e, which))
}

/// Re-tags an error raised while fetching one constituent of a provider
/// bundle so the caller can tell which object failed without string
/// matching, while preserving the original error kind.
fn tag(err: Error, which: &'static str) -> Error {
    match err {
        Error::BackendFailure { message, source, .. } => Error::BackendFailure {
            which: which.to_string(),
            message,
            source,
        },
        Error::NotFound { what } => Error::NotFound {
            what: format!("{which}: {what}"),
        },
        Error::ListFailed { message, source } => Error::ListFailed {
            message: format!("{which}: {message}"),
            source,
        },
        Error::UploadFailed { message, source } => Error::UploadFailed {
            message: format!("{which}: {message}"),
            source,
        },
        other => other,
    }
}
