//! The mirror-store capability set: providers cached from an upstream
//! registry, served under `mirror/providers/<host>/<ns>/<name>/…`. Same
//! shape as [`super::ProviderStore`] plus the operations the Mirror Pull
//! Coordinator needs to query and commit cache entries.

use super::bundle;
use super::StorageFacade;
use crate::backend::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use registry_core::key_layout::{self, ProviderKind};
use registry_core::{Error, Provider, ProviderVersion, Result, Sha256Sums, SigningKeys};

/// Identifies one mirrored provider, or a filtered set of them when
/// `version` is omitted from a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorProviderQuery {
    /// Upstream host the provider is mirrored from.
    pub host: String,
    /// Namespace.
    pub namespace: String,
    /// Provider type name.
    pub name: String,
    /// Version; required for [`MirrorStore::get_mirrored_provider`], an
    /// optional filter for [`MirrorStore::list_mirrored_providers`].
    pub version: Option<String>,
    /// Operating system; required for a single-platform lookup.
    pub os: Option<String>,
    /// CPU architecture; required for a single-platform lookup.
    pub arch: Option<String>,
}

/// Operations the Mirror Pull Coordinator and the Provider Network Mirror
/// protocol handlers use against cached upstream providers.
#[async_trait]
pub trait MirrorStore {
    /// Looks up one mirrored platform build. `NotMirrored` (not `NotFound`)
    /// if it has not been cached yet — protocol handlers answer a cache
    /// miss differently from a hard 404.
    async fn get_mirrored_provider(&self, query: &MirrorProviderQuery) -> Result<Provider>;

    /// Lists mirrored versions for `(host, namespace, name)`, optionally
    /// filtered to one version. All three of `host`/`namespace`/`name` must
    /// be present regardless of whether `version` is set.
    async fn list_mirrored_providers(&self, query: &MirrorProviderQuery) -> Result<Vec<ProviderVersion>>;

    /// Reads and parses the `SHA256SUMS` file for one mirrored version.
    async fn mirrored_sha256_sums(&self, query: &MirrorProviderQuery) -> Result<Sha256Sums>;

    /// Overwriting upload of one mirrored release constituent, from a
    /// lazily-read stream.
    async fn upload_mirrored_file(&self, query: &MirrorProviderQuery, filename: &str, body: ByteStream) -> Result<()>;

    /// Commits one mirrored release constituent with `put_stream(overwrite =
    /// false)`, treating a concurrent pull that won the race
    /// (`AlreadyExists`) as success rather than an error. This is the
    /// method the Mirror Pull Coordinator's commit step uses;
    /// [`Self::upload_mirrored_file`] stays available for callers that
    /// intentionally want to replace an entry.
    async fn commit_mirrored_file(&self, query: &MirrorProviderQuery, filename: &str, body: ByteStream) -> Result<()>;

    /// Overwriting upload of a mirrored namespace's signing-keys document.
    async fn upload_mirrored_signing_keys(&self, host: &str, ns: &str, keys: &SigningKeys) -> Result<()>;

    /// Deletes one mirrored release constituent. Used by the Mirror Pull
    /// Coordinator's best-effort rollback when a fetch or verification step
    /// fails after a partial commit; a missing key is not an error.
    async fn delete_mirrored_file(&self, query: &MirrorProviderQuery, filename: &str) -> Result<()>;
}

fn require_identity(query: &MirrorProviderQuery) -> Result<()> {
    if query.host.is_empty() || query.namespace.is_empty() || query.name.is_empty() {
        return Err(Error::invalid_argument(
            "host, namespace, and name are all required to address a mirrored provider",
        ));
    }
    Ok(())
}

#[async_trait]
impl MirrorStore for StorageFacade {
    async fn get_mirrored_provider(&self, query: &MirrorProviderQuery) -> Result<Provider> {
        require_identity(query)?;
        let (version, os, arch) = match (&query.version, &query.os, &query.arch) {
            (Some(v), Some(o), Some(a)) => (v, o, a),
            _ => {
                return Err(Error::invalid_argument(
                    "version, os, and arch are all required to look up a single mirrored provider",
                ))
            }
        };

        match bundle::assemble(
            self.backend.as_ref(),
            &self.key_layout,
            ProviderKind::Mirror,
            &query.host,
            &query.namespace,
            &query.name,
            version,
            os,
            arch,
            self.presign_ttl,
        )
        .await
        {
            Err(Error::NotFound { .. }) => Err(Error::not_mirrored(Provider::fingerprint(
                &query.host,
                &query.namespace,
                &query.name,
                version,
                os,
                arch,
            ))),
            other => other,
        }
    }

    async fn list_mirrored_providers(&self, query: &MirrorProviderQuery) -> Result<Vec<ProviderVersion>> {
        require_identity(query)?;
        let prefix = key_layout::prefix_for(
            &self.key_layout,
            ProviderKind::Mirror,
            &query.host,
            &query.namespace,
            &query.name,
        )?;
        let mut pages = self
            .backend
            .list(&prefix, tokio_util::sync::CancellationToken::new())
            .await?;

        let mut providers = Vec::new();
        while let Some(page) = pages.next().await {
            for key in page? {
                let filename = key.rsplit('/').next().unwrap_or(&key);
                let Ok(parsed) = key_layout::parse_from_archive_name(filename) else {
                    continue;
                };
                if let Some(filter) = &query.version {
                    if &parsed.version != filter {
                        continue;
                    }
                }
                providers.push(Provider {
                    hostname: query.host.clone(),
                    namespace: query.namespace.clone(),
                    name: parsed.name,
                    version: parsed.version,
                    os: parsed.os,
                    arch: parsed.arch,
                    filename: filename.to_string(),
                    shasum: String::new(),
                    download_url: String::new(),
                    shasums_url: String::new(),
                    shasums_signature_url: String::new(),
                    signing_keys: SigningKeys { gpg_public_keys: vec![] },
                });
            }
        }
        Ok(registry_core::collector::collect(providers))
    }

    async fn mirrored_sha256_sums(&self, query: &MirrorProviderQuery) -> Result<Sha256Sums> {
        require_identity(query)?;
        let version = query
            .version
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("version is required to read SHA256SUMS"))?;
        let shasums_name = key_layout::shasums_filename(&query.name, version);
        let prefix = key_layout::prefix_for(
            &self.key_layout,
            ProviderKind::Mirror,
            &query.host,
            &query.namespace,
            &query.name,
        )?;
        let bytes = self.backend.get(&format!("{prefix}/{shasums_name}")).await?;
        Sha256Sums::parse(std::io::Cursor::new(&bytes[..]))
    }

    async fn upload_mirrored_file(&self, query: &MirrorProviderQuery, filename: &str, body: ByteStream) -> Result<()> {
        require_identity(query)?;
        let prefix = key_layout::prefix_for(
            &self.key_layout,
            ProviderKind::Mirror,
            &query.host,
            &query.namespace,
            &query.name,
        )?;
        self.backend.put_stream(&format!("{prefix}/{filename}"), body, true).await
    }

    async fn commit_mirrored_file(&self, query: &MirrorProviderQuery, filename: &str, body: ByteStream) -> Result<()> {
        require_identity(query)?;
        let prefix = key_layout::prefix_for(
            &self.key_layout,
            ProviderKind::Mirror,
            &query.host,
            &query.namespace,
            &query.name,
        )?;
        match self.backend.put_stream(&format!("{prefix}/{filename}"), body, false).await {
            Ok(()) => Ok(()),
            Err(Error::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn upload_mirrored_signing_keys(&self, host: &str, ns: &str, keys: &SigningKeys) -> Result<()> {
        let key = key_layout::signing_keys_path(&self.key_layout, ProviderKind::Mirror, host, ns)?;
        let bytes = registry_core::signing_keys::encode(keys)?;
        self.backend.put(&key, Bytes::from(bytes), true).await
    }

    async fn delete_mirrored_file(&self, query: &MirrorProviderQuery, filename: &str) -> Result<()> {
        require_identity(query)?;
        let prefix = key_layout::prefix_for(
            &self.key_layout,
            ProviderKind::Mirror,
            &query.host,
            &query.namespace,
            &query.name,
        )?;
        match self.backend.delete(&format!("{prefix}/{filename}")).await {
            Ok(()) => Ok(()),
            Err(Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::LocalFsBackend;
    use registry_core::key_layout::KeyLayoutConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn query() -> MirrorProviderQuery {
        MirrorProviderQuery {
            host: "registry.example.com".into(),
            namespace: "hashicorp".into(),
            name: "random".into(),
            version: Some("3.1.0".into()),
            os: Some("linux".into()),
            arch: Some("amd64".into()),
        }
    }

    async fn facade() -> StorageFacade {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalFsBackend::new(dir.path(), None, None).await.unwrap());
        StorageFacade::new(backend, KeyLayoutConfig::default(), Duration::from_secs(60))
    }

    fn stream_of(bytes: &'static [u8]) -> ByteStream {
        Box::pin(std::io::Cursor::new(bytes))
    }

    #[tokio::test]
    async fn list_mirrored_providers_rejects_missing_identity() {
        let facade = facade().await;
        let mut q = query();
        q.namespace = String::new();
        let err = facade.list_mirrored_providers(&q).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn commit_mirrored_file_treats_already_exists_as_success() {
        let facade = facade().await;
        let q = query();
        facade
            .commit_mirrored_file(&q, "archive.zip", stream_of(b"first"))
            .await
            .unwrap();

        // A concurrent pull that lost the race still reports success rather
        // than propagating AlreadyExists.
        facade
            .commit_mirrored_file(&q, "archive.zip", stream_of(b"second"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_mirrored_file_overwrites() {
        let facade = facade().await;
        let q = query();
        facade
            .upload_mirrored_file(&q, "archive.zip", stream_of(b"first"))
            .await
            .unwrap();
        facade
            .upload_mirrored_file(&q, "archive.zip", stream_of(b"second"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_mirrored_file_is_ok_when_already_absent() {
        let facade = facade().await;
        let q = query();
        facade.delete_mirrored_file(&q, "never-uploaded.zip").await.unwrap();
    }

    #[tokio::test]
    async fn delete_mirrored_file_removes_committed_entry() {
        let facade = facade().await;
        let q = query();
        facade
            .upload_mirrored_file(&q, "archive.zip", stream_of(b"bytes"))
            .await
            .unwrap();

        let prefix = key_layout::prefix_for(&facade.key_layout, ProviderKind::Mirror, &q.host, &q.namespace, &q.name).unwrap();
        let key = format!("{prefix}/archive.zip");
        assert!(facade.backend.exists(&key).await.unwrap());

        facade.delete_mirrored_file(&q, "archive.zip").await.unwrap();
        assert!(!facade.backend.exists(&key).await.unwrap());
    }
}
