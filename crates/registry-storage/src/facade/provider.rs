//! The internal-provider capability set: providers uploaded directly to
//! this registry, served under `providers/<ns>/<name>/…`.

use super::bundle;
use super::StorageFacade;
use crate::backend::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use registry_core::collector;
use registry_core::key_layout::{self, ProviderKind};
use registry_core::{Provider, ProviderVersion, Result, SigningKeys};

/// Operations protocol handlers use to serve the Provider Registry
/// protocol against first-party (non-mirrored) providers.
#[async_trait]
pub trait ProviderStore {
    /// Assembles one platform build's full bundle: archive/shasums/signature
    /// URLs, the recorded checksum, and the namespace's signing keys.
    async fn get_provider(&self, ns: &str, name: &str, version: &str, os: &str, arch: &str) -> Result<Provider>;

    /// Lists every version of a provider, grouped by platform.
    async fn list_provider_versions(&self, ns: &str, name: &str) -> Result<Vec<ProviderVersion>>;

    /// Uploads one release constituent (archive, `SHA256SUMS`, or its
    /// signature) from a lazily-read stream, as a non-overwriting put.
    async fn upload_provider_release_file(
        &self,
        ns: &str,
        name: &str,
        filename: &str,
        body: ByteStream,
    ) -> Result<()>;

    /// Reads the namespace's signing-keys document.
    async fn signing_keys(&self, ns: &str) -> Result<SigningKeys>;

    /// Overwrites the namespace's signing-keys document.
    async fn upload_signing_keys(&self, ns: &str, keys: &SigningKeys) -> Result<()>;
}

#[async_trait]
impl ProviderStore for StorageFacade {
    async fn get_provider(&self, ns: &str, name: &str, version: &str, os: &str, arch: &str) -> Result<Provider> {
        bundle::assemble(
            self.backend.as_ref(),
            &self.key_layout,
            ProviderKind::Internal,
            "",
            ns,
            name,
            version,
            os,
            arch,
            self.presign_ttl,
        )
        .await
    }

    async fn list_provider_versions(&self, ns: &str, name: &str) -> Result<Vec<ProviderVersion>> {
        let prefix = key_layout::prefix_for(&self.key_layout, ProviderKind::Internal, "", ns, name)?;
        let mut pages = self
            .backend
            .list(&prefix, tokio_util::sync::CancellationToken::new())
            .await?;

        let mut providers = Vec::new();
        while let Some(page) = pages.next().await {
            for key in page? {
                let filename = key.rsplit('/').next().unwrap_or(&key);
                if let Ok(parsed) = key_layout::parse_from_archive_name(filename) {
                    providers.push(Provider {
                        hostname: String::new(),
                        namespace: ns.to_string(),
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
        }
        Ok(collector::collect(providers))
    }

    async fn upload_provider_release_file(
        &self,
        ns: &str,
        name: &str,
        filename: &str,
        body: ByteStream,
    ) -> Result<()> {
        let prefix = key_layout::prefix_for(&self.key_layout, ProviderKind::Internal, "", ns, name)?;
        self.backend.put_stream(&format!("{prefix}/{filename}"), body, false).await
    }

    async fn signing_keys(&self, ns: &str) -> Result<SigningKeys> {
        let key = key_layout::signing_keys_path(&self.key_layout, ProviderKind::Internal, "", ns)?;
        let bytes = self.backend.get(&key).await?;
        registry_core::signing_keys::decode(&bytes)
    }

    async fn upload_signing_keys(&self, ns: &str, keys: &SigningKeys) -> Result<()> {
        let key = key_layout::signing_keys_path(&self.key_layout, ProviderKind::Internal, "", ns)?;
        let bytes = registry_core::signing_keys::encode(keys)?;
        self.backend.put(&key, Bytes::from(bytes), true).await
    }
}

