//! Mirror Pull Coordinator (§4.9): given a cache miss, discovers the
//! upstream provider registry, fetches the archive/`SHA256SUMS`/signature,
//! verifies them, and commits the result into the mirror namespace.
//! Single-flighted per provider fingerprint — the only cross-request shared
//! mutable state this crate holds.

use crate::fetch::UpstreamFetcher;
use crate::verify::{self, HashingReader};
use dashmap::DashMap;
use registry_core::checksum::Sha256Sums;
use registry_core::key_layout;
use registry_core::{Error, Provider, Result};
use registry_discovery::DiscoverHost;
use registry_storage::backend::ByteStream;
use registry_storage::{MirrorProviderQuery, MirrorStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Identifies one provider platform build to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRequest {
    /// Upstream host the provider is mirrored from.
    pub host: String,
    /// Namespace.
    pub namespace: String,
    /// Provider type name.
    pub name: String,
    /// Semantic version.
    pub version: String,
    /// Operating system.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
}

impl MirrorRequest {
    fn fingerprint(&self) -> String {
        Provider::fingerprint(&self.host, &self.namespace, &self.name, &self.version, &self.os, &self.arch)
    }

    fn query(&self) -> MirrorProviderQuery {
        MirrorProviderQuery {
            host: self.host.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            version: Some(self.version.clone()),
            os: Some(self.os.clone()),
            arch: Some(self.arch.clone()),
        }
    }
}

/// Coordinates a cache-miss mirror pull: admission, single-flight, discover,
/// fetch, verify, commit, publish.
pub struct MirrorPullCoordinator<S> {
    store: Arc<S>,
    discovery: Arc<dyn DiscoverHost>,
    fetcher: UpstreamFetcher,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: MirrorStore + Send + Sync + 'static> MirrorPullCoordinator<S> {
    /// Builds a coordinator over `store` (the mirror namespace) and
    /// `discovery` (typically shared with any other component that also
    /// resolves upstream hosts).
    #[must_use]
    pub fn new(store: Arc<S>, discovery: Arc<dyn DiscoverHost>) -> Self {
        Self {
            store,
            discovery,
            fetcher: UpstreamFetcher::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Mirrors `request`, returning the assembled mirrored [`Provider`].
    /// `N` concurrent calls for the same fingerprint issue at most one
    /// upstream archive fetch; a cancelled caller releases its slot so
    /// later callers can retry.
    pub async fn pull(&self, request: &MirrorRequest, cancel: CancellationToken) -> Result<Provider> {
        if let Ok(provider) = self.store.get_mirrored_provider(&request.query()).await {
            return Ok(provider);
        }

        let fingerprint = request.fingerprint();
        let slot = self
            .in_flight
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = tokio::select! {
            guard = slot.lock() => guard,
            () = cancel.cancelled() => {
                return Err(Error::backend_failure("mirror", "pull cancelled before acquiring single-flight slot"));
            }
        };

        // Another puller may have committed while we waited for the slot.
        if let Ok(provider) = self.store.get_mirrored_provider(&request.query()).await {
            self.in_flight.remove(&fingerprint);
            return Ok(provider);
        }

        let result = self.pull_uncontended(request, &cancel).await;
        self.in_flight.remove(&fingerprint);
        result
    }

    async fn pull_uncontended(&self, request: &MirrorRequest, cancel: &CancellationToken) -> Result<Provider> {
        let service = self.discovery.resolve(&request.host).await?;
        let providers_v1_path = service.providers_v1_path.ok_or_else(|| {
            Error::backend_failure("discovery", format!("{} does not advertise providers.v1", request.host))
        })?;

        let metadata_url = format!(
            "{base}{path}{ns}/{name}/{version}/download/{os}/{arch}",
            base = service.base_url,
            path = providers_v1_path,
            ns = request.namespace,
            name = request.name,
            version = request.version,
            os = request.os,
            arch = request.arch,
        );

        let metadata_bytes = self.fetcher.fetch(&metadata_url, cancel).await.map_err(|e| {
            Error::backend_failure_with_source("discovery", format!("fetching {metadata_url}"), e)
        })?;
        let metadata: Provider = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| Error::backend_failure_with_source("discovery", "decoding provider download metadata", e))?;

        if let Err(err) = self.fetch_verify_commit(request, &metadata, cancel).await {
            self.rollback(request).await;
            return Err(err);
        }

        info!(fingerprint = %request.fingerprint(), "mirror pull committed");
        self.store.get_mirrored_provider(&request.query()).await
    }

    async fn fetch_verify_commit(&self, request: &MirrorRequest, metadata: &Provider, cancel: &CancellationToken) -> Result<()> {
        // SHA256SUMS and its signature are kilobyte-scale; buffer them, verify
        // the signature, and recover the archive's expected digest before
        // touching the archive itself.
        let shasums = self
            .fetcher
            .fetch(&metadata.shasums_url, cancel)
            .await
            .map_err(|e| Error::backend_failure_with_source("shasums", "fetching SHA256SUMS", e))?;
        let signature = self
            .fetcher
            .fetch(&metadata.shasums_signature_url, cancel)
            .await
            .map_err(|e| Error::backend_failure_with_source("shasums_sig", "fetching SHA256SUMS.sig", e))?;

        let sums = Sha256Sums::parse(std::io::Cursor::new(&shasums[..]))?;
        let expected_digest = sums.lookup(&metadata.filename)?;
        verify::verify_signature(&shasums, &signature, &metadata.signing_keys.gpg_public_keys)?;

        let shasums_name = key_layout::shasums_filename(&request.name, &request.version);
        let query = request.query();

        // The archive itself may be multi-hundred-MB: stream it from the
        // upstream response straight into storage through a digesting
        // reader, instead of buffering it to compute a checksum and again
        // to write it.
        let archive_stream = self
            .fetcher
            .fetch_stream(&metadata.download_url, cancel)
            .await
            .map_err(|e| Error::backend_failure_with_source("archive", "fetching archive", e))?;
        let digest_cell = Arc::new(std::sync::Mutex::new(None));
        let hashing: ByteStream = Box::pin(HashingReader::new(archive_stream, digest_cell.clone()));
        self.store.commit_mirrored_file(&query, &metadata.filename, hashing).await?;

        let actual_digest = digest_cell
            .lock()
            .expect("hashing reader mutex poisoned")
            .clone()
            .ok_or_else(|| Error::backend_failure("integrity", "archive stream ended without being fully read"))?;
        if !actual_digest.eq_ignore_ascii_case(&expected_digest) {
            return Err(Error::backend_failure(
                "integrity",
                format!("{}: checksum mismatch, expected {expected_digest} got {actual_digest}", metadata.filename),
            ));
        }

        self.store
            .commit_mirrored_file(&query, &shasums_name, Box::pin(std::io::Cursor::new(shasums.to_vec())))
            .await?;
        self.store
            .commit_mirrored_file(&query, &format!("{shasums_name}.sig"), Box::pin(std::io::Cursor::new(signature.to_vec())))
            .await?;

        Ok(())
    }

    async fn rollback(&self, request: &MirrorRequest) {
        let archive_name = key_layout::archive_filename(&request.name, &request.version, &request.os, &request.arch);
        let query = request.query();
        warn!(fingerprint = %request.fingerprint(), "mirror pull failed, rolling back partial upload");
        if let Err(e) = self.store.delete_mirrored_file(&query, &archive_name).await {
            warn!(error = %e, "rollback delete failed, orphaned partial upload left for operator");
        }
    }
}
