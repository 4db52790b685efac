//! Composition root for embedding the storage core into a server or CLI.
//!
//! [`Registry::from_config`] wires a configured backend into the
//! [`StorageFacade`], alongside a shared service-discovery resolver and
//! mirror-pull coordinator. Everything downstream — protocol handlers,
//! auth, an HTTP framework — is out of scope here; this crate only hands
//! out the three capability traits and the coordinator.

use registry_config::RegistryConfig;
use registry_core::Result;
use registry_discovery::{DiscoverHost, ServiceDiscovery};
use registry_mirror::MirrorPullCoordinator;
use registry_storage::StorageFacade;
use std::sync::Arc;
use tracing::info;

pub use registry_config as config;
pub use registry_core as core;
pub use registry_discovery as discovery;
pub use registry_mirror as mirror;
pub use registry_storage as storage;

/// The assembled storage core: a façade over the configured backend, a
/// shared discovery resolver, and a mirror-pull coordinator bound to the
/// same façade.
pub struct Registry {
    facade: Arc<StorageFacade>,
    discovery: Arc<dyn DiscoverHost>,
    mirror: MirrorPullCoordinator<StorageFacade>,
}

impl Registry {
    /// Builds the storage core from `config`, constructing whichever
    /// backend `config.backend` selects.
    pub async fn from_config(config: &RegistryConfig) -> Result<Self> {
        let backend = registry_storage::backends::from_config(&config.backend).await?;
        let facade = Arc::new(StorageFacade::new(backend, config.key_layout(), config.presign_ttl()));
        let discovery: Arc<dyn DiscoverHost> = Arc::new(ServiceDiscovery::new());
        let mirror = MirrorPullCoordinator::new(facade.clone(), discovery.clone());

        info!(backend = %backend_kind(&config.backend), "storage core wired");
        Ok(Self { facade, discovery, mirror })
    }

    /// The storage façade, implementing `ModuleStore`/`ProviderStore`/`MirrorStore`.
    #[must_use]
    pub fn facade(&self) -> &Arc<StorageFacade> {
        &self.facade
    }

    /// The shared service-discovery resolver, for callers that need to
    /// resolve a host's `.well-known/terraform.json` outside a mirror pull.
    #[must_use]
    pub fn discovery(&self) -> &Arc<dyn DiscoverHost> {
        &self.discovery
    }

    /// The mirror-pull coordinator, bound to this registry's façade.
    #[must_use]
    pub fn mirror(&self) -> &MirrorPullCoordinator<StorageFacade> {
        &self.mirror
    }
}

fn backend_kind(config: &registry_config::StorageBackendConfig) -> &'static str {
    use registry_config::StorageBackendConfig;
    match config {
        StorageBackendConfig::S3(_) => "s3",
        StorageBackendConfig::Azure(_) => "azure",
        StorageBackendConfig::Gcs(_) => "gcs",
        StorageBackendConfig::Oci(_) => "oci",
        StorageBackendConfig::LocalFs(_) => "local_fs",
    }
}
