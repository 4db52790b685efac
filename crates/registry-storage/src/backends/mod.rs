//! Concrete [`crate::backend::Backend`] implementations, one per supported
//! object store.

mod azure;
mod gcs;
mod local_fs;
mod oci;
mod s3;

pub use azure::AzureBackend;
pub use gcs::GcsBackend;
pub use local_fs::LocalFsBackend;
pub use oci::OciBackend;
pub use s3::S3Backend;

use crate::backend::Backend;
use registry_config::StorageBackendConfig;
use registry_core::Result;
use std::sync::Arc;

/// Constructs the concrete backend selected by `config`.
pub async fn from_config(config: &StorageBackendConfig) -> Result<Arc<dyn Backend>> {
    Ok(match config {
        StorageBackendConfig::S3(cfg) => Arc::new(S3Backend::new(cfg.clone())) as Arc<dyn Backend>,
        StorageBackendConfig::Azure(cfg) => Arc::new(AzureBackend::new(cfg.clone())) as Arc<dyn Backend>,
        StorageBackendConfig::Gcs(cfg) => Arc::new(GcsBackend::new(cfg.clone())) as Arc<dyn Backend>,
        StorageBackendConfig::Oci(cfg) => Arc::new(OciBackend::new(cfg.clone())) as Arc<dyn Backend>,
        StorageBackendConfig::LocalFs(cfg) => Arc::new(
            LocalFsBackend::new(&cfg.root, Some(&cfg.bind_address), cfg.public_base_url.clone())
                .await?,
        ) as Arc<dyn Backend>,
    })
}
