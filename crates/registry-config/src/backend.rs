//! Per-backend configuration structs selected by [`StorageBackendConfig`].

use serde::{Deserialize, Serialize};

/// Selects which object-store backend the storage façade runs against, and
/// carries that backend's settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendConfig {
    /// Amazon S3 or an S3-compatible store.
    S3(S3Config),
    /// Azure Blob Storage.
    Azure(AzureConfig),
    /// Google Cloud Storage.
    Gcs(GcsConfig),
    /// An OCI-distribution-compatible registry used as a blob store.
    Oci(OciConfig),
    /// The local filesystem, with an embedded file server standing in for
    /// presigned URLs.
    LocalFs(LocalFsConfig),
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

/// Settings for the S3 backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct S3Config {
    /// Target bucket.
    pub bucket: String,
    /// AWS region, or the region of an S3-compatible endpoint.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Override endpoint URL, for S3-compatible stores (MinIO, R2, etc).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Forces path-style addressing instead of virtual-hosted-style,
    /// required by most S3-compatible stores behind a custom endpoint.
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_azure_container() -> String {
    "terraform-registry".to_string()
}

/// Settings for the Azure Blob Storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AzureConfig {
    /// Storage account name.
    pub account: String,
    /// Target container.
    #[serde(default = "default_azure_container")]
    pub container: String,
}

/// Settings for the Google Cloud Storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GcsConfig {
    /// Target bucket.
    pub bucket: String,
    /// GCP project owning the service account used for signed URLs, when
    /// it differs from the bucket's own project.
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_oci_registry() -> String {
    "registry-1.docker.io".to_string()
}

/// Settings for the OCI-registry-as-blob-store backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OciConfig {
    /// Registry host, e.g. `ghcr.io`.
    #[serde(default = "default_oci_registry")]
    pub registry: String,
    /// Repository namespace every derived tag is pushed under.
    pub repository: String,
    /// Skip TLS certificate verification; for self-hosted registries with
    /// self-signed certs only.
    #[serde(default)]
    pub insecure: bool,
}

fn default_localfs_root() -> String {
    "./data".to_string()
}

fn default_localfs_bind_address() -> String {
    "127.0.0.1:8089".to_string()
}

/// Settings for the local-filesystem backend's storage root and its
/// embedded presign file server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalFsConfig {
    /// Directory every key is stored under.
    #[serde(default = "default_localfs_root")]
    pub root: String,
    /// Address the embedded file server binds to for serving "presigned"
    /// download URLs.
    #[serde(default = "default_localfs_bind_address")]
    pub bind_address: String,
    /// Public base URL used when building download URLs, if it differs
    /// from `http://<bind_address>`.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for LocalFsConfig {
    fn default() -> Self {
        Self {
            root: default_localfs_root(),
            bind_address: default_localfs_bind_address(),
            public_base_url: None,
        }
    }
}
