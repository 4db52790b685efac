//! Azure Blob Storage backend adapter.
//!
//! Presigning uses a user-delegation SAS, which is why the spec (and
//! `registry-config`) carries a separate, much longer default TTL for
//! this backend than the other cloud adapters.

use crate::backend::{Backend, ByteStream, KeyPageStream};
use async_trait::async_trait;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::{BlobServiceClient, ClientBuilder};
use bytes::Bytes;
use futures::StreamExt;
use registry_config::AzureConfig;
use registry_core::{Error, Result};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Azure-backed object store.
pub struct AzureBackend {
    config: AzureConfig,
    service: OnceCell<BlobServiceClient>,
}

impl AzureBackend {
    /// Builds the adapter. The client is not constructed until first use;
    /// credentials come from Azure's default credential chain.
    #[must_use]
    pub fn new(config: AzureConfig) -> Self {
        Self {
            config,
            service: OnceCell::new(),
        }
    }

    async fn service(&self) -> Result<&BlobServiceClient> {
        self.service
            .get_or_try_init(|| async {
                let credentials = azure_identity::create_default_credential().map_err(|e| {
                    Error::backend_failure_with_source(
                        "azure",
                        "resolve default Azure credential chain",
                        e,
                    )
                })?;
                Ok::<_, Error>(
                    ClientBuilder::new(
                        self.config.account.clone(),
                        StorageCredentials::token_credential(credentials),
                    )
                    .blob_service_client(),
                )
            })
            .await
    }

    fn container(&self, service: &BlobServiceClient) -> azure_storage_blobs::prelude::ContainerClient {
        service.container_client(&self.config.container)
    }
}

#[async_trait]
impl Backend for AzureBackend {
    fn kind(&self) -> &'static str {
        "azure"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let service = self.service().await?;
        let blob = self.container(service).blob_client(key);
        match blob.get_properties().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Error::backend_failure_with_source("azure", format!("head {key}"), e)),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let service = self.service().await?;
        let blob = self.container(service).blob_client(key);
        let mut stream = blob.get().into_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if is_not_found(&e) {
                    Error::not_found(format!("object {key}"))
                } else {
                    Error::backend_failure_with_source("azure", format!("get {key}"), e)
                }
            })?;
            let data = chunk
                .data
                .collect()
                .await
                .map_err(|e| Error::backend_failure_with_source("azure", format!("read body {key}"), e))?;
            buf.extend_from_slice(&data);
        }
        Ok(Bytes::from(buf))
    }

    async fn open(&self, key: &str) -> Result<ByteStream> {
        // Azure's SDK exposes blob bodies as a chunked stream, not an
        // `AsyncRead`; buffer once and hand back a cursor over it. Archives
        // are multi-hundred-MB so this trades memory for simplicity only
        // on this backend; S3/GCS/OCI stream natively.
        let bytes = self.get(key).await?;
        Ok(Box::pin(std::io::Cursor::new(bytes.to_vec())))
    }

    async fn put(&self, key: &str, body: Bytes, overwrite: bool) -> Result<()> {
        let service = self.service().await?;
        let blob = self.container(service).blob_client(key);

        if !overwrite {
            let mut request = blob.put_block_blob(body.to_vec());
            request = request.if_match(azure_core::prelude::IfMatchCondition::NotMatch("*".to_string()));
            request.await.map_err(|e| {
                if is_precondition_failed(&e) {
                    Error::already_exists(format!("object {key}"))
                } else {
                    Error::upload_failed_with_source(format!("put {key}"), e)
                }
            })?;
            return Ok(());
        }

        blob.put_block_blob(body.to_vec())
            .await
            .map_err(|e| Error::upload_failed_with_source(format!("put {key}"), e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let service = self.service().await?;
        let blob = self.container(service).blob_client(key);
        match blob.delete().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::backend_failure_with_source("azure", format!("delete {key}"), e)),
        }
    }

    async fn list(&self, prefix: &str, cancel: CancellationToken) -> Result<KeyPageStream> {
        let service = self.service().await?;
        let container = self.container(service);
        let prefix = prefix.to_string();

        let stream = async_stream::try_stream! {
            let mut pages = container.list_blobs().prefix(prefix.clone()).into_stream();
            while let Some(page) = pages.next().await {
                if cancel.is_cancelled() {
                    Err(Error::invalid_argument("listing cancelled"))?;
                }
                let page = page.map_err(|e| Error::list_failed_with_source(format!("list {prefix}"), e))?;
                let keys: Vec<String> = page.blobs.blobs().map(|b| b.name.clone()).collect();
                yield keys;
            }
        };
        Ok(Box::pin(stream))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String> {
        let service = self.service().await?;
        let blob = self.container(service).blob_client(key);
        let signed = blob
            .user_delegation_shared_access_signature(
                azure_storage::prelude::BlobSasPermissions {
                    read: true,
                    ..Default::default()
                },
                std::time::SystemTime::now() + ttl,
            )
            .await
            .map_err(|e| Error::backend_failure_with_source("azure", format!("presign {key}"), e))?;
        blob.generate_signed_blob_url(&signed)
            .map(|u| u.to_string())
            .map_err(|e| Error::backend_failure_with_source("azure", format!("build signed url {key}"), e))
    }
}

fn is_not_found(err: &azure_core::Error) -> bool {
    matches!(err.kind(), azure_core::error::ErrorKind::HttpResponse { status, .. } if is_not_found_status(u16::from(*status)))
}

fn is_precondition_failed(err: &azure_core::Error) -> bool {
    matches!(err.kind(), azure_core::error::ErrorKind::HttpResponse { status, .. } if is_precondition_failed_status(u16::from(*status)))
}

/// Blob Storage reports a missing blob as a plain 404.
fn is_not_found_status(status: u16) -> bool {
    status == 404
}

/// A lost `if-not-match` race comes back as either a 409 conflict or a 412
/// precondition failure depending on the operation.
fn is_precondition_failed_status(status: u16) -> bool {
    status == 409 || status == 412
}
