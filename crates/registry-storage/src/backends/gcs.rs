//! Google Cloud Storage backend adapter.

use crate::backend::{Backend, ByteStream, KeyPageStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::Error as GcsHttpError;
use google_cloud_storage::sign::SignedURLOptions;
use registry_config::GcsConfig;
use registry_core::{Error, Result};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// GCS-backed object store.
pub struct GcsBackend {
    config: GcsConfig,
    client: OnceCell<Client>,
}

impl GcsBackend {
    /// Builds the adapter. The client is not constructed until first use;
    /// credentials come from Application Default Credentials.
    #[must_use]
    pub fn new(config: GcsConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let config = ClientConfig::default().with_auth().await.map_err(|e| {
                    Error::backend_failure_with_source("gcs", "load application default credentials", e)
                })?;
                Ok::<_, Error>(Client::new(config))
            })
            .await
    }
}

#[async_trait]
impl Backend for GcsBackend {
    fn kind(&self) -> &'static str {
        "gcs"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let client = self.client().await?;
        match client
            .get_object(&GetObjectRequest {
                bucket: self.config.bucket.clone(),
                object: key.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Error::backend_failure_with_source("gcs", format!("head {key}"), e)),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let client = self.client().await?;
        let bytes = client
            .download_object(
                &GetObjectRequest {
                    bucket: self.config.bucket.clone(),
                    object: key.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    Error::not_found(format!("object {key}"))
                } else {
                    Error::backend_failure_with_source("gcs", format!("get {key}"), e)
                }
            })?;
        Ok(Bytes::from(bytes))
    }

    async fn open(&self, key: &str) -> Result<ByteStream> {
        // As with Azure, buffer once; GCS's streaming download API is not
        // a plain `AsyncRead`.
        let bytes = self.get(key).await?;
        Ok(Box::pin(std::io::Cursor::new(bytes.to_vec())))
    }

    async fn put(&self, key: &str, body: Bytes, overwrite: bool) -> Result<()> {
        let client = self.client().await?;
        if !overwrite && self.exists(key).await? {
            return Err(Error::already_exists(format!("object {key}")));
        }
        let upload_type = UploadType::Simple(Media::new(key.to_string()));
        let mut request = UploadObjectRequest {
            bucket: self.config.bucket.clone(),
            ..Default::default()
        };
        if !overwrite {
            request.if_generation_match = Some(0);
        }
        client
            .upload_object(&request, body.to_vec(), &upload_type)
            .await
            .map_err(|e| {
                if is_precondition_failed(&e) {
                    Error::already_exists(format!("object {key}"))
                } else {
                    Error::upload_failed_with_source(format!("put {key}"), e)
                }
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let client = self.client().await?;
        match client
            .delete_object(&DeleteObjectRequest {
                bucket: self.config.bucket.clone(),
                object: key.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::backend_failure_with_source("gcs", format!("delete {key}"), e)),
        }
    }

    async fn list(&self, prefix: &str, cancel: CancellationToken) -> Result<KeyPageStream> {
        let client = self.client().await?.clone();
        let bucket = self.config.bucket.clone();
        let prefix = prefix.to_string();

        let stream = async_stream::try_stream! {
            let mut page_token: Option<String> = None;
            loop {
                if cancel.is_cancelled() {
                    Err(Error::invalid_argument("listing cancelled"))?;
                }
                let response = client
                    .list_objects(&ListObjectsRequest {
                        bucket: bucket.clone(),
                        prefix: Some(prefix.clone()),
                        page_token: page_token.clone(),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| Error::list_failed_with_source(format!("list {prefix}"), e))?;

                let keys: Vec<String> = response
                    .items
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| o.name)
                    .collect();
                yield keys;

                match response.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String> {
        let client = self.client().await?;
        client
            .signed_url(
                &self.config.bucket,
                key,
                None,
                None,
                SignedURLOptions {
                    expires: ttl,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::backend_failure_with_source("gcs", format!("presign {key}"), e))
    }
}

fn is_not_found(err: &GcsHttpError) -> bool {
    matches!(err, GcsHttpError::Response(r) if is_not_found_status(r.code.into()))
}

fn is_precondition_failed(err: &GcsHttpError) -> bool {
    matches!(err, GcsHttpError::Response(r) if is_precondition_failed_status(r.code.into()))
}

/// GCS reports a missing object as a plain 404.
fn is_not_found_status(code: i32) -> bool {
    code == 404
}

/// A lost `ifGenerationMatch: 0` race comes back as 412.
fn is_precondition_failed_status(code: i32) -> bool {
    code == 412
}
