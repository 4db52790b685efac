//! S3 (and S3-compatible) backend adapter.
//!
//! Client construction is lazy and `OnceCell`-guarded: credentials come
//! from the AWS SDK's own default chain (environment, profile, IMDS),
//! never from bespoke configuration here.

use crate::backend::{Backend, ByteStream, KeyPageStream};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use bytes::Bytes;
use registry_config::S3Config;
use registry_core::{Error, Result};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// S3-backed object store.
pub struct S3Backend {
    config: S3Config,
    client: OnceCell<Client>,
}

impl S3Backend {
    /// Builds the adapter. The SDK client is not constructed until first use.
    #[must_use]
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_sdk_s3::config::Region::new(self.config.region.clone()));
                if let Some(endpoint) = &self.config.endpoint_url {
                    loader = loader.endpoint_url(endpoint);
                }
                let shared = loader.load().await;
                let mut builder = aws_sdk_s3::config::Builder::from(&shared);
                if self.config.force_path_style {
                    builder = builder.force_path_style(true);
                }
                Ok::<_, Error>(Client::from_conf(builder.build()))
            })
            .await
    }
}

#[async_trait]
impl Backend for S3Backend {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let client = self.client().await?;
        match client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Error::backend_failure_with_source("s3", format!("head {key}"), e)),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let client = self.client().await?;
        let out = client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    Error::not_found(format!("object {key}"))
                } else {
                    Error::backend_failure_with_source("s3", format!("get {key}"), e)
                }
            })?;
        let bytes = out
            .body
            .collect()
            .await
            .map_err(|e| Error::backend_failure_with_source("s3", format!("read body {key}"), e))?;
        Ok(bytes.into_bytes())
    }

    async fn open(&self, key: &str) -> Result<ByteStream> {
        let client = self.client().await?;
        let out = client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    Error::not_found(format!("object {key}"))
                } else {
                    Error::backend_failure_with_source("s3", format!("open {key}"), e)
                }
            })?;
        Ok(Box::pin(out.body.into_async_read()))
    }

    async fn put(&self, key: &str, body: Bytes, overwrite: bool) -> Result<()> {
        let client = self.client().await?;
        if !overwrite && self.exists(key).await? {
            return Err(Error::already_exists(format!("object {key}")));
        }
        let mut request = client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(AwsByteStream::from(body));
        if !overwrite {
            // S3 conditional-create; races lose with a precondition failure
            // rather than a silent overwrite.
            request = request.if_none_match("*");
        }
        request.send().await.map_err(|e| {
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
        client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::backend_failure_with_source("s3", format!("delete {key}"), e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str, cancel: CancellationToken) -> Result<KeyPageStream> {
        let client = self.client().await?.clone();
        let bucket = self.config.bucket.clone();
        let prefix = prefix.to_string();

        let stream = async_stream::try_stream! {
            let mut continuation: Option<String> = None;
            loop {
                if cancel.is_cancelled() {
                    Err(Error::invalid_argument("listing cancelled"))?;
                }
                let mut request = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix);
                if let Some(token) = &continuation {
                    request = request.continuation_token(token);
                }
                let page = request
                    .send()
                    .await
                    .map_err(|e| Error::list_failed_with_source(format!("list {prefix}"), e))?;

                let keys: Vec<String> = page
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string))
                    .collect();
                yield keys;

                match page.next_continuation_token() {
                    Some(token) => continuation = Some(token.to_string()),
                    None => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String> {
        let client = self.client().await?;
        let config = aws_sdk_s3::presigning::PresigningConfig::expires_in(ttl)
            .map_err(|e| Error::backend_failure_with_source("s3", "build presign config", e))?;
        let presigned = client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| Error::backend_failure_with_source("s3", format!("presign {key}"), e))?;
        Ok(presigned.uri().to_string())
    }
}

fn is_not_found<E>(err: &aws_sdk_s3::error::SdkError<E>) -> bool
where
    E: std::fmt::Debug,
{
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(service_err)
            if is_not_found_status(service_err.raw().status().as_u16())
    )
}

fn is_precondition_failed<E>(err: &aws_sdk_s3::error::SdkError<E>) -> bool
where
    E: std::fmt::Debug,
{
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(service_err)
            if is_precondition_failed_status(service_err.raw().status().as_u16())
    )
}

/// S3 reports a missing object as a plain 404.
fn is_not_found_status(status: u16) -> bool {
    status == 404
}

/// A lost `if-none-match: *` race comes back as 412.
fn is_precondition_failed_status(status: u16) -> bool {
    status == 412
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_status_matches_only_404() {
        assert!(is_not_found_status(404));
        assert!(!is_not_found_status(403));
        assert!(!is_not_found_status(412));
        assert!(!is_not_found_status(500));
    }

    #[test]
    fn precondition_failed_status_matches_only_412() {
        assert!(is_precondition_failed_status(412));
        assert!(!is_precondition_failed_status(404));
        assert!(!is_precondition_failed_status(409));
        assert!(!is_precondition_failed_status(500));
    }
}
