//! HTTPS client for downloading a mirrored provider's release constituents
//! from its upstream registry. The only outbound call in this crate that
//! retries (§10.2): verification and storage are never retried here.

use crate::retry::retry_with_backoff;
use bytes::Bytes;
use registry_storage::backend::ByteStream;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fetches bytes over HTTPS, retrying transient network and 5xx failures
/// with bounded backoff.
pub struct UpstreamFetcher {
    client: Client,
}

impl Default for UpstreamFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamFetcher {
    /// Builds a fetcher over a fresh HTTP client.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend fails to initialize, which cannot happen
    /// with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("registry-mirror/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("reqwest client with default TLS backend"),
        }
    }

    /// Downloads `url`, following redirects, cancellable via `cancel`. Each
    /// call is independently retried; the coordinator calls this once per
    /// release constituent (archive, `SHA256SUMS`, `SHA256SUMS.sig`).
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes, FetchError> {
        retry_with_backoff("upstream_fetch", is_retryable, || async {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            debug!(%url, "fetching upstream artifact");

            let response = tokio::select! {
                result = self.client.get(url).send() => result.map_err(FetchError::Transport)?,
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
            };

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }

            tokio::select! {
                result = response.bytes() => result.map_err(FetchError::Transport),
                () = cancel.cancelled() => Err(FetchError::Cancelled),
            }
        })
        .await
    }

    /// Downloads `url` as a lazily-read stream, for archive bodies too
    /// large to buffer. Only the request itself (connect, TLS, status
    /// code) is retried; once headers arrive the body stream is handed to
    /// the caller and read without a retry band, since a partial write
    /// already landed in storage by the time a mid-body failure surfaces.
    pub async fn fetch_stream(&self, url: &str, cancel: &CancellationToken) -> Result<ByteStream, FetchError> {
        use futures::StreamExt;

        let response = retry_with_backoff("upstream_fetch_stream", is_retryable, || async {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            debug!(%url, "fetching upstream archive as a stream");

            let response = tokio::select! {
                result = self.client.get(url).send() => result.map_err(FetchError::Transport)?,
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
            };

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }
            Ok(response)
        })
        .await?;

        let body = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::pin(tokio_util::io::StreamReader::new(body)))
    }
}

/// A failed upstream fetch attempt.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection, TLS, or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// Upstream responded with a non-2xx status.
    #[error("upstream responded with {0}")]
    Status(StatusCode),
    /// The caller's cancellation token fired mid-fetch.
    #[error("fetch cancelled")]
    Cancelled,
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Transport(e) => e.is_connect() || e.is_timeout(),
        FetchError::Status(code) => {
            matches!(*code, StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT)
        }
        FetchError::Cancelled => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive-bytes".to_vec()))
            .mount(&server)
            .await;

        let fetcher = UpstreamFetcher::new();
        let bytes = fetcher.fetch(&server.uri(), &CancellationToken::new()).await.unwrap();
        assert_eq!(&bytes[..], b"archive-bytes");
    }

    #[tokio::test]
    async fn fetch_retries_502_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let fetcher = UpstreamFetcher::new();
        let bytes = fetcher.fetch(&server.uri(), &CancellationToken::new()).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn fetch_does_not_retry_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = UpstreamFetcher::new();
        let err = fetcher.fetch(&server.uri(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn fetch_stream_yields_the_full_body() {
        use tokio::io::AsyncReadExt;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"streamed-archive".to_vec()))
            .mount(&server)
            .await;

        let fetcher = UpstreamFetcher::new();
        let mut body = fetcher.fetch_stream(&server.uri(), &CancellationToken::new()).await.unwrap();
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await.unwrap();
        assert_eq!(&buf[..], b"streamed-archive");
    }

    #[tokio::test]
    async fn fetch_honors_pre_cancelled_token() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher = UpstreamFetcher::new();
        let err = fetcher.fetch(&server.uri(), &cancel).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
