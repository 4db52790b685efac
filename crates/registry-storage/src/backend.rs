//! The small blob vocabulary every storage backend implements: existence
//! checks, buffered and streamed reads and writes, non-atomic-but-conditional
//! puts, paginated listing, and presigning. One `OnceCell`-guarded adapter
//! per backend.

use async_trait::async_trait;
use bytes::Bytes;
use registry_core::{Error, Result};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// A lazily-read byte stream, boxed so every adapter can return its own
/// concrete reader behind one type.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// A lazily-paginated sequence of keys. Each item is one page.
pub type KeyPageStream =
    Pin<Box<dyn futures::Stream<Item = Result<Vec<String>>> + Send>>;

/// The object-store vocabulary every backend adapter implements.
///
/// No adapter may retry internally; `BackendFailure` propagates to the
/// caller, which decides retry policy (the Storage Façade, for core
/// operations; the Mirror Pull Coordinator, for upstream fetches).
#[async_trait]
pub trait Backend: Send + Sync {
    /// A short, stable tag identifying this backend in error messages
    /// (e.g. `"s3"`, `"azure"`, `"local"`).
    fn kind(&self) -> &'static str;

    /// `true`/`false`. A backend "not found" is not an error; other
    /// failures map to `BackendFailure`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Returns the full object body. Missing object maps to `NotFound`.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Returns a lazily-read stream over the object body, for archives too
    /// large to buffer. Missing object maps to `NotFound`.
    async fn open(&self, key: &str) -> Result<ByteStream>;

    /// Writes `body` to `key`. If `overwrite` is `false` and the key
    /// already exists, returns `AlreadyExists`. Check-then-put is not
    /// assumed atomic across backends; concurrent writers may both pass
    /// an existence check and race at the underlying store, in which case
    /// exactly one `put` succeeds and the rest see `AlreadyExists`.
    ///
    /// Reserved for objects small enough to hold in memory: checksum
    /// indexes, detached signatures, the signing-key bundle. Archive
    /// bodies go through [`Backend::put_stream`] instead.
    async fn put(&self, key: &str, body: Bytes, overwrite: bool) -> Result<()>;

    /// Writes `body` to `key` from a lazily-read stream, for archives too
    /// large to buffer whole. Same `overwrite` semantics as
    /// [`Backend::put`]. The default implementation drains the stream into
    /// memory and delegates to `put`; adapters whose client accepts a
    /// plain byte sink (the local filesystem) override it to write
    /// incrementally instead.
    async fn put_stream(&self, key: &str, mut body: ByteStream, overwrite: bool) -> Result<()> {
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await.map_err(|e| {
            Error::backend_failure_with_source(self.kind(), format!("read stream for {key}"), e)
        })?;
        self.put(key, Bytes::from(buf), overwrite).await
    }

    /// Deletes an object. Used only for best-effort rollback after a
    /// failed mirror commit; missing object is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Lists keys under `prefix` as a cancellable, restartable sequence of
    /// pages. The underlying listing's pagination cursor is internal to
    /// the adapter; callers see only completed pages.
    async fn list(&self, prefix: &str, cancel: CancellationToken) -> Result<KeyPageStream>;

    /// Returns a time-limited URL authorizing a GET on `key`, if this
    /// backend supports presigning. Backends without native presigning
    /// (e.g. local filesystem) compose one from an embedded server.
    async fn presign(&self, key: &str, ttl: std::time::Duration) -> Result<String>;
}

/// Helper for adapters translating an I/O-style "not found" outcome.
pub(crate) fn not_found(key: &str) -> Error {
    Error::not_found(format!("object {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio_stream::wrappers::ReceiverStream;

    /// Records whatever `put` receives; every other method is unreachable
    /// for these tests. Stands in for the cloud adapters, which all rely
    /// on `Backend`'s default `put_stream`.
    #[derive(Default)]
    struct RecordingBackend {
        last_put: Mutex<Option<(String, Bytes, bool)>>,
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        fn kind(&self) -> &'static str {
            "recording"
        }
        async fn exists(&self, _key: &str) -> Result<bool> {
            unreachable!()
        }
        async fn get(&self, _key: &str) -> Result<Bytes> {
            unreachable!()
        }
        async fn open(&self, _key: &str) -> Result<ByteStream> {
            unreachable!()
        }
        async fn put(&self, key: &str, body: Bytes, overwrite: bool) -> Result<()> {
            *self.last_put.lock() = Some((key.to_string(), body, overwrite));
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            unreachable!()
        }
        async fn list(&self, _prefix: &str, _cancel: CancellationToken) -> Result<KeyPageStream> {
            unreachable!()
        }
        async fn presign(&self, _key: &str, _ttl: std::time::Duration) -> Result<String> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn default_put_stream_drains_the_reader_and_delegates_to_put() {
        let backend = RecordingBackend::default();
        let body: ByteStream = Box::pin(std::io::Cursor::new(b"archive bytes".as_slice()));
        backend.put_stream("providers/archive.zip", body, false).await.unwrap();

        let (key, body, overwrite) = backend.last_put.lock().take().unwrap();
        assert_eq!(key, "providers/archive.zip");
        assert_eq!(&body[..], b"archive bytes");
        assert!(!overwrite);
    }

    #[tokio::test]
    async fn default_put_stream_handles_a_reader_backed_by_an_async_channel() {
        let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(2);
        tx.send(Ok(Bytes::from_static(b"chunk-one-"))).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"chunk-two"))).await.unwrap();
        drop(tx);

        let body: ByteStream = Box::pin(tokio_util::io::StreamReader::new(ReceiverStream::new(rx)));
        let backend = RecordingBackend::default();
        backend.put_stream("k", body, true).await.unwrap();

        let (_, body, _) = backend.last_put.lock().take().unwrap();
        assert_eq!(&body[..], b"chunk-one-chunk-two");
    }
}
