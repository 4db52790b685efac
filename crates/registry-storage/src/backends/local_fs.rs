//! Local-filesystem backend, plus its embedded presign file server.
//!
//! Every other backend trades a real store for a TTL-bearing request to a
//! cloud SDK; the filesystem has neither presigning nor an atomic
//! compare-and-create, so this adapter substitutes two things: an
//! in-process `axum` static file server standing in for presigned URLs,
//! and a [`parking_lot::RwLock`] serializing writes that would otherwise
//! race at the filesystem level.

use crate::backend::{Backend, ByteStream, KeyPageStream};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use registry_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Local-filesystem object store, rooted at a directory on disk.
pub struct LocalFsBackend {
    root: PathBuf,
    /// Serializes writes so a check-then-create is effectively atomic
    /// within this process; does not help across processes sharing the
    /// same directory, which the spec does not require it to.
    write_lock: Arc<RwLock<()>>,
    public_base_url: String,
}

impl LocalFsBackend {
    /// Builds the adapter and, if `bind_address` is set, starts the
    /// embedded file server in the background. A bind failure is
    /// error-logged but not fatal, matching the spec's lifecycle note:
    /// presigning fails at call time instead.
    pub async fn new(
        root: impl Into<PathBuf>,
        bind_address: Option<&str>,
        public_base_url: Option<String>,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            Error::backend_failure_with_source("local", format!("create root {root:?}"), e)
        })?;

        let resolved_base = match (bind_address, &public_base_url) {
            (_, Some(url)) => url.clone(),
            (Some(addr), None) => format!("http://{addr}"),
            (None, None) => String::new(),
        };

        if let Some(addr) = bind_address {
            spawn_file_server(root.clone(), addr.to_string());
        }

        Ok(Self {
            root,
            write_lock: Arc::new(RwLock::new(())),
            public_base_url: resolved_base,
        })
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

fn spawn_file_server(root: PathBuf, bind_address: String) {
    tokio::spawn(async move {
        let app = axum::Router::new()
            .fallback_service(tower_http::services::ServeDir::new(&root));
        let listener = match TcpListener::bind(&bind_address).await {
            Ok(l) => l,
            Err(e) => {
                error!(address = %bind_address, error = %e, "failed to bind embedded presign file server");
                return;
            }
        };
        info!(address = %bind_address, root = %root.display(), "embedded presign file server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "embedded presign file server exited");
        }
    });
}

#[async_trait]
impl Backend for LocalFsBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::metadata(self.resolve(key)).await.is_ok())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("object {key}")))
            }
            Err(e) => Err(Error::backend_failure_with_source("local", format!("get {key}"), e)),
        }
    }

    async fn open(&self, key: &str) -> Result<ByteStream> {
        let path = self.resolve(key);
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("object {key}")))
            }
            Err(e) => Err(Error::backend_failure_with_source("local", format!("open {key}"), e)),
        }
    }

    async fn put(&self, key: &str, body: Bytes, overwrite: bool) -> Result<()> {
        let path = self.resolve(key);
        let _guard = self.write_lock.write();

        if !overwrite && fs::metadata(&path).await.is_ok() {
            return Err(Error::already_exists(format!("object {key}")));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::backend_failure_with_source("local", format!("mkdir for {key}"), e)
            })?;
        }

        let tmp = tmp_path_for(&path);
        fs::write(&tmp, &body)
            .await
            .map_err(|e| Error::backend_failure_with_source("local", format!("write {key}"), e))?;

        fs::rename(&tmp, &path).await.map_err(|e| {
            Error::backend_failure_with_source("local", format!("commit rename for {key}"), e)
        })
    }

    async fn put_stream(&self, key: &str, mut body: ByteStream, overwrite: bool) -> Result<()> {
        let path = self.resolve(key);
        let _guard = self.write_lock.write();

        if !overwrite && fs::metadata(&path).await.is_ok() {
            return Err(Error::already_exists(format!("object {key}")));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::backend_failure_with_source("local", format!("mkdir for {key}"), e)
            })?;
        }

        let tmp = tmp_path_for(&path);
        let mut file = fs::File::create(&tmp).await.map_err(|e| {
            Error::backend_failure_with_source("local", format!("create {key}"), e)
        })?;
        tokio::io::copy(&mut body, &mut file).await.map_err(|e| {
            Error::backend_failure_with_source("local", format!("write {key}"), e)
        })?;
        file.sync_all().await.map_err(|e| {
            Error::backend_failure_with_source("local", format!("sync {key}"), e)
        })?;
        drop(file);

        fs::rename(&tmp, &path).await.map_err(|e| {
            Error::backend_failure_with_source("local", format!("commit rename for {key}"), e)
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key);
        match fs::remove_file(&path).await {
            Ok(()) | Err(_) if !path.exists() => Ok(()),
            Err(e) => {
                warn!(key, error = %e, "failed to delete object during rollback");
                Err(Error::backend_failure_with_source("local", format!("delete {key}"), e))
            }
        }
    }

    async fn list(&self, prefix: &str, cancel: CancellationToken) -> Result<KeyPageStream> {
        const PAGE_SIZE: usize = 1000;
        let root = self.root.clone();
        let mut keys = Vec::new();
        walk(&root, &root.join(prefix), &mut keys, &cancel).await?;
        let pages: Vec<Result<Vec<String>>> = keys
            .chunks(PAGE_SIZE)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(Box::pin(tokio_stream::iter(pages)))
    }

    async fn presign(&self, key: &str, _ttl: std::time::Duration) -> Result<String> {
        if self.public_base_url.is_empty() {
            return Err(Error::invalid_argument(
                "local filesystem backend has no embedded file server configured",
            ));
        }
        Ok(format!("{}/{key}", self.public_base_url.trim_end_matches('/')))
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn walk<'a>(
    root: &'a Path,
    dir: &'a Path,
    out: &'a mut Vec<String>,
    cancel: &'a CancellationToken,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(Error::invalid_argument("listing cancelled"));
        }
        let mut entries = match fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(Error::list_failed_with_source(format!("readdir {dir:?}"), e));
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::list_failed_with_source(format!("readdir entry in {dir:?}"), e))?
        {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out, cancel).await?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        backend.put("a/b.txt", Bytes::from_static(b"hello"), true).await.unwrap();
        assert_eq!(backend.get("a/b.txt").await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn non_overwrite_put_on_existing_key_is_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        backend.put("k", Bytes::from_static(b"1"), false).await.unwrap();
        let err = backend.put("k", Bytes::from_static(b"2"), false).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn put_stream_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        let body: ByteStream = Box::pin(std::io::Cursor::new(b"streamed".as_slice()));
        backend.put_stream("a/b.txt", body, true).await.unwrap();
        assert_eq!(backend.get("a/b.txt").await.unwrap(), Bytes::from_static(b"streamed"));
    }

    #[tokio::test]
    async fn non_overwrite_put_stream_on_existing_key_is_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        backend.put("k", Bytes::from_static(b"1"), false).await.unwrap();
        let body: ByteStream = Box::pin(std::io::Cursor::new(b"2".as_slice()));
        let err = backend.put_stream("k", body, false).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        let err = backend.get("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn exists_is_false_for_missing_and_true_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        assert!(!backend.exists("k").await.unwrap());
        backend.put("k", Bytes::from_static(b"x"), true).await.unwrap();
        assert!(backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn list_returns_keys_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        backend.put("providers/hashicorp/random/f1", Bytes::from_static(b"1"), true).await.unwrap();
        backend.put("providers/hashicorp/random/f2", Bytes::from_static(b"2"), true).await.unwrap();

        let mut stream = backend.list("providers/hashicorp/random", CancellationToken::new()).await.unwrap();
        use futures::StreamExt;
        let mut keys = Vec::new();
        while let Some(page) = stream.next().await {
            keys.extend(page.unwrap());
        }
        keys.sort();
        assert_eq!(keys, vec!["providers/hashicorp/random/f1", "providers/hashicorp/random/f2"]);
    }

    #[tokio::test]
    async fn presign_without_server_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, None).await.unwrap();
        let err = backend.presign("k", std::time::Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn presign_with_public_base_url_composes_url() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path(), None, Some("https://cdn.example".into())).await.unwrap();
        let url = backend.presign("providers/a/b", std::time::Duration::from_secs(60)).await.unwrap();
        assert_eq!(url, "https://cdn.example/providers/a/b");
    }
}
