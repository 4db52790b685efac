//! The module-store capability set: lookup, version listing, and upload of
//! module archives.

use super::StorageFacade;
use crate::backend::ByteStream;
use async_trait::async_trait;
use futures::StreamExt;
use registry_core::key_layout;
use registry_core::{Error, Module, Result};

/// Operations protocol handlers use to serve the Module Registry protocol.
#[async_trait]
pub trait ModuleStore {
    /// Looks up one module archive. `NotFound` if it has not been uploaded.
    async fn get_module(&self, ns: &str, name: &str, provider: &str, version: &str) -> Result<Module>;

    /// Lists every version of a module. Keys under the module's prefix
    /// that do not parse as a module archive (e.g. migration markers) are
    /// silently skipped rather than failing the whole listing.
    async fn list_module_versions(&self, ns: &str, name: &str, provider: &str) -> Result<Vec<Module>>;

    /// Uploads a module archive from a lazily-read stream. Fails with
    /// `AlreadyExists` if the target key is already occupied.
    async fn upload_module(
        &self,
        ns: &str,
        name: &str,
        provider: &str,
        version: &str,
        body: ByteStream,
    ) -> Result<Module>;
}

#[async_trait]
impl ModuleStore for StorageFacade {
    async fn get_module(&self, ns: &str, name: &str, provider: &str, version: &str) -> Result<Module> {
        let key = key_layout::module_path(&self.key_layout, ns, name, provider, version)?;
        if !self.backend.exists(&key).await? {
            return Err(Error::not_found(format!("module {ns}/{name}/{provider}/{version}")));
        }
        let download_url = self.backend.presign(&key, self.presign_ttl).await?;
        Ok(Module::new(ns, name, provider, version).with_download_url(download_url))
    }

    async fn list_module_versions(&self, ns: &str, name: &str, provider: &str) -> Result<Vec<Module>> {
        let prefix = key_layout::module_prefix(&self.key_layout, ns, name, provider)?;
        let mut pages = self
            .backend
            .list(&prefix, tokio_util::sync::CancellationToken::new())
            .await?;

        let mut modules = Vec::new();
        while let Some(page) = pages.next().await {
            for key in page? {
                let filename = key.rsplit('/').next().unwrap_or(&key);
                if let Some(version) = key_layout::parse_module_filename(&self.key_layout, ns, name, provider, filename) {
                    modules.push(Module::new(ns, name, provider, version));
                }
            }
        }
        Ok(modules)
    }

    async fn upload_module(
        &self,
        ns: &str,
        name: &str,
        provider: &str,
        version: &str,
        body: ByteStream,
    ) -> Result<Module> {
        let key = key_layout::module_path(&self.key_layout, ns, name, provider, version)?;
        self.backend.put_stream(&key, body, false).await?;
        Ok(Module::new(ns, name, provider, version))
    }
}
