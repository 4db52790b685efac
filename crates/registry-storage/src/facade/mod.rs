//! Storage Façade: a thin composition over the key layout, artifact model,
//! signing-key codec, checksum index, and provider collector that exposes
//! the three capability sets external protocol handlers use.
//!
//! The façade itself owns no long-lived mutable state beyond the backend
//! handle and the presign TTL; it pushes nothing backend-specific down
//! into adapters (no multi-object reads, no presign URL composition there)
//! so new backends stay small.

mod bundle;
mod mirror;
mod module;
mod provider;

pub use mirror::{MirrorProviderQuery, MirrorStore};
pub use module::ModuleStore;
pub use provider::ProviderStore;

use crate::backend::Backend;
use registry_core::key_layout::KeyLayoutConfig;
use std::sync::Arc;
use std::time::Duration;

/// Composition root implementing [`ModuleStore`], [`ProviderStore`], and
/// [`MirrorStore`] over one backend.
pub struct StorageFacade {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) key_layout: KeyLayoutConfig,
    pub(crate) presign_ttl: Duration,
}

impl StorageFacade {
    /// Builds a façade over `backend`, keyed under `key_layout`, presigning
    /// URLs with `presign_ttl`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, key_layout: KeyLayoutConfig, presign_ttl: Duration) -> Self {
        Self {
            backend,
            key_layout,
            presign_ttl,
        }
    }
}
