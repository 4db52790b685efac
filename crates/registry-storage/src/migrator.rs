//! Rewrites objects stored under the pre-split `namespace=<v>/name=<v>/…`
//! layered-metadata layout into the current key hierarchy (§4.1).
//!
//! Idempotent by construction: `apply` performs a non-overwriting copy, so
//! a key already present at its current-layout destination is left alone
//! and counted as already-migrated rather than re-copied.

use crate::backend::Backend;
use async_trait::async_trait;
use futures::StreamExt;
use registry_core::key_layout::{self, KeyLayoutConfig, ProviderKind};
use registry_core::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One legacy object's parsed metadata plus its resolved current-layout key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Legacy-layout key.
    pub source_key: String,
    /// Current-layout key the object should be copied to.
    pub dest_key: String,
}

/// Outcome of running the migrator over one legacy prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Plans that were found eligible (source parsed, destination absent
    /// at the start of the run).
    pub planned: Vec<MigrationPlan>,
    /// Source keys skipped because they did not match the legacy
    /// `key=value/` metadata shape.
    pub skipped_unparsable: Vec<String>,
    /// Destinations that already existed; counted as already migrated.
    pub already_migrated: Vec<String>,
}

/// Migrates a bucket's `modules` or `providers` subtree from the legacy
/// layered-metadata layout to the current hierarchy.
pub struct LegacyMigrator {
    backend: Arc<dyn Backend>,
    key_layout: KeyLayoutConfig,
}

#[async_trait]
trait CopySink {
    async fn copy_conditional(&self, source_key: &str, dest_key: &str) -> Result<bool>;
}

#[async_trait]
impl CopySink for dyn Backend {
    async fn copy_conditional(&self, source_key: &str, dest_key: &str) -> Result<bool> {
        if self.exists(dest_key).await? {
            return Ok(false);
        }
        let body = self.open(source_key).await?;
        match self.put_stream(dest_key, body, false).await {
            Ok(()) => Ok(true),
            Err(Error::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl LegacyMigrator {
    /// Builds a migrator over `backend`, using `key_layout` to compute
    /// current-layout destination keys.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, key_layout: KeyLayoutConfig) -> Self {
        Self { backend, key_layout }
    }

    /// Walks `legacy_prefix` (e.g. `providers` or `modules`), parses each
    /// key's `key=value/` metadata segments, and plans a copy to the
    /// current-layout key. Does not mutate anything; callers pass the
    /// resulting plan to [`Self::apply`].
    pub async fn plan(&self, legacy_prefix: &str, cancel: CancellationToken) -> Result<MigrationReport> {
        let mut pages = self.backend.list(legacy_prefix, cancel).await?;
        let mut report = MigrationReport::default();

        while let Some(page) = pages.next().await {
            for key in page? {
                match parse_legacy_key(&key, &self.key_layout) {
                    Some(dest_key) => {
                        if self.backend.exists(&dest_key).await? {
                            report.already_migrated.push(dest_key);
                        } else {
                            report.planned.push(MigrationPlan { source_key: key, dest_key });
                        }
                    }
                    None => report.skipped_unparsable.push(key),
                }
            }
        }
        Ok(report)
    }

    /// Logs the intended copy pairs without mutating storage.
    pub async fn dry_run(&self, legacy_prefix: &str, cancel: CancellationToken) -> Result<MigrationReport> {
        let report = self.plan(legacy_prefix, cancel).await?;
        for plan in &report.planned {
            info!(source = %plan.source_key, dest = %plan.dest_key, "would migrate (dry run)");
        }
        Ok(report)
    }

    /// Performs the migration: a non-overwriting copy per planned pair.
    /// Re-running after a successful migration finds nothing eligible,
    /// since every destination it created is skipped by [`Self::plan`] on
    /// the next run.
    pub async fn apply(&self, legacy_prefix: &str, cancel: CancellationToken) -> Result<MigrationReport> {
        let report = self.plan(legacy_prefix, cancel).await?;
        for plan in &report.planned {
            match self.backend.copy_conditional(&plan.source_key, &plan.dest_key).await {
                Ok(true) => info!(source = %plan.source_key, dest = %plan.dest_key, "migrated"),
                Ok(false) => info!(dest = %plan.dest_key, "destination appeared concurrently, skipping"),
                Err(e) => warn!(source = %plan.source_key, dest = %plan.dest_key, error = %e, "migration copy failed"),
            }
        }
        Ok(report)
    }
}

/// Parses a legacy `namespace=<v>/name=<v>/provider=<v>/version=<v>/<file>`
/// key into its current-layout equivalent. Returns `None` (not an error)
/// for keys that do not match the legacy shape, so a mixed-layout prefix
/// migrates only its eligible members.
fn parse_legacy_key(key: &str, cfg: &KeyLayoutConfig) -> Option<String> {
    let mut namespace = None;
    let mut name = None;
    let mut provider = None;
    let mut version = None;
    let mut filename = None;

    let segments: Vec<&str> = key.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if let Some((field, value)) = segment.split_once('=') {
            match field {
                "namespace" => namespace = Some(value.to_string()),
                "name" => name = Some(value.to_string()),
                "provider" => provider = Some(value.to_string()),
                "version" => version = Some(value.to_string()),
                _ => return None,
            }
        } else if i == segments.len() - 1 {
            filename = Some(segment.to_string());
        }
    }

    let (ns, name, version, filename) = (namespace?, name?, version?, filename?);

    if let Some(provider) = provider {
        // Module layout: namespace=/name=/provider=/version=/<file>.
        let dest_prefix = key_layout::module_prefix(cfg, &ns, &name, &provider).ok()?;
        Some(format!("{dest_prefix}/{filename}"))
    } else {
        // Provider layout: namespace=/name=/version=/<file>.
        let dest_prefix = key_layout::prefix_for(cfg, ProviderKind::Internal, "", &ns, &name).ok()?;
        Some(format!("{dest_prefix}/{filename}"))
    }
}
