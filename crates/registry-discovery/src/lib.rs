//! Remote Service Discovery resolver: memoized `.well-known/terraform.json`
//! lookups with redirect-aware host rewriting.
//!
//! Depended on only by the Mirror Pull Coordinator, which needs a mirrored
//! host's `providers.v1` path before it can fetch an upstream archive.

mod resolver;

pub use resolver::{DiscoverHost, ServiceDiscovery};
