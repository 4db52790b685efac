//! Pure, I/O-free core of the Terraform/OpenTofu registry storage layer:
//! key layout, artifact data model, signing-key codec, checksum index,
//! provider collector, and the shared error taxonomy.
//!
//! Everything in this crate is deterministic and side-effect free so it can
//! be property-tested without mocking a backend. Backend I/O lives in
//! `registry-storage`.

pub mod checksum;
pub mod collector;
pub mod error;
pub mod key_layout;
pub mod model;
pub mod signing_keys;

pub use error::{Error, Result};
pub use key_layout::{KeyLayoutConfig, ParsedArchiveName, ProviderKind, ProviderPaths};
pub use model::{
    DiscoveredRemoteService, GpgPublicKey, Module, Platform, Provider, ProviderVersion,
    Sha256Sums, SigningKeys,
};
