//! Mirror Pull Coordinator: the cache-miss path for the Provider Network
//! Mirror protocol. Discovers an upstream registry, fetches and verifies a
//! provider release, and commits it into the mirror namespace exactly once
//! even under concurrent callers.

mod coordinator;
mod fetch;
mod retry;
mod verify;

pub use coordinator::{MirrorPullCoordinator, MirrorRequest};
pub use fetch::{FetchError, UpstreamFetcher};
pub use verify::{verify_checksum, verify_signature, HashingReader};
