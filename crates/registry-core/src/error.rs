//! Error taxonomy shared by every component that touches storage.
//!
//! The kinds here are the public surface described by the specification's
//! error handling design: callers pattern-match on the kind, never on the
//! underlying SDK error that caused it.

use miette::Diagnostic;
use thiserror::Error;

/// Errors produced by the key layout, artifact model, signing-key codec,
/// checksum index, provider collector, storage façade, discovery resolver
/// and mirror pull coordinator.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Caller passed malformed or incomplete arguments; rejected without I/O.
    #[error("invalid argument: {message}")]
    #[diagnostic(code(registry::invalid_argument))]
    InvalidArgument {
        /// Human-readable description of what was invalid.
        message: String,
    },

    /// The requested object or record does not exist.
    #[error("not found: {what}")]
    #[diagnostic(code(registry::not_found))]
    NotFound {
        /// Description of the missing object (usually a key or identity tuple).
        what: String,
    },

    /// A non-overwriting `put` raced a concurrent writer and lost.
    #[error("already exists: {what}")]
    #[diagnostic(code(registry::already_exists))]
    AlreadyExists {
        /// Description of the object that already existed.
        what: String,
    },

    /// A backend listing operation failed for a reason that is not itself
    /// one of the other specific kinds.
    #[error("list failed: {message}")]
    #[diagnostic(code(registry::list_failed))]
    ListFailed {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A backend write operation failed for a reason that is not itself
    /// `AlreadyExists`.
    #[error("upload failed: {message}")]
    #[diagnostic(code(registry::upload_failed))]
    UploadFailed {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested provider has not been mirrored. Distinguished from
    /// `NotFound` because protocol handlers answer differently (cache-miss
    /// vs. hard 404).
    #[error("not mirrored: {fingerprint}")]
    #[diagnostic(code(registry::not_mirrored))]
    NotMirrored {
        /// The mirror fingerprint that was requested.
        fingerprint: String,
    },

    /// Any other adapter, HTTP, or backend failure, tagged with the
    /// constituent (e.g. "archive", "shasums", "signing-keys") that failed
    /// so downstream log/metric consumers can distinguish without
    /// string-matching.
    #[error("backend failure ({which}): {message}")]
    #[diagnostic(code(registry::backend_failure))]
    BackendFailure {
        /// Which constituent or subsystem failed.
        which: String,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Build an [`Error::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Build an [`Error::NotFound`].
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Build an [`Error::AlreadyExists`].
    #[must_use]
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Build an [`Error::ListFailed`] with no underlying cause.
    #[must_use]
    pub fn list_failed(message: impl Into<String>) -> Self {
        Self::ListFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Build an [`Error::ListFailed`] carrying an underlying cause.
    pub fn list_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ListFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an [`Error::UploadFailed`] with no underlying cause.
    #[must_use]
    pub fn upload_failed(message: impl Into<String>) -> Self {
        Self::UploadFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Build an [`Error::UploadFailed`] carrying an underlying cause.
    pub fn upload_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::UploadFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an [`Error::NotMirrored`].
    #[must_use]
    pub fn not_mirrored(fingerprint: impl Into<String>) -> Self {
        Self::NotMirrored {
            fingerprint: fingerprint.into(),
        }
    }

    /// Build an [`Error::BackendFailure`] tagged with the failing constituent.
    #[must_use]
    pub fn backend_failure(which: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            which: which.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Build an [`Error::BackendFailure`] carrying an underlying cause.
    pub fn backend_failure_with_source(
        which: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::BackendFailure {
            which: which.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True if this is the specific `integrity` subcase of `BackendFailure`
    /// that the mirror pull coordinator raises when a checksum mismatches.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::BackendFailure { which, .. } if which == "integrity")
    }

    /// True if this is the specific `signature` subcase of `BackendFailure`
    /// that the mirror pull coordinator raises when PGP verification fails.
    #[must_use]
    pub fn is_signature_failure(&self) -> bool {
        matches!(self, Self::BackendFailure { which, .. } if which == "signature")
    }
}

/// Result type used throughout the storage core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_message_roundtrips() {
        let err = Error::invalid_argument("namespace must not be empty");
        assert_eq!(err.to_string(), "invalid argument: namespace must not be empty");
    }

    #[test]
    fn integrity_and_signature_subcases_are_distinguishable() {
        let integrity = Error::backend_failure("integrity", "checksum mismatch");
        let signature = Error::backend_failure("signature", "bad signature");
        let other = Error::backend_failure("shasums", "missing constituent");

        assert!(integrity.is_integrity_failure());
        assert!(!integrity.is_signature_failure());
        assert!(signature.is_signature_failure());
        assert!(!signature.is_integrity_failure());
        assert!(!other.is_integrity_failure() && !other.is_signature_failure());
    }

    #[test]
    fn not_mirrored_is_distinct_from_not_found() {
        let a = Error::not_mirrored("registry.terraform.io/hashicorp/random/3.1.0/linux/amd64");
        let b = Error::not_found("archive");
        assert!(matches!(a, Error::NotMirrored { .. }));
        assert!(matches!(b, Error::NotFound { .. }));
    }
}
