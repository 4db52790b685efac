//! Integrity and signature verification for one mirrored release: the SHA-256
//! digest check against the `Checksum Index`, and the detached PGP signature
//! check over the raw `SHA256SUMS` bytes against a stored keyring.

use registry_core::model::GpgPublicKey;
use registry_core::{Error, Result};
use registry_storage::backend::ByteStream;
use sequoia_openpgp::cert::Cert;
use sequoia_openpgp::parse::stream::{DetachedVerifierBuilder, MessageLayer, MessageStructure, VerificationHelper};
use sequoia_openpgp::parse::Parse;
use sequoia_openpgp::policy::StandardPolicy;
use sequoia_openpgp::KeyHandle;
use sha2::{Digest, Sha256};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Computes the archive's SHA-256 digest and compares it against the digest
/// the checksum index recorded for `archive_filename`. Mismatch raises the
/// `integrity` subcase of `BackendFailure`.
pub fn verify_checksum(archive: &[u8], expected_hex_digest: &str, archive_filename: &str) -> Result<()> {
    let mut hasher = Sha256::new();
    hasher.update(archive);
    let actual = hex::encode(hasher.finalize());

    if actual.eq_ignore_ascii_case(expected_hex_digest) {
        Ok(())
    } else {
        Err(Error::backend_failure(
            "integrity",
            format!("{archive_filename}: checksum mismatch, expected {expected_hex_digest} got {actual}"),
        ))
    }
}

/// Verifies the detached signature over `signed_bytes` (the raw `SHA256SUMS`
/// file) against the namespace's stored signing keys. Succeeds if any key in
/// `keys` verifies the signature. Failure raises the `signature` subcase of
/// `BackendFailure`.
pub fn verify_signature(signed_bytes: &[u8], signature_bytes: &[u8], keys: &[GpgPublicKey]) -> Result<()> {
    let policy = StandardPolicy::new();

    for key in keys {
        let Ok(cert) = Cert::from_bytes(key.ascii_armor.as_bytes()) else {
            continue;
        };
        let helper = SingleCertHelper { cert: &cert };
        let verified = DetachedVerifierBuilder::from_bytes(signature_bytes)
            .and_then(|builder| builder.with_policy(&policy, None, helper))
            .and_then(|mut verifier| verifier.verify_bytes(signed_bytes));
        if verified.is_ok() {
            return Ok(());
        }
    }

    Err(Error::backend_failure(
        "signature",
        "SHA256SUMS signature did not verify against any stored signing key",
    ))
}

/// A stream passthrough that digests bytes as they are read, so an archive
/// can be checksum-verified while it streams into storage instead of being
/// buffered once for hashing and again for the write. The digest is only
/// meaningful once the wrapped reader has reached EOF; read it out of
/// `digest_cell` after the stream has been fully drained.
pub struct HashingReader {
    inner: ByteStream,
    hasher: Sha256,
    digest_cell: Arc<Mutex<Option<String>>>,
}

impl HashingReader {
    /// Wraps `inner`, publishing the running digest into `digest_cell` once
    /// the stream is exhausted.
    pub fn new(inner: ByteStream, digest_cell: Arc<Mutex<Option<String>>>) -> Self {
        Self { inner, hasher: Sha256::new(), digest_cell }
    }
}

impl AsyncRead for HashingReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = this.inner.as_mut().poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let new_bytes = &buf.filled()[before..];
            if new_bytes.is_empty() {
                let digest = hex::encode(this.hasher.clone().finalize());
                *this.digest_cell.lock().expect("hashing reader mutex poisoned") = Some(digest);
            } else {
                this.hasher.update(new_bytes);
            }
        }
        poll
    }
}

struct SingleCertHelper<'a> {
    cert: &'a Cert,
}

impl VerificationHelper for SingleCertHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> sequoia_openpgp::Result<Vec<Cert>> {
        Ok(vec![self.cert.clone()])
    }

    fn check(&mut self, structure: MessageStructure) -> sequoia_openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    result.map_err(|e| anyhow::anyhow!("signature verification failed: {e}"))?;
                }
            }
        }
        Ok(())
    }
}
