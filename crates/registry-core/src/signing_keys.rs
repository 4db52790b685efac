//! Tolerant de/serialization of the `signing-keys.json` document.
//!
//! Two shapes exist in the wild: the current multi-key shape
//! `{"gpg_public_keys": [...]}`, and a legacy shape that is a single bare
//! `GPGPublicKey` object at the document root. `decode` accepts both;
//! `encode` always emits the current shape.

use crate::error::{Error, Result};
use crate::model::{GpgPublicKey, SigningKeys};

/// Decode a `signing-keys.json` document, tolerating the legacy single-key
/// shape.
///
/// Attempts the multi-key shape first. If that yields a non-empty,
/// all-valid sequence, returns it. Otherwise (parse failure or an empty
/// sequence) retries as a bare [`GpgPublicKey`] and lifts a valid result
/// into a one-element sequence. If both attempts fail, or the only
/// recovered key has an empty `key_id`/`ascii_armor`, returns
/// `InvalidArgument`.
pub fn decode(bytes: &[u8]) -> Result<SigningKeys> {
    if let Ok(doc) = serde_json::from_slice::<SigningKeys>(bytes) {
        if !doc.gpg_public_keys.is_empty() {
            return if doc.gpg_public_keys.iter().all(GpgPublicKey::is_valid) {
                Ok(doc)
            } else {
                Err(invalid())
            };
        }
    }

    match serde_json::from_slice::<GpgPublicKey>(bytes) {
        Ok(key) if key.is_valid() => Ok(SigningKeys {
            gpg_public_keys: vec![key],
        }),
        _ => Err(invalid()),
    }
}

/// Encode a [`SigningKeys`] document in the current multi-key shape.
pub fn encode(keys: &SigningKeys) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(keys)
        .map_err(|e| Error::invalid_argument(format!("failed to encode signing keys: {e}")))
}

fn invalid() -> Error {
    Error::invalid_argument(
        "signing-keys.json did not match the multi-key or legacy single-key shape",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> GpgPublicKey {
        GpgPublicKey {
            key_id: "51852D87348FFC4C".into(),
            ascii_armor: "-----BEGIN PGP PUBLIC KEY BLOCK-----".into(),
            trust_signature: None,
            source: None,
            source_url: None,
        }
    }

    #[test]
    fn decode_multi_key_shape() {
        let doc = SigningKeys {
            gpg_public_keys: vec![sample_key()],
        };
        let bytes = encode(&doc).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn decode_legacy_bare_object_lifts_into_one_element_sequence() {
        let bytes = serde_json::to_vec(&sample_key()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.gpg_public_keys, vec![sample_key()]);
    }

    #[test]
    fn decode_legacy_then_encode_produces_multi_key_shape() {
        let bytes = serde_json::to_vec(&sample_key()).unwrap();
        let decoded = decode(&bytes).unwrap();
        let reencoded = encode(&decoded).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&reencoded).unwrap();
        assert!(value.get("gpg_public_keys").is_some());
        assert!(value["gpg_public_keys"].is_array());
    }

    #[test]
    fn decode_empty_sequence_falls_back_to_legacy() {
        let legacy = serde_json::to_vec(&sample_key()).unwrap();
        // A document with an explicit empty array should still try legacy.
        let empty_multi = br#"{"gpg_public_keys": []}"#;
        assert!(decode(empty_multi).is_err());
        assert!(decode(&legacy).is_ok());
    }

    #[test]
    fn decode_rejects_invalid_keys() {
        let bad = br#"{"key_id": "", "ascii_armor": "x"}"#;
        assert!(decode(bad).is_err());
        let bad_json = b"not json at all";
        assert!(decode(bad_json).is_err());
    }

    #[test]
    fn round_trip_property() {
        let doc = SigningKeys {
            gpg_public_keys: vec![sample_key(), GpgPublicKey {
                key_id: "ABCDEF1234567890".into(),
                ascii_armor: "-----BEGIN PGP PUBLIC KEY BLOCK-----second".into(),
                trust_signature: Some("sig".into()),
                source: Some("hashicorp".into()),
                source_url: Some("https://example.com".into()),
            }],
        };
        let bytes = encode(&doc).unwrap();
        assert_eq!(decode(&bytes).unwrap(), doc);
    }
}
