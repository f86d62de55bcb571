//! Pre-key bundle transport
//!
//! Bundles are published as base64-encoded JSON — the same opaque-string
//! convention as envelopes, so the transport never needs to understand key
//! material. Decoding validates the mandatory fields (identity key + signed
//! pre-key); one-time pre-keys are optional.

use base64::{engine::general_purpose::STANDARD, Engine};
use ng_crypto::PreKeyBundle;

use crate::error::ProtoError;

/// Serialise a bundle for publication.
pub fn encode_bundle(bundle: &PreKeyBundle) -> Result<String, ProtoError> {
    let json = serde_json::to_vec(bundle)?;
    Ok(STANDARD.encode(json))
}

/// Parse and validate a published bundle.
pub fn decode_bundle(serialised: &str) -> Result<PreKeyBundle, ProtoError> {
    let json = STANDARD
        .decode(serialised)
        .map_err(|_| ProtoError::InvalidBundle("not base64".into()))?;
    let bundle: PreKeyBundle = serde_json::from_slice(&json)
        .map_err(|e| ProtoError::InvalidBundle(e.to_string()))?;
    bundle
        .validate()
        .map_err(|e| ProtoError::InvalidBundle(e.to_string()))?;
    Ok(bundle)
}
