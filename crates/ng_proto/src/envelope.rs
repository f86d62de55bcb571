//! Encrypted message envelope — the one ciphertext unit the transport sees.
//!
//! Inner shape: `{ "type": <u8 tag>, "body": <base64 bytes> }`, serialised
//! to JSON and base64-encoded again into a single opaque string. The outer
//! representation is canonical base64, carries no plaintext, and the type
//! tag is all a recipient needs to pick the decryption path (pre-key
//! message vs ordinary chain message).

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{b64, error::ProtoError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Session message type tag.
    #[serde(rename = "type")]
    pub kind: u8,
    /// Ciphertext bytes, base64.
    pub body: String,
}

impl Envelope {
    pub fn new(kind: u8, body_bytes: &[u8]) -> Self {
        Self { kind, body: STANDARD.encode(body_bytes) }
    }

    /// Serialise to the opaque wire string (base64 of the JSON form).
    pub fn encode(&self) -> Result<String, ProtoError> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Parse the opaque wire string. Both layers must be canonical base64.
    pub fn decode(serialised: &str) -> Result<Self, ProtoError> {
        if !b64::is_canonical(serialised) {
            return Err(ProtoError::InvalidEnvelope("outer layer is not canonical base64".into()));
        }
        let json = STANDARD.decode(serialised)?;
        let envelope: Envelope = serde_json::from_slice(&json)?;
        if !b64::is_canonical(&envelope.body) {
            return Err(ProtoError::InvalidEnvelope("body is not canonical base64".into()));
        }
        Ok(envelope)
    }

    /// Decode the body to raw ciphertext bytes.
    pub fn body_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(STANDARD.decode(&self.body)?)
    }
}
