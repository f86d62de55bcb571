//! Serializable key-material records
//!
//! These are the only shapes in which private key bytes ever leave the
//! execution context — and they travel exactly one hop, to the vault.
//! Fields are base64 strings so the records serialize cleanly to the
//! vault's JSON plaintext.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{
    error::CryptoError,
    identity::IdentityKeyPair,
    suite::{PreKeyPair, SignedPreKeyPair},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPairRecord {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
}

/// Identity material: what the vault persists under `identity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "registrationId")]
    pub registration_id: u32,
    #[serde(rename = "identityKeyPair")]
    pub identity_key_pair: KeyPairRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    #[serde(rename = "keyId")]
    pub key_id: u32,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimePreKeyRecord {
    #[serde(rename = "keyId")]
    pub key_id: u32,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
}

/// Pre-key material: what the vault persists under `preKeys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreKeyRecordSet {
    #[serde(rename = "signedPreKey")]
    pub signed_pre_key: SignedPreKeyRecord,
    #[serde(rename = "oneTimePreKeys", default)]
    pub one_time_pre_keys: Vec<OneTimePreKeyRecord>,
}

// ── Conversions ──────────────────────────────────────────────────────────────

fn b64_to_32(s: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = STANDARD.decode(s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte key".into()))
}

impl IdentityRecord {
    pub fn from_keys(identity: &IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            registration_id,
            identity_key_pair: KeyPairRecord {
                public_key: identity.public_b64(),
                private_key: STANDARD.encode(identity.secret_bytes()),
            },
        }
    }

    pub fn to_keys(&self) -> Result<IdentityKeyPair, CryptoError> {
        IdentityKeyPair::from_bytes(&b64_to_32(&self.identity_key_pair.private_key)?)
    }
}

impl SignedPreKeyRecord {
    pub fn from_keys(spk: &SignedPreKeyPair) -> Self {
        Self {
            key_id: spk.key_pair.key_id,
            public_key: spk.key_pair.public_b64(),
            private_key: STANDARD.encode(spk.key_pair.secret_bytes()),
            signature: STANDARD.encode(&spk.signature),
        }
    }

    pub fn to_pre_key(&self) -> Result<PreKeyPair, CryptoError> {
        Ok(PreKeyPair::from_parts(
            self.key_id,
            b64_to_32(&self.public_key)?,
            b64_to_32(&self.private_key)?,
        ))
    }
}

impl OneTimePreKeyRecord {
    pub fn from_keys(pre_key: &PreKeyPair) -> Self {
        Self {
            key_id: pre_key.key_id,
            public_key: pre_key.public_b64(),
            private_key: STANDARD.encode(pre_key.secret_bytes()),
        }
    }

    pub fn to_pre_key(&self) -> Result<PreKeyPair, CryptoError> {
        Ok(PreKeyPair::from_parts(
            self.key_id,
            b64_to_32(&self.public_key)?,
            b64_to_32(&self.private_key)?,
        ))
    }
}
