//! At-rest vault object and its plaintext shape.
//!
//! Exactly one `VaultObject` exists per store. KDF parameters (salt,
//! iteration count, hash) and the cipher IV live *next to* the ciphertext
//! and are always read back from the stored record — never assumed from
//! current defaults — so vaults written under older settings stay
//! decryptable.

use serde::{Deserialize, Serialize};

use ng_crypto::material::{IdentityRecord, PreKeyRecordSet};

pub const VAULT_VERSION: u32 = 1;
pub const KDF_ALGORITHM: &str = "PBKDF2";
pub const KDF_HASH: &str = "SHA-256";
pub const CIPHER_ALGORITHM: &str = "AES-GCM";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub name: String,
    pub hash: String,
    pub iterations: u32,
    /// 16-byte random salt, base64. Fresh per write.
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    pub name: String,
    /// 12-byte random IV, base64. Fresh per write.
    pub iv: String,
}

/// The single durable record of a vault store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultObject {
    #[serde(rename = "v")]
    pub version: u32,
    pub kdf: KdfParams,
    pub cipher: CipherParams,
    /// AES-GCM ciphertext + tag, base64.
    #[serde(rename = "ct")]
    pub ciphertext: String,
}

/// Decrypted vault contents. Starts as an empty shell; read-modify-write
/// operations merge one field at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultData {
    #[serde(default)]
    pub identity: Option<IdentityRecord>,
    #[serde(rename = "preKeys", default)]
    pub pre_keys: Option<PreKeyRecordSet>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}
