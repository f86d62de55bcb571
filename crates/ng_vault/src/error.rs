use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    #[error("No vault exists in this store")]
    VaultNotFound,

    #[error("Old passphrase does not unlock the vault")]
    BadOldPassphrase,

    /// Deliberately opaque: wrong passphrase, corrupt record, and tag
    /// mismatch are indistinguishable so the error is no oracle.
    #[error("Vault decryption failed")]
    DecryptionFailed,

    #[error("Vault backend error: {0}")]
    Backend(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
