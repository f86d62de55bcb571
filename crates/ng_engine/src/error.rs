use thiserror::Error;

use ng_crypto::CryptoError;
use ng_proto::ProtoError;
use ng_vault::VaultError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No identity material loaded")]
    IdentityMissing,

    #[error("Invalid pre-key bundle: {0}")]
    InvalidBundle(String),

    #[error("No active established session")]
    NoActiveSession,

    /// The same (kind, body) pair was decrypted before for this peer.
    #[error("Replayed ciphertext rejected")]
    ReplayDetected,

    /// The context may still complete the operation; callers must not
    /// blindly retry stateful requests.
    #[error("Crypto context did not answer in time")]
    RequestTimeout,

    /// All volatile session state is gone; the next call starts a fresh
    /// context and peers must be re-initialised.
    #[error("Crypto context crashed")]
    ContextCrashed,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}
