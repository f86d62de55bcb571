use thiserror::Error;

use ng_proto::ProtoError;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The replay guard has seen this exact payload for this chat within
    /// the TTL window.
    #[error("Duplicate ciphertext rejected")]
    Duplicate,

    #[error("Ciphertext exceeds the configured maximum ({limit} bytes)")]
    CiphertextTooLarge { limit: usize },

    #[error("Payload is not canonical base64")]
    InvalidPayload,

    #[error("History limit must be between 1 and {max}")]
    InvalidLimit { max: u32 },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}
