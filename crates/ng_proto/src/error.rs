use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Envelope is malformed: {0}")]
    InvalidEnvelope(String),

    #[error("Pre-key bundle is malformed: {0}")]
    InvalidBundle(String),

    #[error("Invalid history cursor")]
    InvalidCursor,

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
