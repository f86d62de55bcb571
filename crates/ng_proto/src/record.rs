//! Persisted/transmitted message record shape.
//!
//! No plaintext field exists here, by construction: `encrypted_payload` is
//! always the canonical-base64 encoding of an [`crate::Envelope`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    /// Canonical base64 of an Envelope.
    #[serde(rename = "encryptedPayload")]
    pub encrypted_payload: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}
