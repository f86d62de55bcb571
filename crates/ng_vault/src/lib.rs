//! ng_vault — Passphrase-encrypted key vault for Nightglass
//!
//! # Encryption strategy
//! The vault persists as a single self-describing JSON object:
//! - Plaintext (identity pair, pre-key records, optional metadata) is
//!   encrypted with AES-256-GCM; ciphertext and tag are base64-encoded.
//! - The key is derived from the user passphrase via PBKDF2-HMAC-SHA256.
//!   Salt, iteration count and IV are stored alongside the ciphertext and
//!   always read back from the record, so older vaults stay decryptable
//!   after a cost bump.
//! - Every write re-encrypts under a fresh salt and IV and replaces the
//!   stored object in one atomic backend `put`.
//!
//! # Concurrency
//! All operations queue through one async mutex. A passphrase rotation and
//! a key-material update can never interleave.

pub mod backend;
pub mod error;
pub mod object;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, VaultBackend};
pub use error::VaultError;
pub use object::{VaultData, VaultObject};
pub use store::VaultStore;
