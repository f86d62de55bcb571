//! ng_crypto — Nightglass cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Public APIs return opaque newtypes to prevent accidental misuse.
//!
//! # Module layout
//! - `identity`  — long-term Ed25519 identity keys + X25519 conversion
//! - `suite`     — the signal-like session primitive: capability trait +
//!                 default HKDF-chain implementation
//! - `material`  — serializable key-material records (vault plaintext shapes)
//! - `aead`      — AES-256-GCM encrypt/decrypt helpers
//! - `kdf`       — PBKDF2 / HKDF key derivation
//! - `error`     — unified error type

pub mod aead;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod material;
pub mod suite;

pub use error::CryptoError;
pub use identity::IdentityKeyPair;
pub use suite::{ChainSuite, PreKeyBundle, SessionState, SessionSuite};
