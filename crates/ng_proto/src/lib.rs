//! ng_proto — Wire types and serialisation for Nightglass
//!
//! Everything the transport layer sees is defined here, and none of it ever
//! contains plaintext: the relay handles opaque base64 envelopes plus the
//! minimal routing metadata around them.
//!
//! # Modules
//! - `envelope` — the self-describing ciphertext container (type tag + body)
//! - `bundle`   — base64 transport of published pre-key bundles
//! - `record`   — the persisted/transmitted message record shape
//! - `cursor`   — opaque history pagination tokens
//! - `b64`      — canonical base64 validation

pub mod b64;
pub mod bundle;
pub mod cursor;
pub mod envelope;
pub mod error;
pub mod record;

pub use cursor::HistoryCursor;
pub use envelope::Envelope;
pub use error::ProtoError;
pub use record::MessageRecord;
