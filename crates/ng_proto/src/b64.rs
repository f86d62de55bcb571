//! Canonical base64 validation
//!
//! The relay only ever accepts *canonical* standard base64: correct
//! alphabet, `=` padding to a multiple of four, and a byte-for-byte
//! round-trip. Everything else is rejected before it reaches storage, so a
//! given ciphertext has exactly one accepted spelling (the replay digest
//! depends on that).

use base64::{engine::general_purpose::STANDARD, Engine};

/// True when `value` is canonical standard base64.
pub fn is_canonical(value: &str) -> bool {
    if value.is_empty() || value.len() % 4 != 0 {
        return false;
    }
    let ok_alphabet = value.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
    });
    if !ok_alphabet {
        return false;
    }
    match STANDARD.decode(value) {
        Ok(bytes) => STANDARD.encode(bytes) == value,
        Err(_) => false,
    }
}
