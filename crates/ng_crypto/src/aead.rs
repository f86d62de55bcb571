//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM (96-bit nonce). Key size: 32 bytes. Tag: 16 bytes.
//!
//! Two formats:
//! - combined: [ nonce (12 bytes) | ciphertext + tag ] — session messages
//! - detached nonce: the vault stores the IV next to the ciphertext, so the
//!   split helpers take/return it separately.
//!
//! Decryption failures (tag mismatch, truncated input, wrong key) collapse
//! into one opaque `AeadDecrypt` error.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;

fn cipher(key: &[u8; 32]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)
}

/// Encrypt `plaintext` with a 32-byte key, prepending a random 12-byte nonce.
/// `aad` — additional associated data (authenticated but not encrypted).
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (nonce, ct) = encrypt_detached(key, plaintext, aad)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypt combined-format bytes (nonce || ciphertext+tag).
pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce, ct) = data.split_at(NONCE_LEN);
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(nonce);
    decrypt_detached(key, &iv, ct, aad)
}

/// Encrypt returning (nonce, ciphertext+tag) separately — vault format.
pub fn encrypt_detached(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
    let ct = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;
    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(&nonce);
    Ok((iv, ct))
}

/// Decrypt with an explicit nonce — vault format.
pub fn decrypt_detached(
    key: &[u8; 32],
    iv: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = cipher(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let nonce = Nonce::from_slice(iv);
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [9u8; 32];
        let ct = encrypt(&key, b"attack at dawn", b"aad").unwrap();
        let pt = decrypt(&key, &ct, b"aad").unwrap();
        assert_eq!(&pt[..], b"attack at dawn");
    }

    #[test]
    fn tamper_fails() {
        let key = [9u8; 32];
        let mut ct = encrypt(&key, b"attack at dawn", b"").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(decrypt(&key, &ct, b"").is_err());
    }

    #[test]
    fn wrong_aad_fails() {
        let key = [9u8; 32];
        let ct = encrypt(&key, b"payload", b"one").unwrap();
        assert!(decrypt(&key, &ct, b"two").is_err());
    }

    #[test]
    fn truncated_input_is_opaque_error() {
        let key = [9u8; 32];
        let err = decrypt(&key, &[0u8; 4], b"").unwrap_err();
        assert!(matches!(err, CryptoError::AeadDecrypt));
    }
}
