//! Key derivation functions
//!
//! `derive_vault_key` — PBKDF2-HMAC-SHA256, derives the 32-byte key that
//!   encrypts the local vault. The iteration count is an explicit parameter
//!   so old vaults stay decryptable when the default changes.
//!
//! `hkdf_expand` / `chain_step` — HKDF-SHA256, session key material.

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Vault key (PBKDF2-HMAC-SHA256) ───────────────────────────────────────────

/// Default iteration count for freshly written vaults. Stored alongside the
/// ciphertext; decryption always uses the stored value, never this constant.
pub const VAULT_KDF_ITERATIONS: u32 = 310_000;

/// 32-byte vault key derived from user passphrase. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

/// Derive a vault key from a user passphrase + 16-byte salt.
/// The salt is stored alongside the encrypted vault (not secret).
pub fn derive_vault_key(passphrase: &[u8], salt: &[u8], iterations: u32) -> VaultKey {
    let mut output = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut output);
    VaultKey(output)
}

/// Generate a fresh random 16-byte salt (one per vault write).
pub fn generate_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be empty (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive the initial sending / receiving chain keys from the agreed secret.
/// Returns (chain_key_initiator, chain_key_responder) — the responder swaps.
pub fn session_chains(shared_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(shared_key), b"ng-session-init");
    let mut ck_init = [0u8; 32];
    let mut ck_resp = [0u8; 32];
    hk.expand(b"ng-chain-initiator", &mut ck_init)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    hk.expand(b"ng-chain-responder", &mut ck_resp)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok((ck_init, ck_resp))
}

/// Derive a per-message key from a chain key (symmetric ratchet step).
/// Returns (next_chain_key, message_key)
pub fn chain_step(ck: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(ck), b"ng-chain-step");
    let mut next_ck = [0u8; 32];
    let mut mk = [0u8; 32];
    hk.expand(b"next-chain-key", &mut next_ck)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    hk.expand(b"message-key", &mut mk)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok((next_ck, mk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_key_is_deterministic_per_salt_and_iterations() {
        let salt = [7u8; 16];
        let a = derive_vault_key(b"hunter2", &salt, 1_000);
        let b = derive_vault_key(b"hunter2", &salt, 1_000);
        let c = derive_vault_key(b"hunter2", &salt, 2_000);
        assert_eq!(a.0, b.0);
        assert_ne!(a.0, c.0);
    }

    #[test]
    fn chain_step_advances() {
        let ck = [1u8; 32];
        let (next, mk) = chain_step(&ck).unwrap();
        assert_ne!(next, ck);
        assert_ne!(mk, next);
        let (next2, mk2) = chain_step(&next).unwrap();
        assert_ne!(next2, next);
        assert_ne!(mk2, mk);
    }
}
