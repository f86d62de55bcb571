//! The vault store: passphrase-encrypted persistence for identity and
//! pre-key material.
//!
//! Every mutation is a read-modify-write against the single stored
//! [`VaultObject`], re-encrypted under a fresh salt + IV and replaced in one
//! backend `put`. All operations queue through one async mutex, so a
//! passphrase rotation can never interleave with a material update and lose
//! either.
//!
//! Passphrase-derived keys are derived fresh per operation and zeroized on
//! drop; nothing derived from the passphrase outlives the call.

use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::sync::Mutex;
use tracing::debug;

use ng_crypto::{
    aead,
    kdf::{self, VaultKey},
    material::{IdentityRecord, PreKeyRecordSet},
};

use crate::{
    backend::VaultBackend,
    error::VaultError,
    object::{
        CipherParams, KdfParams, VaultData, VaultObject, CIPHER_ALGORITHM, KDF_ALGORITHM,
        KDF_HASH, VAULT_VERSION,
    },
};

/// Backend key under which the single vault object lives.
const VAULT_KEY_NAME: &str = "vault";
const VAULT_AAD: &[u8] = b"ng-vault-v1";

pub struct VaultStore<B> {
    backend: B,
    /// Serialises rotation and read-modify-write; a queue, not a lock
    /// hierarchy, so there is no ordering to deadlock on.
    queue: Mutex<()>,
    iterations: u32,
}

impl<B: VaultBackend> VaultStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, queue: Mutex::new(()), iterations: kdf::VAULT_KDF_ITERATIONS }
    }

    /// Lower the KDF cost — test builds only; stored vaults always decrypt
    /// with their recorded iteration count regardless of this setting.
    pub fn with_iterations(backend: B, iterations: u32) -> Self {
        Self { backend, queue: Mutex::new(()), iterations }
    }

    // ── Crypto helpers ───────────────────────────────────────────────────────

    fn seal(&self, data: &VaultData, passphrase: &str) -> Result<VaultObject, VaultError> {
        let salt = kdf::generate_salt();
        let key = kdf::derive_vault_key(passphrase.as_bytes(), &salt, self.iterations);
        let plaintext = serde_json::to_vec(data)?;

        let (iv, ciphertext) = aead::encrypt_detached(&key.0, &plaintext, VAULT_AAD)
            .map_err(|e| VaultError::Backend(e.to_string()))?;

        Ok(VaultObject {
            version: VAULT_VERSION,
            kdf: KdfParams {
                name: KDF_ALGORITHM.into(),
                hash: KDF_HASH.into(),
                iterations: self.iterations,
                salt: STANDARD.encode(salt),
            },
            cipher: CipherParams { name: CIPHER_ALGORITHM.into(), iv: STANDARD.encode(iv) },
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// All failure modes (bad passphrase, corrupt record, tag mismatch)
    /// collapse into `DecryptionFailed`.
    fn open(object: &VaultObject, passphrase: &str) -> Result<VaultData, VaultError> {
        let salt = STANDARD
            .decode(&object.kdf.salt)
            .map_err(|_| VaultError::DecryptionFailed)?;
        let iv_bytes = STANDARD
            .decode(&object.cipher.iv)
            .map_err(|_| VaultError::DecryptionFailed)?;
        let iv: [u8; aead::NONCE_LEN] =
            iv_bytes.as_slice().try_into().map_err(|_| VaultError::DecryptionFailed)?;
        let ciphertext = STANDARD
            .decode(&object.ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)?;

        // Always the *stored* iteration count, never the current default.
        let key: VaultKey =
            kdf::derive_vault_key(passphrase.as_bytes(), &salt, object.kdf.iterations);

        let plaintext = aead::decrypt_detached(&key.0, &iv, &ciphertext, VAULT_AAD)
            .map_err(|_| VaultError::DecryptionFailed)?;

        serde_json::from_slice(&plaintext).map_err(|_| VaultError::DecryptionFailed)
    }

    // ── Backend helpers ──────────────────────────────────────────────────────

    async fn read_object(&self) -> Result<Option<VaultObject>, VaultError> {
        match self.backend.get(VAULT_KEY_NAME).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_object(&self, object: &VaultObject) -> Result<(), VaultError> {
        let bytes = serde_json::to_vec(object)?;
        self.backend.put(VAULT_KEY_NAME, &bytes).await
    }

    fn require_passphrase(passphrase: &str) -> Result<(), VaultError> {
        if passphrase.is_empty() {
            return Err(VaultError::EmptyPassphrase);
        }
        Ok(())
    }

    // ── Operations ───────────────────────────────────────────────────────────

    /// Write a fresh vault. Overwrites any existing one — first-time setup
    /// is the caller's responsibility to invoke exactly once.
    pub async fn init_vault(&self, data: &VaultData, passphrase: &str) -> Result<(), VaultError> {
        Self::require_passphrase(passphrase)?;
        let _guard = self.queue.lock().await;
        let object = self.seal(data, passphrase)?;
        self.write_object(&object).await
    }

    /// Decrypt and return the vault contents.
    pub async fn unlock(&self, passphrase: &str) -> Result<VaultData, VaultError> {
        Self::require_passphrase(passphrase)?;
        let _guard = self.queue.lock().await;
        let object = self.read_object().await?.ok_or(VaultError::VaultNotFound)?;
        Self::open(&object, passphrase)
    }

    /// Atomically re-encrypt the vault under a new passphrase.
    ///
    /// Read-only until the replacement ciphertext is fully built: a wrong
    /// old passphrase returns `BadOldPassphrase` with the stored object
    /// untouched, and no intermediate state is ever persisted. Returns
    /// `false` (no write) when old and new are equal.
    pub async fn change_passphrase(
        &self,
        old_passphrase: &str,
        new_passphrase: &str,
    ) -> Result<bool, VaultError> {
        if old_passphrase.is_empty() || new_passphrase.is_empty() {
            return Err(VaultError::EmptyPassphrase);
        }
        if old_passphrase == new_passphrase {
            return Ok(false);
        }

        let _guard = self.queue.lock().await;
        let current = self.read_object().await?.ok_or(VaultError::VaultNotFound)?;

        let data = Self::open(&current, old_passphrase)
            .map_err(|_| VaultError::BadOldPassphrase)?;

        // Fresh salt + IV under the new passphrase, then one atomic replace.
        let next = self.seal(&data, new_passphrase)?;
        self.write_object(&next).await?;
        debug!("vault passphrase rotated");
        Ok(true)
    }

    /// Merge identity material into the vault (or an empty shell when no
    /// vault exists yet) and re-encrypt.
    pub async fn save_identity(
        &self,
        passphrase: &str,
        identity: IdentityRecord,
    ) -> Result<(), VaultError> {
        Self::require_passphrase(passphrase)?;
        let _guard = self.queue.lock().await;
        let mut data = self.load_for_update(passphrase).await?;
        data.identity = Some(identity);
        let object = self.seal(&data, passphrase)?;
        self.write_object(&object).await
    }

    /// Merge pre-key material into the vault and re-encrypt.
    pub async fn save_pre_keys(
        &self,
        passphrase: &str,
        pre_keys: PreKeyRecordSet,
    ) -> Result<(), VaultError> {
        Self::require_passphrase(passphrase)?;
        let _guard = self.queue.lock().await;
        let mut data = self.load_for_update(passphrase).await?;
        data.pre_keys = Some(pre_keys);
        let object = self.seal(&data, passphrase)?;
        self.write_object(&object).await
    }

    /// `None` when no vault exists; `DecryptionFailed` on a wrong
    /// passphrase.
    pub async fn load_identity(
        &self,
        passphrase: &str,
    ) -> Result<Option<IdentityRecord>, VaultError> {
        Self::require_passphrase(passphrase)?;
        let _guard = self.queue.lock().await;
        match self.read_object().await? {
            None => Ok(None),
            Some(object) => Ok(Self::open(&object, passphrase)?.identity),
        }
    }

    pub async fn load_pre_keys(
        &self,
        passphrase: &str,
    ) -> Result<Option<PreKeyRecordSet>, VaultError> {
        Self::require_passphrase(passphrase)?;
        let _guard = self.queue.lock().await;
        match self.read_object().await? {
            None => Ok(None),
            Some(object) => Ok(Self::open(&object, passphrase)?.pre_keys),
        }
    }

    /// The raw stored object, no decryption. Used by callers that only need
    /// to know whether a vault exists (and by rotation tests to compare
    /// salt/IV).
    pub async fn snapshot(&self) -> Result<Option<VaultObject>, VaultError> {
        self.read_object().await
    }

    // Caller must hold the queue guard.
    async fn load_for_update(&self, passphrase: &str) -> Result<VaultData, VaultError> {
        match self.read_object().await? {
            None => Ok(VaultData::default()),
            Some(object) => Self::open(&object, passphrase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use ng_crypto::material::KeyPairRecord;

    const TEST_ITERATIONS: u32 = 1_000;

    fn store() -> VaultStore<MemoryBackend> {
        VaultStore::with_iterations(MemoryBackend::new(), TEST_ITERATIONS)
    }

    fn identity_record() -> IdentityRecord {
        IdentityRecord {
            registration_id: 7,
            identity_key_pair: KeyPairRecord {
                public_key: "cHVi".into(),
                private_key: "cHJpdg==".into(),
            },
        }
    }

    #[tokio::test]
    async fn empty_passphrase_is_rejected_everywhere() {
        let vault = store();
        assert!(matches!(
            vault.init_vault(&VaultData::default(), "").await,
            Err(VaultError::EmptyPassphrase)
        ));
        assert!(matches!(vault.unlock("").await, Err(VaultError::EmptyPassphrase)));
        assert!(matches!(
            vault.change_passphrase("", "new").await,
            Err(VaultError::EmptyPassphrase)
        ));
        assert!(matches!(
            vault.change_passphrase("old", "").await,
            Err(VaultError::EmptyPassphrase)
        ));
    }

    #[tokio::test]
    async fn unlock_without_vault_is_not_found() {
        assert!(matches!(store().unlock("pw").await, Err(VaultError::VaultNotFound)));
    }

    #[tokio::test]
    async fn wrong_passphrase_is_opaque() {
        let vault = store();
        vault.init_vault(&VaultData::default(), "correct").await.unwrap();
        assert!(matches!(vault.unlock("incorrect").await, Err(VaultError::DecryptionFailed)));
    }

    #[tokio::test]
    async fn save_creates_empty_shell_and_merges() {
        let vault = store();
        vault.save_identity("pw", identity_record()).await.unwrap();
        let data = vault.unlock("pw").await.unwrap();
        assert_eq!(data.identity.unwrap().registration_id, 7);
        assert!(data.pre_keys.is_none());
        assert!(data.meta.is_none());
    }

    #[tokio::test]
    async fn load_identity_none_without_vault() {
        assert!(store().load_identity("pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotation_no_ops_on_same_passphrase() {
        let vault = store();
        vault.init_vault(&VaultData::default(), "pw").await.unwrap();
        let before = vault.snapshot().await.unwrap().unwrap();
        assert!(!vault.change_passphrase("pw", "pw").await.unwrap());
        assert_eq!(vault.snapshot().await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn rotation_moves_vault_to_new_passphrase() {
        let vault = store();
        vault.save_identity("first", identity_record()).await.unwrap();
        let before = vault.snapshot().await.unwrap().unwrap();

        assert!(vault.change_passphrase("first", "second").await.unwrap());

        let data = vault.unlock("second").await.unwrap();
        assert_eq!(data.identity.unwrap().registration_id, 7);
        assert!(matches!(vault.unlock("first").await, Err(VaultError::DecryptionFailed)));

        // Fresh salt and IV every rotation.
        let after = vault.snapshot().await.unwrap().unwrap();
        assert_ne!(after.kdf.salt, before.kdf.salt);
        assert_ne!(after.cipher.iv, before.cipher.iv);
    }

    #[tokio::test]
    async fn wrong_old_passphrase_leaves_vault_untouched() {
        let vault = store();
        vault.init_vault(&VaultData::default(), "first").await.unwrap();
        let before = vault.snapshot().await.unwrap().unwrap();

        assert!(matches!(
            vault.change_passphrase("wrong", "second").await,
            Err(VaultError::BadOldPassphrase)
        ));

        assert_eq!(vault.snapshot().await.unwrap().unwrap(), before);
        assert!(vault.unlock("first").await.is_ok());
    }

    #[tokio::test]
    async fn repeated_rotation_preserves_payload() {
        let vault = store();
        vault.save_identity("pw0", identity_record()).await.unwrap();
        for i in 0..5 {
            let old = format!("pw{i}");
            let new = format!("pw{}", i + 1);
            assert!(vault.change_passphrase(&old, &new).await.unwrap());
        }
        let data = vault.unlock("pw5").await.unwrap();
        assert_eq!(data.identity.unwrap().registration_id, 7);
    }

    #[tokio::test]
    async fn stored_iteration_count_wins_over_current_default() {
        // Write with one cost, reopen through a store configured with a
        // different default: the stored record must still decrypt.
        let backend = MemoryBackend::new();
        {
            let vault = VaultStore::with_iterations(&backend, 1_000);
            vault.save_identity("pw", identity_record()).await.unwrap();
        }
        let vault = VaultStore::with_iterations(&backend, 2_000);
        let loaded = vault.load_identity("pw").await.unwrap().unwrap();
        assert_eq!(loaded.registration_id, 7);
    }
}
