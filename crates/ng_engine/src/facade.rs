//! Application-facing handle over the crypto execution context.
//!
//! The facade lazily spawns the context task on first use and turns every
//! call into a correlated request with a bounded wait. Two failure modes
//! matter to callers:
//!
//! - **Timeout.** The context may still complete the operation after the
//!   caller gave up, so stateful requests (`encrypt_message`,
//!   `init_session`) must not be blindly retried.
//! - **Crash.** A dead context drops every pending reply channel; all
//!   outstanding calls fail with `ContextCrashed`, the handle is torn down,
//!   and the next call spawns a fresh context with empty volatile state.
//!   Callers treat this like `reset()` and re-initialise their sessions.
//!
//! The facade also mirrors a non-secret [`KeyDirectory`] projection of the
//! context's key state. Updates are applied in request-issue order; a
//! completion that arrives after a later request's has already been applied
//! is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use ng_crypto::{ChainSuite, PreKeyBundle};
use ng_vault::{VaultBackend, VaultStore};

use crate::{
    context::{self, Action, KeyDirectory, KeyMaterial, Request, Response},
    error::EngineError,
    store::LoadedMaterial,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

struct Mirror {
    last_applied: u64,
    directory: KeyDirectory,
}

pub struct CryptoFacade {
    handle: Mutex<Option<mpsc::Sender<Request>>>,
    next_id: AtomicU64,
    timeout: Duration,
    mirror: StdMutex<Mirror>,
}

impl Default for CryptoFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoFacade {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            handle: Mutex::new(None),
            next_id: AtomicU64::new(1),
            timeout,
            mirror: StdMutex::new(Mirror { last_applied: 0, directory: KeyDirectory::default() }),
        }
    }

    // ── Operations ───────────────────────────────────────────────────────────

    pub async fn generate_identity_and_pre_keys(&self) -> Result<KeyMaterial, EngineError> {
        match self.call(Action::GenerateIdentityAndPreKeys).await? {
            Response::Material(material) => Ok(*material),
            _ => Err(EngineError::ContextCrashed),
        }
    }

    pub async fn init_session(
        &self,
        peer_id: &str,
        bundle: Option<String>,
    ) -> Result<(), EngineError> {
        self.call(Action::InitSession { peer_id: peer_id.to_string(), bundle })
            .await
            .map(|_| ())
    }

    pub async fn encrypt_message(&self, plaintext: &str) -> Result<String, EngineError> {
        match self.call(Action::EncryptMessage { plaintext: plaintext.to_string() }).await? {
            Response::Text(envelope) => Ok(envelope),
            _ => Err(EngineError::ContextCrashed),
        }
    }

    pub async fn decrypt_message(&self, envelope: &str) -> Result<String, EngineError> {
        match self.call(Action::DecryptMessage { envelope: envelope.to_string() }).await? {
            Response::Text(plaintext) => Ok(plaintext),
            _ => Err(EngineError::ContextCrashed),
        }
    }

    pub async fn load_material(&self, material: LoadedMaterial) -> Result<(), EngineError> {
        self.call(Action::LoadMaterial(material)).await.map(|_| ())
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.call(Action::Reset).await.map(|_| ())
    }

    /// Load identity and pre-keys from the vault into the context, or
    /// generate and persist them when the vault has none. The only place
    /// the engine touches the vault.
    pub async fn bootstrap<B: VaultBackend>(
        &self,
        vault: &VaultStore<B>,
        passphrase: &str,
    ) -> Result<PreKeyBundle, EngineError> {
        let identity = vault.load_identity(passphrase).await?;
        let pre_keys = vault.load_pre_keys(passphrase).await?;

        match (identity, pre_keys) {
            (Some(identity), Some(pre_keys)) => {
                let bundle = context::bundle_from_records(&identity, &pre_keys);
                self.load_material(LoadedMaterial { identity, pre_keys }).await?;
                Ok(bundle)
            }
            _ => {
                let material = self.generate_identity_and_pre_keys().await?;
                vault.save_identity(passphrase, material.identity).await?;
                vault.save_pre_keys(passphrase, material.pre_keys).await?;
                Ok(material.bundle)
            }
        }
    }

    /// Latest mirrored key-state projection.
    pub fn directory(&self) -> KeyDirectory {
        match self.mirror.lock() {
            Ok(mirror) => mirror.directory.clone(),
            Err(poisoned) => poisoned.into_inner().directory.clone(),
        }
    }

    // ── Plumbing ─────────────────────────────────────────────────────────────

    async fn sender(&self) -> mpsc::Sender<Request> {
        let mut guard = self.handle.lock().await;
        match guard.as_ref() {
            Some(tx) if !tx.is_closed() => tx.clone(),
            _ => {
                let tx = context::spawn(ChainSuite);
                *guard = Some(tx.clone());
                tx
            }
        }
    }

    async fn teardown(&self) {
        *self.handle.lock().await = None;
    }

    async fn call(&self, action: Action) -> Result<Response, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tx = self.sender().await;
        let (reply_tx, reply_rx) = oneshot::channel();

        if tx.send(Request { id, action, reply: reply_tx }).await.is_err() {
            warn!(id, "crypto context gone before accepting request");
            self.teardown().await;
            return Err(EngineError::ContextCrashed);
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Err(_) => Err(EngineError::RequestTimeout),
            Ok(Err(_)) => {
                warn!(id, "crypto context dropped reply channel");
                self.teardown().await;
                Err(EngineError::ContextCrashed)
            }
            Ok(Ok(reply)) => {
                self.apply_mirror(id, reply.directory);
                reply.result
            }
        }
    }

    /// Apply in issue order: a completion older than one already applied is
    /// dropped rather than rolling the projection backwards.
    fn apply_mirror(&self, id: u64, directory: KeyDirectory) {
        let mut mirror = match self.mirror.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if id > mirror.last_applied {
            mirror.last_applied = id;
            mirror.directory = directory;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ng_proto::bundle::encode_bundle;
    use ng_vault::{MemoryBackend, VaultStore};

    async fn paired_facades() -> (CryptoFacade, CryptoFacade) {
        let alice = CryptoFacade::new();
        let bob = CryptoFacade::new();
        alice.generate_identity_and_pre_keys().await.unwrap();
        let bob_material = bob.generate_identity_and_pre_keys().await.unwrap();

        let bundle = encode_bundle(&bob_material.bundle).unwrap();
        alice.init_session("bob", Some(bundle)).await.unwrap();
        bob.init_session("alice", None).await.unwrap();
        (alice, bob)
    }

    #[tokio::test]
    async fn round_trip_through_two_engines() {
        let (alice, bob) = paired_facades().await;
        let envelope = alice.encrypt_message("meet at dusk").await.unwrap();
        assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "meet at dusk");
    }

    #[tokio::test]
    async fn replay_detected_across_facade() {
        let (alice, bob) = paired_facades().await;
        let envelope = alice.encrypt_message("no repeats").await.unwrap();
        bob.decrypt_message(&envelope).await.unwrap();
        assert!(matches!(
            bob.decrypt_message(&envelope).await,
            Err(EngineError::ReplayDetected)
        ));
    }

    #[tokio::test]
    async fn mirror_tracks_generated_keys() {
        let facade = CryptoFacade::new();
        assert_eq!(facade.directory(), KeyDirectory::default());

        let material = facade.generate_identity_and_pre_keys().await.unwrap();
        let directory = facade.directory();
        assert_eq!(directory.registration_id, Some(material.identity.registration_id));
        assert!(directory.identity_fingerprint.is_some());
        assert_eq!(directory.signed_pre_key_ids, vec![1]);
        assert_eq!(directory.one_time_pre_key_ids, vec![1]);

        facade.reset().await.unwrap();
        assert_eq!(facade.directory(), KeyDirectory::default());
    }

    #[tokio::test]
    async fn bootstrap_generates_then_reloads() {
        let vault = VaultStore::with_iterations(MemoryBackend::new(), 1_000);

        let facade = CryptoFacade::new();
        let bundle = facade.bootstrap(&vault, "passphrase").await.unwrap();

        // A second engine against the same vault sees the same identity.
        let reloaded = CryptoFacade::new();
        let bundle_again = reloaded.bootstrap(&vault, "passphrase").await.unwrap();
        assert_eq!(bundle.registration_id, bundle_again.registration_id);
        assert_eq!(bundle.identity_key, bundle_again.identity_key);
    }

    #[tokio::test]
    async fn crashed_context_recovers_with_empty_state() {
        let (alice, bob) = paired_facades().await;
        let envelope = alice.encrypt_message("before the crash").await.unwrap();

        // Kill the context task by dropping its inbound channel.
        bob.teardown().await;
        // A fresh context spawns lazily with no sessions.
        assert!(matches!(
            bob.decrypt_message(&envelope).await,
            Err(EngineError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn slow_context_surfaces_timeout() {
        let facade = CryptoFacade::with_timeout(Duration::from_millis(10));

        // Replace the real context with one that never answers.
        let (tx, mut rx) = mpsc::channel::<Request>(8);
        *facade.handle.lock().await = Some(tx);
        let stalled = tokio::spawn(async move {
            let mut parked = Vec::new();
            while let Some(request) = rx.recv().await {
                parked.push(request); // hold the reply channel open forever
            }
        });

        assert!(matches!(
            facade.generate_identity_and_pre_keys().await,
            Err(EngineError::RequestTimeout)
        ));
        stalled.abort();
    }
}
