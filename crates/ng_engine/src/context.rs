//! The crypto execution context.
//!
//! All key material, session state and replay tracking live inside one
//! [`CryptoContext`] driven by a single task: requests arrive over an mpsc
//! queue and are processed strictly one at a time to completion, because
//! chain state transitions are not safe under interleaving. Callers never
//! hold a reference to the context; they talk to it through
//! [`crate::facade::CryptoFacade`].
//!
//! # Replay defence
//! The context keeps a per-peer set of previously decrypted `(kind, body)`
//! pairs and rejects repeats before any chain work runs. This is independent
//! of any server-side dedup; the context has no knowledge of transport
//! state.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use ng_crypto::{
    identity::PublicKeyBytes,
    material::{IdentityRecord, OneTimePreKeyRecord, PreKeyRecordSet, SignedPreKeyRecord},
    suite::{peek_handshake, OneTimePreKeyPublic, SignedPreKeyPublic, PRE_KEY_MESSAGE},
    CryptoError, PreKeyBundle, SessionState, SessionSuite,
};
use ng_proto::{bundle::decode_bundle, Envelope, ProtoError};

use crate::{
    error::EngineError,
    store::{LoadedMaterial, MaterialStore},
};

const SIGNED_PRE_KEY_ID: u32 = 1;
const ONE_TIME_PRE_KEY_ID: u32 = 1;

/// Everything `generate_identity_and_pre_keys` produces: the public bundle
/// for publication plus the private records for the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub bundle: PreKeyBundle,
    pub identity: IdentityRecord,
    #[serde(rename = "preKeys")]
    pub pre_keys: PreKeyRecordSet,
}

/// Non-secret projection of the context's key state, mirrored by the facade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDirectory {
    pub registration_id: Option<u32>,
    pub identity_fingerprint: Option<String>,
    pub signed_pre_key_ids: Vec<u32>,
    pub one_time_pre_key_ids: Vec<u32>,
}

/// Rebuild the publishable bundle from vault-loaded records.
pub fn bundle_from_records(identity: &IdentityRecord, pre_keys: &PreKeyRecordSet) -> PreKeyBundle {
    PreKeyBundle {
        registration_id: identity.registration_id,
        identity_key: identity.identity_key_pair.public_key.clone(),
        signed_pre_key: SignedPreKeyPublic {
            key_id: pre_keys.signed_pre_key.key_id,
            public_key: pre_keys.signed_pre_key.public_key.clone(),
            signature: pre_keys.signed_pre_key.signature.clone(),
        },
        one_time_pre_keys: pre_keys
            .one_time_pre_keys
            .iter()
            .map(|record| OneTimePreKeyPublic {
                key_id: record.key_id,
                public_key: record.public_key.clone(),
            })
            .collect(),
    }
}

// ── Request protocol ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum Action {
    GenerateIdentityAndPreKeys,
    InitSession { peer_id: String, bundle: Option<String> },
    EncryptMessage { plaintext: String },
    DecryptMessage { envelope: String },
    LoadMaterial(LoadedMaterial),
    Reset,
}

#[derive(Debug)]
pub enum Response {
    Material(Box<KeyMaterial>),
    Text(String),
    Done,
}

/// One correlated request. `id` is assigned by the facade in issue order and
/// lets the mirror discard out-of-order completions.
pub struct Request {
    pub id: u64,
    pub action: Action,
    pub reply: oneshot::Sender<Reply>,
}

pub struct Reply {
    pub result: Result<Response, EngineError>,
    pub directory: KeyDirectory,
}

// ── Context ──────────────────────────────────────────────────────────────────

pub struct CryptoContext<S> {
    suite: S,
    store: MaterialStore,
    sessions: HashMap<String, SessionState>,
    active_peer: Option<String>,
    /// Per-peer seen (kind, body) pairs.
    seen: HashMap<String, HashSet<(u8, Vec<u8>)>>,
}

impl<S: SessionSuite> CryptoContext<S> {
    pub fn new(suite: S) -> Self {
        Self {
            suite,
            store: MaterialStore::new(),
            sessions: HashMap::new(),
            active_peer: None,
            seen: HashMap::new(),
        }
    }

    /// Idempotent on identity: an existing identity pair and registration id
    /// are reused; pre-keys are generated fresh.
    pub fn generate_identity_and_pre_keys(&mut self) -> Result<KeyMaterial, EngineError> {
        let identity_record = match self.store.identity() {
            Some(record) => record.clone(),
            None => {
                let pair = self.suite.generate_identity_key_pair()?;
                let registration_id = self.suite.generate_registration_id();
                let record = IdentityRecord::from_keys(&pair, registration_id);
                self.store.set_identity(record.clone());
                record
            }
        };

        let identity = identity_record.to_keys()?;
        let signed = self.suite.generate_signed_pre_key(&identity, SIGNED_PRE_KEY_ID)?;
        let one_time = self.suite.generate_pre_key(ONE_TIME_PRE_KEY_ID)?;

        let pre_keys = PreKeyRecordSet {
            signed_pre_key: SignedPreKeyRecord::from_keys(&signed),
            one_time_pre_keys: vec![OneTimePreKeyRecord::from_keys(&one_time)],
        };
        self.store.put_signed_pre_key(pre_keys.signed_pre_key.clone());
        for record in &pre_keys.one_time_pre_keys {
            self.store.put_one_time_pre_key(record.clone());
        }

        let bundle = bundle_from_records(&identity_record, &pre_keys);
        Ok(KeyMaterial { bundle, identity: identity_record, pre_keys })
    }

    /// Record `peer_id` as the active correspondent. With a bundle,
    /// establish a fresh outbound session first; without one, keep whatever
    /// session exists (an inbound pre-key message can still establish it).
    /// On failure no session entry is written and the active peer is
    /// unchanged.
    pub fn init_session(
        &mut self,
        peer_id: &str,
        bundle_b64: Option<&str>,
    ) -> Result<(), EngineError> {
        let identity_record =
            self.store.identity().ok_or(EngineError::IdentityMissing)?.clone();

        if let Some(encoded) = bundle_b64 {
            let bundle = decode_bundle(encoded)
                .map_err(|e| EngineError::InvalidBundle(e.to_string()))?;
            let identity = identity_record.to_keys()?;
            let session = self
                .suite
                .initiate_session(&identity, identity_record.registration_id, peer_id, &bundle)
                .map_err(|e| match e {
                    CryptoError::InvalidBundle(msg) => EngineError::InvalidBundle(msg),
                    other => EngineError::Crypto(other),
                })?;
            self.sessions.insert(peer_id.to_string(), session);
            debug!(peer = peer_id, "outbound session established");
        }

        self.active_peer = Some(peer_id.to_string());
        Ok(())
    }

    pub fn encrypt_message(&mut self, plaintext: &str) -> Result<String, EngineError> {
        let peer = self.active_peer.clone().ok_or(EngineError::NoActiveSession)?;
        let session = self.sessions.get_mut(&peer).ok_or(EngineError::NoActiveSession)?;
        let message = self.suite.encrypt(session, plaintext.as_bytes())?;
        Ok(Envelope::new(message.kind, &message.body).encode()?)
    }

    pub fn decrypt_message(&mut self, envelope: &str) -> Result<String, EngineError> {
        let peer = self.active_peer.clone().ok_or(EngineError::NoActiveSession)?;
        let envelope = Envelope::decode(envelope)?;
        let body = envelope.body_bytes()?;

        // Replay check comes before any chain work, but the pair is only
        // recorded once decryption succeeds: a transient failure must not
        // blacklist the genuine message.
        let replay_key = (envelope.kind, body.clone());
        if self.seen.get(&peer).is_some_and(|seen| seen.contains(&replay_key)) {
            return Err(EngineError::ReplayDetected);
        }

        if !self.sessions.contains_key(&peer) {
            if envelope.kind != PRE_KEY_MESSAGE {
                return Err(EngineError::NoActiveSession);
            }
            self.establish_inbound(&peer, &body)?;
        }

        let session = self.sessions.get_mut(&peer).ok_or(EngineError::NoActiveSession)?;
        let plaintext = self.suite.decrypt(session, envelope.kind, &body)?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| ProtoError::InvalidEnvelope("plaintext is not UTF-8".into()))?;

        self.seen.entry(peer).or_default().insert(replay_key);
        Ok(plaintext)
    }

    /// Build the responder session from a pre-key message's handshake
    /// header, using the local signed (and possibly one-time) pre-key
    /// secrets it names. The one-time pre-key is consumed.
    fn establish_inbound(&mut self, peer: &str, body: &[u8]) -> Result<(), EngineError> {
        let header = peek_handshake(body)?
            .ok_or_else(|| ProtoError::InvalidEnvelope("pre-key message without header".into()))?;

        let identity_record =
            self.store.identity().ok_or(EngineError::IdentityMissing)?.clone();
        let identity = identity_record.to_keys()?;

        let signed = self
            .store
            .signed_pre_key(header.signed_pre_key_id)
            .ok_or(EngineError::Crypto(CryptoError::SessionNotInitialised))?
            .to_pre_key()?;
        let one_time = match header.one_time_pre_key_id {
            Some(id) => Some(
                self.store
                    .take_one_time_pre_key(id)
                    .ok_or(EngineError::Crypto(CryptoError::SessionNotInitialised))?
                    .to_pre_key()?,
            ),
            None => None,
        };

        let session =
            self.suite.respond_session(&identity, &signed, one_time.as_ref(), peer, &header)?;
        self.sessions.insert(peer.to_string(), session);
        debug!(peer, "inbound session established");
        Ok(())
    }

    pub fn load_material(&mut self, material: LoadedMaterial) {
        self.store.load(material);
    }

    pub fn reset(&mut self) {
        self.store.clear();
        self.sessions.clear();
        self.seen.clear();
        self.active_peer = None;
    }

    pub fn directory(&self) -> KeyDirectory {
        let identity = self.store.identity();
        KeyDirectory {
            registration_id: identity.map(|r| r.registration_id),
            identity_fingerprint: identity
                .and_then(|r| PublicKeyBytes::from_b64(&r.identity_key_pair.public_key).ok())
                .map(|pk| pk.fingerprint()),
            signed_pre_key_ids: self.store.signed_pre_key_ids(),
            one_time_pre_key_ids: self.store.one_time_pre_key_ids(),
        }
    }

    fn handle(&mut self, action: Action) -> Result<Response, EngineError> {
        match action {
            Action::GenerateIdentityAndPreKeys => self
                .generate_identity_and_pre_keys()
                .map(|material| Response::Material(Box::new(material))),
            Action::InitSession { peer_id, bundle } => self
                .init_session(&peer_id, bundle.as_deref())
                .map(|()| Response::Done),
            Action::EncryptMessage { plaintext } => {
                self.encrypt_message(&plaintext).map(Response::Text)
            }
            Action::DecryptMessage { envelope } => {
                self.decrypt_message(&envelope).map(Response::Text)
            }
            Action::LoadMaterial(material) => {
                self.load_material(material);
                Ok(Response::Done)
            }
            Action::Reset => {
                self.reset();
                Ok(Response::Done)
            }
        }
    }
}

/// Start the context task. Requests are answered in arrival order; dropping
/// the sender (or a panic inside the task) drops all pending reply channels,
/// which the facade observes as a crash.
pub fn spawn<S: SessionSuite>(suite: S) -> mpsc::Sender<Request> {
    let (tx, mut rx) = mpsc::channel::<Request>(64);
    tokio::spawn(async move {
        let mut context = CryptoContext::new(suite);
        while let Some(request) = rx.recv().await {
            let result = context.handle(request.action);
            let reply = Reply { result, directory: context.directory() };
            // Caller may have timed out and gone away.
            let _ = request.reply.send(reply);
        }
        debug!("crypto context stopped");
    });
    tx
}
