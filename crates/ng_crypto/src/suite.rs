//! Signal-like session suite
//!
//! The execution context consumes the session primitive purely as a
//! capability — the [`SessionSuite`] trait. Any conformant implementation is
//! substitutable; [`ChainSuite`] is the default one:
//!
//! ## Agreement (X3DH-like)
//! The initiator fetches the peer's published bundle:
//!   IK_B  (identity, Ed25519 → converted to X25519 for DH)
//!   SPK_B (signed pre-key, X25519) + IK_B signature over SPK_B
//!   OPK_B (one-time pre-key, X25519, optional)
//!
//! and generates ONE ephemeral X25519 keypair EK_A. DH calculations:
//!   DH1 = DH(IK_A, SPK_B)   — mutual authentication
//!   DH2 = DH(EK_A, IK_B)    — forward secrecy
//!   DH3 = DH(EK_A, SPK_B)   — replay protection
//!   DH4 = DH(EK_A, OPK_B)   — one-time forward secrecy [optional]
//!
//! SK = HKDF(salt=0, ikm = 0xFF*32 || DH1 || DH2 || DH3 [|| DH4])
//!
//! The SPK signature MUST verify before any DH is computed.
//!
//! ## Chains
//! SK splits into one HKDF chain per direction; each message advances its
//! chain one step and encrypts under the derived per-message key
//! (AES-256-GCM). Messages of kind `PRE_KEY_MESSAGE` carry the handshake
//! header so the responder can derive SK from its stored pre-key secrets;
//! the initiator keeps attaching it until the first inbound message.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    aead,
    error::CryptoError,
    identity::{
        ed25519_pub_to_x25519, ed25519_secret_to_x25519, generate_registration_id,
        IdentityKeyPair,
    },
    kdf,
};

/// Message kind for a session-establishing message (carries the handshake
/// header). Matches the tag the original wire format used for pre-key
/// messages.
pub const PRE_KEY_MESSAGE: u8 = 3;
/// Message kind for an ordinary chain message.
pub const CHAIN_MESSAGE: u8 = 1;

const AGREEMENT_INFO: &[u8] = b"ng-agree-v1";
const MESSAGE_AAD: &[u8] = b"ng-msg-v1";

/// Upper bound on how far ahead of the receive chain a message counter may
/// point. The counter arrives unauthenticated, so without a cap a forged
/// body could demand an arbitrary number of chain steps.
pub const MAX_SKIP: u64 = 2000;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn b64d(s: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD.decode(s).map_err(CryptoError::Base64Decode)
}

fn to_32(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte key".into()))
}

// ── Pre-key material ─────────────────────────────────────────────────────────

/// X25519 pre-key pair (signed or one-time). Secret zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct PreKeyPair {
    #[zeroize(skip)]
    pub key_id: u32,
    #[zeroize(skip)]
    pub public: [u8; 32],
    secret: [u8; 32],
}

impl PreKeyPair {
    pub fn generate(key_id: u32) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { key_id, public: public.to_bytes(), secret: secret.to_bytes() }
    }

    pub fn from_parts(key_id: u32, public: [u8; 32], secret: [u8; 32]) -> Self {
        Self { key_id, public, secret }
    }

    pub fn public_b64(&self) -> String {
        STANDARD.encode(self.public)
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    fn dh_secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret)
    }
}

/// A signed pre-key: an X25519 pair whose public half is signed by the
/// Ed25519 identity key.
#[derive(ZeroizeOnDrop)]
pub struct SignedPreKeyPair {
    #[zeroize(skip)]
    pub signature: Vec<u8>,
    // Zeroizes itself on drop.
    #[zeroize(skip)]
    pub key_pair: PreKeyPair,
}

impl SignedPreKeyPair {
    pub fn generate(identity: &IdentityKeyPair, key_id: u32) -> Self {
        let key_pair = PreKeyPair::generate(key_id);
        let signature = identity.sign(&key_pair.public);
        Self { signature, key_pair }
    }
}

// ── Pre-key bundle (published material only) ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKeyPublic {
    #[serde(rename = "keyId")]
    pub key_id: u32,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimePreKeyPublic {
    #[serde(rename = "keyId")]
    pub key_id: u32,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// A peer's published public key material, consumed by session initiators.
/// Contains no private key bytes by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreKeyBundle {
    #[serde(rename = "registrationId")]
    pub registration_id: u32,
    /// Ed25519 identity public key (base64)
    #[serde(rename = "identityKey")]
    pub identity_key: String,
    #[serde(rename = "signedPreKey")]
    pub signed_pre_key: SignedPreKeyPublic,
    /// Optional — session init falls back to signed pre-key only.
    #[serde(rename = "oneTimePreKeys", default)]
    pub one_time_pre_keys: Vec<OneTimePreKeyPublic>,
}

impl PreKeyBundle {
    /// Mandatory fields: identity key + signed pre-key (with signature).
    /// One-time pre-keys are optional.
    pub fn validate(&self) -> Result<(), CryptoError> {
        let ik = b64d(&self.identity_key)
            .map_err(|_| CryptoError::InvalidBundle("identity key is not base64".into()))?;
        if ik.len() != 32 {
            return Err(CryptoError::InvalidBundle("identity key must be 32 bytes".into()));
        }
        let spk = b64d(&self.signed_pre_key.public_key)
            .map_err(|_| CryptoError::InvalidBundle("signed pre-key is not base64".into()))?;
        if spk.len() != 32 {
            return Err(CryptoError::InvalidBundle("signed pre-key must be 32 bytes".into()));
        }
        let sig = b64d(&self.signed_pre_key.signature)
            .map_err(|_| CryptoError::InvalidBundle("signature is not base64".into()))?;
        if sig.len() != 64 {
            return Err(CryptoError::InvalidBundle("signature must be 64 bytes".into()));
        }
        for otp in &self.one_time_pre_keys {
            let pk = b64d(&otp.public_key)
                .map_err(|_| CryptoError::InvalidBundle("one-time pre-key is not base64".into()))?;
            if pk.len() != 32 {
                return Err(CryptoError::InvalidBundle("one-time pre-key must be 32 bytes".into()));
            }
        }
        Ok(())
    }
}

// ── Wire message types ───────────────────────────────────────────────────────

/// Attached to pre-key messages so the responder can reconstruct SK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeHeader {
    /// Initiator's Ed25519 identity public key (base64)
    #[serde(rename = "identityKey")]
    pub identity_key: String,
    /// Initiator's ephemeral X25519 public key (base64)
    #[serde(rename = "ephemeralKey")]
    pub ephemeral_key: String,
    #[serde(rename = "registrationId")]
    pub registration_id: u32,
    /// Which of the responder's pre-keys were used
    #[serde(rename = "signedPreKeyId")]
    pub signed_pre_key_id: u32,
    #[serde(rename = "oneTimePreKeyId")]
    pub one_time_pre_key_id: Option<u32>,
}

/// The decoded body of one session message.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<HandshakeHeader>,
    n: u64,
    /// AES-GCM (nonce || ct+tag), base64
    ciphertext: String,
}

/// One encrypted unit as produced by the suite: a kind tag plus opaque body
/// bytes. The envelope layer wraps this for the wire.
#[derive(Debug, Clone)]
pub struct CipherMessage {
    pub kind: u8,
    pub body: Vec<u8>,
}

// ── Session state ────────────────────────────────────────────────────────────

/// Per-peer evolving chain state. Lives only in the execution context's
/// volatile store; never serialized into the vault.
#[derive(Debug, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SessionState {
    #[zeroize(skip)]
    pub peer_id: String,
    send_chain: [u8; 32],
    recv_chain: [u8; 32],
    pub send_n: u64,
    pub recv_n: u64,
    /// Present on the initiator until the first inbound message confirms the
    /// responder holds the session.
    #[zeroize(skip)]
    pending_handshake: Option<HandshakeHeader>,
}

impl SessionState {
    fn next_send_key(&mut self) -> Result<[u8; 32], CryptoError> {
        let (next_ck, mk) = kdf::chain_step(&self.send_chain)?;
        self.send_chain = next_ck;
        self.send_n += 1;
        Ok(mk)
    }
}

// ── Capability trait ─────────────────────────────────────────────────────────

/// The session primitive as consumed by the execution context. Mirrors the
/// capability set of the external collaborator: key generation, session
/// establishment from a peer bundle, and encrypt/decrypt.
pub trait SessionSuite: Send + 'static {
    fn generate_identity_key_pair(&self) -> Result<IdentityKeyPair, CryptoError>;
    fn generate_registration_id(&self) -> u32;
    fn generate_pre_key(&self, key_id: u32) -> Result<PreKeyPair, CryptoError>;
    fn generate_signed_pre_key(
        &self,
        identity: &IdentityKeyPair,
        key_id: u32,
    ) -> Result<SignedPreKeyPair, CryptoError>;

    /// Establish an outbound session from a peer's published bundle.
    fn initiate_session(
        &self,
        identity: &IdentityKeyPair,
        registration_id: u32,
        peer_id: &str,
        bundle: &PreKeyBundle,
    ) -> Result<SessionState, CryptoError>;

    /// Establish an inbound session from a pre-key message's handshake
    /// header, using the local signed (and possibly one-time) pre-key
    /// secrets the header names.
    fn respond_session(
        &self,
        identity: &IdentityKeyPair,
        signed_pre_key: &PreKeyPair,
        one_time_pre_key: Option<&PreKeyPair>,
        peer_id: &str,
        header: &HandshakeHeader,
    ) -> Result<SessionState, CryptoError>;

    fn encrypt(
        &self,
        session: &mut SessionState,
        plaintext: &[u8],
    ) -> Result<CipherMessage, CryptoError>;

    fn decrypt(
        &self,
        session: &mut SessionState,
        kind: u8,
        body: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;
}

/// Read the handshake header out of a pre-key message body without touching
/// any session state. The context uses this to build the responder session.
pub fn peek_handshake(body: &[u8]) -> Result<Option<HandshakeHeader>, CryptoError> {
    let msg: ChainMessage = serde_json::from_slice(body)?;
    Ok(msg.header)
}

// ── Default implementation ───────────────────────────────────────────────────

/// HKDF-chain suite over the X3DH-like agreement described in the module
/// docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainSuite;

impl ChainSuite {
    fn derive_shared_key(dh_concat: &mut Vec<u8>) -> Result<[u8; 32], CryptoError> {
        let mut sk = [0u8; 32];
        kdf::hkdf_expand(dh_concat, Some(&[0u8; 32]), AGREEMENT_INFO, &mut sk)?;
        dh_concat.zeroize();
        Ok(sk)
    }
}

impl SessionSuite for ChainSuite {
    fn generate_identity_key_pair(&self) -> Result<IdentityKeyPair, CryptoError> {
        Ok(IdentityKeyPair::generate())
    }

    fn generate_registration_id(&self) -> u32 {
        generate_registration_id()
    }

    fn generate_pre_key(&self, key_id: u32) -> Result<PreKeyPair, CryptoError> {
        Ok(PreKeyPair::generate(key_id))
    }

    fn generate_signed_pre_key(
        &self,
        identity: &IdentityKeyPair,
        key_id: u32,
    ) -> Result<SignedPreKeyPair, CryptoError> {
        Ok(SignedPreKeyPair::generate(identity, key_id))
    }

    fn initiate_session(
        &self,
        identity: &IdentityKeyPair,
        registration_id: u32,
        peer_id: &str,
        bundle: &PreKeyBundle,
    ) -> Result<SessionState, CryptoError> {
        bundle.validate()?;

        // Verify SPK signature before computing any DH.
        let ik_b_ed = to_32(&b64d(&bundle.identity_key)?)?;
        let spk_b_raw = to_32(&b64d(&bundle.signed_pre_key.public_key)?)?;
        let spk_sig = b64d(&bundle.signed_pre_key.signature)?;
        IdentityKeyPair::verify(&ik_b_ed, &spk_b_raw, &spk_sig)?;

        let ik_a_x = ed25519_secret_to_x25519(identity.secret_bytes());
        let ik_b_x = ed25519_pub_to_x25519(&ik_b_ed)?;
        let spk_b = X25519Public::from(spk_b_raw);

        let ek_a = StaticSecret::random_from_rng(OsRng);
        let ek_a_pub = X25519Public::from(&ek_a);

        let dh1 = ik_a_x.diffie_hellman(&spk_b);
        let dh2 = ek_a.diffie_hellman(&ik_b_x);
        let dh3 = ek_a.diffie_hellman(&spk_b);

        let mut ikm = vec![0xFFu8; 32]; // domain separation pad
        ikm.extend_from_slice(dh1.as_bytes());
        ikm.extend_from_slice(dh2.as_bytes());
        ikm.extend_from_slice(dh3.as_bytes());

        let mut one_time_pre_key_id = None;
        if let Some(otp) = bundle.one_time_pre_keys.first() {
            let opk_b = X25519Public::from(to_32(&b64d(&otp.public_key)?)?);
            let dh4 = ek_a.diffie_hellman(&opk_b);
            ikm.extend_from_slice(dh4.as_bytes());
            one_time_pre_key_id = Some(otp.key_id);
        }

        let sk = Self::derive_shared_key(&mut ikm)?;
        let (ck_init, ck_resp) = kdf::session_chains(&sk)?;

        Ok(SessionState {
            peer_id: peer_id.to_string(),
            send_chain: ck_init,
            recv_chain: ck_resp,
            send_n: 0,
            recv_n: 0,
            pending_handshake: Some(HandshakeHeader {
                identity_key: identity.public_b64(),
                ephemeral_key: STANDARD.encode(ek_a_pub.as_bytes()),
                registration_id,
                signed_pre_key_id: bundle.signed_pre_key.key_id,
                one_time_pre_key_id,
            }),
        })
    }

    fn respond_session(
        &self,
        identity: &IdentityKeyPair,
        signed_pre_key: &PreKeyPair,
        one_time_pre_key: Option<&PreKeyPair>,
        peer_id: &str,
        header: &HandshakeHeader,
    ) -> Result<SessionState, CryptoError> {
        let ik_a_ed = to_32(&b64d(&header.identity_key)?)?;
        let ek_a = X25519Public::from(to_32(&b64d(&header.ephemeral_key)?)?);

        let ik_a_x = ed25519_pub_to_x25519(&ik_a_ed)?;
        let ik_b_x = ed25519_secret_to_x25519(identity.secret_bytes());
        let spk_b = signed_pre_key.dh_secret();

        // Mirror the initiator's DH order exactly (DH is commutative):
        //   DH1 = IK_A × SPK_B, DH2 = EK_A × IK_B, DH3 = EK_A × SPK_B
        let dh1 = spk_b.diffie_hellman(&ik_a_x);
        let dh2 = ik_b_x.diffie_hellman(&ek_a);
        let dh3 = spk_b.diffie_hellman(&ek_a);

        let mut ikm = vec![0xFFu8; 32];
        ikm.extend_from_slice(dh1.as_bytes());
        ikm.extend_from_slice(dh2.as_bytes());
        ikm.extend_from_slice(dh3.as_bytes());

        if let Some(opk) = one_time_pre_key {
            let dh4 = opk.dh_secret().diffie_hellman(&ek_a);
            ikm.extend_from_slice(dh4.as_bytes());
        } else if header.one_time_pre_key_id.is_some() {
            return Err(CryptoError::InvalidKey(
                "handshake names a one-time pre-key we no longer hold".into(),
            ));
        }

        let sk = Self::derive_shared_key(&mut ikm)?;
        let (ck_init, ck_resp) = kdf::session_chains(&sk)?;

        // The responder's send chain is the initiator's receive chain.
        Ok(SessionState {
            peer_id: peer_id.to_string(),
            send_chain: ck_resp,
            recv_chain: ck_init,
            send_n: 0,
            recv_n: 0,
            pending_handshake: None,
        })
    }

    fn encrypt(
        &self,
        session: &mut SessionState,
        plaintext: &[u8],
    ) -> Result<CipherMessage, CryptoError> {
        let n = session.send_n;
        let mk = session.next_send_key()?;
        let ct = aead::encrypt(&mk, plaintext, MESSAGE_AAD)?;

        let header = session.pending_handshake.clone();
        let kind = if header.is_some() { PRE_KEY_MESSAGE } else { CHAIN_MESSAGE };
        let msg = ChainMessage { header, n, ciphertext: STANDARD.encode(ct) };

        Ok(CipherMessage { kind, body: serde_json::to_vec(&msg)? })
    }

    fn decrypt(
        &self,
        session: &mut SessionState,
        _kind: u8,
        body: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let msg: ChainMessage = serde_json::from_slice(body)?;
        if msg.n < session.recv_n {
            return Err(CryptoError::MessageOrder { got: msg.n, expected: session.recv_n });
        }
        // The counter is unauthenticated at this point; cap the work a
        // forged body can demand.
        if msg.n - session.recv_n > MAX_SKIP {
            return Err(CryptoError::MessageOrder { got: msg.n, expected: session.recv_n });
        }

        // Derive the candidate key on a scratch copy of the chain; the
        // session commits nothing until the tag has verified, so a tampered
        // copy cannot desync genuine traffic.
        let mut chain = Zeroizing::new(session.recv_chain);
        let mut mk = Zeroizing::new([0u8; 32]);
        for _ in session.recv_n..=msg.n {
            let (next_ck, key) = kdf::chain_step(&chain)?;
            *chain = next_ck;
            *mk = key;
        }

        let ct = b64d(&msg.ciphertext)?;
        let plaintext = aead::decrypt(&mk, &ct, MESSAGE_AAD)?;

        session.recv_chain = *chain;
        session.recv_n = msg.n + 1;
        // First authenticated inbound message proves the peer holds the
        // session.
        session.pending_handshake = None;

        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn published_bundle(
        identity: &IdentityKeyPair,
        registration_id: u32,
        spk: &SignedPreKeyPair,
        otp: Option<&PreKeyPair>,
    ) -> PreKeyBundle {
        PreKeyBundle {
            registration_id,
            identity_key: identity.public_b64(),
            signed_pre_key: SignedPreKeyPublic {
                key_id: spk.key_pair.key_id,
                public_key: spk.key_pair.public_b64(),
                signature: STANDARD.encode(&spk.signature),
            },
            one_time_pre_keys: otp
                .map(|p| OneTimePreKeyPublic { key_id: p.key_id, public_key: p.public_b64() })
                .into_iter()
                .collect(),
        }
    }

    struct Party {
        identity: IdentityKeyPair,
        registration_id: u32,
        spk: SignedPreKeyPair,
        otp: PreKeyPair,
    }

    fn party() -> Party {
        let identity = IdentityKeyPair::generate();
        let spk = SignedPreKeyPair::generate(&identity, 1);
        Party { identity, registration_id: generate_registration_id(), spk, otp: PreKeyPair::generate(1) }
    }

    fn establish_pair(with_otp: bool) -> (SessionState, SessionState) {
        let suite = ChainSuite;
        let alice = party();
        let bob = party();

        let bundle = published_bundle(
            &bob.identity,
            bob.registration_id,
            &bob.spk,
            with_otp.then_some(&bob.otp),
        );

        let mut alice_session = suite
            .initiate_session(&alice.identity, alice.registration_id, "bob", &bundle)
            .unwrap();

        // First message carries the handshake header.
        let first = suite.encrypt(&mut alice_session, b"hello bob").unwrap();
        assert_eq!(first.kind, PRE_KEY_MESSAGE);
        let header = peek_handshake(&first.body).unwrap().unwrap();

        let mut bob_session = suite
            .respond_session(
                &bob.identity,
                &bob.spk.key_pair,
                header.one_time_pre_key_id.map(|_| &bob.otp),
                "alice",
                &header,
            )
            .unwrap();

        let pt = suite.decrypt(&mut bob_session, first.kind, &first.body).unwrap();
        assert_eq!(pt, b"hello bob");

        (alice_session, bob_session)
    }

    #[test]
    fn two_party_round_trip_with_one_time_pre_key() {
        let suite = ChainSuite;
        let (mut alice, mut bob) = establish_pair(true);

        let msg = suite.encrypt(&mut bob, "привет, alice".as_bytes()).unwrap();
        assert_eq!(msg.kind, CHAIN_MESSAGE);
        let pt = suite.decrypt(&mut alice, msg.kind, &msg.body).unwrap();
        assert_eq!(String::from_utf8(pt).unwrap(), "привет, alice");

        // Header cleared after first inbound confirmation.
        let next = suite.encrypt(&mut alice, b"second").unwrap();
        assert_eq!(next.kind, CHAIN_MESSAGE);
        assert_eq!(suite.decrypt(&mut bob, next.kind, &next.body).unwrap(), b"second");
    }

    #[test]
    fn round_trip_without_one_time_pre_key() {
        let suite = ChainSuite;
        let (mut alice, mut bob) = establish_pair(false);
        let msg = suite.encrypt(&mut alice, b"spk only").unwrap();
        assert_eq!(suite.decrypt(&mut bob, msg.kind, &msg.body).unwrap(), b"spk only");
    }

    #[test]
    fn tampered_body_fails_closed() {
        let suite = ChainSuite;
        let alice = party();
        let bob = party();
        let bundle = published_bundle(&bob.identity, bob.registration_id, &bob.spk, None);
        let mut alice_session = suite
            .initiate_session(&alice.identity, alice.registration_id, "bob", &bundle)
            .unwrap();
        let msg = suite.encrypt(&mut alice_session, b"original").unwrap();
        let header = peek_handshake(&msg.body).unwrap().unwrap();
        let mut bob_session = suite
            .respond_session(&bob.identity, &bob.spk.key_pair, None, "alice", &header)
            .unwrap();

        // Flip one bit inside the inner ciphertext.
        let mut inner: serde_json::Value = serde_json::from_slice(&msg.body).unwrap();
        let ct_b64 = inner["ciphertext"].as_str().unwrap();
        let mut ct = STANDARD.decode(ct_b64).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        inner["ciphertext"] = serde_json::Value::String(STANDARD.encode(ct));
        let tampered = serde_json::to_vec(&inner).unwrap();

        assert!(suite.decrypt(&mut bob_session, msg.kind, &tampered).is_err());
    }

    #[test]
    fn forged_signed_pre_key_is_rejected() {
        let suite = ChainSuite;
        let alice = party();
        let bob = party();
        let mallory = party();

        // Bob's bundle but with Mallory's SPK swapped in: signature no
        // longer matches.
        let mut bundle = published_bundle(&bob.identity, bob.registration_id, &bob.spk, None);
        bundle.signed_pre_key.public_key = mallory.spk.key_pair.public_b64();

        let err = suite
            .initiate_session(&alice.identity, alice.registration_id, "bob", &bundle)
            .unwrap_err();
        assert!(matches!(err, CryptoError::SignatureVerification));
    }

    #[test]
    fn bundle_missing_mandatory_fields_is_invalid() {
        let bundle = PreKeyBundle {
            registration_id: 1,
            identity_key: "not base64!!".into(),
            signed_pre_key: SignedPreKeyPublic {
                key_id: 1,
                public_key: String::new(),
                signature: String::new(),
            },
            one_time_pre_keys: vec![],
        };
        assert!(matches!(bundle.validate(), Err(CryptoError::InvalidBundle(_))));
    }

    #[test]
    fn counter_far_ahead_is_rejected_without_chain_work() {
        let suite = ChainSuite;
        let (_alice, mut bob) = establish_pair(true);

        // Forged body demanding two million chain steps. Must be rejected
        // up front, leaving the receive chain where it was.
        let forged = serde_json::to_vec(&serde_json::json!({
            "n": 2_000_000u64,
            "ciphertext": STANDARD.encode([0u8; 32]),
        }))
        .unwrap();

        let err = suite.decrypt(&mut bob, CHAIN_MESSAGE, &forged).unwrap_err();
        assert!(matches!(err, CryptoError::MessageOrder { got: 2_000_000, .. }));
        assert_eq!(bob.recv_n, 1);
    }

    #[test]
    fn skip_within_bound_still_decrypts() {
        let suite = ChainSuite;
        let (mut alice, mut bob) = establish_pair(true);

        // Drop a few messages; the next one still lands.
        for _ in 0..5 {
            suite.encrypt(&mut alice, b"lost in transit").unwrap();
        }
        let msg = suite.encrypt(&mut alice, b"made it").unwrap();
        assert_eq!(suite.decrypt(&mut bob, msg.kind, &msg.body).unwrap(), b"made it");
        assert_eq!(bob.recv_n, alice.send_n);
    }

    #[test]
    fn failed_authentication_leaves_session_intact() {
        let suite = ChainSuite;
        let (mut alice, mut bob) = establish_pair(true);
        let msg = suite.encrypt(&mut alice, b"the real message").unwrap();

        // A tampered copy arrives first and fails the tag check.
        let mut inner: serde_json::Value = serde_json::from_slice(&msg.body).unwrap();
        let mut ct = STANDARD.decode(inner["ciphertext"].as_str().unwrap()).unwrap();
        ct[0] ^= 0x01;
        inner["ciphertext"] = serde_json::Value::String(STANDARD.encode(ct));
        let tampered = serde_json::to_vec(&inner).unwrap();

        let recv_n_before = bob.recv_n;
        assert!(suite.decrypt(&mut bob, msg.kind, &tampered).is_err());
        assert_eq!(bob.recv_n, recv_n_before);

        // The genuine message still decrypts.
        let pt = suite.decrypt(&mut bob, msg.kind, &msg.body).unwrap();
        assert_eq!(pt, b"the real message");
    }

    #[test]
    fn stale_counter_is_rejected() {
        let suite = ChainSuite;
        let (mut alice, mut bob) = establish_pair(true);
        let m1 = suite.encrypt(&mut alice, b"one").unwrap();
        suite.decrypt(&mut bob, m1.kind, &m1.body).unwrap();
        // Same counter again: behind the receive chain.
        let err = suite.decrypt(&mut bob, m1.kind, &m1.body).unwrap_err();
        assert!(matches!(err, CryptoError::MessageOrder { .. }));
    }
}
