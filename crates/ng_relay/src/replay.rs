//! Transport-level replay guard.
//!
//! One SHA-256 digest per submitted payload, keyed `replay:{chat}:{digest}`
//! in a TTL store with an atomic "set if absent". The guard fails OPEN: if
//! the backing store is unreachable, submissions are accepted and the
//! degradation is logged exactly once until the store recovers. End-to-end
//! replay protection does not depend on this layer; the crypto context
//! keeps its own per-peer seen set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("Replay store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// Backing store capability: one atomic conditional set, a single round
/// trip with no read-then-write race.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// `true` when the key was absent and is now set with `ttl`.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreUnavailable>;
}

// ── In-process store ─────────────────────────────────────────────────────────

/// TTL map with lazy expiry. Used in tests and single-node deployments.
#[derive(Default)]
pub struct MemoryReplayStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreUnavailable> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(expires_at) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

// ── Guard ────────────────────────────────────────────────────────────────────

pub struct ReplayGuard<S> {
    store: S,
    degraded: AtomicBool,
}

impl<S: ReplayStore> ReplayGuard<S> {
    pub fn new(store: S) -> Self {
        Self { store, degraded: AtomicBool::new(false) }
    }

    fn key(chat_id: &str, payload: &str) -> String {
        let digest = hex::encode(Sha256::digest(payload.as_bytes()));
        format!("replay:{chat_id}:{digest}")
    }

    /// `true` when the payload is fresh and may be stored. A store outage
    /// accepts the payload (fail open) and logs the degradation once; the
    /// latch resets on the first successful round trip so a later outage is
    /// logged again.
    pub async fn check(&self, chat_id: &str, payload: &str, ttl: Duration) -> bool {
        match self.store.set_if_absent(&Self::key(chat_id, payload), ttl).await {
            Ok(fresh) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("replay store recovered, protection restored");
                }
                fresh
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!(error = %e, "replay store unavailable, accepting without protection");
                }
                true
            }
        }
    }
}
