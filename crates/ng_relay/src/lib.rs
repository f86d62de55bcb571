//! ng_relay — Relay-side plumbing for Nightglass
//!
//! The relay never holds plaintext or key material. It provides:
//! - a TTL replay guard over submitted ciphertexts (fail-open, logged)
//! - a SQLite-backed message log with cursor pagination
//!
//! # Migration
//! SQLx migrations in `migrations/` run on open.

pub mod config;
pub mod error;
pub mod log;
pub mod replay;

pub use config::RelayConfig;
pub use error::RelayError;
pub use log::{HistoryPage, MessageLog};
pub use replay::{MemoryReplayStore, ReplayGuard, ReplayStore, StoreUnavailable};
