//! ng_engine — Nightglass crypto execution context and facade
//!
//! All chain and key state is confined to a single actor task
//! ([`context::CryptoContext`]) that processes correlated requests one at a
//! time; [`facade::CryptoFacade`] is the application-side handle with
//! bounded waits, crash recovery, and a non-secret key-directory mirror.

pub mod context;
pub mod error;
pub mod facade;
pub mod store;

pub use context::{KeyDirectory, KeyMaterial};
pub use error::EngineError;
pub use facade::CryptoFacade;
pub use store::{LoadedMaterial, MaterialStore};
