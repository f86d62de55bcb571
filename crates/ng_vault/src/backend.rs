//! Vault persistence backends.
//!
//! The store only needs `get`/`put` over opaque bytes, with `put` durable
//! and atomic on return: after any completed write the backend holds either
//! the previous value or the new one, never a torn mix. `MemoryBackend`
//! serves tests and in-process use; `FileBackend` writes a temp file and
//! renames it over the target.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::VaultError;

#[async_trait]
pub trait VaultBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError>;
    /// Atomic replace; durable when this returns.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), VaultError>;
}

#[async_trait]
impl<B: VaultBackend + ?Sized> VaultBackend for &B {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), VaultError> {
        (**self).put(key, value).await
    }
}

// ── In-memory backend ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VaultBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), VaultError> {
        self.entries.lock().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

// ── File backend ─────────────────────────────────────────────────────────────

/// One file per key under a base directory. Writes go to `<key>.tmp` first,
/// are fsynced, then renamed over `<key>.vault` — the visible file is never
/// half-written.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.vault"))
    }
}

#[async_trait]
impl VaultBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Backend(e.to_string())),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), VaultError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| VaultError::Backend(e.to_string()))?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.tmp"));

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| VaultError::Backend(e.to_string()))?;
        file.write_all(value)
            .await
            .map_err(|e| VaultError::Backend(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| VaultError::Backend(e.to_string()))?;
        drop(file);

        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| VaultError::Backend(e.to_string()))
    }
}
