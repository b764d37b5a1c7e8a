//! Persisted engine state: warm cursor, force flag, manifest hash.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use stash_platform::KvHandle;

/// Cursor value meaning "every remainder entry has been cached".
pub const WARM_DONE: i64 = -1;

/// Typed accessors over the platform key-value store.
///
/// Absent keys read as defaults (cursor 0, flag clear, hash unknown), so a
/// first install starts from a coherent state without any migration step.
/// Values are JSON so a human poking at the store can read them.
pub struct EngineState {
    kv: KvHandle,
    cursor_key: String,
    force_key: String,
    hash_key: String,
}

impl EngineState {
    pub fn new(kv: KvHandle, key_prefix: &str) -> Self {
        Self {
            kv,
            cursor_key: format!("{key_prefix}:warm-cursor"),
            force_key: format!("{key_prefix}:force"),
            hash_key: format!("{key_prefix}:hash"),
        }
    }

    /// Index into the manifest remainder the next warm-up resumes from, or
    /// [`WARM_DONE`].
    pub async fn warm_cursor(&self) -> Result<i64> {
        Ok(self.read(&self.cursor_key).await?.unwrap_or(0))
    }

    pub async fn set_warm_cursor(&self, cursor: i64) -> Result<()> {
        self.write(&self.cursor_key, &cursor).await
    }

    /// Whether a manifest generation change demands re-validation of warm-up
    /// state previously considered complete.
    pub async fn force_flag(&self) -> Result<bool> {
        Ok(self.read(&self.force_key).await?.unwrap_or(false))
    }

    pub async fn set_force_flag(&self, force: bool) -> Result<()> {
        self.write(&self.force_key, &force).await
    }

    /// Manifest generation hash recorded by the last install.
    pub async fn manifest_hash(&self) -> Result<Option<String>> {
        self.read(&self.hash_key).await
    }

    pub async fn set_manifest_hash(&self, hash: &str) -> Result<()> {
        self.write(&self.hash_key, &hash).await
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.kv.get(key).await.or_raise(|| ErrorKind::State)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).or_raise(|| ErrorKind::State)
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).or_raise(|| ErrorKind::State)?;
        self.kv.set(key, &bytes).await.or_raise(|| ErrorKind::State)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_platform::kv::MemoryKv;
    use std::sync::Arc;

    fn state() -> EngineState {
        EngineState::new(Arc::new(MemoryKv::default()), "stash")
    }

    #[tokio::test]
    async fn test_defaults_before_first_write() {
        let state = state();
        assert_eq!(state.warm_cursor().await.unwrap(), 0);
        assert!(!state.force_flag().await.unwrap());
        assert_eq!(state.manifest_hash().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let state = state();
        state.set_warm_cursor(17).await.unwrap();
        state.set_force_flag(true).await.unwrap();
        state.set_manifest_hash("h1").await.unwrap();
        assert_eq!(state.warm_cursor().await.unwrap(), 17);
        assert!(state.force_flag().await.unwrap());
        assert_eq!(state.manifest_hash().await.unwrap(), Some("h1".to_string()));
    }

    #[tokio::test]
    async fn test_done_marker_roundtrips() {
        let state = state();
        state.set_warm_cursor(WARM_DONE).await.unwrap();
        assert_eq!(state.warm_cursor().await.unwrap(), WARM_DONE);
    }
}
