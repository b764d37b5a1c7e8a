//! Persistent key-value store contract and test double.

use crate::error::Result;
use async_trait::async_trait;

/// Small persistent key-value store.
///
/// Backs everything the engine must remember across restarts: the warm-up
/// cursor, the lease record, the force flag, the manifest hash and the
/// persisted manifest body. Values are opaque bytes; callers own the
/// encoding. Individual operations are atomic at the platform level, last
/// write wins per key.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[cfg(feature = "mock")]
pub use self::mock::MemoryKv;

#[cfg(feature = "mock")]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// In-memory [`KvStore`] for tests.
    #[derive(Default)]
    pub struct MemoryKv {
        entries: RwLock<HashMap<String, Vec<u8>>>,
    }

    impl MemoryKv {
        /// Snapshot of the stored keys, for assertions on persisted state.
        pub async fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
            keys.sort();
            keys
        }
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.entries.read().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            self.entries.write().await.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.entries.write().await.remove(key);
            Ok(())
        }
    }

}
