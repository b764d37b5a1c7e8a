//! Content cache contract and test double.

use crate::error::Result;
use crate::models::Response;
use async_trait::async_trait;

/// Content-addressable response cache with named namespaces.
///
/// The engine keeps two disjoint namespaces (`pages` and `assets`); the
/// platform provides the storage. Keys are already normalized by the caller
/// (query and fragment stripped), so implementations can treat them as
/// opaque strings. Writes are idempotent overwrites; per-key operations are
/// atomic at the platform level, last write wins.
#[async_trait]
pub trait ContentCache: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Response>>;
    async fn put(&self, namespace: &str, key: &str, response: &Response) -> Result<()>;
    async fn remove(&self, namespace: &str, key: &str) -> Result<()>;
}

#[cfg(feature = "mock")]
pub use self::mock::MemoryCache;

#[cfg(feature = "mock")]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// In-memory [`ContentCache`] for tests.
    #[derive(Default)]
    pub struct MemoryCache {
        entries: RwLock<HashMap<(String, String), Response>>,
    }

    impl MemoryCache {
        /// Number of records in one namespace.
        pub async fn len(&self, namespace: &str) -> usize {
            self.entries.read().await.keys().filter(|(ns, _)| ns == namespace).count()
        }

        /// Whether one namespace holds a record under `key`.
        pub async fn contains(&self, namespace: &str, key: &str) -> bool {
            self.entries.read().await.contains_key(&(namespace.to_string(), key.to_string()))
        }
    }

    #[async_trait]
    impl ContentCache for MemoryCache {
        async fn get(&self, namespace: &str, key: &str) -> Result<Option<Response>> {
            Ok(self.entries.read().await.get(&(namespace.to_string(), key.to_string())).cloned())
        }

        async fn put(&self, namespace: &str, key: &str, response: &Response) -> Result<()> {
            self.entries.write().await.insert((namespace.to_string(), key.to_string()), response.clone());
            Ok(())
        }

        async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
            self.entries.write().await.remove(&(namespace.to_string(), key.to_string()));
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use url::Url;

        fn response(url: &str, body: &str) -> Response {
            Response::html(Url::parse(url).unwrap(), 200, body)
        }

        #[tokio::test]
        async fn test_namespaces_are_disjoint() {
            let cache = MemoryCache::default();
            cache.put("pages", "https://site.example/a.html", &response("https://site.example/a.html", "a")).await.unwrap();
            assert!(cache.get("pages", "https://site.example/a.html").await.unwrap().is_some());
            assert!(cache.get("assets", "https://site.example/a.html").await.unwrap().is_none());
            assert_eq!(cache.len("pages").await, 1);
            assert_eq!(cache.len("assets").await, 0);
        }

        #[tokio::test]
        async fn test_put_overwrites() {
            let cache = MemoryCache::default();
            let key = "https://site.example/a.html";
            cache.put("pages", key, &response(key, "old")).await.unwrap();
            cache.put("pages", key, &response(key, "new")).await.unwrap();
            assert_eq!(cache.len("pages").await, 1);
            assert_eq!(cache.get("pages", key).await.unwrap().unwrap().body, b"new");
        }

        #[tokio::test]
        async fn test_remove() {
            let cache = MemoryCache::default();
            let key = "https://site.example/a.html";
            cache.put("pages", key, &response(key, "a")).await.unwrap();
            cache.remove("pages", key).await.unwrap();
            assert!(!cache.contains("pages", key).await);
        }
    }
}
