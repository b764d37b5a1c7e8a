//! Manifest loading, memoization, and persisted fallback.

use crate::error::{ErrorKind, Result};
use crate::model::Manifest;
use exn::ResultExt;
use stash_platform::{FetcherHandle, KvHandle, Request, RequestMode};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;
use url::Url;

/// Loads, memoizes, and persists the versioned resource manifest.
///
/// One loader instance lives for the whole worker process; install, warm-up
/// and request arbitration all consult the same memoized copy. Concurrent
/// `load` calls share a single in-flight network fetch: the memo sits behind
/// an async mutex held across the fetch, so the second caller finds the
/// first caller's result instead of fetching again.
pub struct ManifestLoader {
    fetcher: FetcherHandle,
    kv: KvHandle,
    document_url: Url,
    storage_key: String,
    memo: Mutex<Option<Arc<Manifest>>>,
}

impl ManifestLoader {
    pub fn new(fetcher: FetcherHandle, kv: KvHandle, document_url: Url, key_prefix: &str) -> Self {
        Self {
            fetcher,
            kv,
            document_url,
            storage_key: format!("{key_prefix}:manifest:body"),
            memo: Mutex::new(None),
        }
    }

    /// URL of the manifest document published by the build.
    pub fn document_url(&self) -> &Url {
        &self.document_url
    }

    /// Load the manifest.
    ///
    /// Without `force`, a memoized or persisted copy is returned without
    /// touching the network. Otherwise the document is fetched with
    /// cache-busting, persisted as the new last-known-good copy, and
    /// memoized. On fetch failure the last persisted copy is the fallback;
    /// with no fallback the error propagates to the caller.
    #[instrument(skip(self), fields(url = %self.document_url))]
    pub async fn load(&self, force: bool) -> Result<Arc<Manifest>> {
        let mut memo = self.memo.lock().await;
        if !force {
            if let Some(manifest) = memo.as_ref() {
                return Ok(manifest.clone());
            }
            if let Some(manifest) = self.read_persisted().await {
                let manifest = Arc::new(manifest);
                *memo = Some(manifest.clone());
                return Ok(manifest);
            }
        }
        match self.fetch_fresh().await {
            Ok(manifest) => {
                let manifest = Arc::new(manifest);
                *memo = Some(manifest.clone());
                Ok(manifest)
            },
            Err(error) => match self.read_persisted().await {
                Some(manifest) => {
                    tracing::warn!(error = %error, "Manifest fetch failed; using last persisted copy");
                    let manifest = Arc::new(manifest);
                    *memo = Some(manifest.clone());
                    Ok(manifest)
                },
                None => Err(error).or_raise(|| ErrorKind::Unavailable),
            },
        }
    }

    /// Drop the memoized and persisted copies so the next `load` must hit
    /// the network. Called when the manifest generation changes.
    pub async fn forget(&self) -> Result<()> {
        let mut memo = self.memo.lock().await;
        *memo = None;
        self.kv.remove(&self.storage_key).await.or_raise(|| ErrorKind::Store)
    }

    async fn fetch_fresh(&self) -> Result<Manifest> {
        let mut url = self.document_url.clone();
        // The manifest is the one document that must never be served stale
        // by an intermediary cache, so every fetch gets a unique query.
        url.query_pairs_mut().append_pair("v", &format!("{:08x}", rand::random::<u32>()));
        let request = Request::new(url, RequestMode::Fetch).with_header("cache-control", "no-cache");
        let response = self.fetcher.fetch(&request).await.or_raise(|| ErrorKind::Fetch)?;
        if !response.is_ok() {
            exn::bail!(ErrorKind::Status(response.status));
        }
        let manifest = Manifest::from_json(&response.body, &self.document_url)?;
        if let Err(error) = self.kv.set(&self.storage_key, &response.body).await {
            // Not fatal: the fresh copy is still usable, only the fallback
            // for a future offline load is missing.
            tracing::warn!(error = %error, "Failed to persist manifest body");
        }
        Ok(manifest)
    }

    async fn read_persisted(&self) -> Option<Manifest> {
        let body = self.kv.get(&self.storage_key).await.ok().flatten()?;
        match Manifest::from_json(&body, &self.document_url) {
            Ok(manifest) => Some(manifest),
            Err(error) => {
                tracing::warn!(error = %error, "Discarding unparseable persisted manifest");
                None
            },
        }
    }
}
