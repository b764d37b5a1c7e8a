//! Revision-tagged resource store over the platform content cache.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use stash_manifest::{ManifestEntry, is_page, manifest_key};
use stash_platform::{CacheHandle, FetcherHandle, Request, RequestMode, Response};
use url::Url;

/// Cache namespace for HTML documents.
pub const PAGES: &str = "pages";
/// Cache namespace for everything else.
pub const ASSETS: &str = "assets";
/// Synthetic header carrying the revision a record was cached at.
pub const REVISION_HEADER: &str = "x-stash-revision";

/// The two named content caches plus the revision-tagging convention
/// layered on top of them.
///
/// Keys are manifest keys (query and fragment already stripped); a key maps
/// to at most one record per namespace and every write is an idempotent
/// overwrite, so interleaved writes from a live request and a background
/// warm-up are safe.
pub struct ResourceStore {
    cache: CacheHandle,
}

impl ResourceStore {
    pub fn new(cache: CacheHandle) -> Self {
        Self { cache }
    }

    fn namespace(key: &str) -> &'static str {
        if is_page(key) { PAGES } else { ASSETS }
    }

    pub async fn lookup(&self, key: &str) -> Result<Option<Response>> {
        self.cache.get(Self::namespace(key), key).await.or_raise(|| ErrorKind::Store)
    }

    /// Write a record under `key`, tagged with the revision it was fetched
    /// at. When the response was redirected, the same record is also stored
    /// under the final URL's key, so future lookups by either URL hit.
    pub async fn put(&self, key: &str, response: &Response, revision: Option<&str>) -> Result<()> {
        let mut record = response.clone();
        if let Some(revision) = revision {
            record = record.with_header(REVISION_HEADER, revision);
        }
        self.cache.put(Self::namespace(key), key, &record).await.or_raise(|| ErrorKind::Store)?;
        let final_key = manifest_key(&response.url);
        if final_key != key {
            self.cache.put(Self::namespace(&final_key), &final_key, &record).await.or_raise(|| ErrorKind::Store)?;
        }
        Ok(())
    }

    /// Whether a cached record must be refreshed against `current`.
    ///
    /// No record means yes. An unknown current revision means no, since
    /// resources the build does not hash are trusted once cached. Otherwise
    /// the stored tag is compared to `current` as opaque strings.
    pub fn should_revalidate(cached: Option<&Response>, current: Option<&str>) -> bool {
        let Some(record) = cached else {
            return true;
        };
        let Some(current) = current else {
            return false;
        };
        record.header(REVISION_HEADER) != Some(current)
    }

    /// Fetch `key` over the network and cache a successful response under
    /// `revision`. Returns `false` on any failure. Failures here are always
    /// somebody's soft path (a warm-up checkpoint or a request fallback),
    /// so they are logged and absorbed rather than raised.
    pub async fn refresh(&self, fetcher: &FetcherHandle, key: &str, revision: Option<&str>) -> bool {
        let Ok(url) = Url::parse(key) else {
            tracing::warn!(key, "Unfetchable cache key");
            return false;
        };
        let request = Request::new(url, RequestMode::Fetch);
        match fetcher.fetch(&request).await {
            Ok(response) if response.is_ok() => match self.put(key, &response, revision).await {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(key, error = %error, "Failed to cache fetched resource");
                    false
                },
            },
            Ok(response) => {
                tracing::debug!(key, status = response.status, "Not caching non-success response");
                false
            },
            Err(error) => {
                tracing::debug!(key, error = %error, "Fetch failed");
                false
            },
        }
    }

    /// The shared install/warm-up step for one manifest entry: skip when the
    /// cached record is already at the entry's revision, refresh otherwise.
    pub async fn ensure_fresh(&self, fetcher: &FetcherHandle, entry: &ManifestEntry) -> bool {
        let cached = match self.lookup(&entry.url).await {
            Ok(cached) => cached,
            Err(error) => {
                tracing::warn!(key = %entry.url, error = %error, "Cache lookup failed; revalidating");
                None
            },
        };
        if !Self::should_revalidate(cached.as_ref(), entry.revision.as_deref()) {
            return true;
        }
        self.refresh(fetcher, &entry.url, entry.revision.as_deref()).await
    }
}
