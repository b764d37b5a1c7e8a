//! Request-time cache/network arbitration.
//!
//! One entry point, [`handle`], picks a response for every incoming
//! same-origin GET. It never returns an error: timeouts, fetch exceptions
//! and cache misses all fall through to the next fallback tier, ending at
//! the not-found or offline page at worst.

use crate::config::EngineConfig;
use crate::store::ResourceStore;
use stash_manifest::{Manifest, ManifestLoader, clean_url_key, manifest_key};
use stash_platform::{FetcherHandle, Request, RequestMode, Response};
use std::time::Duration;
use tracing::instrument;
use url::Url;

const OFFLINE_BODY: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>Offline</h1><p>This page has not been saved for offline reading yet.</p></body></html>";

enum NetworkVerdict {
    /// A 2xx response, ready to serve (and, for tracked pages, to cache).
    Success(Response),
    /// The server definitively said the document does not exist.
    NotFound,
    /// Timeouts, transport errors, or server errors on every attempt.
    Unreachable,
}

/// Pick a response for one incoming same-origin GET.
#[instrument(skip_all, fields(url = %request.url))]
pub(crate) async fn handle(
    loader: &ManifestLoader,
    store: &ResourceStore,
    fetcher: &FetcherHandle,
    config: &EngineConfig,
    request: &Request,
    preload: Option<Response>,
) -> Response {
    // The manifest document is never intercepted, so clients can always
    // discover new revisions.
    if manifest_key(&request.url) == loader.document_url().as_str() {
        return match fetcher.fetch(request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(error = %error, "Manifest passthrough failed");
                Response::empty(request.url.clone(), 503)
            },
        };
    }
    // A missing manifest downgrades everything to untracked handling;
    // arbitration keeps answering regardless.
    let manifest = loader.load(false).await.ok();
    if request.is_document() {
        document_response(store, fetcher, config, request, manifest.as_deref(), preload).await
    } else {
        asset_response(store, fetcher, request, manifest.as_deref()).await
    }
}

/// Navigations and prefetches: clean-URL mapping, cache-first when fresh,
/// network race with layered fallbacks otherwise.
async fn document_response(
    store: &ResourceStore,
    fetcher: &FetcherHandle,
    config: &EngineConfig,
    request: &Request,
    manifest: Option<&Manifest>,
    preload: Option<Response>,
) -> Response {
    let key = clean_url_key(&request.url);
    let tracked = manifest.and_then(|manifest| manifest.revision_of(&key));
    let cached = store.lookup(&key).await.ok().flatten();
    if let Some(revision) = tracked
        && let Some(record) = cached.as_ref()
        && !ResourceStore::should_revalidate(Some(record), revision)
    {
        tracing::debug!(key, "Serving fresh cached document");
        return record.clone();
    }
    match network_document(fetcher, config, request, &key, preload).await {
        NetworkVerdict::Success(response) => {
            if let Some(revision) = tracked {
                // Tracked pages stay warm with whatever the network just
                // said; untracked ones are never persisted.
                if let Err(error) = store.put(&key, &response, revision).await {
                    tracing::warn!(key, error = %error, "Failed to refresh document cache");
                }
            }
            response
        },
        NetworkVerdict::NotFound => not_found_page(store, fetcher, config, request).await,
        NetworkVerdict::Unreachable => match cached {
            Some(record) => {
                tracing::debug!(key, "Network unreachable; serving cached copy");
                record
            },
            None => offline_page(&request.url),
        },
    }
}

/// Tracked assets: cache-with-revalidation; untracked assets: passthrough.
async fn asset_response(
    store: &ResourceStore,
    fetcher: &FetcherHandle,
    request: &Request,
    manifest: Option<&Manifest>,
) -> Response {
    let key = manifest_key(&request.url);
    let Some(revision) = manifest.and_then(|manifest| manifest.revision_of(&key)) else {
        return match fetcher.fetch(request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(key, error = %error, "Untracked asset fetch failed");
                Response::empty(request.url.clone(), 503)
            },
        };
    };
    let cached = store.lookup(&key).await.ok().flatten();
    if let Some(record) = cached.as_ref()
        && !ResourceStore::should_revalidate(Some(record), revision)
    {
        return record.clone();
    }
    match fetcher.fetch(request).await {
        Ok(response) if response.is_ok() => {
            if let Err(error) = store.put(&key, &response, revision).await {
                tracing::warn!(key, error = %error, "Failed to refresh asset cache");
            }
            response
        },
        // Non-success statuses are the server's answer; serve them
        // unmodified and keep the cache untouched.
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(key, error = %error, "Asset fetch failed");
            match cached {
                Some(record) => record,
                None => Response::empty(request.url.clone(), 503),
            }
        },
    }
}

/// The document network race: preload first, then the raw path, then the
/// clean-URL HTML variant, each attempt bounded by the configured timeout.
async fn network_document(
    fetcher: &FetcherHandle,
    config: &EngineConfig,
    request: &Request,
    html_key: &str,
    preload: Option<Response>,
) -> NetworkVerdict {
    // An unhealthy preload is skipped; the ladder below may do better.
    if let Some(preload) = preload
        && preload.is_ok()
    {
        tracing::debug!("Serving navigation preload");
        return NetworkVerdict::Success(preload);
    }
    let mut observed: Option<Response> = None;
    for url in attempt_urls(request, html_key) {
        match attempt(fetcher, url, request.mode, config.nav_timeout()).await {
            Some(response) if response.is_ok() => return NetworkVerdict::Success(response),
            Some(response) => observed = Some(response),
            None => {},
        }
    }
    match observed {
        Some(response) if response.status == 404 => NetworkVerdict::NotFound,
        _ => NetworkVerdict::Unreachable,
    }
}

/// The raw request URL, then the mapped HTML file when it differs.
fn attempt_urls(request: &Request, html_key: &str) -> Vec<Url> {
    let mut urls = vec![request.url.clone()];
    if manifest_key(&request.url) != html_key
        && let Ok(variant) = Url::parse(html_key)
    {
        urls.push(variant);
    }
    urls
}

async fn attempt(fetcher: &FetcherHandle, url: Url, mode: RequestMode, timeout: Duration) -> Option<Response> {
    let request = Request::new(url, mode);
    match tokio::time::timeout(timeout, fetcher.fetch(&request)).await {
        Ok(Ok(response)) => Some(response),
        Ok(Err(error)) => {
            tracing::debug!(url = %request.url, error = %error, "Document fetch failed");
            None
        },
        Err(_) => {
            tracing::debug!(url = %request.url, "Document fetch timed out");
            None
        },
    }
}

/// The dedicated not-found page, served with status 404. Cached, with a
/// network refresh on miss so the next offline 404 still has a body.
async fn not_found_page(
    store: &ResourceStore,
    fetcher: &FetcherHandle,
    config: &EngineConfig,
    request: &Request,
) -> Response {
    let key = match request.url.join(&config.not_found_path) {
        Ok(url) => manifest_key(&url),
        Err(error) => {
            tracing::warn!(path = %config.not_found_path, error = %error, "Unresolvable not-found page path");
            return offline_page(&request.url);
        },
    };
    if let Ok(Some(record)) = store.lookup(&key).await {
        return record.with_status(404);
    }
    if store.refresh(fetcher, &key, None).await {
        if let Ok(Some(record)) = store.lookup(&key).await {
            return record.with_status(404);
        }
    }
    offline_page(&request.url)
}

/// Generic offline fallback when no better tier has anything to say.
fn offline_page(url: &Url) -> Response {
    Response::html(url.clone(), 503, OFFLINE_BODY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::REVISION_HEADER;
    use stash_platform::cache::MemoryCache;
    use stash_platform::fetch::MockFetcher;
    use stash_platform::kv::MemoryKv;
    use std::sync::Arc;

    const DOCUMENT: &str = "https://site.example/stash-manifest.json";

    struct World {
        loader: ManifestLoader,
        store: ResourceStore,
        fetcher: Arc<MockFetcher>,
        handle: FetcherHandle,
        config: EngineConfig,
    }

    impl World {
        async fn handle(&self, request: &Request) -> Response {
            handle(&self.loader, &self.store, &self.handle, &self.config, request, None).await
        }

        async fn handle_with_preload(&self, request: &Request, preload: Response) -> Response {
            handle(&self.loader, &self.store, &self.handle, &self.config, request, Some(preload)).await
        }
    }

    /// A world whose manifest tracks `/docs/guide.html` (r1) and `/app.js`
    /// (r1), already loaded into the loader's memo.
    async fn world() -> World {
        let manifest_body = r#"{"entries": [
                {"url": "/docs/guide.html", "revision": "r1"},
                {"url": "/app.js", "revision": "r1"}
            ], "installCount": 0, "batchSize": 1, "hash": "h1"}"#;
        let fetcher = Arc::new(MockFetcher::with_responses([(
            DOCUMENT,
            Response::new(Url::parse(DOCUMENT).unwrap(), 200).with_body(manifest_body),
        )]));
        let handle: FetcherHandle = fetcher.clone();
        let loader = ManifestLoader::new(handle.clone(), Arc::new(MemoryKv::default()), Url::parse(DOCUMENT).unwrap(), "stash");
        loader.load(false).await.unwrap();
        let config = EngineConfig {
            manifest_url: DOCUMENT.to_string(),
            nav_timeout_secs: 1,
            stagger_ms: 0,
            ..EngineConfig::default()
        };
        World { loader, store: ResourceStore::new(Arc::new(MemoryCache::default())), fetcher, handle, config }
    }

    fn navigate(url: &str) -> Request {
        Request::new(Url::parse(url).unwrap(), RequestMode::Navigate)
    }

    fn fetch(url: &str) -> Request {
        Request::new(Url::parse(url).unwrap(), RequestMode::Fetch)
    }

    fn page(url: &str, body: &str) -> Response {
        Response::html(Url::parse(url).unwrap(), 200, body)
    }

    #[tokio::test]
    async fn test_manifest_document_always_passes_to_network() {
        let world = world().await;
        let before = world.fetcher.hits(DOCUMENT).await;
        let response = world.handle(&fetch(DOCUMENT)).await;
        assert_eq!(response.status, 200);
        assert_eq!(world.fetcher.hits(DOCUMENT).await, before + 1);
    }

    #[tokio::test]
    async fn test_fresh_tracked_navigation_is_served_from_cache() {
        let world = world().await;
        let key = "https://site.example/docs/guide.html";
        world.store.put(key, &page(key, "cached"), Some("r1")).await.unwrap();
        // Clean URL maps onto the cached HTML file; no network route exists,
        // so any fetch attempt would fail the test body check.
        let response = world.handle(&navigate("https://site.example/docs/guide")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"cached");
        assert_eq!(world.fetcher.hits(key).await, 0);
    }

    #[tokio::test]
    async fn test_stale_tracked_navigation_refreshes_cache_from_network() {
        let world = world().await;
        let key = "https://site.example/docs/guide.html";
        world.store.put(key, &page(key, "old").with_header(REVISION_HEADER, "r0"), Some("r0")).await.unwrap();
        world.fetcher.respond(key, page(key, "new")).await;
        let response = world.handle(&navigate("https://site.example/docs/guide.html")).await;
        assert_eq!(response.body, b"new");
        let record = world.store.lookup(key).await.unwrap().unwrap();
        assert_eq!(record.body, b"new");
        assert_eq!(record.header(REVISION_HEADER), Some("r1"));
    }

    #[tokio::test]
    async fn test_clean_url_variant_is_tried_when_raw_path_fails() {
        let world = world().await;
        let key = "https://site.example/docs/guide.html";
        // The raw clean URL has no route (transport error); the mapped HTML
        // file answers.
        world.fetcher.respond(key, page(key, "mapped")).await;
        let response = world.handle(&navigate("https://site.example/docs/guide")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"mapped");
    }

    #[tokio::test]
    async fn test_unreachable_network_falls_back_to_cached_copy() {
        let world = world().await;
        let key = "https://site.example/docs/guide.html";
        world.store.put(key, &page(key, "stale").with_header(REVISION_HEADER, "r0"), Some("r0")).await.unwrap();
        // No routes at all: both attempts fail at the transport level.
        let response = world.handle(&navigate("https://site.example/docs/guide")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"stale");
    }

    #[tokio::test]
    async fn test_offline_page_when_nothing_is_cached() {
        let world = world().await;
        let response = world.handle(&navigate("https://site.example/missing")).await;
        assert_eq!(response.status, 503);
        assert!(String::from_utf8_lossy(&response.body).contains("Offline"));
    }

    #[tokio::test]
    async fn test_untracked_navigation_with_old_cached_copy_survives_outage() {
        let world = world().await;
        // A copy cached under a previous manifest generation still serves.
        let key = "https://site.example/missing.html";
        world.store.put(key, &page(key, "old generation"), Some("r9")).await.unwrap();
        let response = world.handle(&navigate("https://site.example/missing")).await;
        assert_eq!(response.body, b"old generation");
    }

    #[tokio::test]
    async fn test_untracked_navigation_success_writes_nothing() {
        let world = world().await;
        let key = "https://site.example/landing.html";
        world.fetcher.respond(key, page(key, "landing")).await;
        let response = world.handle(&navigate("https://site.example/landing")).await;
        assert_eq!(response.body, b"landing");
        assert!(world.store.lookup(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_404_serves_dedicated_not_found_page() {
        let world = world().await;
        let gone = "https://site.example/gone.html";
        world.fetcher.respond(gone, Response::new(Url::parse(gone).unwrap(), 404)).await;
        world.fetcher.respond("https://site.example/404.html", page("https://site.example/404.html", "not here")).await;
        let response = world.handle(&navigate("https://site.example/gone.html")).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body, b"not here");
        // Refresh-on-miss cached the page for the next offline 404.
        assert!(world.store.lookup("https://site.example/404.html").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_healthy_preload_wins_the_race() {
        let world = world().await;
        let key = "https://site.example/docs/guide.html";
        world.store.put(key, &page(key, "stale").with_header(REVISION_HEADER, "r0"), Some("r0")).await.unwrap();
        let preload = page(key, "preloaded");
        let response = world.handle_with_preload(&navigate("https://site.example/docs/guide"), preload).await;
        assert_eq!(response.body, b"preloaded");
        // The preload refreshed the cache too.
        assert_eq!(world.store.lookup(key).await.unwrap().unwrap().body, b"preloaded");
    }

    #[tokio::test]
    async fn test_fresh_tracked_asset_is_served_from_cache() {
        let world = world().await;
        let key = "https://site.example/app.js";
        let record = Response::new(Url::parse(key).unwrap(), 200).with_body("js").with_header(REVISION_HEADER, "r1");
        world.store.put(key, &record, Some("r1")).await.unwrap();
        let response = world.handle(&fetch("https://site.example/app.js?version=1")).await;
        assert_eq!(response.body, b"js");
        assert_eq!(world.fetcher.hits(key).await, 0);
    }

    #[tokio::test]
    async fn test_stale_tracked_asset_updates_cache_on_200() {
        let world = world().await;
        let key = "https://site.example/app.js";
        world.fetcher.respond(key, Response::new(Url::parse(key).unwrap(), 200).with_body("fresh js")).await;
        let response = world.handle(&fetch(key)).await;
        assert_eq!(response.body, b"fresh js");
        let record = world.store.lookup(key).await.unwrap().unwrap();
        assert_eq!(record.header(REVISION_HEADER), Some("r1"));
    }

    #[tokio::test]
    async fn test_tracked_asset_outage_falls_back_to_cache_then_503() {
        let world = world().await;
        let key = "https://site.example/app.js";
        // Nothing cached, nothing routable: empty 503.
        let response = world.handle(&fetch(key)).await;
        assert_eq!(response.status, 503);
        assert!(response.body.is_empty());
        // With a cached copy, the copy wins.
        let record = Response::new(Url::parse(key).unwrap(), 200).with_body("js").with_header(REVISION_HEADER, "r0");
        world.store.put(key, &record, Some("r0")).await.unwrap();
        let response = world.handle(&fetch(key)).await;
        assert_eq!(response.body, b"js");
    }

    #[tokio::test]
    async fn test_untracked_asset_passes_through() {
        let world = world().await;
        let key = "https://site.example/analytics.js";
        world.fetcher.respond(key, Response::new(Url::parse(key).unwrap(), 200).with_body("tracker")).await;
        let response = world.handle(&fetch(key)).await;
        assert_eq!(response.body, b"tracker");
        assert!(world.store.lookup(key).await.unwrap().is_none());
    }
}
