//! Worker lifecycle entry points.
//!
//! A [`SiteWorker`] owns every engine component explicitly (no ambient
//! globals) and exposes the platform lifecycle as plain async methods:
//! install, activate, fetch, message. It is created once per worker process
//! and torn down with it; abandoning it mid-operation is always safe
//! because cache writes are idempotent and warm-up progress is persisted.

use crate::arbiter;
use crate::config::EngineConfig;
use crate::error::{ErrorKind, Result};
use crate::install;
use crate::lease::LeaseManager;
use crate::state::EngineState;
use crate::store::ResourceStore;
use crate::warmup::{self, WarmOutcome};
use exn::ResultExt;
use serde::Deserialize;
use stash_manifest::ManifestLoader;
use stash_platform::{CacheHandle, FetcherHandle, KvHandle, Request, Response};
use url::Url;

/// The long-lived coordinator for one worker process.
pub struct SiteWorker {
    config: EngineConfig,
    fetcher: FetcherHandle,
    loader: ManifestLoader,
    store: ResourceStore,
    state: EngineState,
    leases: LeaseManager,
}

impl std::fmt::Debug for SiteWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteWorker").finish_non_exhaustive()
    }
}

impl SiteWorker {
    /// Wire up a worker from the platform primitives the host provides.
    pub fn new(config: EngineConfig, fetcher: FetcherHandle, kv: KvHandle, cache: CacheHandle) -> Result<Self> {
        let document_url = Url::parse(&config.manifest_url).or_raise(|| ErrorKind::Config)?;
        let loader = ManifestLoader::new(fetcher.clone(), kv.clone(), document_url, &config.key_prefix);
        let store = ResourceStore::new(cache);
        let state = EngineState::new(kv.clone(), &config.key_prefix);
        let leases = LeaseManager::new(kv, &config.key_prefix);
        Ok(Self { config, fetcher, loader, store, state, leases })
    }

    /// Install hook: seed the critical resource set.
    ///
    /// An error here must be surfaced to the platform's install lifecycle so
    /// the previous worker version keeps running.
    pub async fn on_install(&self) -> Result<()> {
        install::run(&self.loader, &self.store, &self.state, &self.fetcher, &self.config).await
    }

    /// Activation hook: continue background warm-up from the persisted
    /// cursor. Best-effort; every failure is absorbed.
    pub async fn on_activate(&self) -> WarmOutcome {
        self.warm().await
    }

    /// Fetch hook: arbitrate one same-origin GET between cache and network.
    /// `preload` is the platform's optional navigation preload response.
    pub async fn on_fetch(&self, request: &Request, preload: Option<Response>) -> Response {
        arbiter::handle(&self.loader, &self.store, &self.fetcher, &self.config, request, preload).await
    }

    /// Message hook: react to wake signals posted by open pages. Returns
    /// `None` for payloads that are not recognized wake signals.
    pub async fn on_message(&self, payload: &[u8]) -> Option<WarmOutcome> {
        match serde_json::from_slice(payload) {
            Ok(WorkerMessage::WarmManifest) => Some(self.warm().await),
            Err(error) => {
                tracing::debug!(error = %error, "Ignoring unrecognized worker message");
                None
            },
        }
    }

    async fn warm(&self) -> WarmOutcome {
        match warmup::run(&self.loader, &self.store, &self.state, &self.leases, &self.fetcher, &self.config).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(error = %error, "Warm-up cycle failed");
                WarmOutcome::Skipped
            },
        }
    }
}

/// Wake signals accepted by [`SiteWorker::on_message`].
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Ask the worker to run an out-of-cycle warm-up pass.
    #[serde(rename = "WARM_MANIFEST")]
    WarmManifest,
}
