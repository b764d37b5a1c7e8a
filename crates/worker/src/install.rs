//! Install-time seeding of the critical resource set.

use crate::config::EngineConfig;
use crate::error::{ErrorKind, Result};
use crate::state::EngineState;
use crate::store::ResourceStore;
use exn::ResultExt;
use futures::FutureExt;
use stash_asyncutils::run_bounded;
use stash_manifest::ManifestLoader;
use stash_platform::FetcherHandle;
use tracing::instrument;

/// Seed the install set, failing loudly when it cannot be completed.
///
/// Runs once per worker version, before activation. A changed manifest
/// generation resets all warm-up bookkeeping first. A seeding failure
/// propagates to the platform so the previous worker version stays in
/// control; a worker that cannot cache even its critical resources should
/// not take over.
#[instrument(skip_all)]
pub(crate) async fn run(
    loader: &ManifestLoader,
    store: &ResourceStore,
    state: &EngineState,
    fetcher: &FetcherHandle,
    config: &EngineConfig,
) -> Result<()> {
    let persisted = state.manifest_hash().await?;
    let changed = persisted.as_deref() != Some(config.build_hash.as_str());
    if changed {
        tracing::info!(hash = %config.build_hash, "Manifest generation changed; resetting warm-up state");
        state.set_manifest_hash(&config.build_hash).await?;
        state.set_force_flag(true).await?;
        state.set_warm_cursor(0).await?;
        loader.forget().await.or_raise(|| ErrorKind::Manifest)?;
    }
    let manifest = loader.load(changed).await.or_raise(|| ErrorKind::Manifest)?;
    let install = manifest.install_set();
    let completion = run_bounded(install, manifest.batch_size(), config.stagger(), |_, entry| {
        store.ensure_fresh(fetcher, entry).boxed()
    })
    .await;
    if let Some(index) = completion.failed_index {
        exn::bail!(ErrorKind::Seed(index));
    }
    tracing::info!(seeded = install.len(), "Install set cached");
    Ok(())
}
