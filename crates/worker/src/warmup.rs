//! Crash-resumable background warm-up of the manifest remainder.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::lease::{Lease, LeaseManager};
use crate::state::{EngineState, WARM_DONE};
use crate::store::ResourceStore;
use futures::FutureExt;
use stash_asyncutils::run_bounded;
use stash_manifest::{Manifest, ManifestLoader};
use stash_platform::FetcherHandle;
use tracing::instrument;

/// Outcome of one warm-up cycle.
///
/// Consumers can pattern-match to decide whether to log, schedule another
/// wake, or leave the engine alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmOutcome {
    /// Every remaining manifest entry was validated or fetched this cycle.
    Completed,
    /// A previous cycle had already finished this manifest generation.
    AlreadyWarm,
    /// Another execution context holds the warm-up lease.
    Busy,
    /// An entry failed; progress was checkpointed at the reported remainder
    /// index and the next cycle resumes exactly there.
    Suspended { resume_at: usize },
    /// The manifest was unavailable; nothing was attempted.
    Skipped,
}

/// Continue warming the manifest remainder from the persisted cursor.
///
/// Safe to invoke repeatedly and concurrently: the lease serializes actual
/// work, everything else is a cheap exit. A cycle that cannot even load the
/// manifest reports [`WarmOutcome::Skipped`] instead of raising.
#[instrument(skip_all)]
pub(crate) async fn run(
    loader: &ManifestLoader,
    store: &ResourceStore,
    state: &EngineState,
    leases: &LeaseManager,
    fetcher: &FetcherHandle,
    config: &EngineConfig,
) -> Result<WarmOutcome> {
    let manifest = match loader.load(false).await {
        Ok(manifest) => manifest,
        Err(error) => {
            tracing::debug!(error = %error, "Manifest unavailable; skipping warm-up cycle");
            return Ok(WarmOutcome::Skipped);
        },
    };
    let force = state.force_flag().await?;
    let cursor = match (state.warm_cursor().await?, force) {
        (WARM_DONE, false) => return Ok(WarmOutcome::AlreadyWarm),
        // Force re-enables progress that was previously considered complete.
        (WARM_DONE, true) => 0,
        (cursor, _) => cursor.max(0) as usize,
    };
    if cursor >= manifest.remainder().len() {
        state.set_warm_cursor(WARM_DONE).await?;
        state.set_force_flag(false).await?;
        return Ok(WarmOutcome::AlreadyWarm);
    }
    let Some(lease) = leases.try_acquire(config.lease_ttl()).await? else {
        tracing::debug!("Warm-up lease held elsewhere");
        return Ok(WarmOutcome::Busy);
    };
    let outcome = warm_from(cursor, &manifest, store, state, leases, &lease, fetcher, config).await;
    // Hand the lease back on every path, even a failed checkpoint.
    if let Err(error) = leases.release(&lease).await {
        tracing::warn!(error = %error, "Failed to release warm-up lease");
    }
    outcome
}

async fn warm_from(
    cursor: usize,
    manifest: &Manifest,
    store: &ResourceStore,
    state: &EngineState,
    leases: &LeaseManager,
    lease: &Lease,
    fetcher: &FetcherHandle,
    config: &EngineConfig,
) -> Result<WarmOutcome> {
    let pending = &manifest.remainder()[cursor..];
    tracing::info!(from = cursor, pending = pending.len(), "Resuming background warm-up");
    let completion = run_bounded(pending, manifest.batch_size(), config.stagger(), |_, entry| {
        async move {
            // Losing the lease means another context took over; fail the
            // item so this run stops and checkpoints without processing it.
            match leases.renew(lease, config.lease_ttl()).await {
                Ok(true) => store.ensure_fresh(fetcher, entry).await,
                Ok(false) => {
                    tracing::warn!("Warm-up lease lost; aborting run");
                    false
                },
                Err(error) => {
                    tracing::warn!(error = %error, "Lease renewal failed; aborting run");
                    false
                },
            }
        }
        .boxed()
    })
    .await;
    match completion.failed_index {
        Some(failed) => {
            let resume_at = cursor + failed;
            state.set_warm_cursor(resume_at as i64).await?;
            tracing::info!(resume_at, "Warm-up suspended at first unresolved entry");
            Ok(WarmOutcome::Suspended { resume_at })
        },
        None => {
            state.set_warm_cursor(WARM_DONE).await?;
            state.set_force_flag(false).await?;
            tracing::info!("Warm-up complete");
            Ok(WarmOutcome::Completed)
        },
    }
}
