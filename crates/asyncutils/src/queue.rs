//! Bounded-concurrency draining of an ordered work list.
//!
//! A small cooperative scheduler: N logical workers pull items off a shared
//! cursor in list order, await an async handler per item, and stop claiming
//! new work as soon as any handler reports failure. Nothing here is a true
//! thread; "concurrency" means logically-parallel in-flight futures
//! interleaved at await points.

use futures::future::{BoxFuture, join_all};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const NO_FAILURE: usize = usize::MAX;

/// Result of a [`run_bounded`] drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Lowest index whose handler reported failure, or `None` when every
    /// item succeeded. Callers use this to distinguish "all done" from
    /// "stop and resume from index N".
    pub failed_index: Option<usize>,
}

impl Completion {
    pub fn succeeded(&self) -> bool {
        self.failed_index.is_none()
    }
}

/// Drain `items` through `handler` with at most `concurrency` in flight.
///
/// Items are *started* in list order but may *complete* out of order. A
/// handler returning `false` marks that index as failed and stops workers
/// from claiming further items; handlers already in flight run to
/// completion but their results are discarded, except that a failure at a
/// lower index still wins: the reported index is always the leftmost
/// failure observed in the run, which is what makes resumption from it
/// correct.
///
/// Worker *k* waits `k × stagger` before its first claim so a large batch
/// does not open every connection in the same instant.
///
/// There is no cancellation: tearing down the surrounding task simply
/// abandons in-flight work, which callers must (and here do) tolerate by
/// making every item idempotent.
pub async fn run_bounded<'a, T, F>(items: &'a [T], concurrency: usize, stagger: Duration, handler: F) -> Completion
where
    F: Fn(usize, &'a T) -> BoxFuture<'a, bool>,
{
    if items.is_empty() {
        return Completion { failed_index: None };
    }
    let next = AtomicUsize::new(0);
    let failed = AtomicUsize::new(NO_FAILURE);
    let workers = concurrency.clamp(1, items.len());
    let worker = |lane: usize| {
        let (next, failed, handler) = (&next, &failed, &handler);
        async move {
            if lane > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger * lane as u32).await;
            }
            while failed.load(Ordering::SeqCst) == NO_FAILURE {
                let index = next.fetch_add(1, Ordering::SeqCst);
                if index >= items.len() {
                    break;
                }
                if !handler(index, &items[index]).await {
                    failed.fetch_min(index, Ordering::SeqCst);
                    break;
                }
            }
        }
    };
    join_all((0..workers).map(worker)).await;
    match failed.into_inner() {
        NO_FAILURE => Completion { failed_index: None },
        index => Completion { failed_index: Some(index) },
    }
}
