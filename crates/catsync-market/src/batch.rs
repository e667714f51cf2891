//! Bounded-concurrency fan-out for batched facet lookups.
//!
//! Marketplace facet endpoints accept at most a few hundred identifiers per
//! call. [`chunk_ids`] splits an identifier set into ceiling-sized batches and
//! [`run_batched`] issues them with a small concurrency window plus a fixed
//! inter-batch delay. One batch failing (after the adapter's own retries)
//! never aborts its siblings; failures are returned alongside the successes
//! so the caller decides between "degraded" and "failed".

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::MarketError;

/// Splits `ids` into ordered, non-overlapping batches of at most `ceiling`
/// identifiers. Covers the input exactly once: `ceil(ids.len() / ceiling)`
/// batches in total.
#[must_use]
pub fn chunk_ids(ids: &[String], ceiling: usize) -> Vec<Vec<String>> {
    let ceiling = ceiling.max(1);
    ids.chunks(ceiling).map(<[String]>::to_vec).collect()
}

/// A batch that failed after the adapter exhausted its retries.
#[derive(Debug)]
pub struct FailedBatch {
    pub ids: Vec<String>,
    pub error: MarketError,
}

/// Union of all successful batch results plus the batches that failed.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub ok: Vec<T>,
    pub failed: Vec<FailedBatch>,
}

/// Cumulative progress after each completed batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress {
    pub completed_batches: usize,
    pub total_batches: usize,
}

/// Issues `call` for every batch with at most `concurrency` calls in flight.
///
/// A fixed `inter_batch_delay_ms` is applied before every batch after the
/// first, regardless of the concurrency window, to smooth bursts against
/// per-minute rate ceilings. Batches may complete out of order; callers must
/// be order-independent (the reconciliation merger is, by construction).
///
/// `on_progress` fires after every completed batch — success or failure —
/// with cumulative counts.
///
/// # Errors
///
/// Returns [`MarketError::Cancelled`] as soon as a not-yet-started batch
/// observes the tripped token. Individual batch failures are NOT errors of
/// the fan-out; they are collected into [`BatchOutcome::failed`].
pub async fn run_batched<T, F, Fut, P>(
    batches: Vec<Vec<String>>,
    concurrency: usize,
    inter_batch_delay_ms: u64,
    cancel: &CancellationToken,
    mut on_progress: P,
    call: F,
) -> Result<BatchOutcome<T>, MarketError>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: std::future::Future<Output = Result<T, MarketError>>,
    P: FnMut(BatchProgress),
{
    let total_batches = batches.len();
    let call = &call;

    let mut in_flight = stream::iter(batches.into_iter().enumerate().map(|(idx, ids)| {
        let cancel = cancel.clone();
        async move {
            if idx > 0 && inter_batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(inter_batch_delay_ms)).await;
            }
            if cancel.is_cancelled() {
                return (ids, Err(MarketError::Cancelled));
            }
            let result = call(ids.clone()).await;
            (ids, result)
        }
    }))
    .buffer_unordered(concurrency.max(1));

    let mut ok = Vec::new();
    let mut failed = Vec::new();
    let mut completed = 0usize;

    while let Some((ids, result)) = in_flight.next().await {
        match result {
            Ok(value) => ok.push(value),
            Err(MarketError::Cancelled) => return Err(MarketError::Cancelled),
            Err(error) => {
                tracing::warn!(
                    batch_size = ids.len(),
                    error = %error,
                    "facet batch failed after retries — recording and continuing"
                );
                failed.push(FailedBatch { ids, error });
            }
        }
        completed += 1;
        on_progress(BatchProgress {
            completed_batches: completed,
            total_batches,
        });
    }

    Ok(BatchOutcome { ok, failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{i}")).collect()
    }

    #[test]
    fn chunk_ids_produces_exactly_ceil_m_over_c_batches() {
        for (m, c, expected) in [(0usize, 200usize, 0usize), (1, 200, 1), (200, 200, 1), (201, 200, 2), (1000, 200, 5), (1001, 200, 6)] {
            let batches = chunk_ids(&ids(m), c);
            assert_eq!(batches.len(), expected, "m={m} c={c}");
            assert!(batches.iter().all(|b| b.len() <= c));
        }
    }

    #[test]
    fn chunk_ids_covers_input_exactly_once() {
        let input = ids(1_001);
        let batches = chunk_ids(&input, 200);
        let mut seen = HashSet::new();
        let mut count = 0usize;
        for batch in &batches {
            for id in batch {
                assert!(seen.insert(id.clone()), "duplicate id {id}");
                count += 1;
            }
        }
        assert_eq!(count, input.len());
    }

    #[test]
    fn chunk_ids_treats_zero_ceiling_as_one() {
        let batches = chunk_ids(&ids(3), 0);
        assert_eq!(batches.len(), 3);
    }

    #[tokio::test]
    async fn collects_all_successful_batches() {
        let batches = chunk_ids(&ids(10), 3);
        let outcome = run_batched(
            batches,
            2,
            0,
            &CancellationToken::new(),
            |_| {},
            |batch| async move { Ok::<usize, MarketError>(batch.len()) },
        )
        .await
        .expect("fan-out should succeed");
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.ok.iter().sum::<usize>(), 10);
    }

    #[tokio::test]
    async fn failed_batch_does_not_abort_siblings() {
        let batches = chunk_ids(&ids(9), 3);
        let outcome = run_batched(
            batches,
            2,
            0,
            &CancellationToken::new(),
            |_| {},
            |batch| async move {
                if batch.contains(&"id-3".to_string()) {
                    Err(MarketError::UnexpectedStatus {
                        status: 500,
                        url: "https://api.example.com".to_owned(),
                    })
                } else {
                    Ok::<usize, MarketError>(batch.len())
                }
            },
        )
        .await
        .expect("fan-out itself should not error");
        assert_eq!(outcome.ok.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].ids, vec!["id-3", "id-4", "id-5"]);
    }

    #[tokio::test]
    async fn progress_fires_after_every_batch_with_cumulative_counts() {
        let batches = chunk_ids(&ids(8), 2);
        let mut seen = Vec::new();
        run_batched(
            batches,
            1,
            0,
            &CancellationToken::new(),
            |p| seen.push((p.completed_batches, p.total_batches)),
            |batch| async move { Ok::<usize, MarketError>(batch.len()) },
        )
        .await
        .expect("fan-out should succeed");
        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[tokio::test]
    async fn concurrency_window_is_respected() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let batches = chunk_ids(&ids(12), 2);

        let c = Arc::clone(&current);
        let p = Arc::clone(&peak);
        run_batched(
            batches,
            2,
            0,
            &CancellationToken::new(),
            |_| {},
            move |batch| {
                let current = Arc::clone(&c);
                let peak = Arc::clone(&p);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<usize, MarketError>(batch.len())
                }
            },
        )
        .await
        .expect("fan-out should succeed");
        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "more than 2 batches were in flight"
        );
    }

    #[tokio::test]
    async fn cancellation_stops_unstarted_batches() {
        let cancel = CancellationToken::new();
        let launched = Arc::new(AtomicUsize::new(0));
        let batches = chunk_ids(&ids(10), 1);

        let cancel_inner = cancel.clone();
        let l = Arc::clone(&launched);
        let result = run_batched(
            batches,
            1,
            0,
            &cancel,
            |_| {},
            move |batch| {
                let cancel = cancel_inner.clone();
                let launched = Arc::clone(&l);
                async move {
                    let n = launched.fetch_add(1, Ordering::SeqCst);
                    if n == 1 {
                        cancel.cancel();
                    }
                    Ok::<usize, MarketError>(batch.len())
                }
            },
        )
        .await;
        assert!(matches!(result, Err(MarketError::Cancelled)));
        assert!(launched.load(Ordering::SeqCst) < 10);
    }
}
