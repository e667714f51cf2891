//! Retry with exponential backoff for marketplace calls.
//!
//! Provides exponential backoff retry logic for transient HTTP errors such as
//! 429 Rate Limited responses and 5xx server errors. Non-retriable errors
//! (parse failures, 4xx statuses, missing credentials) are propagated
//! immediately without retrying.

use std::future::Future;
use std::time::Duration;

use crate::error::MarketError;

/// Message signatures some marketplace APIs use for throttling inside a
/// 200-status error envelope. Status-code classification is primary; this
/// text match is the documented fallback for APIs that don't set status
/// codes consistently.
const RATE_LIMIT_SIGNATURES: &[&str] = &["rate limit", "too many requests", "request limit"];

/// Returns `true` if `message` carries one of the known throttling signatures.
pub(crate) fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
///
/// Retriable errors:
/// - [`MarketError::RateLimited`] — HTTP 429; the server has asked us to back off.
/// - [`MarketError::Http`] — network-level failure (connection reset, timeout)
///   or a 5xx surfaced through `reqwest`.
/// - [`MarketError::UnexpectedStatus`] with a 5xx status.
/// - [`MarketError::ApiError`] whose message matches a throttling signature
///   (envelope-level rate limiting without a 429 status).
///
/// Everything else is propagated immediately: retrying a 4xx, a parse
/// failure, or missing credentials would return the same result.
fn is_retriable(err: &MarketError) -> bool {
    match err {
        MarketError::RateLimited { .. } => true,
        MarketError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        MarketError::UnexpectedStatus { status, .. } => (500..=599).contains(status),
        MarketError::ApiError { message, .. } => looks_rate_limited(message),
        _ => false,
    }
}

/// Executes `operation` with exponential backoff retries on transient errors.
///
/// On success the result is returned immediately.
///
/// On a retriable error the function sleeps for `backoff_base_ms * 2^attempt`
/// milliseconds (capped at 60 s) and tries again, up to `max_retries`
/// additional attempts after the first try. If all retries are exhausted the
/// last error is returned unchanged.
///
/// # Backoff schedule (example with `backoff_base_ms = 1_000`)
///
/// | Attempt | Sleep before next attempt |
/// |---------|--------------------------|
/// | 0 (initial) | — (no sleep before first try) |
/// | 1 (first retry) | 1 000 ms × 2^0 = 1 s |
/// | 2 (second retry) | 1 000 ms × 2^1 = 2 s |
/// | 3 (third retry) | 1 000 ms × 2^2 = 4 s |
///
/// With `max_retries = 3` the operation is attempted at most 4 times total.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, MarketError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut last_err;
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                last_err = err;
            }
        }

        let delay_ms = backoff_base_ms
            .saturating_mul(1u64 << attempt.min(62))
            .min(MAX_DELAY_MS);
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %last_err,
            "transient marketplace error — retrying after backoff"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn rate_limited() -> MarketError {
        MarketError::RateLimited {
            marketplace: "ozon".to_owned(),
            retry_after_secs: 0,
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, MarketError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_rate_limited_then_succeeds() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(rate_limited())
                } else {
                    Ok::<u32, MarketError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_last_error_after_exhausting_retries() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(2, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, MarketError>(rate_limited())
            }
        })
        .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(MarketError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_client_error_status() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, MarketError>(MarketError::UnexpectedStatus {
                    status: 403,
                    url: "https://api.example.com/v3/product/list".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(MarketError::UnexpectedStatus { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn retries_server_error_status() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(1, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(MarketError::UnexpectedStatus {
                        status: 503,
                        url: "https://api.example.com/v3/product/list".to_owned(),
                    })
                } else {
                    Ok::<u32, MarketError>(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_deserialize_error() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                let e = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
                Err::<u32, MarketError>(MarketError::Deserialize {
                    context: "test".to_owned(),
                    source: e,
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(MarketError::Deserialize { .. })));
    }

    #[tokio::test]
    async fn retries_envelope_level_rate_limit_message() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(1, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(MarketError::ApiError {
                        marketplace: "wildberries".to_owned(),
                        message: "Too Many Requests for method".to_owned(),
                    })
                } else {
                    Ok::<u32, MarketError>(1)
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_plain_api_error() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, 0, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, MarketError>(MarketError::ApiError {
                    marketplace: "ozon".to_owned(),
                    message: "product not found".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(MarketError::ApiError { .. })));
    }

    /// Observed backoff delays must not shrink and must roughly double.
    #[tokio::test(start_paused = true)]
    async fn backoff_delays_double_between_attempts() {
        use tokio::time::Instant;

        let timestamps = Arc::new(std::sync::Mutex::new(Vec::new()));
        let ts = Arc::clone(&timestamps);
        let result = retry_with_backoff(3, 1_000, || {
            let ts = Arc::clone(&ts);
            async move {
                ts.lock().unwrap().push(Instant::now());
                Err::<u32, MarketError>(rate_limited())
            }
        })
        .await;
        assert!(matches!(result, Err(MarketError::RateLimited { .. })));

        let stamps = timestamps.lock().unwrap();
        assert_eq!(stamps.len(), 4, "3 retries means 4 attempts");
        let deltas: Vec<u64> = stamps
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis().try_into().unwrap())
            .collect();
        assert_eq!(deltas, vec![1_000, 2_000, 4_000]);
    }
}
