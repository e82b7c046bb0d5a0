// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff.
//!
//! Two retry policies live here:
//!
//! - [`retry_on_conflict`] re-runs a read-modify-write of an Ingress when the
//!   write loses an optimistic-concurrency race (HTTP 409). Attempts are
//!   bounded; any other error fails immediately.
//! - [`http_backoff`] and [`is_retryable_http_status`] drive the short retry
//!   loop of the Cloudflare client for transient HTTP failures (429, 5xx).
//!   Anything still failing after a few quick attempts is left to the next
//!   reconciliation pass.

use crate::constants::{CONFLICT_RETRY_ATTEMPTS, CONFLICT_RETRY_INTERVAL_MILLIS};
use crate::store::StoreError;
use rand::Rng;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Maximum interval between conflict retries (200ms)
const CONFLICT_MAX_INTERVAL_MILLIS: u64 = 200;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// HTTP retry initial interval (50ms)
const HTTP_INITIAL_INTERVAL_MILLIS: u64 = 50;

/// HTTP retry maximum interval (500ms)
const HTTP_MAX_INTERVAL_MILLIS: u64 = 500;

/// HTTP retry maximum elapsed time (2 seconds)
const HTTP_MAX_ELAPSED_TIME_SECS: u64 = 2;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
pub struct ExponentialBackoff {
    /// Current interval duration
    current_interval: Duration,
    /// Maximum interval duration
    max_interval: Duration,
    /// Maximum total elapsed time
    max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    randomization_factor: f64,
    /// Start time for tracking total elapsed time
    start_time: Instant,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with specified parameters.
    fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let mut rng = rand::thread_rng();
        let jittered = rng.gen_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Create the backoff used between optimistic-concurrency retries.
///
/// Conflicts clear as soon as the competing write lands, so the schedule is
/// short: 10ms, 20ms, 40ms, 80ms (±10%), capped at 200ms. The number of
/// attempts is bounded by [`retry_on_conflict`], not by elapsed time.
#[must_use]
pub fn conflict_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(CONFLICT_RETRY_INTERVAL_MILLIS),
        Duration::from_millis(CONFLICT_MAX_INTERVAL_MILLIS),
        None,
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Create exponential backoff configuration for HTTP API retries.
///
/// # Configuration
///
/// - **Initial interval**: 50ms
/// - **Max interval**: 500ms
/// - **Max elapsed time**: 2 seconds total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
///
/// Callers also cap the number of attempts (see
/// [`HTTP_RETRY_ATTEMPTS`](crate::constants::HTTP_RETRY_ATTEMPTS)), so a
/// failing API costs a pass at most a few hundred milliseconds per call.
#[must_use]
pub fn http_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(HTTP_INITIAL_INTERVAL_MILLIS),
        Duration::from_millis(HTTP_MAX_INTERVAL_MILLIS),
        Some(Duration::from_secs(HTTP_MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Determine if an HTTP status code is retryable.
///
/// # Retryable Status Codes
///
/// - **429** (Too Many Requests) - Rate limiting
/// - **500** (Internal Server Error) - Server error
/// - **502** (Bad Gateway) - Proxy/gateway error
/// - **503** (Service Unavailable) - Temporary unavailability
/// - **504** (Gateway Timeout) - Gateway timeout
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Run a read-modify-write, retrying the whole closure on write conflicts.
///
/// `operation` must re-read the object on every call so each attempt works on
/// fresh state. Only [`StoreError::Conflict`] is retried, at most
/// [`CONFLICT_RETRY_ATTEMPTS`] attempts in total; the last conflict is
/// returned once attempts are exhausted.
///
/// # Errors
///
/// Returns the first non-conflict error, or the last conflict after all
/// attempts are used.
///
/// # Example
///
/// ```rust,ignore
/// use kube_dns_manager::reconcilers::retry::retry_on_conflict;
///
/// retry_on_conflict("add finalizer default/web", || async {
///     let Some(mut ingress) = store.get("default", "web").await? else {
///         return Ok(());
///     };
///     ingress.metadata.finalizers.get_or_insert_with(Vec::new).push(marker.clone());
///     store.replace(&ingress).await.map(|_| ())
/// })
/// .await?;
/// ```
pub async fn retry_on_conflict<T, F, Fut>(
    operation_name: &str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut backoff = conflict_backoff();
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Write succeeded after conflict retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_conflict() => {
                if attempt >= CONFLICT_RETRY_ATTEMPTS {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Conflict retries exhausted, giving up"
                    );
                    return Err(e);
                }

                let duration = backoff
                    .next_backoff()
                    .unwrap_or(Duration::from_millis(CONFLICT_RETRY_INTERVAL_MILLIS));
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    retry_after = ?duration,
                    error = %e,
                    "Write conflict, re-reading and retrying"
                );
                tokio::time::sleep(duration).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
