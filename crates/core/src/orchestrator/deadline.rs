//! The single race primitive used for every conversion attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How a deadline-bounded future ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlineOutcome<T> {
    /// The future finished first.
    Completed(T),
    /// The deadline fired first.
    TimedOut,
    /// The parent token was cancelled first.
    Cancelled,
}

impl<T> DeadlineOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, DeadlineOutcome::Completed(_))
    }
}

/// Races the future built by `make` against `limit` and `parent` cancellation.
///
/// `make` receives a child of `parent`. When the deadline or the parent wins,
/// that token is cancelled and the future is polled for up to `grace` more so
/// it can kill and reap any process it started. After that it is dropped.
pub async fn run_with_deadline<F, Fut, T>(
    limit: Duration,
    grace: Duration,
    parent: &CancellationToken,
    make: F,
) -> DeadlineOutcome<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let token = parent.child_token();
    let future = make(token.clone());
    tokio::pin!(future);

    let outcome = tokio::select! {
        biased;
        _ = parent.cancelled() => DeadlineOutcome::Cancelled,
        value = &mut future => return DeadlineOutcome::Completed(value),
        _ = tokio::time::sleep(limit) => DeadlineOutcome::TimedOut,
    };

    token.cancel();
    if tokio::time::timeout(grace, &mut future).await.is_err() {
        warn!(
            grace_ms = grace.as_millis() as u64,
            "Abandoned attempt did not finish within the cleanup grace period"
        );
    }
    outcome
}
