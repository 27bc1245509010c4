//! Generic completion polling for remote asynchronous operations.
//!
//! The remote service never pushes notifications, so callers poll. The loop
//! is always bounded: the deadline is computed once at entry and compared on
//! every iteration, never re-derived from accumulated sleeps.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

#[derive(Debug, Error)]
pub enum PollError<S, E>
where
    E: std::error::Error,
{
    /// The operation reached a terminal failure state; polling stopped
    /// immediately.
    #[error("remote operation reported a terminal failure")]
    Failed { status: S },
    /// The deadline passed without the operation reaching a terminal state.
    #[error("remote operation did not finish within {waited:?}")]
    TimedOut { last_status: S, waited: Duration },
    /// Fetching the status itself failed; treated as terminal.
    #[error(transparent)]
    Fetch(E),
}

/// Poll `fetch_status` until a terminal predicate matches or the deadline
/// expires. Sleeps `poll_interval` between attempts (capped by the remaining
/// budget). Each call is independent; no cross-caller coordination.
pub async fn await_completion<S, E, F, Fut>(
    mut fetch_status: F,
    is_terminal_success: impl Fn(&S) -> bool,
    is_terminal_failure: impl Fn(&S) -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<S, PollError<S, E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, E>>,
{
    debug_assert!(poll_interval > Duration::ZERO);

    let started = Instant::now();
    let deadline = started + timeout;

    loop {
        let status = fetch_status().await.map_err(PollError::Fetch)?;
        if is_terminal_success(&status) {
            return Ok(status);
        }
        if is_terminal_failure(&status) {
            return Err(PollError::Failed { status });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::TimedOut {
                last_status: status,
                waited: now - started,
            });
        }
        sleep(poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Error)]
    #[error("status fetch failed")]
    struct FetchFailed;

    const INTERVAL: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn returns_success_after_pending_polls() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let status = await_completion(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok::<_, Infallible>(if n < 3 { "in_progress" } else { "completed" })
                }
            },
            |s| *s == "completed",
            |s| *s == "failed",
            Duration::from_secs(30),
            INTERVAL,
        )
        .await
        .expect("operation completes");

        assert_eq!(status, "completed");
        assert_eq!(calls.load(Ordering::SeqCst), 4, "three pending polls plus the terminal one");
        assert!(started.elapsed() >= INTERVAL * 3, "each pending poll must wait the interval");
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_stops_polling_immediately() {
        let calls = AtomicUsize::new(0);

        let error = await_completion(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, Infallible>("failed") }
            },
            |s| *s == "completed",
            |s| *s == "failed",
            Duration::from_secs(30),
            INTERVAL,
        )
        .await
        .expect_err("failure is terminal");

        match error {
            PollError::Failed { status } => assert_eq!(status, "failed"),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no polls after a terminal failure");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_a_never_terminal_operation() {
        let started = Instant::now();
        let timeout = Duration::from_secs(5);

        let error = await_completion(
            || async move { Ok::<_, Infallible>("in_progress") },
            |s| *s == "completed",
            |s| *s == "failed",
            timeout,
            Duration::from_secs(1),
        )
        .await
        .expect_err("operation never finishes");

        match error {
            PollError::TimedOut { last_status, waited } => {
                assert_eq!(last_status, "in_progress", "timeout carries the last observed status");
                assert!(waited >= timeout);
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
        assert_eq!(started.elapsed(), timeout, "sleeps are capped at the remaining budget");
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_are_terminal() {
        let calls = AtomicUsize::new(0);

        let error = await_completion(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<&str, _>(FetchFailed) }
            },
            |s| *s == "completed",
            |s| *s == "failed",
            Duration::from_secs(30),
            INTERVAL,
        )
        .await
        .expect_err("fetch error is terminal");

        assert!(matches!(error, PollError::Fetch(FetchFailed)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
