// ── Fixed-interval retry ──
//
// Shared by the connect and disconnect loops. No backoff, no attempt cap:
// the loop runs until the operation succeeds or the token is cancelled.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A successful retry: the operation's value and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `op` until it succeeds, sleeping `interval` after every failure.
///
/// Returns `None` if `cancel` fires before a successful attempt, either
/// during an attempt or during the wait between attempts. Failures are
/// logged at `warn` and never returned.
pub async fn retry_fixed<T, E, F, Fut>(
    label: &str,
    interval: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Option<Retried<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            result = op() => result,
        };

        match result {
            Ok(value) => return Some(Retried { value, attempts }),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    retry_in_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                    "{label} failed"
                );
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(interval) => {}
        }
    }
}
