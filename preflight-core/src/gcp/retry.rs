use crate::gcp::{GcpError, INITIAL_BACKOFF, MAX_BACKOFF, MAX_RETRIES};
use crate::logging::{LogEvent, LogLevel, SharedEventLogger};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deterministic jitter so retry timing stays reproducible in tests.
fn jitter(attempt: u32, backoff: Duration) -> Duration {
    let mut rng = StdRng::seed_from_u64(attempt as u64);
    let cap = (backoff.as_millis() / 4).max(1) as u64;
    Duration::from_millis(rng.gen_range(0..cap))
}

/// Run `operation` with exponential backoff: sleeps double from 100 ms
/// up to a 30 s cap, at most 5 attempts. Only transient errors are
/// retried. A cancel during a backoff sleep returns
/// [`GcpError::Cancelled`]; exhausting the budget wraps the last error
/// in [`GcpError::MaxRetriesExceeded`].
pub async fn retry_with_backoff<T, F, Fut>(
    cancel: &CancellationToken,
    logger: &SharedEventLogger,
    mut operation: F,
) -> Result<T, GcpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GcpError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(GcpError::Cancelled);
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        attempt += 1;
        if attempt >= MAX_RETRIES {
            return Err(GcpError::MaxRetriesExceeded(Box::new(err)));
        }

        if backoff < MAX_BACKOFF {
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        let sleep = backoff + jitter(attempt, backoff);

        logger.log(
            LogEvent::new(LogLevel::Debug, "gcp.retry")
                .with_field("attempt", attempt.to_string())
                .with_field("backoff_ms", sleep.as_millis().to_string())
                .with_field("error", err.to_string()),
        );

        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = cancel.cancelled() => return Err(GcpError::Cancelled),
        }
    }
}
