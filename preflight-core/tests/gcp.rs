use preflight_core::gcp::{extract_error_reason, retry_with_backoff, GcpError};
use preflight_core::logging::{NoopEventLogger, SharedEventLogger};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn noop_logger() -> SharedEventLogger {
    Arc::new(NoopEventLogger)
}

fn unavailable() -> GcpError {
    GcpError::Api {
        status: 503,
        reason: "backendError".to_string(),
        message: "service unavailable".to_string(),
    }
}

fn forbidden() -> GcpError {
    GcpError::Api {
        status: 403,
        reason: "accessNotConfigured".to_string(),
        message: "API not enabled".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried_until_success() {
    let cancel = CancellationToken::new();
    let logger = noop_logger();
    let attempts = AtomicU32::new(0);

    let result = retry_with_backoff(&cancel, &logger, || {
        let n = attempts.fetch_add(1, Ordering::Relaxed);
        async move {
            if n < 2 {
                Err(unavailable())
            } else {
                Ok(42)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(attempts.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let cancel = CancellationToken::new();
    let logger = noop_logger();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = retry_with_backoff(&cancel, &logger, || {
        attempts.fetch_add(1, Ordering::Relaxed);
        async { Err(forbidden()) }
    })
    .await;

    assert_eq!(result.unwrap_err(), forbidden());
    assert_eq!(attempts.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_wraps_the_last_error() {
    let cancel = CancellationToken::new();
    let logger = noop_logger();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = retry_with_backoff(&cancel, &logger, || {
        attempts.fetch_add(1, Ordering::Relaxed);
        async { Err(GcpError::Transport("connection reset".to_string())) }
    })
    .await;

    match result.unwrap_err() {
        GcpError::MaxRetriesExceeded(inner) => {
            assert_eq!(*inner, GcpError::Transport("connection reset".to_string()));
        }
        other => panic!("expected MaxRetriesExceeded, got {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::Relaxed), 5);
}

#[tokio::test(start_paused = true)]
async fn backoff_sleeps_grow_exponentially() {
    let cancel = CancellationToken::new();
    let logger = noop_logger();

    let start = tokio::time::Instant::now();
    let result: Result<(), _> =
        retry_with_backoff(&cancel, &logger, || async { Err(unavailable()) }).await;
    let elapsed = start.elapsed();

    assert!(result.is_err());
    // Four doubled sleeps: 200 + 400 + 800 + 1600 ms, plus jitter.
    assert!(elapsed >= Duration::from_millis(3000), "slept only {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "slept too long {elapsed:?}");
}

#[tokio::test]
async fn cancellation_during_backoff_aborts_immediately() {
    let cancel = CancellationToken::new();
    let logger = noop_logger();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = retry_with_backoff(&cancel, &logger, || {
        attempts.fetch_add(1, Ordering::Relaxed);
        cancel.cancel();
        async { Err(GcpError::Transport("offline".to_string())) }
    })
    .await;

    assert_eq!(result.unwrap_err(), GcpError::Cancelled);
    assert_eq!(attempts.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn pre_cancelled_token_prevents_any_attempt() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let logger = noop_logger();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = retry_with_backoff(&cancel, &logger, || {
        attempts.fetch_add(1, Ordering::Relaxed);
        async { Ok(()) }
    })
    .await;

    assert_eq!(result.unwrap_err(), GcpError::Cancelled);
    assert_eq!(attempts.load(Ordering::Relaxed), 0);
}

#[test]
fn retryable_classification_matches_policy() {
    assert!(GcpError::Api {
        status: 429,
        reason: String::new(),
        message: String::new()
    }
    .is_retryable());
    assert!(GcpError::Api {
        status: 500,
        reason: String::new(),
        message: String::new()
    }
    .is_retryable());
    assert!(unavailable().is_retryable());
    assert!(GcpError::Transport("reset".to_string()).is_retryable());

    assert!(!forbidden().is_retryable());
    assert!(!GcpError::Api {
        status: 404,
        reason: String::new(),
        message: String::new()
    }
    .is_retryable());
    assert!(!GcpError::Auth("bad token".to_string()).is_retryable());
    assert!(!GcpError::Cancelled.is_retryable());
}

#[test]
fn reason_extraction_prefers_the_gcp_reason_field() {
    assert_eq!(extract_error_reason(&forbidden(), "Fallback"), "accessNotConfigured");
}

#[test]
fn reason_extraction_falls_back_to_http_status() {
    let err = GcpError::Api {
        status: 404,
        reason: String::new(),
        message: "not found".to_string(),
    };
    assert_eq!(extract_error_reason(&err, "Fallback"), "HTTP_404");
}

#[test]
fn reason_extraction_unwraps_retry_exhaustion() {
    let err = GcpError::MaxRetriesExceeded(Box::new(unavailable()));
    assert_eq!(extract_error_reason(&err, "Fallback"), "backendError");
}

#[test]
fn reason_extraction_uses_fallback_for_non_api_errors() {
    let err = GcpError::Transport("connection reset".to_string());
    assert_eq!(extract_error_reason(&err, "Fallback"), "Fallback");
    assert_eq!(extract_error_reason(&GcpError::Cancelled, "Fallback"), "Fallback");
}
