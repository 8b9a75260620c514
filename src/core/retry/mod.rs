// src/core/retry/mod.rs

//! Retry & reconnect engine (C2): classifies coordination errors, drives
//! same-session retries, and triggers reconnect + resync on session loss.

use std::time::Duration;

use crate::core::errors::{CoordinationError, StoreError};

/// What the retry loop should do in response to a `CoordinationError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Retry the same operation against the same session after sleeping
    /// `retry_interval`.
    RetrySameSession,
    /// The session is gone; reconnect, resync, then retry the operation.
    ReconnectAndRetry,
    /// The operation is idempotently satisfied already (`create` raced with
    /// itself across a retry and the node now exists).
    TreatAsSuccess,
    /// Fatal: surface `StoreError::Fenced` and stop retrying.
    TerminalFenced,
    /// Not retryable at all; surface the error immediately.
    Fatal,
}

/// Classifies a coordination error per the fixed decision table: connection
/// loss and operation timeout retry on the same session; session
/// expiry/move triggers reconnect; `NoAuth` under HA fencing is terminal.
/// `NodeExists` on a create is a special case handled by callers directly
/// via `is_idempotent_create_conflict`, since treating it as success
/// requires the caller's own success value, not something this classifier
/// can fabricate.
pub fn classify(error: &CoordinationError) -> RetryOutcome {
    match error {
        CoordinationError::ConnectionLoss | CoordinationError::OperationTimeout => {
            RetryOutcome::RetrySameSession
        }
        CoordinationError::SessionExpired | CoordinationError::SessionMoved => {
            RetryOutcome::ReconnectAndRetry
        }
        CoordinationError::NodeExists(_) => RetryOutcome::TreatAsSuccess,
        CoordinationError::NoAuth => RetryOutcome::TerminalFenced,
        _ => RetryOutcome::Fatal,
    }
}

/// True when `error` is a `NodeExists` conflict on a create that a caller
/// should treat as idempotent success, e.g. after a retried create actually
/// landed before a spurious `ConnectionLoss` was observed.
pub fn is_idempotent_create_conflict(error: &CoordinationError) -> bool {
    matches!(error, CoordinationError::NodeExists(_))
}

/// Retry budget and pacing. Under HA, `retry_interval` is derived as
/// `session_timeout / num_retries`; outside HA the configured default is used
/// unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub num_retries: u32,
    pub session_timeout: Duration,
    pub retry_interval: Duration,
}

impl RetryPolicy {
    pub fn new(num_retries: u32, session_timeout: Duration, ha_enabled: bool) -> Self {
        let retry_interval = if ha_enabled && num_retries > 0 {
            session_timeout / num_retries
        } else {
            Duration::from_millis(1000)
        };
        Self {
            num_retries,
            session_timeout,
            retry_interval,
        }
    }
}

/// Hook the retry loop calls on `ReconnectAndRetry` before re-issuing the
/// operation, and on `TerminalFenced` before giving up. Kept as a trait so
/// `core::recovery` can wire it to the real session/fencing machinery while
/// tests substitute something trivial.
#[async_trait::async_trait]
pub trait ReconnectHandle: Send + Sync {
    async fn reconnect_and_resync(&self) -> Result<(), StoreError>;
    async fn mark_fenced(&self, epoch: u64);
}

/// Drives `op` to completion according to `policy`, retrying/reconnecting
/// per `classify`. `op` is called at least once and at most
/// `policy.num_retries + 1` times.
pub async fn run_with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    reconnect: &dyn ReconnectHandle,
    current_epoch: u64,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CoordinationError>>,
{
    let mut attempts: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempts += 1;
                match classify(&error) {
                    RetryOutcome::TreatAsSuccess => {
                        // The caller's closure is responsible for treating its own
                        // `NodeExists` as success (it alone knows the success value);
                        // here it is surfaced as-is for the caller to match on.
                        return Err(StoreError::Coordination(error));
                    }
                    RetryOutcome::RetrySameSession => {
                        if attempts > policy.num_retries {
                            return Err(StoreError::RetriesExhausted {
                                operation: operation_name.to_string(),
                                attempts,
                            });
                        }
                        tracing::warn!(
                            operation_name,
                            attempt = attempts,
                            error = %error,
                            "retrying coordination operation on the same session"
                        );
                        tokio::time::sleep(policy.retry_interval).await;
                    }
                    RetryOutcome::ReconnectAndRetry => {
                        if attempts > policy.num_retries {
                            return Err(StoreError::RetriesExhausted {
                                operation: operation_name.to_string(),
                                attempts,
                            });
                        }
                        tracing::warn!(
                            operation_name,
                            attempt = attempts,
                            error = %error,
                            "session lost, reconnecting before retry"
                        );
                        reconnect.reconnect_and_resync().await?;
                    }
                    RetryOutcome::TerminalFenced => {
                        tracing::error!(
                            operation_name,
                            error = %error,
                            "fenced out of the store, giving up"
                        );
                        reconnect.mark_fenced(current_epoch).await;
                        return Err(StoreError::Fenced {
                            epoch: current_epoch,
                        });
                    }
                    RetryOutcome::Fatal => return Err(StoreError::Coordination(error)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopReconnect {
        reconnect_calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ReconnectHandle for NoopReconnect {
        async fn reconnect_and_resync(&self) -> Result<(), StoreError> {
            self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn mark_fenced(&self, _epoch: u64) {}
    }

    #[test]
    fn classifies_known_errors() {
        assert_eq!(
            classify(&CoordinationError::ConnectionLoss),
            RetryOutcome::RetrySameSession
        );
        assert_eq!(
            classify(&CoordinationError::SessionExpired),
            RetryOutcome::ReconnectAndRetry
        );
        assert_eq!(
            classify(&CoordinationError::NodeExists("x".into())),
            RetryOutcome::TreatAsSuccess
        );
        assert_eq!(classify(&CoordinationError::NoAuth), RetryOutcome::TerminalFenced);
        assert_eq!(classify(&CoordinationError::NoNode("x".into())), RetryOutcome::Fatal);
    }

    #[test]
    fn ha_policy_derives_interval_from_session_timeout() {
        let policy = RetryPolicy::new(10, Duration::from_secs(10), true);
        assert_eq!(policy.retry_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn retries_then_succeeds_after_connection_loss() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50), false);
        let reconnect = NoopReconnect {
            reconnect_calls: AtomicU32::new(0),
        };
        let attempts = AtomicU32::new(0);
        let result = run_with_retry("test_op", &policy, &reconnect, 0, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CoordinationError::ConnectionLoss)
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn reconnects_on_session_expiry() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50), false);
        let reconnect = NoopReconnect {
            reconnect_calls: AtomicU32::new(0),
        };
        let attempts = AtomicU32::new(0);
        let result = run_with_retry("test_op", &policy, &reconnect, 0, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoordinationError::SessionExpired)
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(reconnect.reconnect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_auth_is_terminal() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), false);
        let reconnect = NoopReconnect {
            reconnect_calls: AtomicU32::new(0),
        };
        let result: Result<(), StoreError> =
            run_with_retry("test_op", &policy, &reconnect, 3, || async {
                Err(CoordinationError::NoAuth)
            })
            .await;
        assert_eq!(result.unwrap_err(), StoreError::Fenced { epoch: 3 });
    }
}
