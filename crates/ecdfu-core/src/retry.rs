//! Bounded retry of idempotent device operations.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DfuError, Result};

/// How often an operation is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay_ms: u64) -> Self {
        Self { attempts, delay_ms }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Run `op` against `ctx` until it succeeds or the policy is exhausted.
///
/// The last error is returned wrapped in [`DfuError::RetriesExhausted`].
pub fn retry<C: ?Sized, T>(
    ctx: &mut C,
    operation: &'static str,
    policy: RetryPolicy,
    mut op: impl FnMut(&mut C) -> Result<T>,
) -> Result<T> {
    let attempts = policy.attempts.max(1);

    let mut attempt = 1;
    loop {
        match op(ctx) {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= attempts => {
                return Err(DfuError::RetriesExhausted {
                    operation,
                    attempts,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                warn!(operation, attempt, max = attempts, error = %e, "Attempt failed, retrying");
                if policy.delay_ms > 0 {
                    thread::sleep(policy.delay());
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[test]
    fn test_retry_succeeds_eventually() {
        let mut calls = 0u32;
        let value = retry(&mut calls, "op", RetryPolicy::new(5, 0), |calls| {
            *calls += 1;
            if *calls < 3 {
                Err(TransportError::Timeout { timeout_ms: 1 }.into())
            } else {
                Ok(42)
            }
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_exhausted_keeps_last_error() {
        let mut calls = 0u32;
        let err = retry(&mut calls, "flush", RetryPolicy::new(5, 0), |calls| {
            *calls += 1;
            Err::<(), _>(DfuError::EmptyReply)
        })
        .unwrap_err();
        assert_eq!(calls, 5);
        match err {
            DfuError::RetriesExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "flush");
                assert_eq!(attempts, 5);
                assert!(matches!(*source, DfuError::EmptyReply));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_attempts_runs_once() {
        let mut calls = 0u32;
        let _ = retry(&mut calls, "op", RetryPolicy::new(0, 0), |calls| {
            *calls += 1;
            Err::<(), _>(DfuError::EmptyReply)
        });
        assert_eq!(calls, 1);
    }
}
