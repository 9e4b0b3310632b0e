//! Retry loop: run an attempt until success, cancellation, or the policy says stop.

use std::time::Duration;

use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;

/// Runs `attempt` until it succeeds or `policy` gives up.
///
/// `attempt` receives the retry count (0 for the first try). Before every retry
/// `on_retry(retry_number, &error, delay)` is called and the loop sleeps `delay`;
/// a cancellation during the sleep ends the loop with `TransferError::Cancelled`.
pub fn run_with_retry<T, F, R>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut on_retry: R,
    mut attempt: F,
) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Result<T, TransferError>,
    R: FnMut(u32, &TransferError, Duration),
{
    let mut retries = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let err = match attempt(retries) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        match policy.decide(retries, &err) {
            RetryDecision::NoRetry => return Err(err),
            RetryDecision::RetryAfter(delay) => {
                retries += 1;
                on_retry(retries, &err, delay);
                if !cancel.sleep(delay) {
                    return Err(TransferError::Cancelled);
                }
            }
        }
    }
}
