//! Retry policy for part transfers.
//!
//! A failed attempt is retried up to `max_retries` times with a fixed delay; storage
//! failures and cancellation are never retried. The loop lives here so the transfer
//! layer only has to describe a single attempt.

mod error;
mod policy;
mod run;

pub use error::TransferError;
pub use policy::{RetryDecision, RetryPolicy};
pub use run::run_with_retry;
