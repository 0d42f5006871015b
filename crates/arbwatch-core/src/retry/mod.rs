//! Retry with exponential backoff.
//!
//! `RetryExecutor` re-runs a fallible async operation according to a
//! `RetryPolicy`: bounded attempts, geometric delays, and a predicate that
//! decides which errors are worth another try. It is independent of the API
//! client and can wrap any async call, including authenticated requests.

pub mod executor;
pub mod policy;

pub use executor::{retry, retry_with, RetryExecutor};
pub use policy::{RetryPolicy, RetryPredicate};
