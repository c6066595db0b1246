//! Rate-limited work queue for controller worker loops
//!
//! One generic [`WorkQueue`] type backs every queue in the controller. Each
//! instance de-duplicates pending items, never hands the same item to two
//! workers at once, and re-queues failed items with per-item exponential
//! backoff.

#![deny(missing_docs)]

mod queue;
mod rate_limiter;

pub use queue::WorkQueue;
pub use rate_limiter::{
    ItemExponentialFailureRateLimiter, RateLimiter, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY,
};
