//! Dispatch of playbook runs to the execution broker

pub mod manager;
pub mod rate_limiter;

pub use manager::{DispatchManager, DispatchManagerConfig, DispatchResult};
pub use rate_limiter::{RateLimitConfig, RateLimiter, TokenBucketRateLimiter, UnlimitedRateLimiter};
