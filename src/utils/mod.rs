//! # Utility Modules
//!
//! Supporting utilities for logging, timing, rate limiting and metrics.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Timeout**: Async timeout wrappers and the crate's deadlines
//! - **Rate Limit**: Token bucket for outbound chat
//! - **Metrics**: Thread-safe observability counters

pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
pub use rate_limit::{RateLimitConfig, RateLimiter};
