//! # Transport Layer
//!
//! TCP transport for BNCS: a framed connection with write deadlines,
//! cancellation on close and an outbound rate limiter.

pub mod connection;

pub use connection::{with_default_port, BncsConn, ConnSettings, DEFAULT_PORT};
