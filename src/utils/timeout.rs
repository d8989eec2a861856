//! Timeout constants and async wrappers.
//!
//! Handshake steps run under explicit per-step deadlines; the steady-state
//! read loop uses [`READ_TIMEOUT`] as its idle bound.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// First response of a handshake step.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Logon steps; the server may be slow while it checks the account.
pub const LOGON_TIMEOUT: Duration = Duration::from_secs(15);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Steady-state silence bound; servers ping well within this.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Run `fut` with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Like [`with_timeout_error`], but `None` (or a zero duration) waits forever.
pub async fn maybe_timeout<F, T>(fut: F, duration: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match duration {
        Some(d) if !d.is_zero() => with_timeout_error(fut, d).await,
        _ => fut.await,
    }
}
