//! Observability and Metrics
//!
//! Atomic counters for one client: frames in and out, handshake outcomes,
//! keep-alives and errors surfaced by background tasks.
//!
//! Each [`Client`](crate::client::Client) owns its own instance; there is no
//! process-wide collector.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// TCP connections opened
    pub connections_total: AtomicU64,
    /// Handshake attempts (dial, logon, create, change password)
    pub handshakes_total: AtomicU64,
    pub handshakes_success: AtomicU64,
    pub handshakes_failed: AtomicU64,
    /// Frames written
    pub packets_sent: AtomicU64,
    /// Frames decoded
    pub packets_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub keepalives_sent: AtomicU64,
    /// Sends that waited on the rate limiter
    pub rate_limited_sends: AtomicU64,
    /// Errors routed to the event bus instead of a caller
    pub async_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            handshakes_total: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            keepalives_sent: AtomicU64::new(0),
            rate_limited_sends: AtomicU64::new(0),
            async_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_attempt(&self) {
        self.handshakes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame written to the socket
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keepalive_sent(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) {
        self.rate_limited_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn async_error(&self) {
        self.async_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            handshakes_total: self.handshakes_total.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            rate_limited_sends: self.rate_limited_sends.load(Ordering::Relaxed),
            async_errors: self.async_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            handshakes_total = snapshot.handshakes_total,
            handshakes_success = snapshot.handshakes_success,
            handshakes_failed = snapshot.handshakes_failed,
            packets_sent = snapshot.packets_sent,
            packets_received = snapshot.packets_received,
            bytes_sent = snapshot.bytes_sent,
            keepalives_sent = snapshot.keepalives_sent,
            rate_limited_sends = snapshot.rate_limited_sends,
            async_errors = snapshot.async_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Client metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub handshakes_total: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub keepalives_sent: u64,
    pub rate_limited_sends: u64,
    pub async_errors: u64,
    pub uptime_seconds: u64,
}

/// Logs the elapsed time of a handshake step when dropped.
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let m = Metrics::new();
        m.packet_sent(8);
        m.packet_sent(4);
        m.packet_received();
        m.handshake_attempt();
        m.handshake_failed();

        let s = m.snapshot();
        assert_eq!(s.packets_sent, 2);
        assert_eq!(s.bytes_sent, 12);
        assert_eq!(s.packets_received, 1);
        assert_eq!(s.handshakes_total, 1);
        assert_eq!(s.handshakes_failed, 1);
        assert_eq!(s.handshakes_success, 0);
    }
}
