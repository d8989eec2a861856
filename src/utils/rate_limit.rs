//! Outbound rate limiting
//!
//! Token bucket in bytes. Every packet costs a fixed overhead plus its
//! serialized size; the bucket refills continuously and may go into debt,
//! in which case the sender waits until the debt is repaid.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Disable to send chat immediately (private servers, tests)
    pub enabled: bool,

    /// Flat cost per packet, in bytes
    pub packet_overhead: u32,

    /// Refill rate
    pub bytes_per_second: u32,

    /// Bucket capacity; bursts up to this size are not delayed
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            packet_overhead: 200,
            bytes_per_second: 200,
            burst: 600,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.enabled {
            if self.bytes_per_second == 0 {
                errors.push("bytes_per_second must be greater than 0".to_string());
            }
            if self.burst < self.packet_overhead {
                errors.push(format!(
                    "burst ({}) is smaller than one packet overhead ({})",
                    self.burst, self.packet_overhead
                ));
            }
        }
        errors
    }
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Spend `cost` tokens at `now` and return how long to wait before the
    /// spend is covered.
    pub fn reserve_at(&mut self, now: Instant, cost: f64) -> Duration {
        self.refill(now);
        self.tokens -= cost;
        if self.tokens >= 0.0 || self.refill_per_sec <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_per_sec)
        }
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }
}

/// Shared limiter for one connection.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let bucket = TokenBucket::new(
            f64::from(config.burst),
            f64::from(config.bytes_per_second),
            Instant::now(),
        );
        Self {
            config,
            bucket: Mutex::new(bucket),
        }
    }

    pub fn cost(&self, packet_len: usize) -> f64 {
        f64::from(self.config.packet_overhead) + packet_len as f64
    }

    /// Wait until a packet of `packet_len` bytes may be sent.
    ///
    /// Callers queue on the bucket lock, so waits are served in order.
    /// Returns the time spent waiting.
    pub async fn acquire(&self, packet_len: usize) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }
        let mut bucket = self.bucket.lock().await;
        let wait = bucket.reserve_at(Instant::now(), self.cost(packet_len));
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        wait
    }
}
