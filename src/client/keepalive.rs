//! Periodic keep-alive sender.

use crate::core::packet::Packet;
use crate::protocol::dispatcher::WeakDispatcher;
use crate::protocol::event::{AsyncError, Event};
use crate::transport::BncsConn;
use crate::utils::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Background task sending [`Packet::KeepAlive`] every interval.
///
/// The task ends when [`stop`](Self::stop) is called or the connection
/// closes. Send failures other than a closed connection are fired as
/// [`Event::AsyncError`].
#[derive(Debug)]
pub struct KeepAlive {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl KeepAlive {
    pub fn spawn(
        conn: Arc<BncsConn>,
        every: Duration,
        dispatcher: WeakDispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let closed = conn.closed_token();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = closed.cancelled() => break,
                    _ = ticker.tick() => {
                        match conn.send(&Packet::KeepAlive).await {
                            Ok(_) => metrics.keepalive_sent(),
                            Err(e) if e.is_close_error() => break,
                            Err(e) => {
                                warn!(error = %e, "Keep-alive send failed");
                                metrics.async_error();
                                dispatcher.fire(&Event::AsyncError(AsyncError::new(
                                    "KeepAlive::send",
                                    &e,
                                )));
                            }
                        }
                    }
                }
            }
            debug!("Keep-alive task stopped");
        });

        Self { stop, task }
    }

    /// Stop the task and wait until it has exited, so no keep-alive is in
    /// flight once this returns.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Keep-alive task ended abnormally");
        }
    }
}
