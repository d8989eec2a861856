//! # Framed Connection
//!
//! One live BNCS socket, split into a framed reader and a framed writer.
//!
//! The reader is used by exactly one task at a time: the handshake while it
//! runs, then [`BncsConn::run`]. The writer is shared by that task, the
//! keep-alive task and chat senders, so `send` is safe to call concurrently
//! with reads.
//!
//! Any read or write error closes the connection. After that every
//! operation fails with [`ProtocolError::ConnectionClosed`].

use crate::core::codec::BncsCodec;
use crate::core::packet::{Packet, PROTOCOL_GREETING};
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::event::{AsyncError, Event};
use crate::utils::metrics::Metrics;
use crate::utils::rate_limit::{RateLimitConfig, RateLimiter};
use crate::utils::timeout::{self, maybe_timeout, with_timeout_error};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Port appended to server addresses that do not name one.
pub const DEFAULT_PORT: u16 = 6112;

#[derive(Debug, Clone)]
pub struct ConnSettings {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub rate_limit: RateLimitConfig,
}

impl Default for ConnSettings {
    fn default() -> Self {
        Self {
            connect_timeout: timeout::CONNECT_TIMEOUT,
            write_timeout: timeout::WRITE_TIMEOUT,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Append [`DEFAULT_PORT`] when `addr` has no port.
pub fn with_default_port(addr: &str) -> String {
    let has_port = match addr.rsplit_once(':') {
        // Bracketed IPv6 literal: only a colon after the bracket is a port.
        Some((host, port)) if host.starts_with('[') => host.ends_with(']') && !port.is_empty(),
        Some((host, _)) => !host.contains(':'),
        None => false,
    };
    if has_port {
        addr.to_string()
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    }
}

pub struct BncsConn {
    reader: Mutex<FramedRead<OwnedReadHalf, BncsCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, BncsCodec>>,
    limiter: RateLimiter,
    closed: CancellationToken,
    write_timeout: Duration,
    peer: SocketAddr,
    metrics: Arc<Metrics>,
}

impl BncsConn {
    /// Open a TCP connection and select the BNCS protocol on it.
    #[instrument(skip(settings, metrics))]
    pub async fn connect(
        addr: &str,
        settings: ConnSettings,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let addr = with_default_port(addr);
        let stream = with_timeout_error(
            async { TcpStream::connect(&addr).await.map_err(ProtocolError::from) },
            settings.connect_timeout,
        )
        .await?;
        stream.set_nodelay(true)?;
        debug!(%addr, "TCP connection established");
        Self::with_stream(stream, settings, metrics).await
    }

    /// Take over an already connected stream. Writes the protocol greeting.
    pub async fn with_stream(
        mut stream: TcpStream,
        settings: ConnSettings,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let peer = stream.peer_addr()?;
        with_timeout_error(
            async {
                stream.write_all(&[PROTOCOL_GREETING]).await?;
                Ok::<_, ProtocolError>(())
            },
            settings.write_timeout,
        )
        .await?;
        metrics.connection_established();

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(FramedRead::new(read_half, BncsCodec::client())),
            writer: Mutex::new(FramedWrite::new(write_half, BncsCodec::client())),
            limiter: RateLimiter::new(settings.rate_limit),
            closed: CancellationToken::new(),
            write_timeout: settings.write_timeout,
            peer,
            metrics,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the connection closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Mark the connection closed. Pending reads and writes return
    /// [`ProtocolError::ConnectionClosed`]; the socket is released when the
    /// last owner drops the connection.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(peer = %self.peer, "Closing connection");
            self.closed.cancel();
        }
    }

    /// Close and send FIN to the server.
    pub async fn shutdown(&self) {
        self.close();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.get_mut().shutdown().await {
            debug!(error = %e, "Socket shutdown failed");
        }
    }

    /// Serialize and flush one packet, returning the frame size.
    pub async fn send(&self, packet: &Packet) -> Result<usize> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let len = packet.encoded_len();
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.send(packet).await
        };

        let result = tokio::select! {
            _ = self.closed.cancelled() => Err(ProtocolError::ConnectionClosed),
            res = with_timeout_error(write, self.write_timeout) => res,
        };

        match result {
            Ok(()) => {
                self.metrics.packet_sent(len as u64);
                Ok(len)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// [`send`](Self::send) after waiting on the outbound rate limiter.
    pub async fn send_rate_limited(&self, packet: &Packet) -> Result<usize> {
        let waited = tokio::select! {
            _ = self.closed.cancelled() => return Err(ProtocolError::ConnectionClosed),
            waited = self.limiter.acquire(packet.encoded_len()) => waited,
        };
        if !waited.is_zero() {
            self.metrics.rate_limited();
            debug!(waited_ms = waited.as_millis() as u64, "Send delayed by rate limiter");
        }
        self.send(packet).await
    }

    /// Read the next complete packet. `None` or a zero duration waits
    /// indefinitely.
    pub async fn next_packet(&self, timeout: Option<Duration>) -> Result<Packet> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let read = async {
            let mut reader = self.reader.lock().await;
            match reader.next().await {
                Some(res) => res,
                None => Err(ProtocolError::ConnectionClosed),
            }
        };

        let result = tokio::select! {
            _ = self.closed.cancelled() => Err(ProtocolError::ConnectionClosed),
            res = maybe_timeout(read, timeout) => res,
        };

        match result {
            Ok(packet) => {
                self.metrics.packet_received();
                Ok(packet)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Steady-state read loop.
    ///
    /// Fires every packet as [`Event::Packet`] until the connection fails or
    /// is closed, then fires [`Event::Disconnected`]. An orderly close
    /// returns `Ok`; anything else is also fired as [`Event::AsyncError`]
    /// and returned.
    #[instrument(skip(self, dispatcher), fields(peer = %self.peer))]
    pub async fn run(&self, dispatcher: &Dispatcher, read_timeout: Option<Duration>) -> Result<()> {
        loop {
            match self.next_packet(read_timeout).await {
                Ok(packet) => {
                    dispatcher.fire(&Event::Packet(packet));
                }
                Err(e) => {
                    let result = if e.is_close_error() {
                        debug!("Connection closed");
                        Ok(())
                    } else {
                        warn!(error = %e, "Read loop terminated");
                        self.metrics.async_error();
                        dispatcher.fire(&Event::AsyncError(AsyncError::new("BncsConn::run", &e)));
                        Err(e)
                    };
                    self.close();
                    dispatcher.fire(&Event::Disconnected);
                    return result;
                }
            }
        }
    }
}

impl std::fmt::Debug for BncsConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BncsConn")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
