//! # BNCS Client
//!
//! High-level chat client: logs on, keeps the connection alive, tracks the
//! current channel and turns server chat events into [`Event`]s.
//!
//! ## Example
//! ```no_run
//! use bncs_protocol::client::Client;
//! use bncs_protocol::config::ClientConfig;
//! use bncs_protocol::protocol::EventKind;
//!
//! # async fn demo() -> bncs_protocol::error::Result<()> {
//! let client = Client::new(ClientConfig {
//!     server_addr: "server.example".into(),
//!     bin_path: "/games/warcraft3".into(),
//!     password: "hunter2".into(),
//!     ..ClientConfig::default()
//! })?;
//!
//! client.on(EventKind::Chat, |ev| println!("{ev:?}"))?;
//! client.logon().await?;
//! client.say("hello").await?;
//! client.run().await
//! # }
//! ```

pub mod chat;
pub mod keepalive;

use crate::config::{ClientConfig, DEFAULT_GAME_VERSION};
use crate::core::packet::{Packet, PacketKind};
use crate::core::payloads::{ChatCommand, Ping, PRODUCT_ROC, PRODUCT_TFT};
use crate::crypto::{new_proof, PasswordProof};
use crate::error::{constants, ProtocolError, Result};
use crate::external::{self, Collaborators, ExeProbe};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::event::{AsyncError, Event, EventKind, User};
use crate::protocol::handshake::{self, Handshake};
use crate::transport::BncsConn;
use crate::utils::metrics::Metrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::SystemTime;
use tracing::{debug, info, warn};

pub use chat::{filter_chat, ChatRoom, MAX_CHAT_LEN};
pub use keepalive::KeepAlive;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    config: Mutex<ClientConfig>,
    collaborators: Collaborators,
    dispatcher: Dispatcher,
    conn: RwLock<Option<Arc<BncsConn>>>,
    room: Mutex<ChatRoom>,
    unique_name: Mutex<String>,
    metrics: Arc<Metrics>,
    probe: ExeProbe,
}

impl Inner {
    fn conn(&self) -> Option<Arc<BncsConn>> {
        self.conn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_ping(self: &Arc<Self>, ping: Ping) {
        if handshake::ping_answered() {
            return;
        }
        let Some(conn) = self.conn() else { return };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Ping received outside a runtime, not answered");
            return;
        };
        let dispatcher = self.dispatcher.downgrade();
        let metrics = self.metrics.clone();
        runtime.spawn(async move {
            if let Err(e) = conn.send(&Packet::Ping(ping)).await {
                metrics.async_error();
                dispatcher.fire(&Event::AsyncError(AsyncError::new("Client::on_ping", &e)));
            }
        });
    }

    fn on_chat_event(&self, packet: &crate::core::payloads::ChatEvent) {
        let event = lock(&self.room).apply(packet, SystemTime::now());
        if let Some(event) = event {
            self.dispatcher.fire(&event);
        }
    }
}

/// Fill in what the install directory can tell us. Records every
/// executable probed for the game version.
fn infer_from_install(config: &mut ClientConfig, collaborators: &Collaborators) -> ExeProbe {
    let mut probe = ExeProbe::default();
    let bin = config.bin_path.clone();
    let has_install = !bin.as_os_str().is_empty();

    if config.platform.version == 0 {
        config.platform.version = if config.exe_version != 0 {
            external::game_version_from_exe(config.exe_version)
        } else {
            if has_install {
                probe = ExeProbe::run(collaborators.exe.as_ref(), &bin);
            }
            probe.game_version().unwrap_or(DEFAULT_GAME_VERSION)
        };
    }

    if has_install && config.username.is_empty() {
        if let Some(name) = external::read_install_file(&bin, "user.w3k") {
            config.username = name;
        }
    }

    if has_install && config.cd_keys.is_empty() {
        if let Some(roc) = external::read_install_file(&bin, "roc.w3k") {
            config.cd_keys.push(roc);
            if let Some(tft) = external::read_install_file(&bin, "tft.w3k") {
                config.cd_keys.push(tft);
            }
        }
    }

    if config.platform.product.is_zero() {
        config.platform.product = if config.cd_keys.len() == 2 {
            PRODUCT_TFT
        } else {
            PRODUCT_ROC
        };
    }
    probe
}

/// Chat client for one account.
///
/// Cloning yields another handle to the same session. Accessors return
/// owned snapshots and never hold a lock past the call.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Client with no executable, signature or CD key support plugged in.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_collaborators(config, Collaborators::default())
    }

    pub fn with_collaborators(config: ClientConfig, collaborators: Collaborators) -> Result<Self> {
        let mut config = config.merge_defaults();
        let probe = infer_from_install(&mut config, &collaborators);

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::ConfigError(errors.join("; ")));
        }
        debug!(
            product = %config.platform.product,
            version = config.platform.version,
            keys = config.cd_keys.len(),
            "Client configured"
        );

        let inner = Arc::new(Inner {
            config: Mutex::new(config),
            collaborators,
            dispatcher: Dispatcher::new(),
            conn: RwLock::new(None),
            room: Mutex::new(ChatRoom::new()),
            unique_name: Mutex::new(String::new()),
            metrics: Arc::new(Metrics::new()),
            probe,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.dispatcher.on(PacketKind::Ping, move |ev| {
            if let (Event::Packet(Packet::Ping(ping)), Some(inner)) = (ev, weak.upgrade()) {
                inner.on_ping(*ping);
            }
        })?;

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.dispatcher.on(PacketKind::ChatEvent, move |ev| {
            if let (Event::Packet(Packet::ChatEvent(chat)), Some(inner)) = (ev, weak.upgrade()) {
                inner.on_chat_event(chat);
            }
        })?;

        Ok(Self { inner })
    }

    /// Snapshot of the effective configuration after defaults and inference.
    pub fn config(&self) -> ClientConfig {
        lock(&self.inner.config).clone()
    }

    /// Executables tried while inferring the game version.
    pub fn exe_probe(&self) -> &ExeProbe {
        &self.inner.probe
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Register an event handler.
    pub fn on<K, F>(&self, kind: K, handler: F) -> Result<()>
    where
        K: Into<EventKind>,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, handler)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.inner.metrics.clone()
    }

    /// Channel currently chatting in.
    pub fn channel(&self) -> String {
        lock(&self.inner.room).channel().to_string()
    }

    /// User in the current channel, by case-insensitive name.
    pub fn user(&self, name: &str) -> Option<User> {
        lock(&self.inner.room).user(name).cloned()
    }

    /// Everyone in the current channel, keyed by lower-cased name.
    pub fn users(&self) -> HashMap<String, User> {
        lock(&self.inner.room).users().clone()
    }

    /// Name the server assigned on entering chat.
    pub fn unique_name(&self) -> String {
        lock(&self.inner.unique_name).clone()
    }

    pub fn conn(&self) -> Option<Arc<BncsConn>> {
        self.inner.conn()
    }

    fn proof(config: &ClientConfig, password: &str) -> Result<Box<dyn PasswordProof>> {
        new_proof(config.proof_scheme, &config.username, password)
    }

    async fn handshake(&self, config: ClientConfig) -> Result<Handshake> {
        handshake::preflight(&config, &self.inner.collaborators)?;
        let mut hs = Handshake::connect(
            config,
            self.inner.collaborators.clone(),
            self.inner.dispatcher.clone(),
            self.inner.metrics.clone(),
        )
        .await?;
        hs.dial().await?;
        Ok(hs)
    }

    /// Connect and pass the version and CD key checks. The returned
    /// connection is not tracked by the client.
    pub async fn dial(&self) -> Result<Arc<BncsConn>> {
        let hs = self.handshake(self.config()).await?;
        Ok(hs.finish())
    }

    /// Dial, log on and enter chat. Replaces any previous connection.
    pub async fn logon(&self) -> Result<()> {
        let config = self.config();
        let mut proof = Self::proof(&config, &config.password)?;

        let mut hs = self.handshake(config).await?;
        hs.logon(proof.as_mut()).await?;
        drop(proof);
        let chat = hs.enter_chat().await?;

        lock(&self.inner.room).clear();
        *lock(&self.inner.unique_name) = chat.unique_name;
        let previous = self
            .inner
            .conn
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(hs.finish());
        if let Some(old) = previous {
            old.close();
        }
        Ok(())
    }

    /// Register the configured account with the configured password.
    pub async fn create_account(&self) -> Result<()> {
        let config = self.config();
        let proof = Self::proof(&config, &config.password)?;

        let mut hs = self.handshake(config).await?;
        hs.create_account(proof.as_ref()).await?;
        hs.close().await;
        Ok(())
    }

    /// Change the account password. Later logons use `new_password`.
    pub async fn change_password(&self, new_password: &str) -> Result<()> {
        let config = self.config();
        let mut old = Self::proof(&config, &config.password)?;
        let new = Self::proof(&config, new_password)?;

        let mut hs = self.handshake(config).await?;
        hs.change_password(old.as_mut(), new.as_ref()).await?;
        hs.close().await;

        lock(&self.inner.config).password = new_password.to_string();
        Ok(())
    }

    /// Process server traffic until the connection closes.
    ///
    /// Runs the keep-alive task alongside and stops it before returning.
    pub async fn run(&self) -> Result<()> {
        let conn = self
            .inner
            .conn()
            .ok_or_else(|| ProtocolError::Custom(constants::ERR_NOT_CONNECTED.into()))?;
        let (every, read_timeout) = {
            let config = lock(&self.inner.config);
            (config.keep_alive_interval, config.timeouts.read)
        };

        let keepalive = (!every.is_zero()).then(|| {
            KeepAlive::spawn(
                conn.clone(),
                every,
                self.inner.dispatcher.downgrade(),
                self.inner.metrics.clone(),
            )
        });

        let result = conn.run(&self.inner.dispatcher, Some(read_timeout)).await;

        if let Some(keepalive) = keepalive {
            keepalive.stop().await;
        }
        self.inner.metrics.log_summary();
        result
    }

    /// Send a packet on the live connection.
    pub async fn send(&self, packet: &Packet) -> Result<usize> {
        let conn = self
            .inner
            .conn()
            .ok_or_else(|| ProtocolError::Custom(constants::ERR_NOT_CONNECTED.into()))?;
        conn.send(packet).await
    }

    /// Send a chat line. May wait on the rate limiter. Lines that filter
    /// down to nothing are not sent.
    pub async fn say(&self, text: &str) -> Result<()> {
        let text = filter_chat(text);
        if text.is_empty() {
            return Ok(());
        }
        let conn = self
            .inner
            .conn()
            .ok_or_else(|| ProtocolError::Custom(constants::ERR_NOT_CONNECTED.into()))?;
        conn.send_rate_limited(&Packet::ChatCommand(ChatCommand { text }))
            .await?;
        Ok(())
    }

    /// Close the live connection, if any. A running [`run`](Self::run)
    /// returns shortly after.
    pub async fn close(&self) {
        if let Some(conn) = self.inner.conn() {
            info!(peer = %conn.peer_addr(), "Closing client connection");
            conn.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("unique_name", &self.unique_name())
            .field("channel", &self.channel())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payloads::FourCC;
    use std::path::PathBuf;

    fn base() -> ClientConfig {
        ClientConfig {
            server_addr: "127.0.0.1".into(),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_product_from_key_count() {
        let mut one = ClientConfig {
            cd_keys: vec!["A".repeat(26)],
            ..base()
        };
        infer_from_install(&mut one, &Collaborators::default());
        assert_eq!(one.platform.product, PRODUCT_ROC);

        let mut two = ClientConfig {
            cd_keys: vec!["A".repeat(26), "B".repeat(26)],
            ..base()
        };
        infer_from_install(&mut two, &Collaborators::default());
        assert_eq!(two.platform.product, PRODUCT_TFT);

        let mut fixed = ClientConfig {
            cd_keys: vec!["A".repeat(26)],
            platform: crate::config::PlatformConfig {
                product: FourCC::from_bytes(*b"W3XP"),
                ..Default::default()
            },
            ..base()
        };
        infer_from_install(&mut fixed, &Collaborators::default());
        assert_eq!(fixed.platform.product, PRODUCT_TFT);
    }

    #[test]
    fn test_version_from_exe_version() {
        let mut cfg = ClientConfig {
            exe_version: 0x011A_0001,
            ..base()
        };
        let probe = infer_from_install(&mut cfg, &Collaborators::default());
        assert_eq!(cfg.platform.version, 26);
        assert!(probe.attempts.is_empty());
    }

    #[test]
    fn test_version_probe_falls_back() {
        let mut cfg = ClientConfig {
            bin_path: PathBuf::from("/nonexistent-install"),
            ..base()
        };
        let probe = infer_from_install(&mut cfg, &Collaborators::default());
        assert_eq!(probe.attempts.len(), 2);
        assert_eq!(cfg.platform.version, DEFAULT_GAME_VERSION);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = Client::new(ClientConfig::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_run_without_logon() {
        let client = Client::new(base()).unwrap();
        assert!(matches!(client.run().await, Err(ProtocolError::Custom(_))));
        assert!(client.say("\n").await.is_ok());
        assert!(client.say("hi").await.is_err());
    }

    #[test]
    fn test_chat_events_update_roster() {
        use crate::core::payloads::{ChatEvent, ChatEventType};

        let client = Client::new(base()).unwrap();
        let joins = Arc::new(Mutex::new(Vec::new()));
        let seen = joins.clone();
        client
            .on(EventKind::UserJoined, move |ev| {
                if let Event::UserJoined { user, .. } = ev {
                    seen.lock().unwrap().push(user.name.clone());
                }
            })
            .unwrap();

        let fire = |event_type, username: &str, text: &str| {
            client.dispatcher().fire(&Event::Packet(Packet::ChatEvent(ChatEvent {
                event_type,
                user_flags: 0,
                channel_flags: 0,
                ping: 0,
                username: username.into(),
                text: text.into(),
            })));
        };
        fire(ChatEventType::ChannelInfo, "", "W3");
        fire(ChatEventType::ShowUser, "Alice", "");
        fire(ChatEventType::Join, "Bob", "");

        assert_eq!(client.channel(), "W3");
        assert_eq!(client.users().len(), 2);
        assert!(client.user("ALICE").is_some());
        assert_eq!(*joins.lock().unwrap(), vec!["Alice", "Bob"]);
    }
}
