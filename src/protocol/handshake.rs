//! Logon handshake.
//!
//! Drives one connection from the protocol greeting to chat. Every step
//! sends a request and waits for its response through [`exchange`]; pings
//! that arrive in between are answered and anything else is fired on the
//! dispatcher, so the server never sees a stalled client.
//!
//! A failed step closes the connection. Retrying means dialing again.

use crate::config::{ClientConfig, PROTOCOL_ID};
use crate::core::packet::Packet;
use crate::core::payloads::{
    join_flags, AuthAccountChangePassProofReq, AuthAccountCreateReq, AuthAccountLogonProofReq,
    AuthAccountLogonReq, AuthCheckReq, AuthInfoReq, AuthInfoResp, EnterChatReq, EnterChatResp,
    GameVersion, JoinChannel, NetGamePort, Ping, SetEmail,
};
use crate::crypto::PasswordProof;
use crate::error::{constants, ProtocolError, Result};
use crate::external::{self, Collaborators};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::event::Event;
use crate::protocol::results::{self, ProofAccepted};
use crate::transport::BncsConn;
use crate::utils::metrics::{Metrics, Timer};
use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Connecting,
    AwaitingVersionChallenge,
    ProvingVersionAndKeys,
    LoggingOn,
    CreatingAccount,
    ChangingPassword,
    AwaitingProof,
    EnteringChat,
    SteadyState,
    Failed,
    Closed,
}

thread_local! {
    static PING_ANSWERED: Cell<bool> = const { Cell::new(false) };
}

/// Whether the ping being fired on this thread was already echoed by
/// [`exchange`]. Ping handlers check this to avoid answering twice.
pub fn ping_answered() -> bool {
    PING_ANSWERED.with(Cell::get)
}

/// Clears the flag even if a handler panics.
struct AnsweredGuard;

impl Drop for AnsweredGuard {
    fn drop(&mut self) {
        PING_ANSWERED.with(|flag| flag.set(false));
    }
}

/// Fire a ping that has already been echoed.
pub(crate) fn fire_answered_ping(dispatcher: &Dispatcher, ping: Ping) -> usize {
    PING_ANSWERED.with(|flag| flag.set(true));
    let _guard = AnsweredGuard;
    dispatcher.fire(&Event::Packet(Packet::Ping(ping)))
}

/// Send `request` and wait for the response `expect` accepts.
///
/// The first read is bounded by `first_timeout`. Once anything has arrived
/// the wait is unbounded: the server is alive and the response will follow
/// its unsolicited traffic. Pings are echoed straight back and then fired
/// with [`ping_answered`] set; every other packet `expect` hands back is
/// fired on `dispatcher`.
pub async fn exchange<T, F>(
    conn: &BncsConn,
    dispatcher: &Dispatcher,
    request: &Packet,
    first_timeout: Duration,
    mut expect: F,
) -> Result<T>
where
    F: FnMut(Packet) -> std::result::Result<T, Packet>,
{
    conn.send(request).await?;

    let mut timeout = Some(first_timeout);
    loop {
        let packet = conn.next_packet(timeout.take()).await?;
        match expect(packet) {
            Ok(response) => return Ok(response),
            Err(Packet::Ping(ping)) => {
                debug!(payload = ping.payload, "Answering ping during handshake");
                conn.send(&Packet::Ping(ping)).await?;
                fire_answered_ping(dispatcher, ping);
            }
            Err(other) => {
                dispatcher.fire(&Event::Packet(other));
            }
        }
    }
}

/// Shape check on every configured CD key. Runs before any network I/O.
pub fn preflight(config: &ClientConfig, collaborators: &Collaborators) -> Result<()> {
    for key in &config.cd_keys {
        collaborators.keys.validate(key)?;
    }
    Ok(())
}

/// Seconds since the epoch, truncated to 32 bits.
fn client_token() -> Result<u32> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .map_err(|_| ProtocolError::Custom(constants::ERR_SYSTEM_TIME.into()))
}

fn auth_info_request(config: &ClientConfig) -> AuthInfoReq {
    let p = &config.platform;
    AuthInfoReq {
        protocol_id: PROTOCOL_ID,
        platform_code: p.platform_code,
        game_version: GameVersion {
            product: p.product,
            version: p.version,
        },
        language_code: p.language_code,
        local_ip: p.local_ip,
        time_zone_bias: p.time_zone_bias,
        mpq_locale_id: p.mpq_locale_id,
        user_language_id: p.user_language_id,
        country_abbreviation: p.country_abbreviation.clone(),
        country: p.country.clone(),
    }
}

/// One connection working its way through the logon sequence.
pub struct Handshake {
    conn: Arc<BncsConn>,
    dispatcher: Dispatcher,
    config: ClientConfig,
    collaborators: Collaborators,
    metrics: Arc<Metrics>,
    state: HandshakeState,
}

impl Handshake {
    /// Open the TCP connection.
    pub async fn connect(
        config: ClientConfig,
        collaborators: Collaborators,
        dispatcher: Dispatcher,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        metrics.handshake_attempt();
        let conn = BncsConn::connect(&config.server_addr, config.conn_settings(), metrics.clone())
            .await
            .inspect_err(|_| metrics.handshake_failed())?;
        Ok(Self::with_conn(
            Arc::new(conn),
            config,
            collaborators,
            dispatcher,
            metrics,
        ))
    }

    /// Continue on a connection that already sent the greeting.
    pub fn with_conn(
        conn: Arc<BncsConn>,
        config: ClientConfig,
        collaborators: Collaborators,
        dispatcher: Dispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            conn,
            dispatcher,
            config,
            collaborators,
            metrics,
            state: HandshakeState::Connecting,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn conn(&self) -> &Arc<BncsConn> {
        &self.conn
    }

    fn enter(&mut self, next: HandshakeState) {
        debug!(from = ?self.state, to = ?next, "Handshake state");
        self.state = next;
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(state = ?self.state, error = %e, "Handshake failed");
            self.enter(HandshakeState::Failed);
            self.metrics.handshake_failed();
            self.conn.close();
        }
        result
    }

    /// Version challenge and CD key proof.
    #[instrument(skip(self), fields(peer = %self.conn.peer_addr()))]
    pub async fn dial(&mut self) -> Result<()> {
        let _timer = Timer::start("dial");
        let result = self.dial_steps().await;
        self.settle(result)
    }

    async fn dial_steps(&mut self) -> Result<()> {
        self.enter(HandshakeState::AwaitingVersionChallenge);
        let request = Packet::AuthInfoReq(auth_info_request(&self.config));
        let info = exchange(
            &self.conn,
            &self.dispatcher,
            &request,
            self.config.timeouts.handshake,
            |p| match p {
                Packet::AuthInfoResp(resp) => Ok(resp),
                other => Err(other),
            },
        )
        .await?;
        debug!(
            logon_type = info.logon_type,
            mpq = %info.mpq_file_name,
            "Version challenge received"
        );

        if self.config.verify_signature {
            let ip = self.conn.peer_addr().ip();
            let trusted = info
                .server_signature
                .as_ref()
                .is_some_and(|sig| self.collaborators.signature.verify(ip, sig));
            if !trusted {
                return Err(ProtocolError::UntrustedServer);
            }
        }

        self.enter(HandshakeState::ProvingVersionAndKeys);
        let request = Packet::AuthCheckReq(self.auth_check_request(&info)?);
        let check = exchange(
            &self.conn,
            &self.dispatcher,
            &request,
            self.config.timeouts.handshake,
            |p| match p {
                Packet::AuthCheckResp(resp) => Ok(resp),
                other => Err(other),
            },
        )
        .await?;
        results::auth_check(check.result, &check.additional_info)?;
        info!("Game version and CD keys accepted");
        Ok(())
    }

    /// Fill in whatever executable details the configuration left out.
    fn auth_check_request(&self, info: &AuthInfoResp) -> Result<AuthCheckReq> {
        let cfg = &self.config;
        let client_token = client_token()?;
        let mut exe_info = cfg.exe_info.clone();
        let mut exe_version = cfg.exe_version;
        let mut exe_hash = cfg.exe_hash;

        if exe_version == 0 || exe_hash == 0 {
            let version = cfg.platform.version;
            let exe_path = cfg.bin_path.join(external::exe_name(version));
            std::fs::metadata(&exe_path)?;

            if exe_version == 0 {
                let (v, i) = self.collaborators.exe.exe_info(&exe_path)?;
                exe_version = v;
                if exe_info.is_empty() {
                    exe_info = i;
                }
            }

            if exe_hash == 0 {
                let files = external::revision_files(&cfg.bin_path, version)?;
                let mpq = external::extract_mpq_number(&info.mpq_file_name);
                exe_hash = self
                    .collaborators
                    .exe
                    .check_revision(&info.value_string, &files, mpq)?;
            }
        }

        let cd_keys = cfg
            .cd_keys
            .iter()
            .map(|key| {
                self.collaborators
                    .keys
                    .key_proof(key, client_token, info.server_token)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AuthCheckReq {
            client_token,
            exe_version,
            exe_hash,
            cd_keys,
            spawn: false,
            exe_information: exe_info,
            key_owner_name: cfg.cd_key_owner.clone(),
        })
    }

    /// Prove the password and check the server's counter-proof.
    ///
    /// A server that reports success with a proof we cannot verify is
    /// treated as an impostor.
    #[instrument(skip(self, proof), fields(user = %self.config.username))]
    pub async fn logon(&mut self, proof: &mut dyn PasswordProof) -> Result<()> {
        let _timer = Timer::start("logon");
        let result = self.logon_steps(proof).await;
        self.settle(result)
    }

    async fn logon_steps(&mut self, proof: &mut dyn PasswordProof) -> Result<()> {
        self.enter(HandshakeState::LoggingOn);
        let timeout = self.config.timeouts.logon;
        let request = Packet::AuthAccountLogonReq(AuthAccountLogonReq {
            client_key: proof.client_key(),
            username: self.config.username.clone(),
        });
        let challenge = exchange(&self.conn, &self.dispatcher, &request, timeout, |p| match p {
            Packet::AuthAccountLogonResp(resp) => Ok(resp),
            other => Err(other),
        })
        .await?;
        results::account_logon(challenge.result)?;

        self.enter(HandshakeState::AwaitingProof);
        let client_proof = proof.password_proof(&challenge.server_key, &challenge.salt)?;
        let request = Packet::AuthAccountLogonProofReq(AuthAccountLogonProofReq {
            client_password_proof: client_proof,
        });
        let resp = exchange(&self.conn, &self.dispatcher, &request, timeout, |p| match p {
            Packet::AuthAccountLogonProofResp(resp) => Ok(resp),
            other => Err(other),
        })
        .await?;

        if results::logon_proof(resp.result, &resp.additional_information)?
            == ProofAccepted::EmailRequired
        {
            debug!("Server asks for an e-mail address, registering none");
            self.conn
                .send(&Packet::SetEmail(SetEmail {
                    email_address: String::new(),
                }))
                .await?;
        }

        if !proof.verify_password(&resp.server_password_proof) {
            return Err(ProtocolError::PasswordVerification);
        }
        info!("Logged on");
        Ok(())
    }

    /// Register the configured account name with a fresh salt and verifier.
    #[instrument(skip(self, proof), fields(user = %self.config.username))]
    pub async fn create_account(&mut self, proof: &dyn PasswordProof) -> Result<()> {
        let result = self.create_account_steps(proof).await;
        self.settle(result)
    }

    async fn create_account_steps(&mut self, proof: &dyn PasswordProof) -> Result<()> {
        self.enter(HandshakeState::CreatingAccount);
        let (salt, verifier) = proof.account_create();
        let request = Packet::AuthAccountCreateReq(AuthAccountCreateReq {
            salt,
            verifier,
            username: self.config.username.clone(),
        });
        let resp = exchange(
            &self.conn,
            &self.dispatcher,
            &request,
            self.config.timeouts.logon,
            |p| match p {
                Packet::AuthAccountCreateResp(resp) => Ok(resp),
                other => Err(other),
            },
        )
        .await?;
        results::account_create(resp.result)?;
        info!("Account created");
        Ok(())
    }

    /// Prove the current password with `old` and register `new` in its place.
    #[instrument(skip(self, old, new), fields(user = %self.config.username))]
    pub async fn change_password(
        &mut self,
        old: &mut dyn PasswordProof,
        new: &dyn PasswordProof,
    ) -> Result<()> {
        let result = self.change_password_steps(old, new).await;
        self.settle(result)
    }

    async fn change_password_steps(
        &mut self,
        old: &mut dyn PasswordProof,
        new: &dyn PasswordProof,
    ) -> Result<()> {
        self.enter(HandshakeState::ChangingPassword);
        let timeout = self.config.timeouts.logon;
        let request = Packet::AuthAccountChangePassReq(AuthAccountLogonReq {
            client_key: old.client_key(),
            username: self.config.username.clone(),
        });
        let challenge = exchange(&self.conn, &self.dispatcher, &request, timeout, |p| match p {
            Packet::AuthAccountChangePassResp(resp) => Ok(resp),
            other => Err(other),
        })
        .await?;
        results::account_logon(challenge.result)?;

        self.enter(HandshakeState::AwaitingProof);
        let client_proof = old.password_proof(&challenge.server_key, &challenge.salt)?;
        let (new_salt, new_verifier) = new.account_create();
        let request = Packet::AuthAccountChangePassProofReq(AuthAccountChangePassProofReq {
            client_password_proof: client_proof,
            new_salt,
            new_verifier,
        });
        let resp = exchange(&self.conn, &self.dispatcher, &request, timeout, |p| match p {
            Packet::AuthAccountChangePassProofResp(resp) => Ok(resp),
            other => Err(other),
        })
        .await?;
        results::change_pass_proof(resp.result)?;

        if !old.verify_password(&resp.server_password_proof) {
            return Err(ProtocolError::PasswordVerification);
        }
        info!("Password changed");
        Ok(())
    }

    /// Advertise the game port, enter chat and join the home channel.
    #[instrument(skip(self))]
    pub async fn enter_chat(&mut self) -> Result<EnterChatResp> {
        let result = self.enter_chat_steps().await;
        self.settle(result)
    }

    async fn enter_chat_steps(&mut self) -> Result<EnterChatResp> {
        self.enter(HandshakeState::EnteringChat);
        if self.config.game_port != 0 {
            self.conn
                .send(&Packet::NetGamePort(NetGamePort {
                    port: self.config.game_port,
                }))
                .await?;
        }

        let request = Packet::EnterChatReq(EnterChatReq::default());
        let chat = exchange(
            &self.conn,
            &self.dispatcher,
            &request,
            self.config.timeouts.handshake,
            |p| match p {
                Packet::EnterChatResp(resp) => Ok(resp),
                other => Err(other),
            },
        )
        .await?;

        self.conn
            .send(&Packet::JoinChannel(JoinChannel {
                flag: join_flags::FIRST_JOIN,
                channel: self.config.home_channel.clone(),
            }))
            .await?;
        info!(unique_name = %chat.unique_name, channel = %self.config.home_channel, "Entered chat");
        Ok(chat)
    }

    /// Hand the connection over to steady-state operation.
    pub fn finish(mut self) -> Arc<BncsConn> {
        self.enter(HandshakeState::SteadyState);
        self.metrics.handshake_success();
        self.conn
    }

    /// End a handshake that does not lead to chat, such as account creation.
    pub async fn close(mut self) {
        if self.state != HandshakeState::Failed {
            self.metrics.handshake_success();
        }
        self.enter(HandshakeState::Closed);
        self.conn.shutdown().await;
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("state", &self.state)
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}
