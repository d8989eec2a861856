//! # bncs-protocol
//!
//! Client side of the BNCS chat and authentication protocol.
//!
//! ## Layers
//! - [`core`]: byte buffer, packet catalog and the tokio codec
//! - [`transport`]: framed TCP connection with deadlines and rate limiting
//! - [`crypto`]: NLS (SRP) and salted SHA-1 password proofs
//! - [`protocol`]: events, dispatcher, result codes, logon handshake
//! - [`client`]: logon, keep-alive, channel roster and chat
//!
//! Executable hashing, server signature checks and CD key decoding are
//! plugged in through [`external::Collaborators`].
//!
//! ## Quick start
//! ```no_run
//! use bncs_protocol::{Client, ClientConfig, EventKind};
//!
//! # async fn demo() -> bncs_protocol::Result<()> {
//! let client = Client::new(ClientConfig {
//!     server_addr: "server.example".into(),
//!     username: "someone".into(),
//!     password: "secret".into(),
//!     exe_version: 0x011A_0001,
//!     exe_hash: 0x1234_5678,
//!     exe_info: "war3.exe 01/01/20 00:00:00 1".into(),
//!     ..ClientConfig::default()
//! })?;
//! client.on(EventKind::Whisper, |ev| println!("{ev:?}"))?;
//! client.logon().await?;
//! client.run().await
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod client;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod external;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use client::Client;
pub use config::{ClientConfig, Config};
pub use core::packet::Packet;
pub use error::{ProtocolError, Rejection, Result};
pub use protocol::{Dispatcher, Event, EventKind};
pub use transport::BncsConn;
