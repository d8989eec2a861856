//! # Error Types
//!
//! Error handling for the BNCS client.
//!
//! Every failure is a value of [`ProtocolError`]; nothing in the crate logs an
//! error and carries on silently.
//!
//! ## Error Categories
//! - **Transport**: connect failure, write/read timeout, unexpected close
//! - **Framing**: signature mismatch, truncated frame, malformed payload
//! - **Rejections**: server result codes, see [`Rejection`]
//! - **Trust**: server signature or password proof mismatch
//! - **Input**: malformed CD keys, bad credentials, invalid configuration
//!
//! ## Example Usage
//! ```rust
//! use bncs_protocol::error::{ProtocolError, Result};
//! use tracing::{info, error};
//!
//! fn check(len: usize) -> Result<usize> {
//!     if len < 4 {
//!         return Err(ProtocolError::InvalidHeader);
//!     }
//!     Ok(len)
//! }
//!
//! match check(2) {
//!     Ok(len) => info!(len, "frame accepted"),
//!     Err(e) => error!(error = %e, "frame rejected"),
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::protocol::results::Rejection;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Framing errors
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after packet payload";
    pub const ERR_BAD_SIGNATURE_LEN: &str = "Server signature must be empty or 128 bytes";

    /// Connection errors
    pub const ERR_NOT_CONNECTED: &str = "Client has no live connection";
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Cryptographic errors
    pub const ERR_EMPTY_USERNAME: &str = "Username is required for password proof";
    pub const ERR_ZERO_SERVER_KEY: &str = "Server public key is zero modulo N";
    pub const ERR_PROOF_NOT_DERIVED: &str = "Password proof has not been derived";

    /// Handshake errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
    pub const ERR_NO_EXECUTABLE: &str = "No game executable found in install directory";
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Insufficient data: need {needed} bytes, {available} available")]
    InsufficientData { needed: usize, available: usize },

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Server rejected request: {0}")]
    Rejected(#[from] Rejection),

    #[error("Untrusted server: signature verification failed")]
    UntrustedServer,

    #[error("Password verification failed: server proof mismatch")]
    PasswordVerification,

    #[error("Invalid CD key: {0}")]
    InvalidCdKey(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error only reports that the connection went away.
    pub fn is_close_error(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Framing errors mean the byte stream can no longer be trusted.
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidHeader
                | ProtocolError::InsufficientData { .. }
                | ProtocolError::InvalidPacket(_)
                | ProtocolError::OversizedPacket(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_classification() {
        assert!(ProtocolError::ConnectionClosed.is_close_error());
        assert!(ProtocolError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)).is_close_error());
        assert!(!ProtocolError::Timeout.is_close_error());
        assert!(!ProtocolError::PasswordVerification.is_close_error());
    }

    #[test]
    fn test_framing_classification() {
        assert!(ProtocolError::InvalidHeader.is_framing_error());
        assert!(ProtocolError::InsufficientData {
            needed: 4,
            available: 1
        }
        .is_framing_error());
        assert!(!ProtocolError::UntrustedServer.is_framing_error());
    }
}
