//! # Password Proof
//!
//! Zero-knowledge password proofs for account logon, creation and password
//! change.
//!
//! Two schemes share the [`PasswordProof`] contract:
//! - **NLS**: SRP over a 256-bit safe prime with `g = 47` (default)
//! - **SHA-1**: salted one-way hashing, no modular arithmetic
//!
//! A context lives for exactly one attempt. It keeps only hashes and keys,
//! never the plaintext password, and wipes itself on drop.

pub mod nls;
pub mod salted;

use crate::error::{constants, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

pub use nls::NlsProof;
pub use salted::Sha1Proof;

pub const KEY_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 32;
pub const PROOF_LENGTH: usize = 20;

/// Client side of a password proof exchange.
pub trait PasswordProof: Send + Sync {
    /// Public ephemeral value sent with the logon request.
    fn client_key(&self) -> [u8; KEY_LENGTH];

    /// Derive the shared secret from the server's challenge and return the
    /// client proof.
    fn password_proof(
        &mut self,
        server_key: &[u8; KEY_LENGTH],
        salt: &[u8; SALT_LENGTH],
    ) -> Result<[u8; PROOF_LENGTH]>;

    /// Check the server's counter-proof in constant time. Always `false`
    /// before [`password_proof`](Self::password_proof) has run.
    fn verify_password(&self, server_proof: &[u8; PROOF_LENGTH]) -> bool;

    /// Fresh `(salt, verifier)` pair for registering this password.
    fn account_create(&self) -> ([u8; SALT_LENGTH], [u8; KEY_LENGTH]);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofScheme {
    #[default]
    Nls,
    Sha1,
}

/// Build the proof context for `scheme`.
///
/// Fails before any key material is generated if the username is empty.
pub fn new_proof(
    scheme: ProofScheme,
    username: &str,
    password: &str,
) -> Result<Box<dyn PasswordProof>> {
    if username.is_empty() {
        return Err(ProtocolError::CryptoError(
            constants::ERR_EMPTY_USERNAME.into(),
        ));
    }
    Ok(match scheme {
        ProofScheme::Nls => Box::new(NlsProof::new(username, password)),
        ProofScheme::Sha1 => Box::new(Sha1Proof::new(username, password)),
    })
}

pub(crate) fn hash(parts: &[&[u8]]) -> [u8; PROOF_LENGTH] {
    parts
        .iter()
        .fold(Sha1::new(), |h, p| h.chain_update(p))
        .finalize()
        .into()
}

pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_username_rejected() {
        assert!(matches!(
            new_proof(ProofScheme::Nls, "", "pw"),
            Err(ProtocolError::CryptoError(_))
        ));
    }

    #[test]
    fn test_unverified_context_distrusts() {
        for scheme in [ProofScheme::Nls, ProofScheme::Sha1] {
            let ctx = new_proof(scheme, "user", "pw").unwrap();
            assert!(!ctx.verify_password(&[0u8; PROOF_LENGTH]));
        }
    }

    #[test]
    fn test_scheme_names() {
        #[derive(Deserialize)]
        struct Wrap {
            scheme: ProofScheme,
        }
        let w: Wrap = toml::from_str("scheme = \"sha1\"").unwrap();
        assert_eq!(w.scheme, ProofScheme::Sha1);
    }
}
