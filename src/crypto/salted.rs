//! Salted SHA-1 password proof.
//!
//! Everything derives from one secret, `x = H(salt | H(user) | H(password))`
//! with both strings lower-cased. The verifier registered with the server is
//! `x` zero-padded to 32 bytes, so the server can run the same proofs:
//! `M1 = H(A | B | x)` and `M2 = H(B | M1 | x)`.

use super::{ct_eq, hash, PasswordProof, KEY_LENGTH, PROOF_LENGTH, SALT_LENGTH};
use crate::error::Result;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Sha1Proof {
    client_key: [u8; KEY_LENGTH],
    username_hash: [u8; PROOF_LENGTH],
    password_hash: [u8; PROOF_LENGTH],
    expected_server_proof: Option<[u8; PROOF_LENGTH]>,
}

impl Sha1Proof {
    pub fn new(username: &str, password: &str) -> Self {
        Self::with_client_key(username, password, rand::random())
    }

    pub(crate) fn with_client_key(
        username: &str,
        password: &str,
        client_key: [u8; KEY_LENGTH],
    ) -> Self {
        let mut user = username.to_lowercase();
        let mut pass = password.to_lowercase();
        let proof = Self {
            client_key,
            username_hash: hash(&[user.as_bytes()]),
            password_hash: hash(&[pass.as_bytes()]),
            expected_server_proof: None,
        };
        user.zeroize();
        pass.zeroize();
        proof
    }

    fn secret(&self, salt: &[u8; SALT_LENGTH]) -> [u8; PROOF_LENGTH] {
        hash(&[salt, &self.username_hash, &self.password_hash])
    }
}

impl PasswordProof for Sha1Proof {
    fn client_key(&self) -> [u8; KEY_LENGTH] {
        self.client_key
    }

    fn password_proof(
        &mut self,
        server_key: &[u8; KEY_LENGTH],
        salt: &[u8; SALT_LENGTH],
    ) -> Result<[u8; PROOF_LENGTH]> {
        let mut x = self.secret(salt);
        let m1 = hash(&[&self.client_key, server_key, &x]);
        self.expected_server_proof = Some(hash(&[server_key, &m1, &x]));
        x.zeroize();
        Ok(m1)
    }

    fn verify_password(&self, server_proof: &[u8; PROOF_LENGTH]) -> bool {
        self.expected_server_proof
            .as_ref()
            .is_some_and(|expected| ct_eq(expected, server_proof))
    }

    fn account_create(&self) -> ([u8; SALT_LENGTH], [u8; KEY_LENGTH]) {
        let salt: [u8; SALT_LENGTH] = rand::random();
        let mut verifier = [0u8; KEY_LENGTH];
        verifier[..PROOF_LENGTH].copy_from_slice(&self.secret(&salt));
        (salt, verifier)
    }
}
