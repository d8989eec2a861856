//! NLS: SRP with the interleaved SHA-1 session key.
//!
//! All big integers travel as 32-byte little-endian arrays. Username and
//! password are upper-cased before hashing.
//!
//! ```text
//! A  = g^a % N
//! x  = H(salt | H(USER ":" PASS))
//! v  = g^x % N
//! u  = first four bytes of H(B), big endian
//! S  = (B - v)^(a + u*x) % N
//! K  = interleave(H(even bytes of S), H(odd bytes of S))
//! M1 = H(H(N) xor H(g) | H(USER) | salt | A | B | K)
//! M2 = H(A | M1 | K)
//! ```

use super::{ct_eq, hash, PasswordProof, KEY_LENGTH, PROOF_LENGTH, SALT_LENGTH};
use crate::error::{constants, ProtocolError, Result};
use num_bigint::BigUint;
use zeroize::{Zeroize, ZeroizeOnDrop};

const LARGE_SAFE_PRIME: [u8; KEY_LENGTH] = [
    0xF8, 0xFF, 0x1A, 0x8B, 0x61, 0x99, 0x18, 0x03, 0x21, 0x86, 0xB6, 0x8C, 0xA0, 0x92, 0xB5, 0x55,
    0x7E, 0x97, 0x6C, 0x78, 0xC7, 0x32, 0x12, 0xD9, 0x12, 0x16, 0xF6, 0x65, 0x85, 0x23, 0xC7, 0x87,
];

const GENERATOR: u8 = 47;

const SESSION_KEY_LENGTH: usize = 2 * PROOF_LENGTH;

fn large_safe_prime() -> BigUint {
    BigUint::from_bytes_be(&LARGE_SAFE_PRIME)
}

fn generator() -> BigUint {
    BigUint::from(GENERATOR)
}

/// Overwrite the digits of `value` in place and leave it zero.
///
/// `BigUint` has no `Zeroize` impl. Rewriting its digits reuses the same
/// allocation, so the secret does not linger there; copies made inside
/// `num-bigint` arithmetic are out of reach.
fn scrub(value: &mut BigUint) {
    let words = (value.bits() as usize).div_ceil(32);
    value.assign_from_slice(&vec![0u32; words]);
}

fn to_le_array(value: &BigUint) -> [u8; KEY_LENGTH] {
    let bytes = value.to_bytes_le();
    let mut out = [0u8; KEY_LENGTH];
    let n = bytes.len().min(KEY_LENGTH);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// `H(N) xor H(g)`, the first term of the client proof.
pub(crate) fn xor_hash() -> [u8; PROOF_LENGTH] {
    let mut n = LARGE_SAFE_PRIME;
    n.reverse();
    let hn = hash(&[&n]);
    let hg = hash(&[&[GENERATOR]]);
    let mut out = [0u8; PROOF_LENGTH];
    for (o, (a, b)) in out.iter_mut().zip(hn.iter().zip(hg.iter())) {
        *o = a ^ b;
    }
    out
}

fn interleaved_session_key(s: &[u8; KEY_LENGTH]) -> [u8; SESSION_KEY_LENGTH] {
    let even: Vec<u8> = s.iter().step_by(2).copied().collect();
    let odd: Vec<u8> = s.iter().skip(1).step_by(2).copied().collect();
    let g = hash(&[&even]);
    let h = hash(&[&odd]);

    let mut key = [0u8; SESSION_KEY_LENGTH];
    for (i, (e, o)) in g.iter().zip(h.iter()).enumerate() {
        key[2 * i] = *e;
        key[2 * i + 1] = *o;
    }
    key
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct NlsProof {
    private_key: [u8; KEY_LENGTH],
    client_key: [u8; KEY_LENGTH],
    /// H(USER ":" PASS)
    credentials_hash: [u8; PROOF_LENGTH],
    /// H(USER)
    username_hash: [u8; PROOF_LENGTH],
    expected_server_proof: Option<[u8; PROOF_LENGTH]>,
}

impl NlsProof {
    pub fn new(username: &str, password: &str) -> Self {
        Self::with_private_key(username, password, rand::random())
    }

    pub(crate) fn with_private_key(
        username: &str,
        password: &str,
        private_key: [u8; KEY_LENGTH],
    ) -> Self {
        let mut user = username.to_uppercase();
        let mut credentials = format!("{user}:{}", password.to_uppercase());

        let a = BigUint::from_bytes_le(&private_key);
        let client_key = to_le_array(&generator().modpow(&a, &large_safe_prime()));

        let proof = Self {
            private_key,
            client_key,
            credentials_hash: hash(&[credentials.as_bytes()]),
            username_hash: hash(&[user.as_bytes()]),
            expected_server_proof: None,
        };
        user.zeroize();
        credentials.zeroize();
        proof
    }

    fn x(&self, salt: &[u8; SALT_LENGTH]) -> BigUint {
        BigUint::from_bytes_le(&hash(&[salt, &self.credentials_hash]))
    }

    fn verifier(&self, salt: &[u8; SALT_LENGTH]) -> BigUint {
        let mut x = self.x(salt);
        let v = generator().modpow(&x, &large_safe_prime());
        scrub(&mut x);
        v
    }
}

impl PasswordProof for NlsProof {
    fn client_key(&self) -> [u8; KEY_LENGTH] {
        self.client_key
    }

    fn password_proof(
        &mut self,
        server_key: &[u8; KEY_LENGTH],
        salt: &[u8; SALT_LENGTH],
    ) -> Result<[u8; PROOF_LENGTH]> {
        let n = large_safe_prime();
        let b = BigUint::from_bytes_le(server_key) % &n;
        if b.bits() == 0 {
            return Err(ProtocolError::CryptoError(
                constants::ERR_ZERO_SERVER_KEY.into(),
            ));
        }

        let mut x = self.x(salt);
        let mut v = generator().modpow(&x, &n);

        let hb = hash(&[server_key]);
        let u = BigUint::from(u32::from_be_bytes([hb[0], hb[1], hb[2], hb[3]]));

        let mut base = (&n + &b - &v) % &n;
        let mut a = BigUint::from_bytes_le(&self.private_key);
        let mut exponent = &a + u * &x;
        let mut shared = base.modpow(&exponent, &n);
        let mut s = to_le_array(&shared);
        for secret in [&mut x, &mut v, &mut base, &mut a, &mut exponent, &mut shared] {
            scrub(secret);
        }
        let mut k = interleaved_session_key(&s);
        s.zeroize();

        let m1 = hash(&[
            &xor_hash(),
            &self.username_hash,
            salt,
            &self.client_key,
            server_key,
            &k,
        ]);
        self.expected_server_proof = Some(hash(&[&self.client_key, &m1, &k]));
        k.zeroize();

        Ok(m1)
    }

    fn verify_password(&self, server_proof: &[u8; PROOF_LENGTH]) -> bool {
        match &self.expected_server_proof {
            Some(expected) => ct_eq(expected, server_proof),
            None => false,
        }
    }

    fn account_create(&self) -> ([u8; SALT_LENGTH], [u8; KEY_LENGTH]) {
        let salt: [u8; SALT_LENGTH] = rand::random();
        let mut v = self.verifier(&salt);
        let verifier = to_le_array(&v);
        scrub(&mut v);
        (salt, verifier)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seq<const N: usize>(start: u8) -> [u8; N] {
        std::array::from_fn(|i| start + i as u8)
    }

    fn vector_context() -> NlsProof {
        NlsProof::with_private_key("TestUser", "Password123", seq(1))
    }

    // Server ephemeral for b = 100..132 and the salt below.
    const SERVER_KEY: &str = "03f5570522e3001e28ff5d44be1d964cdcd78bfddc809e17b3953eb1f1475e5b";

    #[test]
    fn test_xor_hash() {
        assert_eq!(
            hex::encode(xor_hash()),
            "6c0e97ed0af96babb15889eb8bba25a4f08c01f8"
        );
    }

    #[test]
    fn test_client_key_vector() {
        assert_eq!(
            hex::encode(vector_context().client_key()),
            "f085e0261e42a247db6e0bb57ae40d56746b0c16783606718a2c500d3fed2594"
        );
    }

    #[test]
    fn test_verifier_vector() {
        let ctx = vector_context();
        assert_eq!(
            hex::encode(to_le_array(&ctx.verifier(&seq(32)))),
            "dca1089538727471f3520faceefeb016d864b1f014f172c6e036d3a097b36246"
        );
    }

    #[test]
    fn test_proof_vector() {
        let mut ctx = vector_context();
        let server_key: [u8; 32] = hex::decode(SERVER_KEY).unwrap().try_into().unwrap();
        let m1 = ctx.password_proof(&server_key, &seq(32)).unwrap();
        assert_eq!(hex::encode(m1), "1542f2fc939f8c84713742aee59a1222da42bb34");

        let mut m2: [u8; 20] = hex::decode("3a72644339bb5bd96e85059018c83a68adb3ffe5")
            .unwrap()
            .try_into()
            .unwrap();
        assert!(ctx.verify_password(&m2));

        m2[7] ^= 0x01;
        assert!(!ctx.verify_password(&m2));
    }

    #[test]
    fn test_case_insensitive_credentials() {
        let a = NlsProof::with_private_key("testuser", "password123", seq(1));
        assert_eq!(a.credentials_hash, vector_context().credentials_hash);
    }

    #[test]
    fn test_zero_server_key_rejected() {
        let mut ctx = vector_context();
        assert!(ctx.password_proof(&[0u8; 32], &seq(32)).is_err());
        assert!(ctx.password_proof(&LARGE_SAFE_PRIME_LE, &seq(32)).is_err());
    }

    const LARGE_SAFE_PRIME_LE: [u8; 32] = {
        let mut out = [0u8; 32];
        let mut i = 0;
        while i < 32 {
            out[i] = LARGE_SAFE_PRIME[31 - i];
            i += 1;
        }
        out
    };

    #[test]
    fn test_account_create_matches_logon() {
        let ctx = vector_context();
        let (salt, verifier) = ctx.account_create();
        assert_eq!(verifier, to_le_array(&ctx.verifier(&salt)));
    }

    #[test]
    fn test_scrub_zeroes_in_place() {
        let mut value = large_safe_prime().pow(3u32);
        let bits = value.bits();
        scrub(&mut value);
        assert_eq!(value, BigUint::from(0u8));
        assert!(bits > 700);

        let mut small = BigUint::from(0xDEAD_BEEFu32);
        scrub(&mut small);
        assert_eq!(small.bits(), 0);
    }
}
