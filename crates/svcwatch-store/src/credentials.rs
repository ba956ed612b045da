//! Password salting and hashing.
//!
//! A user's hash is `base64(SHA-256(salt ":" password))`. The salt is a
//! fixed-length random alphanumeric string drawn from the system CSPRNG and
//! is regenerated every time a password is set.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{StoreError, StoreResult};
use crate::models::User;

/// Salt length in characters.
pub const SALT_LEN: usize = 16;

/// Length of generated passwords (seeded administrator).
pub const GENERATED_PASSWORD_LEN: usize = 20;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Largest byte value that maps uniformly onto `ALPHABET` (62 * 4 = 248).
const UNBIASED_LIMIT: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Generate a random string of letters and digits.
pub fn generate_nonce(len: usize) -> StoreResult<String> {
    let rng = SystemRandom::new();
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while out.len() < len {
        rng.fill(&mut buf)
            .map_err(|_| StoreError::Crypto("failed to read system random source".into()))?;
        for &b in &buf {
            if out.len() == len {
                break;
            }
            if b < UNBIASED_LIMIT {
                out.push(ALPHABET[usize::from(b) % ALPHABET.len()] as char);
            }
        }
    }

    Ok(out)
}

fn digest_password(salt: &str, password: &str) -> String {
    let salted = format!("{salt}:{password}");
    let hash = digest::digest(&digest::SHA256, salted.as_bytes());
    BASE64.encode(hash.as_ref())
}

/// Store a fresh salt and the matching hash of `password` on `user`.
pub fn generate_hash(user: &mut User, password: &str) -> StoreResult<()> {
    let salt = generate_nonce(SALT_LEN)?;
    user.pass_hash = digest_password(&salt, password);
    user.salt = salt;
    Ok(())
}

/// Recompute the hash with the user's stored salt and compare.
pub fn validate(user: &User, password: &str) -> bool {
    !user.pass_hash.is_empty() && digest_password(&user.salt, password) == user.pass_hash
}
