//! Credential hashing (Argon2id, salted per call).

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// Hash a plaintext password into a PHC string.
///
/// A fresh random salt is drawn per call, so the same input never hashes to
/// the same output; callers must go through [`verify`], never compare hashes.
///
/// # Errors
/// Fails on an empty plaintext or an internal hasher error. Error messages
/// never echo the input.
pub fn hash(plaintext: &str) -> Result<String> {
    if plaintext.is_empty() {
        return Err(anyhow!("refusing to hash an empty password"));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("password hashing failed: {err}"))
}

/// Verify a plaintext against a stored PHC string.
///
/// Comparison happens inside Argon2 in constant time relative to mismatch
/// position; malformed stored hashes simply fail verification.
#[must_use]
pub fn verify(plaintext: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}
