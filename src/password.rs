//! Password hashing and verification for local credentials.
//!
//! Stored form is `hex(derived_key).hex(salt)`: a 64-byte Argon2id output
//! and the 16-byte random salt it was derived with. SSO-only accounts carry
//! a sentinel value instead, which can never verify.

use argon2::Argon2;
use rand::RngCore;

/// Salt length in bytes (32 hex chars in the stored form).
const SALT_BYTES: usize = 16;

/// Derived key length in bytes (128 hex chars in the stored form).
const KEY_BYTES: usize = 64;

/// Sentinel stored for accounts created by the SSO flow. Not valid
/// `hex.hex`, so it can never collide with a real stored hash, and
/// verification against it always fails.
pub const UNUSABLE_PASSWORD: &str = "!sso";

/// Errors from hashing or verifying a password.
#[derive(Debug)]
pub enum PasswordError {
    /// The key derivation function rejected its input.
    Hashing(argon2::Error),
    /// Stored value is not two hex parts of the expected lengths.
    InvalidStoredFormat,
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Hashing(e) => write!(f, "Failed to hash password: {}", e),
            PasswordError::InvalidStoredFormat => write!(f, "Invalid stored password format"),
        }
    }
}

impl std::error::Error for PasswordError {}

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill_bytes(&mut salt);

    let key = derive_key(password, &salt)?;
    Ok(format!("{}.{}", hex::encode(key), hex::encode(salt)))
}

/// Verify a plaintext password against a stored `hex(key).hex(salt)` value.
///
/// Returns `Ok(false)` for the SSO sentinel (local login disabled) and for
/// any mismatch; the comparison runs in constant time over the full key.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    if is_unusable(stored) {
        return Ok(false);
    }

    let mut parts = stored.split('.');
    let (Some(key_hex), Some(salt_hex), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PasswordError::InvalidStoredFormat);
    };

    let expected = hex::decode(key_hex).map_err(|_| PasswordError::InvalidStoredFormat)?;
    let salt = hex::decode(salt_hex).map_err(|_| PasswordError::InvalidStoredFormat)?;
    if expected.len() != KEY_BYTES || salt.len() != SALT_BYTES {
        return Err(PasswordError::InvalidStoredFormat);
    }

    let key = derive_key(password, &salt)?;
    Ok(constant_time_eq(&key, &expected))
}

/// Whether a stored value is the SSO sentinel (local login disabled).
pub fn is_unusable(stored: &str) -> bool {
    stored == UNUSABLE_PASSWORD
}

/// Run the key derivation against a fixed salt and discard the result.
/// Called on login when the username is unknown, so that path costs the
/// same as a real verification and usernames cannot be enumerated by
/// timing.
pub fn dummy_verify(password: &str) {
    let _ = derive_key(password, &[0u8; SALT_BYTES]);
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_BYTES], PasswordError> {
    let mut key = [0u8; KEY_BYTES];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(PasswordError::Hashing)?;
    Ok(key)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
