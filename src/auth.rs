//! Password hashing and session key generation.

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

const ALGORITHM: &str = "sha256";
const HASH_ITERATIONS: u32 = 20_000;

/// Name of the cookie carrying the session key.
pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("unsupported password hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Hash a password as `sha256$<iterations>$<salt>$<hex digest>`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = derive(password, &salt, HASH_ITERATIONS);
    format!("{}${}${}${}", ALGORITHM, HASH_ITERATIONS, salt, digest)
}

/// Check a password against a stored hash.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let mut parts = stored.splitn(4, '$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(expected)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedHash);
    };

    if algorithm != ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm.to_string()));
    }
    let iterations: u32 = iterations.parse().map_err(|_| AuthError::MalformedHash)?;
    if iterations == 0 {
        return Err(AuthError::MalformedHash);
    }

    let actual = derive(password, salt, iterations);
    Ok(constant_time_eq(actual.as_bytes(), expected.as_bytes()))
}

/// Generate a fresh random key for sessions and API tokens.
pub fn generate_key() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

fn derive(password: &str, salt: &str, iterations: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let mut digest = hasher.finalize();

    for _ in 1..iterations {
        let mut hasher = Sha256::new();
        hasher.update(digest.as_slice());
        hasher.update(password.as_bytes());
        digest = hasher.finalize();
    }

    format!("{:x}", digest)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("correct horse");
        assert!(stored.starts_with("sha256$20000$"));
        assert_eq!(verify_password("correct horse", &stored), Ok(true));
        assert_eq!(verify_password("wrong horse", &stored), Ok(false));
    }

    #[test]
    fn same_password_gets_different_salts() {
        assert_ne!(hash_password("secret123"), hash_password("secret123"));
    }

    #[test]
    fn malformed_hashes_are_rejected() {
        assert_eq!(verify_password("x", "nonsense"), Err(AuthError::MalformedHash));
        assert_eq!(
            verify_password("x", "sha256$abc$salt$digest"),
            Err(AuthError::MalformedHash)
        );
        assert_eq!(
            verify_password("x", "md5$1$salt$digest"),
            Err(AuthError::UnsupportedAlgorithm("md5".to_string()))
        );
    }

    #[test]
    fn generated_keys_are_unique_hex() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
