//! bcrypt password hashing.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking pool.

use uuid::Uuid;

use crate::auth::AuthError;

/// Opaque single-use token: 64 hex characters from two v4 UUIDs.
pub fn verification_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

/// `Ok(false)` for a wrong password; `Err` only for a malformed hash.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hash = hash_password("Password123!", 4).await.unwrap();
        assert_ne!(hash, "Password123!");
        assert!(verify_password("Password123!", &hash).await.unwrap());
        assert!(!verify_password("password123!", &hash).await.unwrap());
    }

    #[test]
    fn test_verification_tokens_are_hex_and_distinct() {
        let a = verification_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, verification_token());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-hash").await.is_err());
    }
}
