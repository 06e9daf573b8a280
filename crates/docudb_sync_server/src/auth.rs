//! Authentication support for the sync server.
//!
//! This module provides token-based authentication using HMAC-SHA256.
//! Tokens include an issue time for expiration checking.
//!
//! ## Token Format
//!
//! `<user>:<database>:<issued millis>:<hex signature>`, where the
//! signature is HMAC-SHA256 over everything before the last `:`. User
//! names may not contain `:`.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Issues and checks user tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for `user` on `database`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if either name contains `:`.
    pub fn create_token(&self, user: &str, database: &str) -> ServerResult<String> {
        if user.contains(':') || database.contains(':') {
            return Err(ServerError::InvalidRequest(
                "user and database names may not contain ':'".into(),
            ));
        }
        let claims = format!("{user}:{database}:{}", now_millis());
        let signature = hex::encode(self.sign(claims.as_bytes())?);
        Ok(format!("{claims}:{signature}"))
    }

    /// Validates a token for `database` and returns its user.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthorized` for a malformed, forged, expired or
    /// foreign-database token.
    pub fn validate_token(&self, token: &str, database: &str) -> ServerResult<String> {
        let (claims, signature) = token
            .rsplit_once(':')
            .ok_or_else(|| ServerError::NotAuthorized("malformed token".into()))?;
        let signature = hex::decode(signature)
            .map_err(|_| ServerError::NotAuthorized("malformed token signature".into()))?;

        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let mut parts = claims.splitn(3, ':');
        let (Some(user), Some(token_db), Some(issued)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ServerError::NotAuthorized("malformed token".into()));
        };
        if token_db != database {
            return Err(ServerError::NotAuthorized("database mismatch".into()));
        }
        let issued: u64 = issued
            .parse()
            .map_err(|_| ServerError::NotAuthorized("malformed token timestamp".into()))?;
        let expiry_millis = self.config.token_expiry.as_millis() as u64;
        if now_millis() > issued.saturating_add(expiry_millis) {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        Ok(user.to_string())
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("invalid HMAC key: {e}")))
    }

    /// Signs data with HMAC-SHA256.
    fn sign(&self, data: &[u8]) -> ServerResult<[u8; 32]> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new(AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec()))
    }

    #[test]
    fn create_and_validate_token() {
        let validator = validator();
        let token = validator.create_token("pupshaw", "travel").unwrap();
        assert_eq!(validator.validate_token(&token, "travel").unwrap(), "pupshaw");
    }

    #[test]
    fn reject_wrong_database() {
        let validator = validator();
        let token = validator.create_token("pupshaw", "travel").unwrap();
        assert!(validator.validate_token(&token, "beer").is_err());
    }

    #[test]
    fn reject_tampered_token() {
        let validator = validator();
        let token = validator.create_token("pupshaw", "travel").unwrap();
        let forged = token.replacen("pupshaw", "admin", 1);
        assert!(matches!(
            validator.validate_token(&forged, "travel"),
            Err(ServerError::NotAuthorized(_))
        ));
        assert!(validator.validate_token("garbage", "travel").is_err());
    }

    #[test]
    fn reject_token_from_other_secret() {
        let token = TokenValidator::new(AuthConfig::new(b"other".to_vec()))
            .create_token("pupshaw", "travel")
            .unwrap();
        assert!(validator().validate_token(&token, "travel").is_err());
    }

    #[test]
    fn reject_expired_token() {
        // Create a config with 0 expiry
        let validator = TokenValidator::new(
            AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec())
                .with_expiry(Duration::from_secs(0)),
        );
        let token = validator.create_token("pupshaw", "travel").unwrap();

        // Wait a tiny bit to ensure expiration
        std::thread::sleep(Duration::from_millis(10));

        assert!(validator.validate_token(&token, "travel").is_err());
    }

    #[test]
    fn reject_names_with_separator() {
        assert!(validator().create_token("a:b", "travel").is_err());
    }
}
