//! Operator authentication: one admin account, HS256 tokens.
//!
//! Credentials are the admin username plus the SHA-256 digest of the
//! password, both from config; nothing secret is ever persisted by this
//! module. The gate and the scheduler assume their caller is already
//! authenticated; only the console front checks tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{errors::Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Debug)]
pub struct AuthToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct Authenticator {
    admin_user: String,
    password_sha256: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: std::time::Duration,
}

impl Authenticator {
    pub fn new(
        admin_user: impl Into<String>,
        password_sha256: impl Into<String>,
        secret: &str,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            admin_user: admin_user.into(),
            password_sha256: password_sha256.into().to_lowercase(),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Check credentials and issue a token. The error is the same whether
    /// the username or the password was wrong.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<AuthToken> {
        let digest = sha256_hex(password);
        let user_ok = username == self.admin_user;
        let pass_ok = constant_time_eq(digest.as_bytes(), self.password_sha256.as_bytes());
        if !user_ok || !pass_ok {
            return Err(Error::Auth("invalid credentials".to_string()));
        }

        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.ttl)
                .map_err(|e| Error::Auth(format!("bad token ttl: {e}")))?;
        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Auth(format!("token encoding failed: {e}")))?;

        Ok(AuthToken { token, expires_at })
    }

    /// Validate a token (signature + expiry) and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| Error::Auth(format!("invalid token: {e}")))
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            "admin",
            sha256_hex("hunter2"),
            "test-secret-test-secret",
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let auth = authenticator();
        let issued = auth.authenticate("admin", "hunter2").unwrap();
        let claims = auth.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let auth = authenticator();
        assert!(matches!(
            auth.authenticate("admin", "letmein"),
            Err(Error::Auth(_))
        ));
        assert!(matches!(
            auth.authenticate("root", "hunter2"),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = authenticator();
        let issued = auth.authenticate("admin", "hunter2").unwrap();
        let mut tampered = issued.token.clone();
        tampered.push('x');
        assert!(auth.verify(&tampered).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = authenticator();
        // Forge a long-expired token with the right secret.
        let claims = Claims {
            sub: "admin".to_string(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-test-secret"),
        )
        .unwrap();
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let auth = authenticator();
        let other = Authenticator::new(
            "admin",
            sha256_hex("hunter2"),
            "a-completely-different-secret",
            Duration::from_secs(3600),
        );
        let issued = other.authenticate("admin", "hunter2").unwrap();
        assert!(auth.verify(&issued.token).is_err());
    }
}
