use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

pub const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    user_id: i64,
    username: String,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

/// Who is making a request, as proven by a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::days(TOKEN_TTL_DAYS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    pub fn issue(&self, user_id: i64, username: &str, roles: &[String]) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            username: username.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        debug!(user_id, "issuing token");
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Unexpected(format!("failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AppError::InvalidToken
        })?;

        Ok(Identity {
            user_id: data.claims.user_id,
            username: data.claims.username,
            roles: data.claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-12345";

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new(SECRET);
        let token = issuer.issue(42, "alice", &roles(&["User", "Admin"])).unwrap();

        let identity = issuer.verify(&token).unwrap();
        assert_eq!(
            identity,
            Identity {
                user_id: 42,
                username: "alice".to_string(),
                roles: roles(&["User", "Admin"]),
            }
        );
        assert!(identity.has_role("Admin"));
        assert!(!identity.has_role("admin"));
    }

    #[test]
    fn test_garbage_rejected() {
        let issuer = TokenIssuer::new(SECRET);
        assert!(matches!(issuer.verify("invalid.token.here"), Err(AppError::InvalidToken)));
        assert!(matches!(issuer.verify(""), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = TokenIssuer::new("secret1").issue(1, "bob", &roles(&["User"])).unwrap();
        assert!(TokenIssuer::new("secret2").verify(&token).is_err());
    }

    #[test]
    fn test_swapped_payload_rejected() {
        let issuer = TokenIssuer::new(SECRET);
        let user = issuer.issue(1, "bob", &roles(&["User"])).unwrap();
        let admin = issuer.issue(1, "bob", &roles(&["Admin"])).unwrap();

        let user_parts: Vec<&str> = user.split('.').collect();
        let admin_parts: Vec<&str> = admin.split('.').collect();
        let forged = format!("{}.{}.{}", user_parts[0], admin_parts[1], user_parts[2]);

        assert!(issuer.verify(&forged).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let issuer = TokenIssuer::with_ttl(SECRET, Duration::hours(-2));
        let token = issuer.issue(1, "bob", &roles(&["User"])).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AppError::InvalidToken)));
    }
}
