//! Session token generation and validation
//!
//! The identity collaborator hands users a signed session token carrying
//! their id and email-verified flag; handlers trust nothing else.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::User;

/// Session token errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Claims carried by a session token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Account email
    pub email: String,
    /// Whether the email address has been verified
    pub email_verified: bool,
    /// Token ID
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Token type; only `session` is issued here
    pub token_type: String,
}

/// Generate a session token for a user
pub fn generate_session_token(
    user: &User,
    secret: &str,
    ttl_seconds: i64,
) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        email_verified: user.email_verified,
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
        token_type: "session".to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| TokenError::EncodingFailed(e.to_string()))
}

/// Verify a session token and return its claims
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::TokenExpired,
        _ => TokenError::InvalidToken(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubscriptionTier, TierGrant};

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "renter@example.com".to_string(),
            username: "renter".to_string(),
            phone: None,
            email_verified: true,
            tier: SubscriptionTier::Basic,
            tier_granted_by: TierGrant::ToolWaiver,
            payment_customer_id: None,
            payout_account_id: None,
            available_tool_count: 1,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_round_trip() {
        let user = test_user();
        let token = generate_session_token(&user, "secret", 3600).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert!(claims.email_verified);
        assert_eq!(claims.token_type, "session");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let user = test_user();
        let token = generate_session_token(&user, "secret", 3600).unwrap();

        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let user = test_user();
        let token = generate_session_token(&user, "secret", -120).unwrap();

        assert!(matches!(
            verify_token(&token, "secret"),
            Err(TokenError::TokenExpired)
        ));
    }
}
