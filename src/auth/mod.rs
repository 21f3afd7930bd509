//! Session authentication for ToolShare
//!
//! Issues and validates the signed session tokens handlers authenticate
//! with. Credential verification itself (signup, email verification)
//! lives with the identity collaborator.

mod jwt;

pub use jwt::{generate_session_token, verify_token, Claims, TokenError};

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::User;

/// Auth service: token issue/verify plus user lookup for extractors
#[derive(Clone)]
pub struct AuthService {
    db_pool: PgPool,
    jwt_secret: String,
    session_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(db_pool: PgPool, jwt_secret: String, session_ttl_seconds: i64) -> Self {
        Self {
            db_pool,
            jwt_secret,
            session_ttl_seconds,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    /// Issue a session token for a user
    pub fn issue_session(&self, user: &User) -> Result<String, TokenError> {
        generate_session_token(user, &self.jwt_secret, self.session_ttl_seconds)
    }

    /// Load the user a set of verified claims refers to
    pub async fn load_user(&self, user_id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Session user no longer exists".to_string()))
    }
}
