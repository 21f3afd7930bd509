//! Shared data models for the ToolShare backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Subscription tiers, ordered from least to most privileged
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "subscription_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    None,
    Free,
    Basic,
    Standard,
    Pro,
}

impl SubscriptionTier {
    /// Maximum number of concurrent non-terminal rentals this tier permits
    pub fn borrow_allowance(&self) -> i64 {
        match self {
            SubscriptionTier::None | SubscriptionTier::Free => 0,
            SubscriptionTier::Basic => 2,
            SubscriptionTier::Standard => 5,
            SubscriptionTier::Pro => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::None => "none",
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Standard => "standard",
            SubscriptionTier::Pro => "pro",
        }
    }
}

/// How the current tier was granted. Stored explicitly so no branch ever
/// has to re-derive intent from the tier name alone.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "tier_grant", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TierGrant {
    /// Backed by an active paid subscription at the payment provider
    Payment,
    /// Granted because the user lists enough available tools
    ToolWaiver,
}

/// User model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub tier: SubscriptionTier,
    pub tier_granted_by: TierGrant,
    /// Customer reference at the payment provider, if one exists
    pub payment_customer_id: Option<String>,
    /// Connected payout account for receiving rental income
    pub payout_account_id: Option<String>,
    /// Count of currently listed, available tools. Recomputed from the
    /// tools table on every tier recalculation, never incremented in place.
    pub available_tool_count: i32,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user, without provider references
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub email_verified: bool,
    pub tier: SubscriptionTier,
    pub tier_granted_by: TierGrant,
    pub available_tool_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            email_verified: user.email_verified,
            tier: user.tier,
            tier_granted_by: user.tier_granted_by,
            available_tool_count: user.available_tool_count,
            created_at: user.created_at,
        }
    }
}

/// Physical condition of a listed tool
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "tool_condition", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ToolCondition {
    New,
    Good,
    Fair,
    Worn,
}

/// Tool listing model. Rows are soft-deleted via `deleted_at`, never
/// removed, so historical rentals keep their references.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Tool {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub category: String,
    pub condition: ToolCondition,
    /// Daily rental rate in pence
    pub daily_rate_pence: i64,
    /// Assessed replacement value in pence
    pub assessed_value_pence: i64,
    pub available: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// Whether this listing counts toward its owner's tool-waiver tier
    pub fn counts_for_waiver(&self) -> bool {
        self.available && self.deleted_at.is_none()
    }
}
