//! Tier determination engine for ToolShare
//!
//! Reconciles a user's paid subscription state with tool-count-based
//! waivers into the effective access tier. The calculator itself is a pure
//! function; `TierService` wraps it with persistence and is invoked after
//! every tool mutation and every payment webhook event.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{SubscriptionTier, TierGrant, User};

/// Listing at least this many available tools grants the standard waiver
const STANDARD_WAIVER_TOOL_COUNT: i64 = 3;

/// Listing at least this many available tools grants the basic waiver
const BASIC_WAIVER_TOOL_COUNT: i64 = 1;

/// A user's current tier together with how it was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierStanding {
    pub tier: SubscriptionTier,
    pub granted_by: TierGrant,
}

impl TierStanding {
    pub fn new(tier: SubscriptionTier, granted_by: TierGrant) -> Self {
        Self { tier, granted_by }
    }

    /// Standing for a user with no subscription and no waiver
    pub fn none() -> Self {
        Self {
            tier: SubscriptionTier::None,
            granted_by: TierGrant::Payment,
        }
    }

    fn is_paid(&self) -> bool {
        self.granted_by == TierGrant::Payment
            && !matches!(self.tier, SubscriptionTier::None | SubscriptionTier::Free)
    }
}

/// What the calculator decided, for audit logging
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TierAction {
    NoChange,
    UpgradedToStandardFree,
    UpgradedToBasicFree,
    DowngradedNoTools,
    PaidSubscription,
}

/// Result of a tier calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierDecision {
    pub tier: SubscriptionTier,
    pub granted_by: TierGrant,
    pub action: TierAction,
    pub is_free_waiver: bool,
}

/// Compute the effective tier from the current standing and the number of
/// available tools the user lists.
///
/// Precedence:
/// 1. three or more tools grants the standard waiver, unless the user
///    already holds standard or pro;
/// 2. one or two tools grants the basic waiver, but only over none/free;
/// 3. zero tools revokes a waiver, while a paid subscription survives any
///    tool count.
///
/// Pure and deterministic; callers persist the decision.
pub fn compute_effective_tier(current: TierStanding, owned_available_tools: i64) -> TierDecision {
    if owned_available_tools >= STANDARD_WAIVER_TOOL_COUNT {
        if matches!(
            current.tier,
            SubscriptionTier::Standard | SubscriptionTier::Pro
        ) {
            // Already at or above the waiver level; never downgrade here.
            return preserved(current);
        }
        return TierDecision {
            tier: SubscriptionTier::Standard,
            granted_by: TierGrant::ToolWaiver,
            action: TierAction::UpgradedToStandardFree,
            is_free_waiver: true,
        };
    }

    if owned_available_tools >= BASIC_WAIVER_TOOL_COUNT {
        if matches!(current.tier, SubscriptionTier::None | SubscriptionTier::Free) {
            return TierDecision {
                tier: SubscriptionTier::Basic,
                granted_by: TierGrant::ToolWaiver,
                action: TierAction::UpgradedToBasicFree,
                is_free_waiver: true,
            };
        }
        // Basic/standard/pro already held are preserved.
        return preserved(current);
    }

    // Zero tools: revoke waivers, keep paid subscriptions.
    if current.granted_by == TierGrant::ToolWaiver
        && matches!(
            current.tier,
            SubscriptionTier::Basic | SubscriptionTier::Standard
        )
    {
        return TierDecision {
            tier: SubscriptionTier::None,
            granted_by: TierGrant::Payment,
            action: TierAction::DowngradedNoTools,
            is_free_waiver: false,
        };
    }

    preserved(current)
}

fn preserved(current: TierStanding) -> TierDecision {
    let action = if current.is_paid() {
        TierAction::PaidSubscription
    } else {
        TierAction::NoChange
    };

    TierDecision {
        tier: current.tier,
        granted_by: current.granted_by,
        action,
        is_free_waiver: current.granted_by == TierGrant::ToolWaiver,
    }
}

/// Tier service: recomputes and persists effective tiers
#[derive(Clone)]
pub struct TierService {
    db_pool: PgPool,
}

impl TierService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Recount the user's available tools from the tools table and apply
    /// the calculator, persisting the tier when it changed.
    ///
    /// Called after every tool create/update/delete and after every
    /// subscription webhook event.
    pub async fn recalculate(&self, user_id: Uuid) -> ApiResult<TierDecision> {
        let user = self.get_user(user_id).await?;
        let tool_count = self.count_available_tools(user_id).await?;

        let decision = compute_effective_tier(
            TierStanding::new(user.tier, user.tier_granted_by),
            tool_count,
        );

        self.persist(&user, tool_count, decision).await?;

        tracing::info!(
            user_id = %user_id,
            tool_count,
            tier = decision.tier.as_str(),
            action = ?decision.action,
            "Tier recalculated"
        );

        Ok(decision)
    }

    /// Apply a paid subscription tier reported by the payment provider.
    /// A cancellation arrives as `None`, after which the waiver rules
    /// take over on the next recalculation.
    pub async fn apply_paid_tier(
        &self,
        user_id: Uuid,
        paid_tier: Option<SubscriptionTier>,
    ) -> ApiResult<TierDecision> {
        let standing = match paid_tier {
            Some(tier) => TierStanding::new(tier, TierGrant::Payment),
            None => TierStanding::none(),
        };

        let user = self.get_user(user_id).await?;
        let tool_count = self.count_available_tools(user_id).await?;

        // The provider's word overrides the stored standing, then the
        // waiver rules run on top so a cancelled subscriber with tools
        // keeps a waiver tier.
        let decision = compute_effective_tier(standing, tool_count);

        self.persist(&user, tool_count, decision).await?;

        tracing::info!(
            user_id = %user_id,
            tier = decision.tier.as_str(),
            action = ?decision.action,
            "Paid subscription state applied"
        );

        Ok(decision)
    }

    /// Current number of non-terminal rentals the user has as renter,
    /// used for the borrow-allowance check on rental creation.
    pub async fn active_borrow_count(&self, user_id: Uuid) -> ApiResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM rentals
            WHERE renter_id = $1
              AND status IN ('pending_payment', 'pending_approval', 'active')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }

    async fn get_user(&self, user_id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))
    }

    async fn count_available_tools(&self, user_id: Uuid) -> ApiResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM tools
            WHERE owner_id = $1 AND available = true AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }

    async fn persist(
        &self,
        user: &User,
        tool_count: i64,
        decision: TierDecision,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET tier = $1, tier_granted_by = $2, available_tool_count = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(decision.tier)
        .bind(decision.granted_by)
        .bind(tool_count as i32)
        .bind(user.id)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiver(tier: SubscriptionTier) -> TierStanding {
        TierStanding::new(tier, TierGrant::ToolWaiver)
    }

    fn paid(tier: SubscriptionTier) -> TierStanding {
        TierStanding::new(tier, TierGrant::Payment)
    }

    #[test]
    fn test_three_tools_grants_standard_waiver() {
        // Scenario: no subscription, three tools listed
        let decision = compute_effective_tier(TierStanding::none(), 3);
        assert_eq!(decision.tier, SubscriptionTier::Standard);
        assert_eq!(decision.action, TierAction::UpgradedToStandardFree);
        assert!(decision.is_free_waiver);
    }

    #[test]
    fn test_one_tool_grants_basic_waiver() {
        let decision = compute_effective_tier(paid(SubscriptionTier::Free), 1);
        assert_eq!(decision.tier, SubscriptionTier::Basic);
        assert_eq!(decision.action, TierAction::UpgradedToBasicFree);
        assert!(decision.is_free_waiver);

        let decision = compute_effective_tier(TierStanding::none(), 2);
        assert_eq!(decision.tier, SubscriptionTier::Basic);
    }

    #[test]
    fn test_paid_standard_never_downgraded_by_tool_count() {
        // Scenario: paid standard subscriber with zero tools keeps standard
        let decision = compute_effective_tier(paid(SubscriptionTier::Standard), 0);
        assert_eq!(decision.tier, SubscriptionTier::Standard);
        assert_eq!(decision.action, TierAction::PaidSubscription);
        assert!(!decision.is_free_waiver);

        // Same for pro at every count
        for count in 0..5 {
            let decision = compute_effective_tier(paid(SubscriptionTier::Pro), count);
            assert_eq!(decision.tier, SubscriptionTier::Pro);
        }
    }

    #[test]
    fn test_waiver_revoked_at_zero_tools() {
        let decision = compute_effective_tier(waiver(SubscriptionTier::Standard), 0);
        assert_eq!(decision.tier, SubscriptionTier::None);
        assert_eq!(decision.action, TierAction::DowngradedNoTools);

        let decision = compute_effective_tier(waiver(SubscriptionTier::Basic), 0);
        assert_eq!(decision.tier, SubscriptionTier::None);
        assert_eq!(decision.action, TierAction::DowngradedNoTools);
    }

    #[test]
    fn test_standard_waiver_held_with_one_tool() {
        // Dropping from 3 tools to 1 keeps the standard waiver: only the
        // zero-tool rule revokes it.
        let decision = compute_effective_tier(waiver(SubscriptionTier::Standard), 1);
        assert_eq!(decision.tier, SubscriptionTier::Standard);
        assert_eq!(decision.action, TierAction::NoChange);
        assert!(decision.is_free_waiver);
    }

    #[test]
    fn test_paid_basic_upgraded_to_standard_waiver() {
        let decision = compute_effective_tier(paid(SubscriptionTier::Basic), 3);
        assert_eq!(decision.tier, SubscriptionTier::Standard);
        assert_eq!(decision.action, TierAction::UpgradedToStandardFree);
        assert!(decision.is_free_waiver);
    }

    #[test]
    fn test_paid_basic_preserved_with_one_tool() {
        let decision = compute_effective_tier(paid(SubscriptionTier::Basic), 1);
        assert_eq!(decision.tier, SubscriptionTier::Basic);
        assert_eq!(decision.granted_by, TierGrant::Payment);
        assert_eq!(decision.action, TierAction::PaidSubscription);
    }

    #[test]
    fn test_no_tools_no_subscription_is_no_change() {
        let decision = compute_effective_tier(TierStanding::none(), 0);
        assert_eq!(decision.tier, SubscriptionTier::None);
        assert_eq!(decision.action, TierAction::NoChange);
    }

    #[test]
    fn test_calculator_is_deterministic() {
        let standings = [
            TierStanding::none(),
            paid(SubscriptionTier::Free),
            waiver(SubscriptionTier::Basic),
            waiver(SubscriptionTier::Standard),
            paid(SubscriptionTier::Basic),
            paid(SubscriptionTier::Standard),
            paid(SubscriptionTier::Pro),
        ];

        for standing in standings {
            for count in 0..6 {
                let first = compute_effective_tier(standing, count);
                let second = compute_effective_tier(standing, count);
                assert_eq!(first, second, "{:?} with {} tools", standing, count);
            }
        }
    }
}
