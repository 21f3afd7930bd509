//! Rental transaction models and pure transition rules

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Longest bookable rental span, in days
pub const MAX_RENTAL_DAYS: i64 = 30;

/// Rental transaction status.
///
/// Every rental starts in `PendingPayment`; the checkout-completed webhook
/// is the only edge into `PendingApproval`. Status only ever moves along
/// the directed edges checked by [`RentalStatus::can_transition_to`].
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "rental_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    PendingPayment,
    PendingApproval,
    Active,
    Completed,
    Rejected,
}

impl RentalStatus {
    /// Whether the state machine permits this edge
    pub fn can_transition_to(&self, next: RentalStatus) -> bool {
        matches!(
            (self, next),
            (RentalStatus::PendingPayment, RentalStatus::PendingApproval)
                | (RentalStatus::PendingApproval, RentalStatus::Active)
                | (RentalStatus::PendingApproval, RentalStatus::Rejected)
                | (RentalStatus::Active, RentalStatus::Completed)
        )
    }

    /// Terminal statuses admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, RentalStatus::Completed | RentalStatus::Rejected)
    }
}

/// Deposit sub-state attached to a rental
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "deposit_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    None,
    Held,
    PendingRelease,
    Released,
    Claimed,
    Forfeited,
    Refunded,
}

impl DepositStatus {
    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        matches!(
            (self, next),
            (DepositStatus::None, DepositStatus::Held)
                | (DepositStatus::Held, DepositStatus::PendingRelease)
                // A rejected rental refunds the held deposit directly
                | (DepositStatus::Held, DepositStatus::Refunded)
                | (DepositStatus::PendingRelease, DepositStatus::Released)
                | (DepositStatus::PendingRelease, DepositStatus::Claimed)
                | (DepositStatus::Claimed, DepositStatus::Forfeited)
                | (DepositStatus::Claimed, DepositStatus::Refunded)
        )
    }

    /// Once terminal, no deposit field may be mutated again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositStatus::Released | DepositStatus::Forfeited | DepositStatus::Refunded
        )
    }
}

/// Rental transaction model.
///
/// `renter_id` and `owner_id` are immutable after creation, and
/// `total_cost_pence = rental_cost_pence + deposit_pence` always holds.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Rental {
    pub id: Uuid,
    pub tool_id: Uuid,
    pub renter_id: Uuid,
    pub owner_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i32,
    /// Daily rate snapshot taken at creation; later listing edits do not
    /// reprice an existing rental
    pub daily_rate_pence: i64,
    pub rental_cost_pence: i64,
    pub deposit_pence: i64,
    pub total_cost_pence: i64,
    pub status: RentalStatus,
    pub deposit_status: DepositStatus,
    pub checkout_session_id: Option<String>,
    pub payment_intent: Option<String>,
    pub refund_id: Option<String>,
    pub transfer_id: Option<String>,
    /// Set when the payout transfer failed after acceptance and needs
    /// operator follow-up
    pub transfer_pending: bool,
    pub rejection_reason: Option<String>,
    pub claim_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub claim_window_ends_at: Option<DateTime<Utc>>,
    pub requested_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub deposit_resolved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for creating a rental
#[derive(Debug, Deserialize)]
pub struct CreateRentalRequest {
    pub tool_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CreateRentalRequest {
    /// Validate the requested date range against `today`.
    ///
    /// The range must start strictly in the future, end after it starts,
    /// and span at most [`MAX_RENTAL_DAYS`].
    pub fn validate(&self, today: NaiveDate) -> Result<(), String> {
        if self.start_date <= today {
            return Err("Start date must be in the future".to_string());
        }
        if self.end_date <= self.start_date {
            return Err("End date must be after start date".to_string());
        }
        let duration = rental_duration_days(self.start_date, self.end_date);
        if duration > MAX_RENTAL_DAYS {
            return Err(format!(
                "Rental may not exceed {} days (requested {})",
                MAX_RENTAL_DAYS, duration
            ));
        }
        Ok(())
    }
}

/// Number of billable days between two dates
pub fn rental_duration_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Costs computed at rental creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalCosts {
    pub duration_days: i64,
    pub rental_cost_pence: i64,
    pub deposit_pence: i64,
    pub total_cost_pence: i64,
}

/// Price a rental: rate snapshot times duration, plus the fixed deposit
pub fn compute_rental_costs(
    daily_rate_pence: i64,
    start: NaiveDate,
    end: NaiveDate,
    deposit_pence: i64,
) -> RentalCosts {
    let duration_days = rental_duration_days(start, end);
    let rental_cost_pence = daily_rate_pence * duration_days;
    RentalCosts {
        duration_days,
        rental_cost_pence,
        deposit_pence,
        total_cost_pence: rental_cost_pence + deposit_pence,
    }
}

/// Response DTO for rental creation
#[derive(Debug, Serialize)]
pub struct CreateRentalResponse {
    pub rental: Rental,
    /// Hosted checkout URL the renter completes payment at
    pub checkout_url: String,
}

/// Request DTO for rejecting a rental
#[derive(Debug, Deserialize)]
pub struct RejectRentalRequest {
    pub reason: String,
}

/// Request DTO for filing a deposit claim
#[derive(Debug, Deserialize)]
pub struct FileClaimRequest {
    pub reason: String,
}

/// Admin resolution of a deposit claim
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimResolution {
    /// Deposit is paid out to the owner
    Forfeit,
    /// Deposit is returned to the renter
    Refund,
}

/// Request DTO for resolving a claim
#[derive(Debug, Deserialize)]
pub struct ResolveClaimRequest {
    pub resolution: ClaimResolution,
    pub notes: Option<String>,
}

/// Query parameters for listing rentals
#[derive(Debug, Deserialize)]
pub struct ListRentalsQuery {
    pub status: Option<RentalStatus>,
    pub renter_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}
