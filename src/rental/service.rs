//! Rental service layer - state machine transitions and deposit ledger
//!
//! All transitions are committed with conditional updates
//! (`... AND status = <expected>`), so at most one command ever wins a
//! given edge regardless of interleaving; nothing here takes an
//! application-level lock.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Tool, User};
use crate::notify::{send_best_effort, EmailMessage, Notifier};
use crate::payments::{CheckoutLineItem, CheckoutRequest, PaymentProvider};
use crate::rental::model::{
    compute_rental_costs, ClaimResolution, CreateRentalRequest, CreateRentalResponse,
    DepositStatus, ListRentalsQuery, Rental, RentalStatus,
};
use crate::tier::TierService;

/// Rental service for managing the rental lifecycle
#[derive(Clone)]
pub struct RentalService {
    db_pool: PgPool,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    tier_service: TierService,
    deposit_pence: i64,
    claim_window_days: i64,
}

impl RentalService {
    pub fn new(
        db_pool: PgPool,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
        tier_service: TierService,
        deposit_pence: i64,
        claim_window_days: i64,
    ) -> Self {
        Self {
            db_pool,
            payments,
            notifier,
            tier_service,
            deposit_pence,
            claim_window_days,
        }
    }

    /// Create a rental request and open a checkout session for it.
    ///
    /// The rental starts in `pending_payment`; only the checkout-completed
    /// webhook moves it on to `pending_approval`.
    pub async fn create_rental(
        &self,
        renter_id: Uuid,
        request: CreateRentalRequest,
    ) -> ApiResult<CreateRentalResponse> {
        let today = Utc::now().date_naive();
        request
            .validate(today)
            .map_err(ApiError::ValidationError)?;

        let renter = self.get_user(renter_id).await?;

        let allowance = renter.tier.borrow_allowance();
        if allowance == 0 {
            return Err(ApiError::Forbidden(
                "Your tier does not permit borrowing; list a tool or subscribe".to_string(),
            ));
        }
        let active_borrows = self.tier_service.active_borrow_count(renter_id).await?;
        if active_borrows >= allowance {
            return Err(ApiError::PreconditionFailed(format!(
                "Borrow limit reached for the {} tier ({} active)",
                renter.tier.as_str(),
                active_borrows
            )));
        }

        let tool = self.get_rentable_tool(request.tool_id).await?;
        if tool.owner_id == renter_id {
            return Err(ApiError::ValidationError(
                "You cannot rent your own tool".to_string(),
            ));
        }

        let costs = compute_rental_costs(
            tool.daily_rate_pence,
            request.start_date,
            request.end_date,
            self.deposit_pence,
        );

        let rental = sqlx::query_as::<_, Rental>(
            r#"
            INSERT INTO rentals (
                id, tool_id, renter_id, owner_id, start_date, end_date,
                duration_days, daily_rate_pence, rental_cost_pence,
                deposit_pence, total_cost_pence, status, deposit_status,
                transfer_pending, requested_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    'pending_payment', 'none', false, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tool.id)
        .bind(renter_id)
        .bind(tool.owner_id)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(costs.duration_days as i32)
        .bind(tool.daily_rate_pence)
        .bind(costs.rental_cost_pence)
        .bind(costs.deposit_pence)
        .bind(costs.total_cost_pence)
        .fetch_one(&self.db_pool)
        .await?;

        let checkout = self
            .payments
            .create_checkout(CheckoutRequest {
                customer_email: renter.email.clone(),
                line_items: vec![
                    CheckoutLineItem {
                        description: format!(
                            "{} rental, {} to {}",
                            tool.name, rental.start_date, rental.end_date
                        ),
                        amount_pence: costs.rental_cost_pence,
                    },
                    CheckoutLineItem {
                        description: "Refundable security deposit".to_string(),
                        amount_pence: costs.deposit_pence,
                    },
                ],
                metadata: vec![("rental_id".to_string(), rental.id.to_string())],
            })
            .await?;

        sqlx::query("UPDATE rentals SET checkout_session_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(&checkout.id)
            .bind(rental.id)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(
            rental_id = %rental.id,
            tool_id = %tool.id,
            total_pence = costs.total_cost_pence,
            "Rental requested, awaiting checkout"
        );

        Ok(CreateRentalResponse {
            rental,
            checkout_url: checkout.url,
        })
    }

    /// Confirm payment for a rental (webhook-driven).
    ///
    /// Moves `pending_payment -> pending_approval` and marks the deposit
    /// held. Idempotent: a redelivered webhook matches zero rows and is
    /// ignored.
    pub async fn confirm_payment(&self, rental_id: Uuid, payment_intent: &str) -> ApiResult<()> {
        let updated = sqlx::query_as::<_, Rental>(
            r#"
            UPDATE rentals
            SET status = 'pending_approval', deposit_status = 'held',
                payment_intent = $1, paid_at = NOW(), updated_at = NOW()
            WHERE id = $2 AND status = 'pending_payment'
            RETURNING *
            "#,
        )
        .bind(payment_intent)
        .bind(rental_id)
        .fetch_optional(&self.db_pool)
        .await?;

        let Some(rental) = updated else {
            tracing::debug!(rental_id = %rental_id, "Payment confirmation matched no pending rental");
            return Ok(());
        };

        tracing::info!(rental_id = %rental.id, "Rental paid, deposit held");

        if let Ok(owner) = self.get_user(rental.owner_id).await {
            send_best_effort(
                self.notifier.as_ref(),
                EmailMessage {
                    to: owner.email,
                    subject: "New rental request".to_string(),
                    template: "rental-requested".to_string(),
                    variables: vec![("rental_id".to_string(), rental.id.to_string())],
                },
            )
            .await;
        }

        Ok(())
    }

    /// Accept a rental request (owner only).
    ///
    /// The payout-account check happens before any state change; the payout
    /// transfer itself is best-effort after the transition commits.
    pub async fn accept(&self, caller_id: Uuid, rental_id: Uuid) -> ApiResult<Rental> {
        let rental = self.get_rental_required(rental_id).await?;

        if rental.owner_id != caller_id {
            return Err(ApiError::Forbidden(
                "Only the tool owner may accept a rental".to_string(),
            ));
        }
        if rental.status != RentalStatus::PendingApproval {
            return Err(ApiError::PreconditionFailed(format!(
                "Rental is not awaiting approval (status: {:?})",
                rental.status
            )));
        }

        let owner = self.get_user(caller_id).await?;
        let Some(payout_account) = owner.payout_account_id.clone() else {
            return Err(ApiError::PreconditionFailed(
                "Configure a payout account before accepting rentals".to_string(),
            ));
        };

        let accepted = sqlx::query_as::<_, Rental>(
            r#"
            UPDATE rentals
            SET status = 'active', accepted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending_approval'
            RETURNING *
            "#,
        )
        .bind(rental_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::PreconditionFailed("Rental was already accepted or rejected".to_string())
        })?;

        // Payout transfer is best-effort: a failure leaves the rental
        // active and flags it for operator follow-up.
        let payment_intent = accepted.payment_intent.clone().unwrap_or_default();
        match self
            .payments
            .transfer(
                accepted.rental_cost_pence,
                &payout_account,
                &payment_intent,
                &format!("payout-{}", accepted.id),
            )
            .await
        {
            Ok(transfer_id) => {
                sqlx::query(
                    "UPDATE rentals SET transfer_id = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(&transfer_id)
                .bind(accepted.id)
                .execute(&self.db_pool)
                .await?;
                tracing::info!(rental_id = %accepted.id, transfer_id = %transfer_id, "Owner payout transferred");
            }
            Err(e) => {
                sqlx::query(
                    "UPDATE rentals SET transfer_pending = true, updated_at = NOW() WHERE id = $1",
                )
                .bind(accepted.id)
                .execute(&self.db_pool)
                .await?;
                tracing::error!(
                    rental_id = %accepted.id,
                    error = %e,
                    "Payout transfer failed; flagged for manual retry"
                );
            }
        }

        if let Ok(renter) = self.get_user(accepted.renter_id).await {
            send_best_effort(
                self.notifier.as_ref(),
                EmailMessage {
                    to: renter.email,
                    subject: "Your rental was accepted".to_string(),
                    template: "rental-accepted".to_string(),
                    variables: vec![("rental_id".to_string(), accepted.id.to_string())],
                },
            )
            .await;
        }

        self.get_rental_required(accepted.id).await
    }

    /// Reject a rental request (owner only).
    ///
    /// The full refund is a hard precondition: it is issued before the
    /// state change, and a refund failure aborts the rejection. The
    /// idempotency key makes the refund safe if the conditional update
    /// then loses a race.
    pub async fn reject(
        &self,
        caller_id: Uuid,
        rental_id: Uuid,
        reason: String,
    ) -> ApiResult<Rental> {
        let rental = self.get_rental_required(rental_id).await?;

        if rental.owner_id != caller_id {
            return Err(ApiError::Forbidden(
                "Only the tool owner may reject a rental".to_string(),
            ));
        }
        if rental.status != RentalStatus::PendingApproval {
            return Err(ApiError::PreconditionFailed(format!(
                "Rental is not awaiting approval (status: {:?})",
                rental.status
            )));
        }

        let payment_intent = rental.payment_intent.clone().ok_or_else(|| {
            ApiError::PreconditionFailed("Rental has no captured payment to refund".to_string())
        })?;

        let refund_id = self
            .payments
            .refund(
                &payment_intent,
                None,
                "rental_rejected",
                &format!("refund-reject-{}", rental.id),
            )
            .await?;

        let rejected = sqlx::query_as::<_, Rental>(
            r#"
            UPDATE rentals
            SET status = 'rejected', deposit_status = 'refunded',
                rejection_reason = $1, refund_id = $2,
                rejected_at = NOW(), deposit_resolved_at = NOW(), updated_at = NOW()
            WHERE id = $3 AND status = 'pending_approval'
            RETURNING *
            "#,
        )
        .bind(&reason)
        .bind(&refund_id)
        .bind(rental_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::PreconditionFailed("Rental was already accepted or rejected".to_string())
        })?;

        tracing::info!(rental_id = %rejected.id, refund_id = %refund_id, "Rental rejected, payment refunded");

        if let Ok(renter) = self.get_user(rejected.renter_id).await {
            send_best_effort(
                self.notifier.as_ref(),
                EmailMessage {
                    to: renter.email,
                    subject: "Your rental was declined".to_string(),
                    template: "rental-rejected".to_string(),
                    variables: vec![
                        ("rental_id".to_string(), rejected.id.to_string()),
                        ("reason".to_string(), reason),
                    ],
                },
            )
            .await;
        }

        Ok(rejected)
    }

    /// Mark a rental returned (owner only) and open the deposit claim
    /// window.
    pub async fn mark_returned(&self, caller_id: Uuid, rental_id: Uuid) -> ApiResult<Rental> {
        let rental = self.get_rental_required(rental_id).await?;

        if rental.owner_id != caller_id {
            return Err(ApiError::Forbidden(
                "Only the tool owner may confirm a return".to_string(),
            ));
        }

        let window_ends = Utc::now() + Duration::days(self.claim_window_days);

        let returned = sqlx::query_as::<_, Rental>(
            r#"
            UPDATE rentals
            SET status = 'completed', deposit_status = 'pending_release',
                returned_at = NOW(), claim_window_ends_at = $1, updated_at = NOW()
            WHERE id = $2 AND status = 'active' AND deposit_status = 'held'
            RETURNING *
            "#,
        )
        .bind(window_ends)
        .bind(rental_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::PreconditionFailed(format!(
                "Rental is not active (status: {:?})",
                rental.status
            ))
        })?;

        tracing::info!(
            rental_id = %returned.id,
            window_ends = %window_ends,
            "Tool returned, deposit claim window open"
        );

        if let Ok(renter) = self.get_user(returned.renter_id).await {
            send_best_effort(
                self.notifier.as_ref(),
                EmailMessage {
                    to: renter.email,
                    subject: "Return confirmed".to_string(),
                    template: "rental-returned".to_string(),
                    variables: vec![("rental_id".to_string(), returned.id.to_string())],
                },
            )
            .await;
        }

        Ok(returned)
    }

    /// File a deposit claim (owner only, within the claim window)
    pub async fn file_claim(
        &self,
        caller_id: Uuid,
        rental_id: Uuid,
        reason: String,
    ) -> ApiResult<Rental> {
        let rental = self.get_rental_required(rental_id).await?;

        if rental.owner_id != caller_id {
            return Err(ApiError::Forbidden(
                "Only the tool owner may claim a deposit".to_string(),
            ));
        }
        if rental.deposit_status != DepositStatus::PendingRelease {
            return Err(ApiError::PreconditionFailed(format!(
                "Deposit is not awaiting release (status: {:?})",
                rental.deposit_status
            )));
        }
        match rental.claim_window_ends_at {
            Some(ends_at) if Utc::now() <= ends_at => {}
            _ => {
                return Err(ApiError::PreconditionFailed(
                    "The deposit claim window has closed".to_string(),
                ))
            }
        }

        let claimed = sqlx::query_as::<_, Rental>(
            r#"
            UPDATE rentals
            SET deposit_status = 'claimed', claim_reason = $1, updated_at = NOW()
            WHERE id = $2 AND deposit_status = 'pending_release'
            RETURNING *
            "#,
        )
        .bind(&reason)
        .bind(rental_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::PreconditionFailed("Deposit was already released or claimed".to_string())
        })?;

        tracing::info!(rental_id = %claimed.id, "Deposit claim filed, pending review");

        if let Ok(renter) = self.get_user(claimed.renter_id).await {
            send_best_effort(
                self.notifier.as_ref(),
                EmailMessage {
                    to: renter.email,
                    subject: "Deposit claim filed".to_string(),
                    template: "deposit-claimed".to_string(),
                    variables: vec![
                        ("rental_id".to_string(), claimed.id.to_string()),
                        ("reason".to_string(), reason),
                    ],
                },
            )
            .await;
        }

        Ok(claimed)
    }

    /// Resolve a deposit claim (admin only). The money movement is a hard
    /// precondition of the state change in both directions.
    pub async fn resolve_claim(
        &self,
        rental_id: Uuid,
        resolution: ClaimResolution,
        notes: Option<String>,
    ) -> ApiResult<Rental> {
        let rental = self.get_rental_required(rental_id).await?;

        if rental.deposit_status != DepositStatus::Claimed {
            return Err(ApiError::PreconditionFailed(format!(
                "Deposit has no open claim (status: {:?})",
                rental.deposit_status
            )));
        }

        let payment_intent = rental.payment_intent.clone().ok_or_else(|| {
            ApiError::InternalError("Claimed deposit without payment reference".to_string())
        })?;

        let new_status = match resolution {
            ClaimResolution::Forfeit => {
                let owner = self.get_user(rental.owner_id).await?;
                let Some(payout_account) = owner.payout_account_id else {
                    return Err(ApiError::PreconditionFailed(
                        "Owner has no payout account for the forfeited deposit".to_string(),
                    ));
                };
                self.payments
                    .transfer(
                        rental.deposit_pence,
                        &payout_account,
                        &payment_intent,
                        &format!("deposit-forfeit-{}", rental.id),
                    )
                    .await?;
                DepositStatus::Forfeited
            }
            ClaimResolution::Refund => {
                self.payments
                    .refund(
                        &payment_intent,
                        Some(rental.deposit_pence),
                        "deposit_claim_dismissed",
                        &format!("deposit-refund-{}", rental.id),
                    )
                    .await?;
                DepositStatus::Refunded
            }
        };

        let resolved = sqlx::query_as::<_, Rental>(
            r#"
            UPDATE rentals
            SET deposit_status = $1, admin_notes = $2,
                deposit_resolved_at = NOW(), updated_at = NOW()
            WHERE id = $3 AND deposit_status = 'claimed'
            RETURNING *
            "#,
        )
        .bind(new_status)
        .bind(&notes)
        .bind(rental_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::PreconditionFailed("Deposit claim was already resolved".to_string())
        })?;

        tracing::info!(
            rental_id = %resolved.id,
            resolution = ?resolution,
            "Deposit claim resolved"
        );

        Ok(resolved)
    }

    /// Release deposits whose claim window lapsed with no claim filed.
    ///
    /// Time-triggered only: invoked by the background sweep. A refund
    /// failure leaves the row in `pending_release` for the next pass.
    pub async fn release_due_deposits(&self) -> ApiResult<Vec<Uuid>> {
        let due = sqlx::query_as::<_, Rental>(
            r#"
            SELECT * FROM rentals
            WHERE deposit_status = 'pending_release'
              AND claim_window_ends_at IS NOT NULL
              AND claim_window_ends_at < NOW()
            ORDER BY claim_window_ends_at
            "#,
        )
        .fetch_all(&self.db_pool)
        .await?;

        let mut released = Vec::new();

        for rental in due {
            let Some(payment_intent) = rental.payment_intent.clone() else {
                tracing::error!(rental_id = %rental.id, "Deposit pending release without payment reference");
                continue;
            };

            let refund_id = match self
                .payments
                .refund(
                    &payment_intent,
                    Some(rental.deposit_pence),
                    "deposit_released",
                    &format!("deposit-release-{}", rental.id),
                )
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(
                        rental_id = %rental.id,
                        error = %e,
                        "Deposit refund failed; will retry next sweep"
                    );
                    continue;
                }
            };

            let updated = sqlx::query(
                r#"
                UPDATE rentals
                SET deposit_status = 'released', refund_id = $1,
                    deposit_resolved_at = NOW(), updated_at = NOW()
                WHERE id = $2 AND deposit_status = 'pending_release'
                "#,
            )
            .bind(&refund_id)
            .bind(rental.id)
            .execute(&self.db_pool)
            .await?;

            if updated.rows_affected() > 0 {
                tracing::info!(rental_id = %rental.id, refund_id = %refund_id, "Deposit released to renter");
                released.push(rental.id);
            }
        }

        Ok(released)
    }

    /// Get a single rental by ID
    pub async fn get_rental(&self, id: &Uuid) -> ApiResult<Option<Rental>> {
        let rental = sqlx::query_as::<_, Rental>("SELECT * FROM rentals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(rental)
    }

    /// List rentals with filtering and pagination
    pub async fn list_rentals(&self, query: ListRentalsQuery) -> ApiResult<Vec<Rental>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM rentals WHERE 1=1");

        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        if let Some(renter_id) = query.renter_id {
            query_builder.push(" AND renter_id = ");
            query_builder.push_bind(renter_id);
        }
        if let Some(owner_id) = query.owner_id {
            query_builder.push(" AND owner_id = ");
            query_builder.push_bind(owner_id);
        }

        query_builder.push(" ORDER BY requested_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset as i64);

        let rentals = query_builder
            .build_query_as::<Rental>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(rentals)
    }

    // ===== Private helpers =====

    async fn get_rental_required(&self, id: Uuid) -> ApiResult<Rental> {
        self.get_rental(&id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Rental {} not found", id)))
    }

    async fn get_user(&self, id: Uuid) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))
    }

    async fn get_rentable_tool(&self, id: Uuid) -> ApiResult<Tool> {
        let tool = sqlx::query_as::<_, Tool>(
            "SELECT * FROM tools WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tool {} not found", id)))?;

        if !tool.available {
            return Err(ApiError::PreconditionFailed(
                "Tool is not currently available".to_string(),
            ));
        }

        Ok(tool)
    }
}
