//! Payment provider webhook handler
//!
//! Deliveries are rejected unless the signature verifies against the
//! shared signing secret; an unconfigured secret fails closed.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::payments::{verify_webhook_signature, PaymentEvent, PaymentEventObject};
use crate::state::AppState;

/// Entry point for payment provider events
pub async fn payment_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(secret) = app_state.webhook_secret.as_deref().filter(|s| !s.is_empty()) else {
        // Fail-closed: without a configured secret no payload is trusted
        tracing::error!("Webhook secret not configured - rejecting request");
        return Err(ApiError::InternalError(
            "Webhook endpoint is not configured".to_string(),
        ));
    };

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing webhook signature".to_string()))?;

    verify_webhook_signature(
        &body,
        signature,
        secret,
        app_state.webhook_tolerance_seconds,
        Utc::now().timestamp(),
    )?;

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    tracing::info!(event_type = %event.event_type, "Payment webhook received");

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            handle_checkout_completed(&app_state, event.data.object).await?;
        }
        "customer.subscription.updated"
        | "customer.subscription.deleted"
        | "customer.subscription.created" => {
            handle_subscription_changed(&app_state, event.data.object).await?;
        }
        other => {
            tracing::debug!(event_type = %other, "Ignoring unhandled webhook event");
        }
    }

    Ok(Json(serde_json::json!({ "received": true })))
}

/// A completed checkout either pays for a rental or starts a subscription
async fn handle_checkout_completed(
    app_state: &AppState,
    object: PaymentEventObject,
) -> ApiResult<()> {
    if object.mode.as_deref() == Some("subscription") {
        // Tie the provider customer to our user, then pull the
        // authoritative subscription state.
        let Some(customer_id) = object.customer.clone() else {
            tracing::warn!("Subscription checkout without customer reference");
            return Ok(());
        };

        if let Some(user_id) = object.metadata.get("user_id") {
            if let Ok(user_id) = Uuid::parse_str(user_id) {
                sqlx::query(
                    "UPDATE users SET payment_customer_id = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(&customer_id)
                .bind(user_id)
                .execute(&app_state.db_pool)
                .await?;
            }
        }

        return apply_subscription_state(app_state, &customer_id).await;
    }

    // One-off checkout: a rental payment
    let Some(rental_id) = object.metadata.get("rental_id") else {
        tracing::warn!("Checkout completed without rental_id metadata");
        return Ok(());
    };
    let rental_id = Uuid::parse_str(rental_id)
        .map_err(|_| ApiError::BadRequest("Malformed rental_id metadata".to_string()))?;

    let payment_intent = object.payment_intent.ok_or_else(|| {
        ApiError::BadRequest("Checkout completed without payment intent".to_string())
    })?;

    app_state
        .rental_service
        .confirm_payment(rental_id, &payment_intent)
        .await
}

/// Subscription lifecycle events re-derive the user's paid tier
async fn handle_subscription_changed(
    app_state: &AppState,
    object: PaymentEventObject,
) -> ApiResult<()> {
    let Some(customer_id) = object.customer else {
        tracing::warn!("Subscription event without customer reference");
        return Ok(());
    };

    apply_subscription_state(app_state, &customer_id).await
}

async fn apply_subscription_state(app_state: &AppState, customer_id: &str) -> ApiResult<()> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE payment_customer_id = $1")
        .bind(customer_id)
        .fetch_optional(&app_state.db_pool)
        .await?;

    let Some(user) = user else {
        tracing::warn!(customer_id = %customer_id, "Subscription event for unknown customer");
        return Ok(());
    };

    // Re-fetch from the provider rather than trusting event ordering
    let state = app_state
        .payments
        .retrieve_subscription_status(customer_id)
        .await?;

    app_state
        .tier_service
        .apply_paid_tier(user.id, state.granted_tier())
        .await?;

    Ok(())
}
