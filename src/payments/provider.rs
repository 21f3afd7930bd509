//! Payment provider contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;
use crate::models::SubscriptionTier;

/// Errors from the payment collaborator
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment provider request failed: {0}")]
    RequestFailed(String),

    #[error("Payment provider returned an error: {0}")]
    ProviderError(String),

    #[error("Unexpected payment provider response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::RequestFailed(err.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::ExternalServiceError(err.to_string())
    }
}

/// A single line on a checkout session
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLineItem {
    pub description: String,
    pub amount_pence: i64,
}

/// Request for a hosted checkout session
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_email: String,
    pub line_items: Vec<CheckoutLineItem>,
    /// Opaque key/value pairs echoed back on the completion webhook
    pub metadata: Vec<(String, String)>,
}

impl CheckoutRequest {
    pub fn total_pence(&self) -> i64 {
        self.line_items.iter().map(|item| item.amount_pence).sum()
    }
}

/// A created checkout session
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Subscription status reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Trialing,
}

/// A customer's subscription state at the provider
#[derive(Debug, Clone)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    /// Tier the subscription's price maps to, when one is active
    pub tier: Option<SubscriptionTier>,
}

impl SubscriptionState {
    /// The paid tier this state grants, if the subscription is in good
    /// standing. `PastDue` keeps the tier; `Canceled` drops it.
    pub fn granted_tier(&self) -> Option<SubscriptionTier> {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue => {
                self.tier
            }
            SubscriptionStatus::Canceled => None,
        }
    }
}

/// The payment processor surface the engine depends on.
///
/// Refunds and transfers take an idempotency key: once issued they cannot
/// be retracted, so retries must be deduplicated by the provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session and return its URL
    async fn create_checkout(&self, request: CheckoutRequest)
        -> Result<CheckoutSession, PaymentError>;

    /// Refund a captured payment, fully or partially
    async fn refund(
        &self,
        payment_reference: &str,
        amount_pence: Option<i64>,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError>;

    /// Transfer funds to a connected payout account
    async fn transfer(
        &self,
        amount_pence: i64,
        destination_account: &str,
        source_reference: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError>;

    /// Look up a customer's current subscription state
    async fn retrieve_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<SubscriptionState, PaymentError>;
}
