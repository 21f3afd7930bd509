//! Stripe HTTP client implementing the payment provider contract

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider, SubscriptionState,
    SubscriptionStatus,
};
use crate::models::SubscriptionTier;

/// Stripe API client
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_url: String,
    secret_key: String,
}

/// Stripe error envelope
#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    data: Vec<SubscriptionObject>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    status: String,
    items: SubscriptionItems,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItems {
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItem {
    price: PriceObject,
}

#[derive(Debug, Deserialize)]
struct PriceObject {
    lookup_key: Option<String>,
}

impl StripeClient {
    pub fn new(api_url: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            secret_key,
        }
    }

    /// Map a price lookup key to the tier it sells
    fn tier_from_lookup_key(key: &str) -> Option<SubscriptionTier> {
        match key {
            "basic" => Some(SubscriptionTier::Basic),
            "standard" => Some(SubscriptionTier::Standard),
            "pro" => Some(SubscriptionTier::Pro),
            _ => None,
        }
    }

    fn status_from_str(status: &str) -> SubscriptionStatus {
        match status {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            _ => SubscriptionStatus::Canceled,
        }
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let mut request = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .form(params);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: StripeErrorBody = response.json().await.map_err(|_| {
                PaymentError::UnexpectedResponse(format!("HTTP {} with unreadable body", status))
            })?;
            return Err(PaymentError::ProviderError(format!(
                "{}: {}",
                body.error.error_type.unwrap_or_else(|| "api_error".to_string()),
                body.error.message.unwrap_or_default()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::UnexpectedResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer_email".to_string(), request.customer_email.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            params.push((
                format!("line_items[{}][price_data][currency]", i),
                "gbp".to_string(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.description.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.amount_pence.to_string(),
            ));
            params.push((format!("line_items[{}][quantity]", i), "1".to_string()));
        }

        for (key, value) in &request.metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
            // Propagate onto the payment intent so refunds can be traced back
            params.push((
                format!("payment_intent_data[metadata][{}]", key),
                value.clone(),
            ));
        }

        self.post_form("/checkout/sessions", &params, None).await
    }

    async fn refund(
        &self,
        payment_reference: &str,
        amount_pence: Option<i64>,
        reason: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError> {
        let mut params: Vec<(String, String)> = vec![
            ("payment_intent".to_string(), payment_reference.to_string()),
            ("metadata[reason]".to_string(), reason.to_string()),
        ];
        if let Some(amount) = amount_pence {
            params.push(("amount".to_string(), amount.to_string()));
        }

        let response: RefundResponse = self
            .post_form("/refunds", &params, Some(idempotency_key))
            .await?;

        Ok(response.id)
    }

    async fn transfer(
        &self,
        amount_pence: i64,
        destination_account: &str,
        source_reference: &str,
        idempotency_key: &str,
    ) -> Result<String, PaymentError> {
        let params: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_pence.to_string()),
            ("currency".to_string(), "gbp".to_string()),
            ("destination".to_string(), destination_account.to_string()),
            (
                "metadata[source_reference]".to_string(),
                source_reference.to_string(),
            ),
        ];

        let response: TransferResponse = self
            .post_form("/transfers", &params, Some(idempotency_key))
            .await?;

        Ok(response.id)
    }

    async fn retrieve_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<SubscriptionState, PaymentError> {
        let response = self
            .http
            .get(format!("{}/subscriptions", self.api_url))
            .bearer_auth(&self.secret_key)
            .query(&[("customer", customer_id), ("limit", "1"), ("status", "all")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PaymentError::ProviderError(format!(
                "Subscription lookup failed with HTTP {}",
                response.status()
            )));
        }

        let list: SubscriptionList = response
            .json()
            .await
            .map_err(|e| PaymentError::UnexpectedResponse(e.to_string()))?;

        let Some(subscription) = list.data.first() else {
            return Ok(SubscriptionState {
                status: SubscriptionStatus::Canceled,
                tier: None,
            });
        };

        let tier = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.lookup_key.as_deref())
            .and_then(Self::tier_from_lookup_key);

        Ok(SubscriptionState {
            status: Self::status_from_str(&subscription.status),
            tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_lookup_key() {
        assert_eq!(
            StripeClient::tier_from_lookup_key("standard"),
            Some(SubscriptionTier::Standard)
        );
        assert_eq!(
            StripeClient::tier_from_lookup_key("pro"),
            Some(SubscriptionTier::Pro)
        );
        assert_eq!(StripeClient::tier_from_lookup_key("enterprise"), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StripeClient::status_from_str("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            StripeClient::status_from_str("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            StripeClient::status_from_str("canceled"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            StripeClient::status_from_str("incomplete_expired"),
            SubscriptionStatus::Canceled
        );
    }
}
