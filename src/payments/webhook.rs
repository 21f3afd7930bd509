//! Webhook signature verification and event payloads
//!
//! The provider signs each delivery with an HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"`, sent as `t=<unix>,v1=<hex>`. Payload
//! contents must not be trusted until the signature checks out and the
//! timestamp is within tolerance.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Webhook verification errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing or malformed signature header")]
    MalformedHeader,

    #[error("Signature does not match payload")]
    SignatureMismatch,

    #[error("Webhook timestamp outside tolerance")]
    TimestampOutOfTolerance,
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

/// Verify a webhook delivery against the shared signing secret.
///
/// `now_unix` is passed in rather than read from the clock so tests can
/// pin time.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_seconds: i64,
    now_unix: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<String> = None;

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signature = Some(value.to_string()),
            _ => {}
        }
    }

    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(WebhookError::MalformedHeader),
    };

    if (now_unix - timestamp).abs() > tolerance_seconds {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::MalformedHeader)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let expected = hex::encode(mac.finalize().into_bytes());

    if expected != signature.to_lowercase() {
        return Err(WebhookError::SignatureMismatch);
    }

    Ok(())
}

/// A verified webhook event from the payment provider
#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEventData {
    pub object: PaymentEventObject,
}

/// The object inside an event. Fields are optional because different
/// event types populate different subsets.
#[derive(Debug, Deserialize)]
pub struct PaymentEventObject {
    pub id: Option<String>,
    /// `payment` for one-off checkouts, `subscription` for plan purchases
    pub mode: Option<String>,
    pub customer: Option<String>,
    pub payment_intent: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}
