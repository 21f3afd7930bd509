//! Payment collaborator for ToolShare
//!
//! Wraps the hosted payment processor behind a trait so the rental and
//! tier services can be exercised against a fake in tests. The concrete
//! client speaks the processor's HTTP API via reqwest.

mod provider;
mod stripe;
mod webhook;

pub use provider::{
    CheckoutLineItem, CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider,
    SubscriptionState, SubscriptionStatus,
};
pub use stripe::StripeClient;
pub use webhook::{verify_webhook_signature, PaymentEvent, PaymentEventObject, WebhookError};
