//! Transactional email collaborator
//!
//! Notifications are best-effort: a failed send is logged and never blocks
//! the transition that triggered it.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

/// Notification errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Email provider request failed: {0}")]
    RequestFailed(String),

    #[error("Email provider rejected the message: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::RequestFailed(err.to_string())
    }
}

/// A transactional email to send
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    /// Template identifier at the email provider
    pub template: String,
    /// Template variables, rendered provider-side
    pub variables: Vec<(String, String)>,
}

/// Email delivery contract
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError>;
}

/// HTTP email client for a hosted delivery provider
#[derive(Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from_address: String,
}

impl EmailClient {
    pub fn new(api_url: String, api_key: Option<String>, from_address: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl Notifier for EmailClient {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        // Without credentials (local development), log instead of sending.
        let Some(api_key) = &self.api_key else {
            tracing::info!(
                to = %message.to,
                template = %message.template,
                "Email delivery skipped: no EMAIL_API_KEY configured"
            );
            return Ok(());
        };

        let variables: serde_json::Map<String, serde_json::Value> = message
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        let body = json!({
            "from": self.from_address,
            "to": [message.to],
            "subject": message.subject,
            "template": message.template,
            "variables": variables,
        });

        let response = self
            .http
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("HTTP {}: {}", status, text)));
        }

        Ok(())
    }
}

/// Send a notification without letting a failure escape; transitions never
/// block on email.
pub async fn send_best_effort(notifier: &dyn Notifier, message: EmailMessage) {
    let to = message.to.clone();
    let template = message.template.clone();

    if let Err(e) = notifier.send(message).await {
        tracing::warn!(
            to = %to,
            template = %template,
            error = %e,
            "Notification send failed"
        );
    }
}
