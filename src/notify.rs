//! Buyer notifications.
//!
//! The reconciler hands a finished `(recipient, subject, body)` to a [`Notifier`].
//! [`ResendNotifier`] delivers through the Resend email API; [`LogNotifier`] is
//! used when no API key is configured and only writes the message to the log.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Secret;
use crate::error::{AppError, Result};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    id: String,
}

#[derive(Clone)]
pub struct ResendNotifier {
    api_key: Secret,
    from_email: String,
    api_url: String,
    http_client: Client,
}

impl ResendNotifier {
    pub fn new(api_key: Secret, from_email: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            from_email: from_email.into(),
            api_url: RESEND_API_URL.to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![recipient],
            subject,
            text: body,
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::NotifyFailed(format!("request to Resend failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::NotifyFailed(format!(
                "Resend returned {}: {}",
                status, body
            )));
        }

        let sent: ResendEmailResponse = response
            .json()
            .await
            .map_err(|e| AppError::NotifyFailed(format!("unreadable Resend response: {}", e)))?;

        tracing::info!(to = %recipient, message_id = %sent.id, "Notification sent via Resend");
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<()> {
        tracing::info!(
            to = %recipient,
            subject = %subject,
            "No email API configured, notification logged only"
        );
        Ok(())
    }
}

/// Plain-text license delivery message as `(subject, body)`.
pub fn license_delivery_message(
    product_id: &str,
    license_key: &str,
    download_url: &str,
) -> (String, String) {
    let subject = format!("Your {} license key", product_id);

    let mut body = format!(
        "Thank you for your purchase.\n\nProduct: {}\nLicense key: {}\n\n",
        product_id, license_key
    );
    if !download_url.is_empty() {
        body.push_str(&format!("Download: {}\n\n", download_url));
    }
    body.push_str(
        "Enter the license key when the application first starts. It binds to the \
         first machine that activates it.\n",
    );

    (subject, body)
}
