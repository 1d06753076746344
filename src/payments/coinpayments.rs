use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::{GatewayTransaction, PaymentGateway, TransactionRequest};
use crate::config::Secret;
use crate::error::{AppError, Result};

type HmacSha512 = Hmac<Sha512>;

pub const DEFAULT_API_URL: &str = "https://www.coinpayments.net/api.php";

/// Header carrying the HMAC signature on both API requests and IPN deliveries.
pub const SIGNATURE_HEADER: &str = "hmac";

/// Hex HMAC-SHA512 of `payload` keyed with `secret`.
pub fn sign(payload: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid HMAC secret".into()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA512 signature over the raw, unparsed body.
///
/// The comparison is constant-time. Any re-encoding of the body before this
/// call would change the bytes and fail verification.
pub fn verify_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();

    expected.len() == provided.len() && bool::from(expected.as_slice().ct_eq(&provided))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookRejection {
    #[error("Missing signature header")]
    MissingSignature,
    #[error("Signature does not match body")]
    SignatureInvalid,
    #[error("Unsupported IPN mode: {0}")]
    UnsupportedMode(String),
    #[error("Merchant id does not match")]
    MerchantMismatch,
    #[error("Malformed IPN payload: {0}")]
    Malformed(String),
}

impl From<WebhookRejection> for AppError {
    fn from(rejection: WebhookRejection) -> Self {
        match rejection {
            WebhookRejection::MissingSignature
            | WebhookRejection::SignatureInvalid
            | WebhookRejection::UnsupportedMode(_) => AppError::SignatureInvalid,
            WebhookRejection::MerchantMismatch => AppError::MerchantMismatch,
            WebhookRejection::Malformed(msg) => AppError::InvalidRequest(msg),
        }
    }
}

/// An authenticated IPN delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct IpnNotification {
    pub ipn_id: Option<String>,
    pub txn_id: String,
    pub status: i64,
    pub status_text: Option<String>,
    /// Our order id, echoed back from the `invoice` field.
    pub order_id: Option<String>,
    /// Price as originally requested (`amount1`), in `price_currency`.
    pub amount: Option<String>,
    /// `currency1`, the currency the order was priced in.
    pub price_currency: Option<String>,
    /// `currency2`, the currency the buyer paid with.
    pub paid_currency: Option<String>,
}

impl IpnNotification {
    fn from_fields(fields: &HashMap<String, String>) -> std::result::Result<Self, WebhookRejection> {
        let txn_id = fields
            .get("txn_id")
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| WebhookRejection::Malformed("missing txn_id".into()))?;

        let status = fields
            .get("status")
            .ok_or_else(|| WebhookRejection::Malformed("missing status".into()))?
            .trim()
            .parse::<i64>()
            .map_err(|_| WebhookRejection::Malformed("status is not an integer".into()))?;

        let non_empty = |name: &str| fields.get(name).filter(|v| !v.is_empty()).cloned();

        Ok(Self {
            ipn_id: non_empty("ipn_id"),
            txn_id,
            status,
            status_text: non_empty("status_text"),
            order_id: non_empty("invoice").or_else(|| non_empty("custom")),
            amount: non_empty("amount1"),
            price_currency: non_empty("currency1"),
            paid_currency: non_empty("currency2"),
        })
    }
}

/// Authenticates IPN deliveries: signature first, then mode and merchant id.
#[derive(Debug, Clone)]
pub struct IpnVerifier {
    secret: Secret,
    merchant_id: String,
}

impl IpnVerifier {
    pub fn new(secret: Secret, merchant_id: impl Into<String>) -> Self {
        Self {
            secret,
            merchant_id: merchant_id.into(),
        }
    }

    pub fn verify(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> std::result::Result<IpnNotification, WebhookRejection> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookRejection::MissingSignature)?;

        if !verify_signature(raw_body, signature, self.secret.expose()) {
            return Err(WebhookRejection::SignatureInvalid);
        }

        let fields: HashMap<String, String> = url::form_urlencoded::parse(raw_body)
            .into_owned()
            .collect();

        match fields.get("ipn_mode").map(String::as_str) {
            Some("hmac") => {}
            other => {
                return Err(WebhookRejection::UnsupportedMode(
                    other.unwrap_or_default().to_string(),
                ));
            }
        }

        let merchant = fields
            .get("merchant")
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .ok_or(WebhookRejection::MerchantMismatch)?;
        if self.merchant_id.is_empty()
            || !bool::from(merchant.as_bytes().ct_eq(self.merchant_id.as_bytes()))
        {
            return Err(WebhookRejection::MerchantMismatch);
        }

        IpnNotification::from_fields(&fields)
    }
}

// ============ Outbound API client ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    error: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreateTransactionResult {
    txn_id: String,
    checkout_url: String,
    #[serde(default)]
    status_url: Option<String>,
}

#[derive(Clone)]
pub struct CoinPaymentsClient {
    client: Client,
    api_url: String,
    public_key: String,
    private_key: Secret,
}

impl CoinPaymentsClient {
    pub fn new(
        api_url: impl Into<String>,
        public_key: impl Into<String>,
        private_key: Secret,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            public_key: public_key.into(),
            private_key,
        })
    }

    fn encode_form(&self, request: &TransactionRequest) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("version", "1")
            .append_pair("cmd", "create_transaction")
            .append_pair("key", &self.public_key)
            .append_pair("format", "json")
            .append_pair("amount", &request.amount_usd)
            .append_pair("currency1", "USD")
            .append_pair("currency2", &request.currency)
            .append_pair("buyer_email", &request.buyer_email)
            .append_pair("invoice", &request.order_id)
            .append_pair("item_name", &request.product_id)
            .append_pair("item_number", &request.product_id)
            .append_pair("ipn_url", &request.ipn_url)
            .append_pair("success_url", &request.success_url)
            .append_pair("cancel_url", &request.cancel_url)
            .finish()
    }
}

fn map_send_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::GatewayTimeout
    } else {
        AppError::Gateway(format!("request failed: {}", err))
    }
}

#[async_trait]
impl PaymentGateway for CoinPaymentsClient {
    async fn create_transaction(&self, request: &TransactionRequest) -> Result<GatewayTransaction> {
        let body = self.encode_form(request);
        let signature = sign(body.as_bytes(), self.private_key.expose())?;

        let response = self
            .client
            .post(&self.api_url)
            .header(SIGNATURE_HEADER, signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("HTTP {}: {}", status, error_text)));
        }

        let parsed: ApiResponse<CreateTransactionResult> =
            response.json().await.map_err(map_send_error)?;

        if parsed.error != "ok" {
            return Err(AppError::Gateway(parsed.error));
        }

        let result = parsed
            .result
            .ok_or_else(|| AppError::Gateway("response missing result".into()))?;

        tracing::info!(
            order_id = %request.order_id,
            txn_id = %result.txn_id,
            "Gateway transaction created"
        );

        Ok(GatewayTransaction {
            txn_id: result.txn_id,
            checkout_url: result.checkout_url,
            status_url: result.status_url,
        })
    }
}
