mod coinpayments;

pub use coinpayments::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What we ask the gateway to charge for an order.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRequest {
    pub order_id: String,
    pub product_id: String,
    /// USD amount as a decimal string, e.g. `299.00`.
    pub amount_usd: String,
    /// Currency the buyer settles in.
    pub currency: String,
    pub buyer_email: String,
    pub ipn_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted payment transaction accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub txn_id: String,
    pub checkout_url: String,
    pub status_url: Option<String>,
}

/// Outbound boundary to the third-party payment gateway.
///
/// Implementations must bound their network time and report
/// [`AppError::GatewayTimeout`](crate::error::AppError::GatewayTimeout) when it runs out.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(&self, request: &TransactionRequest) -> Result<GatewayTransaction>;
}
