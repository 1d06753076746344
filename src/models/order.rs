use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Pending,
    Confirmed,
    Complete,
    Failed,
    Cancelled,
}

impl OrderStatus {
    /// Map a gateway IPN status code to the internal order state.
    ///
    /// `>= 100` complete, `2` confirmed, `0..2` pending, `< 0` failed.
    /// Codes 3..=99 are not defined by the gateway and map to nothing.
    pub fn from_gateway_code(code: i64) -> Option<Self> {
        match code {
            c if c >= 100 => Some(OrderStatus::Complete),
            2 => Some(OrderStatus::Confirmed),
            0 | 1 => Some(OrderStatus::Pending),
            c if c < 0 => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Complete | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Position on the success chain `created -> pending -> confirmed -> complete`.
    fn rank(self) -> Option<u8> {
        match self {
            OrderStatus::Created => Some(0),
            OrderStatus::Pending => Some(1),
            OrderStatus::Confirmed => Some(2),
            OrderStatus::Complete => Some(3),
            OrderStatus::Failed | OrderStatus::Cancelled => None,
        }
    }

    /// Monotone lattice: forward along the success chain, `failed` from any
    /// non-terminal state, `cancelled` only from `created`/`pending`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        match next {
            OrderStatus::Failed => true,
            OrderStatus::Cancelled => matches!(self, OrderStatus::Created | OrderStatus::Pending),
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub product_id: String,
    pub amount_cents: i64,
    /// Settlement currency requested from the gateway (e.g. `USDT.TRC20`).
    pub currency: String,
    pub buyer_email: String,
    /// Assigned once the gateway accepts the transaction; immutable afterwards.
    pub gateway_txn_id: Option<String>,
    pub checkout_url: Option<String>,
    pub status: OrderStatus,
    pub license_key: Option<String>,
    pub notified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Amount formatted for the gateway API, e.g. `299.00`.
    pub fn amount_usd(&self) -> String {
        format!("{}.{:02}", self.amount_cents / 100, self.amount_cents % 100)
    }
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub product_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub buyer_email: String,
}

/// Public order status (no license key, no buyer details).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusView {
    pub order_id: String,
    pub product_id: String,
    pub status: OrderStatus,
    pub checkout_url: Option<String>,
    pub updated_at: i64,
}

impl From<&Order> for OrderStatusView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            product_id: order.product_id.clone(),
            status: order.status,
            checkout_url: order.checkout_url.clone(),
            updated_at: order.updated_at,
        }
    }
}
