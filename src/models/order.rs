use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Placed => write!(f, "placed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Placed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub sku: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub promo_code: Option<String>,
    pub status: OrderStatus,
    pub created_at: String,
}

impl Order {
    pub fn new(
        user_id: String,
        sku: String,
        quantity: i64,
        unit_price_cents: i64,
        discount_cents: i64,
        promo_code: Option<String>,
    ) -> Self {
        let total_cents = (unit_price_cents * quantity - discount_cents).max(0);
        Order {
            id: Uuid::new_v4().to_string(),
            user_id,
            sku,
            quantity,
            unit_price_cents,
            discount_cents,
            total_cents,
            promo_code,
            status: OrderStatus::Placed,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Inbound order placement request. Field order is fixed; the idempotency
/// fingerprint is derived from this struct's serialization, not from the
/// raw wire bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub sku: String,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
}

impl CreateOrderRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.sku.trim().is_empty() {
            return Err("sku must not be empty".to_string());
        }
        if self.quantity < 1 {
            return Err("quantity must be at least 1".to_string());
        }
        Ok(())
    }

    /// Normalized copy used for fingerprinting: trimmed sku, uppercased
    /// promo code, so cosmetic differences map to one logical request.
    pub fn normalized(&self) -> CreateOrderRequest {
        CreateOrderRequest {
            sku: self.sku.trim().to_string(),
            quantity: self.quantity,
            promo_code: self
                .promo_code
                .as_ref()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty()),
        }
    }
}

/// Response body for a placed (or replayed) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub sku: String,
    pub quantity: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    /// True when this response was served from the idempotency cache
    /// instead of a fresh execution.
    #[serde(default)]
    pub replayed: bool,
}

impl OrderReceipt {
    pub fn from_order(order: &Order) -> Self {
        OrderReceipt {
            order_id: order.id.clone(),
            sku: order.sku.clone(),
            quantity: order.quantity,
            total_cents: order.total_cents,
            status: order.status,
            replayed: false,
        }
    }
}
