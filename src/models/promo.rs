use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub code: String,
    pub discount_cents: i64,
    pub remaining_uses: i64,
    pub version: i64,
}
