use crate::domain::errors::FlowResult;
use crate::models::{Order, Product, PromoCode};
use async_trait::async_trait;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &Order) -> FlowResult<()>;

    async fn get_promo_by_code(&self, code: &str) -> FlowResult<Option<PromoCode>>;

    async fn get_order(&self, id: &str) -> FlowResult<Option<Order>>;

    /// Flip a placed order to cancelled. Returns false when the order was
    /// not in the placed state, which makes the transition race-safe.
    async fn mark_order_cancelled(&self, id: &str) -> FlowResult<bool>;

    async fn list_orders_for_user(&self, user_id: &str, limit: i64) -> FlowResult<Vec<Order>>;

    async fn get_product_by_sku(&self, sku: &str) -> FlowResult<Option<Product>>;

    async fn list_products(&self, limit: i64, offset: i64) -> FlowResult<Vec<Product>>;
}
