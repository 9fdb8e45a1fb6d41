pub mod error;

pub use error::{ApiError, ApiResult};

use crate::domain::ports::order_repository::OrderRepository;
use crate::services::OrderService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub order_service: OrderService,
    pub orders: Arc<dyn OrderRepository>,
}
