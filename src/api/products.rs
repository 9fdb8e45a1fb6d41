use crate::api::middleware::{ApiError, ApiResult, AppState};
use crate::domain::errors::OrderFlowError;
use crate::models::Product;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct ListProductsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);

    let products = state.orders.list_products(limit, offset).await?;
    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> ApiResult<Json<Product>> {
    let product = state
        .orders
        .get_product_by_sku(&sku)
        .await?
        .ok_or_else(|| ApiError(OrderFlowError::NotFound(format!("Product {}", sku))))?;

    Ok(Json(product))
}
