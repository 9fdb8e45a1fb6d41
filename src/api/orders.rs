use crate::api::middleware::{ApiError, ApiResult, AppState};
use crate::domain::errors::OrderFlowError;
use crate::models::{CreateOrderRequest, Order};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const USER_ID_HEADER: &str = "X-User-Id";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

fn require_user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError(OrderFlowError::BadRequest(format!(
                "{} header is required",
                USER_ID_HEADER
            )))
        })
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => {
            let key = value
                .to_str()
                .map_err(|_| {
                    ApiError(OrderFlowError::BadRequest(format!(
                        "{} must be ASCII",
                        IDEMPOTENCY_KEY_HEADER
                    )))
                })?
                .trim();
            if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(ApiError(OrderFlowError::BadRequest(format!(
                    "{} must be 1..={} characters",
                    IDEMPOTENCY_KEY_HEADER, MAX_IDEMPOTENCY_KEY_LEN
                ))));
            }
            Ok(Some(key.to_string()))
        }
    }
}

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let key = idempotency_key(&headers)?;

    let receipt = state.order_service.place_order(&user_id, payload, key).await?;

    // A replay is an acknowledgement of existing state, not a new resource.
    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(receipt)))
}

pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Order>> {
    let user_id = require_user_id(&headers)?;

    let order = state
        .orders
        .get_order(&order_id)
        .await?
        .filter(|o| o.user_id == user_id)
        .ok_or_else(|| ApiError(OrderFlowError::NotFound(format!("Order {}", order_id))))?;

    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Order>> {
    let user_id = require_user_id(&headers)?;

    let order = state
        .order_service
        .cancel_order(&user_id, &order_id)
        .await?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let user_id = require_user_id(&headers)?;
    let limit = query.limit.clamp(1, 200);

    let orders = state.orders.list_orders_for_user(&user_id, limit).await?;
    Ok(Json(orders))
}
