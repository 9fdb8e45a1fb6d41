use crate::domain::errors::{ErrorBody, OrderFlowError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// HTTP boundary for `OrderFlowError`. Classification happens once, here:
/// handlers return the domain error and this mapping decides status code
/// and the structured body clients key their retry behavior off.
#[derive(Debug)]
pub struct ApiError(pub OrderFlowError);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ApiError {}

impl From<OrderFlowError> for ApiError {
    fn from(err: OrderFlowError) -> Self {
        ApiError(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError(OrderFlowError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let body = ErrorBody::from(&self.0);
        let mut response = (status, Json(body)).into_response();

        // Standard header alongside the body hint, for generic clients.
        if let Some(retry_after_ms) = self.0.retry_after_ms() {
            let secs = retry_after_ms.div_ceil(1_000).max(1);
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

fn status_for(err: &OrderFlowError) -> StatusCode {
    match err {
        OrderFlowError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        OrderFlowError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrderFlowError::DuplicateInFlight => StatusCode::CONFLICT,
        OrderFlowError::VersionConflictExhausted { .. } => StatusCode::CONFLICT,
        OrderFlowError::InsufficientStock { .. }
        | OrderFlowError::InsufficientBalance
        | OrderFlowError::PromoExhausted { .. }
        | OrderFlowError::IdempotencyKeyReuse => StatusCode::UNPROCESSABLE_ENTITY,
        OrderFlowError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderFlowError::BadRequest(_) => StatusCode::BAD_REQUEST,
        OrderFlowError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        // NotHolder escaping the service layer is a bug; report it as one.
        OrderFlowError::NotHolder { .. } | OrderFlowError::Unclassified(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
