use crate::domain::errors::{ErrorBody, FlowResult, OrderFlowError};
use crate::models::{CreateOrderRequest, OrderReceipt};
use crate::services::retry::RetryPolicy;
use reqwest::StatusCode;
use std::time::Duration;
use uuid::Uuid;

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const USER_ID_HEADER: &str = "X-User-Id";

/// HTTP client for the checkout API with retry built in.
///
/// One idempotency key is minted per logical order and reused across all
/// attempts, so a retry after a lost response replays the stored outcome
/// instead of placing a second order. Retry delays follow the policy's
/// backoff, raised to any `retry_after_ms` hint the server sent back.
pub struct CheckoutClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl CheckoutClient {
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy) -> FlowResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OrderFlowError::Unclassified(format!("HTTP client setup: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            policy,
        })
    }

    /// Place an order, retrying transient failures under the shared
    /// idempotency key. Terminal failures come back after one attempt.
    pub async fn place_order(
        &self,
        user_id: &str,
        request: &CreateOrderRequest,
    ) -> FlowResult<OrderReceipt> {
        let idempotency_key = Uuid::new_v4().to_string();
        let url = format!("{}/api/orders", self.base_url);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.send_order(&url, user_id, &idempotency_key, request).await {
                Ok(receipt) => return Ok(receipt),
                Err(err) => err,
            };

            if !err.should_retry() {
                return Err(err);
            }
            if attempt > self.policy.max_retries {
                tracing::warn!(
                    "Order attempt {} failed, retry budget exhausted: {}",
                    attempt,
                    err
                );
                return Err(err);
            }

            let mut delay = self.policy.delay_for(attempt, &err);
            // The server knows its window better than our backoff does.
            if let Some(hint_ms) = err.retry_after_ms() {
                delay = delay
                    .max(Duration::from_millis(hint_ms))
                    .min(self.policy.delay_cap);
            }
            tracing::debug!(
                "Order attempt {} failed ({}), retrying in {:?}",
                attempt,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn get_order(&self, user_id: &str, order_id: &str) -> FlowResult<serde_json::Value> {
        let url = format!("{}/api/orders/{}", self.base_url, order_id);
        let response = self
            .http
            .get(&url)
            .header(USER_ID_HEADER, user_id)
            .send()
            .await
            .map_err(classify_transport)?;

        decode_response(response).await
    }

    async fn send_order(
        &self,
        url: &str,
        user_id: &str,
        idempotency_key: &str,
        request: &CreateOrderRequest,
    ) -> FlowResult<OrderReceipt> {
        let response = self
            .http
            .post(url)
            .header(USER_ID_HEADER, user_id)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(classify_transport)?;

        decode_response(response).await
    }
}

/// Connection and timeout failures look like an overloaded or briefly
/// absent server; everything else is unexpected.
fn classify_transport(err: reqwest::Error) -> OrderFlowError {
    if err.is_timeout() || err.is_connect() {
        OrderFlowError::ServiceUnavailable(format!("Request failed: {}", err))
    } else {
        OrderFlowError::Unclassified(format!("Request failed: {}", err))
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> FlowResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| OrderFlowError::Unclassified(format!("Malformed response body: {}", e)));
    }

    // Prefer the structured error contract; fall back to a status-based
    // classification when the body is not ours (proxy pages and the like).
    match response.json::<ErrorBody>().await {
        Ok(body) => Err(body.into_flow_error()),
        Err(_) => Err(classify_status(status)),
    }
}

fn classify_status(status: StatusCode) -> OrderFlowError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => OrderFlowError::RateLimited {
            retry_after_ms: 1_000,
        },
        StatusCode::NOT_FOUND => OrderFlowError::NotFound("Resource not found".to_string()),
        s if s.is_server_error() => {
            OrderFlowError::ServiceUnavailable(format!("Server returned {}", s))
        }
        s => OrderFlowError::Unclassified(format!("Server returned {}", s)),
    }
}
