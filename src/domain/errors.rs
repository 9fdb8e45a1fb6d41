use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Every failure the checkout pipeline can surface. Raw transport/database
/// errors are converted into one of these kinds at the boundary where they
/// occur; the rest of the system only ever sees the tagged kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderFlowError {
    #[error("Too many requests, try again in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Could not acquire lock for {key} in time")]
    LockTimeout { key: String },
    #[error("Lock for {key} is not held by this caller")]
    NotHolder { key: String },
    #[error("An identical request is already being processed")]
    DuplicateInFlight,
    #[error("Idempotency key was already used with a different payload")]
    IdempotencyKeyReuse,
    #[error("Update of {resource} lost the race {attempts} times, giving up")]
    VersionConflictExhausted { resource: String, attempts: u32 },
    #[error("Not enough stock for {sku}")]
    InsufficientStock { sku: String },
    #[error("Insufficient account balance")]
    InsufficientBalance,
    #[error("Promo code {code} has no uses remaining")]
    PromoExhausted { code: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Service temporarily unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal error: {0}")]
    Unclassified(String),
}

pub type FlowResult<T> = Result<T, OrderFlowError>;

/// Retry guidance per error kind. The retry orchestrator is the only
/// component allowed to act on this; everyone else propagates the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Terminal. Business-rule and unclassified failures are never retried.
    No,
    /// Contention on a lock or version; resolves quickly.
    Short,
    /// Overload; back off long enough for capacity to recover.
    Medium,
    /// Rate limited; wait out the remainder of the window.
    Long,
}

impl RetryClass {
    pub fn retryable(self) -> bool {
        !matches!(self, RetryClass::No)
    }

    /// Minimum delay before the next attempt, scaled off the caller's base
    /// delay. `None` means the computed backoff alone applies.
    pub fn delay_floor(self, base: Duration) -> Option<Duration> {
        match self {
            RetryClass::No => None,
            RetryClass::Short => None,
            RetryClass::Medium => Some(base * 4),
            RetryClass::Long => Some(base * 8),
        }
    }
}

impl OrderFlowError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            OrderFlowError::RateLimited { .. } => RetryClass::Long,
            OrderFlowError::LockTimeout { .. } => RetryClass::Short,
            OrderFlowError::DuplicateInFlight => RetryClass::Short,
            OrderFlowError::VersionConflictExhausted { .. } => RetryClass::Medium,
            OrderFlowError::ServiceUnavailable(_) => RetryClass::Medium,
            // NotHolder signals a logic bug, not a transient condition.
            OrderFlowError::NotHolder { .. } => RetryClass::No,
            OrderFlowError::InsufficientStock { .. }
            | OrderFlowError::InsufficientBalance
            | OrderFlowError::PromoExhausted { .. }
            | OrderFlowError::IdempotencyKeyReuse
            | OrderFlowError::NotFound(_)
            | OrderFlowError::BadRequest(_)
            | OrderFlowError::Unclassified(_) => RetryClass::No,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.retry_class().retryable()
    }

    /// Stable machine-readable code for the client error contract.
    pub fn code(&self) -> &'static str {
        match self {
            OrderFlowError::RateLimited { .. } => "rate_limited",
            OrderFlowError::LockTimeout { .. } => "lock_timeout",
            OrderFlowError::NotHolder { .. } => "not_holder",
            OrderFlowError::DuplicateInFlight => "duplicate_in_flight",
            OrderFlowError::IdempotencyKeyReuse => "idempotency_key_reuse",
            OrderFlowError::VersionConflictExhausted { .. } => "version_conflict",
            OrderFlowError::InsufficientStock { .. } => "insufficient_stock",
            OrderFlowError::InsufficientBalance => "insufficient_balance",
            OrderFlowError::PromoExhausted { .. } => "promo_exhausted",
            OrderFlowError::NotFound(_) => "not_found",
            OrderFlowError::BadRequest(_) => "bad_request",
            OrderFlowError::ServiceUnavailable(_) => "service_unavailable",
            OrderFlowError::Unclassified(_) => "internal",
        }
    }

    /// Suggested client-side wait in milliseconds, if retryable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            OrderFlowError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            OrderFlowError::LockTimeout { .. } | OrderFlowError::DuplicateInFlight => Some(250),
            OrderFlowError::VersionConflictExhausted { .. }
            | OrderFlowError::ServiceUnavailable(_) => Some(1_000),
            _ => None,
        }
    }
}

// Classification boundary for store errors: anything the database driver
// reports is a capacity problem from the pipeline's point of view.
impl From<sqlx::Error> for OrderFlowError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => OrderFlowError::NotFound("Resource not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                OrderFlowError::ServiceUnavailable("Database pool exhausted".to_string())
            }
            other => OrderFlowError::Unclassified(format!("Database error: {}", other)),
        }
    }
}

/// Wire shape of a cached or transported error, used by the idempotency
/// store and the client-side retry helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub should_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl From<&OrderFlowError> for ErrorBody {
    fn from(err: &OrderFlowError) -> Self {
        ErrorBody {
            error: err.to_string(),
            code: err.code().to_string(),
            should_retry: err.should_retry(),
            retry_after_ms: err.retry_after_ms(),
        }
    }
}

impl ErrorBody {
    /// Rebuild a domain error from the wire shape. Used by the checkout
    /// client; unknown codes fail safe as non-retryable.
    pub fn into_flow_error(self) -> OrderFlowError {
        match self.code.as_str() {
            "rate_limited" => OrderFlowError::RateLimited {
                retry_after_ms: self.retry_after_ms.unwrap_or(1_000),
            },
            "lock_timeout" => OrderFlowError::LockTimeout {
                key: String::new(),
            },
            "duplicate_in_flight" => OrderFlowError::DuplicateInFlight,
            "idempotency_key_reuse" => OrderFlowError::IdempotencyKeyReuse,
            "version_conflict" => OrderFlowError::VersionConflictExhausted {
                resource: String::new(),
                attempts: 0,
            },
            "insufficient_stock" => OrderFlowError::InsufficientStock {
                sku: String::new(),
            },
            "insufficient_balance" => OrderFlowError::InsufficientBalance,
            "promo_exhausted" => OrderFlowError::PromoExhausted {
                code: String::new(),
            },
            "not_found" => OrderFlowError::NotFound(self.error),
            "bad_request" => OrderFlowError::BadRequest(self.error),
            "service_unavailable" => OrderFlowError::ServiceUnavailable(self.error),
            _ => OrderFlowError::Unclassified(self.error),
        }
    }
}
