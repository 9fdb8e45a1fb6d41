pub mod checkout_client;
pub mod fingerprint;
pub mod idempotency;
pub mod lock_manager;
pub mod optimistic;
pub mod order_service;
pub mod rate_limiter;
pub mod retry;

pub use checkout_client::CheckoutClient;
pub use idempotency::IdempotencyGuard;
pub use lock_manager::{LockHandle, LockManager};
pub use order_service::OrderService;
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
