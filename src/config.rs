use std::env;
use std::time::Duration;

/// Process-wide configuration, resolved once at startup and injected into
/// every component. Nothing mutates this after `from_env` returns.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub service_name: String,
    pub metrics_port: u16,
    pub order: ConcurrencySettings,
    pub stock: ConcurrencySettings,
}

/// Tunables for one operation class (order placement, stock reservation).
/// Each class gets its own env prefix so unrelated operations never share
/// lock timeouts or retry budgets.
#[derive(Clone, Debug)]
pub struct ConcurrencySettings {
    /// How long `acquire` polls before giving up with a lock timeout.
    pub lock_timeout: Duration,
    /// Lock record TTL; the safety net against crashed holders.
    pub lock_ttl: Duration,
    /// Base delay for the acquire polling loop (doubles per attempt, capped).
    pub lock_poll_base_delay: Duration,
    /// Bound on the conditional-write (read/mutate/CAS) loop.
    pub cas_max_retries: u32,
    /// Fixed backoff between conditional-write attempts.
    pub cas_backoff: Duration,
    /// Attempt count at which contention is logged at warn level.
    pub contention_warn_threshold: u32,
    pub idempotency_ttl: Duration,
    pub rate_window: Duration,
    pub rate_max_requests: u32,
    /// When false, successful requests are refunded to the window.
    pub rate_count_successes: bool,
    /// When false, failed requests are refunded to the window.
    pub rate_count_failures: bool,
    pub retry_max: u32,
    pub retry_base_delay: Duration,
    pub retry_delay_cap: Duration,
    pub retry_backoff: bool,
    pub retry_jitter: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://oxicart.db?mode=rwc".to_string());

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let service_name = env::var("SERVICE_NAME").unwrap_or_else(|_| "oxicart".to_string());

        let metrics_port = env::var("METRICS_PORT")
            .unwrap_or_else(|_| "9000".to_string())
            .parse()
            .unwrap_or(9000);

        Ok(Config {
            database_url,
            server_host,
            server_port,
            service_name,
            metrics_port,
            order: ConcurrencySettings::from_env("ORDER"),
            stock: ConcurrencySettings::from_env("STOCK"),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

impl ConcurrencySettings {
    pub fn from_env(prefix: &str) -> Self {
        Self {
            lock_timeout: millis_env(prefix, "LOCK_TIMEOUT_MS", 5_000),
            lock_ttl: millis_env(prefix, "LOCK_TTL_MS", 10_000),
            lock_poll_base_delay: millis_env(prefix, "LOCK_POLL_BASE_DELAY_MS", 50),
            cas_max_retries: u32_env(prefix, "CAS_MAX_RETRIES", 5),
            cas_backoff: millis_env(prefix, "CAS_BACKOFF_MS", 20),
            contention_warn_threshold: u32_env(prefix, "CONTENTION_WARN_THRESHOLD", 3),
            idempotency_ttl: secs_env(prefix, "IDEMPOTENCY_TTL_SECS", 86_400),
            rate_window: millis_env(prefix, "RATE_WINDOW_MS", 60_000),
            rate_max_requests: u32_env(prefix, "RATE_MAX_REQUESTS", 10),
            rate_count_successes: bool_env(prefix, "RATE_COUNT_SUCCESSES", true),
            rate_count_failures: bool_env(prefix, "RATE_COUNT_FAILURES", true),
            retry_max: u32_env(prefix, "RETRY_MAX", 3),
            retry_base_delay: millis_env(prefix, "RETRY_BASE_DELAY_MS", 200),
            retry_delay_cap: millis_env(prefix, "RETRY_DELAY_CAP_MS", 5_000),
            retry_backoff: bool_env(prefix, "RETRY_BACKOFF", true),
            retry_jitter: bool_env(prefix, "RETRY_JITTER", true),
        }
    }
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5_000),
            lock_ttl: Duration::from_millis(10_000),
            lock_poll_base_delay: Duration::from_millis(50),
            cas_max_retries: 5,
            cas_backoff: Duration::from_millis(20),
            contention_warn_threshold: 3,
            idempotency_ttl: Duration::from_secs(86_400),
            rate_window: Duration::from_millis(60_000),
            rate_max_requests: 10,
            rate_count_successes: true,
            rate_count_failures: true,
            retry_max: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_delay_cap: Duration::from_millis(5_000),
            retry_backoff: true,
            retry_jitter: true,
        }
    }
}

fn millis_env(prefix: &str, key: &str, default: u64) -> Duration {
    Duration::from_millis(
        env::var(format!("{}_{}", prefix, key))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

fn secs_env(prefix: &str, key: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(format!("{}_{}", prefix, key))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

fn u32_env(prefix: &str, key: &str, default: u32) -> u32 {
    env::var(format!("{}_{}", prefix, key))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn bool_env(prefix: &str, key: &str, default: bool) -> bool {
    env::var(format!("{}_{}", prefix, key))
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
}
