use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://iot-gateway-api-service.onrender.com";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

/// Retry applied by the transport, identically, to every request.
///
/// Only failures where no response was obtained are retried. HTTP error
/// statuses are always returned to the caller on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self::with_attempts(1)
    }

    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads `GATEWAY_API_URL`, `GATEWAY_TIMEOUT_MS` and `GATEWAY_MAX_ATTEMPTS`.
    pub fn from_env() -> Self {
        let base_url =
            env::var("GATEWAY_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_ms: u64 = env::var("GATEWAY_TIMEOUT_MS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_MS.to_string())
            .parse()
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let max_attempts: u32 = env::var("GATEWAY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .unwrap_or(1);

        Self {
            base_url,
            timeout: Duration::from_millis(timeout_ms),
            retry: RetryPolicy::with_attempts(max_attempts),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry: RetryPolicy::disabled(),
        }
    }
}
