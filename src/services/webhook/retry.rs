use reqwest::StatusCode;
use std::time::Duration;

/// Deadline, retry budget and backoff curve for one webhook call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Per-attempt deadline
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn production() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(15000),
            multiplier: 1.5,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn development() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(5000),
            multiplier: 1.5,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn for_environment(is_production: bool) -> Self {
        if is_production {
            Self::production()
        } else {
            Self::development()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `min(max_delay, initial_delay * multiplier^attempt)` for a 0-based attempt
    pub fn compute_backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::development()
    }
}

/// Why a response is worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    ServerError,
    Timeout,
}

impl RetryReason {
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Some(RetryReason::RateLimited)
        } else if status.as_u16() >= 500 {
            Some(RetryReason::ServerError)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryReason::RateLimited => "rate_limited",
            RetryReason::ServerError => "server_error",
            RetryReason::Timeout => "timeout",
        }
    }
}
