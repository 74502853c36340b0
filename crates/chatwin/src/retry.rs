//! Backoff schedule for completion calls.
//!
//! [`OpenRouterSink`](crate::sink::OpenRouterSink) reports failures as
//! strings, and only two of its shapes are worth another attempt: an
//! `HTTP <status>` error whose status is 429 or 5xx, and a transport error
//! (`request failed:` or `failed to read response:`). Everything else fails
//! on the first attempt.

use std::time::Duration;

/// How many times to retry a failed completion call, and how long to wait.
///
/// The wait doubles per attempt, starting at `initial_delay` and capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// The wait before retrying after failed attempt `attempt` (0-indexed),
    /// or `None` when `error` should be returned as is.
    pub fn retry_after(&self, error: &str, attempt: u32) -> Option<Duration> {
        (attempt < self.max_retries && is_transient(error)).then(|| self.backoff(attempt))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

fn is_transient(error: &str) -> bool {
    if error.starts_with("request failed:") || error.starts_with("failed to read response:") {
        return true;
    }
    let Some((_, rest)) = error.split_once("HTTP ") else {
        return false;
    };
    match rest.get(..3).and_then(|code| code.parse::<u16>().ok()) {
        Some(status) => status == 429 || (500..600).contains(&status),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_retries: 40,
            ..RetryPolicy::default()
        };
        let err = "request failed: connection closed";
        assert_eq!(policy.retry_after(err, 0), Some(Duration::from_millis(500)));
        assert_eq!(policy.retry_after(err, 2), Some(Duration::from_secs(2)));
        assert_eq!(policy.retry_after(err, 35), Some(Duration::from_secs(8)));
    }

    #[test]
    fn rate_limits_and_server_errors_retry() {
        let policy = RetryPolicy::default();
        let rate_limited = "OpenRouter API HTTP 429 Too Many Requests: slow down";
        assert!(policy.retry_after(rate_limited, 0).is_some());
        let overloaded = "OpenRouter API HTTP 503 Service Unavailable: ";
        assert!(policy.retry_after(overloaded, 0).is_some());
        let cut_off = "failed to read response: body truncated";
        assert!(policy.retry_after(cut_off, 1).is_some());
    }

    #[test]
    fn client_errors_and_bad_bodies_fail_at_once() {
        let policy = RetryPolicy::default();
        let denied = "OpenRouter API HTTP 401 Unauthorized: bad key";
        assert_eq!(policy.retry_after(denied, 0), None);
        assert_eq!(policy.retry_after("expected one choice, got none", 0), None);
        assert_eq!(policy.retry_after("OpenRouter API error: no credits", 0), None);
    }

    #[test]
    fn retries_stop_at_limit() {
        let err = "OpenRouter API HTTP 502 Bad Gateway: upstream";
        let policy = RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        };
        assert!(policy.retry_after(err, 0).is_some());
        assert_eq!(policy.retry_after(err, 1), None);
        assert_eq!(RetryPolicy::none().retry_after(err, 0), None);
    }
}
