use std::time::Duration;

use reqwest::StatusCode;

/// What to do with one provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Terminal success; decode the body.
    Accept,
    /// Retry after a fixed cooldown.
    Cooldown(Duration),
    /// Retry after `backoff_step * attempt`.
    Backoff,
}

/// Status-code policy for the data endpoint.
///
/// The provider answers 400 for some requests under load, so 400 is treated
/// as transient with its own cooldown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_cooldown: Duration,
    pub bad_request_cooldown: Duration,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_cooldown: Duration::from_secs(10),
            bad_request_cooldown: Duration::from_secs(5),
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn classify(&self, status: StatusCode) -> RetryAction {
        match status {
            s if s.is_success() => RetryAction::Accept,
            StatusCode::TOO_MANY_REQUESTS => RetryAction::Cooldown(self.rate_limit_cooldown),
            StatusCode::BAD_REQUEST => RetryAction::Cooldown(self.bad_request_cooldown),
            _ => RetryAction::Backoff,
        }
    }

    /// Wait before the next try after `action` failed on 1-based `attempt`.
    ///
    /// `None` once the attempt budget is spent.
    pub fn delay_after(&self, action: RetryAction, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        match action {
            RetryAction::Accept => None,
            RetryAction::Cooldown(d) => Some(d),
            RetryAction::Backoff => Some(self.backoff_step * attempt),
        }
    }
}
