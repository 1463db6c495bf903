use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::debug;

use super::GitHubError;

/// Cooldown shared by every lookup made through one client: once GitHub
/// reports a rate-limit reset instant, calls fail fast until it passes.
#[derive(Debug, Default)]
pub struct RateLimitGate {
    reset_at: Mutex<Option<DateTime<Utc>>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `RateLimited` while `now` is before the recorded reset.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), GitHubError> {
        let mut reset_at = self.reset_at.lock().unwrap_or_else(|e| e.into_inner());
        match *reset_at {
            Some(reset) if now < reset => Err(GitHubError::RateLimited {
                reset_at: Some(reset),
            }),
            Some(_) => {
                debug!("rate limit window has passed");
                *reset_at = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Record that requests are refused until `reset`.
    pub fn trip(&self, reset: DateTime<Utc>) {
        let mut reset_at = self.reset_at.lock().unwrap_or_else(|e| e.into_inner());
        *reset_at = Some(reset);
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        *self.reset_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}
