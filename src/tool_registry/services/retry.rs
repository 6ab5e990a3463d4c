//! Back-off schedules for connection attempts and tool calls.

use super::McpManagerSettings;
use crate::tool_registry::domain::FailureClass;
use rand::Rng;
use std::time::Duration;

/// Retry schedule derived from [`McpManagerSettings`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    connection_base: Duration,
    connection_max: Duration,
    connection_jitter: Duration,
    tool_base: Duration,
}

impl RetryPolicy {
    /// Derives the schedule from settings.
    #[must_use]
    pub const fn from_settings(settings: &McpManagerSettings) -> Self {
        Self {
            connection_base: settings.connection_retry_base_delay,
            connection_max: settings.connection_retry_max_delay,
            connection_jitter: settings.connection_retry_jitter,
            tool_base: settings.tool_retry_base_delay,
        }
    }

    /// Delay before the connection attempt following failed `attempt`
    /// (1-based): `min(base * 2^(attempt - 1), max)` plus jitter.
    #[must_use]
    pub fn connection_delay(&self, attempt: u32) -> Duration {
        exponential(self.connection_base, attempt)
            .min(self.connection_max)
            .saturating_add(jitter(self.connection_jitter))
    }

    /// Delay before retrying a tool call that failed with `class` on
    /// `attempt` (1-based), or `None` when the failure is not retryable.
    ///
    /// Transport failures retry immediately after reconnecting.
    #[must_use]
    pub fn tool_delay(&self, class: FailureClass, attempt: u32) -> Option<Duration> {
        match class {
            FailureClass::RateLimited { retry_after } => {
                Some(retry_after.unwrap_or_else(|| exponential(self.tool_base, attempt)))
            }
            FailureClass::Timeout => Some(self.tool_base.saturating_mul(attempt)),
            FailureClass::Transport => Some(Duration::ZERO),
            FailureClass::Authentication
            | FailureClass::NotFound
            | FailureClass::ToolLogic
            | FailureClass::Generic => None,
        }
    }
}

fn exponential(base: Duration, attempt: u32) -> Duration {
    2_u32
        .checked_pow(attempt.saturating_sub(1))
        .map_or(Duration::MAX, |factor| base.saturating_mul(factor))
}

fn jitter(bound: Duration) -> Duration {
    let bound_millis = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    if bound_millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..bound_millis))
}
