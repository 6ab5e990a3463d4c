//! Per-tool circuit breaker.

use crate::tool_registry::domain::McpServerId;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::time::Duration;

/// Outcome of a circuit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Calls flow normally.
    Closed,
    /// The circuit is open but the cooldown elapsed; one trial call may run.
    HalfOpen,
    /// Calls are rejected without contacting the server.
    Open {
        /// Consecutive failures recorded.
        failures: u32,
    },
}

#[derive(Debug, Clone, Copy)]
struct CircuitState {
    consecutive_failures: u32,
    last_failure_at: DateTime<Utc>,
}

type CircuitKey = (McpServerId, String);

/// Consecutive-failure counter per `(server, tool)`.
#[derive(Debug)]
pub struct CircuitBreaker {
    states: DashMap<CircuitKey, CircuitState>,
    threshold: u32,
    cooldown: Option<TimeDelta>,
}

impl CircuitBreaker {
    /// Creates a breaker that opens after `threshold` consecutive failures.
    #[must_use]
    pub fn new(threshold: u32, cooldown: Option<Duration>) -> Self {
        Self {
            states: DashMap::new(),
            threshold,
            cooldown: cooldown.map(|delay| TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX)),
        }
    }

    fn key(server_id: &McpServerId, tool: &str) -> CircuitKey {
        (server_id.clone(), tool.to_owned())
    }

    /// Decides whether a call may proceed.
    ///
    /// Checking never increments the failure count. A half-open decision
    /// restarts the cooldown so concurrent callers keep seeing an open
    /// circuit while the trial call runs.
    #[must_use]
    pub fn check(&self, server_id: &McpServerId, tool: &str, now: DateTime<Utc>) -> CircuitDecision {
        let Some(mut state) = self.states.get_mut(&Self::key(server_id, tool)) else {
            return CircuitDecision::Closed;
        };
        if state.consecutive_failures < self.threshold {
            return CircuitDecision::Closed;
        }

        let cooled_down = self
            .cooldown
            .is_some_and(|cooldown| now.signed_duration_since(state.last_failure_at) >= cooldown);
        if cooled_down {
            state.last_failure_at = now;
            return CircuitDecision::HalfOpen;
        }

        CircuitDecision::Open {
            failures: state.consecutive_failures,
        }
    }

    /// Records a failure and returns the new consecutive count.
    pub fn record_failure(&self, server_id: &McpServerId, tool: &str, now: DateTime<Utc>) -> u32 {
        let mut state = self
            .states
            .entry(Self::key(server_id, tool))
            .or_insert(CircuitState {
                consecutive_failures: 0,
                last_failure_at: now,
            });
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = now;
        state.consecutive_failures
    }

    /// Resets the counter after a success.
    pub fn record_success(&self, server_id: &McpServerId, tool: &str) {
        self.states.remove(&Self::key(server_id, tool));
    }

    /// Returns the consecutive failure count.
    #[must_use]
    pub fn failures(&self, server_id: &McpServerId, tool: &str) -> u32 {
        self.states
            .get(&Self::key(server_id, tool))
            .map_or(0, |state| state.consecutive_failures)
    }
}
