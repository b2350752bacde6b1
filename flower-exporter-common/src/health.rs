//! Per-target poller health.
//!
//! Serialized as-is on the exporter's `/targets` endpoint.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle state of one target's poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Registered, no poll completed yet.
    #[default]
    Starting,
    /// Last poll succeeded.
    Polling,
    /// Last poll failed with a transient error; retrying.
    Degraded,
    /// Target unreachable or exporter shutting down; no further polls.
    Stopped,
}

impl TargetState {
    /// Whether the poller for this target is still running.
    pub fn is_active(&self) -> bool {
        !matches!(self, TargetState::Stopped)
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetState::Starting => write!(f, "starting"),
            TargetState::Polling => write!(f, "polling"),
            TargetState::Degraded => write!(f, "degraded"),
            TargetState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Health of one monitored target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    /// Target base URL.
    pub target: String,
    /// Current poller state.
    pub state: TargetState,
    /// Failed polls since the last success.
    pub consecutive_failures: u32,
    /// Total successful polls.
    pub polls_succeeded: u64,
    /// Total failed polls.
    pub polls_failed: u64,
    /// Time of the last successful poll (millis since epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<i64>,
    /// Last error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TargetStatus {
    /// A freshly registered target.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: TargetState::Starting,
            consecutive_failures: 0,
            polls_succeeded: 0,
            polls_failed: 0,
            last_success: None,
            last_error: None,
        }
    }

    /// Record a successful poll.
    pub fn record_success(&mut self, timestamp: i64) {
        self.state = TargetState::Polling;
        self.consecutive_failures = 0;
        self.polls_succeeded += 1;
        self.last_success = Some(timestamp);
    }

    /// Record a failed poll. A permanent failure stops the target.
    pub fn record_failure(&mut self, error: impl Into<String>, permanent: bool) {
        self.state = if permanent {
            TargetState::Stopped
        } else {
            TargetState::Degraded
        };
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.polls_failed += 1;
        self.last_error = Some(error.into());
    }

    /// Mark the poller as stopped without a failure (shutdown).
    pub fn mark_stopped(&mut self) {
        self.state = TargetState::Stopped;
    }

    /// Whether this target currently serves fresh data.
    pub fn is_serving(&self) -> bool {
        self.state.is_active() && self.last_success.is_some()
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
