//! Reconnect policy
//!
//! A pure decision function evaluated after each unexpected close: either
//! the delay before the next attempt, or stop once the attempt budget is
//! spent. The delay is a fixed interval with a floor, not a backoff
//! curve.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL_MS, MIN_RECONNECT_DELAY_MS,
};

/// Automatic reconnection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Master switch for automatic reconnection
    pub enabled: bool,
    /// Fixed delay between attempts, in milliseconds
    pub interval_ms: u64,
    /// Attempt budget per session; 0 means unlimited
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Outcome of a reconnect evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule the next attempt after this delay
    Delay(Duration),
    /// Attempt budget exhausted; wait for a manual connect
    Stop,
}

/// Decide what follows `attempts` completed reconnect attempts
///
/// Returns `Stop` once `attempts + 1` would exceed a non-zero
/// `max_attempts`; otherwise the configured fixed delay, floored at
/// [`MIN_RECONNECT_DELAY_MS`].
pub fn next_attempt(attempts: u32, max_attempts: u32, interval_ms: u64) -> ReconnectDecision {
    if max_attempts > 0 && attempts + 1 > max_attempts {
        return ReconnectDecision::Stop;
    }
    ReconnectDecision::Delay(Duration::from_millis(interval_ms.max(MIN_RECONNECT_DELAY_MS)))
}
