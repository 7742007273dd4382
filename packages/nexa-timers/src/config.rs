use serde::Deserialize;
use std::time::Duration;

/// Throttling and capacity policy for a [`TimeoutManager`](crate::TimeoutManager).
///
/// All floors are in milliseconds so the struct can be loaded straight from
/// a host's JSON settings. Missing fields fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Nesting depth at which `nested_floor_ms` starts to apply.
    pub nesting_threshold: u32,
    /// Minimum delay for timeouts created at or beyond `nesting_threshold`.
    pub nested_floor_ms: u64,
    /// Minimum period for any repeating timeout.
    pub interval_floor_ms: u64,
    /// Minimum delay for timeouts registered by tracking scripts.
    pub tracking_floor_ms: u64,
    /// Maximum number of live entries; `None` disables the cap.
    pub max_pending: Option<usize>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            nesting_threshold: 5,
            nested_floor_ms: 4,
            interval_floor_ms: 4,
            tracking_floor_ms: 4,
            max_pending: Some(65_536),
        }
    }
}

impl TimerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn nested_floor(&self) -> Duration {
        Duration::from_millis(self.nested_floor_ms)
    }

    pub fn interval_floor(&self) -> Duration {
        Duration::from_millis(self.interval_floor_ms)
    }

    pub fn tracking_floor(&self) -> Duration {
        Duration::from_millis(self.tracking_floor_ms)
    }
}
