use crate::config::TimerConfig;
use crate::entry::Classification;
use std::time::Duration;

/// Longest delay honoured; larger requests are capped to it.
pub const MAX_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

/// Computes the delay a timeout actually waits.
///
/// Pure: the same inputs always give the same result, which lets interval
/// reschedules re-derive the period from the entry's recorded fields.
pub fn clamped_delay(
    config: &TimerConfig,
    requested: Duration,
    nesting_level: u32,
    classification: Classification,
    is_interval: bool,
) -> Duration {
    let requested = requested.min(MAX_DELAY);
    let mut floor = Duration::ZERO;

    if is_interval {
        floor = floor.max(config.interval_floor());
    }
    if nesting_level >= config.nesting_threshold {
        floor = floor.max(config.nested_floor());
    }
    if classification == Classification::Tracking {
        floor = floor.max(config.tracking_floor());
    }

    requested.max(floor)
}

/// Nesting level for a timeout registered while `current` is the level of
/// the callback on the stack (0 outside any callback).
pub fn next_nesting_level(config: &TimerConfig, current: Option<u32>) -> u32 {
    match current {
        None => 0,
        Some(level) => level.saturating_add(1).min(config.nesting_threshold),
    }
}
