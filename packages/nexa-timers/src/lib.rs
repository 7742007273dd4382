//! `setTimeout`/`setInterval` scheduling for a single Nexa execution context.
//!
//! A [`TimeoutManager`] owns every pending timeout of one context, keeps a
//! single platform timer armed for the soonest deadline, and runs due
//! callbacks in deadline order through a host-supplied executor. Contexts
//! that get backgrounded call [`TimeoutManager::freeze`] and later
//! [`TimeoutManager::thaw`]; pending timeouts keep their remaining time.

pub mod clamp;
pub mod config;
pub mod entry;
pub mod error;
pub mod firing;
pub mod freeze;
pub mod manager;
pub mod platform;
pub mod queue;
pub mod stats;

pub use config::TimerConfig;
pub use entry::{Classification, Reason, TimeoutId, TimerState};
pub use error::{CallbackError, TimerError};
pub use firing::FiringId;
pub use manager::{TimeoutManager, TimerOptions};
pub use platform::{
    Callback, CallbackExecutor, ManualClock, ManualTimer, MonotonicClock, PlatformTimer,
    SystemClock, call_directly,
};
pub use stats::TimerStats;
