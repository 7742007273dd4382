/// Counters for one manager, in the spirit of the runtime's `Profiling`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStats {
    pub set_count: u64,
    pub fired_count: u64,
    pub cleared_count: u64,
    pub failed_count: u64,
    pub rejected_count: u64,
    pub pass_count: u64,
}
