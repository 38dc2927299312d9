//! Derivation of CPU load from two CPU statistics samples
//!
//! Load is defined as the share of the CPU time elapsed between the samples
//! which was not spent idle. Every other state (including waiting for I/O)
//! counts as busy.

use crate::stat::CpuSample;
use lazy_static::lazy_static;
use std::time::Duration;


/// Intermediate quantities of a load computation, in clock ticks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadBreakdown {
    /// Sum of all CPU counters in the starting sample
    pub total_start: i128,

    /// Sum of all CPU counters in the final sample
    pub total_end: i128,

    /// CPU time spent outside of the idle state between the samples
    pub used: i128,

    /// CPU time elapsed between the samples, across all hardware threads
    pub elapsed: i128,
}
//
impl LoadBreakdown {
    /// Percentage of the elapsed CPU time which was used, or 0 when no CPU
    /// time elapsed at all
    pub fn load(&self) -> f64 {
        if self.elapsed == 0 {
            return 0.0;
        }
        (self.used * 100) as f64 / self.elapsed as f64
    }
}


/// Break down the CPU activity between two samples
///
/// Signed arithmetic is used so that inconsistent inputs (e.g. samples taken
/// in the wrong order) yield odd numbers rather than overflow.
///
pub fn breakdown(start: &CpuSample, end: &CpuSample) -> LoadBreakdown {
    let total_start = start.total() as i128;
    let total_end = end.total() as i128;
    let idle = i128::from(end.idle()) - i128::from(start.idle());
    let elapsed = total_end - total_start;
    LoadBreakdown {
        total_start,
        total_end,
        used: elapsed - idle,
        elapsed,
    }
}


/// CPU load between two samples, as a percentage
pub fn compute(start: &CpuSample, end: &CpuSample) -> f64 {
    breakdown(start, end).load()
}


/// Convert an amount of clock ticks into wall-clock time
///
/// Negative amounts are clamped to zero.
///
pub fn ticks_to_duration(ticks: i128) -> Duration {
    let ticks = ticks.max(0) as u128;
    let ticks_per_sec = u128::from(*TICKS_PER_SEC);
    let secs = ticks / ticks_per_sec;
    let nanosecs = (ticks % ticks_per_sec) * 1_000_000_000 / ticks_per_sec;
    Duration::new(secs.min(u128::from(u64::MAX)) as u64, nanosecs as u32)
}
//
lazy_static! {
    /// Number of clock ticks per second in the counters of /proc/stat
    static ref TICKS_PER_SEC: u64 = {
        // SAFETY: sysconf has no memory safety preconditions
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        // Fall back to the usual USER_HZ
        if ticks > 0 { ticks as u64 } else { 100 }
    };
}
