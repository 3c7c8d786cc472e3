//! Monotonic clock driver.

use keybus_common::hal::driver::{BusClock, HalError};
use keybus_common::hal::types::Deadline;
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

/// `CLOCK_MONOTONIC` with `TIMER_ABSTIME` sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    /// Create the clock.
    pub const fn new() -> Self {
        Self
    }
}

impl BusClock for MonotonicClock {
    fn now(&self) -> Result<Deadline, HalError> {
        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| HalError::Clock(format!("clock_gettime: {e}")))?;
        Ok(Deadline::new(ts.tv_sec() as i64, ts.tv_nsec() as i64))
    }

    fn sleep_until(&mut self, deadline: Deadline) {
        let ts = TimeSpec::new(deadline.secs() as _, deadline.nanos() as _);
        // Absolute deadline: restarting after a signal cannot drift.
        while matches!(
            clock_nanosleep(ClockId::CLOCK_MONOTONIC, ClockNanosleepFlags::TIMER_ABSTIME, &ts),
            Err(Errno::EINTR)
        ) {}
    }
}
