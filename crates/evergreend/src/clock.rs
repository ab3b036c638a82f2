//! Wall-clock seam for lifecycle logic.
//!
//! Expiry bookkeeping is all epoch-millisecond arithmetic, so the actor
//! reads time through [`Clock`] instead of calling `Utc::now()` inline.
//! Tests substitute a manually advanced clock and drive the schedule
//! deterministically.

use chrono::Utc;

/// Source of the current wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync + 'static {
    /// Current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}


#[cfg(test)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;

    #[test]
    fn test_system_clock_reads_current_time() {
        // 2020-01-01T00:00:00Z; anything earlier means the clock is broken.
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(1_000_000);
        assert_eq!(clock.now_ms(), 1_000_000);

        clock.advance(1_500_000);
        assert_eq!(clock.now_ms(), 2_500_000);

        let alias = clock.clone();
        alias.advance(500);
        assert_eq!(clock.now_ms(), 2_500_500);
    }
}
