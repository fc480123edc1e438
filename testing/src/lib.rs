//! # Tokengate Testing
//!
//! Testing utilities for reducers and the simulated ledger.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`ReducerTest`], a Given-When-Then builder for single reducer calls
//! - Effect assertion helpers
//!
//! ## Example
//!
//! ```
//! use tokengate_testing::ManualClock;
//! use tokengate_core::environment::Clock;
//!
//! let clock = ManualClock::at_unix(1_700_000_000);
//! clock.advance_secs(3_000);
//! assert_eq!(clock.unix_seconds(), 1_700_003_000);
//! ```

use chrono::{DateTime, Utc};
use tokengate_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tokengate_testing::mocks::FixedClock;
    /// use tokengate_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// The ledger equivalent of `evm_increaseTime`: share it with the ledger
    /// environment through an `Arc` and advance it from the test body.
    #[derive(Debug)]
    pub struct ManualClock {
        unix_seconds: AtomicI64,
    }

    impl ManualClock {
        /// Create a clock frozen at the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self::at_unix(time.timestamp())
        }

        /// Create a clock frozen at the given unix timestamp (seconds)
        #[must_use]
        pub const fn at_unix(unix_seconds: i64) -> Self {
            Self {
                unix_seconds: AtomicI64::new(unix_seconds),
            }
        }

        /// Move time forward
        pub fn advance_secs(&self, seconds: i64) {
            self.unix_seconds.fetch_add(seconds, Ordering::SeqCst);
        }

        /// Jump to an absolute unix timestamp
        pub fn set_unix(&self, unix_seconds: i64) {
            self.unix_seconds.store(unix_seconds, Ordering::SeqCst);
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::at_unix(TEST_EPOCH)
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(self.unix_seconds.load(Ordering::SeqCst), 0)
                .unwrap_or_default()
        }
    }

    /// 2025-01-01T00:00:00Z
    pub const TEST_EPOCH: i64 = 1_735_689_600;

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(TEST_EPOCH, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, TEST_EPOCH, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.unix_seconds(), 1_735_689_600);
    }

    #[test]
    fn manual_clock_advances_and_jumps() {
        let clock = ManualClock::default();
        clock.advance_secs(10);
        assert_eq!(clock.unix_seconds(), 1_735_689_610);

        clock.set_unix(42);
        assert_eq!(clock.unix_seconds(), 42);
    }
}
