//! # Gigbook Testing
//!
//! Testing utilities for Gigbook reducers and stores.
//!
//! - [`ReducerTest`]: Given-When-Then harness for a single reducer step
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//! - [`effects::collect_actions`]: run effect futures without a store and
//!   collect the actions they report
//!
//! ## Example
//!
//! ```ignore
//! use gigbook_testing::{ReducerTest, assertions, test_clock};
//!
//! ReducerTest::new(BookingReducer)
//!     .with_env(test_env())
//!     .given_state(accepted_booking())
//!     .when_action(BookingAction::Close { actor })
//!     .then_state(|s| assert_eq!(s.booking.status, BookingStatus::Accepted))
//!     .then_effects(assertions::assert_has_future_effect)
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use gigbook_core::environment::Clock;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use gigbook_testing::mocks::FixedClock;
    /// use gigbook_core::environment::Clock;
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is a constant.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Drive effect values by hand.
///
/// Reducer tests usually stop at "a future effect was returned". These
/// helpers go one step further: they await the futures (against mock
/// collaborators) and hand back whatever actions they produced, without the
/// feedback loop a `Store` would add.
pub mod effects {
    use gigbook_core::effect::Effect;

    /// Await every effect in order and collect the produced actions.
    pub async fn collect_actions<A, I>(effects: I) -> Vec<A>
    where
        I: IntoIterator<Item = Effect<A>>,
        A: Send + 'static,
    {
        let mut produced = Vec::new();
        for effect in effects {
            if let Effect::Future(fut) = effect {
                if let Some(action) = fut.await {
                    produced.push(action);
                }
            }
        }
        produced
    }

    /// Await the effects and return the single action they produce.
    ///
    /// # Panics
    ///
    /// Panics unless exactly one action was produced.
    #[allow(clippy::panic)] // Test assertion
    pub async fn single_action<A, I>(effects: I) -> A
    where
        I: IntoIterator<Item = Effect<A>>,
        A: Send + std::fmt::Debug + 'static,
    {
        let mut actions = collect_actions(effects).await;
        assert_eq!(
            actions.len(),
            1,
            "Expected exactly one produced action, got {actions:?}"
        );
        match actions.pop() {
            Some(action) => action,
            None => panic!("Expected exactly one produced action"),
        }
    }
}

mod reducer_test;

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};
pub use reducer_test::{assertions, ReducerTest};
