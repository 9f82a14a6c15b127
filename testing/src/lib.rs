//! # Keyward Testing
//!
//! Testing utilities and helpers for the Keyward authentication engine.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - A strict `Set-Cookie` parser and session token extraction
//! - Request builders for the standard auth routes
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use keyward_testing::{requests, cookies::SessionTokens};
//!
//! #[tokio::test]
//! async fn sign_up_then_refresh() {
//!     let registry = test_registry();
//!
//!     let response = registry.handle(requests::sign_up("a@b.com", "validpass123")).await?;
//!     let tokens = SessionTokens::from_headers(&response.headers)?;
//!
//!     let response = registry.handle(requests::refresh(&tokens)).await?;
//!     assert_eq!(response.status, 200);
//! }
//! ```

use chrono::{DateTime, Utc};
use keyward_core::environment::Clock;

pub mod cookies;
pub mod requests;

/// Mock implementations of environment traits.
pub mod mocks {
    use std::sync::{Arc, Mutex, PoisonError};

    use chrono::Duration;

    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use keyward_testing::mocks::FixedClock;
    /// use keyward_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the code under test.
    ///
    /// ```
    /// use chrono::Duration;
    /// use keyward_core::environment::Clock;
    /// use keyward_testing::mocks::ManualClock;
    ///
    /// let clock = ManualClock::starting_at_test_epoch();
    /// let handle = clock.clone();
    /// let before = clock.now();
    /// handle.advance(Duration::hours(2));
    /// assert_eq!(clock.now() - before, Duration::hours(2));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Start at the same instant as [`test_clock`].
        #[must_use]
        pub fn starting_at_test_epoch() -> Self {
            Self::new(test_clock().now())
        }

        /// Move time forward (or backward with a negative duration).
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
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

/// Test helpers and utilities.
pub mod helpers {
    /// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
    ///
    /// Safe to call from every test; only the first call has an effect.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Syntactically valid email addresses.
    pub fn email() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9]{0,11}", "[a-z]{1,10}", "(com|org|io|dev)")
            .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
    }

    /// Passwords accepted by the default password validator: 8 to 40
    /// characters with at least one letter and one digit.
    pub fn valid_password() -> impl Strategy<Value = String> {
        ("[a-zA-Z]{4,20}", "[0-9]{4,19}").prop_map(|(letters, digits)| format!("{letters}{digits}"))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at_test_epoch();
        let other = clock.clone();
        other.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), test_clock().now() + chrono::Duration::seconds(30));
    }

    proptest! {
        #[test]
        fn generated_passwords_fit_default_rules(password in properties::valid_password()) {
            prop_assert!((8..=40).contains(&password.len()));
            prop_assert!(password.chars().any(|c| c.is_ascii_digit()));
            prop_assert!(password.chars().any(|c| c.is_ascii_alphabetic()));
        }
    }
}
