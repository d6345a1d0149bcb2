//! Clock abstractions for time-dependent authorization logic
//!
//! Temporal claim checks ("is this token expired?") and record timestamps
//! are side effects of reading the current time. Keeping the clock behind a
//! trait lets the rest of the workspace run those checks against a fixed,
//! test-controlled time.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]

use std::{fmt, time::SystemTime};

/// Unix time
///
/// The number of whole seconds elapsed since 1970-01-01T00:00:00Z, which is
/// also how the `exp` and `nbf` claims of a JWT are expressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct UnixTime(pub u64);

impl UnixTime {
    /// The duration in whole seconds from `earlier` until this time
    ///
    /// Saturates to zero if `earlier` is actually later.
    #[must_use]
    pub fn since(self, earlier: UnixTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<SystemTime> for UnixTime {
    #[inline]
    fn from(t: SystemTime) -> Self {
        let time = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("times before the Unix epoch are not expected")
            .as_secs();

        UnixTime(time)
    }
}

impl fmt::Display for UnixTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for UnixTime {
    #[inline]
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for UnixTime {
    #[inline]
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = u64::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// A clock, which can report the current time
pub trait Clock {
    /// The current time according to this clock
    fn now(&self) -> UnixTime;
}

/// The system clock, backed by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixTime {
        UnixTime::from(SystemTime::now())
    }
}

/// A test clock which holds the current time as internal state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TestClock(UnixTime);

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixTime {
        self.0
    }
}

impl TestClock {
    /// Creates a new test clock set to the given time
    #[inline]
    #[must_use]
    pub const fn new(time: UnixTime) -> Self {
        Self(time)
    }

    /// Moves the clock to `val`
    pub fn set(&mut self, val: UnixTime) {
        self.0 = val;
    }

    /// Advances the clock by `inc` seconds
    pub fn advance(&mut self, inc: u64) {
        (self.0).0 += inc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut clock = TestClock::new(UnixTime(100));
        assert_eq!(clock.now(), UnixTime(100));
        clock.advance(50);
        assert_eq!(clock.now(), UnixTime(150));
    }

    #[test]
    fn since_saturates() {
        assert_eq!(UnixTime(10).since(UnixTime(25)), 0);
        assert_eq!(UnixTime(25).since(UnixTime(10)), 15);
    }
}
