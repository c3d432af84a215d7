use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar logical clock.
///
/// A `Clock` is an immutable, non-negative counter. Operations never mutate
/// the receiver; [`Clock::increment`] returns a new instance one greater.
///
/// Ordering is the total order of the underlying counter.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Clock(u64);

impl Clock {
    /// The zero clock. Absent vector clock components read as this value.
    pub const ZERO: Clock = Clock(0);

    /// Create a clock with an explicit value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw counter value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `true` if the counter is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// A new clock one greater than this one.
    #[must_use]
    pub const fn increment(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns `true` if this clock is strictly greater than `other`.
    pub fn is_after(self, other: Self) -> bool {
        self > other
    }

    /// Returns `true` if this clock is strictly smaller than `other`.
    pub fn is_before(self, other: Self) -> bool {
        self < other
    }
}

impl From<u64> for Clock {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Clock({})", self.0)
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
