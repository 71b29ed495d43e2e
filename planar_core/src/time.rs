// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time used to age compositions and pooled buffers.
//!
//! [`HostTime`] is a point in platform-native monotonic ticks and
//! [`Duration`] a span in the same units. [`Timebase`] converts ticks to
//! nanoseconds (`nanos = ticks * numer / denom`), so tunables expressed in
//! milliseconds can be turned into tick spans once per configuration.

use core::fmt;
use core::ops::Add;

/// A point in time expressed as platform-native monotonic ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Whether strictly more than `window` separates `earlier` from `self`.
    ///
    /// A clock that went backwards never makes anything old.
    #[inline]
    #[must_use]
    pub const fn is_older_than(self, earlier: Self, window: Duration) -> bool {
        self.0.saturating_sub(earlier.0) > window.0
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// Nanoseconds per tick, as the ratio `numer / denom`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Ratio numerator.
    pub numer: u32,
    /// Ratio denominator.
    pub denom: u32,
}

impl Timebase {
    /// Ticks are nanoseconds.
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// A timebase of `numer / denom` nanoseconds per tick.
    ///
    /// # Panics
    ///
    /// Panics if either part is zero.
    #[inline]
    #[must_use]
    pub const fn new(numer: u32, denom: u32) -> Self {
        assert!(numer != 0, "timebase numerator must not be zero");
        assert!(denom != 0, "timebase denominator must not be zero");
        Self { numer, denom }
    }

    /// Tick count to nanoseconds, saturating.
    #[must_use]
    pub const fn ticks_to_nanos(self, ticks: u64) -> u64 {
        scale(ticks, self.numer, self.denom)
    }

    /// Nanoseconds to tick count, saturating.
    #[must_use]
    pub const fn nanos_to_ticks(self, nanos: u64) -> u64 {
        scale(nanos, self.denom, self.numer)
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::NANOS
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timebase({}/{})", self.numer, self.denom)
    }
}

const fn scale(value: u64, mul: u32, div: u32) -> u64 {
    let wide = value as u128 * mul as u128 / div as u128;
    if wide > u64::MAX as u128 {
        u64::MAX
    } else {
        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let narrow = wide as u64;
        narrow
    }
}

/// A span of ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// The raw tick count.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// `millis` milliseconds in `timebase` ticks. Config windows are built
    /// this way.
    #[must_use]
    pub const fn from_millis(millis: u64, timebase: Timebase) -> Self {
        Self(timebase.nanos_to_ticks(millis.saturating_mul(1_000_000)))
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_in_nanosecond_timebase() {
        let d = Duration::from_millis(100, Timebase::NANOS);
        assert_eq!(d.ticks(), 100_000_000, "100ms");
        assert_eq!(Timebase::NANOS.ticks_to_nanos(d.ticks()), 100_000_000, "identity");
    }

    #[test]
    fn conversion_saturates() {
        let tb = Timebase::new(1000, 1);
        assert_eq!(tb.ticks_to_nanos(u64::MAX), u64::MAX, "saturates");
    }

    #[test]
    fn millis_in_24mhz_timebase() {
        // 24 MHz counter: 125/3 ns per tick.
        let tb = Timebase::new(125, 3);
        let d = Duration::from_millis(1000, tb);
        assert_eq!(d.ticks(), 24_000_000, "1s at 24 MHz");
    }

    #[test]
    fn older_than_is_strict() {
        let window = Duration(100);
        assert!(!HostTime(200).is_older_than(HostTime(100), window), "exactly the window");
        assert!(HostTime(201).is_older_than(HostTime(100), window), "one past");
        assert!(
            !HostTime(50).is_older_than(HostTime(100), window),
            "clock going backwards is never older"
        );
    }

    #[test]
    fn add_saturates() {
        assert_eq!(HostTime(u64::MAX) + Duration(5), HostTime(u64::MAX), "saturates");
    }

    #[test]
    #[should_panic(expected = "timebase denominator must not be zero")]
    fn zero_denominator_panics() {
        let _ = Timebase::new(1, 0);
    }
}
