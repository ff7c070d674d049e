// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Virtual time for the simulation.
//!
//! [`SimTime`] is an instant on the simulation clock, counted in nanoseconds
//! since the simulation epoch. It has no relation to wall-clock time and is
//! only ever advanced by the [`Scheduler`](crate::scheduler::Scheduler).
//!
//! [`SimDuration`] is a signed span of virtual time. It is signed so that
//! negative delays coming out of user-supplied distributions are representable,
//! and can be rejected by the scheduler instead of wrapping around.

use std::fmt::Display;
use std::ops::{Add, AddAssign, Sub};

/// Instant on the simulation clock, in nanoseconds since the epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(u64);

impl SimTime {
    /// Start of the simulation.
    pub const ZERO: Self = Self(0);
    /// Latest representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Constructs a new [`SimTime`] from the given number of nanoseconds.
    pub const fn from_nanos(time_ns: u64) -> Self {
        Self(time_ns)
    }

    /// Returns the number of nanoseconds since the epoch.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Converts the [`SimTime`] to (fractional) milliseconds.
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1e6
    }

    /// Converts the [`SimTime`] to (fractional) seconds.
    pub fn as_secs(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Adds a non-negative duration, saturating at [`SimTime::MAX`].
    ///
    /// Negative durations are treated as zero.
    pub fn saturating_add(self, duration: SimDuration) -> Self {
        let nanos = duration.0.max(0) as u64;
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the signed duration from `earlier` to `self`.
    pub fn duration_since(self, earlier: SimTime) -> SimDuration {
        SimDuration(self.0 as i64 - earlier.0 as i64)
    }
}

impl Add<SimDuration> for SimTime {
    type Output = Self;

    /// # Panics
    ///
    /// Panics if the result would be before the epoch.
    fn add(self, duration: SimDuration) -> Self {
        let nanos = self
            .0
            .checked_add_signed(duration.0)
            .expect("virtual time out of range");
        Self(nanos)
    }
}

impl AddAssign<SimDuration> for SimTime {
    fn add_assign(&mut self, duration: SimDuration) {
        *self = *self + duration;
    }
}

impl Sub<SimTime> for SimTime {
    type Output = SimDuration;

    fn sub(self, other: SimTime) -> SimDuration {
        self.duration_since(other)
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_nanos(f, "", self.0)
    }
}

/// Signed span of virtual time, in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimDuration(i64);

impl SimDuration {
    /// The empty duration.
    pub const ZERO: Self = Self(0);

    /// Constructs a new [`SimDuration`] from the given number of nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Constructs a new [`SimDuration`] from the given number of milliseconds.
    ///
    /// Saturates on overflow.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Constructs a new [`SimDuration`] from the given number of seconds.
    ///
    /// Saturates on overflow.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Constructs a new [`SimDuration`] from fractional seconds.
    ///
    /// The value is truncated toward zero at nanosecond precision.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1e9) as i64)
    }

    /// Returns the number of nanoseconds.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Converts the duration to (fractional) milliseconds.
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1e6
    }

    /// Converts the duration to (fractional) seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Returns `true` iff the duration is strictly negative.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiplies the duration by a scalar factor, truncating toward zero.
    pub fn mul_f64(self, factor: f64) -> Self {
        Self((self.0 as f64 * factor) as i64)
    }
}

impl Add for SimDuration {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for SimDuration {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Display for SimDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        fmt_nanos(f, sign, self.0.unsigned_abs())
    }
}

fn fmt_nanos(f: &mut std::fmt::Formatter<'_>, sign: &str, nanos: u64) -> std::fmt::Result {
    if nanos < 1_000 {
        write!(f, "{sign}{nanos} ns")
    } else if nanos < 1_000_000 {
        write!(f, "{sign}{:.0} us", nanos as f64 / 1e3)
    } else if nanos < 1_000_000_000 {
        write!(f, "{sign}{:.0} ms", nanos as f64 / 1e6)
    } else {
        write!(f, "{sign}{:.1} s", nanos as f64 / 1e9)
    }
}

/// Conversion of distribution samples into virtual time.
///
/// Real-valued samples are interpreted as nanoseconds and truncated toward
/// zero. Non-finite samples map to zero or saturate.
pub trait AsSimDuration {
    fn as_sim_duration(self) -> SimDuration;
}

impl AsSimDuration for SimDuration {
    fn as_sim_duration(self) -> SimDuration {
        self
    }
}

impl AsSimDuration for f64 {
    fn as_sim_duration(self) -> SimDuration {
        SimDuration(self as i64)
    }
}

impl AsSimDuration for f32 {
    fn as_sim_duration(self) -> SimDuration {
        SimDuration(self as i64)
    }
}

impl AsSimDuration for i64 {
    fn as_sim_duration(self) -> SimDuration {
        SimDuration(self)
    }
}

impl AsSimDuration for u64 {
    fn as_sim_duration(self) -> SimDuration {
        SimDuration(i64::try_from(self).unwrap_or(i64::MAX))
    }
}
