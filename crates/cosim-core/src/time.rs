//! Simulated time and iteration control
//!
//! Provides the time representation shared by every federate:
//! - `Time` - Fixed-point simulated time (nanosecond resolution)
//! - `IterationRequest` - What a federate asks for when advancing
//! - `IterationResult` - What the Core decided
//! - `IterationTime` - Granted time paired with the iteration decision
//!
//! Fixed-point time keeps comparisons exact, so two federates that request
//! `0.1` ten times agree on having reached `1.0`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Simulated time as a count of nanoseconds since the epoch of the co-simulation
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    /// The co-simulation epoch
    pub const ZERO: Time = Time(0);
    /// The smallest representable step
    pub const EPSILON: Time = Time(1);
    /// Largest representable time, used as "run until the end"
    pub const MAX: Time = Time(i64::MAX);
    /// Smallest representable time
    pub const MIN: Time = Time(i64::MIN);

    /// Create a time from a raw nanosecond count
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Create a time from seconds, rounding to the nearest nanosecond
    ///
    /// Values beyond the representable range saturate to `MAX`/`MIN`.
    pub fn from_secs(secs: f64) -> Self {
        let nanos = (secs * NANOS_PER_SEC).round();
        if nanos >= i64::MAX as f64 {
            Time::MAX
        } else if nanos <= i64::MIN as f64 {
            Time::MIN
        } else {
            Time(nanos as i64)
        }
    }

    /// Get the raw nanosecond count
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Convert to seconds
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC
    }

    /// Check if this time lies before the epoch
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        *self = *self + rhs;
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time(self.0.saturating_sub(rhs.0))
    }
}

impl From<f64> for Time {
    fn from(secs: f64) -> Self {
        Time::from_secs(secs)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Time::MAX {
            write!(f, "max")
        } else {
            write!(f, "{}s", self.as_secs_f64())
        }
    }
}

/// Iteration control requested by a federate when entering executing mode
/// or requesting a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IterationRequest {
    /// Advance normally
    #[default]
    NoIterations,
    /// Repeat the current step regardless of data changes
    ForceIteration,
    /// Repeat the current step only if inputs changed
    IterateIfNeeded,
}

/// Decision returned by the Core for an iterative advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterationResult {
    /// Time advanced to a new step
    NextStep,
    /// Same time, another iteration is required
    Iterating,
    /// The federation halted; the federate should finalize
    Halted,
    /// The co-simulation failed
    Error,
}

impl IterationResult {
    /// Whether the caller should re-submit at the same time
    pub fn is_iterating(&self) -> bool {
        matches!(self, IterationResult::Iterating)
    }
}

impl fmt::Display for IterationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IterationResult::NextStep => "next_step",
            IterationResult::Iterating => "iterating",
            IterationResult::Halted => "halted",
            IterationResult::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Granted time together with the iteration decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationTime {
    /// The time the federate was granted
    pub granted_time: Time,
    /// Whether the grant is a new step, an iteration, a halt or a failure
    pub state: IterationResult,
}

impl IterationTime {
    /// Create a new iteration time
    pub fn new(granted_time: Time, state: IterationResult) -> Self {
        Self {
            granted_time,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secs() {
        assert_eq!(Time::from_secs(1.5).as_nanos(), 1_500_000_000);
        assert_eq!(Time::from_secs(0.0), Time::ZERO);
        assert!(Time::from_secs(-0.25).is_negative());
        assert_eq!(Time::from_secs(f64::INFINITY), Time::MAX);
    }

    #[test]
    fn test_repeated_steps_are_exact() {
        let step = Time::from_secs(0.1);
        let mut t = Time::ZERO;
        for _ in 0..10 {
            t += step;
        }
        assert_eq!(t, Time::from_secs(1.0));
    }

    #[test]
    fn test_saturating_arithmetic() {
        assert_eq!(Time::MAX + Time::from_secs(1.0), Time::MAX);
        assert_eq!(Time::from_secs(3.0) - Time::from_secs(1.0), Time::from_secs(2.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Time::from_secs(2.5).to_string(), "2.5s");
        assert_eq!(Time::MAX.to_string(), "max");
        assert_eq!(IterationResult::NextStep.to_string(), "next_step");
    }

    #[test]
    fn test_serde_transparent() {
        let t = Time::from_nanos(42);
        let text = ron::to_string(&t).unwrap();
        assert_eq!(text, "42");
        let back: Time = ron::from_str(&text).unwrap();
        assert_eq!(back, t);
    }
}
