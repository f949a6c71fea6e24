//! Points in scaled time

use crate::ScaledClock;
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A point in scaled time, measured from the host clock's epoch.
///
/// [`ScaledTime::now`] is the "current time" constructor and reads the scaled
/// clock, never the real one. The other constructors build explicit points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScaledTime(Duration);

impl ScaledTime {
    /// Current scaled now
    pub fn now(clock: &ScaledClock) -> Self {
        clock.time()
    }

    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(since_epoch)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> u128 {
        self.0.as_millis()
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.0.as_secs_f64() * 1000.0
    }

    /// Scaled time elapsed since `earlier`, zero if `earlier` is later
    pub fn duration_since(&self, earlier: ScaledTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for ScaledTime {
    type Output = ScaledTime;

    fn add(self, rhs: Duration) -> ScaledTime {
        ScaledTime(self.0.saturating_add(rhs))
    }
}

impl Sub<Duration> for ScaledTime {
    type Output = ScaledTime;

    fn sub(self, rhs: Duration) -> ScaledTime {
        ScaledTime(self.0.saturating_sub(rhs))
    }
}

impl Sub for ScaledTime {
    type Output = Duration;

    fn sub(self, rhs: ScaledTime) -> Duration {
        self.duration_since(rhs)
    }
}

impl fmt::Display for ScaledTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis_f64())
    }
}
