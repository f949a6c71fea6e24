//! Timewarp Clock
//!
//! A wall clock that advances at the current rate instead of real time.
//!
//! The clock keeps a [`ClockOffset`] pairing the last observed real time with
//! the scaled time at that instant. Scaled now is
//! `last_scaled + (real_now - last_real) * rate`. On every rate change the
//! offset is re-anchored before the new rate is adopted, so the scaled clock
//! never jumps; only its speed changes.

mod time;

pub use time::ScaledTime;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use timewarp_core::{scale_duration, ClockHost, RateChange, RateHolder, RateListener};
use tracing::debug;

/// Anchor pairing a real instant with the scaled time at that instant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockOffset {
    pub last_real: Duration,
    pub last_scaled: Duration,
}

/// Clock interceptor
pub struct ScaledClock {
    /// The environment's original clock
    real: Rc<dyn ClockHost>,
    rate: Cell<f64>,
    offset: Cell<ClockOffset>,
}

impl ScaledClock {
    /// Create a clock running at `rate`, starting level with real time.
    ///
    /// Prefer [`ScaledClock::attach`], which also subscribes to rate changes.
    pub fn new(real: Rc<dyn ClockHost>, rate: f64) -> Self {
        let now = real.now();
        Self {
            real,
            rate: Cell::new(rate),
            offset: Cell::new(ClockOffset {
                last_real: now,
                last_scaled: now,
            }),
        }
    }

    /// Create a clock at the holder's current rate and subscribe it
    pub fn attach(holder: &RateHolder, real: Rc<dyn ClockHost>) -> Rc<Self> {
        let clock = Rc::new(Self::new(real, holder.rate()));
        holder.subscribe(clock.clone());
        clock
    }

    /// Current scaled time
    pub fn now(&self) -> Duration {
        self.scaled_at(self.real.now())
    }

    /// Current scaled time as a point in time
    pub fn time(&self) -> ScaledTime {
        ScaledTime::from_duration(self.now())
    }

    /// Current time of the original clock
    pub fn real_now(&self) -> Duration {
        self.real.now()
    }

    pub fn rate(&self) -> f64 {
        self.rate.get()
    }

    pub fn offset(&self) -> ClockOffset {
        self.offset.get()
    }

    fn scaled_at(&self, real_now: Duration) -> Duration {
        let offset = self.offset.get();
        let elapsed = real_now.saturating_sub(offset.last_real);
        offset
            .last_scaled
            .saturating_add(scale_duration(elapsed, self.rate.get()))
    }
}

impl RateListener for ScaledClock {
    fn on_rate_change(&self, change: RateChange) {
        // One real reading for both fields keeps the anchor exact
        let real_now = self.real.now();
        let scaled_now = self.scaled_at(real_now);
        self.offset.set(ClockOffset {
            last_real: real_now,
            last_scaled: scaled_now,
        });
        self.rate.set(change.current);
        debug!(
            "Clock re-anchored at real {:?} / scaled {:?}, rate {}",
            real_now, scaled_now, change.current
        );
    }
}

impl ClockHost for ScaledClock {
    fn now(&self) -> Duration {
        ScaledClock::now(self)
    }
}
