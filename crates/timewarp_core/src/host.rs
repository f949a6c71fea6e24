//! Host primitives
//!
//! The environment's original scheduling and clock functions, and the
//! replaceable slots application code reads them from. Interceptors implement
//! the same traits, so an adapter can put them where the originals were.

use crate::error::Result;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Handle to an underlying timer.
///
/// Hosts must never hand out the same handle twice. Interceptors rely on this
/// to keep a timer's first handle as its stable identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

impl TimerHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback handed to a timer host. Shared so it can be re-armed.
pub type TimerCallback = Rc<dyn Fn()>;

/// Delay-scheduling primitives
pub trait TimerHost {
    /// Run `callback` once after `delay`
    fn set_timeout(&self, callback: TimerCallback, delay: Duration) -> TimerHandle;

    /// Run `callback` every `period` until cleared
    fn set_interval(&self, callback: TimerCallback, period: Duration) -> TimerHandle;

    /// Cancel a one-shot timer. Unknown handles are ignored.
    fn clear_timeout(&self, handle: TimerHandle);

    /// Cancel a repeating timer. Unknown handles are ignored.
    fn clear_interval(&self, handle: TimerHandle);

    /// Shortest delay the host honors; shorter requests are raised to it
    fn min_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Wall-clock primitive
pub trait ClockHost {
    /// Time elapsed since the host's epoch
    fn now(&self) -> Duration;
}

/// The replaceable global slots of an environment.
///
/// Getters return whatever is installed right now, which may be absent.
/// Installing may be refused.
pub trait Environment {
    fn timers(&self) -> Option<Rc<dyn TimerHost>>;
    fn clock(&self) -> Option<Rc<dyn ClockHost>>;
    fn install_timers(&self, timers: Rc<dyn TimerHost>) -> Result<()>;
    fn install_clock(&self, clock: Rc<dyn ClockHost>) -> Result<()>;
}
