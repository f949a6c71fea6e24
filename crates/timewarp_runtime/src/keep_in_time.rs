//! Keep-in-time
//!
//! Periodically re-applies the current rate so every dependent re-anchors
//! against real time. Runs on the original, unscaled timer primitive and does
//! nothing while the rate is 1.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use timewarp_core::{RateHolder, TimerHandle, TimerHost};
use tracing::{debug, trace};

pub struct KeepInTime {
    timers: Rc<dyn TimerHost>,
    handle: Cell<Option<TimerHandle>>,
    interval: Duration,
}

impl KeepInTime {
    /// Start re-applying `holder`'s rate every `interval` of real time
    pub fn start(holder: &Rc<RateHolder>, timers: Rc<dyn TimerHost>, interval: Duration) -> Self {
        let holder: Weak<RateHolder> = Rc::downgrade(holder);
        let handle = timers.set_interval(
            Rc::new(move || {
                let Some(holder) = holder.upgrade() else {
                    return;
                };
                if holder.rate() != 1.0 {
                    trace!("Keep-in-time tick at rate {}", holder.rate());
                    holder.reapply();
                }
            }),
            interval,
        );
        debug!("Keep-in-time started every {:?}", interval);

        Self {
            timers,
            handle: Cell::new(Some(handle)),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.take() {
            self.timers.clear_interval(handle);
            debug!("Keep-in-time stopped");
        }
    }
}

impl Drop for KeepInTime {
    fn drop(&mut self) {
        self.stop();
    }
}
