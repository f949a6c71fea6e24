//! Replaceable global slots
//!
//! The place application code reads its timer and clock primitives from.
//! The installer swaps interceptors into these slots; everything scheduled
//! through the slots afterwards is rate-scaled.

use crate::event_loop::EventLoop;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use timewarp_core::{ClockHost, Environment, Result, TimerHandle, TimerHost, TimewarpError};
use tracing::debug;

/// Timer and clock slots with optional write protection
pub struct Globals {
    timers: RefCell<Option<Rc<dyn TimerHost>>>,
    clock: RefCell<Option<Rc<dyn ClockHost>>>,
    timers_locked: Cell<bool>,
    clock_locked: Cell<bool>,
}

impl Globals {
    pub fn new(timers: Option<Rc<dyn TimerHost>>, clock: Option<Rc<dyn ClockHost>>) -> Self {
        Self {
            timers: RefCell::new(timers),
            clock: RefCell::new(clock),
            timers_locked: Cell::new(false),
            clock_locked: Cell::new(false),
        }
    }

    /// Slots filled with an event loop's own primitives
    pub fn for_loop(event_loop: &EventLoop) -> Self {
        Self::new(Some(event_loop.timer_host()), Some(event_loop.clock_host()))
    }

    /// Refuse future replacement of the timer slot
    pub fn lock_timers(&self) {
        self.timers_locked.set(true);
    }

    /// Refuse future replacement of the clock slot
    pub fn lock_clock(&self) {
        self.clock_locked.set(true);
    }

    fn require_timers(&self) -> Result<Rc<dyn TimerHost>> {
        self.timers
            .borrow()
            .clone()
            .ok_or(TimewarpError::PrimitiveMissing("timers"))
    }

    /// Schedule through whatever timer primitive is installed
    pub fn set_timeout<F>(&self, callback: F, delay: Duration) -> Result<TimerHandle>
    where
        F: Fn() + 'static,
    {
        Ok(self.require_timers()?.set_timeout(Rc::new(callback), delay))
    }

    pub fn set_interval<F>(&self, callback: F, period: Duration) -> Result<TimerHandle>
    where
        F: Fn() + 'static,
    {
        Ok(self.require_timers()?.set_interval(Rc::new(callback), period))
    }

    pub fn clear_timeout(&self, handle: TimerHandle) -> Result<()> {
        self.require_timers()?.clear_timeout(handle);
        Ok(())
    }

    pub fn clear_interval(&self, handle: TimerHandle) -> Result<()> {
        self.require_timers()?.clear_interval(handle);
        Ok(())
    }

    /// Read whatever clock primitive is installed
    pub fn now(&self) -> Result<Duration> {
        let clock = self
            .clock
            .borrow()
            .clone()
            .ok_or(TimewarpError::PrimitiveMissing("clock"))?;
        Ok(clock.now())
    }
}

impl Environment for Globals {
    fn timers(&self) -> Option<Rc<dyn TimerHost>> {
        self.timers.borrow().clone()
    }

    fn clock(&self) -> Option<Rc<dyn ClockHost>> {
        self.clock.borrow().clone()
    }

    fn install_timers(&self, timers: Rc<dyn TimerHost>) -> Result<()> {
        if self.timers_locked.get() {
            return Err(TimewarpError::InstallRefused {
                primitive: "timers",
                reason: "slot is locked".to_string(),
            });
        }
        *self.timers.borrow_mut() = Some(timers);
        debug!("Installed timer primitives");
        Ok(())
    }

    fn install_clock(&self, clock: Rc<dyn ClockHost>) -> Result<()> {
        if self.clock_locked.get() {
            return Err(TimewarpError::InstallRefused {
                primitive: "clock",
                reason: "slot is locked".to_string(),
            });
        }
        *self.clock.borrow_mut() = Some(clock);
        debug!("Installed clock primitive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_primitives() {
        let globals = Globals::new(None, None);
        assert!(matches!(
            globals.set_timeout(|| {}, Duration::from_millis(1)),
            Err(TimewarpError::PrimitiveMissing("timers"))
        ));
        assert!(matches!(
            globals.now(),
            Err(TimewarpError::PrimitiveMissing("clock"))
        ));
    }

    #[test]
    fn test_locked_slot_refuses_install() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);
        globals.lock_clock();

        assert!(globals.install_clock(lp.clock_host()).is_err());
        assert!(globals.install_timers(lp.timer_host()).is_ok());
    }

    #[test]
    fn test_schedules_through_slot() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);
        let fired = Rc::new(Cell::new(0));
        let probe = fired.clone();

        globals
            .set_timeout(move || probe.set(probe.get() + 1), Duration::from_millis(5))
            .unwrap();
        lp.advance(Duration::from_millis(5));

        assert_eq!(fired.get(), 1);
        assert_eq!(globals.now().unwrap(), Duration::from_millis(5));
    }
}
