//! Timer interceptor
//!
//! Schedules callbacks through the host's original primitives with delays
//! divided by the current rate, and re-arms everything still pending when the
//! rate changes.

use crate::pending::{Bookkeeping, PendingInfo, PendingTimer, TimerKind};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use timewarp_core::{
    scale_duration, ClockHost, RateChange, RateHolder, RateListener, TimerCallback, TimerHandle,
    TimerHost,
};
use tracing::{debug, warn};

/// Rate-scaled replacement for a host's timer primitives.
///
/// Ids returned by the schedule methods are stable: they stay valid across
/// re-arms, and so do the underlying handles current at any moment.
///
/// The host passed in must not run callbacks from inside `set_*`/`clear_*`.
pub struct TimerInterceptor {
    /// The environment's original primitives
    timers: Rc<dyn TimerHost>,
    /// The environment's original (real) clock
    clock: Rc<dyn ClockHost>,
    /// `1 / rate`
    scale: Cell<f64>,
    book: RefCell<Bookkeeping>,
    this: Weak<TimerInterceptor>,
}

impl TimerInterceptor {
    /// Create an interceptor running at `rate`.
    ///
    /// Prefer [`TimerInterceptor::attach`], which also subscribes to rate changes.
    pub fn new(timers: Rc<dyn TimerHost>, clock: Rc<dyn ClockHost>, rate: f64) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            timers,
            clock,
            scale: Cell::new(1.0 / rate),
            book: RefCell::new(Bookkeeping::default()),
            this: this.clone(),
        })
    }

    /// Create an interceptor at the holder's current rate and subscribe it
    pub fn attach(
        holder: &RateHolder,
        timers: Rc<dyn TimerHost>,
        clock: Rc<dyn ClockHost>,
    ) -> Rc<Self> {
        let interceptor = Self::new(timers, clock, holder.rate());
        holder.subscribe(interceptor.clone());
        interceptor
    }

    /// Rate the interceptor is currently scaling by
    pub fn rate(&self) -> f64 {
        1.0 / self.scale.get()
    }

    /// Real delay used for a requested delay at the current rate
    pub fn scaled_delay(&self, requested: Duration) -> Duration {
        self.clamp(scale_duration(requested, self.scale.get()))
    }

    /// Run `callback` once after `delay` of scaled time
    pub fn schedule_once<F>(&self, callback: F, delay: Duration) -> TimerHandle
    where
        F: FnMut() + 'static,
    {
        self.schedule(TimerKind::Once, Box::new(callback), delay)
    }

    /// Run `callback` every `period` of scaled time until cancelled
    pub fn schedule_repeating<F>(&self, callback: F, period: Duration) -> TimerHandle
    where
        F: FnMut() + 'static,
    {
        self.schedule(TimerKind::Repeating, Box::new(callback), period)
    }

    /// Cancel by stable id or current underlying handle.
    ///
    /// Returns false if nothing was pending under that id, which includes a
    /// one-shot timer cancelling itself from its own callback.
    pub fn cancel(&self, id: TimerHandle) -> bool {
        let removed = self.book.borrow_mut().remove(id);
        match removed {
            Some(timer) => {
                self.clear_underlying(timer.kind, timer.handle);
                debug!("Cancelled timer {} (underlying {})", timer.id, timer.handle);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.book.borrow().len()
    }

    pub fn is_pending(&self, id: TimerHandle) -> bool {
        self.book.borrow().get(id).is_some()
    }

    /// Underlying handle currently armed for `id`
    pub fn current_handle(&self, id: TimerHandle) -> Option<TimerHandle> {
        self.book.borrow().get(id).map(|timer| timer.handle)
    }

    pub fn pending(&self, id: TimerHandle) -> Option<PendingInfo> {
        self.book.borrow().get(id).map(PendingTimer::info)
    }

    /// Every pending timer, in no particular order
    pub fn pending_timers(&self) -> Vec<PendingInfo> {
        self.book.borrow().iter().map(PendingTimer::info).collect()
    }

    fn clamp(&self, delay: Duration) -> Duration {
        delay.max(self.timers.min_delay())
    }

    fn arm(&self, kind: TimerKind, fire: TimerCallback, delay: Duration) -> TimerHandle {
        match kind {
            TimerKind::Once => self.timers.set_timeout(fire, delay),
            TimerKind::Repeating => self.timers.set_interval(fire, delay),
        }
    }

    fn clear_underlying(&self, kind: TimerKind, handle: TimerHandle) {
        match kind {
            TimerKind::Once => self.timers.clear_timeout(handle),
            TimerKind::Repeating => self.timers.clear_interval(handle),
        }
    }

    fn schedule(
        &self,
        kind: TimerKind,
        callback: Box<dyn FnMut()>,
        requested: Duration,
    ) -> TimerHandle {
        // The stable id is the first underlying handle, known only after arming
        let stable = Rc::new(Cell::new(None::<TimerHandle>));
        let fire = self.wrap(kind, callback, stable.clone());

        let scale = self.scale.get();
        let delay = self.clamp(scale_duration(requested, scale));
        let armed_at = self.clock.now();
        let handle = self.arm(kind, fire.clone(), delay);
        stable.set(Some(handle));

        self.book.borrow_mut().insert(PendingTimer {
            kind,
            id: handle,
            handle,
            requested,
            scale,
            armed_at,
            armed_delay: delay,
            fire,
        });

        debug!(
            "Scheduled {:?} timer {}: requested {:?}, armed {:?}",
            kind, handle, requested, delay
        );
        handle
    }

    fn wrap(
        &self,
        kind: TimerKind,
        callback: Box<dyn FnMut()>,
        stable: Rc<Cell<Option<TimerHandle>>>,
    ) -> TimerCallback {
        let this = self.this.clone();
        let callback = RefCell::new(callback);

        Rc::new(move || {
            if kind == TimerKind::Once {
                if let (Some(this), Some(id)) = (this.upgrade(), stable.get()) {
                    this.book.borrow_mut().remove(id);
                }
            }

            match callback.try_borrow_mut() {
                Ok(mut callback) => (*callback)(),
                Err(_) => warn!("Skipping reentrant fire of timer {:?}", stable.get()),
            }
        })
    }
}

impl RateListener for TimerInterceptor {
    fn on_rate_change(&self, change: RateChange) {
        let new_scale = change.scale();
        self.scale.set(new_scale);

        let now = self.clock.now();
        let mut book = self.book.borrow_mut();
        let keys = book.keys();

        for key in keys {
            let Some(timer) = book.entry_mut(key) else {
                continue;
            };

            let delay = self.clamp(timer.rearm_delay(now, new_scale));
            let (kind, old_handle, fire) = (timer.kind, timer.handle, timer.fire.clone());
            timer.scale = new_scale;
            timer.armed_at = now;
            timer.armed_delay = delay;

            self.clear_underlying(kind, old_handle);
            let handle = self.arm(kind, fire, delay);
            book.rehandle(key, handle);

            debug!(
                "Re-armed {:?} timer (underlying {} -> {}) for {:?}",
                kind, old_handle, handle, delay
            );
        }
    }
}

impl TimerHost for TimerInterceptor {
    fn set_timeout(&self, callback: TimerCallback, delay: Duration) -> TimerHandle {
        self.schedule_once(move || callback(), delay)
    }

    fn set_interval(&self, callback: TimerCallback, period: Duration) -> TimerHandle {
        self.schedule_repeating(move || callback(), period)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        // Timers armed before interception are still the host's to clear
        if !self.cancel(handle) {
            self.timers.clear_timeout(handle);
        }
    }

    fn clear_interval(&self, handle: TimerHandle) {
        if !self.cancel(handle) {
            self.timers.clear_interval(handle);
        }
    }

    fn min_delay(&self) -> Duration {
        self.timers.min_delay()
    }
}
