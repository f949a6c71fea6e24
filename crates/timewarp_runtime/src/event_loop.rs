//! Single-threaded event loop host
//!
//! Provides the original timer and clock primitives the interceptors wrap.
//! The loop runs on either a real monotonic clock (sleeping between timers)
//! or a manual clock that jumps straight to the next deadline, which makes
//! timing deterministic for tests and simulations.

use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use timewarp_core::{ClockHost, TimerCallback, TimerHandle, TimerHost};
use tracing::trace;

/// Minimum delay honored unless configured otherwise
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(1);

/// Floor for the configurable minimum, so intervals always make progress
const MIN_HONORED_DELAY: Duration = Duration::from_micros(1);

/// Real monotonic clock measured from its creation
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockHost for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

enum LoopClock {
    Real(MonotonicClock),
    Manual(Cell<Duration>),
}

struct Scheduled {
    callback: TimerCallback,
    period: Option<Duration>,
    /// Matches the live queue entry; older entries are stale
    seq: u64,
}

#[derive(Default)]
struct LoopState {
    next_handle: u64,
    next_seq: u64,
    timers: FxHashMap<TimerHandle, Scheduled>,
    queue: BinaryHeap<Reverse<(Duration, u64, TimerHandle)>>,
}

impl LoopState {
    fn issue_handle(&mut self) -> TimerHandle {
        self.next_handle += 1;
        TimerHandle(self.next_handle)
    }

    fn enqueue(&mut self, handle: TimerHandle, due: Duration) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.queue.push(Reverse((due, seq, handle)));
        seq
    }

    /// Earliest live deadline, discarding stale queue entries on the way
    fn peek_due(&mut self) -> Option<Duration> {
        while let Some(Reverse((due, seq, handle))) = self.queue.peek().copied() {
            match self.timers.get(&handle) {
                Some(scheduled) if scheduled.seq == seq => return Some(due),
                _ => {
                    self.queue.pop();
                }
            }
        }
        None
    }

    /// Take the next timer due at or before `now`, re-queueing intervals
    fn pop_due(&mut self, now: Duration) -> Option<(TimerHandle, TimerCallback)> {
        let due = self.peek_due()?;
        if due > now {
            return None;
        }
        let Reverse((due, _, handle)) = self.queue.pop()?;

        let (callback, period) = {
            let scheduled = self.timers.get(&handle)?;
            (scheduled.callback.clone(), scheduled.period)
        };

        match period {
            Some(period) => {
                let next = (due + period).max(now);
                let seq = self.enqueue(handle, next);
                if let Some(scheduled) = self.timers.get_mut(&handle) {
                    scheduled.seq = seq;
                }
            }
            None => {
                self.timers.remove(&handle);
            }
        }

        Some((handle, callback))
    }
}

struct LoopInner {
    clock: LoopClock,
    min_delay: Cell<Duration>,
    state: RefCell<LoopState>,
}

/// Cheaply cloneable handle to a single-threaded event loop.
///
/// Callbacks run with no internal borrow held, so they may schedule and
/// clear timers freely. Handles are never reused.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    fn with_clock(clock: LoopClock) -> Self {
        Self {
            inner: Rc::new(LoopInner {
                clock,
                min_delay: Cell::new(DEFAULT_MIN_DELAY),
                state: RefCell::new(LoopState::default()),
            }),
        }
    }

    /// Loop driven by the real monotonic clock
    pub fn real() -> Self {
        Self::with_clock(LoopClock::Real(MonotonicClock::new()))
    }

    /// Loop whose clock only moves when the loop is run
    pub fn manual() -> Self {
        Self::with_clock(LoopClock::Manual(Cell::new(Duration::ZERO)))
    }

    /// Set the minimum delay honored for new timers
    pub fn with_min_delay(self, min_delay: Duration) -> Self {
        self.inner
            .min_delay
            .set(min_delay.max(MIN_HONORED_DELAY));
        self
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.inner.clock, LoopClock::Manual(_))
    }

    /// Loop time since creation
    pub fn now(&self) -> Duration {
        match &self.inner.clock {
            LoopClock::Real(clock) => clock.now(),
            LoopClock::Manual(now) => now.get(),
        }
    }

    /// This loop as an original timer primitive
    pub fn timer_host(&self) -> Rc<dyn TimerHost> {
        Rc::new(self.clone())
    }

    /// This loop's clock as an original clock primitive
    pub fn clock_host(&self) -> Rc<dyn ClockHost> {
        Rc::new(self.clone())
    }

    /// Number of live timers
    pub fn pending(&self) -> usize {
        self.inner.state.borrow().timers.len()
    }

    /// Deadline of the next live timer
    pub fn next_due(&self) -> Option<Duration> {
        self.inner.state.borrow_mut().peek_due()
    }

    /// Run every timer due up to `now + by`, then move to that point.
    ///
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        self.run_until(self.now().saturating_add(by))
    }

    /// Run every timer due up to `deadline`, then move to `deadline`
    pub fn run_until(&self, deadline: Duration) -> usize {
        let mut fired = 0;

        loop {
            let next = self.inner.state.borrow_mut().peek_due();
            let Some(due) = next.filter(|due| *due <= deadline) else {
                break;
            };

            self.wait_until(due);
            let popped = self.inner.state.borrow_mut().pop_due(self.now());
            if let Some((handle, callback)) = popped {
                trace!("Firing timer {} at {:?}", handle, self.now());
                callback();
                fired += 1;
            }
        }

        self.wait_until(deadline);
        fired
    }

    /// Run whatever is already due without moving time
    pub fn run_due(&self) -> usize {
        self.run_until(self.now())
    }

    fn wait_until(&self, target: Duration) {
        match &self.inner.clock {
            LoopClock::Manual(now) => {
                if target > now.get() {
                    now.set(target);
                }
            }
            LoopClock::Real(clock) => {
                let now = clock.now();
                if target > now {
                    thread::sleep(target - now);
                }
            }
        }
    }

    fn insert(&self, callback: TimerCallback, delay: Duration, repeating: bool) -> TimerHandle {
        let delay = delay.max(self.inner.min_delay.get());
        let due = self.now().saturating_add(delay);

        let mut state = self.inner.state.borrow_mut();
        let handle = state.issue_handle();
        let seq = state.enqueue(handle, due);
        state.timers.insert(
            handle,
            Scheduled {
                callback,
                period: repeating.then_some(delay),
                seq,
            },
        );
        trace!("Armed timer {} due {:?}", handle, due);
        handle
    }

    fn remove(&self, handle: TimerHandle) {
        // Queue entry goes stale and is dropped lazily
        self.inner.state.borrow_mut().timers.remove(&handle);
    }
}

impl TimerHost for EventLoop {
    fn set_timeout(&self, callback: TimerCallback, delay: Duration) -> TimerHandle {
        self.insert(callback, delay, false)
    }

    fn set_interval(&self, callback: TimerCallback, period: Duration) -> TimerHandle {
        self.insert(callback, period, true)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        self.remove(handle);
    }

    fn clear_interval(&self, handle: TimerHandle) {
        self.remove(handle);
    }

    fn min_delay(&self) -> Duration {
        self.inner.min_delay.get()
    }
}

impl ClockHost for EventLoop {
    fn now(&self) -> Duration {
        EventLoop::now(self)
    }
}
