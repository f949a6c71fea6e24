//! Rate state holder
//!
//! Holds the single playback-rate multiplier and fans changes out to every
//! subscribed dependent, synchronously and in subscription order.

use crate::error::{Result, TimewarpError};
use slotmap::{new_key_type, SlotMap};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info};

new_key_type! {
    /// Identifies a subscribed rate listener
    pub struct ListenerId;
}

/// Rate used when nothing else is configured (real time)
pub const DEFAULT_RATE: f64 = 1.0;

/// Whether `rate` can be adopted: finite and strictly positive
pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Notification payload delivered to listeners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateChange {
    /// Rate in effect before the change
    pub previous: f64,
    /// Rate in effect from now on
    pub current: f64,
    /// Set when the current rate is re-applied without changing
    pub forced: bool,
}

impl RateChange {
    /// Delay scale factor before the change (`1 / previous`)
    pub fn previous_scale(&self) -> f64 {
        1.0 / self.previous
    }

    /// Delay scale factor after the change (`1 / current`)
    pub fn scale(&self) -> f64 {
        1.0 / self.current
    }
}

/// A dependent that reacts to rate changes
pub trait RateListener {
    fn on_rate_change(&self, change: RateChange);
}

impl<F> RateListener for F
where
    F: Fn(RateChange),
{
    fn on_rate_change(&self, change: RateChange) {
        self(change)
    }
}

/// Owner of the current rate.
///
/// The holder is the only place the rate is mutated. Listeners are notified
/// before [`RateHolder::set_rate`] returns, and may call back into the holder.
pub struct RateHolder {
    rate: Cell<f64>,
    listeners: RefCell<SlotMap<ListenerId, Rc<dyn RateListener>>>,
    order: RefCell<Vec<ListenerId>>,
    /// Bumped per dispatch; a newer dispatch supersedes an older one
    generation: Cell<u64>,
}

impl RateHolder {
    /// Create a holder at real-time speed
    pub fn new() -> Self {
        Self {
            rate: Cell::new(DEFAULT_RATE),
            listeners: RefCell::new(SlotMap::with_key()),
            order: RefCell::new(Vec::new()),
            generation: Cell::new(0),
        }
    }

    /// Create a holder starting at `rate`
    pub fn with_rate(rate: f64) -> Result<Self> {
        if !is_valid_rate(rate) {
            return Err(TimewarpError::InvalidRate(rate));
        }
        let holder = Self::new();
        holder.rate.set(rate);
        Ok(holder)
    }

    /// Current rate
    pub fn rate(&self) -> f64 {
        self.rate.get()
    }

    /// Register a listener; it is notified after every listener registered before it
    pub fn subscribe(&self, listener: Rc<dyn RateListener>) -> ListenerId {
        let id = self.listeners.borrow_mut().insert(listener);
        self.order.borrow_mut().push(id);
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.listeners.borrow_mut().remove(id).is_some();
        if removed {
            self.order.borrow_mut().retain(|other| *other != id);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.order.borrow().len()
    }

    /// Change the rate.
    ///
    /// Invalid values and the current value are ignored. Returns whether the
    /// rate changed.
    pub fn set_rate(&self, rate: f64) -> bool {
        match self.try_set_rate(rate) {
            Ok(changed) => changed,
            Err(err) => {
                debug!("Rejected rate change: {}", err);
                false
            }
        }
    }

    /// Like [`RateHolder::set_rate`], but reports invalid values as an error
    pub fn try_set_rate(&self, rate: f64) -> Result<bool> {
        if !is_valid_rate(rate) {
            return Err(TimewarpError::InvalidRate(rate));
        }

        let previous = self.rate.get();
        if previous == rate {
            return Ok(false);
        }

        self.rate.set(rate);
        info!("Timer speed rate changed to: {}", rate);
        self.notify(RateChange {
            previous,
            current: rate,
            forced: false,
        });
        Ok(true)
    }

    /// Re-notify every listener with the current rate.
    ///
    /// Listeners see `previous == current` with `forced` set.
    pub fn reapply(&self) {
        let rate = self.rate.get();
        debug!("Re-applying rate {}", rate);
        self.notify(RateChange {
            previous: rate,
            current: rate,
            forced: true,
        });
    }

    fn notify(&self, change: RateChange) {
        // Snapshot so listeners can subscribe, unsubscribe, or change the rate
        let targets: Vec<Rc<dyn RateListener>> = {
            let listeners = self.listeners.borrow();
            self.order
                .borrow()
                .iter()
                .filter_map(|id| listeners.get(*id).cloned())
                .collect()
        };

        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);

        for listener in targets {
            listener.on_rate_change(change);
            if self.generation.get() != generation {
                // A listener changed the rate; the nested dispatch already
                // reached everyone with the newer change
                debug!("Rate change to {} superseded during dispatch", change.current);
                return;
            }
        }
    }
}

impl Default for RateHolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(holder: &RateHolder) -> Rc<RefCell<Vec<RateChange>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        holder.subscribe(Rc::new(move |change: RateChange| sink.borrow_mut().push(change)));
        seen
    }

    #[test]
    fn test_default_rate() {
        let holder = RateHolder::new();
        assert_eq!(holder.rate(), 1.0);
    }

    #[test]
    fn test_set_rate_notifies() {
        let holder = RateHolder::new();
        let seen = recorder(&holder);

        assert!(holder.set_rate(2.0));
        assert_eq!(holder.rate(), 2.0);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].previous, 1.0);
        assert_eq!(seen[0].current, 2.0);
        assert!(!seen[0].forced);
    }

    #[test]
    fn test_invalid_rates_rejected() {
        let holder = RateHolder::new();
        let seen = recorder(&holder);

        assert!(!holder.set_rate(0.0));
        assert!(!holder.set_rate(-5.0));
        assert!(!holder.set_rate(f64::NAN));
        assert!(!holder.set_rate(f64::INFINITY));

        assert_eq!(holder.rate(), 1.0);
        assert!(seen.borrow().is_empty());
        assert!(matches!(
            holder.try_set_rate(-5.0),
            Err(TimewarpError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_same_rate_is_noop() {
        let holder = RateHolder::new();
        let seen = recorder(&holder);

        assert!(holder.set_rate(3.0));
        assert!(!holder.set_rate(3.0));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_notification_order() {
        let holder = RateHolder::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = order.clone();
            holder.subscribe(Rc::new(move |_: RateChange| order.borrow_mut().push(tag)));
        }

        holder.set_rate(2.0);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe() {
        let holder = RateHolder::new();
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let id = holder.subscribe(Rc::new(move |_: RateChange| counter.set(counter.get() + 1)));

        holder.set_rate(2.0);
        assert!(holder.unsubscribe(id));
        assert!(!holder.unsubscribe(id));
        holder.set_rate(4.0);

        assert_eq!(seen.get(), 1);
        assert_eq!(holder.listener_count(), 0);
    }

    #[test]
    fn test_reapply_is_forced() {
        let holder = RateHolder::with_rate(2.0).unwrap();
        let seen = recorder(&holder);

        holder.reapply();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].previous, 2.0);
        assert_eq!(seen[0].current, 2.0);
        assert!(seen[0].forced);
    }

    #[test]
    fn test_listener_may_change_rate() {
        let holder = Rc::new(RateHolder::new());
        let inner = Rc::downgrade(&holder);
        holder.subscribe(Rc::new(move |change: RateChange| {
            // Clamp anything above 8x back down
            if change.current > 8.0 {
                if let Some(holder) = inner.upgrade() {
                    holder.set_rate(8.0);
                }
            }
        }));

        let seen = recorder(&holder);

        holder.set_rate(16.0);
        assert_eq!(holder.rate(), 8.0);

        // Later listeners end on the rate the holder settled on
        let seen = seen.borrow();
        assert_eq!(seen.last().map(|change| change.current), Some(8.0));
        assert!(seen.iter().all(|change| change.current != 16.0));
    }

    #[test]
    fn test_with_rate_validates() {
        assert!(RateHolder::with_rate(0.0).is_err());
        assert_eq!(RateHolder::with_rate(0.5).unwrap().rate(), 0.5);
    }
}
