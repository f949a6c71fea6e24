//! Bookkeeping for outstanding timers

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use std::time::Duration;
use timewarp_core::{scale_duration, TimerCallback, TimerHandle};

new_key_type! {
    pub(crate) struct EntryKey;
}

/// Whether a timer fires once or repeatedly
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    Once,
    Repeating,
}

/// One outstanding timer
pub(crate) struct PendingTimer {
    pub kind: TimerKind,
    /// Stable identifier handed to the caller
    pub id: TimerHandle,
    /// Underlying handle currently armed with the host
    pub handle: TimerHandle,
    /// Delay or period as requested, in scaled time
    pub requested: Duration,
    /// `1 / rate` when last armed
    pub scale: f64,
    /// Real time when last armed
    pub armed_at: Duration,
    /// Real delay it was last armed for
    pub armed_delay: Duration,
    /// Wrapped callback, re-used on every re-arm
    pub fire: TimerCallback,
}

impl PendingTimer {
    /// Real delay to arm with after switching to `new_scale` at `now`.
    ///
    /// One-shot timers keep the scaled time they still owe. Repeating timers
    /// restart a full period.
    pub fn rearm_delay(&self, now: Duration, new_scale: f64) -> Duration {
        match self.kind {
            TimerKind::Once => {
                let elapsed = now.saturating_sub(self.armed_at);
                let remaining = self.armed_delay.saturating_sub(elapsed);
                scale_duration(remaining, new_scale / self.scale)
            }
            TimerKind::Repeating => scale_duration(self.requested, new_scale),
        }
    }

    pub fn info(&self) -> PendingInfo {
        PendingInfo {
            id: self.id,
            handle: self.handle,
            kind: self.kind,
            requested: self.requested,
            armed_at: self.armed_at,
            armed_delay: self.armed_delay,
        }
    }
}

/// Read-only view of a pending timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingInfo {
    pub id: TimerHandle,
    pub handle: TimerHandle,
    pub kind: TimerKind,
    pub requested: Duration,
    pub armed_at: Duration,
    pub armed_delay: Duration,
}

impl PendingInfo {
    /// Real time at which the current arming fires
    pub fn due_at(&self) -> Duration {
        self.armed_at.saturating_add(self.armed_delay)
    }
}

/// Entries indexed by stable id and by current underlying handle
#[derive(Default)]
pub(crate) struct Bookkeeping {
    entries: SlotMap<EntryKey, PendingTimer>,
    by_id: FxHashMap<TimerHandle, EntryKey>,
    by_handle: FxHashMap<TimerHandle, EntryKey>,
}

impl Bookkeeping {
    pub fn insert(&mut self, timer: PendingTimer) {
        let id = timer.id;
        let handle = timer.handle;
        let key = self.entries.insert(timer);
        self.by_id.insert(id, key);
        self.by_handle.insert(handle, key);
    }

    /// Find by stable id first, then by current handle
    fn key_for(&self, id_or_handle: TimerHandle) -> Option<EntryKey> {
        self.by_id
            .get(&id_or_handle)
            .or_else(|| self.by_handle.get(&id_or_handle))
            .copied()
    }

    pub fn get(&self, id_or_handle: TimerHandle) -> Option<&PendingTimer> {
        self.key_for(id_or_handle)
            .and_then(|key| self.entries.get(key))
    }

    pub fn remove(&mut self, id_or_handle: TimerHandle) -> Option<PendingTimer> {
        let key = self.key_for(id_or_handle)?;
        let timer = self.entries.remove(key)?;
        self.by_id.remove(&timer.id);
        self.by_handle.remove(&timer.handle);
        Some(timer)
    }

    /// Point an entry at a freshly armed underlying handle
    pub fn rehandle(&mut self, key: EntryKey, handle: TimerHandle) {
        if let Some(timer) = self.entries.get_mut(key) {
            self.by_handle.remove(&timer.handle);
            timer.handle = handle;
            self.by_handle.insert(handle, key);
        }
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.entries.keys().collect()
    }

    pub fn entry_mut(&mut self, key: EntryKey) -> Option<&mut PendingTimer> {
        self.entries.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingTimer> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn timer(kind: TimerKind, id: u64, requested_ms: u64, scale: f64) -> PendingTimer {
        let requested = Duration::from_millis(requested_ms);
        PendingTimer {
            kind,
            id: TimerHandle(id),
            handle: TimerHandle(id),
            requested,
            scale,
            armed_at: Duration::ZERO,
            armed_delay: scale_duration(requested, scale),
            fire: Rc::new(|| {}),
        }
    }

    #[test]
    fn test_once_keeps_remaining_scaled_time() {
        let t = timer(TimerKind::Once, 1, 1000, 1.0);
        // 400ms in, switching to 2x: 600 owed, 300 real
        assert_eq!(
            t.rearm_delay(Duration::from_millis(400), 0.5),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn test_once_overdue_rearms_immediately() {
        let t = timer(TimerKind::Once, 1, 100, 1.0);
        assert_eq!(t.rearm_delay(Duration::from_millis(500), 0.25), Duration::ZERO);
    }

    #[test]
    fn test_repeating_restarts_full_period() {
        let t = timer(TimerKind::Repeating, 1, 1000, 1.0);
        assert_eq!(
            t.rearm_delay(Duration::from_millis(999), 0.25),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_lookup_by_id_or_handle() {
        let mut book = Bookkeeping::default();
        book.insert(timer(TimerKind::Once, 7, 100, 1.0));

        let key = book.keys()[0];
        book.rehandle(key, TimerHandle(12));

        assert_eq!(book.get(TimerHandle(7)).map(|t| t.handle), Some(TimerHandle(12)));
        assert_eq!(book.get(TimerHandle(12)).map(|t| t.id), Some(TimerHandle(7)));

        let removed = book.remove(TimerHandle(12)).unwrap();
        assert_eq!(removed.id, TimerHandle(7));
        assert_eq!(book.len(), 0);
        assert!(book.get(TimerHandle(7)).is_none());
    }
}
