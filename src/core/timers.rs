use std::{collections::BTreeMap, time::Instant};

use super::ActionContext;

/// Handle of a timer scheduled with [`schedule_timer`](super::schedule_timer).
///
/// Handles are never reused, so a handle whose timer has fired or been cancelled stays inert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(Key);

impl TimerHandle {
    /// Cancels the timer.
    ///
    /// Returns `false` if the timer has already fired or been cancelled.
    pub fn cancel(self) -> bool {
        super::cancel_timer(self)
    }

    /// Returns `true` while the timer is still waiting to fire.
    pub fn is_pending(&self) -> bool {
        super::Globals::try_with(|g| g.timers.contains(*self)).unwrap_or(false)
    }

    pub fn deadline(&self) -> Instant {
        self.0.deadline
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Key {
    deadline: Instant,
    seq: u64,
}

pub(super) struct Timer(Box<dyn FnOnce(&mut ActionContext)>);

impl Timer {
    pub fn new(f: impl FnOnce(&mut ActionContext) + 'static) -> Self {
        Self(Box::new(f))
    }
    pub fn fire(self, ac: &mut ActionContext) {
        (self.0)(ac)
    }
}

/// Pending timers ordered by deadline, then by scheduling order.
pub(super) struct TimerQueue {
    next_seq: u64,
    timers: BTreeMap<Key, Timer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            timers: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, deadline: Instant, timer: Timer) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq = self
            .next_seq
            .checked_add(1)
            .expect("timer sequence overflow");
        let key = Key { deadline, seq };
        self.timers.insert(key, timer);
        TimerHandle(key)
    }

    pub fn remove(&mut self, handle: TimerHandle) -> Option<Timer> {
        self.timers.remove(&handle.0)
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle.0)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.first_key_value().map(|(key, _)| key.deadline)
    }

    /// Removes the earliest timer if it is due at `until`.
    pub fn pop_due(&mut self, until: Instant) -> Option<(Instant, Timer)> {
        let entry = self.timers.first_entry()?;
        if entry.key().deadline > until {
            return None;
        }
        let key = *entry.key();
        let timer = entry.remove();
        tracing::trace!(seq = key.seq, "timer due");
        Some((key.deadline, timer))
    }

    /// Removes every timer, leaving the sequence counter intact.
    pub fn clear(&mut self) -> Vec<Timer> {
        std::mem::take(&mut self.timers).into_values().collect()
    }
}
