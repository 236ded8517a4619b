use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    task::Waker,
    thread,
    time::Instant,
};


/// Wakes one waker at one deadline on the system clock.
///
/// Each alarm owns a background thread that exits when the alarm is dropped.
/// Setting the alarm again replaces both the deadline and the waker.
pub(crate) struct Alarm(Arc<Shared>);

struct Shared {
    slot: Mutex<Slot>,
    condvar: Condvar,
}

#[derive(Default)]
struct Slot {
    deadline: Option<Instant>,
    waker: Option<Waker>,
    is_closed: bool,
}

impl Alarm {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            condvar: Condvar::new(),
        });
        let worker = shared.clone();
        thread::spawn(move || worker.run());
        Self(shared)
    }

    pub fn set(&self, deadline: Instant, waker: &Waker) {
        let mut slot = self.0.lock();
        if !slot.waker.as_ref().is_some_and(|w| w.will_wake(waker)) {
            slot.waker = Some(waker.clone());
        }
        if slot.deadline != Some(deadline) {
            slot.deadline = Some(deadline);
            self.0.condvar.notify_one();
        }
    }

    pub fn clear(&self) {
        let mut slot = self.0.lock();
        slot.deadline = None;
        slot.waker = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.0.lock().deadline
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.0.lock().is_closed = true;
        self.0.condvar.notify_one();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        let mut slot = self.lock();
        while !slot.is_closed {
            let Some(deadline) = slot.deadline else {
                slot = self
                    .condvar
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let now = Instant::now();
            if deadline > now {
                slot = self
                    .condvar
                    .wait_timeout(slot, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }
            slot.deadline = None;
            let waker = slot.waker.take();
            drop(slot);
            if let Some(waker) = waker {
                waker.wake();
            }
            slot = self.lock();
        }
    }
}
