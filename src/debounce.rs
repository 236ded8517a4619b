use std::{
    cell::{Ref, RefCell},
    rc::{Rc, Weak},
    time::Duration,
};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use crate::{
    core::{schedule_timer, TimerHandle},
    ActionContext, SignalContext, State,
};


pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Settings of a [`DebounceState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceOptions {
    /// Quiet period in milliseconds required before the callback is called.
    pub delay_ms: u64,
}
impl DebounceOptions {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
impl Default for DebounceOptions {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DELAY.as_millis() as u64,
        }
    }
}

type Callback<T> = Box<dyn FnMut(T, &mut ActionContext)>;

/// A state whose changes are reported to a callback only after they stop arriving.
///
/// The value itself changes immediately on every [`set`](Self::set).
/// The callback is called once with the latest value when no further change has happened for
/// the delay, or right away on [`flush`](Self::flush). [`cancel`](Self::cancel) drops the pending call.
///
/// The pending call is cancelled when the last clone of the `DebounceState` is dropped.
#[derive_ex(Clone, bound())]
pub struct DebounceState<T: 'static>(Rc<DebounceNode<T>>);

impl<T: Clone + 'static> DebounceState<T> {
    /// Create a `DebounceState` with the default delay of one second.
    pub fn new(value: T, callback: impl FnMut(T, &mut ActionContext) + 'static) -> Self {
        Self::with_delay(value, DEFAULT_DELAY, callback)
    }

    pub fn with_options(
        value: T,
        options: DebounceOptions,
        callback: impl FnMut(T, &mut ActionContext) + 'static,
    ) -> Self {
        Self::with_delay(value, options.delay(), callback)
    }

    pub fn with_delay(
        value: T,
        delay: Duration,
        callback: impl FnMut(T, &mut ActionContext) + 'static,
    ) -> Self {
        Self(Rc::new(DebounceNode {
            value: State::new(value),
            delay,
            pending: RefCell::new(None),
            callback: RefCell::new(Some(Box::new(callback))),
        }))
    }

    /// Gets the current value and adds a dependency on this state to the specified `SignalContext`.
    pub fn get(&self, sc: &mut SignalContext) -> T {
        self.0.value.get(sc)
    }

    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> Ref<'a, T> {
        self.0.value.borrow(sc)
    }

    pub fn delay(&self) -> Duration {
        self.0.delay
    }

    /// Returns `true` while a callback is waiting for the delay to elapse.
    pub fn is_pending(&self) -> bool {
        self.0.pending.borrow().is_some()
    }

    /// Sets the value and restarts the delay.
    pub fn set(&self, value: T, ac: &mut ActionContext) {
        self.0.value.set(value.clone(), ac);
        self.0.arm(value);
    }

    /// Sets the value to the result of `f` applied to the current value and restarts the delay.
    pub fn update(&self, f: impl FnOnce(&T) -> T, ac: &mut ActionContext) {
        let value = f(&self.0.value.borrow_untracked());
        self.set(value, ac);
    }

    /// Calls the callback now with the pending value instead of waiting for the delay.
    ///
    /// Does nothing if no call is pending, or if called from inside the callback.
    pub fn flush(&self, ac: &mut ActionContext) {
        if self.0.is_calling() {
            return;
        }
        let pending = self.0.pending.borrow_mut().take();
        if let Some(pending) = pending {
            pending.timer.cancel();
            tracing::debug!(delay = ?self.0.delay, "debounce flushed");
            self.0.call(pending.value, ac);
        }
    }

    /// Drops the pending call without calling the callback.
    ///
    /// The value is kept.
    pub fn cancel(&self) {
        if self.0.disarm() {
            tracing::debug!(delay = ?self.0.delay, "debounce cancelled");
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DebounceState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceState")
            .field("value", &self.0.value)
            .field("delay", &self.0.delay)
            .field("is_pending", &self.0.pending.borrow().is_some())
            .finish()
    }
}

struct Pending<T> {
    value: T,
    timer: TimerHandle,
}

struct DebounceNode<T: 'static> {
    value: State<T>,
    delay: Duration,
    pending: RefCell<Option<Pending<T>>>,
    callback: RefCell<Option<Callback<T>>>,
}

impl<T: 'static> DebounceNode<T> {
    fn arm(self: &Rc<Self>, value: T) {
        let this = Rc::downgrade(self);
        let timer = schedule_timer(self.delay, move |ac| Self::fire(this, ac));
        let old = self.pending.borrow_mut().replace(Pending { value, timer });
        if let Some(old) = old {
            old.timer.cancel();
        }
    }
    fn disarm(&self) -> bool {
        let pending = self.pending.borrow_mut().take();
        match pending {
            Some(pending) => {
                pending.timer.cancel();
                true
            }
            None => false,
        }
    }
    fn fire(this: Weak<Self>, ac: &mut ActionContext) {
        let Some(this) = this.upgrade() else {
            return;
        };
        let pending = this.pending.borrow_mut().take();
        if let Some(pending) = pending {
            tracing::trace!(delay = ?this.delay, "debounce elapsed");
            this.call(pending.value, ac);
        }
    }

    fn is_calling(&self) -> bool {
        self.callback.borrow().is_none()
    }
    fn call(&self, value: T, ac: &mut ActionContext) {
        let callback = self.callback.borrow_mut().take();
        if let Some(mut callback) = callback {
            callback(value, ac);
            *self.callback.borrow_mut() = Some(callback);
        }
    }
}

impl<T: 'static> Drop for DebounceNode<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.timer.cancel();
        }
    }
}
