use std::{
    cell::{Ref, RefCell},
    rc::Rc,
};

use derive_ex::derive_ex;

use crate::core::{ActionContext, SignalContext, SinkBindings};

#[cfg(test)]
mod tests;

/// Similar to `Rc<RefCell<T>>`, but with added functionality to observe changes.
///
/// Reading with a [`SignalContext`] registers a dependency, and writing with an
/// [`ActionContext`] schedules every dependent [`effect`](crate::effect) to run again.
#[derive(Default)]
#[derive_ex(Clone, bound())]
pub struct State<T: 'static>(Rc<StateNode<T>>);

impl<T: 'static> State<T> {
    /// Create a new `State` with the given initial value.
    pub fn new(value: T) -> Self {
        Self(Rc::new(StateNode {
            sinks: RefCell::new(SinkBindings::new()),
            value: RefCell::new(value),
        }))
    }

    /// Obtains a reference to the current value and adds a dependency on this `State` to the specified `SignalContext`.
    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> Ref<'a, T> {
        self.0.sinks.borrow_mut().bind(sc);
        self.0.value.borrow()
    }

    /// Gets the current value and adds a dependency on this `State` to the specified `SignalContext`.
    pub fn get(&self, sc: &mut SignalContext) -> T
    where
        T: Clone,
    {
        self.borrow(sc).clone()
    }

    /// Obtains a reference to the current value without adding a dependency.
    pub fn borrow_untracked(&self) -> Ref<'_, T> {
        self.0.value.borrow()
    }

    /// Sets the value of the state and notifies the dependencies.
    pub fn set(&self, value: T, ac: &mut ActionContext) {
        *self.0.value.borrow_mut() = value;
        self.0.notify(ac);
    }

    /// Replaces the value with the result of `f` applied to the current value and notifies the dependencies.
    pub fn update(&self, f: impl FnOnce(&T) -> T, ac: &mut ActionContext) {
        let value = f(&self.0.value.borrow());
        self.set(value, ac);
    }

    /// Sets the value of the state and notifies the dependencies only if the current state is different from the specified value.
    pub fn set_dedup(&self, value: T, ac: &mut ActionContext)
    where
        T: PartialEq,
    {
        let changed = {
            let mut this_value = self.0.value.borrow_mut();
            if *this_value != value {
                *this_value = value;
                true
            } else {
                false
            }
        };
        if changed {
            self.0.notify(ac);
        }
    }
}
impl<T: std::fmt::Debug> std::fmt::Debug for State<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => std::fmt::Debug::fmt(&*value, f),
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}

#[derive(Default)]
struct StateNode<T: 'static> {
    sinks: RefCell<SinkBindings>,
    value: RefCell<T>,
}
impl<T: 'static> StateNode<T> {
    fn notify(&self, _ac: &mut ActionContext) {
        let sinks = self.sinks.borrow_mut().take();
        SinkBindings::notify_all(sinks);
    }
}
