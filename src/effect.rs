use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use crate::{
    core::{BindKey, BindSink, Runtime, Sink, Task},
    SignalContext, Subscription,
};


/// Call a function each time a dependency changes.
///
/// The function is first called by the next [`Runtime::run_tasks`], and again by the
/// `run_tasks` following each change of a state it read through the [`SignalContext`].
///
/// If the [`Subscription`] returned from this function is dropped, the function will not be called again.
pub fn effect(f: impl FnMut(&mut SignalContext) + 'static) -> Subscription {
    let node = EffectNode::new(f);
    node.schedule();
    Subscription::from_rc(node)
}

struct EffectNode<F> {
    f: RefCell<F>,
    key: Cell<BindKey>,
    is_scheduled: Cell<bool>,
}
impl<F> EffectNode<F>
where
    F: FnMut(&mut SignalContext) + 'static,
{
    fn new(f: F) -> Rc<Self> {
        Rc::new(Self {
            f: RefCell::new(f),
            key: Cell::new(BindKey(0)),
            is_scheduled: Cell::new(false),
        })
    }

    fn schedule(self: &Rc<Self>) {
        if self.is_scheduled.replace(true) {
            return;
        }
        let this = Rc::downgrade(self);
        Task::new(move |rt| {
            if let Some(this) = this.upgrade() {
                this.call(rt);
            }
        })
        .schedule()
    }
    fn call(self: Rc<Self>, rt: &mut Runtime) {
        self.is_scheduled.set(false);
        let key = BindKey(self.key.get().0 + 1);
        self.key.set(key);
        let node = Rc::downgrade(&self);
        let node: Weak<dyn BindSink> = node;
        let mut sc = rt.sc_with_sink(Sink::new(node, key));
        (&mut *self.f.borrow_mut())(&mut sc);
    }
}

impl<F> BindSink for EffectNode<F>
where
    F: FnMut(&mut SignalContext) + 'static,
{
    fn notify(self: Rc<Self>, key: BindKey) {
        if key == self.key.get() {
            self.schedule();
        }
    }
}
