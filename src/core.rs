use std::{
    cell::RefCell,
    future::poll_fn,
    mem::{replace, take, transmute},
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
    thread::AccessError,
    time::{Duration, Instant},
};

use derive_ex::derive_ex;
use parse_display::Display;

use crate::utils::alarm::Alarm;

mod timers;

pub use timers::TimerHandle;
use timers::{Timer, TimerQueue};


thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::new());
}

struct Globals {
    is_runtime_exists: bool,
    clock: Clock,
    actions: Vec<Action>,
    tasks: Vec<Task>,
    timers: TimerQueue,
    waker: Option<Waker>,
    alarm: Option<Alarm>,
}
impl Globals {
    fn new() -> Self {
        Self {
            is_runtime_exists: false,
            clock: Clock::System,
            actions: Vec::new(),
            tasks: Vec::new(),
            timers: TimerQueue::new(),
            waker: None,
            alarm: None,
        }
    }
    fn with<T>(f: impl FnOnce(&mut Self) -> T) -> T {
        GLOBALS.with(|g| f(&mut g.borrow_mut()))
    }
    fn try_with<T>(f: impl FnOnce(&mut Self) -> T) -> Result<T, AccessError> {
        GLOBALS.try_with(|g| f(&mut g.borrow_mut()))
    }
    fn assert_exists(&self) {
        if !self.is_runtime_exists {
            panic!("`Runtime` is not created.");
        }
    }

    fn push_action(&mut self, action: Action) {
        self.assert_exists();
        self.actions.push(action);
        self.wake();
    }
    fn push_task(&mut self, task: Task) {
        self.assert_exists();
        self.tasks.push(task);
        self.wake();
    }
    fn push_timer(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        self.assert_exists();
        let deadline = self.clock.now() + delay;
        let handle = self.timers.insert(deadline, timer);
        self.wake();
        handle
    }
    fn pop_due_timer(&mut self, until: Instant) -> Option<(Instant, Timer)> {
        self.timers.pop_due(until)
    }

    fn poll_ready(&mut self, cx: &Context) -> Poll<()> {
        let deadline = self.timers.next_deadline();
        let is_timer_due = deadline.is_some_and(|d| d <= self.clock.now());
        if !self.actions.is_empty() || !self.tasks.is_empty() || is_timer_due {
            if let Some(alarm) = &self.alarm {
                alarm.clear();
            }
            return Poll::Ready(());
        }
        self.waker = Some(cx.waker().clone());
        match (self.clock, deadline) {
            (Clock::System, Some(deadline)) => {
                self.alarm
                    .get_or_insert_with(Alarm::new)
                    .set(deadline, cx.waker());
            }
            _ => {
                if let Some(alarm) = &self.alarm {
                    alarm.clear();
                }
            }
        }
        Poll::Pending
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    fn finish_runtime(&mut self) -> Leftovers {
        self.is_runtime_exists = false;
        self.clock = Clock::System;
        self.waker = None;
        Leftovers {
            _alarm: self.alarm.take(),
            _actions: take(&mut self.actions),
            _tasks: take(&mut self.tasks),
            _timers: self.timers.clear(),
        }
    }
}

/// Work still queued when a [`Runtime`] is dropped.
///
/// Dropped outside the globals borrow, since dropping a closure may cancel timers.
struct Leftovers {
    _alarm: Option<Alarm>,
    _actions: Vec<Action>,
    _tasks: Vec<Task>,
    _timers: Vec<Timer>,
}

/// Time source used by the timer queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Clock {
    /// Wall clock ([`Instant::now`]).
    #[display("system")]
    System,
    /// Clock that only moves when [`Runtime::advance`] is called.
    #[display("manual")]
    Manual(Instant),
}
impl Clock {
    fn now(&self) -> Instant {
        match self {
            Clock::System => Instant::now(),
            Clock::Manual(now) => *now,
        }
    }
}

/// Reactive runtime.
///
/// Owns the queues of actions, effect tasks and timers of the current thread.
/// Only one `Runtime` can exist in a thread at the same time.
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Runtime {
    actions_buffer: Vec<Action>,
    tasks_buffer: Vec<Task>,
}
impl Runtime {
    /// Create a runtime whose timers follow the system clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::System)
    }

    /// Create a runtime whose timers only advance with [`advance`](Self::advance).
    pub fn with_manual_clock() -> Self {
        Self::with_clock(Clock::Manual(Instant::now()))
    }

    fn with_clock(clock: Clock) -> Self {
        Globals::with(|g| {
            if replace(&mut g.is_runtime_exists, true) {
                panic!("Only one `Runtime` can exist in the same thread at the same time.");
            }
            g.clock = clock;
        });
        Self {
            actions_buffer: Vec::new(),
            tasks_buffer: Vec::new(),
        }
    }

    pub fn ac(&mut self) -> &mut ActionContext {
        ActionContext::new(self)
    }
    pub fn sc(&mut self) -> SignalContext<'_> {
        SignalContext {
            _rt: self,
            sink: None,
        }
    }
    pub(crate) fn sc_with_sink(&mut self, sink: Sink) -> SignalContext<'_> {
        SignalContext {
            _rt: self,
            sink: Some(sink),
        }
    }

    pub fn clock(&self) -> Clock {
        Globals::with(|g| g.clock)
    }

    /// Current time of the runtime clock.
    pub fn now(&self) -> Instant {
        Globals::with(|g| g.clock.now())
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        Globals::with(|g| g.timers.next_deadline())
    }

    /// Advance the manual clock by `duration`, firing every timer that falls due on the way.
    ///
    /// Timers fire in deadline order, and the clock reads each timer's deadline while it runs,
    /// so timers scheduled by a callback are measured from that point.
    ///
    /// # Panics
    ///
    /// Panics if the runtime uses the system clock.
    pub fn advance(&mut self, duration: Duration) -> bool {
        let target = match self.clock() {
            Clock::Manual(now) => now + duration,
            Clock::System => panic!("`Runtime::advance` requires a manual clock."),
        };
        let mut handled = false;
        while let Some((deadline, timer)) = Globals::with(|g| g.pop_due_timer(target)) {
            Globals::with(|g| g.clock = Clock::Manual(deadline));
            timer.fire(self.ac());
            handled = true;
        }
        Globals::with(|g| g.clock = Clock::Manual(target));
        handled
    }

    /// Perform scheduled actions.
    ///
    /// Returns `true` if any action was performed.
    pub fn run_actions(&mut self) -> bool {
        let mut handled = false;
        let mut actions = take(&mut self.actions_buffer);
        while Globals::with(|g| {
            std::mem::swap(&mut actions, &mut g.actions);
            !actions.is_empty()
        }) {
            for action in actions.drain(..) {
                action.call(self.ac());
                handled = true;
            }
        }
        self.actions_buffer = actions;
        handled
    }

    /// Fire timers whose deadline has passed on the runtime clock.
    ///
    /// Returns `true` if any timer was fired.
    pub fn run_timers(&mut self) -> bool {
        let mut handled = false;
        loop {
            let Some((_, timer)) = Globals::with(|g| {
                let now = g.clock.now();
                g.pop_due_timer(now)
            }) else {
                break;
            };
            timer.fire(self.ac());
            handled = true;
        }
        handled
    }

    /// Re-run effects whose dependencies have changed.
    ///
    /// Returns `true` if any task was performed.
    pub fn run_tasks(&mut self) -> bool {
        let mut tasks = take(&mut self.tasks_buffer);
        Globals::with(|g| std::mem::swap(&mut tasks, &mut g.tasks));
        let handled = !tasks.is_empty();
        for task in tasks.drain(..) {
            task.run(self);
        }
        self.tasks_buffer = tasks;
        handled
    }

    /// Repeat until there are no more processes to do
    /// [`run_actions`](Self::run_actions), [`run_timers`](Self::run_timers), or [`run_tasks`](Self::run_tasks).
    pub fn update(&mut self) {
        loop {
            if self.run_actions() {
                continue;
            }
            if self.run_timers() {
                continue;
            }
            if self.run_tasks() {
                continue;
            }
            break;
        }
    }

    /// Wait while there is no process to be executed by [`update`](Self::update).
    ///
    /// With the system clock, a background alarm wakes the caller at the next timer deadline.
    /// With a manual clock, timers never become due while waiting.
    pub async fn wait_for_ready(&mut self) {
        poll_fn(|cx| Globals::with(|g| g.poll_ready(cx))).await
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let leftovers = Globals::with(|g| g.finish_runtime());
        drop(leftovers);
    }
}

/// Identifies one evaluation of a sink.
///
/// A binding made during an older evaluation is stale and its notification is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindKey(pub(crate) u64);

pub trait BindSink: 'static {
    fn notify(self: Rc<Self>, key: BindKey);
}

#[derive(Clone)]
pub(crate) struct Sink {
    node: Weak<dyn BindSink>,
    key: BindKey,
}
impl Sink {
    pub(crate) fn new(node: Weak<dyn BindSink>, key: BindKey) -> Self {
        Self { node, key }
    }
    fn is_same_node(&self, other: &Sink) -> bool {
        Weak::ptr_eq(&self.node, &other.node)
    }
    fn notify(self) {
        if let Some(node) = self.node.upgrade() {
            node.notify(self.key);
        }
    }
}

/// Sinks that depend on a source.
#[derive(Default)]
pub(crate) struct SinkBindings(Vec<Sink>);

impl SinkBindings {
    pub fn new() -> Self {
        Self(Vec::new())
    }
    pub fn bind(&mut self, sc: &SignalContext) {
        let Some(sink) = &sc.sink else {
            return;
        };
        if let Some(bound) = self.0.iter_mut().find(|s| s.is_same_node(sink)) {
            bound.key = sink.key;
        } else {
            self.0.push(sink.clone());
        }
    }
    pub fn take(&mut self) -> Vec<Sink> {
        take(&mut self.0)
    }
    pub fn notify_all(sinks: Vec<Sink>) {
        for sink in sinks {
            sink.notify();
        }
    }
}

/// Context for retrieving state and tracking dependencies.
pub struct SignalContext<'s> {
    _rt: &'s mut Runtime,
    sink: Option<Sink>,
}

/// Context for changing state.
#[repr(transparent)]
pub struct ActionContext(Runtime);

impl ActionContext {
    fn new(rt: &mut Runtime) -> &mut Self {
        unsafe { transmute(rt) }
    }
    pub fn sc(&mut self) -> SignalContext<'_> {
        self.0.sc()
    }
    pub fn now(&self) -> Instant {
        self.0.now()
    }
}

/// Spawns a new action.
///
/// The action is performed by [`Runtime::run_actions`].
pub fn spawn_action(f: impl FnOnce(&mut ActionContext) + 'static) {
    Globals::with(|g| g.push_action(Action(Box::new(f))))
}

/// Schedules `f` to be called with an [`ActionContext`] once `delay` has elapsed on the runtime clock.
///
/// The returned handle can cancel the call while it is still pending.
pub fn schedule_timer(
    delay: Duration,
    f: impl FnOnce(&mut ActionContext) + 'static,
) -> TimerHandle {
    let handle = Globals::with(|g| g.push_timer(delay, Timer::new(f)));
    tracing::trace!(?delay, ?handle, "timer scheduled");
    handle
}

/// Cancels a pending timer.
///
/// Returns `false` if the timer has already fired or been cancelled.
pub fn cancel_timer(handle: TimerHandle) -> bool {
    let removed = Globals::try_with(|g| g.timers.remove(handle)).unwrap_or(None);
    let cancelled = removed.is_some();
    drop(removed);
    if cancelled {
        tracing::trace!(?handle, "timer cancelled");
    }
    cancelled
}

struct Action(Box<dyn FnOnce(&mut ActionContext)>);

impl Action {
    fn call(self, ac: &mut ActionContext) {
        (self.0)(ac)
    }
}

pub(crate) struct Task(Box<dyn FnOnce(&mut Runtime)>);

impl Task {
    pub fn new(f: impl FnOnce(&mut Runtime) + 'static) -> Self {
        Task(Box::new(f))
    }
    pub fn schedule(self) {
        Globals::with(|g| g.push_task(self))
    }
    fn run(self, rt: &mut Runtime) {
        (self.0)(rt)
    }
}
