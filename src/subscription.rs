use std::{any::Any, rc::Rc};

/// Keeps a subscription alive.
///
/// Dropping it stops the subscribed function from being called again.
#[derive(Default)]
#[must_use]
pub struct Subscription(#[allow(unused)] Option<Rc<dyn Any>>);

impl Subscription {
    pub(crate) fn from_rc(rc: Rc<dyn Any>) -> Self {
        Subscription(Some(rc))
    }
}
