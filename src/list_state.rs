use std::{
    cell::Ref,
    cmp::Ordering,
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, NaiveDateTime, TimeZone};
use derive_ex::derive_ex;
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

use crate::{ActionContext, SignalContext, State};


/// A value that denotes an instant in time.
///
/// Two date-like values are equal for [`Equality::Date`] when they denote the same
/// millisecond since the Unix epoch.
pub trait DateLike {
    fn epoch_millis(&self) -> i64;
}
impl<Tz: TimeZone> DateLike for DateTime<Tz> {
    fn epoch_millis(&self) -> i64 {
        self.timestamp_millis()
    }
}
impl DateLike for NaiveDateTime {
    fn epoch_millis(&self) -> i64 {
        self.and_utc().timestamp_millis()
    }
}
impl DateLike for SystemTime {
    fn epoch_millis(&self) -> i64 {
        match self.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
            Err(e) => {
                let before = e.duration().as_nanos().div_ceil(1_000_000);
                i64::try_from(before).map_or(i64::MIN, |ms| -ms)
            }
        }
    }
}

/// Decides whether two list items are the same logical item.
pub enum Equality<T> {
    /// `a == b`.
    Primitive(fn(&T, &T) -> bool),
    /// Same epoch millisecond.
    Date(fn(&T) -> i64),
    /// Same comparison key.
    Keyed(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T> Equality<T> {
    pub fn primitive() -> Self
    where
        T: PartialEq,
    {
        Self::Primitive(T::eq)
    }
    pub fn date() -> Self
    where
        T: DateLike,
    {
        Self::Date(T::epoch_millis)
    }
    pub fn keyed<K: PartialEq>(key: impl Fn(&T) -> K + 'static) -> Self {
        Self::Keyed(Rc::new(move |a, b| key(a) == key(b)))
    }

    pub fn is_equal(&self, a: &T, b: &T) -> bool {
        match self {
            Self::Primitive(eq) => eq(a, b),
            Self::Date(millis) => millis(a) == millis(b),
            Self::Keyed(eq) => eq(a, b),
        }
    }
}
impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Primitive(eq) => Self::Primitive(*eq),
            Self::Date(millis) => Self::Date(*millis),
            Self::Keyed(eq) => Self::Keyed(eq.clone()),
        }
    }
}
impl<T> std::fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive(_) => write!(f, "Primitive"),
            Self::Date(_) => write!(f, "Date"),
            Self::Keyed(_) => write!(f, "Keyed"),
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, FromStr, Serialize, Deserialize,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}
impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    /// Orders keys in this direction, with keys that do not compare with themselves
    /// (such as `NaN`) after all others in either direction.
    fn compare<K: PartialOrd>(self, a: &K, b: &K) -> Ordering {
        match (is_comparable(a), is_comparable(b)) {
            (true, true) => self.apply(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        }
    }
}

fn is_comparable<K: PartialOrd>(k: &K) -> bool {
    k.partial_cmp(k).is_some()
}

/// An observable list whose operations never mutate the current sequence.
///
/// Every operation installs a new `Rc<[T]>`, so a sequence obtained earlier stays unchanged
/// and `Rc::ptr_eq` tells whether a write has happened since.
///
/// Items are compared with the [`Equality`] chosen at construction.
#[derive_ex(Clone, bound())]
pub struct ListState<T: 'static> {
    items: State<Rc<[T]>>,
    equality: Equality<T>,
}

impl<T: 'static> ListState<T> {
    pub fn new(items: impl IntoIterator<Item = T>, equality: Equality<T>) -> Self {
        Self {
            items: State::new(items.into_iter().collect()),
            equality,
        }
    }

    /// List of values compared with `==`.
    pub fn primitive(items: impl IntoIterator<Item = T>) -> Self
    where
        T: PartialEq,
    {
        Self::new(items, Equality::primitive())
    }

    /// List of dates compared by instant.
    pub fn dates(items: impl IntoIterator<Item = T>) -> Self
    where
        T: DateLike,
    {
        Self::new(items, Equality::date())
    }

    /// List of objects compared by the key `key` selects.
    pub fn keyed<K: PartialEq>(
        items: impl IntoIterator<Item = T>,
        key: impl Fn(&T) -> K + 'static,
    ) -> Self {
        Self::new(items, Equality::keyed(key))
    }

    pub fn equality(&self) -> &Equality<T> {
        &self.equality
    }

    /// Gets the current sequence and adds a dependency on this list to the specified `SignalContext`.
    pub fn items(&self, sc: &mut SignalContext) -> Rc<[T]> {
        self.items.get(sc)
    }

    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> Ref<'a, Rc<[T]>> {
        self.items.borrow(sc)
    }

    pub fn items_untracked(&self) -> Rc<[T]> {
        self.items.borrow_untracked().clone()
    }

    /// Replaces the whole sequence.
    pub fn set(&self, items: impl IntoIterator<Item = T>, ac: &mut ActionContext) {
        self.items.set(items.into_iter().collect(), ac);
    }

    /// Replaces the whole sequence with the result of `f` applied to the current one.
    pub fn set_with<I>(&self, f: impl FnOnce(&[T]) -> I, ac: &mut ActionContext)
    where
        I: IntoIterator<Item = T>,
    {
        self.items.update(|prev| f(prev).into_iter().collect(), ac);
    }

    /// Appends the items that are not equal to any item already in the list.
    ///
    /// Incoming items are only checked against the existing items, not against each other.
    pub fn add(&self, items: impl IntoIterator<Item = T>, ac: &mut ActionContext)
    where
        T: Clone,
    {
        let eq = &self.equality;
        self.set_with(
            |prev| {
                let added = items
                    .into_iter()
                    .filter(|item| !prev.iter().any(|x| eq.is_equal(x, item)))
                    .collect::<Vec<_>>();
                prev.iter().cloned().chain(added).collect::<Vec<_>>()
            },
            ac,
        );
    }

    /// Replaces the first item equal to `item`, keeping its position.
    pub fn update(&self, item: T, ac: &mut ActionContext)
    where
        T: Clone,
    {
        let eq = &self.equality;
        self.set_with(
            |prev| {
                let mut next = prev.to_vec();
                if let Some(index) = next.iter().position(|x| eq.is_equal(x, &item)) {
                    next[index] = item;
                }
                next
            },
            ac,
        );
    }

    /// Removes every item equal to `item`.
    pub fn remove(&self, item: &T, ac: &mut ActionContext)
    where
        T: Clone,
    {
        let eq = &self.equality;
        self.set_with(
            |prev| {
                prev.iter()
                    .filter(|x| !eq.is_equal(x, item))
                    .cloned()
                    .collect::<Vec<_>>()
            },
            ac,
        );
    }

    /// Sorts the items themselves.
    ///
    /// The sort is not stable. Items that do not compare with themselves, such as `NaN`,
    /// are placed last.
    pub fn sort(&self, direction: SortDirection, ac: &mut ActionContext)
    where
        T: Clone + PartialOrd,
    {
        self.sort_by_key(direction, |item| item.clone(), ac)
    }

    /// Sorts the items by the key `key` selects.
    ///
    /// The sort is not stable. Items whose key does not compare with itself, such as `NaN`,
    /// are placed last.
    pub fn sort_by_key<K: PartialOrd>(
        &self,
        direction: SortDirection,
        key: impl Fn(&T) -> K,
        ac: &mut ActionContext,
    ) where
        T: Clone,
    {
        self.set_with(
            |prev| {
                let mut next = prev.to_vec();
                next.sort_unstable_by(|a, b| direction.compare(&key(a), &key(b)));
                next
            },
            ac,
        );
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ListState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListState")
            .field("items", &self.items)
            .field("equality", &self.equality)
            .finish()
    }
}
