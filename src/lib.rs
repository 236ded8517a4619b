//! # sigmut-hooks
//!
//! State helpers built on a small single-threaded reactive runtime.
//!
//! - [`ListState`]: a list with add / update / remove / sort operations that never mutate the current sequence.
//! - [`DebounceState`]: a value whose changes reach a callback only once they stop arriving.
//! - [`PersistedState`](storage::PersistedState): a value mirrored into a key-value store.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use sigmut_hooks::{core::Runtime, DebounceState, ListState, SortDirection};
//!
//! let mut rt = Runtime::with_manual_clock();
//!
//! let list = ListState::primitive([1, 2, 3]);
//! list.add([4], rt.ac());
//! list.add([1], rt.ac());
//! list.remove(&2, rt.ac());
//! list.sort(SortDirection::Desc, rt.ac());
//! assert_eq!(*list.items(&mut rt.sc()), [4, 3, 1]);
//!
//! let search = DebounceState::new(String::new(), |query, _ac| println!("search {query}"));
//! search.set("r".into(), rt.ac());
//! search.set("ru".into(), rt.ac());
//! search.set("rust".into(), rt.ac());
//! rt.advance(Duration::from_secs(1)); // prints "search rust" once
//! ```
pub mod core;
mod debounce;
mod effect;
mod list_state;
mod state;
pub mod storage;
mod subscription;
mod utils;

pub use crate::core::{spawn_action, ActionContext, SignalContext};
pub use debounce::*;
pub use effect::*;
pub use list_state::*;
pub use state::*;
pub use subscription::*;
