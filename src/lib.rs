//! # rxbridge: listener-based event sources as observables
//!
//! Turns any widget-style `add_listener` / `remove_listener` pair into a
//! push-based [`Observable`] whose whole lifecycle (registration, delivery
//! and removal) is serialized on one dispatch thread.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxbridge::prelude::*;
//! use std::sync::{mpsc::channel, Arc};
//!
//! let scheduler = DispatchScheduler::new().unwrap();
//! let button = Arc::new(ListenerList::<&'static str>::new());
//! let (tx, rx) = channel();
//!
//! let clicks = from_events_of(
//!   &scheduler,
//!   &button,
//!   |b: &ListenerList<&'static str>, l| b.add(l),
//!   |b: &ListenerList<&'static str>, l| {
//!     b.remove(l);
//!   },
//!   |action| action.to_uppercase(),
//! )
//! .subscribe(move |action| tx.send(action).unwrap());
//!
//! let widget = button.clone();
//! scheduler.create_worker().schedule(move || widget.fire("ok"));
//! assert_eq!(rx.recv().unwrap(), "OK");
//!
//! clicks.dispose();
//! scheduler.dispose();
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DispatchScheduler`] | The one thread every listener operation runs on |
//! | [`Worker`] | Cancellable group of tasks on that thread |
//! | [`Observable`] | Push stream consumed by subscribing |
//! | [`Observer`] | Consumes `next`, `error`, and `complete` events |
//! | [`Disposable`] | Handle to stop an active subscription |
//!
//! [`DispatchScheduler`]: scheduler::DispatchScheduler
//! [`Worker`]: scheduler::Worker
//! [`Observable`]: observable::Observable
//! [`Observer`]: observer::Observer
//! [`Disposable`]: subscription::Disposable

pub mod error;
pub mod listener;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod scheduler;
pub mod subscription;
pub mod testing;

// Re-export the prelude module
pub use prelude::*;

#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
