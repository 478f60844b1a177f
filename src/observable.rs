//! Observable trait and the subscribe entry points
//!
//! An [`Observable`] is consumed by subscribing: it hands its events to an
//! [`Observer`] and returns a [`Disposable`] handle that stops them.
//! [`ObservableExt`] adds the closure-based `subscribe` helpers and the
//! operators this crate ships (`filter`).
pub mod from_event;

pub use from_event::{from_events_of, EventSubscription, FromEvent};
pub use crate::ops::filter::FilterOp;

use crate::{
  observer::{FnMutObserver, Observer, ObserverAll},
  subscription::Disposable,
};

/// A push-based stream of `Item`s that may fail with `Err`.
pub trait Observable: Sized {
  type Item;
  type Err;
  type Unsub: Disposable;

  /// Subscribe `observer` to this stream.
  fn actual_subscribe<O>(self, observer: O) -> Self::Unsub
  where
    O: Observer<Self::Item, Self::Err> + Send + 'static;
}

pub trait ObservableExt: Observable {
  /// Subscribe with a `next` handler only; errors and completion are dropped.
  fn subscribe<N>(self, next: N) -> Self::Unsub
  where
    N: FnMut(Self::Item) + Send + 'static,
  {
    self.actual_subscribe(FnMutObserver(next))
  }

  /// Subscribe with one handler per channel.
  fn subscribe_all<N, E, C>(self, next: N, error: E, complete: C) -> Self::Unsub
  where
    N: FnMut(Self::Item) + Send + 'static,
    E: FnOnce(Self::Err) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    self.actual_subscribe(ObserverAll::new(next, error, complete))
  }

  /// Emit only those items that pass `filter`.
  ///
  /// # Example
  /// ```
  /// use rxbridge::prelude::*;
  /// use std::sync::{mpsc::channel, Arc};
  ///
  /// let scheduler = DispatchScheduler::new().unwrap();
  /// let button = Arc::new(ListenerList::<u32>::new());
  /// let (tx, rx) = channel();
  ///
  /// let _sub = from_events_of(
  ///   &scheduler,
  ///   &button,
  ///   |b: &ListenerList<u32>, l| b.add(l),
  ///   |b: &ListenerList<u32>, l| {
  ///     b.remove(l);
  ///   },
  ///   |clicks| clicks,
  /// )
  /// .filter(|clicks| *clicks >= 2)
  /// .subscribe(move |clicks| tx.send(clicks).unwrap());
  ///
  /// let fire = button.clone();
  /// scheduler.create_worker().schedule(move || {
  ///   fire.fire(1);
  ///   fire.fire(2);
  /// });
  /// assert_eq!(rx.recv().unwrap(), 2);
  /// scheduler.dispose();
  /// ```
  fn filter<F>(self, filter: F) -> FilterOp<Self, F>
  where
    F: Fn(&Self::Item) -> bool + Send + 'static,
  {
    FilterOp::new(self, filter)
  }
}

impl<T: Observable> ObservableExt for T {}
