//! Listener values handed to native event targets
//!
//! A [`Listener`] is the forwarding function a widget keeps in its listener
//! list. Listeners compare by identity, so `remove_listener` can find the
//! exact value `add_listener` was given. [`ListenerList`] is a ready-made
//! listener store for widget implementations.

use std::{
  fmt::{Debug, Formatter},
  sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

type ListenerFn<P> = dyn Fn(P) + Send + Sync;

/// A forwarding function registered with an event target.
pub struct Listener<P>(Arc<ListenerFn<P>>);

impl<P> Listener<P> {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(P) + Send + Sync + 'static,
  {
    Listener(Arc::new(f))
  }

  /// Invoke the listener with a native callback payload.
  #[inline]
  pub fn call(&self, payload: P) { (self.0)(payload) }

  /// Whether both values are the same registered listener.
  #[inline]
  pub fn same(&self, other: &Self) -> bool {
    Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(&other.0) as *const ()
  }

  pub(crate) fn downgrade(&self) -> WeakListener<P> { WeakListener(Arc::downgrade(&self.0)) }
}

impl<P> Clone for Listener<P> {
  #[inline]
  fn clone(&self) -> Self { Listener(self.0.clone()) }
}

impl<P> PartialEq for Listener<P> {
  fn eq(&self, other: &Self) -> bool { self.same(other) }
}

impl<P> Eq for Listener<P> {}

impl<P> Debug for Listener<P> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Listener").field(&(Arc::as_ptr(&self.0) as *const ())).finish()
  }
}

/// Non-owning reference to a listener; the target's list owns it.
pub(crate) struct WeakListener<P>(Weak<ListenerFn<P>>);

impl<P> WeakListener<P> {
  pub(crate) fn upgrade(&self) -> Option<Listener<P>> { self.0.upgrade().map(Listener) }
}

/// Listener storage for widget implementations.
///
/// `fire` iterates over a snapshot, so a listener may add or remove
/// listeners (including itself) while being called.
pub struct ListenerList<P> {
  listeners: Mutex<Vec<Listener<P>>>,
}

impl<P> Default for ListenerList<P> {
  fn default() -> Self { ListenerList { listeners: Mutex::new(Vec::new()) } }
}

impl<P> ListenerList<P> {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, Vec<Listener<P>>> {
    self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn add(&self, listener: Listener<P>) { self.lock().push(listener); }

  /// Remove `listener`. Returns `false` if it was not registered.
  pub fn remove(&self, listener: &Listener<P>) -> bool {
    let mut listeners = self.lock();
    match listeners.iter().position(|l| l.same(listener)) {
      Some(idx) => {
        listeners.remove(idx);
        true
      }
      None => false,
    }
  }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.lock().is_empty() }

  /// Call every registered listener with `payload`, in registration order.
  pub fn fire(&self, payload: P)
  where
    P: Clone,
  {
    let snapshot = self.lock().clone();
    for listener in snapshot {
      listener.call(payload.clone());
    }
  }
}

impl<P> Debug for ListenerList<P> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ListenerList").field("len", &self.len()).finish()
  }
}
