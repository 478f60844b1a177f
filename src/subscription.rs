//! Disposable handles and the subscription state machine
//!
//! A subscription moves from `ACTIVE` to `DISPOSED` exactly once. Every
//! teardown path (the consumer calling `dispose`, an error, an observer
//! failure) races on the same [`DisposeFlag`], and only the winner performs
//! the actual teardown.

use std::sync::atomic::{AtomicBool, Ordering};

/// A handle to something that can be torn down.
///
/// `dispose` takes `&self` and must be idempotent: calling it zero, one or
/// many times, from any thread, is always safe.
pub trait Disposable {
  /// Request teardown. Only the first call has any effect.
  fn dispose(&self);

  /// Whether teardown has already been requested.
  fn is_disposed(&self) -> bool;

  /// Activates "RAII" behavior for this handle: `dispose()` is called as soon
  /// as the returned guard goes out of scope.
  ///
  /// **Attention:** If you don't assign the return value to a variable,
  /// `dispose()` is called immediately, which is probably not what you want!
  fn dispose_when_dropped(self) -> DisposableGuard<Self>
  where
    Self: Sized,
  {
    DisposableGuard(self)
  }
}

impl<T: Disposable + ?Sized> Disposable for Box<T> {
  #[inline]
  fn dispose(&self) { (**self).dispose() }

  #[inline]
  fn is_disposed(&self) -> bool { (**self).is_disposed() }
}

/// The `ACTIVE → DISPOSED` transition as a single atomic boolean.
#[derive(Debug, Default)]
pub struct DisposeFlag(AtomicBool);

impl DisposeFlag {
  pub fn new() -> Self { Self::default() }

  /// Move to `DISPOSED`. Returns `true` only for the call that performed the
  /// transition; every other call, concurrent or later, gets `false`.
  #[inline]
  pub fn dispose(&self) -> bool {
    self.0.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
  }

  #[inline]
  pub fn is_disposed(&self) -> bool { self.0.load(Ordering::Acquire) }
}

/// An RAII implementation of a "scoped subscription". When this structure is
/// dropped (falls out of scope), the handle is disposed.
///
/// If you want to drop it immediately, wrap it in its own scope
#[derive(Debug)]
#[must_use]
pub struct DisposableGuard<T: Disposable>(T);

impl<T: Disposable> DisposableGuard<T> {
  /// Wraps an existing handle with a guard to enable RAII behavior for it.
  pub fn new(disposable: T) -> DisposableGuard<T> { DisposableGuard(disposable) }

  /// Access the guarded handle without releasing the guard.
  pub fn inner(&self) -> &T { &self.0 }
}

impl<T: Disposable> Drop for DisposableGuard<T> {
  #[inline]
  fn drop(&mut self) { self.0.dispose() }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use super::*;

  struct Counting {
    flag: DisposeFlag,
    teardowns: Arc<AtomicUsize>,
  }

  impl Disposable for Counting {
    fn dispose(&self) {
      if self.flag.dispose() {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
      }
    }

    fn is_disposed(&self) -> bool { self.flag.is_disposed() }
  }

  #[test]
  fn flag_transitions_once() {
    let flag = DisposeFlag::new();
    assert!(!flag.is_disposed());
    assert!(flag.dispose());
    assert!(flag.is_disposed());
    for _ in 0..10 {
      assert!(!flag.dispose());
    }
  }

  #[test]
  fn concurrent_dispose_has_one_winner() {
    let flag = Arc::new(DisposeFlag::new());
    let winners = Arc::new(AtomicUsize::new(0));
    let threads: Vec<_> = (0..8)
      .map(|_| {
        let flag = flag.clone();
        let winners = winners.clone();
        std::thread::spawn(move || {
          if flag.dispose() {
            winners.fetch_add(1, Ordering::SeqCst);
          }
        })
      })
      .collect();
    for t in threads {
      t.join().unwrap();
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn guard_disposes_on_drop() {
    let teardowns = Arc::new(AtomicUsize::new(0));
    {
      let _guard = Counting { flag: DisposeFlag::new(), teardowns: teardowns.clone() }
        .dispose_when_dropped();
      assert_eq!(teardowns.load(Ordering::SeqCst), 0);
    }
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn boxed_disposable_forwards() {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let boxed: Box<dyn Disposable> =
      Box::new(Counting { flag: DisposeFlag::new(), teardowns: teardowns.clone() });
    assert!(!boxed.is_disposed());
    boxed.dispose();
    boxed.dispose();
    assert!(boxed.is_disposed());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
  }
}
