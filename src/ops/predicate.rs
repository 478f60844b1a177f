//! Stateless predicates for narrowing an event stream.
//!
//! Event types that carry a discriminating kind implement [`EventKind`];
//! [`of_kind`] then builds a predicate usable with
//! [`filter`](crate::observable::ObservableExt::filter). Predicates combine
//! with [`and`], [`or`] and [`not`].

/// An event that belongs to one of several kinds, such as "child added" and
/// "child removed" on a container.
pub trait EventKind {
  type Kind: PartialEq;

  fn kind(&self) -> Self::Kind;
}

/// A predicate that accepts events of `kind` only.
///
/// ```
/// use rxbridge::ops::predicate::{of_kind, EventKind};
///
/// #[derive(Clone, Copy, PartialEq)]
/// enum Key {
///   Pressed,
///   Released,
/// }
/// struct KeyEvent(Key);
///
/// impl EventKind for KeyEvent {
///   type Kind = Key;
///   fn kind(&self) -> Key { self.0 }
/// }
///
/// let pressed = of_kind::<KeyEvent>(Key::Pressed);
/// assert!(pressed(&KeyEvent(Key::Pressed)));
/// assert!(!pressed(&KeyEvent(Key::Released)));
/// ```
pub fn of_kind<E>(kind: E::Kind) -> impl Fn(&E) -> bool + Clone + Send + Sync + 'static
where
  E: EventKind + 'static,
  E::Kind: Clone + Send + Sync + 'static,
{
  move |event| event.kind() == kind
}

/// Accept events both predicates accept. `b` is skipped once `a` rejects.
pub fn and<T, A, B>(a: A, b: B) -> impl Fn(&T) -> bool
where
  T: ?Sized,
  A: Fn(&T) -> bool,
  B: Fn(&T) -> bool,
{
  move |event| a(event) && b(event)
}

/// Accept events either predicate accepts. `b` is skipped once `a` accepts.
pub fn or<T, A, B>(a: A, b: B) -> impl Fn(&T) -> bool
where
  T: ?Sized,
  A: Fn(&T) -> bool,
  B: Fn(&T) -> bool,
{
  move |event| a(event) || b(event)
}

pub fn not<T, A>(a: A) -> impl Fn(&T) -> bool
where
  T: ?Sized,
  A: Fn(&T) -> bool,
{
  move |event| !a(event)
}
