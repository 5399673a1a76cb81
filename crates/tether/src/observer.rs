#![forbid(unsafe_code)]

//! The receiving end of an [`Observable`](crate::Observable).
//!
//! An [`Observer`] is opened once per activation and returns the [`Scope`]
//! that undoes whatever the open established. Any `Fn(T) -> Scope` closure is
//! an observer; the helpers below cover the common shapes.

use std::rc::Rc;

use crate::both::Both;
use crate::scope::Scope;

/// Reacts to activations.
pub trait Observer<T> {
    /// Establish the effects of `data` becoming active. The returned scope is
    /// closed exactly once, when the activation is revoked or the subscription
    /// ends.
    fn open(&self, data: T) -> Scope;
}

impl<T, F> Observer<T> for F
where
    F: Fn(T) -> Scope,
{
    fn open(&self, data: T) -> Scope {
        self(data)
    }
}

/// Shared, type-erased observer as stored by the containers.
pub type ObserverRef<T> = Rc<dyn Observer<T>>;

/// Observer that runs `f` on every open and has nothing to undo.
pub fn on_open<T: 'static>(f: impl Fn(T) + 'static) -> impl Observer<T> + 'static {
    move |data: T| {
        f(data);
        Scope::noop()
    }
}

/// Observer that runs `f` with the activation's data when it is revoked.
pub fn on_close<T: 'static>(f: impl Fn(T) + 'static) -> impl Observer<T> + 'static {
    let f = Rc::new(f);
    move |data: T| {
        let f = Rc::clone(&f);
        Scope::new(move || f(data))
    }
}

/// Adapt a two-argument observer to activations of [`Both`].
pub fn both<A: 'static, B: 'static>(
    f: impl Fn(A, B) -> Scope + 'static,
) -> impl Observer<Both<A, B>> + 'static {
    move |pair: Both<A, B>| f(pair.first, pair.second)
}
