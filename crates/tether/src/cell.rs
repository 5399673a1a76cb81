#![forbid(unsafe_code)]

//! Always-active single-value container.
//!
//! [`Cell<T>`] is a [`Controller`] that is never empty: it starts with a value
//! and every mutation replaces it. Subscribers are opened immediately with the
//! current value and always hold exactly one activation.

use std::fmt;
use std::rc::Rc;

use crate::controller::Controller;
use crate::observable::Observable;
use crate::observer::ObserverRef;
use crate::scope::Scope;

/// A mutable observable with exactly one activation.
///
/// Cloning a `Cell` creates a new handle to the **same** state.
pub struct Cell<T> {
    controller: Controller<T>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cell").field(&self.controller).finish()
    }
}

impl<T: Clone + PartialEq + 'static> Cell<T> {
    #[must_use]
    pub fn new(start: T) -> Self {
        Self {
            controller: Controller::with_data(Some(start)),
        }
    }

    /// Replace the value with `f(current)`. Equal results are a no-op;
    /// otherwise subscribers see the old activation close, then the new one
    /// open.
    ///
    /// `f` runs inside the cell's sequence, so it always sees the value left
    /// by every mutation requested before it.
    pub fn mutate(&self, f: impl FnOnce(&T) -> T + 'static) {
        let inner = Rc::clone(&self.controller.inner);
        self.controller.inner.sequence(move || {
            if let Some(current) = inner.current() {
                let next = f(&current);
                inner.apply_set(next);
            }
        });
    }

    pub fn set(&self, data: T) {
        self.mutate(move |_| data);
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> for Cell<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope {
        self.controller.subscribe_observer(observer)
    }
}
