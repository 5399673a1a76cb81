#![forbid(unsafe_code)]

//! Zero-or-one activation container.
//!
//! # Design
//!
//! [`Controller<T>`] holds an `Option<T>` in shared, reference-counted
//! storage. While it holds a value, every subscriber has exactly one open
//! activation for it. All mutation goes through the controller's
//! [`Sequencer`], so an observer that mutates the controller from inside a
//! callback is queued behind the mutation that triggered it.
//!
//! # Invariants
//!
//! 1. At most one activation is alive per subscriber.
//! 2. `set(v)` while active with `v` is a no-op.
//! 3. Activations open in subscription order and close in reverse
//!    subscription order.
//! 4. Observer callbacks never run while the interior is borrowed.
//! 5. A subscriber whose subscription scope has been closed is never opened
//!    again, even before its deferred removal has run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::observable::Observable;
use crate::observer::ObserverRef;
use crate::scope::Scope;
use crate::sequencer::Sequencer;

struct Subscriber<T> {
    id: u64,
    observer: ObserverRef<T>,
    retired: Rc<Cell<bool>>,
    scope: Option<Scope>,
}

struct ControllerState<T> {
    data: Option<T>,
    subscribers: Vec<Subscriber<T>>,
}

pub(crate) struct ControllerInner<T> {
    sequencer: Sequencer,
    next_id: Cell<u64>,
    state: RefCell<ControllerState<T>>,
}

/// A mutable observable with at most one activation.
///
/// Cloning a `Controller` creates a new handle to the **same** state.
pub struct Controller<T> {
    pub(crate) inner: Rc<ControllerInner<T>>,
}

impl<T> Clone for Controller<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Controller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Controller")
            .field("data", &state.data)
            .field("subscriber_count", &state.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Default for Controller<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + 'static> Controller<T> {
    /// Create an inactive controller.
    #[must_use]
    pub fn new() -> Self {
        Self::with_data(None)
    }

    pub(crate) fn with_data(data: Option<T>) -> Self {
        Self {
            inner: Rc::new(ControllerInner {
                sequencer: Sequencer::new(),
                next_id: Cell::new(0),
                state: RefCell::new(ControllerState {
                    data,
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    /// Activate with `data`, replacing any different current value.
    pub fn set(&self, data: T) {
        let inner = Rc::clone(&self.inner);
        self.inner.sequencer.sequence(move || inner.apply_set(data));
    }

    /// `Some` behaves as [`set`](Self::set), `None` as [`reset`](Self::reset).
    pub fn set_optional(&self, data: Option<T>) {
        match data {
            Some(data) => self.set(data),
            None => self.reset(),
        }
    }

    /// Deactivate. No-op when already inactive.
    pub fn reset(&self) {
        let inner = Rc::clone(&self.inner);
        self.inner.sequencer.sequence(move || inner.apply_reset());
    }
}

impl<T: Clone + PartialEq + 'static> ControllerInner<T> {
    pub(crate) fn sequence(&self, task: impl FnOnce() + 'static) {
        self.sequencer.sequence(task);
    }

    pub(crate) fn current(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }

    pub(crate) fn apply_set(&self, data: T) {
        debug_assert!(self.sequencer.in_sequence());
        if self.state.borrow().data.as_ref() == Some(&data) {
            return;
        }
        self.apply_reset();
        self.state.borrow_mut().data = Some(data.clone());
        self.open_all(data);
    }

    fn apply_reset(&self) {
        debug_assert!(self.sequencer.in_sequence());
        if self.state.borrow().data.is_none() {
            return;
        }
        self.close_all();
        self.state.borrow_mut().data = None;
    }

    fn open_all(&self, data: T) {
        let targets: Vec<(u64, ObserverRef<T>, Rc<Cell<bool>>)> = self
            .state
            .borrow()
            .subscribers
            .iter()
            .filter(|s| !s.retired.get())
            .map(|s| (s.id, Rc::clone(&s.observer), Rc::clone(&s.retired)))
            .collect();
        trace!(subscribers = targets.len(), "controller activated");
        for (id, observer, retired) in targets {
            // An earlier observer may have closed this subscription.
            if retired.get() {
                continue;
            }
            let scope = observer.open(data.clone());
            self.store(id, scope);
        }
    }

    fn close_all(&self) {
        let ids: Vec<u64> = self
            .state
            .borrow()
            .subscribers
            .iter()
            .rev()
            .map(|s| s.id)
            .collect();
        trace!(subscribers = ids.len(), "controller deactivated");
        for id in ids {
            let scope = self.take(id);
            drop(scope);
        }
    }

    fn subscribe_now(&self, id: u64, observer: ObserverRef<T>, retired: Rc<Cell<bool>>) {
        debug_assert!(self.sequencer.in_sequence());
        if retired.get() {
            return;
        }
        let data = {
            let mut state = self.state.borrow_mut();
            state.subscribers.push(Subscriber {
                id,
                observer: Rc::clone(&observer),
                retired,
                scope: None,
            });
            state.data.clone()
        };
        if let Some(data) = data {
            let scope = observer.open(data);
            self.store(id, scope);
        }
    }

    fn unsubscribe_now(&self, id: u64) {
        debug_assert!(self.sequencer.in_sequence());
        let scope = self.take(id);
        drop(scope);
        let removed = {
            let mut state = self.state.borrow_mut();
            state
                .subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| state.subscribers.remove(index))
        };
        drop(removed);
    }

    fn store(&self, id: u64, scope: Scope) {
        let orphan = {
            let mut state = self.state.borrow_mut();
            match state.subscribers.iter_mut().find(|s| s.id == id) {
                Some(subscriber) => {
                    assert!(
                        subscriber.scope.is_none(),
                        "observer opened again before its activation was closed"
                    );
                    subscriber.scope = Some(scope);
                    None
                }
                None => Some(scope),
            }
        };
        drop(orphan);
    }

    fn take(&self, id: u64) -> Option<Scope> {
        self.state
            .borrow_mut()
            .subscribers
            .iter_mut()
            .find(|s| s.id == id)
            .and_then(|s| s.scope.take())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> for Controller<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let retired = Rc::new(Cell::new(false));
        let inner = Rc::clone(&self.inner);
        let flag = Rc::clone(&retired);
        self.inner
            .sequencer
            .sequence(move || inner.subscribe_now(id, observer, flag));

        let inner = Rc::clone(&self.inner);
        Scope::new(move || {
            retired.set(true);
            let target = Rc::clone(&inner);
            inner.sequencer.sequence(move || target.unsubscribe_now(id));
        })
    }
}
