#![forbid(unsafe_code)]

//! Multi-activation container.
//!
//! # Design
//!
//! [`Pool<T>`] keeps an insertion-ordered list of entries. Each
//! [`add`](Pool::add) creates an entry with a fresh opaque id, so equal values
//! are tracked independently and removing one occurrence leaves the others
//! alone. Every subscriber holds one scope per live entry, keyed by entry id.
//!
//! # Invariants
//!
//! 1. Live activations per subscriber equal the number of unreleased `add`
//!    scopes.
//! 2. Adding opens subscribers in registration order; removing closes them
//!    in reverse registration order.
//! 3. Subscribing opens entries in insertion order; unsubscribing closes
//!    them in reverse insertion order.
//! 4. A subscriber is never opened after its subscription scope has been
//!    closed, even before its deferred removal has run.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::observable::Observable;
use crate::observer::ObserverRef;
use crate::scope::Scope;
use crate::sequencer::Sequencer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntryId(u64);

struct PoolSubscriber<T> {
    id: u64,
    observer: ObserverRef<T>,
    retired: Rc<Cell<bool>>,
    scopes: HashMap<EntryId, Scope>,
}

struct PoolState<T> {
    entries: Vec<(EntryId, T)>,
    subscribers: Vec<PoolSubscriber<T>>,
}

struct PoolInner<T> {
    sequencer: Sequencer,
    next_entry: Cell<u64>,
    next_subscriber: Cell<u64>,
    state: RefCell<PoolState<T>>,
}

/// A mutable observable with any number of activations.
///
/// Cloning a `Pool` creates a new handle to the **same** state.
pub struct Pool<T> {
    inner: Rc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Pool")
            .field(
                "entries",
                &state.entries.iter().map(|(_, data)| data).collect::<Vec<_>>(),
            )
            .field("subscriber_count", &state.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Pool<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(PoolInner {
                sequencer: Sequencer::new(),
                next_entry: Cell::new(0),
                next_subscriber: Cell::new(0),
                state: RefCell::new(PoolState {
                    entries: Vec::new(),
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    /// Activate `data` until the returned scope is closed.
    pub fn add(&self, data: T) -> Scope {
        let id = EntryId(self.inner.next_entry.get());
        self.inner.next_entry.set(id.0 + 1);

        let inner = Rc::clone(&self.inner);
        self.inner.sequencer.sequence(move || inner.enter(id, data));

        let inner = Rc::clone(&self.inner);
        Scope::new(move || {
            let target = Rc::clone(&inner);
            inner.sequencer.sequence(move || target.exit(id));
        })
    }
}

impl<T: Clone + 'static> PoolInner<T> {
    fn enter(&self, entry: EntryId, data: T) {
        debug_assert!(self.sequencer.in_sequence());
        let targets: Vec<(u64, ObserverRef<T>, Rc<Cell<bool>>)> = {
            let mut state = self.state.borrow_mut();
            state.entries.push((entry, data.clone()));
            state
                .subscribers
                .iter()
                .filter(|s| !s.retired.get())
                .map(|s| (s.id, Rc::clone(&s.observer), Rc::clone(&s.retired)))
                .collect()
        };
        trace!(entry = entry.0, subscribers = targets.len(), "pool entry added");
        for (subscriber, observer, retired) in targets {
            if retired.get() {
                continue;
            }
            let scope = observer.open(data.clone());
            self.store(subscriber, entry, scope);
        }
    }

    fn exit(&self, entry: EntryId) {
        debug_assert!(self.sequencer.in_sequence());
        let subscribers: Vec<u64> = self
            .state
            .borrow()
            .subscribers
            .iter()
            .rev()
            .map(|s| s.id)
            .collect();
        trace!(entry = entry.0, subscribers = subscribers.len(), "pool entry removed");
        for subscriber in subscribers {
            let scope = self.take(subscriber, entry);
            drop(scope);
        }
        let removed = {
            let mut state = self.state.borrow_mut();
            state
                .entries
                .iter()
                .position(|(id, _)| *id == entry)
                .map(|index| state.entries.remove(index))
        };
        drop(removed);
    }

    fn subscribe_now(
        &self,
        subscriber: u64,
        observer: ObserverRef<T>,
        retired: Rc<Cell<bool>>,
    ) {
        debug_assert!(self.sequencer.in_sequence());
        if retired.get() {
            return;
        }
        let entries: Vec<(EntryId, T)> = {
            let mut state = self.state.borrow_mut();
            state.subscribers.push(PoolSubscriber {
                id: subscriber,
                observer: Rc::clone(&observer),
                retired: Rc::clone(&retired),
                scopes: HashMap::new(),
            });
            state.entries.clone()
        };
        for (entry, data) in entries {
            if retired.get() {
                break;
            }
            let scope = observer.open(data);
            self.store(subscriber, entry, scope);
        }
    }

    fn unsubscribe_now(&self, subscriber: u64) {
        debug_assert!(self.sequencer.in_sequence());
        let entries: Vec<EntryId> = self
            .state
            .borrow()
            .entries
            .iter()
            .rev()
            .map(|(id, _)| *id)
            .collect();
        for entry in entries {
            let scope = self.take(subscriber, entry);
            drop(scope);
        }
        let removed = {
            let mut state = self.state.borrow_mut();
            state
                .subscribers
                .iter()
                .position(|s| s.id == subscriber)
                .map(|index| state.subscribers.remove(index))
        };
        drop(removed);
    }

    fn store(&self, subscriber: u64, entry: EntryId, scope: Scope) {
        let orphan = {
            let mut state = self.state.borrow_mut();
            match state.subscribers.iter_mut().find(|s| s.id == subscriber) {
                Some(s) => {
                    let previous = s.scopes.insert(entry, scope);
                    assert!(
                        previous.is_none(),
                        "pool entry opened twice for one observer"
                    );
                    None
                }
                None => Some(scope),
            }
        };
        drop(orphan);
    }

    fn take(&self, subscriber: u64, entry: EntryId) -> Option<Scope> {
        self.state
            .borrow_mut()
            .subscribers
            .iter_mut()
            .find(|s| s.id == subscriber)
            .and_then(|s| s.scopes.remove(&entry))
    }
}

impl<T: Clone + 'static> Observable<T> for Pool<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope {
        let id = self.inner.next_subscriber.get();
        self.inner.next_subscriber.set(id + 1);

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
