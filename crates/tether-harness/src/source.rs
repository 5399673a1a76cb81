#![forbid(unsafe_code)]

//! Subscribe-counting fake source.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tether::{AnyObservable, Observable, ObserverRef, Scope};

#[derive(Default)]
struct Counters {
    subscribes: Cell<usize>,
    unsubscribes: Cell<usize>,
}

/// Wraps an observable and counts subscriptions made to it.
pub struct CountingSource<T> {
    source: AnyObservable<T>,
    counters: Rc<Counters>,
}

impl<T> Clone for CountingSource<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            counters: Rc::clone(&self.counters),
        }
    }
}

impl<T> fmt::Debug for CountingSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingSource")
            .field("subscribes", &self.counters.subscribes.get())
            .field("unsubscribes", &self.counters.unsubscribes.get())
            .finish()
    }
}

impl<T: 'static> CountingSource<T> {
    pub fn new<O>(source: &O) -> Self
    where
        O: Observable<T> + Clone,
    {
        Self {
            source: source.boxed(),
            counters: Rc::default(),
        }
    }

    /// Subscriptions ever made.
    pub fn subscribes(&self) -> usize {
        self.counters.subscribes.get()
    }

    /// Subscriptions closed.
    pub fn unsubscribes(&self) -> usize {
        self.counters.unsubscribes.get()
    }

    /// Subscriptions currently open.
    pub fn live(&self) -> usize {
        self.subscribes() - self.unsubscribes()
    }
}

impl<T: 'static> Observable<T> for CountingSource<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope {
        let counters = Rc::clone(&self.counters);
        counters.subscribes.set(counters.subscribes.get() + 1);
        let subscription = self.source.subscribe_observer(observer);
        Scope::new(move || {
            subscription.close();
            counters.unsubscribes.set(counters.unsubscribes.get() + 1);
        })
    }
}
