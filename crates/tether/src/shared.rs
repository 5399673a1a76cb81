#![forbid(unsafe_code)]

//! Multicast over a single upstream subscription.
//!
//! # Design
//!
//! [`SharedObservable<T>`] mirrors its source into a private [`Pool`]. The
//! first downstream subscriber subscribes the source, feeding each upstream
//! activation into the pool for as long as it lasts; later subscribers only
//! subscribe to the pool and see a replay of what is currently live. When the
//! last downstream subscriber leaves, the upstream subscription is closed.
//!
//! # Invariants
//!
//! 1. The source is subscribed at most once at a time.
//! 2. The upstream subscription is live iff at least one downstream
//!    subscription is live.
//! 3. `share()` on a shared observable returns a handle to the same state.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::observable::{AnyObservable, Observable};
use crate::observer::ObserverRef;
use crate::pool::Pool;
use crate::scope::{OwnedScope, Scope};

struct SharedInner<T> {
    source: AnyObservable<T>,
    cache: Pool<T>,
    subscribers: Cell<usize>,
    upstream: OwnedScope,
}

/// An observable whose subscribers share one subscription to its source.
///
/// Built with [`Observable::share`].
pub struct SharedObservable<T> {
    inner: Rc<SharedInner<T>>,
}

impl<T> Clone for SharedObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SharedObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedObservable")
            .field("subscribers", &self.inner.subscribers.get())
            .field("connected", &self.inner.upstream.is_occupied())
            .finish()
    }
}

impl<T: Clone + 'static> SharedObservable<T> {
    pub(crate) fn new<O>(source: &O) -> Self
    where
        O: Observable<T> + Clone,
    {
        Self {
            inner: Rc::new(SharedInner {
                source: source.boxed(),
                cache: Pool::new(),
                subscribers: Cell::new(0),
                upstream: OwnedScope::new(),
            }),
        }
    }

    /// Already shared: returns a handle to the same state.
    #[must_use]
    pub fn share(&self) -> Self {
        self.clone()
    }

    /// Number of live downstream subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.get()
    }

    /// True while the source is subscribed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.upstream.is_occupied()
    }
}

impl<T: Clone + 'static> SharedInner<T> {
    fn connect(&self) {
        trace!("shared source connected");
        let cache = self.cache.clone();
        let upstream = self.source.subscribe(move |data: T| cache.add(data));
        self.upstream.set(upstream);
    }

    fn release(&self) {
        let remaining = self.subscribers.get().saturating_sub(1);
        self.subscribers.set(remaining);
        if remaining == 0 {
            trace!("shared source disconnected");
            self.upstream.close();
        }
    }
}

impl<T: Clone + 'static> Observable<T> for SharedObservable<T> {
    fn as_shared(&self) -> Option<SharedObservable<T>> {
        Some(self.clone())
    }

    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope {
        let previous = self.inner.subscribers.get();
        self.inner.subscribers.set(previous + 1);
        let downstream = self.inner.cache.subscribe_observer(observer);
        if previous == 0 {
            self.inner.connect();
        }

        let inner = Rc::clone(&self.inner);
        Scope::new(move || {
            downstream.close();
            inner.release();
        })
    }
}
