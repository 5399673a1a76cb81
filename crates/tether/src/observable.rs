#![forbid(unsafe_code)]

//! The subscribable abstraction and its combinator algebra.
//!
//! # Design
//!
//! [`Observable<T>`] has one required method,
//! [`subscribe_observer`](Observable::subscribe_observer). Everything else is
//! a provided combinator that returns a new, type-erased [`AnyObservable`].
//! Combinators are pure: nothing happens until a subscription is made, and
//! each subscription builds its own private state.
//!
//! The algebra is built on [`flat_map`](Observable::flat_map), [`just`] and
//! [`empty`], which form a monad (`just` is return, `flat_map` is bind, and
//! `optional(None)` is `empty()`).
//!
//! # Invariants
//!
//! 1. Every scope returned by an observer's `open` is closed exactly once.
//! 2. An activation is never reopened while its previous scope is live.
//! 3. Nested scopes close in reverse order of acquisition.
//!
//! # Failure Modes
//!
//! - **Subscription dropped on the floor**: a subscription is a [`Scope`];
//!   dropping it unsubscribes immediately.
//! - **Scheduler never runs**: `delay` and `alarm` simply never activate.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::both::{Both, Unit};
use crate::cell::Cell;
use crate::controller::Controller;
use crate::observer::{Observer, ObserverRef};
use crate::scheduler::Scheduler;
use crate::scope::{OwnedScope, Scope};
use crate::shared::SharedObservable;

/// A source of activations.
pub trait Observable<T>: 'static {
    /// Register `observer`. It is opened for every activation while the
    /// returned subscription scope is live; closing the subscription closes
    /// every scope still open for it.
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope;

    /// Register any [`Observer`], typically a closure.
    fn subscribe(&self, observer: impl Observer<T> + 'static) -> Scope
    where
        Self: Sized,
    {
        self.subscribe_observer(Rc::new(observer))
    }

    /// Erase the concrete type.
    fn boxed(&self) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: 'static,
    {
        AnyObservable::new(self.clone())
    }

    /// For each activation, subscribe to the observable `f` derives from it
    /// for as long as the activation lasts.
    fn flat_map<U, O, F>(&self, f: F) -> AnyObservable<U>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
        U: Clone + 'static,
        O: Observable<U>,
        F: Fn(T) -> O + 'static,
    {
        let source = self.clone();
        let f = Rc::new(f);
        make(move |observer: ObserverRef<U>| {
            let f = Rc::clone(&f);
            source.subscribe(move |data: T| f(data).subscribe_observer(Rc::clone(&observer)))
        })
    }

    /// Project every activation.
    fn map<U, F>(&self, f: F) -> AnyObservable<U>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
        U: Clone + 'static,
        F: Fn(T) -> U + 'static,
    {
        self.flat_map(move |data: T| just(f(data)))
    }

    /// Forward only the activations matching `predicate`.
    fn filter<P>(&self, predicate: P) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
        P: Fn(&T) -> bool + 'static,
    {
        self.flat_map(move |data: T| {
            if predicate(&data) {
                just(data)
            } else {
                empty()
            }
        })
    }

    /// Hide the concrete type, including any mutators it exposes.
    fn opaque(&self) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: 'static,
    {
        let source = self.clone();
        make(move |observer: ObserverRef<T>| source.subscribe_observer(observer))
    }

    /// Active with `Both(t, u)` exactly while `self` is active with `t` and
    /// `other` is active with `u`.
    fn and<U, O>(&self, other: &O) -> AnyObservable<Both<T, U>>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
        U: Clone + 'static,
        O: Observable<U> + Clone,
    {
        let other = other.clone();
        self.flat_map(move |t: T| other.map(move |u: U| Both::new(t.clone(), u)))
    }

    /// Union of the activations of both observables.
    fn or<O>(&self, other: &O) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: 'static,
        O: Observable<T> + Clone,
    {
        let source = self.clone();
        let other = other.clone();
        make(move |observer: ObserverRef<T>| {
            let first = source.subscribe_observer(Rc::clone(&observer));
            let second = other.subscribe_observer(observer);
            first.and(second)
        })
    }

    /// Drop activations delivered synchronously while subscribing; forward
    /// only those that arrive later.
    fn after(&self) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: 'static,
    {
        let source = self.clone();
        make(move |observer: ObserverRef<T>| {
            let subscribed = Rc::new(std::cell::Cell::new(false));
            let armed = Rc::clone(&subscribed);
            let subscription = source.subscribe(move |data: T| {
                if armed.get() {
                    observer.open(data)
                } else {
                    Scope::noop()
                }
            });
            subscribed.set(true);
            subscription
        })
    }

    /// Like [`and`](Self::and), but `other` must activate after `self`.
    fn and_then<U, O>(&self, other: &O) -> AnyObservable<Both<T, U>>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
        U: Clone + 'static,
        O: Observable<U> + Clone,
    {
        self.and(&other.after())
    }

    /// Feed every activation into a private mutable observable.
    ///
    /// Per subscription, `factory` builds the target. `accumulator` is called
    /// with each activation and must return a scope that performs the inverse
    /// mutation when the activation is revoked. Observers see the target's
    /// activations.
    fn accumulate<R, M, F, A>(&self, factory: F, accumulator: A) -> AnyObservable<R>
    where
        Self: Sized + Clone,
        T: 'static,
        R: 'static,
        M: Observable<R> + Clone,
        F: Fn() -> M + 'static,
        A: Fn(&M, T) -> Scope + 'static,
    {
        let source = self.clone();
        let accumulator = Rc::new(accumulator);
        make(move |observer: ObserverRef<R>| {
            let target = factory();
            let fed = target.clone();
            let accumulator = Rc::clone(&accumulator);
            let upstream = source.subscribe(move |data: T| accumulator(&fed, data));
            upstream.and(target.subscribe_observer(observer))
        })
    }

    /// Collapse runs of equal consecutive activations into one.
    ///
    /// The latest value stays active after the source revokes it; it is only
    /// replaced by the next different activation.
    fn distinct_until_changed(&self) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: Clone + PartialEq + 'static,
    {
        self.accumulate(Controller::new, |controller: &Controller<T>, data: T| {
            controller.set(data);
            Scope::noop()
        })
    }

    /// Reduce the live activations into one always-active value. `acc` folds
    /// an activation in, `dim` folds it back out on revocation.
    fn fold<A, Acc, Dim>(&self, start: A, acc: Acc, dim: Dim) -> AnyObservable<A>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
        A: Clone + PartialEq + 'static,
        Acc: Fn(&A, &T) -> A + 'static,
        Dim: Fn(&A, &T) -> A + 'static,
    {
        let acc = Rc::new(acc);
        let dim = Rc::new(dim);
        self.accumulate(
            move || Cell::new(start.clone()),
            move |cell: &Cell<A>, data: T| {
                let acc = Rc::clone(&acc);
                let added = data.clone();
                cell.mutate(move |current| acc(current, &added));
                let dim = Rc::clone(&dim);
                let cell = cell.clone();
                Scope::new(move || cell.mutate(move |current| dim(current, &data)))
            },
        )
    }

    /// Number of live activations, always active.
    fn count(&self) -> AnyObservable<usize>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
    {
        self.fold(0usize, |n, _| n + 1, |n, _| n - 1)
    }

    /// Re-emit each activation once `delay` has elapsed on `scheduler`, if it
    /// is still active by then.
    fn delay(&self, scheduler: Rc<dyn Scheduler>, delay: Duration) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
    {
        self.flat_map(move |data: T| {
            alarm(Rc::clone(&scheduler), delay).map(move |()| data.clone())
        })
    }

    /// Report subscribe, open, close and unsubscribe through `logger`.
    fn debug<L>(&self, logger: L) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: Clone + fmt::Debug + 'static,
        L: Fn(&str) + 'static,
    {
        let source = self.clone();
        let logger = Rc::new(logger);
        make(move |observer: ObserverRef<T>| {
            logger("subscribe");
            let log = Rc::clone(&logger);
            let subscription = source.subscribe(move |data: T| {
                log(&format!("open {data:?}"));
                let scope = observer.open(data.clone());
                let log = Rc::clone(&log);
                Scope::new(move || {
                    log(&format!("close {data:?}"));
                    scope.close();
                })
            });
            let log = Rc::clone(&logger);
            Scope::new(move || {
                log("unsubscribe");
                subscription.close();
            })
        })
    }

    /// [`debug`](Self::debug) into `tracing` at debug level.
    fn traced(&self, label: &'static str) -> AnyObservable<T>
    where
        Self: Sized + Clone,
        T: Clone + fmt::Debug + 'static,
    {
        self.debug(move |line| debug!(target: "tether::trace", label, "{line}"))
    }

    /// Multicast: one upstream subscription shared by every subscriber.
    ///
    /// On an observable that is already shared (including a boxed one) this
    /// returns a handle to the existing shared state.
    fn share(&self) -> SharedObservable<T>
    where
        Self: Sized + Clone,
        T: Clone + 'static,
    {
        self.as_shared().unwrap_or_else(|| SharedObservable::new(self))
    }

    #[doc(hidden)]
    fn as_shared(&self) -> Option<SharedObservable<T>> {
        None
    }
}

/// A type-erased, cheaply cloneable observable.
pub struct AnyObservable<T> {
    inner: Rc<dyn Observable<T>>,
}

impl<T> Clone for AnyObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for AnyObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyObservable").finish_non_exhaustive()
    }
}

impl<T: 'static> AnyObservable<T> {
    pub fn new(observable: impl Observable<T>) -> Self {
        Self {
            inner: Rc::new(observable),
        }
    }
}

impl<T: 'static> Observable<T> for AnyObservable<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope {
        self.inner.subscribe_observer(observer)
    }

    fn boxed(&self) -> AnyObservable<T> {
        self.clone()
    }

    fn as_shared(&self) -> Option<SharedObservable<T>> {
        self.inner.as_shared()
    }
}

struct FnObservable<F> {
    subscribe: F,
}

impl<T, F> Observable<T> for FnObservable<F>
where
    F: Fn(ObserverRef<T>) -> Scope + 'static,
{
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Scope {
        (self.subscribe)(observer)
    }
}

/// Build an observable from its subscribe function. This is the entry point
/// for host adapters bridging callback APIs.
pub fn make<T, F>(subscribe: F) -> AnyObservable<T>
where
    T: 'static,
    F: Fn(ObserverRef<T>) -> Scope + 'static,
{
    AnyObservable::new(FnObservable { subscribe })
}

/// A single activation of `data` for as long as the subscription lasts.
pub fn just<T: Clone + 'static>(data: T) -> AnyObservable<T> {
    make(move |observer: ObserverRef<T>| observer.open(data.clone()))
}

/// Never activates.
pub fn empty<T: 'static>() -> AnyObservable<T> {
    make(|_: ObserverRef<T>| Scope::noop())
}

/// `just(data)` for `Some`, `empty()` for `None`.
pub fn optional<T: Clone + 'static>(data: Option<T>) -> AnyObservable<T> {
    match data {
        Some(data) => just(data),
        None => empty(),
    }
}

/// Active (with [`Unit`]) exactly while `observable` has no activations.
pub fn not<T, O>(observable: &O) -> AnyObservable<Unit>
where
    T: Clone + 'static,
    O: Observable<T> + Clone,
{
    observable.count().filter(|n| *n == 0).map(|_| ())
}

struct Armed {
    observer: ObserverRef<Unit>,
    fired: OwnedScope,
}

/// Activates once, `delay` after subscribing. Unsubscribing first cancels
/// the activation.
///
/// The scheduled task only holds a weak reference, so a cancelled alarm
/// releases its observer immediately.
pub fn alarm(scheduler: Rc<dyn Scheduler>, delay: Duration) -> AnyObservable<Unit> {
    make(move |observer: ObserverRef<Unit>| {
        let armed = Rc::new(Armed {
            observer,
            fired: OwnedScope::new(),
        });
        let pending = Rc::downgrade(&armed);
        scheduler.post_delayed(
            Box::new(move || {
                if let Some(armed) = pending.upgrade() {
                    let scope = armed.observer.open(());
                    armed.fired.set(scope);
                }
            }),
            delay,
        );
        Scope::new(move || armed.fired.close())
    })
}
