#![forbid(unsafe_code)]

//! Key-unique reactive map.
//!
//! [`Dict<K, V>`] wraps a [`Pool`] of [`Both<K, V>`] entries and keeps the
//! pool's removal scope for each key. Putting a different value for a key
//! removes the old pool entry before adding the new one, so observers never
//! see two live entries for the same key.
//!
//! Keys must honour the `Eq`/`Hash` contract; this is not checked.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tracing::trace;

use crate::both::Both;
use crate::observable::{AnyObservable, Observable};
use crate::observer::ObserverRef;
use crate::pool::Pool;
use crate::scope::Scope;
use crate::sequencer::Sequencer;

struct DictEntry<V> {
    value: V,
    _removal: Scope,
}

struct DictInner<K, V> {
    sequencer: Sequencer,
    pool: Pool<Both<K, V>>,
    entries: RefCell<HashMap<K, DictEntry<V>>>,
}

/// A reactive map with at most one live entry per key.
///
/// Cloning a `Dict` creates a new handle to the **same** state.
pub struct Dict<K, V> {
    inner: Rc<DictInner<K, V>>,
}

impl<K, V> Clone for Dict<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Dict<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.borrow();
        f.debug_map()
            .entries(entries.iter().map(|(k, e)| (k, &e.value)))
            .finish()
    }
}

impl<K, V> Default for Dict<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Dict<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DictInner {
                sequencer: Sequencer::new(),
                pool: Pool::new(),
                entries: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Map `key` to `value`. Equal to the current mapping: no-op. Different:
    /// the old entry is removed, then the new one added.
    pub fn put(&self, key: K, value: V) {
        let inner = Rc::clone(&self.inner);
        self.inner
            .sequencer
            .sequence(move || inner.apply_put(key, value));
    }

    /// Remove `key`. No-op when absent.
    pub fn remove(&self, key: K) {
        let inner = Rc::clone(&self.inner);
        self.inner.sequencer.sequence(move || inner.apply_remove(&key));
    }

    /// Every live `(key, value)` entry.
    pub fn entries(&self) -> AnyObservable<Both<K, V>> {
        self.inner.pool.opaque()
    }

    pub fn keys(&self) -> AnyObservable<K> {
        self.entries().map(|entry| entry.first)
    }

    pub fn values(&self) -> AnyObservable<V> {
        self.entries().map(|entry| entry.second)
    }
}

impl<K, V> DictInner<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn apply_put(&self, key: K, value: V) {
        debug_assert!(self.sequencer.in_sequence());
        let displaced = {
            let mut entries = self.entries.borrow_mut();
            if entries.get(&key).is_some_and(|e| e.value == value) {
                return;
            }
            entries.remove(&key)
        };
        let replaced = displaced.is_some();
        drop(displaced);

        let removal = self.pool.add(Both::new(key.clone(), value.clone()));
        let stale = self.entries.borrow_mut().insert(
            key,
            DictEntry {
                value,
                _removal: removal,
            },
        );
        drop(stale);
        trace!(replaced, "dict entry put");
    }

    fn apply_remove(&self, key: &K) {
        debug_assert!(self.sequencer.in_sequence());
        let removed = self.entries.borrow_mut().remove(key);
        if removed.is_some() {
            trace!("dict entry removed");
        }
        drop(removed);
    }
}

impl<K, V> Observable<Both<K, V>> for Dict<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn subscribe_observer(&self, observer: ObserverRef<Both<K, V>>) -> Scope {
        self.inner.pool.subscribe_observer(observer)
    }
}
