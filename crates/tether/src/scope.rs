#![forbid(unsafe_code)]

//! Release-once resource handles.
//!
//! # Design
//!
//! A [`Scope`] owns a single release action. It is move-only: releasing it
//! with [`Scope::close`] consumes the value, and dropping it releases it as
//! well, so the action runs at most once by construction.
//!
//! Scopes compose with [`Scope::and`]. The composite releases the *second*
//! scope before the first, mirroring stack unwinding: whatever was acquired
//! last is released first.
//!
//! [`OwnedScope`] is a single slot for a scope whose occupant can be replaced
//! from behind a shared reference. Replacing the occupant releases the old
//! one before the new one is stored.
//!
//! # Invariants
//!
//! 1. A release action runs at most once.
//! 2. `a.and(b)` releases `b`, then `a`.
//! 3. An `OwnedScope` holds zero or one scope; dropping it releases the
//!    occupant.

use std::cell::RefCell;
use std::fmt;

type Release = Box<dyn FnOnce()>;

/// A releasable resource handle.
///
/// Dropping a `Scope` releases it. Keep the value alive for as long as the
/// resource should stay acquired, or call [`forget`](Scope::forget) to keep
/// it acquired for good.
#[must_use = "dropping a Scope releases it immediately"]
pub struct Scope {
    release: Option<Release>,
}

impl Scope {
    /// Create a scope that runs `release` when closed.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A scope with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// True if closing this scope does nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.release.is_none()
    }

    /// Release the scope.
    pub fn close(mut self) {
        self.run();
    }

    /// Combine two scopes into one. Closing the result closes `other` first,
    /// then `self`.
    pub fn and(self, other: Scope) -> Scope {
        if other.is_noop() {
            return self;
        }
        if self.is_noop() {
            return other;
        }
        Scope::new(move || {
            other.close();
            self.close();
        })
    }

    /// Discard the release action without running it.
    pub fn forget(mut self) {
        self.release = None;
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::noop()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("noop", &self.is_noop())
            .finish()
    }
}

/// A slot holding at most one [`Scope`].
///
/// Used to bridge connect/disconnect style callbacks: store the scope opened
/// on connect, close it on disconnect.
#[derive(Default)]
pub struct OwnedScope {
    slot: RefCell<Option<Scope>>,
}

impl OwnedScope {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the occupant. The previous occupant, if any, is closed before
    /// `scope` is stored.
    pub fn set(&self, scope: Scope) {
        let previous = self.slot.borrow_mut().take();
        drop(previous);
        // A reentrant `set` from the release above may have refilled the slot.
        let displaced = self.slot.borrow_mut().replace(scope);
        drop(displaced);
    }

    /// Close the occupant, leaving the slot empty.
    pub fn close(&self) {
        let previous = self.slot.borrow_mut().take();
        drop(previous);
    }

    /// Remove the occupant without closing it.
    pub fn take(&self) -> Option<Scope> {
        self.slot.borrow_mut().take()
    }

    /// True if the slot currently holds a scope.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl fmt::Debug for OwnedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedScope")
            .field("occupied", &self.is_occupied())
            .finish()
    }
}

impl Drop for OwnedScope {
    fn drop(&mut self) {
        let occupant = self.slot.get_mut().take();
        drop(occupant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recording(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Scope {
        let log = Rc::clone(log);
        Scope::new(move || log.borrow_mut().push(name))
    }

    #[test]
    fn close_runs_release_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = recording(&log, "a");
        assert!(!scope.is_noop());
        scope.close();
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn drop_releases() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let _scope = recording(&log, "a");
        }
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn and_releases_other_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = recording(&log, "first").and(recording(&log, "second"));
        scope.close();
        assert_eq!(*log.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn and_nests_lifo() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = recording(&log, "a")
            .and(recording(&log, "b"))
            .and(recording(&log, "c"));
        scope.close();
        assert_eq!(*log.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn and_with_noop_keeps_other() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = Scope::noop().and(recording(&log, "a"));
        assert!(!scope.is_noop());
        drop(scope);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(Scope::noop().and(Scope::noop()).is_noop());
    }

    #[test]
    fn forget_skips_release() {
        let log = Rc::new(RefCell::new(Vec::new()));
        recording(&log, "a").forget();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn owned_scope_replaces_previous_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let owned = OwnedScope::new();
        assert!(!owned.is_occupied());

        owned.set(recording(&log, "a"));
        assert!(owned.is_occupied());
        assert!(log.borrow().is_empty());

        owned.set(recording(&log, "b"));
        assert_eq!(*log.borrow(), vec!["a"]);

        owned.close();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert!(!owned.is_occupied());
    }

    #[test]
    fn owned_scope_drop_releases_occupant() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let owned = OwnedScope::new();
            owned.set(recording(&log, "a"));
        }
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn owned_scope_take_does_not_release() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let owned = OwnedScope::new();
        owned.set(recording(&log, "a"));
        let taken = owned.take();
        assert!(log.borrow().is_empty());
        assert!(!owned.is_occupied());
        drop(taken);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn debug_format() {
        let dbg = format!("{:?}", Scope::noop());
        assert!(dbg.contains("Scope"));
        assert!(dbg.contains("noop"));
    }
}
