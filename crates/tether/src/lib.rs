#![forbid(unsafe_code)]

//! Scope-based reactive state propagation.
//!
//! # Role
//! `tether` models state as *activations*: an [`Observable`] opens its
//! observers with a value and hands back a [`Scope`] that is closed when the
//! value stops being current. Cleanup is therefore structural: whatever an
//! observer acquires in `open` it releases in the returned scope.
//!
//! # Primary pieces
//! - **Scopes**: [`Scope`] and [`OwnedScope`], the release-once handles.
//! - **Containers**: [`Controller`] (zero or one activation), [`Cell`]
//!   (exactly one), [`Pool`] (any number) and [`Dict`] (one per key).
//! - **Combinators**: provided methods on [`Observable`] such as `map`,
//!   `flat_map`, `and`, `or`, `fold`, `delay` and `share`.
//! - **Time**: the [`Scheduler`] seam and the deterministic
//!   [`ManualScheduler`].
//!
//! Everything is single-threaded (`Rc`-based). Reentrant mutations from
//! inside observer callbacks are serialised per container by a [`Sequencer`].

pub mod both;
pub mod cell;
pub mod controller;
pub mod dict;
pub mod observable;
pub mod observer;
pub mod pool;
pub mod scheduler;
pub mod scope;
pub mod sequencer;
pub mod shared;

pub use both::{Both, Unit};
pub use cell::Cell;
pub use controller::Controller;
pub use dict::Dict;
pub use observable::{AnyObservable, Observable, alarm, empty, just, make, not, optional};
pub use observer::{Observer, ObserverRef, both, on_close, on_open};
pub use pool::Pool;
pub use scheduler::{ManualScheduler, Scheduler, Task};
pub use scope::{OwnedScope, Scope};
pub use sequencer::{MAX_SEQUENCED_TASKS, Sequencer, SequencerOverflow};
pub use shared::SharedObservable;

/// Glob-importable set of the commonly used types and constructors.
pub mod prelude {
    pub use crate::{
        AnyObservable, Both, Cell, Controller, Dict, Observable, Observer, OwnedScope, Pool,
        Scope, Unit, empty, just, make, not, optional,
    };
}
