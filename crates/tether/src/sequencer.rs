#![forbid(unsafe_code)]

//! Reentrancy-serialising task queue.
//!
//! # Design
//!
//! A [`Sequencer`] makes each mutation of a container appear atomic to the
//! observers it notifies. `sequence(task)` appends the task to a FIFO queue;
//! if no drain is in progress the caller drains the queue, running every task
//! to completion before starting the next. A task that calls `sequence` again
//! (directly, or through an observer callback) only appends, so the nested
//! task runs after the current one finishes.
//!
//! This is a single-thread work queue, not a concurrency primitive. It is
//! `!Send` and `!Sync`.
//!
//! # Failure Modes
//!
//! - **Feedback loop**: observers that keep re-triggering each other would
//!   drain forever. A single drain pass runs at most [`MAX_SEQUENCED_TASKS`]
//!   tasks; past that the pending queue is discarded and
//!   [`SequencerOverflow`] is reported.
//! - **Panicking task**: the draining flag is cleared and pending tasks are
//!   discarded while unwinding, so the sequencer stays usable.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

use tracing::error;

/// Upper bound on tasks executed by one drain pass.
pub const MAX_SEQUENCED_TASKS: usize = 1 << 16;

type Task = Box<dyn FnOnce()>;

/// A drain pass exceeded [`MAX_SEQUENCED_TASKS`].
///
/// This signals a logic error, usually observers that mutate the container
/// they observe in an endless cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerOverflow {
    /// Number of tasks executed before the pass was aborted.
    pub limit: usize,
    /// Tasks still queued when the pass was aborted (all discarded).
    pub discarded: usize,
}

impl fmt::Display for SequencerOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sequencer overflow: drained {} tasks in one pass, discarded {} pending",
            self.limit, self.discarded
        )
    }
}

impl std::error::Error for SequencerOverflow {}

/// Serialises mutation tasks on a single logical thread.
pub struct Sequencer {
    queue: RefCell<VecDeque<Task>>,
    draining: Cell<bool>,
    limit: usize,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("queued", &self.queue.borrow().len())
            .field("draining", &self.draining.get())
            .finish()
    }
}

impl Sequencer {
    /// Create an idle sequencer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_SEQUENCED_TASKS)
    }

    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            limit,
        }
    }

    /// True while a drain pass is running.
    #[must_use]
    pub fn in_sequence(&self) -> bool {
        self.draining.get()
    }

    /// Run `task` after every task queued before it.
    ///
    /// # Panics
    ///
    /// Panics with the [`SequencerOverflow`] message if the drain pass started
    /// by this call overflows.
    pub fn sequence(&self, task: impl FnOnce() + 'static) {
        if let Err(overflow) = self.try_sequence(task) {
            panic!("{overflow}");
        }
    }

    /// Like [`sequence`](Self::sequence), but reports overflow as an error.
    ///
    /// Only the outermost call (the one that drains) can fail; reentrant calls
    /// enqueue and return `Ok`.
    pub fn try_sequence(&self, task: impl FnOnce() + 'static) -> Result<(), SequencerOverflow> {
        self.queue.borrow_mut().push_back(Box::new(task));
        if self.draining.get() {
            return Ok(());
        }

        let _drain = DrainGuard::enter(self);
        let mut executed = 0usize;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(task) = next else {
                return Ok(());
            };
            if executed == self.limit {
                let pending = std::mem::take(&mut *self.queue.borrow_mut());
                let overflow = SequencerOverflow {
                    limit: self.limit,
                    discarded: pending.len() + 1,
                };
                error!(
                    limit = overflow.limit,
                    discarded = overflow.discarded,
                    "sequencer overflow, aborting drain"
                );
                drop(task);
                drop(pending);
                return Err(overflow);
            }
            executed += 1;
            task();
        }
    }
}

/// Clears the draining flag when a drain pass ends, including by unwinding.
struct DrainGuard<'a> {
    sequencer: &'a Sequencer,
}

impl<'a> DrainGuard<'a> {
    fn enter(sequencer: &'a Sequencer) -> Self {
        sequencer.draining.set(true);
        Self { sequencer }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let pending = std::mem::take(&mut *self.sequencer.queue.borrow_mut());
            drop(pending);
        }
        self.sequencer.draining.set(false);
    }
}
