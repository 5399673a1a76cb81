#![forbid(unsafe_code)]

//! Deferred execution capability for [`alarm`](crate::alarm) and
//! [`Observable::delay`](crate::Observable::delay).
//!
//! The core never sleeps or spawns. A host supplies a [`Scheduler`] that runs
//! a task "later"; what later means is up to the host. [`ManualScheduler`] is
//! a deterministic implementation driven by a virtual clock, suitable for
//! single-threaded host loops and tests.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::time::Duration;

/// A one-shot deferred task.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks after a delay.
pub trait Scheduler {
    /// Run `task` once, no earlier than `delay` from now.
    fn post_delayed(&self, task: Task, delay: Duration);
}

struct Pending {
    deadline: Duration,
    seq: u64,
    task: Task,
}

impl Pending {
    fn key(&self) -> (Duration, u64) {
        (self.deadline, self.seq)
    }
}

// Ordered by (deadline, seq) only; `seq` is unique per scheduler.
impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_seq: u64,
    pending: BinaryHeap<Reverse<Pending>>,
}

/// Virtual-clock scheduler.
///
/// Time only moves when [`advance`](Self::advance) is called. Due tasks run
/// in deadline order; tasks with equal deadlines run in posting order.
#[derive(Default)]
pub struct ManualScheduler {
    state: RefCell<ClockState>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time, measured from construction.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of tasks not yet run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Move the clock forward by `by`, running every task that falls due.
    /// Tasks posted while advancing run too if their deadline is within the
    /// window. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now().saturating_add(by);
        let mut ran = 0;
        while let Some(task) = self.pop_due(target) {
            task();
            ran += 1;
        }
        self.state.borrow_mut().now = target;
        ran
    }

    /// Run every pending task, including ones posted along the way, moving
    /// the clock to each deadline in turn. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due(Duration::MAX) {
            task();
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, limit: Duration) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        if state.pending.peek()?.0.deadline > limit {
            return None;
        }
        let Reverse(due) = state.pending.pop()?;
        if due.deadline > state.now {
            state.now = due.deadline;
        }
        Some(due.task)
    }
}

impl Scheduler for ManualScheduler {
    fn post_delayed(&self, task: Task, delay: Duration) {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq;
        state.next_seq += 1;
        let deadline = state.now.saturating_add(delay);
        state.pending.push(Reverse(Pending {
            deadline,
            seq,
            task,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn push(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Task {
        let log = Rc::clone(log);
        Box::new(move || log.borrow_mut().push(name))
    }

    #[test]
    fn nothing_runs_before_deadline() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.post_delayed(push(&log, "a"), Duration::from_millis(100));

        assert_eq!(sched.advance(Duration::from_millis(99)), 0);
        assert!(log.borrow().is_empty());
        assert_eq!(sched.pending(), 1);

        assert_eq!(sched.advance(Duration::from_millis(1)), 1);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(sched.now(), Duration::from_millis(100));
    }

    #[test]
    fn deadline_then_posting_order() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.post_delayed(push(&log, "late"), Duration::from_millis(20));
        sched.post_delayed(push(&log, "early-1"), Duration::from_millis(10));
        sched.post_delayed(push(&log, "early-2"), Duration::from_millis(10));

        assert_eq!(sched.advance(Duration::from_millis(50)), 3);
        assert_eq!(*log.borrow(), vec!["early-1", "early-2", "late"]);
        assert_eq!(sched.now(), Duration::from_millis(50));
    }

    #[test]
    fn tasks_posted_while_advancing_run_if_due() {
        let sched = Rc::new(ManualScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&sched);
        let l = Rc::clone(&log);
        sched.post_delayed(
            Box::new(move || {
                l.borrow_mut().push("first");
                s.post_delayed(push(&l, "chained"), Duration::from_millis(5));
                s.post_delayed(push(&l, "too late"), Duration::from_millis(50));
            }),
            Duration::from_millis(10),
        );

        assert_eq!(sched.advance(Duration::from_millis(20)), 2);
        assert_eq!(*log.borrow(), vec!["first", "chained"]);
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn many_timers_fire_in_deadline_order() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for ms in [30u64, 10, 20, 10, 40, 0] {
            let l = Rc::clone(&log);
            sched.post_delayed(
                Box::new(move || l.borrow_mut().push(ms)),
                Duration::from_millis(ms),
            );
        }
        assert_eq!(sched.advance(Duration::from_millis(25)), 4);
        assert_eq!(*log.borrow(), vec![0, 10, 10, 20]);
        assert_eq!(sched.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec![0, 10, 10, 20, 30, 40]);
    }

    #[test]
    fn run_until_idle_drains_everything() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.post_delayed(push(&log, "b"), Duration::from_secs(2));
        sched.post_delayed(push(&log, "a"), Duration::from_secs(1));

        assert_eq!(sched.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(sched.now(), Duration::from_secs(2));
        assert_eq!(sched.pending(), 0);
    }
}
