#![forbid(unsafe_code)]

//! Containers mutated from inside their own observer callbacks.
//!
//! A mutation requested while the container is notifying must be applied
//! only after the in-flight mutation has reached every observer.

use std::cell::RefCell;
use std::rc::Rc;

use tether::prelude::*;
use tether::{Sequencer, SequencerOverflow};
use tether_harness::{Spy, capture_logs};

#[test]
fn reset_from_open_is_deferred_until_set_completes() {
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let controller = Controller::<i32>::new();

    let resetter = {
        let log = Rc::clone(&log);
        let handle = controller.clone();
        move |x: i32| {
            log.borrow_mut().push(format!("first open {x}"));
            handle.reset();
            let log = Rc::clone(&log);
            Scope::new(move || log.borrow_mut().push(format!("first close {x}")))
        }
    };
    let witness = {
        let log = Rc::clone(&log);
        move |x: i32| {
            log.borrow_mut().push(format!("second open {x}"));
            let log = Rc::clone(&log);
            Scope::new(move || log.borrow_mut().push(format!("second close {x}")))
        }
    };
    let _first = controller.subscribe(resetter);
    let _second = controller.subscribe(witness);

    controller.set(1);
    assert_eq!(
        *log.borrow(),
        vec!["first open 1", "second open 1", "second close 1", "first close 1"]
    );
}

#[test]
fn cell_feedback_converges_in_order() {
    let cell = Cell::new(0u32);
    let spy = Spy::<u32>::new();
    let handle = cell.clone();
    let _bump = cell.subscribe(move |x: u32| {
        if x % 2 == 1 {
            handle.mutate(|n| n + 1);
        }
        Scope::noop()
    });
    let _sub = cell.subscribe(spy.observer());
    spy.take();

    cell.set(1);
    assert_eq!(spy.lines(), vec!["close 0", "open 1", "close 1", "open 2"]);
}

#[test]
fn pool_entry_released_from_replay_callback() {
    let pool = Pool::<&'static str>::new();
    let spy = Spy::<&'static str>::new();
    let _sub = pool.subscribe(spy.observer());
    let slot = Rc::new(RefCell::new(Some(pool.add("transient"))));
    let _kept = pool.add("kept");
    spy.take();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let record = Rc::clone(&seen);
    let taker = Rc::clone(&slot);
    let _remover = pool.subscribe(move |x: &'static str| {
        record.borrow_mut().push(x);
        if x == "transient" {
            drop(taker.borrow_mut().take());
        }
        Scope::noop()
    });

    assert_eq!(*seen.borrow(), vec!["transient", "kept"], "replay finishes first");
    assert_eq!(spy.lines(), vec!["close transient"]);
}

#[test]
fn dict_cascading_puts_leave_one_entry_per_key() {
    let dict = Dict::<&'static str, u32>::new();
    let handle = dict.clone();
    let _cascade = dict.subscribe(move |entry: Both<&'static str, u32>| {
        if entry.first == "a" && entry.second < 5 {
            handle.put("a", entry.second + 1);
            handle.put("b", entry.second);
        }
        Scope::noop()
    });
    let spy = Spy::<Both<&'static str, u32>>::new();
    let _sub = dict.subscribe(spy.observer());

    dict.put("a", 1);
    let mut live = spy.live();
    live.sort();
    assert_eq!(live, vec![Both::new("a", 5), Both::new("b", 4)]);
}

fn endless(controller: &Controller<u64>) -> Scope {
    let handle = controller.clone();
    controller.subscribe(move |n: u64| {
        handle.set(n + 1);
        Scope::noop()
    })
}

#[test]
fn unbounded_feedback_loop_panics_with_overflow() {
    let controller = Controller::<u64>::new();
    let _loop = endless(&controller);
    let (result, logs) = capture_logs(tracing::Level::ERROR, || {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| controller.set(0)))
    });
    let payload = result.expect_err("feedback loop must overflow");
    let message = payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_default();
    assert!(message.starts_with("sequencer overflow"), "{message}");
    assert!(logs.contains("sequencer overflow"), "{logs}");
}

#[test]
fn standalone_sequencer_reports_overflow_as_error() {
    let seq = Rc::new(Sequencer::new());
    let spin = Rc::new(RefCell::new(None::<Rc<dyn Fn()>>));
    let s = Rc::clone(&seq);
    let again = Rc::clone(&spin);
    *spin.borrow_mut() = Some(Rc::new(move || {
        let next = again.borrow().clone();
        if let Some(next) = next {
            s.sequence(move || next());
        }
    }));
    let first = spin.borrow().clone().expect("installed above");
    let result: Result<(), SequencerOverflow> = seq.try_sequence(move || first());
    let overflow = result.expect_err("spin must overflow");
    assert_eq!(overflow.limit, tether::MAX_SEQUENCED_TASKS);
    assert_eq!(overflow.discarded, 1);
    spin.borrow_mut().take();
}
