#![forbid(unsafe_code)]

//! Recording observers.
//!
//! A [`Spy`] hands out observers that append an [`Event`] for every open and
//! every close. The recorded stream can then be checked for ordering and for
//! the one-close-per-open discipline.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::json;
use tether::{Observer, Scope};

/// One entry in a recorded activation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
    Open(T),
    Close(T),
}

impl<T> Event<T> {
    /// The activation data.
    pub fn data(&self) -> &T {
        match self {
            Self::Open(data) | Self::Close(data) => data,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

impl<T: fmt::Display> fmt::Display for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(data) => write!(f, "open {data}"),
            Self::Close(data) => write!(f, "close {data}"),
        }
    }
}

/// Shared recorder for open/close events.
///
/// Clones record into the same stream.
pub struct Spy<T> {
    events: Rc<RefCell<Vec<Event<T>>>>,
}

impl<T> Clone for Spy<T> {
    fn clone(&self) -> Self {
        Self {
            events: Rc::clone(&self.events),
        }
    }
}

impl<T> Default for Spy<T> {
    fn default() -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Spy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spy")
            .field("events", &self.events.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> Spy<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer recording into this spy.
    pub fn observer(&self) -> impl Observer<T> + 'static {
        let events = Rc::clone(&self.events);
        move |data: T| {
            events.borrow_mut().push(Event::Open(data.clone()));
            let events = Rc::clone(&events);
            Scope::new(move || events.borrow_mut().push(Event::Close(data)))
        }
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<Event<T>> {
        self.events.borrow().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<Event<T>> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn opens(&self) -> usize {
        self.events.borrow().iter().filter(|e| e.is_open()).count()
    }

    pub fn closes(&self) -> usize {
        self.events.borrow().iter().filter(|e| !e.is_open()).count()
    }
}

impl<T: Clone + PartialEq + 'static> Spy<T> {
    /// Activations opened and not yet closed, in opening order.
    ///
    /// A close retires the most recent matching open.
    ///
    /// # Panics
    ///
    /// Panics if a close has no matching open.
    pub fn live(&self) -> Vec<T> {
        let mut live: Vec<T> = Vec::new();
        for event in self.events.borrow().iter() {
            match event {
                Event::Open(data) => live.push(data.clone()),
                Event::Close(data) => {
                    let index = live
                        .iter()
                        .rposition(|d| d == data)
                        .unwrap_or_else(|| panic!("close without a matching open"));
                    live.remove(index);
                }
            }
        }
        live
    }
}

impl<T: fmt::Display> Spy<T> {
    /// Recorded events as `"open x"` / `"close x"` lines.
    pub fn lines(&self) -> Vec<String> {
        self.events.borrow().iter().map(ToString::to_string).collect()
    }

    /// Drain as lines.
    pub fn take_lines(&self) -> Vec<String> {
        let events = std::mem::take(&mut *self.events.borrow_mut());
        events.iter().map(ToString::to_string).collect()
    }

    /// Recorded events as one JSON object per line.
    pub fn to_jsonl(&self) -> String {
        self.events
            .borrow()
            .iter()
            .enumerate()
            .map(|(seq, event)| {
                let kind = if event.is_open() { "open" } else { "close" };
                json!({ "seq": seq, "event": kind, "data": event.data().to_string() })
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether::{Observable, Pool};

    #[test]
    fn records_open_and_close() {
        let spy = Spy::<i32>::new();
        let pool = Pool::<i32>::new();
        let sub = pool.subscribe(spy.observer());
        let entry = pool.add(1);
        drop(entry);
        drop(sub);
        assert_eq!(spy.events(), vec![Event::Open(1), Event::Close(1)]);
        assert_eq!(spy.lines(), vec!["open 1", "close 1"]);
    }

    #[test]
    fn live_retires_latest_duplicate() {
        let spy = Spy::<&'static str>::new();
        let pool = Pool::<&'static str>::new();
        let _sub = pool.subscribe(spy.observer());
        let _a = pool.add("a");
        let _b = pool.add("b");
        let second = pool.add("a");
        drop(second);
        assert_eq!(spy.live(), vec!["a", "b"]);
        assert_eq!(spy.opens(), 3);
        assert_eq!(spy.closes(), 1);
    }

    #[test]
    fn jsonl_is_one_object_per_event() {
        let spy = Spy::<i32>::new();
        let pool = Pool::<i32>::new();
        let _sub = pool.subscribe(spy.observer());
        drop(pool.add(5));
        let out = spy.to_jsonl();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).expect("valid json"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "open");
        assert_eq!(lines[1]["event"], "close");
        assert_eq!(lines[1]["data"], "5");
        assert_eq!(lines[1]["seq"], 1);
    }

    #[test]
    fn take_drains() {
        let spy = Spy::<i32>::new();
        let pool = Pool::<i32>::new();
        let _sub = pool.subscribe(spy.observer());
        let _e = pool.add(2);
        assert_eq!(spy.take_lines(), vec!["open 2"]);
        assert!(spy.take().is_empty());
    }
}
