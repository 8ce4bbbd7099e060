//! The event state machine and the scheduler's queue entry type.

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use simrs_core::{EventKey, Priority, VirtualTime};

use crate::env::Environment;
use crate::value::{Failure, Value};

/// The outcome of an event once it has fired.
#[derive(Clone, Debug)]
pub enum Outcome {
    Pending,
    Ok(Value),
    Fail(Failure),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }
}

type Callback = Box<dyn FnOnce(&Environment, EventKey)>;

/// The arena-owned half of an event: everything the scheduler needs, independent of any handle
/// held by model code.
pub(crate) struct EventState {
    pub(crate) triggered: bool,
    pub(crate) processed: bool,
    pub(crate) outcome: Outcome,
    pub(crate) callbacks: Vec<Callback>,
    /// Set for the event representing a `Process`'s completion, so `Environment::step` can detect
    /// an unobserved process failure.
    pub(crate) is_process: bool,
}

impl EventState {
    pub(crate) fn new() -> Self {
        Self {
            triggered: false,
            processed: false,
            outcome: Outcome::Pending,
            callbacks: Vec::new(),
            is_process: false,
        }
    }
}

/// A scheduler queue entry: `(time, priority, sequence, event)`, compared so that a
/// [`std::collections::BinaryHeap`] (a max-heap) pops the earliest entry first.
///
/// `sequence` is a per-`Environment` insertion counter; it guarantees FIFO delivery among entries
/// that share a `(time, priority)`, per the ordering contract in the concurrency model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueEntry {
    pub(crate) time: VirtualTime,
    pub(crate) priority: Priority,
    pub(crate) sequence: u64,
    pub(crate) key: EventKey,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, and we want the smallest (time, priority, sequence)
        // to come out first.
        (other.time, other.priority, other.sequence).cmp(&(self.time, self.priority, self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A handle to an event owned by an [`Environment`].
///
/// `Event` is `Clone` and cheap to copy around: it is just an `Environment` handle plus a key.
/// It also implements [`Future`], so process bodies can `.await` it directly.
#[derive(Clone)]
pub struct Event {
    pub(crate) env: Environment,
    pub(crate) key: EventKey,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("key", &self.key).finish()
    }
}

impl Event {
    pub(crate) fn new(env: Environment, key: EventKey) -> Self {
        Self { env, key }
    }

    pub fn key(&self) -> EventKey {
        self.key
    }

    pub fn is_triggered(&self) -> bool {
        self.env.with_state(self.key, |s| s.triggered)
    }

    pub fn is_processed(&self) -> bool {
        self.env.with_state(self.key, |s| s.processed)
    }

    pub fn is_ok(&self) -> Option<bool> {
        self.env.with_state(self.key, |s| match s.outcome {
            Outcome::Pending => None,
            Outcome::Ok(_) => Some(true),
            Outcome::Fail(_) => Some(false),
        })
    }

    pub fn value(&self) -> Option<Value> {
        self.env.with_state(self.key, |s| match &s.outcome {
            Outcome::Ok(v) => Some(v.clone()),
            _ => None,
        })
    }

    pub fn cause(&self) -> Option<Failure> {
        self.env.with_state(self.key, |s| match &s.outcome {
            Outcome::Fail(f) => Some(f.clone()),
            _ => None,
        })
    }

    /// Appends a callback, invoked once this event fires, in registration order with its peers.
    ///
    /// Fails with `InvalidState` if the event has already been processed.
    pub fn add_callback(&self, cb: impl FnOnce(&Environment, EventKey) + 'static) -> crate::Result<()> {
        self.env.add_callback(self.key, Box::new(cb))
    }

    /// Transitions pending -> triggered-ok, scheduling the event at `now` with `Priority::Normal`.
    pub fn succeed(&self, value: Value) -> crate::Result<()> {
        self.env.succeed(self.key, value)
    }

    /// Transitions pending -> triggered-fail, scheduling the event at `now` with `Priority::Normal`.
    pub fn fail(&self, cause: Failure) -> crate::Result<()> {
        self.env.fail(self.key, cause)
    }

    /// Copies `other`'s outcome into `self` and schedules `self`.
    pub fn trigger(&self, other: &Event) -> crate::Result<()> {
        match other.env.with_state(other.key, |s| s.outcome.clone()) {
            Outcome::Ok(v) => self.succeed(v),
            Outcome::Fail(f) => self.fail(f),
            Outcome::Pending => Err(crate::Error::InvalidState(
                "cannot trigger from a pending event".into(),
            )),
        }
    }
}

impl Future for Event {
    type Output = Result<Value, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = self.env.with_state(self.key, |s| s.outcome.clone());
        match outcome {
            Outcome::Ok(v) => Poll::Ready(Ok(v)),
            Outcome::Fail(f) => Poll::Ready(Err(f)),
            Outcome::Pending => {
                let waker = cx.waker().clone();
                // Ignore InvalidState: an event that became processed between the check above and
                // here has already fired, and the task will be polled again regardless.
                let _ = self.env.add_callback(self.key, Box::new(move |_, _| waker.wake()));
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn queue_entry_orders_by_time_then_priority_then_sequence() {
        let k = EventKey::from(0);
        let mut heap = BinaryHeap::new();
        heap.push(QueueEntry { time: VirtualTime::new(5.0), priority: Priority::Normal, sequence: 2, key: k });
        heap.push(QueueEntry { time: VirtualTime::new(1.0), priority: Priority::Normal, sequence: 0, key: k });
        heap.push(QueueEntry { time: VirtualTime::new(1.0), priority: Priority::Urgent, sequence: 1, key: k });

        let popped: Vec<_> = std::iter::from_fn(|| heap.pop()).collect();
        assert_eq!(popped[0].time, VirtualTime::new(1.0));
        assert_eq!(popped[0].priority, Priority::Urgent);
        assert_eq!(popped[1].time, VirtualTime::new(1.0));
        assert_eq!(popped[1].priority, Priority::Normal);
        assert_eq!(popped[2].time, VirtualTime::new(5.0));
    }
}
