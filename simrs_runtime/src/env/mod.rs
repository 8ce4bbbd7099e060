//! The simulation `Environment`: clock, event arena, and scheduler loop.

use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use simrs_core::{EventKey, Priority, VirtualTime};

use crate::condition::{self, Op};
use crate::error::{Error, Result};
use crate::event::{Event, EventState, Outcome, QueueEntry};
use crate::process::{Process, ProcessFuture};
use crate::value::{Failure, Value};

pub(crate) struct Inner {
    now: VirtualTime,
    events: simrs_tinymap::TinyMap<EventKey, EventState>,
    queue: BinaryHeap<QueueEntry>,
    sequence: u64,
    process_sequence: u64,
    processes: HashMap<EventKey, ProcessFuture>,
    unhandled_failure: Option<Failure>,
}

impl Inner {
    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }
}

/// Either a virtual time or an event: the two things `Environment::run` can stop on.
pub enum RunUntil {
    Time(VirtualTime),
    Event(Event),
}

impl From<f64> for RunUntil {
    fn from(time: f64) -> Self {
        RunUntil::Time(VirtualTime::new(time))
    }
}

impl From<VirtualTime> for RunUntil {
    fn from(time: VirtualTime) -> Self {
        RunUntil::Time(time)
    }
}

impl From<Event> for RunUntil {
    fn from(event: Event) -> Self {
        RunUntil::Event(event)
    }
}

impl From<Process> for RunUntil {
    fn from(process: Process) -> Self {
        RunUntil::Event(process.into_event())
    }
}

/// A simulation environment: the clock, the event arena, and the scheduler loop that drives them.
///
/// `Environment` is a cheap, `Clone`-able handle (an `Rc<RefCell<_>>` underneath), matching how
/// every primitive and every `Event` handle in this crate holds on to the environment that owns
/// them. It is not `Send`/`Sync`: the kernel is deliberately single-threaded.
#[derive(Clone)]
pub struct Environment(pub(crate) Rc<RefCell<Inner>>);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Inner {
            now: VirtualTime::ZERO,
            events: simrs_tinymap::TinyMap::new(),
            queue: BinaryHeap::new(),
            sequence: 0,
            process_sequence: 0,
            processes: HashMap::new(),
            unhandled_failure: None,
        })))
    }

    /// The current virtual time. Monotonically non-decreasing over the life of the environment.
    pub fn now(&self) -> VirtualTime {
        self.0.borrow().now
    }

    /// Creates a new, pending event owned by this environment.
    pub fn event(&self) -> Event {
        let key = self.alloc_event(false);
        Event::new(self.clone(), key)
    }

    fn alloc_event(&self, is_process: bool) -> EventKey {
        let mut state = EventState::new();
        state.is_process = is_process;
        self.0.borrow_mut().events.insert(state)
    }

    pub(crate) fn with_state<R>(&self, key: EventKey, f: impl FnOnce(&EventState) -> R) -> R {
        let inner = self.0.borrow();
        f(&inner.events[key])
    }

    pub(crate) fn add_callback(
        &self,
        key: EventKey,
        cb: Box<dyn FnOnce(&Environment, EventKey)>,
    ) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        let state = &mut inner.events[key];
        if state.processed {
            return Err(Error::InvalidState(
                "add_callback on an already-processed event".into(),
            ));
        }
        state.callbacks.push(cb);
        Ok(())
    }

    pub(crate) fn clear_callbacks(&self, key: EventKey) {
        self.0.borrow_mut().events[key].callbacks.clear();
    }

    /// Schedules `event` to fire at `now + delay` with the given priority.
    ///
    /// Fails with `InvalidArgument` if `delay` is negative, or `InvalidState` if `event` was
    /// already triggered: an event may only be scheduled once in its lifetime.
    pub fn schedule(&self, event: &Event, priority: Priority, delay: f64) -> Result<()> {
        if delay < 0.0 {
            return Err(Error::InvalidArgument(format!("negative delay: {delay}")));
        }
        let mut inner = self.0.borrow_mut();
        let now = inner.now;
        let sequence = inner.next_sequence();
        let state = &mut inner.events[event.key];
        if state.triggered {
            return Err(Error::InvalidState("event already triggered".into()));
        }
        state.triggered = true;
        inner.queue.push(QueueEntry { time: now + delay, priority, sequence, key: event.key });
        Ok(())
    }

    pub(crate) fn succeed(&self, key: EventKey, value: Value) -> Result<()> {
        self.trigger_outcome(key, Outcome::Ok(value))
    }

    pub(crate) fn fail(&self, key: EventKey, cause: Failure) -> Result<()> {
        self.trigger_outcome(key, Outcome::Fail(cause))
    }

    fn trigger_outcome(&self, key: EventKey, outcome: Outcome) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        let now = inner.now;
        let sequence = inner.next_sequence();
        let state = &mut inner.events[key];
        if state.triggered {
            return Err(Error::InvalidState("event already triggered".into()));
        }
        state.triggered = true;
        state.outcome = outcome;
        inner.queue.push(QueueEntry { time: now, priority: Priority::Normal, sequence, key });
        Ok(())
    }

    /// Creates an event that fires at `now + delay` carrying `value`.
    pub fn timeout(&self, delay: f64, value: Value) -> Result<Event> {
        if delay < 0.0 {
            return Err(Error::InvalidArgument(format!("negative timeout delay: {delay}")));
        }
        let event = self.event();
        self.0.borrow_mut().events[event.key].outcome = Outcome::Ok(value);
        self.schedule(&event, Priority::Normal, delay)?;
        Ok(event)
    }

    /// Spawns a coroutine as a `Process`, advancing it once before returning.
    pub fn process<F>(&self, coroutine: F) -> Process
    where
        F: std::future::Future<Output = std::result::Result<Value, Failure>> + 'static,
    {
        let key = self.alloc_event(true);
        let id = {
            let mut inner = self.0.borrow_mut();
            inner.process_sequence += 1;
            inner.processes.insert(key, Box::pin(coroutine));
            inner.process_sequence
        };
        tracing::debug!(process_id = id, ?key, "spawned process");
        self.drive_process(key);
        Process::new(Event::new(self.clone(), key))
    }

    /// Resumes a suspended process's coroutine one step, driven by its waker.
    pub(crate) fn drive_process(&self, key: EventKey) {
        let Some(mut future) = self.0.borrow_mut().processes.remove(&key) else {
            return;
        };

        let env = self.clone();
        let waker = waker_fn::waker_fn(move || env.drive_process(key));
        let mut cx = std::task::Context::from_waker(&waker);

        match std::future::Future::poll(future.as_mut(), &mut cx) {
            std::task::Poll::Ready(Ok(value)) => {
                let _ = self.succeed(key, value);
            }
            std::task::Poll::Ready(Err(failure)) => {
                let _ = self.fail(key, failure);
            }
            std::task::Poll::Pending => {
                self.0.borrow_mut().processes.insert(key, future);
            }
        }
    }

    /// Delivers an interrupt to a process, discarding it if the process has already terminated.
    ///
    /// The suspended coroutine is dropped rather than resumed with the failure injected at its
    /// next `.await` point: dropping still runs the `Drop` impl of any scoped guard (e.g. a
    /// `ResourceGuard`) the coroutine was holding, so resources are still released, but the
    /// coroutine itself cannot catch the interrupt and keep running.
    pub(crate) fn interrupt_process(&self, key: EventKey, cause: Failure) {
        let already_done = self.with_state(key, |s| s.triggered);
        if already_done {
            return;
        }
        self.0.borrow_mut().processes.remove(&key);
        let _ = self.fail(key, cause);
    }

    /// Returns an event that succeeds once every child event has succeeded, or fails as soon as
    /// any child fails.
    pub fn all_of(&self, events: impl IntoIterator<Item = Event>) -> Result<Event> {
        condition::condition(self, Op::All, events.into_iter().collect())
    }

    /// Returns an event that succeeds as soon as any child event succeeds, or fails as soon as
    /// any child fails.
    pub fn any_of(&self, events: impl IntoIterator<Item = Event>) -> Result<Event> {
        condition::condition(self, Op::Any, events.into_iter().collect())
    }

    /// Pops the earliest queued event, advances `now` to its time, and fires its callbacks.
    pub fn step(&self) -> Result<()> {
        let entry = self
            .0
            .borrow_mut()
            .queue
            .pop()
            .ok_or_else(|| Error::Empty("event queue is empty".into()))?;

        tracing::trace!(time = ?entry.time, priority = ?entry.priority, key = ?entry.key, "step");

        let (callbacks, unhandled) = {
            let mut inner = self.0.borrow_mut();
            if entry.time < inner.now {
                return Err(Error::Corruption(format!(
                    "clock moved backward: {} -> {}",
                    inner.now, entry.time
                )));
            }
            inner.now = entry.time;

            let state = &mut inner.events[entry.key];
            let callbacks = std::mem::take(&mut state.callbacks);
            let unhandled = state.is_process
                && callbacks.is_empty()
                && matches!(state.outcome, Outcome::Fail(_));
            let cause = if unhandled {
                match &state.outcome {
                    Outcome::Fail(f) => Some(f.clone()),
                    _ => None,
                }
            } else {
                None
            };
            state.processed = true;
            (callbacks, cause)
        };

        if let Some(cause) = unhandled {
            self.0.borrow_mut().unhandled_failure = Some(cause);
        }

        for cb in callbacks {
            cb(self, entry.key);
        }
        Ok(())
    }

    /// Runs the scheduler until `until` (a time or an event) is satisfied.
    ///
    /// Returns the stop event's success value, or raises its cause if it failed. Raises
    /// `Error::Empty` if the queue drains first, `Error::InvalidState` if `until` was an event
    /// that never fired, and `Error::Unhandled` if a process died with a failure nothing observed.
    pub fn run(&self, until: impl Into<RunUntil>) -> Result<Value> {
        let (stop, time_based) = match until.into() {
            RunUntil::Time(time) => {
                let stop = self.event();
                let delay = (time - self.now()).max(0.0);
                self.0.borrow_mut().events[stop.key].outcome = Outcome::Ok(Value::unit());
                self.schedule(&stop, Priority::Normal, delay)?;
                (stop, true)
            }
            RunUntil::Event(event) => (event, false),
        };

        loop {
            if let Some(failure) = self.0.borrow_mut().unhandled_failure.take() {
                tracing::warn!(?failure, "process failed with no subscriber observing it");
                return Err(Error::Unhandled(failure));
            }
            if stop.is_processed() {
                return match stop.is_ok() {
                    Some(true) => Ok(stop.value().expect("ok event carries a value")),
                    Some(false) => Err(Error::Unhandled(stop.cause().expect("failed event carries a cause"))),
                    None => unreachable!("a processed event always has an outcome"),
                };
            }
            if self.0.borrow().queue.is_empty() {
                if !time_based && !stop.is_triggered() {
                    return Err(Error::InvalidState(
                        "run(until: event) ended with the event never firing".into(),
                    ));
                }
                return Err(Error::Empty(
                    "event queue drained before the run condition was satisfied".into(),
                ));
            }
            self.step()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_rejects_negative_delay() {
        let env = Environment::new();
        let ev = env.event();
        assert!(matches!(env.schedule(&ev, Priority::Normal, -1.0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn schedule_rejects_double_trigger() {
        let env = Environment::new();
        let ev = env.event();
        env.schedule(&ev, Priority::Normal, 0.0).unwrap();
        assert!(matches!(env.schedule(&ev, Priority::Normal, 0.0), Err(Error::InvalidState(_))));
    }

    #[test]
    fn timeout_fires_with_value_and_advances_now() {
        let env = Environment::new();
        let ev = env.timeout(5.0, Value::new(42i32)).unwrap();
        let result = env.run(ev.clone()).unwrap();
        assert_eq!(result.downcast::<i32>(), Some(42));
        assert_eq!(env.now(), VirtualTime::new(5.0));
    }

    #[test]
    fn run_until_time_injects_stop_event() {
        let env = Environment::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for t in [1.0, 2.0, 10.0] {
            let seen = seen.clone();
            let ev = env.timeout(t, Value::unit()).unwrap();
            ev.add_callback(move |_, _| seen.borrow_mut().push(t)).unwrap();
        }
        env.run(5.0).unwrap();
        assert_eq!(*seen.borrow(), vec![1.0, 2.0]);
        assert_eq!(env.now(), VirtualTime::new(5.0));
    }

    #[test]
    fn run_empty_queue_returns_empty_error() {
        let env = Environment::new();
        let result = env.run(1.0);
        // the internal stop timeout keeps the queue non-empty, so this should succeed instead
        assert!(result.is_ok());
    }

    #[test]
    fn same_time_events_fire_in_insertion_order() {
        let env = Environment::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let a = env.timeout(5.0, Value::new("a")).unwrap();
        let b = env.timeout(5.0, Value::new("b")).unwrap();
        let order_a = order.clone();
        a.add_callback(move |_, _| order_a.borrow_mut().push("a")).unwrap();
        let order_b = order.clone();
        b.add_callback(move |_, _| order_b.borrow_mut().push("b")).unwrap();
        env.run(10.0).unwrap();
        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn two_processes_scheduling_the_same_timeout_fire_in_creation_order() {
        let env = Environment::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let clock_a = env.clone();
        let order_a = order.clone();
        env.process(async move {
            clock_a.timeout(5.0, Value::unit())?.await?;
            order_a.borrow_mut().push("a");
            Ok(Value::unit())
        });

        let clock_b = env.clone();
        let order_b = order.clone();
        let process_b = env.process(async move {
            clock_b.timeout(5.0, Value::unit())?.await?;
            order_b.borrow_mut().push("b");
            Ok(Value::unit())
        });

        env.run(process_b).unwrap();
        assert_eq!(*order.borrow(), vec!["a", "b"]);
        assert_eq!(env.now(), VirtualTime::new(5.0));
    }
}
