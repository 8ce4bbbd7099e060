//! Coroutine-driven processes.
//!
//! A process body is an ordinary Rust `async` function or block that `.await`s [`Event`]s. The
//! environment drives it with a minimal, single-threaded executor: there is no reactor, no I/O
//! polling, and no thread pool. The only thing that ever wakes a suspended process is one of the
//! events it `.await`ed firing during a later `Environment::step`.

use std::future::Future;
use std::pin::Pin;

use crate::env::Environment;
use crate::event::Event;
use crate::value::{Failure, Interrupt, Value};

pub(crate) type ProcessFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, Failure>>>>;

/// A running coroutine, modeled as an [`Event`] that fires when the coroutine returns or fails.
///
/// `Process` derefs to its underlying [`Event`], so it can be `.await`ed, passed to
/// `Environment::all_of`/`any_of`, or used as a `run` stop condition exactly like any other event.
#[derive(Clone, Debug)]
pub struct Process(Event);

impl Process {
    pub(crate) fn new(event: Event) -> Self {
        Self(event)
    }

    pub fn into_event(self) -> Event {
        self.0
    }

    /// Schedules a failure delivery that discards a still-suspended process's coroutine.
    ///
    /// Dropping the coroutine still runs the `Drop` impl of any scoped guard it was holding (a
    /// `ResourceGuard` acquired earlier in the body, for instance), so resources it held are
    /// released, but the coroutine itself does not get a chance to catch the interrupt and keep
    /// running. Interrupting a process that has already terminated is a no-op.
    pub fn interrupt(&self, cause: Value) {
        self.0.env.interrupt_process(self.0.key(), Failure::new(Interrupt(cause)));
    }
}

impl std::ops::Deref for Process {
    type Target = Event;
    fn deref(&self) -> &Event {
        &self.0
    }
}

impl From<Process> for Event {
    fn from(process: Process) -> Self {
        process.0
    }
}
