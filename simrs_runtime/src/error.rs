//! Error taxonomy for the simulation kernel.
//!
//! Synchronous misuse (bad arguments, re-triggering, crossing `Environment`s) unwinds through
//! [`Error`] the moment it happens. Model-level failures (a process panicking, `Event::fail`)
//! instead flow along the event graph as [`Failure`](crate::value::Failure) and only surface as
//! an [`Error::Unhandled`] if nothing in the model ever observes them.

use crate::value::Failure;

/// Synchronous errors raised directly by kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input to an operation: negative delay, non-positive amount, empty condition, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Misuse of an event or primitive's state machine: double-trigger, callback on a processed
    /// event, an event crossing `Environment`s, a process yielding something that isn't an event.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A hard-capped `Queue`/`Pool` operation would have exceeded capacity.
    #[error("overflow: {0}")]
    Overflow(String),

    /// The event queue drained, or `run(until)` was given an event that never fired.
    #[error("simulation ended without satisfying run condition: {0}")]
    Empty(String),

    /// The clock tried to move backward, or a stop condition fired out of order. Indicates a bug
    /// in the kernel itself rather than model misuse.
    #[error("scheduler corruption: {0}")]
    Corruption(String),

    /// A process terminated with a failure that nothing in the model was subscribed to observe.
    #[error("unhandled process failure: {0:?}")]
    Unhandled(Failure),
}

pub type Result<T> = std::result::Result<T, Error>;
