//! Type-erased payloads carried by events.

use std::fmt::Debug;
use std::rc::Rc;

use downcast_rs::{impl_downcast, Downcast};

/// Anything an event can carry as a success value, failure cause, or container item.
///
/// The kernel is single-threaded by design (see the concurrency model), so payloads only need to
/// be `Rc`-shareable, not `Send`/`Sync`.
pub trait Payload: Debug + Downcast {}
impl_downcast!(Payload);
impl<T: Debug + 'static> Payload for T {}

/// A type-erased, cheaply cloneable value.
///
/// `Value` is how success values, container items, and condition results move through the
/// kernel without forcing every primitive to be generic over the model's domain types.
#[derive(Clone, Debug)]
pub struct Value(Rc<dyn Payload>);

impl Value {
    pub fn new<T: Payload>(value: T) -> Self {
        Value(Rc::new(value))
    }

    /// The unit value, used by events and containers that carry no payload.
    pub fn unit() -> Self {
        Value::new(())
    }

    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Clones the underlying `T` out of this value.
    pub fn downcast<T: Payload + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl<T: Payload> From<T> for Value {
    fn from(value: T) -> Self {
        Value::new(value)
    }
}

/// The cause carried by a failed event.
///
/// Kept distinct from [`Value`] so call sites that deal with failures (process bodies, `run`'s
/// unhandled-failure path) read clearly, even though the representation is identical.
#[derive(Clone, Debug)]
pub struct Failure(Value);

impl Failure {
    pub fn new<T: Payload>(cause: T) -> Self {
        Failure(Value::new(cause))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl<T: Payload> From<T> for Failure {
    fn from(cause: T) -> Self {
        Failure::new(cause)
    }
}

/// A kind of [`Failure`] raised by `Process::interrupt`, distinguishable from an ordinary
/// `UserFailure` so a coroutine can choose to catch it.
#[derive(Clone, Debug)]
pub struct Interrupt(pub Value);
