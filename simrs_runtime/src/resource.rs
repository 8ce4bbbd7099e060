//! `Resource`: a capacity-bounded pool of interchangeable slots.

use std::cell::RefCell;
use std::rc::Rc;

use simrs_core::EventKey;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::value::Value;

struct Inner {
    capacity: usize,
    users: Vec<EventKey>,
    queue: Vec<EventKey>,
}

/// A capacity-bounded resource: `request()` yields a slot when one is free, `release()` returns
/// it. Waiters are served strict FIFO.
#[derive(Clone)]
pub struct Resource {
    env: Environment,
    inner: Rc<RefCell<Inner>>,
}

impl Resource {
    pub fn new(env: &Environment, capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::InvalidArgument("resource capacity must be >= 1".into()));
        }
        Ok(Self {
            env: env.clone(),
            inner: Rc::new(RefCell::new(Inner { capacity, users: Vec::new(), queue: Vec::new() })),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Number of slots currently held.
    pub fn count(&self) -> usize {
        self.inner.borrow().users.len()
    }

    /// Keys of the requests currently holding a slot, in acquisition order.
    pub fn users(&self) -> Vec<EventKey> {
        self.inner.borrow().users.clone()
    }

    /// Requests a slot. The returned event succeeds once a slot is allocated.
    pub fn request(&self) -> Event {
        let event = self.env.event();
        self.inner.borrow_mut().queue.push(event.key());
        self.try_fulfill();
        event
    }

    /// Requests a slot behind a [`ResourceGuard`] that releases (or cancels, if still pending) on
    /// `Drop`, satisfying the scoped-acquisition idiom required by the resource model.
    pub fn request_scoped(&self) -> ResourceGuard {
        ResourceGuard { resource: self.clone(), request: self.request(), settled: false }
    }

    /// Releases a slot held by `request`, which must be one of this resource's holders.
    pub fn release(&self, request: &Event) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let position = inner
            .users
            .iter()
            .position(|&key| key == request.key())
            .ok_or_else(|| Error::InvalidState("release of a request this resource is not holding".into()))?;
        inner.users.remove(position);
        drop(inner);
        self.try_fulfill();
        Ok(())
    }

    /// Cancels a pending (not yet fulfilled) request. A no-op if it already fired or was never
    /// enqueued, per the cancellation-idempotence guarantee.
    pub fn cancel(&self, request: &Event) -> Result<()> {
        if request.is_triggered() {
            return Ok(());
        }
        self.inner.borrow_mut().queue.retain(|&key| key != request.key());
        self.env.clear_callbacks(request.key());
        Ok(())
    }

    fn try_fulfill(&self) {
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                if inner.users.len() >= inner.capacity || inner.queue.is_empty() {
                    None
                } else {
                    let key = inner.queue.remove(0);
                    inner.users.push(key);
                    Some(key)
                }
            };
            match next {
                Some(key) => {
                    let _ = self.env.succeed(key, Value::unit());
                }
                None => break,
            }
        }
    }
}

/// A scoped acquisition of a [`Resource`] slot.
///
/// Await [`ResourceGuard::event`] to wait for the slot; when the guard is dropped, it releases the
/// slot if it was held, or cancels the pending request if it was not (e.g. the guard lost a race
/// in an `any_of` against a timeout). Call [`ResourceGuard::release`] to release explicitly before
/// the guard's scope ends.
pub struct ResourceGuard {
    resource: Resource,
    request: Event,
    settled: bool,
}

impl ResourceGuard {
    pub fn event(&self) -> &Event {
        &self.request
    }

    /// Releases the slot now, consuming the guard.
    pub fn release(mut self) -> Result<()> {
        self.settled = true;
        self.resource.release(&self.request)
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        if self.request.is_ok() == Some(true) {
            let _ = self.resource.release(&self.request);
        } else if !self.request.is_triggered() {
            let _ = self.resource.cancel(&self.request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_waits_for_release() {
        let env = Environment::new();
        let resource = Resource::new(&env, 1).unwrap();
        let first = resource.request();
        let second = resource.request();
        assert!(first.is_triggered());
        assert!(!second.is_triggered());

        env.run(first.clone()).unwrap();
        resource.release(&first).unwrap();
        assert!(second.is_triggered());
    }

    #[test]
    fn cancel_is_idempotent() {
        let env = Environment::new();
        let resource = Resource::new(&env, 1).unwrap();
        let first = resource.request();
        let second = resource.request();
        resource.cancel(&second).unwrap();
        resource.cancel(&second).unwrap();

        env.run(first.clone()).unwrap();
        resource.release(&first).unwrap();
        assert!(!second.is_triggered());
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let env = Environment::new();
        assert!(Resource::new(&env, 0).is_err());
    }

    #[test]
    fn scoped_acquisition_releases_when_the_scope_times_out() {
        let env = Environment::new();
        let resource = Resource::new(&env, 1).unwrap();

        let resource_a = resource.clone();
        let clock_a = env.clone();
        env.process(async move {
            let _guard = resource_a.request_scoped();
            clock_a.timeout(5.0, Value::unit())?.await?;
            Ok(Value::unit())
        });

        let resource_b = resource.clone();
        let clock_b = env.clone();
        let acquired_at = Rc::new(RefCell::new(None));
        let acquired_at_inner = acquired_at.clone();
        let process_b = env.process(async move {
            clock_b.timeout(3.0, Value::unit())?.await?;
            resource_b.request().await?;
            *acquired_at_inner.borrow_mut() = Some(clock_b.now());
            Ok(Value::unit())
        });

        env.run(process_b).unwrap();
        assert_eq!(*acquired_at.borrow(), Some(simrs_core::VirtualTime::new(5.0)));
    }
}
