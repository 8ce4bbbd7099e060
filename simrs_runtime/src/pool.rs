//! `Pool`: a numeric, divisible resource level, with FIFO or priority-ordered waiters.

use std::cell::RefCell;
use std::rc::Rc;

use simrs_core::EventKey;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::priority::PriorityKey;
use crate::value::{Failure, Value};

type Hook = Box<dyn Fn(f64)>;

struct Request {
    key: EventKey,
    amount: f64,
    priority: PriorityKey,
}

struct Inner {
    capacity: f64,
    /// Bounds `level` plus everything still queued to be put; a `put` that would push the pool's
    /// eventual total past this fails immediately rather than queuing.
    hard_cap: Option<f64>,
    level: f64,
    prioritized: bool,
    put_waiters: Vec<Request>,
    get_waiters: Vec<Request>,
    at_least: Vec<(f64, EventKey)>,
    at_most: Vec<(f64, EventKey)>,
    on_put: Option<Hook>,
    on_get: Option<Hook>,
}

/// A continuous, divisible resource level bounded by `capacity`. `put`/`get` move an arbitrary
/// `amount` in or out; waiters are served strict FIFO (or, for [`Pool::new_priority`], strict
/// priority order: a request that cannot yet be satisfied blocks everything behind it, so a later,
/// smaller, lower-priority request never jumps the queue).
#[derive(Clone)]
pub struct Pool {
    env: Environment,
    inner: Rc<RefCell<Inner>>,
}

fn require_positive(amount: f64) -> Result<()> {
    if !(amount > 0.0) {
        Err(Error::InvalidArgument(format!("amount must be positive, got {amount}")))
    } else {
        Ok(())
    }
}

impl Pool {
    pub fn new(env: &Environment, capacity: f64, initial_level: f64) -> Result<Self> {
        Self::build(env, capacity, None, initial_level, false)
    }

    /// A `PriorityPool`: `put`/`get` take an explicit priority via
    /// [`Pool::put_with_priority`]/[`Pool::get_with_priority`].
    pub fn new_priority(env: &Environment, capacity: f64, initial_level: f64) -> Result<Self> {
        Self::build(env, capacity, None, initial_level, true)
    }

    pub fn with_hard_cap(env: &Environment, capacity: f64, initial_level: f64, hard_cap: f64) -> Result<Self> {
        if hard_cap < capacity {
            return Err(Error::InvalidArgument("hard cap must be >= capacity".into()));
        }
        Self::build(env, capacity, Some(hard_cap), initial_level, false)
    }

    fn build(
        env: &Environment,
        capacity: f64,
        hard_cap: Option<f64>,
        initial_level: f64,
        prioritized: bool,
    ) -> Result<Self> {
        if !(capacity > 0.0) {
            return Err(Error::InvalidArgument("pool capacity must be positive".into()));
        }
        if initial_level < 0.0 || initial_level > capacity {
            return Err(Error::InvalidArgument(
                "initial level must be within [0, capacity]".into(),
            ));
        }
        Ok(Self {
            env: env.clone(),
            inner: Rc::new(RefCell::new(Inner {
                capacity,
                hard_cap,
                level: initial_level,
                prioritized,
                put_waiters: Vec::new(),
                get_waiters: Vec::new(),
                at_least: Vec::new(),
                at_most: Vec::new(),
                on_put: None,
                on_get: None,
            })),
        })
    }

    pub fn set_on_put(&self, hook: impl Fn(f64) + 'static) {
        self.inner.borrow_mut().on_put = Some(Box::new(hook));
    }

    pub fn set_on_get(&self, hook: impl Fn(f64) + 'static) {
        self.inner.borrow_mut().on_get = Some(Box::new(hook));
    }

    pub fn capacity(&self) -> f64 {
        self.inner.borrow().capacity
    }

    pub fn level(&self) -> f64 {
        self.inner.borrow().level
    }

    pub fn remaining(&self) -> f64 {
        let inner = self.inner.borrow();
        inner.capacity - inner.level
    }

    pub fn put(&self, amount: f64) -> Event {
        self.put_with_priority(amount, PriorityKey(0.0))
    }

    pub fn put_with_priority(&self, amount: f64, priority: PriorityKey) -> Event {
        let event = self.env.event();
        if let Err(err) = require_positive(amount) {
            let _ = event.fail(Failure::new(err));
            return event;
        }
        let overflowed = {
            let mut inner = self.inner.borrow_mut();
            let pending: f64 = inner.put_waiters.iter().map(|r| r.amount).sum();
            if let Some(cap) = inner.hard_cap {
                if inner.level + pending + amount > cap {
                    true
                } else {
                    insert_request(&mut inner.put_waiters, event.key(), amount, priority, inner.prioritized);
                    false
                }
            } else {
                insert_request(&mut inner.put_waiters, event.key(), amount, priority, inner.prioritized);
                false
            }
        };
        if overflowed {
            let _ = event.fail(Failure::new(Error::Overflow("pool hard cap exceeded".into())));
        } else {
            let this = self.clone();
            let _ = event.add_callback(move |_, _| this.try_get());
            self.try_put();
        }
        event
    }

    pub fn get(&self, amount: f64) -> Event {
        self.get_with_priority(amount, PriorityKey(0.0))
    }

    pub fn get_with_priority(&self, amount: f64, priority: PriorityKey) -> Event {
        let event = self.env.event();
        if let Err(err) = require_positive(amount) {
            let _ = event.fail(Failure::new(err));
            return event;
        }
        if amount > self.capacity() {
            let _ = event.fail(Failure::new(Error::InvalidArgument(format!(
                "requested amount {amount} exceeds pool capacity"
            ))));
            return event;
        }
        {
            let mut inner = self.inner.borrow_mut();
            let prioritized = inner.prioritized;
            insert_request(&mut inner.get_waiters, event.key(), amount, priority, prioritized);
        }
        let this = self.clone();
        let _ = event.add_callback(move |_, _| this.try_put());
        self.try_get();
        event
    }

    /// A scoped `get`: the amount is automatically returned via `put` when the guard drops, unless
    /// [`PoolGuard::consume`] was called first.
    pub fn get_scoped(&self, amount: f64) -> PoolGuard {
        PoolGuard { pool: self.clone(), request: self.get(amount), amount, settled: false }
    }

    pub fn when_at_least(&self, amount: f64) -> Event {
        let event = self.env.event();
        if self.level() >= amount {
            let _ = event.succeed(Value::unit());
        } else {
            self.inner.borrow_mut().at_least.push((amount, event.key()));
        }
        event
    }

    pub fn when_at_most(&self, amount: f64) -> Event {
        let event = self.env.event();
        if self.level() <= amount {
            let _ = event.succeed(Value::unit());
        } else {
            self.inner.borrow_mut().at_most.push((amount, event.key()));
        }
        event
    }

    /// Fires once the pool holds more than a negligible amount. Uses `f64::EPSILON` as the
    /// threshold for "negligible", matching the machine-epsilon convention rather than the smallest
    /// representable positive float.
    pub fn when_any(&self) -> Event {
        self.when_at_least(f64::EPSILON)
    }

    pub fn when_full(&self) -> Event {
        self.when_at_least(self.capacity())
    }

    pub fn when_empty(&self) -> Event {
        self.when_at_most(0.0)
    }

    /// Fires once the pool has room for at least `epsilon` more units.
    pub fn when_not_full(&self, epsilon: f64) -> Event {
        self.when_at_most(self.capacity() - epsilon)
    }

    fn try_put(&self) {
        loop {
            let fulfilled = {
                let mut inner = self.inner.borrow_mut();
                let Some(head) = inner.put_waiters.first() else { break };
                let space = inner.capacity - inner.level;
                if head.amount > space {
                    break;
                }
                let request = inner.put_waiters.remove(0);
                inner.level += request.amount;
                Some(request)
            };
            let Some(request) = fulfilled else { break };
            if let Some(hook) = self.inner.borrow().on_put.as_ref() {
                hook(request.amount);
            }
            let _ = self.env.succeed(request.key, Value::unit());
            self.fire_thresholds();
        }
    }

    fn try_get(&self) {
        loop {
            let fulfilled = {
                let mut inner = self.inner.borrow_mut();
                let Some(head) = inner.get_waiters.first() else { break };
                if head.amount > inner.level {
                    break;
                }
                let request = inner.get_waiters.remove(0);
                inner.level -= request.amount;
                Some(request)
            };
            let Some(request) = fulfilled else { break };
            if let Some(hook) = self.inner.borrow().on_get.as_ref() {
                hook(request.amount);
            }
            let _ = self.env.succeed(request.key, Value::new(request.amount));
            self.fire_thresholds();
        }
    }

    fn fire_thresholds(&self) {
        let level = self.level();
        let (at_least_ready, at_most_ready) = {
            let mut inner = self.inner.borrow_mut();
            let mut least_ready = Vec::new();
            inner.at_least.retain(|&(n, key)| {
                if level >= n {
                    least_ready.push(key);
                    false
                } else {
                    true
                }
            });
            let mut most_ready = Vec::new();
            inner.at_most.retain(|&(n, key)| {
                if level <= n {
                    most_ready.push(key);
                    false
                } else {
                    true
                }
            });
            (least_ready, most_ready)
        };
        for key in at_least_ready.into_iter().chain(at_most_ready) {
            let _ = self.env.succeed(key, Value::unit());
        }
    }

    /// Cancels a pending `put`/`get` request or not-yet-fired threshold event. A no-op if it
    /// already fired.
    pub fn cancel(&self, request: &Event) -> Result<()> {
        if request.is_triggered() {
            return Ok(());
        }
        let mut inner = self.inner.borrow_mut();
        inner.put_waiters.retain(|r| r.key != request.key());
        inner.get_waiters.retain(|r| r.key != request.key());
        inner.at_least.retain(|&(_, key)| key != request.key());
        inner.at_most.retain(|&(_, key)| key != request.key());
        drop(inner);
        self.env.clear_callbacks(request.key());
        Ok(())
    }
}

/// Inserts `request` in FIFO order, or, for priority pools, stable-sorted by priority (ties broken
/// FIFO). Strict order is what lets `try_put`/`try_get` use "the head blocks everyone behind it"
/// (`break`, never `continue`) instead of scanning past an unsatisfiable head for a smaller request
/// further back — the discipline that keeps a priority pool from starving low-priority waiters
/// behind an ever-refilling stream of higher-priority ones.
fn insert_request(
    waiters: &mut Vec<Request>,
    key: EventKey,
    amount: f64,
    priority: PriorityKey,
    prioritized: bool,
) {
    let request = Request { key, amount, priority };
    if !prioritized {
        waiters.push(request);
        return;
    }
    let position = waiters.iter().position(|r| r.priority > priority).unwrap_or(waiters.len());
    waiters.insert(position, request);
}

/// A scoped `get` from a [`Pool`]: returns the amount via `put` on `Drop` unless consumed.
pub struct PoolGuard {
    pool: Pool,
    request: Event,
    amount: f64,
    settled: bool,
}

impl PoolGuard {
    pub fn event(&self) -> &Event {
        &self.request
    }

    /// Marks the amount as permanently consumed: it will not be returned to the pool on drop.
    pub fn consume(mut self) {
        self.settled = true;
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        if self.request.is_ok() == Some(true) {
            self.pool.put(self.amount);
        } else if !self.request.is_triggered() {
            let _ = self.pool.cancel(&self.request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_waits_for_level() {
        let env = Environment::new();
        let pool = Pool::new(&env, 10.0, 0.0).unwrap();
        let get = pool.get(4.0);
        assert!(!get.is_triggered());
        let put = pool.put(4.0);
        env.run(put.clone()).unwrap();
        assert!(get.is_triggered());
    }

    #[test]
    fn priority_put_blocks_lower_priority_behind_unsatisfiable_head() {
        let env = Environment::new();
        let pool = Pool::new_priority(&env, 10.0, 10.0).unwrap();
        // drain the pool so both gets must wait
        pool.get(10.0);
        let high = pool.get_with_priority(8.0, PriorityKey(0.0));
        let low = pool.get_with_priority(2.0, PriorityKey(1.0));
        let first_put = pool.put(5.0);
        env.run(first_put.clone()).unwrap();
        assert!(!high.is_triggered());
        assert!(!low.is_triggered(), "low priority must not jump ahead of an unsatisfied head");
        let second_put = pool.put(3.0);
        env.run(second_put.clone()).unwrap();
        assert!(high.is_triggered());
    }

    #[test]
    fn hard_cap_rejects_put_that_would_overflow() {
        let env = Environment::new();
        let pool = Pool::with_hard_cap(&env, 5.0, 0.0, 5.0).unwrap();
        let put = pool.put(6.0);
        assert_eq!(put.is_ok(), Some(false));
    }

    #[test]
    fn get_scoped_returns_amount_on_drop() {
        let env = Environment::new();
        let pool = Pool::new(&env, 10.0, 10.0).unwrap();
        {
            let guard = pool.get_scoped(4.0);
            assert!(guard.event().is_triggered());
            assert_eq!(pool.level(), 6.0);
        }
        assert_eq!(pool.level(), 10.0);
    }

    #[test]
    fn negative_amount_is_invalid() {
        let env = Environment::new();
        let pool = Pool::new(&env, 10.0, 0.0).unwrap();
        assert_eq!(pool.put(-1.0).is_ok(), Some(false));
    }

    #[test]
    fn priority_fulfillment_settles_one_unit_at_a_time() {
        let env = Environment::new();
        let pool = Pool::new_priority(&env, f64::INFINITY, 0.0).unwrap();

        let first = pool.get_with_priority(5.0, PriorityKey(0.0));
        let second = pool.get_with_priority(4.0, PriorityKey(0.0));
        let third = pool.get_with_priority(1.0, PriorityKey(1.0));

        let producer_pool = pool.clone();
        let clock = env.clone();
        env.process(async move {
            for _ in 0..10 {
                clock.timeout(1.0, Value::unit())?.await?;
                producer_pool.put(1.0);
            }
            Ok(Value::unit())
        });

        env.run(5.1).unwrap();
        assert!(first.is_triggered());
        assert!(!second.is_triggered());
        assert!(!third.is_triggered());

        env.run(9.1).unwrap();
        assert!(second.is_triggered());
        assert!(!third.is_triggered());

        env.run(10.1).unwrap();
        assert!(third.is_triggered());
    }

    #[test]
    fn hard_cap_overflow_leaves_level_and_remaining_consistent() {
        let env = Environment::new();
        let pool = Pool::with_hard_cap(&env, 5.0, 0.0, 5.0).unwrap();

        let first = pool.put(1.0);
        let second = pool.put(3.0);
        let third = pool.put(2.0);

        assert_eq!(first.is_ok(), Some(true));
        assert_eq!(second.is_ok(), Some(true));
        assert_eq!(third.is_ok(), Some(false));
        assert!(matches!(
            third.cause().unwrap().value().downcast_ref::<Error>(),
            Some(Error::Overflow(_))
        ));
        assert_eq!(pool.level(), 4.0);
        assert_eq!(pool.remaining(), 1.0);
    }
}
