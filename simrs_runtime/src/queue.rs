//! `Queue`: a `Store` with size queries, threshold events, hooks, and an optional hard cap.

use std::cell::RefCell;
use std::rc::Rc;

use simrs_core::EventKey;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::items::Items;
use crate::value::Value;

type Hook = Box<dyn Fn(&Value)>;

struct Inner {
    capacity: usize,
    /// Bounds `items.len() + put_waiters.len()`; exceeding it fails the new `put` immediately
    /// rather than letting unbounded requests pile up behind a full queue.
    hard_cap: Option<usize>,
    items: Items,
    put_waiters: Vec<(EventKey, Value)>,
    get_waiters: Vec<EventKey>,
    at_least: Vec<(usize, EventKey)>,
    at_most: Vec<(usize, EventKey)>,
    on_put: Option<Hook>,
    on_get: Option<Hook>,
}

/// A FIFO (or, via [`Queue::new_priority`], priority-ordered) queue: like [`crate::store::Store`],
/// plus size queries, threshold events, put/get hooks, and an optional hard cap on outstanding
/// `put` requests.
#[derive(Clone)]
pub struct Queue {
    env: Environment,
    inner: Rc<RefCell<Inner>>,
}

impl Queue {
    pub fn new(env: &Environment, capacity: usize) -> Result<Self> {
        Self::with_items(env, capacity, None, Items::fifo())
    }

    /// Items must be [`crate::priority::PriorityItem`]-wrapped; `get()`/`peek()` always observe the
    /// minimum-priority item.
    pub fn new_priority(env: &Environment, capacity: usize) -> Result<Self> {
        Self::with_items(env, capacity, None, Items::priority())
    }

    pub fn with_hard_cap(env: &Environment, capacity: usize, hard_cap: usize) -> Result<Self> {
        if hard_cap < capacity {
            return Err(Error::InvalidArgument("hard cap must be >= capacity".into()));
        }
        Self::with_items(env, capacity, Some(hard_cap), Items::fifo())
    }

    fn with_items(env: &Environment, capacity: usize, hard_cap: Option<usize>, items: Items) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("queue capacity must be >= 1".into()));
        }
        Ok(Self {
            env: env.clone(),
            inner: Rc::new(RefCell::new(Inner {
                capacity,
                hard_cap,
                items,
                put_waiters: Vec::new(),
                get_waiters: Vec::new(),
                at_least: Vec::new(),
                at_most: Vec::new(),
                on_put: None,
                on_get: None,
            })),
        })
    }

    pub fn set_on_put(&self, hook: impl Fn(&Value) + 'static) {
        self.inner.borrow_mut().on_put = Some(Box::new(hook));
    }

    pub fn set_on_get(&self, hook: impl Fn(&Value) + 'static) {
        self.inner.borrow_mut().on_get = Some(Box::new(hook));
    }

    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    pub fn size(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn remaining(&self) -> usize {
        let inner = self.inner.borrow();
        inner.capacity - inner.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity()
    }

    /// Returns the item that would be returned by the next `get`, without removing it.
    ///
    /// Fails with `InvalidState` on an empty queue, rather than returning a sentinel.
    pub fn peek(&self) -> Result<Value> {
        self.inner
            .borrow()
            .items
            .peek()
            .ok_or_else(|| Error::InvalidState("peek on an empty queue".into()))
    }

    pub fn put(&self, item: Value) -> Event {
        let event = self.env.event();
        let overflowed = {
            let mut inner = self.inner.borrow_mut();
            if let Some(cap) = inner.hard_cap {
                if inner.items.len() + inner.put_waiters.len() + 1 > cap {
                    true
                } else {
                    inner.put_waiters.push((event.key(), item.clone()));
                    false
                }
            } else {
                inner.put_waiters.push((event.key(), item.clone()));
                false
            }
        };
        if overflowed {
            let _ = event.fail(crate::value::Failure::new(Error::Overflow(
                "queue hard cap exceeded".into(),
            )));
        } else {
            let this = self.clone();
            let _ = event.add_callback(move |_, _| this.try_get());
            self.try_put();
        }
        event
    }

    pub fn get(&self) -> Event {
        let event = self.env.event();
        self.inner.borrow_mut().get_waiters.push(event.key());
        let this = self.clone();
        let _ = event.add_callback(move |_, _| this.try_put());
        self.try_get();
        event
    }

    /// Fires once `size() >= n`. Fires immediately (synchronously) if already satisfied.
    pub fn when_at_least(&self, n: usize) -> Event {
        let event = self.env.event();
        if self.size() >= n {
            let _ = event.succeed(Value::unit());
        } else {
            self.inner.borrow_mut().at_least.push((n, event.key()));
        }
        event
    }

    /// Fires once `size() <= n`. Fires immediately if already satisfied.
    pub fn when_at_most(&self, n: usize) -> Event {
        let event = self.env.event();
        if self.size() <= n {
            let _ = event.succeed(Value::unit());
        } else {
            self.inner.borrow_mut().at_most.push((n, event.key()));
        }
        event
    }

    pub fn when_any(&self) -> Event {
        self.when_at_least(1)
    }

    pub fn when_full(&self) -> Event {
        self.when_at_least(self.capacity())
    }

    pub fn when_empty(&self) -> Event {
        self.when_at_most(0)
    }

    pub fn when_not_full(&self) -> Event {
        self.when_at_most(self.capacity().saturating_sub(1))
    }

    fn try_put(&self) {
        loop {
            let fulfilled = {
                let mut inner = self.inner.borrow_mut();
                if inner.put_waiters.is_empty() || inner.items.len() >= inner.capacity {
                    None
                } else {
                    let (key, item) = inner.put_waiters.remove(0);
                    inner.items.push(item.clone());
                    Some((key, item))
                }
            };
            let Some((key, item)) = fulfilled else { break };
            if let Some(hook) = self.inner.borrow().on_put.as_ref() {
                hook(&item);
            }
            let _ = self.env.succeed(key, Value::unit());
            self.fire_thresholds();
        }
    }

    fn try_get(&self) {
        loop {
            let fulfilled = {
                let mut inner = self.inner.borrow_mut();
                if inner.get_waiters.is_empty() || inner.items.is_empty() {
                    None
                } else {
                    let item = inner.items.pop().expect("checked non-empty above");
                    let key = inner.get_waiters.remove(0);
                    Some((key, item))
                }
            };
            let Some((key, item)) = fulfilled else { break };
            if let Some(hook) = self.inner.borrow().on_get.as_ref() {
                hook(&item);
            }
            let _ = self.env.succeed(key, item);
            self.fire_thresholds();
        }
    }

    fn fire_thresholds(&self) {
        let size = self.size();
        let (at_least_ready, at_most_ready) = {
            let mut inner = self.inner.borrow_mut();
            let at_least_ready: Vec<EventKey> = {
                let mut ready = Vec::new();
                inner.at_least.retain(|&(n, key)| {
                    if size >= n {
                        ready.push(key);
                        false
                    } else {
                        true
                    }
                });
                ready
            };
            let at_most_ready: Vec<EventKey> = {
                let mut ready = Vec::new();
                inner.at_most.retain(|&(n, key)| {
                    if size <= n {
                        ready.push(key);
                        false
                    } else {
                        true
                    }
                });
                ready
            };
            (at_least_ready, at_most_ready)
        };
        for key in at_least_ready.into_iter().chain(at_most_ready) {
            let _ = self.env.succeed(key, Value::unit());
        }
    }

    /// Cancels a pending `put` or `get` request, or a not-yet-fired threshold event. A no-op if it
    /// already fired.
    pub fn cancel(&self, request: &Event) -> Result<()> {
        if request.is_triggered() {
            return Ok(());
        }
        let mut inner = self.inner.borrow_mut();
        inner.put_waiters.retain(|(key, _)| *key != request.key());
        inner.get_waiters.retain(|key| *key != request.key());
        inner.at_least.retain(|&(_, key)| key != request.key());
        inner.at_most.retain(|&(_, key)| key != request.key());
        drop(inner);
        self.env.clear_callbacks(request.key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let env = Environment::new();
        let queue = Queue::new(&env, 4).unwrap();
        queue.put(Value::new(1i32));
        queue.put(Value::new(2i32));
        let first = queue.get();
        let second = queue.get();
        env.run(second.clone()).unwrap();
        assert_eq!(first.value().unwrap().downcast::<i32>(), Some(1));
        assert_eq!(second.value().unwrap().downcast::<i32>(), Some(2));
    }

    #[test]
    fn when_full_fires_at_capacity() {
        let env = Environment::new();
        let queue = Queue::new(&env, 2).unwrap();
        let full = queue.when_full();
        assert!(!full.is_triggered());
        queue.put(Value::new(1i32));
        assert!(!full.is_triggered());
        queue.put(Value::new(2i32));
        assert!(full.is_triggered());
    }

    #[test]
    fn hard_cap_overflows_with_error() {
        let env = Environment::new();
        let queue = Queue::with_hard_cap(&env, 1, 1).unwrap();
        let _first = queue.put(Value::new(1i32));
        let second = queue.put(Value::new(2i32));
        assert_eq!(second.is_ok(), Some(false));
    }

    #[test]
    fn when_at_least_fires_immediately_if_already_satisfied() {
        let env = Environment::new();
        let queue = Queue::new(&env, 4).unwrap();
        queue.put(Value::new(1i32));
        let ready = queue.when_at_least(1);
        assert!(ready.is_triggered());
    }

    #[test]
    fn peek_on_empty_queue_is_invalid_state() {
        let env = Environment::new();
        let queue = Queue::new(&env, 4).unwrap();
        assert!(matches!(queue.peek(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn fifo_with_capacity_matches_sizes_at_each_step() {
        // Scenario: capacity=2, put 1,2,3 at t=0, get at t=1,2,3; expect outputs 1,2,3 and sizes
        // 1,2,2,1,1,0 observed right after each operation.
        let env = Environment::new();
        let queue = Queue::new(&env, 2).unwrap();
        let mut sizes = Vec::new();

        queue.put(Value::new(1i32));
        sizes.push(queue.size());
        queue.put(Value::new(2i32));
        sizes.push(queue.size());
        let third_put = queue.put(Value::new(3i32));
        sizes.push(queue.size());

        let first_get = queue.get();
        sizes.push(queue.size());
        env.run(first_get.clone()).unwrap();
        let second_get = queue.get();
        sizes.push(queue.size());
        env.run(second_get.clone()).unwrap();
        let third_get = queue.get();
        sizes.push(queue.size());

        env.run(third_get.clone()).unwrap();
        assert_eq!(sizes, vec![1, 2, 2, 1, 1, 0]);
        assert_eq!(first_get.value().unwrap().downcast::<i32>(), Some(1));
        assert_eq!(second_get.value().unwrap().downcast::<i32>(), Some(2));
        assert_eq!(third_get.value().unwrap().downcast::<i32>(), Some(3));
        assert!(third_put.is_triggered());
    }
}
