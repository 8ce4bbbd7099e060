//! `Store`: a capacity-bounded container of items with waiting `put`/`get`.

use std::cell::RefCell;
use std::rc::Rc;

use simrs_core::EventKey;

use crate::env::Environment;
use crate::error::Result;
use crate::event::Event;
use crate::items::Items;
use crate::value::Value;

struct Inner {
    capacity: usize,
    items: Items,
    put_waiters: Vec<(EventKey, Value)>,
    get_waiters: Vec<EventKey>,
}

/// A FIFO store of items: `put` succeeds once there is room, `get` succeeds once there is an item.
#[derive(Clone)]
pub struct Store {
    env: Environment,
    inner: Rc<RefCell<Inner>>,
}

impl Store {
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self::with_items(env, capacity, Items::fifo())
    }

    /// A `PriorityStore`: items must be [`crate::priority::PriorityItem`]-wrapped; `get()` always
    /// returns the minimum-priority item.
    pub fn new_priority(env: &Environment, capacity: usize) -> Self {
        Self::with_items(env, capacity, Items::priority())
    }

    fn with_items(env: &Environment, capacity: usize, items: Items) -> Self {
        Self {
            env: env.clone(),
            inner: Rc::new(RefCell::new(Inner {
                capacity,
                items,
                put_waiters: Vec::new(),
                get_waiters: Vec::new(),
            })),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Puts `item` in the store once there is room for it.
    ///
    /// Attempts to fulfill immediately against the current state. Whether this `put` resolves now
    /// or later, satisfying it only ever unblocks a waiting `get` once *this* event is processed by
    /// the scheduler — the cross-trigger runs from a callback registered on the event itself, not
    /// synchronously here, so a cascade of puts and gets settles one scheduler step at a time.
    pub fn put(&self, item: Value) -> Event {
        let event = self.env.event();
        self.inner.borrow_mut().put_waiters.push((event.key(), item));
        let this = self.clone();
        let _ = event.add_callback(move |_, _| this.try_get());
        self.try_put();
        event
    }

    /// Gets the next item from the store once one is available.
    pub fn get(&self) -> Event {
        let event = self.env.event();
        self.inner.borrow_mut().get_waiters.push(event.key());
        let this = self.clone();
        let _ = event.add_callback(move |_, _| this.try_put());
        self.try_get();
        event
    }

    fn try_put(&self) {
        let fulfilled = {
            let mut inner = self.inner.borrow_mut();
            if inner.put_waiters.is_empty() || inner.items.len() >= inner.capacity {
                None
            } else {
                let (key, item) = inner.put_waiters.remove(0);
                inner.items.push(item);
                Some(key)
            }
        };
        if let Some(key) = fulfilled {
            let _ = self.env.succeed(key, Value::unit());
        }
    }

    fn try_get(&self) {
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
        if let Some((key, item)) = fulfilled {
            let _ = self.env.succeed(key, item);
        }
    }

    /// Cancels a pending `put` or `get` request. A no-op if it already fired.
    pub fn cancel(&self, request: &Event) -> Result<()> {
        if request.is_triggered() {
            return Ok(());
        }
        let mut inner = self.inner.borrow_mut();
        inner.put_waiters.retain(|(key, _)| *key != request.key());
        inner.get_waiters.retain(|key| *key != request.key());
        drop(inner);
        self.env.clear_callbacks(request.key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips_value() {
        let env = Environment::new();
        let store = Store::new(&env, 1);
        let put = store.put(Value::new(7i32));
        assert!(put.is_triggered());
        let get = store.get();
        env.run(get.clone()).unwrap();
        assert_eq!(get.value().unwrap().downcast::<i32>(), Some(7));
    }

    #[test]
    fn put_blocks_when_full() {
        let env = Environment::new();
        let store = Store::new(&env, 1);
        let _first = store.put(Value::new(1i32));
        let second = store.put(Value::new(2i32));
        assert!(!second.is_triggered());

        let get = store.get();
        env.run(get).unwrap();
        assert!(second.is_triggered());
    }

    #[test]
    fn priority_store_returns_minimum_first() {
        use crate::priority::PriorityItem;
        let env = Environment::new();
        let store = Store::new_priority(&env, 8);
        store.put(Value::new(PriorityItem::new(3.0, Value::new("c"))));
        store.put(Value::new(PriorityItem::new(1.0, Value::new("a"))));
        store.put(Value::new(PriorityItem::new(2.0, Value::new("b"))));

        let first = store.get();
        env.run(first.clone()).unwrap();
        let item = first.value().unwrap().downcast::<PriorityItem>().unwrap();
        assert_eq!(item.payload.downcast::<&str>(), Some("a"));
    }
}
