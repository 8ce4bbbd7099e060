//! The item container shared by `Store` and `Queue`: plain FIFO or a priority min-heap.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use crate::priority::PriorityItem;
use crate::value::Value;

pub(crate) enum Items {
    Fifo(VecDeque<Value>),
    /// Items must downcast to [`PriorityItem`]; see the design notes on polymorphic
    /// `PriorityQueue` items.
    Priority(BinaryHeap<Reverse<PriorityItem>>),
}

impl Items {
    pub(crate) fn fifo() -> Self {
        Items::Fifo(VecDeque::new())
    }

    pub(crate) fn priority() -> Self {
        Items::Priority(BinaryHeap::new())
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Items::Fifo(items) => items.len(),
            Items::Priority(items) => items.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes `item`. For the priority variant, `item` must downcast to `PriorityItem`.
    pub(crate) fn push(&mut self, item: Value) {
        match self {
            Items::Fifo(items) => items.push_back(item),
            Items::Priority(items) => {
                let priority_item = item
                    .downcast_ref::<PriorityItem>()
                    .expect("priority containers require PriorityItem-wrapped values")
                    .clone();
                items.push(Reverse(priority_item));
            }
        }
    }

    /// Pops the next item: the front for FIFO, the minimum-priority item for the priority variant.
    pub(crate) fn pop(&mut self) -> Option<Value> {
        match self {
            Items::Fifo(items) => items.pop_front(),
            Items::Priority(items) => items.pop().map(|Reverse(pi)| Value::new(pi)),
        }
    }

    pub(crate) fn peek(&self) -> Option<Value> {
        match self {
            Items::Fifo(items) => items.front().cloned(),
            Items::Priority(items) => items.peek().map(|Reverse(pi)| Value::new(pi.clone())),
        }
    }
}
