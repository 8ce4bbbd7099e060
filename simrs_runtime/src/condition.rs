//! Composite events over a fixed set of child events: `AllOf` and `AnyOf`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    All,
    Any,
}

/// Builds a condition event over `events`: succeeds once the predicate over child outcomes holds
/// (all triggered for [`Op::All`], any one triggered for [`Op::Any`]), or fails immediately with
/// the cause of the first child to fail.
///
/// The success value is an ordered `Vec<(Event, Value)>` of the children that had succeeded by the
/// time the condition fired, preserving construction order.
pub(crate) fn condition(env: &Environment, op: Op, events: Vec<Event>) -> Result<Event> {
    if events.is_empty() {
        return Err(Error::InvalidArgument(
            "condition requires at least one child event".into(),
        ));
    }

    let cond = env.event();
    let results: Rc<RefCell<Vec<Option<(Event, Value)>>>> =
        Rc::new(RefCell::new(vec![None; events.len()]));
    let settled = Rc::new(Cell::new(false));

    for (index, child) in events.into_iter().enumerate() {
        let cond = cond.clone();
        let results = results.clone();
        let settled = settled.clone();
        let watched = child.clone();

        child.add_callback(move |_, _| {
            if settled.get() {
                return;
            }
            if let Some(value) = watched.value() {
                results.borrow_mut()[index] = Some((watched.clone(), value));
                let satisfied = match op {
                    Op::All => results.borrow().iter().all(Option::is_some),
                    Op::Any => true,
                };
                if satisfied {
                    settled.set(true);
                    let pairs: Vec<(Event, Value)> =
                        results.borrow_mut().iter_mut().filter_map(Option::take).collect();
                    let _ = cond.succeed(Value::new(pairs));
                }
            } else if let Some(cause) = watched.cause() {
                settled.set(true);
                let _ = cond.fail(cause);
            }
        })?;
    }

    Ok(cond)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    #[test]
    fn all_of_waits_for_every_child() {
        let env = Environment::new();
        let a = env.timeout(1.0, Value::new(1i32)).unwrap();
        let b = env.timeout(2.0, Value::new(2i32)).unwrap();
        let cond = env.all_of([a, b]).unwrap();
        env.run(cond.clone()).unwrap();
        let pairs = cond.value().unwrap();
        let pairs = pairs.downcast_ref::<Vec<(Event, Value)>>().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(env.now(), simrs_core::VirtualTime::new(2.0));
    }

    #[test]
    fn any_of_fires_on_first_child() {
        let env = Environment::new();
        let a = env.timeout(1.0, Value::new(1i32)).unwrap();
        let b = env.timeout(5.0, Value::new(2i32)).unwrap();
        let cond = env.any_of([a, b]).unwrap();
        env.run(cond.clone()).unwrap();
        assert_eq!(env.now(), simrs_core::VirtualTime::new(1.0));
    }

    #[test]
    fn condition_rejects_empty_event_list() {
        let env = Environment::new();
        assert!(env.all_of(std::iter::empty()).is_err());
    }
}
