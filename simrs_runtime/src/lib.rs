#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
#![deny(clippy::all)]

mod condition;
mod env;
mod error;
mod event;
mod items;
mod pool;
mod priority;
mod process;
mod queue;
mod resource;
mod store;
mod value;

pub use env::{Environment, RunUntil};
pub use error::{Error, Result};
pub use event::{Event, Outcome};
pub use pool::{Pool, PoolGuard};
pub use priority::{PriorityItem, PriorityKey};
pub use process::Process;
pub use queue::Queue;
pub use resource::{Resource, ResourceGuard};
pub use store::Store;
pub use value::{Failure, Interrupt, Payload, Value};

/// Re-exports [`simrs_core::VirtualTime`] and [`simrs_core::Priority`] for convenience, so models
/// usually only need `use simrs_runtime::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Environment, Error, Event, Failure, Pool, PoolGuard, PriorityItem, PriorityKey, Process,
        Queue, Resource, ResourceGuard, Result, RunUntil, Store, Value,
    };
    pub use simrs_core::{Priority, VirtualTime};
}
