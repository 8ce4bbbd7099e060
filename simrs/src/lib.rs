#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]

pub use simrs_runtime::*;

pub mod prelude {
    pub use simrs_runtime::prelude::*;
}
