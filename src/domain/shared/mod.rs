//! Shared kernel - Common types used across all resolvers

pub mod error;
pub mod result;
pub mod value_objects;

pub use error::{Rejection, RoutingError};
pub use result::Result;
pub use value_objects::*;
