//! Domain layer - routing rules and the storage ports they depend on
//!
//! Each resolver owns one routing question and talks to storage only
//! through its repository trait.

pub mod authorization;
pub mod call_config;
pub mod did;
pub mod media_server;
pub mod pstn;
pub mod rate_limit;
pub mod shared;
pub mod sip_trunk;
pub mod tenant;

// Re-export commonly used types
pub use shared::{Rejection, Result, RoutingError};
