//! Routeplane - call routing resolution for a hosted telephony platform
//!
//! Answers the signaling proxy's routing questions: which workspace owns a
//! domain or DID, whether an inbound call is authorized, which carrier
//! terminates an outbound call, and which media server handles it.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::RoutingError;
pub use domain::shared::result::Result;
