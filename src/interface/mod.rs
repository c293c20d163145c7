//! Interface layer - External interfaces
//!
//! This layer handles:
//! - REST endpoints queried by the signaling proxy
//! - Request/response formatting
//! - Rate limiting and metrics

pub mod api;
