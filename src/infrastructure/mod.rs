//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Repository implementations (in-memory and PostgreSQL)
//! - DNS resolution of signaling domains
//! - The media fleet refresh task

pub mod dns;
pub mod fleet;
pub mod persistence;
