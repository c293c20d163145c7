//! Application layer - Use cases and application services
//!
//! The routing engine wires the domain resolvers together and turns raw
//! request inputs into typed calls.

pub mod engine;

pub use engine::{parse_flag, RoutingEngine, RoutingRepositories};
