//! API interface implementations

pub mod dto;
pub mod metrics_handler;
pub mod rate_limit;
pub mod router;
pub mod routing_handler;

pub use metrics_handler::init_metrics;
pub use router::build_router;
pub use routing_handler::AppState;
