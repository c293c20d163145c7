//! Routing result type

use super::error::RoutingError;

/// Standard result type for resolver and repository operations
pub type Result<T> = std::result::Result<T, RoutingError>;
