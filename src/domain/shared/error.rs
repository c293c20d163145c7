//! Routing errors

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which authorization gate turned a request away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Source address is not on the applicable whitelist
    SourceNotWhitelisted,
    /// Calling number is not verified for the workspace
    CallerNotValid,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::SourceNotWhitelisted => write!(f, "source not whitelisted"),
            Rejection::CallerNotValid => write!(f, "caller not valid"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// Expected miss: tenant, DID, trunk, provider or flow absent
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(Rejection),

    /// Backing store unavailable, query failure or timeout
    #[error("Storage error: {0}")]
    Storage(String),

    /// DNS / SIP address lookup failure
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Malformed load-bearing input
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No capacity available")]
    NoCapacity,
}

impl RoutingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn storage(cause: impl fmt::Display) -> Self {
        Self::Storage(cause.to_string())
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingError::NotFound(_) => "not_found",
            RoutingError::Unauthorized(_) => "unauthorized",
            RoutingError::Storage(_) => "storage",
            RoutingError::Resolution(_) => "resolution",
            RoutingError::Config(_) => "config",
            RoutingError::NoCapacity => "no_capacity",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RoutingError::NotFound(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RoutingError {
    fn from(err: sqlx::Error) -> Self {
        RoutingError::Storage(format!("Database error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_reason_in_message() {
        let err = RoutingError::Unauthorized(Rejection::CallerNotValid);
        assert_eq!(err.to_string(), "Unauthorized: caller not valid");
        assert_eq!(err.kind(), "unauthorized");
    }

    #[test]
    fn test_not_found_is_distinct_from_storage() {
        assert!(RoutingError::not_found("did").is_not_found());
        assert!(!RoutingError::storage("connection reset").is_not_found());
        assert_eq!(RoutingError::NoCapacity.to_string(), "No capacity available");
    }
}
