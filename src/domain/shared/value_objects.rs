//! Shared value objects used across multiple resolvers

use super::error::RoutingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Workspace (tenant) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(i64);

impl WorkspaceId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkspaceId {
    type Err = RoutingError;

    /// Workspace ids are load-bearing: a malformed one is a hard failure.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| RoutingError::Config(format!("invalid workspace id: {:?}", s)))
    }
}

/// Source address of a signaling request.
///
/// Kept as the raw string the proxy sent so that whitelist lookups can log it
/// verbatim; `ip()` is `None` when it is not a valid address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceAddr(String);

impl SourceAddr {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.0.trim().parse().ok()
    }
}

impl fmt::Display for SourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceAddr {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_id_parse() {
        let id: WorkspaceId = "42".parse().unwrap();
        assert_eq!(id.as_i64(), 42);
        assert_eq!(id.to_string(), "42");

        let err = "forty-two".parse::<WorkspaceId>().unwrap_err();
        assert!(matches!(err, RoutingError::Config(_)));
    }

    #[test]
    fn test_source_addr() {
        let addr = SourceAddr::from("10.0.0.5");
        assert_eq!(addr.ip(), Some("10.0.0.5".parse().unwrap()));

        let bogus = SourceAddr::from("not-an-ip");
        assert_eq!(bogus.ip(), None);
        assert_eq!(bogus.as_str(), "not-an-ip");
    }
}
