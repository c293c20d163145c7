//! DNS-backed address resolution for signaling domains

use crate::domain::shared::{Result, RoutingError};
use crate::domain::sip_trunk::AddressResolver;
use async_trait::async_trait;
use std::net::IpAddr;
use tracing::debug;

/// Resolves `domain:port` with the system resolver
pub struct DnsAddressResolver {
    port: u16,
}

impl DnsAddressResolver {
    pub fn new() -> Self {
        Self { port: 5060 }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for DnsAddressResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip an optional `:port` suffix and IPv6 brackets
fn host_part(domain: &str) -> &str {
    let domain = domain.trim();
    if let Some(rest) = domain.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match domain.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => domain,
    }
}

#[async_trait]
impl AddressResolver for DnsAddressResolver {
    async fn resolve(&self, domain: &str) -> Result<IpAddr> {
        let host = host_part(domain);
        if host.is_empty() {
            return Err(RoutingError::Resolution("empty domain".to_string()));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let mut addrs = tokio::net::lookup_host((host, self.port))
            .await
            .map_err(|e| RoutingError::Resolution(format!("DNS lookup for {} failed: {}", host, e)))?;

        let addr = addrs
            .next()
            .ok_or_else(|| RoutingError::Resolution(format!("no addresses for {}", host)))?;
        debug!("Resolved {} to {}", host, addr.ip());
        Ok(addr.ip())
    }
}
