//! # DNS Resolution
//!
//! Hostname lookups used to turn a load balancer hostname into addresses.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver using the system's configured name service
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        ips.dedup();
        Ok(ips)
    }
}

/// Keep IPv4 results only, rendered as strings
#[must_use]
pub fn ipv4_only(addrs: &[IpAddr]) -> Vec<String> {
    addrs
        .iter()
        .filter(|ip| ip.is_ipv4())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_only_drops_ipv6() {
        let addrs: Vec<IpAddr> = vec![
            "203.0.113.10".parse().unwrap(),
            "2001:db8::1".parse().unwrap(),
            "198.51.100.7".parse().unwrap(),
        ];
        assert_eq!(ipv4_only(&addrs), vec!["203.0.113.10", "198.51.100.7"]);
    }

    #[tokio::test]
    async fn test_system_resolver_handles_literal_address() {
        let ips = SystemResolver.lookup("127.0.0.1").await.unwrap();
        assert_eq!(ips, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }
}
