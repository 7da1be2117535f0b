use std::net::IpAddr;

use async_trait::async_trait;
use tracing::debug;

/// Placeholder for callers that cannot or must not be named.
pub const UNKNOWN: &str = "N/A";

#[async_trait]
pub trait ReverseDns: Send + Sync {
    /// PTR hostname for `ip`, or `None` when it has none.
    async fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// Resolver backed by the system's `getnameinfo`.
pub struct SystemResolver;

#[async_trait]
impl ReverseDns for SystemResolver {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        let hostname = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
            .await
            .ok()?
            .ok()?;
        // getnameinfo falls back to the numeric form when no PTR record exists.
        if hostname.parse::<IpAddr>().is_ok() {
            return None;
        }
        Some(hostname)
    }
}

/// Subdomain for a caller address.
///
/// `Some("N/A")` when the address does not parse, has no PTR record, or names
/// a local/private/cluster host. `None` when the name has no dot at all.
pub async fn resolve_subdomain(resolver: &dyn ReverseDns, ip: &str) -> Option<String> {
    let Ok(addr) = ip.parse::<IpAddr>() else {
        return Some(UNKNOWN.to_string());
    };
    let hostname = resolver.reverse(addr).await;
    debug!(ip, hostname = ?hostname, "Reverse DNS");
    derive_subdomain(hostname.as_deref())
}

/// Reduce a PTR hostname to the subdomain that identifies the site.
pub fn derive_subdomain(hostname: Option<&str>) -> Option<String> {
    let Some(hostname) = hostname else {
        return Some(UNKNOWN.to_string());
    };

    // Drop the first label, usually the node the job ran on.
    let name = match hostname.split_once('.') {
        Some((_, rest)) if hostname.matches('.').count() > 1 => rest,
        _ => hostname,
    };

    if !name.contains('.') {
        return None;
    }
    if name.contains("local") || name.contains("private") || name.contains(".cluster") {
        return Some(UNKNOWN.to_string());
    }
    Some(name.to_string())
}
