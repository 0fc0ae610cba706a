//! Proxy bypass rules.

use std::net::Ipv4Addr;

/// One `dont_use_proxy` entry: either a domain suffix (`.example.org`) or an
/// IPv4 network (`10.0.0.0/8`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassRule {
    DomainSuffix(String),
    Network { addr: u32, mask: u32 },
}

impl BypassRule {
    /// Parses a single configuration entry. Returns `None` for entries that
    /// are neither a usable network nor a plausible domain suffix.
    pub fn parse(entry: &str) -> Option<BypassRule> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }

        if let Some((net, prefix)) = entry.split_once('/') {
            let addr: Ipv4Addr = net.parse().ok()?;
            let prefix: u32 = prefix.parse().ok()?;
            if prefix > 32 {
                return None;
            }
            let mask = if prefix == 0 {
                0
            } else {
                u32::MAX << (32 - prefix)
            };
            return Some(BypassRule::Network {
                addr: u32::from(addr) & mask,
                mask,
            });
        }

        Some(BypassRule::DomainSuffix(entry.to_ascii_lowercase()))
    }

    fn matches(&self, host: &str, resolved: Option<Ipv4Addr>) -> bool {
        match self {
            BypassRule::DomainSuffix(suffix) => {
                let host = host.to_ascii_lowercase();
                host.len() > suffix.len() && host.ends_with(suffix.as_str())
            }
            BypassRule::Network { addr, mask } => match resolved {
                Some(ip) => u32::from(ip) & mask == *addr,
                None => false,
            },
        }
    }
}

/// Decides whether the connection to `host` should go through the proxy.
///
/// No proxy configured means no. A configured proxy is skipped when the
/// target matches any bypass rule, either by domain suffix or by its
/// resolved IPv4 address. The decision is a pure function of its inputs, so
/// repeated calls for the same host agree.
pub fn needs_proxy(
    host: &str,
    resolved: Option<Ipv4Addr>,
    proxy_host: &str,
    rules: &[BypassRule],
) -> bool {
    if proxy_host.is_empty() {
        return false;
    }
    !rules.iter().any(|rule| rule.matches(host, resolved))
}

/// True when any rule needs the target's resolved IPv4 address to decide.
pub fn rules_need_address(rules: &[BypassRule]) -> bool {
    rules
        .iter()
        .any(|r| matches!(r, BypassRule::Network { .. }))
}
