//! Network ranges and the composed access policy.
//!
//! # Responsibilities
//! - Parse CIDR strings into [`NetworkRange`]s once at startup
//! - Group ranges into named, immutable [`NetworkSet`]s
//! - Compose the allow-list ([`AccessPolicy`]) and the credential exemptions
//!
//! # Design Decisions
//! - Malformed ranges are logged and dropped, never fatal
//! - Host bits are masked off (`10.1.2.3/8` is `10.0.0.0/8`)
//! - An unparseable client address matches nothing (fail closed)

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

/// Published egress ranges of the upstream tool-calling platform.
///
/// These change over time and must be refreshed by hand.
pub const UPSTREAM_PROVIDER_CIDRS: &[&str] = &[
    "160.79.104.0/21",
    // Legacy egress addresses, still announced during the migration window.
    "34.162.46.92/32",
    "34.162.102.82/32",
    "34.162.136.91/32",
    "34.162.142.92/32",
    "34.162.183.95/32",
];

/// Local-machine addresses.
pub const LOOPBACK_CIDRS: &[&str] = &["127.0.0.0/8", "::1/128"];

/// RFC 1918 private address space.
pub const LOCAL_NETWORK_CIDRS: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

/// Error returned when a CIDR string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid network range '{input}'")]
pub struct InvalidRange {
    pub input: String,
}

/// A classless network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkRange(IpNet);

impl NetworkRange {
    /// Parse `addr/len` or a bare address (treated as a host route).
    pub fn parse(input: &str) -> Result<Self, InvalidRange> {
        let trimmed = input.trim();
        let invalid = || InvalidRange {
            input: input.to_string(),
        };

        let net = if trimmed.contains('/') {
            IpNet::from_str(trimmed).map_err(|_| invalid())?
        } else {
            let addr = IpAddr::from_str(trimmed).map_err(|_| invalid())?;
            let host_len = if addr.is_ipv4() { 32 } else { 128 };
            IpNet::new(addr, host_len).map_err(|_| invalid())?
        };

        Ok(Self(net.trunc()))
    }

    /// Whether `addr` falls inside this range.
    ///
    /// IPv4-mapped IPv6 addresses are also tested in their IPv4 form.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        if self.0.contains(addr) {
            return true;
        }
        match unmap(addr) {
            Some(v4) => self.0.contains(&v4),
            None => false,
        }
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for NetworkRange {
    type Err = InvalidRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn unmap(addr: &IpAddr) -> Option<IpAddr> {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4),
        IpAddr::V4(_) => None,
    }
}

/// Parse a client address string. Returns `None` for anything unparseable.
pub fn parse_client_addr(ip: &str) -> Option<IpAddr> {
    IpAddr::from_str(ip.trim()).ok()
}

/// A named, immutable collection of network ranges.
#[derive(Debug, Clone, Default)]
pub struct NetworkSet {
    name: &'static str,
    ranges: Vec<NetworkRange>,
}

impl NetworkSet {
    /// Build a set from CIDR strings, dropping (and logging) malformed entries.
    pub fn parse<I, S>(name: &'static str, cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranges = Vec::new();
        for cidr in cidrs {
            let cidr = cidr.as_ref();
            match NetworkRange::parse(cidr) {
                Ok(range) => ranges.push(range),
                Err(e) => tracing::warn!(set = name, error = %e, "Skipping network range"),
            }
        }
        Self { name, ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether any range contains `addr`.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(addr))
    }

    /// String form of [`NetworkSet::contains`]. Unparseable input is a non-match.
    pub fn contains_str(&self, ip: &str) -> bool {
        parse_client_addr(ip).is_some_and(|addr| self.contains(&addr))
    }
}

/// The composed allow-list plus the subsets that skip credential checks.
///
/// Built once per process and shared read-only.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    upstream: NetworkSet,
    loopback: NetworkSet,
    local: NetworkSet,
    extra: NetworkSet,
}

impl AccessPolicy {
    /// Default trusted sets plus `extra_cidrs` from configuration.
    pub fn new<S: AsRef<str>>(extra_cidrs: &[S]) -> Self {
        Self::from_sets(
            NetworkSet::parse("upstream", UPSTREAM_PROVIDER_CIDRS),
            NetworkSet::parse("loopback", LOOPBACK_CIDRS),
            NetworkSet::parse("local", LOCAL_NETWORK_CIDRS),
            NetworkSet::parse("extra", extra_cidrs),
        )
    }

    pub fn from_sets(
        upstream: NetworkSet,
        loopback: NetworkSet,
        local: NetworkSet,
        extra: NetworkSet,
    ) -> Self {
        let policy = Self {
            upstream,
            loopback,
            local,
            extra,
        };
        for set in policy.sets() {
            tracing::debug!(set = set.name, ranges = set.len(), "Network set loaded");
        }
        policy
    }

    /// Total number of ranges in the allow-list.
    pub fn range_count(&self) -> usize {
        self.sets().map(NetworkSet::len).sum()
    }

    /// Whether the allow-list admits `ip`.
    pub fn allows(&self, ip: &str) -> bool {
        self.sets().any(|set| set.contains_str(ip))
    }

    /// Whether `ip` may skip the bearer-token check.
    pub fn is_credential_exempt(&self, ip: &str) -> bool {
        self.upstream.contains_str(ip) || self.loopback.contains_str(ip)
    }

    fn sets(&self) -> impl Iterator<Item = &NetworkSet> {
        [&self.upstream, &self.loopback, &self.local, &self.extra].into_iter()
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new::<&str>(&[])
    }
}
