//! Address helpers for user-supplied `address/prefix` strings.
//!
//! Every function here is total: malformed input yields `None` (or the input
//! itself for [`parse_bare_address`]) so callers can turn it into a warning.

use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Destination of the default route for this family.
    pub fn default_destination(self) -> &'static str {
        match self {
            AddressFamily::V4 => "0.0.0.0/0",
            AddressFamily::V6 => "::/0",
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "ipv4"),
            AddressFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// Return the address part of `address/prefix`.
///
/// Input without a `/` is returned whole (trimmed), so bare addresses pass
/// through unchanged.
pub fn parse_bare_address(cidr: &str) -> &str {
    let trimmed = cidr.trim();
    match trimmed.split_once('/') {
        Some((address, _)) => address,
        None => trimmed,
    }
}

/// Classify an address (bare or with prefix) by family.
///
/// Returns `None` for anything that is not a valid IPv4 or IPv6 address.
pub fn classify(address: &str) -> Option<AddressFamily> {
    match parse_bare_address(address).parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Some(AddressFamily::V4),
        Ok(IpAddr::V6(_)) => Some(AddressFamily::V6),
        Err(_) => None,
    }
}

/// Parse `address/prefix`; a bare address becomes a host network.
pub fn parse_cidr(cidr: &str) -> Option<IpNet> {
    let trimmed = cidr.trim();
    if trimmed.contains('/') {
        return trimmed.parse::<IpNet>().ok();
    }
    trimmed.parse::<IpAddr>().ok().map(IpNet::from)
}

/// Network part of `address/prefix`, e.g. `192.168.10.1/24` -> `192.168.10.0/24`.
pub fn subnet_of(cidr: &str) -> Option<String> {
    parse_cidr(cidr).map(|net| net.trunc().to_string())
}

/// Whether `address` lies inside the subnet of `cidr`.
pub fn subnet_contains(cidr: &str, address: &str) -> bool {
    let Some(net) = parse_cidr(cidr) else {
        return false;
    };
    parse_bare_address(address)
        .parse::<IpAddr>()
        .is_ok_and(|ip| net.trunc().contains(&ip))
}
