//! Builders and renderers for host network configuration artifacts.
//!
//! - [`cidr`]: total parsing helpers for `address/prefix` strings
//! - [`netplan`]: typed netplan v2 documents rendered to YAML
//! - [`nft`]: ordered, duplicate-free nftables rule sets
//! - [`writer`]: whole-file artifact writes

pub mod cidr;
pub mod netplan;
pub mod nft;
pub mod writer;

pub use cidr::{classify, parse_bare_address, parse_cidr, subnet_contains, subnet_of, AddressFamily};
pub use netplan::{
    BridgeStanza, DhcpOverrides, InterfaceStanza, Nameservers, NetplanDocument, NetworkConfig,
    RenderError, Route, RouteScope, RouteType, RoutingPolicy, VlanStanza,
};
pub use nft::{Chain, NftRule, RuleFamily, RuleSet};
pub use writer::{write_artifact, WriteError};
