//! Typed netplan (version 2) documents.
//!
//! Maps are [`IndexMap`]s so a document renders in the order stanzas were
//! inserted, which keeps regenerated files byte-identical for identical input.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cidr::AddressFamily;

/// Errors raised while rendering or reading a netplan document.
#[derive(Debug, Error)]
pub enum RenderError {
    /// YAML serialization or parsing failed.
    #[error("failed to render netplan YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Top-level netplan document (`network:` root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetplanDocument {
    pub network: NetworkConfig,
}

/// Body of the `network:` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub ethernets: IndexMap<String, InterfaceStanza>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub vlans: IndexMap<String, VlanStanza>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub bridges: IndexMap<String, BridgeStanza>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dummy_devices: IndexMap<String, InterfaceStanza>,
}

/// Settings shared by every kind of interface stanza.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterfaceStanza {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Nameservers>,
    #[serde(default)]
    pub dhcp4: bool,
    #[serde(default)]
    pub dhcp6: bool,
    #[serde(default)]
    pub accept_ra: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp4_overrides: Option<DhcpOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp6_overrides: Option<DhcpOverrides>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routing_policy: Vec<RoutingPolicy>,
}

impl InterfaceStanza {
    /// A stanza that brings the link up without addressing and never blocks boot.
    pub fn minimal() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    /// Append a route unless an identical one is already present.
    pub fn push_route(&mut self, route: Route) {
        if !self.routes.contains(&route) {
            self.routes.push(route);
        }
    }

    /// Append a policy rule unless an identical one is already present.
    pub fn push_policy(&mut self, rule: RoutingPolicy) {
        if !self.routing_policy.contains(&rule) {
            self.routing_policy.push(rule);
        }
    }
}

/// A `vlans:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanStanza {
    pub id: u16,
    pub link: String,
    #[serde(flatten)]
    pub interface: InterfaceStanza,
}

/// A `bridges:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStanza {
    pub interfaces: Vec<String>,
    #[serde(flatten)]
    pub interface: InterfaceStanza,
}

/// `nameservers:` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nameservers {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
}

/// `dhcp4-overrides:` / `dhcp6-overrides:` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DhcpOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_routes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_domains: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_dns: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_metric: Option<u32>,
}

/// Route `type:` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    #[default]
    Unicast,
    Blackhole,
    Unreachable,
    Prohibit,
}

impl RouteType {
    fn is_unicast(&self) -> bool {
        *self == RouteType::Unicast
    }
}

/// Route `scope:` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteScope {
    Host,
    Link,
    Global,
}

/// One entry of a stanza's `routes:` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
    #[serde(rename = "type", default, skip_serializing_if = "RouteType::is_unicast")]
    pub route_type: RouteType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<RouteScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_link: Option<bool>,
}

impl Route {
    /// Drop everything for `family` in `table`.
    pub fn blackhole(family: AddressFamily, table: u32) -> Self {
        Self {
            to: Some(family.default_destination().to_string()),
            table: Some(table),
            route_type: RouteType::Blackhole,
            ..Self::default()
        }
    }

    /// Directly connected subnet, pinned to `table`.
    pub fn link(subnet: impl Into<String>, from: impl Into<String>, table: u32) -> Self {
        Self {
            to: Some(subnet.into()),
            from: Some(from.into()),
            table: Some(table),
            scope: Some(RouteScope::Link),
            ..Self::default()
        }
    }

    /// Default route via `gateway`; `table: None` targets the main table.
    pub fn default_via(family: AddressFamily, gateway: impl Into<String>, table: Option<u32>) -> Self {
        Self {
            to: Some(family.default_destination().to_string()),
            via: Some(gateway.into()),
            table,
            ..Self::default()
        }
    }

    /// Whether this route covers the whole address space of its family.
    pub fn is_default(&self) -> bool {
        matches!(
            self.to.as_deref(),
            Some("default" | "0.0.0.0/0" | "::/0")
        )
    }
}

/// One entry of a stanza's `routing-policy:` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutingPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_of_service: Option<u8>,
}

impl RoutingPolicy {
    pub fn from_source(from: impl Into<String>, table: u32, priority: u32) -> Self {
        Self {
            from: Some(from.into()),
            table: Some(table),
            priority: Some(priority),
            ..Self::default()
        }
    }

    pub fn to_destination(to: impl Into<String>, table: u32, priority: u32) -> Self {
        Self {
            to: Some(to.into()),
            table: Some(table),
            priority: Some(priority),
            ..Self::default()
        }
    }
}

impl NetplanDocument {
    /// Empty version-2 document for the given renderer.
    pub fn new(renderer: &str) -> Self {
        Self {
            network: NetworkConfig {
                version: 2,
                renderer: Some(renderer.to_string()),
                ethernets: IndexMap::new(),
                vlans: IndexMap::new(),
                bridges: IndexMap::new(),
                dummy_devices: IndexMap::new(),
            },
        }
    }

    /// Mutable access to the shared settings of any named stanza.
    pub fn interface_mut(&mut self, name: &str) -> Option<&mut InterfaceStanza> {
        let network = &mut self.network;
        if let Some(stanza) = network.ethernets.get_mut(name) {
            return Some(stanza);
        }
        if let Some(vlan) = network.vlans.get_mut(name) {
            return Some(&mut vlan.interface);
        }
        if let Some(bridge) = network.bridges.get_mut(name) {
            return Some(&mut bridge.interface);
        }
        network.dummy_devices.get_mut(name)
    }

    /// Shared settings of any named stanza.
    pub fn interface(&self, name: &str) -> Option<&InterfaceStanza> {
        let network = &self.network;
        network
            .ethernets
            .get(name)
            .or_else(|| network.vlans.get(name).map(|v| &v.interface))
            .or_else(|| network.bridges.get(name).map(|b| &b.interface))
            .or_else(|| network.dummy_devices.get(name))
    }

    /// Names of every stanza, ethernets first.
    pub fn interface_names(&self) -> Vec<&str> {
        let network = &self.network;
        network
            .ethernets
            .keys()
            .chain(network.vlans.keys())
            .chain(network.bridges.keys())
            .chain(network.dummy_devices.keys())
            .map(String::as_str)
            .collect()
    }

    /// Render the document as YAML.
    pub fn to_yaml(&self) -> Result<String, RenderError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a document previously produced by [`NetplanDocument::to_yaml`].
    pub fn from_yaml(raw: &str) -> Result<Self, RenderError> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{InterfaceStanza, NetplanDocument, Route, RouteType};
    use crate::cidr::AddressFamily;

    #[test]
    fn blackhole_route_renders_type() {
        let route = Route::blackhole(AddressFamily::V4, 100);
        assert_eq!(route.route_type, RouteType::Blackhole);
        assert!(route.is_default());
        let yaml = serde_yaml::to_string(&route).expect("yaml");
        assert!(yaml.contains("type: blackhole"));
        assert!(yaml.contains("table: 100"));
    }

    #[test]
    fn unicast_type_is_not_rendered() {
        let yaml = serde_yaml::to_string(&Route::default_via(AddressFamily::V4, "10.0.0.1", None))
            .expect("yaml");
        assert!(!yaml.contains("type:"));
        assert!(!yaml.contains("table:"));
    }

    #[test]
    fn push_route_suppresses_duplicates() {
        let mut stanza = InterfaceStanza::minimal();
        stanza.push_route(Route::blackhole(AddressFamily::V4, 100));
        stanza.push_route(Route::blackhole(AddressFamily::V4, 100));
        assert_eq!(stanza.routes.len(), 1);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let mut doc = NetplanDocument::new("networkd");
        doc.network
            .ethernets
            .insert("eth0".to_string(), InterfaceStanza::minimal());
        let yaml = doc.to_yaml().expect("yaml");
        assert!(yaml.contains("ethernets:"));
        assert!(!yaml.contains("vlans:"));
        assert!(!yaml.contains("dummy-devices:"));
    }
}
