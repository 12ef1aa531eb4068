//! Logical network intent: networks, port forwards and DHCP reservations.
//!
//! These are plain data. Address strings stay exactly as the operator wrote
//! them; the compiler validates them and reports problems as findings.

use serde::{Deserialize, Serialize};

/// Role of a logical network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkRole {
    #[default]
    Network,
    Bridge,
    Internet,
}

/// How a network obtains its addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AddressConfig {
    /// DHCP client. The toggles only mean something in this mode.
    Auto {
        #[serde(default = "default_true")]
        dhcp4: bool,
        #[serde(default)]
        dhcp6: bool,
        #[serde(default)]
        accept_ra: bool,
    },
    /// Static `address/prefix` list, IPv4 and IPv6 mixed.
    Manual {
        #[serde(default)]
        addresses: Vec<String>,
    },
}

impl Default for AddressConfig {
    fn default() -> Self {
        AddressConfig::Auto {
            dhcp4: true,
            dhcp6: false,
            accept_ra: false,
        }
    }
}

impl AddressConfig {
    pub fn is_auto(&self) -> bool {
        matches!(self, AddressConfig::Auto { .. })
    }

    /// Static addresses; empty in `Auto` mode.
    pub fn addresses(&self) -> &[String] {
        match self {
            AddressConfig::Auto { .. } => &[],
            AddressConfig::Manual { addresses } => addresses,
        }
    }
}

/// Where a network's default route comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum GatewayMode {
    #[default]
    Disabled,
    /// Route through another network, referenced by id or interface name.
    #[serde(alias = "local-interface", alias = "internet")]
    ViaNetwork { network: String },
    /// Explicit gateway per address family.
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ipv4: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ipv6: Option<String>,
    },
}

/// Resolver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DnsConfig {
    /// Inherit from the network's internet gateway.
    #[default]
    Auto,
    Static {
        #[serde(default)]
        servers: Vec<String>,
        #[serde(default)]
        search: Vec<String>,
    },
}

/// Inclusive address range handed out by the DHCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpRange {
    pub start: String,
    pub end: String,
}

/// Static lease: MAC to IP, with an optional hostname override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressReservation {
    pub id: String,
    pub name: String,
    pub mac: String,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl AddressReservation {
    /// Hostname handed to the client; defaults to the reservation's name.
    pub fn effective_hostname(&self) -> &str {
        self.hostname
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

fn default_lease_time() -> String {
    "12h".to_string()
}

/// DHCP server role on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ranges: Vec<DhcpRange>,
    #[serde(default = "default_lease_time")]
    pub lease_time: String,
    #[serde(default, rename = "reservation", skip_serializing_if = "Vec::is_empty")]
    pub reservations: Vec<AddressReservation>,
}

impl Default for DhcpServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ranges: Vec::new(),
            lease_time: default_lease_time(),
            reservations: Vec::new(),
        }
    }
}

/// Port-forward protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardProtocol {
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "udp")]
    Udp,
    #[serde(rename = "tcp+udp", alias = "tcp + udp")]
    TcpUdp,
    /// Terminated by the reverse proxy, never forwarded at packet level.
    #[serde(rename = "https", alias = "http(s)")]
    Https,
}

impl ForwardProtocol {
    /// nftables match for `port` with this protocol; `None` for `https`.
    pub fn port_match(self, port: &str) -> Option<String> {
        match self {
            ForwardProtocol::Tcp => Some(format!("tcp dport {port}")),
            ForwardProtocol::Udp => Some(format!("udp dport {port}")),
            ForwardProtocol::TcpUdp => Some(format!("meta l4proto {{ tcp, udp }} th dport {port}")),
            ForwardProtocol::Https => None,
        }
    }
}

/// Inbound forward on an internet-typed network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub id: String,
    pub protocol: ForwardProtocol,
    /// Single port, range or nftables set (`{ 80, 443 }`).
    #[serde(default)]
    pub src_port: String,
    #[serde(default)]
    pub dst_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyRoute>,
}

/// Reverse-proxy settings of an `https` forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRoute {
    /// Upstream origin, e.g. `http://192.168.10.5:8123`.
    pub origin: String,
    /// Public domain name served by the proxy.
    pub domain: String,
    /// Raw arguments of Caddy's `dns` directive for ACME DNS challenges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_challenge: Option<String>,
    /// Replaces the generated site-block body verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_block: Option<String>,
}

/// A named VLAN on a parent interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalNetwork {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    #[serde(default)]
    pub role: NetworkRole,
    #[serde(default)]
    pub address: AddressConfig,
    #[serde(default)]
    pub gateway: GatewayMode,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub dhcp_server: DhcpServerConfig,
    #[serde(default, rename = "port_forward", skip_serializing_if = "Vec::is_empty")]
    pub port_forwards: Vec<PortForward>,
}

impl LogicalNetwork {
    /// Skeleton network with every optional setting at its default.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            parent: None,
            vlan_id: None,
            role: NetworkRole::Network,
            address: AddressConfig::default(),
            gateway: GatewayMode::Disabled,
            dns: DnsConfig::Auto,
            dhcp_server: DhcpServerConfig::default(),
            port_forwards: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Name of the OS link carrying the VLAN (`eth0` for tag 1, else `eth0.<tag>`).
    pub fn link_name(&self) -> Option<String> {
        let parent = self.parent.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        match self.vlan_id? {
            1 => Some(parent.to_string()),
            tag => Some(format!("{parent}.{tag}")),
        }
    }

    /// Name of the interface that carries this network's addresses and routes.
    pub fn interface_name(&self) -> Option<String> {
        let link = self.link_name()?;
        if self.role == NetworkRole::Bridge {
            return Some(bridge_name(&self.id));
        }
        Some(link)
    }

    /// The `(parent, vlan_id)` identity, when both are set.
    pub fn vlan_key(&self) -> Option<(&str, u16)> {
        let parent = self.parent.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        Some((parent, self.vlan_id?))
    }
}

/// Linux interface names are limited to 15 bytes.
pub const MAX_INTERFACE_NAME: usize = 15;

fn bridge_name(id: &str) -> String {
    let mut name = format!("br-{id}");
    let mut end = name.len().min(MAX_INTERFACE_NAME);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
    name
}

/// Whether `name` is usable as a kernel link name and safe to embed in scripts and unit names.
pub fn is_valid_interface_name(name: &str) -> bool {
    (1..=MAX_INTERFACE_NAME).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{is_valid_interface_name, AddressReservation, ForwardProtocol, LogicalNetwork, NetworkRole};

    fn network(parent: &str, vlan: u16) -> LogicalNetwork {
        let mut net = LogicalNetwork::new("lan");
        net.parent = Some(parent.to_string());
        net.vlan_id = Some(vlan);
        net
    }

    #[test]
    fn vlan_one_uses_parent_directly() {
        assert_eq!(network("eth0", 1).interface_name().as_deref(), Some("eth0"));
        assert_eq!(network("eth0", 10).interface_name().as_deref(), Some("eth0.10"));
    }

    #[test]
    fn missing_parent_or_tag_has_no_interface() {
        let mut net = network("eth0", 10);
        net.vlan_id = None;
        assert!(net.interface_name().is_none());
        let mut net = network("  ", 10);
        net.vlan_id = Some(10);
        assert!(net.interface_name().is_none());
    }

    #[test]
    fn bridge_role_gets_truncated_bridge_name() {
        let mut net = network("eth0", 20);
        net.id = "a-very-long-identifier".to_string();
        net.role = NetworkRole::Bridge;
        let name = net.interface_name().expect("bridge name");
        assert_eq!(name, "br-a-very-long-");
        assert_eq!(net.link_name().as_deref(), Some("eth0.20"));
    }

    #[test]
    fn bridge_name_truncates_on_a_char_boundary() {
        let mut net = network("eth0", 30);
        net.id = "aaaaaaaaaaaé".to_string();
        net.role = NetworkRole::Bridge;
        let name = net.interface_name().expect("bridge name");
        assert_eq!(name, "br-aaaaaaaaaaa");
        assert!(!is_valid_interface_name("br-aaaaaaaaaé"));
    }

    #[test]
    fn interface_names_are_short_and_shell_safe() {
        assert!(is_valid_interface_name("eth0.10"));
        assert!(is_valid_interface_name("br-lab_2"));
        assert!(!is_valid_interface_name(""));
        assert!(!is_valid_interface_name("enp0s31f6.40000x"));
        assert!(!is_valid_interface_name("eth0\";reboot"));
        assert!(!is_valid_interface_name("eth 0"));
    }

    #[test]
    fn tcp_udp_matches_both_protocols_in_one_expression() {
        assert_eq!(
            ForwardProtocol::TcpUdp.port_match("8080").as_deref(),
            Some("meta l4proto { tcp, udp } th dport 8080")
        );
        assert!(ForwardProtocol::Https.port_match("443").is_none());
    }

    #[test]
    fn reservation_hostname_defaults_to_name() {
        let mut res = AddressReservation {
            id: "printer".to_string(),
            name: "office-printer".to_string(),
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            ip: "192.168.10.20".to_string(),
            hostname: None,
        };
        assert_eq!(res.effective_hostname(), "office-printer");
        res.hostname = Some("lp0".to_string());
        assert_eq!(res.effective_hostname(), "lp0");
    }
}
