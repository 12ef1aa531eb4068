//! Interface and route document builder.
//!
//! Builds one network's stanza: addressing, resolver settings, DHCP client
//! flags and the routes and policy rules that pin its traffic to its own
//! table. Relationships between networks (gateway routes, priority-2 rules)
//! are layered on afterwards with the helpers at the bottom of this module.
//!
//! ## Route Set
//!
//! - blackhole `0.0.0.0/0` in the private table until a real default exists
//! - `scope: link` route per static address, pinned to the private table
//! - `from <address>` / `to <subnet>` policy rules at priority 1

use netcfg_core::{
    classify, parse_bare_address, subnet_of, AddressFamily, DhcpOverrides, InterfaceStanza,
    Nameservers, Route, RouteType, RoutingPolicy,
};

use crate::model::{AddressConfig, GatewayMode, LogicalNetwork};
use crate::tables::TableId;

/// Priority of rules that keep a network's own traffic in its own table.
pub const OWN_TABLE_PRIORITY: u32 = 1;
/// Priority of rules that send a network's traffic to its gateway's table.
pub const GATEWAY_PRIORITY: u32 = 2;

/// Resolved input for one network.
#[derive(Debug, Clone)]
pub struct RouteInput<'a> {
    pub network: &'a LogicalNetwork,
    /// Valid static `address/prefix` entries, in configured order.
    pub addresses: &'a [String],
    pub table: TableId,
    pub nameservers: Option<Nameservers>,
    /// Whether this network also feeds the host's main routing table.
    pub default_internet: bool,
}

/// Build the network's own stanza.
pub fn build_stanza(input: &RouteInput<'_>) -> InterfaceStanza {
    let table = input.table.get();
    let mut stanza = InterfaceStanza::minimal();
    stanza.addresses = input.addresses.to_vec();
    stanza.nameservers = input.nameservers.clone();

    if let AddressConfig::Auto {
        dhcp4,
        dhcp6,
        accept_ra,
    } = input.network.address
    {
        stanza.dhcp4 = dhcp4;
        stanza.dhcp6 = dhcp6;
        stanza.accept_ra = accept_ra;
        let overrides = DhcpOverrides {
            use_routes: Some(input.default_internet),
            use_domains: Some(false),
            ..DhcpOverrides::default()
        };
        if dhcp4 {
            stanza.dhcp4_overrides = Some(overrides.clone());
        }
        if dhcp6 {
            stanza.dhcp6_overrides = Some(overrides);
        }
    }

    stanza.push_route(Route::blackhole(AddressFamily::V4, table));

    for address in input.addresses {
        let Some(subnet) = subnet_of(address) else {
            continue;
        };
        let bare = parse_bare_address(address);
        stanza.push_route(Route::link(subnet.clone(), bare, table));
        stanza.push_policy(RoutingPolicy::from_source(bare, table, OWN_TABLE_PRIORITY));
        stanza.push_policy(RoutingPolicy::to_destination(subnet, table, OWN_TABLE_PRIORITY));
    }

    if let GatewayMode::Manual { ipv4, ipv6 } = &input.network.gateway {
        for (family, via) in manual_gateways(ipv4.as_deref(), ipv6.as_deref()) {
            install_default(&mut stanza, Route::default_via(family, via, Some(table)));
            if input.default_internet {
                install_default(&mut stanza, Route::default_via(family, via, None));
            }
        }
    }

    stanza
}

/// Valid `(family, gateway)` pairs from a manual gateway configuration.
///
/// An address in the wrong slot (IPv6 given as `ipv4`) is ignored.
pub fn manual_gateways<'a>(
    ipv4: Option<&'a str>,
    ipv6: Option<&'a str>,
) -> Vec<(AddressFamily, &'a str)> {
    [(AddressFamily::V4, ipv4), (AddressFamily::V6, ipv6)]
        .into_iter()
        .filter_map(|(family, gw)| {
            let gw = gw.map(str::trim).filter(|g| !g.is_empty())?;
            (classify(gw) == Some(family)).then_some((family, gw))
        })
        .collect()
}

/// Add a default route and drop the blackhole of the same table.
pub fn install_default(stanza: &mut InterfaceStanza, route: Route) {
    if let Some(table) = route.table {
        remove_blackholes(stanza, table);
    }
    stanza.push_route(route);
}

/// Drop blackhole defaults pinned to `table`.
pub fn remove_blackholes(stanza: &mut InterfaceStanza, table: u32) {
    stanza
        .routes
        .retain(|r| !(r.route_type == RouteType::Blackhole && r.table == Some(table)));
}

/// Priority-2 rules sending a network's sources to its gateway's table.
///
/// A network running a DHCP server matches its full subnets so leased
/// clients are covered; otherwise only its own addresses match.
pub fn gateway_policies(
    network: &LogicalNetwork,
    addresses: &[String],
    gateway_table: TableId,
) -> Vec<RoutingPolicy> {
    let serves_dhcp = network.dhcp_server.enabled;
    addresses
        .iter()
        .filter_map(|address| {
            let from = if serves_dhcp {
                subnet_of(address)?
            } else {
                parse_bare_address(address).to_string()
            };
            Some(RoutingPolicy::from_source(from, gateway_table.get(), GATEWAY_PRIORITY))
        })
        .collect()
}

/// Whether a network can carry traffic of `family`.
pub fn family_capable(network: &LogicalNetwork, addresses: &[String], family: AddressFamily) -> bool {
    if addresses.iter().any(|a| classify(a) == Some(family)) {
        return true;
    }
    match network.address {
        AddressConfig::Auto {
            dhcp4,
            dhcp6,
            accept_ra,
        } => match family {
            AddressFamily::V4 => dhcp4,
            AddressFamily::V6 => dhcp6 || accept_ra,
        },
        AddressConfig::Manual { .. } => false,
    }
}
