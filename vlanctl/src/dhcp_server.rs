//! dnsmasq configuration for networks that run a DHCP server.

use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr};

use netcfg_core::{classify, parse_bare_address, subnet_contains, AddressFamily, Nameservers};

use crate::findings::Findings;
use crate::model::LogicalNetwork;

/// Template unit managing one dnsmasq instance per interface.
pub fn unit_name(interface: &str) -> String {
    format!("vlanctl-dnsmasq@{interface}.service")
}

/// Render the dnsmasq configuration for `network` served on `interface`.
///
/// Returns `None` when the server is disabled or cannot run; the reason is
/// recorded as a finding. Invalid ranges and reservations are dropped one
/// by one.
pub fn render_dnsmasq(
    network: &LogicalNetwork,
    interface: &str,
    addresses: &[String],
    nameservers: Option<&Nameservers>,
    findings: &mut Findings,
) -> Option<String> {
    let server = &network.dhcp_server;
    if !server.enabled {
        return None;
    }
    let Some(router) = addresses
        .iter()
        .find(|a| classify(a) == Some(AddressFamily::V4))
    else {
        findings.warn(
            &network.id,
            "dhcp_server_needs_static",
            "DHCP server needs a static IPv4 address on the network; server not configured",
        );
        return None;
    };

    let mut out = String::from("# Generated by vlanctl. Do not edit.\n");
    let _ = writeln!(out, "interface={interface}");
    out.push_str("bind-interfaces\n");
    out.push_str("port=0\n");

    let mut ranges = 0;
    for range in &server.ranges {
        let inside = |ip: &str| ip.parse::<Ipv4Addr>().is_ok() && subnet_contains(router, ip);
        if !inside(&range.start) || !inside(&range.end) {
            findings.warn(
                &network.id,
                "dhcp_range_invalid",
                format!(
                    "DHCP range {}-{} is not inside {router}; range skipped",
                    range.start, range.end
                ),
            );
            continue;
        }
        let _ = writeln!(
            out,
            "dhcp-range={},{},{}",
            range.start, range.end, server.lease_time
        );
        ranges += 1;
    }
    if ranges == 0 && server.reservations.is_empty() {
        findings.warn(
            &network.id,
            "dhcp_server_empty",
            "DHCP server has no usable range or reservation; server not configured",
        );
        return None;
    }
    if ranges == 0 {
        // Reservations alone still need a static range to answer on.
        let _ = writeln!(
            out,
            "dhcp-range={},static,{}",
            subnet_base(router),
            server.lease_time
        );
    }

    let _ = writeln!(out, "dhcp-option=option:router,{}", parse_bare_address(router));
    let dns: Vec<&str> = nameservers
        .map(|ns| {
            ns.addresses
                .iter()
                .map(String::as_str)
                .filter(|a| classify(a) == Some(AddressFamily::V4))
                .collect()
        })
        .unwrap_or_default();
    if !dns.is_empty() {
        let _ = writeln!(out, "dhcp-option=option:dns-server,{}", dns.join(","));
    }
    if let Some(domain) = nameservers.and_then(|ns| ns.search.first()) {
        let _ = writeln!(out, "domain={domain}");
    }

    for reservation in &server.reservations {
        if !valid_mac(&reservation.mac) || reservation.ip.parse::<IpAddr>().is_err() {
            findings.warn(
                &reservation.id,
                "reservation_invalid",
                format!(
                    "reservation {} -> {} is malformed; skipped",
                    reservation.mac, reservation.ip
                ),
            );
            continue;
        }
        if !subnet_contains(router, &reservation.ip) {
            findings.warn(
                &reservation.id,
                "reservation_outside_subnet",
                format!("reserved address {} is outside {router}", reservation.ip),
            );
        }
        let _ = writeln!(
            out,
            "dhcp-host={},{},{}",
            reservation.mac.to_ascii_lowercase(),
            reservation.ip,
            reservation.effective_hostname()
        );
    }
    Some(out)
}

fn subnet_base(cidr: &str) -> String {
    netcfg_core::parse_cidr(cidr)
        .map(|net| net.network().to_string())
        .unwrap_or_else(|| parse_bare_address(cidr).to_string())
}

fn valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}
