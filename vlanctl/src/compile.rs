//! Network plan compiler.
//!
//! Turns the repository's logical networks into one [`CompiledPlan`]. The
//! pass runs in fixed stages:
//!
//! 1. flush the managed firewall tables
//! 2. resolve every network (validate, sanitize, link gateways), then emit
//!    stanzas, tables and gateway relationships in iteration order
//! 3. give referenced parent interfaces a minimal stanza
//! 4. internet post-processing: masquerade, reverse proxy, port forwards
//!
//! Nothing in here fails. Incomplete or contradictory settings become
//! [`PlanFinding`]s and the affected network or entry is left out.

use netcfg_core::{
    classify, parse_bare_address, parse_cidr, subnet_contains, subnet_of, AddressFamily,
    BridgeStanza, InterfaceStanza, Nameservers, NetplanDocument, Route, RoutingPolicy, RuleFamily,
    RuleSet, VlanStanza,
};
use serde::Serialize;

use crate::dhcp_hook::{render_event_hook, render_polling_watcher, HookEntry};
use crate::dhcp_server::render_dnsmasq;
use crate::findings::{Findings, PlanFinding};
use crate::firewall::{FirewallEmitter, ForwardSpec, RedirectSpec};
use crate::model::{
    is_valid_interface_name, AddressConfig, DnsConfig, ForwardProtocol, GatewayMode, LogicalNetwork,
    NetworkRole, PortForward,
};
use crate::reverse_proxy::{collect_sites, render_caddyfile, ProxyPorts, ProxySite};
use crate::routes::{
    build_stanza, family_capable, gateway_policies, install_default, manual_gateways,
    remove_blackholes, RouteInput, OWN_TABLE_PRIORITY,
};
use crate::settings::{HookStrategy, Settings};
use crate::store::NetworkRepository;
use crate::tables::{TableAllocator, TableId};

/// Interface to routing-table mapping of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableAssignment {
    pub interface: String,
    pub table: TableId,
}

/// Reverse-proxy instance of an internet network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyInstance {
    pub ports: ProxyPorts,
    pub sites: Vec<ProxySite>,
    pub caddyfile: String,
}

/// Per-network services started after the artifacts are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BringUp {
    pub network: String,
    pub interface: String,
    /// dnsmasq configuration when the network serves DHCP.
    pub dhcp_server: Option<String>,
    pub proxy: Option<ProxyInstance>,
}

/// Output of one compilation pass.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub netplan: NetplanDocument,
    pub firewall: RuleSet,
    pub hook_strategy: HookStrategy,
    pub hook_entries: Vec<HookEntry>,
    pub dhcp_hook: String,
    pub tables: Vec<TableAssignment>,
    pub bring_up: Vec<BringUp>,
    pub findings: Vec<PlanFinding>,
}

impl CompiledPlan {
    pub fn table_of(&self, interface: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|t| t.interface == interface)
            .map(|t| t.table)
    }
}

/// A network that passed validation, with its derived names.
#[derive(Debug)]
struct Resolved<'a> {
    network: &'a LogicalNetwork,
    /// Interface carrying addresses, routes and rules.
    interface: String,
    /// VLAN link (or the parent itself for tag 1).
    link: String,
    parent: String,
    vlan_id: u16,
    addresses: Vec<String>,
    gateway: GatewayMode,
    upstream: Option<usize>,
}

impl Resolved<'_> {
    fn id(&self) -> &str {
        &self.network.id
    }

    fn capable(&self, family: AddressFamily) -> bool {
        family_capable(self.network, &self.addresses, family)
    }

    fn bare_addresses(&self, family: AddressFamily) -> Vec<String> {
        self.addresses
            .iter()
            .filter(|a| classify(a) == Some(family))
            .map(|a| parse_bare_address(a).to_string())
            .collect()
    }

    fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| subnet_contains(a, address))
    }
}

/// Compile every network of `repo` into a plan.
pub fn compile<R: NetworkRepository + ?Sized>(repo: &R, settings: &Settings) -> CompiledPlan {
    let networks = repo.networks();
    let mut compiler = Compiler::new(settings);

    tracing::info!(networks = networks.len(), "compiling network plan");
    compiler.firewall.flush();
    compiler.resolve(&networks);
    compiler.link_gateways();
    compiler.pick_default_internet();
    compiler.emit_networks();
    compiler.apply_gateway_relations();
    compiler.complete_parents();
    compiler.post_process_internet();
    compiler.finish()
}

struct Compiler<'a> {
    settings: &'a Settings,
    findings: Findings,
    resolved: Vec<Resolved<'a>>,
    default_internet: Option<usize>,
    tables: TableAllocator,
    doc: NetplanDocument,
    firewall: FirewallEmitter,
    hooks: Vec<HookEntry>,
    bring_up: Vec<BringUp>,
}

impl<'a> Compiler<'a> {
    fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            findings: Findings::default(),
            resolved: Vec::new(),
            default_internet: None,
            tables: TableAllocator::new(settings.table_base),
            doc: NetplanDocument::new(&settings.renderer),
            firewall: FirewallEmitter::new(&settings.firewall_table),
            hooks: Vec::new(),
            bring_up: Vec::new(),
        }
    }

    fn resolve(&mut self, networks: &[&'a LogicalNetwork]) {
        for &network in networks {
            if let Some(resolved) = self.resolve_one(network) {
                self.resolved.push(resolved);
            }
        }
    }

    fn resolve_one(&mut self, network: &'a LogicalNetwork) -> Option<Resolved<'a>> {
        let id = network.id.as_str();
        let Some(vlan_id) = network.vlan_id else {
            self.findings
                .warn(id, "missing_vlan_id", "network has no VLAN ID; skipped");
            return None;
        };
        if !(1..=4095).contains(&vlan_id) {
            self.findings.warn(
                id,
                "invalid_vlan_id",
                format!("VLAN ID {vlan_id} is outside 1..=4095; skipped"),
            );
            return None;
        }
        let (Some(link), Some(interface), Some((parent, _))) =
            (network.link_name(), network.interface_name(), network.vlan_key())
        else {
            self.findings
                .warn(id, "missing_parent", "network has no parent interface; skipped");
            return None;
        };
        if let Some(bad) = [parent, link.as_str(), interface.as_str()]
            .into_iter()
            .find(|name| !is_valid_interface_name(name))
        {
            self.findings.warn(
                id,
                "invalid_interface_name",
                format!("interface name {bad:?} is not a valid link name; skipped"),
            );
            return None;
        }
        let parent = parent.to_string();

        if let Some(other) = self
            .resolved
            .iter()
            .find(|r| r.interface == interface || r.link == link || r.interface == link)
        {
            self.findings.warn(
                id,
                "duplicate_interface",
                format!("interface {interface} is already used by network '{}'; skipped", other.id()),
            );
            return None;
        }

        let addresses = self.valid_addresses(network);
        if matches!(network.address, AddressConfig::Manual { .. }) && addresses.is_empty() {
            self.findings.warn(
                id,
                "missing_address",
                "manual addressing without a valid address; skipped",
            );
            return None;
        }

        let mut gateway = network.gateway.clone();
        if network.role == NetworkRole::Internet && matches!(gateway, GatewayMode::ViaNetwork { .. }) {
            self.findings.warn(
                id,
                "internet_gateway_forced",
                "internet networks cannot route through another network; gateway set to manual",
            );
            gateway = GatewayMode::Manual {
                ipv4: None,
                ipv6: None,
            };
        }

        Some(Resolved {
            network,
            interface,
            link,
            parent,
            vlan_id,
            addresses,
            gateway,
            upstream: None,
        })
    }

    fn valid_addresses(&mut self, network: &LogicalNetwork) -> Vec<String> {
        let mut valid = Vec::new();
        for address in network.address.addresses() {
            let trimmed = address.trim();
            if trimmed.contains('/') && parse_cidr(trimmed).is_some() {
                valid.push(trimmed.to_string());
            } else {
                self.findings.warn(
                    &network.id,
                    "invalid_address",
                    format!("address '{address}' is not a valid CIDR; dropped"),
                );
            }
        }
        valid
    }

    fn link_gateways(&mut self) {
        for idx in 0..self.resolved.len() {
            let GatewayMode::ViaNetwork { network: reference } = &self.resolved[idx].gateway else {
                continue;
            };
            let reference = reference.trim();
            let target = self
                .find(reference)
                .filter(|&target| target != idx);
            match target {
                Some(target) => self.resolved[idx].upstream = Some(target),
                None => {
                    let message = format!(
                        "gateway '{reference}' does not match any other usable network; keeping blackhole default"
                    );
                    let id = self.resolved[idx].network.id.clone();
                    self.findings.warn(&id, "gateway_unresolved", message);
                }
            }
        }
    }

    /// Index of the network named `reference`, by id first, then by interface.
    fn find(&self, reference: &str) -> Option<usize> {
        self.resolved
            .iter()
            .position(|r| r.id() == reference)
            .or_else(|| {
                self.resolved
                    .iter()
                    .position(|r| r.interface == reference || r.link == reference)
            })
    }

    fn pick_default_internet(&mut self) {
        if let Some(name) = self.settings.default_internet.as_deref() {
            match self.find(name) {
                Some(idx) => {
                    self.default_internet = Some(idx);
                    return;
                }
                None => self.findings.warn(
                    name,
                    "default_internet_unresolved",
                    "default internet network is missing or skipped; using the first internet network",
                ),
            }
        }
        self.default_internet = self
            .resolved
            .iter()
            .position(|r| r.network.role == NetworkRole::Internet);
    }

    fn nameservers_for(&mut self, idx: usize) -> Option<Nameservers> {
        let current = &self.resolved[idx];
        if let DnsConfig::Static { servers, search } = &current.network.dns {
            if servers.is_empty() && search.is_empty() {
                return None;
            }
            return Some(Nameservers {
                addresses: servers.clone(),
                search: search.clone(),
            });
        }
        if current.network.address.is_auto() {
            return None;
        }
        let source = current
            .upstream
            .or(self.default_internet)
            .filter(|&source| source != idx)?;
        let source = self.resolved[source].network;
        match &source.dns {
            DnsConfig::Static { servers, search } => Some(Nameservers {
                addresses: servers.clone(),
                search: search.clone(),
            }),
            DnsConfig::Auto => {
                if source.address.is_auto() {
                    let id = current.network.id.clone();
                    self.findings.warn(
                        &id,
                        "dns_inherit_dynamic",
                        format!(
                            "DNS is auto but gateway '{}' learns its resolvers over DHCP; no DNS servers configured",
                            source.id
                        ),
                    );
                }
                None
            }
        }
    }

    fn emit_networks(&mut self) {
        for idx in 0..self.resolved.len() {
            let table = self.tables.ensure(&self.resolved[idx].interface);
            if let Some(upstream) = self.resolved[idx].upstream {
                self.tables.ensure(&self.resolved[upstream].interface);
            }
            let nameservers = self.nameservers_for(idx);
            let current = &self.resolved[idx];
            let mut network = current.network.clone();
            network.gateway = current.gateway.clone();
            let stanza = build_stanza(&RouteInput {
                network: &network,
                addresses: &current.addresses,
                table,
                nameservers: nameservers.clone(),
                default_internet: self.default_internet == Some(idx),
            });
            self.insert_stanza(idx, stanza);

            let current = &self.resolved[idx];
            if let AddressConfig::Auto { dhcp4: true, .. } = current.network.address {
                push_hook(&mut self.hooks, &current.interface, table);
            }
            let dhcp_server = render_dnsmasq(
                current.network,
                &current.interface,
                &current.addresses,
                nameservers.as_ref(),
                &mut self.findings,
            );
            self.bring_up.push(BringUp {
                network: current.network.id.clone(),
                interface: current.interface.clone(),
                dhcp_server,
                proxy: None,
            });
            tracing::debug!(network = %current.network.id, interface = %current.interface, %table, "emitted network");
        }
    }

    fn insert_stanza(&mut self, idx: usize, stanza: InterfaceStanza) {
        let current = &self.resolved[idx];
        let config = &mut self.doc.network;
        let member = match current.network.role {
            NetworkRole::Bridge => {
                config.bridges.insert(
                    current.interface.clone(),
                    BridgeStanza {
                        interfaces: vec![current.link.clone()],
                        interface: stanza,
                    },
                );
                InterfaceStanza::minimal()
            }
            _ => stanza,
        };
        if current.vlan_id == 1 {
            config.ethernets.insert(current.link.clone(), member);
        } else {
            config.vlans.insert(
                current.link.clone(),
                VlanStanza {
                    id: current.vlan_id,
                    link: current.parent.clone(),
                    interface: member,
                },
            );
        }
    }

    fn apply_gateway_relations(&mut self) {
        for idx in 0..self.resolved.len() {
            let Some(upstream) = self.resolved[idx].upstream else {
                continue;
            };
            let lan = &self.resolved[idx];
            let wan = &self.resolved[upstream];
            let (Some(own_table), Some(gateway_table)) =
                (self.tables.get(&lan.interface), self.tables.get(&wan.interface))
            else {
                continue;
            };

            if let Some(stanza) = self.doc.interface_mut(&lan.interface) {
                remove_blackholes(stanza, own_table.get());
                for rule in gateway_policies(lan.network, &lan.addresses, gateway_table) {
                    stanza.push_policy(rule);
                }
            }

            match (&wan.network.address, &wan.gateway) {
                (AddressConfig::Manual { .. }, GatewayMode::Manual { ipv4, ipv6 }) => {
                    let gateways = manual_gateways(ipv4.as_deref(), ipv6.as_deref());
                    if gateways.is_empty() {
                        self.findings.warn(
                            &lan.network.id,
                            "gateway_no_route",
                            format!("gateway network '{}' has no gateway address; its table stays blackholed", wan.id()),
                        );
                    }
                    if let Some(stanza) = self.doc.interface_mut(&wan.interface) {
                        for (family, via) in gateways {
                            install_default(
                                stanza,
                                Route::default_via(family, via, Some(gateway_table.get())),
                            );
                        }
                    }
                }
                (AddressConfig::Manual { .. }, _) => {
                    self.findings.warn(
                        &lan.network.id,
                        "gateway_no_route",
                        format!("gateway network '{}' has no gateway address; its table stays blackholed", wan.id()),
                    );
                }
                (AddressConfig::Auto { dhcp4, .. }, _) => {
                    if *dhcp4 {
                        push_hook(&mut self.hooks, &wan.interface, gateway_table);
                    }
                }
            }

            for family in [AddressFamily::V4, AddressFamily::V6] {
                if lan.capable(family) && wan.capable(family) {
                    self.firewall
                        .add_wan_gateway(RuleFamily::from(family), &wan.interface, &lan.interface);
                }
            }
        }
    }

    fn complete_parents(&mut self) {
        for resolved in &self.resolved {
            if self.doc.network.ethernets.contains_key(&resolved.parent) {
                continue;
            }
            tracing::debug!(parent = %resolved.parent, "adding minimal parent stanza");
            self.doc
                .network
                .ethernets
                .insert(resolved.parent.clone(), InterfaceStanza::minimal());
        }
    }

    fn post_process_internet(&mut self) {
        let mut proxied: u16 = 0;
        for idx in 0..self.resolved.len() {
            if self.resolved[idx].network.role != NetworkRole::Internet {
                continue;
            }
            let dependents: Vec<usize> = (0..self.resolved.len())
                .filter(|&k| self.resolved[k].upstream == Some(idx))
                .collect();
            let network = self.resolved[idx].network;
            let wan = &self.resolved[idx];
            for family in [AddressFamily::V4, AddressFamily::V6] {
                if wan.capable(family) {
                    self.firewall.add_masquerade(family.into(), &wan.interface);
                }
            }

            let sites = collect_sites(&network.port_forwards, &mut self.findings);
            if !sites.is_empty() {
                let ports = ProxyPorts::allocate(&self.settings.proxy, proxied);
                proxied += 1;
                self.redirect_to_proxy(idx, &dependents, ports);
                let caddyfile = render_caddyfile(&self.settings.proxy, ports, &sites);
                if let Some(entry) = self.bring_up.iter_mut().find(|b| b.network == network.id) {
                    entry.proxy = Some(ProxyInstance {
                        ports,
                        sites,
                        caddyfile,
                    });
                }
            }

            for forward in &network.port_forwards {
                if forward.protocol == ForwardProtocol::Https {
                    continue;
                }
                self.emit_port_forward(idx, &dependents, forward);
            }
        }
        if proxied > 0 {
            self.add_proxy_device();
        }
    }

    fn redirect_to_proxy(&mut self, idx: usize, dependents: &[usize], ports: ProxyPorts) {
        let wan = &self.resolved[idx];
        let proxy = &self.settings.proxy;
        for (family, target) in [
            (AddressFamily::V4, proxy.fake_loopback_v4.as_str()),
            (AddressFamily::V6, proxy.fake_loopback_v6.as_str()),
        ] {
            if !wan.capable(family) {
                continue;
            }
            let wan_addresses = wan.bare_addresses(family);
            let lans = self.lan_interfaces(dependents, family, None);
            for (port, target_port) in [(443, ports.https), (80, ports.http)] {
                self.firewall.add_local_redirect(&RedirectSpec {
                    family: family.into(),
                    wan: &wan.interface,
                    wan_addresses: &wan_addresses,
                    lans: &lans,
                    port,
                    target,
                    target_port,
                });
            }
        }
    }

    fn emit_port_forward(&mut self, idx: usize, dependents: &[usize], forward: &PortForward) {
        let wan = &self.resolved[idx];
        let src_port = forward.src_port.trim();
        if src_port.is_empty() {
            self.findings
                .warn(&forward.id, "forward_port_missing", "port forward has no source port; skipped");
            return;
        }
        let dst_ip = forward.dst_ip.trim();
        let Some(family) = classify(dst_ip).filter(|_| !dst_ip.contains('/')) else {
            self.findings.warn(
                &forward.id,
                "forward_destination_invalid",
                format!("destination '{}' is not an IP address; skipped", forward.dst_ip),
            );
            return;
        };
        if !wan.capable(family) {
            self.findings.warn(
                &forward.id,
                "forward_family_unavailable",
                format!("{} has no {family} connectivity; skipped", wan.interface),
            );
            return;
        }

        let skip_containing = (family == AddressFamily::V6).then_some(dst_ip);
        let lans = self.lan_interfaces(dependents, family, skip_containing);
        let wan_addresses = wan.bare_addresses(family);
        self.firewall.add_port_forward(&ForwardSpec {
            family: family.into(),
            wan: &wan.interface,
            wan_addresses: &wan_addresses,
            lans: &lans,
            protocol: forward.protocol,
            src_port,
            dst_ip,
            dst_port: forward.dst_port.as_deref().map(str::trim).filter(|p| !p.is_empty()),
        });

        let Some(owner) = self.resolved.iter().position(|r| r.contains(dst_ip)) else {
            return;
        };
        let Some(table) = self.tables.get(&self.resolved[owner].interface) else {
            return;
        };
        for &lan in dependents {
            if lan == owner {
                continue;
            }
            let resolved = &self.resolved[lan];
            let subnets: Vec<String> = resolved
                .addresses
                .iter()
                .filter(|a| classify(a) == Some(family))
                .filter_map(|a| subnet_of(a))
                .collect();
            let Some(stanza) = self.doc.interface_mut(&resolved.interface) else {
                continue;
            };
            for subnet in subnets {
                stanza.push_policy(RoutingPolicy {
                    from: Some(subnet),
                    to: Some(dst_ip.to_string()),
                    table: Some(table.get()),
                    priority: Some(OWN_TABLE_PRIORITY),
                    ..RoutingPolicy::default()
                });
            }
        }
    }

    /// Interfaces of dependent LANs able to carry `family`.
    fn lan_interfaces(&self, dependents: &[usize], family: AddressFamily, skip_containing: Option<&str>) -> Vec<String> {
        dependents
            .iter()
            .map(|&k| &self.resolved[k])
            .filter(|r| r.capable(family))
            .filter(|r| skip_containing.map_or(true, |addr| !r.contains(addr)))
            .map(|r| r.interface.clone())
            .collect()
    }

    fn add_proxy_device(&mut self) {
        let proxy = &self.settings.proxy;
        let mut stanza = InterfaceStanza::minimal();
        stanza.addresses = vec![
            format!("{}/32", proxy.fake_loopback_v4),
            format!("{}/128", proxy.fake_loopback_v6),
        ];
        self.doc
            .network
            .dummy_devices
            .insert(proxy.device.clone(), stanza);
    }

    fn finish(self) -> CompiledPlan {
        let dhcp_hook = match self.settings.dhcp_hook {
            HookStrategy::Event => render_event_hook(&self.hooks),
            HookStrategy::Polling => render_polling_watcher(&self.hooks, self.settings.poll_interval_secs),
        };
        let tables = self
            .tables
            .allocations()
            .map(|(interface, table)| TableAssignment {
                interface: interface.to_string(),
                table,
            })
            .collect();
        let firewall = self.firewall.into_rules();
        tracing::info!(
            interfaces = self.doc.interface_names().len(),
            rules = firewall.len(),
            "compiled network plan"
        );
        CompiledPlan {
            netplan: self.doc,
            firewall,
            hook_strategy: self.settings.dhcp_hook,
            hook_entries: self.hooks,
            dhcp_hook,
            tables,
            bring_up: self.bring_up,
            findings: self.findings.into_vec(),
        }
    }
}

fn push_hook(hooks: &mut Vec<HookEntry>, interface: &str, table: TableId) {
    let entry = HookEntry {
        interface: interface.to_string(),
        table,
    };
    if !hooks.contains(&entry) {
        hooks.push(entry);
    }
}
