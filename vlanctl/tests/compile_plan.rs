use netcfg_core::{RouteType, RoutingPolicy};
use pretty_assertions::assert_eq;
use vlanctl::compile::{compile, CompiledPlan};
use vlanctl::model::LogicalNetwork;
use vlanctl::settings::{parse_network_file, NetworkFile};
use vlanctl::store::{Descriptor, NetworkRepository, StoreError};

const TWO_NETWORKS: &str = r#"
[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"
address = { mode = "auto", dhcp4 = true }

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "local-interface", network = "wan" }
"#;

fn load(raw: &str) -> NetworkFile {
    parse_network_file(raw, "test".to_string()).expect("parse network file")
}

fn plan_of(raw: &str) -> CompiledPlan {
    let file = load(raw);
    compile(&file.store, &file.settings)
}

fn rule_lines(plan: &CompiledPlan) -> Vec<String> {
    plan.firewall
        .rules()
        .map(|rule| plan.firewall.render_rule(rule))
        .collect()
}

fn codes(plan: &CompiledPlan) -> Vec<&str> {
    plan.findings.iter().map(|f| f.code.as_str()).collect()
}

#[test]
fn vlan_behind_dhcp_uplink() {
    let plan = plan_of(TWO_NETWORKS);
    let network = &plan.netplan.network;

    let wan = &network.ethernets["eth0"];
    assert!(wan.dhcp4);
    assert!(!network.vlans.contains_key("eth0"));

    let lan = &network.vlans["eth0.10"];
    assert_eq!(lan.id, 10);
    assert_eq!(lan.link, "eth0");
    assert_eq!(lan.interface.addresses, vec!["192.168.10.1/24"]);

    let wan_table = plan.table_of("eth0").expect("wan table").get();
    let lan_table = plan.table_of("eth0.10").expect("lan table").get();
    assert_eq!((wan_table, lan_table), (100, 101));
    assert!(!lan
        .interface
        .routes
        .iter()
        .any(|r| r.route_type == RouteType::Blackhole));
    assert!(lan
        .interface
        .routing_policy
        .contains(&RoutingPolicy::from_source("192.168.10.1", wan_table, 2)));

    let rules = rule_lines(&plan);
    assert!(rules.contains(&r#"add rule ip vlanctl postrouting oifname "eth0" masquerade"#.to_string()));
    assert!(rules.contains(&r#"add rule ip vlanctl forward iifname "eth0.10" oifname "eth0" accept"#.to_string()));
    assert!(rules.contains(
        &r#"add rule ip vlanctl forward iifname "eth0" oifname "eth0.10" ct state established,related accept"#
            .to_string()
    ));

    assert_eq!(plan.hook_entries.len(), 1);
    assert_eq!(plan.hook_entries[0].interface, "eth0");
    assert!(plan.dhcp_hook.contains("install_default \"eth0\" 100"));
    assert_eq!(codes(&plan), vec!["dns_inherit_dynamic"]);
}

#[test]
fn duplicate_vlan_pair_is_rejected_without_changes() {
    let mut file = load(TWO_NETWORKS);
    let mut clash = LogicalNetwork::new("guest");
    clash.parent = Some("eth0".to_string());
    clash.vlan_id = Some(10);

    let err = file
        .store
        .create(None, Descriptor::Network(clash))
        .expect_err("duplicate pair");
    assert_eq!(
        err,
        StoreError::VlanInUse {
            parent: "eth0".to_string(),
            vlan_id: 10,
            existing: "lan".to_string(),
        }
    );
    assert!(err.to_string().contains("VLAN ID already in use"));
    assert_eq!(file.store.networks().len(), 2);
    assert!(file.store.network("guest").is_none());
}

#[test]
fn incomplete_networks_are_skipped_with_findings() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"

[[network]]
id = "guest"
parent = "eth0"
address = { mode = "manual", addresses = ["192.168.30.1/24"] }

[[network]]
id = "lab"
vlan_id = 40

[[network]]
id = "broken"
parent = "eth0"
vlan_id = 50
address = { mode = "manual", addresses = ["not-an-address"] }
"#,
    );
    assert_eq!(
        codes(&plan),
        vec!["missing_vlan_id", "missing_parent", "invalid_address", "missing_address"]
    );
    assert_eq!(plan.netplan.interface_names(), vec!["eth0"]);
    assert_eq!(plan.tables.len(), 1);
}

#[test]
fn compiling_twice_gives_identical_artifacts() {
    let first = plan_of(TWO_NETWORKS);
    let second = plan_of(TWO_NETWORKS);
    assert_eq!(
        first.netplan.to_yaml().expect("yaml"),
        second.netplan.to_yaml().expect("yaml")
    );
    assert_eq!(first.firewall.render(), second.firewall.render());
    assert_eq!(first.dhcp_hook, second.dhcp_hook);
}

#[test]
fn rendered_firewall_flushes_before_rules() {
    let plan = plan_of(TWO_NETWORKS);
    let rendered = plan.firewall.render();
    let flush = rendered.find("flush table ip vlanctl").expect("flush");
    let first_rule = rendered.find("add rule").expect("rule");
    assert!(flush < first_rule);
    assert!(rendered.contains("flush table ip6 vlanctl"));
}

#[test]
fn unresolved_gateway_keeps_blackhole() {
    let plan = plan_of(
        r#"
[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "via-network", network = "nowhere" }
"#,
    );
    assert_eq!(codes(&plan), vec!["gateway_unresolved"]);
    let lan = plan.netplan.interface("eth0.10").expect("lan stanza");
    assert!(lan
        .routes
        .iter()
        .any(|r| r.route_type == RouteType::Blackhole && r.table == Some(100)));
    assert!(plan.firewall.is_empty());
}

#[test]
fn manual_uplink_gateway_fills_both_tables() {
    let plan = plan_of(
        r#"
[settings]
default_internet = "wan"

[[network]]
id = "wan"
parent = "eth1"
vlan_id = 1
role = "internet"
address = { mode = "manual", addresses = ["203.0.113.10/24"] }
gateway = { mode = "manual", ipv4 = "203.0.113.1" }

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "via-network", network = "eth1" }

[network.dhcp_server]
enabled = true
ranges = [{ start = "192.168.10.100", end = "192.168.10.200" }]
"#,
    );
    let wan = plan.netplan.interface("eth1").expect("wan stanza");
    let defaults: Vec<(Option<&str>, Option<u32>)> = wan
        .routes
        .iter()
        .filter(|r| r.is_default())
        .map(|r| (r.via.as_deref(), r.table))
        .collect();
    assert_eq!(
        defaults,
        vec![(Some("203.0.113.1"), Some(100)), (Some("203.0.113.1"), None)]
    );
    assert!(!wan.routes.iter().any(|r| r.route_type == RouteType::Blackhole));

    let lan = plan.netplan.interface("eth0.10").expect("lan stanza");
    assert!(lan
        .routing_policy
        .contains(&RoutingPolicy::from_source("192.168.10.0/24", 100, 2)));
    assert!(plan.hook_entries.is_empty());
    assert!(plan.netplan.network.ethernets["eth0"].optional);

    let dnsmasq = plan.bring_up[1].dhcp_server.as_deref().expect("dnsmasq config");
    assert!(dnsmasq.contains("dhcp-range=192.168.10.100,192.168.10.200"));
}

#[test]
fn manual_uplink_without_gateway_is_reported() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth1"
vlan_id = 1
role = "internet"
address = { mode = "manual", addresses = ["203.0.113.10/24"] }

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "via-network", network = "wan" }
"#,
    );
    assert_eq!(codes(&plan), vec!["gateway_no_route"]);
    let wan = plan.netplan.interface("eth1").expect("wan stanza");
    assert!(wan.routes.iter().any(|r| r.route_type == RouteType::Blackhole));
}

#[test]
fn internet_network_cannot_route_through_another() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"
address = { mode = "auto", dhcp4 = true }

[[network]]
id = "wan2"
parent = "eth1"
vlan_id = 1
role = "internet"
address = { mode = "auto", dhcp4 = true }
gateway = { mode = "internet", network = "wan" }
"#,
    );
    assert_eq!(codes(&plan), vec!["internet_gateway_forced"]);
    assert!(plan.netplan.interface("eth1").is_some());
    let rules = rule_lines(&plan);
    assert!(!rules.iter().any(|r| r.contains("iifname \"eth1\" oifname \"eth0\"")));
}

#[test]
fn tcp_udp_forward_matches_both_protocols_in_one_rule() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"
address = { mode = "manual", addresses = ["203.0.113.10/24"] }
gateway = { mode = "manual", ipv4 = "203.0.113.1" }

[[network.port_forward]]
id = "game"
protocol = "tcp+udp"
src_port = "27015"
dst_ip = "192.168.10.50"

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "via-network", network = "wan" }
"#,
    );
    let rules = rule_lines(&plan);
    assert!(rules.contains(
        &r#"add rule ip vlanctl prerouting iifname "eth0" ip daddr 203.0.113.10 meta l4proto { tcp, udp } th dport 27015 dnat to 192.168.10.50"#
            .to_string()
    ));
    assert!(rules.contains(
        &r#"add rule ip vlanctl forward iifname "eth0" ip daddr 192.168.10.50 meta l4proto { tcp, udp } th dport 27015 accept"#
            .to_string()
    ));
    // WAN rule plus the hairpin on the one LAN
    assert_eq!(rules.iter().filter(|r| r.contains("dnat to")).count(), 2);
    assert!(plan.findings.is_empty(), "{:?}", plan.findings);
}

#[test]
fn forward_to_other_lan_gets_priority_one_rule() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"
address = { mode = "manual", addresses = ["203.0.113.10/24"] }
gateway = { mode = "manual", ipv4 = "203.0.113.1" }

[[network.port_forward]]
id = "nas"
protocol = "tcp"
src_port = "8080"
dst_ip = "192.168.10.5"
dst_port = "80"

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "via-network", network = "wan" }

[[network]]
id = "iot"
parent = "eth0"
vlan_id = 20
address = { mode = "manual", addresses = ["192.168.20.1/24"] }
gateway = { mode = "via-network", network = "wan" }
"#,
    );
    let lan_table = plan.table_of("eth0.10").expect("lan table").get();
    let iot = plan.netplan.interface("eth0.20").expect("iot stanza");
    let expected = RoutingPolicy {
        from: Some("192.168.20.0/24".to_string()),
        to: Some("192.168.10.5".to_string()),
        table: Some(lan_table),
        priority: Some(1),
        ..RoutingPolicy::default()
    };
    assert!(iot.routing_policy.contains(&expected));

    let rules = rule_lines(&plan);
    assert!(rules.contains(
        &r#"add rule ip vlanctl prerouting iifname "eth0.10" fib daddr type local tcp dport 8080 dnat to 192.168.10.5:80"#
            .to_string()
    ));
}

#[test]
fn forward_with_bad_destination_is_skipped() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"

[[network.port_forward]]
id = "bad"
protocol = "tcp"
src_port = "22"
dst_ip = "nas.local"

[[network.port_forward]]
id = "v6"
protocol = "tcp"
src_port = "22"
dst_ip = "2001:db8::5"

[[network.port_forward]]
id = "noport"
protocol = "udp"
dst_ip = "192.168.10.5"
"#,
    );
    assert_eq!(
        codes(&plan),
        vec!["forward_destination_invalid", "forward_family_unavailable", "forward_port_missing"]
    );
    assert!(!rule_lines(&plan).iter().any(|r| r.contains("dnat")));
}

#[test]
fn https_forward_starts_proxy_behind_dummy_device() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"

[[network.port_forward]]
id = "ha"
protocol = "https"

[network.port_forward.proxy]
origin = "http://192.168.10.6:8123"
domain = "ha.example.net"

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "via-network", network = "wan" }
"#,
    );
    let dummy = &plan.netplan.network.dummy_devices["vlanctl0"];
    assert_eq!(dummy.addresses, vec!["169.254.100.1/32", "fd00:ffff::1/128"]);

    let proxy = plan.bring_up[0].proxy.as_ref().expect("proxy instance");
    assert_eq!((proxy.ports.https, proxy.ports.http), (10443, 10080));
    assert!(proxy.caddyfile.contains("ha.example.net {"));
    assert!(proxy.caddyfile.contains("reverse_proxy http://192.168.10.6:8123"));

    let rules = rule_lines(&plan);
    assert!(rules.contains(
        &r#"add rule ip vlanctl prerouting iifname "eth0" tcp dport 443 dnat to 169.254.100.1:10443"#.to_string()
    ));
    assert!(rules.contains(
        &r#"add rule ip vlanctl prerouting iifname "eth0.10" fib daddr type local tcp dport 80 dnat to 169.254.100.1:10080"#
            .to_string()
    ));
}

#[test]
fn referenced_parents_get_minimal_stanzas() {
    let plan = plan_of(
        r#"
[[network]]
id = "lan"
parent = "enp3s0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
"#,
    );
    let parent = &plan.netplan.network.ethernets["enp3s0"];
    assert!(parent.optional);
    assert!(parent.addresses.is_empty());
    assert!(!parent.dhcp4);
    assert_eq!(plan.netplan.network.vlans["enp3s0.10"].link, "enp3s0");
}

#[test]
fn bridge_role_wraps_the_vlan_link() {
    let plan = plan_of(
        r#"
[[network]]
id = "lab"
parent = "eth0"
vlan_id = 30
role = "bridge"
address = { mode = "manual", addresses = ["10.30.0.1/24"] }
"#,
    );
    let network = &plan.netplan.network;
    let bridge = &network.bridges["br-lab"];
    assert_eq!(bridge.interfaces, vec!["eth0.30"]);
    assert_eq!(bridge.interface.addresses, vec!["10.30.0.1/24"]);
    assert!(network.vlans["eth0.30"].interface.addresses.is_empty());
    assert_eq!(plan.table_of("br-lab").map(|t| t.get()), Some(100));
}

#[test]
fn non_ascii_bridge_id_is_skipped_not_fatal() {
    let plan = plan_of(
        r#"
[[network]]
id = "aaaaaaaaaaaé"
parent = "eth0"
vlan_id = 30
role = "bridge"
address = { mode = "manual", addresses = ["10.30.0.1/24"] }

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
"#,
    );
    assert!(codes(&plan).contains(&"invalid_interface_name"));
    assert!(plan.netplan.network.bridges.is_empty());
    assert!(plan.netplan.interface("eth0.10").is_some());
}

#[test]
fn unsafe_parent_name_never_reaches_the_hook() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth0\";reboot;\""
vlan_id = 1
role = "internet"
address = { mode = "auto", dhcp4 = true }
"#,
    );
    assert_eq!(codes(&plan), vec!["invalid_interface_name"]);
    assert!(plan.hook_entries.is_empty());
    assert!(!plan.dhcp_hook.contains("reboot"));
}

#[test]
fn auto_dns_inherits_from_static_gateway() {
    let plan = plan_of(
        r#"
[[network]]
id = "wan"
parent = "eth1"
vlan_id = 1
role = "internet"
address = { mode = "manual", addresses = ["203.0.113.10/24"] }
gateway = { mode = "manual", ipv4 = "203.0.113.1" }
dns = { mode = "static", servers = ["9.9.9.9"], search = ["home.arpa"] }

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
gateway = { mode = "via-network", network = "wan" }
"#,
    );
    let lan = plan.netplan.interface("eth0.10").expect("lan stanza");
    let nameservers = lan.nameservers.as_ref().expect("inherited nameservers");
    assert_eq!(nameservers.addresses, vec!["9.9.9.9"]);
    assert_eq!(nameservers.search, vec!["home.arpa"]);
}

#[test]
fn auto_dns_behind_dhcp_gateway_is_reported() {
    let plan = plan_of(
        r#"
[settings]
default_internet = "missing"

[[network]]
id = "wan"
parent = "eth0"
vlan_id = 1
role = "internet"
address = { mode = "auto", dhcp4 = true }

[[network]]
id = "lan"
parent = "eth0"
vlan_id = 10
address = { mode = "manual", addresses = ["192.168.10.1/24"] }
"#,
    );
    assert_eq!(codes(&plan), vec!["default_internet_unresolved", "dns_inherit_dynamic"]);
    assert!(plan
        .netplan
        .interface("eth0.10")
        .expect("lan stanza")
        .nameservers
        .is_none());
}

#[test]
fn recompiling_after_removal_drops_stale_output() {
    let mut file = load(TWO_NETWORKS);
    let before = compile(&file.store, &file.settings);
    assert!(before.netplan.interface("eth0.10").is_some());

    file.store.remove("lan").expect("remove lan");
    let after = compile(&file.store, &file.settings);
    assert!(after.netplan.interface("eth0.10").is_none());
    assert!(!rule_lines(&after).iter().any(|r| r.contains("eth0.10")));
    assert_eq!(after.tables.len(), 1);
}
