//! Firewall rule emitter.
//!
//! Produces masquerade, forward-accept and DNAT fragments into a
//! [`RuleSet`]. The emitter is stateless apart from the rule set itself:
//! calling a helper twice with the same arguments leaves one copy of each
//! rule, and [`FirewallEmitter::flush`] at the start of a pass makes the
//! rendered file replace whatever was loaded before.

use netcfg_core::{Chain, NftRule, RuleFamily, RuleSet};

use crate::model::ForwardProtocol;

/// One packet-level port forward, resolved to interface names.
#[derive(Debug, Clone)]
pub struct ForwardSpec<'a> {
    pub family: RuleFamily,
    pub wan: &'a str,
    /// Bare WAN addresses of `family`; empty matches any destination.
    pub wan_addresses: &'a [String],
    /// LAN interfaces that get hairpin rules.
    pub lans: &'a [String],
    pub protocol: ForwardProtocol,
    pub src_port: &'a str,
    pub dst_ip: &'a str,
    pub dst_port: Option<&'a str>,
}

/// Redirect of a WAN port to a local listener (reverse proxy).
#[derive(Debug, Clone)]
pub struct RedirectSpec<'a> {
    pub family: RuleFamily,
    pub wan: &'a str,
    pub wan_addresses: &'a [String],
    pub lans: &'a [String],
    pub port: u16,
    pub target: &'a str,
    pub target_port: u16,
}

#[derive(Debug, Clone)]
pub struct FirewallEmitter {
    rules: RuleSet,
}

impl FirewallEmitter {
    pub fn new(table: &str) -> Self {
        Self {
            rules: RuleSet::new(table),
        }
    }

    /// Declare and flush every managed chain.
    pub fn flush(&mut self) {
        self.rules.flush();
    }

    /// Masquerade traffic leaving `wan`.
    pub fn add_masquerade(&mut self, family: RuleFamily, wan: &str) {
        self.push(family, Chain::Postrouting, format!("oifname {} masquerade", quote(wan)));
    }

    /// NAT gateway: masquerade plus forwarding `lan` -> `wan` and established replies back.
    pub fn add_wan_gateway(&mut self, family: RuleFamily, wan: &str, lan: &str) {
        self.add_masquerade(family, wan);
        self.push(
            family,
            Chain::Forward,
            format!("iifname {} oifname {} accept", quote(lan), quote(wan)),
        );
        self.push(
            family,
            Chain::Forward,
            format!(
                "iifname {} oifname {} ct state established,related accept",
                quote(wan),
                quote(lan)
            ),
        );
    }

    /// Forward-accept, WAN DNAT and per-LAN hairpin rules for one port forward.
    ///
    /// Returns `false` without emitting anything for `https`, which never
    /// reaches packet-level forwarding.
    pub fn add_port_forward(&mut self, spec: &ForwardSpec<'_>) -> bool {
        let translated_port = spec.dst_port.unwrap_or(spec.src_port);
        let (Some(inbound), Some(translated)) = (
            spec.protocol.port_match(spec.src_port),
            spec.protocol.port_match(translated_port),
        ) else {
            return false;
        };
        let fam = spec.family.match_keyword();
        let target = spec.family.dnat_target(spec.dst_ip, spec.dst_port);
        let accept = format!("{fam} daddr {} {translated} accept", spec.dst_ip);

        self.push(
            spec.family,
            Chain::Forward,
            format!("iifname {} {accept}", quote(spec.wan)),
        );
        self.push(
            spec.family,
            Chain::Prerouting,
            format!(
                "iifname {}{} {inbound} dnat to {target}",
                quote(spec.wan),
                daddr_match(spec.family, spec.wan_addresses)
            ),
        );
        for lan in spec.lans {
            self.push(
                spec.family,
                Chain::Forward,
                format!("iifname {} {accept}", quote(lan)),
            );
            self.push(
                spec.family,
                Chain::Prerouting,
                format!("iifname {} fib daddr type local {inbound} dnat to {target}", quote(lan)),
            );
        }
        true
    }

    /// DNAT a WAN tcp port (and its LAN hairpins) to a local listener.
    pub fn add_local_redirect(&mut self, spec: &RedirectSpec<'_>) {
        let target = spec
            .family
            .dnat_target(spec.target, Some(&spec.target_port.to_string()));
        self.push(
            spec.family,
            Chain::Prerouting,
            format!(
                "iifname {}{} tcp dport {} dnat to {target}",
                quote(spec.wan),
                daddr_match(spec.family, spec.wan_addresses),
                spec.port
            ),
        );
        for lan in spec.lans {
            self.push(
                spec.family,
                Chain::Prerouting,
                format!(
                    "iifname {} fib daddr type local tcp dport {} dnat to {target}",
                    quote(lan),
                    spec.port
                ),
            );
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn into_rules(self) -> RuleSet {
        self.rules
    }

    fn push(&mut self, family: RuleFamily, chain: Chain, expr: String) {
        let rule = NftRule::new(family, chain, expr);
        if self.rules.add(rule.clone()) {
            tracing::debug!(rule = %self.rules.render_rule(&rule), "emitted firewall rule");
        }
    }
}

fn quote(interface: &str) -> String {
    format!("\"{interface}\"")
}

fn daddr_match(family: RuleFamily, addresses: &[String]) -> String {
    match addresses {
        [] => String::new(),
        [single] => format!(" {} daddr {single}", family.match_keyword()),
        many => format!(" {} daddr {{ {} }}", family.match_keyword(), many.join(", ")),
    }
}
