//! Caddyfile templating for `https` port forwards.
//!
//! Each internet network with at least one valid `https` forward gets its
//! own Caddy instance listening on a private port pair bound to the fake
//! loopback addresses. The firewall redirects WAN ports 443/80 there.

use std::fmt::Write as _;

use serde::Serialize;
use url::Url;

use crate::findings::Findings;
use crate::model::{ForwardProtocol, PortForward};
use crate::settings::ProxySettings;

/// Ports assigned to one internet network's proxy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProxyPorts {
    pub https: u16,
    pub http: u16,
}

impl ProxyPorts {
    /// Pair for the `index`-th proxied network of this pass.
    pub fn allocate(settings: &ProxySettings, index: u16) -> Self {
        Self {
            https: settings.https_base.saturating_add(index),
            http: settings.http_base.saturating_add(index),
        }
    }
}

/// A validated `https` forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxySite {
    pub forward: String,
    pub domain: String,
    pub origin: String,
    pub dns_challenge: Option<String>,
    pub rule_block: Option<String>,
}

/// Template unit managing one Caddy instance per internet network.
pub fn unit_name(network: &str) -> String {
    format!("vlanctl-caddy@{network}.service")
}

/// Validate the `https` forwards of a network; others are ignored.
pub fn collect_sites(forwards: &[PortForward], findings: &mut Findings) -> Vec<ProxySite> {
    let mut sites = Vec::new();
    for forward in forwards {
        if forward.protocol != ForwardProtocol::Https {
            continue;
        }
        let Some(proxy) = &forward.proxy else {
            findings.warn(
                &forward.id,
                "proxy_missing",
                "https forward has no proxy settings; skipped",
            );
            continue;
        };
        let domain = proxy.domain.trim();
        if domain.is_empty() {
            findings.warn(&forward.id, "proxy_domain_missing", "https forward has no domain; skipped");
            continue;
        }
        match Url::parse(proxy.origin.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            _ => {
                findings.warn(
                    &forward.id,
                    "proxy_origin_invalid",
                    format!("origin '{}' is not an http(s) URL; skipped", proxy.origin),
                );
                continue;
            }
        }
        sites.push(ProxySite {
            forward: forward.id.clone(),
            domain: domain.to_string(),
            origin: proxy.origin.trim().to_string(),
            dns_challenge: proxy
                .dns_challenge
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            rule_block: proxy
                .rule_block
                .as_deref()
                .filter(|b| !b.trim().is_empty())
                .map(str::to_string),
        });
    }
    sites
}

/// Render a Caddyfile for one proxy instance.
pub fn render_caddyfile(settings: &ProxySettings, ports: ProxyPorts, sites: &[ProxySite]) -> String {
    let mut out = String::from("# Generated by vlanctl. Do not edit.\n{\n");
    let _ = writeln!(out, "\thttp_port {}", ports.http);
    let _ = writeln!(out, "\thttps_port {}", ports.https);
    let _ = writeln!(
        out,
        "\tdefault_bind {} {}",
        settings.fake_loopback_v4, settings.fake_loopback_v6
    );
    out.push_str("}\n");

    for site in sites {
        let _ = writeln!(out, "\n{} {{", site.domain);
        match &site.rule_block {
            Some(block) => {
                for line in block.trim_end().lines() {
                    let _ = writeln!(out, "\t{}", line.trim_end());
                }
            }
            None => {
                let _ = writeln!(out, "\treverse_proxy {}", site.origin);
                if let Some(dns) = &site.dns_challenge {
                    let _ = writeln!(out, "\ttls {{\n\t\tdns {dns}\n\t}}");
                }
            }
        }
        out.push_str("}\n");
    }
    out
}
