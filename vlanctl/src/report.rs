use colored::Colorize;
use serde::Serialize;

use crate::apply::ApplyReport;
use crate::compile::{CompiledPlan, TableAssignment};
use crate::dhcp_hook::HookEntry;
use crate::findings::{warning_count, FindingSeverity, PlanFinding};
use crate::interfaces::InterfaceChoice;
use crate::model::NetworkRole;
use crate::reverse_proxy::ProxyPorts;
use crate::store::{EntityKind, NetworkRepository};

/// Serializable view of a compiled plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub interfaces: Vec<String>,
    pub tables: Vec<TableAssignment>,
    pub firewall_rules: Vec<String>,
    pub hook_entries: Vec<HookEntry>,
    pub services: Vec<ServiceSummary>,
    pub warnings: usize,
    pub findings: Vec<PlanFinding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub network: String,
    pub interface: String,
    pub dhcp_server: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyPorts>,
}

impl PlanSummary {
    pub fn from_plan(plan: &CompiledPlan) -> Self {
        Self {
            interfaces: plan
                .netplan
                .interface_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            tables: plan.tables.clone(),
            firewall_rules: plan
                .firewall
                .rules()
                .map(|rule| plan.firewall.render_rule(rule))
                .collect(),
            hook_entries: plan.hook_entries.clone(),
            services: plan
                .bring_up
                .iter()
                .map(|b| ServiceSummary {
                    network: b.network.clone(),
                    interface: b.interface.clone(),
                    dhcp_server: b.dhcp_server.is_some(),
                    proxy: b.proxy.as_ref().map(|p| p.ports),
                })
                .collect(),
            warnings: warning_count(&plan.findings),
            findings: plan.findings.clone(),
        }
    }
}

pub fn render_plan_text(summary: &PlanSummary) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "plan interfaces={} tables={} rules={} warnings={}",
        summary.interfaces.len(),
        summary.tables.len(),
        summary.firewall_rules.len(),
        summary.warnings
    ));
    out.push("tables".bold().to_string());
    if summary.tables.is_empty() {
        out.push("- none".to_string());
    }
    for assignment in &summary.tables {
        out.push(format!("- {} -> {}", assignment.interface, assignment.table));
    }
    out.push("services".bold().to_string());
    for service in &summary.services {
        let mut parts = Vec::new();
        if service.dhcp_server {
            parts.push("dhcp-server".to_string());
        }
        if let Some(ports) = service.proxy {
            parts.push(format!("proxy https={} http={}", ports.https, ports.http));
        }
        let detail = if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        };
        out.push(format!("- {} ({}): {detail}", service.network, service.interface));
    }
    out.push(render_findings(&summary.findings));
    out.join("\n")
}

pub fn render_findings(findings: &[PlanFinding]) -> String {
    let mut out = vec!["findings".bold().to_string()];
    if findings.is_empty() {
        out.push("- none".to_string());
    }
    for finding in findings {
        let line = format!("- {finding}");
        out.push(match finding.severity {
            FindingSeverity::Warning => line.yellow().to_string(),
            FindingSeverity::Info => line,
        });
    }
    out.join("\n")
}

pub fn render_apply_text(report: &ApplyReport) -> String {
    let mut out = vec![format!(
        "apply steps={} failures={}",
        report.steps.len(),
        report.failures()
    )];
    for step in &report.steps {
        let line = match &step.detail {
            Some(detail) => format!("- {} {}: {detail}", step.entity, step.step),
            None => format!("- {} {}", step.entity, step.step),
        };
        out.push(if step.ok {
            line.green().to_string()
        } else {
            line.red().to_string()
        });
    }
    out.join("\n")
}

/// One line per network with its children.
pub fn render_network_list<R: NetworkRepository + ?Sized>(repo: &R) -> String {
    let networks = repo.networks();
    if networks.is_empty() {
        return "no networks".to_string();
    }
    let mut out = Vec::new();
    for network in networks {
        let location = match network.link_name() {
            Some(link) => link,
            None => "(incomplete)".to_string(),
        };
        let role = match network.role {
            NetworkRole::Network => "network",
            NetworkRole::Bridge => "bridge",
            NetworkRole::Internet => "internet",
        };
        out.push(format!("{} {location} role={role}", network.id.bold()));
        for forward in &network.port_forwards {
            out.push(format!("  forward {}", forward.id));
        }
        for reservation in &network.dhcp_server.reservations {
            out.push(format!(
                "  reservation {} {} -> {}",
                reservation.id, reservation.mac, reservation.ip
            ));
        }
    }
    out.push(format!(
        "total networks={} forwards={} reservations={}",
        repo.list(EntityKind::Network).len(),
        repo.list(EntityKind::PortForward).len(),
        repo.list(EntityKind::Reservation).len()
    ));
    out.join("\n")
}

pub fn render_interface_choices(choices: &[InterfaceChoice]) -> String {
    if choices.is_empty() {
        return "no parent interfaces found".to_string();
    }
    choices
        .iter()
        .map(|choice| {
            let used = if choice.networks.is_empty() {
                "unused".to_string()
            } else {
                choice
                    .networks
                    .iter()
                    .map(|(id, tag)| format!("{id}:{tag}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let next = choice
                .next_free_vlan()
                .map_or_else(|| "none".to_string(), |tag| tag.to_string());
            format!("{} {used} next_free_vlan={next}", choice.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
