//! Scripts that copy DHCP-learned gateways into custom routing tables.
//!
//! The compiler allocates a table per interface but cannot know a leased
//! gateway at plan time. These scripts read systemd-networkd's lease files
//! at runtime and run `ip route replace default via <router>` in the right
//! table, sourced from the leased address.

use indexmap::IndexMap;
use serde::Serialize;

use crate::tables::TableId;

const LEASE_DIR: &str = "/run/systemd/netif/leases";

/// Unit running the polling watcher.
pub const WATCH_UNIT: &str = "vlanctl-dhcp-watch.service";
/// Service that runs `routable.d` hooks.
pub const DISPATCHER_UNIT: &str = "networkd-dispatcher.service";

/// Install the leased default route of `interface` into `table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HookEntry {
    pub interface: String,
    pub table: TableId,
}

/// `networkd-dispatcher` hook, run with `$IFACE` set whenever a link becomes routable.
pub fn render_event_hook(entries: &[HookEntry]) -> String {
    let mut lines = script_header();
    lines.push("case \"${IFACE:-}\" in".to_string());
    for (interface, tables) in group_by_interface(entries) {
        lines.push(format!("\t\"{interface}\")"));
        for table in tables {
            lines.push(format!("\t\tinstall_default \"{interface}\" {table}"));
        }
        lines.push("\t\t;;".to_string());
    }
    lines.push("esac".to_string());
    finish(lines)
}

/// Long-running watcher that reinstalls every entry when any lease file changes.
pub fn render_polling_watcher(entries: &[HookEntry], interval_secs: u64) -> String {
    let mut lines = script_header();
    lines.push("sync_all() {".to_string());
    if entries.is_empty() {
        lines.push("\t:".to_string());
    }
    for entry in entries {
        lines.push(format!(
            "\tinstall_default \"{}\" {}",
            entry.interface, entry.table
        ));
    }
    lines.push("}".to_string());
    lines.push(String::new());
    lines.push(format!("INTERVAL={}", interval_secs.max(1)));
    lines.push("last=\"\"".to_string());
    lines.push("while :; do".to_string());
    lines.push(format!(
        "\tcurrent=\"$(cat {LEASE_DIR}/* 2>/dev/null | cksum)\""
    ));
    lines.push("\tif [ \"$current\" != \"$last\" ]; then".to_string());
    lines.push("\t\tsync_all".to_string());
    lines.push("\t\tlast=\"$current\"".to_string());
    lines.push("\tfi".to_string());
    lines.push("\tsleep \"$INTERVAL\"".to_string());
    lines.push("done".to_string());
    finish(lines)
}

/// systemd unit running the polling watcher at `script`.
pub fn render_watch_unit(script: &str) -> String {
    let lines = [
        "[Unit]".to_string(),
        "Description=vlanctl DHCP gateway watcher".to_string(),
        "After=systemd-networkd.service".to_string(),
        String::new(),
        "[Service]".to_string(),
        format!("ExecStart=/bin/sh {script}"),
        "Restart=always".to_string(),
        String::new(),
        "[Install]".to_string(),
        "WantedBy=multi-user.target".to_string(),
    ];
    finish(lines.to_vec())
}

fn script_header() -> Vec<String> {
    let mut lines: Vec<String> = [
        "#!/bin/sh",
        "# Generated by vlanctl. Do not edit.",
        "set -u",
        "",
        "install_default() {",
        "\tiface=\"$1\"",
        "\ttable=\"$2\"",
        "\tifindex=\"$(cat \"/sys/class/net/$iface/ifindex\" 2>/dev/null)\" || return 0",
    ]
    .iter()
    .map(|line| line.to_string())
    .collect();
    lines.push(format!("\tlease=\"{LEASE_DIR}/$ifindex\""));
    lines.extend(
        [
            "\t[ -r \"$lease\" ] || return 0",
            "\trouter=\"$(sed -n 's/^ROUTER=\\([^ ]*\\).*/\\1/p' \"$lease\")\"",
            "\taddress=\"$(sed -n 's/^ADDRESS=//p' \"$lease\")\"",
            "\t[ -n \"$router\" ] || return 0",
            "\tif [ -n \"$address\" ]; then",
            "\t\tip route replace default via \"$router\" dev \"$iface\" src \"$address\" table \"$table\"",
            "\telse",
            "\t\tip route replace default via \"$router\" dev \"$iface\" table \"$table\"",
            "\tfi",
            "}",
            "",
        ]
        .iter()
        .map(|line| line.to_string()),
    );
    lines
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn group_by_interface(entries: &[HookEntry]) -> IndexMap<&str, Vec<TableId>> {
    let mut grouped: IndexMap<&str, Vec<TableId>> = IndexMap::new();
    for entry in entries {
        let tables = grouped.entry(entry.interface.as_str()).or_default();
        if !tables.contains(&entry.table) {
            tables.push(entry.table);
        }
    }
    grouped
}
