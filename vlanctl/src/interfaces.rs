//! Parent-interface choices derived from the host's interface names.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::model::LogicalNetwork;

/// A physical interface that can carry logical networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceChoice {
    pub name: String,
    /// Networks already using this interface as parent, with their tags.
    pub networks: Vec<(String, u16)>,
}

impl InterfaceChoice {
    /// Lowest VLAN tag not yet used on this interface.
    pub fn next_free_vlan(&self) -> Option<u16> {
        (1..=4095).find(|tag| !self.networks.iter().any(|(_, used)| used == tag))
    }
}

/// Interface names found under `/sys/class/net` (or a test directory), sorted.
pub fn read_interface_names(sys_class_net: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(sys_class_net)? {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Interfaces usable as a parent, given the host's interface names.
///
/// Loopback, VLAN sub-interfaces, bridges and common virtual devices are
/// left out; parents named by existing networks are always included.
pub fn parent_choices(os_interfaces: &[String], networks: &[&LogicalNetwork]) -> Vec<InterfaceChoice> {
    let mut names: Vec<String> = os_interfaces
        .iter()
        .filter(|name| is_parent_candidate(name))
        .cloned()
        .collect();
    for network in networks {
        if let Some((parent, _)) = network.vlan_key() {
            if !names.iter().any(|n| n == parent) {
                names.push(parent.to_string());
            }
        }
    }

    names
        .into_iter()
        .map(|name| {
            let networks = networks
                .iter()
                .filter_map(|n| match n.vlan_key() {
                    Some((parent, tag)) if parent == name => Some((n.id.clone(), tag)),
                    _ => None,
                })
                .collect();
            InterfaceChoice { name, networks }
        })
        .collect()
}

fn is_parent_candidate(name: &str) -> bool {
    const VIRTUAL_PREFIXES: [&str; 8] = ["lo", "br-", "veth", "docker", "virbr", "tun", "tap", "wg"];
    !name.contains('.')
        && !name.contains('@')
        && !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
        && name != "vlanctl0"
}
