//! Network file: host settings plus the ordered list of logical networks.
//!
//! ```toml
//! [settings]
//! default_internet = "wan"
//!
//! [[network]]
//! id = "wan"
//! parent = "eth0"
//! vlan_id = 1
//! role = "internet"
//! ```
//!
//! Every setting has a default, so an empty `[settings]` table (or none at
//! all) is valid. Networks are replayed through the store on load, which
//! means a file with a duplicate VLAN pair is rejected as a whole.

use std::fs;
use std::path::{Path, PathBuf};

use netcfg_core::{write_artifact, WriteError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::LogicalNetwork;
use crate::store::{MemoryStore, StoreError};
use crate::tables::DEFAULT_TABLE_BASE;

/// Errors returned when loading or saving a network file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read network file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse network file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid network in {path}: {source}")]
    Invalid { path: String, source: StoreError },
    #[error("failed to serialize network file: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// How DHCP-learned gateways reach the custom routing tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStrategy {
    /// Script run by networkd-dispatcher whenever a link becomes routable.
    #[default]
    Event,
    /// Long-running watcher comparing lease files on an interval.
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub https_base: u16,
    pub http_base: u16,
    /// Addresses the proxy binds instead of the real loopback.
    pub fake_loopback_v4: String,
    pub fake_loopback_v6: String,
    /// Dummy device carrying the fake loopback addresses.
    pub device: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            https_base: 10443,
            http_base: 10080,
            fake_loopback_v4: "169.254.100.1".to_string(),
            fake_loopback_v6: "fd00:ffff::1".to_string(),
            device: "vlanctl0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub netplan: PathBuf,
    pub nftables: PathBuf,
    pub dhcp_hook: PathBuf,
    pub watch_unit: PathBuf,
    pub dnsmasq_dir: PathBuf,
    pub caddy_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            netplan: PathBuf::from("/etc/netplan/90-vlanctl.yaml"),
            nftables: PathBuf::from("/etc/nftables.d/vlanctl.nft"),
            dhcp_hook: PathBuf::from("/etc/networkd-dispatcher/routable.d/50-vlanctl-routes"),
            watch_unit: PathBuf::from("/etc/systemd/system/vlanctl-dhcp-watch.service"),
            dnsmasq_dir: PathBuf::from("/etc/vlanctl/dnsmasq"),
            caddy_dir: PathBuf::from("/etc/vlanctl/caddy"),
        }
    }
}

/// External commands, as argv prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub netplan_apply: Vec<String>,
    /// The rules file path is appended.
    pub nft_load: Vec<String>,
    pub systemctl: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            netplan_apply: vec!["netplan".to_string(), "apply".to_string()],
            nft_load: vec!["nft".to_string(), "-f".to_string()],
            systemctl: "systemctl".to_string(),
        }
    }
}

/// Host-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Network whose gateway also serves the host's main routing table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_internet: Option<String>,
    pub renderer: String,
    pub firewall_table: String,
    pub table_base: u32,
    pub dhcp_hook: HookStrategy,
    pub poll_interval_secs: u64,
    pub command_timeout_secs: u64,
    pub proxy: ProxySettings,
    pub paths: PathSettings,
    pub commands: CommandSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_internet: None,
            renderer: "networkd".to_string(),
            firewall_table: "vlanctl".to_string(),
            table_base: DEFAULT_TABLE_BASE,
            dhcp_hook: HookStrategy::Event,
            poll_interval_secs: 5,
            command_timeout_secs: 30,
            proxy: ProxySettings::default(),
            paths: PathSettings::default(),
            commands: CommandSettings::default(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawNetworkFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default, rename = "network", skip_serializing_if = "Vec::is_empty")]
    networks: Vec<LogicalNetwork>,
}

/// A loaded network file.
#[derive(Debug, Clone, Default)]
pub struct NetworkFile {
    pub settings: Settings,
    pub store: MemoryStore,
}

impl NetworkFile {
    /// Render back to TOML.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        let raw = RawNetworkFile {
            settings: self.settings.clone(),
            networks: self.store.clone().into_networks(),
        };
        Ok(toml::to_string_pretty(&raw)?)
    }

    /// Replace the file at `path` with the current contents.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let rendered = self.to_toml()?;
        write_artifact(path, &rendered, None)?;
        tracing::debug!(path = %path.display(), "saved network file");
        Ok(())
    }
}

/// Load a network file from disk.
pub fn load_network_file(path: &Path) -> Result<NetworkFile, SettingsError> {
    let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_network_file(&raw, path.display().to_string())
}

/// Parse network-file text; `origin` names the source in errors.
pub fn parse_network_file(raw: &str, origin: String) -> Result<NetworkFile, SettingsError> {
    let parsed: RawNetworkFile = toml::from_str(raw).map_err(|source| SettingsError::Parse {
        path: origin.clone(),
        source,
    })?;
    let store = MemoryStore::from_networks(parsed.networks)
        .map_err(|source| SettingsError::Invalid { path: origin, source })?;
    Ok(NetworkFile {
        settings: parsed.settings,
        store,
    })
}
